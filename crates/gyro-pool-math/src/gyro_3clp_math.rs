//! Pricing math for the Gyroscope 3-CLP (three-asset constant liquidity
//! pool).
//!
//! All three assets share one symmetric price bound, supplied as the cube
//! root of alpha. The invariant L is the positive root of the cubic
//! `a*L^3 - mb*L^2 - mc*L - md = 0`, which has no closed form suitable for
//! fixed-point evaluation and is therefore solved by a calibrated Newton
//! iteration started strictly above the cubic's local minimum, where
//! convergence is monotone.
//!
//! The marginal trading curve between any two of the three assets reduces to
//! a two-asset constant-product curve whose virtual offset on both sides is
//! `L * root3Alpha`.

use {
    crate::{
        error::Error,
        fixed_point::{WAD, div_down_fixed, div_up_fixed, mul_down_fixed, mul_up_fixed, sqrt},
    },
    num::BigInt,
    std::sync::LazyLock,
};

/// Hard cap on individual pool balances, 1e11 tokens at 18 decimals.
pub static MAX_BALANCES: LazyLock<BigInt> =
    LazyLock::new(|| BigInt::from(10_u8).pow(29));
/// Hard cap on the invariant itself.
pub static L_MAX: LazyLock<BigInt> = LazyLock::new(|| BigInt::from(10_u8).pow(34));
/// Largest L for which `l^3 * (1 - alpha)` can be computed with plain
/// fixed-point products on a 256-bit pipeline.
static SAFE_LARGE_POW3_THRESHOLD: LazyLock<BigInt> =
    LazyLock::new(|| BigInt::from(487_u16) * BigInt::from(10_u8).pow(29));

/// Newton steps performed unconditionally before any of the heuristic
/// stopping rules may fire.
const INVARIANT_MIN_ITERATIONS: usize = 5;
/// A step that fails to shrink by this factor relative to its predecessor
/// means the iteration has hit its numerical floor.
const INVARIANT_SHRINKING_FACTOR_PER_STEP: u8 = 8;
/// Absolute ceiling on Newton steps; exceeding it is a fatal error.
const INVARIANT_MAX_ITERATIONS: usize = 255;

/// Coefficients of the invariant cubic, with the lower-order terms negated so
/// all values stay non-negative. For valid pool parameters every field is
/// non-negative by construction.
#[derive(Clone, Debug)]
pub struct CubicTerms {
    /// 1 - alpha.
    pub a: BigInt,
    /// -b = (x + y + z) * root3Alpha^2.
    pub mb: BigInt,
    /// -c = (xy + yz + zx) * root3Alpha.
    pub mc: BigInt,
    /// -d = xyz.
    pub md: BigInt,
}

/// Outcome of the bounded Newton iteration. Only the invariant entry point
/// treats `NonConvergent` as fatal; other callers may decide differently.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Convergence {
    Converged(BigInt),
    NonConvergent,
}

/// Computes the invariant L for the given balances and price bound.
pub fn calculate_invariant(
    balances: [&BigInt; 3],
    root3_alpha: &BigInt,
) -> Result<BigInt, Error> {
    for balance in balances {
        if balance > &*MAX_BALANCES {
            return Err(Error::BalanceOutOfBounds);
        }
    }

    let terms = calculate_cubic_terms(balances, root3_alpha);
    let l0 = calculate_cubic_starting_point(&terms)?;
    match run_newton_iteration(&terms, root3_alpha, l0)? {
        Convergence::Converged(root) => {
            if root > *L_MAX {
                return Err(Error::BalanceOutOfBounds);
            }
            Ok(root)
        }
        Convergence::NonConvergent => Err(Error::InvariantDidntConverge),
    }
}

/// Derives the cubic coefficients from balances and the price bound.
pub fn calculate_cubic_terms(balances: [&BigInt; 3], root3_alpha: &BigInt) -> CubicTerms {
    let [x, y, z] = balances;

    let root3_alpha_squared = mul_down_fixed(root3_alpha, root3_alpha);
    let alpha = mul_down_fixed(&root3_alpha_squared, root3_alpha);
    let a = &*WAD - &alpha;

    let b_term = x + y + z;
    let mb = mul_down_fixed(&b_term, &root3_alpha_squared);

    let c_term =
        mul_down_fixed(x, y) + mul_down_fixed(y, z) + mul_down_fixed(z, x);
    let mc = mul_down_fixed(&c_term, root3_alpha);

    let md = mul_down_fixed(x, &mul_down_fixed(y, z));

    CubicTerms { a, mb, mc, md }
}

/// Computes a starting estimate strictly above the cubic's local minimum
/// `lmin = (mb + sqrt(mb^2 + 3*a*mc)) / (3*a)`, scaled by a calibrated safety
/// factor: 1.5 when alpha >= 0.5, else 2. Newton's method is then guaranteed
/// to approach the root monotonically from above.
pub fn calculate_cubic_starting_point(terms: &CubicTerms) -> Result<BigInt, Error> {
    let radic =
        mul_up_fixed(&terms.mb, &terms.mb) + mul_up_fixed(&terms.a, &(&terms.mc * 3));

    let three_a = &terms.a * 3;
    let lmin =
        div_up_fixed(&terms.mb, &three_a)? + div_up_fixed(&sqrt(&radic, 5)?, &three_a)?;

    let alpha = &*WAD - &terms.a;
    let factor = if alpha >= BigInt::from(500_000_000_000_000_000_u64) {
        BigInt::from(1_500_000_000_000_000_000_u64)
    } else {
        BigInt::from(2_000_000_000_000_000_000_u64)
    };

    Ok(mul_up_fixed(&lmin, &factor))
}

/// Bounded Newton iteration on the cubic, starting from `root_est` above the
/// root. Stopping rules, checked in order each step:
///
/// 1. the step magnitude is at most one unit;
/// 2. after [`INVARIANT_MIN_ITERATIONS`] steps, the step points upward (the
///    estimate has crossed into the monotone region and must not overshoot);
/// 3. after [`INVARIANT_MIN_ITERATIONS`] steps, the step failed to shrink by
///    [`INVARIANT_SHRINKING_FACTOR_PER_STEP`] relative to its predecessor
///    (progress has stalled at the numerical floor).
///
/// The stopping constants are protocol-defined calibration values and must
/// not be tuned.
pub fn run_newton_iteration(
    terms: &CubicTerms,
    root3_alpha: &BigInt,
    mut root_est: BigInt,
) -> Result<Convergence, Error> {
    let mut delta_abs_prev = BigInt::from(0);

    for iteration in 0..INVARIANT_MAX_ITERATIONS {
        let (delta_abs, delta_is_pos) = calc_newton_delta(terms, root3_alpha, &root_est)?;

        if delta_abs <= BigInt::from(1) {
            return Ok(Convergence::Converged(root_est));
        }
        if iteration >= INVARIANT_MIN_ITERATIONS && delta_is_pos {
            return Ok(Convergence::Converged(root_est));
        }
        if iteration >= INVARIANT_MIN_ITERATIONS
            && delta_abs >= &delta_abs_prev / INVARIANT_SHRINKING_FACTOR_PER_STEP
        {
            return Ok(Convergence::Converged(root_est));
        }

        delta_abs_prev = delta_abs.clone();
        if delta_is_pos {
            root_est += delta_abs;
        } else {
            if root_est < delta_abs {
                // The estimate would cross zero, which cannot happen when
                // started above the root.
                return Ok(Convergence::NonConvergent);
            }
            root_est -= delta_abs;
        }
    }

    Ok(Convergence::NonConvergent)
}

/// Computes one Newton step `-f(L)/f'(L)` as an unsigned magnitude plus
/// direction, splitting `f(L)/f'(L)` into a "plus" and a "minus" term so the
/// whole computation stays in non-negative arithmetic.
pub fn calc_newton_delta(
    terms: &CubicTerms,
    root3_alpha: &BigInt,
    root_est: &BigInt,
) -> Result<(BigInt, bool), Error> {
    if root_est > &*L_MAX {
        return Err(Error::BalanceOutOfBounds);
    }

    let root_est_squared = mul_down_fixed(root_est, root_est);

    // f'(L) = 3*L^2 * (1 - alpha) - 2*L*mb - mc, with the alpha term applied
    // through successive products by root3Alpha.
    let df_root_est = mul_down_fixed(&(root_est * 3), root_est);
    let alpha_term = mul_down_fixed(
        &mul_down_fixed(&mul_down_fixed(&df_root_est, root3_alpha), root3_alpha),
        root3_alpha,
    );
    let df_root_est = &df_root_est - &alpha_term - 2 * mul_down_fixed(root_est, &terms.mb)
        - &terms.mc;

    let delta_minus = safe_large_pow3_a_down(root_est, root3_alpha, &df_root_est)?;

    let mut delta_plus = mul_down_fixed(&root_est_squared, &terms.mb);
    delta_plus = div_down_fixed(
        &(&delta_plus + mul_down_fixed(root_est, &terms.mc)),
        &df_root_est,
    )?;
    delta_plus += div_down_fixed(&terms.md, &df_root_est)?;

    let delta_is_pos = delta_plus >= delta_minus;
    let delta_abs = if delta_is_pos {
        &delta_plus - &delta_minus
    } else {
        &delta_minus - &delta_plus
    };

    Ok((delta_abs, delta_is_pos))
}

/// Computes `l^3 * (1 - root3Alpha^3) / d` rounding down, in a way that is
/// safe for large `l`.
///
/// Below [`SAFE_LARGE_POW3_THRESHOLD`] the cube fits plain fixed-point
/// products. Above it, the third factor is multiplied in as two 9-decimal
/// halves whose partial products are summed before the single floor division,
/// so no intermediate exceeds 256 bits and no precision is lost to an extra
/// rounding step.
pub fn safe_large_pow3_a_down(
    l: &BigInt,
    root3_alpha: &BigInt,
    d: &BigInt,
) -> Result<BigInt, Error> {
    if l <= &*SAFE_LARGE_POW3_THRESHOLD {
        let l_cubed = mul_down_fixed(&mul_down_fixed(l, l), l);
        let alpha_part = mul_down_fixed(
            &mul_down_fixed(&mul_down_fixed(&l_cubed, root3_alpha), root3_alpha),
            root3_alpha,
        );
        div_down_fixed(&(&l_cubed - &alpha_part), d)
    } else {
        let l_squared = mul_down_fixed(l, l);

        // 1 - alpha, with alpha rounded up so the overall result still
        // rounds down.
        let one_minus_alpha =
            &*WAD - &mul_up_fixed(&mul_up_fixed(root3_alpha, root3_alpha), root3_alpha);
        let tail = mul_down_fixed(l, &one_minus_alpha);

        let split = BigInt::from(1_000_000_000_u64);
        let tail_high = &tail / &split;
        let tail_low = &tail % &split;
        let product = (&l_squared * &tail_high * &split + &l_squared * &tail_low) / &*WAD;

        div_down_fixed(&product, d)
    }
}

/// Constant-product swap on the virtual reserves, solved for the output. The
/// virtual offset (equal on both sides for the 3-CLP) is inflated on the in
/// side and deflated on the out side so the result can only err against the
/// trader.
pub fn calc_out_given_in(
    balance_in: &BigInt,
    balance_out: &BigInt,
    amount_in: &BigInt,
    virtual_offset: &BigInt,
) -> Result<BigInt, Error> {
    let virt_in_over = balance_in + mul_up_fixed(virtual_offset, &(&*WAD + 2));
    let virt_out_under = balance_out + mul_down_fixed(virtual_offset, &(&*WAD - 1));

    let amount_out = div_down_fixed(
        &mul_down_fixed(&virt_out_under, amount_in),
        &(&virt_in_over + amount_in),
    )?;

    if &amount_out > balance_out {
        return Err(Error::AssetBoundsExceeded);
    }

    Ok(amount_out)
}

/// Inverse of [`calc_out_given_in`], rounded up against the trader.
pub fn calc_in_given_out(
    balance_in: &BigInt,
    balance_out: &BigInt,
    amount_out: &BigInt,
    virtual_offset: &BigInt,
) -> Result<BigInt, Error> {
    if amount_out > balance_out {
        return Err(Error::AssetBoundsExceeded);
    }

    let virt_in_over = balance_in + mul_up_fixed(virtual_offset, &(&*WAD + 2));
    let virt_out_under = balance_out + mul_down_fixed(virtual_offset, &(&*WAD - 1));

    div_up_fixed(
        &mul_up_fixed(&virt_in_over, amount_out),
        &(&virt_out_under - amount_out),
    )
}

/// Half the virtual out-side reserve, used by routing layers to rank pools.
pub fn get_normalized_liquidity(balance_out: &BigInt, virtual_out: &BigInt) -> BigInt {
    (balance_out + virtual_out) / 2
}

#[cfg(test)]
mod tests {
    use {super::*, crate::fixed_point::mul_down_fixed};

    fn wad(n: u64) -> BigInt {
        BigInt::from(n) * &*WAD
    }

    fn invariant(balances: [u64; 3], root3_alpha: u64) -> Result<BigInt, Error> {
        let balances = balances.map(wad);
        calculate_invariant(
            [&balances[0], &balances[1], &balances[2]],
            &BigInt::from(root3_alpha),
        )
    }

    #[test]
    fn cubic_terms_non_negative() {
        let one = wad(1);
        let root3_alpha = BigInt::from(900_000_000_000_000_000_u64);
        let terms = calculate_cubic_terms([&one, &one, &one], &root3_alpha);

        assert!(terms.a > BigInt::from(0));
        assert!(terms.mb > BigInt::from(0));
        assert!(terms.mc > BigInt::from(0));
        assert!(terms.md > BigInt::from(0));
    }

    #[test]
    fn newton_converges_on_regression_case() {
        // Skewed balances with a price bound just above 0.9.
        let invariant = invariant([30_192, 62_250, 44_794], 900_000_000_065_151_515).unwrap();
        assert!(invariant > BigInt::from(0));

        // The returned root must solve the cubic to within one unit of
        // Newton step.
        let balances = [wad(30_192), wad(62_250), wad(44_794)];
        let root3_alpha = BigInt::from(900_000_000_065_151_515_u64);
        let terms = calculate_cubic_terms(
            [&balances[0], &balances[1], &balances[2]],
            &root3_alpha,
        );
        let (delta_abs, _) = calc_newton_delta(&terms, &root3_alpha, &invariant).unwrap();
        assert!(delta_abs <= BigInt::from(10));
    }

    #[test]
    fn newton_converges_on_tight_bound_case() {
        let invariant = invariant([81_485, 83_119, 82_934], 995_647_752_000_000_000).unwrap();
        assert!(invariant > BigInt::from(0));

        // Normalized liquidity for a swap out of the first asset.
        let root3_alpha = BigInt::from(995_647_752_000_000_000_u64);
        let virtual_offset = mul_down_fixed(&invariant, &root3_alpha);
        let liquidity = get_normalized_liquidity(&wad(81_485), &virtual_offset);
        assert!(liquidity > BigInt::from(0));
    }

    #[test]
    fn newton_converges_across_parameter_grid() {
        let bounds = [
            850_000_000_000_000_000_u64,
            900_000_000_000_000_000,
            980_000_000_000_000_000,
            999_000_000_000_000_000,
        ];
        let pools: [[u64; 3]; 4] = [
            [1, 1, 1],
            [1_000, 1_000, 1_000],
            [5_697, 1_952, 2_835_545],
            [100_000_000, 90_000_000, 110_000_000],
        ];

        for root3_alpha in bounds {
            for balances in pools {
                let result = invariant(balances, root3_alpha).unwrap();
                assert!(result > BigInt::from(0));
            }
        }
    }

    #[test]
    fn invariant_monotone_in_balances() {
        let root3_alpha = 900_000_000_000_000_000_u64;
        let mut previous = BigInt::from(0);
        for x in [1_000_u64, 1_250, 1_500, 2_000, 4_000] {
            let result = invariant([x, 1_000, 1_000], root3_alpha).unwrap();
            assert!(result >= previous);
            previous = result;
        }
    }

    #[test]
    fn balance_cap_is_enforced() {
        let over = &*MAX_BALANCES + 1;
        let ok = wad(1);
        let root3_alpha = BigInt::from(900_000_000_000_000_000_u64);
        assert_eq!(
            calculate_invariant([&over, &ok, &ok], &root3_alpha),
            Err(Error::BalanceOutOfBounds)
        );
    }

    #[test]
    fn pow3_regimes_agree_near_threshold() {
        let root3_alpha = BigInt::from(999_000_000_000_000_000_u64);
        let d = wad(1);

        let below = &*SAFE_LARGE_POW3_THRESHOLD - 1;
        let above = &*SAFE_LARGE_POW3_THRESHOLD + 1;
        let result_below = safe_large_pow3_a_down(&below, &root3_alpha, &d).unwrap();
        let result_above = safe_large_pow3_a_down(&above, &root3_alpha, &d).unwrap();

        // Crossing into the decomposed regime must not jump: the two results
        // bracket a continuous function and stay within a relative sliver of
        // each other.
        assert!(result_above <= &result_below + (&result_below / 1_000_000) + 1_000);
        assert!(result_above >= &result_below - (&result_below / 1_000_000) - 1_000);
    }

    #[test]
    fn round_trip_never_profits_trader() {
        let invariant = invariant([1_000, 1_000, 1_000], 900_000_000_000_000_000).unwrap();
        let root3_alpha = BigInt::from(900_000_000_000_000_000_u64);
        let virtual_offset = mul_down_fixed(&invariant, &root3_alpha);
        let balance = wad(1_000);

        for amount_in in [wad(1), wad(10), wad(100)] {
            let out =
                calc_out_given_in(&balance, &balance, &amount_in, &virtual_offset).unwrap();
            let back = calc_in_given_out(&balance, &balance, &out, &virtual_offset).unwrap();
            assert!(back >= amount_in);
        }
    }

    #[test]
    fn requested_output_may_not_exceed_balance() {
        let balance = wad(100);
        let virtual_offset = wad(1_000);
        let too_much = &balance + 1;
        assert_eq!(
            calc_in_given_out(&balance, &balance, &too_much, &virtual_offset),
            Err(Error::AssetBoundsExceeded)
        );
    }
}
