//! Pricing math for the Gyroscope 2-CLP (two-asset constant liquidity pool).
//!
//! The trading curve is a constant-product curve shifted by virtual reserve
//! offsets derived from the pool's price bounds [alpha, beta], supplied as
//! their square roots. The invariant L solves the quadratic
//! `0 = a*L^2 - mb*L - mc` and has a closed form; the quadratic
//! coefficients and the formula evaluation are ordered to keep fixed-point
//! rounding error small and biased in the pool's favor.

use {
    crate::{
        error::Error,
        fixed_point::{WAD, div_down_fixed, div_up_fixed, mul_down_fixed, mul_up_fixed, sqrt},
    },
    num::BigInt,
};

/// Coefficients of the invariant quadratic, with the linear and constant
/// terms negated so all values stay non-negative.
#[derive(Clone, Debug)]
pub struct QuadraticTerms {
    pub a: BigInt,
    /// -b.
    pub mb: BigInt,
    /// b^2, expanded separately for precision instead of squaring `mb`.
    pub b_square: BigInt,
    /// -c.
    pub mc: BigInt,
}

/// Computes the invariant L from current balances and price bounds.
pub fn calculate_invariant(
    balances: [&BigInt; 2],
    sqrt_alpha: &BigInt,
    sqrt_beta: &BigInt,
) -> Result<BigInt, Error> {
    let terms = calculate_quadratic_terms(balances, sqrt_alpha, sqrt_beta)?;
    calculate_quadratic(&terms.a, &terms.mb, &terms.b_square, &terms.mc)
}

/// Derives the quadratic coefficients from balances and price bounds.
///
/// `b_square` is computed as the expanded weighted sum
/// `x^2*alpha + 2*x*y*sqrtAlpha/sqrtBeta + y^2/beta` rather than by squaring
/// `mb`, which loses less precision in fixed point.
pub fn calculate_quadratic_terms(
    balances: [&BigInt; 2],
    sqrt_alpha: &BigInt,
    sqrt_beta: &BigInt,
) -> Result<QuadraticTerms, Error> {
    let [x, y] = balances;

    let a = &*WAD - &div_down_fixed(sqrt_alpha, sqrt_beta)?;

    let b_term0 = div_down_fixed(y, sqrt_beta)?;
    let b_term1 = mul_down_fixed(x, sqrt_alpha);
    let mb = b_term0 + b_term1;

    let mc = mul_down_fixed(x, y);

    let b_square = mul_down_fixed(&mul_down_fixed(&mul_down_fixed(x, x), sqrt_alpha), sqrt_alpha);
    let b_sq2 = div_down_fixed(
        &(BigInt::from(2) * mul_down_fixed(&mul_down_fixed(x, y), sqrt_alpha)),
        sqrt_beta,
    )?;
    let b_sq3 = div_down_fixed(&mul_down_fixed(y, y), &mul_up_fixed(sqrt_beta, sqrt_beta))?;
    let b_square = b_square + b_sq2 + b_sq3;

    Ok(QuadraticTerms {
        a,
        mb,
        b_square,
        mc,
    })
}

/// Solves the quadratic for its positive root via the standard formula,
/// rounding every step so the result can only understate the true invariant.
pub fn calculate_quadratic(
    a: &BigInt,
    mb: &BigInt,
    b_square: &BigInt,
    mc: &BigInt,
) -> Result<BigInt, Error> {
    let denominator = mul_up_fixed(a, &(BigInt::from(2) * &*WAD));

    let add_term = mul_down_fixed(&mul_down_fixed(mc, &(BigInt::from(4) * &*WAD)), a);

    // The minus sign of c cancels against the minus inside the radicand.
    let radicand = b_square + add_term;

    let sqr_result = sqrt(&radicand, 5)?;

    // Likewise the minus sign of b cancels in the numerator.
    let numerator = mb + sqr_result;

    div_down_fixed(&numerator, &denominator)
}

/// Virtual reserve offsets for the two sides of the curve:
/// `virtual_in = L / sqrtBeta`, `virtual_out = L * sqrtAlpha`.
pub fn find_virtual_params(
    invariant: &BigInt,
    sqrt_alpha: &BigInt,
    sqrt_beta: &BigInt,
) -> Result<(BigInt, BigInt), Error> {
    Ok((
        div_down_fixed(invariant, sqrt_beta)?,
        mul_down_fixed(invariant, sqrt_alpha),
    ))
}

/// Constant-product swap on the virtual reserves, solved for the output.
///
/// The in-side offset is inflated by a factor of (1 + 2e-18) and the out-side
/// offset deflated by (1 - 1e-18) so the computed output is never more
/// favorable to the trader than the true curve.
pub fn calc_out_given_in(
    balance_in: &BigInt,
    balance_out: &BigInt,
    amount_in: &BigInt,
    virtual_offset_in: &BigInt,
    virtual_offset_out: &BigInt,
) -> Result<BigInt, Error> {
    let virt_in_over = balance_in + mul_up_fixed(virtual_offset_in, &(&*WAD + 2));
    let virt_out_under = balance_out + mul_down_fixed(virtual_offset_out, &(&*WAD - 1));

    let amount_out = div_down_fixed(
        &mul_down_fixed(&virt_out_under, amount_in),
        &(&virt_in_over + amount_in),
    )?;

    if &amount_out > balance_out {
        return Err(Error::AssetBoundsExceeded);
    }

    Ok(amount_out)
}

/// Inverse of [`calc_out_given_in`]: the input required for a desired output,
/// rounded up so the trader supplies at least the true amount.
pub fn calc_in_given_out(
    balance_in: &BigInt,
    balance_out: &BigInt,
    amount_out: &BigInt,
    virtual_offset_in: &BigInt,
    virtual_offset_out: &BigInt,
) -> Result<BigInt, Error> {
    if amount_out > balance_out {
        return Err(Error::AssetBoundsExceeded);
    }

    let virt_in_over = balance_in + mul_up_fixed(virtual_offset_in, &(&*WAD + 2));
    let virt_out_under = balance_out + mul_down_fixed(virtual_offset_out, &(&*WAD - 1));

    div_up_fixed(
        &mul_up_fixed(&virt_in_over, amount_out),
        &(&virt_out_under - amount_out),
    )
}
