//! WAD (18-decimal) fixed-point arithmetic over arbitrary-precision integers.
//!
//! Every balance, price bound and invariant in this crate is an unsigned
//! integer scaled by 10^18. Multiplication and division take an explicit
//! rounding direction at each call site; the pool math picks the direction
//! that can only ever err against the trader, never against the pool.

use {
    crate::error::Error,
    num::{BigInt, Signed, Zero},
    std::sync::LazyLock,
};

/// The fixed-point scaling factor, 1e18.
pub static WAD: LazyLock<BigInt> = LazyLock::new(|| BigInt::from(1_000_000_000_000_000_000_u64));

/// Multiply with upward rounding: ceil(a * b / WAD).
pub fn mul_up_fixed(a: &BigInt, b: &BigInt) -> BigInt {
    let product = a * b;
    if product.is_zero() {
        return BigInt::zero();
    }
    (&product - 1) / &*WAD + 1
}

/// Multiply with downward rounding: floor(a * b / WAD).
pub fn mul_down_fixed(a: &BigInt, b: &BigInt) -> BigInt {
    let product = a * b;
    product / &*WAD
}

/// Divide with downward rounding: floor(a * WAD / b).
pub fn div_down_fixed(a: &BigInt, b: &BigInt) -> Result<BigInt, Error> {
    if b.is_zero() {
        return Err(Error::ZeroDivision);
    }
    if a.is_zero() {
        return Ok(BigInt::zero());
    }
    Ok(a * &*WAD / b)
}

/// Divide with upward rounding: ceil(a * WAD / b).
pub fn div_up_fixed(a: &BigInt, b: &BigInt) -> Result<BigInt, Error> {
    if b.is_zero() {
        return Err(Error::ZeroDivision);
    }
    if a.is_zero() {
        return Ok(BigInt::zero());
    }
    let a_inflated = a * &*WAD;
    Ok((&a_inflated - 1) / b + 1)
}

/// The complement of a value with respect to one: WAD - a, floored at zero.
pub fn complement(a: &BigInt) -> BigInt {
    if a < &*WAD { &*WAD - a } else { BigInt::zero() }
}

/// Integer square root of a fixed-point value, accurate to within `tolerance`
/// units of the last decimal place.
///
/// Starts from a power-of-two (or table-derived) initial guess and performs
/// exactly 7 Newton steps, then verifies `|guess^2 - x| <= guess * tolerance`.
/// The fixed step count keeps the computation bounded; the tolerance check
/// catches inputs the guess schedule cannot handle.
pub fn sqrt(x: &BigInt, tolerance: u64) -> Result<BigInt, Error> {
    if x.is_zero() {
        return Ok(BigInt::zero());
    }
    if x.is_negative() {
        return Err(Error::SqrtFailed);
    }

    let mut guess = make_initial_guess(x);
    let x_wad = x * &*WAD;

    for _ in 0..7 {
        guess = (&guess + &x_wad / &guess) / 2;
    }

    let guess_squared = mul_down_fixed(&guess, &guess);
    let tolerance_up = mul_up_fixed(&guess, &BigInt::from(tolerance));

    if !(guess_squared <= x + &tolerance_up && guess_squared >= x - &tolerance_up) {
        return Err(Error::SqrtFailed);
    }

    Ok(guess)
}

fn make_initial_guess(x: &BigInt) -> BigInt {
    if x >= &*WAD {
        let shift = int_log2_halved(x / &*WAD);
        (BigInt::from(1) << shift) * &*WAD
    } else {
        // Table of sqrt(1e-17), 1e-16, sqrt(1e-15), ... for sub-one inputs.
        if x <= &BigInt::from(10) {
            BigInt::from(3_162_277_660_u64)
        } else if x <= &BigInt::from(100) {
            BigInt::from(10_000_000_000_u64)
        } else if x <= &BigInt::from(1000) {
            BigInt::from(31_622_776_601_u64)
        } else if x <= &BigInt::from(10_000) {
            BigInt::from(100_000_000_000_u64)
        } else if x <= &BigInt::from(100_000) {
            BigInt::from(316_227_766_016_u64)
        } else if x <= &BigInt::from(1_000_000) {
            BigInt::from(1_000_000_000_000_u64)
        } else if x <= &BigInt::from(10_000_000) {
            BigInt::from(3_162_277_660_168_u64)
        } else if x <= &BigInt::from(100_000_000) {
            BigInt::from(10_000_000_000_000_u64)
        } else if x <= &BigInt::from(1_000_000_000) {
            BigInt::from(31_622_776_601_683_u64)
        } else if x <= &BigInt::from(10_000_000_000_u64) {
            BigInt::from(100_000_000_000_000_u64)
        } else if x <= &BigInt::from(100_000_000_000_u64) {
            BigInt::from(316_227_766_016_837_u64)
        } else if x <= &BigInt::from(1_000_000_000_000_u64) {
            BigInt::from(1_000_000_000_000_000_u64)
        } else if x <= &BigInt::from(10_000_000_000_000_u64) {
            BigInt::from(3_162_277_660_168_379_u64)
        } else if x <= &BigInt::from(100_000_000_000_000_u64) {
            BigInt::from(10_000_000_000_000_000_u64)
        } else if x <= &BigInt::from(1_000_000_000_000_000_u64) {
            BigInt::from(31_622_776_601_683_793_u64)
        } else if x <= &BigInt::from(10_000_000_000_000_000_u64) {
            BigInt::from(100_000_000_000_000_000_u64)
        } else if x <= &BigInt::from(100_000_000_000_000_000_u64) {
            BigInt::from(316_227_766_016_837_933_u64)
        } else {
            x.clone()
        }
    }
}

fn int_log2_halved(mut x: BigInt) -> u32 {
    let mut n = 0u32;

    if x >= BigInt::from(1_u8) << 128 {
        x >>= 128;
        n += 64;
    }
    if x >= BigInt::from(1_u8) << 64 {
        x >>= 64;
        n += 32;
    }
    if x >= BigInt::from(1_u8) << 32 {
        x >>= 32;
        n += 16;
    }
    if x >= BigInt::from(1_u8) << 16 {
        x >>= 16;
        n += 8;
    }
    if x >= BigInt::from(1_u8) << 8 {
        x >>= 8;
        n += 4;
    }
    if x >= BigInt::from(1_u8) << 4 {
        x >>= 4;
        n += 2;
    }
    if x >= BigInt::from(1_u8) << 2 {
        x >>= 2;
        n += 1;
    }
    if x >= BigInt::from(1_u8) << 1 {
        n += 1;
    }

    n
}
