//! Stateful pool wrappers over the CLP math modules.
//!
//! A pool wrapper owns per-token balances in both native-decimals and
//! 18-decimals representation, resolves token addresses to stable indices,
//! applies Balancer swap-fee semantics, and calls into the math modules with
//! freshly derived invariants on every query. Queries take `&self`; the
//! `_mut` variants additionally apply the swap to the held balances so a
//! sequence of swaps along a path can be simulated on one pool object.
//! Nothing here is synchronized; sharing a wrapper mutably across threads is
//! the caller's problem.

mod gyro_2clp;
mod gyro_3clp;

pub use self::{gyro_2clp::Gyro2CLPPool, gyro_3clp::Gyro3CLPPool};

use {
    crate::{
        error::Error,
        fixed_point::{WAD, complement, div_up_fixed, mul_down_fixed, mul_up_fixed},
    },
    ethereum_types::{H160, U256},
    num::{BigInt, bigint::Sign},
};

/// Safety margin applied below the theoretical swap limits, keeping queries
/// away from the edge of the curve's domain where fixed-point error
/// dominates. Protocol-defined constant, 0.999999.
pub static SWAP_LIMIT_FACTOR: std::sync::LazyLock<BigInt> =
    std::sync::LazyLock::new(|| BigInt::from(999_999_000_000_000_000_u64));

/// The direction a swap amount is quoted in.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SwapKind {
    /// The input amount is fixed; the output is computed.
    GivenIn,
    /// The output amount is fixed; the input is computed.
    GivenOut,
}

/// Rounding direction used when converting between native decimals and the
/// 18-decimal representation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Rounding {
    RoundDown,
    RoundUp,
}

/// Raw per-token pool state as supplied by a data-fetching layer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TokenState {
    pub token: H160,
    pub decimals: u8,
    pub balance: U256,
}

/// A token amount held in both representations: the token's native decimals
/// and the 18-decimal scaling all pool math operates on.
///
/// The two representations are kept in sync through every mutation:
/// `scale18 = amount * 10^(18 - decimals)`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TokenAmount {
    amount: U256,
    scale18: BigInt,
    decimals: u8,
}

impl TokenAmount {
    /// Creates an amount from a native-decimals value. Only tokens with up
    /// to 18 decimals are supported.
    pub fn from_raw_amount(amount: U256, decimals: u8) -> Result<Self, Error> {
        if decimals > 18 {
            return Err(Error::InvalidPoolParameters);
        }
        let scale18 = u256_to_big_int(&amount) * scaling_factor(decimals);
        Ok(Self {
            amount,
            scale18,
            decimals,
        })
    }

    /// Creates an amount from an 18-decimal value, downscaling to native
    /// decimals in the given direction.
    pub fn from_scale18_amount(
        scale18: BigInt,
        decimals: u8,
        rounding: Rounding,
    ) -> Result<Self, Error> {
        if decimals > 18 || scale18 < BigInt::from(0) {
            return Err(Error::InvalidPoolParameters);
        }
        let factor = scaling_factor(decimals);
        let amount = match rounding {
            Rounding::RoundDown => &scale18 / &factor,
            Rounding::RoundUp => (&scale18 + &factor - 1) / &factor,
        };
        let amount = big_int_to_u256(&amount)?;
        // Re-derive so the invariant between the two representations holds
        // even when the downscale dropped sub-native precision.
        Self::from_raw_amount(amount, decimals)
    }

    /// The amount in the token's native decimals.
    pub fn amount(&self) -> U256 {
        self.amount
    }

    /// The amount upscaled to 18 decimals.
    pub fn scale18(&self) -> &BigInt {
        &self.scale18
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    /// Adds a native-decimals amount, keeping both representations in sync.
    pub fn increase(&mut self, amount: U256) -> Result<(), Error> {
        let raised = self
            .amount
            .checked_add(amount)
            .ok_or(Error::BalanceOutOfBounds)?;
        *self = Self::from_raw_amount(raised, self.decimals)?;
        Ok(())
    }

    /// Subtracts a native-decimals amount; draining below zero is an asset
    /// bounds violation.
    pub fn decrease(&mut self, amount: U256) -> Result<(), Error> {
        let lowered = self
            .amount
            .checked_sub(amount)
            .ok_or(Error::AssetBoundsExceeded)?;
        *self = Self::from_raw_amount(lowered, self.decimals)?;
        Ok(())
    }
}

/// A pool-registered token: its address and live balance, addressed by a
/// stable index assigned at pool construction.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PoolToken {
    pub token: H160,
    pub index: usize,
    pub balance: TokenAmount,
}

impl PoolToken {
    fn new(index: usize, state: &TokenState) -> Result<Self, Error> {
        Ok(Self {
            token: state.token,
            index,
            balance: TokenAmount::from_raw_amount(state.balance, state.decimals)?,
        })
    }
}

/// Subtracts the swap fee from a fixed input amount, rounding the fee up so
/// it never undercharges.
pub fn subtract_swap_fee_amount(
    amount: &TokenAmount,
    swap_fee: &BigInt,
) -> Result<TokenAmount, Error> {
    let raw = u256_to_big_int(&amount.amount);
    let fee_amount = mul_up_fixed(&raw, swap_fee);
    let less_fee = big_int_to_u256(&(&raw - &fee_amount))?;
    TokenAmount::from_raw_amount(less_fee, amount.decimals)
}

/// Grosses a computed input amount up by the swap fee, rounding up so the
/// trader pays at least the true fee.
pub fn add_swap_fee_amount(
    amount: &TokenAmount,
    swap_fee: &BigInt,
) -> Result<TokenAmount, Error> {
    let raw = u256_to_big_int(&amount.amount);
    let with_fee = div_up_fixed(&raw, &complement(swap_fee))?;
    TokenAmount::from_raw_amount(big_int_to_u256(&with_fee)?, amount.decimals)
}

/// Validates a swap fee supplied at pool construction.
pub(crate) fn validate_swap_fee(swap_fee: &BigInt) -> Result<(), Error> {
    if swap_fee < &BigInt::from(0) || swap_fee > &*WAD {
        return Err(Error::InvalidPoolParameters);
    }
    Ok(())
}

/// Applies the swap-limit safety factor, flooring negative headroom at zero.
pub(crate) fn apply_limit_factor(amount: &BigInt) -> BigInt {
    if amount <= &BigInt::from(0) {
        return BigInt::from(0);
    }
    mul_down_fixed(amount, &SWAP_LIMIT_FACTOR)
}

pub(crate) fn scaling_factor(decimals: u8) -> BigInt {
    BigInt::from(10_u8).pow(u32::from(18 - decimals))
}

pub(crate) fn u256_to_big_int(value: &U256) -> BigInt {
    let mut bytes = [0_u8; 32];
    value.to_big_endian(&mut bytes);
    BigInt::from_bytes_be(Sign::Plus, &bytes)
}

pub(crate) fn big_int_to_u256(value: &BigInt) -> Result<U256, Error> {
    let (sign, bytes) = value.to_bytes_be();
    if sign == Sign::Minus || bytes.len() > 32 {
        return Err(Error::BalanceOutOfBounds);
    }
    Ok(U256::from_big_endian(&bytes))
}
