//! Error codes shared by the fixed-point helpers, the pool math and the pool
//! wrappers. Display strings follow the Balancer contract revert-reason
//! convention so failures can be matched against reference fixtures.

/// An error code for a failed pool math operation.
#[derive(Copy, Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    /// One of the tokens passed to a pool query is not part of the pool's
    /// token set.
    #[error("POOL_DOES_NOT_CONTAIN_TOKENS_PROVIDED")]
    TokenNotRegistered,
    /// Fixed-point division by zero.
    #[error("ZERO_DIVISION")]
    ZeroDivision,
    /// A pool was constructed with parameters outside the supported domain
    /// (fee above one, inverted price bounds, unsupported token decimals,
    /// duplicate tokens).
    #[error("INVALID_POOL_PARAMETERS")]
    InvalidPoolParameters,
    /// A requested swap amount would push a balance outside the feasible
    /// range of the trading curve. The caller must retry with a smaller
    /// amount; the pool state is untouched.
    #[error("ASSET_BOUNDS_EXCEEDED")]
    AssetBoundsExceeded,
    /// A balance or invariant exceeds the magnitude the integer pipeline is
    /// calibrated for.
    #[error("BALANCE_OUT_OF_BOUNDS")]
    BalanceOutOfBounds,
    /// The integer square root did not land within the requested tolerance.
    #[error("SQRT_FAILED")]
    SqrtFailed,
    /// The Newton iteration for the 3-CLP invariant hit its step ceiling
    /// without satisfying any stopping criterion. Indicates pathological
    /// pool parameters; never silently approximated.
    #[error("INVARIANT_DIDNT_CONVERGE")]
    InvariantDidntConverge,
}
