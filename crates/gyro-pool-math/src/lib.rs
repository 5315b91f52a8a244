//! Pool pricing math for Gyroscope constant-liquidity pools (CLPs).
//!
//! This crate implements the numerical core shared by the Gyroscope 2-CLP and
//! 3-CLP pool types: WAD fixed-point arithmetic, the closed-form quadratic
//! invariant of the two-asset pool, a Newton iteration for the three-asset
//! cubic invariant (which has no closed form), and stateful pool wrappers
//! that answer swap queries against live balances.
//!
//! All quantities crossing the crate boundary are 18-decimal fixed-point
//! integers; callers are responsible for fetching on-chain state and for
//! converting results back into transactions. The crate performs no I/O and
//! holds no global state.

pub mod error;
pub mod fixed_point;
pub mod gyro_2clp_math;
pub mod gyro_3clp_math;
pub mod pool;
