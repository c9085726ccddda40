//! Connection Management
//!
//! Pool accounting and the lease handle every operation runs its statements on.

pub mod lessee;
pub mod pool;

pub use lessee::*;
pub use pool::*;
