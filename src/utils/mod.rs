//! The `utils` module holds pieces shared across the broker: the error type
//! and logging initialization.

pub mod error;
pub mod logging;

pub use error::{BrokerError, Result};
