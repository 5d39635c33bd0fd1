//! Common module
//!
//! This module contains shared errors and utility functions used throughout the crate.

pub mod error;
pub mod log;

// Re-export commonly used types and functions
pub use self::error::{Result, ServiceError};
pub use self::log::init_logger;
