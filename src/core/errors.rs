/*!
 * Error Types
 * Centralized error handling with thiserror and serde support
 */

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Allocator operation result
pub type AllocResult<T> = Result<T, AllocError>;

/// Allocator errors with serialization support
///
/// Every variant carries a message identifying the manager or policy that
/// raised it.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum AllocError {
    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    #[error("Out of range: {0}")]
    OutOfRange(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Null pointer: {0}")]
    NullPointer(String),

    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

impl AllocError {
    /// Stale-handle error shared by every generation-checked operation
    pub fn stale_handle(component: &str) -> Self {
        AllocError::InvalidState(format!("{component}: stale handle"))
    }
}
