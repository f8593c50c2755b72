//! # Error Types
//!
//! All errors that can occur while building or applying scene changes.

use thiserror::Error;

/// Errors that can occur in the scene pipeline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TerrellaError {
    /// Malformed or empty input where that is not a documented no-op.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation against a torn-down scene or manager.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// A renderer resource could not be allocated.
    #[error("allocation failure: {resource} limit of {limit} reached")]
    AllocationFailure {
        /// The kind of resource that ran out.
        resource: &'static str,
        /// The configured limit.
        limit: usize,
    },

    /// Invalid configuration file or value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The operating system refused to start a worker thread.
    #[error("failed to spawn thread: {0}")]
    ThreadSpawn(String),
}

/// Result type for scene operations.
pub type TerrellaResult<T> = Result<T, TerrellaError>;
