//! Error types for class-file emission

use thiserror::Error;

/// Result type for classforge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building a class file
#[derive(Error, Debug)]
pub enum Error {
    #[error("constant pool overflow: {count} entries exceed the 65535 index limit")]
    PoolOverflow { count: u32 },

    #[error("class writer not ready for emission: {message}")]
    MissingDescription { message: String },

    #[error("constant kind not representable here: {kind}")]
    UnsupportedConstant { kind: &'static str },

    #[error("malformed constant pool in source class at offset {offset}")]
    Truncated { offset: usize },
}

impl Error {
    /// Create an emission-precondition error
    pub fn missing_description(message: impl Into<String>) -> Self {
        Self::MissingDescription { message: message.into() }
    }
}
