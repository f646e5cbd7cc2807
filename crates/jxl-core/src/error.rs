//! Error types for JPEG XL entropy coding

use thiserror::Error;

/// Result type for JPEG XL operations
pub type JxlResult<T> = Result<T, JxlError>;

/// Errors that can occur while reading or writing entropy-coded streams
#[derive(Error, Debug)]
pub enum JxlError {
    #[error("Unexpected end of stream: needed {needed} bits, {available} available")]
    UnexpectedEof { needed: usize, available: usize },

    #[error("Invalid histogram: {0}")]
    InvalidHistogram(String),

    #[error("Invalid prefix code: {0}")]
    InvalidPrefixCode(String),

    #[error("Invalid context map: {0}")]
    InvalidContextMap(String),

    #[error("Invalid HybridUintConfig: {0}")]
    InvalidHybridUintConfig(String),

    #[error("Alphabet size {size} exceeds maximum {max}")]
    AlphabetTooLarge { size: usize, max: usize },

    #[error("LZ77 used where it is explicitly disallowed")]
    Lz77Disallowed,

    #[error("ANS final state mismatch: expected {expected:#x}, got {actual:#x}")]
    FinalStateMismatch { expected: u32, actual: u32 },

    #[error("Encoding error: {0}")]
    EncodingError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}
