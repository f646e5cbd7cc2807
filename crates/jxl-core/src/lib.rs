//! Core types and constants for the JPEG XL entropy coder
//!
//! This crate provides the error type and the numeric constants shared by the
//! bitstream and entropy-coding crates.

pub mod consts;
pub mod error;

pub use consts::*;
pub use error::{JxlError, JxlResult};
