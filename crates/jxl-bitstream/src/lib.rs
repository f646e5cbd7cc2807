//! Bitstream reading and writing for JPEG XL
//!
//! This crate provides the LSB-first bit reader and writer consumed by the
//! entropy coder, plus the `U32` field distributions used by header fields.

pub mod bitreader;
pub mod bitwriter;
pub mod fields;

pub use bitreader::BitReader;
pub use bitwriter::BitWriter;
pub use fields::U32Dist;
