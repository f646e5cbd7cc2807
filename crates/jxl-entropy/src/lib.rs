//! Entropy coding for JPEG XL
//!
//! This crate implements the histogram-based entropy coder shared by JPEG XL
//! bitstream sections:
//! - Hybrid integer tokenization
//! - ANS with alias-table lookup, or canonical prefix codes
//! - Histogram and context map serialization
//! - LZ77 back references over decoded integers
//!
//! Decoding starts with [`decode_histograms`]; the resulting [`AnsCode`] is
//! shared by any number of [`AnsSymbolReader`]s. Encoding goes through
//! [`build_and_encode_histograms`] and [`write_tokens`].

pub mod alias;
pub mod cluster;
pub mod context_map;
pub mod decode;
pub mod encode;
pub mod fields;
pub mod histogram;
pub mod hybrid_uint;
pub mod lz77;
pub mod prefix;

pub use decode::{decode_histograms, AnsCode, AnsSymbolReader};
pub use encode::{
    build_and_encode_histograms, write_tokens, EntropyEncodingData, EntropyMethod,
    HistogramParams, Token, UintMethod,
};
pub use histogram::{create_flat_histogram, read_histogram};
pub use hybrid_uint::{pack_signed, unpack_signed, HybridUintConfig};
pub use lz77::{Lz77Method, Lz77Params};
