//! Constants shared by the entropy coder

/// log2 of the ANS table size
pub const ANS_LOG_TAB_SIZE: u32 = 12;

/// ANS table size (2^12 = 4096); every ANS histogram sums to this
pub const ANS_TAB_SIZE: u32 = 1 << ANS_LOG_TAB_SIZE;

/// Mask for the slot bits of the ANS state
pub const ANS_TAB_MASK: u32 = ANS_TAB_SIZE - 1;

/// Largest alphabet an ANS histogram may use
pub const ANS_MAX_ALPHABET_SIZE: usize = 256;

/// The ANS state starts at, and must end at, `ANS_SIGNATURE << 16`
pub const ANS_SIGNATURE: u32 = 0x13;

/// Maximum prefix code length; also the `log_alpha_size` of prefix-coded streams
pub const PREFIX_MAX_BITS: u32 = 15;

/// Largest alphabet a prefix code may use
pub const PREFIX_MAX_ALPHABET_SIZE: usize = 1 << PREFIX_MAX_BITS;

/// Maximum number of clustered histograms addressed by a context map
pub const MAX_CLUSTERS: usize = 256;

/// LZ77 sliding window size, in decoded integers
pub const WINDOW_SIZE: usize = 1 << 20;

/// Number of special (dx, dy) distance codes
pub const NUM_SPECIAL_DISTANCES: usize = 120;
