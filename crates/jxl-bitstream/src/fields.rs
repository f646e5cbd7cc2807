//! Field distributions for 2-bit-selector `U32` fields

/// One of the four alternatives of a `U32` field
///
/// A `U32` field is coded as a 2-bit selector followed by whatever the
/// selected alternative needs: nothing for `Val`, or `bits` raw bits added to
/// `offset` for `BitsOffset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum U32Dist {
    Val(u32),
    BitsOffset { bits: u32, offset: u32 },
}

impl U32Dist {
    pub const fn val(value: u32) -> Self {
        U32Dist::Val(value)
    }

    pub const fn bits_offset(bits: u32, offset: u32) -> Self {
        U32Dist::BitsOffset { bits, offset }
    }

    /// Whether `value` is representable by this alternative
    pub fn covers(&self, value: u32) -> bool {
        match *self {
            U32Dist::Val(v) => v == value,
            U32Dist::BitsOffset { bits, offset } => {
                value >= offset && ((value - offset) as u64) < (1u64 << bits)
            }
        }
    }
}
