//! Bitstream reader implementation

use crate::fields::U32Dist;
use jxl_core::{JxlError, JxlResult};

/// Bits kept available in the buffer after a refill
const REFILL_BITS: usize = 56;

/// A bitstream reader for reading LSB-first bit fields from a byte slice
///
/// Peeking past the end of the data yields zero bits; consuming past the end
/// is an error.
pub struct BitReader<'a> {
    data: &'a [u8],
    next_byte: usize,
    buffer: u64,
    bits_in_buffer: usize,
    bits_consumed: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            next_byte: 0,
            buffer: 0,
            bits_in_buffer: 0,
            bits_consumed: 0,
        }
    }

    /// Make sure at least 56 bits are buffered for subsequent peeks
    #[inline]
    pub fn refill(&mut self) {
        while self.bits_in_buffer <= REFILL_BITS {
            let byte = self.data.get(self.next_byte).copied().unwrap_or(0);
            self.next_byte += 1;
            self.buffer |= (byte as u64) << self.bits_in_buffer;
            self.bits_in_buffer += 8;
        }
    }

    /// Look at the next `num_bits` (at most 56) without consuming them
    #[inline]
    pub fn peek_bits(&mut self, num_bits: usize) -> u64 {
        debug_assert!(num_bits <= REFILL_BITS);
        if self.bits_in_buffer < num_bits {
            self.refill();
        }
        self.buffer & mask(num_bits)
    }

    /// Drop `num_bits` (at most 56) previously peeked bits
    #[inline]
    pub fn consume(&mut self, num_bits: usize) -> JxlResult<()> {
        debug_assert!(num_bits <= REFILL_BITS);
        let available = self.total_bits() - self.bits_consumed;
        if num_bits > available {
            return Err(JxlError::UnexpectedEof {
                needed: num_bits,
                available,
            });
        }
        if self.bits_in_buffer < num_bits {
            self.refill();
        }
        self.buffer >>= num_bits;
        self.bits_in_buffer -= num_bits;
        self.bits_consumed += num_bits;
        Ok(())
    }

    /// Read up to 64 bits from the stream
    pub fn read_bits(&mut self, num_bits: usize) -> JxlResult<u64> {
        if num_bits > 64 {
            return Err(JxlError::InvalidParameter(
                "Cannot read more than 64 bits at once".to_string(),
            ));
        }
        if num_bits > 32 {
            let low = self.read_bits(32)?;
            let high = self.read_bits(num_bits - 32)?;
            return Ok(low | (high << 32));
        }
        let value = self.peek_bits(num_bits);
        self.consume(num_bits)?;
        Ok(value)
    }

    /// Read a single bit
    pub fn read_bit(&mut self) -> JxlResult<bool> {
        self.read_bits(1).map(|b| b != 0)
    }

    /// Read a `U32` field: 2-bit selector, then the selected alternative
    pub fn read_u32(&mut self, dists: &[U32Dist; 4]) -> JxlResult<u32> {
        let selector = self.read_bits(2)? as usize;
        match dists[selector] {
            U32Dist::Val(value) => Ok(value),
            U32Dist::BitsOffset { bits, offset } => {
                let extra = self.read_bits(bits as usize)? as u32;
                Ok(offset.wrapping_add(extra))
            }
        }
    }

    /// Skip an arbitrary number of bits
    pub fn skip_bits(&mut self, num_bits: usize) -> JxlResult<()> {
        let available = self.total_bits() - self.bits_consumed;
        if num_bits > available {
            return Err(JxlError::UnexpectedEof {
                needed: num_bits,
                available,
            });
        }
        if num_bits <= self.bits_in_buffer {
            self.buffer = if num_bits >= 64 {
                0
            } else {
                self.buffer >> num_bits
            };
            self.bits_in_buffer -= num_bits;
            self.bits_consumed += num_bits;
            return Ok(());
        }
        let remaining = num_bits - self.bits_in_buffer;
        self.bits_consumed += self.bits_in_buffer;
        self.buffer = 0;
        self.bits_in_buffer = 0;
        self.next_byte += remaining / 8;
        self.bits_consumed += remaining / 8 * 8;
        self.consume(remaining % 8)
    }

    /// Skip to byte boundary
    pub fn align_to_byte(&mut self) -> JxlResult<()> {
        let bits_to_skip = (8 - self.bits_consumed % 8) % 8;
        self.skip_bits(bits_to_skip)
    }

    /// Number of bits consumed so far
    pub fn total_bits_consumed(&self) -> usize {
        self.bits_consumed
    }

    /// Size of the underlying data in bytes
    pub fn total_bytes(&self) -> usize {
        self.data.len()
    }

    /// The whole underlying byte slice, for byte-aligned sub-bitstreams
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    fn total_bits(&self) -> usize {
        self.data.len() * 8
    }
}

#[inline]
fn mask(num_bits: usize) -> u64 {
    if num_bits >= 64 {
        u64::MAX
    } else {
        (1u64 << num_bits) - 1
    }
}
