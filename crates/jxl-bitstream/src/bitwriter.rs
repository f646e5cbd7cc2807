//! Bitstream writer implementation

use crate::fields::U32Dist;
use jxl_core::{JxlError, JxlResult};
use std::io::Write;

/// A bitstream writer for writing LSB-first bit fields to a byte stream
///
/// Writing into [`std::io::sink`] turns the writer into a bit counter, which
/// the encoder uses to cost alternative representations.
pub struct BitWriter<W: Write> {
    writer: W,
    buffer: u64,
    bits_in_buffer: usize,
    bits_written: usize,
}

impl<W: Write> BitWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            buffer: 0,
            bits_in_buffer: 0,
            bits_written: 0,
        }
    }

    /// Write up to 56 bits to the stream
    pub fn write_bits(&mut self, value: u64, num_bits: usize) -> JxlResult<()> {
        if num_bits > 56 {
            if num_bits > 64 {
                return Err(JxlError::InvalidParameter(
                    "Cannot write more than 64 bits at once".to_string(),
                ));
            }
            self.write_bits(value & 0xFFFF_FFFF, 32)?;
            return self.write_bits(value >> 32, num_bits - 32);
        }

        let mask = (1u64 << num_bits) - 1;
        self.buffer |= (value & mask) << self.bits_in_buffer;
        self.bits_in_buffer += num_bits;
        self.bits_written += num_bits;

        // Flush complete bytes
        while self.bits_in_buffer >= 8 {
            self.writer.write_all(&[(self.buffer & 0xFF) as u8])?;
            self.buffer >>= 8;
            self.bits_in_buffer -= 8;
        }

        Ok(())
    }

    /// Write a single bit
    pub fn write_bit(&mut self, value: bool) -> JxlResult<()> {
        self.write_bits(value as u64, 1)
    }

    /// Write a `U32` field using the first alternative that can hold `value`
    pub fn write_u32(&mut self, value: u32, dists: &[U32Dist; 4]) -> JxlResult<()> {
        let selector = dists
            .iter()
            .position(|d| d.covers(value))
            .ok_or_else(|| {
                JxlError::InvalidParameter(format!(
                    "Value {} not representable by U32 distribution {:?}",
                    value, dists
                ))
            })?;
        self.write_bits(selector as u64, 2)?;
        if let U32Dist::BitsOffset { bits, offset } = dists[selector] {
            self.write_bits((value - offset) as u64, bits as usize)?;
        }
        Ok(())
    }

    /// Align to byte boundary by writing zero bits
    pub fn align_to_byte(&mut self) -> JxlResult<()> {
        let bits_to_write = (8 - (self.bits_in_buffer % 8)) % 8;
        if bits_to_write > 0 {
            self.write_bits(0, bits_to_write)?;
        }
        Ok(())
    }

    /// Total number of bits written so far, excluding flush padding
    pub fn bits_written(&self) -> usize {
        self.bits_written
    }

    /// Flush remaining bits and the underlying writer
    pub fn flush(&mut self) -> JxlResult<()> {
        if self.bits_in_buffer > 0 {
            self.writer.write_all(&[(self.buffer & 0xFF) as u8])?;
            self.buffer = 0;
            self.bits_in_buffer = 0;
        }
        self.writer.flush()?;
        Ok(())
    }
}

impl<W: Write> Drop for BitWriter<W> {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}
