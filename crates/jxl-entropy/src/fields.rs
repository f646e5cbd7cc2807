//! Variable-length integer fields and small bit-math helpers

use jxl_bitstream::{BitReader, BitWriter};
use jxl_core::JxlResult;
use std::io::Write;

/// floor(log2(x)) for non-zero `x`
#[inline]
pub(crate) fn floor_log2_nonzero(x: u32) -> u32 {
    debug_assert!(x != 0);
    31 - x.leading_zeros()
}

/// ceil(log2(x)) for non-zero `x`
#[inline]
pub(crate) fn ceil_log2_nonzero(x: u32) -> u32 {
    let floor = floor_log2_nonzero(x);
    if x.is_power_of_two() {
        floor
    } else {
        floor + 1
    }
}

/// Decodes a number in the range [0..255] from 1 to 11 bits
pub fn read_var_len_u8(br: &mut BitReader) -> JxlResult<u32> {
    read_var_len(br, 3)
}

/// Decodes a number in the range [0..65535] from 1 to 21 bits
pub fn read_var_len_u16(br: &mut BitReader) -> JxlResult<u32> {
    read_var_len(br, 4)
}

fn read_var_len(br: &mut BitReader, nbits_field: usize) -> JxlResult<u32> {
    if !br.read_bit()? {
        return Ok(0);
    }
    let nbits = br.read_bits(nbits_field)? as usize;
    if nbits == 0 {
        return Ok(1);
    }
    Ok(br.read_bits(nbits)? as u32 + (1 << nbits))
}

pub fn write_var_len_u8<W: Write>(value: u32, w: &mut BitWriter<W>) -> JxlResult<()> {
    debug_assert!(value < 256);
    write_var_len(value, 3, w)
}

pub fn write_var_len_u16<W: Write>(value: u32, w: &mut BitWriter<W>) -> JxlResult<()> {
    debug_assert!(value < 65536);
    write_var_len(value, 4, w)
}

fn write_var_len<W: Write>(value: u32, nbits_field: usize, w: &mut BitWriter<W>) -> JxlResult<()> {
    if value == 0 {
        return w.write_bit(false);
    }
    w.write_bit(true)?;
    let nbits = floor_log2_nonzero(value);
    w.write_bits(nbits as u64, nbits_field)?;
    w.write_bits((value - (1 << nbits)) as u64, nbits as usize)
}
