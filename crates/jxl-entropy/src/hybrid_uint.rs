//! Hybrid integer coding
//!
//! An integer is split into an entropy-coded token and a run of raw bits.
//! Values below `2^split_exponent` are their own token. Larger values carry
//! their `msb_in_token` highest bits after the leading one and their
//! `lsb_in_token` lowest bits inside the token; everything in between is
//! written raw.

use crate::fields::{ceil_log2_nonzero, floor_log2_nonzero};
use jxl_bitstream::{BitReader, BitWriter};
use jxl_core::{JxlError, JxlResult};
use std::io::Write;

/// Token/raw-bit split parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HybridUintConfig {
    split_exponent: u32,
    split_token: u32,
    msb_in_token: u32,
    lsb_in_token: u32,
}

impl Default for HybridUintConfig {
    fn default() -> Self {
        Self::new(4, 2, 0)
    }
}

impl HybridUintConfig {
    /// Create a config. Callers must keep `msb + lsb <= split_exponent`.
    pub const fn new(split_exponent: u32, msb_in_token: u32, lsb_in_token: u32) -> Self {
        Self {
            split_exponent,
            split_token: 1 << split_exponent,
            msb_in_token,
            lsb_in_token,
        }
    }

    /// Checked constructor
    pub fn try_new(split_exponent: u32, msb_in_token: u32, lsb_in_token: u32) -> JxlResult<Self> {
        if split_exponent > 31 || msb_in_token + lsb_in_token > split_exponent {
            return Err(JxlError::InvalidHybridUintConfig(format!(
                "split_exponent={} msb={} lsb={}",
                split_exponent, msb_in_token, lsb_in_token
            )));
        }
        Ok(Self::new(split_exponent, msb_in_token, lsb_in_token))
    }

    pub fn split_exponent(&self) -> u32 {
        self.split_exponent
    }

    /// First token that carries raw bits
    pub fn split_token(&self) -> u32 {
        self.split_token
    }

    pub fn msb_in_token(&self) -> u32 {
        self.msb_in_token
    }

    pub fn lsb_in_token(&self) -> u32 {
        self.lsb_in_token
    }

    /// Split `value` into `(token, nbits, bits)`
    pub fn encode(&self, value: u32) -> (u32, u32, u32) {
        if value < self.split_token {
            return (value, 0, 0);
        }
        let n = floor_log2_nonzero(value);
        let m = value - (1 << n);
        let msb = self.msb_in_token;
        let lsb = self.lsb_in_token;
        let token = self.split_token
            + ((n - self.split_exponent) << (msb + lsb))
            + ((m >> (n - msb)) << lsb)
            + (m & ((1 << lsb) - 1));
        let nbits = n - msb - lsb;
        let bits = (value >> lsb) & ((1u64 << nbits) - 1) as u32;
        (token, nbits, bits)
    }

    /// Number of raw bits that follow `token`; masked to 5 bits
    #[inline]
    pub fn raw_bits_for_token(&self, token: u32) -> u32 {
        if token < self.split_token {
            return 0;
        }
        let msb = self.msb_in_token;
        let lsb = self.lsb_in_token;
        let nbits = (self.split_exponent - (msb + lsb))
            .wrapping_add((token - self.split_token) >> (msb + lsb));
        nbits & 31
    }

    /// Read the raw bits following `token` and rebuild the integer
    #[inline]
    pub fn decode(&self, token: u32, br: &mut BitReader) -> JxlResult<u32> {
        if token < self.split_token {
            return Ok(token);
        }
        let nbits = self.raw_bits_for_token(token);
        let bits = br.read_bits(nbits as usize)? as u32;
        Ok(self.reconstruct(token, nbits, bits))
    }

    /// Rebuild an integer from a token and its raw bits
    #[inline]
    pub fn reconstruct(&self, token: u32, nbits: u32, bits: u32) -> u32 {
        if token < self.split_token {
            return token;
        }
        let msb = self.msb_in_token;
        let lsb = self.lsb_in_token;
        let low = token & ((1 << lsb) - 1);
        let token = token >> lsb;
        let high = (1u32 << msb) | (token & ((1 << msb) - 1));
        let ret = ((high as u64) << nbits) | bits as u64;
        ((ret << lsb) | low as u64) as u32
    }

    /// Read a config for an alphabet of `2^log_alpha_size` symbols
    pub fn read(log_alpha_size: u32, br: &mut BitReader) -> JxlResult<Self> {
        let split_exponent = br.read_bits(ceil_log2_nonzero(log_alpha_size + 1) as usize)? as u32;
        let mut msb_in_token = 0;
        let mut lsb_in_token = 0;
        if split_exponent != log_alpha_size {
            let nbits = ceil_log2_nonzero(split_exponent + 1) as usize;
            msb_in_token = br.read_bits(nbits)? as u32;
            if msb_in_token > split_exponent {
                return Err(JxlError::InvalidHybridUintConfig(format!(
                    "msb_in_token {} exceeds split_exponent {}",
                    msb_in_token, split_exponent
                )));
            }
            let nbits = ceil_log2_nonzero(split_exponent - msb_in_token + 1) as usize;
            lsb_in_token = br.read_bits(nbits)? as u32;
        }
        if msb_in_token + lsb_in_token > split_exponent {
            return Err(JxlError::InvalidHybridUintConfig(format!(
                "msb_in_token {} + lsb_in_token {} exceeds split_exponent {}",
                msb_in_token, lsb_in_token, split_exponent
            )));
        }
        Ok(Self::new(split_exponent, msb_in_token, lsb_in_token))
    }

    /// Write the config in the layout `read` expects
    pub fn write<W: Write>(&self, log_alpha_size: u32, w: &mut BitWriter<W>) -> JxlResult<()> {
        w.write_bits(
            self.split_exponent as u64,
            ceil_log2_nonzero(log_alpha_size + 1) as usize,
        )?;
        if self.split_exponent != log_alpha_size {
            w.write_bits(
                self.msb_in_token as u64,
                ceil_log2_nonzero(self.split_exponent + 1) as usize,
            )?;
            w.write_bits(
                self.lsb_in_token as u64,
                ceil_log2_nonzero(self.split_exponent - self.msb_in_token + 1) as usize,
            )?;
        }
        Ok(())
    }
}

/// Map a signed value onto token space: 0, -1, 1, -2, 2, ... become 0, 1, 2, 3, 4, ...
#[inline]
pub const fn pack_signed(value: i32) -> u32 {
    ((value as u32) << 1) ^ ((value >> 31) as u32)
}

/// Inverse of [`pack_signed`]
#[inline]
pub const fn unpack_signed(value: u32) -> i32 {
    ((value >> 1) as i32) ^ -((value & 1) as i32)
}
