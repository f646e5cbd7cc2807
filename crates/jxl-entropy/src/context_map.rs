//! Context map coding
//!
//! A context map assigns each context the index of the clustered histogram it
//! reads from. Small maps are stored with fixed-width entries; larger ones are
//! themselves entropy coded, optionally after a move-to-front transform.

use crate::decode::{decode_histograms, AnsSymbolReader};
use crate::encode::{build_and_encode_histograms, write_tokens, HistogramParams, Token};
use crate::fields::ceil_log2_nonzero;
use jxl_bitstream::{BitReader, BitWriter};
use jxl_core::{JxlError, JxlResult, MAX_CLUSTERS};
use log::trace;
use std::io::Write;

/// Widest entry the simple form can hold
const MAX_SIMPLE_ENTRY_BITS: u32 = 3;

/// Read a context map for `num_contexts` contexts
///
/// Returns the map and the number of histograms it references.
pub fn decode_context_map(br: &mut BitReader, num_contexts: usize) -> JxlResult<(Vec<u8>, usize)> {
    let mut context_map = vec![0u8; num_contexts];
    if br.read_bit()? {
        let bits_per_entry = br.read_bits(2)? as usize;
        if bits_per_entry != 0 {
            for entry in context_map.iter_mut() {
                *entry = br.read_bits(bits_per_entry)? as u8;
            }
        }
    } else {
        let use_mtf = br.read_bit()?;
        // Maps of two entries may not use LZ77, which bounds the nesting
        let code = decode_histograms(br, 1, num_contexts <= 2)?;
        let mut reader = AnsSymbolReader::new(&code, br, 0)?;
        for entry in context_map.iter_mut() {
            let value = reader.read_hybrid_uint(0, br)?;
            if value as usize >= MAX_CLUSTERS {
                return Err(JxlError::InvalidContextMap(format!(
                    "cluster id {} out of range",
                    value
                )));
            }
            *entry = value as u8;
        }
        reader
            .check_final_state()
            .map_err(|e| JxlError::InvalidContextMap(e.to_string()))?;
        if use_mtf {
            inverse_move_to_front(&mut context_map);
        }
    }

    let num_histograms = context_map.iter().copied().max().map_or(1, |m| m as usize + 1);
    let mut used = vec![false; num_histograms];
    for &entry in &context_map {
        used[entry as usize] = true;
    }
    if let Some(missing) = used.iter().position(|&u| !u) {
        return Err(JxlError::InvalidContextMap(format!(
            "incomplete context map: histogram {} of {} unused",
            missing, num_histograms
        )));
    }
    Ok((context_map, num_histograms))
}

/// Write `context_map`, which references `num_histograms` histograms
pub fn encode_context_map<W: Write>(
    context_map: &[u8],
    num_histograms: usize,
    w: &mut BitWriter<W>,
) -> JxlResult<()> {
    if num_histograms <= 1 {
        w.write_bit(true)?;
        return w.write_bits(0, 2);
    }
    let entry_bits = ceil_log2_nonzero(num_histograms as u32);
    if entry_bits <= MAX_SIMPLE_ENTRY_BITS {
        w.write_bit(true)?;
        w.write_bits(entry_bits as u64, 2)?;
        for &entry in context_map {
            w.write_bits(entry as u64, entry_bits as usize)?;
        }
        return Ok(());
    }

    let transformed = move_to_front(context_map);
    let plain_cost = entropy_coded_cost(context_map)?;
    let mtf_cost = entropy_coded_cost(&transformed)?;
    let use_mtf = mtf_cost < plain_cost;
    trace!(
        "context map of {} entries: {} bits plain, {} bits with MTF",
        context_map.len(),
        plain_cost,
        mtf_cost
    );
    w.write_bit(false)?;
    w.write_bit(use_mtf)?;
    write_entropy_coded(if use_mtf { &transformed } else { context_map }, w)
}

fn write_entropy_coded<W: Write>(entries: &[u8], w: &mut BitWriter<W>) -> JxlResult<()> {
    let params = HistogramParams::new().max_histograms(1);
    let mut streams = vec![entries.iter().map(|&e| Token::new(0, e as u32)).collect::<Vec<_>>()];
    let codes = build_and_encode_histograms(&params, 1, &mut streams, w)?;
    write_tokens(&streams[0], &codes, w)
}

fn entropy_coded_cost(entries: &[u8]) -> JxlResult<usize> {
    let mut sink = BitWriter::new(std::io::sink());
    write_entropy_coded(entries, &mut sink)?;
    Ok(sink.bits_written())
}

fn move_to_front(values: &[u8]) -> Vec<u8> {
    let mut mtf: Vec<u8> = (0..=u8::MAX).collect();
    values
        .iter()
        .map(|&value| {
            // Every byte value is present in the list
            let index = mtf.iter().position(|&m| m == value).unwrap_or(0);
            mtf[..=index].rotate_right(1);
            index as u8
        })
        .collect()
}

fn inverse_move_to_front(values: &mut [u8]) {
    let mut mtf: Vec<u8> = (0..=u8::MAX).collect();
    for value in values.iter_mut() {
        let index = *value as usize;
        *value = mtf[index];
        mtf[..=index].rotate_right(1);
    }
}
