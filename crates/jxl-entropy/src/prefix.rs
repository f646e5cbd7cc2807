//! Canonical prefix codes in the Brotli tree layout
//!
//! Codes are read LSB-first, so every canonical codeword is stored bit
//! reversed. Lookup uses an 8-bit root table; longer codes continue into a
//! second-level table whose offset is kept in the root entry.

use crate::fields::ceil_log2_nonzero;
use jxl_bitstream::{BitReader, BitWriter};
use jxl_core::{JxlError, JxlResult, PREFIX_MAX_BITS};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::io::Write;

const ROOT_BITS: u32 = 8;

const CODE_LENGTH_CODES: usize = 18;
const CODE_LENGTH_ORDER: [usize; CODE_LENGTH_CODES] =
    [1, 2, 3, 4, 0, 5, 17, 6, 16, 7, 8, 9, 10, 11, 12, 13, 14, 15];
const MAX_CODE_LENGTH_CODE_BITS: u32 = 5;

/// Fixed prefix code for the code-length code lengths, indexed by 4 peeked bits
const CODE_LENGTH_PREFIX_LENGTH: [u8; 16] = [2, 2, 2, 3, 2, 2, 2, 4, 2, 2, 2, 3, 2, 2, 2, 4];
const CODE_LENGTH_PREFIX_VALUE: [u8; 16] = [0, 4, 3, 2, 0, 4, 3, 1, 0, 4, 3, 2, 0, 4, 3, 5];

/// The same code from the writer's side, indexed by length: `(bits, nbits)`
const CODE_LENGTH_PREFIX_CODE: [(u8, u8); 6] = [(0, 2), (7, 4), (3, 3), (2, 2), (1, 2), (15, 4)];

const REPEAT_PREVIOUS: u8 = 16;
const REPEAT_ZERO: u8 = 17;
const INITIAL_REPEATED_LENGTH: u8 = 8;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct TableEntry {
    /// Bits to consume; above `ROOT_BITS` in a root entry, a link to a subtable
    bits: u8,
    /// Symbol, or the subtable offset for links
    value: u16,
}

/// Decoding table of one prefix code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixCode {
    table: Vec<TableEntry>,
}

impl PrefixCode {
    /// A zero-bit code that always yields `symbol`
    pub fn single(symbol: u16) -> Self {
        Self {
            table: vec![
                TableEntry {
                    bits: 0,
                    value: symbol
                };
                1 << ROOT_BITS
            ],
        }
    }

    /// Read a code over `alphabet_size` symbols
    pub fn read(alphabet_size: usize, br: &mut BitReader) -> JxlResult<Self> {
        if alphabet_size <= 1 {
            return Ok(Self::single(0));
        }
        let hskip = br.read_bits(2)? as usize;
        let lengths = if hskip == 1 {
            read_simple_lengths(alphabet_size, br)?
        } else {
            read_complex_lengths(alphabet_size, hskip, br)?
        };
        Ok(Self {
            table: build_table(&lengths, ROOT_BITS)?,
        })
    }

    /// Decode one symbol
    #[inline]
    pub fn read_symbol(&self, br: &mut BitReader) -> JxlResult<u32> {
        let bits = br.peek_bits(PREFIX_MAX_BITS as usize) as usize;
        let entry = self.table[bits & ((1 << ROOT_BITS) - 1)];
        if entry.bits as u32 <= ROOT_BITS {
            br.consume(entry.bits as usize)?;
            return Ok(entry.value as u32);
        }
        br.consume(ROOT_BITS as usize)?;
        let sub_bits = entry.bits as u32 - ROOT_BITS;
        let index = entry.value as usize + ((bits >> ROOT_BITS) & ((1 << sub_bits) - 1));
        let entry = self.table[index];
        br.consume(entry.bits as usize)?;
        Ok(entry.value as u32)
    }
}

fn read_simple_lengths(alphabet_size: usize, br: &mut BitReader) -> JxlResult<Vec<u8>> {
    let max_bits = ceil_log2_nonzero(alphabet_size as u32) as usize;
    let num_symbols = br.read_bits(2)? as usize + 1;
    let mut symbols = [0usize; 4];
    for i in 0..num_symbols {
        let symbol = br.read_bits(max_bits)? as usize;
        if symbol >= alphabet_size {
            return Err(JxlError::InvalidPrefixCode(format!(
                "symbol {} outside alphabet of {}",
                symbol, alphabet_size
            )));
        }
        if symbols[..i].contains(&symbol) {
            return Err(JxlError::InvalidPrefixCode(format!(
                "symbol {} listed twice",
                symbol
            )));
        }
        symbols[i] = symbol;
    }
    let template: &[u8] = match num_symbols {
        1 => &[0],
        2 => &[1, 1],
        3 => &[1, 2, 2],
        _ => {
            if br.read_bit()? {
                &[1, 2, 3, 3]
            } else {
                &[2, 2, 2, 2]
            }
        }
    };
    let mut lengths = vec![0u8; alphabet_size];
    if num_symbols == 1 {
        // Marks the only symbol; `build_table` turns it into a zero-bit code
        lengths[symbols[0]] = 1;
    } else {
        for (&symbol, &len) in symbols.iter().zip(template) {
            lengths[symbol] = len;
        }
    }
    Ok(lengths)
}

fn read_complex_lengths(
    alphabet_size: usize,
    hskip: usize,
    br: &mut BitReader,
) -> JxlResult<Vec<u8>> {
    let mut code_length_lengths = [0u8; CODE_LENGTH_CODES];
    let mut space: i32 = 32;
    let mut num_codes = 0;
    for &symbol in &CODE_LENGTH_ORDER[hskip..] {
        let idx = br.peek_bits(4) as usize;
        br.consume(CODE_LENGTH_PREFIX_LENGTH[idx] as usize)?;
        let len = CODE_LENGTH_PREFIX_VALUE[idx];
        code_length_lengths[symbol] = len;
        if len != 0 {
            space -= 32 >> len;
            num_codes += 1;
            if space <= 0 {
                break;
            }
        }
    }
    if num_codes != 1 && space != 0 {
        return Err(JxlError::InvalidPrefixCode(
            "code length code is not complete".to_string(),
        ));
    }
    let code_length_table = build_table(&code_length_lengths, MAX_CODE_LENGTH_CODE_BITS)?;

    let mut lengths = vec![0u8; alphabet_size];
    let mut symbol = 0;
    let mut prev_len = INITIAL_REPEATED_LENGTH;
    let mut repeat: usize = 0;
    let mut repeat_len = 0u8;
    let mut space: i32 = 1 << PREFIX_MAX_BITS;
    while symbol < alphabet_size && space > 0 {
        let idx = br.peek_bits(MAX_CODE_LENGTH_CODE_BITS as usize) as usize;
        let entry = code_length_table[idx];
        br.consume(entry.bits as usize)?;
        let code = entry.value as u8;
        if code < REPEAT_PREVIOUS {
            repeat = 0;
            lengths[symbol] = code;
            if code != 0 {
                prev_len = code;
                space -= (1 << PREFIX_MAX_BITS) >> code;
            }
            symbol += 1;
            continue;
        }

        let (extra_bits, new_len) = if code == REPEAT_PREVIOUS {
            (2, prev_len)
        } else {
            (3, 0)
        };
        if repeat_len != new_len {
            repeat = 0;
            repeat_len = new_len;
        }
        let old_repeat = repeat;
        if repeat > 0 {
            repeat = (repeat - 2) << extra_bits;
        }
        repeat += br.read_bits(extra_bits)? as usize + 3;
        let delta = repeat - old_repeat;
        if symbol + delta > alphabet_size {
            return Err(JxlError::InvalidPrefixCode(format!(
                "repeat of {} runs past alphabet of {}",
                delta, alphabet_size
            )));
        }
        lengths[symbol..symbol + delta].fill(repeat_len);
        symbol += delta;
        if repeat_len != 0 {
            space -= (delta as i32) << (PREFIX_MAX_BITS - repeat_len as u32);
        }
    }
    if space != 0 {
        return Err(JxlError::InvalidPrefixCode(format!(
            "code lengths leave {} of the code space unused",
            space
        )));
    }
    Ok(lengths)
}

/// Canonical codewords for `lengths`, bit reversed for LSB-first output
fn canonical_codes(lengths: &[u8]) -> Vec<u16> {
    let mut bl_count = [0u16; PREFIX_MAX_BITS as usize + 1];
    for &len in lengths {
        if len > 0 {
            bl_count[len as usize] += 1;
        }
    }
    let mut next_code = [0u16; PREFIX_MAX_BITS as usize + 2];
    let mut code = 0u16;
    for len in 1..=PREFIX_MAX_BITS as usize {
        code = (code + bl_count[len - 1]) << 1;
        next_code[len] = code;
    }
    lengths
        .iter()
        .map(|&len| {
            if len == 0 {
                return 0;
            }
            let code = next_code[len as usize];
            next_code[len as usize] += 1;
            code.reverse_bits() >> (16 - len as u32)
        })
        .collect()
}

fn build_table(lengths: &[u8], root_bits: u32) -> JxlResult<Vec<TableEntry>> {
    let root_size = 1usize << root_bits;
    let mut used = lengths.iter().enumerate().filter(|(_, &len)| len > 0);
    let first = used
        .next()
        .ok_or_else(|| JxlError::InvalidPrefixCode("code has no symbols".to_string()))?;
    if used.next().is_none() {
        return Ok(vec![
            TableEntry {
                bits: 0,
                value: first.0 as u16,
            };
            root_size
        ]);
    }

    let codes = canonical_codes(lengths);
    let mut table = vec![TableEntry::default(); root_size];
    let mut long_symbols: Vec<usize> = Vec::new();
    for (symbol, &len) in lengths.iter().enumerate() {
        let len = len as u32;
        if len == 0 {
            continue;
        }
        if len > root_bits {
            long_symbols.push(symbol);
            continue;
        }
        let entry = TableEntry {
            bits: len as u8,
            value: symbol as u16,
        };
        let mut idx = codes[symbol] as usize;
        while idx < root_size {
            table[idx] = entry;
            idx += 1 << len;
        }
    }

    // Each root slot of a long code gets a subtable sized for its longest code
    let root_mask = root_size - 1;
    let mut sub_bits_of = vec![0u32; root_size];
    for &symbol in &long_symbols {
        let slot = codes[symbol] as usize & root_mask;
        sub_bits_of[slot] = sub_bits_of[slot].max(lengths[symbol] as u32 - root_bits);
    }
    for (slot, &sub_bits) in sub_bits_of.iter().enumerate() {
        if sub_bits == 0 {
            continue;
        }
        table[slot] = TableEntry {
            bits: (root_bits + sub_bits) as u8,
            value: table.len() as u16,
        };
        table.resize(table.len() + (1 << sub_bits), TableEntry::default());
    }
    for &symbol in &long_symbols {
        let code = codes[symbol] as usize;
        let link = table[code & root_mask];
        let sub_bits = link.bits as u32 - root_bits;
        let len = lengths[symbol] as u32 - root_bits;
        let entry = TableEntry {
            bits: len as u8,
            value: symbol as u16,
        };
        let mut idx = code >> root_bits;
        while idx < 1 << sub_bits {
            table[link.value as usize + idx] = entry;
            idx += 1 << len;
        }
    }
    Ok(table)
}

/// Code lengths of a Huffman code over `freqs`, limited to `max_depth`
///
/// Small counts are raised to a doubling floor until the tree fits. A lone
/// used symbol gets depth 1.
pub(crate) fn huffman_depths(freqs: &[u32], max_depth: u32) -> Vec<u8> {
    let mut depths = vec![0u8; freqs.len()];
    let used: Vec<usize> = (0..freqs.len()).filter(|&i| freqs[i] > 0).collect();
    match used.len() {
        0 => return depths,
        1 => {
            depths[used[0]] = 1;
            return depths;
        }
        _ => {}
    }

    let mut count_min = 1u64;
    loop {
        let mut parent = vec![usize::MAX; used.len() * 2 - 1];
        let mut heap: BinaryHeap<Reverse<(u64, usize)>> = used
            .iter()
            .enumerate()
            .map(|(node, &s)| Reverse(((freqs[s] as u64).max(count_min), node)))
            .collect();
        let mut next = used.len();
        while heap.len() > 1 {
            let (Some(Reverse((wa, a))), Some(Reverse((wb, b)))) = (heap.pop(), heap.pop()) else {
                break;
            };
            parent[a] = next;
            parent[b] = next;
            heap.push(Reverse((wa + wb, next)));
            next += 1;
        }

        let mut max_seen = 0;
        for (node, &symbol) in used.iter().enumerate() {
            let mut depth = 0;
            let mut n = node;
            while parent[n] != usize::MAX {
                n = parent[n];
                depth += 1;
            }
            depths[symbol] = depth;
            max_seen = max_seen.max(depth as u32);
        }
        if max_seen <= max_depth {
            return depths;
        }
        count_min *= 2;
    }
}

/// Encoder side of a prefix code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixEncoder {
    depths: Vec<u8>,
    codes: Vec<u16>,
    alphabet_size: usize,
    /// At most one used symbol: every symbol is written with zero bits
    single: bool,
}

impl PrefixEncoder {
    /// Build a length-limited code for symbol frequencies `freqs`
    pub fn from_freqs(freqs: &[u32]) -> Self {
        let alphabet_size = freqs.iter().rposition(|&f| f != 0).map_or(1, |p| p + 1);
        let freqs = &freqs[..alphabet_size.min(freqs.len())];
        let mut depths = huffman_depths(freqs, PREFIX_MAX_BITS);
        depths.resize(alphabet_size, 0);
        let single = depths.iter().filter(|&&d| d > 0).count() <= 1;
        let codes = if single {
            vec![0; alphabet_size]
        } else {
            canonical_codes(&depths)
        };
        Self {
            depths,
            codes,
            alphabet_size,
            single,
        }
    }

    /// Number of symbols the decoder must be told about
    pub fn alphabet_size(&self) -> usize {
        self.alphabet_size
    }

    fn used_symbols(&self) -> Vec<usize> {
        (0..self.depths.len()).filter(|&i| self.depths[i] > 0).collect()
    }

    /// Write the code lengths; nothing is written for a single-symbol alphabet
    pub fn write_tree<W: Write>(&self, w: &mut BitWriter<W>) -> JxlResult<()> {
        if self.alphabet_size <= 1 {
            return Ok(());
        }
        let used = self.used_symbols();
        if used.len() <= 4 {
            return self.write_simple(used, w);
        }
        self.write_complex(w)
    }

    fn write_simple<W: Write>(&self, mut used: Vec<usize>, w: &mut BitWriter<W>) -> JxlResult<()> {
        let max_bits = ceil_log2_nonzero(self.alphabet_size as u32) as usize;
        if used.is_empty() {
            used.push(0);
        }
        used.sort_by_key(|&s| self.depths[s]);
        w.write_bits(1, 2)?;
        w.write_bits(used.len() as u64 - 1, 2)?;
        for &symbol in &used {
            w.write_bits(symbol as u64, max_bits)?;
        }
        if used.len() == 4 {
            w.write_bit(self.depths[used[0]] == 1)?;
        }
        Ok(())
    }

    fn write_complex<W: Write>(&self, w: &mut BitWriter<W>) -> JxlResult<()> {
        let (tokens, extra) = rle_code_lengths(&self.depths);
        let mut histogram = [0u32; CODE_LENGTH_CODES];
        for &t in &tokens {
            histogram[t as usize] += 1;
        }
        let num_codes = histogram.iter().filter(|&&c| c > 0).count();
        let mut cl_depths = huffman_depths(&histogram, MAX_CODE_LENGTH_CODE_BITS);

        let mut codes_to_store = CODE_LENGTH_CODES;
        if num_codes > 1 {
            while codes_to_store > 0 && cl_depths[CODE_LENGTH_ORDER[codes_to_store - 1]] == 0 {
                codes_to_store -= 1;
            }
        }
        let mut skip = 0;
        if cl_depths[CODE_LENGTH_ORDER[0]] == 0 && cl_depths[CODE_LENGTH_ORDER[1]] == 0 {
            skip = 2;
            if cl_depths[CODE_LENGTH_ORDER[2]] == 0 {
                skip = 3;
            }
        }
        w.write_bits(skip as u64, 2)?;
        for &symbol in &CODE_LENGTH_ORDER[skip..codes_to_store] {
            let (bits, nbits) = CODE_LENGTH_PREFIX_CODE[cl_depths[symbol] as usize];
            w.write_bits(bits as u64, nbits as usize)?;
        }

        if num_codes == 1 {
            cl_depths.iter_mut().for_each(|d| *d = 0);
        }
        let cl_codes = canonical_codes(&cl_depths);
        for (&token, &bits) in tokens.iter().zip(&extra) {
            let t = token as usize;
            w.write_bits(cl_codes[t] as u64, cl_depths[t] as usize)?;
            match token {
                REPEAT_PREVIOUS => w.write_bits(bits as u64, 2)?,
                REPEAT_ZERO => w.write_bits(bits as u64, 3)?,
                _ => {}
            }
        }
        Ok(())
    }

    /// Write one symbol
    #[inline]
    pub fn write_symbol<W: Write>(&self, symbol: u32, w: &mut BitWriter<W>) -> JxlResult<()> {
        if self.single {
            return Ok(());
        }
        let s = symbol as usize;
        match self.depths.get(s) {
            Some(&depth) if depth > 0 => w.write_bits(self.codes[s] as u64, depth as usize),
            _ => Err(JxlError::EncodingError(format!(
                "symbol {} has no prefix code",
                symbol
            ))),
        }
    }

    /// Codeword length of `symbol`, 0 for a single-symbol code
    pub fn depth(&self, symbol: u32) -> u32 {
        if self.single {
            return 0;
        }
        self.depths.get(symbol as usize).copied().unwrap_or(0) as u32
    }
}

/// Run-length code a sequence of code lengths into code-length tokens and
/// their extra bits; trailing zeros are dropped
fn rle_code_lengths(depths: &[u8]) -> (Vec<u8>, Vec<u8>) {
    let len = depths.iter().rposition(|&d| d != 0).map_or(0, |p| p + 1);
    let depths = &depths[..len];
    let mut tokens = Vec::new();
    let mut extra = Vec::new();
    let mut previous = INITIAL_REPEATED_LENGTH;
    let mut i = 0;
    while i < depths.len() {
        let value = depths[i];
        let reps = depths[i..].iter().take_while(|&&d| d == value).count();
        if value == 0 {
            push_zero_repetitions(reps, &mut tokens, &mut extra);
        } else {
            push_repetitions(previous, value, reps, &mut tokens, &mut extra);
            previous = value;
        }
        i += reps;
    }
    (tokens, extra)
}

fn push_repetitions(
    previous: u8,
    value: u8,
    mut reps: usize,
    tokens: &mut Vec<u8>,
    extra: &mut Vec<u8>,
) {
    if previous != value {
        tokens.push(value);
        extra.push(0);
        reps -= 1;
    }
    if reps == 7 {
        tokens.push(value);
        extra.push(0);
        reps -= 1;
    }
    if reps < 3 {
        for _ in 0..reps {
            tokens.push(value);
            extra.push(0);
        }
        return;
    }
    let start = tokens.len();
    reps -= 3;
    loop {
        tokens.push(REPEAT_PREVIOUS);
        extra.push((reps & 0x3) as u8);
        reps >>= 2;
        if reps == 0 {
            break;
        }
        reps -= 1;
    }
    tokens[start..].reverse();
    extra[start..].reverse();
}

fn push_zero_repetitions(mut reps: usize, tokens: &mut Vec<u8>, extra: &mut Vec<u8>) {
    if reps == 11 {
        tokens.push(0);
        extra.push(0);
        reps -= 1;
    }
    if reps < 3 {
        for _ in 0..reps {
            tokens.push(0);
            extra.push(0);
        }
        return;
    }
    let start = tokens.len();
    reps -= 3;
    loop {
        tokens.push(REPEAT_ZERO);
        extra.push((reps & 0x7) as u8);
        reps >>= 3;
        if reps == 0 {
            break;
        }
        reps -= 1;
    }
    tokens[start..].reverse();
    extra[start..].reverse();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_and_read(freqs: &[u32], message: &[u32]) -> Vec<u32> {
        let encoder = PrefixEncoder::from_freqs(freqs);
        let mut buf = Vec::new();
        {
            let mut w = BitWriter::new(&mut buf);
            encoder.write_tree(&mut w).unwrap();
            for &s in message {
                encoder.write_symbol(s, &mut w).unwrap();
            }
            w.flush().unwrap();
        }
        let mut br = BitReader::new(&buf);
        let code = PrefixCode::read(encoder.alphabet_size(), &mut br).unwrap();
        message.iter().map(|_| code.read_symbol(&mut br).unwrap()).collect()
    }

    #[test]
    fn test_canonical_codes() {
        // lengths 2,1,3,3 -> codes 10, 0, 110, 111 (MSB first)
        let codes = canonical_codes(&[2, 1, 3, 3]);
        assert_eq!(codes, vec![0b01, 0b0, 0b011, 0b111]);
    }

    #[test]
    fn test_code_length_prefix_tables_agree() {
        for (len, &(bits, nbits)) in CODE_LENGTH_PREFIX_CODE.iter().enumerate() {
            for high in 0..(1u32 << (4 - nbits)) {
                let idx = (bits as u32 | (high << nbits)) as usize;
                assert_eq!(CODE_LENGTH_PREFIX_LENGTH[idx], nbits);
                assert_eq!(CODE_LENGTH_PREFIX_VALUE[idx] as usize, len);
            }
        }
    }

    #[test]
    fn test_huffman_depth_limit() {
        // Fibonacci frequencies build a maximally skewed tree
        let mut freqs = vec![1u32, 1];
        while freqs.len() < 30 {
            let n = freqs.len();
            freqs.push(freqs[n - 1] + freqs[n - 2]);
        }
        let depths = huffman_depths(&freqs, PREFIX_MAX_BITS);
        assert!(depths.iter().all(|&d| d >= 1 && d as u32 <= PREFIX_MAX_BITS));
        let kraft: f64 = depths.iter().map(|&d| 0.5f64.powi(d as i32)).sum();
        assert!((kraft - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_simple_codes() {
        assert_eq!(write_and_read(&[0, 0, 5], &[2, 2, 2]), vec![2, 2, 2]);
        assert_eq!(write_and_read(&[3, 0, 5], &[0, 2, 2, 0]), vec![0, 2, 2, 0]);
        assert_eq!(write_and_read(&[10, 1, 1], &[1, 0, 2]), vec![1, 0, 2]);
        assert_eq!(write_and_read(&[4, 4, 4, 4], &[3, 1, 0, 2]), vec![3, 1, 0, 2]);
        assert_eq!(write_and_read(&[40, 10, 3, 2], &[3, 1, 0, 2]), vec![3, 1, 0, 2]);
    }

    #[test]
    fn test_complex_code() {
        let mut freqs = vec![0u32; 300];
        for (i, f) in freqs.iter_mut().enumerate() {
            if i % 7 != 3 {
                *f = (i as u32 * 37) % 101 + 1;
            }
        }
        let message: Vec<u32> = (0..300).filter(|i| i % 7 != 3).collect();
        assert_eq!(write_and_read(&freqs, &message), message);
    }

    #[test]
    fn test_long_codes_use_subtables() {
        let mut freqs = vec![1u32; 300];
        freqs[0] = 1 << 20;
        freqs[1] = 1 << 18;
        let encoder = PrefixEncoder::from_freqs(&freqs);
        assert!((0..300).any(|s| encoder.depth(s) > ROOT_BITS));
        let message: Vec<u32> = (0..300).rev().collect();
        assert_eq!(write_and_read(&freqs, &message), message);
    }

    #[test]
    fn test_rle_code_lengths_chain() {
        // 8 repeated from the initial length needs chained repeat codes
        let depths = vec![8u8; 100];
        let (tokens, extra) = rle_code_lengths(&depths);
        assert!(tokens.iter().all(|&t| t == REPEAT_PREVIOUS));
        // Decode the repeat chain the way the reader does
        let mut repeat = 0usize;
        let mut total = 0;
        for &e in &extra {
            let old = repeat;
            if repeat > 0 {
                repeat = (repeat - 2) << 2;
            }
            repeat += e as usize + 3;
            total += repeat - old;
        }
        assert_eq!(total, 100);
    }

    #[test]
    fn test_duplicate_simple_symbol_rejected() {
        let mut buf = Vec::new();
        {
            let mut w = BitWriter::new(&mut buf);
            w.write_bits(1, 2).unwrap();
            w.write_bits(1, 2).unwrap();
            w.write_bits(3, 3).unwrap();
            w.write_bits(3, 3).unwrap();
            w.flush().unwrap();
        }
        let err = PrefixCode::read(8, &mut BitReader::new(&buf));
        assert!(matches!(err, Err(JxlError::InvalidPrefixCode(_))));
    }

    #[test]
    fn test_incomplete_code_rejected() {
        let mut buf = Vec::new();
        {
            let mut w = BitWriter::new(&mut buf);
            // hskip 0, two code-length codes of length 2, then zeros:
            // half the code space stays unused
            w.write_bits(0, 2).unwrap();
            w.write_bits(0b011, 3).unwrap();
            w.write_bits(0b011, 3).unwrap();
            for _ in 2..CODE_LENGTH_CODES {
                w.write_bits(0b00, 2).unwrap();
            }
            w.flush().unwrap();
        }
        let err = PrefixCode::read(8, &mut BitReader::new(&buf));
        assert!(matches!(err, Err(JxlError::InvalidPrefixCode(_))));
    }
}
