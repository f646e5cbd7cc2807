//! ANS histogram serialization
//!
//! A histogram assigns each symbol a count, with all counts summing to
//! `2^precision_bits`. Three layouts exist on the wire:
//!
//! - simple: one or two symbols, listed explicitly
//! - flat: the table split as evenly as possible over an alphabet
//! - general: per-symbol log-counts with run-length runs, then the mantissa
//!   bits of every count except one omitted symbol whose count is implied

use crate::fields::{floor_log2_nonzero, read_var_len_u8, write_var_len_u8};
use jxl_bitstream::{BitReader, BitWriter};
use jxl_core::{JxlError, JxlResult, ANS_LOG_TAB_SIZE, ANS_TAB_SIZE};
use log::trace;
use std::io::Write;

/// Log-count code that starts a run of repeated counts
const RLE_LOGCOUNT: u32 = ANS_LOG_TAB_SIZE + 1;

/// Shortest run worth coding as RLE, and the longest one a single code covers
const MIN_RLE_RUN: usize = 4;
const MAX_RLE_RUN: usize = MIN_RLE_RUN + 255;

/// Prefix code of the log-counts, indexed by the next 7 bits of the stream:
/// `(bits to consume, log-count)`
#[rustfmt::skip]
const LOGCOUNT_DECODE: [[u8; 2]; 128] = [
    [3, 10], [7, 12], [3, 7], [4, 3], [3, 6], [3, 8], [3, 9], [4, 5],
    [3, 10], [4, 4],  [3, 7], [4, 1], [3, 6], [3, 8], [3, 9], [4, 2],
    [3, 10], [5, 0],  [3, 7], [4, 3], [3, 6], [3, 8], [3, 9], [4, 5],
    [3, 10], [4, 4],  [3, 7], [4, 1], [3, 6], [3, 8], [3, 9], [4, 2],
    [3, 10], [6, 11], [3, 7], [4, 3], [3, 6], [3, 8], [3, 9], [4, 5],
    [3, 10], [4, 4],  [3, 7], [4, 1], [3, 6], [3, 8], [3, 9], [4, 2],
    [3, 10], [5, 0],  [3, 7], [4, 3], [3, 6], [3, 8], [3, 9], [4, 5],
    [3, 10], [4, 4],  [3, 7], [4, 1], [3, 6], [3, 8], [3, 9], [4, 2],
    [3, 10], [7, 13], [3, 7], [4, 3], [3, 6], [3, 8], [3, 9], [4, 5],
    [3, 10], [4, 4],  [3, 7], [4, 1], [3, 6], [3, 8], [3, 9], [4, 2],
    [3, 10], [5, 0],  [3, 7], [4, 3], [3, 6], [3, 8], [3, 9], [4, 5],
    [3, 10], [4, 4],  [3, 7], [4, 1], [3, 6], [3, 8], [3, 9], [4, 2],
    [3, 10], [6, 11], [3, 7], [4, 3], [3, 6], [3, 8], [3, 9], [4, 5],
    [3, 10], [4, 4],  [3, 7], [4, 1], [3, 6], [3, 8], [3, 9], [4, 2],
    [3, 10], [5, 0],  [3, 7], [4, 3], [3, 6], [3, 8], [3, 9], [4, 5],
    [3, 10], [4, 4],  [3, 7], [4, 1], [3, 6], [3, 8], [3, 9], [4, 2],
];

/// The same code from the writer's side, indexed by log-count: `(nbits, bits)`
const LOGCOUNT_ENCODE: [(u8, u8); 14] = [
    (5, 17),
    (4, 11),
    (4, 15),
    (4, 3),
    (4, 9),
    (4, 7),
    (3, 4),
    (3, 2),
    (3, 5),
    (3, 6),
    (3, 0),
    (6, 33),
    (7, 1),
    (7, 65),
];

/// Number of mantissa bits stored for a count with `2^logcount` leading weight
#[inline]
pub fn population_count_precision(logcount: u32, shift: u32) -> u32 {
    let r = (logcount as i32).min(shift as i32 - ((ANS_LOG_TAB_SIZE - logcount) >> 1) as i32);
    r.max(0) as u32
}

/// Spread `total_count` over `length` symbols as evenly as possible
pub fn create_flat_histogram(length: usize, total_count: u32) -> Vec<u32> {
    assert!(length > 0 && length <= total_count as usize);
    let count = total_count / length as u32;
    let rem = (total_count % length as u32) as usize;
    let mut result = vec![count; length];
    for c in result.iter_mut().take(rem) {
        *c += 1;
    }
    result
}

/// Read one histogram whose counts sum to `2^precision_bits`
pub fn read_histogram(precision_bits: u32, br: &mut BitReader) -> JxlResult<Vec<u32>> {
    let total = 1u32 << precision_bits;

    if br.read_bit()? {
        let num_symbols = br.read_bits(1)? as usize + 1;
        let mut symbols = [0usize; 2];
        for s in symbols.iter_mut().take(num_symbols) {
            *s = read_var_len_u8(br)? as usize;
        }
        let max_symbol = symbols[..num_symbols].iter().copied().max().unwrap_or(0);
        let mut counts = vec![0u32; max_symbol + 1];
        if num_symbols == 1 {
            counts[symbols[0]] = total;
        } else {
            if symbols[0] == symbols[1] {
                return Err(JxlError::InvalidHistogram(format!(
                    "simple histogram repeats symbol {}",
                    symbols[0]
                )));
            }
            let first = br.read_bits(precision_bits as usize)? as u32;
            counts[symbols[0]] = first;
            counts[symbols[1]] = total - first;
        }
        return Ok(counts);
    }

    if br.read_bit()? {
        let alphabet_size = read_var_len_u8(br)? as usize + 1;
        if alphabet_size > total as usize {
            return Err(JxlError::InvalidHistogram(format!(
                "flat alphabet of {} exceeds total count {}",
                alphabet_size, total
            )));
        }
        return Ok(create_flat_histogram(alphabet_size, total));
    }

    let upper_bound_log = floor_log2_nonzero(ANS_LOG_TAB_SIZE + 1) as usize;
    let mut log = 0;
    while log < upper_bound_log {
        if !br.read_bit()? {
            break;
        }
        log += 1;
    }
    let shift = ((br.read_bits(log)? as u32) | (1 << log)) - 1;
    if shift > ANS_LOG_TAB_SIZE + 1 {
        return Err(JxlError::InvalidHistogram(format!(
            "shift {} out of range",
            shift
        )));
    }

    let length = read_var_len_u8(br)? as usize + 3;
    let mut logcounts = vec![0u32; length];
    let mut same = vec![0usize; length];
    let mut omit_log = None;
    let mut omit_pos = 0;
    let mut i = 0;
    while i < length {
        let idx = br.peek_bits(7) as usize;
        let [nbits, logcount] = LOGCOUNT_DECODE[idx];
        br.consume(nbits as usize)?;
        logcounts[i] = logcount as u32;
        if logcounts[i] == RLE_LOGCOUNT {
            let rle_length = read_var_len_u8(br)? as usize;
            same[i] = rle_length + MIN_RLE_RUN + 1;
            i += rle_length + MIN_RLE_RUN;
            continue;
        }
        if omit_log.map_or(true, |log| logcounts[i] > log) {
            omit_log = Some(logcounts[i]);
            omit_pos = i;
        }
        i += 1;
    }
    if omit_log.is_none() {
        return Err(JxlError::InvalidHistogram(
            "no symbol left to carry the implied count".to_string(),
        ));
    }
    if omit_pos + 1 < length && logcounts[omit_pos + 1] == RLE_LOGCOUNT {
        return Err(JxlError::InvalidHistogram(
            "run-length code follows the implied count".to_string(),
        ));
    }

    let mut counts = vec![0u32; length];
    let mut total_count: i64 = 0;
    let mut prev = 0;
    let mut numsame = 0;
    for i in 0..length {
        if same[i] != 0 {
            numsame = same[i] - 1;
            prev = if i > 0 { counts[i - 1] } else { 0 };
        }
        if numsame > 0 {
            counts[i] = prev;
            numsame -= 1;
        } else {
            let code = logcounts[i];
            if i == omit_pos || code == 0 {
                continue;
            } else if code == 1 {
                counts[i] = 1;
            } else {
                let bitcount = population_count_precision(code - 1, shift);
                let mantissa = br.read_bits(bitcount as usize)? as u32;
                counts[i] = (1 << (code - 1)) + (mantissa << (code - 1 - bitcount));
            }
        }
        total_count += counts[i] as i64;
    }
    let omitted = total as i64 - total_count;
    if omitted <= 0 {
        return Err(JxlError::InvalidHistogram(format!(
            "counts sum to {} before the implied count, above {}",
            total_count, total
        )));
    }
    counts[omit_pos] = omitted as u32;
    Ok(counts)
}

/// Wire layout chosen for a histogram
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistogramLayout {
    /// One or two explicitly listed symbols
    Simple { symbols: Vec<usize> },
    /// Evenly spread counts over `alphabet_size` symbols
    Flat { alphabet_size: usize },
    /// Log-counts plus mantissas with precision `shift`
    General { shift: u32, omit_pos: usize },
}

/// A normalized histogram ready to be written, with its estimated cost
#[derive(Debug, Clone)]
pub struct EncodedHistogram {
    /// Normalized counts summing to `ANS_TAB_SIZE`
    pub counts: Vec<u32>,
    pub layout: HistogramLayout,
    /// Header bits plus the estimated data bits
    pub cost: f64,
}

impl EncodedHistogram {
    /// Pick the cheapest layout for symbol frequencies `freqs`
    pub fn choose(freqs: &[u32]) -> JxlResult<Self> {
        let used = freqs.iter().rposition(|&f| f != 0).map_or(0, |p| p + 1);
        let freqs = &freqs[..used];
        let nonzero: Vec<usize> = freqs
            .iter()
            .enumerate()
            .filter(|(_, &f)| f > 0)
            .map(|(i, _)| i)
            .collect();
        if nonzero.iter().any(|&s| s > u8::MAX as usize) {
            return Err(JxlError::AlphabetTooLarge {
                size: nonzero.last().map_or(0, |&s| s + 1),
                max: u8::MAX as usize + 1,
            });
        }

        let best = match nonzero.len() {
            0 | 1 => {
                let symbol = nonzero.first().copied().unwrap_or(0);
                let mut counts = vec![0; symbol + 1];
                counts[symbol] = ANS_TAB_SIZE;
                Self::evaluate(
                    freqs,
                    counts,
                    HistogramLayout::Simple {
                        symbols: vec![symbol],
                    },
                )?
            }
            2 => {
                let (a, b) = (nonzero[0], nonzero[1]);
                let total = freqs[a] as u64 + freqs[b] as u64;
                let first = ((freqs[a] as u64 * ANS_TAB_SIZE as u64 + total / 2) / total)
                    .clamp(1, ANS_TAB_SIZE as u64 - 1) as u32;
                let mut counts = vec![0; b + 1];
                counts[a] = first;
                counts[b] = ANS_TAB_SIZE - first;
                Self::evaluate(
                    freqs,
                    counts,
                    HistogramLayout::Simple {
                        symbols: vec![a, b],
                    },
                )?
            }
            _ => {
                let length = nonzero.last().map_or(0, |&s| s + 1);
                let mut best = Self::evaluate(
                    freqs,
                    create_flat_histogram(length, ANS_TAB_SIZE),
                    HistogramLayout::Flat {
                        alphabet_size: length,
                    },
                )?;
                let normalized = normalize_counts(freqs);
                for shift in 0..=ANS_LOG_TAB_SIZE {
                    let (counts, omit_pos) = quantize_counts(&normalized, shift);
                    let layout = HistogramLayout::General { shift, omit_pos };
                    let candidate = Self::evaluate(freqs, counts, layout)?;
                    if candidate.cost < best.cost {
                        best = candidate;
                    }
                }
                best
            }
        };
        trace!(
            "histogram of {} symbols: {:?}, cost {:.1} bits",
            nonzero.len(),
            best.layout,
            best.cost
        );
        Ok(best)
    }

    fn evaluate(freqs: &[u32], counts: Vec<u32>, layout: HistogramLayout) -> JxlResult<Self> {
        let mut encoded = Self {
            counts,
            layout,
            cost: 0.0,
        };
        let mut sink = BitWriter::new(std::io::sink());
        encoded.write(&mut sink)?;
        let mut cost = sink.bits_written() as f64;
        for (&f, &c) in freqs.iter().zip(encoded.counts.iter()) {
            if f > 0 {
                cost += f as f64 * (ANS_TAB_SIZE as f64 / c as f64).log2();
            }
        }
        encoded.cost = cost;
        Ok(encoded)
    }

    /// Write the histogram in the layout `read_histogram` expects
    pub fn write<W: Write>(&self, w: &mut BitWriter<W>) -> JxlResult<()> {
        match &self.layout {
            HistogramLayout::Simple { symbols } => {
                w.write_bit(true)?;
                w.write_bits(symbols.len() as u64 - 1, 1)?;
                for &s in symbols {
                    write_var_len_u8(s as u32, w)?;
                }
                if symbols.len() == 2 {
                    w.write_bits(self.counts[symbols[0]] as u64, ANS_LOG_TAB_SIZE as usize)?;
                }
                Ok(())
            }
            HistogramLayout::Flat { alphabet_size } => {
                w.write_bit(false)?;
                w.write_bit(true)?;
                write_var_len_u8(*alphabet_size as u32 - 1, w)
            }
            HistogramLayout::General { shift, omit_pos } => {
                self.write_general(*shift, *omit_pos, w)
            }
        }
    }

    fn write_general<W: Write>(
        &self,
        shift: u32,
        omit_pos: usize,
        w: &mut BitWriter<W>,
    ) -> JxlResult<()> {
        let counts = &self.counts;
        let length = counts.len().max(3);
        if length - 3 > u8::MAX as usize {
            return Err(JxlError::AlphabetTooLarge {
                size: length,
                max: u8::MAX as usize + 3,
            });
        }

        w.write_bit(false)?;
        w.write_bit(false)?;
        let log = floor_log2_nonzero(shift + 1);
        for _ in 0..log {
            w.write_bit(true)?;
        }
        if (log as usize) < floor_log2_nonzero(ANS_LOG_TAB_SIZE + 1) as usize {
            w.write_bit(false)?;
        }
        w.write_bits((shift + 1 - (1 << log)) as u64, log as usize)?;
        write_var_len_u8((length - 3) as u32, w)?;

        let count_at = |i: usize| counts.get(i).copied().unwrap_or(0);
        let mut mantissas = Vec::new();
        let mut i = 0;
        while i < length {
            if i > 0 && i - 1 != omit_pos {
                let prev = count_at(i - 1);
                let run = (i..length)
                    .take_while(|&j| j != omit_pos && count_at(j) == prev)
                    .count()
                    .min(MAX_RLE_RUN);
                if run >= MIN_RLE_RUN {
                    let (nbits, bits) = LOGCOUNT_ENCODE[RLE_LOGCOUNT as usize];
                    w.write_bits(bits as u64, nbits as usize)?;
                    write_var_len_u8((run - MIN_RLE_RUN) as u32, w)?;
                    i += run;
                    continue;
                }
            }
            let count = count_at(i);
            let code = logcount_of(count);
            let (nbits, bits) = LOGCOUNT_ENCODE[code as usize];
            w.write_bits(bits as u64, nbits as usize)?;
            if i != omit_pos && code > 1 {
                let bitcount = population_count_precision(code - 1, shift);
                let drop = code - 1 - bitcount;
                mantissas.push((((count - (1 << (code - 1))) >> drop) as u64, bitcount as usize));
            }
            i += 1;
        }
        for (value, nbits) in mantissas {
            w.write_bits(value, nbits)?;
        }
        Ok(())
    }
}

/// Log-count code of a count: 0 for zero, else `floor(log2(count)) + 1`
#[inline]
fn logcount_of(count: u32) -> u32 {
    if count == 0 {
        0
    } else {
        floor_log2_nonzero(count) + 1
    }
}

/// Scale frequencies to sum to `ANS_TAB_SIZE`, keeping every used symbol
/// at a count of at least one
fn normalize_counts(freqs: &[u32]) -> Vec<u32> {
    let total: u64 = freqs.iter().map(|&f| f as u64).sum();
    let mut counts: Vec<u32> = freqs
        .iter()
        .map(|&f| {
            if f == 0 {
                0
            } else {
                (((f as u64 * ANS_TAB_SIZE as u64 + total / 2) / total) as u32).max(1)
            }
        })
        .collect();
    let sum: u32 = counts.iter().sum();
    if sum > ANS_TAB_SIZE {
        let mut order: Vec<usize> = (0..counts.len()).filter(|&i| counts[i] > 1).collect();
        order.sort_by_key(|&i| std::cmp::Reverse(counts[i]));
        let mut excess = sum - ANS_TAB_SIZE;
        while excess > 0 {
            for &i in &order {
                if excess == 0 {
                    break;
                }
                if counts[i] > 1 {
                    counts[i] -= 1;
                    excess -= 1;
                }
            }
        }
    } else if sum < ANS_TAB_SIZE {
        let largest = (0..counts.len()).max_by_key(|&i| (counts[i], std::cmp::Reverse(i)));
        if let Some(max_idx) = largest {
            counts[max_idx] += ANS_TAB_SIZE - sum;
        }
    }
    counts
}

/// Round counts down to values representable with precision `shift`,
/// handing the slack to the implied symbol
fn quantize_counts(normalized: &[u32], shift: u32) -> (Vec<u32>, usize) {
    let mut counts = normalized.to_vec();
    let omit_pos = (0..counts.len())
        .max_by_key(|&i| (logcount_of(counts[i]), std::cmp::Reverse(i)))
        .unwrap_or(0);
    let mut others = 0;
    for (i, c) in counts.iter_mut().enumerate() {
        if i == omit_pos || *c == 0 {
            continue;
        }
        let code = logcount_of(*c);
        if code > 1 {
            let drop = code - 1 - population_count_precision(code - 1, shift);
            *c &= !((1u32 << drop) - 1);
        }
        others += *c;
    }
    counts[omit_pos] = ANS_TAB_SIZE - others;
    (counts, omit_pos)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_back(encoded: &EncodedHistogram) -> Vec<u32> {
        let mut buf = Vec::new();
        {
            let mut w = BitWriter::new(&mut buf);
            encoded.write(&mut w).unwrap();
            w.flush().unwrap();
        }
        read_histogram(ANS_LOG_TAB_SIZE, &mut BitReader::new(&buf)).unwrap()
    }

    fn trimmed(counts: &[u32]) -> &[u32] {
        let len = counts.iter().rposition(|&c| c != 0).map_or(0, |p| p + 1);
        &counts[..len]
    }

    #[test]
    fn test_flat_histogram() {
        assert_eq!(create_flat_histogram(3, 16), vec![6, 5, 5]);
        assert_eq!(create_flat_histogram(4, 4096), vec![1024; 4]);
        let flat = create_flat_histogram(255, 4096);
        assert_eq!(flat.iter().sum::<u32>(), 4096);
    }

    #[test]
    fn test_population_count_precision() {
        assert_eq!(population_count_precision(0, 0), 0);
        assert_eq!(population_count_precision(11, 12), 11);
        assert_eq!(population_count_precision(4, 5), 1);
        assert_eq!(population_count_precision(4, 13), 4);
        assert_eq!(population_count_precision(1, 3), 0);
    }

    #[test]
    fn test_logcount_tables_agree() {
        for (code, &(nbits, bits)) in LOGCOUNT_ENCODE.iter().enumerate() {
            for high in 0..(1u32 << (7 - nbits)) {
                let idx = (bits as u32 | (high << nbits)) as usize;
                assert_eq!(LOGCOUNT_DECODE[idx], [nbits, code as u8]);
            }
        }
    }

    #[test]
    fn test_single_symbol() {
        let encoded = EncodedHistogram::choose(&[0, 0, 9]).unwrap();
        assert_eq!(encoded.layout, HistogramLayout::Simple { symbols: vec![2] });
        assert_eq!(read_back(&encoded), vec![0, 0, 4096]);

        let empty = EncodedHistogram::choose(&[]).unwrap();
        assert_eq!(read_back(&empty), vec![4096]);
    }

    #[test]
    fn test_two_symbols() {
        let encoded = EncodedHistogram::choose(&[3, 0, 0, 1]).unwrap();
        assert_eq!(encoded.counts, vec![3072, 0, 0, 1024]);
        assert_eq!(read_back(&encoded), encoded.counts);
    }

    #[test]
    fn test_general_layout_read_back() {
        let freqs = [100u32, 50, 25, 12, 6, 3, 0, 0, 1, 1, 1, 1, 1, 1, 700];
        let normalized = normalize_counts(&freqs);
        assert_eq!(normalized.iter().sum::<u32>(), ANS_TAB_SIZE);
        for shift in 0..=ANS_LOG_TAB_SIZE {
            let (counts, omit_pos) = quantize_counts(&normalized, shift);
            assert_eq!(counts.iter().sum::<u32>(), ANS_TAB_SIZE);
            let encoded = EncodedHistogram {
                counts: counts.clone(),
                layout: HistogramLayout::General { shift, omit_pos },
                cost: 0.0,
            };
            assert_eq!(trimmed(&read_back(&encoded)), trimmed(&counts), "shift {}", shift);
        }
    }

    #[test]
    fn test_rle_runs() {
        // Long runs of equal counts, including zeros
        let mut freqs = vec![0u32; 200];
        for f in freqs.iter_mut().take(40) {
            *f = 10;
        }
        freqs[100] = 5000;
        for f in freqs.iter_mut().skip(150).take(30) {
            *f = 3;
        }
        let encoded = EncodedHistogram::choose(&freqs).unwrap();
        let decoded = read_back(&encoded);
        assert_eq!(trimmed(&decoded), trimmed(&encoded.counts));
        assert_eq!(decoded.iter().sum::<u32>(), ANS_TAB_SIZE);
    }

    #[test]
    fn test_flat_chosen_for_uniform() {
        let encoded = EncodedHistogram::choose(&[7; 16]).unwrap();
        assert_eq!(encoded.layout, HistogramLayout::Flat { alphabet_size: 16 });
        assert_eq!(read_back(&encoded), vec![256; 16]);
    }

    #[test]
    fn test_simple_repeated_symbol_rejected() {
        let mut buf = Vec::new();
        {
            let mut w = BitWriter::new(&mut buf);
            w.write_bit(true).unwrap();
            w.write_bit(true).unwrap();
            write_var_len_u8(5, &mut w).unwrap();
            write_var_len_u8(5, &mut w).unwrap();
            w.write_bits(100, 12).unwrap();
            w.flush().unwrap();
        }
        let err = read_histogram(ANS_LOG_TAB_SIZE, &mut BitReader::new(&buf));
        assert!(matches!(err, Err(JxlError::InvalidHistogram(_))));
    }

    #[test]
    fn test_flat_alphabet_larger_than_total_rejected() {
        // 20 symbols cannot share a total of 16
        let mut buf = Vec::new();
        {
            let mut w = BitWriter::new(&mut buf);
            w.write_bit(false).unwrap();
            w.write_bit(true).unwrap();
            write_var_len_u8(19, &mut w).unwrap();
            w.flush().unwrap();
        }
        let err = read_histogram(4, &mut BitReader::new(&buf));
        assert!(matches!(err, Err(JxlError::InvalidHistogram(_))));

        let ok = read_histogram(5, &mut BitReader::new(&buf)).unwrap();
        assert_eq!(ok.len(), 20);
        assert_eq!(ok.iter().sum::<u32>(), 32);
    }

    #[test]
    fn test_oversubscribed_general_rejected() {
        // Three symbols of log-count 12 (2048 each) leave nothing for the implied one
        let mut buf = Vec::new();
        {
            let mut w = BitWriter::new(&mut buf);
            w.write_bit(false).unwrap();
            w.write_bit(false).unwrap();
            // shift = 0: log 0 terminated by a zero bit
            w.write_bit(false).unwrap();
            write_var_len_u8(0, &mut w).unwrap();
            let (nbits, bits) = LOGCOUNT_ENCODE[12];
            for _ in 0..3 {
                w.write_bits(bits as u64, nbits as usize).unwrap();
            }
            w.flush().unwrap();
        }
        let err = read_histogram(ANS_LOG_TAB_SIZE, &mut BitReader::new(&buf));
        assert!(matches!(err, Err(JxlError::InvalidHistogram(_))));
    }
}
