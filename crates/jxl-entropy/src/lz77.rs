//! LZ77 back references over the decoded integer stream
//!
//! A token at or above `min_symbol` is a copy length. It is followed by a
//! distance read from the distance context. The first 120 distance codes can
//! be remapped to 2D offsets `(dx, dy)` in an image of width
//! `distance_multiplier`.

use crate::encode::Token;
use crate::hybrid_uint::HybridUintConfig;
use jxl_bitstream::{BitReader, BitWriter, U32Dist};
use jxl_core::{JxlResult, NUM_SPECIAL_DISTANCES, WINDOW_SIZE};
use std::io::Write;

const WINDOW_MASK: usize = WINDOW_SIZE - 1;

const MIN_SYMBOL_DIST: [U32Dist; 4] = [
    U32Dist::val(224),
    U32Dist::val(512),
    U32Dist::val(4096),
    U32Dist::bits_offset(15, 8),
];

const MIN_LENGTH_DIST: [U32Dist; 4] = [
    U32Dist::val(3),
    U32Dist::val(4),
    U32Dist::bits_offset(2, 5),
    U32Dist::bits_offset(8, 9),
];

/// Log alphabet size the length config is coded against
const LENGTH_CONFIG_LOG_ALPHA_SIZE: u32 = 8;

/// `(dx, dy)` offsets of the special distance codes, nearest first
#[rustfmt::skip]
pub const SPECIAL_DISTANCES: [[i8; 2]; NUM_SPECIAL_DISTANCES] = [
    [0, 1],  [1, 0],  [1, 1],  [-1, 1], [0, 2],  [2, 0],  [1, 2],  [-1, 2],
    [2, 1],  [-2, 1], [2, 2],  [-2, 2], [0, 3],  [3, 0],  [1, 3],  [-1, 3],
    [3, 1],  [-3, 1], [2, 3],  [-2, 3], [3, 2],  [-3, 2], [0, 4],  [4, 0],
    [1, 4],  [-1, 4], [4, 1],  [-4, 1], [3, 3],  [-3, 3], [2, 4],  [-2, 4],
    [4, 2],  [-4, 2], [0, 5],  [3, 4],  [-3, 4], [4, 3],  [-4, 3], [5, 0],
    [1, 5],  [-1, 5], [5, 1],  [-5, 1], [2, 5],  [-2, 5], [5, 2],  [-5, 2],
    [4, 4],  [-4, 4], [3, 5],  [-3, 5], [5, 3],  [-5, 3], [0, 6],  [6, 0],
    [1, 6],  [-1, 6], [6, 1],  [-6, 1], [2, 6],  [-2, 6], [6, 2],  [-6, 2],
    [4, 5],  [-4, 5], [5, 4],  [-5, 4], [3, 6],  [-3, 6], [6, 3],  [-6, 3],
    [0, 7],  [7, 0],  [1, 7],  [-1, 7], [5, 5],  [-5, 5], [7, 1],  [-7, 1],
    [4, 6],  [-4, 6], [6, 4],  [-6, 4], [2, 7],  [-2, 7], [7, 2],  [-7, 2],
    [3, 7],  [-3, 7], [7, 3],  [-7, 3], [5, 6],  [-5, 6], [6, 5],  [-6, 5],
    [8, 0],  [4, 7],  [-4, 7], [7, 4],  [-7, 4], [8, 1],  [8, 2],  [6, 6],
    [-6, 6], [8, 3],  [5, 7],  [-5, 7], [7, 5],  [-7, 5], [8, 4],  [6, 7],
    [-6, 7], [7, 6],  [-7, 6], [8, 5],  [7, 7],  [-7, 7], [8, 6],  [8, 7],
];

/// Linear distances of the special codes; empty when the multiplier is 0
pub fn special_distances(distance_multiplier: u32) -> Vec<u32> {
    if distance_multiplier == 0 {
        return Vec::new();
    }
    SPECIAL_DISTANCES
        .iter()
        .map(|&[dx, dy]| {
            let dist = dx as i64 + distance_multiplier as i64 * dy as i64;
            dist.max(1) as u32
        })
        .collect()
}

/// LZ77 header of a histogram set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Lz77Params {
    pub enabled: bool,
    /// Tokens at or above this value are copy lengths
    pub min_symbol: u32,
    /// Added to every decoded copy length
    pub min_length: u32,
    pub length_uint_config: HybridUintConfig,
}

impl Default for Lz77Params {
    fn default() -> Self {
        Self {
            enabled: false,
            min_symbol: 224,
            min_length: 3,
            length_uint_config: HybridUintConfig::new(0, 0, 0),
        }
    }
}

impl Lz77Params {
    pub fn read(br: &mut BitReader) -> JxlResult<Self> {
        if !br.read_bit()? {
            return Ok(Self::default());
        }
        let min_symbol = br.read_u32(&MIN_SYMBOL_DIST)?;
        let min_length = br.read_u32(&MIN_LENGTH_DIST)?;
        let length_uint_config = HybridUintConfig::read(LENGTH_CONFIG_LOG_ALPHA_SIZE, br)?;
        Ok(Self {
            enabled: true,
            min_symbol,
            min_length,
            length_uint_config,
        })
    }

    pub fn write<W: Write>(&self, w: &mut BitWriter<W>) -> JxlResult<()> {
        w.write_bit(self.enabled)?;
        if !self.enabled {
            return Ok(());
        }
        w.write_u32(self.min_symbol, &MIN_SYMBOL_DIST)?;
        w.write_u32(self.min_length, &MIN_LENGTH_DIST)?;
        self.length_uint_config
            .write(LENGTH_CONFIG_LOG_ALPHA_SIZE, w)
    }
}

/// Sliding window of decoded integers with a pending copy
///
/// Copies are served one value at a time so the caller never recurses.
#[derive(Debug, Clone)]
pub(crate) struct Lz77Window {
    window: Vec<u32>,
    num_decoded: usize,
    num_to_copy: usize,
    copy_pos: usize,
}

impl Lz77Window {
    pub(crate) fn new() -> Self {
        Self {
            window: vec![0; WINDOW_SIZE],
            num_decoded: 0,
            num_to_copy: 0,
            copy_pos: 0,
        }
    }

    #[inline]
    pub(crate) fn push(&mut self, value: u32) {
        self.window[self.num_decoded & WINDOW_MASK] = value;
        self.num_decoded += 1;
    }

    /// Serve the next value of a pending copy, if any
    #[inline]
    pub(crate) fn next_copied(&mut self) -> Option<u32> {
        if self.num_to_copy == 0 {
            return None;
        }
        let value = self.window[self.copy_pos & WINDOW_MASK];
        self.copy_pos += 1;
        self.num_to_copy -= 1;
        self.push(value);
        Some(value)
    }

    /// Start a copy of `length` values from `distance` back
    ///
    /// The distance is clamped to the decoded history and the window size.
    /// A clamped distance of 0 copies window slots that were never written,
    /// which read as zero.
    pub(crate) fn begin_copy(&mut self, length: usize, distance: usize) {
        let distance = distance.min(self.num_decoded).min(WINDOW_SIZE);
        self.copy_pos = self.num_decoded - distance;
        self.num_to_copy = length;
    }

    #[cfg(test)]
    fn num_decoded(&self) -> usize {
        self.num_decoded
    }
}

/// Map a raw distance symbol to a linear distance
#[inline]
pub(crate) fn resolve_distance(raw: u32, special: &[u32]) -> usize {
    match special.get(raw as usize) {
        Some(&dist) => dist as usize,
        None => raw as usize + 1 - special.len(),
    }
}

/// Raw distance symbol for a linear distance, preferring a special code
pub(crate) fn distance_symbol(distance: usize, special: &[u32]) -> u32 {
    match special.iter().position(|&d| d as usize == distance) {
        Some(idx) => idx as u32,
        None => (distance - 1 + special.len()) as u32,
    }
}

/// How the encoder looks for back references
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Lz77Method {
    #[default]
    None,
    /// Runs of the previous value only (distance 1)
    Rle,
    /// Greedy longest match through a hash chain
    Greedy,
}

/// Longest copy the encoder emits, keeping length tokens small
const MAX_MATCH_LENGTH: usize = 1 << 15;
const HASH_BITS: u32 = 16;
const MAX_CHAIN: usize = 64;

fn hash3(values: &[u32], pos: usize) -> usize {
    let h = values[pos]
        .wrapping_mul(0x9E37_79B1)
        .rotate_left(7)
        ^ values[pos + 1].wrapping_mul(0x85EB_CA6B)
        ^ values[pos + 2].wrapping_mul(0xC2B2_AE35).rotate_left(13);
    (h.wrapping_mul(2_654_435_769) >> (32 - HASH_BITS)) as usize
}

struct HashChains {
    head: Vec<usize>,
    prev: Vec<usize>,
}

impl HashChains {
    fn new(len: usize) -> Self {
        Self {
            head: vec![usize::MAX; 1 << HASH_BITS],
            prev: vec![usize::MAX; len],
        }
    }

    fn insert(&mut self, values: &[u32], pos: usize) {
        if pos + 2 < values.len() {
            let h = hash3(values, pos);
            self.prev[pos] = self.head[h];
            self.head[h] = pos;
        }
    }
}

/// Find `(length, distance)` back references in `values`, indexed by start
fn find_matches(
    method: Lz77Method,
    values: &[u32],
    min_length: usize,
) -> Vec<Option<(usize, usize)>> {
    let mut matches = vec![None; values.len()];
    match method {
        Lz77Method::None => {}
        Lz77Method::Rle => {
            let mut i = 1;
            while i < values.len() {
                let run = values[i..]
                    .iter()
                    .take_while(|&&v| v == values[i - 1])
                    .count()
                    .min(MAX_MATCH_LENGTH);
                if run >= min_length {
                    matches[i] = Some((run, 1));
                    i += run;
                } else {
                    i += 1;
                }
            }
        }
        Lz77Method::Greedy => {
            let mut chains = HashChains::new(values.len());
            let mut i = 0;
            while i < values.len() {
                let mut best = (0, 0);
                if i + 2 < values.len() {
                    let max_len = (values.len() - i).min(MAX_MATCH_LENGTH);
                    let mut candidate = chains.head[hash3(values, i)];
                    let mut chain = 0;
                    while candidate != usize::MAX
                        && chain < MAX_CHAIN
                        && i - candidate <= WINDOW_SIZE
                    {
                        let len = values[candidate..]
                            .iter()
                            .zip(&values[i..i + max_len])
                            .take_while(|(a, b)| a == b)
                            .count();
                        if len > best.0 {
                            best = (len, i - candidate);
                            if len == max_len {
                                break;
                            }
                        }
                        candidate = chains.prev[candidate];
                        chain += 1;
                    }
                }
                if best.0 >= min_length {
                    matches[i] = Some(best);
                    for pos in i..i + best.0 {
                        chains.insert(values, pos);
                    }
                    i += best.0;
                } else {
                    chains.insert(values, i);
                    i += 1;
                }
            }
        }
    }
    matches
}

/// Replace repeated values in every stream with length/distance token pairs
///
/// Returns false, leaving the streams untouched, when no back reference was
/// found.
pub(crate) fn apply_lz77(
    method: Lz77Method,
    params: &Lz77Params,
    distance_context: u32,
    distance_multiplier: u32,
    streams: &mut [Vec<Token>],
) -> bool {
    if method == Lz77Method::None {
        return false;
    }
    let special = special_distances(distance_multiplier);
    let min_length = params.min_length as usize;
    let all_matches: Vec<Vec<Option<(usize, usize)>>> = streams
        .iter()
        .map(|tokens| {
            let values: Vec<u32> = tokens.iter().map(|t| t.value).collect();
            find_matches(method, &values, min_length)
        })
        .collect();
    if all_matches.iter().all(|m| m.iter().all(Option::is_none)) {
        return false;
    }

    for (tokens, matches) in streams.iter_mut().zip(all_matches) {
        let mut out = Vec::with_capacity(tokens.len());
        let mut i = 0;
        while i < tokens.len() {
            match matches[i] {
                Some((length, distance)) => {
                    out.push(Token::lz77_length(
                        tokens[i].context,
                        (length - min_length) as u32,
                    ));
                    out.push(Token::new(
                        distance_context,
                        distance_symbol(distance, &special),
                    ));
                    i += length;
                }
                None => {
                    out.push(tokens[i]);
                    i += 1;
                }
            }
        }
        *tokens = out;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_special_distances() {
        assert!(special_distances(0).is_empty());
        let d = special_distances(10);
        assert_eq!(d.len(), NUM_SPECIAL_DISTANCES);
        assert_eq!(d[0], 10);
        assert_eq!(d[1], 1);
        assert_eq!(d[3], 9);
        // -1 + 1*1 = 0 is raised to 1
        assert_eq!(special_distances(1)[3], 1);
    }

    #[test]
    fn test_distance_symbols_resolve() {
        let special = special_distances(64);
        for distance in [1usize, 2, 63, 64, 65, 200, 5000] {
            let raw = distance_symbol(distance, &special);
            assert_eq!(resolve_distance(raw, &special), distance);
        }
        assert_eq!(distance_symbol(1, &[]), 0);
        assert_eq!(resolve_distance(0, &[]), 1);
    }

    #[test]
    fn test_window_copy_overlapping() {
        let mut window = Lz77Window::new();
        window.push(7);
        window.push(8);
        window.begin_copy(5, 2);
        let copied: Vec<u32> = std::iter::from_fn(|| window.next_copied()).collect();
        assert_eq!(copied, vec![7, 8, 7, 8, 7]);
        assert_eq!(window.num_decoded(), 7);
    }

    #[test]
    fn test_window_distance_clamped() {
        let mut window = Lz77Window::new();
        window.push(3);
        window.push(4);
        // Distance beyond the history copies from the first value
        window.begin_copy(2, 1000);
        assert_eq!(window.next_copied(), Some(3));
        assert_eq!(window.next_copied(), Some(4));
        assert_eq!(window.next_copied(), None);

        // Nothing decoded yet: the copy reads untouched slots
        let mut empty = Lz77Window::new();
        empty.begin_copy(3, 5);
        let copied: Vec<u32> = std::iter::from_fn(|| empty.next_copied()).collect();
        assert_eq!(copied, vec![0, 0, 0]);
    }

    #[test]
    fn test_rle_matches() {
        let values = [1, 2, 2, 2, 2, 2, 3, 3, 3];
        let matches = find_matches(Lz77Method::Rle, &values, 3);
        assert_eq!(matches[2], Some((4, 1)));
        assert_eq!(matches[7], None);
        assert!(matches.iter().filter(|m| m.is_some()).count() == 1);
    }

    #[test]
    fn test_greedy_matches() {
        let values: Vec<u32> = (0..50).chain(0..50).collect();
        let matches = find_matches(Lz77Method::Greedy, &values, 3);
        assert_eq!(matches[50], Some((50, 50)));
    }

    #[test]
    fn test_params_read_back() {
        let params = Lz77Params {
            enabled: true,
            min_symbol: 300,
            min_length: 7,
            length_uint_config: HybridUintConfig::new(2, 1, 0),
        };
        let mut buf = Vec::new();
        {
            let mut w = BitWriter::new(&mut buf);
            params.write(&mut w).unwrap();
            Lz77Params::default().write(&mut w).unwrap();
            w.flush().unwrap();
        }
        let mut br = BitReader::new(&buf);
        assert_eq!(Lz77Params::read(&mut br).unwrap(), params);
        assert!(!Lz77Params::read(&mut br).unwrap().enabled);
    }
}
