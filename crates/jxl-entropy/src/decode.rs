//! Histogram set decoding and the symbol reader
//!
//! [`decode_histograms`] parses the header shared by all contexts of a stream
//! into an immutable [`AnsCode`]. An [`AnsSymbolReader`] then borrows the code
//! and decodes integers context by context. Several readers may share one
//! code across threads.

use crate::alias::{init_alias_table, log_entry_size, lookup, AliasEntry};
use crate::context_map::decode_context_map;
use crate::fields::read_var_len_u16;
use crate::histogram::read_histogram;
use crate::hybrid_uint::HybridUintConfig;
use crate::lz77::{resolve_distance, special_distances, Lz77Params, Lz77Window};
use crate::prefix::PrefixCode;
use jxl_bitstream::BitReader;
use jxl_core::{
    JxlError, JxlResult, ANS_LOG_TAB_SIZE, ANS_SIGNATURE, ANS_TAB_MASK, ANS_TAB_SIZE,
    PREFIX_MAX_BITS,
};
use log::debug;

/// Decoded histograms for every context of a stream
#[derive(Debug, Clone)]
pub struct AnsCode {
    alias_tables: Vec<AliasEntry>,
    prefix_codes: Vec<PrefixCode>,
    uint_configs: Vec<HybridUintConfig>,
    use_prefix_code: bool,
    log_alpha_size: u32,
    lz77: Lz77Params,
    context_map: Vec<u8>,
    distance_context: usize,
}

impl AnsCode {
    /// Cluster index for every context, including the LZ77 distance context
    pub fn context_map(&self) -> &[u8] {
        &self.context_map
    }

    pub fn num_histograms(&self) -> usize {
        self.uint_configs.len()
    }

    pub fn use_prefix_code(&self) -> bool {
        self.use_prefix_code
    }

    pub fn log_alpha_size(&self) -> u32 {
        self.log_alpha_size
    }

    pub fn lz77(&self) -> &Lz77Params {
        &self.lz77
    }

    pub fn uint_configs(&self) -> &[HybridUintConfig] {
        &self.uint_configs
    }

    /// Cluster that LZ77 distances are read from
    pub fn distance_context(&self) -> usize {
        self.distance_context
    }

    fn alias_table(&self, histo: usize) -> &[AliasEntry] {
        let size = 1 << self.log_alpha_size;
        &self.alias_tables[histo * size..(histo + 1) * size]
    }
}

/// Read the histogram set for `num_contexts` contexts
///
/// With LZ77 enabled one extra context is appended for distances.
/// `disallow_lz77` makes an enabled LZ77 header an error; nested context maps
/// use it to bound recursion.
pub fn decode_histograms(
    br: &mut BitReader,
    num_contexts: usize,
    disallow_lz77: bool,
) -> JxlResult<AnsCode> {
    if num_contexts == 0 {
        return Err(JxlError::InvalidParameter(
            "histogram set needs at least one context".to_string(),
        ));
    }
    let lz77 = Lz77Params::read(br)?;
    let mut num_contexts = num_contexts;
    if lz77.enabled {
        if disallow_lz77 {
            return Err(JxlError::Lz77Disallowed);
        }
        num_contexts += 1;
    }

    let (context_map, num_histograms) = if num_contexts > 1 {
        decode_context_map(br, num_contexts)?
    } else {
        (vec![0u8], 1)
    };
    let distance_context = context_map.last().map_or(0, |&c| c as usize);

    let use_prefix_code = br.read_bit()?;
    let log_alpha_size = if use_prefix_code {
        PREFIX_MAX_BITS
    } else {
        br.read_bits(2)? as u32 + 5
    };

    let uint_configs = (0..num_histograms)
        .map(|_| HybridUintConfig::read(log_alpha_size, br))
        .collect::<JxlResult<Vec<_>>>()?;

    let mut alias_tables = Vec::new();
    let mut prefix_codes = Vec::new();
    if use_prefix_code {
        let max_alphabet = 1usize << PREFIX_MAX_BITS;
        let mut alphabet_sizes = Vec::with_capacity(num_histograms);
        for _ in 0..num_histograms {
            let size = read_var_len_u16(br)? as usize + 1;
            if size > max_alphabet {
                return Err(JxlError::AlphabetTooLarge {
                    size,
                    max: max_alphabet,
                });
            }
            alphabet_sizes.push(size);
        }
        for size in alphabet_sizes {
            prefix_codes.push(PrefixCode::read(size, br)?);
        }
    } else {
        let table_size = 1usize << log_alpha_size;
        alias_tables = vec![AliasEntry::default(); num_histograms * table_size];
        for (c, table) in alias_tables.chunks_exact_mut(table_size).enumerate() {
            let counts = read_histogram(ANS_LOG_TAB_SIZE, br)?;
            if counts.len() > table_size {
                return Err(JxlError::AlphabetTooLarge {
                    size: counts.len(),
                    max: table_size,
                });
            }
            init_alias_table(&counts, ANS_LOG_TAB_SIZE, log_alpha_size, table).map_err(
                |e| JxlError::InvalidHistogram(format!("histogram {}: {}", c, e)),
            )?;
        }
    }

    debug!(
        "decoded {} histograms for {} contexts ({}, log_alpha_size {}, lz77 {})",
        num_histograms,
        num_contexts,
        if use_prefix_code { "prefix" } else { "ANS" },
        log_alpha_size,
        lz77.enabled
    );

    Ok(AnsCode {
        alias_tables,
        prefix_codes,
        uint_configs,
        use_prefix_code,
        log_alpha_size,
        lz77,
        context_map,
        distance_context,
    })
}

/// Stateful decoder of one entropy-coded stream
///
/// Owns the ANS state and the LZ77 window; the histograms are borrowed.
pub struct AnsSymbolReader<'a> {
    code: &'a AnsCode,
    state: u32,
    log_entry_size: u32,
    window: Option<Lz77Window>,
    special_distances: Vec<u32>,
}

impl<'a> AnsSymbolReader<'a> {
    /// Start reading a stream; ANS streams begin with the 32-bit state
    ///
    /// `distance_multiplier` is the row stride used by special distances; 0
    /// disables them.
    pub fn new(code: &'a AnsCode, br: &mut BitReader, distance_multiplier: u32) -> JxlResult<Self> {
        let state = if code.use_prefix_code {
            ANS_SIGNATURE << 16
        } else {
            br.read_bits(32)? as u32
        };
        let (window, special_distances) = if code.lz77.enabled {
            (Some(Lz77Window::new()), special_distances(distance_multiplier))
        } else {
            (None, Vec::new())
        };
        Ok(Self {
            code,
            state,
            // Prefix codes signal a 15-bit alphabet and have no alias table
            log_entry_size: if code.use_prefix_code {
                0
            } else {
                log_entry_size(code.log_alpha_size)
            },
            window,
            special_distances,
        })
    }

    /// Read one token from histogram `histo`
    #[inline]
    pub fn read_symbol(&mut self, histo: usize, br: &mut BitReader) -> JxlResult<u32> {
        if histo >= self.code.num_histograms() {
            return Err(JxlError::InvalidParameter(format!(
                "histogram {} out of {}",
                histo,
                self.code.num_histograms()
            )));
        }
        if self.code.use_prefix_code {
            self.code.prefix_codes[histo].read_symbol(br)
        } else {
            self.read_ans_symbol(histo, br)
        }
    }

    #[inline]
    fn read_ans_symbol(&mut self, histo: usize, br: &mut BitReader) -> JxlResult<u32> {
        let slot = self.state & ANS_TAB_MASK;
        let symbol = lookup(self.code.alias_table(histo), slot, self.log_entry_size);
        self.state = symbol.freq * (self.state >> ANS_LOG_TAB_SIZE) + symbol.offset;
        if self.state < 1 << 16 {
            self.state = (self.state << 16) | br.peek_bits(16) as u32;
            br.consume(16)?;
        }
        Ok(symbol.value)
    }

    /// Read an integer from clustered histogram `histo`, resolving LZ77 copies
    pub fn read_hybrid_uint_clustered(
        &mut self,
        histo: usize,
        br: &mut BitReader,
    ) -> JxlResult<u32> {
        loop {
            if let Some(value) = self.window.as_mut().and_then(Lz77Window::next_copied) {
                return Ok(value);
            }
            let token = self.read_symbol(histo, br)?;
            let lz77 = self.code.lz77;
            if lz77.enabled && token >= lz77.min_symbol {
                let length = lz77.length_uint_config.decode(token - lz77.min_symbol, br)? as usize
                    + lz77.min_length as usize;
                let distance_context = self.code.distance_context;
                let distance_token = self.read_symbol(distance_context, br)?;
                let raw = self.code.uint_configs[distance_context].decode(distance_token, br)?;
                let distance = resolve_distance(raw, &self.special_distances);
                if let Some(window) = self.window.as_mut() {
                    window.begin_copy(length, distance);
                }
                continue;
            }
            let value = self.code.uint_configs[histo].decode(token, br)?;
            if let Some(window) = self.window.as_mut() {
                window.push(value);
            }
            return Ok(value);
        }
    }

    /// Read an integer for context `ctx`, mapped through the context map
    pub fn read_hybrid_uint(&mut self, ctx: usize, br: &mut BitReader) -> JxlResult<u32> {
        let histo = *self.code.context_map.get(ctx).ok_or_else(|| {
            JxlError::InvalidParameter(format!(
                "context {} out of {}",
                ctx,
                self.code.context_map.len()
            ))
        })?;
        self.read_hybrid_uint_clustered(histo as usize, br)
    }

    /// Decode `count` copies of a value at once, if histogram `histo` can
    /// only produce one value
    ///
    /// Holds when the histogram gives the current slot the whole table and
    /// the symbol is a plain literal. The state is left unchanged, matching
    /// what `count` reads would have done. Prefix-coded streams always
    /// return `None`.
    pub fn is_single_value(&mut self, histo: usize, count: usize) -> Option<u32> {
        if self.code.use_prefix_code || histo >= self.code.num_histograms() {
            return None;
        }
        let symbol = lookup(
            self.code.alias_table(histo),
            self.state & ANS_TAB_MASK,
            self.log_entry_size,
        );
        if symbol.freq != ANS_TAB_SIZE {
            return None;
        }
        if symbol.value >= self.code.uint_configs[histo].split_token() {
            return None;
        }
        let lz77 = &self.code.lz77;
        if lz77.enabled && symbol.value >= lz77.min_symbol {
            return None;
        }
        if let Some(window) = self.window.as_mut() {
            for _ in 0..count {
                window.push(symbol.value);
            }
        }
        Some(symbol.value)
    }

    /// Check that an ANS stream ended in its initial state
    pub fn check_final_state(&self) -> JxlResult<()> {
        let expected = ANS_SIGNATURE << 16;
        if self.state != expected {
            return Err(JxlError::FinalStateMismatch {
                expected,
                actual: self.state,
            });
        }
        Ok(())
    }

    /// Current ANS state
    pub fn state(&self) -> u32 {
        self.state
    }
}
