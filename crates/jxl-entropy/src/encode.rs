//! Entropy encoder
//!
//! Callers collect [`Token`]s per stream, let [`build_and_encode_histograms`]
//! write the histogram set shared by all streams, then write each stream with
//! [`write_tokens`].

use crate::alias::{build_encoding_info, AnsEncSymbolInfo};
use crate::cluster::{cluster_histograms, Histogram};
use crate::context_map::encode_context_map;
use crate::fields::{ceil_log2_nonzero, write_var_len_u16};
use crate::histogram::EncodedHistogram;
use crate::hybrid_uint::HybridUintConfig;
use crate::lz77::{apply_lz77, Lz77Method, Lz77Params};
use crate::prefix::PrefixEncoder;
use jxl_bitstream::BitWriter;
use jxl_core::{
    JxlError, JxlResult, ANS_MAX_ALPHABET_SIZE, ANS_SIGNATURE, MAX_CLUSTERS,
    PREFIX_MAX_ALPHABET_SIZE, PREFIX_MAX_BITS,
};
use log::debug;
use rayon::prelude::*;
use std::io::Write;

/// Smallest `log_alpha_size` an ANS histogram set can signal
const MIN_ANS_LOG_ALPHA_SIZE: u32 = 5;
const MAX_ANS_LOG_ALPHA_SIZE: u32 = 8;

/// Candidate configs searched by [`UintMethod::Best`]
const UINT_CONFIG_CANDIDATES: [HybridUintConfig; 28] = [
    HybridUintConfig::new(4, 2, 0),
    HybridUintConfig::new(4, 1, 0),
    HybridUintConfig::new(4, 2, 1),
    HybridUintConfig::new(4, 2, 2),
    HybridUintConfig::new(4, 1, 2),
    HybridUintConfig::new(5, 2, 0),
    HybridUintConfig::new(5, 1, 0),
    HybridUintConfig::new(5, 2, 1),
    HybridUintConfig::new(5, 2, 2),
    HybridUintConfig::new(5, 1, 2),
    HybridUintConfig::new(3, 2, 0),
    HybridUintConfig::new(3, 1, 0),
    HybridUintConfig::new(3, 2, 1),
    HybridUintConfig::new(3, 1, 2),
    HybridUintConfig::new(4, 1, 3),
    HybridUintConfig::new(5, 1, 4),
    HybridUintConfig::new(5, 2, 3),
    HybridUintConfig::new(6, 1, 5),
    HybridUintConfig::new(6, 2, 4),
    HybridUintConfig::new(6, 0, 0),
    HybridUintConfig::new(0, 0, 0),
    HybridUintConfig::new(2, 0, 1),
    HybridUintConfig::new(7, 0, 0),
    HybridUintConfig::new(8, 0, 0),
    HybridUintConfig::new(9, 0, 0),
    HybridUintConfig::new(10, 0, 0),
    HybridUintConfig::new(11, 0, 0),
    HybridUintConfig::new(12, 0, 0),
];

/// One integer to encode in a given context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub context: u32,
    pub value: u32,
    /// `value` is an LZ77 copy length minus `min_length`
    pub is_lz77_length: bool,
}

impl Token {
    pub fn new(context: u32, value: u32) -> Self {
        Self {
            context,
            value,
            is_lz77_length: false,
        }
    }

    pub fn lz77_length(context: u32, value: u32) -> Self {
        Self {
            context,
            value,
            is_lz77_length: true,
        }
    }
}

/// Symbol coder used for every histogram of a set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EntropyMethod {
    #[default]
    Ans,
    Prefix,
}

/// How hybrid-uint configs are picked per histogram
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum UintMethod {
    /// Always `(4, 2, 0)`
    #[default]
    Default,
    /// Cheapest of a fixed candidate list
    Best,
}

/// Encoder configuration
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HistogramParams {
    pub lz77_method: Lz77Method,
    pub entropy_method: EntropyMethod,
    pub uint_method: UintMethod,
    /// Upper bound on clustered histograms, at most 256
    pub max_histograms: usize,
    /// Row stride for LZ77 special distances; 0 disables them
    pub distance_multiplier: u32,
}

impl Default for HistogramParams {
    fn default() -> Self {
        Self {
            lz77_method: Lz77Method::None,
            entropy_method: EntropyMethod::Ans,
            uint_method: UintMethod::Default,
            max_histograms: MAX_CLUSTERS,
            distance_multiplier: 0,
        }
    }
}

impl HistogramParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lz77_method(mut self, method: Lz77Method) -> Self {
        self.lz77_method = method;
        self
    }

    pub fn entropy_method(mut self, method: EntropyMethod) -> Self {
        self.entropy_method = method;
        self
    }

    pub fn uint_method(mut self, method: UintMethod) -> Self {
        self.uint_method = method;
        self
    }

    pub fn max_histograms(mut self, max_histograms: usize) -> Self {
        self.max_histograms = max_histograms.clamp(1, MAX_CLUSTERS);
        self
    }

    pub fn distance_multiplier(mut self, distance_multiplier: u32) -> Self {
        self.distance_multiplier = distance_multiplier;
        self
    }
}

/// Per-histogram symbol coders
#[derive(Debug, Clone)]
enum SymbolCodes {
    Ans(Vec<Vec<AnsEncSymbolInfo>>),
    Prefix(Vec<PrefixEncoder>),
}

/// Everything [`write_tokens`] needs, produced alongside the header
#[derive(Debug, Clone)]
pub struct EntropyEncodingData {
    context_map: Vec<u8>,
    uint_configs: Vec<HybridUintConfig>,
    lz77: Lz77Params,
    log_alpha_size: u32,
    codes: SymbolCodes,
}

impl EntropyEncodingData {
    /// Cluster of every context; the last entry is the LZ77 distance context
    /// when LZ77 is enabled
    pub fn context_map(&self) -> &[u8] {
        &self.context_map
    }

    pub fn uint_configs(&self) -> &[HybridUintConfig] {
        &self.uint_configs
    }

    pub fn lz77(&self) -> &Lz77Params {
        &self.lz77
    }

    pub fn log_alpha_size(&self) -> u32 {
        self.log_alpha_size
    }

    pub fn num_histograms(&self) -> usize {
        self.uint_configs.len()
    }

    pub fn use_prefix_code(&self) -> bool {
        matches!(self.codes, SymbolCodes::Prefix(_))
    }

    /// `(histogram, symbol, raw bit count, raw bits)` of a token
    fn split(&self, token: &Token) -> JxlResult<(usize, u32, u32, u32)> {
        let histo = *self.context_map.get(token.context as usize).ok_or_else(|| {
            JxlError::EncodingError(format!(
                "token context {} out of {}",
                token.context,
                self.context_map.len()
            ))
        })? as usize;
        if token.is_lz77_length {
            let (symbol, nbits, bits) = self.lz77.length_uint_config.encode(token.value);
            Ok((histo, self.lz77.min_symbol + symbol, nbits, bits))
        } else {
            let (symbol, nbits, bits) = self.uint_configs[histo].encode(token.value);
            Ok((histo, symbol, nbits, bits))
        }
    }
}

/// Symbol a token occupies in its histogram, under `config`
fn token_symbol(token: &Token, config: &HybridUintConfig, lz77: &Lz77Params) -> u32 {
    if token.is_lz77_length {
        lz77.min_symbol + lz77.length_uint_config.encode(token.value).0
    } else {
        config.encode(token.value).0
    }
}

/// Estimated bits for coding `tokens` with `config`, or `None` when a
/// literal token would reach `token_limit`
fn config_cost(
    tokens: &[&Token],
    config: &HybridUintConfig,
    lz77: &Lz77Params,
    token_limit: u32,
) -> Option<f64> {
    let mut histogram = Histogram::default();
    let mut raw_bits = 0u64;
    for token in tokens {
        let symbol = token_symbol(token, config, lz77);
        if !token.is_lz77_length {
            if symbol >= token_limit {
                return None;
            }
            raw_bits += config.encode(token.value).1 as u64;
        }
        histogram.add(symbol);
    }
    // Header estimate: each used symbol costs a few bits to describe
    let used = histogram.counts.iter().filter(|&&c| c > 0).count();
    Some(histogram.entropy_bits() + raw_bits as f64 + 4.0 * used as f64)
}

fn choose_uint_config(
    tokens: &[&Token],
    method: UintMethod,
    lz77: &Lz77Params,
    token_limit: u32,
    max_split_exponent: u32,
) -> HybridUintConfig {
    let default = HybridUintConfig::default();
    if method == UintMethod::Default || tokens.is_empty() {
        return default;
    }
    let mut best = (config_cost(tokens, &default, lz77, token_limit), default);
    for config in UINT_CONFIG_CANDIDATES
        .iter()
        .filter(|c| c.split_exponent() <= max_split_exponent)
    {
        if let Some(cost) = config_cost(tokens, config, lz77, token_limit) {
            if best.0.map_or(true, |b| cost < b) {
                best = (Some(cost), *config);
            }
        }
    }
    best.1
}

/// Build histograms for `streams` over `num_contexts` contexts and write the
/// histogram set header
///
/// LZ77 rewrites `streams` in place when enabled. Every token context must be
/// below `num_contexts`.
pub fn build_and_encode_histograms<W: Write>(
    params: &HistogramParams,
    num_contexts: usize,
    streams: &mut [Vec<Token>],
    w: &mut BitWriter<W>,
) -> JxlResult<EntropyEncodingData> {
    if num_contexts == 0 {
        return Err(JxlError::InvalidParameter(
            "histogram set needs at least one context".to_string(),
        ));
    }
    if let Some(token) = streams.iter().flatten().find(|t| t.context as usize >= num_contexts) {
        return Err(JxlError::InvalidParameter(format!(
            "token context {} out of {}",
            token.context, num_contexts
        )));
    }
    let use_prefix_code = params.entropy_method == EntropyMethod::Prefix;

    let mut lz77 = Lz77Params {
        enabled: true,
        ..Lz77Params::default()
    };
    lz77.enabled = apply_lz77(
        params.lz77_method,
        &lz77,
        num_contexts as u32,
        params.distance_multiplier,
        streams,
    );
    if !lz77.enabled {
        lz77 = Lz77Params::default();
    }
    let num_contexts = if lz77.enabled { num_contexts + 1 } else { num_contexts };

    // Cluster on default-config symbols
    let default_config = HybridUintConfig::default();
    let mut context_histograms = vec![Histogram::default(); num_contexts];
    for token in streams.iter().flatten() {
        context_histograms[token.context as usize].add(token_symbol(token, &default_config, &lz77));
    }
    let (clusters, context_map) = cluster_histograms(&context_histograms, params.max_histograms);
    let num_histograms = clusters.len();

    let mut cluster_tokens: Vec<Vec<&Token>> = vec![Vec::new(); num_histograms];
    for token in streams.iter().flatten() {
        cluster_tokens[context_map[token.context as usize] as usize].push(token);
    }

    let token_limit = match (lz77.enabled, use_prefix_code) {
        (true, _) => lz77.min_symbol,
        (false, true) => PREFIX_MAX_ALPHABET_SIZE as u32,
        (false, false) => ANS_MAX_ALPHABET_SIZE as u32,
    };
    let max_split_exponent = if use_prefix_code {
        PREFIX_MAX_BITS
    } else {
        MAX_ANS_LOG_ALPHA_SIZE
    };
    let uint_configs: Vec<HybridUintConfig> = cluster_tokens
        .par_iter()
        .map(|tokens| {
            choose_uint_config(tokens, params.uint_method, &lz77, token_limit, max_split_exponent)
        })
        .collect();

    let symbol_counts: Vec<Vec<u32>> = cluster_tokens
        .iter()
        .zip(&uint_configs)
        .map(|(tokens, config)| {
            let mut histogram = Histogram::default();
            for token in tokens {
                histogram.add(token_symbol(token, config, &lz77));
            }
            histogram.counts
        })
        .collect();

    // Header
    lz77.write(w)?;
    if num_contexts > 1 {
        encode_context_map(&context_map, num_histograms, w)?;
    }
    w.write_bit(use_prefix_code)?;

    let codes;
    let log_alpha_size;
    if use_prefix_code {
        log_alpha_size = PREFIX_MAX_BITS;
        for config in &uint_configs {
            config.write(log_alpha_size, w)?;
        }
        let encoders: Vec<PrefixEncoder> = symbol_counts
            .par_iter()
            .map(|counts| PrefixEncoder::from_freqs(counts))
            .collect();
        for encoder in &encoders {
            write_var_len_u16(encoder.alphabet_size() as u32 - 1, w)?;
        }
        for encoder in &encoders {
            encoder.write_tree(w)?;
        }
        codes = SymbolCodes::Prefix(encoders);
    } else {
        let max_alphabet = symbol_counts.iter().map(Vec::len).max().unwrap_or(1).max(1);
        let max_split = uint_configs.iter().map(|c| c.split_exponent()).max().unwrap_or(0);
        log_alpha_size = ceil_log2_nonzero(max_alphabet as u32)
            .max(max_split)
            .max(MIN_ANS_LOG_ALPHA_SIZE);
        if log_alpha_size > MAX_ANS_LOG_ALPHA_SIZE {
            return Err(JxlError::AlphabetTooLarge {
                size: max_alphabet,
                max: ANS_MAX_ALPHABET_SIZE,
            });
        }
        w.write_bits((log_alpha_size - MIN_ANS_LOG_ALPHA_SIZE) as u64, 2)?;
        for config in &uint_configs {
            config.write(log_alpha_size, w)?;
        }
        let histograms = symbol_counts
            .par_iter()
            .map(|counts| EncodedHistogram::choose(counts))
            .collect::<JxlResult<Vec<_>>>()?;
        let mut infos = Vec::with_capacity(histograms.len());
        for histogram in &histograms {
            histogram.write(w)?;
            infos.push(build_encoding_info(&histogram.counts, log_alpha_size)?);
        }
        codes = SymbolCodes::Ans(infos);
    }

    debug!(
        "encoded {} histograms for {} contexts ({}, log_alpha_size {}, lz77 {})",
        num_histograms,
        num_contexts,
        if use_prefix_code { "prefix" } else { "ANS" },
        log_alpha_size,
        lz77.enabled
    );

    Ok(EntropyEncodingData {
        context_map,
        uint_configs,
        lz77,
        log_alpha_size,
        codes,
    })
}

/// Write one stream of tokens with the codes of its histogram set
pub fn write_tokens<W: Write>(
    tokens: &[Token],
    codes: &EntropyEncodingData,
    w: &mut BitWriter<W>,
) -> JxlResult<()> {
    match &codes.codes {
        SymbolCodes::Prefix(encoders) => {
            for token in tokens {
                let (histo, symbol, nbits, bits) = codes.split(token)?;
                encoders[histo].write_symbol(symbol, w)?;
                w.write_bits(bits as u64, nbits as usize)?;
            }
            Ok(())
        }
        SymbolCodes::Ans(infos) => write_ans_tokens(tokens, codes, infos, w),
    }
}

/// ANS decodes last-in first-out, so tokens are coded back to front and the
/// resulting chunks written in reverse after the final state
fn write_ans_tokens<W: Write>(
    tokens: &[Token],
    codes: &EntropyEncodingData,
    infos: &[Vec<AnsEncSymbolInfo>],
    w: &mut BitWriter<W>,
) -> JxlResult<()> {
    let mut chunks: Vec<(u32, u32)> = Vec::with_capacity(tokens.len() * 2);
    let mut state = ANS_SIGNATURE << 16;
    for token in tokens.iter().rev() {
        let (histo, symbol, nbits, bits) = codes.split(token)?;
        let info = infos[histo]
            .get(symbol as usize)
            .filter(|info| info.freq > 0)
            .ok_or_else(|| {
                JxlError::EncodingError(format!(
                    "symbol {} has no slots in histogram {}",
                    symbol, histo
                ))
            })?;
        chunks.push((bits, nbits));
        if (state >> 20) >= info.freq {
            chunks.push((state & 0xFFFF, 16));
            state >>= 16;
        }
        state = ((state / info.freq) << 12) + info.reverse_map[(state % info.freq) as usize] as u32;
    }
    w.write_bits(state as u64, 32)?;
    for &(bits, nbits) in chunks.iter().rev() {
        w.write_bits(bits as u64, nbits as usize)?;
    }
    Ok(())
}
