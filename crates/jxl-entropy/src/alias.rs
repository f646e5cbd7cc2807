//! Alias tables for constant-time ANS symbol lookup
//!
//! The `range` slots of a distribution are split into `2^log_alpha_size`
//! equally sized buckets. Bucket `i` starts with `cutoff` slots of symbol `i`;
//! the rest of the bucket belongs to `right_value`, starting at offset
//! `offsets1` within that symbol's slots.

use jxl_core::{JxlError, JxlResult, ANS_LOG_TAB_SIZE, ANS_TAB_SIZE};

/// One alias table bucket
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AliasEntry {
    cutoff: u16,
    right_value: u16,
    freq0: u16,
    offsets1: u16,
    freq1_xor_freq0: u16,
}

/// Result of looking up an ANS slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AliasSymbol {
    pub value: u32,
    pub freq: u32,
    pub offset: u32,
}

/// Build the alias table for `counts` into `table`
///
/// `counts` must sum to `2^log_range`; `table` must hold exactly
/// `2^log_alpha_size` entries.
pub fn init_alias_table(
    counts: &[u32],
    log_range: u32,
    log_alpha_size: u32,
    table: &mut [AliasEntry],
) -> JxlResult<()> {
    let range = 1u32 << log_range;
    let table_size = 1usize << log_alpha_size;
    assert!(
        table_size as u32 <= range && table.len() == table_size,
        "alias table of {} entries for range {}",
        table.len(),
        range
    );

    let len = counts.iter().rposition(|&c| c != 0).map_or(0, |p| p + 1);
    let empty = [range];
    let counts = if len == 0 { &empty[..] } else { &counts[..len] };
    if counts.len() > table_size {
        return Err(JxlError::AlphabetTooLarge {
            size: counts.len(),
            max: table_size,
        });
    }

    let entry_size = range >> log_alpha_size;
    let sum: u64 = counts.iter().map(|&c| c as u64).sum();
    if sum != range as u64 {
        return Err(JxlError::InvalidHistogram(format!(
            "counts sum to {}, expected {}",
            sum, range
        )));
    }

    // A symbol owning every slot must leave the decoder state untouched
    if let Some(sym) = counts.iter().position(|&c| c == range) {
        for (i, entry) in table.iter_mut().enumerate() {
            *entry = AliasEntry {
                cutoff: 0,
                right_value: sym as u16,
                freq0: 0,
                offsets1: (entry_size as usize * i) as u16,
                freq1_xor_freq0: range as u16,
            };
        }
        return Ok(());
    }

    let mut cutoffs = vec![0u32; table_size];
    let mut underfull = Vec::with_capacity(table_size);
    let mut overfull = Vec::with_capacity(table_size);
    for (i, &count) in counts.iter().enumerate() {
        cutoffs[i] = count;
        if count > entry_size {
            overfull.push(i);
        } else if count < entry_size {
            underfull.push(i);
        }
    }
    underfull.extend(counts.len()..table_size);

    table.fill(AliasEntry::default());
    while let Some(o) = overfull.pop() {
        let u = underfull.pop().ok_or_else(|| {
            JxlError::InvalidHistogram("alias table construction ran out of buckets".to_string())
        })?;
        let underfull_by = entry_size - cutoffs[u];
        cutoffs[o] -= underfull_by;
        table[u].right_value = o as u16;
        table[u].offsets1 = cutoffs[o] as u16;
        if cutoffs[o] < entry_size {
            underfull.push(o);
        } else if cutoffs[o] > entry_size {
            overfull.push(o);
        }
    }

    for (i, entry) in table.iter_mut().enumerate() {
        if cutoffs[i] == entry_size {
            entry.right_value = i as u16;
            entry.offsets1 = 0;
            entry.cutoff = 0;
        } else {
            entry.offsets1 -= cutoffs[i] as u16;
            entry.cutoff = cutoffs[i] as u16;
        }
        let freq0 = counts.get(i).copied().unwrap_or(0);
        let freq1 = counts.get(entry.right_value as usize).copied().unwrap_or(0);
        entry.freq0 = freq0 as u16;
        entry.freq1_xor_freq0 = (freq1 ^ freq0) as u16;
    }
    Ok(())
}

/// Map an ANS slot to its symbol, frequency and offset within the symbol
#[inline]
pub fn lookup(table: &[AliasEntry], slot: u32, log_entry_size: u32) -> AliasSymbol {
    let i = (slot >> log_entry_size) as usize;
    let pos = slot & ((1 << log_entry_size) - 1);
    let entry = table[i];
    let freq0 = entry.freq0 as u32;
    if pos < entry.cutoff as u32 {
        AliasSymbol {
            value: i as u32,
            freq: freq0,
            offset: pos,
        }
    } else {
        AliasSymbol {
            value: entry.right_value as u32,
            freq: freq0 ^ entry.freq1_xor_freq0 as u32,
            offset: entry.offsets1 as u32 + pos,
        }
    }
}

/// log2 of the bucket size of an ANS table with `2^log_alpha_size` buckets
#[inline]
pub fn log_entry_size(log_alpha_size: u32) -> u32 {
    ANS_LOG_TAB_SIZE - log_alpha_size
}

/// Encoder-side view of one symbol: its frequency and the slot for each offset
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnsEncSymbolInfo {
    pub freq: u32,
    pub reverse_map: Vec<u16>,
}

/// Invert the alias table of an ANS histogram
///
/// The encoder must pick, for state residue `r`, the slot whose lookup yields
/// offset `r`; enumerating every slot makes this exact for any table layout.
pub fn build_encoding_info(
    counts: &[u32],
    log_alpha_size: u32,
) -> JxlResult<Vec<AnsEncSymbolInfo>> {
    let mut table = vec![AliasEntry::default(); 1 << log_alpha_size];
    init_alias_table(counts, ANS_LOG_TAB_SIZE, log_alpha_size, &mut table)?;

    let mut info: Vec<AnsEncSymbolInfo> = counts
        .iter()
        .map(|&freq| AnsEncSymbolInfo {
            freq,
            reverse_map: vec![0; freq as usize],
        })
        .collect();
    let log_entry = log_entry_size(log_alpha_size);
    for slot in 0..ANS_TAB_SIZE {
        let sym = lookup(&table, slot, log_entry);
        let symbol_info = info.get_mut(sym.value as usize).ok_or_else(|| {
            JxlError::EncodingError(format!("slot {} maps to unknown symbol {}", slot, sym.value))
        })?;
        symbol_info.reverse_map[sym.offset as usize] = slot as u16;
    }
    Ok(info)
}
