//! Malformed and boundary-case streams

use jxl_bitstream::{BitReader, BitWriter};
use jxl_core::{JxlError, ANS_TAB_SIZE};
use jxl_entropy::alias::{init_alias_table, lookup, AliasEntry};
use jxl_entropy::histogram::EncodedHistogram;
use jxl_entropy::*;

fn bits(build: impl FnOnce(&mut BitWriter<&mut Vec<u8>>)) -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let mut writer = BitWriter::new(&mut buf);
        build(&mut writer);
    }
    buf
}

#[test]
fn test_flat_histogram_split() {
    assert_eq!(create_flat_histogram(3, 16), vec![6, 5, 5]);
    let flat = create_flat_histogram(7, ANS_TAB_SIZE);
    assert_eq!(flat.iter().sum::<u32>(), ANS_TAB_SIZE);
    assert!(flat.iter().all(|&c| c == 585 || c == 586));
}

#[test]
fn test_alias_table_sixteen_entries() {
    let counts = [3u32, 1, 0, 7, 5];
    let mut table = vec![AliasEntry::default(); 16];
    init_alias_table(&counts, 4, 4, &mut table).unwrap();
    let mut seen = [0u32; 5];
    let mut offsets: Vec<Vec<u32>> = vec![Vec::new(); 5];
    for slot in 0..16 {
        let symbol = lookup(&table, slot, 0);
        seen[symbol.value as usize] += 1;
        assert_eq!(symbol.freq, counts[symbol.value as usize]);
        offsets[symbol.value as usize].push(symbol.offset);
    }
    assert_eq!(seen, counts);
    for (symbol, mut offs) in offsets.into_iter().enumerate() {
        offs.sort_unstable();
        assert_eq!(offs, (0..counts[symbol]).collect::<Vec<_>>());
    }
}

#[test]
fn test_single_symbol_scenario() {
    // Simple histogram of one symbol: counts [4096]
    let data = bits(|w| {
        w.write_bit(false).unwrap(); // no LZ77
        w.write_bit(false).unwrap(); // ANS
        w.write_bits(0, 2).unwrap(); // log_alpha_size 5
        HybridUintConfig::default().write(5, w).unwrap();
        w.write_bit(true).unwrap();
        w.write_bit(false).unwrap();
        w.write_bit(false).unwrap();
        w.write_bits(0x13 << 16, 32).unwrap();
    });
    let mut br = BitReader::new(&data);
    let histogram = {
        let mut br = BitReader::new(&data);
        br.skip_bits(4 + 8).unwrap();
        read_histogram(12, &mut br).unwrap()
    };
    assert_eq!(histogram, vec![ANS_TAB_SIZE]);

    let code = decode_histograms(&mut br, 1, false).unwrap();
    let mut reader = AnsSymbolReader::new(&code, &mut br, 0).unwrap();
    assert_eq!(reader.is_single_value(0, 64), Some(0));
    assert_eq!(reader.read_hybrid_uint(0, &mut br).unwrap(), 0);
    reader.check_final_state().unwrap();
}

#[test]
fn test_simple_histogram_duplicate_symbols() {
    let data = bits(|w| {
        w.write_bit(true).unwrap();
        w.write_bit(true).unwrap(); // two symbols
        for _ in 0..2 {
            w.write_bit(true).unwrap();
            w.write_bits(0, 3).unwrap(); // symbol 1
        }
        w.write_bits(100, 12).unwrap();
    });
    let mut br = BitReader::new(&data);
    assert!(matches!(
        read_histogram(12, &mut br),
        Err(JxlError::InvalidHistogram(_))
    ));
}

#[test]
fn test_flat_histogram_alphabet_sizes() {
    let flat = |var_len: u64| {
        bits(|w| {
            w.write_bit(false).unwrap();
            w.write_bit(true).unwrap();
            w.write_bit(true).unwrap();
            w.write_bits(7, 3).unwrap();
            w.write_bits(var_len, 7).unwrap();
        })
    };
    // 128 + 125 + 1 = 254 symbols
    let data = flat(125);
    let mut br = BitReader::new(&data);
    assert_eq!(read_histogram(12, &mut br).unwrap().len(), 254);

    // The largest encodable alphabet is 256, never an empty one
    let data = flat(127);
    let mut br = BitReader::new(&data);
    assert_eq!(read_histogram(12, &mut br).unwrap(), vec![16; 256]);
}

#[test]
fn test_bit_flips_keep_histogram_sum() {
    let encoded = EncodedHistogram::choose(&[500, 300, 200, 100, 50]).unwrap();
    let mut data = bits(|w| encoded.write(w).unwrap());
    // Corrupting bits inside the header breaks the sum in most positions;
    // every outcome must be an error or a histogram that sums to the table size
    for byte in 0..data.len() {
        for bit in 0..8 {
            data[byte] ^= 1 << bit;
            let mut br = BitReader::new(&data);
            if let Ok(counts) = read_histogram(12, &mut br) {
                assert_eq!(counts.iter().sum::<u32>(), ANS_TAB_SIZE);
            }
            data[byte] ^= 1 << bit;
        }
    }
}

#[test]
fn test_truncated_stream() {
    let streams = vec![(0..500u32).map(|i| Token::new(0, i % 37)).collect::<Vec<_>>()];
    let mut coded = streams.clone();
    let data = bits(|w| {
        let codes =
            build_and_encode_histograms(&HistogramParams::default(), 1, &mut coded, w).unwrap();
        write_tokens(&coded[0], &codes, w).unwrap();
    });
    let truncated = &data[..data.len() / 2];
    let mut br = BitReader::new(truncated);
    let code = decode_histograms(&mut br, 1, false).unwrap();
    let mut reader = AnsSymbolReader::new(&code, &mut br, 0).unwrap();
    let result: Result<Vec<u32>, JxlError> = (0..500)
        .map(|_| reader.read_hybrid_uint(0, &mut br))
        .collect();
    assert!(matches!(result, Err(JxlError::UnexpectedEof { .. })));
}

#[test]
fn test_corrupted_tokens_fail_final_state() {
    let streams = vec![(0..400u32).map(|i| Token::new(0, (i * 7) % 23)).collect::<Vec<_>>()];
    let mut coded = streams.clone();
    let mut header_bits = 0;
    let mut data = bits(|w| {
        let codes =
            build_and_encode_histograms(&HistogramParams::default(), 1, &mut coded, w).unwrap();
        header_bits = w.bits_written();
        write_tokens(&coded[0], &codes, w).unwrap();
    });
    // Flip a bit in the initial state
    data[header_bits / 8 + 2] ^= 0x10;
    let mut br = BitReader::new(&data);
    let code = decode_histograms(&mut br, 1, false).unwrap();
    let mut reader = AnsSymbolReader::new(&code, &mut br, 0).unwrap();
    let decoded: Result<Vec<u32>, JxlError> = (0..400)
        .map(|_| reader.read_hybrid_uint(0, &mut br))
        .collect();
    // Either the symbols or the final state must give the corruption away
    if let Ok(decoded) = decoded {
        let expected: Vec<u32> = streams[0].iter().map(|t| t.value).collect();
        assert!(decoded != expected || reader.check_final_state().is_err());
    }
}

#[test]
fn test_lz77_disallowed_in_nested_map() {
    // A context map of two entries whose nested histograms enable LZ77
    let data = bits(|w| {
        w.write_bit(false).unwrap(); // outer LZ77
        w.write_bit(false).unwrap(); // not a simple map
        w.write_bit(false).unwrap(); // no MTF
        Lz77Params {
            enabled: true,
            ..Lz77Params::default()
        }
        .write(w)
        .unwrap();
    });
    let mut br = BitReader::new(&data);
    assert!(matches!(
        decode_histograms(&mut br, 2, false),
        Err(JxlError::Lz77Disallowed)
    ));
}

#[test]
fn test_prefix_alphabet_too_large() {
    let data = bits(|w| {
        w.write_bit(false).unwrap(); // no LZ77
        w.write_bit(true).unwrap(); // prefix codes
        HybridUintConfig::default().write(15, w).unwrap();
        // VarLenUint16 of 65535: alphabet of 65536 symbols
        w.write_bit(true).unwrap();
        w.write_bits(15, 4).unwrap();
        w.write_bits(0x7FFF, 15).unwrap();
    });
    let mut br = BitReader::new(&data);
    assert!(matches!(
        decode_histograms(&mut br, 1, false),
        Err(JxlError::AlphabetTooLarge { .. })
    ));
}

#[test]
fn test_lz77_distance_clamped_at_start() {
    // A copy as the very first symbol reads from the zeroed window
    let lz77 = Lz77Params {
        enabled: true,
        min_symbol: 224,
        min_length: 3,
        length_uint_config: HybridUintConfig::new(0, 0, 0),
    };
    let data = bits(|w| {
        lz77.write(w).unwrap();
        // Two contexts: literal context and distance context, simple map 0/1
        w.write_bit(true).unwrap();
        w.write_bits(1, 2).unwrap();
        w.write_bit(false).unwrap();
        w.write_bit(true).unwrap();
        w.write_bit(true).unwrap(); // prefix codes
        HybridUintConfig::default().write(15, w).unwrap();
        HybridUintConfig::default().write(15, w).unwrap();
        // Alphabet sizes: 225 and 1, so both codes are single-symbol
        w.write_bit(true).unwrap();
        w.write_bits(7, 4).unwrap();
        w.write_bits(224 - 128, 7).unwrap();
        w.write_bit(false).unwrap();
        // Simple code with one symbol: 224 (a length token)
        w.write_bits(1, 2).unwrap();
        w.write_bits(0, 2).unwrap();
        w.write_bits(224, 8).unwrap();
        // Distance token 0 needs no bits; length token 0 has no raw bits
    });
    let mut br = BitReader::new(&data);
    let code = decode_histograms(&mut br, 1, false).unwrap();
    assert!(code.lz77().enabled);
    assert_eq!(code.context_map(), &[0, 1]);
    let mut reader = AnsSymbolReader::new(&code, &mut br, 0).unwrap();
    for _ in 0..6 {
        assert_eq!(reader.read_hybrid_uint(0, &mut br).unwrap(), 0);
    }
}
