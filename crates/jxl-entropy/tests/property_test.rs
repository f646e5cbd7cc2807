//! Property tests for hybrid integers and whole-stream round trips

use jxl_bitstream::{BitReader, BitWriter};
use jxl_entropy::*;
use proptest::prelude::*;

fn config_strategy() -> impl Strategy<Value = HybridUintConfig> {
    (0u32..=8)
        .prop_flat_map(|split| (Just(split), 0..=split))
        .prop_flat_map(|(split, msb)| (Just(split), Just(msb), 0..=split - msb))
        .prop_map(|(split, msb, lsb)| HybridUintConfig::new(split, msb, lsb))
}

fn params_strategy() -> impl Strategy<Value = HistogramParams> {
    (
        prop_oneof![Just(EntropyMethod::Ans), Just(EntropyMethod::Prefix)],
        prop_oneof![Just(UintMethod::Default), Just(UintMethod::Best)],
        prop_oneof![
            Just(Lz77Method::None),
            Just(Lz77Method::Rle),
            Just(Lz77Method::Greedy)
        ],
        1usize..=8,
        prop_oneof![Just(0u32), Just(1), Just(32)],
    )
        .prop_map(|(entropy, uint, lz77, max_histograms, multiplier)| {
            HistogramParams::new()
                .entropy_method(entropy)
                .uint_method(uint)
                .lz77_method(lz77)
                .max_histograms(max_histograms)
                .distance_multiplier(multiplier)
        })
}

proptest! {
    #[test]
    fn hybrid_uint_round_trip(config in config_strategy(), value in any::<u32>()) {
        let (token, nbits, bits) = config.encode(value);
        prop_assert_eq!(config.raw_bits_for_token(token), nbits);
        prop_assert_eq!(config.reconstruct(token, nbits, bits), value);

        let mut buf = Vec::new();
        {
            let mut writer = BitWriter::new(&mut buf);
            writer.write_bits(bits as u64, nbits as usize).unwrap();
        }
        let mut br = BitReader::new(&buf);
        prop_assert_eq!(config.decode(token, &mut br).unwrap(), value);
    }

    #[test]
    fn hybrid_uint_raw_bits_fit(config in config_strategy(), value in any::<u32>()) {
        let (token, nbits, bits) = config.encode(value);
        prop_assert!(nbits < 32);
        prop_assert!((bits as u64) < 1u64 << nbits);
        if value < config.split_token() {
            prop_assert_eq!((token, nbits), (value, 0));
        }
    }

    #[test]
    fn stream_round_trip(
        params in params_strategy(),
        num_contexts in 1usize..6,
        raw in prop::collection::vec(
            (0u32..6, prop_oneof![0u32..8, 0u32..300, any::<u32>()]),
            0..400,
        ),
    ) {
        let tokens: Vec<Token> = raw
            .iter()
            .map(|&(ctx, value)| Token::new(ctx % num_contexts as u32, value))
            .collect();
        let mut coded = vec![tokens.clone()];
        let mut buf = Vec::new();
        {
            let mut writer = BitWriter::new(&mut buf);
            let codes =
                build_and_encode_histograms(&params, num_contexts, &mut coded, &mut writer)
                    .unwrap();
            write_tokens(&coded[0], &codes, &mut writer).unwrap();
        }

        let mut br = BitReader::new(&buf);
        let code = decode_histograms(&mut br, num_contexts, false).unwrap();
        let mut reader = AnsSymbolReader::new(&code, &mut br, params.distance_multiplier).unwrap();
        for token in &tokens {
            let value = reader.read_hybrid_uint(token.context as usize, &mut br).unwrap();
            prop_assert_eq!(value, token.value);
        }
        prop_assert!(reader.check_final_state().is_ok());
    }
}
