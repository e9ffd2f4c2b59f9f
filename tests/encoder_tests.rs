//! Encoder tests: byte-exact re-encoding, encode stability, and LEB128.
//!
//! Testing strategy: "encode stability". Decoding bytes A and encoding the
//! result gives bytes B; decoding B must give back the same Module and
//! encoding it again must reproduce B. Canonical fixtures are additionally
//! expected to come back byte for byte.

mod common;

#[cfg(test)]
mod tests {
    use crate::common::{load_fixtures, module_fixture};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use rstest::rstest;
    use wasmforge::encoder::{self, EncodeError};
    use wasmforge::parser::encoding::{write_vs32, write_vs64, write_vu32, write_vu64};
    use wasmforge::parser::instruction::{Immediate, Instruction};
    use wasmforge::parser::module::{Function, FunctionType, Module};
    use wasmforge::parser::reader::Reader;
    use wasmforge::parser::{self, encoding};

    fn reencode(bytes: &[u8]) -> Vec<u8> {
        let module = parser::parse(bytes).unwrap_or_else(|e| panic!("decode failed: {e}"));
        encoder::encode(&module).unwrap_or_else(|e| panic!("encode failed: {e}"))
    }

    #[rstest]
    #[case("add_call")]
    #[case("imports")]
    #[case("memory_data")]
    #[case("control")]
    #[case("simd")]
    #[case("atomics")]
    #[case("globals")]
    fn canonical_fixture_round_trips_exactly(#[case] name: &str) {
        let fixture = module_fixture(name);
        assert!(fixture.canonical);
        assert_eq!(reencode(&fixture.bin.0), fixture.bin.0, "{name} changed on re-encode");
    }

    #[test]
    fn every_fixture_is_encode_stable() {
        for fixture in load_fixtures().modules {
            let first = parser::parse(&fixture.bin.0).unwrap();
            let bytes_a = encoder::encode(&first).unwrap();
            assert_eq!(&bytes_a[0..4], b"\0asm", "encoded bytes should start with wasm magic");

            let second = parser::parse(&bytes_a).unwrap_or_else(|e| panic!("{}: re-parse failed: {e}", fixture.name));
            assert_eq!(first, second, "{}: module changed through encoding", fixture.name);
            let bytes_b = encoder::encode(&second).unwrap();
            assert_eq!(bytes_a, bytes_b, "{}: encode stability failed", fixture.name);
        }
    }

    #[test]
    fn function_index_segments_are_written_as_expressions() {
        let fixture = module_fixture("elements");
        assert!(!fixture.canonical);
        let bytes = reencode(&fixture.bin.0);
        assert_ne!(bytes, fixture.bin.0);

        let module = parser::parse(&bytes).unwrap();
        let element_section = section(&bytes, encoding::SECTION_ELEMENT);
        // count, then the first segment's flags
        assert_eq!(&element_section[..2], &[0x03, 0x04]);
        assert_eq!(module, parser::parse(&fixture.bin.0).unwrap());
    }

    #[test]
    fn custom_sections_move_to_the_end() {
        let fixture = module_fixture("custom");
        let bytes = reencode(&fixture.bin.0);
        assert_eq!(bytes.len(), fixture.bin.0.len());
        // name section: id 0, size 7, "name", two payload bytes
        assert!(bytes.ends_with(&[0x00, 0x07, 0x04, b'n', b'a', b'm', b'e', 0x00, 0x00]));
        assert_eq!(bytes[8], encoding::SECTION_TYPE);
    }

    /// Contents of the first section with `id` (no nested LEB sizes above 127).
    fn section(bytes: &[u8], id: u8) -> &[u8] {
        let mut pos = 8;
        while pos < bytes.len() {
            let size = bytes[pos + 1] as usize;
            if bytes[pos] == id {
                return &bytes[pos + 2..pos + 2 + size];
            }
            pos += 2 + size;
        }
        panic!("no section {id}");
    }

    #[test]
    fn unknown_instruction_fails_to_encode() {
        let module = Module {
            types: vec![FunctionType::default()],
            functions: vec![Function {
                type_index: 0,
                locals: vec![],
                body: vec![Instruction::new("i32.bogus", Immediate::None)],
            }],
            ..Module::default()
        };
        let err = encoder::encode(&module).unwrap_err();
        assert!(matches!(err, EncodeError::UnknownInstruction(_)));
        assert_eq!(err.to_string(), "cannot encode instruction: invalid instruction name \"i32.bogus\"");
    }

    // =======================================================================
    // LEB128
    // =======================================================================

    #[rstest]
    #[case(0, &[0x00])]
    #[case(127, &[0x7F])]
    #[case(128, &[0x80, 0x01])]
    #[case(624485, &[0xE5, 0x8E, 0x26])]
    #[case(u32::MAX, &[0xFF, 0xFF, 0xFF, 0xFF, 0x0F])]
    fn unsigned_leb128(#[case] value: u32, #[case] expected: &[u8]) {
        let mut buf = Vec::new();
        write_vu32(&mut buf, value);
        assert_eq!(buf, expected);
    }

    #[rstest]
    #[case(0, &[0x00])]
    #[case(-1, &[0x7F])]
    #[case(63, &[0x3F])]
    #[case(64, &[0xC0, 0x00])]
    #[case(-64, &[0x40])]
    #[case(-123456, &[0xC0, 0xBB, 0x78])]
    #[case(i32::MIN, &[0x80, 0x80, 0x80, 0x80, 0x78])]
    fn signed_leb128(#[case] value: i32, #[case] expected: &[u8]) {
        let mut buf = Vec::new();
        write_vs32(&mut buf, value);
        assert_eq!(buf, expected);
    }

    fn unsigned_len(bits: u32) -> usize {
        (bits.max(1) as usize).div_ceil(7)
    }

    fn signed_len(v: i64) -> usize {
        // bits needed including the sign bit
        let bits = 65 - if v < 0 { (!v).leading_zeros() } else { v.leading_zeros() };
        (bits as usize).div_ceil(7)
    }

    #[test]
    fn random_leb128_values_are_minimal_and_read_back() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..2000 {
            let shift = rng.gen_range(0..64u32);
            let v64: u64 = rng.gen::<u64>() >> shift;
            let v32 = v64 as u32;
            let s64 = v64 as i64 >> rng.gen_range(0..8u32);
            let s32 = s64 as i32;

            let mut buf = Vec::new();
            write_vu32(&mut buf, v32);
            assert_eq!(buf.len(), unsigned_len(32 - v32.leading_zeros()), "vu32 {v32}");
            assert_eq!(Reader::new(&buf).read_vu32().unwrap(), v32);

            buf.clear();
            write_vu64(&mut buf, v64);
            assert_eq!(buf.len(), unsigned_len(64 - v64.leading_zeros()), "vu64 {v64}");
            assert_eq!(Reader::new(&buf).read_vu64().unwrap(), v64);

            buf.clear();
            write_vs32(&mut buf, s32);
            assert_eq!(buf.len(), signed_len(s32 as i64), "vs32 {s32}");
            assert_eq!(Reader::new(&buf).read_vs32().unwrap(), s32);

            buf.clear();
            write_vs64(&mut buf, s64);
            assert_eq!(buf.len(), signed_len(s64), "vs64 {s64}");
            assert_eq!(Reader::new(&buf).read_vs64().unwrap(), s64);
        }
    }
}
