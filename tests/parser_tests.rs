//! Decoder tests against binary fixtures.
//!
//! The fixtures in `tests/fixtures/modules.json` are hand-assembled modules
//! (base64) that a conformant engine accepts, plus malformed inputs paired
//! with the message the decoder must produce.

mod common;

#[cfg(test)]
mod tests {
    use crate::common::{load_fixtures, malformed_fixture, module_fixture};
    use rstest::rstest;
    use wasmforge::parser::codec::decode_at;
    use wasmforge::parser::encoding::SECTION_CODE;
    use wasmforge::parser::instruction::{BlockType, Immediate, Instruction, MemArg};
    use wasmforge::parser::module::{
        DataMode, ElementMode, ExportKind, FunctionType, ImportDesc, Limits, MemoryType, Module, ValueType,
    };
    use wasmforge::parser::{self, DecodeErrorKind};

    fn decode(name: &str) -> Module {
        let fixture = module_fixture(name);
        parser::parse(&fixture.bin.0).unwrap_or_else(|e| panic!("{name}: {e}"))
    }

    fn i(name: &'static str, immediate: Immediate) -> Instruction {
        Instruction::new(name, immediate)
    }

    fn plain(name: &'static str) -> Instruction {
        Instruction::plain(name)
    }

    #[rstest]
    #[case("add_call")]
    #[case("imports")]
    #[case("memory_data")]
    #[case("elements")]
    #[case("control")]
    #[case("simd")]
    #[case("atomics")]
    #[case("custom")]
    #[case("globals")]
    fn decodes_fixture(#[case] name: &str) {
        let fixture = module_fixture(name);
        let module = parser::parse(&fixture.bin.0).unwrap_or_else(|e| panic!("{name}: {e}"));
        let exports: Vec<&str> = module.exports.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(exports, fixture.exports);
        for func in &module.functions {
            assert!((func.type_index as usize) < module.types.len());
        }
    }

    #[test]
    fn every_malformed_fixture_is_rejected() {
        for fixture in load_fixtures().malformed {
            match parser::parse(&fixture.bin.0) {
                Ok(_) => panic!("{} decoded but should not", fixture.name),
                Err(err) => assert!(
                    err.to_string().contains(&fixture.error),
                    "{}: {err} does not mention {:?}",
                    fixture.name,
                    fixture.error
                ),
            }
        }
    }

    #[test]
    fn unknown_opcode_reports_offset_and_section() {
        let fixture = malformed_fixture("unknown_opcode");
        let err = parser::parse(&fixture.bin.0).unwrap_err();
        assert_eq!(err.offset, 0x17);
        assert_eq!(err.section, Some(SECTION_CODE));
        assert_eq!(
            err.to_string(),
            "malformed binary at offset 0x17 in code section: invalid opcode 0xff"
        );
    }

    #[test]
    fn overlong_section_size() {
        let fixture = malformed_fixture("overlong_leb");
        let err = parser::parse(&fixture.bin.0).unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::IntegerTooLong);
        assert_eq!(err.offset, 9);
        assert_eq!(err.section, None);
    }

    #[test]
    fn internal_call() {
        let module = decode("add_call");
        assert_eq!(
            module.types,
            vec![
                FunctionType::new(&[ValueType::I32, ValueType::I32], &[ValueType::I32]),
                FunctionType::new(&[ValueType::I32], &[ValueType::I32]),
            ]
        );
        assert_eq!(
            module.functions[0].body,
            vec![
                i("local.get", Immediate::Index(0)),
                i("local.get", Immediate::Index(1)),
                plain("i32.add"),
                i("call", Immediate::Index(1)),
            ]
        );
    }

    #[test]
    fn imports_of_every_kind() {
        let module = decode("imports");
        let kinds: Vec<&str> = module
            .imports
            .iter()
            .map(|i| match i.desc {
                ImportDesc::Function(_) => "func",
                ImportDesc::Table(_) => "table",
                ImportDesc::Memory(_) => "memory",
                ImportDesc::Global(_) => "global",
            })
            .collect();
        assert_eq!(kinds, ["func", "table", "memory", "global"]);
        assert_eq!(
            module.imports[2].desc,
            ImportDesc::Memory(MemoryType {
                limits: Limits::new(1, Some(2)),
                shared: false,
            })
        );
        assert_eq!(module.imported_function_count(), 1);
        assert_eq!(module.start, Some(1));
        assert_eq!(module.function_type(1), Some(&FunctionType::new(&[], &[])));
    }

    #[test]
    fn memory_and_data_segments() {
        let module = decode("memory_data");
        assert_eq!(module.memories[0].limits, Limits::new(1, Some(4)));
        assert_eq!(module.data_count, Some(2));
        assert_eq!(
            module.functions[0].locals,
            vec![ValueType::I32, ValueType::I32, ValueType::I64]
        );
        assert!(module.functions[0].body.contains(&i("memory.copy", Immediate::IndexPair(0, 0))));
        assert_eq!(
            module.functions[0].body.last(),
            Some(&i("i32.load", Immediate::MemArg(MemArg { align: 2, offset: 4 })))
        );

        assert_eq!(
            module.data[0].mode,
            DataMode::Active {
                memory_index: 0,
                offset: vec![i("i32.const", Immediate::I32(0))],
            }
        );
        assert_eq!(module.data[0].init, vec![42, 0, 0, 0, 7]);
        assert_eq!(module.data[1].mode, DataMode::Passive);
        assert_eq!(module.data[1].init, vec![0xDE, 0xAD]);
    }

    #[test]
    fn element_segments_are_normalised() {
        let module = decode("elements");
        let [active, passive, declarative] = &module.elements[..] else {
            panic!("expected three segments, got {}", module.elements.len());
        };

        assert_eq!(
            active.mode,
            ElementMode::Active {
                table_index: 0,
                offset: vec![i("i32.const", Immediate::I32(0))],
            }
        );
        assert_eq!(
            active.init,
            vec![
                vec![i("ref.func", Immediate::Index(0))],
                vec![i("ref.func", Immediate::Index(1))],
            ]
        );
        assert_eq!(passive.mode, ElementMode::Passive);
        assert_eq!(
            passive.init[1],
            vec![i("ref.null", Immediate::RefType(ValueType::FuncRef))]
        );
        assert_eq!(declarative.mode, ElementMode::Declarative);
        assert_eq!(declarative.ref_type, ValueType::FuncRef);

        assert_eq!(
            module.functions[0].body[1],
            i(
                "call_indirect",
                Immediate::CallIndirect {
                    type_index: 0,
                    table_index: 0
                }
            )
        );
    }

    #[test]
    fn structured_bodies_nest() {
        let module = decode("control");
        let body = &module.functions[0].body;
        assert_eq!(body.len(), 9);
        assert_eq!(
            body[1].immediate,
            Immediate::Block {
                block_type: BlockType::FuncType(1),
                body: vec![i("i32.const", Immediate::I32(1))],
            }
        );

        let Immediate::Block { block_type, body: outer } = &body[3].immediate else {
            panic!("expected block, got {}", body[3]);
        };
        assert_eq!(*block_type, BlockType::Empty);
        assert_eq!(outer[1..], [i("i32.const", Immediate::I32(100)), plain("return")]);
        let Immediate::Block { body: inner, .. } = &outer[0].immediate else {
            panic!("expected inner block, got {}", outer[0]);
        };
        assert_eq!(
            inner[1].immediate,
            Immediate::BrTable {
                labels: vec![0, 1],
                default: 1
            }
        );

        assert_eq!(body[4].name, "loop");
        assert_eq!(
            body[7].immediate,
            Immediate::If {
                block_type: BlockType::Value(ValueType::I32),
                then: vec![i("i32.const", Immediate::I32(1))],
                else_: Some(vec![i("i32.const", Immediate::I32(2))]),
            }
        );
    }

    #[test]
    fn vector_instructions() {
        let module = decode("simd");
        let body = &module.functions[0].body;
        let mut lanes = [0u8; 16];
        for (n, lane) in lanes.iter_mut().enumerate() {
            *lane = n as u8;
        }
        assert_eq!(body[0], i("v128.const", Immediate::V128(lanes)));
        assert_eq!(body[2], plain("i32x4.splat"));
        assert_eq!(body[3].name, "i8x16.shuffle");
        assert_eq!(body.last(), Some(&i("i32x4.extract_lane", Immediate::Lane(2))));
    }

    #[test]
    fn shared_memory_and_atomics() {
        let module = decode("atomics");
        assert_eq!(
            module.memories,
            vec![MemoryType {
                limits: Limits::new(1, Some(1)),
                shared: true,
            }]
        );
        let body = &module.functions[0].body;
        assert_eq!(
            body[2],
            i("i32.atomic.rmw.add", Immediate::MemArg(MemArg { align: 2, offset: 0 }))
        );
        assert_eq!(body[3], i("atomic.fence", Immediate::Reserved));
    }

    #[test]
    fn custom_sections_are_kept_in_order() {
        let module = decode("custom");
        let names: Vec<&str> = module.custom.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["first", "between", "name"]);
        assert_eq!(module.custom[0].data, vec![1, 2]);
        assert!(module.custom[1].data.is_empty());
    }

    #[test]
    fn globals_and_reference_types() {
        let module = decode("globals");
        assert_eq!(module.globals[0].init, vec![i("i64.const", Immediate::I64(-42))]);
        assert!(module.globals[1].global_type.mutable);
        assert_eq!(module.globals[2].init, vec![i("f64.const", Immediate::F64(3.5))]);
        assert_eq!(module.globals[3].global_type.value_type, ValueType::ExternRef);
        assert_eq!(
            module.globals[3].init,
            vec![i("ref.null", Immediate::RefType(ValueType::ExternRef))]
        );

        let counter = module.export("counter").unwrap();
        assert_eq!((counter.kind, counter.index), (ExportKind::Global, 1));
    }

    #[test]
    fn decode_at_reports_consumed_bytes() {
        let bytes = [0xAA, 0x60, 0x02, 0x7F, 0x7E, 0x01, 0x7D, 0xBB];
        let (ty, consumed) = decode_at::<FunctionType>(&bytes, 1).unwrap();
        assert_eq!(ty, FunctionType::new(&[ValueType::I32, ValueType::I64], &[ValueType::F32]));
        assert_eq!(consumed, 6);

        let (value, consumed) = decode_at::<i32>(&[0xC0, 0xBB, 0x78], 0).unwrap();
        assert_eq!((value, consumed), (-123456, 3));

        let err = decode_at::<FunctionType>(&bytes, 0).unwrap_err();
        assert_eq!(
            err.kind,
            DecodeErrorKind::UnexpectedByte {
                expected: 0x60,
                found: 0xAA
            }
        );
    }
}
