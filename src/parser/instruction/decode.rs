//! Instruction decoding from binary format.
//!
//! Opcodes are looked up in the registry; the definition's
//! [`ImmediateKind`] tells the decoder what follows. Structured instructions
//! are decoded recursively so the result is a tree, not a flat stream with
//! `end` markers.

use super::{BlockType, Immediate, ImmediateKind, Instruction, MemArg};
use crate::parser::codec::{decode_ref_type, Binable};
use crate::parser::encoding::{OP_ELSE, OP_END};
use crate::parser::error::{DecodeError, DecodeErrorKind};
use crate::parser::limits::{MAX_BR_TABLE_LABELS, MAX_NESTING_DEPTH, MAX_SELECT_TYPED_VALUES};
use crate::parser::module::ValueType;
use crate::parser::reader::Reader;
use crate::registry::{registry, InstructionDef, OpcodeEntry};

enum Terminator {
    End,
    Else,
}

/// Decodes instructions up to and including the terminating `end`.
pub fn decode_expression(reader: &mut Reader) -> Result<Vec<Instruction>, DecodeError> {
    let (body, _) = decode_sequence(reader, false, 0)?;
    Ok(body)
}

fn decode_sequence(
    reader: &mut Reader,
    in_if: bool,
    depth: u32,
) -> Result<(Vec<Instruction>, Terminator), DecodeError> {
    let mut body = Vec::new();
    loop {
        let offset = reader.pos();
        match reader.read_byte()? {
            OP_END => return Ok((body, Terminator::End)),
            OP_ELSE if in_if => return Ok((body, Terminator::Else)),
            OP_ELSE => return Err(reader.error_at(offset, DecodeErrorKind::UnexpectedElse)),
            byte => {
                let def = lookup(reader, byte, offset)?;
                let immediate = decode_immediate(reader, def.immediate, depth)?;
                body.push(Instruction::new(def.name, immediate));
            }
        }
    }
}

fn lookup(reader: &mut Reader, byte: u8, offset: usize) -> Result<&'static InstructionDef, DecodeError> {
    let entry = registry()
        .lookup_opcode(byte)
        .map_err(|e| reader.error_at(offset, e.into()))?;
    match entry {
        OpcodeEntry::Instruction(def) => Ok(def),
        OpcodeEntry::Prefix(prefix) => {
            let subcode = reader.read_vu32()?;
            registry()
                .lookup_subcode(prefix, subcode)
                .map_err(|e| reader.error_at(offset, e.into()))
        }
    }
}

fn decode_immediate(reader: &mut Reader, kind: ImmediateKind, depth: u32) -> Result<Immediate, DecodeError> {
    let immediate = match kind {
        ImmediateKind::None => Immediate::None,
        ImmediateKind::I32 => Immediate::I32(reader.read_vs32()?),
        ImmediateKind::I64 => Immediate::I64(reader.read_vs64()?),
        ImmediateKind::F32 => Immediate::F32(reader.read_f32()?),
        ImmediateKind::F64 => Immediate::F64(reader.read_f64()?),
        ImmediateKind::V128 => Immediate::V128(reader.read_v128()?),
        ImmediateKind::Shuffle => Immediate::Shuffle(reader.read_v128()?),
        ImmediateKind::Index => Immediate::Index(reader.read_vu32()?),
        ImmediateKind::IndexPair => {
            let a = reader.read_vu32()?;
            let b = reader.read_vu32()?;
            Immediate::IndexPair(a, b)
        }
        ImmediateKind::MemArg { .. } => Immediate::MemArg(MemArg::decode(reader)?),
        ImmediateKind::Lane { .. } => Immediate::Lane(reader.read_byte()?),
        ImmediateKind::BrTable => {
            let count = reader.read_count("br_table labels", MAX_BR_TABLE_LABELS)?;
            let labels = (0..count).map(|_| reader.read_vu32()).collect::<Result<Vec<_>, _>>()?;
            let default = reader.read_vu32()?;
            Immediate::BrTable { labels, default }
        }
        ImmediateKind::CallIndirect => {
            let type_index = reader.read_vu32()?;
            let table_index = reader.read_vu32()?;
            Immediate::CallIndirect { type_index, table_index }
        }
        ImmediateKind::SelectTypes => {
            let count = reader.read_count("select types", MAX_SELECT_TYPED_VALUES)?;
            let types = (0..count).map(|_| ValueType::decode(reader)).collect::<Result<Vec<_>, _>>()?;
            Immediate::ValueTypes(types)
        }
        ImmediateKind::RefType => Immediate::RefType(decode_ref_type(reader)?),
        ImmediateKind::Reserved => {
            reader.expect_byte(0x00)?;
            Immediate::Reserved
        }
        ImmediateKind::Block => {
            let block_type = BlockType::decode(reader)?;
            let (body, _) = decode_nested(reader, false, depth)?;
            Immediate::Block { block_type, body }
        }
        ImmediateKind::If => {
            let block_type = BlockType::decode(reader)?;
            let (then, terminator) = decode_nested(reader, true, depth)?;
            let else_ = match terminator {
                Terminator::Else => Some(decode_nested(reader, false, depth)?.0),
                Terminator::End => None,
            };
            Immediate::If {
                block_type,
                then,
                else_,
            }
        }
    };
    Ok(immediate)
}

fn decode_nested(
    reader: &mut Reader,
    in_if: bool,
    depth: u32,
) -> Result<(Vec<Instruction>, Terminator), DecodeError> {
    if depth >= MAX_NESTING_DEPTH {
        return Err(reader.error(DecodeErrorKind::LimitExceeded {
            what: "nested blocks",
            count: depth as u64 + 1,
            limit: MAX_NESTING_DEPTH,
        }));
    }
    decode_sequence(reader, in_if, depth + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::LookupError;

    fn decode(bytes: &[u8]) -> Result<Vec<Instruction>, DecodeError> {
        decode_expression(&mut Reader::new(bytes))
    }

    #[test]
    fn test_decode_flat_body() {
        let body = decode(&[0x20, 0x00, 0x20, 0x01, 0x6A, 0x0B]).unwrap();
        assert_eq!(
            body,
            vec![
                Instruction::new("local.get", Immediate::Index(0)),
                Instruction::new("local.get", Immediate::Index(1)),
                Instruction::plain("i32.add"),
            ]
        );
    }

    #[test]
    fn test_decode_nested_if_else() {
        let body = decode(&[0x04, 0x7F, 0x41, 0x01, 0x05, 0x41, 0x02, 0x0B, 0x0B]).unwrap();
        assert_eq!(body.len(), 1);
        match &body[0].immediate {
            Immediate::If { then, else_, .. } => {
                assert_eq!(then, &vec![Instruction::new("i32.const", Immediate::I32(1))]);
                assert_eq!(else_, &Some(vec![Instruction::new("i32.const", Immediate::I32(2))]));
            }
            other => panic!("expected if, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_prefixed() {
        let body = decode(&[0xFD, 0x85, 0x02, 0xFE, 0x03, 0x00, 0x0B]).unwrap();
        assert_eq!(body[0].name, "f32x4.relaxed_madd");
        assert_eq!(body[1], Instruction::new("atomic.fence", Immediate::Reserved));
    }

    #[test]
    fn test_unknown_subcode_names_both_bytes() {
        let err = decode(&[0x01, 0xFD, 0xFF, 0x07, 0x0B]).unwrap_err();
        assert_eq!(err.offset, 1);
        assert_eq!(
            err.kind,
            DecodeErrorKind::UnknownInstruction(LookupError::UnknownSubcode {
                prefix: 0xFD,
                subcode: 0x3FF
            })
        );
        assert!(err.to_string().contains("0xfd"));
        assert!(err.to_string().contains("0x3ff"));
    }

    #[test]
    fn test_unexpected_else_and_truncation() {
        let err = decode(&[0x01, 0x05, 0x0B]).unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::UnexpectedElse);
        assert_eq!(err.offset, 1);

        let err = decode(&[0x02, 0x40, 0x01]).unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::UnexpectedEof);
        assert_eq!(err.offset, 3);
    }
}
