//! Instruction encoding to binary format

use super::{Immediate, Instruction};
use crate::parser::codec::Binable;
use crate::parser::encoding::{OP_ELSE, OP_END};
use crate::registry::{registry, LookupError};

impl Instruction {
    /// Appends opcode and immediate. Structured instructions include their
    /// nested bodies and closing `end`.
    pub fn encode(&self, buf: &mut Vec<u8>) -> Result<(), LookupError> {
        let def = registry().lookup(self.name)?;
        def.opcode.encode(buf);
        self.immediate.encode(buf)
    }
}

impl Immediate {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), LookupError> {
        match self {
            Immediate::None => {}
            Immediate::I32(value) => value.encode(buf),
            Immediate::I64(value) => value.encode(buf),
            Immediate::F32(value) => value.encode(buf),
            Immediate::F64(value) => value.encode(buf),
            Immediate::V128(bytes) | Immediate::Shuffle(bytes) => bytes.encode(buf),
            Immediate::Index(idx) => idx.encode(buf),
            Immediate::IndexPair(a, b) => {
                a.encode(buf);
                b.encode(buf);
            }
            Immediate::MemArg(memarg) => memarg.encode(buf),
            Immediate::Lane(lane) => buf.push(*lane),
            Immediate::BrTable { labels, default } => {
                labels.encode(buf);
                default.encode(buf);
            }
            Immediate::CallIndirect { type_index, table_index } => {
                type_index.encode(buf);
                table_index.encode(buf);
            }
            Immediate::ValueTypes(types) => types.encode(buf),
            Immediate::RefType(ty) => ty.encode(buf),
            Immediate::Reserved => buf.push(0x00),
            Immediate::Block { block_type, body } => {
                block_type.encode(buf);
                encode_expression(buf, body)?;
            }
            Immediate::If {
                block_type,
                then,
                else_,
            } => {
                block_type.encode(buf);
                encode_sequence(buf, then)?;
                if let Some(else_) = else_ {
                    buf.push(OP_ELSE);
                    encode_sequence(buf, else_)?;
                }
                buf.push(OP_END);
            }
        }
        Ok(())
    }
}

fn encode_sequence(buf: &mut Vec<u8>, instructions: &[Instruction]) -> Result<(), LookupError> {
    for instruction in instructions {
        instruction.encode(buf)?;
    }
    Ok(())
}

/// Encodes an instruction sequence terminated by `end`: a function body,
/// block body or constant expression.
pub fn encode_expression(buf: &mut Vec<u8>, instructions: &[Instruction]) -> Result<(), LookupError> {
    encode_sequence(buf, instructions)?;
    buf.push(OP_END);
    Ok(())
}

/// Convenience for tests and debugging: one instruction to bytes.
pub fn to_bytes(instruction: &Instruction) -> Result<Vec<u8>, LookupError> {
    let mut buf = Vec::new();
    instruction.encode(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::instruction::{BlockType, MemArg};
    use crate::parser::module::ValueType;

    fn bytes(instruction: Instruction) -> Vec<u8> {
        to_bytes(&instruction).unwrap()
    }

    #[test]
    fn test_encode_single_byte_opcodes() {
        assert_eq!(bytes(Instruction::plain("i32.add")), vec![0x6A]);
        assert_eq!(bytes(Instruction::new("i32.const", Immediate::I32(-1))), vec![0x41, 0x7F]);
        assert_eq!(bytes(Instruction::new("call", Immediate::Index(3))), vec![0x10, 0x03]);
        assert_eq!(
            bytes(Instruction::new("i64.load", Immediate::MemArg(MemArg { align: 3, offset: 16 }))),
            vec![0x29, 0x03, 0x10]
        );
    }

    #[test]
    fn test_encode_prefixed_opcodes() {
        assert_eq!(bytes(Instruction::new("memory.fill", Immediate::Index(0))), vec![0xFC, 0x0B, 0x00]);
        assert_eq!(bytes(Instruction::plain("i32x4.add")), vec![0xFD, 0xAE, 0x01]);
        assert_eq!(bytes(Instruction::plain("f32x4.relaxed_madd")), vec![0xFD, 0x85, 0x02]);
        assert_eq!(bytes(Instruction::new("atomic.fence", Immediate::Reserved)), vec![0xFE, 0x03, 0x00]);
    }

    #[test]
    fn test_encode_structured() {
        let instr = Instruction::new(
            "if",
            Immediate::If {
                block_type: BlockType::Value(ValueType::I32),
                then: vec![Instruction::new("i32.const", Immediate::I32(1))],
                else_: Some(vec![Instruction::new("i32.const", Immediate::I32(2))]),
            },
        );
        assert_eq!(bytes(instr), vec![0x04, 0x7F, 0x41, 0x01, 0x05, 0x41, 0x02, 0x0B]);

        let instr = Instruction::new(
            "loop",
            Immediate::Block {
                block_type: BlockType::Empty,
                body: vec![Instruction::new("br", Immediate::Index(0))],
            },
        );
        assert_eq!(bytes(instr), vec![0x03, 0x40, 0x0C, 0x00, 0x0B]);
    }

    #[test]
    fn test_encode_unknown_name() {
        let err = to_bytes(&Instruction::plain("i32.frobnicate")).unwrap_err();
        assert_eq!(err, LookupError::UnknownMnemonic("i32.frobnicate".to_string()));
    }
}
