//! Resolved instructions.
//!
//! An [`Instruction`] is the final form of one operation: its mnemonic plus a
//! concrete [`Immediate`] in which every entity reference is already a
//! numeric index. Opcodes and immediate shapes are not duplicated here; the
//! encoder and decoder look them up in [`crate::registry`].

pub mod decode;
pub mod encode;

pub use decode::decode_expression;
pub use encode::encode_expression;

use std::fmt;

use fhex::ToHex;

use super::module::ValueType;

/// Memory argument for memory access instructions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemArg {
    /// Alignment as a power of 2
    pub align: u32,
    pub offset: u32,
}

/// Block type for structured control instructions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    /// No parameters or results
    Empty,
    /// Single value type result
    Value(ValueType),
    /// Function type index for blocks with parameters or several results
    FuncType(u32),
}

/// Wire shape of an instruction's immediate, as recorded in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImmediateKind {
    None,
    I32,
    I64,
    F32,
    F64,
    V128,
    /// A single `u32` index (label, local, global, function, table, memory)
    Index,
    /// Two `u32` indices (`memory.copy`, `table.copy`)
    IndexPair,
    /// Memory access; `natural` is the log2 of the access width in bytes
    MemArg { natural: u32 },
    /// SIMD lane index below `lanes`
    Lane { lanes: u8 },
    Shuffle,
    BrTable,
    CallIndirect,
    SelectTypes,
    RefType,
    /// A single reserved zero byte (`atomic.fence`)
    Reserved,
    Block,
    If,
}

/// A concrete immediate operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Immediate {
    None,
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    V128([u8; 16]),
    Index(u32),
    IndexPair(u32, u32),
    MemArg(MemArg),
    Lane(u8),
    Shuffle([u8; 16]),
    BrTable { labels: Vec<u32>, default: u32 },
    CallIndirect { type_index: u32, table_index: u32 },
    ValueTypes(Vec<ValueType>),
    RefType(ValueType),
    Reserved,
    Block { block_type: BlockType, body: Vec<Instruction> },
    If {
        block_type: BlockType,
        then: Vec<Instruction>,
        else_: Option<Vec<Instruction>>,
    },
}

impl Immediate {
    /// Whether this immediate has the wire shape `kind` describes.
    pub fn matches(&self, kind: ImmediateKind) -> bool {
        matches!(
            (self, kind),
            (Immediate::None, ImmediateKind::None)
                | (Immediate::I32(_), ImmediateKind::I32)
                | (Immediate::I64(_), ImmediateKind::I64)
                | (Immediate::F32(_), ImmediateKind::F32)
                | (Immediate::F64(_), ImmediateKind::F64)
                | (Immediate::V128(_), ImmediateKind::V128)
                | (Immediate::Index(_), ImmediateKind::Index)
                | (Immediate::IndexPair(..), ImmediateKind::IndexPair)
                | (Immediate::MemArg(_), ImmediateKind::MemArg { .. })
                | (Immediate::Lane(_), ImmediateKind::Lane { .. })
                | (Immediate::Shuffle(_), ImmediateKind::Shuffle)
                | (Immediate::BrTable { .. }, ImmediateKind::BrTable)
                | (Immediate::CallIndirect { .. }, ImmediateKind::CallIndirect)
                | (Immediate::ValueTypes(_), ImmediateKind::SelectTypes)
                | (Immediate::RefType(_), ImmediateKind::RefType)
                | (Immediate::Reserved, ImmediateKind::Reserved)
                | (Immediate::Block { .. }, ImmediateKind::Block)
                | (Immediate::If { .. }, ImmediateKind::If)
        )
    }
}

/// One resolved instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub name: &'static str,
    pub immediate: Immediate,
}

impl Instruction {
    pub fn new(name: &'static str, immediate: Immediate) -> Instruction {
        Instruction { name, immediate }
    }

    /// Instruction without an immediate, e.g. `i32.add`.
    pub fn plain(name: &'static str) -> Instruction {
        Instruction::new(name, Immediate::None)
    }

    /// Number of instructions in this one, counting nested bodies.
    pub fn size(&self) -> usize {
        match &self.immediate {
            Immediate::Block { body, .. } => 1 + body.iter().map(Instruction::size).sum::<usize>(),
            Immediate::If { then, else_, .. } => {
                let else_size: usize = else_.iter().flatten().map(Instruction::size).sum();
                1 + then.iter().map(Instruction::size).sum::<usize>() + else_size
            }
            _ => 1,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.immediate)
    }
}

impl fmt::Display for Immediate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Immediate::None | Immediate::Reserved => Ok(()),
            Immediate::I32(value) => write!(f, " {value}"),
            Immediate::I64(value) => write!(f, " {value}"),
            Immediate::F32(value) => write!(f, " {}", value.to_hex()),
            Immediate::F64(value) => write!(f, " {}", value.to_hex()),
            Immediate::V128(bytes) => write!(f, " 0x{}", hex::encode(bytes)),
            Immediate::Index(idx) => write!(f, " {idx}"),
            Immediate::IndexPair(a, b) => write!(f, " {a} {b}"),
            Immediate::MemArg(memarg) => {
                if memarg.offset != 0 {
                    write!(f, " offset={}", memarg.offset)?;
                }
                write!(f, " align={}", 1u64 << memarg.align.min(63))
            }
            Immediate::Lane(lane) => write!(f, " {lane}"),
            Immediate::Shuffle(lanes) => {
                for lane in lanes {
                    write!(f, " {lane}")?;
                }
                Ok(())
            }
            Immediate::BrTable { labels, default } => {
                for label in labels {
                    write!(f, " {label}")?;
                }
                write!(f, " {default}")
            }
            Immediate::CallIndirect { type_index, table_index } => write!(f, " {table_index} (type {type_index})"),
            Immediate::ValueTypes(types) => {
                for vt in types {
                    write!(f, " {vt}")?;
                }
                Ok(())
            }
            Immediate::RefType(ValueType::FuncRef) => write!(f, " func"),
            Immediate::RefType(ValueType::ExternRef) => write!(f, " extern"),
            Immediate::RefType(other) => write!(f, " {other}"),
            Immediate::Block { block_type, .. } | Immediate::If { block_type, .. } => write!(f, "{block_type}"),
        }
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockType::Empty => Ok(()),
            BlockType::Value(vt) => write!(f, " {vt}"),
            BlockType::FuncType(idx) => write!(f, " type[{idx}]"),
        }
    }
}
