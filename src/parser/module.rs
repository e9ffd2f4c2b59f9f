//! The frozen, fully-indexed module representation.
//!
//! This is what [`crate::builder::ModuleBuilder::build`] produces, what
//! [`crate::encoder::encode`] serialises and what [`crate::parser::parse`]
//! reconstructs. Every reference is a plain numeric index.

use std::fmt;

use super::encoding;
use super::instruction::Instruction;

/// A WebAssembly value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    I32,
    I64,
    F32,
    F64,
    V128,
    FuncRef,
    ExternRef,
}

impl ValueType {
    pub fn wire_byte(&self) -> u8 {
        match self {
            ValueType::I32 => encoding::VALTYPE_I32,
            ValueType::I64 => encoding::VALTYPE_I64,
            ValueType::F32 => encoding::VALTYPE_F32,
            ValueType::F64 => encoding::VALTYPE_F64,
            ValueType::V128 => encoding::VALTYPE_V128,
            ValueType::FuncRef => encoding::VALTYPE_FUNCREF,
            ValueType::ExternRef => encoding::VALTYPE_EXTERNREF,
        }
    }

    pub fn from_wire_byte(byte: u8) -> Option<ValueType> {
        match byte {
            encoding::VALTYPE_I32 => Some(ValueType::I32),
            encoding::VALTYPE_I64 => Some(ValueType::I64),
            encoding::VALTYPE_F32 => Some(ValueType::F32),
            encoding::VALTYPE_F64 => Some(ValueType::F64),
            encoding::VALTYPE_V128 => Some(ValueType::V128),
            encoding::VALTYPE_FUNCREF => Some(ValueType::FuncRef),
            encoding::VALTYPE_EXTERNREF => Some(ValueType::ExternRef),
            _ => None,
        }
    }

    pub fn is_ref(&self) -> bool {
        matches!(self, ValueType::FuncRef | ValueType::ExternRef)
    }

    pub fn is_num(&self) -> bool {
        matches!(self, ValueType::I32 | ValueType::I64 | ValueType::F32 | ValueType::F64)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValueType::I32 => "i32",
            ValueType::I64 => "i64",
            ValueType::F32 => "f32",
            ValueType::F64 => "f64",
            ValueType::V128 => "v128",
            ValueType::FuncRef => "funcref",
            ValueType::ExternRef => "externref",
        };
        write!(f, "{s}")
    }
}

/// Formats a type sequence as `i32 i64`, used in signatures and error messages.
pub fn format_types(types: &[ValueType]) -> String {
    types.iter().map(|t| t.to_string()).collect::<Vec<_>>().join(" ")
}

/// A function signature.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FunctionType {
    pub params: Vec<ValueType>,
    pub results: Vec<ValueType>,
}

impl FunctionType {
    pub fn new(params: &[ValueType], results: &[ValueType]) -> FunctionType {
        FunctionType {
            params: params.to_vec(),
            results: results.to_vec(),
        }
    }
}

impl fmt::Display for FunctionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}) -> ({})", format_types(&self.params), format_types(&self.results))
    }
}

/// Size limits for tables and memories.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Limits {
    pub min: u32,
    pub max: Option<u32>,
}

impl Limits {
    pub fn new(min: u32, max: Option<u32>) -> Limits {
        Limits { min, max }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableType {
    pub ref_type: ValueType,
    pub limits: Limits,
}

/// Memory type; `shared` comes from the threads proposal and requires a maximum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryType {
    pub limits: Limits,
    pub shared: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalType {
    pub value_type: ValueType,
    pub mutable: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImportDesc {
    Function(u32),
    Table(TableType),
    Memory(MemoryType),
    Global(GlobalType),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Import {
    pub module: String,
    pub name: String,
    pub desc: ImportDesc,
}

/// A module-defined function: the function section entry and its code
/// section body, merged.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub type_index: u32,
    /// Declared locals, expanded (the encoder run-length compresses them).
    pub locals: Vec<ValueType>,
    pub body: Vec<Instruction>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Global {
    pub global_type: GlobalType,
    pub init: Vec<Instruction>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportKind {
    Function,
    Table,
    Memory,
    Global,
}

impl ExportKind {
    pub fn wire_byte(&self) -> u8 {
        match self {
            ExportKind::Function => encoding::DESC_FUNC,
            ExportKind::Table => encoding::DESC_TABLE,
            ExportKind::Memory => encoding::DESC_MEMORY,
            ExportKind::Global => encoding::DESC_GLOBAL,
        }
    }

    pub fn from_wire_byte(byte: u8) -> Option<ExportKind> {
        match byte {
            encoding::DESC_FUNC => Some(ExportKind::Function),
            encoding::DESC_TABLE => Some(ExportKind::Table),
            encoding::DESC_MEMORY => Some(ExportKind::Memory),
            encoding::DESC_GLOBAL => Some(ExportKind::Global),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Export {
    pub name: String,
    pub kind: ExportKind,
    pub index: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElementMode {
    Active { table_index: u32, offset: Vec<Instruction> },
    Passive,
    Declarative,
}

/// Element segment. Entries are always held as constant expressions; segments
/// decoded from the function-index encodings are normalised to `ref.func`.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub mode: ElementMode,
    pub ref_type: ValueType,
    pub init: Vec<Vec<Instruction>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DataMode {
    Active { memory_index: u32, offset: Vec<Instruction> },
    Passive,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Data {
    pub mode: DataMode,
    pub init: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CustomSection {
    pub name: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Module {
    pub types: Vec<FunctionType>,
    pub imports: Vec<Import>,
    pub functions: Vec<Function>,
    pub tables: Vec<TableType>,
    pub memories: Vec<MemoryType>,
    pub globals: Vec<Global>,
    pub exports: Vec<Export>,
    pub start: Option<u32>,
    pub elements: Vec<Element>,
    /// Present only when the input carried a data count section.
    pub data_count: Option<u32>,
    pub data: Vec<Data>,
    pub custom: Vec<CustomSection>,
}

impl Module {
    /// Encodes the module to its binary form.
    pub fn to_bytes(&self) -> Result<Vec<u8>, crate::encoder::EncodeError> {
        crate::encoder::encode(self)
    }

    /// Decodes a binary module.
    pub fn from_bytes(bytes: &[u8]) -> Result<Module, super::DecodeError> {
        super::parse(bytes)
    }

    /// Hands the encoded module to a host engine.
    pub fn instantiate<E: crate::engine::Engine>(&self, engine: &mut E) -> Result<E::Instance, E::Error> {
        let bytes = self.to_bytes()?;
        engine.instantiate(&bytes)
    }

    pub fn imported_function_count(&self) -> u32 {
        self.imports
            .iter()
            .filter(|i| matches!(i.desc, ImportDesc::Function(_)))
            .count() as u32
    }

    /// Signature of a function by index, counting imported functions first.
    pub fn function_type(&self, index: u32) -> Option<&FunctionType> {
        let imported: Vec<u32> = self
            .imports
            .iter()
            .filter_map(|i| match i.desc {
                ImportDesc::Function(type_index) => Some(type_index),
                _ => None,
            })
            .collect();
        let type_index = match imported.get(index as usize) {
            Some(&t) => t,
            None => self.functions.get(index as usize - imported.len())?.type_index,
        };
        self.types.get(type_index as usize)
    }

    /// Looks up an export by name.
    pub fn export(&self, name: &str) -> Option<&Export> {
        self.exports.iter().find(|e| e.name == name)
    }
}
