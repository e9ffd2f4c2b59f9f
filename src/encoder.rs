//! Encodes a [`Module`] to WebAssembly binary format (`.wasm`).
//!
//! This is the inverse of [`crate::parser::parse`]. Given a module produced
//! by [`crate::builder::ModuleBuilder::build`] or decoded from bytes, it
//! emits the binary encoding defined by the WebAssembly core specification.
//!
//! # Binary format overview
//!
//! A WebAssembly binary begins with a magic number (`\0asm`) and version (1),
//! followed by sections in a fixed order. Each section is encoded as:
//!
//! ```text
//! section_id: u8 | byte_length: vu32 | contents: byte*
//! ```
//!
//! Sections are emitted only when present (non-empty). The encoder produces
//! minimal LEB128 encoding for all integer values.
//!
//! # Example
//!
//! ```
//! use wasmforge::encoder;
//! use wasmforge::parser::module::Module;
//!
//! let bytes = encoder::encode(&Module::default()).unwrap();
//! assert_eq!(bytes, b"\0asm\x01\0\0\0");
//! ```

use std::fmt;

use tracing::trace;

use crate::parser::codec::Binable;
use crate::parser::encoding::{
    section_name, write_name, write_section, write_u8vec, write_vu32, DATA_ACTIVE, DATA_ACTIVE_EXPLICIT, DATA_PASSIVE,
    DESC_FUNC, DESC_GLOBAL, DESC_MEMORY, DESC_TABLE, ELEM_ACTIVE_EXPRS, ELEM_ACTIVE_TABLE_EXPRS,
    ELEM_DECLARATIVE_EXPRS, ELEM_PASSIVE_EXPRS, MAGIC, SECTION_CODE, SECTION_CUSTOM, SECTION_DATA,
    SECTION_DATA_COUNT, SECTION_ELEMENT, SECTION_EXPORT, SECTION_FUNCTION, SECTION_GLOBAL, SECTION_IMPORT,
    SECTION_MEMORY, SECTION_START, SECTION_TABLE, SECTION_TYPE, VERSION,
};
use crate::parser::instruction::{encode_expression, Instruction};
use crate::parser::module::{DataMode, ElementMode, ImportDesc, Module, ValueType};
use crate::registry::LookupError;

// ===========================================================================
// Error type
// ===========================================================================

/// Errors that can occur during binary encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum EncodeError {
    /// An instruction's mnemonic is not in the registry.
    UnknownInstruction(LookupError),
    /// The module is internally inconsistent.
    InvalidState(String),
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeError::UnknownInstruction(err) => write!(f, "cannot encode instruction: {err}"),
            EncodeError::InvalidState(msg) => write!(f, "invalid state: {msg}"),
        }
    }
}

impl std::error::Error for EncodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EncodeError::UnknownInstruction(err) => Some(err),
            EncodeError::InvalidState(_) => None,
        }
    }
}

impl From<LookupError> for EncodeError {
    fn from(err: LookupError) -> EncodeError {
        EncodeError::UnknownInstruction(err)
    }
}

// ===========================================================================
// Public API
// ===========================================================================

/// Encodes a WebAssembly module to binary format.
///
/// The inverse of [`crate::parser::parse`].
pub fn encode(module: &Module) -> Result<Vec<u8>, EncodeError> {
    let mut buf = Vec::new();

    buf.extend_from_slice(&MAGIC);
    buf.extend_from_slice(&VERSION.to_le_bytes());

    // Sections in wire order
    encode_type_section(&mut buf, module);
    encode_import_section(&mut buf, module);
    encode_function_section(&mut buf, module);
    encode_table_section(&mut buf, module);
    encode_memory_section(&mut buf, module);
    encode_global_section(&mut buf, module)?;
    encode_export_section(&mut buf, module);
    encode_start_section(&mut buf, module);
    encode_element_section(&mut buf, module)?;
    encode_data_count_section(&mut buf, module)?;
    encode_code_section(&mut buf, module)?;
    encode_data_section(&mut buf, module)?;
    encode_custom_sections(&mut buf, module);

    Ok(buf)
}

// ===========================================================================
// Section encoders (in wire order)
// ===========================================================================

/// Type section (id 1).
fn encode_type_section(buf: &mut Vec<u8>, module: &Module) {
    if module.types.is_empty() {
        return;
    }
    let mut contents = Vec::new();
    module.types.encode(&mut contents);
    emit_section(buf, SECTION_TYPE, &contents);
}

/// Import section (id 2): imported functions, tables, memories, globals.
///
/// ```text
/// importsec ::= section_2(vec(import))
/// import    ::= module:name name:name importdesc
/// importdesc ::= 0x00 typeidx | 0x01 tabletype | 0x02 memtype | 0x03 globaltype
/// ```
fn encode_import_section(buf: &mut Vec<u8>, module: &Module) {
    if module.imports.is_empty() {
        return;
    }

    let mut contents = Vec::new();
    write_vu32(&mut contents, module.imports.len() as u32);
    for import in &module.imports {
        write_name(&mut contents, &import.module);
        write_name(&mut contents, &import.name);
        match &import.desc {
            ImportDesc::Function(type_index) => {
                contents.push(DESC_FUNC);
                type_index.encode(&mut contents);
            }
            ImportDesc::Table(table_type) => {
                contents.push(DESC_TABLE);
                table_type.encode(&mut contents);
            }
            ImportDesc::Memory(memory_type) => {
                contents.push(DESC_MEMORY);
                memory_type.encode(&mut contents);
            }
            ImportDesc::Global(global_type) => {
                contents.push(DESC_GLOBAL);
                global_type.encode(&mut contents);
            }
        }
    }
    emit_section(buf, SECTION_IMPORT, &contents);
}

/// One type index per defined function.
fn encode_function_section(buf: &mut Vec<u8>, module: &Module) {
    if module.functions.is_empty() {
        return;
    }

    let mut contents = Vec::new();
    write_vu32(&mut contents, module.functions.len() as u32);
    for func in &module.functions {
        write_vu32(&mut contents, func.type_index);
    }
    emit_section(buf, SECTION_FUNCTION, &contents);
}

fn encode_table_section(buf: &mut Vec<u8>, module: &Module) {
    if module.tables.is_empty() {
        return;
    }
    let mut contents = Vec::new();
    module.tables.encode(&mut contents);
    emit_section(buf, SECTION_TABLE, &contents);
}

/// Memories, with the shared flag folded into the limits byte.
fn encode_memory_section(buf: &mut Vec<u8>, module: &Module) {
    if module.memories.is_empty() {
        return;
    }
    let mut contents = Vec::new();
    module.memories.encode(&mut contents);
    emit_section(buf, SECTION_MEMORY, &contents);
}

fn encode_global_section(buf: &mut Vec<u8>, module: &Module) -> Result<(), EncodeError> {
    if module.globals.is_empty() {
        return Ok(());
    }

    let mut contents = Vec::new();
    write_vu32(&mut contents, module.globals.len() as u32);
    for global in &module.globals {
        global.global_type.encode(&mut contents);
        encode_expression(&mut contents, &global.init)?;
    }
    emit_section(buf, SECTION_GLOBAL, &contents);
    Ok(())
}

fn encode_export_section(buf: &mut Vec<u8>, module: &Module) {
    if module.exports.is_empty() {
        return;
    }

    let mut contents = Vec::new();
    write_vu32(&mut contents, module.exports.len() as u32);
    for export in &module.exports {
        write_name(&mut contents, &export.name);
        contents.push(export.kind.wire_byte());
        write_vu32(&mut contents, export.index);
    }
    emit_section(buf, SECTION_EXPORT, &contents);
}

fn encode_start_section(buf: &mut Vec<u8>, module: &Module) {
    let Some(start) = module.start else {
        return;
    };
    let mut contents = Vec::new();
    write_vu32(&mut contents, start);
    emit_section(buf, SECTION_START, &contents);
}

/// Element section (id 9): table initialisation segments.
///
/// Segments are always written in the expression encodings (flags 4-7);
/// decoded function-index segments were normalised to `ref.func` entries.
///
/// ```text
/// elemsec ::= section_9(vec(elem))
/// elem    ::= 4 expr vec(expr)                  (active, table 0, funcref)
///           | 5 reftype vec(expr)               (passive)
///           | 6 tableidx expr reftype vec(expr) (active, explicit table)
///           | 7 reftype vec(expr)               (declarative)
/// ```
fn encode_element_section(buf: &mut Vec<u8>, module: &Module) -> Result<(), EncodeError> {
    if module.elements.is_empty() {
        return Ok(());
    }

    let mut contents = Vec::new();
    write_vu32(&mut contents, module.elements.len() as u32);
    for elem in &module.elements {
        match &elem.mode {
            ElementMode::Active { table_index: 0, offset } if elem.ref_type == ValueType::FuncRef => {
                write_vu32(&mut contents, ELEM_ACTIVE_EXPRS);
                encode_expression(&mut contents, offset)?;
            }
            ElementMode::Active { table_index, offset } => {
                write_vu32(&mut contents, ELEM_ACTIVE_TABLE_EXPRS);
                write_vu32(&mut contents, *table_index);
                encode_expression(&mut contents, offset)?;
                elem.ref_type.encode(&mut contents);
            }
            ElementMode::Passive => {
                write_vu32(&mut contents, ELEM_PASSIVE_EXPRS);
                elem.ref_type.encode(&mut contents);
            }
            ElementMode::Declarative => {
                write_vu32(&mut contents, ELEM_DECLARATIVE_EXPRS);
                elem.ref_type.encode(&mut contents);
            }
        }
        write_vu32(&mut contents, elem.init.len() as u32);
        for init in &elem.init {
            encode_expression(&mut contents, init)?;
        }
    }
    emit_section(buf, SECTION_ELEMENT, &contents);
    Ok(())
}

/// DataCount section (id 12): count of data segments.
///
/// Written only when the module carries one, which keeps decoded modules
/// byte-stable. Must precede the code section.
///
/// ```text
/// datacountsec ::= section_12(u32)
/// ```
fn encode_data_count_section(buf: &mut Vec<u8>, module: &Module) -> Result<(), EncodeError> {
    let Some(count) = module.data_count else {
        return Ok(());
    };
    if count as usize != module.data.len() {
        return Err(EncodeError::InvalidState(format!(
            "data count {count} but {} data segments",
            module.data.len()
        )));
    }
    let mut contents = Vec::new();
    write_vu32(&mut contents, count);
    emit_section(buf, SECTION_DATA_COUNT, &contents);
    Ok(())
}

/// Code section (id 10): function bodies (locals + instructions).
///
/// ```text
/// codesec ::= section_10(vec(code))
/// code    ::= size:u32 func
/// func    ::= vec(locals) expr
/// locals  ::= n:u32 t:valtype
/// ```
fn encode_code_section(buf: &mut Vec<u8>, module: &Module) -> Result<(), EncodeError> {
    if module.functions.is_empty() {
        return Ok(());
    }

    let mut contents = Vec::new();
    write_vu32(&mut contents, module.functions.len() as u32);

    for func in &module.functions {
        let mut func_buf = Vec::new();

        let runs = compress_locals(&func.locals);
        write_vu32(&mut func_buf, runs.len() as u32);
        for (count, ty) in runs {
            write_vu32(&mut func_buf, count);
            ty.encode(&mut func_buf);
        }
        encode_expression(&mut func_buf, &func.body)?;

        // Length-prefixed function body
        write_u8vec(&mut contents, &func_buf);
    }
    emit_section(buf, SECTION_CODE, &contents);
    Ok(())
}

/// Run-length groups of equal consecutive local types.
fn compress_locals(locals: &[ValueType]) -> Vec<(u32, ValueType)> {
    let mut runs: Vec<(u32, ValueType)> = Vec::new();
    for &ty in locals {
        match runs.last_mut() {
            Some((count, last)) if *last == ty => *count += 1,
            _ => runs.push((1, ty)),
        }
    }
    runs
}

/// Data section (id 11): memory initialisation segments.
///
/// ```text
/// datasec ::= section_11(vec(data))
/// data    ::= 0x00 expr vec(byte)         (active, memory 0)
///           | 0x01 vec(byte)              (passive)
///           | 0x02 memidx expr vec(byte)  (active, explicit memory)
/// ```
fn encode_data_section(buf: &mut Vec<u8>, module: &Module) -> Result<(), EncodeError> {
    if module.data.is_empty() {
        return Ok(());
    }

    let mut contents = Vec::new();
    write_vu32(&mut contents, module.data.len() as u32);

    for seg in &module.data {
        match &seg.mode {
            DataMode::Active { memory_index: 0, offset } => {
                write_vu32(&mut contents, DATA_ACTIVE);
                encode_expression(&mut contents, offset)?;
            }
            DataMode::Active { memory_index, offset } => {
                write_vu32(&mut contents, DATA_ACTIVE_EXPLICIT);
                write_vu32(&mut contents, *memory_index);
                encode_expression(&mut contents, offset)?;
            }
            DataMode::Passive => write_vu32(&mut contents, DATA_PASSIVE),
        }
        write_u8vec(&mut contents, &seg.init);
    }
    emit_section(buf, SECTION_DATA, &contents);
    Ok(())
}

/// Custom sections (id 0): emitted after all standard sections.
///
/// ```text
/// customsec ::= section_0(name byte*)
/// ```
///
/// Custom sections may appear anywhere; their position relative to the
/// standard sections is not preserved.
fn encode_custom_sections(buf: &mut Vec<u8>, module: &Module) {
    for custom in &module.custom {
        let mut contents = Vec::new();
        write_name(&mut contents, &custom.name);
        contents.extend_from_slice(&custom.data);
        emit_section(buf, SECTION_CUSTOM, &contents);
    }
}

// ===========================================================================
// Shared helpers
// ===========================================================================

fn emit_section(buf: &mut Vec<u8>, id: u8, contents: &[u8]) {
    trace!("{} section: {} bytes at offset {:#x}", section_name(id), contents.len(), buf.len());
    write_section(buf, id, contents);
}

/// Encodes a single constant or body expression, e.g. for tests.
pub fn expression_bytes(instructions: &[Instruction]) -> Result<Vec<u8>, EncodeError> {
    let mut buf = Vec::new();
    encode_expression(&mut buf, instructions)?;
    Ok(buf)
}
