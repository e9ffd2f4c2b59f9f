//! Binary decoding.
//!
//! [`parse`] reads a complete `.wasm` file into a [`module::Module`]. Section
//! framing, ordering and size accounting are handled here; the per-type
//! codecs live in [`codec`] and instruction bodies in [`instruction`].

pub mod codec;
pub mod encoding;
pub mod error;
pub mod instruction;
pub mod limits;
pub mod module;
pub mod reader;

use tracing::trace;

pub use error::{DecodeError, DecodeErrorKind};

use codec::{decode_ref_type, Binable};
use encoding::{
    section_order, DATA_ACTIVE, DATA_ACTIVE_EXPLICIT, DATA_PASSIVE, DESC_FUNC, DESC_GLOBAL, DESC_MEMORY, DESC_TABLE,
    ELEMKIND_FUNCREF, ELEM_ACTIVE_EXPRS, ELEM_ACTIVE_FUNCS, ELEM_ACTIVE_TABLE_EXPRS, ELEM_ACTIVE_TABLE_FUNCS,
    ELEM_DECLARATIVE_EXPRS, ELEM_DECLARATIVE_FUNCS, ELEM_PASSIVE_EXPRS, ELEM_PASSIVE_FUNCS, MAGIC, SECTION_CODE,
    SECTION_CUSTOM, SECTION_DATA, SECTION_DATA_COUNT, SECTION_ELEMENT, SECTION_EXPORT, SECTION_FUNCTION,
    SECTION_GLOBAL, SECTION_IMPORT, SECTION_MEMORY, SECTION_START, SECTION_TABLE, SECTION_TYPE, VERSION,
};
use instruction::{decode_expression, Immediate, Instruction};
use module::{
    CustomSection, Data, DataMode, Element, ElementMode, Export, ExportKind, Function, FunctionType, Global,
    GlobalType, Import, ImportDesc, MemoryType, Module, TableType, ValueType,
};
use reader::Reader;

/// Decodes a binary module.
///
/// Custom sections may appear anywhere; every other section at most once and
/// in wire order. Each section must consume exactly its declared size.
pub fn parse(bytes: &[u8]) -> Result<Module, DecodeError> {
    let mut reader = Reader::new(bytes);
    read_header(&mut reader)?;

    let mut module = Module::default();
    let mut function_types: Option<Vec<u32>> = None;
    let mut bodies: Option<Vec<(Vec<ValueType>, Vec<Instruction>)>> = None;
    let mut last_order = 0u8;

    while !reader.is_empty() {
        let id_offset = reader.pos();
        let id = reader.read_byte()?;
        let size = reader.read_vu32()? as usize;
        let start = reader.pos();
        if !reader.has_at_least(size) {
            return Err(reader.error_at(bytes.len(), DecodeErrorKind::UnexpectedEof));
        }
        trace!("section {id} at {id_offset:#x}, {size} bytes");

        if id != SECTION_CUSTOM {
            let order = section_order(id);
            if order <= last_order {
                return Err(reader.error_at(id_offset, DecodeErrorKind::SectionOutOfOrder(id)));
            }
            last_order = order;
        }

        // Reads past the section end fail as truncation at the section boundary.
        let mut section = Reader::at(&bytes[..start + size], start);
        section.set_section(Some(id));

        match id {
            SECTION_CUSTOM => module.custom.push(read_custom_section(&mut section)?),
            SECTION_TYPE => module.types = read_vec(&mut section, "types", limits::MAX_TYPES, FunctionType::decode)?,
            SECTION_IMPORT => module.imports = read_vec(&mut section, "imports", limits::MAX_IMPORTS, read_import)?,
            SECTION_FUNCTION => {
                function_types = Some(read_vec(&mut section, "functions", limits::MAX_FUNCTIONS, |r| {
                    r.read_vu32()
                })?)
            }
            SECTION_TABLE => module.tables = read_vec(&mut section, "tables", limits::MAX_TABLES, TableType::decode)?,
            SECTION_MEMORY => {
                module.memories = read_vec(&mut section, "memories", limits::MAX_MEMORIES, MemoryType::decode)?
            }
            SECTION_GLOBAL => module.globals = read_vec(&mut section, "globals", limits::MAX_GLOBALS, read_global)?,
            SECTION_EXPORT => module.exports = read_vec(&mut section, "exports", limits::MAX_EXPORTS, read_export)?,
            SECTION_START => module.start = Some(section.read_vu32()?),
            SECTION_ELEMENT => {
                module.elements = read_vec(&mut section, "element segments", limits::MAX_ELEMENT_SEGMENTS, read_element)?
            }
            SECTION_DATA_COUNT => module.data_count = Some(section.read_vu32()?),
            SECTION_CODE => bodies = Some(read_vec(&mut section, "function bodies", limits::MAX_FUNCTIONS, read_body)?),
            SECTION_DATA => module.data = read_vec(&mut section, "data segments", limits::MAX_DATA_SEGMENTS, read_data)?,
            _ => return Err(reader.error_at(id_offset, DecodeErrorKind::UnknownSection(id))),
        }

        let consumed = section.pos() - start;
        if consumed != size {
            return Err(section.error(DecodeErrorKind::SectionSizeMismatch {
                declared: size,
                consumed,
            }));
        }
        reader.read_bytes(size)?;
    }

    let function_types = function_types.unwrap_or_default();
    let bodies = bodies.unwrap_or_default();
    if function_types.len() != bodies.len() {
        return Err(reader.error(DecodeErrorKind::FunctionCodeMismatch {
            functions: function_types.len(),
            bodies: bodies.len(),
        }));
    }
    module.functions = function_types
        .into_iter()
        .zip(bodies)
        .map(|(type_index, (locals, body))| Function {
            type_index,
            locals,
            body,
        })
        .collect();

    Ok(module)
}

fn read_header(reader: &mut Reader) -> Result<(), DecodeError> {
    if !reader.has_at_least(MAGIC.len()) || reader.read_bytes(MAGIC.len())? != MAGIC {
        return Err(reader.error_at(0, DecodeErrorKind::BadMagic));
    }
    let offset = reader.pos();
    let version = reader.read_u32()?;
    if version != VERSION {
        return Err(reader.error_at(offset, DecodeErrorKind::UnknownVersion(version)));
    }
    Ok(())
}

fn read_vec<T>(
    reader: &mut Reader,
    what: &'static str,
    limit: u32,
    mut read_item: impl FnMut(&mut Reader) -> Result<T, DecodeError>,
) -> Result<Vec<T>, DecodeError> {
    let count = reader.read_count(what, limit)?;
    let mut items = Vec::with_capacity(count as usize);
    for _ in 0..count {
        items.push(read_item(reader)?);
    }
    Ok(items)
}

fn read_custom_section(reader: &mut Reader) -> Result<CustomSection, DecodeError> {
    let name = reader.read_string()?;
    let data = reader.read_bytes(reader.remaining())?.to_vec();
    Ok(CustomSection { name, data })
}

/// ```text
/// import     ::= module:name name:name importdesc
/// importdesc ::= 0x00 typeidx | 0x01 tabletype | 0x02 memtype | 0x03 globaltype
/// ```
fn read_import(reader: &mut Reader) -> Result<Import, DecodeError> {
    let module = reader.read_string()?;
    let name = reader.read_string()?;
    let offset = reader.pos();
    let desc = match reader.read_byte()? {
        DESC_FUNC => ImportDesc::Function(reader.read_vu32()?),
        DESC_TABLE => ImportDesc::Table(TableType::decode(reader)?),
        DESC_MEMORY => ImportDesc::Memory(MemoryType::decode(reader)?),
        DESC_GLOBAL => ImportDesc::Global(GlobalType::decode(reader)?),
        kind => return Err(reader.error_at(offset, DecodeErrorKind::InvalidExternalKind(kind))),
    };
    Ok(Import { module, name, desc })
}

fn read_global(reader: &mut Reader) -> Result<Global, DecodeError> {
    let global_type = GlobalType::decode(reader)?;
    let init = decode_expression(reader)?;
    Ok(Global { global_type, init })
}

fn read_export(reader: &mut Reader) -> Result<Export, DecodeError> {
    let name = reader.read_string()?;
    let offset = reader.pos();
    let byte = reader.read_byte()?;
    let kind =
        ExportKind::from_wire_byte(byte).ok_or_else(|| reader.error_at(offset, DecodeErrorKind::InvalidExternalKind(byte)))?;
    let index = reader.read_vu32()?;
    Ok(Export { name, kind, index })
}

/// Element segments in all eight encodings. Function-index forms are
/// normalised to `ref.func` expressions.
///
/// ```text
/// elem ::= 0 expr vec(funcidx)
///        | 1 elemkind vec(funcidx)
///        | 2 tableidx expr elemkind vec(funcidx)
///        | 3 elemkind vec(funcidx)
///        | 4 expr vec(expr)
///        | 5 reftype vec(expr)
///        | 6 tableidx expr reftype vec(expr)
///        | 7 reftype vec(expr)
/// ```
fn read_element(reader: &mut Reader) -> Result<Element, DecodeError> {
    let offset = reader.pos();
    let flags = reader.read_vu32()?;

    let mode = match flags {
        ELEM_ACTIVE_FUNCS | ELEM_ACTIVE_EXPRS => ElementMode::Active {
            table_index: 0,
            offset: decode_expression(reader)?,
        },
        ELEM_ACTIVE_TABLE_FUNCS | ELEM_ACTIVE_TABLE_EXPRS => {
            let table_index = reader.read_vu32()?;
            ElementMode::Active {
                table_index,
                offset: decode_expression(reader)?,
            }
        }
        ELEM_PASSIVE_FUNCS | ELEM_PASSIVE_EXPRS => ElementMode::Passive,
        ELEM_DECLARATIVE_FUNCS | ELEM_DECLARATIVE_EXPRS => ElementMode::Declarative,
        _ => return Err(reader.error_at(offset, DecodeErrorKind::InvalidElementFlags(flags))),
    };

    let uses_exprs = flags >= ELEM_ACTIVE_EXPRS;
    let ref_type = match flags {
        ELEM_ACTIVE_FUNCS | ELEM_ACTIVE_EXPRS => ValueType::FuncRef,
        _ if uses_exprs => decode_ref_type(reader)?,
        _ => {
            reader.expect_byte(ELEMKIND_FUNCREF)?;
            ValueType::FuncRef
        }
    };

    let init = if uses_exprs {
        read_vec(reader, "element entries", limits::MAX_TABLE_INIT_ENTRIES, decode_expression)?
    } else {
        read_vec(reader, "element entries", limits::MAX_TABLE_INIT_ENTRIES, |r| {
            let index = r.read_vu32()?;
            Ok(vec![Instruction::new("ref.func", Immediate::Index(index))])
        })?
    };

    Ok(Element { mode, ref_type, init })
}

/// One code section entry: a size-prefixed body with run-length locals.
fn read_body(reader: &mut Reader) -> Result<(Vec<ValueType>, Vec<Instruction>), DecodeError> {
    let size = reader.read_vu32()? as usize;
    let start = reader.pos();
    if !reader.has_at_least(size) {
        return Err(reader.error(DecodeErrorKind::UnexpectedEof));
    }

    let runs = reader.read_count("local declarations", limits::MAX_FUNCTION_LOCALS)?;
    let mut locals = Vec::new();
    for _ in 0..runs {
        let offset = reader.pos();
        let count = reader.read_vu32()?;
        let ty = ValueType::decode(reader)?;
        let total = locals.len() as u64 + count as u64;
        if total > limits::MAX_FUNCTION_LOCALS as u64 {
            return Err(reader.error_at(
                offset,
                DecodeErrorKind::LimitExceeded {
                    what: "locals",
                    count: total,
                    limit: limits::MAX_FUNCTION_LOCALS,
                },
            ));
        }
        locals.extend(std::iter::repeat(ty).take(count as usize));
    }
    let body = decode_expression(reader)?;

    let consumed = reader.pos() - start;
    if consumed != size {
        return Err(reader.error(DecodeErrorKind::SectionSizeMismatch {
            declared: size,
            consumed,
        }));
    }
    Ok((locals, body))
}

/// ```text
/// data ::= 0 expr vec(byte) | 1 vec(byte) | 2 memidx expr vec(byte)
/// ```
fn read_data(reader: &mut Reader) -> Result<Data, DecodeError> {
    let offset = reader.pos();
    let mode = match reader.read_vu32()? {
        DATA_ACTIVE => DataMode::Active {
            memory_index: 0,
            offset: decode_expression(reader)?,
        },
        DATA_PASSIVE => DataMode::Passive,
        DATA_ACTIVE_EXPLICIT => {
            let memory_index = reader.read_vu32()?;
            DataMode::Active {
                memory_index,
                offset: decode_expression(reader)?,
            }
        }
        flags => return Err(reader.error_at(offset, DecodeErrorKind::InvalidDataFlags(flags))),
    };
    let init = reader.read_u8vec()?;
    Ok(Data { mode, init })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::module::ValueType::{I32, I64};

    fn module_bytes(sections: &[&[u8]]) -> Vec<u8> {
        let mut bytes = b"\0asm\x01\x00\x00\x00".to_vec();
        for section in sections {
            bytes.extend_from_slice(section);
        }
        bytes
    }

    #[test]
    fn test_header_only() {
        assert_eq!(parse(b"\0asm\x01\x00\x00\x00").unwrap(), Module::default());
    }

    #[test]
    fn test_bad_magic_and_version() {
        let err = parse(b"\0wasm\x01\x00\x00").unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::BadMagic);
        assert_eq!(err.offset, 0);

        let err = parse(b"\0asm\x02\x00\x00\x00").unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::UnknownVersion(2));
        assert_eq!(err.offset, 4);

        assert_eq!(parse(b"\0as").unwrap_err().kind, DecodeErrorKind::BadMagic);
    }

    #[test]
    fn test_function_with_locals() {
        let bytes = module_bytes(&[
            &[0x01, 0x05, 0x01, 0x60, 0x00, 0x01, 0x7F],
            &[0x03, 0x02, 0x01, 0x00],
            &[0x0A, 0x0A, 0x01, 0x08, 0x02, 0x02, 0x7F, 0x01, 0x7E, 0x41, 0x07, 0x0B],
        ]);
        let module = parse(&bytes).unwrap();
        assert_eq!(module.functions.len(), 1);
        assert_eq!(module.functions[0].locals, vec![I32, I32, I64]);
        assert_eq!(
            module.functions[0].body,
            vec![Instruction::new("i32.const", Immediate::I32(7))]
        );
    }

    #[test]
    fn test_sections_out_of_order() {
        let bytes = module_bytes(&[&[0x03, 0x01, 0x00], &[0x01, 0x01, 0x00]]);
        let err = parse(&bytes).unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::SectionOutOfOrder(SECTION_TYPE));
        assert_eq!(err.offset, 11);
    }

    #[test]
    fn test_data_count_before_code() {
        let ok = module_bytes(&[&[0x0C, 0x01, 0x00], &[0x0B, 0x01, 0x00]]);
        assert_eq!(parse(&ok).unwrap().data_count, Some(0));

        let bad = module_bytes(&[&[0x0A, 0x01, 0x00], &[0x0C, 0x01, 0x00]]);
        assert_eq!(
            parse(&bad).unwrap_err().kind,
            DecodeErrorKind::SectionOutOfOrder(SECTION_DATA_COUNT)
        );
    }

    #[test]
    fn test_custom_sections_anywhere() {
        let bytes = module_bytes(&[
            &[0x00, 0x04, 0x01, b'a', 0xAA, 0xBB],
            &[0x01, 0x01, 0x00],
            &[0x00, 0x02, 0x01, b'b'],
        ]);
        let module = parse(&bytes).unwrap();
        assert_eq!(module.custom.len(), 2);
        assert_eq!(module.custom[0].name, "a");
        assert_eq!(module.custom[0].data, vec![0xAA, 0xBB]);
        assert!(module.custom[1].data.is_empty());
    }

    #[test]
    fn test_unknown_section() {
        let bytes = module_bytes(&[&[0x0D, 0x00]]);
        let err = parse(&bytes).unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::UnknownSection(13));
        assert_eq!(err.offset, 8);
    }

    #[test]
    fn test_section_size_mismatch() {
        // type section declares 3 bytes but the vector is empty
        let bytes = module_bytes(&[&[0x01, 0x03, 0x00, 0x00, 0x00]]);
        let err = parse(&bytes).unwrap_err();
        assert_eq!(
            err.kind,
            DecodeErrorKind::SectionSizeMismatch {
                declared: 3,
                consumed: 1
            }
        );
        assert_eq!(err.section, Some(SECTION_TYPE));
    }

    #[test]
    fn test_section_truncated() {
        let bytes = module_bytes(&[&[0x01, 0x05, 0x01, 0x60]]);
        assert_eq!(parse(&bytes).unwrap_err().kind, DecodeErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_function_code_mismatch() {
        let bytes = module_bytes(&[&[0x01, 0x04, 0x01, 0x60, 0x00, 0x00], &[0x03, 0x02, 0x01, 0x00]]);
        assert_eq!(
            parse(&bytes).unwrap_err().kind,
            DecodeErrorKind::FunctionCodeMismatch {
                functions: 1,
                bodies: 0
            }
        );
    }

    #[test]
    fn test_function_index_elements_become_ref_func() {
        // flags 0: active table 0, offset i32.const 1, funcs [0, 2]
        let bytes = module_bytes(&[&[0x09, 0x08, 0x01, 0x00, 0x41, 0x01, 0x0B, 0x02, 0x00, 0x02]]);
        let module = parse(&bytes).unwrap();
        let elem = &module.elements[0];
        assert_eq!(elem.ref_type, ValueType::FuncRef);
        assert_eq!(
            elem.mode,
            ElementMode::Active {
                table_index: 0,
                offset: vec![Instruction::new("i32.const", Immediate::I32(1))],
            }
        );
        assert_eq!(
            elem.init,
            vec![
                vec![Instruction::new("ref.func", Immediate::Index(0))],
                vec![Instruction::new("ref.func", Immediate::Index(2))],
            ]
        );
    }

    #[test]
    fn test_invalid_segment_flags() {
        let bytes = module_bytes(&[&[0x09, 0x02, 0x01, 0x08]]);
        let err = parse(&bytes).unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::InvalidElementFlags(8));
        assert_eq!(err.section, Some(SECTION_ELEMENT));

        let bytes = module_bytes(&[&[0x0B, 0x02, 0x01, 0x03]]);
        assert_eq!(parse(&bytes).unwrap_err().kind, DecodeErrorKind::InvalidDataFlags(3));
    }

    #[test]
    fn test_invalid_import_kind() {
        let bytes = module_bytes(&[&[0x02, 0x05, 0x01, 0x00, 0x00, 0x04, 0x00]]);
        let err = parse(&bytes).unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::InvalidExternalKind(4));
        assert_eq!(err.offset, 13);
    }

    #[test]
    fn test_passive_and_explicit_data() {
        let bytes = module_bytes(&[&[
            0x0B, 0x0B, 0x02, 0x01, 0x02, 0xCA, 0xFE, 0x02, 0x01, 0x41, 0x08, 0x0B, 0x00,
        ]]);
        let module = parse(&bytes).unwrap();
        assert_eq!(module.data[0].mode, DataMode::Passive);
        assert_eq!(module.data[0].init, vec![0xCA, 0xFE]);
        assert_eq!(
            module.data[1].mode,
            DataMode::Active {
                memory_index: 1,
                offset: vec![Instruction::new("i32.const", Immediate::I32(8))],
            }
        );
    }

    #[test]
    fn test_unknown_subcode_names_both_bytes() {
        // body: 0xFC 0x7F end
        let bytes = module_bytes(&[
            &[0x01, 0x04, 0x01, 0x60, 0x00, 0x00],
            &[0x03, 0x02, 0x01, 0x00],
            &[0x0A, 0x06, 0x01, 0x04, 0x00, 0xFC, 0x7F, 0x0B],
        ]);
        let err = parse(&bytes).unwrap_err();
        assert_eq!(err.section, Some(SECTION_CODE));
        assert_eq!(err.to_string(), format!(
            "malformed binary at offset {:#x} in code section: invalid opcode 0xfc 0x7f",
            err.offset
        ));
    }
}
