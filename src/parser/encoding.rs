//! Binary encoding primitives for WebAssembly values.
//!
//! Provides LEB128 integer encoding, IEEE 754 float encoding, and byte vector
//! encoding as specified by the WebAssembly binary format.
//!
//! All functions write directly into a caller-provided `&mut Vec<u8>` buffer,
//! avoiding intermediate allocations. The matching readers live on
//! [`super::reader::Reader`].

use byteorder::{ByteOrder, LittleEndian};

// ---------------------------------------------------------------------------
// WebAssembly binary format constants (core §5)
// ---------------------------------------------------------------------------

/// `\0asm`
pub const MAGIC: [u8; 4] = *b"\0asm";
pub const VERSION: u32 = 1;

// Section IDs (§5.5.2)
pub const SECTION_CUSTOM: u8 = 0;
pub const SECTION_TYPE: u8 = 1;
pub const SECTION_IMPORT: u8 = 2;
pub const SECTION_FUNCTION: u8 = 3;
pub const SECTION_TABLE: u8 = 4;
pub const SECTION_MEMORY: u8 = 5;
pub const SECTION_GLOBAL: u8 = 6;
pub const SECTION_EXPORT: u8 = 7;
pub const SECTION_START: u8 = 8;
pub const SECTION_ELEMENT: u8 = 9;
pub const SECTION_CODE: u8 = 10;
pub const SECTION_DATA: u8 = 11;
pub const SECTION_DATA_COUNT: u8 = 12;

/// Human-readable section name, used in error messages and logs.
pub fn section_name(id: u8) -> &'static str {
    match id {
        SECTION_CUSTOM => "custom",
        SECTION_TYPE => "type",
        SECTION_IMPORT => "import",
        SECTION_FUNCTION => "function",
        SECTION_TABLE => "table",
        SECTION_MEMORY => "memory",
        SECTION_GLOBAL => "global",
        SECTION_EXPORT => "export",
        SECTION_START => "start",
        SECTION_ELEMENT => "element",
        SECTION_CODE => "code",
        SECTION_DATA => "data",
        SECTION_DATA_COUNT => "data count",
        _ => "unknown",
    }
}

/// Position of a section in the mandated wire order. The data count section
/// sits between element and code even though its id is 12.
pub fn section_order(id: u8) -> u8 {
    match id {
        SECTION_DATA_COUNT => SECTION_ELEMENT + 1,
        SECTION_CODE | SECTION_DATA => id + 1,
        _ => id,
    }
}

// Type constructors (§5.3.6)
pub const TYPE_FUNC: u8 = 0x60;

// Value types (§5.3.1 - §5.3.3)
pub const VALTYPE_I32: u8 = 0x7F;
pub const VALTYPE_I64: u8 = 0x7E;
pub const VALTYPE_F32: u8 = 0x7D;
pub const VALTYPE_F64: u8 = 0x7C;
pub const VALTYPE_V128: u8 = 0x7B;
pub const VALTYPE_FUNCREF: u8 = 0x70;
pub const VALTYPE_EXTERNREF: u8 = 0x6F;

// Import/export descriptor kinds (§5.5.5, §5.5.10)
pub const DESC_FUNC: u8 = 0x00;
pub const DESC_TABLE: u8 = 0x01;
pub const DESC_MEMORY: u8 = 0x02;
pub const DESC_GLOBAL: u8 = 0x03;

// Limits flags (§5.3.7), bit 1 marks shared memory (threads proposal)
pub const LIMITS_MIN: u8 = 0x00;
pub const LIMITS_MIN_MAX: u8 = 0x01;
pub const LIMITS_SHARED_MIN_MAX: u8 = 0x03;

// Element segment elemkind (§5.5.12)
pub const ELEMKIND_FUNCREF: u8 = 0x00;

// Element segment flags (§5.5.12)
// 3-bit encoding: bit 0 = non-active mode, bit 1 = explicit table, bit 2 = expressions
pub const ELEM_ACTIVE_FUNCS: u32 = 0; // active, table 0, func indices
pub const ELEM_PASSIVE_FUNCS: u32 = 1; // passive, elemkind, func indices
pub const ELEM_ACTIVE_TABLE_FUNCS: u32 = 2; // active, explicit table, elemkind, func indices
pub const ELEM_DECLARATIVE_FUNCS: u32 = 3; // declarative, elemkind, func indices
pub const ELEM_ACTIVE_EXPRS: u32 = 4; // active, table 0, expressions
pub const ELEM_PASSIVE_EXPRS: u32 = 5; // passive, reftype, expressions
pub const ELEM_ACTIVE_TABLE_EXPRS: u32 = 6; // active, explicit table, reftype, expressions
pub const ELEM_DECLARATIVE_EXPRS: u32 = 7; // declarative, reftype, expressions

// Data segment flags (§5.5.14)
pub const DATA_ACTIVE: u32 = 0;
pub const DATA_PASSIVE: u32 = 1;
pub const DATA_ACTIVE_EXPLICIT: u32 = 2;

// Control opcodes the codec needs to recognise structurally (§5.4.1)
pub const OP_ELSE: u8 = 0x05;
pub const OP_END: u8 = 0x0B;

// Opcode prefixes for the extended instruction spaces
pub const PREFIX_MISC: u8 = 0xFC;
pub const PREFIX_SIMD: u8 = 0xFD;
pub const PREFIX_ATOMIC: u8 = 0xFE;

// Block type: empty (§5.4.1)
pub const BLOCK_TYPE_EMPTY: u8 = 0x40;

// ---------------------------------------------------------------------------
// Unsigned LEB128
// ---------------------------------------------------------------------------

/// Appends the unsigned LEB128 encoding of a u64 value to `buf`.
fn write_vu(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            buf.push(byte);
            break;
        }
        byte |= 0x80;
        buf.push(byte);
    }
}

/// Appends the unsigned LEB128 encoding of a u32 value to `buf`.
pub fn write_vu32(buf: &mut Vec<u8>, v: u32) {
    write_vu(buf, v as u64);
}

/// Appends the unsigned LEB128 encoding of a u64 value to `buf`.
pub fn write_vu64(buf: &mut Vec<u8>, v: u64) {
    write_vu(buf, v);
}

/// Appends a single-bit boolean as a one-byte LEB128 value (0x00 or 0x01).
pub fn write_vu1(buf: &mut Vec<u8>, v: bool) {
    buf.push(if v { 1 } else { 0 });
}

// ---------------------------------------------------------------------------
// Signed LEB128
// ---------------------------------------------------------------------------

/// Appends the signed LEB128 encoding of an i64 value to `buf`.
fn write_vs(buf: &mut Vec<u8>, mut value: i64) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if (value == 0 && (byte & 0x40) == 0) || (value == -1 && (byte & 0x40) != 0) {
            buf.push(byte);
            break;
        }
        byte |= 0x80;
        buf.push(byte);
    }
}

/// Appends the signed LEB128 encoding of an i32 value to `buf`.
pub fn write_vs32(buf: &mut Vec<u8>, v: i32) {
    write_vs(buf, v as i64);
}

/// Appends the signed LEB128 encoding of an i64 value to `buf`.
pub fn write_vs64(buf: &mut Vec<u8>, v: i64) {
    write_vs(buf, v);
}

// ---------------------------------------------------------------------------
// IEEE 754 floats (little-endian)
// ---------------------------------------------------------------------------

/// Appends the little-endian IEEE 754 encoding of an f32 value to `buf`.
pub fn write_f32(buf: &mut Vec<u8>, v: f32) {
    let mut bytes = [0u8; 4];
    LittleEndian::write_f32(&mut bytes, v);
    buf.extend_from_slice(&bytes);
}

/// Appends the little-endian IEEE 754 encoding of an f64 value to `buf`.
pub fn write_f64(buf: &mut Vec<u8>, v: f64) {
    let mut bytes = [0u8; 8];
    LittleEndian::write_f64(&mut bytes, v);
    buf.extend_from_slice(&bytes);
}

// ---------------------------------------------------------------------------
// v128 (16-byte SIMD vector, raw bytes)
// ---------------------------------------------------------------------------

/// Appends 16 raw bytes to `buf`.
pub fn write_v128(buf: &mut Vec<u8>, v: [u8; 16]) {
    buf.extend_from_slice(&v);
}

// ---------------------------------------------------------------------------
// Length-prefixed vectors
// ---------------------------------------------------------------------------

/// Appends a length-prefixed byte vector (vu32 length + raw bytes) to `buf`.
pub fn write_u8vec(buf: &mut Vec<u8>, v: &[u8]) {
    write_vu32(buf, v.len() as u32);
    buf.extend_from_slice(v);
}

/// Encodes a UTF-8 name as a length-prefixed byte vector.
pub fn write_name(buf: &mut Vec<u8>, name: &str) {
    write_u8vec(buf, name.as_bytes());
}

/// Wraps section contents with a section ID and length prefix.
pub fn write_section(buf: &mut Vec<u8>, id: u8, contents: &[u8]) {
    buf.push(id);
    write_u8vec(buf, contents);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
