//! Paired encoders and decoders for the binary format's primitive and
//! structural types.
//!
//! Every [`Binable`] type writes itself into a caller-provided buffer and
//! reads itself back from a [`Reader`]. Encoding is canonical (minimal
//! LEB128), so anything written here decodes to an identical value.

use super::encoding::{self, BLOCK_TYPE_EMPTY, LIMITS_MIN, LIMITS_MIN_MAX, LIMITS_SHARED_MIN_MAX, TYPE_FUNC};
use super::error::{DecodeError, DecodeErrorKind};
use super::instruction::{BlockType, MemArg};
use super::limits;
use super::module::{FunctionType, GlobalType, Limits, MemoryType, TableType, ValueType};
use super::reader::Reader;

pub trait Binable: Sized {
    fn encode(&self, buf: &mut Vec<u8>);
    fn decode(reader: &mut Reader) -> Result<Self, DecodeError>;
}

/// Decodes a `T` starting at `offset`, returning the value and the number
/// of bytes consumed.
pub fn decode_at<T: Binable>(bytes: &[u8], offset: usize) -> Result<(T, usize), DecodeError> {
    let mut reader = Reader::at(bytes, offset);
    let value = T::decode(&mut reader)?;
    Ok((value, reader.pos() - offset))
}

/// Encodes a single value into a fresh buffer.
pub fn to_bytes<T: Binable>(value: &T) -> Vec<u8> {
    let mut buf = Vec::new();
    value.encode(&mut buf);
    buf
}

impl Binable for u32 {
    fn encode(&self, buf: &mut Vec<u8>) {
        encoding::write_vu32(buf, *self);
    }

    fn decode(reader: &mut Reader) -> Result<Self, DecodeError> {
        reader.read_vu32()
    }
}

impl Binable for i32 {
    fn encode(&self, buf: &mut Vec<u8>) {
        encoding::write_vs32(buf, *self);
    }

    fn decode(reader: &mut Reader) -> Result<Self, DecodeError> {
        reader.read_vs32()
    }
}

impl Binable for i64 {
    fn encode(&self, buf: &mut Vec<u8>) {
        encoding::write_vs64(buf, *self);
    }

    fn decode(reader: &mut Reader) -> Result<Self, DecodeError> {
        reader.read_vs64()
    }
}

impl Binable for f32 {
    fn encode(&self, buf: &mut Vec<u8>) {
        encoding::write_f32(buf, *self);
    }

    fn decode(reader: &mut Reader) -> Result<Self, DecodeError> {
        reader.read_f32()
    }
}

impl Binable for f64 {
    fn encode(&self, buf: &mut Vec<u8>) {
        encoding::write_f64(buf, *self);
    }

    fn decode(reader: &mut Reader) -> Result<Self, DecodeError> {
        reader.read_f64()
    }
}

impl Binable for [u8; 16] {
    fn encode(&self, buf: &mut Vec<u8>) {
        encoding::write_v128(buf, *self);
    }

    fn decode(reader: &mut Reader) -> Result<Self, DecodeError> {
        reader.read_v128()
    }
}

impl Binable for bool {
    fn encode(&self, buf: &mut Vec<u8>) {
        encoding::write_vu1(buf, *self);
    }

    fn decode(reader: &mut Reader) -> Result<Self, DecodeError> {
        let offset = reader.pos();
        match reader.read_byte()? {
            0 => Ok(false),
            1 => Ok(true),
            found => Err(reader.error_at(offset, DecodeErrorKind::UnexpectedByte { expected: 1, found })),
        }
    }
}

impl Binable for String {
    fn encode(&self, buf: &mut Vec<u8>) {
        encoding::write_name(buf, self);
    }

    fn decode(reader: &mut Reader) -> Result<Self, DecodeError> {
        reader.read_string()
    }
}

impl<T: Binable> Binable for Vec<T> {
    fn encode(&self, buf: &mut Vec<u8>) {
        encoding::write_vu32(buf, self.len() as u32);
        for item in self {
            item.encode(buf);
        }
    }

    fn decode(reader: &mut Reader) -> Result<Self, DecodeError> {
        let count = reader.read_count("vector items", limits::MAX_VECTOR_LENGTH)?;
        let mut items = Vec::with_capacity(count as usize);
        for _ in 0..count {
            items.push(T::decode(reader)?);
        }
        Ok(items)
    }
}

impl Binable for ValueType {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(self.wire_byte());
    }

    fn decode(reader: &mut Reader) -> Result<Self, DecodeError> {
        let offset = reader.pos();
        let byte = reader.read_byte()?;
        ValueType::from_wire_byte(byte).ok_or_else(|| reader.error_at(offset, DecodeErrorKind::InvalidValueType(byte)))
    }
}

/// Reads a value type and requires it to be a reference type.
pub fn decode_ref_type(reader: &mut Reader) -> Result<ValueType, DecodeError> {
    let offset = reader.pos();
    let ty = ValueType::decode(reader)?;
    if !ty.is_ref() {
        return Err(reader.error_at(offset, DecodeErrorKind::InvalidValueType(ty.wire_byte())));
    }
    Ok(ty)
}

fn decode_types(reader: &mut Reader, limit: u32) -> Result<Vec<ValueType>, DecodeError> {
    let count = reader.read_count("value types", limit)?;
    (0..count).map(|_| ValueType::decode(reader)).collect()
}

/// ```text
/// functype ::= 0x60 vec(valtype) vec(valtype)
/// ```
impl Binable for FunctionType {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(TYPE_FUNC);
        self.params.encode(buf);
        self.results.encode(buf);
    }

    fn decode(reader: &mut Reader) -> Result<Self, DecodeError> {
        reader.expect_byte(TYPE_FUNC)?;
        let params = decode_types(reader, limits::MAX_FUNCTION_PARAMS)?;
        let results = decode_types(reader, limits::MAX_FUNCTION_RETURNS)?;
        Ok(FunctionType { params, results })
    }
}

/// ```text
/// limits ::= 0x00 n:u32 | 0x01 n:u32 m:u32
/// ```
impl Binable for Limits {
    fn encode(&self, buf: &mut Vec<u8>) {
        match self.max {
            None => {
                buf.push(LIMITS_MIN);
                encoding::write_vu32(buf, self.min);
            }
            Some(max) => {
                buf.push(LIMITS_MIN_MAX);
                encoding::write_vu32(buf, self.min);
                encoding::write_vu32(buf, max);
            }
        }
    }

    fn decode(reader: &mut Reader) -> Result<Self, DecodeError> {
        let offset = reader.pos();
        match reader.read_byte()? {
            LIMITS_MIN => Ok(Limits::new(reader.read_vu32()?, None)),
            LIMITS_MIN_MAX => {
                let min = reader.read_vu32()?;
                let max = reader.read_vu32()?;
                Ok(Limits::new(min, Some(max)))
            }
            flags => Err(reader.error_at(offset, DecodeErrorKind::InvalidLimits(flags))),
        }
    }
}

/// ```text
/// tabletype ::= reftype limits
/// ```
impl Binable for TableType {
    fn encode(&self, buf: &mut Vec<u8>) {
        self.ref_type.encode(buf);
        self.limits.encode(buf);
    }

    fn decode(reader: &mut Reader) -> Result<Self, DecodeError> {
        let ref_type = decode_ref_type(reader)?;
        let limits = Limits::decode(reader)?;
        Ok(TableType { ref_type, limits })
    }
}

/// Memory limits, with flag 0x03 marking a shared memory.
///
/// ```text
/// memtype ::= 0x00 n:u32 | 0x01 n:u32 m:u32 | 0x03 n:u32 m:u32
/// ```
impl Binable for MemoryType {
    fn encode(&self, buf: &mut Vec<u8>) {
        if self.shared {
            buf.push(LIMITS_SHARED_MIN_MAX);
            encoding::write_vu32(buf, self.limits.min);
            encoding::write_vu32(buf, self.limits.max.unwrap_or(self.limits.min));
        } else {
            self.limits.encode(buf);
        }
    }

    fn decode(reader: &mut Reader) -> Result<Self, DecodeError> {
        if reader.peek_byte()? == LIMITS_SHARED_MIN_MAX {
            reader.read_byte()?;
            let min = reader.read_vu32()?;
            let max = reader.read_vu32()?;
            return Ok(MemoryType {
                limits: Limits::new(min, Some(max)),
                shared: true,
            });
        }
        Ok(MemoryType {
            limits: Limits::decode(reader)?,
            shared: false,
        })
    }
}

/// ```text
/// globaltype ::= valtype mut
/// mut        ::= 0x00 | 0x01
/// ```
impl Binable for GlobalType {
    fn encode(&self, buf: &mut Vec<u8>) {
        self.value_type.encode(buf);
        self.mutable.encode(buf);
    }

    fn decode(reader: &mut Reader) -> Result<Self, DecodeError> {
        let value_type = ValueType::decode(reader)?;
        let offset = reader.pos();
        let mutable = match reader.read_byte()? {
            0 => false,
            1 => true,
            byte => return Err(reader.error_at(offset, DecodeErrorKind::InvalidMutability(byte))),
        };
        Ok(GlobalType { value_type, mutable })
    }
}

/// ```text
/// memarg ::= a:u32 o:u32
/// ```
impl Binable for MemArg {
    fn encode(&self, buf: &mut Vec<u8>) {
        encoding::write_vu32(buf, self.align);
        encoding::write_vu32(buf, self.offset);
    }

    fn decode(reader: &mut Reader) -> Result<Self, DecodeError> {
        let align = reader.read_vu32()?;
        let offset = reader.read_vu32()?;
        Ok(MemArg { align, offset })
    }
}

/// ```text
/// blocktype ::= 0x40 | valtype | x:s33
/// ```
impl Binable for BlockType {
    fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            BlockType::Empty => buf.push(BLOCK_TYPE_EMPTY),
            BlockType::Value(vt) => vt.encode(buf),
            BlockType::FuncType(idx) => encoding::write_vs64(buf, *idx as i64),
        }
    }

    fn decode(reader: &mut Reader) -> Result<Self, DecodeError> {
        let offset = reader.pos();
        let byte = reader.peek_byte()?;
        if byte == BLOCK_TYPE_EMPTY {
            reader.read_byte()?;
            return Ok(BlockType::Empty);
        }
        if let Some(vt) = ValueType::from_wire_byte(byte) {
            reader.read_byte()?;
            return Ok(BlockType::Value(vt));
        }
        let idx = reader.read_vs33()?;
        if idx < 0 {
            return Err(reader.error_at(offset, DecodeErrorKind::InvalidBlockType));
        }
        Ok(BlockType::FuncType(idx as u32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_at_reports_consumed() {
        let bytes = [0xAA, 0xe5, 0x8e, 0x26, 0xBB];
        let (value, consumed) = decode_at::<u32>(&bytes, 1).unwrap();
        assert_eq!(value, 624485);
        assert_eq!(consumed, 3);
    }

    #[test]
    fn test_function_type_wire_form() {
        let ft = FunctionType::new(&[ValueType::I32, ValueType::I64], &[ValueType::F64]);
        let bytes = to_bytes(&ft);
        assert_eq!(bytes, vec![0x60, 0x02, 0x7F, 0x7E, 0x01, 0x7C]);
        assert_eq!(decode_at::<FunctionType>(&bytes, 0).unwrap(), (ft, 6));
    }

    #[test]
    fn test_shared_memory_flag() {
        let mem = MemoryType {
            limits: Limits::new(1, Some(10)),
            shared: true,
        };
        let bytes = to_bytes(&mem);
        assert_eq!(bytes, vec![0x03, 0x01, 0x0a]);
        assert_eq!(decode_at::<MemoryType>(&bytes, 0).unwrap().0, mem);

        let plain = decode_at::<MemoryType>(&[0x00, 0x02], 0).unwrap().0;
        assert_eq!(plain, MemoryType { limits: Limits::new(2, None), shared: false });
    }

    #[test]
    fn test_invalid_value_type_offset() {
        let err = decode_at::<FunctionType>(&[0x60, 0x01, 0x55, 0x00], 0).unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::InvalidValueType(0x55));
        assert_eq!(err.offset, 2);
    }

    #[test]
    fn test_invalid_limits_and_mutability() {
        let err = decode_at::<Limits>(&[0x02, 0x00], 0).unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::InvalidLimits(0x02));

        let err = decode_at::<GlobalType>(&[0x7F, 0x02], 0).unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::InvalidMutability(0x02));
        assert_eq!(err.offset, 1);
    }

    #[test]
    fn test_table_type_requires_ref_type() {
        let err = decode_at::<TableType>(&[0x7F, 0x00, 0x01], 0).unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::InvalidValueType(0x7F));
        let (tt, _) = decode_at::<TableType>(&[0x70, 0x01, 0x01, 0x02], 0).unwrap();
        assert_eq!(tt.ref_type, ValueType::FuncRef);
        assert_eq!(tt.limits, Limits::new(1, Some(2)));
    }

    #[test]
    fn test_block_types() {
        assert_eq!(decode_at::<BlockType>(&[0x40], 0).unwrap().0, BlockType::Empty);
        assert_eq!(decode_at::<BlockType>(&[0x7F], 0).unwrap().0, BlockType::Value(ValueType::I32));
        assert_eq!(decode_at::<BlockType>(&[0x05], 0).unwrap().0, BlockType::FuncType(5));
        assert_eq!(to_bytes(&BlockType::FuncType(64)), vec![0xc0, 0x00]);
        let err = decode_at::<BlockType>(&[0x60], 0).unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::InvalidBlockType);
    }
}
