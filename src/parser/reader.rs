use byteorder::{ByteOrder, LittleEndian};

use super::error::{DecodeError, DecodeErrorKind};

/// Cursor over a byte slice. Every read is bounds-checked and failures carry
/// the offset of the byte that could not be decoded.
pub struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
    section: Option<u8>,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Reader<'a> {
        Reader {
            bytes,
            pos: 0,
            section: None,
        }
    }

    /// Starts reading at `offset` instead of the beginning of `bytes`.
    pub fn at(bytes: &'a [u8], offset: usize) -> Reader<'a> {
        Reader {
            bytes,
            pos: offset.min(bytes.len()),
            section: None,
        }
    }
}

impl Reader<'_> {
    // Basic operations --------------------------------------------------------
    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn has_at_least(&self, count: usize) -> bool {
        self.remaining() >= count
    }

    /// Tags subsequent errors with the section being decoded.
    pub fn set_section(&mut self, section: Option<u8>) {
        self.section = section;
    }

    pub fn error(&self, kind: DecodeErrorKind) -> DecodeError {
        self.error_at(self.pos, kind)
    }

    pub fn error_at(&self, offset: usize, kind: DecodeErrorKind) -> DecodeError {
        DecodeError {
            offset,
            section: self.section,
            kind,
        }
    }

    pub fn read_byte(&mut self) -> Result<u8, DecodeError> {
        match self.bytes.get(self.pos) {
            Some(&byte) => {
                self.pos += 1;
                Ok(byte)
            }
            None => Err(self.error(DecodeErrorKind::UnexpectedEof)),
        }
    }

    pub fn peek_byte(&self) -> Result<u8, DecodeError> {
        self.bytes
            .get(self.pos)
            .copied()
            .ok_or_else(|| self.error(DecodeErrorKind::UnexpectedEof))
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&[u8], DecodeError> {
        if !self.has_at_least(len) {
            return Err(self.error_at(self.bytes.len(), DecodeErrorKind::UnexpectedEof));
        }
        let start = self.pos;
        self.pos += len;
        Ok(&self.bytes[start..self.pos])
    }

    /// Reads a byte and fails unless it equals `expected`.
    pub fn expect_byte(&mut self, expected: u8) -> Result<(), DecodeError> {
        let offset = self.pos;
        let found = self.read_byte()?;
        if found != expected {
            return Err(self.error_at(offset, DecodeErrorKind::UnexpectedByte { expected, found }));
        }
        Ok(())
    }

    // Read and interpret types ------------------------------------------------

    // le
    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        let bytes = self.read_bytes(4)?;
        Ok(LittleEndian::read_u32(bytes))
    }

    pub fn read_vu32(&mut self) -> Result<u32, DecodeError> {
        self.read_vu(32).map(|v| v as u32)
    }

    pub fn read_vu64(&mut self) -> Result<u64, DecodeError> {
        self.read_vu(64)
    }

    pub fn read_vs32(&mut self) -> Result<i32, DecodeError> {
        self.read_vs(32).map(|v| v as i32)
    }

    pub fn read_vs33(&mut self) -> Result<i64, DecodeError> {
        self.read_vs(33)
    }

    pub fn read_vs64(&mut self) -> Result<i64, DecodeError> {
        self.read_vs(64)
    }

    pub fn read_f32(&mut self) -> Result<f32, DecodeError> {
        let bytes = self.read_bytes(4)?;
        Ok(LittleEndian::read_f32(bytes))
    }

    pub fn read_f64(&mut self) -> Result<f64, DecodeError> {
        let bytes = self.read_bytes(8)?;
        Ok(LittleEndian::read_f64(bytes))
    }

    pub fn read_v128(&mut self) -> Result<[u8; 16], DecodeError> {
        let mut buf = [0u8; 16];
        buf.copy_from_slice(self.read_bytes(16)?);
        Ok(buf)
    }

    pub fn read_u8vec(&mut self) -> Result<Vec<u8>, DecodeError> {
        let len = self.read_vu32()? as usize;
        Ok(self.read_bytes(len)?.to_vec())
    }

    pub fn read_string(&mut self) -> Result<String, DecodeError> {
        let offset = self.pos;
        let bytes = self.read_u8vec()?;
        String::from_utf8(bytes).map_err(|_| self.error_at(offset, DecodeErrorKind::InvalidUtf8))
    }

    /// Reads a vector length and rejects it when it exceeds `limit` or could
    /// not possibly fit in the remaining input (each item takes at least one byte).
    pub fn read_count(&mut self, what: &'static str, limit: u32) -> Result<u32, DecodeError> {
        let offset = self.pos;
        let count = self.read_vu32()?;
        if count > limit {
            return Err(self.error_at(
                offset,
                DecodeErrorKind::LimitExceeded {
                    what,
                    count: count as u64,
                    limit,
                },
            ));
        }
        if count as usize > self.remaining() {
            return Err(self.error_at(self.bytes.len(), DecodeErrorKind::UnexpectedEof));
        }
        Ok(count)
    }

    // LEB128 ------------------------------------------------------------------

    fn read_vu(&mut self, size: u32) -> Result<u64, DecodeError> {
        let start = self.pos;
        let max_bytes = size.div_ceil(7);
        let mut result: u64 = 0;

        for i in 0..max_bytes {
            let byte = self.read_byte()?;
            let shift = 7 * i;
            let last = i == max_bytes - 1;
            if last {
                // bits beyond `size` in the final byte must be zero
                let used = size - shift;
                if used < 7 && (byte & 0x7f) >> used != 0 {
                    return Err(self.error_at(start, DecodeErrorKind::IntegerTooLarge));
                }
            }
            result |= ((byte & 0x7f) as u64) << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
        }

        Err(self.error_at(start, DecodeErrorKind::IntegerTooLong))
    }

    fn read_vs(&mut self, size: u32) -> Result<i64, DecodeError> {
        let start = self.pos;
        let max_bytes = size.div_ceil(7);
        let mut result: i64 = 0;
        let mut shift = 0;

        for i in 0..max_bytes {
            let byte = self.read_byte()?;
            let last = i == max_bytes - 1;
            if last {
                // unused bits of the final byte must replicate the sign bit
                let used = size - shift;
                if used < 7 {
                    let mask: u8 = (0x7f >> (used - 1)) << (used - 1);
                    let high = byte & mask;
                    if high != 0 && high != mask {
                        return Err(self.error_at(start, DecodeErrorKind::IntegerTooLarge));
                    }
                }
            }
            result |= ((byte & 0x7f) as i64) << shift;
            shift += 7;
            if byte & 0x80 == 0 {
                if shift < 64 && byte & 0x40 != 0 {
                    result |= -1i64 << shift;
                }
                return Ok(result);
            }
        }

        Err(self.error_at(start, DecodeErrorKind::IntegerTooLong))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_u32() {
        let read = |v: Vec<u8>| -> u32 { Reader::new(&v).read_u32().expect("Failed to read u32") };

        assert_eq!(read(vec![0, 0, 0, 0]), 0);
        assert_eq!(read(vec![1, 0, 0, 0]), 1);
        assert_eq!(read(vec![0, 1, 0, 0]), 256);
        assert_eq!(read(vec![0xff, 0xff, 0xff, 0xff]), 4294967295);
    }

    #[test]
    fn test_read_vu32() {
        let read = |v: Vec<u8>| Reader::new(&v).read_vu32().expect("Failed to read vu32");

        assert_eq!(read(vec![0]), 0);
        assert_eq!(read(vec![1]), 1);
        assert_eq!(read(vec![0b11100101, 0b10001110, 0b00100110]), 624485);
        assert_eq!(read(vec![0x7f]), 127);
        assert_eq!(read(vec![0x80, 0x7f]), 16256);
        assert_eq!(read(vec![0xff, 0xff, 0xff, 0xff, 0xf]), 0xffffffff);
        assert_eq!(read(vec![128, 128, 128, 128, 8]), 0x80000000);
        // non-minimal but within bounds
        assert_eq!(read(vec![0x80, 0x80, 0x00]), 0);
    }

    #[test]
    fn test_read_vu32_rejects_overlong_and_overflow() {
        let err = Reader::new(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x00]).read_vu32().unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::IntegerTooLong);

        let err = Reader::new(&[0xff, 0xff, 0xff, 0xff, 0x1f]).read_vu32().unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::IntegerTooLarge);
    }

    #[test]
    fn test_read_vs32() {
        let read = |v: Vec<u8>| Reader::new(&v).read_vs32().expect("Failed to read vs32");

        assert_eq!(read(vec![0]), 0);
        assert_eq!(read(vec![1]), 1);
        assert_eq!(read(vec![0x7f]), -1);
        assert_eq!(read(vec![0x80, 0x7f]), -128);
        assert_eq!(read(vec![0b10011011, 0b11110001, 0b01011001]), -624485);
        // this is different as a 32 than a 64
        assert_eq!(read(vec![128, 128, 128, 128, 120]), i32::MIN);
        assert_eq!(read(vec![0xff, 0xff, 0xff, 0xff, 0x07]), i32::MAX);
    }

    #[test]
    fn test_read_vs32_rejects_bad_sign_extension() {
        let err = Reader::new(&[0xff, 0xff, 0xff, 0xff, 0x0f]).read_vs32().unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::IntegerTooLarge);

        let err = Reader::new(&[0x80, 0x80, 0x80, 0x80, 0x70]).read_vs32().unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::IntegerTooLarge);
    }

    #[test]
    fn test_read_vs64() {
        let read = |v: Vec<u8>| Reader::new(&v).read_vs64().expect("Failed to read vs64");

        assert_eq!(read(vec![0x7f]), -1);
        assert_eq!(read(vec![128, 128, 128, 128, 128, 128, 128, 252, 255, 0]), 0x7ff8000000000000);
        assert_eq!(read(vec![128, 128, 128, 128, 128, 128, 128, 128, 128, 127]), i64::MIN);
    }

    #[test]
    fn test_read_floats() {
        assert_eq!(Reader::new(&[219, 15, 201, 64]).read_f32().unwrap(), 6.283_185_5);
        assert!(Reader::new(&[0, 0, 192, 127]).read_f32().unwrap().is_nan());
        assert_eq!(
            Reader::new(&[24, 45, 68, 84, 251, 33, 25, 64]).read_f64().unwrap(),
            std::f64::consts::TAU
        );
    }

    #[test]
    fn test_truncated_input_reports_offset() {
        let mut reader = Reader::new(&[0x03, b'a', b'b']);
        let err = reader.read_string().unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::UnexpectedEof);
        assert_eq!(err.offset, 3);

        let err = Reader::at(&[0x01, 0x80], 1).read_vu32().unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::UnexpectedEof);
        assert_eq!(err.offset, 2);
    }

    #[test]
    fn test_read_count_guards_allocation() {
        let mut reader = Reader::new(&[0xff, 0xff, 0x03]);
        let err = reader.read_count("types", 10).unwrap_err();
        assert!(matches!(err.kind, DecodeErrorKind::LimitExceeded { what: "types", .. }));

        let mut reader = Reader::new(&[0x05, 0x00]);
        let err = reader.read_count("types", 10).unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::UnexpectedEof);
    }
}
