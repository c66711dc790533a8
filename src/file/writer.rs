//! Growable byte writer, the encoding counterpart of [`crate::file::parser::Parser`].

use crate::{
    file::io::{write_le_at, CilIO},
    metadata::token::Token,
    Result,
};

/// Append-only little-endian byte writer with ECMA-335 variable-length encodings.
#[derive(Debug, Default, Clone)]
pub struct Writer {
    buffer: Vec<u8>,
}

impl Writer {
    /// Create an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Writer { buffer: Vec::new() }
    }

    /// Current length, which is also the offset of the next write.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.buffer.len()
    }

    /// Borrow the bytes written so far.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// Consume the writer and return its buffer.
    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.buffer
    }

    /// Append a primitive in little-endian order.
    pub fn write_le<T: CilIO>(&mut self, value: T) {
        self.buffer.extend_from_slice(value.to_le_bytes().as_ref());
    }

    /// Overwrite a previously written primitive at `offset`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the patch would extend the buffer.
    pub fn patch_le<T: CilIO>(&mut self, offset: usize, value: T) -> Result<()> {
        let mut offset = offset;
        write_le_at(&mut self.buffer, &mut offset, value)
    }

    /// Append raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Pad with zero bytes up to a multiple of `alignment`.
    pub fn align(&mut self, alignment: usize) {
        while self.buffer.len() % alignment != 0 {
            self.buffer.push(0);
        }
    }

    /// Append a compressed unsigned integer (ECMA-335 II.23.2).
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for values above `0x1FFF_FFFF`.
    pub fn write_compressed_uint(&mut self, value: u32) -> Result<()> {
        match value {
            0..=0x7F => self.buffer.push(value as u8),
            0x80..=0x3FFF => {
                self.buffer.push(((value >> 8) as u8) | 0x80);
                self.buffer.push(value as u8);
            }
            0x4000..=0x1FFF_FFFF => {
                self.buffer.push(((value >> 24) as u8) | 0xC0);
                self.buffer.push((value >> 16) as u8);
                self.buffer.push((value >> 8) as u8);
                self.buffer.push(value as u8);
            }
            _ => return Err(malformed_error!("Value too large to compress - {}", value)),
        }
        Ok(())
    }

    /// Append a compressed signed integer using the rotate-sign encoding of
    /// [`crate::file::parser::Parser::read_compressed_int`].
    ///
    /// # Errors
    /// See [`Writer::write_compressed_uint`].
    #[allow(clippy::cast_sign_loss)]
    pub fn write_compressed_int(&mut self, value: i32) -> Result<()> {
        let encoded = if value >= 0 {
            (value as u32) << 1
        } else {
            ((-(value + 1)) as u32) << 1 | 1
        };
        self.write_compressed_uint(encoded)
    }

    /// Append a compressed `TypeDefOrRefOrSpec` token.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the token is not a TypeDef, TypeRef or TypeSpec.
    pub fn write_compressed_token(&mut self, token: Token) -> Result<()> {
        let tag = match token.table() {
            0x02 => 0,
            0x01 => 1,
            0x1B => 2,
            _ => return Err(malformed_error!("Token {} cannot be compressed", token)),
        };
        self.write_compressed_uint((token.row() << 2) | tag)
    }

    /// Append a 7-bit encoded integer.
    pub fn write_7bit_encoded_int(&mut self, mut value: u32) {
        while value >= 0x80 {
            self.buffer.push((value as u8) | 0x80);
            value >>= 7;
        }
        self.buffer.push(value as u8);
    }

    /// Append a 7-bit length-prefixed UTF-8 string.
    pub fn write_prefixed_string_utf8(&mut self, value: &str) {
        self.write_7bit_encoded_int(value.len() as u32);
        self.buffer.extend_from_slice(value.as_bytes());
    }

    /// Append a custom-attribute `SerString`.
    ///
    /// # Errors
    /// See [`Writer::write_compressed_uint`].
    pub fn write_ser_string(&mut self, value: Option<&str>) -> Result<()> {
        match value {
            None => self.buffer.push(0xFF),
            Some(value) => {
                self.write_compressed_uint(value.len() as u32)?;
                self.buffer.extend_from_slice(value.as_bytes());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::parser::Parser;

    #[test]
    fn compressed_values_decode() {
        let mut writer = Writer::new();
        for value in [0u32, 0x7F, 0x80, 0x3FFF, 0x4000, 0x1FFF_FFFF] {
            writer.write_compressed_uint(value).unwrap();
        }
        writer.write_compressed_int(-62).unwrap();
        writer.write_compressed_token(Token::new(0x1B00_0002)).unwrap();

        let bytes = writer.into_inner();
        let mut parser = Parser::new(&bytes);
        for value in [0u32, 0x7F, 0x80, 0x3FFF, 0x4000, 0x1FFF_FFFF] {
            assert_eq!(parser.read_compressed_uint().unwrap(), value);
        }
        assert_eq!(parser.read_compressed_int().unwrap(), -62);
        assert_eq!(parser.read_compressed_token().unwrap(), Token::new(0x1B00_0002));
    }

    #[test]
    fn oversized_value_rejected() {
        let mut writer = Writer::new();
        assert!(writer.write_compressed_uint(0x2000_0000).is_err());
        assert!(writer.write_compressed_token(Token::new(0x0600_0001)).is_err());
    }

    #[test]
    fn patch_overwrites_in_place() {
        let mut writer = Writer::new();
        writer.write_le(0u32);
        writer.write_le(7u8);
        writer.patch_le(0, 0xAABB_CCDDu32).unwrap();
        assert_eq!(writer.as_slice(), &[0xDD, 0xCC, 0xBB, 0xAA, 7]);
        assert!(writer.patch_le(3, 1u32).is_err());
    }
}
