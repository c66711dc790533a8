//! User-string heap (`#US`): the literals of `ldstr`.
//!
//! Each entry is a compressed byte length, UTF-16LE code units and one trailing byte that is
//! 1 when any character is outside ASCII (ECMA-335 II.24.2.4). A `ldstr` token is the heap
//! offset tagged with table `0x70`.

use std::collections::HashMap;

use widestring::U16String;

use crate::{file::parser::Parser, file::writer::Writer, Error::OutOfBounds, Result};

/// Read access to a `#US` heap.
pub struct UserStrings<'a> {
    data: &'a [u8],
}

impl<'a> UserStrings<'a> {
    /// Wrap heap bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the heap does not start with the empty entry.
    pub fn from(data: &'a [u8]) -> Result<UserStrings<'a>> {
        if data.is_empty() || data[0] != 0 {
            return Err(OutOfBounds);
        }

        Ok(UserStrings { data })
    }

    /// The literal at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for entries running past the heap and
    /// [`crate::Error::Malformed`] for invalid UTF-16.
    pub fn get(&self, index: usize) -> Result<String> {
        if index >= self.data.len() {
            return Err(OutOfBounds);
        }

        let mut parser = Parser::new(&self.data[index..]);
        let len = parser.read_compressed_uint()? as usize;
        if len == 0 {
            return Ok(String::new());
        }
        if len % 2 != 1 {
            return Err(malformed_error!("Invalid user string length at index - {}", index));
        }

        let bytes = parser.read_bytes(len - 1)?;
        let units = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect::<Vec<_>>();
        U16String::from_vec(units)
            .to_string()
            .map_err(|_| malformed_error!("Invalid string from index - {}", index))
    }
}

/// Builds a `#US` heap.
pub struct UserStringsBuilder {
    writer: Writer,
    index: HashMap<String, u32>,
}

impl Default for UserStringsBuilder {
    fn default() -> Self {
        let mut writer = Writer::new();
        writer.write_le::<u8>(0);
        UserStringsBuilder {
            writer,
            index: HashMap::new(),
        }
    }
}

impl UserStringsBuilder {
    /// A heap holding only the empty entry.
    #[must_use]
    pub fn new() -> Self {
        UserStringsBuilder::default()
    }

    /// Add a literal, returning its heap offset.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the heap outgrows the 24-bit token range.
    pub fn add(&mut self, value: &str) -> Result<u32> {
        if let Some(index) = self.index.get(value) {
            return Ok(*index);
        }

        let index = u32::try_from(self.writer.pos())
            .ok()
            .filter(|i| *i < 0x0100_0000)
            .ok_or_else(|| malformed_error!("#US heap too large"))?;

        let units = U16String::from_str(value).into_vec();
        let len = u32::try_from(units.len() * 2 + 1).map_err(|_| malformed_error!("User string too long"))?;
        self.writer.write_compressed_uint(len)?;
        for unit in &units {
            self.writer.write_le::<u16>(*unit);
        }
        let has_high_chars = value.chars().any(|c| c as u32 >= 0x80);
        self.writer.write_le::<u8>(u8::from(has_high_chars));

        self.index.insert(value.to_string(), index);
        Ok(index)
    }

    /// The heap bytes.
    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.writer.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crafted() {
        #[rustfmt::skip]
        let data = [
            0x00, 0x1b, 0x48, 0x00, 0x65, 0x00, 0x6c, 0x00, 0x6c, 0x00, 0x6f, 0x00, 0x2c, 0x00,
            0x20, 0x00, 0x57, 0x00, 0x6f, 0x00, 0x72, 0x00, 0x6c, 0x00, 0x64, 0x00, 0x21, 0x00,
            0x00,
        ];

        let heap = UserStrings::from(&data).unwrap();
        assert_eq!(heap.get(1).unwrap(), "Hello, World!");
    }

    #[test]
    fn invalid() {
        assert!(UserStrings::from(&[]).is_err());
        assert!(UserStrings::from(&[0x22, 0x01]).is_err());

        let even_length = [0x00, 0x02, 0x41, 0x00];
        assert!(UserStrings::from(&even_length).unwrap().get(1).is_err());
    }

    #[test]
    fn builder_marks_high_characters() {
        let mut builder = UserStringsBuilder::new();
        let plain = builder.add("abc").unwrap();
        let accented = builder.add("caf\u{e9}").unwrap();
        assert_eq!(builder.add("abc").unwrap(), plain);

        let data = builder.into_inner();
        let heap = UserStrings::from(&data).unwrap();
        assert_eq!(heap.get(plain as usize).unwrap(), "abc");
        assert_eq!(heap.get(accented as usize).unwrap(), "caf\u{e9}");
        assert_eq!(data[accented as usize - 1], 0);
        assert_eq!(*data.last().unwrap(), 1);
    }
}
