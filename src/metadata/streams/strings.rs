//! String heap (`#Strings`): NUL-terminated UTF-8 identifiers.
//!
//! Index 0 is always the empty string. The builder deduplicates identical strings.

use std::{collections::HashMap, ffi::CStr};

use crate::{Error::OutOfBounds, Result};

/// Read access to a `#Strings` heap.
pub struct Strings<'a> {
    data: &'a [u8],
}

impl<'a> Strings<'a> {
    /// Wrap heap bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the heap does not start with the empty string.
    pub fn from(data: &'a [u8]) -> Result<Strings<'a>> {
        if data.is_empty() || data[0] != 0 {
            return Err(malformed_error!("Provided #Strings heap is empty"));
        }

        Ok(Strings { data })
    }

    /// The string at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for indices past the heap and
    /// [`crate::Error::Malformed`] for unterminated or non-UTF-8 data.
    pub fn get(&self, index: usize) -> Result<&'a str> {
        if index >= self.data.len() {
            return Err(OutOfBounds);
        }

        match CStr::from_bytes_until_nul(&self.data[index..]) {
            Ok(result) => result
                .to_str()
                .map_err(|_| malformed_error!("Invalid string at index - {}", index)),
            Err(_) => Err(malformed_error!("Invalid string at index - {}", index)),
        }
    }
}

/// Builds a `#Strings` heap.
pub struct StringsBuilder {
    data: Vec<u8>,
    index: HashMap<String, u32>,
}

impl Default for StringsBuilder {
    fn default() -> Self {
        StringsBuilder {
            data: vec![0],
            index: HashMap::new(),
        }
    }
}

impl StringsBuilder {
    /// A heap holding only the empty string.
    #[must_use]
    pub fn new() -> Self {
        StringsBuilder::default()
    }

    /// Add `value`, returning its index.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for strings with interior NUL bytes.
    pub fn add(&mut self, value: &str) -> Result<u32> {
        if value.is_empty() {
            return Ok(0);
        }
        if let Some(index) = self.index.get(value) {
            return Ok(*index);
        }
        if value.contains('\0') {
            return Err(malformed_error!("Identifier contains NUL - {:?}", value));
        }

        let index = u32::try_from(self.data.len()).map_err(|_| malformed_error!("#Strings heap too large"))?;
        self.data.extend_from_slice(value.as_bytes());
        self.data.push(0);
        self.index.insert(value.to_string(), index);
        Ok(index)
    }

    /// The heap bytes.
    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crafted() {
        #[rustfmt::skip]
        let data = [
            0x00,
            0x3c, 0x4d, 0x61, 0x69, 0x6e, 0x3e, 0x24, 0x00,
            0x3c, 0x4d, 0x6f, 0x64, 0x75, 0x6c, 0x65, 0x3e, 0x00,
        ];

        let heap = Strings::from(&data).unwrap();
        assert_eq!(heap.get(0).unwrap(), "");
        assert_eq!(heap.get(1).unwrap(), "<Main>$");
        assert_eq!(heap.get(9).unwrap(), "<Module>");
        assert_eq!(heap.get(3).unwrap(), "ain>$");
        assert!(heap.get(18).is_err());
        assert!(Strings::from(&[0x41, 0x00]).is_err());
    }

    #[test]
    fn builder_deduplicates() {
        let mut builder = StringsBuilder::new();
        let a = builder.add("System").unwrap();
        let b = builder.add("Object").unwrap();
        assert_eq!(builder.add("System").unwrap(), a);
        assert_eq!(builder.add("").unwrap(), 0);
        assert!(builder.add("a\0b").is_err());

        let data = builder.into_inner();
        let heap = Strings::from(&data).unwrap();
        assert_eq!(heap.get(a as usize).unwrap(), "System");
        assert_eq!(heap.get(b as usize).unwrap(), "Object");
    }
}
