//! Blob heap (`#Blob`): length-prefixed binary values such as signatures, custom-attribute
//! values, permission sets, constants and method bodies.
//!
//! Each entry is a compressed unsigned length followed by that many bytes. Index 0 is the
//! empty blob.

use std::collections::HashMap;

use crate::{file::parser::Parser, file::writer::Writer, Error::OutOfBounds, Result};

/// Read access to a `#Blob` heap.
pub struct Blob<'a> {
    data: &'a [u8],
}

impl<'a> Blob<'a> {
    /// Wrap heap bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the heap does not start with the empty blob.
    pub fn from(data: &'a [u8]) -> Result<Blob<'a>> {
        if data.is_empty() || data[0] != 0 {
            return Err(malformed_error!("Invalid memory for #Blob heap"));
        }

        Ok(Blob { data })
    }

    /// The blob at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the entry runs past the heap.
    pub fn get(&self, index: usize) -> Result<&'a [u8]> {
        if index >= self.data.len() {
            return Err(OutOfBounds);
        }

        let mut parser = Parser::new(&self.data[index..]);
        let len = parser.read_compressed_uint()? as usize;
        let Some(data_start) = index.checked_add(parser.pos()) else {
            return Err(OutOfBounds);
        };
        let Some(data_end) = data_start.checked_add(len) else {
            return Err(OutOfBounds);
        };
        if data_end > self.data.len() {
            return Err(OutOfBounds);
        }

        Ok(&self.data[data_start..data_end])
    }
}

/// Builds a `#Blob` heap.
pub struct BlobBuilder {
    writer: Writer,
    index: HashMap<Vec<u8>, u32>,
}

impl Default for BlobBuilder {
    fn default() -> Self {
        let mut writer = Writer::new();
        writer.write_le::<u8>(0);
        BlobBuilder {
            writer,
            index: HashMap::new(),
        }
    }
}

impl BlobBuilder {
    /// A heap holding only the empty blob.
    #[must_use]
    pub fn new() -> Self {
        BlobBuilder::default()
    }

    /// Add `value`, returning its index.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the value or heap exceeds the encodable range.
    pub fn add(&mut self, value: &[u8]) -> Result<u32> {
        if value.is_empty() {
            return Ok(0);
        }
        if let Some(index) = self.index.get(value) {
            return Ok(*index);
        }

        let index = u32::try_from(self.writer.pos()).map_err(|_| malformed_error!("#Blob heap too large"))?;
        let len = u32::try_from(value.len()).map_err(|_| malformed_error!("Blob too large"))?;
        self.writer.write_compressed_uint(len)?;
        self.writer.write_bytes(value);
        self.index.insert(value.to_vec(), index);
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
        let data = [0x00, 0x03, 0x20, 0x00, 0x08, 0x01, 0xAA, 0x05, 0x01];
        let heap = Blob::from(&data).unwrap();
        assert_eq!(heap.get(0).unwrap(), &[] as &[u8]);
        assert_eq!(heap.get(1).unwrap(), &[0x20, 0x00, 0x08]);
        assert_eq!(heap.get(5).unwrap(), &[0xAA]);
        assert!(heap.get(7).is_err());
        assert!(Blob::from(&[]).is_err());
    }

    #[test]
    fn builder_handles_long_entries() {
        let long = vec![0x5A; 300];
        let mut builder = BlobBuilder::new();
        let short = builder.add(&[1, 2, 3]).unwrap();
        let long_index = builder.add(&long).unwrap();
        assert_eq!(builder.add(&[1, 2, 3]).unwrap(), short);

        let data = builder.into_inner();
        let heap = Blob::from(&data).unwrap();
        assert_eq!(heap.get(long_index as usize).unwrap(), long.as_slice());
        // two-byte length prefix for 300
        assert_eq!(data[long_index as usize] & 0xC0, 0x80);
    }
}
