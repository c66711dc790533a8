//! Stream directory entries of a module image.
//!
//! Layout per entry: `offset: u32`, `size: u32`, then the stream name as NUL-terminated ASCII
//! padded to a 4-byte boundary. Offsets are relative to the start of the image.

use crate::{file::parser::Parser, file::writer::Writer, Result};

/// Names of the streams an image may carry.
pub const STREAM_NAMES: [&str; 5] = ["#Strings", "#US", "#Blob", "#~", "#Defs"];

/// One stream directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHeader {
    /// Offset from the image start
    pub offset: u32,
    /// Size in bytes
    pub size: u32,
    /// Stream name
    pub name: String,
}

impl StreamHeader {
    /// Parse one entry at the parser position.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for unknown names and
    /// [`crate::Error::OutOfBounds`] for truncated entries.
    pub fn read(parser: &mut Parser) -> Result<StreamHeader> {
        let offset = parser.read_le::<u32>()?;
        let size = parser.read_le::<u32>()?;

        let mut name = String::with_capacity(16);
        loop {
            let byte = parser.read_le::<u8>()?;
            if byte == 0 {
                break;
            }
            if name.len() == 32 {
                return Err(malformed_error!("Stream name too long"));
            }
            name.push(char::from(byte));
        }
        parser.align(4)?;

        if !STREAM_NAMES.contains(&name.as_str()) {
            return Err(malformed_error!("Invalid stream header name - {}", name));
        }

        Ok(StreamHeader { offset, size, name })
    }

    /// Write the entry.
    pub fn write(&self, writer: &mut Writer) {
        writer.write_le::<u32>(self.offset);
        writer.write_le::<u32>(self.size);
        writer.write_bytes(self.name.as_bytes());
        writer.write_le::<u8>(0);
        writer.align(4);
    }

    /// Encoded size of an entry named `name`.
    #[must_use]
    pub fn encoded_size(name: &str) -> usize {
        8 + (name.len() + 1).next_multiple_of(4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crafted() {
        #[rustfmt::skip]
        let header_bytes = [
            0x6C, 0x00, 0x00, 0x00,
            0xA4, 0x45, 0x00, 0x00,
            0x23, 0x7E, 0x00, 0x00,
        ];

        let mut parser = Parser::new(&header_bytes);
        let parsed = StreamHeader::read(&mut parser).unwrap();
        assert_eq!(parsed.offset, 0x6C);
        assert_eq!(parsed.size, 0x45A4);
        assert_eq!(parsed.name, "#~");
        assert_eq!(parser.pos(), StreamHeader::encoded_size("#~"));
    }

    #[test]
    fn crafted_invalid() {
        let header_bytes = [0x6C, 0x00, 0x00, 0x00, 0xA4, 0x45, 0x00, 0x00, 0x24, 0x7E, 0x00, 0x00];
        assert!(StreamHeader::read(&mut Parser::new(&header_bytes)).is_err());
    }

    #[test]
    fn write_pads_to_four() {
        let header = StreamHeader {
            offset: 1,
            size: 2,
            name: "#Strings".into(),
        };
        let mut writer = Writer::new();
        header.write(&mut writer);
        let bytes = writer.into_inner();
        assert_eq!(bytes.len(), StreamHeader::encoded_size("#Strings"));
        assert_eq!(StreamHeader::read(&mut Parser::new(&bytes)).unwrap(), header);
    }
}
