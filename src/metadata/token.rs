//! Metadata tokens used by method bodies and signatures to address image tables.
//!
//! A token packs a table id into the high byte and a 1-based row into the low 24 bits. Inside
//! an image every cross-reference from IL or a signature blob is a token; once loaded, the
//! static model replaces tokens with symbolic references.

use std::fmt;

/// Table ids of the rows that tokens can address in a module image.
#[allow(non_snake_case, missing_docs)]
pub mod TABLE {
    pub const TYPE_REF: u8 = 0x01;
    pub const TYPE_DEF: u8 = 0x02;
    pub const FIELD: u8 = 0x04;
    pub const METHOD_DEF: u8 = 0x06;
    pub const MEMBER_REF: u8 = 0x0A;
    pub const STAND_ALONE_SIG: u8 = 0x11;
    pub const MODULE_REF: u8 = 0x1A;
    pub const TYPE_SPEC: u8 = 0x1B;
    pub const ASSEMBLY_REF: u8 = 0x23;
    pub const METHOD_SPEC: u8 = 0x2B;
    pub const USER_STRING: u8 = 0x70;
}

/// A metadata token: table id in the high byte, row in the low 24 bits.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Token(pub u32);

impl Token {
    /// Wrap a raw token value.
    #[must_use]
    pub fn new(value: u32) -> Self {
        Token(value)
    }

    /// Build a token from a table id and a 1-based row.
    #[must_use]
    pub fn from_parts(table: u8, row: u32) -> Self {
        Token((u32::from(table) << 24) | (row & 0x00FF_FFFF))
    }

    /// The raw value.
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    /// The table id.
    #[must_use]
    pub fn table(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// The 1-based row.
    #[must_use]
    pub fn row(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    /// Zero-based index of the row, or `None` for a null row.
    #[must_use]
    pub fn index(&self) -> Option<usize> {
        self.row().checked_sub(1).map(|row| row as usize)
    }

    /// `true` for the all-zero token.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl From<u32> for Token {
    fn from(value: u32) -> Self {
        Token(value)
    }
}

impl From<Token> for u32 {
    fn from(token: Token) -> Self {
        token.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Token(0x{:08x}, table: 0x{:02x}, row: {})",
            self.0,
            self.table(),
            self.row()
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parts_round_through_value() {
        let token = Token::from_parts(TABLE::MEMBER_REF, 7);
        assert_eq!(token.value(), 0x0A00_0007);
        assert_eq!(token.table(), TABLE::MEMBER_REF);
        assert_eq!(token.row(), 7);
        assert_eq!(token.index(), Some(6));
    }

    #[test]
    fn null_row_has_no_index() {
        let token = Token::from_parts(TABLE::TYPE_REF, 0);
        assert_eq!(token.index(), None);
        assert!(!token.is_null());
        assert!(Token::new(0).is_null());
    }

    #[test]
    fn display_and_debug() {
        let token = Token(0x0600_0001);
        assert_eq!(format!("{token}"), "0x06000001");
        let debug = format!("{token:?}");
        assert!(debug.contains("table: 0x06"));
        assert!(debug.contains("row: 1"));
    }
}
