//! Signature element codes and the built-in primitive types.

use strum::{EnumCount, EnumIter};

/// Element type codes used in signature blobs (ECMA-335 II.23.1.16).
#[allow(non_snake_case, missing_docs)]
pub mod ELEMENT_TYPE {
    //Marks end of a list
    pub const END: u8 = 0x00;
    pub const VOID: u8 = 0x01;
    pub const BOOLEAN: u8 = 0x02;
    pub const CHAR: u8 = 0x03;
    pub const I1: u8 = 0x04;
    pub const U1: u8 = 0x05;
    pub const I2: u8 = 0x06;
    pub const U2: u8 = 0x07;
    pub const I4: u8 = 0x08;
    pub const U4: u8 = 0x09;
    pub const I8: u8 = 0x0a;
    pub const U8: u8 = 0x0b;
    pub const R4: u8 = 0x0c;
    pub const R8: u8 = 0x0d;
    pub const STRING: u8 = 0x0e;
    // Followed by type
    pub const PTR: u8 = 0x0f;
    // Followed by type
    pub const BYREF: u8 = 0x10;
    // Followed by TypeDef or TypeRef token
    pub const VALUETYPE: u8 = 0x11;
    // Followed by TypeDef or TypeRef token
    pub const CLASS: u8 = 0x12;
    // Generic parameter of the enclosing type
    pub const VAR: u8 = 0x13;
    // type rank boundsCount bound1 … loCount lo1 …
    pub const ARRAY: u8 = 0x14;
    // Followed by type type-arg-count type-1 ... type-n
    pub const GENERICINST: u8 = 0x15;
    pub const TYPEDBYREF: u8 = 0x16;
    pub const I: u8 = 0x18;
    pub const U: u8 = 0x19;
    // Followed by full method signature
    pub const FNPTR: u8 = 0x1b;
    pub const OBJECT: u8 = 0x1c;
    // Single-dim array with 0 lower bound
    pub const SZARRAY: u8 = 0x1d;
    // Generic parameter of the enclosing method
    pub const MVAR: u8 = 0x1e;
    pub const CMOD_REQD: u8 = 0x1f;
    pub const CMOD_OPT: u8 = 0x20;
    pub const SENTINEL: u8 = 0x41;
    pub const PINNED: u8 = 0x45;
}

/// The types that signatures encode with a dedicated element code.
///
/// Each primitive lives in the core library under the `System` namespace; the discriminant is
/// also its row in the core library's type table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter, EnumCount)]
#[repr(u8)]
pub enum PrimitiveType {
    /// `System.Void`
    Void,
    /// `System.Boolean`
    Boolean,
    /// `System.Char`
    Char,
    /// `System.SByte`
    I1,
    /// `System.Byte`
    U1,
    /// `System.Int16`
    I2,
    /// `System.UInt16`
    U2,
    /// `System.Int32`
    I4,
    /// `System.UInt32`
    U4,
    /// `System.Int64`
    I8,
    /// `System.UInt64`
    U8,
    /// `System.Single`
    R4,
    /// `System.Double`
    R8,
    /// `System.IntPtr`
    I,
    /// `System.UIntPtr`
    U,
    /// `System.String`
    String,
    /// `System.Object`
    Object,
    /// `System.TypedReference`
    TypedByRef,
}

impl PrimitiveType {
    /// The signature element code.
    #[must_use]
    pub fn element_type(self) -> u8 {
        match self {
            PrimitiveType::Void => ELEMENT_TYPE::VOID,
            PrimitiveType::Boolean => ELEMENT_TYPE::BOOLEAN,
            PrimitiveType::Char => ELEMENT_TYPE::CHAR,
            PrimitiveType::I1 => ELEMENT_TYPE::I1,
            PrimitiveType::U1 => ELEMENT_TYPE::U1,
            PrimitiveType::I2 => ELEMENT_TYPE::I2,
            PrimitiveType::U2 => ELEMENT_TYPE::U2,
            PrimitiveType::I4 => ELEMENT_TYPE::I4,
            PrimitiveType::U4 => ELEMENT_TYPE::U4,
            PrimitiveType::I8 => ELEMENT_TYPE::I8,
            PrimitiveType::U8 => ELEMENT_TYPE::U8,
            PrimitiveType::R4 => ELEMENT_TYPE::R4,
            PrimitiveType::R8 => ELEMENT_TYPE::R8,
            PrimitiveType::I => ELEMENT_TYPE::I,
            PrimitiveType::U => ELEMENT_TYPE::U,
            PrimitiveType::String => ELEMENT_TYPE::STRING,
            PrimitiveType::Object => ELEMENT_TYPE::OBJECT,
            PrimitiveType::TypedByRef => ELEMENT_TYPE::TYPEDBYREF,
        }
    }

    /// Map a signature element code back to its primitive.
    #[must_use]
    pub fn from_element_type(code: u8) -> Option<Self> {
        Some(match code {
            ELEMENT_TYPE::VOID => PrimitiveType::Void,
            ELEMENT_TYPE::BOOLEAN => PrimitiveType::Boolean,
            ELEMENT_TYPE::CHAR => PrimitiveType::Char,
            ELEMENT_TYPE::I1 => PrimitiveType::I1,
            ELEMENT_TYPE::U1 => PrimitiveType::U1,
            ELEMENT_TYPE::I2 => PrimitiveType::I2,
            ELEMENT_TYPE::U2 => PrimitiveType::U2,
            ELEMENT_TYPE::I4 => PrimitiveType::I4,
            ELEMENT_TYPE::U4 => PrimitiveType::U4,
            ELEMENT_TYPE::I8 => PrimitiveType::I8,
            ELEMENT_TYPE::U8 => PrimitiveType::U8,
            ELEMENT_TYPE::R4 => PrimitiveType::R4,
            ELEMENT_TYPE::R8 => PrimitiveType::R8,
            ELEMENT_TYPE::I => PrimitiveType::I,
            ELEMENT_TYPE::U => PrimitiveType::U,
            ELEMENT_TYPE::STRING => PrimitiveType::String,
            ELEMENT_TYPE::OBJECT => PrimitiveType::Object,
            ELEMENT_TYPE::TYPEDBYREF => PrimitiveType::TypedByRef,
            _ => return None,
        })
    }

    /// The simple name in the `System` namespace.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            PrimitiveType::Void => "Void",
            PrimitiveType::Boolean => "Boolean",
            PrimitiveType::Char => "Char",
            PrimitiveType::I1 => "SByte",
            PrimitiveType::U1 => "Byte",
            PrimitiveType::I2 => "Int16",
            PrimitiveType::U2 => "UInt16",
            PrimitiveType::I4 => "Int32",
            PrimitiveType::U4 => "UInt32",
            PrimitiveType::I8 => "Int64",
            PrimitiveType::U8 => "UInt64",
            PrimitiveType::R4 => "Single",
            PrimitiveType::R8 => "Double",
            PrimitiveType::I => "IntPtr",
            PrimitiveType::U => "UIntPtr",
            PrimitiveType::String => "String",
            PrimitiveType::Object => "Object",
            PrimitiveType::TypedByRef => "TypedReference",
        }
    }

    /// Look up a primitive by its `System` name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        use strum::IntoEnumIterator;
        PrimitiveType::iter().find(|p| p.name() == name)
    }

    /// `true` for everything except `String` and `Object`.
    #[must_use]
    pub fn is_value_type(self) -> bool {
        !matches!(self, PrimitiveType::String | PrimitiveType::Object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn element_codes_map_both_ways() {
        for primitive in PrimitiveType::iter() {
            assert_eq!(
                PrimitiveType::from_element_type(primitive.element_type()),
                Some(primitive)
            );
        }
        assert_eq!(PrimitiveType::from_element_type(ELEMENT_TYPE::CLASS), None);
    }

    #[test]
    fn names() {
        assert_eq!(PrimitiveType::from_name("Int32"), Some(PrimitiveType::I4));
        assert_eq!(PrimitiveType::I1.name(), "SByte");
        assert!(!PrimitiveType::String.is_value_type());
        assert!(PrimitiveType::R8.is_value_type());
    }
}
