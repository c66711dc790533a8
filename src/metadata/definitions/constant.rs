use std::fmt;

use widestring::U16String;

use crate::{
    file::parser::Parser,
    metadata::typesystem::{PrimitiveType, ELEMENT_TYPE},
    Result,
};

/// A compile-time constant attached to a field, parameter or property (ECMA-335 II.22.9).
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// `bool`
    Bool(bool),
    /// `char`, as a UTF-16 code unit
    Char(u16),
    /// `sbyte`
    I1(i8),
    /// `byte`
    U1(u8),
    /// `short`
    I2(i16),
    /// `ushort`
    U2(u16),
    /// `int`
    I4(i32),
    /// `uint`
    U4(u32),
    /// `long`
    I8(i64),
    /// `ulong`
    U8(u64),
    /// `float`
    R4(f32),
    /// `double`
    R8(f64),
    /// `string`
    String(String),
    /// Null reference
    Null,
}

impl Constant {
    /// The element type code stored next to the value.
    #[must_use]
    pub fn element_type(&self) -> u8 {
        match self {
            Constant::Bool(_) => ELEMENT_TYPE::BOOLEAN,
            Constant::Char(_) => ELEMENT_TYPE::CHAR,
            Constant::I1(_) => ELEMENT_TYPE::I1,
            Constant::U1(_) => ELEMENT_TYPE::U1,
            Constant::I2(_) => ELEMENT_TYPE::I2,
            Constant::U2(_) => ELEMENT_TYPE::U2,
            Constant::I4(_) => ELEMENT_TYPE::I4,
            Constant::U4(_) => ELEMENT_TYPE::U4,
            Constant::I8(_) => ELEMENT_TYPE::I8,
            Constant::U8(_) => ELEMENT_TYPE::U8,
            Constant::R4(_) => ELEMENT_TYPE::R4,
            Constant::R8(_) => ELEMENT_TYPE::R8,
            Constant::String(_) => ELEMENT_TYPE::STRING,
            Constant::Null => ELEMENT_TYPE::CLASS,
        }
    }

    /// The primitive type of the value, `None` for null.
    #[must_use]
    pub fn primitive(&self) -> Option<PrimitiveType> {
        PrimitiveType::from_element_type(self.element_type())
    }

    /// Encode the value bytes.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Constant::Bool(v) => vec![u8::from(*v)],
            Constant::Char(v) | Constant::U2(v) => v.to_le_bytes().to_vec(),
            Constant::I1(v) => v.to_le_bytes().to_vec(),
            Constant::U1(v) => vec![*v],
            Constant::I2(v) => v.to_le_bytes().to_vec(),
            Constant::I4(v) => v.to_le_bytes().to_vec(),
            Constant::U4(v) => v.to_le_bytes().to_vec(),
            Constant::I8(v) => v.to_le_bytes().to_vec(),
            Constant::U8(v) => v.to_le_bytes().to_vec(),
            Constant::R4(v) => v.to_le_bytes().to_vec(),
            Constant::R8(v) => v.to_le_bytes().to_vec(),
            Constant::String(v) => U16String::from_str(v)
                .into_vec()
                .into_iter()
                .flat_map(u16::to_le_bytes)
                .collect(),
            Constant::Null => vec![0, 0, 0, 0],
        }
    }

    /// Decode a value of element type `element_type` from `data`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for unknown element types or invalid UTF-16 and
    /// [`crate::Error::OutOfBounds`] for truncated values.
    pub fn decode(element_type: u8, data: &[u8]) -> Result<Self> {
        let mut parser = Parser::new(data);
        Ok(match element_type {
            ELEMENT_TYPE::BOOLEAN => Constant::Bool(parser.read_le::<u8>()? != 0),
            ELEMENT_TYPE::CHAR => Constant::Char(parser.read_le::<u16>()?),
            ELEMENT_TYPE::I1 => Constant::I1(parser.read_le::<i8>()?),
            ELEMENT_TYPE::U1 => Constant::U1(parser.read_le::<u8>()?),
            ELEMENT_TYPE::I2 => Constant::I2(parser.read_le::<i16>()?),
            ELEMENT_TYPE::U2 => Constant::U2(parser.read_le::<u16>()?),
            ELEMENT_TYPE::I4 => Constant::I4(parser.read_le::<i32>()?),
            ELEMENT_TYPE::U4 => Constant::U4(parser.read_le::<u32>()?),
            ELEMENT_TYPE::I8 => Constant::I8(parser.read_le::<i64>()?),
            ELEMENT_TYPE::U8 => Constant::U8(parser.read_le::<u64>()?),
            ELEMENT_TYPE::R4 => Constant::R4(parser.read_le::<f32>()?),
            ELEMENT_TYPE::R8 => Constant::R8(parser.read_le::<f64>()?),
            ELEMENT_TYPE::STRING => {
                if data.len() % 2 != 0 {
                    return Err(malformed_error!("Odd-sized string constant - {} bytes", data.len()));
                }
                let units = data
                    .chunks_exact(2)
                    .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                    .collect::<Vec<_>>();
                let value = U16String::from_vec(units)
                    .to_string()
                    .map_err(|e| malformed_error!("Invalid UTF-16 string constant - {}", e))?;
                Constant::String(value)
            }
            ELEMENT_TYPE::CLASS => Constant::Null,
            other => return Err(malformed_error!("Invalid constant type - 0x{:02x}", other)),
        })
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Bool(v) => write!(f, "bool({v})"),
            Constant::Char(v) => write!(f, "char(0x{v:04x})"),
            Constant::I1(v) => write!(f, "int8({v})"),
            Constant::U1(v) => write!(f, "uint8({v})"),
            Constant::I2(v) => write!(f, "int16({v})"),
            Constant::U2(v) => write!(f, "uint16({v})"),
            Constant::I4(v) => write!(f, "int32({v})"),
            Constant::U4(v) => write!(f, "uint32({v})"),
            Constant::I8(v) => write!(f, "int64({v})"),
            Constant::U8(v) => write!(f, "uint64({v})"),
            Constant::R4(v) => write!(f, "float32({v})"),
            Constant::R8(v) => write!(f, "float64({v})"),
            Constant::String(v) => write!(f, "{v:?}"),
            Constant::Null => write!(f, "nullref"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_decode_from_their_encoding() {
        for constant in [
            Constant::Bool(true),
            Constant::I2(-300),
            Constant::U8(u64::MAX),
            Constant::R8(2.5),
            Constant::String("h\u{e9}llo".into()),
            Constant::Null,
        ] {
            let decoded = Constant::decode(constant.element_type(), &constant.encode()).unwrap();
            assert_eq!(decoded, constant);
        }
    }

    #[test]
    fn bad_constants() {
        assert!(Constant::decode(ELEMENT_TYPE::STRING, &[0x41]).is_err());
        assert!(Constant::decode(ELEMENT_TYPE::I4, &[1, 2]).is_err());
        assert!(Constant::decode(ELEMENT_TYPE::SZARRAY, &[]).is_err());
        assert_eq!(Constant::I4(1).primitive(), Some(PrimitiveType::I4));
    }
}
