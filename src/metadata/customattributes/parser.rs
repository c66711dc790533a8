//! Custom attribute blob decoding (ECMA-335 II.23.3).
//!
//! Fixed arguments are decoded against the constructor's parameter types; named arguments
//! carry their own `FieldOrPropType` tags. Enum widths come from an [`EnumResolver`], and an
//! enum that cannot be resolved fails the decode instead of guessing a width.

use crate::{
    file::parser::Parser,
    metadata::{
        customattributes::{
            ArgumentType, CustomAttributeArgument, CustomAttributeNamedArgument,
            CustomAttributeValue, EnumResolver, SERIALIZATION_TYPE,
        },
        typesystem::{PrimitiveType, TypeReference},
    },
    Result,
};

/// Nesting bound for boxed values and arrays inside one blob.
const MAX_NESTING_DEPTH: usize = 16;

/// Decodes one attribute blob.
pub struct CustomAttributeParser<'a, 'r> {
    parser: Parser<'a>,
    enums: &'r dyn EnumResolver,
}

impl<'a, 'r> CustomAttributeParser<'a, 'r> {
    /// Create a decoder over `data`.
    #[must_use]
    pub fn new(data: &'a [u8], enums: &'r dyn EnumResolver) -> Self {
        CustomAttributeParser {
            parser: Parser::new(data),
            enums,
        }
    }

    /// Decode the blob given the constructor's parameter types.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for a bad prolog, truncated data or parameter types
    /// that cannot appear in attributes, and [`crate::Error::UnresolvedSymbol`] for unknown
    /// enums.
    pub fn parse(mut self, parameters: &[TypeReference]) -> Result<CustomAttributeValue> {
        if self.parser.is_empty() {
            if parameters.is_empty() {
                return Ok(CustomAttributeValue::default());
            }
            return Err(malformed_error!("Empty custom attribute blob for a constructor with arguments"));
        }

        let prolog = self.parser.read_le::<u16>()?;
        if prolog != 0x0001 {
            return Err(malformed_error!("Invalid custom attribute prolog - 0x{:04x}", prolog));
        }

        let mut fixed_args = Vec::with_capacity(parameters.len());
        for parameter in parameters {
            let Some(arg_type) = ArgumentType::from_type_reference(parameter) else {
                return Err(malformed_error!(
                    "Constructor parameter type {} cannot appear in an attribute",
                    parameter
                ));
            };
            fixed_args.push(self.parse_value(&arg_type, 0)?);
        }

        let mut named_args = Vec::new();
        if self.parser.has_more_data() {
            let count = self.parser.read_le::<u16>()?;
            for _ in 0..count {
                named_args.push(self.parse_named_argument()?);
            }
        }

        Ok(CustomAttributeValue {
            fixed_args,
            named_args,
        })
    }

    /// Decode one named argument (`FIELD`/`PROPERTY` marker, type, name, value).
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for an unknown marker or truncated data.
    pub fn parse_named_argument(&mut self) -> Result<CustomAttributeNamedArgument> {
        let is_field = match self.parser.read_le::<u8>()? {
            SERIALIZATION_TYPE::FIELD => true,
            SERIALIZATION_TYPE::PROPERTY => false,
            other => return Err(malformed_error!("Invalid named argument marker - 0x{:02x}", other)),
        };
        let arg_type = self.parse_field_or_prop_type(0)?;
        let Some(name) = self.parser.read_ser_string()? else {
            return Err(malformed_error!("Named argument without a name"));
        };
        let value = self.parse_value(&arg_type, 0)?;

        Ok(CustomAttributeNamedArgument {
            is_field,
            name,
            arg_type,
            value,
        })
    }

    fn parse_field_or_prop_type(&mut self, depth: usize) -> Result<ArgumentType> {
        if depth > MAX_NESTING_DEPTH {
            return Err(crate::Error::RecursionLimit(MAX_NESTING_DEPTH));
        }

        let code = self.parser.read_le::<u8>()?;
        Ok(match code {
            SERIALIZATION_TYPE::BOOLEAN => ArgumentType::Boolean,
            SERIALIZATION_TYPE::CHAR => ArgumentType::Char,
            SERIALIZATION_TYPE::I1 => ArgumentType::I1,
            SERIALIZATION_TYPE::U1 => ArgumentType::U1,
            SERIALIZATION_TYPE::I2 => ArgumentType::I2,
            SERIALIZATION_TYPE::U2 => ArgumentType::U2,
            SERIALIZATION_TYPE::I4 => ArgumentType::I4,
            SERIALIZATION_TYPE::U4 => ArgumentType::U4,
            SERIALIZATION_TYPE::I8 => ArgumentType::I8,
            SERIALIZATION_TYPE::U8 => ArgumentType::U8,
            SERIALIZATION_TYPE::R4 => ArgumentType::R4,
            SERIALIZATION_TYPE::R8 => ArgumentType::R8,
            SERIALIZATION_TYPE::STRING => ArgumentType::String,
            SERIALIZATION_TYPE::TYPE => ArgumentType::Type,
            SERIALIZATION_TYPE::TAGGED_OBJECT => ArgumentType::Object,
            SERIALIZATION_TYPE::ENUM => match self.parser.read_ser_string()? {
                Some(name) => ArgumentType::Enum(name),
                None => return Err(malformed_error!("Enum argument without a type name")),
            },
            SERIALIZATION_TYPE::SZARRAY => {
                ArgumentType::Array(Box::new(self.parse_field_or_prop_type(depth + 1)?))
            }
            _ => return Err(malformed_error!("Invalid serialization type - 0x{:02x}", code)),
        })
    }

    fn parse_value(&mut self, arg_type: &ArgumentType, depth: usize) -> Result<CustomAttributeArgument> {
        if depth > MAX_NESTING_DEPTH {
            return Err(crate::Error::RecursionLimit(MAX_NESTING_DEPTH));
        }

        Ok(match arg_type {
            ArgumentType::Boolean => CustomAttributeArgument::Bool(self.parser.read_le::<u8>()? != 0),
            ArgumentType::Char => CustomAttributeArgument::Char(self.parser.read_le::<u16>()?),
            ArgumentType::I1 => CustomAttributeArgument::I1(self.parser.read_le::<i8>()?),
            ArgumentType::U1 => CustomAttributeArgument::U1(self.parser.read_le::<u8>()?),
            ArgumentType::I2 => CustomAttributeArgument::I2(self.parser.read_le::<i16>()?),
            ArgumentType::U2 => CustomAttributeArgument::U2(self.parser.read_le::<u16>()?),
            ArgumentType::I4 => CustomAttributeArgument::I4(self.parser.read_le::<i32>()?),
            ArgumentType::U4 => CustomAttributeArgument::U4(self.parser.read_le::<u32>()?),
            ArgumentType::I8 => CustomAttributeArgument::I8(self.parser.read_le::<i64>()?),
            ArgumentType::U8 => CustomAttributeArgument::U8(self.parser.read_le::<u64>()?),
            ArgumentType::R4 => CustomAttributeArgument::R4(self.parser.read_le::<f32>()?),
            ArgumentType::R8 => CustomAttributeArgument::R8(self.parser.read_le::<f64>()?),
            ArgumentType::String => CustomAttributeArgument::String(self.parser.read_ser_string()?),
            ArgumentType::Type => CustomAttributeArgument::Type(self.parser.read_ser_string()?),
            ArgumentType::Object => {
                let tagged = self.parse_field_or_prop_type(depth + 1)?;
                CustomAttributeArgument::Boxed(Box::new(self.parse_value(&tagged, depth + 1)?))
            }
            ArgumentType::Enum(type_name) => {
                let underlying = self.enums.enum_underlying_type(type_name)?;
                let Some(underlying_type) = ArgumentType::from_primitive(underlying)
                    .filter(|_| is_integral(underlying))
                else {
                    return Err(malformed_error!(
                        "Enum {} has non-integral underlying type {}",
                        type_name,
                        underlying.name()
                    ));
                };
                CustomAttributeArgument::Enum {
                    type_name: type_name.clone(),
                    value: Box::new(self.parse_value(&underlying_type, depth + 1)?),
                }
            }
            ArgumentType::Array(element) => {
                let count = self.parser.read_le::<u32>()?;
                let values = if count == u32::MAX {
                    None
                } else {
                    if count as usize > self.parser.remaining() {
                        return Err(malformed_error!("Array length {} exceeds blob size", count));
                    }
                    let mut values = Vec::with_capacity(count as usize);
                    for _ in 0..count {
                        values.push(self.parse_value(element, depth + 1)?);
                    }
                    Some(values)
                };
                CustomAttributeArgument::Array {
                    element: (**element).clone(),
                    values,
                }
            }
        })
    }
}

fn is_integral(primitive: PrimitiveType) -> bool {
    matches!(
        primitive,
        PrimitiveType::Boolean
            | PrimitiveType::Char
            | PrimitiveType::I1
            | PrimitiveType::U1
            | PrimitiveType::I2
            | PrimitiveType::U2
            | PrimitiveType::I4
            | PrimitiveType::U4
            | PrimitiveType::I8
            | PrimitiveType::U8
    )
}
