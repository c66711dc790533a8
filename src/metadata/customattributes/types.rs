//! Decoded custom attribute values.
//!
//! These types mirror the ECMA-335 II.23.3 blob grammar. Every argument knows its own
//! serialization type (see [`CustomAttributeArgument::argument_type`]), so a decoded value can
//! be encoded back without consulting the constructor signature again.

use std::fmt;

use crate::metadata::typesystem::{PrimitiveType, ResolutionScope, TypeReference};

/// `CorSerializationType` constants as used inside custom attribute blobs
#[allow(non_snake_case, missing_docs)]
pub mod SERIALIZATION_TYPE {
    pub const BOOLEAN: u8 = 0x02;
    pub const CHAR: u8 = 0x03;
    pub const I1: u8 = 0x04;
    pub const U1: u8 = 0x05;
    pub const I2: u8 = 0x06;
    pub const U2: u8 = 0x07;
    pub const I4: u8 = 0x08;
    pub const U4: u8 = 0x09;
    pub const I8: u8 = 0x0A;
    pub const U8: u8 = 0x0B;
    pub const R4: u8 = 0x0C;
    pub const R8: u8 = 0x0D;
    pub const STRING: u8 = 0x0E;
    pub const SZARRAY: u8 = 0x1D;
    pub const TYPE: u8 = 0x50;
    pub const TAGGED_OBJECT: u8 = 0x51;
    pub const FIELD: u8 = 0x53;
    pub const PROPERTY: u8 = 0x54;
    pub const ENUM: u8 = 0x55;
}

/// Serialization type of an attribute argument (`FieldOrPropType`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArgumentType {
    /// `bool`
    Boolean,
    /// `char`
    Char,
    /// `sbyte`
    I1,
    /// `byte`
    U1,
    /// `short`
    I2,
    /// `ushort`
    U2,
    /// `int`
    I4,
    /// `uint`
    U4,
    /// `long`
    I8,
    /// `ulong`
    U8,
    /// `float`
    R4,
    /// `double`
    R8,
    /// `string`
    String,
    /// `System.Type`, serialized as a type name
    Type,
    /// `object`, serialized with a leading type tag
    Object,
    /// An enum by its serialized (reflection-style) name
    Enum(String),
    /// Single-dimension array
    Array(Box<ArgumentType>),
}

impl ArgumentType {
    /// The argument type of a primitive, if it can appear in an attribute.
    #[must_use]
    pub fn from_primitive(primitive: PrimitiveType) -> Option<Self> {
        Some(match primitive {
            PrimitiveType::Boolean => ArgumentType::Boolean,
            PrimitiveType::Char => ArgumentType::Char,
            PrimitiveType::I1 => ArgumentType::I1,
            PrimitiveType::U1 => ArgumentType::U1,
            PrimitiveType::I2 => ArgumentType::I2,
            PrimitiveType::U2 => ArgumentType::U2,
            PrimitiveType::I4 => ArgumentType::I4,
            PrimitiveType::U4 => ArgumentType::U4,
            PrimitiveType::I8 => ArgumentType::I8,
            PrimitiveType::U8 => ArgumentType::U8,
            PrimitiveType::R4 => ArgumentType::R4,
            PrimitiveType::R8 => ArgumentType::R8,
            PrimitiveType::String => ArgumentType::String,
            PrimitiveType::Object => ArgumentType::Object,
            _ => return None,
        })
    }

    /// The argument type a constructor parameter of type `ty` is serialized with.
    ///
    /// Named value types other than the primitives are taken to be enums.
    #[must_use]
    pub fn from_type_reference(ty: &TypeReference) -> Option<Self> {
        match ty {
            TypeReference::Primitive(p) => ArgumentType::from_primitive(*p),
            TypeReference::Named(_) if ty.is_named("System", "Type") => Some(ArgumentType::Type),
            TypeReference::Named(named) if named.is_value_type => {
                Some(ArgumentType::Enum(serialized_type_name(ty)))
            }
            TypeReference::Vector(element) => {
                ArgumentType::from_type_reference(element).map(|e| ArgumentType::Array(Box::new(e)))
            }
            _ => None,
        }
    }

    /// `true` for `System.Type` and `System.Type[]`.
    #[must_use]
    pub fn is_type_like(&self) -> bool {
        match self {
            ArgumentType::Type => true,
            ArgumentType::Array(element) => **element == ArgumentType::Type,
            _ => false,
        }
    }
}

/// One decoded attribute argument.
#[derive(Debug, Clone, PartialEq)]
pub enum CustomAttributeArgument {
    /// Boolean value
    Bool(bool),
    /// UTF-16 code unit
    Char(u16),
    /// Signed 8-bit integer
    I1(i8),
    /// Unsigned 8-bit integer
    U1(u8),
    /// Signed 16-bit integer
    I2(i16),
    /// Unsigned 16-bit integer
    U2(u16),
    /// Signed 32-bit integer
    I4(i32),
    /// Unsigned 32-bit integer
    U4(u32),
    /// Signed 64-bit integer
    I8(i64),
    /// Unsigned 64-bit integer
    U8(u64),
    /// 32-bit floating point
    R4(f32),
    /// 64-bit floating point
    R8(f64),
    /// String, `None` for a null reference
    String(Option<String>),
    /// Type by serialized name, `None` for a null reference
    Type(Option<String>),
    /// Enum value: the enum's serialized name and its underlying value
    Enum {
        /// Serialized enum type name
        type_name: String,
        /// Underlying integral value
        value: Box<CustomAttributeArgument>,
    },
    /// Single-dimension array, `None` for a null reference
    Array {
        /// Element type
        element: ArgumentType,
        /// Elements
        values: Option<Vec<CustomAttributeArgument>>,
    },
    /// A value stored in an `object` slot, tagged with its own type
    Boxed(Box<CustomAttributeArgument>),
}

impl CustomAttributeArgument {
    /// The serialization type of this value.
    #[must_use]
    pub fn argument_type(&self) -> ArgumentType {
        match self {
            CustomAttributeArgument::Bool(_) => ArgumentType::Boolean,
            CustomAttributeArgument::Char(_) => ArgumentType::Char,
            CustomAttributeArgument::I1(_) => ArgumentType::I1,
            CustomAttributeArgument::U1(_) => ArgumentType::U1,
            CustomAttributeArgument::I2(_) => ArgumentType::I2,
            CustomAttributeArgument::U2(_) => ArgumentType::U2,
            CustomAttributeArgument::I4(_) => ArgumentType::I4,
            CustomAttributeArgument::U4(_) => ArgumentType::U4,
            CustomAttributeArgument::I8(_) => ArgumentType::I8,
            CustomAttributeArgument::U8(_) => ArgumentType::U8,
            CustomAttributeArgument::R4(_) => ArgumentType::R4,
            CustomAttributeArgument::R8(_) => ArgumentType::R8,
            CustomAttributeArgument::String(_) => ArgumentType::String,
            CustomAttributeArgument::Type(_) => ArgumentType::Type,
            CustomAttributeArgument::Enum { type_name, .. } => ArgumentType::Enum(type_name.clone()),
            CustomAttributeArgument::Array { element, .. } => {
                ArgumentType::Array(Box::new(element.clone()))
            }
            CustomAttributeArgument::Boxed(_) => ArgumentType::Object,
        }
    }
}

/// A named field or property assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomAttributeNamedArgument {
    /// Field (`true`) or property (`false`)
    pub is_field: bool,
    /// Member name
    pub name: String,
    /// Declared serialization type of the member
    pub arg_type: ArgumentType,
    /// Assigned value
    pub value: CustomAttributeArgument,
}

/// A fully decoded attribute blob.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CustomAttributeValue {
    /// Constructor arguments, in parameter order
    pub fixed_args: Vec<CustomAttributeArgument>,
    /// Field and property assignments
    pub named_args: Vec<CustomAttributeNamedArgument>,
}

/// Looks up the underlying integral type of enums named inside attribute blobs.
///
/// Enum values carry no width of their own in the blob, so decoding depends on this seam.
pub trait EnumResolver {
    /// Underlying primitive of the enum `type_name` (reflection-style, `Ns.Outer+Inner, Assembly`).
    ///
    /// # Errors
    /// Returns [`crate::Error::UnresolvedSymbol`] if the enum cannot be found.
    fn enum_underlying_type(&self, type_name: &str) -> crate::Result<PrimitiveType>;
}

/// Reflection-style name of a type reference as serialized in attribute blobs.
///
/// Nested types join with `+`; types from another assembly carry `, AssemblyName`.
#[must_use]
pub fn serialized_type_name(ty: &TypeReference) -> String {
    fn path(ty: &TypeReference, out: &mut String) -> Option<String> {
        match ty {
            TypeReference::Primitive(p) => {
                out.push_str("System.");
                out.push_str(p.name());
                None
            }
            TypeReference::Named(named) => match &named.scope {
                ResolutionScope::Nested(declaring) => {
                    let assembly = path(declaring, out);
                    out.push('+');
                    out.push_str(&named.name);
                    assembly
                }
                scope => {
                    if !named.namespace.is_empty() {
                        out.push_str(&named.namespace);
                        out.push('.');
                    }
                    out.push_str(&named.name);
                    match scope {
                        ResolutionScope::Assembly(assembly) => Some(assembly.name.clone()),
                        _ => None,
                    }
                }
            },
            TypeReference::GenericInstance { element, .. } => path(element, out),
            other => {
                out.push_str(&other.to_string());
                None
            }
        }
    }

    let mut name = String::new();
    if let Some(assembly) = path(ty, &mut name) {
        name.push_str(", ");
        name.push_str(&assembly);
    }
    name
}

/// Split a serialized type name into its nested path (`["Ns.Outer", "Inner"]`) and optional
/// assembly name.
#[must_use]
pub fn split_serialized_type_name(name: &str) -> (Vec<&str>, Option<&str>) {
    let (type_part, assembly) = match name.split_once(',') {
        Some((type_part, rest)) => {
            let assembly = rest.split(',').next().map(str::trim).filter(|s| !s.is_empty());
            (type_part.trim(), assembly)
        }
        None => (name.trim(), None),
    };
    (type_part.split('+').collect(), assembly)
}

impl fmt::Display for CustomAttributeArgument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CustomAttributeArgument::Bool(v) => write!(f, "{v}"),
            CustomAttributeArgument::Char(v) => write!(f, "'\\u{v:04x}'"),
            CustomAttributeArgument::I1(v) => write!(f, "{v}"),
            CustomAttributeArgument::U1(v) => write!(f, "{v}"),
            CustomAttributeArgument::I2(v) => write!(f, "{v}"),
            CustomAttributeArgument::U2(v) => write!(f, "{v}"),
            CustomAttributeArgument::I4(v) => write!(f, "{v}"),
            CustomAttributeArgument::U4(v) => write!(f, "{v}"),
            CustomAttributeArgument::I8(v) => write!(f, "{v}"),
            CustomAttributeArgument::U8(v) => write!(f, "{v}"),
            CustomAttributeArgument::R4(v) => write!(f, "{v}"),
            CustomAttributeArgument::R8(v) => write!(f, "{v}"),
            CustomAttributeArgument::String(Some(v)) => write!(f, "{v:?}"),
            CustomAttributeArgument::Type(Some(v)) => write!(f, "typeof({v})"),
            CustomAttributeArgument::String(None)
            | CustomAttributeArgument::Type(None)
            | CustomAttributeArgument::Array { values: None, .. } => write!(f, "null"),
            CustomAttributeArgument::Enum { type_name, value } => write!(f, "({type_name}){value}"),
            CustomAttributeArgument::Array {
                values: Some(values),
                ..
            } => {
                write!(f, "[")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{value}")?;
                }
                write!(f, "]")
            }
            CustomAttributeArgument::Boxed(inner) => write!(f, "{inner}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::typesystem::AssemblyName;

    #[test]
    fn serialized_names() {
        let outer = TypeReference::module_class("Main", "Ns", "Outer");
        let inner = TypeReference::nested(outer, "Color", true);
        assert_eq!(serialized_type_name(&inner), "Ns.Outer+Color");

        let external = TypeReference::external_class(AssemblyName::new("Lib"), "Lib.Ns", "Kind");
        assert_eq!(serialized_type_name(&external), "Lib.Ns.Kind, Lib");

        let (path, assembly) =
            split_serialized_type_name("Ns.Outer+Color, Lib, Version=1.0.0.0, Culture=neutral");
        assert_eq!(path, vec!["Ns.Outer", "Color"]);
        assert_eq!(assembly, Some("Lib"));
    }

    #[test]
    fn argument_types_from_signatures() {
        let type_ty = TypeReference::external_class(AssemblyName::corlib(), "System", "Type");
        assert_eq!(
            ArgumentType::from_type_reference(&type_ty.clone().vector()),
            Some(ArgumentType::Array(Box::new(ArgumentType::Type)))
        );
        assert!(ArgumentType::from_type_reference(&type_ty).is_some_and(|t| t.is_type_like()));
        assert!(!ArgumentType::Array(Box::new(ArgumentType::Object)).is_type_like());
        assert_eq!(
            ArgumentType::from_type_reference(&TypeReference::void()),
            None
        );
    }
}
