//! Custom attributes of the static model.
//!
//! A [`CustomAttribute`] keeps the constructor reference and the raw ECMA-335 II.23.3 blob.
//! Decoding needs enum widths, which may live in assemblies that are only reachable once a
//! [`crate::runtime::Domain`] is available, so values are decoded on demand through an
//! [`EnumResolver`] rather than when the image is read.
//!
//! # Blob format
//!
//! - **Prolog** - `0x0001`
//! - **Fixed arguments** - constructor parameter values in declaration order
//! - **Named arguments** - `u16` count, then field/property marker, type, name and value
//!
//! # Examples
//!
//! ```rust,no_run
//! use dotweave::metadata::customattributes::{
//!     CustomAttribute, CustomAttributeArgument, CustomAttributeValue, EnumResolver,
//! };
//! use dotweave::metadata::members::MethodReference;
//! use dotweave::metadata::signatures::MethodSignature;
//! use dotweave::metadata::typesystem::{PrimitiveType, TypeReference};
//!
//! struct NoEnums;
//! impl EnumResolver for NoEnums {
//!     fn enum_underlying_type(&self, name: &str) -> dotweave::Result<PrimitiveType> {
//!         Err(dotweave::Error::UnresolvedSymbol(name.to_string()))
//!     }
//! }
//!
//! let ctor = MethodReference::new(
//!     TypeReference::module_class("Main", "Ns", "NoteAttribute"),
//!     ".ctor",
//!     MethodSignature::new_instance(TypeReference::void(), vec![TypeReference::string()]),
//! );
//! let value = CustomAttributeValue {
//!     fixed_args: vec![CustomAttributeArgument::String(Some("hello".into()))],
//!     named_args: vec![],
//! };
//! let attribute = CustomAttribute::new(ctor, &value)?;
//! assert_eq!(attribute.decode(&NoEnums)?, value);
//! # Ok::<(), dotweave::Error>(())
//! ```
//!
//! # References
//!
//! - ECMA-335 6th Edition, Partition II, Section 23.3 - Custom Attributes

mod encoder;
mod parser;
mod types;

pub use encoder::{encode_custom_attribute_value, encode_named_argument};
pub use parser::CustomAttributeParser;
pub use types::*;

use crate::{metadata::members::MethodReference, Result};

/// An attribute attached to an assembly, module, type, member, parameter or generic parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CustomAttribute {
    /// The attribute constructor
    pub constructor: MethodReference,
    /// Encoded arguments
    pub blob: Vec<u8>,
}

impl CustomAttribute {
    /// Encode `value` for `constructor`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the fixed arguments do not match the constructor's
    /// parameters or a value does not fit its slot.
    pub fn new(constructor: MethodReference, value: &CustomAttributeValue) -> Result<Self> {
        let parameters = &constructor.signature.parameters;
        if parameters.len() != value.fixed_args.len() {
            return Err(malformed_error!(
                "Attribute constructor {} takes {} arguments, {} given",
                constructor,
                parameters.len(),
                value.fixed_args.len()
            ));
        }
        for (parameter, argument) in parameters.iter().zip(&value.fixed_args) {
            if ArgumentType::from_type_reference(parameter).as_ref() != Some(&argument.argument_type()) {
                return Err(malformed_error!(
                    "Attribute argument {} does not fit parameter type {}",
                    argument,
                    parameter
                ));
            }
        }

        Ok(CustomAttribute {
            blob: encode_custom_attribute_value(value)?,
            constructor,
        })
    }

    /// An attribute whose constructor takes no arguments.
    ///
    /// # Errors
    /// See [`CustomAttribute::new`].
    pub fn without_arguments(constructor: MethodReference) -> Result<Self> {
        CustomAttribute::new(constructor, &CustomAttributeValue::default())
    }

    /// Decode the blob against the constructor signature.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for damaged blobs and
    /// [`crate::Error::UnresolvedSymbol`] for enums `enums` does not know.
    pub fn decode(&self, enums: &dyn EnumResolver) -> Result<CustomAttributeValue> {
        CustomAttributeParser::new(&self.blob, enums).parse(&self.constructor.signature.parameters)
    }

    /// `true` if the attribute's type is `namespace.name`.
    #[must_use]
    pub fn is(&self, namespace: &str, name: &str) -> bool {
        self.constructor.declaring.is_named(namespace, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::{
            signatures::MethodSignature,
            typesystem::{AssemblyName, PrimitiveType, TypeReference},
        },
        Error,
    };

    struct Enums;

    impl EnumResolver for Enums {
        fn enum_underlying_type(&self, type_name: &str) -> Result<PrimitiveType> {
            match type_name {
                "Ns.Color" => Ok(PrimitiveType::U1),
                "Ns.Flags, Lib" => Ok(PrimitiveType::I8),
                _ => Err(Error::UnresolvedSymbol(type_name.to_string())),
            }
        }
    }

    fn ctor(parameters: Vec<TypeReference>) -> MethodReference {
        MethodReference::new(
            TypeReference::module_class("Main", "Ns", "TestAttribute"),
            ".ctor",
            MethodSignature::new_instance(TypeReference::void(), parameters),
        )
    }

    fn color() -> TypeReference {
        TypeReference::named(
            crate::metadata::typesystem::ResolutionScope::Module("Main".into()),
            "Ns",
            "Color",
            true,
        )
    }

    #[test]
    fn string_blob_layout() {
        let attribute = CustomAttribute::new(
            ctor(vec![TypeReference::string()]),
            &CustomAttributeValue {
                fixed_args: vec![CustomAttributeArgument::String(Some("Hello".into()))],
                named_args: vec![],
            },
        )
        .unwrap();
        assert_eq!(
            attribute.blob,
            vec![0x01, 0x00, 0x05, b'H', b'e', b'l', b'l', b'o', 0x00, 0x00]
        );
    }

    #[test]
    fn mixed_arguments_survive_decoding() {
        let type_ty = TypeReference::external_class(AssemblyName::corlib(), "System", "Type");
        let value = CustomAttributeValue {
            fixed_args: vec![
                CustomAttributeArgument::I4(-7),
                CustomAttributeArgument::Type(Some("Ns.Helper".into())),
                CustomAttributeArgument::Enum {
                    type_name: "Ns.Color".into(),
                    value: Box::new(CustomAttributeArgument::U1(2)),
                },
                CustomAttributeArgument::Array {
                    element: ArgumentType::Object,
                    values: Some(vec![
                        CustomAttributeArgument::Boxed(Box::new(CustomAttributeArgument::String(
                            Some("Ns.Other".into()),
                        ))),
                        CustomAttributeArgument::Boxed(Box::new(CustomAttributeArgument::R8(0.5))),
                    ]),
                },
            ],
            named_args: vec![
                CustomAttributeNamedArgument {
                    is_field: false,
                    name: "Mode".into(),
                    arg_type: ArgumentType::Enum("Ns.Flags, Lib".into()),
                    value: CustomAttributeArgument::Enum {
                        type_name: "Ns.Flags, Lib".into(),
                        value: Box::new(CustomAttributeArgument::I8(1 << 40)),
                    },
                },
                CustomAttributeNamedArgument {
                    is_field: true,
                    name: "Tags".into(),
                    arg_type: ArgumentType::Array(Box::new(ArgumentType::String)),
                    value: CustomAttributeArgument::Array {
                        element: ArgumentType::String,
                        values: None,
                    },
                },
            ],
        };
        let attribute = CustomAttribute::new(
            ctor(vec![
                TypeReference::int32(),
                type_ty,
                color(),
                TypeReference::object().vector(),
            ]),
            &value,
        )
        .unwrap();

        assert_eq!(attribute.decode(&Enums).unwrap(), value);
    }

    #[test]
    fn unknown_enum_is_not_guessed() {
        let other = TypeReference::named(
            crate::metadata::typesystem::ResolutionScope::Module("Main".into()),
            "Ns",
            "Unknown",
            true,
        );
        let attribute = CustomAttribute {
            constructor: ctor(vec![other]),
            blob: vec![0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00],
        };
        assert!(matches!(
            attribute.decode(&Enums),
            Err(Error::UnresolvedSymbol(_))
        ));
    }

    #[test]
    fn mismatched_arguments_rejected() {
        let result = CustomAttribute::new(
            ctor(vec![TypeReference::int32()]),
            &CustomAttributeValue {
                fixed_args: vec![CustomAttributeArgument::Bool(true)],
                named_args: vec![],
            },
        );
        assert!(matches!(result, Err(Error::Malformed { .. })));

        let bad_prolog = CustomAttribute {
            constructor: ctor(vec![]),
            blob: vec![0x02, 0x00],
        };
        assert!(bad_prolog.decode(&Enums).is_err());
    }
}
