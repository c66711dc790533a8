//! Symbolic type references of the static model.
//!
//! A [`TypeReference`] never points at a table row or a live object. Simple types name their
//! owner through a [`ResolutionScope`]; constructed types wrap an element reference plus shape
//! data; generic parameters carry only their owner kind and position, the owner itself being
//! the type or method in whose context the reference appears.

use std::fmt;

use sha1::{Digest, Sha1};

use crate::metadata::{signatures::MethodSignature, typesystem::PrimitiveType};

/// Four-part assembly version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct AssemblyVersion {
    /// Major version
    pub major: u16,
    /// Minor version
    pub minor: u16,
    /// Build number
    pub build: u16,
    /// Revision number
    pub revision: u16,
}

impl AssemblyVersion {
    /// Create a version from its four parts.
    #[must_use]
    pub const fn new(major: u16, minor: u16, build: u16, revision: u16) -> Self {
        AssemblyVersion {
            major,
            minor,
            build,
            revision,
        }
    }
}

impl fmt::Display for AssemblyVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.revision
        )
    }
}

/// Identity of an assembly as written in references.
///
/// Only the simple name takes part in loading and equality lookups inside a domain; version,
/// culture and key are carried for faithful round trips.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssemblyName {
    /// Simple name, e.g. `mscorlib`
    pub name: String,
    /// Version
    pub version: AssemblyVersion,
    /// Culture, `None` for neutral
    pub culture: Option<String>,
    /// Full public key, if the assembly is strong-named
    pub public_key: Option<Vec<u8>>,
}

impl AssemblyName {
    /// A neutral, unsigned name with version 0.0.0.0.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        AssemblyName {
            name: name.into(),
            version: AssemblyVersion::default(),
            culture: None,
            public_key: None,
        }
    }

    /// Set the version.
    #[must_use]
    pub fn with_version(mut self, version: AssemblyVersion) -> Self {
        self.version = version;
        self
    }

    /// The core library reference emitted by compilers targeting the desktop framework.
    #[must_use]
    pub fn corlib() -> Self {
        AssemblyName::new("mscorlib").with_version(AssemblyVersion::new(4, 0, 0, 0))
    }

    /// The last eight bytes of the SHA-1 of the public key, reversed.
    #[must_use]
    pub fn public_key_token(&self) -> Option<[u8; 8]> {
        let key = self.public_key.as_ref()?;
        let digest = Sha1::digest(key);
        let mut token = [0u8; 8];
        for (slot, byte) in token.iter_mut().zip(digest.iter().rev()) {
            *slot = *byte;
        }
        Some(token)
    }
}

impl fmt::Display for AssemblyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, Version={}, Culture={}, PublicKeyToken=",
            self.name,
            self.version,
            self.culture.as_deref().unwrap_or("neutral")
        )?;
        match self.public_key_token() {
            Some(token) => token.iter().try_for_each(|b| write!(f, "{b:02x}")),
            None => write!(f, "null"),
        }
    }
}

/// Where a simple type reference points.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResolutionScope {
    /// A module of the assembly being processed, by module name
    Module(String),
    /// An external assembly, loaded by name on first use
    Assembly(AssemblyName),
    /// A nested type: the enclosing type
    Nested(Box<TypeReference>),
}

/// A simple, non-constructed type reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamedType {
    /// Owner of the type
    pub scope: ResolutionScope,
    /// Namespace, empty for nested types
    pub namespace: String,
    /// Simple name
    pub name: String,
    /// Whether signatures encode the type as `VALUETYPE`
    pub is_value_type: bool,
}

/// The owner kind of a generic parameter reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenericOwner {
    /// `!n`, a parameter of the enclosing type
    Type,
    /// `!!n`, a parameter of the enclosing method
    Method,
}

/// A symbolic type reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeReference {
    /// A built-in primitive with its own element code
    Primitive(PrimitiveType),
    /// A class or value type by name
    Named(NamedType),
    /// A generic parameter by owner kind and zero-based position
    GenericParameter {
        /// Type or method parameter
        owner: GenericOwner,
        /// Position in the owner's parameter list
        position: u16,
    },
    /// Single-dimension, zero-based array
    Vector(Box<TypeReference>),
    /// Multi-dimensional array
    Array {
        /// Element type
        element: Box<TypeReference>,
        /// Number of dimensions
        rank: u32,
    },
    /// Unmanaged pointer
    Pointer(Box<TypeReference>),
    /// Managed reference
    ByRef(Box<TypeReference>),
    /// Generic type instantiation
    GenericInstance {
        /// The generic type definition
        element: Box<TypeReference>,
        /// Type arguments
        arguments: Vec<TypeReference>,
    },
    /// Function pointer
    FunctionPointer(Box<MethodSignature>),
    /// Pinned local
    Pinned(Box<TypeReference>),
    /// `modreq`
    ModifierRequired {
        /// Modifier type
        modifier: Box<TypeReference>,
        /// Modified type
        element: Box<TypeReference>,
    },
    /// `modopt`
    ModifierOptional {
        /// Modifier type
        modifier: Box<TypeReference>,
        /// Modified type
        element: Box<TypeReference>,
    },
    /// Vararg sentinel
    Sentinel,
}

impl TypeReference {
    /// A named type in `scope`.
    #[must_use]
    pub fn named(
        scope: ResolutionScope,
        namespace: impl Into<String>,
        name: impl Into<String>,
        is_value_type: bool,
    ) -> Self {
        TypeReference::Named(NamedType {
            scope,
            namespace: namespace.into(),
            name: name.into(),
            is_value_type,
        })
    }

    /// A reference class type defined in module `module`.
    #[must_use]
    pub fn module_class(
        module: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        TypeReference::named(ResolutionScope::Module(module.into()), namespace, name, false)
    }

    /// A class in the external assembly `assembly`.
    #[must_use]
    pub fn external_class(
        assembly: AssemblyName,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        TypeReference::named(ResolutionScope::Assembly(assembly), namespace, name, false)
    }

    /// A type nested in `declaring`.
    #[must_use]
    pub fn nested(declaring: TypeReference, name: impl Into<String>, is_value_type: bool) -> Self {
        TypeReference::named(
            ResolutionScope::Nested(Box::new(declaring)),
            String::new(),
            name,
            is_value_type,
        )
    }

    /// `System.Void`
    #[must_use]
    pub fn void() -> Self {
        TypeReference::Primitive(PrimitiveType::Void)
    }

    /// `System.Int32`
    #[must_use]
    pub fn int32() -> Self {
        TypeReference::Primitive(PrimitiveType::I4)
    }

    /// `System.Object`
    #[must_use]
    pub fn object() -> Self {
        TypeReference::Primitive(PrimitiveType::Object)
    }

    /// `System.String`
    #[must_use]
    pub fn string() -> Self {
        TypeReference::Primitive(PrimitiveType::String)
    }

    /// `T[]`
    #[must_use]
    pub fn vector(self) -> Self {
        TypeReference::Vector(Box::new(self))
    }

    /// `T&`
    #[must_use]
    pub fn by_ref(self) -> Self {
        TypeReference::ByRef(Box::new(self))
    }

    /// `T*`
    #[must_use]
    pub fn pointer(self) -> Self {
        TypeReference::Pointer(Box::new(self))
    }

    /// `T<args>`
    #[must_use]
    pub fn instantiate(self, arguments: Vec<TypeReference>) -> Self {
        TypeReference::GenericInstance {
            element: Box::new(self),
            arguments,
        }
    }

    /// `true` for `System.Void`.
    #[must_use]
    pub fn is_void(&self) -> bool {
        matches!(self, TypeReference::Primitive(PrimitiveType::Void))
    }

    /// `true` for managed references.
    #[must_use]
    pub fn is_by_ref(&self) -> bool {
        matches!(self, TypeReference::ByRef(_))
    }

    /// `true` if a value of this type is boxed when stored as `object`.
    ///
    /// Generic parameters count as value types here: `box` on a reference-type instantiation is
    /// a no-op, so boxing them is always correct.
    #[must_use]
    pub fn needs_boxing(&self) -> bool {
        match self {
            TypeReference::Primitive(p) => p.is_value_type(),
            TypeReference::Named(named) => named.is_value_type,
            TypeReference::GenericParameter { .. } => true,
            TypeReference::GenericInstance { element, .. } => element.needs_boxing(),
            TypeReference::ModifierRequired { element, .. }
            | TypeReference::ModifierOptional { element, .. } => element.needs_boxing(),
            _ => false,
        }
    }

    /// The element of a constructed type.
    #[must_use]
    pub fn element_type(&self) -> Option<&TypeReference> {
        match self {
            TypeReference::Vector(element)
            | TypeReference::Pointer(element)
            | TypeReference::ByRef(element)
            | TypeReference::Pinned(element) => Some(element),
            TypeReference::Array { element, .. }
            | TypeReference::GenericInstance { element, .. }
            | TypeReference::ModifierRequired { element, .. }
            | TypeReference::ModifierOptional { element, .. } => Some(element),
            _ => None,
        }
    }

    /// `true` if this names `namespace.name`, either as a primitive or as a named type.
    #[must_use]
    pub fn is_named(&self, namespace: &str, name: &str) -> bool {
        match self {
            TypeReference::Primitive(p) => namespace == "System" && p.name() == name,
            TypeReference::Named(named) => named.namespace == namespace && named.name == name,
            _ => false,
        }
    }
}

impl fmt::Display for TypeReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeReference::Primitive(p) => write!(f, "System.{}", p.name()),
            TypeReference::Named(named) => match &named.scope {
                ResolutionScope::Nested(declaring) => write!(f, "{}/{}", declaring, named.name),
                ResolutionScope::Assembly(assembly) if named.namespace.is_empty() => {
                    write!(f, "[{}]{}", assembly.name, named.name)
                }
                ResolutionScope::Assembly(assembly) => {
                    write!(f, "[{}]{}.{}", assembly.name, named.namespace, named.name)
                }
                ResolutionScope::Module(_) if named.namespace.is_empty() => {
                    write!(f, "{}", named.name)
                }
                ResolutionScope::Module(_) => write!(f, "{}.{}", named.namespace, named.name),
            },
            TypeReference::GenericParameter {
                owner: GenericOwner::Type,
                position,
            } => write!(f, "!{position}"),
            TypeReference::GenericParameter {
                owner: GenericOwner::Method,
                position,
            } => write!(f, "!!{position}"),
            TypeReference::Vector(element) => write!(f, "{element}[]"),
            TypeReference::Array { element, rank } => {
                write!(f, "{element}[{}]", ",".repeat(rank.saturating_sub(1) as usize))
            }
            TypeReference::Pointer(element) => write!(f, "{element}*"),
            TypeReference::ByRef(element) => write!(f, "{element}&"),
            TypeReference::GenericInstance { element, arguments } => {
                write!(f, "{element}<")?;
                for (i, argument) in arguments.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{argument}")?;
                }
                write!(f, ">")
            }
            TypeReference::FunctionPointer(signature) => write!(f, "method {signature}"),
            TypeReference::Pinned(element) => write!(f, "{element} pinned"),
            TypeReference::ModifierRequired { modifier, element } => {
                write!(f, "{element} modreq({modifier})")
            }
            TypeReference::ModifierOptional { modifier, element } => {
                write!(f, "{element} modopt({modifier})")
            }
            TypeReference::Sentinel => write!(f, "..."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_constructed() {
        let list = TypeReference::external_class(
            AssemblyName::corlib(),
            "System.Collections.Generic",
            "List`1",
        )
        .instantiate(vec![TypeReference::int32()]);
        assert_eq!(
            list.clone().vector().to_string(),
            "[mscorlib]System.Collections.Generic.List`1<System.Int32>[]"
        );

        let nested = TypeReference::nested(TypeReference::module_class("m", "N", "Outer"), "In", false);
        assert_eq!(nested.by_ref().to_string(), "N.Outer/In&");
    }

    #[test]
    fn boxing_rules() {
        assert!(TypeReference::int32().needs_boxing());
        assert!(!TypeReference::string().needs_boxing());
        assert!(TypeReference::GenericParameter {
            owner: GenericOwner::Method,
            position: 0
        }
        .needs_boxing());
        assert!(!TypeReference::int32().vector().needs_boxing());
    }

    #[test]
    fn public_key_token_is_reversed_sha1_tail() {
        let mut name = AssemblyName::new("Signed");
        assert_eq!(name.public_key_token(), None);
        assert!(name.to_string().ends_with("PublicKeyToken=null"));

        name.public_key = Some(vec![0u8; 16]);
        let token = name.public_key_token().unwrap();
        let digest = Sha1::digest([0u8; 16]);
        assert_eq!(token[0], digest[19]);
        assert_eq!(token[7], digest[12]);
    }
}
