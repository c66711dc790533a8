//! Symbolic member references: fields, methods and the ambiguous `ldtoken` operand.

use std::fmt;

use crate::metadata::{signatures::MethodSignature, typesystem::TypeReference};

/// Name of instance constructors.
pub const CONSTRUCTOR_NAME: &str = ".ctor";
/// Name of type initializers.
pub const TYPE_INITIALIZER_NAME: &str = ".cctor";

/// A field by declaring type, name and type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldReference {
    /// Declaring type, possibly a generic instance
    pub declaring: TypeReference,
    /// Field name
    pub name: String,
    /// Field type, in the open form of the declaring type
    pub field_type: TypeReference,
}

impl FieldReference {
    /// Create a field reference.
    #[must_use]
    pub fn new(declaring: TypeReference, name: impl Into<String>, field_type: TypeReference) -> Self {
        FieldReference {
            declaring,
            name: name.into(),
            field_type,
        }
    }
}

impl fmt::Display for FieldReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}::{}", self.field_type, self.declaring, self.name)
    }
}

/// A method by declaring type, name and signature, optionally instantiated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodReference {
    /// Declaring type, possibly a generic instance
    pub declaring: TypeReference,
    /// Method name
    pub name: String,
    /// Signature in the open form of the declaring type and method
    pub signature: MethodSignature,
    /// Method type arguments; empty unless this is a generic method instantiation
    pub generic_arguments: Vec<TypeReference>,
}

impl MethodReference {
    /// Create a non-generic method reference.
    #[must_use]
    pub fn new(declaring: TypeReference, name: impl Into<String>, signature: MethodSignature) -> Self {
        MethodReference {
            declaring,
            name: name.into(),
            signature,
            generic_arguments: Vec::new(),
        }
    }

    /// Instantiate a generic method.
    #[must_use]
    pub fn instantiate(mut self, arguments: Vec<TypeReference>) -> Self {
        self.generic_arguments = arguments;
        self
    }

    /// `true` for `.ctor` and `.cctor`.
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.name == CONSTRUCTOR_NAME || self.name == TYPE_INITIALIZER_NAME
    }
}

impl fmt::Display for MethodReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let signature = &self.signature;
        if signature.has_this {
            write!(f, "instance ")?;
        }
        write!(f, "{} {}::{}", signature.return_type, self.declaring, self.name)?;
        if !self.generic_arguments.is_empty() {
            write!(f, "<")?;
            for (i, argument) in self.generic_arguments.iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                write!(f, "{argument}")?;
            }
            write!(f, ">")?;
        }
        write!(f, "(")?;
        for (i, parameter) in signature.parameters.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{parameter}")?;
        }
        write!(f, ")")
    }
}

/// The operand of `ldtoken`: a type, field or method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MemberReference {
    /// A type token
    Type(TypeReference),
    /// A field token
    Field(FieldReference),
    /// A method token
    Method(MethodReference),
}

impl fmt::Display for MemberReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberReference::Type(ty) => write!(f, "{ty}"),
            MemberReference::Field(field) => write!(f, "field {field}"),
            MemberReference::Method(method) => write!(f, "method {method}"),
        }
    }
}
