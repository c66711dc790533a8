use std::fmt;

use crate::metadata::typesystem::TypeReference;

/// Leading-byte flags of method, field, property and locals signatures (ECMA-335 II.23.2).
#[allow(non_snake_case, missing_docs)]
pub mod SIGNATURE {
    pub const DEFAULT: u8 = 0x00;
    pub const C: u8 = 0x01;
    pub const STDCALL: u8 = 0x02;
    pub const THISCALL: u8 = 0x03;
    pub const FASTCALL: u8 = 0x04;
    pub const VARARG: u8 = 0x05;
    pub const FIELD: u8 = 0x06;
    pub const LOCAL_SIG: u8 = 0x07;
    pub const PROPERTY: u8 = 0x08;
    pub const GENERIC_INST: u8 = 0x0A;
    pub const GENERIC: u8 = 0x10;
    pub const HAS_THIS: u8 = 0x20;
    pub const EXPLICIT_THIS: u8 = 0x40;
    pub const KIND_MASK: u8 = 0x0F;
}

/// Calling convention of a method signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CallingConvention {
    /// Managed default convention
    #[default]
    Default,
    /// Unmanaged cdecl
    C,
    /// Unmanaged stdcall
    StdCall,
    /// Unmanaged thiscall
    ThisCall,
    /// Unmanaged fastcall
    FastCall,
    /// Managed variable-argument convention
    VarArg,
}

impl CallingConvention {
    /// The low nibble of the signature lead byte.
    #[must_use]
    pub fn bits(self) -> u8 {
        match self {
            CallingConvention::Default => SIGNATURE::DEFAULT,
            CallingConvention::C => SIGNATURE::C,
            CallingConvention::StdCall => SIGNATURE::STDCALL,
            CallingConvention::ThisCall => SIGNATURE::THISCALL,
            CallingConvention::FastCall => SIGNATURE::FASTCALL,
            CallingConvention::VarArg => SIGNATURE::VARARG,
        }
    }

    /// Decode the low nibble of a signature lead byte.
    #[must_use]
    pub fn from_bits(bits: u8) -> Option<Self> {
        Some(match bits & SIGNATURE::KIND_MASK {
            SIGNATURE::DEFAULT => CallingConvention::Default,
            SIGNATURE::C => CallingConvention::C,
            SIGNATURE::STDCALL => CallingConvention::StdCall,
            SIGNATURE::THISCALL => CallingConvention::ThisCall,
            SIGNATURE::FASTCALL => CallingConvention::FastCall,
            SIGNATURE::VARARG => CallingConvention::VarArg,
            _ => return None,
        })
    }

    /// `true` for the conventions a managed call site can target.
    #[must_use]
    pub fn is_managed(self) -> bool {
        matches!(self, CallingConvention::Default)
    }
}

/// A method signature: the shape shared by method references, definitions, call-site
/// signatures (`calli`) and function pointers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodSignature {
    /// Instance method
    pub has_this: bool,
    /// `this` is listed explicitly among the parameters
    pub explicit_this: bool,
    /// Calling convention
    pub convention: CallingConvention,
    /// Number of method generic parameters
    pub generic_arity: u32,
    /// Return type
    pub return_type: TypeReference,
    /// Parameter types, in order; vararg signatures may contain a [`TypeReference::Sentinel`]
    pub parameters: Vec<TypeReference>,
}

impl MethodSignature {
    /// A static signature with the default convention.
    #[must_use]
    pub fn new_static(return_type: TypeReference, parameters: Vec<TypeReference>) -> Self {
        MethodSignature {
            has_this: false,
            explicit_this: false,
            convention: CallingConvention::Default,
            generic_arity: 0,
            return_type,
            parameters,
        }
    }

    /// An instance signature with the default convention.
    #[must_use]
    pub fn new_instance(return_type: TypeReference, parameters: Vec<TypeReference>) -> Self {
        MethodSignature {
            has_this: true,
            ..MethodSignature::new_static(return_type, parameters)
        }
    }

    /// Set the method generic arity.
    #[must_use]
    pub fn with_generic_arity(mut self, arity: u32) -> Self {
        self.generic_arity = arity;
        self
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_this {
            write!(f, "instance ")?;
        }
        write!(f, "{}(", self.return_type)?;
        for (i, parameter) in self.parameters.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{parameter}")?;
        }
        write!(f, ")")
    }
}
