//! Attribute flags of definitions (ECMA-335 II.23.1).
//!
//! Visibility and member access are 3-bit enumerations packed into the flag words; use the
//! `*_MASK` constants with the `access`/`visibility` helpers instead of `contains`.

use bitflags::bitflags;

bitflags! {
    /// Type definition flags (II.23.1.15)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TypeAttributes: u32 {
        /// Visibility bits
        const VISIBILITY_MASK = 0x0000_0007;
        /// Visible outside the assembly
        const PUBLIC = 0x0000_0001;
        /// Nested, public
        const NESTED_PUBLIC = 0x0000_0002;
        /// Nested, private
        const NESTED_PRIVATE = 0x0000_0003;
        /// Nested, family
        const NESTED_FAMILY = 0x0000_0004;
        /// Nested, assembly
        const NESTED_ASSEMBLY = 0x0000_0005;
        /// Nested, family and assembly
        const NESTED_FAM_AND_ASSEM = 0x0000_0006;
        /// Nested, family or assembly
        const NESTED_FAM_OR_ASSEM = 0x0000_0007;
        /// Layout bits
        const LAYOUT_MASK = 0x0000_0018;
        /// Fields laid out sequentially
        const SEQUENTIAL_LAYOUT = 0x0000_0008;
        /// Field offsets given explicitly
        const EXPLICIT_LAYOUT = 0x0000_0010;
        /// Interface
        const INTERFACE = 0x0000_0020;
        /// Abstract
        const ABSTRACT = 0x0000_0080;
        /// Cannot be derived from
        const SEALED = 0x0000_0100;
        /// Name is special
        const SPECIAL_NAME = 0x0000_0400;
        /// Runtime checks the name
        const RT_SPECIAL_NAME = 0x0000_0800;
        /// Imported
        const IMPORT = 0x0000_1000;
        /// Serializable
        const SERIALIZABLE = 0x0000_2000;
        /// Has declarative security
        const HAS_SECURITY = 0x0004_0000;
        /// Type initializer may run lazily
        const BEFORE_FIELD_INIT = 0x0010_0000;
    }
}

impl TypeAttributes {
    /// The visibility bits.
    #[must_use]
    pub fn visibility(self) -> u32 {
        self.bits() & Self::VISIBILITY_MASK.bits()
    }

    /// `true` if the visibility denotes a nested type.
    #[must_use]
    pub fn is_nested(self) -> bool {
        self.visibility() >= Self::NESTED_PUBLIC.bits()
    }
}

bitflags! {
    /// Field definition flags (II.23.1.5)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FieldAttributes: u16 {
        /// Access bits
        const ACCESS_MASK = 0x0007;
        /// Only the declaring type
        const PRIVATE = 0x0001;
        /// Family and assembly
        const FAM_AND_ASSEM = 0x0002;
        /// Assembly
        const ASSEMBLY = 0x0003;
        /// Family
        const FAMILY = 0x0004;
        /// Family or assembly
        const FAM_OR_ASSEM = 0x0005;
        /// Public
        const PUBLIC = 0x0006;
        /// Per type rather than per instance
        const STATIC = 0x0010;
        /// Assignable only in constructors
        const INIT_ONLY = 0x0020;
        /// Compile-time constant
        const LITERAL = 0x0040;
        /// Not serialized
        const NOT_SERIALIZED = 0x0080;
        /// Name is special
        const SPECIAL_NAME = 0x0200;
        /// Runtime checks the name
        const RT_SPECIAL_NAME = 0x0400;
        /// Has a default value
        const HAS_DEFAULT = 0x8000;
    }
}

impl FieldAttributes {
    /// The access bits.
    #[must_use]
    pub fn access(self) -> u16 {
        self.bits() & Self::ACCESS_MASK.bits()
    }
}

bitflags! {
    /// Method definition flags (II.23.1.10)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MethodAttributes: u16 {
        /// Access bits
        const ACCESS_MASK = 0x0007;
        /// Only the declaring type
        const PRIVATE = 0x0001;
        /// Family and assembly
        const FAM_AND_ASSEM = 0x0002;
        /// Assembly
        const ASSEMBLY = 0x0003;
        /// Family
        const FAMILY = 0x0004;
        /// Family or assembly
        const FAM_OR_ASSEM = 0x0005;
        /// Public
        const PUBLIC = 0x0006;
        /// Per type rather than per instance
        const STATIC = 0x0010;
        /// Cannot be overridden
        const FINAL = 0x0020;
        /// Virtual
        const VIRTUAL = 0x0040;
        /// Hidden by name and signature
        const HIDE_BY_SIG = 0x0080;
        /// Takes a new vtable slot
        const NEW_SLOT = 0x0100;
        /// Overridable only if accessible
        const STRICT = 0x0200;
        /// No implementation
        const ABSTRACT = 0x0400;
        /// Name is special
        const SPECIAL_NAME = 0x0800;
        /// Runtime checks the name
        const RT_SPECIAL_NAME = 0x1000;
        /// Platform invoke
        const PINVOKE_IMPL = 0x2000;
        /// Has declarative security
        const HAS_SECURITY = 0x4000;
        /// Calls a method with security demands
        const REQUIRE_SEC_OBJECT = 0x8000;
    }
}

impl MethodAttributes {
    /// The access bits.
    #[must_use]
    pub fn access(self) -> u16 {
        self.bits() & Self::ACCESS_MASK.bits()
    }

    /// Replace the access bits.
    #[must_use]
    pub fn with_access(self, access: MethodAttributes) -> Self {
        (self - Self::ACCESS_MASK) | (access & Self::ACCESS_MASK)
    }
}

bitflags! {
    /// Method implementation flags (II.23.1.11)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MethodImplAttributes: u16 {
        /// Code type bits
        const CODE_TYPE_MASK = 0x0003;
        /// Native code
        const NATIVE = 0x0001;
        /// Optimized IL
        const OPTIL = 0x0002;
        /// Provided by the runtime
        const RUNTIME = 0x0003;
        /// Unmanaged code
        const UNMANAGED = 0x0004;
        /// Must not be inlined
        const NO_INLINING = 0x0008;
        /// Defined elsewhere
        const FORWARD_REF = 0x0010;
        /// Single-threaded through the body
        const SYNCHRONIZED = 0x0020;
        /// Must not be optimized
        const NO_OPTIMIZATION = 0x0040;
        /// Signature exported as declared
        const PRESERVE_SIG = 0x0080;
        /// Should be inlined
        const AGGRESSIVE_INLINING = 0x0100;
        /// Implemented inside the runtime
        const INTERNAL_CALL = 0x1000;
    }
}

bitflags! {
    /// Parameter flags (II.23.1.13)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ParamAttributes: u16 {
        /// Input
        const IN = 0x0001;
        /// Output
        const OUT = 0x0002;
        /// Optional
        const OPTIONAL = 0x0010;
        /// Has a default value
        const HAS_DEFAULT = 0x1000;
        /// Has marshalling information
        const HAS_FIELD_MARSHAL = 0x2000;
    }
}

bitflags! {
    /// Generic parameter flags (II.23.1.7)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct GenericParamAttributes: u16 {
        /// Covariant
        const COVARIANT = 0x0001;
        /// Contravariant
        const CONTRAVARIANT = 0x0002;
        /// `class` constraint
        const REFERENCE_TYPE_CONSTRAINT = 0x0004;
        /// `struct` constraint
        const NOT_NULLABLE_VALUE_TYPE_CONSTRAINT = 0x0008;
        /// `new()` constraint
        const DEFAULT_CONSTRUCTOR_CONSTRAINT = 0x0010;
    }
}

bitflags! {
    /// Property flags (II.23.1.14)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PropertyAttributes: u16 {
        /// Name is special
        const SPECIAL_NAME = 0x0200;
        /// Runtime checks the name
        const RT_SPECIAL_NAME = 0x0400;
        /// Has a default value
        const HAS_DEFAULT = 0x1000;
    }
}

bitflags! {
    /// Event flags (II.23.1.4)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EventAttributes: u16 {
        /// Name is special
        const SPECIAL_NAME = 0x0200;
        /// Runtime checks the name
        const RT_SPECIAL_NAME = 0x0400;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_is_an_enumeration() {
        let public_virtual = MethodAttributes::PUBLIC | MethodAttributes::VIRTUAL;
        assert_eq!(public_virtual.access(), MethodAttributes::PUBLIC.bits());

        let private = public_virtual.with_access(MethodAttributes::PRIVATE);
        assert_eq!(private.access(), MethodAttributes::PRIVATE.bits());
        assert!(private.contains(MethodAttributes::VIRTUAL));

        assert!(TypeAttributes::NESTED_PRIVATE.is_nested());
        assert!(!TypeAttributes::PUBLIC.is_nested());
    }
}
