//! Static type system: element codes, primitives and symbolic type references.

mod base;
mod reference;

pub use base::{PrimitiveType, ELEMENT_TYPE};
pub use reference::{
    AssemblyName, AssemblyVersion, GenericOwner, NamedType, ResolutionScope, TypeReference,
};
