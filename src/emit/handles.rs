//! Live handles.
//!
//! A live entity is addressed by plain indices: a [`TypeHandle`] is the position of a type in
//! its assembly, a [`MethodHandle`] or [`FieldHandle`] the position of a member in its
//! declaring type. Handles stay valid from the moment a shell is declared, through sealing,
//! for the lifetime of the owning [`crate::Domain`].

use std::fmt;

use crate::{metadata::signatures::CallingConvention, Error, Result};

/// Identifies a registered or in-progress assembly inside a [`crate::Domain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssemblyId(pub u32);

impl fmt::Display for AssemblyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A type definition, declared or sealed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeHandle {
    /// Owning assembly
    pub assembly: AssemblyId,
    /// Position in the assembly's type list
    pub index: u32,
}

impl TypeHandle {
    /// Create a handle.
    #[must_use]
    pub const fn new(assembly: AssemblyId, index: u32) -> Self {
        TypeHandle { assembly, index }
    }
}

/// A method or constructor definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodHandle {
    /// Declaring type
    pub declaring: TypeHandle,
    /// Position in the declaring type's method list
    pub index: u32,
}

/// A field definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldHandle {
    /// Declaring type
    pub declaring: TypeHandle,
    /// Position in the declaring type's field list
    pub index: u32,
}

/// A live type: a definition, a generic parameter, or a shape built over other types.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RuntimeType {
    /// A type definition used without instantiation
    Type(TypeHandle),
    /// `!n` of a generic type definition
    GenericParameter {
        /// The generic type definition
        owner: TypeHandle,
        /// Zero-based position
        position: u16,
    },
    /// `!!n` of a generic method definition
    MethodGenericParameter {
        /// The generic method definition
        owner: MethodHandle,
        /// Zero-based position
        position: u16,
    },
    /// Single-dimension zero-based array
    Vector(Box<RuntimeType>),
    /// Multi-dimensional array
    Array(Box<RuntimeType>, u32),
    /// Unmanaged pointer
    Pointer(Box<RuntimeType>),
    /// Managed reference
    ByRef(Box<RuntimeType>),
    /// A generic type definition closed over arguments
    GenericInstance(TypeHandle, Vec<RuntimeType>),
}

impl RuntimeType {
    /// `T[]` for `rank == 0`, otherwise the multi-dimensional array of that rank.
    #[must_use]
    pub fn make_array(self, rank: u32) -> RuntimeType {
        if rank == 0 {
            RuntimeType::Vector(Box::new(self))
        } else {
            RuntimeType::Array(Box::new(self), rank)
        }
    }

    /// `T*`
    #[must_use]
    pub fn make_pointer(self) -> RuntimeType {
        RuntimeType::Pointer(Box::new(self))
    }

    /// `T&`
    #[must_use]
    pub fn make_by_ref(self) -> RuntimeType {
        RuntimeType::ByRef(Box::new(self))
    }

    /// Close a generic type definition over `arguments`.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnsupportedConstruction`] if `self` is not a plain definition.
    pub fn make_generic_instance(self, arguments: Vec<RuntimeType>) -> Result<RuntimeType> {
        match self {
            RuntimeType::Type(definition) => Ok(RuntimeType::GenericInstance(definition, arguments)),
            other => Err(Error::UnsupportedConstruction(format!(
                "Cannot instantiate {other:?}"
            ))),
        }
    }

    /// Replace generic parameters by the arguments of the current context.
    ///
    /// Parameters without a matching argument are kept, so substitution over a partially
    /// known context is harmless.
    #[must_use]
    pub fn substitute(&self, type_arguments: &[RuntimeType], method_arguments: &[RuntimeType]) -> RuntimeType {
        if type_arguments.is_empty() && method_arguments.is_empty() {
            return self.clone();
        }
        match self {
            RuntimeType::GenericParameter { position, .. } => type_arguments
                .get(usize::from(*position))
                .cloned()
                .unwrap_or_else(|| self.clone()),
            RuntimeType::MethodGenericParameter { position, .. } => method_arguments
                .get(usize::from(*position))
                .cloned()
                .unwrap_or_else(|| self.clone()),
            RuntimeType::Type(_) => self.clone(),
            RuntimeType::Vector(element) => {
                RuntimeType::Vector(Box::new(element.substitute(type_arguments, method_arguments)))
            }
            RuntimeType::Array(element, rank) => RuntimeType::Array(
                Box::new(element.substitute(type_arguments, method_arguments)),
                *rank,
            ),
            RuntimeType::Pointer(element) => {
                RuntimeType::Pointer(Box::new(element.substitute(type_arguments, method_arguments)))
            }
            RuntimeType::ByRef(element) => {
                RuntimeType::ByRef(Box::new(element.substitute(type_arguments, method_arguments)))
            }
            RuntimeType::GenericInstance(definition, arguments) => RuntimeType::GenericInstance(
                *definition,
                arguments
                    .iter()
                    .map(|argument| argument.substitute(type_arguments, method_arguments))
                    .collect(),
            ),
        }
    }

    /// The underlying definition of a plain or instantiated type.
    #[must_use]
    pub fn definition(&self) -> Option<TypeHandle> {
        match self {
            RuntimeType::Type(handle) | RuntimeType::GenericInstance(handle, _) => Some(*handle),
            _ => None,
        }
    }

    /// Arguments of a generic instance, empty otherwise.
    #[must_use]
    pub fn type_arguments(&self) -> &[RuntimeType] {
        match self {
            RuntimeType::GenericInstance(_, arguments) => arguments,
            _ => &[],
        }
    }

    /// Element of an array, pointer or reference.
    #[must_use]
    pub fn element(&self) -> Option<&RuntimeType> {
        match self {
            RuntimeType::Vector(element)
            | RuntimeType::Array(element, _)
            | RuntimeType::Pointer(element)
            | RuntimeType::ByRef(element) => Some(element),
            _ => None,
        }
    }

    /// `true` for `T&`.
    #[must_use]
    pub fn is_by_ref(&self) -> bool {
        matches!(self, RuntimeType::ByRef(_))
    }

    /// `true` if the type mentions an unsubstituted generic parameter.
    #[must_use]
    pub fn is_open(&self) -> bool {
        match self {
            RuntimeType::GenericParameter { .. } | RuntimeType::MethodGenericParameter { .. } => true,
            RuntimeType::Type(_) => false,
            RuntimeType::Vector(element)
            | RuntimeType::Array(element, _)
            | RuntimeType::Pointer(element)
            | RuntimeType::ByRef(element) => element.is_open(),
            RuntimeType::GenericInstance(_, arguments) => arguments.iter().any(RuntimeType::is_open),
        }
    }

    /// Structural equality that compares generic parameters by kind and position only.
    ///
    /// Used to match overriding methods against the methods they override, whose signatures
    /// mention parameters of different owners.
    #[must_use]
    pub fn same_shape(&self, other: &RuntimeType) -> bool {
        match (self, other) {
            (
                RuntimeType::GenericParameter { position: a, .. },
                RuntimeType::GenericParameter { position: b, .. },
            )
            | (
                RuntimeType::MethodGenericParameter { position: a, .. },
                RuntimeType::MethodGenericParameter { position: b, .. },
            ) => a == b,
            (RuntimeType::Vector(a), RuntimeType::Vector(b))
            | (RuntimeType::Pointer(a), RuntimeType::Pointer(b))
            | (RuntimeType::ByRef(a), RuntimeType::ByRef(b)) => a.same_shape(b),
            (RuntimeType::Array(a, rank_a), RuntimeType::Array(b, rank_b)) => {
                rank_a == rank_b && a.same_shape(b)
            }
            (RuntimeType::GenericInstance(a, args_a), RuntimeType::GenericInstance(b, args_b)) => {
                a == b
                    && args_a.len() == args_b.len()
                    && args_a.iter().zip(args_b).all(|(a, b)| a.same_shape(b))
            }
            _ => self == other,
        }
    }
}

/// A method as seen from a call site: the definition plus the instantiation it is called on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuntimeMethod {
    /// The definition
    pub handle: MethodHandle,
    /// The declaring type, instantiated if generic
    pub owner: RuntimeType,
    /// Method generic arguments, empty for non-generic methods
    pub instantiation: Vec<RuntimeType>,
}

impl RuntimeMethod {
    /// A method of a non-generic type, without instantiation.
    #[must_use]
    pub fn plain(handle: MethodHandle) -> Self {
        RuntimeMethod {
            handle,
            owner: RuntimeType::Type(handle.declaring),
            instantiation: Vec::new(),
        }
    }

    /// Substitute the call-site context into the owner and instantiation.
    #[must_use]
    pub fn substitute(&self, type_arguments: &[RuntimeType], method_arguments: &[RuntimeType]) -> Self {
        RuntimeMethod {
            handle: self.handle,
            owner: self.owner.substitute(type_arguments, method_arguments),
            instantiation: self
                .instantiation
                .iter()
                .map(|argument| argument.substitute(type_arguments, method_arguments))
                .collect(),
        }
    }
}

/// A field as seen from an access site.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuntimeField {
    /// The definition
    pub handle: FieldHandle,
    /// The declaring type, instantiated if generic
    pub owner: RuntimeType,
}

impl RuntimeField {
    /// A field of a non-generic type.
    #[must_use]
    pub fn plain(handle: FieldHandle) -> Self {
        RuntimeField {
            handle,
            owner: RuntimeType::Type(handle.declaring),
        }
    }
}

/// A resolved method signature, also used for `calli` call sites.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LiveSignature {
    /// Instance method
    pub has_this: bool,
    /// Calling convention
    pub convention: CallingConvention,
    /// Number of method generic parameters
    pub generic_arity: u32,
    /// Return type
    pub return_type: RuntimeType,
    /// Parameter types, excluding `this`
    pub parameters: Vec<RuntimeType>,
}

impl LiveSignature {
    /// Compare parameter and return shapes, see [`RuntimeType::same_shape`].
    #[must_use]
    pub fn same_shape(&self, other: &LiveSignature) -> bool {
        self.has_this == other.has_this
            && self.generic_arity == other.generic_arity
            && self.parameters.len() == other.parameters.len()
            && self.return_type.same_shape(&other.return_type)
            && self
                .parameters
                .iter()
                .zip(&other.parameters)
                .all(|(a, b)| a.same_shape(b))
    }

    /// The signature as seen through a generic context.
    #[must_use]
    pub fn substitute(&self, type_arguments: &[RuntimeType], method_arguments: &[RuntimeType]) -> Self {
        LiveSignature {
            has_this: self.has_this,
            convention: self.convention,
            generic_arity: self.generic_arity,
            return_type: self.return_type.substitute(type_arguments, method_arguments),
            parameters: self
                .parameters
                .iter()
                .map(|parameter| parameter.substitute(type_arguments, method_arguments))
                .collect(),
        }
    }
}

/// The operand of `ldtoken`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LiveToken {
    /// A type handle
    Type(RuntimeType),
    /// A field handle
    Field(RuntimeField),
    /// A method handle
    Method(RuntimeMethod),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(index: u32) -> TypeHandle {
        TypeHandle::new(AssemblyId(3), index)
    }

    #[test]
    fn shapes() {
        let int = RuntimeType::Type(handle(0));
        assert_eq!(int.clone().make_array(0), RuntimeType::Vector(Box::new(int.clone())));
        assert_eq!(
            int.clone().make_array(2),
            RuntimeType::Array(Box::new(int.clone()), 2)
        );
        assert!(int.clone().make_by_ref().is_by_ref());
        assert!(int
            .clone()
            .make_pointer()
            .make_generic_instance(vec![])
            .is_err());
    }

    #[test]
    fn substitution_reaches_nested_positions() {
        let list = handle(1);
        let method = MethodHandle {
            declaring: list,
            index: 0,
        };
        let open = RuntimeType::GenericInstance(
            list,
            vec![
                RuntimeType::GenericParameter {
                    owner: list,
                    position: 0,
                },
                RuntimeType::MethodGenericParameter {
                    owner: method,
                    position: 0,
                }
                .make_array(0),
            ],
        );
        assert!(open.is_open());

        let int = RuntimeType::Type(handle(0));
        let string = RuntimeType::Type(handle(2));
        let closed = open.substitute(&[int.clone()], &[string.clone()]);
        assert_eq!(
            closed,
            RuntimeType::GenericInstance(list, vec![int, string.make_array(0)])
        );
        assert!(!closed.is_open());
    }

    #[test]
    fn shape_comparison_ignores_parameter_owners() {
        let a = RuntimeType::GenericParameter {
            owner: handle(1),
            position: 0,
        };
        let b = RuntimeType::GenericParameter {
            owner: handle(2),
            position: 0,
        };
        assert_ne!(a, b);
        assert!(a.clone().make_by_ref().same_shape(&b.make_by_ref()));
        assert!(!a.same_shape(&RuntimeType::Type(handle(1))));
    }
}
