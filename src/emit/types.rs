//! Live types and members.
//!
//! These are the definitions an [`AssemblyBuilder`](crate::emit::AssemblyBuilder) fills in
//! and a [`LoadedAssembly`](crate::emit::LoadedAssembly) serves once sealed. Every reference
//! they hold is a live handle; nothing here names a type by string except the definitions'
//! own names.

use std::{fmt, sync::Arc};

use crate::{
    emit::{
        codewriter::LiveBody,
        handles::{FieldHandle, LiveSignature, MethodHandle, RuntimeMethod, RuntimeType, TypeHandle},
    },
    metadata::{
        customattributes::CustomAttributeArgument,
        definitions::{
            Constant, EventAttributes, FieldAttributes, GenericParamAttributes, MethodAttributes,
            MethodImplAttributes, ParamAttributes, PropertyAttributes, TypeAttributes,
        },
        members::{CONSTRUCTOR_NAME, TYPE_INITIALIZER_NAME},
        security::SecurityDeclaration,
    },
    runtime::{Domain, Value},
    Result,
};

/// Implementation of a method provided by the host instead of a live body.
///
/// Receives the domain, the method as called, `this` for instance methods and the
/// arguments. Native constructors are called with `this == None` and return the new object.
pub type NativeMethod = fn(&Domain, &RuntimeMethod, Option<Value>, Vec<Value>) -> Result<Option<Value>>;

/// An attribute argument with type names resolved to live types.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveArgument {
    /// A value that mentions no type
    Value(CustomAttributeArgument),
    /// A `System.Type` argument
    Type(Option<RuntimeType>),
    /// A `System.Type[]` argument
    TypeArray(Option<Vec<Option<RuntimeType>>>),
}

/// A named field or property assignment of an attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveNamedArgument {
    /// Field (`true`) or property (`false`)
    pub is_field: bool,
    /// Member name
    pub name: String,
    /// Assigned value
    pub value: LiveArgument,
}

/// A custom attribute attached to a live entity.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveAttribute {
    /// The attribute constructor
    pub constructor: RuntimeMethod,
    /// Constructor arguments
    pub fixed_args: Vec<LiveArgument>,
    /// Field and property assignments
    pub named_args: Vec<LiveNamedArgument>,
}

impl LiveAttribute {
    /// The attribute type.
    #[must_use]
    pub fn attribute_type(&self) -> &RuntimeType {
        &self.constructor.owner
    }
}

/// A live field.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveField {
    /// Name
    pub name: String,
    /// Flags
    pub attributes: FieldAttributes,
    /// Declared type
    pub field_type: RuntimeType,
    /// Literal or default value
    pub constant: Option<Constant>,
    /// Attached attributes
    pub custom_attributes: Vec<LiveAttribute>,
}

impl LiveField {
    /// `true` for static fields.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.attributes.contains(FieldAttributes::STATIC)
    }
}

/// A live parameter or return parameter.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LiveParameter {
    /// Name, empty for the return parameter
    pub name: String,
    /// Flags
    pub attributes: ParamAttributes,
    /// Default value
    pub constant: Option<Constant>,
    /// Attached attributes
    pub custom_attributes: Vec<LiveAttribute>,
}

/// A live generic parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveGenericParameter {
    /// Name
    pub name: String,
    /// Variance and special constraints
    pub attributes: GenericParamAttributes,
    /// The class constraint, if any
    pub base_constraint: Option<RuntimeType>,
    /// Interface constraints
    pub interface_constraints: Vec<RuntimeType>,
    /// Attached attributes
    pub custom_attributes: Vec<LiveAttribute>,
}

impl LiveGenericParameter {
    /// An unconstrained parameter.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        LiveGenericParameter {
            name: name.into(),
            attributes: GenericParamAttributes::empty(),
            base_constraint: None,
            interface_constraints: Vec::new(),
            custom_attributes: Vec::new(),
        }
    }
}

/// A live method or constructor.
#[derive(Clone)]
pub struct LiveMethod {
    /// Handle of this method
    pub handle: MethodHandle,
    /// Name
    pub name: String,
    /// Flags
    pub attributes: MethodAttributes,
    /// Implementation flags
    pub impl_attributes: MethodImplAttributes,
    /// Signature, `None` until the resolve pass declared it
    pub signature: Option<LiveSignature>,
    /// Generic parameters
    pub generic_parameters: Vec<LiveGenericParameter>,
    /// Parameters, excluding `this`
    pub parameters: Vec<LiveParameter>,
    /// The return parameter
    pub return_parameter: LiveParameter,
    /// Interface or base methods this one explicitly implements
    pub overrides: Vec<RuntimeMethod>,
    /// The body, for methods implemented in live code
    pub body: Option<LiveBody>,
    /// Host implementation, for built-in methods
    pub native: Option<NativeMethod>,
    /// Attached attributes
    pub custom_attributes: Vec<LiveAttribute>,
    /// Declarative security
    pub security: Vec<SecurityDeclaration>,
}

impl fmt::Debug for LiveMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveMethod")
            .field("handle", &self.handle)
            .field("name", &self.name)
            .field("attributes", &self.attributes)
            .field("signature", &self.signature)
            .field("native", &self.native.is_some())
            .field("body", &self.body.as_ref().map(|body| body.instructions.len()))
            .finish_non_exhaustive()
    }
}

impl LiveMethod {
    /// A method shell without signature, body or parameters.
    #[must_use]
    pub fn new(
        handle: MethodHandle,
        name: impl Into<String>,
        attributes: MethodAttributes,
        impl_attributes: MethodImplAttributes,
    ) -> Self {
        LiveMethod {
            handle,
            name: name.into(),
            attributes,
            impl_attributes,
            signature: None,
            generic_parameters: Vec::new(),
            parameters: Vec::new(),
            return_parameter: LiveParameter::default(),
            overrides: Vec::new(),
            body: None,
            native: None,
            custom_attributes: Vec::new(),
            security: Vec::new(),
        }
    }

    /// `true` for static methods.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.attributes.contains(MethodAttributes::STATIC)
    }

    /// `true` for virtual methods.
    #[must_use]
    pub fn is_virtual(&self) -> bool {
        self.attributes.contains(MethodAttributes::VIRTUAL)
    }

    /// `true` for abstract methods.
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.attributes.contains(MethodAttributes::ABSTRACT)
    }

    /// `true` for instance constructors.
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.name == CONSTRUCTOR_NAME
    }

    /// `true` for the type initializer.
    #[must_use]
    pub fn is_type_initializer(&self) -> bool {
        self.name == TYPE_INITIALIZER_NAME
    }

    /// The declared signature.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if the method was never completed.
    pub fn signature(&self) -> Result<&LiveSignature> {
        self.signature
            .as_ref()
            .ok_or_else(|| invalid_operation!("Method {} has no signature yet", self.name))
    }

    /// Number of arguments the body sees, `this` included.
    ///
    /// # Errors
    /// See [`LiveMethod::signature`].
    pub fn argument_count(&self) -> Result<usize> {
        let signature = self.signature()?;
        Ok(signature.parameters.len() + usize::from(signature.has_this))
    }
}

/// A live property.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveProperty {
    /// Name
    pub name: String,
    /// Flags
    pub attributes: PropertyAttributes,
    /// Property type
    pub property_type: RuntimeType,
    /// Index parameter types
    pub parameters: Vec<RuntimeType>,
    /// Getter
    pub getter: Option<MethodHandle>,
    /// Setter
    pub setter: Option<MethodHandle>,
    /// Other accessors
    pub others: Vec<MethodHandle>,
    /// Default value
    pub constant: Option<Constant>,
    /// Attached attributes
    pub custom_attributes: Vec<LiveAttribute>,
}

/// A live event.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveEvent {
    /// Name
    pub name: String,
    /// Flags
    pub attributes: EventAttributes,
    /// Delegate type
    pub event_type: RuntimeType,
    /// Add accessor
    pub add: Option<MethodHandle>,
    /// Remove accessor
    pub remove: Option<MethodHandle>,
    /// Raise accessor
    pub raise: Option<MethodHandle>,
    /// Other accessors
    pub others: Vec<MethodHandle>,
    /// Attached attributes
    pub custom_attributes: Vec<LiveAttribute>,
}

/// A live type definition.
#[derive(Debug, Clone)]
pub struct LiveType {
    /// Handle of this type
    pub handle: TypeHandle,
    /// Name of the module declaring it
    pub module: String,
    /// Namespace, empty for nested types
    pub namespace: String,
    /// Simple name
    pub name: String,
    /// Flags
    pub attributes: TypeAttributes,
    /// Enclosing type of a nested type
    pub declaring: Option<TypeHandle>,
    /// Base type
    pub base_type: Option<RuntimeType>,
    /// Implemented interfaces
    pub interfaces: Vec<RuntimeType>,
    /// Generic parameters
    pub generic_parameters: Vec<LiveGenericParameter>,
    /// Fields
    pub fields: Vec<LiveField>,
    /// Methods and constructors, shared with running frames
    pub methods: Vec<Arc<LiveMethod>>,
    /// Properties
    pub properties: Vec<LiveProperty>,
    /// Events
    pub events: Vec<LiveEvent>,
    /// Nested types
    pub nested_types: Vec<TypeHandle>,
    /// Attached attributes
    pub custom_attributes: Vec<LiveAttribute>,
    /// Declarative security
    pub security: Vec<SecurityDeclaration>,
    /// Field alignment
    pub packing_size: Option<u16>,
    /// Explicit instance size
    pub class_size: Option<u32>,
}

impl LiveType {
    /// A type shell without members.
    #[must_use]
    pub fn new(
        handle: TypeHandle,
        module: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
        attributes: TypeAttributes,
    ) -> Self {
        LiveType {
            handle,
            module: module.into(),
            namespace: namespace.into(),
            name: name.into(),
            attributes,
            declaring: None,
            base_type: None,
            interfaces: Vec::new(),
            generic_parameters: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            properties: Vec::new(),
            events: Vec::new(),
            nested_types: Vec::new(),
            custom_attributes: Vec::new(),
            security: Vec::new(),
            packing_size: None,
            class_size: None,
        }
    }

    /// `Namespace.Name`, or just `Name` for nested types and the global namespace.
    #[must_use]
    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }

    /// `true` for interfaces.
    #[must_use]
    pub fn is_interface(&self) -> bool {
        self.attributes.contains(TypeAttributes::INTERFACE)
    }

    /// The method at `index`.
    #[must_use]
    pub fn method(&self, index: u32) -> Option<&Arc<LiveMethod>> {
        self.methods.get(index as usize)
    }

    /// The field at `index`.
    #[must_use]
    pub fn field(&self, index: u32) -> Option<&LiveField> {
        self.fields.get(index as usize)
    }

    /// The single method called `name`.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnresolvedSymbol`] if there is none or several.
    pub fn method_by_name(&self, name: &str) -> Result<&Arc<LiveMethod>> {
        let mut found = self.methods.iter().filter(|method| method.name == name);
        match (found.next(), found.next()) {
            (Some(method), None) => Ok(method),
            (None, _) => Err(unresolved!("{} has no method {}", self.full_name(), name)),
            (Some(_), Some(_)) => Err(unresolved!("{}::{} is overloaded", self.full_name(), name)),
        }
    }

    /// The field called `name`.
    #[must_use]
    pub fn field_by_name(&self, name: &str) -> Option<FieldHandle> {
        self.fields
            .iter()
            .position(|field| field.name == name)
            .map(|index| FieldHandle {
                declaring: self.handle,
                index: index as u32,
            })
    }
}

/// One field candidate offered to member resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldEntry {
    /// The field
    pub handle: FieldHandle,
    /// Its declared type
    pub field_type: RuntimeType,
    /// Static field
    pub is_static: bool,
}

/// One method candidate offered to member resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodEntry {
    /// The method
    pub handle: MethodHandle,
    /// Its declared signature
    pub signature: LiveSignature,
}

/// Member lookup shared by in-progress and sealed types.
///
/// The resolver only ever looks at members through this trait, so it never has to know
/// whether the type it searches is still being built.
pub trait TypeMembers {
    /// The type searched.
    fn type_handle(&self) -> TypeHandle;

    /// Number of generic parameters.
    fn generic_arity(&self) -> usize;

    /// Fields called `name`.
    fn find_fields(&self, name: &str) -> Vec<FieldEntry>;

    /// Methods called `name` whose signature is known.
    fn find_methods(&self, name: &str) -> Vec<MethodEntry>;
}

impl TypeMembers for LiveType {
    fn type_handle(&self) -> TypeHandle {
        self.handle
    }

    fn generic_arity(&self) -> usize {
        self.generic_parameters.len()
    }

    fn find_fields(&self, name: &str) -> Vec<FieldEntry> {
        self.fields
            .iter()
            .enumerate()
            .filter(|(_, field)| field.name == name)
            .map(|(index, field)| FieldEntry {
                handle: FieldHandle {
                    declaring: self.handle,
                    index: index as u32,
                },
                field_type: field.field_type.clone(),
                is_static: field.is_static(),
            })
            .collect()
    }

    fn find_methods(&self, name: &str) -> Vec<MethodEntry> {
        self.methods
            .iter()
            .filter(|method| method.name == name)
            .filter_map(|method| {
                Some(MethodEntry {
                    handle: method.handle,
                    signature: method.signature.clone()?,
                })
            })
            .collect()
    }
}
