use crate::metadata::{
    customattributes::CustomAttribute,
    definitions::{
        EventDefinition, FieldDefinition, GenericParameterDefinition, MethodDefinition,
        PropertyDefinition, TypeAttributes,
    },
    security::SecurityDeclaration,
    typesystem::{GenericOwner, ResolutionScope, TypeReference},
};

/// A type definition, owning its members and nested types.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDefinition {
    /// Namespace, empty for nested types
    pub namespace: String,
    /// Simple name, including the generic arity suffix
    pub name: String,
    /// Flags
    pub attributes: TypeAttributes,
    /// Base type, `None` for interfaces and `System.Object`
    pub base_type: Option<TypeReference>,
    /// Implemented interfaces
    pub interfaces: Vec<TypeReference>,
    /// Type generic parameters
    pub generic_parameters: Vec<GenericParameterDefinition>,
    /// Fields
    pub fields: Vec<FieldDefinition>,
    /// Methods, constructors included
    pub methods: Vec<MethodDefinition>,
    /// Properties
    pub properties: Vec<PropertyDefinition>,
    /// Events
    pub events: Vec<EventDefinition>,
    /// Nested types
    pub nested_types: Vec<TypeDefinition>,
    /// Attached custom attributes
    pub custom_attributes: Vec<CustomAttribute>,
    /// Declarative security
    pub security: Vec<SecurityDeclaration>,
    /// Explicit field packing
    pub packing_size: Option<u16>,
    /// Explicit instance size
    pub class_size: Option<u32>,
}

impl TypeDefinition {
    /// An empty type.
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, attributes: TypeAttributes) -> Self {
        TypeDefinition {
            namespace: namespace.into(),
            name: name.into(),
            attributes,
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

    /// Set the base type.
    #[must_use]
    pub fn extends(mut self, base_type: TypeReference) -> Self {
        self.base_type = Some(base_type);
        self
    }

    /// `Namespace.Name`, or `Name` without a namespace.
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

    /// `true` if the type derives from `System.ValueType` or `System.Enum`.
    #[must_use]
    pub fn is_value_type(&self) -> bool {
        let Some(base) = &self.base_type else {
            return false;
        };
        let derives = base.is_named("System", "ValueType") || base.is_named("System", "Enum");
        derives && !(self.namespace == "System" && self.name == "Enum")
    }

    /// `true` if the type derives from `System.Enum`.
    #[must_use]
    pub fn is_enum(&self) -> bool {
        self.base_type
            .as_ref()
            .is_some_and(|base| base.is_named("System", "Enum"))
    }

    /// Reference to this type as a generic definition, given its module and enclosing type.
    #[must_use]
    pub fn reference(&self, module: &str, declaring: Option<&TypeReference>) -> TypeReference {
        match declaring {
            Some(outer) => TypeReference::nested(outer.clone(), self.name.clone(), self.is_value_type()),
            None => TypeReference::named(
                ResolutionScope::Module(module.to_string()),
                self.namespace.clone(),
                self.name.clone(),
                self.is_value_type(),
            ),
        }
    }

    /// The type as seen from inside its own body: instantiated over its own parameters when
    /// generic.
    #[must_use]
    pub fn self_reference(&self, module: &str, declaring: Option<&TypeReference>) -> TypeReference {
        let definition = self.reference(module, declaring);
        if self.generic_parameters.is_empty() {
            return definition;
        }
        let arguments = (0..self.generic_parameters.len())
            .map(|position| TypeReference::GenericParameter {
                owner: GenericOwner::Type,
                position: u16::try_from(position).unwrap_or(u16::MAX),
            })
            .collect();
        definition.instantiate(arguments)
    }

    /// Look up a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Methods named `name`.
    pub fn methods_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a MethodDefinition> + 'a {
        self.methods.iter().filter(move |m| m.name == name)
    }

    /// Look up a directly nested type by name.
    #[must_use]
    pub fn nested(&self, name: &str) -> Option<&TypeDefinition> {
        self.nested_types.iter().find(|t| t.name == name)
    }
}
