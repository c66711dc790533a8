use crate::metadata::{
    customattributes::CustomAttribute,
    definitions::{
        Constant, EventAttributes, FieldAttributes, GenericParamAttributes, MethodAttributes,
        MethodImplAttributes, ParamAttributes, PropertyAttributes,
    },
    members::{MethodReference, CONSTRUCTOR_NAME, TYPE_INITIALIZER_NAME},
    method::MethodBody,
    security::SecurityDeclaration,
    signatures::MethodSignature,
    typesystem::TypeReference,
};

/// A field definition.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDefinition {
    /// Field name
    pub name: String,
    /// Flags
    pub attributes: FieldAttributes,
    /// Field type
    pub field_type: TypeReference,
    /// Default value
    pub constant: Option<Constant>,
    /// Attached custom attributes
    pub custom_attributes: Vec<CustomAttribute>,
}

impl FieldDefinition {
    /// A field without constant or attributes.
    #[must_use]
    pub fn new(name: impl Into<String>, attributes: FieldAttributes, field_type: TypeReference) -> Self {
        FieldDefinition {
            name: name.into(),
            attributes,
            field_type,
            constant: None,
            custom_attributes: Vec::new(),
        }
    }

    /// `true` for static fields.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.attributes.contains(FieldAttributes::STATIC)
    }
}

/// A parameter, or the return parameter, of a method definition.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParameterDefinition {
    /// Parameter name, empty for the return parameter
    pub name: String,
    /// Flags
    pub attributes: ParamAttributes,
    /// Default value
    pub constant: Option<Constant>,
    /// Attached custom attributes
    pub custom_attributes: Vec<CustomAttribute>,
}

impl ParameterDefinition {
    /// A plain named parameter.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        ParameterDefinition {
            name: name.into(),
            ..ParameterDefinition::default()
        }
    }

    /// `true` if the parameter carries nothing beyond its name.
    #[must_use]
    pub fn is_plain(&self) -> bool {
        self.attributes.is_empty() && self.constant.is_none() && self.custom_attributes.is_empty()
    }
}

/// A generic parameter of a type or method.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GenericParameterDefinition {
    /// Parameter name
    pub name: String,
    /// Variance and special constraints
    pub attributes: GenericParamAttributes,
    /// Type constraints: at most one class, any number of interfaces
    pub constraints: Vec<TypeReference>,
    /// Attached custom attributes
    pub custom_attributes: Vec<CustomAttribute>,
}

impl GenericParameterDefinition {
    /// An unconstrained parameter.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        GenericParameterDefinition {
            name: name.into(),
            ..GenericParameterDefinition::default()
        }
    }
}

/// A method definition.
///
/// `parameters` parallels `signature.parameters`; the signature is the source of truth for
/// types, the parameter list carries names, flags, defaults and attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDefinition {
    /// Method name
    pub name: String,
    /// Flags
    pub attributes: MethodAttributes,
    /// Implementation flags
    pub impl_attributes: MethodImplAttributes,
    /// Signature
    pub signature: MethodSignature,
    /// Parameter metadata, one per signature parameter
    pub parameters: Vec<ParameterDefinition>,
    /// Return parameter metadata
    pub return_parameter: ParameterDefinition,
    /// Method generic parameters
    pub generic_parameters: Vec<GenericParameterDefinition>,
    /// Interface or base methods this method explicitly implements
    pub overrides: Vec<MethodReference>,
    /// IL body, `None` for abstract, runtime and extern methods
    pub body: Option<MethodBody>,
    /// Attached custom attributes
    pub custom_attributes: Vec<CustomAttribute>,
    /// Declarative security
    pub security: Vec<SecurityDeclaration>,
}

impl MethodDefinition {
    /// A method with unnamed parameters and no body.
    ///
    /// `HAS_THIS` of the signature follows the `STATIC` flag.
    #[must_use]
    pub fn new(name: impl Into<String>, attributes: MethodAttributes, mut signature: MethodSignature) -> Self {
        signature.has_this = !attributes.contains(MethodAttributes::STATIC);
        let parameters = (0..signature.parameters.len())
            .map(|i| ParameterDefinition::new(format!("arg{i}")))
            .collect();
        MethodDefinition {
            name: name.into(),
            attributes,
            impl_attributes: MethodImplAttributes::empty(),
            signature,
            parameters,
            return_parameter: ParameterDefinition::default(),
            generic_parameters: Vec::new(),
            overrides: Vec::new(),
            body: None,
            custom_attributes: Vec::new(),
            security: Vec::new(),
        }
    }

    /// An instance constructor.
    #[must_use]
    pub fn constructor(attributes: MethodAttributes, parameters: Vec<TypeReference>) -> Self {
        MethodDefinition::new(
            CONSTRUCTOR_NAME,
            attributes | MethodAttributes::SPECIAL_NAME | MethodAttributes::RT_SPECIAL_NAME,
            MethodSignature::new_instance(TypeReference::void(), parameters),
        )
    }

    /// Attach a body.
    #[must_use]
    pub fn with_body(mut self, body: MethodBody) -> Self {
        self.body = Some(body);
        self
    }

    /// `true` for `.ctor` and `.cctor`.
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.name == CONSTRUCTOR_NAME || self.name == TYPE_INITIALIZER_NAME
    }

    /// `true` for static methods.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.attributes.contains(MethodAttributes::STATIC)
    }

    /// `true` for abstract methods.
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.attributes.contains(MethodAttributes::ABSTRACT)
    }
}

/// A property. Accessors are indices into the declaring type's method list.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDefinition {
    /// Property name
    pub name: String,
    /// Flags
    pub attributes: PropertyAttributes,
    /// Instance property
    pub has_this: bool,
    /// Property type
    pub property_type: TypeReference,
    /// Index parameter types
    pub parameters: Vec<TypeReference>,
    /// `get` accessor
    pub getter: Option<usize>,
    /// `set` accessor
    pub setter: Option<usize>,
    /// Other accessors
    pub others: Vec<usize>,
    /// Default value
    pub constant: Option<Constant>,
    /// Attached custom attributes
    pub custom_attributes: Vec<CustomAttribute>,
}

impl PropertyDefinition {
    /// A property without accessors.
    #[must_use]
    pub fn new(name: impl Into<String>, property_type: TypeReference) -> Self {
        PropertyDefinition {
            name: name.into(),
            attributes: PropertyAttributes::empty(),
            has_this: true,
            property_type,
            parameters: Vec::new(),
            getter: None,
            setter: None,
            others: Vec::new(),
            constant: None,
            custom_attributes: Vec::new(),
        }
    }

    /// All accessor indices.
    pub fn accessors(&self) -> impl Iterator<Item = usize> + '_ {
        self.getter.into_iter().chain(self.setter).chain(self.others.iter().copied())
    }
}

/// An event. Accessors are indices into the declaring type's method list.
#[derive(Debug, Clone, PartialEq)]
pub struct EventDefinition {
    /// Event name
    pub name: String,
    /// Flags
    pub attributes: EventAttributes,
    /// Delegate type
    pub event_type: TypeReference,
    /// `add` accessor
    pub add: Option<usize>,
    /// `remove` accessor
    pub remove: Option<usize>,
    /// `raise` accessor
    pub raise: Option<usize>,
    /// Other accessors
    pub others: Vec<usize>,
    /// Attached custom attributes
    pub custom_attributes: Vec<CustomAttribute>,
}

impl EventDefinition {
    /// An event without accessors.
    #[must_use]
    pub fn new(name: impl Into<String>, event_type: TypeReference) -> Self {
        EventDefinition {
            name: name.into(),
            attributes: EventAttributes::empty(),
            event_type,
            add: None,
            remove: None,
            raise: None,
            others: Vec::new(),
            custom_attributes: Vec::new(),
        }
    }

    /// All accessor indices.
    pub fn accessors(&self) -> impl Iterator<Item = usize> + '_ {
        self.add
            .into_iter()
            .chain(self.remove)
            .chain(self.raise)
            .chain(self.others.iter().copied())
    }
}
