//! Incremental construction of a live assembly.
//!
//! An [`AssemblyBuilder`] hands out handles as soon as a shell is declared, so later
//! declarations can refer to types and members that are not complete yet. Until
//! [`AssemblyBuilder::seal`] runs, member lookup goes through the per-type side-table,
//! [`DynamicType`]: the builder's own member lists are only complete once every
//! declaration of the build has happened.

use std::{
    collections::{hash_map::Entry, HashMap},
    sync::Arc,
};

use uguid::Guid;

use crate::{
    emit::{
        assembly::{LiveModule, LoadedAssembly, PermissionRequests},
        codewriter::LiveBody,
        handles::{
            AssemblyId, FieldHandle, LiveSignature, MethodHandle, RuntimeMethod, RuntimeType,
            TypeHandle,
        },
        types::{
            FieldEntry, LiveAttribute, LiveEvent, LiveField, LiveGenericParameter, LiveMethod,
            LiveParameter, LiveProperty, LiveType, MethodEntry, NativeMethod, TypeMembers,
        },
    },
    metadata::{
        definitions::{
            Constant, FieldAttributes, MethodAttributes, MethodImplAttributes, TypeAttributes,
        },
        resources::Resource,
        security::SecurityDeclaration,
        typesystem::AssemblyName,
    },
    Result,
};

/// The in-progress side-table of one type: what member resolution may see before sealing.
#[derive(Debug, Clone)]
pub struct DynamicType {
    handle: TypeHandle,
    generic_arity: usize,
    fields: HashMap<String, Vec<FieldEntry>>,
    methods: HashMap<String, Vec<MethodEntry>>,
    nested: HashMap<String, TypeHandle>,
}

impl DynamicType {
    fn new(handle: TypeHandle) -> Self {
        DynamicType {
            handle,
            generic_arity: 0,
            fields: HashMap::new(),
            methods: HashMap::new(),
            nested: HashMap::new(),
        }
    }

    /// The nested type called `name`.
    #[must_use]
    pub fn nested(&self, name: &str) -> Option<TypeHandle> {
        self.nested.get(name).copied()
    }

    /// Number of methods whose signature has been declared.
    #[must_use]
    pub fn declared_method_count(&self) -> usize {
        self.methods.values().map(Vec::len).sum()
    }
}

impl TypeMembers for DynamicType {
    fn type_handle(&self) -> TypeHandle {
        self.handle
    }

    fn generic_arity(&self) -> usize {
        self.generic_arity
    }

    fn find_fields(&self, name: &str) -> Vec<FieldEntry> {
        self.fields.get(name).cloned().unwrap_or_default()
    }

    fn find_methods(&self, name: &str) -> Vec<MethodEntry> {
        self.methods.get(name).cloned().unwrap_or_default()
    }
}

/// Anything a custom attribute can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeTarget {
    /// The assembly
    Assembly,
    /// A module, by position
    Module(usize),
    /// A type
    Type(TypeHandle),
    /// A field
    Field(FieldHandle),
    /// A method
    Method(MethodHandle),
    /// A parameter by zero-based position
    Parameter(MethodHandle, usize),
    /// The return parameter
    ReturnParameter(MethodHandle),
    /// A property, by position in its type
    Property(TypeHandle, usize),
    /// An event, by position in its type
    Event(TypeHandle, usize),
    /// A generic parameter of a type
    TypeGenericParameter(TypeHandle, usize),
    /// A generic parameter of a method
    MethodGenericParameter(MethodHandle, usize),
}

/// Anything declarative security can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityTarget {
    /// The assembly (requests go to [`AssemblyBuilder::add_permission_request`])
    Assembly,
    /// A type
    Type(TypeHandle),
    /// A method
    Method(MethodHandle),
}

/// A type under construction.
#[derive(Debug, Clone)]
pub struct TypeBuilder {
    definition: LiveType,
    methods: Vec<LiveMethod>,
}

impl TypeBuilder {
    /// The definition built so far. Its method list stays empty until sealing.
    #[must_use]
    pub fn definition(&self) -> &LiveType {
        &self.definition
    }

    /// Methods declared so far.
    #[must_use]
    pub fn methods(&self) -> &[LiveMethod] {
        &self.methods
    }

    fn seal(self) -> LiveType {
        let mut definition = self.definition;
        definition.methods = self.methods.into_iter().map(Arc::new).collect();
        definition
    }
}

/// Builds one live assembly.
#[derive(Debug)]
pub struct AssemblyBuilder {
    id: AssemblyId,
    name: AssemblyName,
    modules: Vec<LiveModule>,
    types: Vec<TypeBuilder>,
    dynamic: Vec<DynamicType>,
    by_name: HashMap<String, TypeHandle>,
    custom_attributes: Vec<LiveAttribute>,
    security: Vec<SecurityDeclaration>,
    permission_requests: PermissionRequests,
}

impl AssemblyBuilder {
    /// Start an assembly under an id reserved in the owning domain.
    #[must_use]
    pub fn new(id: AssemblyId, name: AssemblyName) -> Self {
        AssemblyBuilder {
            id,
            name,
            modules: Vec::new(),
            types: Vec::new(),
            dynamic: Vec::new(),
            by_name: HashMap::new(),
            custom_attributes: Vec::new(),
            security: Vec::new(),
            permission_requests: PermissionRequests::default(),
        }
    }

    /// Id of the assembly being built.
    #[must_use]
    pub fn id(&self) -> AssemblyId {
        self.id
    }

    /// Identity of the assembly being built.
    #[must_use]
    pub fn assembly_name(&self) -> &AssemblyName {
        &self.name
    }

    /// Number of types declared so far, nested ones included.
    #[must_use]
    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// Declare a module and return its position.
    pub fn define_module(&mut self, name: impl Into<String>, mvid: Guid) -> usize {
        self.modules.push(LiveModule {
            name: name.into(),
            mvid,
            resources: Vec::new(),
            types: Vec::new(),
            custom_attributes: Vec::new(),
        });
        self.modules.len() - 1
    }

    /// Position of the module called `name`.
    #[must_use]
    pub fn module_index(&self, name: &str) -> Option<usize> {
        self.modules.iter().position(|module| module.name == name)
    }

    /// Copy a resource into a module.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] for an unknown module.
    pub fn add_resource(&mut self, module: usize, resource: Resource) -> Result<()> {
        self.modules
            .get_mut(module)
            .ok_or_else(|| invalid_operation!("No module {}", module))?
            .resources
            .push(resource);
        Ok(())
    }

    /// Declare a type shell: name, flags and nesting, nothing else.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] for an unknown module or enclosing type,
    /// and for a name already declared in the same scope.
    pub fn define_type(
        &mut self,
        module: usize,
        namespace: &str,
        name: &str,
        attributes: TypeAttributes,
        declaring: Option<TypeHandle>,
    ) -> Result<TypeHandle> {
        let module_name = self
            .modules
            .get(module)
            .ok_or_else(|| invalid_operation!("No module {}", module))?
            .name
            .clone();
        let handle = TypeHandle::new(self.id, self.types.len() as u32);
        let mut definition = LiveType::new(handle, module_name, namespace, name, attributes);
        definition.declaring = declaring;

        match declaring {
            Some(outer) => {
                let outer_index = self.index_of(outer)?;
                match self.dynamic[outer_index].nested.entry(name.to_string()) {
                    Entry::Occupied(_) => {
                        return Err(invalid_operation!("Nested type {} declared twice", name))
                    }
                    Entry::Vacant(slot) => {
                        slot.insert(handle);
                    }
                }
                self.types[outer_index].definition.nested_types.push(handle);
            }
            None => {
                let full_name = definition.full_name();
                match self.by_name.entry(full_name) {
                    Entry::Occupied(slot) => {
                        return Err(invalid_operation!("Type {} declared twice", slot.key()))
                    }
                    Entry::Vacant(slot) => {
                        slot.insert(handle);
                    }
                }
                self.modules[module].types.push(handle);
            }
        }

        self.types.push(TypeBuilder {
            definition,
            methods: Vec::new(),
        });
        self.dynamic.push(DynamicType::new(handle));
        Ok(handle)
    }

    fn index_of(&self, handle: TypeHandle) -> Result<usize> {
        if handle.assembly != self.id || handle.index as usize >= self.types.len() {
            return Err(invalid_operation!("Type {:?} is not part of this build", handle));
        }
        Ok(handle.index as usize)
    }

    /// A top-level type by `Namespace.Name`.
    #[must_use]
    pub fn find_type(&self, full_name: &str) -> Option<TypeHandle> {
        self.by_name.get(full_name).copied()
    }

    /// The in-progress side-table of a type.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] for types of other assemblies.
    pub fn dynamic(&self, handle: TypeHandle) -> Result<&DynamicType> {
        let index = self.index_of(handle)?;
        Ok(&self.dynamic[index])
    }

    /// The type under construction.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] for types of other assemblies.
    pub fn type_builder(&self, handle: TypeHandle) -> Result<&TypeBuilder> {
        let index = self.index_of(handle)?;
        Ok(&self.types[index])
    }

    fn definition_mut(&mut self, handle: TypeHandle) -> Result<&mut LiveType> {
        let index = self.index_of(handle)?;
        Ok(&mut self.types[index].definition)
    }

    /// Set packing and class size.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] for types of other assemblies.
    pub fn set_layout(&mut self, ty: TypeHandle, packing_size: Option<u16>, class_size: Option<u32>) -> Result<()> {
        let definition = self.definition_mut(ty)?;
        definition.packing_size = packing_size;
        definition.class_size = class_size;
        Ok(())
    }

    /// Declare the generic parameters of a type.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if the type already has some.
    pub fn define_generic_parameters(&mut self, ty: TypeHandle, parameters: Vec<LiveGenericParameter>) -> Result<()> {
        let index = self.index_of(ty)?;
        let definition = &mut self.types[index].definition;
        if !definition.generic_parameters.is_empty() {
            return Err(invalid_operation!("Generic parameters of {} declared twice", definition.name));
        }
        self.dynamic[index].generic_arity = parameters.len();
        definition.generic_parameters = parameters;
        Ok(())
    }

    /// Replace the placeholder base type.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] for types of other assemblies.
    pub fn set_parent(&mut self, ty: TypeHandle, base_type: Option<RuntimeType>) -> Result<()> {
        self.definition_mut(ty)?.base_type = base_type;
        Ok(())
    }

    /// Add an implemented interface.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] for types of other assemblies.
    pub fn add_interface(&mut self, ty: TypeHandle, interface: RuntimeType) -> Result<()> {
        self.definition_mut(ty)?.interfaces.push(interface);
        Ok(())
    }

    fn generic_parameter_mut(&mut self, owner: AttributeTarget) -> Result<&mut LiveGenericParameter> {
        match owner {
            AttributeTarget::TypeGenericParameter(ty, position) => self
                .definition_mut(ty)?
                .generic_parameters
                .get_mut(position)
                .ok_or_else(|| invalid_operation!("No generic parameter {} on {:?}", position, ty)),
            AttributeTarget::MethodGenericParameter(method, position) => self
                .method_mut(method)?
                .generic_parameters
                .get_mut(position)
                .ok_or_else(|| invalid_operation!("No generic parameter {} on {:?}", position, method)),
            other => Err(invalid_operation!("{:?} is not a generic parameter", other)),
        }
    }

    /// Set the constraints of a generic parameter, given as
    /// [`AttributeTarget::TypeGenericParameter`] or [`AttributeTarget::MethodGenericParameter`].
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] for unknown parameters.
    pub fn set_generic_constraints(
        &mut self,
        parameter: AttributeTarget,
        base_constraint: Option<RuntimeType>,
        interface_constraints: Vec<RuntimeType>,
    ) -> Result<()> {
        let parameter = self.generic_parameter_mut(parameter)?;
        parameter.base_constraint = base_constraint;
        parameter.interface_constraints = interface_constraints;
        Ok(())
    }

    /// Declare a field and publish it in the side-table.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] for types of other assemblies.
    pub fn define_field(
        &mut self,
        ty: TypeHandle,
        name: &str,
        attributes: FieldAttributes,
        field_type: RuntimeType,
    ) -> Result<FieldHandle> {
        let index = self.index_of(ty)?;
        let fields = &mut self.types[index].definition.fields;
        let handle = FieldHandle {
            declaring: ty,
            index: fields.len() as u32,
        };
        fields.push(LiveField {
            name: name.to_string(),
            attributes,
            field_type: field_type.clone(),
            constant: None,
            custom_attributes: Vec::new(),
        });
        self.dynamic[index]
            .fields
            .entry(name.to_string())
            .or_default()
            .push(FieldEntry {
                handle,
                field_type,
                is_static: attributes.contains(FieldAttributes::STATIC),
            });
        Ok(handle)
    }

    /// Declare a method shell. It becomes visible to resolution once its signature is set.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] for types of other assemblies.
    pub fn define_method(
        &mut self,
        ty: TypeHandle,
        name: &str,
        attributes: MethodAttributes,
        impl_attributes: MethodImplAttributes,
        generic_parameters: Vec<LiveGenericParameter>,
    ) -> Result<MethodHandle> {
        let index = self.index_of(ty)?;
        let methods = &mut self.types[index].methods;
        let handle = MethodHandle {
            declaring: ty,
            index: methods.len() as u32,
        };
        let mut method = LiveMethod::new(handle, name, attributes, impl_attributes);
        method.generic_parameters = generic_parameters;
        methods.push(method);
        Ok(handle)
    }

    /// The method under construction.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] for unknown methods.
    pub fn method(&self, handle: MethodHandle) -> Result<&LiveMethod> {
        let index = self.index_of(handle.declaring)?;
        self.types[index]
            .methods
            .get(handle.index as usize)
            .ok_or_else(|| invalid_operation!("No method {:?}", handle))
    }

    fn method_mut(&mut self, handle: MethodHandle) -> Result<&mut LiveMethod> {
        let index = self.index_of(handle.declaring)?;
        self.types[index]
            .methods
            .get_mut(handle.index as usize)
            .ok_or_else(|| invalid_operation!("No method {:?}", handle))
    }

    fn field_mut(&mut self, handle: FieldHandle) -> Result<&mut LiveField> {
        self.definition_mut(handle.declaring)?
            .fields
            .get_mut(handle.index as usize)
            .ok_or_else(|| invalid_operation!("No field {:?}", handle))
    }

    /// Complete a method's signature and parameters and publish it in the side-table.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] for unknown methods, a second call, or a
    /// parameter list that does not match the signature.
    pub fn set_signature(
        &mut self,
        handle: MethodHandle,
        signature: LiveSignature,
        parameters: Vec<LiveParameter>,
        return_parameter: LiveParameter,
    ) -> Result<()> {
        if parameters.len() != signature.parameters.len() {
            return Err(invalid_operation!(
                "{} parameters given for a signature with {}",
                parameters.len(),
                signature.parameters.len()
            ));
        }
        let method = self.method_mut(handle)?;
        if method.signature.is_some() {
            return Err(invalid_operation!("Signature of {} set twice", method.name));
        }
        method.signature = Some(signature.clone());
        method.parameters = parameters;
        method.return_parameter = return_parameter;
        let name = method.name.clone();

        let index = self.index_of(handle.declaring)?;
        self.dynamic[index]
            .methods
            .entry(name)
            .or_default()
            .push(MethodEntry { handle, signature });
        Ok(())
    }

    /// Attach a body.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] for unknown methods or a second body.
    pub fn set_body(&mut self, handle: MethodHandle, body: LiveBody) -> Result<()> {
        let method = self.method_mut(handle)?;
        if method.body.is_some() || method.native.is_some() {
            return Err(invalid_operation!("Body of {} set twice", method.name));
        }
        method.body = Some(body);
        Ok(())
    }

    /// Attach a host implementation.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] for unknown methods or a second body.
    pub fn set_native(&mut self, handle: MethodHandle, native: NativeMethod) -> Result<()> {
        let method = self.method_mut(handle)?;
        if method.body.is_some() || method.native.is_some() {
            return Err(invalid_operation!("Body of {} set twice", method.name));
        }
        method.native = Some(native);
        Ok(())
    }

    /// Record that `method` implements `declaration`.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] for unknown methods.
    pub fn define_method_override(&mut self, method: MethodHandle, declaration: RuntimeMethod) -> Result<()> {
        self.method_mut(method)?.overrides.push(declaration);
        Ok(())
    }

    /// Declare a property; accessors must already be declared methods of the same type.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] for accessors of other types.
    pub fn define_property(&mut self, ty: TypeHandle, property: LiveProperty) -> Result<usize> {
        let accessors = property
            .getter
            .iter()
            .chain(&property.setter)
            .chain(&property.others);
        self.check_accessors(ty, accessors.copied())?;
        let properties = &mut self.definition_mut(ty)?.properties;
        properties.push(property);
        Ok(properties.len() - 1)
    }

    /// Declare an event; accessors must already be declared methods of the same type.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] for accessors of other types.
    pub fn define_event(&mut self, ty: TypeHandle, event: LiveEvent) -> Result<usize> {
        let accessors = event
            .add
            .iter()
            .chain(&event.remove)
            .chain(&event.raise)
            .chain(&event.others);
        self.check_accessors(ty, accessors.copied())?;
        let events = &mut self.definition_mut(ty)?.events;
        events.push(event);
        Ok(events.len() - 1)
    }

    fn check_accessors(&self, ty: TypeHandle, mut accessors: impl Iterator<Item = MethodHandle>) -> Result<()> {
        let index = self.index_of(ty)?;
        let count = self.types[index].methods.len() as u32;
        match accessors.find(|accessor| accessor.declaring != ty || accessor.index >= count) {
            Some(accessor) => Err(invalid_operation!("Accessor {:?} is not a method of {:?}", accessor, ty)),
            None => Ok(()),
        }
    }

    /// Set the constant of a field.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] for unknown fields.
    pub fn set_field_constant(&mut self, field: FieldHandle, constant: Constant) -> Result<()> {
        self.field_mut(field)?.constant = Some(constant);
        Ok(())
    }

    /// Set the default value of a parameter (`None` position for the return parameter).
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] for unknown methods or positions.
    pub fn set_parameter_constant(&mut self, method: MethodHandle, position: Option<usize>, constant: Constant) -> Result<()> {
        let method = self.method_mut(method)?;
        let parameter = match position {
            Some(position) => method
                .parameters
                .get_mut(position)
                .ok_or_else(|| invalid_operation!("No parameter {} on {}", position, method.name))?,
            None => &mut method.return_parameter,
        };
        parameter.constant = Some(constant);
        Ok(())
    }

    /// Set the default value of a property.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] for unknown properties.
    pub fn set_property_constant(&mut self, ty: TypeHandle, property: usize, constant: Constant) -> Result<()> {
        self.definition_mut(ty)?
            .properties
            .get_mut(property)
            .ok_or_else(|| invalid_operation!("No property {} on {:?}", property, ty))?
            .constant = Some(constant);
        Ok(())
    }

    /// Attach a custom attribute.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] for unknown targets.
    pub fn set_custom_attribute(&mut self, target: AttributeTarget, attribute: LiveAttribute) -> Result<()> {
        let list = match target {
            AttributeTarget::Assembly => &mut self.custom_attributes,
            AttributeTarget::Module(module) => {
                &mut self
                    .modules
                    .get_mut(module)
                    .ok_or_else(|| invalid_operation!("No module {}", module))?
                    .custom_attributes
            }
            AttributeTarget::Type(ty) => &mut self.definition_mut(ty)?.custom_attributes,
            AttributeTarget::Field(field) => &mut self.field_mut(field)?.custom_attributes,
            AttributeTarget::Method(method) => &mut self.method_mut(method)?.custom_attributes,
            AttributeTarget::Parameter(method, position) => {
                let method = self.method_mut(method)?;
                &mut method
                    .parameters
                    .get_mut(position)
                    .ok_or_else(|| invalid_operation!("No parameter {} on {}", position, method.name))?
                    .custom_attributes
            }
            AttributeTarget::ReturnParameter(method) => {
                &mut self.method_mut(method)?.return_parameter.custom_attributes
            }
            AttributeTarget::Property(ty, index) => {
                &mut self
                    .definition_mut(ty)?
                    .properties
                    .get_mut(index)
                    .ok_or_else(|| invalid_operation!("No property {} on {:?}", index, ty))?
                    .custom_attributes
            }
            AttributeTarget::Event(ty, index) => {
                &mut self
                    .definition_mut(ty)?
                    .events
                    .get_mut(index)
                    .ok_or_else(|| invalid_operation!("No event {} on {:?}", index, ty))?
                    .custom_attributes
            }
            AttributeTarget::TypeGenericParameter(..) | AttributeTarget::MethodGenericParameter(..) => {
                &mut self.generic_parameter_mut(target)?.custom_attributes
            }
        };
        list.push(attribute);
        Ok(())
    }

    /// Attach declarative security.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] for unknown targets and for permission
    /// requests, which belong to [`AssemblyBuilder::add_permission_request`].
    pub fn add_declarative_security(&mut self, target: SecurityTarget, declaration: SecurityDeclaration) -> Result<()> {
        if declaration.action.is_request() {
            return Err(invalid_operation!(
                "{:?} is a permission request, not declarative security",
                declaration.action
            ));
        }
        match target {
            SecurityTarget::Assembly => self.security.push(declaration),
            SecurityTarget::Type(ty) => self.definition_mut(ty)?.security.push(declaration),
            SecurityTarget::Method(method) => self.method_mut(method)?.security.push(declaration),
        }
        Ok(())
    }

    /// Union a permission request into the assembly's requests.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] for actions that are not requests.
    pub fn add_permission_request(&mut self, declaration: &SecurityDeclaration) -> Result<()> {
        if self
            .permission_requests
            .add(declaration.action, &declaration.permission_set)
        {
            Ok(())
        } else {
            Err(invalid_operation!("{:?} is not a permission request", declaration.action))
        }
    }

    /// Create every declared type and produce the executable assembly.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if a declared method never received its
    /// signature.
    pub fn seal(self) -> Result<LoadedAssembly> {
        for builder in &self.types {
            if let Some(method) = builder.methods.iter().find(|method| method.signature.is_none()) {
                return Err(invalid_operation!(
                    "{}::{} was declared but never completed",
                    builder.definition.full_name(),
                    method.name
                ));
            }
        }

        log::debug!(
            "Sealing assembly {} with {} type(s)",
            self.name.name,
            self.types.len()
        );
        Ok(LoadedAssembly {
            id: self.id,
            name: self.name,
            modules: self.modules,
            types: self
                .types
                .into_iter()
                .map(|builder| Arc::new(builder.seal()))
                .collect(),
            by_name: self.by_name,
            custom_attributes: self.custom_attributes,
            security: self.security,
            permission_requests: self.permission_requests,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{
        security::{Permission, PermissionSet, SecurityAction},
        signatures::CallingConvention,
    };

    fn signature(parameters: Vec<RuntimeType>) -> LiveSignature {
        LiveSignature {
            has_this: true,
            convention: CallingConvention::Default,
            generic_arity: 0,
            return_type: RuntimeType::Type(TypeHandle::new(AssemblyId(0), 0)),
            parameters,
        }
    }

    fn builder() -> (AssemblyBuilder, usize) {
        let mut builder = AssemblyBuilder::new(AssemblyId(5), AssemblyName::new("Built"));
        let module = builder.define_module("Built.dll", Guid::ZERO);
        (builder, module)
    }

    #[test]
    fn members_appear_in_side_table_once_declared() {
        let (mut builder, module) = builder();
        let ty = builder
            .define_type(module, "Ns", "C", TypeAttributes::PUBLIC, None)
            .unwrap();
        let int = RuntimeType::Type(TypeHandle::new(AssemblyId(0), 1));

        let field = builder
            .define_field(ty, "value", FieldAttributes::PRIVATE, int.clone())
            .unwrap();
        assert_eq!(builder.dynamic(ty).unwrap().find_fields("value")[0].handle, field);

        let method = builder
            .define_method(ty, "M", MethodAttributes::PUBLIC, MethodImplAttributes::empty(), vec![])
            .unwrap();
        assert!(builder.dynamic(ty).unwrap().find_methods("M").is_empty());
        builder
            .set_signature(method, signature(vec![int]), vec![LiveParameter::default()], LiveParameter::default())
            .unwrap();
        assert_eq!(builder.dynamic(ty).unwrap().find_methods("M")[0].handle, method);
        assert_eq!(builder.dynamic(ty).unwrap().declared_method_count(), 1);
    }

    #[test]
    fn nested_types_are_scoped_to_their_outer_type() {
        let (mut builder, module) = builder();
        let outer = builder
            .define_type(module, "Ns", "Outer", TypeAttributes::PUBLIC, None)
            .unwrap();
        let inner = builder
            .define_type(module, "", "Inner", TypeAttributes::NESTED_PUBLIC, Some(outer))
            .unwrap();
        assert_eq!(builder.dynamic(outer).unwrap().nested("Inner"), Some(inner));
        assert_eq!(builder.find_type("Inner"), None);
        assert!(builder
            .define_type(module, "", "Inner", TypeAttributes::NESTED_PUBLIC, Some(outer))
            .is_err());
        assert!(builder
            .define_type(module, "Ns", "Outer", TypeAttributes::PUBLIC, None)
            .is_err());

        let sealed = builder.seal().unwrap();
        assert_eq!(sealed.find_type("Ns.Outer+Inner").map(|t| t.handle), Some(inner));
        assert_eq!(sealed.modules()[0].types, vec![outer]);
    }

    #[test]
    fn sealing_rejects_incomplete_methods() {
        let (mut builder, module) = builder();
        let ty = builder
            .define_type(module, "Ns", "C", TypeAttributes::PUBLIC, None)
            .unwrap();
        builder
            .define_method(ty, "M", MethodAttributes::PUBLIC, MethodImplAttributes::empty(), vec![])
            .unwrap();
        assert!(matches!(builder.seal(), Err(crate::Error::InvalidOperation(_))));
    }

    #[test]
    fn accessors_must_belong_to_the_type() {
        let (mut builder, module) = builder();
        let ty = builder
            .define_type(module, "Ns", "C", TypeAttributes::PUBLIC, None)
            .unwrap();
        let property = LiveProperty {
            name: "P".into(),
            attributes: crate::metadata::definitions::PropertyAttributes::empty(),
            property_type: RuntimeType::Type(ty),
            parameters: vec![],
            getter: Some(MethodHandle { declaring: ty, index: 0 }),
            setter: None,
            others: vec![],
            constant: None,
            custom_attributes: vec![],
        };
        assert!(builder.define_property(ty, property.clone()).is_err());
        builder
            .define_method(ty, "get_P", MethodAttributes::PUBLIC, MethodImplAttributes::empty(), vec![])
            .unwrap();
        assert_eq!(builder.define_property(ty, property).unwrap(), 0);
    }

    #[test]
    fn permission_requests_are_unioned() {
        let (mut builder, _) = builder();
        let first = Permission::new("A, mscorlib", &[]).unwrap();
        let second = Permission::new("B, mscorlib", &[]).unwrap();
        builder
            .add_permission_request(&SecurityDeclaration::new(
                SecurityAction::RequestMinimum,
                PermissionSet::from_permissions([first.clone()]),
            ))
            .unwrap();
        builder
            .add_permission_request(&SecurityDeclaration::new(
                SecurityAction::RequestMinimum,
                PermissionSet::from_permissions([first, second]),
            ))
            .unwrap();
        assert!(builder
            .add_permission_request(&SecurityDeclaration::new(SecurityAction::Demand, PermissionSet::new()))
            .is_err());
        assert!(builder
            .add_declarative_security(
                SecurityTarget::Assembly,
                SecurityDeclaration::new(SecurityAction::RequestRefuse, PermissionSet::new())
            )
            .is_err());

        let sealed = builder.seal().unwrap();
        assert_eq!(sealed.permission_requests().minimum.permissions().len(), 2);
        assert!(sealed.permission_requests().refuse.is_empty());
    }
}
