//! Symbolic references to live handles and back.
//!
//! A [`SymbolResolver`] maps the references of the static model onto the live model of a
//! [`Domain`], optionally looking first into an [`AssemblyBuilder`] whose types are still
//! being declared. Such in-progress types cannot be queried through the domain yet; their
//! members are found through the builder's side-table instead.
//!
//! Resolution is exact. Overloads are told apart by their full parameter list, return type,
//! instance flag and generic arity; no assignability is considered, and a reference that
//! matches nothing or more than one member fails with [`Error::UnresolvedSymbol`].

use std::sync::Arc;

use crate::{
    emit::{
        AssemblyBuilder, DynamicType, LiveSignature, LiveToken, LiveType, MethodHandle,
        RuntimeField, RuntimeMethod, RuntimeType, TypeHandle, TypeMembers,
    },
    metadata::{
        customattributes::{split_serialized_type_name, EnumResolver},
        members::{FieldReference, MemberReference, MethodReference},
        signatures::MethodSignature,
        typesystem::{
            AssemblyName, GenericOwner, NamedType, PrimitiveType, ResolutionScope, TypeReference,
        },
    },
    runtime::{corlib, Domain},
    Error, Result,
};

/// Default bound on nested resolution, see [`SymbolResolver::max_depth`].
pub const MAX_RESOLUTION_DEPTH: usize = 64;

/// The generic parameters a reference may name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenericContext {
    /// Owner of `!n` parameters
    pub type_owner: Option<TypeHandle>,
    /// Owner of `!!n` parameters
    pub method_owner: Option<MethodHandle>,
}

impl GenericContext {
    /// Inside the body of type `ty`.
    #[must_use]
    pub fn of_type(ty: TypeHandle) -> Self {
        GenericContext {
            type_owner: Some(ty),
            method_owner: None,
        }
    }

    /// Inside method `method`.
    #[must_use]
    pub fn of_method(method: MethodHandle) -> Self {
        GenericContext {
            type_owner: Some(method.declaring),
            method_owner: Some(method),
        }
    }
}

/// Where the members of a type are looked up.
enum Members<'b> {
    Building(&'b DynamicType),
    Loaded(Arc<LiveType>),
}

impl Members<'_> {
    fn get(&self) -> &dyn TypeMembers {
        match self {
            Members::Building(dynamic) => *dynamic,
            Members::Loaded(live) => live.as_ref(),
        }
    }
}

fn full_name(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{namespace}.{name}")
    }
}

fn signatures_match(expected: &LiveSignature, actual: &LiveSignature) -> bool {
    expected.has_this == actual.has_this
        && expected.generic_arity == actual.generic_arity
        && expected.return_type == actual.return_type
        && expected.parameters == actual.parameters
}

/// Resolves static references against a domain and an optional build in progress.
#[derive(Clone, Copy)]
pub struct SymbolResolver<'a> {
    domain: &'a Domain,
    building: Option<&'a AssemblyBuilder>,
    max_depth: usize,
}

impl<'a> SymbolResolver<'a> {
    /// Resolve against the assemblies registered in `domain`.
    #[must_use]
    pub fn new(domain: &'a Domain) -> Self {
        SymbolResolver {
            domain,
            building: None,
            max_depth: MAX_RESOLUTION_DEPTH,
        }
    }

    /// Look into `builder` before the domain; its types take precedence.
    #[must_use]
    pub fn building(mut self, builder: &'a AssemblyBuilder) -> Self {
        self.building = Some(builder);
        self
    }

    /// Bound the nesting of constructed types and declaring scopes.
    #[must_use]
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    fn in_build(&self, handle: TypeHandle) -> Option<&'a AssemblyBuilder> {
        self.building.filter(|builder| builder.id() == handle.assembly)
    }

    fn members(&self, handle: TypeHandle) -> Result<Members<'a>> {
        match self.in_build(handle) {
            Some(builder) => Ok(Members::Building(builder.dynamic(handle)?)),
            None => Ok(Members::Loaded(self.domain.live_type(handle)?)),
        }
    }

    fn method_arity(&self, handle: MethodHandle) -> Result<usize> {
        match self.in_build(handle.declaring) {
            Some(builder) => Ok(builder.method(handle)?.generic_parameters.len()),
            None => Ok(self.domain.method(handle)?.generic_parameters.len()),
        }
    }

    /// `true` if `ty` is an interface.
    ///
    /// # Errors
    /// Returns [`Error::UnresolvedSymbol`] for unknown handles.
    pub fn is_interface(&self, ty: &RuntimeType) -> Result<bool> {
        let Some(handle) = ty.definition() else {
            return Ok(false);
        };
        match self.in_build(handle) {
            Some(builder) => Ok(builder.type_builder(handle)?.definition().is_interface()),
            None => Ok(self.domain.live_type(handle)?.is_interface()),
        }
    }

    /// Resolve a type reference.
    ///
    /// # Errors
    /// - [`Error::UnsupportedConstruction`] for function pointers, pinned and modified types
    ///   and sentinels
    /// - [`Error::UnresolvedSymbol`] for unknown types and out-of-range generic parameters
    /// - [`Error::RecursionLimit`] for references nested deeper than the configured bound
    pub fn resolve_type(&self, reference: &TypeReference, context: &GenericContext) -> Result<RuntimeType> {
        self.resolve_with_depth(reference, context, 0)
    }

    fn resolve_with_depth(
        &self,
        reference: &TypeReference,
        context: &GenericContext,
        depth: usize,
    ) -> Result<RuntimeType> {
        if depth >= self.max_depth {
            return Err(Error::RecursionLimit(self.max_depth));
        }

        match reference {
            TypeReference::GenericParameter { owner, position } => {
                self.generic_parameter(*owner, *position, context)
            }
            TypeReference::Vector(element) => {
                Ok(self.resolve_with_depth(element, context, depth + 1)?.make_array(0))
            }
            TypeReference::Array { element, rank } => {
                if *rank == 0 {
                    return Err(Error::UnsupportedConstruction(format!(
                        "Array of rank 0 in {reference}"
                    )));
                }
                let element = self.resolve_with_depth(element, context, depth + 1)?;
                Ok(RuntimeType::Array(Box::new(element), *rank))
            }
            TypeReference::Pointer(element) => {
                Ok(self.resolve_with_depth(element, context, depth + 1)?.make_pointer())
            }
            TypeReference::ByRef(element) => {
                Ok(self.resolve_with_depth(element, context, depth + 1)?.make_by_ref())
            }
            TypeReference::GenericInstance { element, arguments } => {
                let definition = self.resolve_with_depth(element, context, depth + 1)?;
                let arguments = arguments
                    .iter()
                    .map(|argument| self.resolve_with_depth(argument, context, depth + 1))
                    .collect::<Result<Vec<_>>>()?;
                if let Some(handle) = definition.definition() {
                    if self.in_build(handle).is_none() {
                        let arity = self.members(handle)?.get().generic_arity();
                        if arity != arguments.len() {
                            return Err(unresolved!(
                                "{} takes {} type argument(s), {} given",
                                element,
                                arity,
                                arguments.len()
                            ));
                        }
                    }
                }
                definition.make_generic_instance(arguments)
            }
            TypeReference::FunctionPointer(_)
            | TypeReference::Pinned(_)
            | TypeReference::ModifierRequired { .. }
            | TypeReference::ModifierOptional { .. }
            | TypeReference::Sentinel => Err(Error::UnsupportedConstruction(format!(
                "Type shape {reference} is not modeled"
            ))),
            TypeReference::Primitive(primitive) => Ok(corlib::primitive_type(*primitive)),
            TypeReference::Named(named) => {
                Ok(RuntimeType::Type(self.resolve_named(named, context, depth)?))
            }
        }
    }

    fn generic_parameter(
        &self,
        owner: GenericOwner,
        position: u16,
        context: &GenericContext,
    ) -> Result<RuntimeType> {
        match owner {
            GenericOwner::Type => {
                let ty = context
                    .type_owner
                    .ok_or_else(|| unresolved!("!{} used outside a type", position))?;
                let arity = self.members(ty)?.get().generic_arity();
                if usize::from(position) >= arity {
                    return Err(unresolved!(
                        "!{} out of range, {:?} has {} generic parameter(s)",
                        position,
                        ty,
                        arity
                    ));
                }
                Ok(RuntimeType::GenericParameter { owner: ty, position })
            }
            GenericOwner::Method => {
                let method = context
                    .method_owner
                    .ok_or_else(|| unresolved!("!!{} used outside a method", position))?;
                let arity = self.method_arity(method)?;
                if usize::from(position) >= arity {
                    return Err(unresolved!(
                        "!!{} out of range, {:?} has {} generic parameter(s)",
                        position,
                        method,
                        arity
                    ));
                }
                Ok(RuntimeType::MethodGenericParameter {
                    owner: method,
                    position,
                })
            }
        }
    }

    fn resolve_named(&self, named: &NamedType, context: &GenericContext, depth: usize) -> Result<TypeHandle> {
        match &named.scope {
            ResolutionScope::Nested(declaring) => {
                let outer = self.resolve_with_depth(declaring, context, depth + 1)?;
                let outer = outer.definition().ok_or_else(|| {
                    Error::UnsupportedConstruction(format!("{declaring} cannot declare nested types"))
                })?;
                self.nested(outer, &named.name)?
                    .ok_or_else(|| unresolved!("{} has no nested type {}", declaring, named.name))
            }
            ResolutionScope::Module(module) => {
                self.in_module(module, &full_name(&named.namespace, &named.name))
            }
            ResolutionScope::Assembly(assembly) => {
                self.in_assembly(assembly, &full_name(&named.namespace, &named.name))
            }
        }
    }

    fn nested(&self, outer: TypeHandle, name: &str) -> Result<Option<TypeHandle>> {
        match self.in_build(outer) {
            Some(builder) => Ok(builder.dynamic(outer)?.nested(name)),
            None => Ok(self
                .domain
                .assembly(outer.assembly)?
                .find_nested(outer, name)
                .map(|nested| nested.handle)),
        }
    }

    fn in_module(&self, module: &str, full_name: &str) -> Result<TypeHandle> {
        if let Some(builder) = self.building {
            if builder.module_index(module).is_some() {
                return builder
                    .find_type(full_name)
                    .filter(|handle| {
                        builder
                            .type_builder(*handle)
                            .is_ok_and(|ty| ty.definition().module == module)
                    })
                    .ok_or_else(|| unresolved!("Module {} does not declare {}", module, full_name));
            }
        }
        self.domain
            .assemblies()
            .iter()
            .find_map(|assembly| assembly.find_type_in_module(module, full_name).map(|ty| ty.handle))
            .ok_or_else(|| unresolved!("No module {} declaring {}", module, full_name))
    }

    fn in_assembly(&self, assembly: &AssemblyName, full_name: &str) -> Result<TypeHandle> {
        if let Some(builder) = self.building {
            if builder.assembly_name().name == assembly.name {
                return builder
                    .find_type(full_name)
                    .ok_or_else(|| unresolved!("{} does not declare {}", assembly.name, full_name));
            }
        }
        self.domain
            .load(assembly)?
            .find_type(full_name)
            .map(|ty| ty.handle)
            .ok_or_else(|| unresolved!("{} does not declare {}", assembly.name, full_name))
    }

    /// Declared type of field or property `name` on `ty` or its base types.
    ///
    /// # Errors
    /// Returns [`Error::UnresolvedSymbol`] for unknown handles and [`Error::RecursionLimit`]
    /// for base chains longer than the configured bound.
    pub fn member_type(&self, ty: TypeHandle, is_field: bool, name: &str) -> Result<Option<RuntimeType>> {
        let mut current = Some(ty);
        for _ in 0..self.max_depth {
            let Some(handle) = current else {
                return Ok(None);
            };
            let lookup = |definition: &LiveType| {
                let found = if is_field {
                    definition
                        .fields
                        .iter()
                        .find(|field| field.name == name)
                        .map(|field| field.field_type.clone())
                } else {
                    definition
                        .properties
                        .iter()
                        .find(|property| property.name == name)
                        .map(|property| property.property_type.clone())
                };
                (found, definition.base_type.as_ref().and_then(RuntimeType::definition))
            };
            let (found, base) = match self.in_build(handle) {
                Some(builder) => lookup(builder.type_builder(handle)?.definition()),
                None => lookup(self.domain.live_type(handle)?.as_ref()),
            };
            if found.is_some() {
                return Ok(found);
            }
            current = base;
        }
        Err(Error::RecursionLimit(self.max_depth))
    }

    /// Resolve a method signature, as found in a method reference or a `calli` site.
    ///
    /// # Errors
    /// See [`SymbolResolver::resolve_type`].
    pub fn resolve_signature(&self, signature: &MethodSignature, context: &GenericContext) -> Result<LiveSignature> {
        Ok(LiveSignature {
            has_this: signature.has_this,
            convention: signature.convention,
            generic_arity: signature.generic_arity,
            return_type: self.resolve_type(&signature.return_type, context)?,
            parameters: signature
                .parameters
                .iter()
                .map(|parameter| self.resolve_type(parameter, context))
                .collect::<Result<_>>()?,
        })
    }

    /// Resolve a method reference to the one method with exactly that signature.
    ///
    /// # Errors
    /// Returns [`Error::UnresolvedSymbol`] if no method or more than one matches, and any
    /// error of resolving the declaring type or the signature.
    pub fn resolve_method(&self, reference: &MethodReference, context: &GenericContext) -> Result<RuntimeMethod> {
        let owner = self.resolve_type(&reference.declaring, context)?;
        let definition = owner.definition().ok_or_else(|| {
            Error::UnsupportedConstruction(format!("Methods of {} are not modeled", reference.declaring))
        })?;
        let members = self.members(definition)?;

        let mut found = None;
        for candidate in members.get().find_methods(&reference.name) {
            let expected = &reference.signature;
            if candidate.signature.has_this != expected.has_this
                || candidate.signature.generic_arity != expected.generic_arity
                || candidate.signature.parameters.len() != expected.parameters.len()
            {
                continue;
            }
            let signature = self.resolve_signature(
                expected,
                &GenericContext {
                    type_owner: Some(definition),
                    method_owner: Some(candidate.handle),
                },
            )?;
            if !signatures_match(&signature, &candidate.signature) {
                continue;
            }
            if found.replace(candidate.handle).is_some() {
                return Err(unresolved!("{} is ambiguous", reference));
            }
        }
        let handle = found.ok_or_else(|| unresolved!("No method matches {}", reference))?;

        let instantiation = reference
            .generic_arguments
            .iter()
            .map(|argument| self.resolve_type(argument, context))
            .collect::<Result<_>>()?;
        Ok(RuntimeMethod {
            handle,
            owner,
            instantiation,
        })
    }

    /// Resolve a field reference by name and exact field type.
    ///
    /// # Errors
    /// Returns [`Error::UnresolvedSymbol`] if no field or more than one matches.
    pub fn resolve_field(&self, reference: &FieldReference, context: &GenericContext) -> Result<RuntimeField> {
        let owner = self.resolve_type(&reference.declaring, context)?;
        let definition = owner.definition().ok_or_else(|| {
            Error::UnsupportedConstruction(format!("Fields of {} are not modeled", reference.declaring))
        })?;
        let expected = self.resolve_type(&reference.field_type, &GenericContext::of_type(definition))?;

        let mut matching = self
            .members(definition)?
            .get()
            .find_fields(&reference.name)
            .into_iter()
            .filter(|entry| entry.field_type == expected);
        match (matching.next(), matching.next()) {
            (Some(entry), None) => Ok(RuntimeField {
                handle: entry.handle,
                owner,
            }),
            (None, _) => Err(unresolved!("No field matches {}", reference)),
            (Some(_), Some(_)) => Err(unresolved!("{} is ambiguous", reference)),
        }
    }

    /// Resolve the operand of `ldtoken`, branching on what kind of member it names.
    ///
    /// # Errors
    /// See the type, field and method resolution functions.
    pub fn resolve_token(&self, reference: &MemberReference, context: &GenericContext) -> Result<LiveToken> {
        Ok(match reference {
            MemberReference::Type(ty) => LiveToken::Type(self.resolve_type(ty, context)?),
            MemberReference::Field(field) => LiveToken::Field(self.resolve_field(field, context)?),
            MemberReference::Method(method) => LiveToken::Method(self.resolve_method(method, context)?),
        })
    }

    /// Resolve a serialized type name (`Ns.Outer+Inner, Assembly`).
    ///
    /// Without an assembly part, the build in progress is searched first, then the core
    /// library.
    ///
    /// # Errors
    /// Returns [`Error::UnresolvedSymbol`] if no such type exists.
    pub fn resolve_type_name(&self, name: &str) -> Result<RuntimeType> {
        let (path, assembly) = split_serialized_type_name(name);
        let mut segments = path.into_iter();
        let first = segments
            .next()
            .filter(|segment| !segment.is_empty())
            .ok_or_else(|| unresolved!("Empty type name"))?;

        let mut handle = match assembly {
            Some(assembly) => self.in_assembly(&AssemblyName::new(assembly), first)?,
            None => match self.building.and_then(|builder| builder.find_type(first)) {
                Some(handle) => handle,
                None => self.in_assembly(&AssemblyName::corlib(), first)?,
            },
        };
        for segment in segments {
            handle = self
                .nested(handle, segment)?
                .ok_or_else(|| unresolved!("{} has no nested type {}", name, segment))?;
        }
        Ok(RuntimeType::Type(handle))
    }

    /// The symbolic reference of a live type: the reverse direction.
    ///
    /// Types of the build in progress are referenced through their module; everything
    /// else through its assembly.
    ///
    /// # Errors
    /// Returns [`Error::UnresolvedSymbol`] for unknown handles.
    pub fn type_reference(&self, ty: &RuntimeType) -> Result<TypeReference> {
        Ok(match ty {
            RuntimeType::Type(handle) => self.named_reference(*handle)?,
            RuntimeType::GenericParameter { position, .. } => TypeReference::GenericParameter {
                owner: GenericOwner::Type,
                position: *position,
            },
            RuntimeType::MethodGenericParameter { position, .. } => TypeReference::GenericParameter {
                owner: GenericOwner::Method,
                position: *position,
            },
            RuntimeType::Vector(element) => self.type_reference(element)?.vector(),
            RuntimeType::Array(element, rank) => TypeReference::Array {
                element: Box::new(self.type_reference(element)?),
                rank: *rank,
            },
            RuntimeType::Pointer(element) => self.type_reference(element)?.pointer(),
            RuntimeType::ByRef(element) => self.type_reference(element)?.by_ref(),
            RuntimeType::GenericInstance(definition, arguments) => self
                .named_reference(*definition)?
                .instantiate(
                    arguments
                        .iter()
                        .map(|argument| self.type_reference(argument))
                        .collect::<Result<_>>()?,
                ),
        })
    }

    fn named_reference(&self, handle: TypeHandle) -> Result<TypeReference> {
        if let Some(primitive) = corlib::primitive_of(handle) {
            return Ok(TypeReference::Primitive(primitive));
        }

        let (definition, scope) = match self.in_build(handle) {
            Some(builder) => {
                let definition = builder.type_builder(handle)?.definition().clone();
                let scope = ResolutionScope::Module(definition.module.clone());
                (definition, scope)
            }
            None => {
                let definition = self.domain.live_type(handle)?.as_ref().clone();
                let assembly = self.domain.assembly(handle.assembly)?;
                (definition, ResolutionScope::Assembly(assembly.assembly_name().clone()))
            }
        };
        let is_value_type = definition.base_type.as_ref().is_some_and(|base| {
            *base == RuntimeType::Type(corlib::VALUE_TYPE) || *base == RuntimeType::Type(corlib::ENUM)
        });
        Ok(match definition.declaring {
            Some(outer) => TypeReference::nested(self.named_reference(outer)?, definition.name, is_value_type),
            None => TypeReference::named(scope, definition.namespace, definition.name, is_value_type),
        })
    }
}

impl EnumResolver for SymbolResolver<'_> {
    fn enum_underlying_type(&self, type_name: &str) -> Result<PrimitiveType> {
        let ty = self.resolve_type_name(type_name)?;
        let handle = ty
            .definition()
            .ok_or_else(|| unresolved!("{} is not an enum", type_name))?;
        self.members(handle)?
            .get()
            .find_fields("value__")
            .into_iter()
            .find(|field| !field.is_static)
            .and_then(|field| field.field_type.definition())
            .and_then(corlib::primitive_of)
            .ok_or_else(|| unresolved!("{} is not an enum", type_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        emit::{LiveGenericParameter, LiveParameter},
        metadata::{
            definitions::{FieldAttributes, MethodAttributes, MethodImplAttributes, TypeAttributes},
            signatures::CallingConvention,
        },
    };
    use uguid::Guid;

    fn int32() -> RuntimeType {
        corlib::primitive_type(PrimitiveType::I4)
    }

    /// A build with `Ns.Box`1` (field `value: !0`, overloads `Put(!0)` and `Put(int)`) and
    /// its nested `Inner`.
    fn building(domain: &Domain) -> (AssemblyBuilder, TypeHandle, TypeHandle) {
        let mut builder = AssemblyBuilder::new(domain.reserve_id(), AssemblyName::new("Building"));
        let module = builder.define_module("Building.dll", Guid::ZERO);
        let boxed = builder
            .define_type(module, "Ns", "Box`1", TypeAttributes::PUBLIC, None)
            .unwrap();
        let inner = builder
            .define_type(module, "", "Inner", TypeAttributes::NESTED_PUBLIC, Some(boxed))
            .unwrap();
        builder
            .define_generic_parameters(boxed, vec![LiveGenericParameter::new("T")])
            .unwrap();
        let parameter = RuntimeType::GenericParameter {
            owner: boxed,
            position: 0,
        };
        builder
            .define_field(boxed, "value", FieldAttributes::PUBLIC, parameter.clone())
            .unwrap();
        for argument in [parameter, int32()] {
            let method = builder
                .define_method(boxed, "Put", MethodAttributes::PUBLIC, MethodImplAttributes::empty(), vec![])
                .unwrap();
            let signature = LiveSignature {
                has_this: true,
                convention: CallingConvention::Default,
                generic_arity: 0,
                return_type: corlib::primitive_type(PrimitiveType::Void),
                parameters: vec![argument],
            };
            builder
                .set_signature(method, signature, vec![LiveParameter::default()], LiveParameter::default())
                .unwrap();
        }
        (builder, boxed, inner)
    }

    fn box_reference() -> TypeReference {
        TypeReference::module_class("Building.dll", "Ns", "Box`1")
    }

    #[test]
    fn shapes_wrap_their_element() {
        let domain = Domain::new().unwrap();
        let (builder, boxed, inner) = building(&domain);
        let resolver = SymbolResolver::new(&domain).building(&builder);
        let context = GenericContext::of_type(boxed);

        let reference = box_reference().instantiate(vec![TypeReference::int32()]).vector();
        assert_eq!(
            resolver.resolve_type(&reference, &context).unwrap(),
            RuntimeType::GenericInstance(boxed, vec![int32()]).make_array(0)
        );

        let nested = TypeReference::nested(box_reference(), "Inner", false);
        assert_eq!(
            resolver.resolve_type(&nested.by_ref(), &context).unwrap(),
            RuntimeType::Type(inner).make_by_ref()
        );

        let parameter = TypeReference::GenericParameter {
            owner: GenericOwner::Type,
            position: 1,
        };
        assert!(matches!(
            resolver.resolve_type(&parameter, &context),
            Err(Error::UnresolvedSymbol(_))
        ));
    }

    #[test]
    fn unmodeled_shapes_fail_loudly() {
        let domain = Domain::new().unwrap();
        let resolver = SymbolResolver::new(&domain);
        let pointer = TypeReference::FunctionPointer(Box::new(MethodSignature::new_static(
            TypeReference::void(),
            vec![],
        )));
        assert!(matches!(
            resolver.resolve_type(&pointer, &GenericContext::default()),
            Err(Error::UnsupportedConstruction(_))
        ));
        assert!(matches!(
            resolver.resolve_type(&TypeReference::Sentinel, &GenericContext::default()),
            Err(Error::UnsupportedConstruction(_))
        ));
    }

    #[test]
    fn depth_is_bounded() {
        let domain = Domain::new().unwrap();
        let resolver = SymbolResolver::new(&domain).max_depth(4);
        let mut deep = TypeReference::int32();
        for _ in 0..5 {
            deep = deep.vector();
        }
        assert!(matches!(
            resolver.resolve_type(&deep, &GenericContext::default()),
            Err(Error::RecursionLimit(4))
        ));
    }

    #[test]
    fn overloads_resolve_exactly() {
        let domain = Domain::new().unwrap();
        let (builder, boxed, _) = building(&domain);
        let resolver = SymbolResolver::new(&domain).building(&builder);
        let context = GenericContext::of_type(boxed);
        let generic = TypeReference::GenericParameter {
            owner: GenericOwner::Type,
            position: 0,
        };

        let by_parameter = MethodReference::new(
            box_reference(),
            "Put",
            MethodSignature::new_instance(TypeReference::void(), vec![generic.clone()]),
        );
        assert_eq!(
            resolver.resolve_method(&by_parameter, &context).unwrap().handle,
            MethodHandle { declaring: boxed, index: 0 }
        );

        let by_int = MethodReference::new(
            box_reference(),
            "Put",
            MethodSignature::new_instance(TypeReference::void(), vec![TypeReference::int32()]),
        );
        assert_eq!(
            resolver.resolve_method(&by_int, &context).unwrap().handle,
            MethodHandle { declaring: boxed, index: 1 }
        );

        let by_object = MethodReference::new(
            box_reference(),
            "Put",
            MethodSignature::new_instance(TypeReference::void(), vec![TypeReference::object()]),
        );
        assert!(matches!(
            resolver.resolve_method(&by_object, &context),
            Err(Error::UnresolvedSymbol(_))
        ));

        let as_static = MethodReference::new(
            box_reference(),
            "Put",
            MethodSignature::new_static(TypeReference::void(), vec![TypeReference::int32()]),
        );
        assert!(resolver.resolve_method(&as_static, &context).is_err());

        let field = FieldReference::new(box_reference(), "value", generic);
        assert_eq!(resolver.resolve_field(&field, &context).unwrap().handle.index, 0);
    }

    #[test]
    fn external_assemblies_and_names() {
        let domain = Domain::new().unwrap();
        let resolver = SymbolResolver::new(&domain);
        let exception = TypeReference::external_class(AssemblyName::corlib(), "System", "Exception");
        let resolved = resolver.resolve_type(&exception, &GenericContext::default()).unwrap();
        assert_eq!(resolved, RuntimeType::Type(corlib::EXCEPTION));
        assert_eq!(resolver.resolve_type_name("System.Exception").unwrap(), resolved);
        assert_eq!(
            resolver.resolve_type_name("System.Exception, mscorlib").unwrap(),
            resolved
        );
        assert_eq!(resolver.type_reference(&resolved).unwrap(), exception);
        assert_eq!(
            resolver
                .type_reference(&corlib::primitive_type(PrimitiveType::I4).make_array(0))
                .unwrap(),
            TypeReference::int32().vector()
        );

        let missing = TypeReference::external_class(AssemblyName::new("Nowhere"), "N", "T");
        assert!(matches!(
            resolver.resolve_type(&missing, &GenericContext::default()),
            Err(Error::UnresolvedSymbol(_))
        ));
    }

    #[test]
    fn in_progress_types_use_module_scope() {
        let domain = Domain::new().unwrap();
        let (builder, boxed, inner) = building(&domain);
        let resolver = SymbolResolver::new(&domain).building(&builder);
        assert_eq!(
            resolver.type_reference(&RuntimeType::Type(boxed)).unwrap(),
            box_reference()
        );
        assert_eq!(
            resolver.type_reference(&RuntimeType::Type(inner)).unwrap(),
            TypeReference::nested(box_reference(), "Inner", false)
        );
        assert_eq!(
            resolver.resolve_type_name("Ns.Box`1+Inner").unwrap(),
            RuntimeType::Type(inner)
        );
    }

    #[test]
    fn member_types_walk_loaded_base_types() {
        let domain = Domain::new().unwrap();
        let resolver = SymbolResolver::new(&domain);
        let divide = corlib::Fault::DivideByZero.handle();
        assert_eq!(
            resolver.member_type(divide, true, "_message").unwrap(),
            Some(corlib::primitive_type(PrimitiveType::String))
        );
        assert_eq!(resolver.member_type(divide, true, "missing").unwrap(), None);
    }
}
