//! Building live assemblies from static ones.
//!
//! The [`StagedModuleBuilder`] walks a [`StaticAssembly`] once, declaring a shell for every
//! selected type (nested types right after their enclosing type) and queueing everything
//! else. The queues then drain in order:
//!
//! 1. resolve: generic parameters, base types, interfaces, constraints, fields, method
//!    signatures, properties and events
//! 2. metadata: custom attributes, declarative security, constants and method overrides
//! 3. body: method bodies
//!
//! so that no step ever sees a member whose owner is only partially known. Each pass starts
//! only once the previous one has finished for every type.

use log::debug;

use crate::{
    emit::{
        AssemblyBuilder, AttributeTarget, LiveEvent, LiveGenericParameter, LiveParameter,
        LiveProperty, LiveSignature, LoadedAssembly, MethodHandle, RuntimeType, SecurityTarget,
        TypeHandle,
    },
    instrument::{
        attributes::AttributeTranslator,
        passes::{DeferredActions, Phase},
        resolver::{GenericContext, SymbolResolver, MAX_RESOLUTION_DEPTH},
        transcoder::Transcoder,
        TypeFilter,
    },
    metadata::{
        customattributes::CustomAttribute,
        definitions::{
            GenericParameterDefinition, MethodDefinition, ParameterDefinition, StaticAssembly,
            TypeDefinition,
        },
        security::SecurityDeclaration,
    },
    runtime::Domain,
    Result,
};

/// Mutable state shared by every deferred action of one build.
struct BuildState<'a> {
    domain: &'a Domain,
    builder: AssemblyBuilder,
    max_depth: usize,
}

type Queues<'a> = DeferredActions<'a, BuildState<'a>>;

impl BuildState<'_> {
    fn resolver(&self) -> SymbolResolver<'_> {
        SymbolResolver::new(self.domain)
            .building(&self.builder)
            .max_depth(self.max_depth)
    }

    fn attach(&mut self, target: AttributeTarget, attributes: &[CustomAttribute]) -> Result<()> {
        if attributes.is_empty() {
            return Ok(());
        }
        let live = {
            let resolver = self.resolver();
            AttributeTranslator::new(&resolver).translate_all(attributes)?
        };
        for attribute in live {
            self.builder.set_custom_attribute(target, attribute)?;
        }
        Ok(())
    }

    fn secure(&mut self, target: SecurityTarget, declarations: &[SecurityDeclaration]) -> Result<()> {
        for declaration in declarations {
            if declaration.action.is_request() && target == SecurityTarget::Assembly {
                self.builder.add_permission_request(declaration)?;
            } else {
                self.builder.add_declarative_security(target, declaration.clone())?;
            }
        }
        Ok(())
    }

    fn generic_parameters(definitions: &[GenericParameterDefinition]) -> Vec<LiveGenericParameter> {
        definitions
            .iter()
            .map(|definition| LiveGenericParameter {
                attributes: definition.attributes,
                ..LiveGenericParameter::new(definition.name.clone())
            })
            .collect()
    }

    /// Split constraints into the class constraint and interface constraints.
    fn constraints(
        &self,
        definition: &GenericParameterDefinition,
        context: &GenericContext,
    ) -> Result<(Option<RuntimeType>, Vec<RuntimeType>)> {
        let resolver = self.resolver();
        let mut base = None;
        let mut interfaces = Vec::new();
        for constraint in &definition.constraints {
            let ty = resolver.resolve_type(constraint, context)?;
            if resolver.is_interface(&ty)? {
                interfaces.push(ty);
            } else {
                base = Some(ty);
            }
        }
        Ok((base, interfaces))
    }
}

fn live_parameter(definition: &ParameterDefinition) -> LiveParameter {
    LiveParameter {
        name: definition.name.clone(),
        attributes: definition.attributes,
        ..LiveParameter::default()
    }
}

/// Builds a live assembly from a static one through three ordered passes.
pub struct StagedModuleBuilder<'a> {
    domain: &'a Domain,
    source: &'a StaticAssembly,
    filter: &'a TypeFilter,
    max_depth: usize,
}

impl<'a> StagedModuleBuilder<'a> {
    /// Build the types of `source` selected by `filter` into `domain`.
    #[must_use]
    pub fn new(domain: &'a Domain, source: &'a StaticAssembly, filter: &'a TypeFilter) -> Self {
        StagedModuleBuilder {
            domain,
            source,
            filter,
            max_depth: MAX_RESOLUTION_DEPTH,
        }
    }

    /// Bound the nesting depth of type references, see [`SymbolResolver::max_depth`].
    #[must_use]
    pub fn max_resolution_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Run every pass and seal the result. Nothing is registered with the domain.
    ///
    /// # Errors
    /// Returns the first error of any pass; the partial build is dropped.
    pub fn build(self) -> Result<LoadedAssembly> {
        let source = self.source;
        let mut state = BuildState {
            domain: self.domain,
            builder: AssemblyBuilder::new(self.domain.reserve_id(), source.name.clone()),
            max_depth: self.max_depth,
        };
        let mut queues: Queues<'a> = DeferredActions::new();

        for module in &source.modules {
            let index = state.builder.define_module(module.name.clone(), module.mvid);
            for resource in &module.resources {
                state.builder.add_resource(index, resource.clone())?;
            }
            for ty in module.types.iter().filter(|ty| self.filter.matches(ty)) {
                declare(&mut state, &mut queues, index, ty, None)?;
            }
            queues.defer(Phase::Metadata, move |state: &mut BuildState<'a>, _| {
                state.attach(AttributeTarget::Module(index), &module.custom_attributes)
            })?;
        }
        queues.defer(Phase::Metadata, move |state: &mut BuildState<'a>, _| {
            state.attach(AttributeTarget::Assembly, &source.custom_attributes)?;
            state.secure(SecurityTarget::Assembly, &source.security)
        })?;

        debug!(
            "Building {}: {} type(s) declared",
            source.name.name,
            state.builder.type_count()
        );
        queues.run(&mut state)?;
        state.builder.seal()
    }
}

/// Declare the shell of `ty` and its nested types, and queue the rest.
fn declare<'a>(
    state: &mut BuildState<'a>,
    queues: &mut Queues<'a>,
    module: usize,
    ty: &'a TypeDefinition,
    declaring: Option<TypeHandle>,
) -> Result<()> {
    let handle = state
        .builder
        .define_type(module, &ty.namespace, &ty.name, ty.attributes, declaring)?;
    state.builder.set_layout(handle, ty.packing_size, ty.class_size)?;
    for nested in &ty.nested_types {
        declare(state, queues, module, nested, Some(handle))?;
    }
    queues.defer(Phase::Resolve, move |state: &mut BuildState<'a>, queues| {
        resolve_type(state, queues, handle, ty)
    })
}

fn resolve_type<'a>(
    state: &mut BuildState<'a>,
    queues: &mut Queues<'a>,
    handle: TypeHandle,
    ty: &'a TypeDefinition,
) -> Result<()> {
    let context = GenericContext::of_type(handle);
    if !ty.generic_parameters.is_empty() {
        state
            .builder
            .define_generic_parameters(handle, BuildState::generic_parameters(&ty.generic_parameters))?;
    }

    let (base, interfaces) = {
        let resolver = state.resolver();
        let base = ty
            .base_type
            .as_ref()
            .map(|base| resolver.resolve_type(base, &context))
            .transpose()?;
        let interfaces = ty
            .interfaces
            .iter()
            .map(|interface| resolver.resolve_type(interface, &context))
            .collect::<Result<Vec<_>>>()?;
        (base, interfaces)
    };
    state.builder.set_parent(handle, base)?;
    for interface in interfaces {
        state.builder.add_interface(handle, interface)?;
    }
    for (position, parameter) in ty.generic_parameters.iter().enumerate() {
        let (base, interfaces) = state.constraints(parameter, &context)?;
        state.builder.set_generic_constraints(
            AttributeTarget::TypeGenericParameter(handle, position),
            base,
            interfaces,
        )?;
    }

    for field in &ty.fields {
        let field_type = state.resolver().resolve_type(&field.field_type, &context)?;
        let live = state
            .builder
            .define_field(handle, &field.name, field.attributes, field_type)?;
        queues.defer(Phase::Metadata, move |state: &mut BuildState<'a>, _| {
            if let Some(constant) = &field.constant {
                state.builder.set_field_constant(live, constant.clone())?;
            }
            state.attach(AttributeTarget::Field(live), &field.custom_attributes)
        })?;
    }

    for method in &ty.methods {
        define_method(state, queues, handle, method)?;
    }

    for property in &ty.properties {
        let (property_type, parameters) = {
            let resolver = state.resolver();
            let property_type = resolver.resolve_type(&property.property_type, &context)?;
            let parameters = property
                .parameters
                .iter()
                .map(|parameter| resolver.resolve_type(parameter, &context))
                .collect::<Result<Vec<_>>>()?;
            (property_type, parameters)
        };
        let accessor = |index: usize| MethodHandle {
            declaring: handle,
            index: index as u32,
        };
        let index = state.builder.define_property(
            handle,
            LiveProperty {
                name: property.name.clone(),
                attributes: property.attributes,
                property_type,
                parameters,
                getter: property.getter.map(accessor),
                setter: property.setter.map(accessor),
                others: property.others.iter().copied().map(accessor).collect(),
                constant: None,
                custom_attributes: Vec::new(),
            },
        )?;
        queues.defer(Phase::Metadata, move |state: &mut BuildState<'a>, _| {
            if let Some(constant) = &property.constant {
                state.builder.set_property_constant(handle, index, constant.clone())?;
            }
            state.attach(AttributeTarget::Property(handle, index), &property.custom_attributes)
        })?;
    }

    for event in &ty.events {
        let event_type = state.resolver().resolve_type(&event.event_type, &context)?;
        let accessor = |index: usize| MethodHandle {
            declaring: handle,
            index: index as u32,
        };
        let index = state.builder.define_event(
            handle,
            LiveEvent {
                name: event.name.clone(),
                attributes: event.attributes,
                event_type,
                add: event.add.map(accessor),
                remove: event.remove.map(accessor),
                raise: event.raise.map(accessor),
                others: event.others.iter().copied().map(accessor).collect(),
                custom_attributes: Vec::new(),
            },
        )?;
        queues.defer(Phase::Metadata, move |state: &mut BuildState<'a>, _| {
            state.attach(AttributeTarget::Event(handle, index), &event.custom_attributes)
        })?;
    }

    queues.defer(Phase::Metadata, move |state: &mut BuildState<'a>, _| {
        state.attach(AttributeTarget::Type(handle), &ty.custom_attributes)?;
        state.secure(SecurityTarget::Type(handle), &ty.security)?;
        for (position, parameter) in ty.generic_parameters.iter().enumerate() {
            state.attach(
                AttributeTarget::TypeGenericParameter(handle, position),
                &parameter.custom_attributes,
            )?;
        }
        Ok(())
    })
}

/// Declare `method` with its signature and queue its metadata and body.
fn define_method<'a>(
    state: &mut BuildState<'a>,
    queues: &mut Queues<'a>,
    ty: TypeHandle,
    method: &'a MethodDefinition,
) -> Result<()> {
    let handle = state.builder.define_method(
        ty,
        &method.name,
        method.attributes,
        method.impl_attributes,
        BuildState::generic_parameters(&method.generic_parameters),
    )?;
    let context = GenericContext::of_method(handle);

    let signature: LiveSignature = state.resolver().resolve_signature(&method.signature, &context)?;
    let parameters = (0..signature.parameters.len())
        .map(|position| match method.parameters.get(position) {
            Some(parameter) => live_parameter(parameter),
            None => LiveParameter {
                name: format!("arg{position}"),
                ..LiveParameter::default()
            },
        })
        .collect();
    let argument_count = signature.parameters.len() + usize::from(signature.has_this);
    state.builder.set_signature(
        handle,
        signature,
        parameters,
        live_parameter(&method.return_parameter),
    )?;
    for (position, parameter) in method.generic_parameters.iter().enumerate() {
        let (base, interfaces) = state.constraints(parameter, &context)?;
        state.builder.set_generic_constraints(
            AttributeTarget::MethodGenericParameter(handle, position),
            base,
            interfaces,
        )?;
    }

    queues.defer(Phase::Metadata, move |state: &mut BuildState<'a>, _| {
        state.attach(AttributeTarget::Method(handle), &method.custom_attributes)?;
        state.secure(SecurityTarget::Method(handle), &method.security)?;
        for (position, parameter) in method.parameters.iter().enumerate() {
            if let Some(constant) = &parameter.constant {
                state.builder.set_parameter_constant(handle, Some(position), constant.clone())?;
            }
            state.attach(AttributeTarget::Parameter(handle, position), &parameter.custom_attributes)?;
        }
        if let Some(constant) = &method.return_parameter.constant {
            state.builder.set_parameter_constant(handle, None, constant.clone())?;
        }
        state.attach(
            AttributeTarget::ReturnParameter(handle),
            &method.return_parameter.custom_attributes,
        )?;
        for (position, parameter) in method.generic_parameters.iter().enumerate() {
            state.attach(
                AttributeTarget::MethodGenericParameter(handle, position),
                &parameter.custom_attributes,
            )?;
        }

        let overrides = {
            let resolver = state.resolver();
            method
                .overrides
                .iter()
                .map(|declaration| resolver.resolve_method(declaration, &context))
                .collect::<Result<Vec<_>>>()?
        };
        for declaration in overrides {
            state.builder.define_method_override(handle, declaration)?;
        }
        Ok(())
    })?;

    if let Some(body) = &method.body {
        let argument_count = u16::try_from(argument_count)
            .map_err(|_| malformed_error!("{} takes too many arguments", method.name))?;
        queues.defer(Phase::Body, move |state: &mut BuildState<'a>, _| {
            let live = {
                let resolver = state.resolver();
                Transcoder::new(&resolver, context).transcode(body, argument_count)?
            };
            state.builder.set_body(handle, live)
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        disassembler::OpCode,
        emit::RuntimeMethod,
        metadata::{
            definitions::{
                FieldAttributes, FieldDefinition, MethodAttributes, PropertyDefinition, TypeAttributes,
            },
            members::{FieldReference, MethodReference},
            method::{Instruction, MethodBody, Operand},
            signatures::MethodSignature,
            typesystem::{AssemblyName, TypeReference},
        },
        runtime::Value,
        Error,
    };

    const MODULE: &str = "Staged.dll";

    fn counter() -> TypeReference {
        TypeReference::module_class(MODULE, "Staged", "Counter")
    }

    /// `Staged.Counter` with a static field, `Bump(int)` calling `Add` and a property.
    fn sample() -> StaticAssembly {
        let mut assembly = StaticAssembly::new(AssemblyName::new("Staged"));
        let mut ty = TypeDefinition::new("Staged", "Counter", TypeAttributes::PUBLIC)
            .extends(TypeReference::object());
        ty.fields.push(FieldDefinition::new(
            "total",
            FieldAttributes::PRIVATE | FieldAttributes::STATIC,
            TypeReference::int32(),
        ));

        let total = FieldReference::new(counter(), "total", TypeReference::int32());
        let add = MethodReference::new(
            counter(),
            "Add",
            MethodSignature::new_static(TypeReference::int32(), vec![TypeReference::int32(), TypeReference::int32()]),
        );
        let statics = MethodAttributes::PUBLIC | MethodAttributes::STATIC;
        ty.methods.push(
            MethodDefinition::new(
                "Add",
                statics,
                MethodSignature::new_static(TypeReference::int32(), vec![TypeReference::int32(), TypeReference::int32()]),
            )
            .with_body(
                MethodBody::new()
                    .push(Instruction::load_argument(0))
                    .push(Instruction::load_argument(1))
                    .push(Instruction::simple(OpCode::Add))
                    .push(Instruction::simple(OpCode::Ret)),
            ),
        );
        ty.methods.push(
            MethodDefinition::new(
                "Bump",
                statics,
                MethodSignature::new_static(TypeReference::int32(), vec![TypeReference::int32()]),
            )
            .with_body(
                MethodBody::new()
                    .push(Instruction::new(OpCode::Ldsfld, Operand::Field(total.clone())))
                    .push(Instruction::load_argument(0))
                    .push(Instruction::new(OpCode::Call, Operand::Method(add)))
                    .push(Instruction::simple(OpCode::Dup))
                    .push(Instruction::new(OpCode::Stsfld, Operand::Field(total.clone())))
                    .push(Instruction::simple(OpCode::Ret)),
            ),
        );
        ty.methods.push(
            MethodDefinition::new(
                "get_Total",
                statics | MethodAttributes::SPECIAL_NAME,
                MethodSignature::new_static(TypeReference::int32(), vec![]),
            )
            .with_body(
                MethodBody::new()
                    .push(Instruction::new(OpCode::Ldsfld, Operand::Field(total)))
                    .push(Instruction::simple(OpCode::Ret)),
            ),
        );
        let mut property = PropertyDefinition::new("Total", TypeReference::int32());
        property.has_this = false;
        property.getter = Some(2);
        ty.properties.push(property);

        assembly.main_module_mut().unwrap().types.push(ty);
        assembly
    }

    #[test]
    fn built_methods_run() {
        let domain = Domain::new().unwrap();
        let assembly = domain.load_static(&sample()).unwrap();
        let ty = assembly.find_type("Staged.Counter").unwrap();
        assert_eq!(ty.properties[0].getter, Some(MethodHandle { declaring: ty.handle, index: 2 }));

        let bump = domain.find_method("Staged", "Staged.Counter", "Bump").unwrap();
        let run = |value| domain.invoke(&RuntimeMethod::plain(bump), None, vec![Value::I4(value)]).unwrap();
        assert_eq!(run(5), Some(Value::I4(5)));
        assert_eq!(run(7), Some(Value::I4(12)));
    }

    #[test]
    fn filtered_types_are_skipped() {
        let domain = Domain::new().unwrap();
        let source = sample();
        let filter = TypeFilter::name_contains("Nothing");
        let live = StagedModuleBuilder::new(&domain, &source, &filter).build().unwrap();
        assert!(live.types().is_empty());
    }

    #[test]
    fn unresolved_bodies_fail_the_build() {
        let domain = Domain::new().unwrap();
        let mut source = sample();
        let ty = &mut source.main_module_mut().unwrap().types[0];
        ty.methods[1].body = Some(
            MethodBody::new()
                .push(Instruction::new(
                    OpCode::Call,
                    Operand::Method(MethodReference::new(
                        counter(),
                        "Missing",
                        MethodSignature::new_static(TypeReference::void(), vec![]),
                    )),
                ))
                .push(Instruction::simple(OpCode::Ret)),
        );
        assert!(matches!(domain.load_static(&source), Err(Error::UnresolvedSymbol(_))));
        assert!(domain.assembly_by_name("Staged").is_none());
    }

    #[test]
    fn later_siblings_resolve() {
        use crate::emit::RuntimeType;

        let back = TypeReference::module_class("Forward.dll", "Staged", "Back");
        let statics = MethodAttributes::PUBLIC | MethodAttributes::STATIC;
        let seven = MethodSignature::new_static(TypeReference::int32(), vec![]);

        // Front extends, stores and calls Back, which is declared after it.
        let mut front = TypeDefinition::new("Staged", "Front", TypeAttributes::PUBLIC).extends(back.clone());
        front
            .fields
            .push(FieldDefinition::new("next", FieldAttributes::PUBLIC, back.clone()));
        front.methods.push(
            MethodDefinition::new("Go", statics, seven.clone()).with_body(
                MethodBody::new()
                    .push(Instruction::new(
                        OpCode::Call,
                        Operand::Method(MethodReference::new(back, "Seven", seven.clone())),
                    ))
                    .push(Instruction::simple(OpCode::Ret)),
            ),
        );
        let mut later = TypeDefinition::new("Staged", "Back", TypeAttributes::PUBLIC).extends(TypeReference::object());
        later.methods.push(
            MethodDefinition::new("Seven", statics, seven).with_body(
                MethodBody::new()
                    .push(Instruction::load_int32(7))
                    .push(Instruction::simple(OpCode::Ret)),
            ),
        );

        let mut source = StaticAssembly::new(AssemblyName::new("Forward"));
        let module = source.main_module_mut().unwrap();
        module.types.push(front);
        module.types.push(later);

        let domain = Domain::new().unwrap();
        let assembly = domain.load_static(&source).unwrap();
        let front = assembly.find_type("Staged.Front").unwrap();
        let back = RuntimeType::Type(assembly.find_type("Staged.Back").unwrap().handle);
        assert_eq!(front.base_type, Some(back.clone()));
        assert_eq!(front.fields[0].field_type, back);

        let go = domain.find_method("Forward", "Staged.Front", "Go").unwrap();
        assert_eq!(
            domain.invoke(&RuntimeMethod::plain(go), None, vec![]).unwrap(),
            Some(Value::I4(7))
        );
    }
}
