//! Call redirection through stub slots.
//!
//! Weaving rewrites a static module in place. Every selected method with a body gets two
//! companions in its declaring type:
//!
//! - a private static stub slot of type `IInterceptor[]`, `null` while nothing is registered
//! - a private target method holding the original body
//!
//! and its own body is replaced by a redirect:
//!
//! ```text
//!         ldsfld   <Stub>M#i
//!         brtrue   SLOW
//!         ldarg.*  (this, then every parameter)
//!         tail.
//!         call     <Target>M#i
//! EXIT:   ret
//! SLOW:   box the arguments into an object[], build an Invocation, call Proceed,
//!         copy by-ref arguments back, unbox the return value
//!         br       EXIT
//! ```
//!
//! Both paths leave the same stack behind and meet at the single `ret`.

use log::{debug, trace};

use crate::{
    disassembler::OpCode,
    instrument::TypeFilter,
    metadata::{
        definitions::{
            FieldAttributes, FieldDefinition, MethodAttributes, MethodDefinition, ParameterDefinition,
            StaticAssembly, StaticModule, TypeDefinition,
        },
        members::{FieldReference, MemberReference, MethodReference},
        method::{Instruction, MethodBody, Operand},
        signatures::{CallingConvention, MethodSignature},
        typesystem::{AssemblyName, GenericOwner, PrimitiveType, ResolutionScope, TypeReference},
    },
    runtime::{
        corlib::{INTERCEPTOR_TYPE_NAME, INVOCATION_TYPE_NAME, SUPPORT_NAME},
        stub_field_name, target_method_name,
    },
    Error, Result,
};

const TARGET_PREFIX: &str = "<Target>";

fn support_type(name: &str) -> TypeReference {
    TypeReference::external_class(AssemblyName::new(SUPPORT_NAME), SUPPORT_NAME, name)
}

fn interceptor_array() -> TypeReference {
    support_type(INTERCEPTOR_TYPE_NAME).vector()
}

fn invocation() -> TypeReference {
    support_type(INVOCATION_TYPE_NAME)
}

fn runtime_method_handle() -> TypeReference {
    TypeReference::named(
        ResolutionScope::Assembly(AssemblyName::corlib()),
        "System",
        "RuntimeMethodHandle",
        true,
    )
}

fn invocation_method(name: &str, return_type: TypeReference, parameters: Vec<TypeReference>) -> MethodReference {
    MethodReference::new(invocation(), name, MethodSignature::new_instance(return_type, parameters))
}

/// `true` for parameter and return types the slow path can move through an `object[]`.
fn marshalable(ty: &TypeReference) -> bool {
    match ty {
        TypeReference::Pointer(_)
        | TypeReference::FunctionPointer(_)
        | TypeReference::Pinned(_)
        | TypeReference::Sentinel
        | TypeReference::Primitive(PrimitiveType::TypedByRef) => false,
        TypeReference::ByRef(element) => !element.is_by_ref() && marshalable(element),
        TypeReference::ModifierRequired { element, .. } | TypeReference::ModifierOptional { element, .. } => {
            marshalable(element)
        }
        _ => true,
    }
}

/// `true` if `method` of `ty` can be woven.
///
/// Constructors, bodiless and vararg methods, methods of interfaces, earlier target methods
/// and methods moving pointers are left alone.
#[must_use]
pub fn is_weavable(ty: &TypeDefinition, method: &MethodDefinition) -> bool {
    !ty.is_interface()
        && !method.is_constructor()
        && method.body.is_some()
        && !method.name.starts_with(TARGET_PREFIX)
        && method.signature.convention == CallingConvention::Default
        && !method.signature.explicit_this
        && method.signature.parameters.iter().all(marshalable)
        && (method.signature.return_type.is_void()
            || (!method.signature.return_type.is_by_ref() && marshalable(&method.signature.return_type)))
}

/// Weave every selected type of `assembly`, returning the number of methods woven.
///
/// On error the assembly is left partially woven; weave a clone when that matters.
///
/// # Errors
/// Returns [`Error::InvalidOperation`] if a method was already woven.
pub fn weave(assembly: &mut StaticAssembly, filter: &TypeFilter) -> Result<usize> {
    let mut woven = 0;
    for module in &mut assembly.modules {
        woven += weave_module(module, filter)?;
    }
    debug!("Wove {} method(s) in {}", woven, assembly.name.name);
    Ok(woven)
}

/// Weave every selected type of one module, nested types included.
///
/// # Errors
/// See [`weave`].
pub fn weave_module(module: &mut StaticModule, filter: &TypeFilter) -> Result<usize> {
    let mut woven = 0;
    for ty in &mut module.types {
        if filter.matches(ty) {
            woven += weave_type(&module.name, ty, None)?;
        } else {
            trace!("Skipping {}", ty.full_name());
        }
    }
    Ok(woven)
}

fn weave_type(module: &str, ty: &mut TypeDefinition, declaring: Option<&TypeReference>) -> Result<usize> {
    let definition = ty.reference(module, declaring);
    let mut woven = 0;
    for nested in &mut ty.nested_types {
        woven += weave_type(module, nested, Some(&definition))?;
    }

    let this_type = ty.self_reference(module, declaring);
    let is_value_type = ty.is_value_type();
    for index in 0..ty.methods.len() {
        if !is_weavable(ty, &ty.methods[index]) {
            trace!("{}::{} is not weavable", ty.full_name(), ty.methods[index].name);
            continue;
        }
        let name = ty.methods[index].name.clone();
        let stub_name = stub_field_name(&name, index);
        if ty.field(&stub_name).is_some() {
            return Err(invalid_operation!("{}::{} is already woven", ty.full_name(), name));
        }

        ty.fields.push(FieldDefinition::new(
            stub_name.clone(),
            FieldAttributes::PRIVATE | FieldAttributes::STATIC,
            interceptor_array(),
        ));
        let target = split_target(&mut ty.methods[index], index);
        let redirect = Redirect {
            this_type: &this_type,
            is_value_type,
            method: &ty.methods[index],
            stub: FieldReference::new(this_type.clone(), stub_name, interceptor_array()),
            target: target_reference(&this_type, &target),
        };
        let body = redirect.body();
        ty.methods[index].body = Some(body);
        ty.methods.push(target);

        debug!("Woven {}::{}", ty.full_name(), name);
        woven += 1;
    }
    Ok(woven)
}

/// Move the body of `method` into a private, non-virtual clone.
fn split_target(method: &mut MethodDefinition, index: usize) -> MethodDefinition {
    let stripped = MethodAttributes::ACCESS_MASK
        | MethodAttributes::VIRTUAL
        | MethodAttributes::NEW_SLOT
        | MethodAttributes::ABSTRACT
        | MethodAttributes::FINAL
        | MethodAttributes::SPECIAL_NAME
        | MethodAttributes::RT_SPECIAL_NAME;
    let plain = |parameter: &ParameterDefinition| ParameterDefinition {
        name: parameter.name.clone(),
        attributes: parameter.attributes,
        ..ParameterDefinition::default()
    };

    MethodDefinition {
        name: target_method_name(&method.name, index),
        attributes: (method.attributes - stripped) | MethodAttributes::PRIVATE | MethodAttributes::HIDE_BY_SIG,
        impl_attributes: method.impl_attributes,
        signature: method.signature.clone(),
        parameters: method.parameters.iter().map(plain).collect(),
        return_parameter: ParameterDefinition::default(),
        generic_parameters: method.generic_parameters.clone(),
        overrides: Vec::new(),
        body: method.body.take(),
        custom_attributes: Vec::new(),
        security: Vec::new(),
    }
}

fn target_reference(this_type: &TypeReference, target: &MethodDefinition) -> MethodReference {
    let reference = MethodReference::new(this_type.clone(), target.name.clone(), target.signature.clone());
    if target.generic_parameters.is_empty() {
        return reference;
    }
    reference.instantiate(
        (0..target.generic_parameters.len())
            .map(|position| TypeReference::GenericParameter {
                owner: GenericOwner::Method,
                position: u16::try_from(position).unwrap_or(u16::MAX),
            })
            .collect(),
    )
}

/// The redirect body of one woven method.
struct Redirect<'m> {
    this_type: &'m TypeReference,
    is_value_type: bool,
    method: &'m MethodDefinition,
    stub: FieldReference,
    target: MethodReference,
}

impl Redirect<'_> {
    const ARGUMENTS: u16 = 0;
    const INVOCATION: u16 = 1;
    const BOXED_THIS: u16 = 2;

    /// Value-type receivers travel boxed and are copied back after the chain.
    fn boxes_this(&self) -> bool {
        self.is_value_type && self.method.signature.has_this
    }

    fn first_parameter(&self) -> u16 {
        u16::from(self.method.signature.has_this)
    }

    fn parameters(&self) -> impl Iterator<Item = (u16, i32, &TypeReference)> + '_ {
        let first = self.first_parameter();
        self.method
            .signature
            .parameters
            .iter()
            .enumerate()
            .map(move |(position, ty)| (first + position as u16, position as i32, ty))
    }

    fn body(&self) -> MethodBody {
        let fast = self.fast_path();
        let exit = 2 + fast.len();
        let slow_start = exit + 1;

        let argument_count = self.method.signature.parameters.len() + usize::from(self.method.signature.has_this);
        let mut body = MethodBody::new()
            .max_stack(u16::try_from(argument_count.max(5)).unwrap_or(u16::MAX))
            .local(TypeReference::object().vector())
            .local(invocation());
        if self.boxes_this() {
            body = body.local(TypeReference::object());
        }
        body.push(Instruction::new(OpCode::Ldsfld, Operand::Field(self.stub.clone())))
            .push(Instruction::new(OpCode::Brtrue, Operand::Target(slow_start)))
            .extend(fast)
            .push(Instruction::simple(OpCode::Ret))
            .extend(self.slow_path())
            .push(Instruction::new(OpCode::Br, Operand::Target(exit)))
    }

    /// Arguments straight into the target, as a tail call.
    fn fast_path(&self) -> Vec<Instruction> {
        let mut code: Vec<Instruction> = Vec::new();
        if self.method.signature.has_this {
            code.push(Instruction::load_argument(0));
        }
        code.extend(self.parameters().map(|(argument, _, _)| Instruction::load_argument(argument)));
        code.push(Instruction::simple(OpCode::Tail));
        code.push(Instruction::new(OpCode::Call, Operand::Method(self.target.clone())));
        code
    }

    /// Arguments through an `Invocation` and its interceptor chain.
    fn slow_path(&self) -> Vec<Instruction> {
        let count = self.method.signature.parameters.len();
        let mut code = vec![
            Instruction::load_int32(i32::try_from(count).unwrap_or(i32::MAX)),
            Instruction::new(OpCode::Newarr, Operand::Type(TypeReference::object())),
            Instruction::store_local(Self::ARGUMENTS),
        ];
        for (argument, position, ty) in self.parameters() {
            code.push(Instruction::load_local(Self::ARGUMENTS));
            code.push(Instruction::load_int32(position));
            code.push(Instruction::load_argument(argument));
            let value_type = match ty {
                TypeReference::ByRef(element) => {
                    code.push(Instruction::new(OpCode::Ldobj, Operand::Type((**element).clone())));
                    element
                }
                other => other,
            };
            if value_type.needs_boxing() {
                code.push(Instruction::new(OpCode::Box, Operand::Type(value_type.clone())));
            }
            code.push(Instruction::simple(OpCode::StelemRef));
        }

        code.push(Instruction::new(OpCode::Ldsfld, Operand::Field(self.stub.clone())));
        if self.method.signature.has_this {
            code.push(Instruction::load_argument(0));
            if self.is_value_type {
                code.push(Instruction::new(OpCode::Ldobj, Operand::Type(self.this_type.clone())));
                code.push(Instruction::new(OpCode::Box, Operand::Type(self.this_type.clone())));
                code.push(Instruction::simple(OpCode::Dup));
                code.push(Instruction::store_local(Self::BOXED_THIS));
            }
        } else {
            code.push(Instruction::simple(OpCode::Ldnull));
        }
        code.push(Instruction::load_local(Self::ARGUMENTS));
        code.push(Instruction::new(
            OpCode::Ldtoken,
            Operand::Token(MemberReference::Method(self.target.clone())),
        ));
        code.push(Instruction::new(
            OpCode::Newobj,
            Operand::Method(invocation_method(
                ".ctor",
                TypeReference::void(),
                vec![
                    interceptor_array(),
                    TypeReference::object(),
                    TypeReference::object().vector(),
                    runtime_method_handle(),
                ],
            )),
        ));
        code.push(Instruction::store_local(Self::INVOCATION));
        code.push(Instruction::load_local(Self::INVOCATION));
        code.push(Instruction::new(
            OpCode::Callvirt,
            Operand::Method(invocation_method("Proceed", TypeReference::void(), vec![])),
        ));

        if self.boxes_this() {
            code.push(Instruction::load_argument(0));
            code.push(Instruction::load_local(Self::BOXED_THIS));
            code.push(Instruction::new(OpCode::UnboxAny, Operand::Type(self.this_type.clone())));
            code.push(Instruction::new(OpCode::Stobj, Operand::Type(self.this_type.clone())));
        }

        for (argument, position, ty) in self.parameters() {
            let TypeReference::ByRef(element) = ty else {
                continue;
            };
            code.push(Instruction::load_argument(argument));
            code.push(Instruction::load_local(Self::ARGUMENTS));
            code.push(Instruction::load_int32(position));
            code.push(Instruction::simple(OpCode::LdelemRef));
            code.push(Instruction::new(OpCode::UnboxAny, Operand::Type((**element).clone())));
            code.push(Instruction::new(OpCode::Stobj, Operand::Type((**element).clone())));
        }

        let return_type = &self.method.signature.return_type;
        if !return_type.is_void() {
            code.push(Instruction::load_local(Self::INVOCATION));
            code.push(Instruction::new(
                OpCode::Callvirt,
                Operand::Method(invocation_method("get_ReturnValue", TypeReference::object(), vec![])),
            ));
            code.push(Instruction::new(OpCode::UnboxAny, Operand::Type(return_type.clone())));
        }
        code
    }
}

/// Count of instructions on the fast path of a woven body: from the entry up to and
/// including the shared `ret`.
///
/// # Errors
/// Returns [`Error::NotInterceptable`] if `body` does not start with a stub check.
pub fn fast_path_length(body: &MethodBody) -> Result<usize> {
    match body.instructions.get(..2) {
        Some([load, branch]) if load.opcode == OpCode::Ldsfld && branch.opcode == OpCode::Brtrue => {
            let Operand::Target(slow) = branch.operand else {
                return Err(Error::NotInterceptable("Stub check without a target".to_string()));
            };
            Ok(slow)
        }
        _ => Err(Error::NotInterceptable("Body does not start with a stub check".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::definitions::TypeAttributes;

    fn sample() -> StaticModule {
        let mut ty = TypeDefinition::new("Samples", "C", TypeAttributes::PUBLIC).extends(TypeReference::object());
        ty.methods.push(MethodDefinition::constructor(MethodAttributes::PUBLIC, vec![]).with_body(
            MethodBody::new().push(Instruction::simple(OpCode::Ret)),
        ));
        ty.methods.push(
            MethodDefinition::new(
                "M",
                MethodAttributes::PUBLIC | MethodAttributes::VIRTUAL,
                MethodSignature::new_instance(TypeReference::int32(), vec![TypeReference::int32()]),
            )
            .with_body(
                MethodBody::new()
                    .push(Instruction::load_argument(1))
                    .push(Instruction::load_int32(1))
                    .push(Instruction::simple(OpCode::Add))
                    .push(Instruction::simple(OpCode::Ret)),
            ),
        );
        ty.methods.push(MethodDefinition::new(
            "Pointer",
            MethodAttributes::PUBLIC | MethodAttributes::STATIC,
            MethodSignature::new_static(TypeReference::void(), vec![TypeReference::int32().pointer()]),
        ).with_body(MethodBody::new().push(Instruction::simple(OpCode::Ret))));

        let mut module = StaticModule::new("Samples.dll");
        module.types.push(ty);
        module
    }

    #[test]
    fn weaving_adds_stub_and_target() {
        let mut module = sample();
        assert_eq!(weave_module(&mut module, &TypeFilter::all()).unwrap(), 1);

        let ty = &module.types[0];
        let stub = ty.field(&stub_field_name("M", 1)).unwrap();
        assert!(stub.is_static());
        assert_eq!(stub.field_type, interceptor_array());

        let target_name = target_method_name("M", 1);
        let target = ty.methods_named(&target_name).next().unwrap();
        assert!(!target.attributes.contains(MethodAttributes::VIRTUAL));
        assert_eq!(target.attributes & MethodAttributes::ACCESS_MASK, MethodAttributes::PRIVATE);
        assert_eq!(target.body.as_ref().unwrap().instructions.len(), 4);

        let woven = &ty.methods[1];
        assert!(woven.attributes.contains(MethodAttributes::VIRTUAL));
        let body = woven.body.as_ref().unwrap();
        assert!(body.dangling_targets().is_empty());
        assert_eq!(body.locals.len(), 2);
    }

    #[test]
    fn fast_path_is_one_load_and_a_tail_call() {
        let mut module = sample();
        weave_module(&mut module, &TypeFilter::all()).unwrap();
        let body = module.types[0].methods[1].body.as_ref().unwrap();

        let length = fast_path_length(body).unwrap();
        let fast = &body.instructions[..length];
        let opcodes: Vec<OpCode> = fast.iter().map(|instruction| instruction.opcode).collect();
        assert_eq!(
            opcodes,
            vec![OpCode::Ldsfld, OpCode::Brtrue, OpCode::Ldarg0, OpCode::Ldarg1, OpCode::Tail, OpCode::Call, OpCode::Ret]
        );
        let last = body.instructions.last().unwrap();
        assert_eq!(last.opcode, OpCode::Br);
        assert_eq!(last.operand, Operand::Target(length - 1));
    }

    #[test]
    fn weaving_twice_fails() {
        let mut module = sample();
        weave_module(&mut module, &TypeFilter::all()).unwrap();
        assert!(matches!(
            weave_module(&mut module, &TypeFilter::all()),
            Err(Error::InvalidOperation(_))
        ));
    }

    #[test]
    fn unselected_types_are_untouched() {
        let mut module = sample();
        let before = module.clone();
        assert_eq!(weave_module(&mut module, &TypeFilter::name_contains("Other")).unwrap(), 0);
        assert_eq!(module, before);
    }
}
