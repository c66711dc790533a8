//! Static bodies survive the image round trip and transcode to equivalent live bodies.

mod common;

use common::*;
use dotweave::{
    disassembler::OpCode,
    emit::{emit_opcode, LiveClauseKind, LiveOperand, RuntimeMethod, RuntimeType},
    metadata::{
        definitions::{MethodAttributes, MethodDefinition, StaticAssembly, TypeAttributes, TypeDefinition},
        method::{ExceptionHandler, Instruction, MethodBody, Operand},
        signatures::MethodSignature,
        typesystem::{AssemblyName, TypeReference},
    },
    runtime::Value,
    Domain,
};

fn exception() -> TypeReference {
    TypeReference::external_class(AssemblyName::corlib(), "System", "Exception")
}

/// `Classify(x)`: 10 for 0, -1 for anything above 1, and for 1 a division by zero that is
/// caught inside a try/finally before returning 7.
fn classify() -> MethodBody {
    MethodBody::new()
        .max_stack(2)
        .push(Instruction::load_argument(0))
        .push(Instruction::new(OpCode::Switch, Operand::Switch(vec![4, 6])))
        .push(Instruction::load_int32(-1))
        .push(Instruction::simple(OpCode::Ret))
        .push(Instruction::load_int32(10))
        .push(Instruction::simple(OpCode::Ret))
        .push(Instruction::simple(OpCode::Nop))
        .push(Instruction::load_argument(0))
        .push(Instruction::load_int32(0))
        .push(Instruction::simple(OpCode::Div))
        .push(Instruction::simple(OpCode::Pop))
        .push(Instruction::new(OpCode::Leave, Operand::Target(14)))
        .push(Instruction::simple(OpCode::Pop))
        .push(Instruction::new(OpCode::Leave, Operand::Target(14)))
        .push(Instruction::new(OpCode::Leave, Operand::Target(16)))
        .push(Instruction::simple(OpCode::Endfinally))
        .push(Instruction::load_int32(7))
        .push(Instruction::simple(OpCode::Ret))
        .handler(ExceptionHandler::catch((7, 12), (12, 14), exception()))
        .handler(ExceptionHandler::finally((6, 15), (15, 16)))
}

fn flow_assembly() -> StaticAssembly {
    let mut assembly = StaticAssembly::new(AssemblyName::new("Flow"));
    let mut ty = TypeDefinition::new("Demo", "SampleFlow", TypeAttributes::PUBLIC).extends(TypeReference::object());
    ty.methods.push(
        MethodDefinition::new(
            "Classify",
            MethodAttributes::PUBLIC | MethodAttributes::STATIC,
            MethodSignature::new_static(TypeReference::int32(), vec![TypeReference::int32()]),
        )
        .with_body(classify()),
    );
    ty.methods.push(
        MethodDefinition::new(
            "Name",
            MethodAttributes::PUBLIC | MethodAttributes::STATIC,
            MethodSignature::new_static(TypeReference::string(), vec![]),
        )
        .with_body(
            MethodBody::new()
                .push(Instruction::new(OpCode::Ldstr, Operand::String("sample".to_string())))
                .push(Instruction::simple(OpCode::Ret)),
        ),
    );
    if let Some(module) = assembly.main_module_mut() {
        module.types.push(ty);
    }
    assembly
}

#[test]
fn image_round_trip_keeps_bodies() {
    let assembly = flow_assembly();
    let bytes = assembly.to_bytes().unwrap();
    let decoded = StaticAssembly::from_bytes(&bytes).unwrap();

    let original = &assembly.main_module().unwrap().types[0];
    let read = decoded.main_module().unwrap().find_type("Demo", "SampleFlow").unwrap();
    assert_eq!(read.methods.len(), original.methods.len());
    for (left, right) in original.methods.iter().zip(&read.methods) {
        assert_eq!(left.name, right.name);
        assert_eq!(left.signature, right.signature);
        let (left, right) = (left.body.as_ref().unwrap(), right.body.as_ref().unwrap());
        assert_eq!(left.instructions, right.instructions);
        assert_eq!(left.exception_handlers, right.exception_handlers);
    }
}

#[test]
fn transcoded_bodies_keep_their_shape() {
    init_logging();
    let domain = Domain::new().unwrap();
    let loaded = domain.load_static(&flow_assembly()).unwrap();
    let handle = method(&domain, &loaded, "Demo.SampleFlow", "Classify");
    let live = domain.method(handle).unwrap();
    let body = live.body.as_ref().unwrap();
    let source = classify();

    assert_eq!(body.instructions.len(), source.instructions.len());
    for (index, (live, static_)) in body.instructions.iter().zip(&source.instructions).enumerate() {
        assert_eq!(live.opcode, emit_opcode(static_.opcode).unwrap(), "opcode at {index}");
        match (&static_.operand, &live.operand) {
            (Operand::None, LiveOperand::None) => {}
            (Operand::Int8(a), LiveOperand::Int8(b)) => assert_eq!(a, b),
            (Operand::Argument(a), LiveOperand::Argument(b)) => assert_eq!(a, b),
            (Operand::Target(a), LiveOperand::Target(b)) => assert_eq!(a, b),
            (Operand::Switch(a), LiveOperand::Switch(b)) => assert_eq!(a, b),
            (expected, found) => panic!("operand at {index}: {expected:?} became {found:?}"),
        }
    }

    // Innermost first.
    assert_eq!(body.clauses.len(), 2);
    let catch = &body.clauses[0];
    assert_eq!(
        (catch.try_start, catch.try_end, catch.handler_start, catch.handler_end),
        (7, 12, 12, 14)
    );
    let LiveClauseKind::Catch(RuntimeType::Type(caught)) = &catch.kind else {
        panic!("expected a typed catch, found {:?}", catch.kind);
    };
    assert_eq!(domain.live_type(*caught).unwrap().full_name(), "System.Exception");
    let finally = &body.clauses[1];
    assert_eq!(finally.kind, LiveClauseKind::Finally);
    assert_eq!(
        (finally.try_start, finally.try_end, finally.handler_start, finally.handler_end),
        (6, 15, 15, 16)
    );
}

#[test]
fn transcoded_bodies_run() {
    let domain = Domain::new().unwrap();
    let loaded = domain.load_static(&flow_assembly()).unwrap();
    let classify = RuntimeMethod::plain(method(&domain, &loaded, "Demo.SampleFlow", "Classify"));
    let run = |x: i32| {
        domain
            .invoke(&classify, None, vec![Value::I4(x)])
            .unwrap()
            .unwrap()
            .as_i32()
            .unwrap()
    };
    assert_eq!(run(0), 10);
    assert_eq!(run(1), 7);
    assert_eq!(run(5), -1);

    let name = RuntimeMethod::plain(method(&domain, &loaded, "Demo.SampleFlow", "Name"));
    let value = domain.invoke(&name, None, vec![]).unwrap().unwrap();
    assert_eq!(value.as_str().unwrap(), Some("sample"));
}

#[test]
fn woven_bodies_survive_the_image() {
    let mut assembly = sample_assembly();
    dotweave::instrument::weave(&mut assembly, &dotweave::TypeFilter::name_contains("Sample")).unwrap();
    let decoded = StaticAssembly::from_bytes(&assembly.to_bytes().unwrap()).unwrap();

    let woven = assembly.main_module().unwrap().find_type("Demo", "SampleClass").unwrap();
    let read = decoded.main_module().unwrap().find_type("Demo", "SampleClass").unwrap();
    let names = |ty: &TypeDefinition| ty.methods.iter().map(|m| m.name.clone()).collect::<Vec<_>>();
    assert_eq!(names(read), names(woven));
    assert_eq!(read.fields, woven.fields);
    for (left, right) in woven.methods.iter().zip(&read.methods) {
        assert_eq!(left.attributes, right.attributes, "{}", left.name);
        let (left, right) = (left.body.as_ref().unwrap(), right.body.as_ref().unwrap());
        assert_eq!(left.instructions, right.instructions);
        assert_eq!(left.locals, right.locals);
    }
}
