//! Sample static assemblies assembled in code.
#![allow(dead_code)]

use std::path::{Path, PathBuf};

use dotweave::{
    disassembler::OpCode,
    metadata::{
        definitions::{
            FieldAttributes, FieldDefinition, MethodAttributes, MethodDefinition, StaticAssembly, TypeAttributes,
            TypeDefinition,
        },
        members::{FieldReference, MethodReference},
        method::{ExceptionHandler, Instruction, MethodBody, Operand},
        signatures::MethodSignature,
        typesystem::{AssemblyName, ResolutionScope, TypeReference},
    },
    runtime::{Domain, Pointer, Value},
    emit::{LoadedAssembly, MethodHandle, RuntimeMethod},
    Result,
};

pub const SAMPLES: &str = "Samples";
pub const SAMPLE_CLASS: &str = "Demo.SampleClass";
pub const SAMPLE_COUNTER: &str = "Demo.SampleCounter";
pub const SAMPLE_FAULTS: &str = "Demo.SampleFaults";
pub const SAMPLE_USER: &str = "Demo.SampleUser";
pub const LIBRARY: &str = "Lib";

/// Install a test logger once; `RUST_LOG=debug` shows the pipeline.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn object_constructor() -> MethodReference {
    MethodReference::new(
        TypeReference::object(),
        ".ctor",
        MethodSignature::new_instance(TypeReference::void(), vec![]),
    )
}

fn default_constructor() -> MethodDefinition {
    MethodDefinition::constructor(MethodAttributes::PUBLIC | MethodAttributes::HIDE_BY_SIG, vec![]).with_body(
        MethodBody::new()
            .push(Instruction::load_argument(0))
            .push(Instruction::new(OpCode::Call, Operand::Method(object_constructor())))
            .push(Instruction::simple(OpCode::Ret)),
    )
}

/// `Demo.SampleClass`:
///
/// - `int M(int x) => x + 1`
/// - `static void Increment(ref int value) => value += 1`
/// - `static int Run(int x) => new SampleClass().M(x)`
///
/// and `Demo.Helper` with `static int Square(int x)`, which is never selected.
pub fn sample_assembly() -> StaticAssembly {
    let mut assembly = StaticAssembly::new(AssemblyName::new(SAMPLES));
    let module_name = format!("{SAMPLES}.dll");
    let this = TypeReference::module_class(module_name.as_str(), "Demo", "SampleClass");

    let mut sample =
        TypeDefinition::new("Demo", "SampleClass", TypeAttributes::PUBLIC).extends(TypeReference::object());
    sample.methods.push(default_constructor());
    sample.methods.push(
        MethodDefinition::new(
            "M",
            MethodAttributes::PUBLIC | MethodAttributes::HIDE_BY_SIG,
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
    sample.methods.push(
        MethodDefinition::new(
            "Increment",
            MethodAttributes::PUBLIC | MethodAttributes::STATIC | MethodAttributes::HIDE_BY_SIG,
            MethodSignature::new_static(TypeReference::void(), vec![TypeReference::int32().by_ref()]),
        )
        .with_body(
            MethodBody::new()
                .push(Instruction::load_argument(0))
                .push(Instruction::load_argument(0))
                .push(Instruction::simple(OpCode::LdindI4))
                .push(Instruction::load_int32(1))
                .push(Instruction::simple(OpCode::Add))
                .push(Instruction::simple(OpCode::StindI4))
                .push(Instruction::simple(OpCode::Ret)),
        ),
    );
    let m = MethodReference::new(
        this.clone(),
        "M",
        MethodSignature::new_instance(TypeReference::int32(), vec![TypeReference::int32()]),
    );
    let ctor = MethodReference::new(
        this,
        ".ctor",
        MethodSignature::new_instance(TypeReference::void(), vec![]),
    );
    sample.methods.push(
        MethodDefinition::new(
            "Run",
            MethodAttributes::PUBLIC | MethodAttributes::STATIC | MethodAttributes::HIDE_BY_SIG,
            MethodSignature::new_static(TypeReference::int32(), vec![TypeReference::int32()]),
        )
        .with_body(
            MethodBody::new()
                .push(Instruction::new(OpCode::Newobj, Operand::Method(ctor)))
                .push(Instruction::load_argument(0))
                .push(Instruction::new(OpCode::Callvirt, Operand::Method(m)))
                .push(Instruction::simple(OpCode::Ret)),
        ),
    );

    let mut helper = TypeDefinition::new("Demo", "Helper", TypeAttributes::PUBLIC).extends(TypeReference::object());
    helper.methods.push(
        MethodDefinition::new(
            "Square",
            MethodAttributes::PUBLIC | MethodAttributes::STATIC,
            MethodSignature::new_static(TypeReference::int32(), vec![TypeReference::int32()]),
        )
        .with_body(
            MethodBody::new()
                .push(Instruction::load_argument(0))
                .push(Instruction::load_argument(0))
                .push(Instruction::simple(OpCode::Mul))
                .push(Instruction::simple(OpCode::Ret)),
        ),
    );

    if let Some(module) = assembly.main_module_mut() {
        module.types.push(sample);
        module.types.push(helper);
    }
    assembly
}

/// An assembly whose only method takes the size of a function pointer type.
pub fn function_pointer_assembly() -> StaticAssembly {
    let mut assembly = StaticAssembly::new(AssemblyName::new("Pointers"));
    let pointer =
        TypeReference::FunctionPointer(Box::new(MethodSignature::new_static(TypeReference::void(), vec![])));
    let mut ty = TypeDefinition::new("Demo", "SampleUnsafe", TypeAttributes::PUBLIC).extends(TypeReference::object());
    ty.methods.push(
        MethodDefinition::new(
            "Size",
            MethodAttributes::PUBLIC | MethodAttributes::STATIC,
            MethodSignature::new_static(TypeReference::int32(), vec![]),
        )
        .with_body(
            MethodBody::new()
                .push(Instruction::new(OpCode::Sizeof, Operand::Type(pointer)))
                .push(Instruction::simple(OpCode::Ret)),
        ),
    );
    if let Some(module) = assembly.main_module_mut() {
        module.types.push(ty);
    }
    assembly
}

fn int32_function(name: &str, parameters: Vec<TypeReference>, body: MethodBody) -> MethodDefinition {
    MethodDefinition::new(
        name,
        MethodAttributes::PUBLIC | MethodAttributes::STATIC | MethodAttributes::HIDE_BY_SIG,
        MethodSignature::new_static(TypeReference::int32(), parameters),
    )
    .with_body(body)
}

fn single_type(name: &str, ty: TypeDefinition) -> StaticAssembly {
    let mut assembly = StaticAssembly::new(AssemblyName::new(name));
    if let Some(module) = assembly.main_module_mut() {
        module.types.push(ty);
    }
    assembly
}

/// `struct Demo.SampleCounter { int count; int Bump() => ++count; }`
pub fn counter_assembly() -> StaticAssembly {
    let this = TypeReference::named(
        ResolutionScope::Module("Counters.dll".to_string()),
        "Demo",
        "SampleCounter",
        true,
    );
    let count = FieldReference::new(this, "count", TypeReference::int32());
    let value_type = TypeReference::external_class(AssemblyName::corlib(), "System", "ValueType");

    let mut counter = TypeDefinition::new(
        "Demo",
        "SampleCounter",
        TypeAttributes::PUBLIC | TypeAttributes::SEALED | TypeAttributes::SEQUENTIAL_LAYOUT,
    )
    .extends(value_type);
    counter
        .fields
        .push(FieldDefinition::new("count", FieldAttributes::PRIVATE, TypeReference::int32()));
    counter.methods.push(
        MethodDefinition::new(
            "Bump",
            MethodAttributes::PUBLIC | MethodAttributes::HIDE_BY_SIG,
            MethodSignature::new_instance(TypeReference::int32(), vec![]),
        )
        .with_body(
            MethodBody::new()
                .push(Instruction::load_argument(0))
                .push(Instruction::load_argument(0))
                .push(Instruction::new(OpCode::Ldfld, Operand::Field(count.clone())))
                .push(Instruction::load_int32(1))
                .push(Instruction::simple(OpCode::Add))
                .push(Instruction::new(OpCode::Stfld, Operand::Field(count.clone())))
                .push(Instruction::load_argument(0))
                .push(Instruction::new(OpCode::Ldfld, Operand::Field(count)))
                .push(Instruction::simple(OpCode::Ret)),
        ),
    );
    single_type("Counters", counter)
}

/// `Demo.SampleFaults`:
///
/// - `static int Divide(int x) => 10 / x`
/// - `static int Guarded(int x)`, returning `Divide(x)` or `-1` on `DivideByZeroException`
pub fn faults_assembly() -> StaticAssembly {
    let this = TypeReference::module_class("Faults.dll", "Demo", "SampleFaults");
    let divide = MethodReference::new(
        this,
        "Divide",
        MethodSignature::new_static(TypeReference::int32(), vec![TypeReference::int32()]),
    );
    let divide_by_zero = TypeReference::external_class(AssemblyName::corlib(), "System", "DivideByZeroException");

    let mut faults = TypeDefinition::new("Demo", "SampleFaults", TypeAttributes::PUBLIC).extends(TypeReference::object());
    faults.methods.push(int32_function(
        "Divide",
        vec![TypeReference::int32()],
        MethodBody::new()
            .push(Instruction::load_int32(10))
            .push(Instruction::load_argument(0))
            .push(Instruction::simple(OpCode::Div))
            .push(Instruction::simple(OpCode::Ret)),
    ));
    faults.methods.push(int32_function(
        "Guarded",
        vec![TypeReference::int32()],
        MethodBody::new()
            .local(TypeReference::int32())
            .push(Instruction::load_argument(0))
            .push(Instruction::new(OpCode::Call, Operand::Method(divide)))
            .push(Instruction::store_local(0))
            .push(Instruction::new(OpCode::Leave, Operand::Target(8)))
            .push(Instruction::simple(OpCode::Pop))
            .push(Instruction::load_int32(-1))
            .push(Instruction::store_local(0))
            .push(Instruction::new(OpCode::Leave, Operand::Target(8)))
            .push(Instruction::load_local(0))
            .push(Instruction::simple(OpCode::Ret))
            .handler(ExceptionHandler::catch((0, 4), (4, 8), divide_by_zero)),
    ));
    single_type("Faults", faults)
}

/// `Lib.Util` with `static int F1() => 1`.
pub fn library_assembly() -> StaticAssembly {
    let mut util = TypeDefinition::new(LIBRARY, "Util", TypeAttributes::PUBLIC).extends(TypeReference::object());
    util.methods.push(int32_function(
        "F1",
        vec![],
        MethodBody::new()
            .push(Instruction::load_int32(1))
            .push(Instruction::simple(OpCode::Ret)),
    ));
    single_type(LIBRARY, util)
}

/// Assembly `User{index}` with `Demo.SampleUser.Go() => Lib.Util.F1() + 1`.
pub fn user_assembly(index: usize) -> StaticAssembly {
    let f1 = MethodReference::new(
        TypeReference::external_class(AssemblyName::new(LIBRARY), LIBRARY, "Util"),
        "F1",
        MethodSignature::new_static(TypeReference::int32(), vec![]),
    );
    let mut user = TypeDefinition::new("Demo", "SampleUser", TypeAttributes::PUBLIC).extends(TypeReference::object());
    user.methods.push(int32_function(
        "Go",
        vec![],
        MethodBody::new()
            .push(Instruction::new(OpCode::Call, Operand::Method(f1)))
            .push(Instruction::load_int32(1))
            .push(Instruction::simple(OpCode::Add))
            .push(Instruction::simple(OpCode::Ret)),
    ));
    single_type(&format!("User{index}"), user)
}

/// Call a static method returning `int`.
pub fn call_static(domain: &Domain, assembly: &LoadedAssembly, type_name: &str, name: &str, arguments: Vec<Value>) -> Result<i32> {
    let handle = method(domain, assembly, type_name, name);
    domain
        .invoke(&RuntimeMethod::plain(handle), None, arguments)?
        .ok_or_else(|| dotweave::Error::NotSupported(format!("{name} returned nothing")))?
        .as_i32()
}

/// Write `assembly` into `directory` under its module name.
pub fn save(assembly: &StaticAssembly, directory: &Path) -> PathBuf {
    let path = directory.join(format!("{}.dll", assembly.name.name));
    assembly.to_file(&path).unwrap();
    path
}

pub fn method(domain: &Domain, assembly: &LoadedAssembly, type_name: &str, name: &str) -> MethodHandle {
    domain.find_method(assembly.name(), type_name, name).unwrap()
}

/// `new SampleClass().M(x)`.
pub fn call_m(domain: &Domain, assembly: &LoadedAssembly, x: i32) -> Result<i32> {
    let ctor = method(domain, assembly, SAMPLE_CLASS, ".ctor");
    let m = method(domain, assembly, SAMPLE_CLASS, "M");
    let instance = domain.construct(&RuntimeMethod::plain(ctor), vec![])?;
    domain
        .invoke(&RuntimeMethod::plain(m), Some(instance), vec![Value::I4(x)])?
        .ok_or_else(|| dotweave::Error::NotSupported("M returned nothing".to_string()))?
        .as_i32()
}

/// `SampleClass.Increment(ref value)`, returning the new value.
pub fn call_increment(domain: &Domain, assembly: &LoadedAssembly, value: i32) -> Result<i32> {
    let increment = method(domain, assembly, SAMPLE_CLASS, "Increment");
    let storage = dotweave::runtime::slot(Value::I4(value));
    domain.invoke(
        &RuntimeMethod::plain(increment),
        None,
        vec![Value::ByRef(Pointer::Slot(storage.clone()))],
    )?;
    let result = storage.lock().unwrap().as_i32();
    result
}
