//! Built-in assemblies: the core library and the interception support library.
//!
//! Both are declared through an [`AssemblyBuilder`] like any other live assembly; their
//! methods are host functions. Type positions are fixed so the runtime can name well-known
//! types by constant handle: the primitives come first, in [`PrimitiveType`] order.

use std::sync::Mutex;

use strum::{EnumCount, EnumIter, IntoEnumIterator, IntoStaticStr};
use uguid::Guid;

use crate::{
    emit::{
        AssemblyBuilder, AssemblyId, FieldHandle, LiveParameter, LiveSignature, LiveToken,
        LoadedAssembly, MethodHandle, NativeMethod, RuntimeMethod, RuntimeType, TypeHandle,
    },
    metadata::{
        definitions::{FieldAttributes, MethodAttributes, MethodImplAttributes, TypeAttributes},
        members::CONSTRUCTOR_NAME,
        signatures::CallingConvention,
        typesystem::{AssemblyName, AssemblyVersion, PrimitiveType},
    },
    runtime::{
        invocation::{unwrap_interceptor, Invocation},
        value::{NativeData, ObjectData, ObjectRef, Value},
        Domain,
    },
    Result,
};

/// Id of the core library in every domain.
pub const CORLIB_ID: AssemblyId = AssemblyId(0);
/// Id of the interception support library in every domain.
pub const SUPPORT_ID: AssemblyId = AssemblyId(1);
/// Simple name of the core library.
pub const CORLIB_NAME: &str = "mscorlib";
/// Other names compilers use to reference the core library.
pub const CORLIB_ALIASES: &[&str] = &["System.Runtime", "System.Private.CoreLib", "netstandard"];
/// Simple name and namespace of the interception support library.
pub const SUPPORT_NAME: &str = "DotWeave.Runtime";
/// Interface type of stub slot elements.
pub const INTERCEPTOR_TYPE_NAME: &str = "IInterceptor";
/// Class of the per-call invocation object.
pub const INVOCATION_TYPE_NAME: &str = "Invocation";

const fn corlib(index: u32) -> TypeHandle {
    TypeHandle::new(CORLIB_ID, index)
}

const FIRST_SYSTEM_TYPE: u32 = PrimitiveType::COUNT as u32;

pub(crate) const VALUE_TYPE: TypeHandle = corlib(FIRST_SYSTEM_TYPE);
pub(crate) const ENUM: TypeHandle = corlib(FIRST_SYSTEM_TYPE + 1);
pub(crate) const ARRAY: TypeHandle = corlib(FIRST_SYSTEM_TYPE + 2);
pub(crate) const TYPE: TypeHandle = corlib(FIRST_SYSTEM_TYPE + 3);
pub(crate) const RUNTIME_TYPE_HANDLE: TypeHandle = corlib(FIRST_SYSTEM_TYPE + 4);
pub(crate) const RUNTIME_METHOD_HANDLE: TypeHandle = corlib(FIRST_SYSTEM_TYPE + 5);
pub(crate) const RUNTIME_FIELD_HANDLE: TypeHandle = corlib(FIRST_SYSTEM_TYPE + 6);
pub(crate) const DELEGATE: TypeHandle = corlib(FIRST_SYSTEM_TYPE + 7);
pub(crate) const MULTICAST_DELEGATE: TypeHandle = corlib(FIRST_SYSTEM_TYPE + 8);
pub(crate) const ATTRIBUTE: TypeHandle = corlib(FIRST_SYSTEM_TYPE + 9);
pub(crate) const EXCEPTION: TypeHandle = corlib(FIRST_SYSTEM_TYPE + 10);
const FIRST_FAULT: u32 = FIRST_SYSTEM_TYPE + 11;

/// `System.Exception::_message`
pub(crate) const EXCEPTION_MESSAGE: FieldHandle = FieldHandle {
    declaring: EXCEPTION,
    index: 0,
};

pub(crate) const INTERCEPTOR: TypeHandle = TypeHandle::new(SUPPORT_ID, 0);
pub(crate) const HOST_INTERCEPTOR: TypeHandle = TypeHandle::new(SUPPORT_ID, 1);
pub(crate) const INVOCATION: TypeHandle = TypeHandle::new(SUPPORT_ID, 2);

/// The core library handle of a primitive.
#[must_use]
pub fn primitive_handle(primitive: PrimitiveType) -> TypeHandle {
    corlib(primitive as u32)
}

/// The live type of a primitive.
#[must_use]
pub fn primitive_type(primitive: PrimitiveType) -> RuntimeType {
    RuntimeType::Type(primitive_handle(primitive))
}

/// The primitive a core library handle stands for.
#[must_use]
pub fn primitive_of(handle: TypeHandle) -> Option<PrimitiveType> {
    if handle.assembly != CORLIB_ID {
        return None;
    }
    PrimitiveType::iter().nth(handle.index as usize)
}

/// Exceptions the runtime raises on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, IntoStaticStr)]
pub enum Fault {
    /// `System.SystemException`
    #[strum(serialize = "SystemException")]
    System,
    /// `System.ArithmeticException`
    #[strum(serialize = "ArithmeticException")]
    Arithmetic,
    /// `System.DivideByZeroException`
    #[strum(serialize = "DivideByZeroException")]
    DivideByZero,
    /// `System.OverflowException`
    #[strum(serialize = "OverflowException")]
    Overflow,
    /// `System.NullReferenceException`
    #[strum(serialize = "NullReferenceException")]
    NullReference,
    /// `System.InvalidCastException`
    #[strum(serialize = "InvalidCastException")]
    InvalidCast,
    /// `System.IndexOutOfRangeException`
    #[strum(serialize = "IndexOutOfRangeException")]
    IndexOutOfRange,
    /// `System.ArgumentException`
    #[strum(serialize = "ArgumentException")]
    Argument,
    /// `System.ArgumentNullException`
    #[strum(serialize = "ArgumentNullException")]
    ArgumentNull,
    /// `System.InvalidOperationException`
    #[strum(serialize = "InvalidOperationException")]
    InvalidOperation,
    /// `System.NotSupportedException`
    #[strum(serialize = "NotSupportedException")]
    NotSupported,
}

impl Fault {
    /// The exception type.
    #[must_use]
    pub fn handle(self) -> TypeHandle {
        corlib(FIRST_FAULT + self as u32)
    }

    /// Simple name in the `System` namespace.
    #[must_use]
    pub fn name(self) -> &'static str {
        self.into()
    }

    fn parent(self) -> TypeHandle {
        match self {
            Fault::System => EXCEPTION,
            Fault::DivideByZero | Fault::Overflow => Fault::Arithmetic.handle(),
            Fault::ArgumentNull => Fault::Argument.handle(),
            _ => Fault::System.handle(),
        }
    }
}

struct Library {
    builder: AssemblyBuilder,
    module: usize,
}

impl Library {
    fn new(id: AssemblyId, name: AssemblyName, module: &str) -> Self {
        let mut builder = AssemblyBuilder::new(id, name);
        let module = builder.define_module(module, Guid::ZERO);
        Library { builder, module }
    }

    fn class(
        &mut self,
        namespace: &str,
        name: &str,
        attributes: TypeAttributes,
        base: Option<TypeHandle>,
    ) -> Result<TypeHandle> {
        let handle = self
            .builder
            .define_type(self.module, namespace, name, attributes, None)?;
        self.builder.set_parent(handle, base.map(RuntimeType::Type))?;
        Ok(handle)
    }

    /// Declare a well-known type that must land on `expected`.
    fn class_at(
        &mut self,
        expected: TypeHandle,
        name: &str,
        attributes: TypeAttributes,
        base: Option<TypeHandle>,
    ) -> Result<()> {
        let handle = self.class("System", name, attributes, base)?;
        if handle != expected {
            return Err(invalid_operation!(
                "System.{} declared as {:?} instead of {:?}",
                name,
                handle,
                expected
            ));
        }
        Ok(())
    }

    fn method(
        &mut self,
        ty: TypeHandle,
        name: &str,
        attributes: MethodAttributes,
        parameters: Vec<RuntimeType>,
        return_type: RuntimeType,
        native: NativeMethod,
    ) -> Result<MethodHandle> {
        let handle = self.builder.define_method(
            ty,
            name,
            attributes | MethodAttributes::HIDE_BY_SIG,
            MethodImplAttributes::INTERNAL_CALL,
            Vec::new(),
        )?;
        let parameter_info = (0..parameters.len())
            .map(|index| LiveParameter {
                name: format!("arg{index}"),
                ..LiveParameter::default()
            })
            .collect();
        let signature = LiveSignature {
            has_this: !attributes.contains(MethodAttributes::STATIC),
            convention: CallingConvention::Default,
            generic_arity: 0,
            return_type,
            parameters,
        };
        self.builder
            .set_signature(handle, signature, parameter_info, LiveParameter::default())?;
        self.builder.set_native(handle, native)?;
        Ok(handle)
    }

    fn constructor(&mut self, ty: TypeHandle, parameters: Vec<RuntimeType>, native: NativeMethod) -> Result<MethodHandle> {
        self.method(
            ty,
            CONSTRUCTOR_NAME,
            MethodAttributes::PUBLIC | MethodAttributes::SPECIAL_NAME | MethodAttributes::RT_SPECIAL_NAME,
            parameters,
            primitive_type(PrimitiveType::Void),
            native,
        )
    }
}

const PUBLIC_VIRTUAL: MethodAttributes = MethodAttributes::PUBLIC.union(MethodAttributes::VIRTUAL);
const PUBLIC_STATIC: MethodAttributes = MethodAttributes::PUBLIC.union(MethodAttributes::STATIC);

/// Declare `mscorlib`.
pub(crate) fn build_corlib() -> Result<LoadedAssembly> {
    let mut lib = Library::new(CORLIB_ID, AssemblyName::corlib(), "CommonLanguageRuntimeLibrary");
    let object = primitive_handle(PrimitiveType::Object);
    let sealed = TypeAttributes::PUBLIC | TypeAttributes::SEALED;

    for primitive in PrimitiveType::iter() {
        let (attributes, base) = match primitive {
            PrimitiveType::Object => (TypeAttributes::PUBLIC, None),
            PrimitiveType::String => (sealed, Some(object)),
            _ => (sealed | TypeAttributes::SEQUENTIAL_LAYOUT, Some(VALUE_TYPE)),
        };
        lib.class("System", primitive.name(), attributes, base)?;
    }

    let abstract_class = TypeAttributes::PUBLIC | TypeAttributes::ABSTRACT;
    let value_type = sealed | TypeAttributes::SEQUENTIAL_LAYOUT;
    lib.class_at(VALUE_TYPE, "ValueType", abstract_class, Some(object))?;
    lib.class_at(ENUM, "Enum", abstract_class, Some(VALUE_TYPE))?;
    lib.class_at(ARRAY, "Array", abstract_class, Some(object))?;
    lib.class_at(TYPE, "Type", abstract_class, Some(object))?;
    lib.class_at(RUNTIME_TYPE_HANDLE, "RuntimeTypeHandle", value_type, Some(VALUE_TYPE))?;
    lib.class_at(RUNTIME_METHOD_HANDLE, "RuntimeMethodHandle", value_type, Some(VALUE_TYPE))?;
    lib.class_at(RUNTIME_FIELD_HANDLE, "RuntimeFieldHandle", value_type, Some(VALUE_TYPE))?;
    lib.class_at(DELEGATE, "Delegate", abstract_class, Some(object))?;
    lib.class_at(MULTICAST_DELEGATE, "MulticastDelegate", abstract_class, Some(DELEGATE))?;
    lib.class_at(ATTRIBUTE, "Attribute", abstract_class, Some(object))?;
    lib.class_at(EXCEPTION, "Exception", TypeAttributes::PUBLIC, Some(object))?;
    for fault in Fault::iter() {
        lib.class("System", fault.name(), TypeAttributes::PUBLIC, Some(fault.parent()))?;
    }

    let int32 = primitive_type(PrimitiveType::I4);
    let boolean = primitive_type(PrimitiveType::Boolean);
    let string = primitive_type(PrimitiveType::String);
    let object_type = RuntimeType::Type(object);
    let type_type = RuntimeType::Type(TYPE);

    lib.constructor(object, vec![], object_constructor)?;
    lib.method(object, "ToString", PUBLIC_VIRTUAL, vec![], string.clone(), object_to_string)?;
    lib.method(object, "Equals", PUBLIC_VIRTUAL, vec![object_type.clone()], boolean.clone(), object_equals)?;
    lib.method(object, "GetHashCode", PUBLIC_VIRTUAL, vec![], int32.clone(), object_hash_code)?;
    lib.method(object, "GetType", MethodAttributes::PUBLIC, vec![], type_type.clone(), object_get_type)?;

    let string_handle = primitive_handle(PrimitiveType::String);
    lib.method(string_handle, "get_Length", MethodAttributes::PUBLIC, vec![], int32.clone(), string_length)?;
    lib.method(
        string_handle,
        "get_Chars",
        MethodAttributes::PUBLIC,
        vec![int32.clone()],
        primitive_type(PrimitiveType::Char),
        string_chars,
    )?;
    lib.method(
        string_handle,
        "Concat",
        PUBLIC_STATIC,
        vec![string.clone(), string.clone()],
        string.clone(),
        string_concat,
    )?;
    lib.method(
        string_handle,
        "Concat",
        PUBLIC_STATIC,
        vec![object_type.clone(), object_type.clone()],
        string.clone(),
        string_concat,
    )?;
    lib.method(
        string_handle,
        "op_Equality",
        PUBLIC_STATIC | MethodAttributes::SPECIAL_NAME,
        vec![string.clone(), string.clone()],
        boolean.clone(),
        string_equality,
    )?;
    lib.method(
        string_handle,
        "op_Inequality",
        PUBLIC_STATIC | MethodAttributes::SPECIAL_NAME,
        vec![string.clone(), string.clone()],
        boolean.clone(),
        string_inequality,
    )?;
    lib.method(
        string_handle,
        "IsNullOrEmpty",
        PUBLIC_STATIC,
        vec![string.clone()],
        boolean.clone(),
        string_is_null_or_empty,
    )?;

    lib.method(ARRAY, "get_Length", MethodAttributes::PUBLIC, vec![], int32.clone(), array_length)?;

    lib.method(
        TYPE,
        "GetTypeFromHandle",
        PUBLIC_STATIC,
        vec![RuntimeType::Type(RUNTIME_TYPE_HANDLE)],
        type_type.clone(),
        type_from_handle,
    )?;
    lib.method(TYPE, "get_FullName", MethodAttributes::PUBLIC, vec![], string.clone(), type_full_name)?;
    lib.method(
        TYPE,
        "op_Equality",
        PUBLIC_STATIC | MethodAttributes::SPECIAL_NAME,
        vec![type_type.clone(), type_type.clone()],
        boolean.clone(),
        type_equality,
    )?;

    lib.constructor(ATTRIBUTE, vec![], object_constructor)?;

    lib.builder.define_field(
        EXCEPTION,
        "_message",
        FieldAttributes::PRIVATE,
        string.clone(),
    )?;
    lib.method(EXCEPTION, "get_Message", PUBLIC_VIRTUAL, vec![], string.clone(), exception_message)?;
    for exception in std::iter::once(EXCEPTION).chain(Fault::iter().map(Fault::handle)) {
        lib.constructor(exception, vec![], exception_constructor)?;
        lib.constructor(exception, vec![string.clone()], exception_constructor)?;
    }

    debug_assert_eq!(lib.builder.type_count() as u32, FIRST_FAULT + Fault::iter().count() as u32);
    lib.builder.seal()
}

/// Declare `DotWeave.Runtime`, the types woven methods call into.
pub(crate) fn build_support() -> Result<LoadedAssembly> {
    let mut lib = Library::new(
        SUPPORT_ID,
        AssemblyName::new(SUPPORT_NAME).with_version(AssemblyVersion::new(1, 0, 0, 0)),
        "DotWeave.Runtime.dll",
    );
    let object = primitive_handle(PrimitiveType::Object);
    let object_type = RuntimeType::Type(object);

    lib.class(
        SUPPORT_NAME,
        INTERCEPTOR_TYPE_NAME,
        TypeAttributes::PUBLIC | TypeAttributes::INTERFACE | TypeAttributes::ABSTRACT,
        None,
    )?;
    let host = lib.class(
        SUPPORT_NAME,
        "HostInterceptor",
        TypeAttributes::PUBLIC | TypeAttributes::SEALED,
        Some(object),
    )?;
    lib.builder.add_interface(host, RuntimeType::Type(INTERCEPTOR))?;
    lib.class(
        SUPPORT_NAME,
        INVOCATION_TYPE_NAME,
        TypeAttributes::PUBLIC | TypeAttributes::SEALED,
        Some(object),
    )?;

    lib.constructor(
        INVOCATION,
        vec![
            RuntimeType::Type(INTERCEPTOR).make_array(0),
            object_type.clone(),
            object_type.clone().make_array(0),
            RuntimeType::Type(RUNTIME_METHOD_HANDLE),
        ],
        invocation_constructor,
    )?;
    lib.method(
        INVOCATION,
        "Proceed",
        MethodAttributes::PUBLIC,
        vec![],
        primitive_type(PrimitiveType::Void),
        invocation_proceed,
    )?;
    lib.method(
        INVOCATION,
        "get_ReturnValue",
        MethodAttributes::PUBLIC,
        vec![],
        object_type.clone(),
        invocation_return_value,
    )?;
    lib.method(
        INVOCATION,
        "get_Arguments",
        MethodAttributes::PUBLIC,
        vec![],
        object_type.make_array(0),
        invocation_arguments,
    )?;

    lib.builder.seal()
}

fn this_object(this: Option<Value>) -> Result<ObjectRef> {
    match this {
        Some(Value::Object(object)) => Ok(object),
        Some(Value::ByRef(pointer)) => match pointer.load()? {
            Value::Object(object) => Ok(object),
            other => Err(invalid_operation!("Expected an object for this, found {:?}", other)),
        },
        other => Err(invalid_operation!("Expected an object for this, found {:?}", other)),
    }
}

fn single(arguments: Vec<Value>) -> Result<Value> {
    let [value] = <[Value; 1]>::try_from(arguments)
        .map_err(|arguments| invalid_operation!("Expected 1 argument, found {}", arguments.len()))?;
    Ok(value)
}

fn pair(arguments: Vec<Value>) -> Result<(Value, Value)> {
    let [a, b] = <[Value; 2]>::try_from(arguments)
        .map_err(|arguments| invalid_operation!("Expected 2 arguments, found {}", arguments.len()))?;
    Ok((a, b))
}

fn object_constructor(
    domain: &Domain,
    method: &RuntimeMethod,
    this: Option<Value>,
    _arguments: Vec<Value>,
) -> Result<Option<Value>> {
    match this {
        Some(_) => Ok(None),
        None => Ok(Some(Value::Object(domain.allocate(&method.owner)?))),
    }
}

fn object_to_string(domain: &Domain, _: &RuntimeMethod, this: Option<Value>, _: Vec<Value>) -> Result<Option<Value>> {
    let object = this_object(this)?;
    let text = match object.data() {
        ObjectData::String(text) => text.clone(),
        ObjectData::Boxed(value) => match &*value.lock()? {
            Value::I4(v) => v.to_string(),
            Value::I8(v) | Value::NativeInt(v) => v.to_string(),
            Value::F(v) => v.to_string(),
            _ => domain.type_name(object.object_type())?,
        },
        _ => domain.type_name(object.object_type())?,
    };
    Ok(Some(domain.new_string(text)))
}

fn object_equals(_: &Domain, _: &RuntimeMethod, this: Option<Value>, arguments: Vec<Value>) -> Result<Option<Value>> {
    let object = this_object(this)?;
    let equal = match single(arguments)? {
        Value::Object(other) => match (object.data(), other.data()) {
            (ObjectData::String(a), ObjectData::String(b)) => a == b,
            (ObjectData::Boxed(_), ObjectData::Boxed(_)) => {
                object.object_type() == other.object_type() && object.unboxed()? == other.unboxed()?
            }
            _ => object == other,
        },
        _ => false,
    };
    Ok(Some(Value::from_bool(equal)))
}

fn object_hash_code(_: &Domain, _: &RuntimeMethod, this: Option<Value>, _: Vec<Value>) -> Result<Option<Value>> {
    let object = this_object(this)?;
    let hash = match object.data() {
        ObjectData::String(text) => text
            .encode_utf16()
            .fold(5381i32, |hash, unit| hash.wrapping_mul(33) ^ i32::from(unit)),
        ObjectData::Boxed(value) => match &*value.lock()? {
            Value::I4(v) => *v,
            Value::I8(v) | Value::NativeInt(v) => (*v as i32) ^ ((*v >> 32) as i32),
            _ => object.address() as i32,
        },
        _ => object.address() as i32,
    };
    Ok(Some(Value::I4(hash)))
}

fn object_get_type(domain: &Domain, _: &RuntimeMethod, this: Option<Value>, _: Vec<Value>) -> Result<Option<Value>> {
    let object = this_object(this)?;
    Ok(Some(domain.type_object(object.object_type())))
}

fn string_length(_: &Domain, _: &RuntimeMethod, this: Option<Value>, _: Vec<Value>) -> Result<Option<Value>> {
    let object = this_object(this)?;
    let text = object
        .as_str()
        .ok_or_else(|| invalid_operation!("{:?} is not a string", object))?;
    Ok(Some(Value::I4(text.encode_utf16().count() as i32)))
}

fn string_chars(domain: &Domain, _: &RuntimeMethod, this: Option<Value>, arguments: Vec<Value>) -> Result<Option<Value>> {
    let object = this_object(this)?;
    let text = object
        .as_str()
        .ok_or_else(|| invalid_operation!("{:?} is not a string", object))?;
    let index = single(arguments)?.as_i32()?;
    let unit = usize::try_from(index)
        .ok()
        .and_then(|index| text.encode_utf16().nth(index))
        .ok_or_else(|| domain.raise(Fault::IndexOutOfRange, "Index was outside the bounds of the string."))?;
    Ok(Some(Value::I4(i32::from(unit))))
}

fn concat_part(domain: &Domain, value: Value) -> Result<String> {
    match value {
        Value::Null => Ok(String::new()),
        Value::Object(object) => match object.as_str() {
            Some(text) => Ok(text.to_string()),
            None => {
                let method = domain.find_method(CORLIB_NAME, "System.Object", "ToString")?;
                let text = domain.invoke_virtual(&RuntimeMethod::plain(method), Value::Object(object), Vec::new())?;
                Ok(text
                    .as_ref()
                    .map(Value::as_str)
                    .transpose()?
                    .flatten()
                    .unwrap_or_default()
                    .to_string())
            }
        },
        other => Err(invalid_operation!("Cannot concatenate {:?}", other)),
    }
}

fn string_concat(domain: &Domain, _: &RuntimeMethod, _: Option<Value>, arguments: Vec<Value>) -> Result<Option<Value>> {
    let (a, b) = pair(arguments)?;
    let text = concat_part(domain, a)? + &concat_part(domain, b)?;
    Ok(Some(domain.new_string(text)))
}

fn strings_equal(arguments: Vec<Value>) -> Result<bool> {
    let (a, b) = pair(arguments)?;
    Ok(a.as_str()? == b.as_str()?)
}

fn string_equality(_: &Domain, _: &RuntimeMethod, _: Option<Value>, arguments: Vec<Value>) -> Result<Option<Value>> {
    Ok(Some(Value::from_bool(strings_equal(arguments)?)))
}

fn string_inequality(_: &Domain, _: &RuntimeMethod, _: Option<Value>, arguments: Vec<Value>) -> Result<Option<Value>> {
    Ok(Some(Value::from_bool(!strings_equal(arguments)?)))
}

fn string_is_null_or_empty(_: &Domain, _: &RuntimeMethod, _: Option<Value>, arguments: Vec<Value>) -> Result<Option<Value>> {
    let value = single(arguments)?;
    Ok(Some(Value::from_bool(value.as_str()?.is_none_or(str::is_empty))))
}

fn array_length(_: &Domain, _: &RuntimeMethod, this: Option<Value>, _: Vec<Value>) -> Result<Option<Value>> {
    let array = this_object(this)?;
    Ok(Some(Value::I4(array.elements()?.len() as i32)))
}

fn type_from_handle(domain: &Domain, _: &RuntimeMethod, _: Option<Value>, arguments: Vec<Value>) -> Result<Option<Value>> {
    match single(arguments)? {
        Value::Token(LiveToken::Type(ty)) => Ok(Some(domain.type_object(&ty))),
        other => Err(invalid_operation!("Expected a type handle, found {:?}", other)),
    }
}

fn type_of(value: &Value) -> Result<Option<RuntimeType>> {
    match value {
        Value::Null => Ok(None),
        Value::Object(object) => match object.native() {
            Some(NativeData::Type(ty)) => Ok(Some(ty.clone())),
            _ => Err(invalid_operation!("{:?} is not a type object", object)),
        },
        other => Err(invalid_operation!("{:?} is not a type object", other)),
    }
}

fn type_full_name(domain: &Domain, _: &RuntimeMethod, this: Option<Value>, _: Vec<Value>) -> Result<Option<Value>> {
    let object = this_object(this)?;
    let ty = type_of(&Value::Object(object))?
        .ok_or_else(|| invalid_operation!("Type object without type"))?;
    Ok(Some(domain.new_string(domain.type_name(&ty)?)))
}

fn type_equality(_: &Domain, _: &RuntimeMethod, _: Option<Value>, arguments: Vec<Value>) -> Result<Option<Value>> {
    let (a, b) = pair(arguments)?;
    Ok(Some(Value::from_bool(type_of(&a)? == type_of(&b)?)))
}

fn exception_constructor(
    domain: &Domain,
    method: &RuntimeMethod,
    this: Option<Value>,
    arguments: Vec<Value>,
) -> Result<Option<Value>> {
    let object = match this {
        Some(this) => this_object(Some(this))?,
        None => domain.allocate(&method.owner)?,
    };
    if let Some(message) = arguments.into_iter().next() {
        let slot = domain.field_slot(EXCEPTION_MESSAGE)?;
        object.set_field(slot, message)?;
    }
    Ok(Some(Value::Object(object)))
}

fn exception_message(domain: &Domain, _: &RuntimeMethod, this: Option<Value>, _: Vec<Value>) -> Result<Option<Value>> {
    let object = this_object(this)?;
    let message = domain
        .exception_message(&object)?
        .unwrap_or_else(|| format!("Exception of type '{}' was thrown.", domain.type_name(object.object_type()).unwrap_or_default()));
    Ok(Some(domain.new_string(message)))
}

fn invocation_constructor(
    domain: &Domain,
    method: &RuntimeMethod,
    _this: Option<Value>,
    arguments: Vec<Value>,
) -> Result<Option<Value>> {
    let [chain, instance, arguments, target] = <[Value; 4]>::try_from(arguments)
        .map_err(|arguments| invalid_operation!("Expected 4 arguments, found {}", arguments.len()))?;
    let interceptors = match chain {
        Value::Null => Vec::new(),
        Value::Object(chain) => chain
            .elements()?
            .iter()
            .map(unwrap_interceptor)
            .collect::<Result<_>>()?,
        other => return Err(invalid_operation!("Expected an interceptor array, found {:?}", other)),
    };
    let target = match target {
        Value::Token(LiveToken::Method(target)) => target,
        other => return Err(invalid_operation!("Expected a method handle, found {:?}", other)),
    };
    let instance = (!instance.is_null()).then_some(instance);
    let invocation = Invocation::new(
        domain.clone(),
        interceptors,
        target,
        instance,
        ObjectRef::try_from(arguments)?,
    )?;
    Ok(Some(Value::Object(ObjectRef::new(
        method.owner.clone(),
        ObjectData::Native(NativeData::Invocation(Mutex::new(invocation))),
    ))))
}

fn with_invocation<T>(this: Option<Value>, f: impl FnOnce(&mut Invocation) -> Result<T>) -> Result<T> {
    let object = this_object(this)?;
    match object.native() {
        Some(NativeData::Invocation(invocation)) => f(&mut *invocation.lock()?),
        _ => Err(invalid_operation!("{:?} is not an invocation", object)),
    }
}

fn invocation_proceed(_: &Domain, _: &RuntimeMethod, this: Option<Value>, _: Vec<Value>) -> Result<Option<Value>> {
    with_invocation(this, Invocation::proceed)?;
    Ok(None)
}

fn invocation_return_value(_: &Domain, _: &RuntimeMethod, this: Option<Value>, _: Vec<Value>) -> Result<Option<Value>> {
    with_invocation(this, |invocation| Ok(Some(invocation.boxed_return_value().clone())))
}

fn invocation_arguments(_: &Domain, _: &RuntimeMethod, this: Option<Value>, _: Vec<Value>) -> Result<Option<Value>> {
    with_invocation(this, |invocation| Ok(Some(Value::Object(invocation.argument_array().clone()))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_known_positions() {
        let corlib = build_corlib().unwrap();
        for primitive in PrimitiveType::iter() {
            let ty = corlib.find_type(&format!("System.{}", primitive.name())).unwrap();
            assert_eq!(ty.handle, primitive_handle(primitive));
            assert_eq!(primitive_of(ty.handle), Some(primitive));
        }
        assert_eq!(corlib.find_type("System.ValueType").unwrap().handle, VALUE_TYPE);
        assert_eq!(corlib.find_type("System.MulticastDelegate").unwrap().handle, MULTICAST_DELEGATE);
        assert_eq!(corlib.find_type("System.RuntimeFieldHandle").unwrap().handle, RUNTIME_FIELD_HANDLE);
        assert_eq!(corlib.find_type("System.Exception").unwrap().handle, EXCEPTION);
        for fault in Fault::iter() {
            let ty = corlib.find_type(&format!("System.{}", fault.name())).unwrap();
            assert_eq!(ty.handle, fault.handle());
        }
        assert_eq!(
            corlib.field(EXCEPTION_MESSAGE).map(|field| field.name.as_str()),
            Some("_message")
        );
        assert_eq!(primitive_of(VALUE_TYPE), None);
    }

    #[test]
    fn support_positions() {
        let support = build_support().unwrap();
        let name = |name: &str| format!("{SUPPORT_NAME}.{name}");
        assert_eq!(support.find_type(&name(INTERCEPTOR_TYPE_NAME)).unwrap().handle, INTERCEPTOR);
        assert_eq!(support.find_type(&name("HostInterceptor")).unwrap().handle, HOST_INTERCEPTOR);
        assert_eq!(support.find_type(&name(INVOCATION_TYPE_NAME)).unwrap().handle, INVOCATION);
        assert!(support.find_method(&name(INVOCATION_TYPE_NAME), "Proceed").is_ok());
    }
}
