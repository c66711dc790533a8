//! Values of interpreted code.
//!
//! Stack values follow the CIL stack types: small integers are widened to [`Value::I4`],
//! floats to [`Value::F`], enums travel as their underlying primitive. Objects live on the
//! heap behind reference-counted [`ObjectRef`]s; managed pointers are [`Pointer`]s naming a
//! storage location.

use std::{
    fmt,
    sync::{Arc, Mutex},
};

use crate::{
    emit::{LiveToken, RuntimeMethod, RuntimeType},
    runtime::invocation::{Interceptor, Invocation},
    Error, Result,
};

/// A storage location: a local, an argument, a static field or a temporary.
pub type Slot = Arc<Mutex<Value>>;

/// Create a slot holding `value`.
#[must_use]
pub fn slot(value: Value) -> Slot {
    Arc::new(Mutex::new(value))
}

/// A value on the evaluation stack or in storage.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// The null reference
    Null,
    /// `int32` and everything narrower, `bool` and `char` included
    I4(i32),
    /// `int64` and `uint64`
    I8(i64),
    /// `native int`, `native uint` and unmanaged pointers
    NativeInt(i64),
    /// `float32` and `float64`
    F(f64),
    /// A heap object
    Object(ObjectRef),
    /// A managed pointer
    ByRef(Pointer),
    /// An unboxed user-defined value type
    Struct {
        /// The value type
        ty: RuntimeType,
        /// Instance fields in layout order
        fields: Vec<Value>,
    },
    /// `RuntimeTypeHandle`, `RuntimeMethodHandle` or `RuntimeFieldHandle` pushed by `ldtoken`
    Token(LiveToken),
    /// A method pointer pushed by `ldftn` or `ldvirtftn`
    FnPtr(RuntimeMethod),
}

impl Value {
    /// `bool` as a stack value.
    #[must_use]
    pub fn from_bool(value: bool) -> Self {
        Value::I4(i32::from(value))
    }

    /// `true` for [`Value::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The truth value `brtrue` sees.
    #[must_use]
    pub fn is_true(&self) -> bool {
        match self {
            Value::Null => false,
            Value::I4(v) => *v != 0,
            Value::I8(v) | Value::NativeInt(v) => *v != 0,
            Value::F(v) => *v != 0.0,
            _ => true,
        }
    }

    /// The value as `int32`, unboxing if needed.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] for values of another kind.
    pub fn as_i32(&self) -> Result<i32> {
        match self {
            Value::I4(v) => Ok(*v),
            Value::Object(object) => object.unboxed()?.as_i32(),
            other => Err(invalid_operation!("Expected int32, found {:?}", other)),
        }
    }

    /// The value as `int64`, widening `int32` and unboxing if needed.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] for values of another kind.
    pub fn as_i64(&self) -> Result<i64> {
        match self {
            Value::I4(v) => Ok(i64::from(*v)),
            Value::I8(v) | Value::NativeInt(v) => Ok(*v),
            Value::Object(object) => object.unboxed()?.as_i64(),
            other => Err(invalid_operation!("Expected int64, found {:?}", other)),
        }
    }

    /// The value as a float, unboxing if needed.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] for values of another kind.
    pub fn as_f64(&self) -> Result<f64> {
        match self {
            Value::F(v) => Ok(*v),
            Value::Object(object) => object.unboxed()?.as_f64(),
            other => Err(invalid_operation!("Expected a float, found {:?}", other)),
        }
    }

    /// The contents of a string object; `None` for null.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] for anything but strings and null.
    pub fn as_str(&self) -> Result<Option<&str>> {
        match self {
            Value::Null => Ok(None),
            Value::Object(object) => object
                .as_str()
                .map(Some)
                .ok_or_else(|| invalid_operation!("Expected a string, found {:?}", object)),
            other => Err(invalid_operation!("Expected a string, found {:?}", other)),
        }
    }

    /// The referenced object; `None` for null.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] for non-reference values.
    pub fn as_object(&self) -> Result<Option<&ObjectRef>> {
        match self {
            Value::Null => Ok(None),
            Value::Object(object) => Ok(Some(object)),
            other => Err(invalid_operation!("Expected an object reference, found {:?}", other)),
        }
    }
}

/// Host payloads of built-in objects.
pub enum NativeData {
    /// An interceptor registered from the host
    Interceptor(Arc<dyn Interceptor>),
    /// The state of one intercepted call
    Invocation(Mutex<Invocation>),
    /// A `System.Type` object
    Type(RuntimeType),
    /// A delegate: bound target and method
    Delegate {
        /// `this` for instance methods, `None` for static ones
        target: Option<Value>,
        /// The method to call
        method: RuntimeMethod,
    },
}

impl fmt::Debug for NativeData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeData::Interceptor(interceptor) => {
                write!(f, "Interceptor({:p})", Arc::as_ptr(interceptor).cast::<()>())
            }
            NativeData::Invocation(_) => write!(f, "Invocation"),
            NativeData::Type(ty) => write!(f, "Type({ty:?})"),
            NativeData::Delegate { method, .. } => write!(f, "Delegate({:?})", method.handle),
        }
    }
}

/// Storage of a heap object.
#[derive(Debug)]
pub enum ObjectData {
    /// Instance fields of a class, in layout order
    Fields(Mutex<Vec<Value>>),
    /// A boxed value type
    Boxed(Mutex<Value>),
    /// An immutable string
    String(String),
    /// Elements of a single-dimension array
    Array(Mutex<Vec<Value>>),
    /// A built-in object with host payload
    Native(NativeData),
}

/// An object on the heap.
#[derive(Debug)]
pub struct HeapObject {
    ty: RuntimeType,
    data: ObjectData,
}

/// A reference to a heap object. Equality is identity.
#[derive(Clone)]
pub struct ObjectRef(Arc<HeapObject>);

impl ObjectRef {
    /// Allocate an object.
    #[must_use]
    pub fn new(ty: RuntimeType, data: ObjectData) -> Self {
        ObjectRef(Arc::new(HeapObject { ty, data }))
    }

    /// The exact runtime type.
    #[must_use]
    pub fn object_type(&self) -> &RuntimeType {
        &self.0.ty
    }

    /// The storage.
    #[must_use]
    pub fn data(&self) -> &ObjectData {
        &self.0.data
    }

    /// Contents of a string object.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match &self.0.data {
            ObjectData::String(text) => Some(text),
            _ => None,
        }
    }

    /// The value inside a boxed object.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if the object is not a box.
    pub fn unboxed(&self) -> Result<Value> {
        match &self.0.data {
            ObjectData::Boxed(value) => Ok(value.lock()?.clone()),
            _ => Err(invalid_operation!("{:?} is not a boxed value", self)),
        }
    }

    /// Read instance field `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] for objects without fields or a bad index.
    pub fn field(&self, index: usize) -> Result<Value> {
        match &self.0.data {
            ObjectData::Fields(fields) => fields
                .lock()?
                .get(index)
                .cloned()
                .ok_or_else(|| invalid_operation!("Field slot {} out of range", index)),
            _ => Err(invalid_operation!("{:?} has no instance fields", self)),
        }
    }

    /// Write instance field `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] for objects without fields or a bad index.
    pub fn set_field(&self, index: usize, value: Value) -> Result<()> {
        match &self.0.data {
            ObjectData::Fields(fields) => {
                let mut fields = fields.lock()?;
                let slot = fields
                    .get_mut(index)
                    .ok_or_else(|| invalid_operation!("Field slot {} out of range", index))?;
                *slot = value;
                Ok(())
            }
            _ => Err(invalid_operation!("{:?} has no instance fields", self)),
        }
    }

    /// Elements of an array, copied.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if the object is not an array.
    pub fn elements(&self) -> Result<Vec<Value>> {
        match &self.0.data {
            ObjectData::Array(elements) => Ok(elements.lock()?.clone()),
            _ => Err(invalid_operation!("{:?} is not an array", self)),
        }
    }

    /// The host payload of a built-in object.
    #[must_use]
    pub fn native(&self) -> Option<&NativeData> {
        match &self.0.data {
            ObjectData::Native(native) => Some(native),
            _ => None,
        }
    }

    /// Identity comparison.
    #[must_use]
    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Address used for identity hashing.
    #[must_use]
    pub fn address(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ObjectRef {}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0.data {
            ObjectData::String(text) => write!(f, "{text:?}"),
            ObjectData::Boxed(value) => match value.try_lock() {
                Ok(value) => write!(f, "box {:?}", *value),
                Err(_) => write!(f, "box <locked>"),
            },
            data => f
                .debug_struct("ObjectRef")
                .field("type", &self.0.ty)
                .field("data", data)
                .finish(),
        }
    }
}

/// A managed pointer.
#[derive(Debug, Clone)]
pub enum Pointer {
    /// A local, argument, static field or temporary
    Slot(Slot),
    /// Instance field `n` of a class object
    Field(ObjectRef, usize),
    /// Element `n` of an array
    Element(ObjectRef, usize),
    /// The contents of a boxed value type
    Boxed(ObjectRef),
    /// Field `n` of the value type behind another pointer
    Member(Box<Pointer>, usize),
}

impl PartialEq for Pointer {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Pointer::Slot(a), Pointer::Slot(b)) => Arc::ptr_eq(a, b),
            (Pointer::Field(a, i), Pointer::Field(b, j))
            | (Pointer::Element(a, i), Pointer::Element(b, j)) => a == b && i == j,
            (Pointer::Boxed(a), Pointer::Boxed(b)) => a == b,
            (Pointer::Member(a, i), Pointer::Member(b, j)) => a == b && i == j,
            _ => false,
        }
    }
}

impl Pointer {
    /// Read the location.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if the location no longer has the shape
    /// the pointer was taken from.
    pub fn load(&self) -> Result<Value> {
        match self {
            Pointer::Slot(slot) => Ok(slot.lock()?.clone()),
            Pointer::Field(object, index) => object.field(*index),
            Pointer::Element(array, index) => match array.data() {
                ObjectData::Array(elements) => elements
                    .lock()?
                    .get(*index)
                    .cloned()
                    .ok_or_else(|| invalid_operation!("Element pointer {} out of range", index)),
                _ => Err(invalid_operation!("Element pointer into a non-array")),
            },
            Pointer::Boxed(object) => object.unboxed(),
            Pointer::Member(inner, index) => match inner.load()? {
                Value::Struct { fields, .. } => fields
                    .get(*index)
                    .cloned()
                    .ok_or_else(|| invalid_operation!("Member pointer {} out of range", index)),
                other => Err(invalid_operation!("Member pointer into {:?}", other)),
            },
        }
    }

    /// Write the location.
    ///
    /// # Errors
    /// See [`Pointer::load`].
    pub fn store(&self, value: Value) -> Result<()> {
        match self {
            Pointer::Slot(slot) => {
                *slot.lock()? = value;
                Ok(())
            }
            Pointer::Field(object, index) => object.set_field(*index, value),
            Pointer::Element(array, index) => match array.data() {
                ObjectData::Array(elements) => {
                    let mut elements = elements.lock()?;
                    let element = elements
                        .get_mut(*index)
                        .ok_or_else(|| invalid_operation!("Element pointer {} out of range", index))?;
                    *element = value;
                    Ok(())
                }
                _ => Err(invalid_operation!("Element pointer into a non-array")),
            },
            Pointer::Boxed(object) => match object.data() {
                ObjectData::Boxed(boxed) => {
                    *boxed.lock()? = value;
                    Ok(())
                }
                _ => Err(invalid_operation!("{:?} is not a boxed value", object)),
            },
            Pointer::Member(inner, index) => {
                let mut outer = inner.load()?;
                match &mut outer {
                    Value::Struct { fields, .. } => {
                        let field = fields
                            .get_mut(*index)
                            .ok_or_else(|| invalid_operation!("Member pointer {} out of range", index))?;
                        *field = value;
                    }
                    other => return Err(invalid_operation!("Member pointer into {:?}", other)),
                }
                inner.store(outer)
            }
        }
    }
}

impl From<Pointer> for Value {
    fn from(pointer: Pointer) -> Self {
        Value::ByRef(pointer)
    }
}

impl From<ObjectRef> for Value {
    fn from(object: ObjectRef) -> Self {
        Value::Object(object)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::I4(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::I8(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::F(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::from_bool(value)
    }
}

impl TryFrom<Value> for ObjectRef {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Object(object) => Ok(object),
            other => Err(invalid_operation!("Expected an object reference, found {:?}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emit::{AssemblyId, TypeHandle};

    fn some_type() -> RuntimeType {
        RuntimeType::Type(TypeHandle::new(AssemblyId(0), 8))
    }

    #[test]
    fn pointers_reach_nested_struct_fields() {
        let inner = Value::Struct {
            ty: some_type(),
            fields: vec![Value::I4(1), Value::I4(2)],
        };
        let outer = slot(Value::Struct {
            ty: some_type(),
            fields: vec![inner, Value::Null],
        });
        let pointer = Pointer::Member(
            Box::new(Pointer::Member(Box::new(Pointer::Slot(outer.clone())), 0)),
            1,
        );
        assert_eq!(pointer.load().unwrap(), Value::I4(2));
        pointer.store(Value::I4(7)).unwrap();

        let Value::Struct { fields, .. } = outer.lock().unwrap().clone() else {
            panic!("outer is no longer a struct");
        };
        let Value::Struct { fields: inner, .. } = &fields[0] else {
            panic!("inner is no longer a struct");
        };
        assert_eq!(inner[1], Value::I4(7));
    }

    #[test]
    fn boxes_are_shared_and_identity_compared() {
        let boxed = ObjectRef::new(some_type(), ObjectData::Boxed(Mutex::new(Value::I4(41))));
        let alias = boxed.clone();
        Pointer::Boxed(boxed.clone()).store(Value::I4(42)).unwrap();
        assert_eq!(alias.unboxed().unwrap(), Value::I4(42));
        assert_eq!(Value::Object(alias).as_i32().unwrap(), 42);

        let other = ObjectRef::new(some_type(), ObjectData::Boxed(Mutex::new(Value::I4(42))));
        assert_ne!(boxed, other);
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Null.is_true());
        assert!(!Value::I4(0).is_true());
        assert!(Value::I8(-1).is_true());
        assert!(Value::Object(ObjectRef::new(some_type(), ObjectData::String(String::new()))).is_true());
    }
}
