//! Type queries the interpreter and the invocation chain need at run time.

use std::{collections::HashMap, sync::Arc, sync::Mutex};

use crate::{
    emit::{FieldHandle, LiveSignature, RuntimeMethod, RuntimeType, TypeHandle},
    metadata::{
        definitions::{Constant, MethodAttributes},
        typesystem::PrimitiveType,
    },
    runtime::{
        corlib::{self, Fault},
        value::{ObjectData, ObjectRef, Value},
        Domain,
    },
    Result,
};

/// Name of the instance field holding an enum's value.
const ENUM_VALUE_FIELD: &str = "value__";

/// Instance field layout of a type: inherited fields first, in declaration order.
#[derive(Debug)]
pub(crate) struct Layout {
    /// Fields and their types, expressed in the type's own generic parameters
    pub fields: Vec<(FieldHandle, RuntimeType)>,
    index: HashMap<FieldHandle, usize>,
}

fn integer_of(value: &Value) -> Option<i64> {
    match value {
        Value::I4(v) => Some(i64::from(*v)),
        Value::I8(v) | Value::NativeInt(v) => Some(*v),
        _ => None,
    }
}

impl Domain {
    /// `true` if `ty` is a value type: derived from `System.ValueType` or `System.Enum`.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnresolvedSymbol`] for unknown types.
    pub fn is_value_type(&self, ty: &RuntimeType) -> Result<bool> {
        match ty.definition() {
            Some(handle) => self.is_value_definition(handle),
            None => Ok(false),
        }
    }

    fn is_value_definition(&self, handle: TypeHandle) -> Result<bool> {
        if handle == corlib::VALUE_TYPE || handle == corlib::ENUM {
            return Ok(false);
        }
        let live = self.live_type(handle)?;
        Ok(matches!(
            live.base_type.as_ref().and_then(RuntimeType::definition),
            Some(base) if base == corlib::VALUE_TYPE || base == corlib::ENUM
        ))
    }

    /// `true` for `System.Void`.
    #[must_use]
    pub fn is_void(&self, ty: &RuntimeType) -> bool {
        *ty == corlib::primitive_type(PrimitiveType::Void)
    }

    /// The primitive `ty` is stored as: itself for primitives, the underlying type for enums.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnresolvedSymbol`] for unknown types.
    pub fn primitive(&self, ty: &RuntimeType) -> Result<Option<PrimitiveType>> {
        let RuntimeType::Type(handle) = ty else {
            return Ok(None);
        };
        if let Some(primitive) = corlib::primitive_of(*handle) {
            return Ok(Some(primitive));
        }
        let live = self.live_type(*handle)?;
        if live.base_type.as_ref().and_then(RuntimeType::definition) != Some(corlib::ENUM) {
            return Ok(None);
        }
        match live
            .fields
            .iter()
            .find(|field| field.name == ENUM_VALUE_FIELD && !field.is_static())
        {
            Some(field) => self.primitive(&field.field_type),
            None => Ok(Some(PrimitiveType::I4)),
        }
    }

    /// Readable name of a type, `Namespace.Outer+Inner[Arg]` style.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnresolvedSymbol`] for unknown types.
    pub fn type_name(&self, ty: &RuntimeType) -> Result<String> {
        Ok(match ty {
            RuntimeType::Type(handle) => {
                let live = self.live_type(*handle)?;
                match live.declaring {
                    Some(outer) => format!("{}+{}", self.type_name(&RuntimeType::Type(outer))?, live.name),
                    None => live.full_name(),
                }
            }
            RuntimeType::GenericInstance(definition, arguments) => {
                let arguments = arguments
                    .iter()
                    .map(|argument| self.type_name(argument))
                    .collect::<Result<Vec<_>>>()?;
                format!(
                    "{}[{}]",
                    self.type_name(&RuntimeType::Type(*definition))?,
                    arguments.join(",")
                )
            }
            RuntimeType::GenericParameter { owner, position } => self
                .live_type(*owner)?
                .generic_parameters
                .get(usize::from(*position))
                .map_or_else(|| format!("!{position}"), |parameter| parameter.name.clone()),
            RuntimeType::MethodGenericParameter { owner, position } => self
                .method(*owner)?
                .generic_parameters
                .get(usize::from(*position))
                .map_or_else(|| format!("!!{position}"), |parameter| parameter.name.clone()),
            RuntimeType::Vector(element) => format!("{}[]", self.type_name(element)?),
            RuntimeType::Array(element, rank) => format!(
                "{}[{}]",
                self.type_name(element)?,
                ",".repeat((*rank as usize).saturating_sub(1))
            ),
            RuntimeType::Pointer(element) => format!("{}*", self.type_name(element)?),
            RuntimeType::ByRef(element) => format!("{}&", self.type_name(element)?),
        })
    }

    /// The direct base type, instantiated as seen from `ty`.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnresolvedSymbol`] for unknown types.
    pub fn base_type(&self, ty: &RuntimeType) -> Result<Option<RuntimeType>> {
        match ty {
            RuntimeType::Type(handle) | RuntimeType::GenericInstance(handle, _) => Ok(self
                .live_type(*handle)?
                .base_type
                .as_ref()
                .map(|base| base.substitute(ty.type_arguments(), &[]))),
            RuntimeType::Vector(_) | RuntimeType::Array(..) => Ok(Some(RuntimeType::Type(corlib::ARRAY))),
            _ => Ok(None),
        }
    }

    fn interfaces(&self, ty: &RuntimeType) -> Result<Vec<RuntimeType>> {
        match ty.definition() {
            Some(handle) => Ok(self
                .live_type(handle)?
                .interfaces
                .iter()
                .map(|interface| interface.substitute(ty.type_arguments(), &[]))
                .collect()),
            None => Ok(Vec::new()),
        }
    }

    fn implements(&self, interface: &RuntimeType, target: &RuntimeType) -> Result<bool> {
        if interface == target {
            return Ok(true);
        }
        for inherited in self.interfaces(interface)? {
            if self.implements(&inherited, target)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// `true` if a value of runtime type `ty` may be stored where `target` is expected.
    ///
    /// Walks the base chain and all implemented interfaces; reference-type arrays are
    /// covariant.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnresolvedSymbol`] for unknown types.
    pub fn is_instance(&self, ty: &RuntimeType, target: &RuntimeType) -> Result<bool> {
        if ty == target || *target == corlib::primitive_type(PrimitiveType::Object) {
            return Ok(true);
        }
        if let (RuntimeType::Vector(element), RuntimeType::Vector(target_element)) = (ty, target) {
            if self.is_value_type(element)? || self.is_value_type(target_element)? {
                return Ok(element == target_element);
            }
            return self.is_instance(element, target_element);
        }

        let mut current = Some(ty.clone());
        while let Some(candidate) = current {
            if candidate == *target {
                return Ok(true);
            }
            for interface in self.interfaces(&candidate)? {
                if self.implements(&interface, target)? {
                    return Ok(true);
                }
            }
            current = self.base_type(&candidate)?;
        }
        Ok(false)
    }

    /// The instance field layout of a type definition.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnresolvedSymbol`] for unknown types.
    pub(crate) fn layout(&self, handle: TypeHandle) -> Result<Arc<Layout>> {
        if let Some(layout) = self.inner.layouts.get(&handle) {
            return Ok(Arc::clone(layout.value()));
        }

        let live = self.live_type(handle)?;
        let mut fields = Vec::new();
        if let Some(base) = &live.base_type {
            if let Some(base_handle) = base.definition() {
                let inherited = self.layout(base_handle)?;
                fields.extend(inherited.fields.iter().map(|(field, field_type)| {
                    (*field, field_type.substitute(base.type_arguments(), &[]))
                }));
            }
        }
        fields.extend(
            live.fields
                .iter()
                .enumerate()
                .filter(|(_, field)| !field.is_static())
                .map(|(index, field)| {
                    (
                        FieldHandle {
                            declaring: handle,
                            index: index as u32,
                        },
                        field.field_type.clone(),
                    )
                }),
        );
        let index = fields
            .iter()
            .enumerate()
            .map(|(slot, (field, _))| (*field, slot))
            .collect();
        let layout = Arc::new(Layout { fields, index });
        self.inner.layouts.insert(handle, Arc::clone(&layout));
        Ok(layout)
    }

    /// Position of an instance field in the storage of objects of its declaring type and
    /// all derived types.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] for static or unknown fields.
    pub fn field_slot(&self, field: FieldHandle) -> Result<usize> {
        self.layout(field.declaring)?
            .index
            .get(&field)
            .copied()
            .ok_or_else(|| invalid_operation!("{:?} is not an instance field", field))
    }

    fn instance_defaults(&self, ty: &RuntimeType) -> Result<Vec<Value>> {
        let handle = ty
            .definition()
            .ok_or_else(|| invalid_operation!("Cannot lay out {:?}", ty))?;
        self.layout(handle)?
            .fields
            .iter()
            .map(|(_, field_type)| self.default_value(&field_type.substitute(ty.type_arguments(), &[])))
            .collect()
    }

    /// The zero value of a type: `0`, `null`, or a zeroed struct.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnresolvedSymbol`] for unknown types.
    pub fn default_value(&self, ty: &RuntimeType) -> Result<Value> {
        if let Some(primitive) = self.primitive(ty)? {
            return Ok(match primitive {
                PrimitiveType::I8 | PrimitiveType::U8 => Value::I8(0),
                PrimitiveType::R4 | PrimitiveType::R8 => Value::F(0.0),
                PrimitiveType::I | PrimitiveType::U => Value::NativeInt(0),
                PrimitiveType::String
                | PrimitiveType::Object
                | PrimitiveType::Void
                | PrimitiveType::TypedByRef => Value::Null,
                _ => Value::I4(0),
            });
        }
        match ty {
            RuntimeType::Pointer(_) => Ok(Value::NativeInt(0)),
            RuntimeType::Type(_) | RuntimeType::GenericInstance(..) if self.is_value_type(ty)? => {
                Ok(Value::Struct {
                    ty: ty.clone(),
                    fields: self.instance_defaults(ty)?,
                })
            }
            _ => Ok(Value::Null),
        }
    }

    /// Allocate an instance of a class with all fields zeroed; no constructor runs.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] for shapes that cannot be instantiated.
    pub fn allocate(&self, ty: &RuntimeType) -> Result<ObjectRef> {
        if self.is_value_type(ty)? {
            let value = self.default_value(ty)?;
            return Ok(ObjectRef::new(ty.clone(), ObjectData::Boxed(Mutex::new(value))));
        }
        Ok(ObjectRef::new(
            ty.clone(),
            ObjectData::Fields(Mutex::new(self.instance_defaults(ty)?)),
        ))
    }

    /// The stack value of a literal.
    #[must_use]
    pub fn constant_value(&self, constant: &Constant) -> Value {
        match constant {
            Constant::Bool(v) => Value::from_bool(*v),
            Constant::Char(v) => Value::I4(i32::from(*v)),
            Constant::I1(v) => Value::I4(i32::from(*v)),
            Constant::U1(v) => Value::I4(i32::from(*v)),
            Constant::I2(v) => Value::I4(i32::from(*v)),
            Constant::U2(v) => Value::I4(i32::from(*v)),
            Constant::I4(v) => Value::I4(*v),
            Constant::U4(v) => Value::I4(*v as i32),
            Constant::I8(v) => Value::I8(*v),
            Constant::U8(v) => Value::I8(*v as i64),
            Constant::R4(v) => Value::F(f64::from(*v)),
            Constant::R8(v) => Value::F(*v),
            Constant::String(v) => self.new_string(v.clone()),
            Constant::Null => Value::Null,
        }
    }

    /// Truncate or widen a stack value to the storage of `ty`.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnresolvedSymbol`] for unknown types.
    pub fn normalize(&self, value: Value, ty: &RuntimeType) -> Result<Value> {
        let Some(primitive) = self.primitive(ty)? else {
            return Ok(value);
        };
        let normalized = match primitive {
            PrimitiveType::Boolean
            | PrimitiveType::Char
            | PrimitiveType::I1
            | PrimitiveType::U1
            | PrimitiveType::I2
            | PrimitiveType::U2
            | PrimitiveType::I4
            | PrimitiveType::U4 => integer_of(&value).map(|v| {
                Value::I4(match primitive {
                    PrimitiveType::I1 => i32::from(v as i8),
                    PrimitiveType::U1 | PrimitiveType::Boolean => i32::from(v as u8),
                    PrimitiveType::I2 => i32::from(v as i16),
                    PrimitiveType::U2 | PrimitiveType::Char => i32::from(v as u16),
                    _ => v as i32,
                })
            }),
            PrimitiveType::I8 | PrimitiveType::U8 => integer_of(&value).map(Value::I8),
            PrimitiveType::I | PrimitiveType::U => integer_of(&value).map(Value::NativeInt),
            PrimitiveType::R4 => match value {
                Value::F(v) => Some(Value::F(f64::from(v as f32))),
                _ => None,
            },
            _ => None,
        };
        Ok(normalized.unwrap_or(value))
    }

    /// Box a value of type `ty`; references pass through unchanged.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnresolvedSymbol`] for unknown types.
    pub fn box_value(&self, value: Value, ty: &RuntimeType) -> Result<Value> {
        if !self.is_value_type(ty)? || matches!(value, Value::Object(_) | Value::Null) {
            return Ok(value);
        }
        let value = self.normalize(value, ty)?;
        Ok(Value::Object(ObjectRef::new(
            ty.clone(),
            ObjectData::Boxed(Mutex::new(value)),
        )))
    }

    /// Unbox a value to type `ty`; references pass through unchanged.
    ///
    /// A box of an enum and a box of its underlying type unbox to each other.
    ///
    /// # Errors
    /// Raises `NullReferenceException` for null and `InvalidCastException` for a box of
    /// another type.
    pub fn unbox_value(&self, value: Value, ty: &RuntimeType) -> Result<Value> {
        if !self.is_value_type(ty)? {
            return Ok(value);
        }
        match value {
            Value::Null => Err(self.raise(
                Fault::NullReference,
                "Object reference not set to an instance of an object.",
            )),
            Value::Object(object) => {
                let compatible = object.object_type() == ty || {
                    let expected = self.primitive(ty)?;
                    expected.is_some() && expected == self.primitive(object.object_type())?
                };
                if !compatible || !matches!(object.data(), ObjectData::Boxed(_)) {
                    return Err(self.raise(
                        Fault::InvalidCast,
                        &format!(
                            "Unable to cast object of type '{}' to type '{}'.",
                            self.type_name(object.object_type())?,
                            self.type_name(ty)?
                        ),
                    ));
                }
                self.normalize(object.unboxed()?, ty)
            }
            other => self.normalize(other, ty),
        }
    }

    /// The signature of a method as seen through its call-site instantiation.
    ///
    /// # Errors
    /// Returns lookup errors and [`crate::Error::InvalidOperation`] for incomplete methods.
    pub fn signature_of(&self, method: &RuntimeMethod) -> Result<LiveSignature> {
        let live = self.method(method.handle)?;
        Ok(live
            .signature()?
            .substitute(method.owner.type_arguments(), &method.instantiation))
    }

    /// The type in the hierarchy of `ty` whose definition is `definition`, instantiated.
    fn find_in_hierarchy(&self, ty: &RuntimeType, definition: TypeHandle) -> Result<Option<RuntimeType>> {
        let mut current = Some(ty.clone());
        while let Some(candidate) = current {
            if candidate.definition() == Some(definition) {
                return Ok(Some(candidate));
            }
            current = self.base_type(&candidate)?;
        }
        Ok(None)
    }

    /// The implementation `callvirt method` reaches on an object of runtime type `ty`.
    ///
    /// Explicit overrides win; otherwise the most derived virtual method with the same name
    /// and signature shape. Methods marked `newslot` hide instead of override, except when
    /// they implement an interface method.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnresolvedSymbol`] if no implementation exists.
    pub fn resolve_virtual(&self, ty: &RuntimeType, method: &RuntimeMethod) -> Result<RuntimeMethod> {
        let declared = self.method(method.handle)?;
        if !declared.is_virtual() {
            return Ok(method.clone());
        }
        let lookup_type = match ty {
            RuntimeType::Vector(_) | RuntimeType::Array(..) => RuntimeType::Type(corlib::ARRAY),
            other => other.clone(),
        };
        let Some(runtime_definition) = lookup_type.definition() else {
            return Ok(method.clone());
        };

        let cached = self
            .inner
            .dispatch
            .get(&(runtime_definition, method.handle))
            .map(|entry| *entry.value());
        if let Some(handle) = cached {
            let owner = self
                .find_in_hierarchy(&lookup_type, handle.declaring)?
                .unwrap_or(RuntimeType::Type(handle.declaring));
            return Ok(RuntimeMethod {
                handle,
                owner,
                instantiation: method.instantiation.clone(),
            });
        }

        let declared_signature = declared
            .signature()?
            .substitute(method.owner.type_arguments(), &[]);
        let for_interface = self.live_type(method.handle.declaring)?.is_interface();

        let mut current = Some(lookup_type);
        while let Some(candidate) = current {
            let Some(handle) = candidate.definition() else {
                break;
            };
            let live = self.live_type(handle)?;
            let explicit = live
                .methods
                .iter()
                .find(|m| m.overrides.iter().any(|o| o.handle == method.handle));
            let implicit = || {
                live.methods.iter().find(|m| {
                    m.handle == method.handle
                        || (m.is_virtual()
                            && m.name == declared.name
                            && (for_interface || !m.attributes.contains(MethodAttributes::NEW_SLOT))
                            && m.signature.as_ref().is_some_and(|signature| {
                                signature
                                    .substitute(candidate.type_arguments(), &[])
                                    .same_shape(&declared_signature)
                            }))
                })
            };
            if let Some(found) = explicit.or_else(implicit) {
                self.inner
                    .dispatch
                    .insert((runtime_definition, method.handle), found.handle);
                return Ok(RuntimeMethod {
                    handle: found.handle,
                    owner: candidate,
                    instantiation: method.instantiation.clone(),
                });
            }
            current = self.base_type(&candidate)?;
        }
        Err(unresolved!(
            "{} has no implementation of {}",
            self.type_name(ty)?,
            declared.name
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_classification() {
        let domain = Domain::new().unwrap();
        let int32 = corlib::primitive_type(PrimitiveType::I4);
        let string = corlib::primitive_type(PrimitiveType::String);
        assert!(domain.is_value_type(&int32).unwrap());
        assert!(!domain.is_value_type(&string).unwrap());
        assert!(!domain.is_value_type(&RuntimeType::Type(corlib::VALUE_TYPE)).unwrap());
        assert_eq!(domain.primitive(&int32).unwrap(), Some(PrimitiveType::I4));
        assert_eq!(domain.type_name(&int32.clone().make_array(0)).unwrap(), "System.Int32[]");
    }

    #[test]
    fn boxing_round_trip_and_faults() {
        let domain = Domain::new().unwrap();
        let int32 = corlib::primitive_type(PrimitiveType::I4);
        let int64 = corlib::primitive_type(PrimitiveType::I8);
        let boxed = domain.box_value(Value::I4(7), &int32).unwrap();
        assert_eq!(domain.unbox_value(boxed.clone(), &int32).unwrap(), Value::I4(7));
        assert!(matches!(
            domain.unbox_value(boxed, &int64),
            Err(crate::Error::Exception(_))
        ));
        assert!(matches!(
            domain.unbox_value(Value::Null, &int32),
            Err(crate::Error::Exception(_))
        ));
    }

    #[test]
    fn normalization_truncates() {
        let domain = Domain::new().unwrap();
        let byte = corlib::primitive_type(PrimitiveType::U1);
        let sbyte = corlib::primitive_type(PrimitiveType::I1);
        assert_eq!(domain.normalize(Value::I4(0x1ff), &byte).unwrap(), Value::I4(0xff));
        assert_eq!(domain.normalize(Value::I4(0xff), &sbyte).unwrap(), Value::I4(-1));
    }

    #[test]
    fn hierarchy_queries() {
        let domain = Domain::new().unwrap();
        let object = corlib::primitive_type(PrimitiveType::Object);
        let divide = RuntimeType::Type(Fault::DivideByZero.handle());
        let exception = RuntimeType::Type(corlib::EXCEPTION);
        assert!(domain.is_instance(&divide, &exception).unwrap());
        assert!(!domain.is_instance(&exception, &divide).unwrap());

        let strings = corlib::primitive_type(PrimitiveType::String).make_array(0);
        assert!(domain.is_instance(&strings, &object.clone().make_array(0)).unwrap());
        let ints = corlib::primitive_type(PrimitiveType::I4).make_array(0);
        assert!(!domain.is_instance(&ints, &object.make_array(0)).unwrap());
    }

    #[test]
    fn virtual_dispatch_finds_base_implementation() {
        let domain = Domain::new().unwrap();
        let to_string = domain.find_method("mscorlib", "System.Object", "ToString").unwrap();
        let resolved = domain
            .resolve_virtual(&RuntimeType::Type(corlib::EXCEPTION), &RuntimeMethod::plain(to_string))
            .unwrap();
        assert_eq!(resolved.handle, to_string);
        assert_eq!(resolved.owner, corlib::primitive_type(PrimitiveType::Object));
    }
}
