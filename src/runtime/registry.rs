//! Interceptor registration on woven methods.
//!
//! A woven method owns two companions in its declaring type: a private static stub slot
//! holding `null` or an `IInterceptor[]`, and a private target method carrying the original
//! body. Both are found by name, see [`stub_field_name`] and [`target_method_name`].
//!
//! Registration never edits an array in place: each change builds a new array and replaces
//! the slot value, so a call that already loaded the slot keeps a consistent chain.

use std::sync::{Arc, Mutex};

use log::debug;

use crate::{
    emit::{FieldHandle, MethodHandle, RuntimeType},
    runtime::{
        corlib::{HOST_INTERCEPTOR, INTERCEPTOR},
        invocation::{unwrap_interceptor, Interceptor},
        value::{NativeData, ObjectData, ObjectRef, Slot, Value},
        Domain,
    },
    Error, Result,
};

/// Serializes every registration change in the process.
static REGISTRATION: Mutex<()> = Mutex::new(());

/// Name of the stub slot woven for method `name` at position `index` of its type.
#[must_use]
pub fn stub_field_name(name: &str, index: usize) -> String {
    format!("<Stub>{name}#{index}")
}

/// Name of the target method woven for method `name` at position `index` of its type.
#[must_use]
pub fn target_method_name(name: &str, index: usize) -> String {
    format!("<Target>{name}#{index}")
}

fn same_interceptor(a: &Arc<dyn Interceptor>, b: &Arc<dyn Interceptor>) -> bool {
    std::ptr::eq(Arc::as_ptr(a).cast::<()>(), Arc::as_ptr(b).cast::<()>())
}

impl Domain {
    /// The stub slot of a woven method.
    ///
    /// # Errors
    /// Returns [`Error::NotInterceptable`] if the method has no stub slot and target method.
    pub fn stub_field(&self, method: MethodHandle) -> Result<FieldHandle> {
        let live = self.method(method)?;
        let ty = self.live_type(method.declaring)?;
        let index = method.index as usize;
        let stub = ty.field_by_name(&stub_field_name(&live.name, index));
        let target = ty.method_by_name(&target_method_name(&live.name, index)).ok();
        match (stub, target) {
            (Some(stub), Some(_)) => Ok(stub),
            _ => Err(Error::NotInterceptable(format!(
                "{}::{} was not woven",
                ty.full_name(),
                live.name
            ))),
        }
    }

    /// `true` if `method` was woven and accepts interceptors.
    #[must_use]
    pub fn is_interceptable(&self, method: MethodHandle) -> bool {
        self.stub_field(method).is_ok()
    }

    fn stub_storage(&self, method: MethodHandle) -> Result<Slot> {
        let field = self.stub_field(method)?;
        self.static_storage(field)
    }

    fn chain_of(storage: &Slot) -> Result<Vec<Value>> {
        match &*storage.lock()? {
            Value::Null => Ok(Vec::new()),
            Value::Object(array) => array.elements(),
            other => Err(invalid_operation!("Stub slot holds {:?}", other)),
        }
    }

    fn store_chain(storage: &Slot, chain: Vec<Value>) -> Result<()> {
        let value = if chain.is_empty() {
            Value::Null
        } else {
            Value::Object(ObjectRef::new(
                RuntimeType::Type(INTERCEPTOR).make_array(0),
                ObjectData::Array(Mutex::new(chain)),
            ))
        };
        *storage.lock()? = value;
        Ok(())
    }

    /// Append `interceptor` to the chain of a woven method.
    ///
    /// Interceptors run in registration order for every call that loads the stub slot
    /// after this returns.
    ///
    /// # Errors
    /// Returns [`Error::NotInterceptable`] for methods that were not woven.
    pub fn add_interceptor(&self, method: MethodHandle, interceptor: Arc<dyn Interceptor>) -> Result<()> {
        let storage = self.stub_storage(method)?;
        let _registration = REGISTRATION.lock()?;
        let mut chain = Self::chain_of(&storage)?;
        chain.push(Value::Object(ObjectRef::new(
            RuntimeType::Type(HOST_INTERCEPTOR),
            ObjectData::Native(NativeData::Interceptor(interceptor)),
        )));
        let count = chain.len();
        Self::store_chain(&storage, chain)?;
        debug!("Interceptor added to {:?}, {} registered", method, count);
        Ok(())
    }

    /// Remove the first registration of `interceptor` from a woven method.
    ///
    /// Returns `false` and leaves the chain untouched if it was not registered. Removing the
    /// last interceptor empties the stub slot, restoring the fast path.
    ///
    /// # Errors
    /// Returns [`Error::NotInterceptable`] for methods that were not woven.
    pub fn remove_interceptor(&self, method: MethodHandle, interceptor: &Arc<dyn Interceptor>) -> Result<bool> {
        let storage = self.stub_storage(method)?;
        let _registration = REGISTRATION.lock()?;
        let mut chain = Self::chain_of(&storage)?;
        let mut position = None;
        for (index, entry) in chain.iter().enumerate() {
            if same_interceptor(&unwrap_interceptor(entry)?, interceptor) {
                position = Some(index);
                break;
            }
        }
        let Some(position) = position else {
            return Ok(false);
        };
        chain.remove(position);
        let count = chain.len();
        Self::store_chain(&storage, chain)?;
        debug!("Interceptor removed from {:?}, {} registered", method, count);
        Ok(true)
    }

    /// The interceptors currently registered on a woven method, in call order.
    ///
    /// # Errors
    /// Returns [`Error::NotInterceptable`] for methods that were not woven.
    pub fn interceptors(&self, method: MethodHandle) -> Result<Vec<Arc<dyn Interceptor>>> {
        let storage = self.stub_storage(method)?;
        Self::chain_of(&storage)?.iter().map(unwrap_interceptor).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        emit::{AssemblyBuilder, CodeWriter, EmitOpCode, LiveParameter, LiveSignature},
        metadata::{
            definitions::{FieldAttributes, MethodAttributes, MethodImplAttributes, TypeAttributes},
            signatures::CallingConvention,
            typesystem::{AssemblyName, PrimitiveType},
        },
        runtime::{corlib, invocation::Invocation},
    };
    use uguid::Guid;

    /// A type with `Plain` and a hand-woven `Woven`, returning their handles.
    fn woven_fixture(domain: &Domain) -> (MethodHandle, MethodHandle) {
        let mut builder = AssemblyBuilder::new(domain.reserve_id(), AssemblyName::new("Registry"));
        let module = builder.define_module("Registry.dll", Guid::ZERO);
        let ty = builder
            .define_type(module, "Tests", "Subject", TypeAttributes::PUBLIC, None)
            .unwrap();
        let void = corlib::primitive_type(PrimitiveType::Void);
        let method = |builder: &mut AssemblyBuilder, name: &str| {
            let handle = builder
                .define_method(
                    ty,
                    name,
                    MethodAttributes::PUBLIC | MethodAttributes::STATIC,
                    MethodImplAttributes::empty(),
                    Vec::new(),
                )
                .unwrap();
            let signature = LiveSignature {
                has_this: false,
                convention: CallingConvention::Default,
                generic_arity: 0,
                return_type: void.clone(),
                parameters: Vec::new(),
            };
            builder
                .set_signature(handle, signature, Vec::new(), LiveParameter::default())
                .unwrap();
            let mut writer = CodeWriter::new(0);
            writer.emit_simple(EmitOpCode::Ret).unwrap();
            builder.set_body(handle, writer.finish().unwrap()).unwrap();
            handle
        };
        let plain = method(&mut builder, "Plain");
        let woven = method(&mut builder, "Woven");
        method(&mut builder, &target_method_name("Woven", woven.index as usize));
        builder
            .define_field(
                ty,
                &stub_field_name("Woven", woven.index as usize),
                FieldAttributes::PRIVATE | FieldAttributes::STATIC,
                RuntimeType::Type(INTERCEPTOR).make_array(0),
            )
            .unwrap();
        domain.register(builder.seal().unwrap()).unwrap();
        (plain, woven)
    }

    fn noop() -> Arc<dyn Interceptor> {
        Arc::new(|invocation: &mut Invocation| invocation.proceed())
    }

    #[test]
    fn unwoven_methods_are_rejected() {
        let domain = Domain::new().unwrap();
        let (plain, woven) = woven_fixture(&domain);
        assert!(!domain.is_interceptable(plain));
        assert!(domain.is_interceptable(woven));
        assert!(matches!(
            domain.add_interceptor(plain, noop()),
            Err(Error::NotInterceptable(_))
        ));
        assert!(matches!(
            domain.remove_interceptor(plain, &noop()),
            Err(Error::NotInterceptable(_))
        ));
    }

    #[test]
    fn registration_keeps_order_and_remove_is_idempotent() {
        let domain = Domain::new().unwrap();
        let (_, woven) = woven_fixture(&domain);
        let first = noop();
        let second = noop();
        domain.add_interceptor(woven, Arc::clone(&first)).unwrap();
        domain.add_interceptor(woven, Arc::clone(&second)).unwrap();

        let chain = domain.interceptors(woven).unwrap();
        assert_eq!(chain.len(), 2);
        assert!(same_interceptor(&chain[0], &first));
        assert!(same_interceptor(&chain[1], &second));

        assert!(!domain.remove_interceptor(woven, &noop()).unwrap());
        assert_eq!(domain.interceptors(woven).unwrap().len(), 2);

        assert!(domain.remove_interceptor(woven, &first).unwrap());
        assert!(!domain.remove_interceptor(woven, &first).unwrap());
        let chain = domain.interceptors(woven).unwrap();
        assert_eq!(chain.len(), 1);
        assert!(same_interceptor(&chain[0], &second));

        assert!(domain.remove_interceptor(woven, &second).unwrap());
        let stub = domain.stub_field(woven).unwrap();
        assert_eq!(domain.static_value(stub).unwrap(), Value::Null);
    }

    #[test]
    fn concurrent_registration_loses_nothing() {
        let domain = Domain::new().unwrap();
        let (_, woven) = woven_fixture(&domain);
        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..16 {
                        domain.add_interceptor(woven, noop()).unwrap();
                    }
                });
            }
        });
        assert_eq!(domain.interceptors(woven).unwrap().len(), 128);
    }
}
