//! The execution domain.
//!
//! A [`Domain`] owns every live assembly loaded into it, the storage of their static fields
//! and the record of which class constructors already ran. It is cheap to clone; clones share
//! the same state and may be used from several threads at once.

use std::{
    cell::RefCell,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc, Mutex, RwLock,
    },
};

use dashmap::DashMap;

use crate::{
    emit::{
        AssemblyId, FieldHandle, LiveField, LiveMethod, LiveType, LoadedAssembly, MethodHandle,
        RuntimeMethod, RuntimeType, TypeHandle,
    },
    instrument::{StagedModuleBuilder, TypeFilter},
    metadata::{
        definitions::{MethodImplAttributes, StaticAssembly},
        typesystem::{AssemblyName, PrimitiveType},
    },
    runtime::{
        corlib::{self, Fault, CORLIB_ALIASES, EXCEPTION_MESSAGE},
        interpreter,
        typeinfo::Layout,
        value::{slot, NativeData, ObjectData, ObjectRef, Pointer, Slot, Value},
    },
    Error, Result,
};

/// File extensions probed when loading an assembly by name.
const ASSEMBLY_EXTENSIONS: &[&str] = &["dll", "exe"];

thread_local! {
    /// Assemblies this thread is loading, keyed by domain.
    static LOADING: RefCell<Vec<(usize, String)>> = const { RefCell::new(Vec::new()) };
}

pub(crate) struct DomainState {
    assemblies: DashMap<AssemblyId, Arc<LoadedAssembly>>,
    order: boxcar::Vec<AssemblyId>,
    names: DashMap<String, AssemblyId>,
    next_id: AtomicU32,
    search_paths: RwLock<Vec<PathBuf>>,
    loads: DashMap<String, Arc<Mutex<()>>>,
    statics: DashMap<FieldHandle, Slot>,
    initialized: DashMap<TypeHandle, ()>,
    pub(crate) layouts: DashMap<TypeHandle, Arc<Layout>>,
    pub(crate) dispatch: DashMap<(TypeHandle, MethodHandle), MethodHandle>,
    type_objects: DashMap<RuntimeType, ObjectRef>,
}

/// Loaded assemblies and their runtime state.
///
/// # Examples
///
/// ```rust,no_run
/// use dotweave::Domain;
/// use std::path::Path;
///
/// let domain = Domain::new()?;
/// let assembly = domain.load_file(Path::new("Samples.dll"))?;
/// let method = domain.find_method(assembly.name(), "Samples.Calculator", "Add")?;
/// # Ok::<(), dotweave::Error>(())
/// ```
#[derive(Clone)]
pub struct Domain {
    pub(crate) inner: Arc<DomainState>,
}

impl std::fmt::Debug for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Domain")
            .field("assemblies", &self.inner.order.count())
            .finish_non_exhaustive()
    }
}

impl Domain {
    /// A domain holding only the built-in assemblies.
    ///
    /// # Errors
    /// Fails only if the built-in assemblies cannot be declared.
    pub fn new() -> Result<Domain> {
        Self::with_search_paths(Vec::new())
    }

    /// A domain that loads referenced assemblies from `search_paths`, in order.
    ///
    /// # Errors
    /// See [`Domain::new`].
    pub fn with_search_paths(search_paths: Vec<PathBuf>) -> Result<Domain> {
        let domain = Domain {
            inner: Arc::new(DomainState {
                assemblies: DashMap::new(),
                order: boxcar::Vec::new(),
                names: DashMap::new(),
                next_id: AtomicU32::new(corlib::SUPPORT_ID.0 + 1),
                search_paths: RwLock::new(search_paths),
                loads: DashMap::new(),
                statics: DashMap::new(),
                initialized: DashMap::new(),
                layouts: DashMap::new(),
                dispatch: DashMap::new(),
                type_objects: DashMap::new(),
            }),
        };
        domain.register(corlib::build_corlib()?)?;
        domain.register(corlib::build_support()?)?;
        for alias in CORLIB_ALIASES {
            domain.inner.names.insert((*alias).to_string(), corlib::CORLIB_ID);
        }
        Ok(domain)
    }

    /// Append a directory to the search path, unless it is already on it.
    ///
    /// # Errors
    /// Returns [`crate::Error::LockError`] if the path list is poisoned.
    pub fn add_search_path(&self, path: impl Into<PathBuf>) -> Result<()> {
        let path = path.into();
        let mut paths = self.inner.search_paths.write()?;
        if !paths.contains(&path) {
            paths.push(path);
        }
        Ok(())
    }

    /// The directories searched for referenced assemblies.
    ///
    /// # Errors
    /// Returns [`crate::Error::LockError`] if the path list is poisoned.
    pub fn search_paths(&self) -> Result<Vec<PathBuf>> {
        Ok(self.inner.search_paths.read()?.clone())
    }

    /// Reserve an id for an assembly about to be built.
    #[must_use]
    pub fn reserve_id(&self) -> AssemblyId {
        AssemblyId(self.inner.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Make a sealed assembly visible to lookups and execution.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if an assembly with the same simple name
    /// or id is already registered.
    pub fn register(&self, assembly: LoadedAssembly) -> Result<Arc<LoadedAssembly>> {
        let id = assembly.id();
        let name = assembly.name().to_string();
        if self.inner.assemblies.contains_key(&id) {
            return Err(invalid_operation!("Assembly id {} is already in use", id));
        }
        match self.inner.names.entry(name.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(invalid_operation!("An assembly named {} is already loaded", name));
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(id);
            }
        }

        let assembly = Arc::new(assembly);
        self.inner.assemblies.insert(id, Arc::clone(&assembly));
        self.inner.order.push(id);
        log::debug!(
            "Registered assembly {} as {} with {} types",
            name,
            id,
            assembly.types().len()
        );
        Ok(assembly)
    }

    /// The assembly registered under `id`.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnresolvedSymbol`] for unknown ids.
    pub fn assembly(&self, id: AssemblyId) -> Result<Arc<LoadedAssembly>> {
        self.inner
            .assemblies
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| unresolved!("No assembly {} in this domain", id))
    }

    /// The assembly registered under the simple name `name`.
    #[must_use]
    pub fn assembly_by_name(&self, name: &str) -> Option<Arc<LoadedAssembly>> {
        let id = *self.inner.names.get(name)?.value();
        self.assembly(id).ok()
    }

    /// All registered assemblies in registration order.
    #[must_use]
    pub fn assemblies(&self) -> Vec<Arc<LoadedAssembly>> {
        self.inner
            .order
            .iter()
            .filter_map(|(_, id)| self.assembly(*id).ok())
            .collect()
    }

    /// Return the assembly called `name`, loading it from the search path if needed.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnresolvedSymbol`] if no file is found,
    /// [`crate::Error::InvalidOperation`] for circular references between assemblies being
    /// loaded, and any read or build error of the file.
    pub fn load(&self, name: &AssemblyName) -> Result<Arc<LoadedAssembly>> {
        if let Some(assembly) = self.assembly_by_name(&name.name) {
            return Ok(assembly);
        }

        let key = (Arc::as_ptr(&self.inner) as usize, name.name.clone());
        if LOADING.with(|loading| loading.borrow().contains(&key)) {
            return Err(invalid_operation!(
                "Circular reference while loading {}",
                name.name
            ));
        }

        // One loader per name; the others wait and pick up its result.
        let gate = Arc::clone(self.inner.loads.entry(name.name.clone()).or_default().value());
        let _guard = gate.lock()?;
        if let Some(assembly) = self.assembly_by_name(&name.name) {
            return Ok(assembly);
        }

        LOADING.with(|loading| loading.borrow_mut().push(key.clone()));
        let result = self.probe(name);
        LOADING.with(|loading| loading.borrow_mut().retain(|entry| entry != &key));
        result
    }

    fn probe(&self, name: &AssemblyName) -> Result<Arc<LoadedAssembly>> {
        for directory in self.search_paths()? {
            for extension in ASSEMBLY_EXTENSIONS {
                let candidate = directory.join(format!("{}.{extension}", name.name));
                if candidate.is_file() {
                    log::debug!("Loading {} from {}", name.name, candidate.display());
                    return self.load_file(&candidate);
                }
            }
        }
        Err(unresolved!(
            "Assembly {} not found in the search path",
            name.name
        ))
    }

    /// Read an assembly image and load it unchanged.
    ///
    /// # Errors
    /// Returns read errors of the image and any resolution error of its contents.
    pub fn load_file(&self, path: &Path) -> Result<Arc<LoadedAssembly>> {
        let assembly = StaticAssembly::from_file(path)?;
        self.load_static(&assembly)
    }

    /// Decode an assembly image and load it unchanged.
    ///
    /// # Errors
    /// See [`Domain::load_file`].
    pub fn load_bytes(&self, data: &[u8]) -> Result<Arc<LoadedAssembly>> {
        let assembly = StaticAssembly::from_bytes(data)?;
        self.load_static(&assembly)
    }

    /// Build a live copy of every type of `assembly` and register it.
    ///
    /// # Errors
    /// Returns any resolution or transcoding error; nothing is registered then.
    pub fn load_static(&self, assembly: &StaticAssembly) -> Result<Arc<LoadedAssembly>> {
        let filter = TypeFilter::all();
        let live = StagedModuleBuilder::new(self, assembly, &filter).build()?;
        self.register(live)
    }

    /// A live type.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnresolvedSymbol`] for unknown handles.
    pub fn live_type(&self, handle: TypeHandle) -> Result<Arc<LiveType>> {
        self.assembly(handle.assembly)?
            .type_by_handle(handle)
            .cloned()
            .ok_or_else(|| unresolved!("No type {:?}", handle))
    }

    /// A live method.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnresolvedSymbol`] for unknown handles.
    pub fn method(&self, handle: MethodHandle) -> Result<Arc<LiveMethod>> {
        self.assembly(handle.declaring.assembly)?
            .method(handle)
            .cloned()
            .ok_or_else(|| unresolved!("No method {:?}", handle))
    }

    /// A live field.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnresolvedSymbol`] for unknown handles.
    pub fn field(&self, handle: FieldHandle) -> Result<LiveField> {
        self.assembly(handle.declaring.assembly)?
            .field(handle)
            .cloned()
            .ok_or_else(|| unresolved!("No field {:?}", handle))
    }

    /// A type by assembly simple name and full name (`Namespace.Outer+Inner`).
    ///
    /// # Errors
    /// Returns [`crate::Error::UnresolvedSymbol`] if either is unknown.
    pub fn find_type(&self, assembly: &str, full_name: &str) -> Result<TypeHandle> {
        let loaded = self
            .assembly_by_name(assembly)
            .ok_or_else(|| unresolved!("No assembly {} in this domain", assembly))?;
        loaded
            .find_type(full_name)
            .map(|ty| ty.handle)
            .ok_or_else(|| unresolved!("{} has no type {}", assembly, full_name))
    }

    /// The single method called `name` of a type.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnresolvedSymbol`] if it is missing or overloaded.
    pub fn find_method(&self, assembly: &str, type_name: &str, name: &str) -> Result<MethodHandle> {
        let loaded = self
            .assembly_by_name(assembly)
            .ok_or_else(|| unresolved!("No assembly {} in this domain", assembly))?;
        Ok(loaded.find_method(type_name, name)?.handle)
    }

    /// Storage of a static field, without running the class constructor.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnresolvedSymbol`] for unknown fields.
    pub(crate) fn static_storage(&self, handle: FieldHandle) -> Result<Slot> {
        if let Some(existing) = self.inner.statics.get(&handle) {
            return Ok(Arc::clone(existing.value()));
        }
        let field = self.field(handle)?;
        if !field.is_static() {
            return Err(invalid_operation!("{} is not a static field", field.name));
        }
        let initial = match &field.constant {
            Some(constant) => self.constant_value(constant),
            None => self.default_value(&field.field_type)?,
        };
        Ok(Arc::clone(
            self.inner
                .statics
                .entry(handle)
                .or_insert_with(|| slot(initial))
                .value(),
        ))
    }

    /// Storage of a static field, running the declaring type's class constructor first.
    ///
    /// # Errors
    /// Returns lookup errors and whatever the class constructor throws.
    pub fn static_slot(&self, handle: FieldHandle) -> Result<Slot> {
        self.ensure_initialized(handle.declaring)?;
        self.static_storage(handle)
    }

    /// Read a static field.
    ///
    /// # Errors
    /// See [`Domain::static_slot`].
    pub fn static_value(&self, handle: FieldHandle) -> Result<Value> {
        Ok(self.static_slot(handle)?.lock()?.clone())
    }

    /// Write a static field.
    ///
    /// # Errors
    /// See [`Domain::static_slot`].
    pub fn set_static_value(&self, handle: FieldHandle, value: Value) -> Result<()> {
        let field = self.field(handle)?;
        let value = self.normalize(value, &field.field_type)?;
        *self.static_slot(handle)?.lock()? = value;
        Ok(())
    }

    /// Run the class constructor of `ty` unless it already ran or is running.
    ///
    /// # Errors
    /// Propagates whatever the class constructor throws.
    pub fn ensure_initialized(&self, ty: TypeHandle) -> Result<()> {
        if self.inner.initialized.insert(ty, ()).is_some() {
            return Ok(());
        }
        let live = self.live_type(ty)?;
        let initializer = live
            .methods
            .iter()
            .find(|method| method.is_type_initializer() && method.is_static());
        if let Some(initializer) = initializer {
            log::trace!("Running class constructor of {}", live.full_name());
            self.invoke(&RuntimeMethod::plain(initializer.handle), None, Vec::new())?;
        }
        Ok(())
    }

    /// Call `method` exactly as named, without virtual dispatch.
    ///
    /// Instance methods take `this` as an object reference, or as a managed pointer for
    /// value types. Arguments exclude `this`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Exception`] for managed exceptions escaping the method and
    /// lookup or execution errors otherwise.
    pub fn invoke(&self, method: &RuntimeMethod, this: Option<Value>, arguments: Vec<Value>) -> Result<Option<Value>> {
        let live = self.method(method.handle)?;
        if live.is_static() || live.is_constructor() {
            self.ensure_initialized(method.handle.declaring)?;
        }
        if let Some(native) = live.native {
            return native(self, method, this, arguments);
        }
        if live.impl_attributes & MethodImplAttributes::CODE_TYPE_MASK == MethodImplAttributes::RUNTIME {
            return self.invoke_runtime_method(&live, method, this, arguments);
        }
        if live.body.is_none() {
            return Err(Error::NotSupported(format!(
                "{} has no implementation",
                live.name
            )));
        }
        interpreter::execute(self, method, &live, this, arguments)
    }

    /// Call `method` on `this` with virtual dispatch on the runtime type of `this`.
    ///
    /// # Errors
    /// Raises `NullReferenceException` for a null `this`; see also [`Domain::invoke`].
    pub fn invoke_virtual(&self, method: &RuntimeMethod, this: Value, arguments: Vec<Value>) -> Result<Option<Value>> {
        let live = self.method(method.handle)?;
        let object = match &this {
            Value::Null => {
                return Err(self.raise(Fault::NullReference, "Object reference not set to an instance of an object."))
            }
            Value::Object(object) => object.clone(),
            _ => return self.invoke(method, Some(this), arguments),
        };
        if !live.is_virtual() {
            return self.invoke(method, Some(this), arguments);
        }
        let target = self.resolve_virtual(object.object_type(), method)?;
        let this = if self.is_value_type(&target.owner)? {
            Value::ByRef(Pointer::Boxed(object))
        } else {
            this
        };
        self.invoke(&target, Some(this), arguments)
    }

    /// Create an object with the constructor `ctor`.
    ///
    /// Value types are returned unboxed.
    ///
    /// # Errors
    /// See [`Domain::invoke`].
    pub fn construct(&self, ctor: &RuntimeMethod, arguments: Vec<Value>) -> Result<Value> {
        let live = self.method(ctor.handle)?;
        if !live.is_constructor() {
            return Err(invalid_operation!("{} is not a constructor", live.name));
        }
        if let Some(native) = live.native {
            self.ensure_initialized(ctor.handle.declaring)?;
            return native(self, ctor, None, arguments)?
                .ok_or_else(|| invalid_operation!("Native constructor of {:?} returned nothing", ctor.owner));
        }
        if live.impl_attributes & MethodImplAttributes::CODE_TYPE_MASK == MethodImplAttributes::RUNTIME {
            return self
                .invoke_runtime_method(&live, ctor, None, arguments)?
                .ok_or_else(|| invalid_operation!("Delegate constructor returned nothing"));
        }

        if self.is_value_type(&ctor.owner)? {
            let storage = slot(self.default_value(&ctor.owner)?);
            self.invoke(ctor, Some(Value::ByRef(Pointer::Slot(Arc::clone(&storage)))), arguments)?;
            let value = storage.lock()?.clone();
            return Ok(value);
        }
        let object = self.allocate(&ctor.owner)?;
        self.invoke(ctor, Some(Value::Object(object.clone())), arguments)?;
        Ok(Value::Object(object))
    }

    /// Delegate constructors and `Invoke`, which carry no body.
    fn invoke_runtime_method(
        &self,
        live: &LiveMethod,
        method: &RuntimeMethod,
        this: Option<Value>,
        arguments: Vec<Value>,
    ) -> Result<Option<Value>> {
        match live.name.as_str() {
            crate::metadata::members::CONSTRUCTOR_NAME => {
                let mut arguments = arguments.into_iter();
                let target = arguments.next().unwrap_or(Value::Null);
                let pointer = match arguments.next() {
                    Some(Value::FnPtr(pointer)) => pointer,
                    other => return Err(invalid_operation!("Delegate constructed from {:?}", other)),
                };
                let delegate = ObjectRef::new(
                    method.owner.clone(),
                    ObjectData::Native(NativeData::Delegate {
                        target: (!target.is_null()).then_some(target),
                        method: pointer,
                    }),
                );
                Ok(Some(Value::Object(delegate)))
            }
            "Invoke" => {
                let delegate = match this {
                    Some(Value::Object(object)) => object,
                    Some(Value::Null) | None => {
                        return Err(self.raise(Fault::NullReference, "Delegate is null."))
                    }
                    Some(other) => return Err(invalid_operation!("Invoke on {:?}", other)),
                };
                match delegate.native() {
                    Some(NativeData::Delegate { target, method }) => {
                        self.invoke(method, target.clone(), arguments)
                    }
                    _ => Err(invalid_operation!("{:?} is not a delegate", delegate)),
                }
            }
            other => Err(Error::NotSupported(format!(
                "Runtime-implemented method {other}"
            ))),
        }
    }

    /// A new string object.
    #[must_use]
    pub fn new_string(&self, text: impl Into<String>) -> Value {
        Value::Object(ObjectRef::new(
            corlib::primitive_type(PrimitiveType::String),
            ObjectData::String(text.into()),
        ))
    }

    /// A new zero-initialized `element[]`.
    ///
    /// # Errors
    /// Returns lookup errors for the element type.
    pub fn new_array(&self, element: RuntimeType, length: usize) -> Result<Value> {
        let initial = self.default_value(&element)?;
        Ok(Value::Object(ObjectRef::new(
            element.make_array(0),
            ObjectData::Array(Mutex::new(vec![initial; length])),
        )))
    }

    /// The `System.Type` object standing for `ty`; the same object every time.
    #[must_use]
    pub fn type_object(&self, ty: &RuntimeType) -> Value {
        let object = self
            .inner
            .type_objects
            .entry(ty.clone())
            .or_insert_with(|| {
                ObjectRef::new(
                    RuntimeType::Type(corlib::TYPE),
                    ObjectData::Native(NativeData::Type(ty.clone())),
                )
            })
            .value()
            .clone();
        Value::Object(object)
    }

    /// The message of an exception object, if one was set.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if `exception` is no exception.
    pub fn exception_message(&self, exception: &ObjectRef) -> Result<Option<String>> {
        let slot = self.field_slot(EXCEPTION_MESSAGE)?;
        let message = exception.field(slot)?;
        Ok(message.as_str()?.map(str::to_string))
    }

    /// Build a managed exception of a built-in type, ready to be returned as an error.
    pub fn raise(&self, fault: Fault, message: &str) -> Error {
        let build = || -> Result<ObjectRef> {
            let object = self.allocate(&RuntimeType::Type(fault.handle()))?;
            object.set_field(self.field_slot(EXCEPTION_MESSAGE)?, self.new_string(message))?;
            Ok(object)
        };
        match build() {
            Ok(object) => Error::Exception(object),
            Err(error) => error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emit::AssemblyBuilder;

    #[test]
    fn builtins_registered() {
        let domain = Domain::new().unwrap();
        assert_eq!(domain.assemblies().len(), 2);
        assert!(domain.assembly_by_name("mscorlib").is_some());
        assert_eq!(
            domain.assembly_by_name("System.Runtime").map(|a| a.id()),
            Some(corlib::CORLIB_ID)
        );
        let object = domain.find_type("netstandard", "System.Object").unwrap();
        assert_eq!(object, corlib::primitive_handle(PrimitiveType::Object));
        assert!(domain.find_type("mscorlib", "System.Missing").is_err());
    }

    #[test]
    fn duplicate_names_rejected() {
        let domain = Domain::new().unwrap();
        let first = AssemblyBuilder::new(domain.reserve_id(), AssemblyName::new("Twice"));
        domain.register(first.seal().unwrap()).unwrap();
        let second = AssemblyBuilder::new(domain.reserve_id(), AssemblyName::new("Twice"));
        assert!(matches!(
            domain.register(second.seal().unwrap()),
            Err(Error::InvalidOperation(_))
        ));
    }

    #[test]
    fn missing_assembly_is_unresolved() {
        let directory = tempfile::tempdir().unwrap();
        let domain = Domain::with_search_paths(vec![directory.path().to_path_buf()]).unwrap();
        assert!(matches!(
            domain.load(&AssemblyName::new("Nowhere")),
            Err(Error::UnresolvedSymbol(_))
        ));
    }

    #[test]
    fn circular_references_fail() {
        use crate::metadata::{
            definitions::{TypeAttributes, TypeDefinition},
            typesystem::TypeReference,
        };

        let directory = tempfile::tempdir().unwrap();
        for (name, other) in [("Left", "Right"), ("Right", "Left")] {
            let mut assembly = StaticAssembly::new(AssemblyName::new(name));
            let base = TypeReference::external_class(AssemblyName::new(other), "Cycle", other);
            if let Some(module) = assembly.main_module_mut() {
                module
                    .types
                    .push(TypeDefinition::new("Cycle", name, TypeAttributes::PUBLIC).extends(base));
            }
            assembly
                .to_file(&directory.path().join(format!("{name}.dll")))
                .unwrap();
        }

        let domain = Domain::with_search_paths(vec![directory.path().to_path_buf()]).unwrap();
        for _ in 0..2 {
            assert!(matches!(
                domain.load(&AssemblyName::new("Left")),
                Err(Error::InvalidOperation(_))
            ));
        }
        assert!(domain.assembly_by_name("Left").is_none());
        assert!(domain.assembly_by_name("Right").is_none());
    }

    #[test]
    fn raised_faults_carry_message() {
        let domain = Domain::new().unwrap();
        let Error::Exception(exception) = domain.raise(Fault::DivideByZero, "Attempted to divide by zero.") else {
            panic!("expected a managed exception");
        };
        assert_eq!(
            domain.exception_message(&exception).unwrap().as_deref(),
            Some("Attempted to divide by zero.")
        );
        assert!(domain
            .is_instance(exception.object_type(), &RuntimeType::Type(Fault::Arithmetic.handle()))
            .unwrap());
    }

    #[test]
    fn type_objects_are_unique() {
        let domain = Domain::new().unwrap();
        let int32 = corlib::primitive_type(PrimitiveType::I4);
        assert_eq!(domain.type_object(&int32), domain.type_object(&int32));
        assert_ne!(
            domain.type_object(&int32),
            domain.type_object(&corlib::primitive_type(PrimitiveType::I8))
        );
    }
}
