//! Execution of loaded live assemblies and the interceptor chain.
//!
//! A [`Domain`] owns every assembly loaded into it, the built-in core library included,
//! together with static field storage and class-constructor state. Live method bodies are
//! executed by an interpreter; calls into woven methods consult the method's stub slot and,
//! when interceptors are registered, run them through an [`Invocation`].
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::{path::Path, sync::Arc};
//! use dotweave::runtime::{Domain, Invocation, Value};
//!
//! let domain = Domain::new()?;
//! let assembly = domain.load_file(Path::new("Sample.dll"))?;
//! let method = domain.find_method(assembly.name(), "Sample.C", "M")?;
//!
//! domain.add_interceptor(method, Arc::new(|invocation: &mut Invocation| {
//!     invocation.proceed()?;
//!     let result = invocation.return_value()?.as_i32()?;
//!     invocation.set_return_value(Value::I4(result * 2))
//! }))?;
//! # Ok::<(), dotweave::Error>(())
//! ```

pub mod corlib;
mod domain;
mod interpreter;
mod invocation;
mod registry;
mod typeinfo;
mod value;

pub use corlib::Fault;
pub use domain::Domain;
pub use interpreter::MAX_CALL_DEPTH;
pub use invocation::{Interceptor, Invocation};
pub use registry::{stub_field_name, target_method_name};
pub use value::{slot, NativeData, ObjectData, ObjectRef, Pointer, Slot, Value};
