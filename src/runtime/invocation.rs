//! The interceptor chain.
//!
//! A woven method whose stub slot holds interceptors builds one [`Invocation`] per call and
//! hands it to the first interceptor. Each interceptor decides whether to call
//! [`Invocation::proceed`], which moves to the next interceptor or, once the chain is
//! exhausted, calls the target method with the captured instance and arguments.
//!
//! Arguments are kept in the `object[]` the woven method allocated, so changes made by
//! interceptors to by-reference arguments are what the woven method copies back.

use std::sync::Arc;

use crate::{
    emit::{LiveSignature, RuntimeMethod, RuntimeType},
    runtime::{
        value::{slot, NativeData, ObjectData, ObjectRef, Pointer, Value},
        Domain,
    },
    Error, Result,
};

/// A hook called around a woven method.
///
/// Closures taking `&mut Invocation` implement this trait.
///
/// # Examples
///
/// ```rust,no_run
/// use dotweave::runtime::{Interceptor, Invocation, Value};
///
/// // Double whatever the method returns.
/// let doubler = |invocation: &mut Invocation| -> dotweave::Result<()> {
///     invocation.proceed()?;
///     let result = invocation.return_value()?.as_i32()?;
///     invocation.set_return_value(Value::I4(result * 2))
/// };
/// # let _: &dyn Interceptor = &doubler;
/// ```
pub trait Interceptor: Send + Sync {
    /// Handle one call. Calling [`Invocation::proceed`] continues the chain.
    ///
    /// # Errors
    /// Whatever the interceptor or the rest of the chain fails with; managed exceptions
    /// must be passed on unmodified.
    fn intercept(&self, invocation: &mut Invocation) -> Result<()>;
}

impl<F> Interceptor for F
where
    F: Fn(&mut Invocation) -> Result<()> + Send + Sync,
{
    fn intercept(&self, invocation: &mut Invocation) -> Result<()> {
        self(invocation)
    }
}

/// One intercepted call.
pub struct Invocation {
    domain: Domain,
    interceptors: Vec<Arc<dyn Interceptor>>,
    cursor: usize,
    target: RuntimeMethod,
    signature: LiveSignature,
    instance: Option<Value>,
    arguments: ObjectRef,
    return_value: Value,
}

impl Invocation {
    /// Capture a call.
    ///
    /// `arguments` is the boxed argument array; `target` is the method the end of the chain
    /// calls.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if `arguments` is not an array matching the
    /// target's parameter count.
    pub fn new(
        domain: Domain,
        interceptors: Vec<Arc<dyn Interceptor>>,
        target: RuntimeMethod,
        instance: Option<Value>,
        arguments: ObjectRef,
    ) -> Result<Self> {
        let signature = domain.signature_of(&target)?;
        let count = arguments.elements()?.len();
        if count != signature.parameters.len() {
            return Err(invalid_operation!(
                "{} arguments captured for a method taking {}",
                count,
                signature.parameters.len()
            ));
        }
        Ok(Invocation {
            domain,
            interceptors,
            cursor: 0,
            target,
            signature,
            instance,
            arguments,
            return_value: Value::Null,
        })
    }

    /// The domain the call runs in.
    #[must_use]
    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    /// The method called once the chain is exhausted.
    #[must_use]
    pub fn method(&self) -> &RuntimeMethod {
        &self.target
    }

    /// Number of interceptors already entered.
    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// `this`, or `None` for static methods.
    #[must_use]
    pub fn instance(&self) -> Option<&Value> {
        self.instance.as_ref()
    }

    /// Number of arguments, excluding `this`.
    #[must_use]
    pub fn argument_count(&self) -> usize {
        self.signature.parameters.len()
    }

    fn parameter_type(&self, index: usize) -> Result<&RuntimeType> {
        let ty = self
            .signature
            .parameters
            .get(index)
            .ok_or_else(|| invalid_operation!("Argument {} out of range", index))?;
        Ok(match ty {
            RuntimeType::ByRef(element) => element,
            other => other,
        })
    }

    fn boxed_argument(&self, index: usize) -> Result<Value> {
        self.arguments
            .elements()?
            .get(index)
            .cloned()
            .ok_or_else(|| invalid_operation!("Argument {} out of range", index))
    }

    /// Argument `index`, unboxed to its declared type.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] for a bad index.
    pub fn argument(&self, index: usize) -> Result<Value> {
        let ty = self.parameter_type(index)?;
        self.domain.unbox_value(self.boxed_argument(index)?, ty)
    }

    /// All arguments, unboxed.
    ///
    /// # Errors
    /// See [`Invocation::argument`].
    pub fn arguments(&self) -> Result<Vec<Value>> {
        (0..self.argument_count()).map(|index| self.argument(index)).collect()
    }

    /// Replace argument `index`; by-reference arguments are copied back to the caller.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] for a bad index.
    pub fn set_argument(&mut self, index: usize, value: Value) -> Result<()> {
        let ty = self.parameter_type(index)?.clone();
        let boxed = self.domain.box_value(value, &ty)?;
        Pointer::Element(self.arguments.clone(), index).store(boxed)
    }

    /// The result, unboxed; `Value::Null` before the target ran and for `void` methods.
    ///
    /// # Errors
    /// Returns an error if the stored result does not match the return type.
    pub fn return_value(&self) -> Result<Value> {
        if self.returns_void() || self.return_value.is_null() {
            return Ok(self.return_value.clone());
        }
        self.domain
            .unbox_value(self.return_value.clone(), &self.signature.return_type)
    }

    /// The result as the woven method sees it: boxed.
    #[must_use]
    pub fn boxed_return_value(&self) -> &Value {
        &self.return_value
    }

    /// Replace the result.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] for `void` methods.
    pub fn set_return_value(&mut self, value: Value) -> Result<()> {
        if self.returns_void() {
            return Err(invalid_operation!("{:?} returns void", self.target.handle));
        }
        self.return_value = self.domain.box_value(value, &self.signature.return_type)?;
        Ok(())
    }

    fn returns_void(&self) -> bool {
        self.domain.is_void(&self.signature.return_type)
    }

    /// Continue the chain: enter the next interceptor, or call the target.
    ///
    /// # Errors
    /// Propagates whatever the next interceptor or the target fails with, managed
    /// exceptions included.
    pub fn proceed(&mut self) -> Result<()> {
        if let Some(interceptor) = self.interceptors.get(self.cursor).cloned() {
            self.cursor += 1;
            return interceptor.intercept(self);
        }

        let mut arguments = Vec::with_capacity(self.argument_count());
        let mut written_back = Vec::new();
        for (index, parameter) in self.signature.parameters.iter().enumerate() {
            let boxed = self.boxed_argument(index)?;
            match parameter {
                RuntimeType::ByRef(element) => {
                    let temporary = slot(self.domain.unbox_value(boxed, element)?);
                    arguments.push(Value::ByRef(Pointer::Slot(temporary.clone())));
                    written_back.push((index, element.as_ref().clone(), temporary));
                }
                other => arguments.push(self.domain.unbox_value(boxed, other)?),
            }
        }

        let instance = match &self.instance {
            Some(Value::Object(object)) if self.domain.is_value_type(&self.target.owner)? => {
                Some(Value::ByRef(Pointer::Boxed(object.clone())))
            }
            other => other.clone(),
        };

        let result = self.domain.invoke(&self.target, instance, arguments)?;

        for (index, element, temporary) in written_back {
            let value = temporary.lock()?.clone();
            let boxed = self.domain.box_value(value, &element)?;
            Pointer::Element(self.arguments.clone(), index).store(boxed)?;
        }
        if let Some(result) = result {
            self.return_value = self
                .domain
                .box_value(result, &self.signature.return_type)?;
        }
        Ok(())
    }

    /// The boxed argument array shared with the woven method.
    #[must_use]
    pub fn argument_array(&self) -> &ObjectRef {
        &self.arguments
    }
}

/// Pull the host interceptor out of a registered wrapper object.
pub(crate) fn unwrap_interceptor(value: &Value) -> Result<Arc<dyn Interceptor>> {
    match value {
        Value::Object(object) => match object.data() {
            ObjectData::Native(NativeData::Interceptor(interceptor)) => {
                Ok(Arc::clone(interceptor))
            }
            _ => Err(Error::NotSupported(format!(
                "{object:?} is not a host interceptor"
            ))),
        },
        other => Err(invalid_operation!("Expected an interceptor, found {:?}", other)),
    }
}
