//! Execution of live method bodies.
//!
//! Each call gets a [`Frame`] holding its arguments, locals and evaluation stack. The
//! dispatch loop steps through the body's instruction list; managed exceptions travel as
//! [`Error::Exception`] and are matched against the body's clause table, innermost first.
//!
//! Handler blocks run nested: a `finally` reached by `leave` or during unwinding executes
//! to its `endfinally` on a fresh evaluation stack, then control returns to the leave
//! target or the catching handler. Filters run the same way up to `endfilter`.

mod arith;

use std::{cell::Cell, cmp::Ordering};

use log::trace;

use crate::{
    emit::{
        EmitOpCode, LiveBody, LiveClauseKind, LiveInstruction, LiveMethod, LiveOperand,
        LiveSignature, LiveToken, RuntimeField, RuntimeMethod, RuntimeType,
    },
    metadata::typesystem::PrimitiveType,
    runtime::{
        corlib::{self, Fault},
        value::{slot, ObjectData, ObjectRef, Pointer, Slot, Value},
        Domain,
    },
    Error, Result,
};

use arith::{BinaryOp, ConvTarget, ShiftOp};

/// Interpreted calls one thread may nest before [`Error::RecursionLimit`].
pub const MAX_CALL_DEPTH: usize = 128;

thread_local! {
    static DEPTH: Cell<usize> = const { Cell::new(0) };
}

struct DepthGuard;

impl DepthGuard {
    fn enter() -> Result<Self> {
        DEPTH.with(|depth| {
            if depth.get() >= MAX_CALL_DEPTH {
                return Err(Error::RecursionLimit(MAX_CALL_DEPTH));
            }
            depth.set(depth.get() + 1);
            Ok(DepthGuard)
        })
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// How a (possibly nested) run of the dispatch loop ended.
#[derive(Debug)]
enum Exit {
    Return(Option<Value>),
    EndFinally,
    EndFilter(bool),
}

/// What the dispatch loop does after one instruction.
#[derive(Debug)]
enum Flow {
    Next,
    Jump(usize),
    Exit(Exit),
    /// An error that already went through this frame's clause table
    Escape(Error),
}

/// Run the body of `method`.
///
/// `this` is the receiver for instance methods: an object reference, or a managed pointer
/// for value types. Arguments are normalized to the declared parameter types.
pub(crate) fn execute(
    domain: &Domain,
    method: &RuntimeMethod,
    live: &LiveMethod,
    this: Option<Value>,
    arguments: Vec<Value>,
) -> Result<Option<Value>> {
    let _depth = DepthGuard::enter()?;
    let body = live
        .body
        .as_ref()
        .ok_or_else(|| invalid_operation!("{} has no body", live.name))?;
    let type_arguments = method.owner.type_arguments().to_vec();
    let method_arguments = method.instantiation.clone();
    let signature = live.signature()?.substitute(&type_arguments, &method_arguments);
    if arguments.len() != signature.parameters.len() {
        return Err(invalid_operation!(
            "{} takes {} arguments, {} given",
            live.name,
            signature.parameters.len(),
            arguments.len()
        ));
    }

    let mut argument_slots = Vec::with_capacity(arguments.len() + 1);
    let mut argument_types = Vec::with_capacity(arguments.len() + 1);
    if signature.has_this {
        argument_slots.push(slot(this.unwrap_or(Value::Null)));
        argument_types.push(method.owner.clone());
    }
    for (value, ty) in arguments.into_iter().zip(&signature.parameters) {
        argument_slots.push(slot(domain.normalize(value, ty)?));
        argument_types.push(ty.clone());
    }

    let local_types: Vec<RuntimeType> = body
        .locals
        .iter()
        .map(|local| local.substitute(&type_arguments, &method_arguments))
        .collect();
    let locals = local_types
        .iter()
        .map(|ty| domain.default_value(ty).map(slot))
        .collect::<Result<Vec<_>>>()?;

    let returns = if domain.is_void(&signature.return_type) {
        None
    } else {
        Some(signature.return_type.clone())
    };

    trace!("Entering {} ({} instructions)", live.name, body.instructions.len());
    let mut frame = Frame {
        domain,
        name: &live.name,
        body,
        arguments: argument_slots,
        argument_types,
        locals,
        local_types,
        stack: Vec::with_capacity(usize::from(body.max_stack)),
        returns,
        type_arguments,
        method_arguments,
        exceptions: Vec::new(),
        constrained: None,
    };
    match frame.run(0)? {
        Exit::Return(value) => Ok(value),
        other => Err(invalid_operation!(
            "{} ended with {:?} outside a handler",
            live.name,
            other
        )),
    }
}

struct Frame<'a> {
    domain: &'a Domain,
    name: &'a str,
    body: &'a LiveBody,
    arguments: Vec<Slot>,
    argument_types: Vec<RuntimeType>,
    locals: Vec<Slot>,
    local_types: Vec<RuntimeType>,
    stack: Vec<Value>,
    returns: Option<RuntimeType>,
    type_arguments: Vec<RuntimeType>,
    method_arguments: Vec<RuntimeType>,
    /// Exceptions of the catch handlers currently executing, for `rethrow`
    exceptions: Vec<ObjectRef>,
    /// Pending `constrained.` prefix
    constrained: Option<RuntimeType>,
}

impl Frame<'_> {
    fn run(&mut self, start: usize) -> Result<Exit> {
        let body = self.body;
        let mut pc = start;
        loop {
            let instruction = body
                .instructions
                .get(pc)
                .ok_or_else(|| invalid_operation!("Execution ran off the end of {}", self.name))?;
            let flow = match self.step(pc, instruction) {
                Ok(flow) => flow,
                Err(Error::Exception(exception)) => {
                    self.constrained = None;
                    self.unwind(pc, exception)?
                }
                Err(error) => return Err(error),
            };
            match flow {
                Flow::Next => pc += 1,
                Flow::Jump(target) => pc = target,
                Flow::Exit(exit) => return Ok(exit),
                Flow::Escape(error) => return Err(error),
            }
        }
    }

    /// Find a handler for `exception` thrown at `pc`.
    ///
    /// Filters are evaluated during the search; `finally` and `fault` blocks between the
    /// throw and the handler run once the handler is known, or before the exception leaves
    /// the frame.
    fn unwind(&mut self, pc: usize, exception: ObjectRef) -> Result<Flow> {
        let body = self.body;
        let mut pending = Vec::new();
        for clause in body.clauses.iter().filter(|clause| clause.protects(pc)) {
            let caught = match &clause.kind {
                LiveClauseKind::Catch(ty) => {
                    let ty = self.resolve_type(ty);
                    self.domain.is_instance(exception.object_type(), &ty)?
                }
                LiveClauseKind::Filter(start) => self.run_filter(*start, &exception)?,
                LiveClauseKind::Finally | LiveClauseKind::Fault => {
                    pending.push(clause.handler_start);
                    false
                }
            };
            if !caught {
                continue;
            }
            for handler in pending {
                if let Some(exit) = self.run_handler(handler)? {
                    return Ok(Flow::Exit(exit));
                }
            }
            for left in body.clauses.iter().filter(|other| {
                matches!(other.kind, LiveClauseKind::Catch(_) | LiveClauseKind::Filter(_))
                    && other.handles(pc)
                    && !other.handles(clause.handler_start)
            }) {
                trace!("Abandoning handler at {} of {}", left.handler_start, self.name);
                self.exceptions.pop();
            }
            trace!("{} caught {:?} at {}", self.name, exception, clause.handler_start);
            self.stack.clear();
            self.stack.push(Value::Object(exception.clone()));
            self.exceptions.push(exception);
            return Ok(Flow::Jump(clause.handler_start));
        }
        for handler in pending {
            if let Some(exit) = self.run_handler(handler)? {
                return Ok(Flow::Exit(exit));
            }
        }
        Err(Error::Exception(exception))
    }

    /// Run a `finally` or `fault` block; `Some` if it left the method instead of ending.
    fn run_handler(&mut self, start: usize) -> Result<Option<Exit>> {
        let saved = std::mem::take(&mut self.stack);
        let exit = self.run(start)?;
        self.stack = saved;
        match exit {
            Exit::EndFinally => Ok(None),
            other => Ok(Some(other)),
        }
    }

    /// Evaluate a filter block. Exceptions inside the filter reject the exception.
    fn run_filter(&mut self, start: usize, exception: &ObjectRef) -> Result<bool> {
        let saved = std::mem::replace(&mut self.stack, vec![Value::Object(exception.clone())]);
        let outcome = self.run(start);
        self.stack = saved;
        match outcome {
            Ok(Exit::EndFilter(accepted)) => Ok(accepted),
            Ok(other) => Err(invalid_operation!(
                "Filter of {} ended with {:?}",
                self.name,
                other
            )),
            Err(Error::Exception(_)) => Ok(false),
            Err(error) => Err(error),
        }
    }

    /// `leave`: run the `finally` blocks between `pc` and `target`, then jump.
    fn leave(&mut self, pc: usize, target: usize) -> Flow {
        let body = self.body;
        for clause in &body.clauses {
            match clause.kind {
                LiveClauseKind::Catch(_) | LiveClauseKind::Filter(_)
                    if clause.handles(pc) && !clause.handles(target) =>
                {
                    self.exceptions.pop();
                }
                LiveClauseKind::Finally if clause.protects(pc) && !clause.protects(target) => {
                    match self.run_handler(clause.handler_start) {
                        Ok(None) => {}
                        Ok(Some(exit)) => return Flow::Exit(exit),
                        Err(error) => return Flow::Escape(error),
                    }
                }
                _ => {}
            }
        }
        self.stack.clear();
        Flow::Jump(target)
    }

    fn pop(&mut self) -> Result<Value> {
        self.stack
            .pop()
            .ok_or_else(|| invalid_operation!("Evaluation stack underflow in {}", self.name))
    }

    fn pop_many(&mut self, count: usize) -> Result<Vec<Value>> {
        if self.stack.len() < count {
            return Err(invalid_operation!("Evaluation stack underflow in {}", self.name));
        }
        Ok(self.stack.split_off(self.stack.len() - count))
    }

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn resolve_type(&self, ty: &RuntimeType) -> RuntimeType {
        if self.type_arguments.is_empty() && self.method_arguments.is_empty() {
            ty.clone()
        } else {
            ty.substitute(&self.type_arguments, &self.method_arguments)
        }
    }

    fn resolve_method(&self, method: &RuntimeMethod) -> RuntimeMethod {
        if self.type_arguments.is_empty() && self.method_arguments.is_empty() {
            method.clone()
        } else {
            method.substitute(&self.type_arguments, &self.method_arguments)
        }
    }

    fn resolve_field(&self, field: &RuntimeField) -> RuntimeField {
        RuntimeField {
            handle: field.handle,
            owner: self.resolve_type(&field.owner),
        }
    }

    fn argument(&self, index: u16) -> Result<&Slot> {
        self.arguments
            .get(usize::from(index))
            .ok_or_else(|| invalid_operation!("No argument {} in {}", index, self.name))
    }

    fn local(&self, index: u16) -> Result<&Slot> {
        self.locals
            .get(usize::from(index))
            .ok_or_else(|| invalid_operation!("No local {} in {}", index, self.name))
    }

    fn load_argument(&mut self, index: u16) -> Result<Flow> {
        let value = self.argument(index)?.lock()?.clone();
        self.push(value);
        Ok(Flow::Next)
    }

    fn store_argument(&mut self, index: u16) -> Result<Flow> {
        let value = self.pop()?;
        let ty = self
            .argument_types
            .get(usize::from(index))
            .ok_or_else(|| invalid_operation!("No argument {} in {}", index, self.name))?;
        let value = self.domain.normalize(value, ty)?;
        *self.argument(index)?.lock()? = value;
        Ok(Flow::Next)
    }

    fn load_local(&mut self, index: u16) -> Result<Flow> {
        let value = self.local(index)?.lock()?.clone();
        self.push(value);
        Ok(Flow::Next)
    }

    fn store_local(&mut self, index: u16) -> Result<Flow> {
        let value = self.pop()?;
        let ty = self
            .local_types
            .get(usize::from(index))
            .ok_or_else(|| invalid_operation!("No local {} in {}", index, self.name))?;
        let value = self.domain.normalize(value, ty)?;
        *self.local(index)?.lock()? = value;
        Ok(Flow::Next)
    }

    fn null_reference(&self) -> Error {
        self.domain
            .raise(Fault::NullReference, "Object reference not set to an instance of an object.")
    }

    fn pointer(&self, value: Value) -> Result<Pointer> {
        match value {
            Value::ByRef(pointer) => Ok(pointer),
            Value::Null => Err(self.null_reference()),
            other => Err(Error::NotSupported(format!(
                "Indirect access through {other:?}"
            ))),
        }
    }

    fn field_pointer(&self, target: Value, index: usize) -> Result<Pointer> {
        match target {
            Value::Object(object) => match object.data() {
                ObjectData::Boxed(_) => Ok(Pointer::Member(Box::new(Pointer::Boxed(object)), index)),
                _ => Ok(Pointer::Field(object, index)),
            },
            Value::ByRef(pointer) => Ok(Pointer::Member(Box::new(pointer), index)),
            Value::Null => Err(self.null_reference()),
            other => Err(invalid_operation!("Field access on {:?}", other)),
        }
    }

    fn field_type(&self, field: &RuntimeField) -> Result<RuntimeType> {
        let live = self.domain.field(field.handle)?;
        Ok(live.field_type.substitute(field.owner.type_arguments(), &[]))
    }

    fn load_field(&mut self, field: &RuntimeField) -> Result<Flow> {
        let field = self.resolve_field(field);
        let index = self.domain.field_slot(field.handle)?;
        let value = match self.pop()? {
            Value::Struct { fields, .. } => fields
                .get(index)
                .cloned()
                .ok_or_else(|| invalid_operation!("Field slot {} out of range", index))?,
            target => self.field_pointer(target, index)?.load()?,
        };
        self.push(value);
        Ok(Flow::Next)
    }

    fn store_field(&mut self, field: &RuntimeField) -> Result<Flow> {
        let field = self.resolve_field(field);
        let value = self.pop()?;
        let target = self.pop()?;
        let value = self.domain.normalize(value, &self.field_type(&field)?)?;
        let index = self.domain.field_slot(field.handle)?;
        self.field_pointer(target, index)?.store(value)?;
        Ok(Flow::Next)
    }

    /// Array and index of an element access, bounds checked.
    fn element(&self, array: Value, index: Value) -> Result<(ObjectRef, usize)> {
        let array = match array {
            Value::Object(object) => object,
            Value::Null => return Err(self.null_reference()),
            other => return Err(invalid_operation!("Element access on {:?}", other)),
        };
        let length = match array.data() {
            ObjectData::Array(elements) => elements.lock()?.len(),
            _ => return Err(invalid_operation!("Element access on {:?}", array)),
        };
        let index = index.as_i64()?;
        if index < 0 || index as u64 >= length as u64 {
            return Err(self
                .domain
                .raise(Fault::IndexOutOfRange, "Index was outside the bounds of the array."));
        }
        Ok((array, index as usize))
    }

    fn load_element(&mut self, primitive: Option<PrimitiveType>) -> Result<Flow> {
        let index = self.pop()?;
        let array = self.pop()?;
        let (array, index) = self.element(array, index)?;
        let value = Pointer::Element(array, index).load()?;
        let value = match primitive {
            Some(primitive) => self.domain.normalize(value, &corlib::primitive_type(primitive))?,
            None => value,
        };
        self.push(value);
        Ok(Flow::Next)
    }

    fn store_element(&mut self) -> Result<Flow> {
        let value = self.pop()?;
        let index = self.pop()?;
        let array = self.pop()?;
        let (array, index) = self.element(array, index)?;
        let value = match array.object_type().element() {
            Some(element) => self.domain.normalize(value, element)?,
            None => value,
        };
        Pointer::Element(array, index).store(value)?;
        Ok(Flow::Next)
    }

    fn load_indirect(&mut self, primitive: Option<PrimitiveType>) -> Result<Flow> {
        let pointer = self.pop()?;
        let value = self.pointer(pointer)?.load()?;
        let value = match primitive {
            Some(primitive) => self.domain.normalize(value, &corlib::primitive_type(primitive))?,
            None => value,
        };
        self.push(value);
        Ok(Flow::Next)
    }

    fn store_indirect(&mut self, primitive: Option<PrimitiveType>) -> Result<Flow> {
        let value = self.pop()?;
        let pointer = self.pop()?;
        let value = match primitive {
            Some(primitive) => self.domain.normalize(value, &corlib::primitive_type(primitive))?,
            None => value,
        };
        self.pointer(pointer)?.store(value)?;
        Ok(Flow::Next)
    }

    fn binary(&mut self, op: BinaryOp) -> Result<Flow> {
        let b = self.pop()?;
        let a = self.pop()?;
        let result = arith::binary(self.domain, op, &a, &b)?;
        self.push(result);
        Ok(Flow::Next)
    }

    fn shift(&mut self, op: ShiftOp) -> Result<Flow> {
        let amount = self.pop()?;
        let value = self.pop()?;
        self.push(arith::shift(op, &value, &amount)?);
        Ok(Flow::Next)
    }

    fn convert(&mut self, target: ConvTarget, checked: bool, unsigned_source: bool) -> Result<Flow> {
        let value = self.pop()?;
        let result = arith::convert(self.domain, &value, target, checked, unsigned_source)?;
        self.push(result);
        Ok(Flow::Next)
    }

    fn ordering(&mut self, unsigned: bool) -> Result<Option<Ordering>> {
        let b = self.pop()?;
        let a = self.pop()?;
        arith::compare(&a, &b, unsigned)
    }

    fn compare(&mut self, unsigned: bool, test: fn(Option<Ordering>) -> bool) -> Result<Flow> {
        let ordering = self.ordering(unsigned)?;
        self.push(Value::from_bool(test(ordering)));
        Ok(Flow::Next)
    }

    fn branch_if(&mut self, operand: &LiveOperand, unsigned: bool, test: fn(Option<Ordering>) -> bool) -> Result<Flow> {
        let target = branch_target(operand)?;
        let ordering = self.ordering(unsigned)?;
        Ok(if test(ordering) { Flow::Jump(target) } else { Flow::Next })
    }

    fn branch_on(&mut self, operand: &LiveOperand, expected: bool) -> Result<Flow> {
        let target = branch_target(operand)?;
        let value = self.pop()?;
        Ok(if value.is_true() == expected {
            Flow::Jump(target)
        } else {
            Flow::Next
        })
    }

    /// Push a call result unless the callee returns `void`.
    fn push_result(&mut self, signature: &LiveSignature, result: Option<Value>) -> Result<()> {
        if self.domain.is_void(&signature.return_type) {
            return Ok(());
        }
        let value = result.ok_or_else(|| invalid_operation!("Call from {} returned no value", self.name))?;
        let value = self.domain.normalize(value, &signature.return_type)?;
        self.push(value);
        Ok(())
    }

    fn call(&mut self, method: &RuntimeMethod, virtual_call: bool) -> Result<Flow> {
        let method = self.resolve_method(method);
        let signature = self.domain.signature_of(&method)?;
        let arguments = self.pop_many(signature.parameters.len())?;
        let this = if signature.has_this { Some(self.pop()?) } else { None };
        let constrained = self.constrained.take();
        let result = match (this, constrained) {
            (None, _) => self.domain.invoke(&method, None, arguments)?,
            (Some(this), Some(ty)) => self.constrained_call(&ty, &method, this, arguments)?,
            (Some(this), None) if virtual_call => self.domain.invoke_virtual(&method, this, arguments)?,
            (Some(this), None) => self.domain.invoke(&method, Some(this), arguments)?,
        };
        self.push_result(&signature, result)?;
        Ok(Flow::Next)
    }

    /// `constrained. T callvirt`: `this` is a managed pointer to a `T`.
    fn constrained_call(
        &self,
        ty: &RuntimeType,
        method: &RuntimeMethod,
        this: Value,
        arguments: Vec<Value>,
    ) -> Result<Option<Value>> {
        let Value::ByRef(pointer) = this else {
            return self.domain.invoke_virtual(method, this, arguments);
        };
        if !self.domain.is_value_type(ty)? {
            return self.domain.invoke_virtual(method, pointer.load()?, arguments);
        }
        let target = self.domain.resolve_virtual(ty, method)?;
        if target.owner.definition() == ty.definition() {
            return self.domain.invoke(&target, Some(Value::ByRef(pointer)), arguments);
        }
        let boxed = self.domain.box_value(pointer.load()?, ty)?;
        self.domain.invoke_virtual(method, boxed, arguments)
    }

    fn call_indirect(&mut self, signature: &LiveSignature) -> Result<Flow> {
        let signature = signature.substitute(&self.type_arguments, &self.method_arguments);
        let method = match self.pop()? {
            Value::FnPtr(method) => method,
            other => {
                return Err(Error::NotSupported(format!(
                    "calli through {other:?}"
                )))
            }
        };
        let arguments = self.pop_many(signature.parameters.len())?;
        let this = if signature.has_this { Some(self.pop()?) } else { None };
        let result = self.domain.invoke(&method, this, arguments)?;
        self.push_result(&signature, result)?;
        Ok(Flow::Next)
    }

    fn construct(&mut self, ctor: &RuntimeMethod) -> Result<Flow> {
        let ctor = self.resolve_method(ctor);
        let signature = self.domain.signature_of(&ctor)?;
        let arguments = self.pop_many(signature.parameters.len())?;
        let value = self.domain.construct(&ctor, arguments)?;
        self.push(value);
        Ok(Flow::Next)
    }

    /// `castclass` when `throwing`, `isinst` otherwise.
    fn cast(&mut self, ty: &RuntimeType, throwing: bool) -> Result<Flow> {
        let ty = self.resolve_type(ty);
        let value = self.pop()?;
        let fits = match &value {
            Value::Object(object) => self.domain.is_instance(object.object_type(), &ty)?,
            _ => true,
        };
        if fits {
            self.push(value);
        } else if throwing {
            let from = match &value {
                Value::Object(object) => self.domain.type_name(object.object_type())?,
                _ => String::new(),
            };
            return Err(self.domain.raise(
                Fault::InvalidCast,
                &format!(
                    "Unable to cast object of type '{}' to type '{}'.",
                    from,
                    self.domain.type_name(&ty)?
                ),
            ));
        } else {
            self.push(Value::Null);
        }
        Ok(Flow::Next)
    }

    fn size_of(&self, ty: &RuntimeType) -> Result<i32> {
        if let Some(primitive) = self.domain.primitive(ty)? {
            return Ok(match primitive {
                PrimitiveType::Boolean | PrimitiveType::I1 | PrimitiveType::U1 => 1,
                PrimitiveType::Char | PrimitiveType::I2 | PrimitiveType::U2 => 2,
                PrimitiveType::I4 | PrimitiveType::U4 | PrimitiveType::R4 => 4,
                _ => 8,
            });
        }
        let Some(definition) = ty.definition() else {
            return Ok(8);
        };
        if !self.domain.is_value_type(ty)? {
            return Ok(8);
        }
        let layout = self.domain.layout(definition)?;
        let mut size = 0;
        for (_, field_type) in &layout.fields {
            size += self.size_of(&field_type.substitute(ty.type_arguments(), &[]))?;
        }
        Ok(size.max(1))
    }

    #[allow(clippy::too_many_lines)]
    fn step(&mut self, pc: usize, instruction: &LiveInstruction) -> Result<Flow> {
        let operand = &instruction.operand;
        match instruction.opcode {
            EmitOpCode::Nop
            | EmitOpCode::Break
            | EmitOpCode::Unaligned
            | EmitOpCode::Volatile
            | EmitOpCode::Tailcall
            | EmitOpCode::Readonly => Ok(Flow::Next),
            EmitOpCode::Constrained => {
                self.constrained = Some(self.resolve_type(operand_type(operand)?));
                Ok(Flow::Next)
            }

            EmitOpCode::Ldarg0 => self.load_argument(0),
            EmitOpCode::Ldarg1 => self.load_argument(1),
            EmitOpCode::Ldarg2 => self.load_argument(2),
            EmitOpCode::Ldarg3 => self.load_argument(3),
            EmitOpCode::LdargS | EmitOpCode::Ldarg => self.load_argument(argument_index(operand)?),
            EmitOpCode::LdargaS | EmitOpCode::Ldarga => {
                let slot = self.argument(argument_index(operand)?)?.clone();
                self.push(Value::ByRef(Pointer::Slot(slot)));
                Ok(Flow::Next)
            }
            EmitOpCode::StargS | EmitOpCode::Starg => self.store_argument(argument_index(operand)?),
            EmitOpCode::Ldloc0 => self.load_local(0),
            EmitOpCode::Ldloc1 => self.load_local(1),
            EmitOpCode::Ldloc2 => self.load_local(2),
            EmitOpCode::Ldloc3 => self.load_local(3),
            EmitOpCode::LdlocS | EmitOpCode::Ldloc => self.load_local(local_index(operand)?),
            EmitOpCode::LdlocaS | EmitOpCode::Ldloca => {
                let slot = self.local(local_index(operand)?)?.clone();
                self.push(Value::ByRef(Pointer::Slot(slot)));
                Ok(Flow::Next)
            }
            EmitOpCode::Stloc0 => self.store_local(0),
            EmitOpCode::Stloc1 => self.store_local(1),
            EmitOpCode::Stloc2 => self.store_local(2),
            EmitOpCode::Stloc3 => self.store_local(3),
            EmitOpCode::StlocS | EmitOpCode::Stloc => self.store_local(local_index(operand)?),

            EmitOpCode::Ldnull => {
                self.push(Value::Null);
                Ok(Flow::Next)
            }
            EmitOpCode::LdcI4M1
            | EmitOpCode::LdcI40
            | EmitOpCode::LdcI41
            | EmitOpCode::LdcI42
            | EmitOpCode::LdcI43
            | EmitOpCode::LdcI44
            | EmitOpCode::LdcI45
            | EmitOpCode::LdcI46
            | EmitOpCode::LdcI47
            | EmitOpCode::LdcI48 => {
                let value = instruction.opcode as i32 - EmitOpCode::LdcI40 as i32;
                self.push(Value::I4(value));
                Ok(Flow::Next)
            }
            EmitOpCode::LdcI4S | EmitOpCode::LdcI4 | EmitOpCode::LdcI8 | EmitOpCode::LdcR4 | EmitOpCode::LdcR8 => {
                let value = match operand {
                    LiveOperand::Int8(v) => Value::I4(i32::from(*v)),
                    LiveOperand::Int32(v) => Value::I4(*v),
                    LiveOperand::Int64(v) => Value::I8(*v),
                    LiveOperand::Float32(v) => Value::F(f64::from(*v)),
                    LiveOperand::Float64(v) => Value::F(*v),
                    other => return Err(malformed(instruction.opcode, other)),
                };
                self.push(value);
                Ok(Flow::Next)
            }
            EmitOpCode::Ldstr => {
                let LiveOperand::String(text) = operand else {
                    return Err(malformed(instruction.opcode, operand));
                };
                let value = self.domain.new_string(text.as_str());
                self.push(value);
                Ok(Flow::Next)
            }
            EmitOpCode::Dup => {
                let value = self
                    .stack
                    .last()
                    .cloned()
                    .ok_or_else(|| invalid_operation!("Evaluation stack underflow in {}", self.name))?;
                self.push(value);
                Ok(Flow::Next)
            }
            EmitOpCode::Pop => {
                self.pop()?;
                Ok(Flow::Next)
            }

            EmitOpCode::Call => self.call(operand_method(operand)?, false),
            EmitOpCode::Callvirt => self.call(operand_method(operand)?, true),
            EmitOpCode::Calli => match operand {
                LiveOperand::Signature(signature) => self.call_indirect(signature),
                other => Err(malformed(instruction.opcode, other)),
            },
            EmitOpCode::Newobj => self.construct(operand_method(operand)?),
            EmitOpCode::Ret => {
                let value = match self.returns.clone() {
                    Some(ty) => {
                        let value = self.pop()?;
                        Some(self.domain.normalize(value, &ty)?)
                    }
                    None => None,
                };
                Ok(Flow::Exit(Exit::Return(value)))
            }

            EmitOpCode::BrS | EmitOpCode::Br => Ok(Flow::Jump(branch_target(operand)?)),
            EmitOpCode::BrfalseS | EmitOpCode::Brfalse => self.branch_on(operand, false),
            EmitOpCode::BrtrueS | EmitOpCode::Brtrue => self.branch_on(operand, true),
            EmitOpCode::BeqS | EmitOpCode::Beq => self.branch_if(operand, false, |o| o == Some(Ordering::Equal)),
            EmitOpCode::BneUnS | EmitOpCode::BneUn => self.branch_if(operand, true, |o| o != Some(Ordering::Equal)),
            EmitOpCode::BgeS | EmitOpCode::Bge => self.branch_if(operand, false, |o| o.is_some_and(Ordering::is_ge)),
            EmitOpCode::BgtS | EmitOpCode::Bgt => self.branch_if(operand, false, |o| o == Some(Ordering::Greater)),
            EmitOpCode::BleS | EmitOpCode::Ble => self.branch_if(operand, false, |o| o.is_some_and(Ordering::is_le)),
            EmitOpCode::BltS | EmitOpCode::Blt => self.branch_if(operand, false, |o| o == Some(Ordering::Less)),
            EmitOpCode::BgeUnS | EmitOpCode::BgeUn => self.branch_if(operand, true, |o| o.is_none_or(Ordering::is_ge)),
            EmitOpCode::BgtUnS | EmitOpCode::BgtUn => {
                self.branch_if(operand, true, |o| o.is_none_or(|o| o == Ordering::Greater))
            }
            EmitOpCode::BleUnS | EmitOpCode::BleUn => self.branch_if(operand, true, |o| o.is_none_or(Ordering::is_le)),
            EmitOpCode::BltUnS | EmitOpCode::BltUn => {
                self.branch_if(operand, true, |o| o.is_none_or(|o| o == Ordering::Less))
            }
            EmitOpCode::Switch => {
                let LiveOperand::Switch(targets) = operand else {
                    return Err(malformed(instruction.opcode, operand));
                };
                let index = self.pop()?.as_i32()? as u32 as usize;
                Ok(match targets.get(index) {
                    Some(target) => Flow::Jump(*target),
                    None => Flow::Next,
                })
            }
            EmitOpCode::Leave | EmitOpCode::LeaveS => Ok(self.leave(pc, branch_target(operand)?)),
            EmitOpCode::Endfinally => Ok(Flow::Exit(Exit::EndFinally)),
            EmitOpCode::Endfilter => {
                let accepted = self.pop()?.is_true();
                Ok(Flow::Exit(Exit::EndFilter(accepted)))
            }
            EmitOpCode::Throw => match self.pop()? {
                Value::Object(exception) => Err(Error::Exception(exception)),
                Value::Null => Err(self.null_reference()),
                other => Err(invalid_operation!("throw of {:?}", other)),
            },
            EmitOpCode::Rethrow => {
                let exception = self
                    .exceptions
                    .last()
                    .cloned()
                    .ok_or_else(|| invalid_operation!("rethrow outside a catch handler in {}", self.name))?;
                Err(Error::Exception(exception))
            }

            EmitOpCode::LdindI1 => self.load_indirect(Some(PrimitiveType::I1)),
            EmitOpCode::LdindU1 => self.load_indirect(Some(PrimitiveType::U1)),
            EmitOpCode::LdindI2 => self.load_indirect(Some(PrimitiveType::I2)),
            EmitOpCode::LdindU2 => self.load_indirect(Some(PrimitiveType::U2)),
            EmitOpCode::LdindI4 | EmitOpCode::LdindU4 => self.load_indirect(Some(PrimitiveType::I4)),
            EmitOpCode::LdindI8 => self.load_indirect(Some(PrimitiveType::I8)),
            EmitOpCode::LdindI => self.load_indirect(Some(PrimitiveType::I)),
            EmitOpCode::LdindR4 => self.load_indirect(Some(PrimitiveType::R4)),
            EmitOpCode::LdindR8 => self.load_indirect(Some(PrimitiveType::R8)),
            EmitOpCode::LdindRef => self.load_indirect(None),
            EmitOpCode::StindI1 => self.store_indirect(Some(PrimitiveType::I1)),
            EmitOpCode::StindI2 => self.store_indirect(Some(PrimitiveType::I2)),
            EmitOpCode::StindI4 => self.store_indirect(Some(PrimitiveType::I4)),
            EmitOpCode::StindI8 => self.store_indirect(Some(PrimitiveType::I8)),
            EmitOpCode::StindI => self.store_indirect(Some(PrimitiveType::I)),
            EmitOpCode::StindR4 => self.store_indirect(Some(PrimitiveType::R4)),
            EmitOpCode::StindR8 => self.store_indirect(Some(PrimitiveType::R8)),
            EmitOpCode::StindRef => self.store_indirect(None),
            EmitOpCode::Ldobj => {
                let ty = self.resolve_type(operand_type(operand)?);
                let pointer = self.pop()?;
                let value = self.pointer(pointer)?.load()?;
                let value = self.domain.normalize(value, &ty)?;
                self.push(value);
                Ok(Flow::Next)
            }
            EmitOpCode::Stobj => {
                let ty = self.resolve_type(operand_type(operand)?);
                let value = self.pop()?;
                let pointer = self.pop()?;
                let value = self.domain.normalize(value, &ty)?;
                self.pointer(pointer)?.store(value)?;
                Ok(Flow::Next)
            }
            EmitOpCode::Cpobj => {
                let source = self.pop()?;
                let destination = self.pop()?;
                let value = self.pointer(source)?.load()?;
                self.pointer(destination)?.store(value)?;
                Ok(Flow::Next)
            }
            EmitOpCode::Initobj => {
                let ty = self.resolve_type(operand_type(operand)?);
                let pointer = self.pop()?;
                let value = self.domain.default_value(&ty)?;
                self.pointer(pointer)?.store(value)?;
                Ok(Flow::Next)
            }

            EmitOpCode::Add => self.binary(BinaryOp::Add),
            EmitOpCode::Sub => self.binary(BinaryOp::Sub),
            EmitOpCode::Mul => self.binary(BinaryOp::Mul),
            EmitOpCode::Div => self.binary(BinaryOp::Div),
            EmitOpCode::DivUn => self.binary(BinaryOp::DivUn),
            EmitOpCode::Rem => self.binary(BinaryOp::Rem),
            EmitOpCode::RemUn => self.binary(BinaryOp::RemUn),
            EmitOpCode::And => self.binary(BinaryOp::And),
            EmitOpCode::Or => self.binary(BinaryOp::Or),
            EmitOpCode::Xor => self.binary(BinaryOp::Xor),
            EmitOpCode::AddOvf => self.binary(BinaryOp::AddOvf),
            EmitOpCode::AddOvfUn => self.binary(BinaryOp::AddOvfUn),
            EmitOpCode::SubOvf => self.binary(BinaryOp::SubOvf),
            EmitOpCode::SubOvfUn => self.binary(BinaryOp::SubOvfUn),
            EmitOpCode::MulOvf => self.binary(BinaryOp::MulOvf),
            EmitOpCode::MulOvfUn => self.binary(BinaryOp::MulOvfUn),
            EmitOpCode::Shl => self.shift(ShiftOp::Shl),
            EmitOpCode::Shr => self.shift(ShiftOp::Shr),
            EmitOpCode::ShrUn => self.shift(ShiftOp::ShrUn),
            EmitOpCode::Neg => {
                let value = self.pop()?;
                self.push(arith::negate(&value)?);
                Ok(Flow::Next)
            }
            EmitOpCode::Not => {
                let value = self.pop()?;
                self.push(arith::complement(&value)?);
                Ok(Flow::Next)
            }
            EmitOpCode::Ckfinite => {
                let value = self.pop()?;
                if !value.as_f64()?.is_finite() {
                    return Err(self.domain.raise(Fault::Arithmetic, "Number is not a finite value."));
                }
                self.push(value);
                Ok(Flow::Next)
            }

            EmitOpCode::ConvI1 => self.convert(ConvTarget::I1, false, false),
            EmitOpCode::ConvI2 => self.convert(ConvTarget::I2, false, false),
            EmitOpCode::ConvI4 => self.convert(ConvTarget::I4, false, false),
            EmitOpCode::ConvI8 => self.convert(ConvTarget::I8, false, false),
            EmitOpCode::ConvU1 => self.convert(ConvTarget::U1, false, false),
            EmitOpCode::ConvU2 => self.convert(ConvTarget::U2, false, false),
            EmitOpCode::ConvU4 => self.convert(ConvTarget::U4, false, false),
            EmitOpCode::ConvU8 => self.convert(ConvTarget::U8, false, true),
            EmitOpCode::ConvI => self.convert(ConvTarget::I, false, false),
            EmitOpCode::ConvU => self.convert(ConvTarget::U, false, true),
            EmitOpCode::ConvR4 => self.convert(ConvTarget::R4, false, false),
            EmitOpCode::ConvR8 => self.convert(ConvTarget::R8, false, false),
            EmitOpCode::ConvRUn => self.convert(ConvTarget::RUn, false, true),
            EmitOpCode::ConvOvfI1 => self.convert(ConvTarget::I1, true, false),
            EmitOpCode::ConvOvfI2 => self.convert(ConvTarget::I2, true, false),
            EmitOpCode::ConvOvfI4 => self.convert(ConvTarget::I4, true, false),
            EmitOpCode::ConvOvfI8 => self.convert(ConvTarget::I8, true, false),
            EmitOpCode::ConvOvfU1 => self.convert(ConvTarget::U1, true, false),
            EmitOpCode::ConvOvfU2 => self.convert(ConvTarget::U2, true, false),
            EmitOpCode::ConvOvfU4 => self.convert(ConvTarget::U4, true, false),
            EmitOpCode::ConvOvfU8 => self.convert(ConvTarget::U8, true, false),
            EmitOpCode::ConvOvfI => self.convert(ConvTarget::I, true, false),
            EmitOpCode::ConvOvfU => self.convert(ConvTarget::U, true, false),
            EmitOpCode::ConvOvfI1Un => self.convert(ConvTarget::I1, true, true),
            EmitOpCode::ConvOvfI2Un => self.convert(ConvTarget::I2, true, true),
            EmitOpCode::ConvOvfI4Un => self.convert(ConvTarget::I4, true, true),
            EmitOpCode::ConvOvfI8Un => self.convert(ConvTarget::I8, true, true),
            EmitOpCode::ConvOvfU1Un => self.convert(ConvTarget::U1, true, true),
            EmitOpCode::ConvOvfU2Un => self.convert(ConvTarget::U2, true, true),
            EmitOpCode::ConvOvfU4Un => self.convert(ConvTarget::U4, true, true),
            EmitOpCode::ConvOvfU8Un => self.convert(ConvTarget::U8, true, true),
            EmitOpCode::ConvOvfIUn => self.convert(ConvTarget::I, true, true),
            EmitOpCode::ConvOvfUUn => self.convert(ConvTarget::U, true, true),

            EmitOpCode::Ceq => self.compare(false, |o| o == Some(Ordering::Equal)),
            EmitOpCode::Cgt => self.compare(false, |o| o == Some(Ordering::Greater)),
            EmitOpCode::CgtUn => self.compare(true, |o| o.is_none_or(|o| o == Ordering::Greater)),
            EmitOpCode::Clt => self.compare(false, |o| o == Some(Ordering::Less)),
            EmitOpCode::CltUn => self.compare(true, |o| o.is_none_or(|o| o == Ordering::Less)),

            EmitOpCode::Ldfld => self.load_field(operand_field(operand)?),
            EmitOpCode::Stfld => self.store_field(operand_field(operand)?),
            EmitOpCode::Ldflda => {
                let field = self.resolve_field(operand_field(operand)?);
                let index = self.domain.field_slot(field.handle)?;
                let target = self.pop()?;
                let pointer = self.field_pointer(target, index)?;
                self.push(Value::ByRef(pointer));
                Ok(Flow::Next)
            }
            EmitOpCode::Ldsfld => {
                let value = self.domain.static_value(operand_field(operand)?.handle)?;
                self.push(value);
                Ok(Flow::Next)
            }
            EmitOpCode::Ldsflda => {
                let slot = self.domain.static_slot(operand_field(operand)?.handle)?;
                self.push(Value::ByRef(Pointer::Slot(slot)));
                Ok(Flow::Next)
            }
            EmitOpCode::Stsfld => {
                let value = self.pop()?;
                self.domain.set_static_value(operand_field(operand)?.handle, value)?;
                Ok(Flow::Next)
            }

            EmitOpCode::Castclass => self.cast(operand_type(operand)?, true),
            EmitOpCode::Isinst => self.cast(operand_type(operand)?, false),
            EmitOpCode::Box => {
                let ty = self.resolve_type(operand_type(operand)?);
                let value = self.pop()?;
                let boxed = self.domain.box_value(value, &ty)?;
                self.push(boxed);
                Ok(Flow::Next)
            }
            EmitOpCode::Unbox => {
                let ty = self.resolve_type(operand_type(operand)?);
                let value = self.pop()?;
                self.domain.unbox_value(value.clone(), &ty)?;
                let Value::Object(object) = value else {
                    return Err(invalid_operation!("unbox of {:?}", value));
                };
                self.push(Value::ByRef(Pointer::Boxed(object)));
                Ok(Flow::Next)
            }
            EmitOpCode::UnboxAny => {
                let ty = self.resolve_type(operand_type(operand)?);
                if !self.domain.is_value_type(&ty)? {
                    return self.cast(&ty, true);
                }
                let value = self.pop()?;
                let unboxed = self.domain.unbox_value(value, &ty)?;
                self.push(unboxed);
                Ok(Flow::Next)
            }

            EmitOpCode::Newarr => {
                let ty = self.resolve_type(operand_type(operand)?);
                let length = self.pop()?.as_i64()?;
                let length = usize::try_from(length)
                    .map_err(|_| self.domain.raise(Fault::Overflow, "Arithmetic operation resulted in an overflow."))?;
                let array = self.domain.new_array(ty, length)?;
                self.push(array);
                Ok(Flow::Next)
            }
            EmitOpCode::Ldlen => {
                let length = match self.pop()? {
                    Value::Object(object) => match object.data() {
                        ObjectData::Array(elements) => elements.lock()?.len(),
                        _ => return Err(invalid_operation!("ldlen on {:?}", object)),
                    },
                    Value::Null => return Err(self.null_reference()),
                    other => return Err(invalid_operation!("ldlen on {:?}", other)),
                };
                self.push(Value::NativeInt(length as i64));
                Ok(Flow::Next)
            }
            EmitOpCode::Ldelema => {
                let index = self.pop()?;
                let array = self.pop()?;
                let (array, index) = self.element(array, index)?;
                self.push(Value::ByRef(Pointer::Element(array, index)));
                Ok(Flow::Next)
            }
            EmitOpCode::LdelemI1 => self.load_element(Some(PrimitiveType::I1)),
            EmitOpCode::LdelemU1 => self.load_element(Some(PrimitiveType::U1)),
            EmitOpCode::LdelemI2 => self.load_element(Some(PrimitiveType::I2)),
            EmitOpCode::LdelemU2 => self.load_element(Some(PrimitiveType::U2)),
            EmitOpCode::LdelemI4 | EmitOpCode::LdelemU4 => self.load_element(Some(PrimitiveType::I4)),
            EmitOpCode::LdelemI8 => self.load_element(Some(PrimitiveType::I8)),
            EmitOpCode::LdelemI => self.load_element(Some(PrimitiveType::I)),
            EmitOpCode::LdelemR4 => self.load_element(Some(PrimitiveType::R4)),
            EmitOpCode::LdelemR8 => self.load_element(Some(PrimitiveType::R8)),
            EmitOpCode::LdelemRef | EmitOpCode::Ldelem => self.load_element(None),
            EmitOpCode::StelemI
            | EmitOpCode::StelemI1
            | EmitOpCode::StelemI2
            | EmitOpCode::StelemI4
            | EmitOpCode::StelemI8
            | EmitOpCode::StelemR4
            | EmitOpCode::StelemR8
            | EmitOpCode::StelemRef
            | EmitOpCode::Stelem => self.store_element(),

            EmitOpCode::Ldtoken => {
                let LiveOperand::Token(token) = operand else {
                    return Err(malformed(instruction.opcode, operand));
                };
                let token = match token {
                    LiveToken::Type(ty) => LiveToken::Type(self.resolve_type(ty)),
                    LiveToken::Field(field) => LiveToken::Field(self.resolve_field(field)),
                    LiveToken::Method(method) => LiveToken::Method(self.resolve_method(method)),
                };
                self.push(Value::Token(token));
                Ok(Flow::Next)
            }
            EmitOpCode::Ldftn => {
                let method = self.resolve_method(operand_method(operand)?);
                self.push(Value::FnPtr(method));
                Ok(Flow::Next)
            }
            EmitOpCode::Ldvirtftn => {
                let method = self.resolve_method(operand_method(operand)?);
                let target = match self.pop()? {
                    Value::Object(object) => self.domain.resolve_virtual(object.object_type(), &method)?,
                    Value::Null => return Err(self.null_reference()),
                    _ => method,
                };
                self.push(Value::FnPtr(target));
                Ok(Flow::Next)
            }
            EmitOpCode::Sizeof => {
                let ty = self.resolve_type(operand_type(operand)?);
                let size = self.size_of(&ty)?;
                self.push(Value::I4(size));
                Ok(Flow::Next)
            }

            EmitOpCode::Jmp
            | EmitOpCode::Mkrefany
            | EmitOpCode::Refanyval
            | EmitOpCode::Refanytype
            | EmitOpCode::Arglist
            | EmitOpCode::Localloc
            | EmitOpCode::Cpblk
            | EmitOpCode::Initblk => Err(Error::NotSupported(format!(
                "{} in {} cannot be interpreted",
                instruction.opcode, self.name
            ))),
        }
    }
}

fn malformed(opcode: EmitOpCode, operand: &LiveOperand) -> Error {
    invalid_operation!("{} with operand {:?}", opcode, operand)
}

fn branch_target(operand: &LiveOperand) -> Result<usize> {
    match operand {
        LiveOperand::Target(target) => Ok(*target),
        other => Err(invalid_operation!("Unresolved branch operand {:?}", other)),
    }
}

fn argument_index(operand: &LiveOperand) -> Result<u16> {
    match operand {
        LiveOperand::Argument(index) => Ok(*index),
        other => Err(invalid_operation!("Expected an argument, found {:?}", other)),
    }
}

fn local_index(operand: &LiveOperand) -> Result<u16> {
    match operand {
        LiveOperand::Local(index) => Ok(*index),
        other => Err(invalid_operation!("Expected a local, found {:?}", other)),
    }
}

fn operand_type(operand: &LiveOperand) -> Result<&RuntimeType> {
    match operand {
        LiveOperand::Type(ty) => Ok(ty),
        other => Err(invalid_operation!("Expected a type, found {:?}", other)),
    }
}

fn operand_method(operand: &LiveOperand) -> Result<&RuntimeMethod> {
    match operand {
        LiveOperand::Method(method) => Ok(method),
        other => Err(invalid_operation!("Expected a method, found {:?}", other)),
    }
}

fn operand_field(operand: &LiveOperand) -> Result<&RuntimeField> {
    match operand {
        LiveOperand::Field(field) => Ok(field),
        other => Err(invalid_operation!("Expected a field, found {:?}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        emit::{AssemblyBuilder, CodeWriter, LiveParameter, MethodHandle, TypeHandle},
        metadata::{
            definitions::{FieldAttributes, MethodAttributes, MethodImplAttributes, TypeAttributes},
            signatures::CallingConvention,
            typesystem::AssemblyName,
        },
    };
    use uguid::Guid;

    struct Fixture {
        builder: AssemblyBuilder,
        ty: TypeHandle,
    }

    impl Fixture {
        fn new(domain: &Domain, name: &str) -> Self {
            let mut builder = AssemblyBuilder::new(domain.reserve_id(), AssemblyName::new(name));
            let module = builder.define_module(format!("{name}.dll"), Guid::ZERO);
            let ty = builder
                .define_type(module, "Tests", "Program", TypeAttributes::PUBLIC, None)
                .unwrap();
            builder
                .set_parent(ty, Some(corlib::primitive_type(PrimitiveType::Object)))
                .unwrap();
            Fixture { builder, ty }
        }

        fn declare(&mut self, name: &str, parameters: Vec<RuntimeType>, return_type: RuntimeType) -> MethodHandle {
            let handle = self
                .builder
                .define_method(
                    self.ty,
                    name,
                    MethodAttributes::PUBLIC | MethodAttributes::STATIC,
                    MethodImplAttributes::empty(),
                    Vec::new(),
                )
                .unwrap();
            let parameter_info = vec![LiveParameter::default(); parameters.len()];
            let signature = LiveSignature {
                has_this: false,
                convention: CallingConvention::Default,
                generic_arity: 0,
                return_type,
                parameters,
            };
            self.builder
                .set_signature(handle, signature, parameter_info, LiveParameter::default())
                .unwrap();
            handle
        }

        fn define(
            &mut self,
            name: &str,
            parameters: Vec<RuntimeType>,
            return_type: RuntimeType,
            write: impl FnOnce(&mut CodeWriter),
        ) -> MethodHandle {
            let handle = self.declare(name, parameters.clone(), return_type);
            self.implement(handle, parameters.len(), write);
            handle
        }

        fn implement(&mut self, handle: MethodHandle, argument_count: usize, write: impl FnOnce(&mut CodeWriter)) {
            let mut writer = CodeWriter::new(argument_count as u16);
            write(&mut writer);
            self.builder.set_body(handle, writer.finish().unwrap()).unwrap();
        }

        fn load(self, domain: &Domain) {
            domain.register(self.builder.seal().unwrap()).unwrap();
        }
    }

    fn int32() -> RuntimeType {
        corlib::primitive_type(PrimitiveType::I4)
    }

    fn call(domain: &Domain, method: MethodHandle, arguments: Vec<Value>) -> Result<Option<Value>> {
        domain.invoke(&RuntimeMethod::plain(method), None, arguments)
    }

    fn emit(writer: &mut CodeWriter, opcode: EmitOpCode) {
        writer.emit_simple(opcode).unwrap();
    }

    #[test]
    fn loop_sums_arguments() {
        let domain = Domain::new().unwrap();
        let mut fixture = Fixture::new(&domain, "Loops");
        // sum of 1..=n
        let sum = fixture.define("Sum", vec![int32()], int32(), |w| {
            let total = w.declare_local(int32()).unwrap();
            let test = w.define_label();
            let body = w.define_label();
            w.emit(EmitOpCode::Br, LiveOperand::Label(test)).unwrap();
            w.mark_label(body).unwrap();
            w.emit(EmitOpCode::Ldloc, LiveOperand::Local(total)).unwrap();
            emit(w, EmitOpCode::Ldarg0);
            emit(w, EmitOpCode::Add);
            w.emit(EmitOpCode::Stloc, LiveOperand::Local(total)).unwrap();
            emit(w, EmitOpCode::Ldarg0);
            emit(w, EmitOpCode::LdcI41);
            emit(w, EmitOpCode::Sub);
            w.emit(EmitOpCode::Starg, LiveOperand::Argument(0)).unwrap();
            w.mark_label(test).unwrap();
            emit(w, EmitOpCode::Ldarg0);
            w.emit(EmitOpCode::Brtrue, LiveOperand::Label(body)).unwrap();
            w.emit(EmitOpCode::Ldloc, LiveOperand::Local(total)).unwrap();
            emit(w, EmitOpCode::Ret);
        });
        fixture.load(&domain);
        assert_eq!(call(&domain, sum, vec![Value::I4(10)]).unwrap(), Some(Value::I4(55)));
    }

    #[test]
    fn catch_and_finally_run_in_order() {
        let domain = Domain::new().unwrap();
        let mut fixture = Fixture::new(&domain, "Handlers");
        let exception = RuntimeType::Type(corlib::EXCEPTION);
        // try { x = 10 / arg0 } catch (Exception) { x = -1 } finally { x = x * 2 } return x
        let divide = fixture.define("Divide", vec![int32()], int32(), |w| {
            let x = w.declare_local(int32()).unwrap();
            let end = w.define_label();
            let outer = w.begin_exception_block();
            let inner = w.begin_exception_block();
            w.emit(EmitOpCode::LdcI4S, LiveOperand::Int8(10)).unwrap();
            emit(w, EmitOpCode::Ldarg0);
            emit(w, EmitOpCode::Div);
            w.emit(EmitOpCode::Stloc, LiveOperand::Local(x)).unwrap();
            w.emit(EmitOpCode::Leave, LiveOperand::Label(end)).unwrap();
            w.begin_catch_block(inner, Some(exception.clone())).unwrap();
            emit(w, EmitOpCode::Pop);
            emit(w, EmitOpCode::LdcI4M1);
            w.emit(EmitOpCode::Stloc, LiveOperand::Local(x)).unwrap();
            w.emit(EmitOpCode::Leave, LiveOperand::Label(end)).unwrap();
            w.end_exception_block(inner).unwrap();
            w.begin_finally_block(outer).unwrap();
            w.emit(EmitOpCode::Ldloc, LiveOperand::Local(x)).unwrap();
            emit(w, EmitOpCode::LdcI42);
            emit(w, EmitOpCode::Mul);
            w.emit(EmitOpCode::Stloc, LiveOperand::Local(x)).unwrap();
            emit(w, EmitOpCode::Endfinally);
            w.end_exception_block(outer).unwrap();
            w.mark_label(end).unwrap();
            w.emit(EmitOpCode::Ldloc, LiveOperand::Local(x)).unwrap();
            emit(w, EmitOpCode::Ret);
        });
        fixture.load(&domain);
        assert_eq!(call(&domain, divide, vec![Value::I4(5)]).unwrap(), Some(Value::I4(4)));
        assert_eq!(call(&domain, divide, vec![Value::I4(0)]).unwrap(), Some(Value::I4(-2)));
    }

    #[test]
    fn uncaught_exception_escapes_after_finally() {
        let domain = Domain::new().unwrap();
        let mut fixture = Fixture::new(&domain, "Escapes");
        let int_type = int32();
        let counter = fixture
            .builder
            .define_field(
                fixture.ty,
                "counter",
                FieldAttributes::STATIC | FieldAttributes::PUBLIC,
                int_type.clone(),
            )
            .unwrap();
        let field = RuntimeField::plain(counter);
        let fail = fixture.define("Fail", vec![], RuntimeType::Type(corlib::primitive_handle(PrimitiveType::Void)), |w| {
            let end = w.define_label();
            let block = w.begin_exception_block();
            emit(w, EmitOpCode::Ldnull);
            emit(w, EmitOpCode::Throw);
            w.emit(EmitOpCode::Leave, LiveOperand::Label(end)).unwrap();
            w.begin_finally_block(block).unwrap();
            emit(w, EmitOpCode::LdcI47);
            w.emit(EmitOpCode::Stsfld, LiveOperand::Field(field.clone())).unwrap();
            emit(w, EmitOpCode::Endfinally);
            w.end_exception_block(block).unwrap();
            w.mark_label(end).unwrap();
            emit(w, EmitOpCode::Ret);
        });
        fixture.load(&domain);

        let Err(Error::Exception(exception)) = call(&domain, fail, vec![]) else {
            panic!("expected a managed exception");
        };
        assert!(domain
            .is_instance(exception.object_type(), &RuntimeType::Type(Fault::NullReference.handle()))
            .unwrap());
        assert_eq!(domain.static_value(counter).unwrap(), Value::I4(7));
    }

    #[test]
    fn filter_selects_handler() {
        let domain = Domain::new().unwrap();
        let mut fixture = Fixture::new(&domain, "Filters");
        // try { throw new OverflowException() } filter { arg0 } { return 1 } return 0
        let overflow_ctor = domain
            .live_type(Fault::Overflow.handle())
            .unwrap()
            .methods
            .iter()
            .find(|m| m.is_constructor() && m.signature.as_ref().is_some_and(|s| s.parameters.is_empty()))
            .map(|m| m.handle)
            .unwrap();
        let guarded = fixture.define("Guarded", vec![int32()], int32(), |w| {
            let result = w.declare_local(int32()).unwrap();
            let end = w.define_label();
            let block = w.begin_exception_block();
            w.emit(EmitOpCode::Newobj, LiveOperand::Method(RuntimeMethod::plain(overflow_ctor)))
                .unwrap();
            emit(w, EmitOpCode::Throw);
            w.begin_except_filter_block(block).unwrap();
            emit(w, EmitOpCode::Pop);
            emit(w, EmitOpCode::Ldarg0);
            emit(w, EmitOpCode::Endfilter);
            w.begin_catch_block(block, None).unwrap();
            emit(w, EmitOpCode::Pop);
            emit(w, EmitOpCode::LdcI41);
            w.emit(EmitOpCode::Stloc, LiveOperand::Local(result)).unwrap();
            w.emit(EmitOpCode::Leave, LiveOperand::Label(end)).unwrap();
            w.end_exception_block(block).unwrap();
            w.mark_label(end).unwrap();
            w.emit(EmitOpCode::Ldloc, LiveOperand::Local(result)).unwrap();
            emit(w, EmitOpCode::Ret);
        });
        fixture.load(&domain);
        assert_eq!(call(&domain, guarded, vec![Value::I4(1)]).unwrap(), Some(Value::I4(1)));
        assert!(matches!(call(&domain, guarded, vec![Value::I4(0)]), Err(Error::Exception(_))));
    }

    #[test]
    fn arrays_and_switch() {
        let domain = Domain::new().unwrap();
        let mut fixture = Fixture::new(&domain, "Arrays");
        // new int[3]; a[arg0] = 5; switch (arg0) { case 0: return a[0]; default: return a.Length }
        let pick = fixture.define("Pick", vec![int32()], int32(), |w| {
            let array = w.declare_local(int32().make_array(0)).unwrap();
            let zero = w.define_label();
            emit(w, EmitOpCode::LdcI43);
            w.emit(EmitOpCode::Newarr, LiveOperand::Type(int32())).unwrap();
            w.emit(EmitOpCode::Stloc, LiveOperand::Local(array)).unwrap();
            w.emit(EmitOpCode::Ldloc, LiveOperand::Local(array)).unwrap();
            emit(w, EmitOpCode::Ldarg0);
            emit(w, EmitOpCode::LdcI45);
            emit(w, EmitOpCode::StelemI4);
            emit(w, EmitOpCode::Ldarg0);
            w.emit(EmitOpCode::Switch, LiveOperand::Labels(vec![zero])).unwrap();
            w.emit(EmitOpCode::Ldloc, LiveOperand::Local(array)).unwrap();
            emit(w, EmitOpCode::Ldlen);
            emit(w, EmitOpCode::ConvI4);
            emit(w, EmitOpCode::Ret);
            w.mark_label(zero).unwrap();
            w.emit(EmitOpCode::Ldloc, LiveOperand::Local(array)).unwrap();
            emit(w, EmitOpCode::LdcI40);
            emit(w, EmitOpCode::LdelemI4);
            emit(w, EmitOpCode::Ret);
        });
        fixture.load(&domain);
        assert_eq!(call(&domain, pick, vec![Value::I4(0)]).unwrap(), Some(Value::I4(5)));
        assert_eq!(call(&domain, pick, vec![Value::I4(2)]).unwrap(), Some(Value::I4(3)));
        let Err(Error::Exception(exception)) = call(&domain, pick, vec![Value::I4(3)]) else {
            panic!("expected IndexOutOfRangeException");
        };
        assert_eq!(exception.object_type(), &RuntimeType::Type(Fault::IndexOutOfRange.handle()));
    }

    #[test]
    fn runaway_recursion_is_bounded() {
        let domain = Domain::new().unwrap();
        let mut fixture = Fixture::new(&domain, "Recursion");
        let forever = fixture.declare("Forever", vec![], int32());
        fixture.implement(forever, 0, |w| {
            w.emit(EmitOpCode::Call, LiveOperand::Method(RuntimeMethod::plain(forever)))
                .unwrap();
            emit(w, EmitOpCode::Ret);
        });
        fixture.load(&domain);
        let outcome = std::thread::Builder::new()
            .stack_size(64 * 1024 * 1024)
            .spawn(move || call(&domain, forever, vec![]))
            .unwrap()
            .join()
            .unwrap();
        assert!(matches!(outcome, Err(Error::RecursionLimit(MAX_CALL_DEPTH))));
    }
}
