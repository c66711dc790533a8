//! Static method bodies to live method bodies.
//!
//! Transcoding walks the instruction list once. Before any instruction is emitted, every
//! local is declared, one label is defined per instruction, and every exception handler is
//! turned into boundary actions keyed by instruction index. The walk then runs the actions
//! due at each index, marks the instruction's label and emits the instruction with its
//! operand resolved to a live handle.
//!
//! Handlers sharing a protected range become one exception block, in the order their
//! regions appear. A handler must start where the protected range (or the previous handler
//! of the same range) ends; other layouts cannot be expressed by a [`CodeWriter`] and are
//! rejected as [`Error::UnsupportedConstruction`].

use std::collections::BTreeMap;

use log::trace;

use crate::{
    emit::{emit_opcode, BlockId, CodeWriter, Label, LiveBody, LiveOperand, RuntimeType},
    instrument::resolver::{GenericContext, SymbolResolver},
    metadata::{
        method::{ExceptionHandler, HandlerKind, Instruction, MethodBody, Operand},
        signatures::CallingConvention,
    },
    Error, Result,
};

/// Region boundary work due before the instruction at some index.
#[derive(Debug, Clone)]
enum RegionAction {
    Begin(usize),
    Catch(usize, RuntimeType),
    Filter(usize),
    FilterHandler(usize),
    Finally(usize),
    Fault(usize),
    End(usize),
}

impl RegionAction {
    /// Ends close inner blocks first, handler switches follow, begins open outer blocks first.
    fn rank(&self) -> u8 {
        match self {
            RegionAction::End(_) => 0,
            RegionAction::Catch(..)
            | RegionAction::Filter(_)
            | RegionAction::FilterHandler(_)
            | RegionAction::Finally(_)
            | RegionAction::Fault(_) => 1,
            RegionAction::Begin(_) => 2,
        }
    }
}

/// Handlers of one protected range, in region order.
struct Block<'h> {
    try_start: usize,
    try_end: usize,
    handlers: Vec<&'h ExceptionHandler>,
}

impl Block<'_> {
    fn end(&self) -> usize {
        self.handlers
            .iter()
            .map(|handler| handler.handler_end)
            .max()
            .unwrap_or(self.try_end)
    }
}

fn region_start(handler: &ExceptionHandler) -> usize {
    match handler.kind() {
        HandlerKind::Filter => handler.filter_start.unwrap_or(handler.handler_start),
        _ => handler.handler_start,
    }
}

/// Translates static bodies in the generic context of one method.
pub struct Transcoder<'r, 'a> {
    resolver: &'r SymbolResolver<'a>,
    context: GenericContext,
}

impl<'r, 'a> Transcoder<'r, 'a> {
    /// A transcoder resolving operands through `resolver` in `context`.
    #[must_use]
    pub fn new(resolver: &'r SymbolResolver<'a>, context: GenericContext) -> Self {
        Transcoder { resolver, context }
    }

    /// Translate `body` of a method taking `argument_count` arguments, `this` included.
    ///
    /// # Errors
    /// - [`Error::UnsupportedInstruction`] for malformed instructions, out-of-range local or
    ///   argument ordinals and opcodes without a live counterpart
    /// - [`Error::NotSupported`] for `calli` sites with an unmanaged calling convention
    /// - [`Error::UnsupportedConstruction`] for handler layouts that cannot be expressed
    /// - any resolution error of an operand
    pub fn transcode(&self, body: &MethodBody, argument_count: u16) -> Result<LiveBody> {
        let count = body.instructions.len();
        if let Some(target) = body.dangling_targets().first() {
            return Err(Error::UnsupportedInstruction(format!(
                "Branch to {target} outside a body of {count} instruction(s)"
            )));
        }

        let mut writer = CodeWriter::new(argument_count);
        writer.set_max_stack(body.max_stack);
        writer.set_init_locals(body.init_locals);
        for local in &body.locals {
            let ty = self.resolver.resolve_type(local, &self.context)?;
            writer.declare_local(ty)?;
        }
        let labels: Vec<Label> = (0..count).map(|_| writer.define_label()).collect();

        let blocks = group_handlers(&body.exception_handlers, count)?;
        let mut boundaries = self.boundary_actions(&blocks)?;
        let mut ids: Vec<Option<BlockId>> = vec![None; blocks.len()];

        for (index, instruction) in body.instructions.iter().enumerate() {
            if let Some(actions) = boundaries.remove(&index) {
                run_actions(&mut writer, &mut ids, actions)?;
            }
            writer.mark_label(labels[index])?;
            self.emit(&mut writer, instruction, &labels, body.locals.len(), argument_count)
                .map_err(|error| match error {
                    Error::UnsupportedInstruction(message) => {
                        Error::UnsupportedInstruction(format!("IL_{index:04}: {message}"))
                    }
                    other => other,
                })?;
        }
        if let Some(actions) = boundaries.remove(&count) {
            run_actions(&mut writer, &mut ids, actions)?;
        }

        trace!(
            "Transcoded {} instruction(s), {} local(s), {} handler(s)",
            count,
            body.locals.len(),
            body.exception_handlers.len()
        );
        writer.finish()
    }

    fn boundary_actions(&self, blocks: &[Block<'_>]) -> Result<BTreeMap<usize, Vec<RegionAction>>> {
        let mut keyed: Vec<(usize, isize, RegionAction)> = Vec::new();
        for (id, block) in blocks.iter().enumerate() {
            // Outer blocks open first, inner blocks close first.
            keyed.push((block.try_start, -(block.end() as isize), RegionAction::Begin(id)));
            keyed.push((block.end(), -(block.try_start as isize), RegionAction::End(id)));

            for handler in &block.handlers {
                match handler.kind() {
                    HandlerKind::Catch => {
                        let declared = handler.catch_type.as_ref().ok_or_else(|| {
                            malformed_error!("Catch handler at {} has no type", handler.handler_start)
                        })?;
                        let ty = self.resolver.resolve_type(declared, &self.context)?;
                        keyed.push((handler.handler_start, 0, RegionAction::Catch(id, ty)));
                    }
                    HandlerKind::Filter => {
                        keyed.push((region_start(handler), 0, RegionAction::Filter(id)));
                        keyed.push((handler.handler_start, 0, RegionAction::FilterHandler(id)));
                    }
                    HandlerKind::Finally => {
                        keyed.push((handler.handler_start, 0, RegionAction::Finally(id)));
                    }
                    HandlerKind::Fault => {
                        keyed.push((handler.handler_start, 0, RegionAction::Fault(id)));
                    }
                }
            }
        }
        keyed.sort_by_key(|(position, order, action)| (*position, action.rank(), *order));

        let mut boundaries: BTreeMap<usize, Vec<RegionAction>> = BTreeMap::new();
        for (position, _, action) in keyed {
            boundaries.entry(position).or_default().push(action);
        }
        Ok(boundaries)
    }

    fn emit(
        &self,
        writer: &mut CodeWriter,
        instruction: &Instruction,
        labels: &[Label],
        local_count: usize,
        argument_count: u16,
    ) -> Result<()> {
        if !instruction.is_well_formed() {
            return Err(Error::UnsupportedInstruction(format!(
                "{} does not take {:?}",
                instruction.opcode, instruction.operand
            )));
        }
        if let Some(local) = instruction.opcode.implicit_local() {
            if usize::from(local) >= local_count {
                return Err(Error::UnsupportedInstruction(format!(
                    "{} refers to undeclared local {local}",
                    instruction.opcode
                )));
            }
        }
        if let Some(argument) = instruction.opcode.implicit_argument() {
            if argument >= argument_count {
                return Err(Error::UnsupportedInstruction(format!(
                    "{} refers to missing argument {argument}",
                    instruction.opcode
                )));
            }
        }

        let opcode = emit_opcode(instruction.opcode)?;
        let operand = match &instruction.operand {
            Operand::None => LiveOperand::None,
            Operand::Int8(value) => LiveOperand::Int8(*value),
            Operand::Int32(value) => LiveOperand::Int32(*value),
            Operand::Int64(value) => LiveOperand::Int64(*value),
            Operand::Float32(value) => LiveOperand::Float32(*value),
            Operand::Float64(value) => LiveOperand::Float64(*value),
            Operand::String(value) => LiveOperand::String(value.clone()),
            Operand::Local(index) => LiveOperand::Local(*index),
            Operand::Argument(index) => LiveOperand::Argument(*index),
            Operand::Type(ty) => LiveOperand::Type(self.resolver.resolve_type(ty, &self.context)?),
            Operand::Field(field) => {
                LiveOperand::Field(self.resolver.resolve_field(field, &self.context)?)
            }
            Operand::Method(method) => {
                LiveOperand::Method(self.resolver.resolve_method(method, &self.context)?)
            }
            Operand::Token(member) => {
                LiveOperand::Token(self.resolver.resolve_token(member, &self.context)?)
            }
            Operand::Target(target) => LiveOperand::Label(labels[*target]),
            Operand::Switch(targets) => {
                LiveOperand::Labels(targets.iter().map(|target| labels[*target]).collect())
            }
            Operand::Signature(signature) => {
                if signature.convention != CallingConvention::Default {
                    return Err(Error::NotSupported(format!(
                        "calli with {:?} calling convention",
                        signature.convention
                    )));
                }
                LiveOperand::Signature(self.resolver.resolve_signature(signature, &self.context)?)
            }
        };
        writer.emit(opcode, operand)
    }
}

fn run_actions(writer: &mut CodeWriter, ids: &mut [Option<BlockId>], actions: Vec<RegionAction>) -> Result<()> {
    let block = |ids: &[Option<BlockId>], id: usize| {
        ids[id].ok_or_else(|| invalid_operation!("Exception block {} used before it begins", id))
    };
    for action in actions {
        match action {
            RegionAction::Begin(id) => ids[id] = Some(writer.begin_exception_block()),
            RegionAction::Catch(id, ty) => writer.begin_catch_block(block(ids, id)?, Some(ty))?,
            RegionAction::Filter(id) => writer.begin_except_filter_block(block(ids, id)?)?,
            RegionAction::FilterHandler(id) => writer.begin_catch_block(block(ids, id)?, None)?,
            RegionAction::Finally(id) => writer.begin_finally_block(block(ids, id)?)?,
            RegionAction::Fault(id) => writer.begin_fault_block(block(ids, id)?)?,
            RegionAction::End(id) => writer.end_exception_block(block(ids, id)?)?,
        }
    }
    Ok(())
}

/// Group handlers by protected range and check each group is laid out back to back.
fn group_handlers(handlers: &[ExceptionHandler], count: usize) -> Result<Vec<Block<'_>>> {
    let mut blocks: Vec<Block<'_>> = Vec::new();
    for handler in handlers {
        let filter_ok = match handler.kind() {
            HandlerKind::Filter => handler
                .filter_start
                .is_some_and(|start| start < handler.handler_start),
            _ => true,
        };
        if handler.try_start >= handler.try_end
            || handler.handler_start >= handler.handler_end
            || handler.handler_end > count
            || !filter_ok
        {
            return Err(malformed_error!(
                "Handler regions {}..{} / {}..{} are empty or out of range",
                handler.try_start,
                handler.try_end,
                handler.handler_start,
                handler.handler_end
            ));
        }
        match blocks
            .iter_mut()
            .find(|block| block.try_start == handler.try_start && block.try_end == handler.try_end)
        {
            Some(block) => block.handlers.push(handler),
            None => blocks.push(Block {
                try_start: handler.try_start,
                try_end: handler.try_end,
                handlers: vec![handler],
            }),
        }
    }

    for block in &mut blocks {
        block.handlers.sort_by_key(|handler| region_start(handler));
        let mut expected = block.try_end;
        for handler in &block.handlers {
            if region_start(handler) != expected {
                return Err(Error::UnsupportedConstruction(format!(
                    "Handler at {} does not follow its protected range {}..{}",
                    region_start(handler),
                    block.try_start,
                    block.try_end
                )));
            }
            expected = handler.handler_end;
        }
    }
    Ok(blocks)
}

/// Translate `body` in `context`, see [`Transcoder::transcode`].
///
/// # Errors
/// See [`Transcoder::transcode`].
pub fn transcode(
    resolver: &SymbolResolver<'_>,
    context: GenericContext,
    body: &MethodBody,
    argument_count: u16,
) -> Result<LiveBody> {
    Transcoder::new(resolver, context).transcode(body, argument_count)
}
