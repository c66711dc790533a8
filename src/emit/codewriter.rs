//! Incremental construction of live method bodies.
//!
//! A [`CodeWriter`] appends instructions against live handles. Branches name [`Label`]s,
//! which may be defined long before they are marked; [`CodeWriter::finish`] resolves every
//! label to the index of the instruction it was marked at and produces a [`LiveBody`].
//!
//! Exception regions are described with explicit calls around the instructions they cover:
//!
//! ```text
//! let block = writer.begin_exception_block();   // try starts here
//! ...                                            // protected instructions
//! writer.begin_catch_block(block, Some(ty))?;   // try ends, handler starts
//! ...
//! writer.end_exception_block(block)?;           // handler ends
//! ```
//!
//! Unlike some code generators, the writer never injects `leave` or `endfinally` on its own:
//! what is emitted is exactly what was asked for, which keeps transcoded bodies identical
//! to their source.

use std::fmt;

use crate::{
    disassembler::OperandType,
    emit::{
        handles::{LiveSignature, LiveToken, RuntimeField, RuntimeMethod, RuntimeType},
        opcodes::EmitOpCode,
    },
    Error, Result,
};

/// A branch target, valid within the writer that defined it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(u32);

/// An exception block opened with [`CodeWriter::begin_exception_block`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(usize);

/// Operand of a live instruction.
///
/// While writing, branches carry [`LiveOperand::Label`] and [`LiveOperand::Labels`]; a
/// finished [`LiveBody`] carries [`LiveOperand::Target`] and [`LiveOperand::Switch`] instead.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveOperand {
    /// No operand
    None,
    /// 8-bit immediate
    Int8(i8),
    /// 32-bit immediate
    Int32(i32),
    /// 64-bit immediate
    Int64(i64),
    /// 32-bit float immediate
    Float32(f32),
    /// 64-bit float immediate
    Float64(f64),
    /// String literal
    String(String),
    /// Local variable ordinal
    Local(u16),
    /// Argument ordinal, `this` included
    Argument(u16),
    /// A type
    Type(RuntimeType),
    /// A field
    Field(RuntimeField),
    /// A method or constructor
    Method(RuntimeMethod),
    /// A type, field or method handle for `ldtoken`
    Token(LiveToken),
    /// Unresolved single branch target
    Label(Label),
    /// Unresolved switch table
    Labels(Vec<Label>),
    /// Resolved branch target (instruction index)
    Target(usize),
    /// Resolved switch table (instruction indices)
    Switch(Vec<usize>),
    /// Call-site signature of `calli`
    Signature(LiveSignature),
}

impl LiveOperand {
    fn fits(&self, operand_type: OperandType) -> bool {
        matches!(
            (operand_type, self),
            (OperandType::InlineNone, LiveOperand::None)
                | (OperandType::ShortInlineI, LiveOperand::Int8(_))
                | (OperandType::InlineI, LiveOperand::Int32(_))
                | (OperandType::InlineI8, LiveOperand::Int64(_))
                | (OperandType::ShortInlineR, LiveOperand::Float32(_))
                | (OperandType::InlineR, LiveOperand::Float64(_))
                | (OperandType::InlineString, LiveOperand::String(_))
                | (OperandType::InlineType, LiveOperand::Type(_))
                | (OperandType::InlineField, LiveOperand::Field(_))
                | (OperandType::InlineMethod, LiveOperand::Method(_))
                | (OperandType::InlineTok, LiveOperand::Token(_))
                | (OperandType::ShortInlineBrTarget | OperandType::InlineBrTarget, LiveOperand::Label(_))
                | (OperandType::InlineSwitch, LiveOperand::Labels(_))
                | (OperandType::ShortInlineVar | OperandType::InlineVar, LiveOperand::Local(_))
                | (OperandType::ShortInlineArg | OperandType::InlineArg, LiveOperand::Argument(_))
                | (OperandType::InlineSig, LiveOperand::Signature(_))
        )
    }
}

/// One instruction of a live body.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveInstruction {
    /// The opcode
    pub opcode: EmitOpCode,
    /// Its operand
    pub operand: LiveOperand,
}

impl fmt::Display for LiveInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode)?;
        match &self.operand {
            LiveOperand::None => Ok(()),
            LiveOperand::Int8(v) => write!(f, " {v}"),
            LiveOperand::Int32(v) => write!(f, " {v}"),
            LiveOperand::Int64(v) => write!(f, " {v}"),
            LiveOperand::Float32(v) => write!(f, " {v}"),
            LiveOperand::Float64(v) => write!(f, " {v}"),
            LiveOperand::String(v) => write!(f, " {v:?}"),
            LiveOperand::Local(v) => write!(f, " V_{v}"),
            LiveOperand::Argument(v) => write!(f, " A_{v}"),
            LiveOperand::Target(v) => write!(f, " IL_{v}"),
            LiveOperand::Switch(targets) => write!(f, " {targets:?}"),
            other => write!(f, " {other:?}"),
        }
    }
}

/// Kind of a live exception clause.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveClauseKind {
    /// Typed catch
    Catch(RuntimeType),
    /// Filtered catch; the filter block starts at the given instruction
    Filter(usize),
    /// Finally block
    Finally,
    /// Fault block
    Fault,
}

/// A protected region and its handler, as instruction index ranges (end exclusive).
#[derive(Debug, Clone, PartialEq)]
pub struct LiveExceptionClause {
    /// Kind and kind-specific data
    pub kind: LiveClauseKind,
    /// First protected instruction
    pub try_start: usize,
    /// One past the last protected instruction
    pub try_end: usize,
    /// First handler instruction
    pub handler_start: usize,
    /// One past the last handler instruction
    pub handler_end: usize,
}

impl LiveExceptionClause {
    /// `true` if the instruction at `index` is protected by this clause.
    #[must_use]
    pub fn protects(&self, index: usize) -> bool {
        (self.try_start..self.try_end).contains(&index)
    }

    /// `true` if the instruction at `index` belongs to the handler (or filter) block.
    #[must_use]
    pub fn handles(&self, index: usize) -> bool {
        let start = match self.kind {
            LiveClauseKind::Filter(filter_start) => filter_start,
            _ => self.handler_start,
        };
        (start..self.handler_end).contains(&index)
    }
}

/// A finished live method body.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LiveBody {
    /// Evaluation stack bound declared by the source
    pub max_stack: u16,
    /// Zero-initialize locals
    pub init_locals: bool,
    /// Local variable types by ordinal
    pub locals: Vec<RuntimeType>,
    /// Instructions in program order
    pub instructions: Vec<LiveInstruction>,
    /// Exception clauses, innermost first
    pub clauses: Vec<LiveExceptionClause>,
}

#[derive(Debug)]
enum OpenHandler {
    Catch(RuntimeType, usize),
    Filter(usize),
    FilterHandler(usize, usize),
    Finally(usize),
    Fault(usize),
}

#[derive(Debug)]
struct OpenBlock {
    try_start: usize,
    try_end: Option<usize>,
    handler: Option<OpenHandler>,
    closed: bool,
}

/// Writes one live method body.
#[derive(Debug)]
pub struct CodeWriter {
    argument_count: u16,
    body: LiveBody,
    labels: Vec<Option<usize>>,
    blocks: Vec<OpenBlock>,
    clauses: Vec<(usize, LiveExceptionClause)>,
}

impl CodeWriter {
    /// Start a body for a method taking `argument_count` arguments, `this` included.
    #[must_use]
    pub fn new(argument_count: u16) -> Self {
        CodeWriter {
            argument_count,
            body: LiveBody {
                max_stack: 8,
                init_locals: true,
                ..LiveBody::default()
            },
            labels: Vec::new(),
            blocks: Vec::new(),
            clauses: Vec::new(),
        }
    }

    /// Set the declared evaluation stack bound.
    pub fn set_max_stack(&mut self, max_stack: u16) {
        self.body.max_stack = max_stack;
    }

    /// Set whether locals are zero-initialized.
    pub fn set_init_locals(&mut self, init_locals: bool) {
        self.body.init_locals = init_locals;
    }

    /// Declare the next local and return its ordinal.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] past 65535 locals.
    pub fn declare_local(&mut self, ty: RuntimeType) -> Result<u16> {
        let ordinal = u16::try_from(self.body.locals.len())
            .map_err(|_| invalid_operation!("Too many locals"))?;
        self.body.locals.push(ty);
        Ok(ordinal)
    }

    /// Number of instructions emitted so far.
    #[must_use]
    pub fn position(&self) -> usize {
        self.body.instructions.len()
    }

    /// Create a label that can be branched to before it is marked.
    pub fn define_label(&mut self) -> Label {
        self.labels.push(None);
        Label((self.labels.len() - 1) as u32)
    }

    /// Attach `label` to the next instruction emitted.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] for foreign or already marked labels.
    pub fn mark_label(&mut self, label: Label) -> Result<()> {
        let position = self.position();
        match self.labels.get_mut(label.0 as usize) {
            Some(slot @ None) => {
                *slot = Some(position);
                Ok(())
            }
            Some(Some(_)) => Err(invalid_operation!("Label {} marked twice", label.0)),
            None => Err(invalid_operation!("Label {} was not defined here", label.0)),
        }
    }

    /// Append one instruction.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnsupportedInstruction`] if the operand does not have the
    /// shape the opcode takes or names a local or argument that does not exist.
    pub fn emit(&mut self, opcode: EmitOpCode, operand: LiveOperand) -> Result<()> {
        if !operand.fits(opcode.operand_type()) {
            return Err(Error::UnsupportedInstruction(format!(
                "{opcode} does not take {operand:?}"
            )));
        }
        match &operand {
            LiveOperand::Local(index) if usize::from(*index) >= self.body.locals.len() => {
                return Err(Error::UnsupportedInstruction(format!(
                    "{opcode} refers to undeclared local {index}"
                )));
            }
            LiveOperand::Argument(index) if *index >= self.argument_count => {
                return Err(Error::UnsupportedInstruction(format!(
                    "{opcode} refers to missing argument {index}"
                )));
            }
            LiveOperand::Label(label) if label.0 as usize >= self.labels.len() => {
                return Err(invalid_operation!("Label {} was not defined here", label.0));
            }
            LiveOperand::Labels(labels) if labels.iter().any(|l| l.0 as usize >= self.labels.len()) => {
                return Err(invalid_operation!("Switch names a label not defined here"));
            }
            _ => {}
        }
        self.body.instructions.push(LiveInstruction { opcode, operand });
        Ok(())
    }

    /// Emit an instruction without operand.
    ///
    /// # Errors
    /// See [`CodeWriter::emit`].
    pub fn emit_simple(&mut self, opcode: EmitOpCode) -> Result<()> {
        self.emit(opcode, LiveOperand::None)
    }

    /// Open a protected region starting at the next instruction.
    pub fn begin_exception_block(&mut self) -> BlockId {
        self.blocks.push(OpenBlock {
            try_start: self.position(),
            try_end: None,
            handler: None,
            closed: false,
        });
        BlockId(self.blocks.len() - 1)
    }

    fn open_block(&mut self, block: BlockId) -> Result<&mut OpenBlock> {
        match self.blocks.get_mut(block.0) {
            Some(open) if !open.closed => Ok(open),
            Some(_) => Err(invalid_operation!("Exception block {} already ended", block.0)),
            None => Err(invalid_operation!("Exception block {} was not begun here", block.0)),
        }
    }

    /// End the protected region (first call) or the current handler (later calls) at the
    /// current position and record the finished clause.
    fn close_handler(&mut self, block: BlockId) -> Result<()> {
        let position = self.position();
        let open = self.open_block(block)?;
        let try_start = open.try_start;
        let try_end = *open.try_end.get_or_insert(position);
        let kind = match open.handler.take() {
            None => return Ok(()),
            Some(OpenHandler::Filter(_)) => {
                return Err(invalid_operation!(
                    "Filter of block {} has no handler",
                    block.0
                ))
            }
            Some(OpenHandler::Catch(ty, start)) => (LiveClauseKind::Catch(ty), start),
            Some(OpenHandler::FilterHandler(filter, start)) => (LiveClauseKind::Filter(filter), start),
            Some(OpenHandler::Finally(start)) => (LiveClauseKind::Finally, start),
            Some(OpenHandler::Fault(start)) => (LiveClauseKind::Fault, start),
        };
        self.clauses.push((
            block.0,
            LiveExceptionClause {
                kind: kind.0,
                try_start,
                try_end,
                handler_start: kind.1,
                handler_end: position,
            },
        ));
        Ok(())
    }

    /// Begin a catch handler.
    ///
    /// With `None`, completes a filter opened by [`CodeWriter::begin_except_filter_block`]:
    /// the handler of a filtered clause starts here.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] for unknown or ended blocks, or `None`
    /// without a pending filter.
    pub fn begin_catch_block(&mut self, block: BlockId, catch_type: Option<RuntimeType>) -> Result<()> {
        let position = self.position();
        match catch_type {
            Some(ty) => {
                self.close_handler(block)?;
                self.open_block(block)?.handler = Some(OpenHandler::Catch(ty, position));
            }
            None => {
                let open = self.open_block(block)?;
                match open.handler.take() {
                    Some(OpenHandler::Filter(filter)) => {
                        open.handler = Some(OpenHandler::FilterHandler(filter, position));
                    }
                    other => {
                        open.handler = other;
                        return Err(invalid_operation!(
                            "Untyped catch in block {} without a filter",
                            block.0
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    /// Begin a filter block; its handler follows with `begin_catch_block(block, None)`.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] for unknown or ended blocks.
    pub fn begin_except_filter_block(&mut self, block: BlockId) -> Result<()> {
        let position = self.position();
        self.close_handler(block)?;
        self.open_block(block)?.handler = Some(OpenHandler::Filter(position));
        Ok(())
    }

    /// Begin a finally handler.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] for unknown or ended blocks.
    pub fn begin_finally_block(&mut self, block: BlockId) -> Result<()> {
        let position = self.position();
        self.close_handler(block)?;
        self.open_block(block)?.handler = Some(OpenHandler::Finally(position));
        Ok(())
    }

    /// Begin a fault handler.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] for unknown or ended blocks.
    pub fn begin_fault_block(&mut self, block: BlockId) -> Result<()> {
        let position = self.position();
        self.close_handler(block)?;
        self.open_block(block)?.handler = Some(OpenHandler::Fault(position));
        Ok(())
    }

    /// End the current handler and the block.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] for unknown or ended blocks, and for
    /// blocks without any handler.
    pub fn end_exception_block(&mut self, block: BlockId) -> Result<()> {
        if self.open_block(block)?.handler.is_none() {
            return Err(invalid_operation!("Exception block {} has no handler", block.0));
        }
        self.close_handler(block)?;
        self.open_block(block)?.closed = true;
        Ok(())
    }

    /// Resolve labels and return the body.
    ///
    /// Clauses are ordered innermost first: by size of the protected region, then by the
    /// order their blocks were begun, then by handler order.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] for labels that are branched to but never
    /// marked, and for blocks left open.
    pub fn finish(mut self) -> Result<LiveBody> {
        if let Some(index) = self.blocks.iter().position(|block| !block.closed) {
            return Err(invalid_operation!("Exception block {} was never ended", index));
        }

        let labels = self.labels;
        let resolve = |label: &Label| -> Result<usize> {
            labels
                .get(label.0 as usize)
                .copied()
                .flatten()
                .ok_or_else(|| invalid_operation!("Label {} is never marked", label.0))
        };
        for instruction in &mut self.body.instructions {
            instruction.operand = match &instruction.operand {
                LiveOperand::Label(label) => LiveOperand::Target(resolve(label)?),
                LiveOperand::Labels(labels) => {
                    LiveOperand::Switch(labels.iter().map(&resolve).collect::<Result<_>>()?)
                }
                _ => continue,
            };
        }

        self.clauses
            .sort_by_key(|(block, clause)| (clause.try_end - clause.try_start, *block));
        self.body.clauses = self.clauses.into_iter().map(|(_, clause)| clause).collect();
        Ok(self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emit::handles::{AssemblyId, TypeHandle};

    fn exception_type() -> RuntimeType {
        RuntimeType::Type(TypeHandle::new(AssemblyId(0), 7))
    }

    #[test]
    fn forward_and_backward_branches() {
        let mut writer = CodeWriter::new(1);
        let top = writer.define_label();
        let end = writer.define_label();
        writer.mark_label(top).unwrap();
        writer.emit(EmitOpCode::Ldarg0, LiveOperand::None).unwrap();
        writer.emit(EmitOpCode::Brfalse, LiveOperand::Label(end)).unwrap();
        writer.emit(EmitOpCode::Br, LiveOperand::Label(top)).unwrap();
        writer.mark_label(end).unwrap();
        writer.emit_simple(EmitOpCode::Ret).unwrap();

        let body = writer.finish().unwrap();
        assert_eq!(body.instructions[1].operand, LiveOperand::Target(3));
        assert_eq!(body.instructions[2].operand, LiveOperand::Target(0));
    }

    #[test]
    fn label_misuse() {
        let mut writer = CodeWriter::new(0);
        let label = writer.define_label();
        writer.mark_label(label).unwrap();
        assert!(writer.mark_label(label).is_err());

        let dangling = writer.define_label();
        writer.emit(EmitOpCode::Br, LiveOperand::Label(dangling)).unwrap();
        assert!(matches!(writer.finish(), Err(Error::InvalidOperation(_))));
    }

    #[test]
    fn operand_shape_is_checked() {
        let mut writer = CodeWriter::new(1);
        assert!(matches!(
            writer.emit(EmitOpCode::LdcI4, LiveOperand::Int8(1)),
            Err(Error::UnsupportedInstruction(_))
        ));
        assert!(writer.emit(EmitOpCode::Ldloc, LiveOperand::Local(0)).is_err());
        assert!(writer.emit(EmitOpCode::Ldarg, LiveOperand::Argument(1)).is_err());
        writer.declare_local(exception_type()).unwrap();
        assert!(writer.emit(EmitOpCode::Ldloc, LiveOperand::Local(0)).is_ok());
    }

    #[test]
    fn nested_regions_are_listed_innermost_first() {
        let mut writer = CodeWriter::new(0);
        let outer = writer.begin_exception_block();
        let inner = writer.begin_exception_block();
        writer.emit_simple(EmitOpCode::Nop).unwrap();
        writer.begin_catch_block(inner, Some(exception_type())).unwrap();
        writer.emit_simple(EmitOpCode::Pop).unwrap();
        writer.end_exception_block(inner).unwrap();
        writer.emit_simple(EmitOpCode::Nop).unwrap();
        writer.begin_finally_block(outer).unwrap();
        writer.emit_simple(EmitOpCode::Endfinally).unwrap();
        writer.end_exception_block(outer).unwrap();
        writer.emit_simple(EmitOpCode::Ret).unwrap();

        let body = writer.finish().unwrap();
        assert_eq!(body.instructions.len(), 5);
        assert_eq!(
            body.clauses,
            vec![
                LiveExceptionClause {
                    kind: LiveClauseKind::Catch(exception_type()),
                    try_start: 0,
                    try_end: 1,
                    handler_start: 1,
                    handler_end: 2,
                },
                LiveExceptionClause {
                    kind: LiveClauseKind::Finally,
                    try_start: 0,
                    try_end: 3,
                    handler_start: 3,
                    handler_end: 4,
                },
            ]
        );
    }

    #[test]
    fn filter_then_handler() {
        let mut writer = CodeWriter::new(0);
        let block = writer.begin_exception_block();
        writer.emit_simple(EmitOpCode::Nop).unwrap();
        writer.begin_except_filter_block(block).unwrap();
        writer.emit_simple(EmitOpCode::Endfilter).unwrap();
        writer.begin_catch_block(block, None).unwrap();
        writer.emit_simple(EmitOpCode::Pop).unwrap();
        writer.end_exception_block(block).unwrap();

        let body = writer.finish().unwrap();
        let clause = &body.clauses[0];
        assert_eq!(clause.kind, LiveClauseKind::Filter(1));
        assert_eq!((clause.handler_start, clause.handler_end), (2, 3));
        assert!(clause.handles(1));
        assert!(!clause.protects(1));
    }

    #[test]
    fn block_misuse() {
        let mut writer = CodeWriter::new(0);
        let block = writer.begin_exception_block();
        assert!(writer.end_exception_block(block).is_err());
        assert!(writer.begin_catch_block(block, None).is_err());
        writer.begin_fault_block(block).unwrap();
        writer.end_exception_block(block).unwrap();
        assert!(writer.begin_finally_block(block).is_err());

        let mut open = CodeWriter::new(0);
        open.begin_exception_block();
        assert!(open.finish().is_err());
    }
}
