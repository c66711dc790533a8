use crate::metadata::{
    method::{ExceptionHandler, Instruction},
    typesystem::TypeReference,
};

/// A method body of the static model.
///
/// Locals are referenced by ordinal, so their order is significant. Exception-handler
/// boundaries and branch targets are indices into `instructions`.
///
/// # Examples
///
/// ```rust,no_run
/// use dotweave::metadata::method::{Instruction, MethodBody};
/// use dotweave::metadata::typesystem::TypeReference;
/// use dotweave::disassembler::OpCode;
///
/// let body = MethodBody::new()
///     .local(TypeReference::int32())
///     .push(Instruction::simple(OpCode::Ldarg1))
///     .push(Instruction::load_int32(1))
///     .push(Instruction::simple(OpCode::Add))
///     .push(Instruction::simple(OpCode::Ret));
/// assert_eq!(body.instructions.len(), 4);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct MethodBody {
    /// Maximum evaluation stack depth
    pub max_stack: u16,
    /// Zero-initialize locals on entry
    pub init_locals: bool,
    /// Local variable types, in declaration order
    pub locals: Vec<TypeReference>,
    /// Instruction stream
    pub instructions: Vec<Instruction>,
    /// Protected regions, innermost first
    pub exception_handlers: Vec<ExceptionHandler>,
}

impl Default for MethodBody {
    fn default() -> Self {
        MethodBody {
            max_stack: 8,
            init_locals: true,
            locals: Vec::new(),
            instructions: Vec::new(),
            exception_handlers: Vec::new(),
        }
    }
}

impl MethodBody {
    /// An empty body with `max_stack` 8 and zero-initialized locals.
    #[must_use]
    pub fn new() -> Self {
        MethodBody::default()
    }

    /// Set the maximum stack depth.
    #[must_use]
    pub fn max_stack(mut self, max_stack: u16) -> Self {
        self.max_stack = max_stack;
        self
    }

    /// Declare the next local.
    #[must_use]
    pub fn local(mut self, local_type: TypeReference) -> Self {
        self.locals.push(local_type);
        self
    }

    /// Append an instruction.
    #[must_use]
    pub fn push(mut self, instruction: Instruction) -> Self {
        self.instructions.push(instruction);
        self
    }

    /// Append several instructions.
    #[must_use]
    pub fn extend(mut self, instructions: impl IntoIterator<Item = Instruction>) -> Self {
        self.instructions.extend(instructions);
        self
    }

    /// Add a protected region.
    #[must_use]
    pub fn handler(mut self, handler: ExceptionHandler) -> Self {
        self.exception_handlers.push(handler);
        self
    }

    /// Boundary indices referenced by branches and handlers that lie past the last
    /// instruction, other than the end-of-body marker.
    #[must_use]
    pub fn dangling_targets(&self) -> Vec<usize> {
        use crate::metadata::method::Operand;

        let len = self.instructions.len();
        let mut dangling = Vec::new();
        for instruction in &self.instructions {
            match &instruction.operand {
                Operand::Target(target) if *target >= len => dangling.push(*target),
                Operand::Switch(targets) => {
                    dangling.extend(targets.iter().copied().filter(|t| *t >= len));
                }
                _ => {}
            }
        }
        for handler in &self.exception_handlers {
            let bounds = [
                handler.try_start,
                handler.try_end,
                handler.handler_start,
                handler.handler_end,
            ];
            dangling.extend(bounds.into_iter().chain(handler.filter_start).filter(|b| *b > len));
        }
        dangling
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{disassembler::OpCode, metadata::method::Operand};

    #[test]
    fn dangling_targets_found() {
        let body = MethodBody::new()
            .push(Instruction::new(OpCode::Br, Operand::Target(5)))
            .push(Instruction::simple(OpCode::Ret))
            .handler(ExceptionHandler::finally((0, 1), (1, 2)));
        assert_eq!(body.dangling_targets(), vec![5]);

        let body = MethodBody::new()
            .push(Instruction::new(OpCode::Switch, Operand::Switch(vec![0, 1])))
            .push(Instruction::simple(OpCode::Ret));
        assert!(body.dangling_targets().is_empty());
    }
}
