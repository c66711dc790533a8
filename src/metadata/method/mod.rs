//! Method bodies of the static model: instructions, locals and exception regions.

mod body;
mod exceptions;
mod instruction;

pub use body::MethodBody;
pub use exceptions::{ExceptionHandler, ExceptionHandlerFlags, HandlerKind};
pub use instruction::{Instruction, Operand};
