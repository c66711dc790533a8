//! The live module model.
//!
//! Everything an instrumentation build produces lives here: live handles and type shapes,
//! the live instruction set, the [`CodeWriter`] that assembles method bodies, and the
//! [`AssemblyBuilder`] that turns declared shells into a sealed, executable
//! [`LoadedAssembly`].
//!
//! # Lifecycle
//!
//! 1. Shells are declared on an [`AssemblyBuilder`]; each receives a handle immediately.
//! 2. Members are declared against the shells and become visible through the per-type
//!    [`DynamicType`] side-table.
//! 3. Bodies are written with a [`CodeWriter`] and attached.
//! 4. [`AssemblyBuilder::seal`] creates every type at once.

mod assembly;
mod builder;
mod codewriter;
mod handles;
mod opcodes;
mod types;

pub use assembly::{LiveModule, LoadedAssembly, PermissionRequests};
pub use builder::{AssemblyBuilder, AttributeTarget, DynamicType, SecurityTarget, TypeBuilder};
pub use codewriter::{
    BlockId, CodeWriter, Label, LiveBody, LiveClauseKind, LiveExceptionClause, LiveInstruction,
    LiveOperand,
};
pub use handles::{
    AssemblyId, FieldHandle, LiveSignature, LiveToken, MethodHandle, RuntimeField, RuntimeMethod,
    RuntimeType, TypeHandle,
};
pub use opcodes::{emit_opcode, EmitOpCode, OPCODE_MAP};
pub use types::{
    FieldEntry, LiveArgument, LiveAttribute, LiveEvent, LiveField, LiveGenericParameter,
    LiveMethod, LiveNamedArgument, LiveParameter, LiveProperty, LiveType, MethodEntry,
    NativeMethod, TypeMembers,
};
