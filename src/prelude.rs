//! # dotweave Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the dotweave library. Import this module to get quick access to the essential
//! types for instrumenting assemblies and intercepting calls.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all dotweave operations
pub use crate::Error;

/// The result type used throughout dotweave
pub use crate::Result;

// ================================================================================================
// Main Entry Points
// ================================================================================================

/// Instrumentation front end and its configuration
pub use crate::instrument::{InstrumentOptions, Instrumenter, Strategy, TypeFilter};

/// Execution domain and the interceptor chain
pub use crate::runtime::{Domain, Interceptor, Invocation, Value};

// ================================================================================================
// Static Module Model
// ================================================================================================

/// Assemblies, modules, types and members as read from an image
pub use crate::metadata::definitions::{
    FieldAttributes, FieldDefinition, MethodAttributes, MethodDefinition, StaticAssembly,
    StaticModule, TypeAttributes, TypeDefinition,
};

/// Symbolic references
pub use crate::metadata::{
    members::{FieldReference, MemberReference, MethodReference},
    typesystem::{AssemblyName, PrimitiveType, TypeReference},
};

/// Method bodies
pub use crate::metadata::method::{ExceptionHandler, Instruction, MethodBody, Operand};

/// Method signatures
pub use crate::metadata::signatures::{CallingConvention, MethodSignature};

/// The static instruction set
pub use crate::disassembler::OpCode;

// ================================================================================================
// Live Module Model
// ================================================================================================

/// Live handles and assemblies
pub use crate::emit::{
    FieldHandle, LoadedAssembly, MethodHandle, RuntimeMethod, RuntimeType, TypeHandle,
};

// ================================================================================================
// Instrumentation Building Blocks
// ================================================================================================

/// Resolver, transcoder and staged builder for custom pipelines
pub use crate::instrument::{GenericContext, StagedModuleBuilder, SymbolResolver, Transcoder};
