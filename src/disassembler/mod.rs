//! CIL instruction set, decoding and encoding.
//!
//! This module provides the static side of the instruction set: the [`OpCode`] table with
//! operand shapes and flow classes, a byte decoder that produces
//! [`Instruction`](crate::metadata::method::Instruction)s with symbolic operands, and the
//! matching encoder used when a rewritten module is written back to an image.
//!
//! # Key Types
//! - [`OpCode`] / [`OPCODES`] - Every opcode with its encoding and [`OperandType`]
//! - [`RawInstruction`] - A decoded instruction before token resolution
//! - [`TokenResolver`] / [`TokenProvider`] - Seams to the image's reference tables
//!
//! # Main Functions
//! - [`decode_instruction`] - Decode a single instruction
//! - [`decode_stream`] - Decode a code section linearly
//! - [`decode_code`] - Decode into static instructions with index branch targets
//! - [`encode_instructions`] - Encode static instructions back into bytes

mod decoder;
mod encoder;
mod opcodes;

pub use decoder::{
    decode_code, decode_instruction, decode_stream, DecodedCode, RawInstruction, RawOperand,
    TokenResolver,
};
pub use encoder::{encode_instructions, EncodedCode, TokenProvider};
pub use opcodes::{FlowType, OpCode, OpCodeInfo, OperandType, FE_PREFIX, OPCODES};
