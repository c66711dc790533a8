//! CIL byte decoding.
//!
//! Decoding happens in two steps. [`decode_instruction`] reads one opcode and its raw operand
//! (immediates, tokens, relative branch offsets) without interpreting anything, and
//! [`decode_code`] walks a whole code section, then rewrites tokens into symbolic references
//! through a [`TokenResolver`] and relative branch offsets into instruction indices.
//!
//! # Example
//!
//! ```rust
//! use dotweave::{disassembler::{decode_instruction, OpCode, RawOperand}, Parser};
//!
//! let code = [0x2B, 0x02]; // br.s +2
//! let mut parser = Parser::new(&code);
//! let raw = decode_instruction(&mut parser)?;
//! assert_eq!(raw.opcode, OpCode::BrS);
//! assert_eq!(raw.operand, RawOperand::Branch(2));
//! # Ok::<(), dotweave::Error>(())
//! ```

use crate::{
    disassembler::{OpCode, OperandType, FE_PREFIX},
    file::parser::Parser,
    metadata::{
        members::{FieldReference, MemberReference, MethodReference},
        method::{Instruction, Operand},
        signatures::MethodSignature,
        token::Token,
        typesystem::TypeReference,
    },
    Result,
};

/// Maps the tokens found in IL to symbolic references.
///
/// Implemented by the image reader over its reference tables and heaps.
pub trait TokenResolver {
    /// A `TypeDefOrRef` or `TypeSpec` token.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for dangling tokens.
    fn resolve_type(&self, token: Token) -> Result<TypeReference>;

    /// A field `MemberRef` token.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for dangling tokens or method references.
    fn resolve_field(&self, token: Token) -> Result<FieldReference>;

    /// A method `MemberRef` or `MethodSpec` token.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for dangling tokens or field references.
    fn resolve_method(&self, token: Token) -> Result<MethodReference>;

    /// The `ldtoken` operand: any of the above.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for dangling tokens.
    fn resolve_member(&self, token: Token) -> Result<MemberReference>;

    /// A user-string token.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for dangling tokens.
    fn resolve_string(&self, token: Token) -> Result<String>;

    /// A stand-alone call-site signature token.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for dangling tokens.
    fn resolve_signature(&self, token: Token) -> Result<MethodSignature>;
}

/// An operand as encoded, before any interpretation.
#[derive(Debug, Clone, PartialEq)]
pub enum RawOperand {
    /// No operand
    None,
    /// 8-bit signed immediate
    Int8(i8),
    /// 32-bit immediate
    Int32(i32),
    /// 64-bit immediate
    Int64(i64),
    /// 32-bit float
    Float32(f32),
    /// 64-bit float
    Float64(f64),
    /// Metadata token
    Token(Token),
    /// Local or argument index, short or long form
    Variable(u16),
    /// Branch offset relative to the next instruction
    Branch(i32),
    /// Jump table, relative to the next instruction
    Switch(Vec<i32>),
}

/// One decoded instruction with its position.
#[derive(Debug, Clone, PartialEq)]
pub struct RawInstruction {
    /// Byte offset from the start of the code section
    pub offset: usize,
    /// Encoded size including operand
    pub size: usize,
    /// The opcode
    pub opcode: OpCode,
    /// The raw operand
    pub operand: RawOperand,
}

impl RawInstruction {
    /// Absolute byte offsets of all branch targets.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if a target lies before the start of the code.
    pub fn branch_targets(&self) -> Result<Vec<usize>> {
        let next = self.offset + self.size;
        let absolute = |relative: i32| {
            let target = next as i64 + i64::from(relative);
            usize::try_from(target)
                .map_err(|_| malformed_error!("Branch target before code start - IL_{:04x}", self.offset))
        };

        match &self.operand {
            RawOperand::Branch(relative) => Ok(vec![absolute(*relative)?]),
            RawOperand::Switch(relatives) => relatives.iter().map(|r| absolute(*r)).collect(),
            _ => Ok(Vec::new()),
        }
    }
}

/// Decode the instruction at the parser position.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for unassigned opcodes and
/// [`crate::Error::OutOfBounds`] for truncated operands.
pub fn decode_instruction(parser: &mut Parser) -> Result<RawInstruction> {
    let offset = parser.pos();
    let first = parser.read_le::<u8>()?;
    let opcode = if first == FE_PREFIX {
        let second = parser.read_le::<u8>()?;
        OpCode::from_prefixed_byte(second)
            .ok_or_else(|| malformed_error!("Invalid opcode: FE {:02X}", second))?
    } else {
        OpCode::from_byte(first).ok_or_else(|| malformed_error!("Invalid opcode: {:02X}", first))?
    };

    let operand = match opcode.operand_type() {
        OperandType::InlineNone => RawOperand::None,
        OperandType::ShortInlineI => RawOperand::Int8(parser.read_le::<i8>()?),
        OperandType::InlineI => RawOperand::Int32(parser.read_le::<i32>()?),
        OperandType::InlineI8 => RawOperand::Int64(parser.read_le::<i64>()?),
        OperandType::ShortInlineR => RawOperand::Float32(parser.read_le::<f32>()?),
        OperandType::InlineR => RawOperand::Float64(parser.read_le::<f64>()?),
        OperandType::InlineString
        | OperandType::InlineType
        | OperandType::InlineField
        | OperandType::InlineMethod
        | OperandType::InlineTok
        | OperandType::InlineSig => RawOperand::Token(Token::new(parser.read_le::<u32>()?)),
        OperandType::ShortInlineBrTarget => RawOperand::Branch(i32::from(parser.read_le::<i8>()?)),
        OperandType::InlineBrTarget => RawOperand::Branch(parser.read_le::<i32>()?),
        OperandType::ShortInlineVar | OperandType::ShortInlineArg => {
            RawOperand::Variable(u16::from(parser.read_le::<u8>()?))
        }
        OperandType::InlineVar | OperandType::InlineArg => {
            RawOperand::Variable(parser.read_le::<u16>()?)
        }
        OperandType::InlineSwitch => {
            let count = parser.read_le::<u32>()? as usize;
            if count.saturating_mul(4) > parser.remaining() {
                return Err(crate::Error::OutOfBounds);
            }
            let mut targets = Vec::with_capacity(count);
            for _ in 0..count {
                targets.push(parser.read_le::<i32>()?);
            }
            RawOperand::Switch(targets)
        }
    };

    Ok(RawInstruction {
        offset,
        size: parser.pos() - offset,
        opcode,
        operand,
    })
}

/// Decode a whole code section linearly.
///
/// # Errors
/// See [`decode_instruction`].
pub fn decode_stream(code: &[u8]) -> Result<Vec<RawInstruction>> {
    let mut parser = Parser::new(code);
    let mut instructions = Vec::new();
    while parser.has_more_data() {
        instructions.push(decode_instruction(&mut parser)?);
    }
    Ok(instructions)
}

/// A decoded code section in the static model.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedCode {
    /// Instructions with symbolic operands and index branch targets
    pub instructions: Vec<Instruction>,
    /// Byte offset of each instruction
    pub offsets: Vec<usize>,
    /// Total code size
    pub code_size: usize,
}

impl DecodedCode {
    /// Map a byte offset to an instruction index. The end of the code maps to
    /// `instructions.len()`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for offsets inside an instruction or past the end.
    pub fn index_of(&self, offset: usize) -> Result<usize> {
        if offset == self.code_size {
            return Ok(self.instructions.len());
        }
        self.offsets
            .binary_search(&offset)
            .map_err(|_| malformed_error!("Offset IL_{:04x} is not an instruction boundary", offset))
    }
}

/// Decode a code section into static instructions.
///
/// # Errors
/// Returns decoding errors, resolver errors and [`crate::Error::Malformed`] for branches into
/// the middle of an instruction.
pub fn decode_code(code: &[u8], tokens: &dyn TokenResolver) -> Result<DecodedCode> {
    let raw = decode_stream(code)?;
    let mut decoded = DecodedCode {
        instructions: Vec::with_capacity(raw.len()),
        offsets: raw.iter().map(|i| i.offset).collect(),
        code_size: code.len(),
    };

    for instruction in &raw {
        let operand = match (instruction.opcode.operand_type(), &instruction.operand) {
            (_, RawOperand::None) => Operand::None,
            (_, RawOperand::Int8(v)) => Operand::Int8(*v),
            (_, RawOperand::Int32(v)) => Operand::Int32(*v),
            (_, RawOperand::Int64(v)) => Operand::Int64(*v),
            (_, RawOperand::Float32(v)) => Operand::Float32(*v),
            (_, RawOperand::Float64(v)) => Operand::Float64(*v),
            (OperandType::ShortInlineVar | OperandType::InlineVar, RawOperand::Variable(v)) => {
                Operand::Local(*v)
            }
            (_, RawOperand::Variable(v)) => Operand::Argument(*v),
            (OperandType::InlineString, RawOperand::Token(t)) => Operand::String(tokens.resolve_string(*t)?),
            (OperandType::InlineType, RawOperand::Token(t)) => Operand::Type(tokens.resolve_type(*t)?),
            (OperandType::InlineField, RawOperand::Token(t)) => Operand::Field(tokens.resolve_field(*t)?),
            (OperandType::InlineMethod, RawOperand::Token(t)) => {
                Operand::Method(tokens.resolve_method(*t)?)
            }
            (OperandType::InlineSig, RawOperand::Token(t)) => {
                Operand::Signature(tokens.resolve_signature(*t)?)
            }
            (_, RawOperand::Token(t)) => Operand::Token(tokens.resolve_member(*t)?),
            (_, RawOperand::Branch(_)) => {
                let targets = instruction.branch_targets()?;
                Operand::Target(decoded.index_of(targets[0])?)
            }
            (_, RawOperand::Switch(_)) => Operand::Switch(
                instruction
                    .branch_targets()?
                    .into_iter()
                    .map(|target| decoded.index_of(target))
                    .collect::<Result<Vec<_>>>()?,
            ),
        };
        decoded.instructions.push(Instruction::new(instruction.opcode, operand));
    }

    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{metadata::token::TABLE, Error};

    struct Strings;

    impl TokenResolver for Strings {
        fn resolve_type(&self, token: Token) -> Result<TypeReference> {
            Err(malformed_error!("no type {}", token))
        }
        fn resolve_field(&self, token: Token) -> Result<FieldReference> {
            Err(malformed_error!("no field {}", token))
        }
        fn resolve_method(&self, token: Token) -> Result<MethodReference> {
            Err(malformed_error!("no method {}", token))
        }
        fn resolve_member(&self, token: Token) -> Result<MemberReference> {
            Err(malformed_error!("no member {}", token))
        }
        fn resolve_string(&self, token: Token) -> Result<String> {
            if token.table() == TABLE::USER_STRING {
                Ok(format!("s{}", token.row()))
            } else {
                Err(malformed_error!("no string {}", token))
            }
        }
        fn resolve_signature(&self, token: Token) -> Result<MethodSignature> {
            Err(malformed_error!("no signature {}", token))
        }
    }

    #[test]
    fn two_byte_and_operands() {
        let code = [0xFE, 0x01, 0x20, 0x78, 0x56, 0x34, 0x12, 0x11, 0x05];
        let raw = decode_stream(&code).unwrap();
        assert_eq!(raw[0].opcode, OpCode::Ceq);
        assert_eq!(raw[0].size, 2);
        assert_eq!(raw[1].operand, RawOperand::Int32(0x1234_5678));
        assert_eq!(raw[2].opcode, OpCode::LdlocS);
        assert_eq!(raw[2].operand, RawOperand::Variable(5));
        assert_eq!(raw[2].offset, 7);
    }

    #[test]
    fn branches_become_indices() {
        // 0: ldarg.0  1: switch (+1, -13)  14: ret  15: br.s -3  17: ret
        let code = [
            0x02, 0x45, 0x02, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0xF3, 0xFF, 0xFF, 0xFF, 0x2A,
            0x2B, 0xFD, 0x2A,
        ];
        let decoded = decode_code(&code, &Strings).unwrap();
        assert_eq!(decoded.offsets, vec![0, 1, 14, 15, 17]);
        assert_eq!(decoded.instructions[1].operand, Operand::Switch(vec![3, 1]));
        assert_eq!(decoded.instructions[3].operand, Operand::Target(2));
        assert_eq!(decoded.index_of(18).unwrap(), 5);
        assert!(decoded.index_of(3).is_err());
    }

    #[test]
    fn strings_and_bad_input() {
        let code = [0x72, 0x07, 0x00, 0x00, 0x70, 0x2A];
        let decoded = decode_code(&code, &Strings).unwrap();
        assert_eq!(decoded.instructions[0].operand, Operand::String("s7".into()));

        assert!(decode_stream(&[0x24]).is_err());
        assert!(matches!(decode_stream(&[0x20, 0x01]), Err(Error::OutOfBounds)));
        // br.s into the middle of ldc.i4
        assert!(decode_code(&[0x2B, 0x01, 0x20, 0, 0, 0, 0], &Strings).is_err());
    }
}
