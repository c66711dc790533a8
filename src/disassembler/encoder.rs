//! CIL byte encoding, the inverse of [`crate::disassembler::decode_code`].
//!
//! Encoding runs in two passes: the first sizes every instruction to fix the byte offset of
//! each index, the second writes opcodes and operands, turning index branch targets into
//! offsets relative to the next instruction. Instructions keep the form they were given in;
//! a short branch whose target is out of `i8` range is an error rather than a silent
//! widening.

use crate::{
    disassembler::{OpCode, OperandType, FE_PREFIX},
    file::writer::Writer,
    metadata::{
        members::{FieldReference, MemberReference, MethodReference},
        method::{Instruction, Operand},
        signatures::MethodSignature,
        token::Token,
        typesystem::TypeReference,
    },
    Error, Result,
};

/// Allocates tokens for the symbolic operands of instructions.
///
/// Implemented by the image writer over its reference tables and heaps.
pub trait TokenProvider {
    /// Token for a type operand.
    ///
    /// # Errors
    /// Implementation specific.
    fn type_token(&mut self, ty: &TypeReference) -> Result<Token>;

    /// Token for a field operand.
    ///
    /// # Errors
    /// Implementation specific.
    fn field_token(&mut self, field: &FieldReference) -> Result<Token>;

    /// Token for a method operand.
    ///
    /// # Errors
    /// Implementation specific.
    fn method_token(&mut self, method: &MethodReference) -> Result<Token>;

    /// User-string token for a literal.
    ///
    /// # Errors
    /// Implementation specific.
    fn string_token(&mut self, value: &str) -> Result<Token>;

    /// Stand-alone signature token for a `calli` call site.
    ///
    /// # Errors
    /// Implementation specific.
    fn signature_token(&mut self, signature: &MethodSignature) -> Result<Token>;
}

/// Encoded code bytes plus the offset of every instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedCode {
    /// The code section
    pub code: Vec<u8>,
    /// Byte offset of each instruction, followed by the total size
    pub offsets: Vec<usize>,
}

impl EncodedCode {
    /// Byte offset of an instruction index; `instructions.len()` maps to the code size.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for indices past the end.
    pub fn offset_of(&self, index: usize) -> Result<u32> {
        let offset = self
            .offsets
            .get(index)
            .ok_or_else(|| malformed_error!("Instruction index {} past the end of the body", index))?;
        u32::try_from(*offset).map_err(|_| malformed_error!("Code offset {} too large", offset))
    }
}

fn encoded_size(instruction: &Instruction) -> Result<usize> {
    let operand_size = match (&instruction.operand, instruction.opcode.operand_type().size()) {
        (Operand::Switch(targets), None) => 4 + 4 * targets.len(),
        (_, Some(size)) => size,
        (_, None) => {
            return Err(Error::UnsupportedInstruction(format!(
                "{} without a jump table",
                instruction.opcode
            )))
        }
    };
    Ok(instruction.opcode.opcode_size() + operand_size)
}

fn relative(from_next: usize, to: usize) -> Result<i32> {
    let delta = to as i64 - from_next as i64;
    i32::try_from(delta).map_err(|_| malformed_error!("Branch distance {} out of range", delta))
}

fn variable_index(opcode: OpCode, short: bool, index: u16) -> Result<()> {
    if short && index > u16::from(u8::MAX) {
        return Err(malformed_error!("{} cannot address index {}", opcode, index));
    }
    Ok(())
}

/// Encode instructions into a code section.
///
/// # Errors
/// Returns [`crate::Error::UnsupportedInstruction`] if an operand does not fit its opcode,
/// [`crate::Error::Malformed`] for unreachable targets, and token provider errors.
pub fn encode_instructions(instructions: &[Instruction], tokens: &mut dyn TokenProvider) -> Result<EncodedCode> {
    let mut offsets = Vec::with_capacity(instructions.len() + 1);
    let mut position = 0usize;
    for instruction in instructions {
        if !instruction.is_well_formed() {
            return Err(Error::UnsupportedInstruction(format!(
                "operand {:?} does not fit {}",
                instruction.operand, instruction.opcode
            )));
        }
        offsets.push(position);
        position += encoded_size(instruction)?;
    }
    offsets.push(position);

    let target_offset = |index: usize| -> Result<usize> {
        offsets
            .get(index)
            .copied()
            .ok_or_else(|| malformed_error!("Branch to missing instruction IL_{}", index))
    };

    let mut writer = Writer::new();
    for (index, instruction) in instructions.iter().enumerate() {
        let info = instruction.opcode.info();
        if info.prefixed {
            writer.write_le::<u8>(FE_PREFIX);
        }
        writer.write_le::<u8>(info.value);

        let next = offsets[index + 1];
        let operand_type = info.operand;
        match &instruction.operand {
            Operand::None => {}
            Operand::Int8(v) => writer.write_le::<i8>(*v),
            Operand::Int32(v) => writer.write_le::<i32>(*v),
            Operand::Int64(v) => writer.write_le::<i64>(*v),
            Operand::Float32(v) => writer.write_le::<f32>(*v),
            Operand::Float64(v) => writer.write_le::<f64>(*v),
            Operand::String(v) => writer.write_le::<u32>(tokens.string_token(v)?.value()),
            Operand::Type(v) => writer.write_le::<u32>(tokens.type_token(v)?.value()),
            Operand::Field(v) => writer.write_le::<u32>(tokens.field_token(v)?.value()),
            Operand::Method(v) => writer.write_le::<u32>(tokens.method_token(v)?.value()),
            Operand::Signature(v) => writer.write_le::<u32>(tokens.signature_token(v)?.value()),
            Operand::Token(member) => {
                let token = match member {
                    MemberReference::Type(ty) => tokens.type_token(ty)?,
                    MemberReference::Field(field) => tokens.field_token(field)?,
                    MemberReference::Method(method) => tokens.method_token(method)?,
                };
                writer.write_le::<u32>(token.value());
            }
            Operand::Local(v) | Operand::Argument(v) => {
                let short = matches!(operand_type, OperandType::ShortInlineVar | OperandType::ShortInlineArg);
                variable_index(instruction.opcode, short, *v)?;
                if short {
                    writer.write_le::<u8>(*v as u8);
                } else {
                    writer.write_le::<u16>(*v);
                }
            }
            Operand::Target(target) => {
                let delta = relative(next, target_offset(*target)?)?;
                if operand_type == OperandType::ShortInlineBrTarget {
                    let short = i8::try_from(delta).map_err(|_| {
                        malformed_error!(
                            "{} at IL_{} cannot reach IL_{} ({} bytes)",
                            instruction.opcode,
                            index,
                            target,
                            delta
                        )
                    })?;
                    writer.write_le::<i8>(short);
                } else {
                    writer.write_le::<i32>(delta);
                }
            }
            Operand::Switch(targets) => {
                writer.write_le::<u32>(
                    u32::try_from(targets.len()).map_err(|_| malformed_error!("Jump table too large"))?,
                );
                for target in targets {
                    writer.write_le::<i32>(relative(next, target_offset(*target)?)?);
                }
            }
        }
    }

    Ok(EncodedCode {
        code: writer.into_inner(),
        offsets,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        disassembler::{decode_code, TokenResolver},
        metadata::token::TABLE,
    };

    #[derive(Default)]
    struct Literals {
        strings: Vec<String>,
    }

    impl TokenProvider for Literals {
        fn type_token(&mut self, ty: &TypeReference) -> Result<Token> {
            Err(malformed_error!("no type {}", ty))
        }
        fn field_token(&mut self, field: &FieldReference) -> Result<Token> {
            Err(malformed_error!("no field {}", field))
        }
        fn method_token(&mut self, method: &MethodReference) -> Result<Token> {
            Err(malformed_error!("no method {}", method))
        }
        fn string_token(&mut self, value: &str) -> Result<Token> {
            self.strings.push(value.to_string());
            Ok(Token::from_parts(TABLE::USER_STRING, self.strings.len() as u32))
        }
        fn signature_token(&mut self, signature: &MethodSignature) -> Result<Token> {
            Err(malformed_error!("no signature {}", signature))
        }
    }

    impl TokenResolver for Literals {
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
            self.strings
                .get(token.row() as usize - 1)
                .cloned()
                .ok_or_else(|| malformed_error!("no string {}", token))
        }
        fn resolve_signature(&self, token: Token) -> Result<MethodSignature> {
            Err(malformed_error!("no signature {}", token))
        }
    }

    #[test]
    fn branches_and_switch_decode_to_the_same_topology() {
        let body = vec![
            Instruction::load_argument(0),
            Instruction::new(OpCode::Switch, Operand::Switch(vec![3, 5])),
            Instruction::new(OpCode::Ldstr, Operand::String("none".into())),
            Instruction::new(OpCode::BrS, Operand::Target(6)),
            Instruction::new(OpCode::Ldstr, Operand::String("one".into())),
            Instruction::new(OpCode::Br, Operand::Target(6)),
            Instruction::simple(OpCode::Ret),
        ];

        let mut tokens = Literals::default();
        let encoded = encode_instructions(&body, &mut tokens).unwrap();
        assert_eq!(encoded.offsets.len(), body.len() + 1);
        assert_eq!(encoded.offset_of(body.len()).unwrap() as usize, encoded.code.len());

        let decoded = decode_code(&encoded.code, &tokens).unwrap();
        assert_eq!(decoded.instructions, body);
    }

    #[test]
    fn rejects_what_cannot_be_encoded() {
        let mut tokens = Literals::default();

        let mismatched = [Instruction::new(OpCode::Ldstr, Operand::Int32(1))];
        assert!(matches!(
            encode_instructions(&mismatched, &mut tokens),
            Err(Error::UnsupportedInstruction(_))
        ));

        let mut far = vec![Instruction::new(OpCode::BrS, Operand::Target(200))];
        far.extend((0..199).map(|_| Instruction::load_int32(1000)));
        far.push(Instruction::simple(OpCode::Ret));
        assert!(encode_instructions(&far, &mut tokens).is_err());

        let short_local = [Instruction::new(OpCode::LdlocS, Operand::Local(300))];
        assert!(encode_instructions(&short_local, &mut tokens).is_err());

        let dangling = [Instruction::new(OpCode::Br, Operand::Target(9))];
        assert!(encode_instructions(&dangling, &mut tokens).is_err());
    }
}
