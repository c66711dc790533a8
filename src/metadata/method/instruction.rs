//! Static instructions: an opcode plus a symbolic operand.

use std::fmt;

use crate::{
    disassembler::{OpCode, OperandType},
    metadata::{
        members::{FieldReference, MemberReference, MethodReference},
        signatures::MethodSignature,
        typesystem::TypeReference,
    },
};

/// Operand of a static instruction.
///
/// Branch targets are instruction indices within the owning body, not byte offsets.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// No operand
    None,
    /// 8-bit immediate (`ldc.i4.s`, `unaligned.`, `no.`)
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
    /// Parameter ordinal, counting `this` as 0 for instance methods
    Argument(u16),
    /// Type reference
    Type(TypeReference),
    /// Field reference
    Field(FieldReference),
    /// Method reference
    Method(MethodReference),
    /// `ldtoken` operand
    Token(MemberReference),
    /// Single branch target
    Target(usize),
    /// Multi-way branch targets
    Switch(Vec<usize>),
    /// Call-site signature of `calli`
    Signature(MethodSignature),
}

impl Operand {
    /// `true` if this operand can follow an opcode with operand shape `operand_type`.
    #[must_use]
    pub fn fits(&self, operand_type: OperandType) -> bool {
        matches!(
            (operand_type, self),
            (OperandType::InlineNone, Operand::None)
                | (OperandType::ShortInlineI, Operand::Int8(_))
                | (OperandType::InlineI, Operand::Int32(_))
                | (OperandType::InlineI8, Operand::Int64(_))
                | (OperandType::ShortInlineR, Operand::Float32(_))
                | (OperandType::InlineR, Operand::Float64(_))
                | (OperandType::InlineString, Operand::String(_))
                | (OperandType::InlineType, Operand::Type(_))
                | (OperandType::InlineField, Operand::Field(_))
                | (OperandType::InlineMethod, Operand::Method(_))
                | (OperandType::InlineTok, Operand::Token(_))
                | (OperandType::ShortInlineBrTarget | OperandType::InlineBrTarget, Operand::Target(_))
                | (OperandType::InlineSwitch, Operand::Switch(_))
                | (OperandType::ShortInlineVar | OperandType::InlineVar, Operand::Local(_))
                | (OperandType::ShortInlineArg | OperandType::InlineArg, Operand::Argument(_))
                | (OperandType::InlineSig, Operand::Signature(_))
        )
    }
}

/// One static instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// The opcode
    pub opcode: OpCode,
    /// Its operand
    pub operand: Operand,
}

impl Instruction {
    /// Create an instruction.
    #[must_use]
    pub fn new(opcode: OpCode, operand: Operand) -> Self {
        Instruction { opcode, operand }
    }

    /// An instruction without operand.
    #[must_use]
    pub fn simple(opcode: OpCode) -> Self {
        Instruction::new(opcode, Operand::None)
    }

    /// Shortest form loading argument `index`.
    #[must_use]
    pub fn load_argument(index: u16) -> Self {
        let opcode = OpCode::ldarg(index);
        if opcode.implicit_argument().is_some() {
            Instruction::simple(opcode)
        } else {
            Instruction::new(opcode, Operand::Argument(index))
        }
    }

    /// Shortest form loading local `index`.
    #[must_use]
    pub fn load_local(index: u16) -> Self {
        let opcode = OpCode::ldloc(index);
        if opcode.implicit_local().is_some() {
            Instruction::simple(opcode)
        } else {
            Instruction::new(opcode, Operand::Local(index))
        }
    }

    /// Shortest form storing local `index`.
    #[must_use]
    pub fn store_local(index: u16) -> Self {
        let opcode = OpCode::stloc(index);
        if opcode.implicit_local().is_some() {
            Instruction::simple(opcode)
        } else {
            Instruction::new(opcode, Operand::Local(index))
        }
    }

    /// Shortest form loading a 32-bit constant.
    #[must_use]
    pub fn load_int32(value: i32) -> Self {
        match value {
            -1 => Instruction::simple(OpCode::LdcI4M1),
            0 => Instruction::simple(OpCode::LdcI40),
            1 => Instruction::simple(OpCode::LdcI41),
            2 => Instruction::simple(OpCode::LdcI42),
            3 => Instruction::simple(OpCode::LdcI43),
            4 => Instruction::simple(OpCode::LdcI44),
            5 => Instruction::simple(OpCode::LdcI45),
            6 => Instruction::simple(OpCode::LdcI46),
            7 => Instruction::simple(OpCode::LdcI47),
            8 => Instruction::simple(OpCode::LdcI48),
            -128..=127 => Instruction::new(OpCode::LdcI4S, Operand::Int8(value as i8)),
            _ => Instruction::new(OpCode::LdcI4, Operand::Int32(value)),
        }
    }

    /// `true` if the operand shape agrees with the opcode.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.operand.fits(self.opcode.operand_type())
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode)?;
        match &self.operand {
            Operand::None => Ok(()),
            Operand::Int8(v) => write!(f, " {v}"),
            Operand::Int32(v) => write!(f, " {v}"),
            Operand::Int64(v) => write!(f, " {v}"),
            Operand::Float32(v) => write!(f, " {v}"),
            Operand::Float64(v) => write!(f, " {v}"),
            Operand::String(v) => write!(f, " {v:?}"),
            Operand::Local(v) => write!(f, " V_{v}"),
            Operand::Argument(v) => write!(f, " A_{v}"),
            Operand::Type(v) => write!(f, " {v}"),
            Operand::Field(v) => write!(f, " {v}"),
            Operand::Method(v) => write!(f, " {v}"),
            Operand::Token(v) => write!(f, " {v}"),
            Operand::Target(v) => write!(f, " IL_{v}"),
            Operand::Switch(targets) => {
                write!(f, " (")?;
                for (i, target) in targets.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "IL_{target}")?;
                }
                write!(f, ")")
            }
            Operand::Signature(v) => write!(f, " {v}"),
        }
    }
}
