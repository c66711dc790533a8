//! The CIL instruction set as data.
//!
//! Every opcode of ECMA-335 Partition III appears once in [`OPCODES`], together with its
//! encoding, operand shape and control-flow class. Code elsewhere dispatches on
//! [`OperandType`] rather than on individual opcodes, so this table is the only place that
//! enumerates them.

use std::sync::OnceLock;

use strum::{EnumCount, EnumIter};

/// The first byte of two-byte opcodes.
pub const FE_PREFIX: u8 = 0xFE;

/// Shape of the inline operand that follows an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandType {
    /// No operand
    InlineNone,
    /// 8-bit integer
    ShortInlineI,
    /// 32-bit integer
    InlineI,
    /// 64-bit integer
    InlineI8,
    /// 32-bit float
    ShortInlineR,
    /// 64-bit float
    InlineR,
    /// User-string token
    InlineString,
    /// Type token
    InlineType,
    /// Field token
    InlineField,
    /// Method token
    InlineMethod,
    /// Type, field or method token
    InlineTok,
    /// 8-bit relative branch target
    ShortInlineBrTarget,
    /// 32-bit relative branch target
    InlineBrTarget,
    /// Jump table
    InlineSwitch,
    /// 8-bit local index
    ShortInlineVar,
    /// 16-bit local index
    InlineVar,
    /// 8-bit argument index
    ShortInlineArg,
    /// 16-bit argument index
    InlineArg,
    /// Stand-alone call-site signature token
    InlineSig,
}

impl OperandType {
    /// Encoded operand size in bytes; `None` for the variable-length switch table.
    #[must_use]
    pub const fn size(self) -> Option<usize> {
        match self {
            OperandType::InlineNone => Some(0),
            OperandType::ShortInlineI
            | OperandType::ShortInlineBrTarget
            | OperandType::ShortInlineVar
            | OperandType::ShortInlineArg => Some(1),
            OperandType::InlineVar | OperandType::InlineArg => Some(2),
            OperandType::InlineI
            | OperandType::ShortInlineR
            | OperandType::InlineString
            | OperandType::InlineType
            | OperandType::InlineField
            | OperandType::InlineMethod
            | OperandType::InlineTok
            | OperandType::InlineBrTarget
            | OperandType::InlineSig => Some(4),
            OperandType::InlineI8 | OperandType::InlineR => Some(8),
            OperandType::InlineSwitch => None,
        }
    }

    /// `true` for single and multi-way branch operands.
    #[must_use]
    pub const fn is_branch(self) -> bool {
        matches!(
            self,
            OperandType::ShortInlineBrTarget | OperandType::InlineBrTarget | OperandType::InlineSwitch
        )
    }
}

/// Control-flow class of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowType {
    /// Falls through to the next instruction
    Sequential,
    /// May branch or fall through
    ConditionalBranch,
    /// Always branches
    UnconditionalBranch,
    /// Calls a method and continues
    Call,
    /// Returns from the method
    Return,
    /// Multi-way branch
    Switch,
    /// Raises an exception
    Throw,
    /// Ends a finally, fault or filter block
    EndFinally,
    /// Leaves a protected region
    Leave,
    /// Modifies the following instruction
    Prefix,
}

/// Every CIL opcode, in encoding order.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter, EnumCount)]
pub enum OpCode {
    Nop,
    Break,
    Ldarg0,
    Ldarg1,
    Ldarg2,
    Ldarg3,
    Ldloc0,
    Ldloc1,
    Ldloc2,
    Ldloc3,
    Stloc0,
    Stloc1,
    Stloc2,
    Stloc3,
    LdargS,
    LdargaS,
    StargS,
    LdlocS,
    LdlocaS,
    StlocS,
    Ldnull,
    LdcI4M1,
    LdcI40,
    LdcI41,
    LdcI42,
    LdcI43,
    LdcI44,
    LdcI45,
    LdcI46,
    LdcI47,
    LdcI48,
    LdcI4S,
    LdcI4,
    LdcI8,
    LdcR4,
    LdcR8,
    Dup,
    Pop,
    Jmp,
    Call,
    Calli,
    Ret,
    BrS,
    BrfalseS,
    BrtrueS,
    BeqS,
    BgeS,
    BgtS,
    BleS,
    BltS,
    BneUnS,
    BgeUnS,
    BgtUnS,
    BleUnS,
    BltUnS,
    Br,
    Brfalse,
    Brtrue,
    Beq,
    Bge,
    Bgt,
    Ble,
    Blt,
    BneUn,
    BgeUn,
    BgtUn,
    BleUn,
    BltUn,
    Switch,
    LdindI1,
    LdindU1,
    LdindI2,
    LdindU2,
    LdindI4,
    LdindU4,
    LdindI8,
    LdindI,
    LdindR4,
    LdindR8,
    LdindRef,
    StindRef,
    StindI1,
    StindI2,
    StindI4,
    StindI8,
    StindR4,
    StindR8,
    Add,
    Sub,
    Mul,
    Div,
    DivUn,
    Rem,
    RemUn,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    ShrUn,
    Neg,
    Not,
    ConvI1,
    ConvI2,
    ConvI4,
    ConvI8,
    ConvR4,
    ConvR8,
    ConvU4,
    ConvU8,
    Callvirt,
    Cpobj,
    Ldobj,
    Ldstr,
    Newobj,
    Castclass,
    Isinst,
    ConvRUn,
    Unbox,
    Throw,
    Ldfld,
    Ldflda,
    Stfld,
    Ldsfld,
    Ldsflda,
    Stsfld,
    Stobj,
    ConvOvfI1Un,
    ConvOvfI2Un,
    ConvOvfI4Un,
    ConvOvfI8Un,
    ConvOvfU1Un,
    ConvOvfU2Un,
    ConvOvfU4Un,
    ConvOvfU8Un,
    ConvOvfIUn,
    ConvOvfUUn,
    Box,
    Newarr,
    Ldlen,
    Ldelema,
    LdelemI1,
    LdelemU1,
    LdelemI2,
    LdelemU2,
    LdelemI4,
    LdelemU4,
    LdelemI8,
    LdelemI,
    LdelemR4,
    LdelemR8,
    LdelemRef,
    StelemI,
    StelemI1,
    StelemI2,
    StelemI4,
    StelemI8,
    StelemR4,
    StelemR8,
    StelemRef,
    LdelemAny,
    StelemAny,
    UnboxAny,
    ConvOvfI1,
    ConvOvfU1,
    ConvOvfI2,
    ConvOvfU2,
    ConvOvfI4,
    ConvOvfU4,
    ConvOvfI8,
    ConvOvfU8,
    Refanyval,
    Ckfinite,
    Mkrefany,
    Ldtoken,
    ConvU2,
    ConvU1,
    ConvI,
    ConvOvfI,
    ConvOvfU,
    AddOvf,
    AddOvfUn,
    MulOvf,
    MulOvfUn,
    SubOvf,
    SubOvfUn,
    Endfinally,
    Leave,
    LeaveS,
    StindI,
    ConvU,
    Arglist,
    Ceq,
    Cgt,
    CgtUn,
    Clt,
    CltUn,
    Ldftn,
    Ldvirtftn,
    Ldarg,
    Ldarga,
    Starg,
    Ldloc,
    Ldloca,
    Stloc,
    Localloc,
    Endfilter,
    Unaligned,
    Volatile,
    Tail,
    Initobj,
    Constrained,
    Cpblk,
    Initblk,
    No,
    Rethrow,
    Sizeof,
    Refanytype,
    Readonly,}

/// Encoding and classification of one opcode.
#[derive(Debug, Clone, Copy)]
pub struct OpCodeInfo {
    /// The opcode
    pub opcode: OpCode,
    /// Assembler mnemonic
    pub mnemonic: &'static str,
    /// Encoded with the `0xFE` prefix
    pub prefixed: bool,
    /// The (second, if prefixed) opcode byte
    pub value: u8,
    /// Inline operand shape
    pub operand: OperandType,
    /// Control-flow class
    pub flow: FlowType,
}

impl OpCodeInfo {
    const fn new(
        opcode: OpCode,
        mnemonic: &'static str,
        prefixed: bool,
        value: u8,
        operand: OperandType,
        flow: FlowType,
    ) -> Self {
        OpCodeInfo {
            opcode,
            mnemonic,
            prefixed,
            value,
            operand,
            flow,
        }
    }
}

/// The instruction set, indexed by `OpCode as usize`.
pub const OPCODES: &[OpCodeInfo] = &[
    OpCodeInfo::new(OpCode::Nop, "nop", false, 0x00, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Break, "break", false, 0x01, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Ldarg0, "ldarg.0", false, 0x02, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Ldarg1, "ldarg.1", false, 0x03, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Ldarg2, "ldarg.2", false, 0x04, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Ldarg3, "ldarg.3", false, 0x05, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Ldloc0, "ldloc.0", false, 0x06, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Ldloc1, "ldloc.1", false, 0x07, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Ldloc2, "ldloc.2", false, 0x08, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Ldloc3, "ldloc.3", false, 0x09, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Stloc0, "stloc.0", false, 0x0A, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Stloc1, "stloc.1", false, 0x0B, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Stloc2, "stloc.2", false, 0x0C, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Stloc3, "stloc.3", false, 0x0D, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::LdargS, "ldarg.s", false, 0x0E, OperandType::ShortInlineArg, FlowType::Sequential),
    OpCodeInfo::new(OpCode::LdargaS, "ldarga.s", false, 0x0F, OperandType::ShortInlineArg, FlowType::Sequential),
    OpCodeInfo::new(OpCode::StargS, "starg.s", false, 0x10, OperandType::ShortInlineArg, FlowType::Sequential),
    OpCodeInfo::new(OpCode::LdlocS, "ldloc.s", false, 0x11, OperandType::ShortInlineVar, FlowType::Sequential),
    OpCodeInfo::new(OpCode::LdlocaS, "ldloca.s", false, 0x12, OperandType::ShortInlineVar, FlowType::Sequential),
    OpCodeInfo::new(OpCode::StlocS, "stloc.s", false, 0x13, OperandType::ShortInlineVar, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Ldnull, "ldnull", false, 0x14, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::LdcI4M1, "ldc.i4.m1", false, 0x15, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::LdcI40, "ldc.i4.0", false, 0x16, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::LdcI41, "ldc.i4.1", false, 0x17, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::LdcI42, "ldc.i4.2", false, 0x18, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::LdcI43, "ldc.i4.3", false, 0x19, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::LdcI44, "ldc.i4.4", false, 0x1A, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::LdcI45, "ldc.i4.5", false, 0x1B, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::LdcI46, "ldc.i4.6", false, 0x1C, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::LdcI47, "ldc.i4.7", false, 0x1D, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::LdcI48, "ldc.i4.8", false, 0x1E, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::LdcI4S, "ldc.i4.s", false, 0x1F, OperandType::ShortInlineI, FlowType::Sequential),
    OpCodeInfo::new(OpCode::LdcI4, "ldc.i4", false, 0x20, OperandType::InlineI, FlowType::Sequential),
    OpCodeInfo::new(OpCode::LdcI8, "ldc.i8", false, 0x21, OperandType::InlineI8, FlowType::Sequential),
    OpCodeInfo::new(OpCode::LdcR4, "ldc.r4", false, 0x22, OperandType::ShortInlineR, FlowType::Sequential),
    OpCodeInfo::new(OpCode::LdcR8, "ldc.r8", false, 0x23, OperandType::InlineR, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Dup, "dup", false, 0x25, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Pop, "pop", false, 0x26, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Jmp, "jmp", false, 0x27, OperandType::InlineMethod, FlowType::Call),
    OpCodeInfo::new(OpCode::Call, "call", false, 0x28, OperandType::InlineMethod, FlowType::Call),
    OpCodeInfo::new(OpCode::Calli, "calli", false, 0x29, OperandType::InlineSig, FlowType::Call),
    OpCodeInfo::new(OpCode::Ret, "ret", false, 0x2A, OperandType::InlineNone, FlowType::Return),
    OpCodeInfo::new(OpCode::BrS, "br.s", false, 0x2B, OperandType::ShortInlineBrTarget, FlowType::UnconditionalBranch),
    OpCodeInfo::new(OpCode::BrfalseS, "brfalse.s", false, 0x2C, OperandType::ShortInlineBrTarget, FlowType::ConditionalBranch),
    OpCodeInfo::new(OpCode::BrtrueS, "brtrue.s", false, 0x2D, OperandType::ShortInlineBrTarget, FlowType::ConditionalBranch),
    OpCodeInfo::new(OpCode::BeqS, "beq.s", false, 0x2E, OperandType::ShortInlineBrTarget, FlowType::ConditionalBranch),
    OpCodeInfo::new(OpCode::BgeS, "bge.s", false, 0x2F, OperandType::ShortInlineBrTarget, FlowType::ConditionalBranch),
    OpCodeInfo::new(OpCode::BgtS, "bgt.s", false, 0x30, OperandType::ShortInlineBrTarget, FlowType::ConditionalBranch),
    OpCodeInfo::new(OpCode::BleS, "ble.s", false, 0x31, OperandType::ShortInlineBrTarget, FlowType::ConditionalBranch),
    OpCodeInfo::new(OpCode::BltS, "blt.s", false, 0x32, OperandType::ShortInlineBrTarget, FlowType::ConditionalBranch),
    OpCodeInfo::new(OpCode::BneUnS, "bne.un.s", false, 0x33, OperandType::ShortInlineBrTarget, FlowType::ConditionalBranch),
    OpCodeInfo::new(OpCode::BgeUnS, "bge.un.s", false, 0x34, OperandType::ShortInlineBrTarget, FlowType::ConditionalBranch),
    OpCodeInfo::new(OpCode::BgtUnS, "bgt.un.s", false, 0x35, OperandType::ShortInlineBrTarget, FlowType::ConditionalBranch),
    OpCodeInfo::new(OpCode::BleUnS, "ble.un.s", false, 0x36, OperandType::ShortInlineBrTarget, FlowType::ConditionalBranch),
    OpCodeInfo::new(OpCode::BltUnS, "blt.un.s", false, 0x37, OperandType::ShortInlineBrTarget, FlowType::ConditionalBranch),
    OpCodeInfo::new(OpCode::Br, "br", false, 0x38, OperandType::InlineBrTarget, FlowType::UnconditionalBranch),
    OpCodeInfo::new(OpCode::Brfalse, "brfalse", false, 0x39, OperandType::InlineBrTarget, FlowType::ConditionalBranch),
    OpCodeInfo::new(OpCode::Brtrue, "brtrue", false, 0x3A, OperandType::InlineBrTarget, FlowType::ConditionalBranch),
    OpCodeInfo::new(OpCode::Beq, "beq", false, 0x3B, OperandType::InlineBrTarget, FlowType::ConditionalBranch),
    OpCodeInfo::new(OpCode::Bge, "bge", false, 0x3C, OperandType::InlineBrTarget, FlowType::ConditionalBranch),
    OpCodeInfo::new(OpCode::Bgt, "bgt", false, 0x3D, OperandType::InlineBrTarget, FlowType::ConditionalBranch),
    OpCodeInfo::new(OpCode::Ble, "ble", false, 0x3E, OperandType::InlineBrTarget, FlowType::ConditionalBranch),
    OpCodeInfo::new(OpCode::Blt, "blt", false, 0x3F, OperandType::InlineBrTarget, FlowType::ConditionalBranch),
    OpCodeInfo::new(OpCode::BneUn, "bne.un", false, 0x40, OperandType::InlineBrTarget, FlowType::ConditionalBranch),
    OpCodeInfo::new(OpCode::BgeUn, "bge.un", false, 0x41, OperandType::InlineBrTarget, FlowType::ConditionalBranch),
    OpCodeInfo::new(OpCode::BgtUn, "bgt.un", false, 0x42, OperandType::InlineBrTarget, FlowType::ConditionalBranch),
    OpCodeInfo::new(OpCode::BleUn, "ble.un", false, 0x43, OperandType::InlineBrTarget, FlowType::ConditionalBranch),
    OpCodeInfo::new(OpCode::BltUn, "blt.un", false, 0x44, OperandType::InlineBrTarget, FlowType::ConditionalBranch),
    OpCodeInfo::new(OpCode::Switch, "switch", false, 0x45, OperandType::InlineSwitch, FlowType::Switch),
    OpCodeInfo::new(OpCode::LdindI1, "ldind.i1", false, 0x46, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::LdindU1, "ldind.u1", false, 0x47, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::LdindI2, "ldind.i2", false, 0x48, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::LdindU2, "ldind.u2", false, 0x49, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::LdindI4, "ldind.i4", false, 0x4A, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::LdindU4, "ldind.u4", false, 0x4B, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::LdindI8, "ldind.i8", false, 0x4C, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::LdindI, "ldind.i", false, 0x4D, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::LdindR4, "ldind.r4", false, 0x4E, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::LdindR8, "ldind.r8", false, 0x4F, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::LdindRef, "ldind.ref", false, 0x50, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::StindRef, "stind.ref", false, 0x51, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::StindI1, "stind.i1", false, 0x52, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::StindI2, "stind.i2", false, 0x53, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::StindI4, "stind.i4", false, 0x54, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::StindI8, "stind.i8", false, 0x55, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::StindR4, "stind.r4", false, 0x56, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::StindR8, "stind.r8", false, 0x57, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Add, "add", false, 0x58, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Sub, "sub", false, 0x59, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Mul, "mul", false, 0x5A, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Div, "div", false, 0x5B, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::DivUn, "div.un", false, 0x5C, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Rem, "rem", false, 0x5D, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::RemUn, "rem.un", false, 0x5E, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::And, "and", false, 0x5F, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Or, "or", false, 0x60, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Xor, "xor", false, 0x61, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Shl, "shl", false, 0x62, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Shr, "shr", false, 0x63, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::ShrUn, "shr.un", false, 0x64, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Neg, "neg", false, 0x65, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Not, "not", false, 0x66, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::ConvI1, "conv.i1", false, 0x67, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::ConvI2, "conv.i2", false, 0x68, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::ConvI4, "conv.i4", false, 0x69, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::ConvI8, "conv.i8", false, 0x6A, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::ConvR4, "conv.r4", false, 0x6B, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::ConvR8, "conv.r8", false, 0x6C, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::ConvU4, "conv.u4", false, 0x6D, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::ConvU8, "conv.u8", false, 0x6E, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Callvirt, "callvirt", false, 0x6F, OperandType::InlineMethod, FlowType::Call),
    OpCodeInfo::new(OpCode::Cpobj, "cpobj", false, 0x70, OperandType::InlineType, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Ldobj, "ldobj", false, 0x71, OperandType::InlineType, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Ldstr, "ldstr", false, 0x72, OperandType::InlineString, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Newobj, "newobj", false, 0x73, OperandType::InlineMethod, FlowType::Call),
    OpCodeInfo::new(OpCode::Castclass, "castclass", false, 0x74, OperandType::InlineType, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Isinst, "isinst", false, 0x75, OperandType::InlineType, FlowType::Sequential),
    OpCodeInfo::new(OpCode::ConvRUn, "conv.r.un", false, 0x76, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Unbox, "unbox", false, 0x79, OperandType::InlineType, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Throw, "throw", false, 0x7A, OperandType::InlineNone, FlowType::Throw),
    OpCodeInfo::new(OpCode::Ldfld, "ldfld", false, 0x7B, OperandType::InlineField, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Ldflda, "ldflda", false, 0x7C, OperandType::InlineField, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Stfld, "stfld", false, 0x7D, OperandType::InlineField, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Ldsfld, "ldsfld", false, 0x7E, OperandType::InlineField, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Ldsflda, "ldsflda", false, 0x7F, OperandType::InlineField, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Stsfld, "stsfld", false, 0x80, OperandType::InlineField, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Stobj, "stobj", false, 0x81, OperandType::InlineType, FlowType::Sequential),
    OpCodeInfo::new(OpCode::ConvOvfI1Un, "conv.ovf.i1.un", false, 0x82, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::ConvOvfI2Un, "conv.ovf.i2.un", false, 0x83, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::ConvOvfI4Un, "conv.ovf.i4.un", false, 0x84, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::ConvOvfI8Un, "conv.ovf.i8.un", false, 0x85, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::ConvOvfU1Un, "conv.ovf.u1.un", false, 0x86, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::ConvOvfU2Un, "conv.ovf.u2.un", false, 0x87, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::ConvOvfU4Un, "conv.ovf.u4.un", false, 0x88, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::ConvOvfU8Un, "conv.ovf.u8.un", false, 0x89, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::ConvOvfIUn, "conv.ovf.i.un", false, 0x8A, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::ConvOvfUUn, "conv.ovf.u.un", false, 0x8B, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Box, "box", false, 0x8C, OperandType::InlineType, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Newarr, "newarr", false, 0x8D, OperandType::InlineType, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Ldlen, "ldlen", false, 0x8E, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Ldelema, "ldelema", false, 0x8F, OperandType::InlineType, FlowType::Sequential),
    OpCodeInfo::new(OpCode::LdelemI1, "ldelem.i1", false, 0x90, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::LdelemU1, "ldelem.u1", false, 0x91, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::LdelemI2, "ldelem.i2", false, 0x92, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::LdelemU2, "ldelem.u2", false, 0x93, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::LdelemI4, "ldelem.i4", false, 0x94, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::LdelemU4, "ldelem.u4", false, 0x95, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::LdelemI8, "ldelem.i8", false, 0x96, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::LdelemI, "ldelem.i", false, 0x97, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::LdelemR4, "ldelem.r4", false, 0x98, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::LdelemR8, "ldelem.r8", false, 0x99, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::LdelemRef, "ldelem.ref", false, 0x9A, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::StelemI, "stelem.i", false, 0x9B, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::StelemI1, "stelem.i1", false, 0x9C, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::StelemI2, "stelem.i2", false, 0x9D, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::StelemI4, "stelem.i4", false, 0x9E, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::StelemI8, "stelem.i8", false, 0x9F, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::StelemR4, "stelem.r4", false, 0xA0, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::StelemR8, "stelem.r8", false, 0xA1, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::StelemRef, "stelem.ref", false, 0xA2, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::LdelemAny, "ldelem", false, 0xA3, OperandType::InlineType, FlowType::Sequential),
    OpCodeInfo::new(OpCode::StelemAny, "stelem", false, 0xA4, OperandType::InlineType, FlowType::Sequential),
    OpCodeInfo::new(OpCode::UnboxAny, "unbox.any", false, 0xA5, OperandType::InlineType, FlowType::Sequential),
    OpCodeInfo::new(OpCode::ConvOvfI1, "conv.ovf.i1", false, 0xB3, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::ConvOvfU1, "conv.ovf.u1", false, 0xB4, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::ConvOvfI2, "conv.ovf.i2", false, 0xB5, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::ConvOvfU2, "conv.ovf.u2", false, 0xB6, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::ConvOvfI4, "conv.ovf.i4", false, 0xB7, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::ConvOvfU4, "conv.ovf.u4", false, 0xB8, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::ConvOvfI8, "conv.ovf.i8", false, 0xB9, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::ConvOvfU8, "conv.ovf.u8", false, 0xBA, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Refanyval, "refanyval", false, 0xC2, OperandType::InlineType, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Ckfinite, "ckfinite", false, 0xC3, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Mkrefany, "mkrefany", false, 0xC6, OperandType::InlineType, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Ldtoken, "ldtoken", false, 0xD0, OperandType::InlineTok, FlowType::Sequential),
    OpCodeInfo::new(OpCode::ConvU2, "conv.u2", false, 0xD1, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::ConvU1, "conv.u1", false, 0xD2, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::ConvI, "conv.i", false, 0xD3, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::ConvOvfI, "conv.ovf.i", false, 0xD4, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::ConvOvfU, "conv.ovf.u", false, 0xD5, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::AddOvf, "add.ovf", false, 0xD6, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::AddOvfUn, "add.ovf.un", false, 0xD7, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::MulOvf, "mul.ovf", false, 0xD8, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::MulOvfUn, "mul.ovf.un", false, 0xD9, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::SubOvf, "sub.ovf", false, 0xDA, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::SubOvfUn, "sub.ovf.un", false, 0xDB, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Endfinally, "endfinally", false, 0xDC, OperandType::InlineNone, FlowType::EndFinally),
    OpCodeInfo::new(OpCode::Leave, "leave", false, 0xDD, OperandType::InlineBrTarget, FlowType::Leave),
    OpCodeInfo::new(OpCode::LeaveS, "leave.s", false, 0xDE, OperandType::ShortInlineBrTarget, FlowType::Leave),
    OpCodeInfo::new(OpCode::StindI, "stind.i", false, 0xDF, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::ConvU, "conv.u", false, 0xE0, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Arglist, "arglist", true, 0x00, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Ceq, "ceq", true, 0x01, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Cgt, "cgt", true, 0x02, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::CgtUn, "cgt.un", true, 0x03, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Clt, "clt", true, 0x04, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::CltUn, "clt.un", true, 0x05, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Ldftn, "ldftn", true, 0x06, OperandType::InlineMethod, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Ldvirtftn, "ldvirtftn", true, 0x07, OperandType::InlineMethod, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Ldarg, "ldarg", true, 0x09, OperandType::InlineArg, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Ldarga, "ldarga", true, 0x0A, OperandType::InlineArg, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Starg, "starg", true, 0x0B, OperandType::InlineArg, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Ldloc, "ldloc", true, 0x0C, OperandType::InlineVar, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Ldloca, "ldloca", true, 0x0D, OperandType::InlineVar, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Stloc, "stloc", true, 0x0E, OperandType::InlineVar, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Localloc, "localloc", true, 0x0F, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Endfilter, "endfilter", true, 0x11, OperandType::InlineNone, FlowType::EndFinally),
    OpCodeInfo::new(OpCode::Unaligned, "unaligned.", true, 0x12, OperandType::ShortInlineI, FlowType::Prefix),
    OpCodeInfo::new(OpCode::Volatile, "volatile.", true, 0x13, OperandType::InlineNone, FlowType::Prefix),
    OpCodeInfo::new(OpCode::Tail, "tail.", true, 0x14, OperandType::InlineNone, FlowType::Prefix),
    OpCodeInfo::new(OpCode::Initobj, "initobj", true, 0x15, OperandType::InlineType, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Constrained, "constrained.", true, 0x16, OperandType::InlineType, FlowType::Prefix),
    OpCodeInfo::new(OpCode::Cpblk, "cpblk", true, 0x17, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Initblk, "initblk", true, 0x18, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::No, "no.", true, 0x19, OperandType::ShortInlineI, FlowType::Prefix),
    OpCodeInfo::new(OpCode::Rethrow, "rethrow", true, 0x1A, OperandType::InlineNone, FlowType::Throw),
    OpCodeInfo::new(OpCode::Sizeof, "sizeof", true, 0x1C, OperandType::InlineType, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Refanytype, "refanytype", true, 0x1D, OperandType::InlineNone, FlowType::Sequential),
    OpCodeInfo::new(OpCode::Readonly, "readonly.", true, 0x1E, OperandType::InlineNone, FlowType::Prefix),];

type ByteTable = [Option<OpCode>; 256];

fn byte_tables() -> &'static (ByteTable, ByteTable) {
    static TABLES: OnceLock<(ByteTable, ByteTable)> = OnceLock::new();
    TABLES.get_or_init(|| {
        let mut single = [None; 256];
        let mut prefixed = [None; 256];
        for info in OPCODES {
            if info.prefixed {
                prefixed[info.value as usize] = Some(info.opcode);
            } else {
                single[info.value as usize] = Some(info.opcode);
            }
        }
        (single, prefixed)
    })
}

impl OpCode {
    /// The table entry for this opcode.
    #[must_use]
    pub fn info(self) -> &'static OpCodeInfo {
        &OPCODES[self as usize]
    }

    /// Assembler mnemonic.
    #[must_use]
    pub fn mnemonic(self) -> &'static str {
        self.info().mnemonic
    }

    /// Inline operand shape.
    #[must_use]
    pub fn operand_type(self) -> OperandType {
        self.info().operand
    }

    /// Control-flow class.
    #[must_use]
    pub fn flow(self) -> FlowType {
        self.info().flow
    }

    /// Encoded size of the opcode bytes alone.
    #[must_use]
    pub fn opcode_size(self) -> usize {
        if self.info().prefixed {
            2
        } else {
            1
        }
    }

    /// Look up a single-byte opcode.
    #[must_use]
    pub fn from_byte(value: u8) -> Option<OpCode> {
        byte_tables().0[value as usize]
    }

    /// Look up the second byte of a `0xFE`-prefixed opcode.
    #[must_use]
    pub fn from_prefixed_byte(value: u8) -> Option<OpCode> {
        byte_tables().1[value as usize]
    }

    /// The shortest `ldarg` form for `index`.
    #[must_use]
    pub fn ldarg(index: u16) -> OpCode {
        match index {
            0 => OpCode::Ldarg0,
            1 => OpCode::Ldarg1,
            2 => OpCode::Ldarg2,
            3 => OpCode::Ldarg3,
            4..=255 => OpCode::LdargS,
            _ => OpCode::Ldarg,
        }
    }

    /// The shortest `ldloc` form for `index`.
    #[must_use]
    pub fn ldloc(index: u16) -> OpCode {
        match index {
            0 => OpCode::Ldloc0,
            1 => OpCode::Ldloc1,
            2 => OpCode::Ldloc2,
            3 => OpCode::Ldloc3,
            4..=255 => OpCode::LdlocS,
            _ => OpCode::Ldloc,
        }
    }

    /// The shortest `stloc` form for `index`.
    #[must_use]
    pub fn stloc(index: u16) -> OpCode {
        match index {
            0 => OpCode::Stloc0,
            1 => OpCode::Stloc1,
            2 => OpCode::Stloc2,
            3 => OpCode::Stloc3,
            4..=255 => OpCode::StlocS,
            _ => OpCode::Stloc,
        }
    }

    /// Argument index implied by the macro forms `ldarg.0` .. `ldarg.3`.
    #[must_use]
    pub fn implicit_argument(self) -> Option<u16> {
        match self {
            OpCode::Ldarg0 => Some(0),
            OpCode::Ldarg1 => Some(1),
            OpCode::Ldarg2 => Some(2),
            OpCode::Ldarg3 => Some(3),
            _ => None,
        }
    }

    /// Local index implied by the macro forms `ldloc.n` / `stloc.n`.
    #[must_use]
    pub fn implicit_local(self) -> Option<u16> {
        match self {
            OpCode::Ldloc0 | OpCode::Stloc0 => Some(0),
            OpCode::Ldloc1 | OpCode::Stloc1 => Some(1),
            OpCode::Ldloc2 | OpCode::Stloc2 => Some(2),
            OpCode::Ldloc3 | OpCode::Stloc3 => Some(3),
            _ => None,
        }
    }
}

impl std::fmt::Display for OpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mnemonic())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn table_is_indexed_by_discriminant() {
        assert_eq!(OPCODES.len(), OpCode::COUNT);
        for opcode in OpCode::iter() {
            assert_eq!(opcode.info().opcode, opcode);
        }
    }

    #[test]
    fn byte_lookup_agrees_with_table() {
        for info in OPCODES {
            let found = if info.prefixed {
                OpCode::from_prefixed_byte(info.value)
            } else {
                OpCode::from_byte(info.value)
            };
            assert_eq!(found, Some(info.opcode), "{}", info.mnemonic);
        }
        assert_eq!(OpCode::from_byte(0x24), None);
        assert_eq!(OpCode::from_prefixed_byte(0x08), None);
    }

    #[test]
    fn known_encodings() {
        assert_eq!(OpCode::Switch.info().value, 0x45);
        assert_eq!(OpCode::Ceq.info().value, 0x01);
        assert!(OpCode::Ceq.info().prefixed);
        assert_eq!(OpCode::UnboxAny.mnemonic(), "unbox.any");
        assert_eq!(OpCode::LdelemAny.mnemonic(), "ldelem");
        assert_eq!(OpCode::Tail.flow(), FlowType::Prefix);
        assert_eq!(OpCode::LeaveS.operand_type(), OperandType::ShortInlineBrTarget);
    }

    #[test]
    fn shortest_forms() {
        assert_eq!(OpCode::ldarg(2), OpCode::Ldarg2);
        assert_eq!(OpCode::ldarg(9), OpCode::LdargS);
        assert_eq!(OpCode::ldarg(300), OpCode::Ldarg);
        assert_eq!(OpCode::stloc(0), OpCode::Stloc0);
        assert_eq!(OpCode::Ldloc3.implicit_local(), Some(3));
    }
}
