//! The live instruction set and its correspondence with the static one.
//!
//! [`EmitOpCode`] is what a [`CodeWriter`](crate::emit::CodeWriter) accepts and what the
//! interpreter executes. The static set ([`OpCode`]) maps onto it through [`OPCODE_MAP`], a
//! plain table so that the transcoder never branches on individual opcodes.

use std::{collections::HashMap, sync::OnceLock};

use strum::{Display, EnumCount, EnumIter, IntoStaticStr};

use crate::{
    disassembler::{FlowType, OpCode, OperandType},
    Error, Result,
};

/// Every instruction a live method body can contain.
#[allow(missing_docs)]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter, EnumCount, Display, IntoStaticStr,
)]
pub enum EmitOpCode {
    #[strum(serialize = "nop")]
    Nop,
    #[strum(serialize = "break")]
    Break,
    #[strum(serialize = "ldarg.0")]
    Ldarg0,
    #[strum(serialize = "ldarg.1")]
    Ldarg1,
    #[strum(serialize = "ldarg.2")]
    Ldarg2,
    #[strum(serialize = "ldarg.3")]
    Ldarg3,
    #[strum(serialize = "ldloc.0")]
    Ldloc0,
    #[strum(serialize = "ldloc.1")]
    Ldloc1,
    #[strum(serialize = "ldloc.2")]
    Ldloc2,
    #[strum(serialize = "ldloc.3")]
    Ldloc3,
    #[strum(serialize = "stloc.0")]
    Stloc0,
    #[strum(serialize = "stloc.1")]
    Stloc1,
    #[strum(serialize = "stloc.2")]
    Stloc2,
    #[strum(serialize = "stloc.3")]
    Stloc3,
    #[strum(serialize = "ldarg.s")]
    LdargS,
    #[strum(serialize = "ldarga.s")]
    LdargaS,
    #[strum(serialize = "starg.s")]
    StargS,
    #[strum(serialize = "ldloc.s")]
    LdlocS,
    #[strum(serialize = "ldloca.s")]
    LdlocaS,
    #[strum(serialize = "stloc.s")]
    StlocS,
    #[strum(serialize = "ldnull")]
    Ldnull,
    #[strum(serialize = "ldc.i4.m1")]
    LdcI4M1,
    #[strum(serialize = "ldc.i4.0")]
    LdcI40,
    #[strum(serialize = "ldc.i4.1")]
    LdcI41,
    #[strum(serialize = "ldc.i4.2")]
    LdcI42,
    #[strum(serialize = "ldc.i4.3")]
    LdcI43,
    #[strum(serialize = "ldc.i4.4")]
    LdcI44,
    #[strum(serialize = "ldc.i4.5")]
    LdcI45,
    #[strum(serialize = "ldc.i4.6")]
    LdcI46,
    #[strum(serialize = "ldc.i4.7")]
    LdcI47,
    #[strum(serialize = "ldc.i4.8")]
    LdcI48,
    #[strum(serialize = "ldc.i4.s")]
    LdcI4S,
    #[strum(serialize = "ldc.i4")]
    LdcI4,
    #[strum(serialize = "ldc.i8")]
    LdcI8,
    #[strum(serialize = "ldc.r4")]
    LdcR4,
    #[strum(serialize = "ldc.r8")]
    LdcR8,
    #[strum(serialize = "dup")]
    Dup,
    #[strum(serialize = "pop")]
    Pop,
    #[strum(serialize = "jmp")]
    Jmp,
    #[strum(serialize = "call")]
    Call,
    #[strum(serialize = "calli")]
    Calli,
    #[strum(serialize = "ret")]
    Ret,
    #[strum(serialize = "br.s")]
    BrS,
    #[strum(serialize = "brfalse.s")]
    BrfalseS,
    #[strum(serialize = "brtrue.s")]
    BrtrueS,
    #[strum(serialize = "beq.s")]
    BeqS,
    #[strum(serialize = "bge.s")]
    BgeS,
    #[strum(serialize = "bgt.s")]
    BgtS,
    #[strum(serialize = "ble.s")]
    BleS,
    #[strum(serialize = "blt.s")]
    BltS,
    #[strum(serialize = "bne.un.s")]
    BneUnS,
    #[strum(serialize = "bge.un.s")]
    BgeUnS,
    #[strum(serialize = "bgt.un.s")]
    BgtUnS,
    #[strum(serialize = "ble.un.s")]
    BleUnS,
    #[strum(serialize = "blt.un.s")]
    BltUnS,
    #[strum(serialize = "br")]
    Br,
    #[strum(serialize = "brfalse")]
    Brfalse,
    #[strum(serialize = "brtrue")]
    Brtrue,
    #[strum(serialize = "beq")]
    Beq,
    #[strum(serialize = "bge")]
    Bge,
    #[strum(serialize = "bgt")]
    Bgt,
    #[strum(serialize = "ble")]
    Ble,
    #[strum(serialize = "blt")]
    Blt,
    #[strum(serialize = "bne.un")]
    BneUn,
    #[strum(serialize = "bge.un")]
    BgeUn,
    #[strum(serialize = "bgt.un")]
    BgtUn,
    #[strum(serialize = "ble.un")]
    BleUn,
    #[strum(serialize = "blt.un")]
    BltUn,
    #[strum(serialize = "switch")]
    Switch,
    #[strum(serialize = "ldind.i1")]
    LdindI1,
    #[strum(serialize = "ldind.u1")]
    LdindU1,
    #[strum(serialize = "ldind.i2")]
    LdindI2,
    #[strum(serialize = "ldind.u2")]
    LdindU2,
    #[strum(serialize = "ldind.i4")]
    LdindI4,
    #[strum(serialize = "ldind.u4")]
    LdindU4,
    #[strum(serialize = "ldind.i8")]
    LdindI8,
    #[strum(serialize = "ldind.i")]
    LdindI,
    #[strum(serialize = "ldind.r4")]
    LdindR4,
    #[strum(serialize = "ldind.r8")]
    LdindR8,
    #[strum(serialize = "ldind.ref")]
    LdindRef,
    #[strum(serialize = "stind.ref")]
    StindRef,
    #[strum(serialize = "stind.i1")]
    StindI1,
    #[strum(serialize = "stind.i2")]
    StindI2,
    #[strum(serialize = "stind.i4")]
    StindI4,
    #[strum(serialize = "stind.i8")]
    StindI8,
    #[strum(serialize = "stind.r4")]
    StindR4,
    #[strum(serialize = "stind.r8")]
    StindR8,
    #[strum(serialize = "add")]
    Add,
    #[strum(serialize = "sub")]
    Sub,
    #[strum(serialize = "mul")]
    Mul,
    #[strum(serialize = "div")]
    Div,
    #[strum(serialize = "div.un")]
    DivUn,
    #[strum(serialize = "rem")]
    Rem,
    #[strum(serialize = "rem.un")]
    RemUn,
    #[strum(serialize = "and")]
    And,
    #[strum(serialize = "or")]
    Or,
    #[strum(serialize = "xor")]
    Xor,
    #[strum(serialize = "shl")]
    Shl,
    #[strum(serialize = "shr")]
    Shr,
    #[strum(serialize = "shr.un")]
    ShrUn,
    #[strum(serialize = "neg")]
    Neg,
    #[strum(serialize = "not")]
    Not,
    #[strum(serialize = "conv.i1")]
    ConvI1,
    #[strum(serialize = "conv.i2")]
    ConvI2,
    #[strum(serialize = "conv.i4")]
    ConvI4,
    #[strum(serialize = "conv.i8")]
    ConvI8,
    #[strum(serialize = "conv.r4")]
    ConvR4,
    #[strum(serialize = "conv.r8")]
    ConvR8,
    #[strum(serialize = "conv.u4")]
    ConvU4,
    #[strum(serialize = "conv.u8")]
    ConvU8,
    #[strum(serialize = "callvirt")]
    Callvirt,
    #[strum(serialize = "cpobj")]
    Cpobj,
    #[strum(serialize = "ldobj")]
    Ldobj,
    #[strum(serialize = "ldstr")]
    Ldstr,
    #[strum(serialize = "newobj")]
    Newobj,
    #[strum(serialize = "castclass")]
    Castclass,
    #[strum(serialize = "isinst")]
    Isinst,
    #[strum(serialize = "conv.r.un")]
    ConvRUn,
    #[strum(serialize = "unbox")]
    Unbox,
    #[strum(serialize = "throw")]
    Throw,
    #[strum(serialize = "ldfld")]
    Ldfld,
    #[strum(serialize = "ldflda")]
    Ldflda,
    #[strum(serialize = "stfld")]
    Stfld,
    #[strum(serialize = "ldsfld")]
    Ldsfld,
    #[strum(serialize = "ldsflda")]
    Ldsflda,
    #[strum(serialize = "stsfld")]
    Stsfld,
    #[strum(serialize = "stobj")]
    Stobj,
    #[strum(serialize = "conv.ovf.i1.un")]
    ConvOvfI1Un,
    #[strum(serialize = "conv.ovf.i2.un")]
    ConvOvfI2Un,
    #[strum(serialize = "conv.ovf.i4.un")]
    ConvOvfI4Un,
    #[strum(serialize = "conv.ovf.i8.un")]
    ConvOvfI8Un,
    #[strum(serialize = "conv.ovf.u1.un")]
    ConvOvfU1Un,
    #[strum(serialize = "conv.ovf.u2.un")]
    ConvOvfU2Un,
    #[strum(serialize = "conv.ovf.u4.un")]
    ConvOvfU4Un,
    #[strum(serialize = "conv.ovf.u8.un")]
    ConvOvfU8Un,
    #[strum(serialize = "conv.ovf.i.un")]
    ConvOvfIUn,
    #[strum(serialize = "conv.ovf.u.un")]
    ConvOvfUUn,
    #[strum(serialize = "box")]
    Box,
    #[strum(serialize = "newarr")]
    Newarr,
    #[strum(serialize = "ldlen")]
    Ldlen,
    #[strum(serialize = "ldelema")]
    Ldelema,
    #[strum(serialize = "ldelem.i1")]
    LdelemI1,
    #[strum(serialize = "ldelem.u1")]
    LdelemU1,
    #[strum(serialize = "ldelem.i2")]
    LdelemI2,
    #[strum(serialize = "ldelem.u2")]
    LdelemU2,
    #[strum(serialize = "ldelem.i4")]
    LdelemI4,
    #[strum(serialize = "ldelem.u4")]
    LdelemU4,
    #[strum(serialize = "ldelem.i8")]
    LdelemI8,
    #[strum(serialize = "ldelem.i")]
    LdelemI,
    #[strum(serialize = "ldelem.r4")]
    LdelemR4,
    #[strum(serialize = "ldelem.r8")]
    LdelemR8,
    #[strum(serialize = "ldelem.ref")]
    LdelemRef,
    #[strum(serialize = "stelem.i")]
    StelemI,
    #[strum(serialize = "stelem.i1")]
    StelemI1,
    #[strum(serialize = "stelem.i2")]
    StelemI2,
    #[strum(serialize = "stelem.i4")]
    StelemI4,
    #[strum(serialize = "stelem.i8")]
    StelemI8,
    #[strum(serialize = "stelem.r4")]
    StelemR4,
    #[strum(serialize = "stelem.r8")]
    StelemR8,
    #[strum(serialize = "stelem.ref")]
    StelemRef,
    #[strum(serialize = "ldelem")]
    Ldelem,
    #[strum(serialize = "stelem")]
    Stelem,
    #[strum(serialize = "unbox.any")]
    UnboxAny,
    #[strum(serialize = "conv.ovf.i1")]
    ConvOvfI1,
    #[strum(serialize = "conv.ovf.u1")]
    ConvOvfU1,
    #[strum(serialize = "conv.ovf.i2")]
    ConvOvfI2,
    #[strum(serialize = "conv.ovf.u2")]
    ConvOvfU2,
    #[strum(serialize = "conv.ovf.i4")]
    ConvOvfI4,
    #[strum(serialize = "conv.ovf.u4")]
    ConvOvfU4,
    #[strum(serialize = "conv.ovf.i8")]
    ConvOvfI8,
    #[strum(serialize = "conv.ovf.u8")]
    ConvOvfU8,
    #[strum(serialize = "refanyval")]
    Refanyval,
    #[strum(serialize = "ckfinite")]
    Ckfinite,
    #[strum(serialize = "mkrefany")]
    Mkrefany,
    #[strum(serialize = "ldtoken")]
    Ldtoken,
    #[strum(serialize = "conv.u2")]
    ConvU2,
    #[strum(serialize = "conv.u1")]
    ConvU1,
    #[strum(serialize = "conv.i")]
    ConvI,
    #[strum(serialize = "conv.ovf.i")]
    ConvOvfI,
    #[strum(serialize = "conv.ovf.u")]
    ConvOvfU,
    #[strum(serialize = "add.ovf")]
    AddOvf,
    #[strum(serialize = "add.ovf.un")]
    AddOvfUn,
    #[strum(serialize = "mul.ovf")]
    MulOvf,
    #[strum(serialize = "mul.ovf.un")]
    MulOvfUn,
    #[strum(serialize = "sub.ovf")]
    SubOvf,
    #[strum(serialize = "sub.ovf.un")]
    SubOvfUn,
    #[strum(serialize = "endfinally")]
    Endfinally,
    #[strum(serialize = "leave")]
    Leave,
    #[strum(serialize = "leave.s")]
    LeaveS,
    #[strum(serialize = "stind.i")]
    StindI,
    #[strum(serialize = "conv.u")]
    ConvU,
    #[strum(serialize = "arglist")]
    Arglist,
    #[strum(serialize = "ceq")]
    Ceq,
    #[strum(serialize = "cgt")]
    Cgt,
    #[strum(serialize = "cgt.un")]
    CgtUn,
    #[strum(serialize = "clt")]
    Clt,
    #[strum(serialize = "clt.un")]
    CltUn,
    #[strum(serialize = "ldftn")]
    Ldftn,
    #[strum(serialize = "ldvirtftn")]
    Ldvirtftn,
    #[strum(serialize = "ldarg")]
    Ldarg,
    #[strum(serialize = "ldarga")]
    Ldarga,
    #[strum(serialize = "starg")]
    Starg,
    #[strum(serialize = "ldloc")]
    Ldloc,
    #[strum(serialize = "ldloca")]
    Ldloca,
    #[strum(serialize = "stloc")]
    Stloc,
    #[strum(serialize = "localloc")]
    Localloc,
    #[strum(serialize = "endfilter")]
    Endfilter,
    #[strum(serialize = "unaligned.")]
    Unaligned,
    #[strum(serialize = "volatile.")]
    Volatile,
    #[strum(serialize = "tail.")]
    Tailcall,
    #[strum(serialize = "initobj")]
    Initobj,
    #[strum(serialize = "constrained.")]
    Constrained,
    #[strum(serialize = "cpblk")]
    Cpblk,
    #[strum(serialize = "initblk")]
    Initblk,
    #[strum(serialize = "rethrow")]
    Rethrow,
    #[strum(serialize = "sizeof")]
    Sizeof,
    #[strum(serialize = "refanytype")]
    Refanytype,
    #[strum(serialize = "readonly.")]
    Readonly,
}

/// Static opcode to live opcode, in static encoding order.
///
/// One-to-one except for `ldelem.any`, `stelem.any` and `tail.`, which carry different names
/// in the live set. `no.` has no live counterpart and is absent.
pub const OPCODE_MAP: &[(OpCode, EmitOpCode)] = &[
    (OpCode::Nop, EmitOpCode::Nop),
    (OpCode::Break, EmitOpCode::Break),
    (OpCode::Ldarg0, EmitOpCode::Ldarg0),
    (OpCode::Ldarg1, EmitOpCode::Ldarg1),
    (OpCode::Ldarg2, EmitOpCode::Ldarg2),
    (OpCode::Ldarg3, EmitOpCode::Ldarg3),
    (OpCode::Ldloc0, EmitOpCode::Ldloc0),
    (OpCode::Ldloc1, EmitOpCode::Ldloc1),
    (OpCode::Ldloc2, EmitOpCode::Ldloc2),
    (OpCode::Ldloc3, EmitOpCode::Ldloc3),
    (OpCode::Stloc0, EmitOpCode::Stloc0),
    (OpCode::Stloc1, EmitOpCode::Stloc1),
    (OpCode::Stloc2, EmitOpCode::Stloc2),
    (OpCode::Stloc3, EmitOpCode::Stloc3),
    (OpCode::LdargS, EmitOpCode::LdargS),
    (OpCode::LdargaS, EmitOpCode::LdargaS),
    (OpCode::StargS, EmitOpCode::StargS),
    (OpCode::LdlocS, EmitOpCode::LdlocS),
    (OpCode::LdlocaS, EmitOpCode::LdlocaS),
    (OpCode::StlocS, EmitOpCode::StlocS),
    (OpCode::Ldnull, EmitOpCode::Ldnull),
    (OpCode::LdcI4M1, EmitOpCode::LdcI4M1),
    (OpCode::LdcI40, EmitOpCode::LdcI40),
    (OpCode::LdcI41, EmitOpCode::LdcI41),
    (OpCode::LdcI42, EmitOpCode::LdcI42),
    (OpCode::LdcI43, EmitOpCode::LdcI43),
    (OpCode::LdcI44, EmitOpCode::LdcI44),
    (OpCode::LdcI45, EmitOpCode::LdcI45),
    (OpCode::LdcI46, EmitOpCode::LdcI46),
    (OpCode::LdcI47, EmitOpCode::LdcI47),
    (OpCode::LdcI48, EmitOpCode::LdcI48),
    (OpCode::LdcI4S, EmitOpCode::LdcI4S),
    (OpCode::LdcI4, EmitOpCode::LdcI4),
    (OpCode::LdcI8, EmitOpCode::LdcI8),
    (OpCode::LdcR4, EmitOpCode::LdcR4),
    (OpCode::LdcR8, EmitOpCode::LdcR8),
    (OpCode::Dup, EmitOpCode::Dup),
    (OpCode::Pop, EmitOpCode::Pop),
    (OpCode::Jmp, EmitOpCode::Jmp),
    (OpCode::Call, EmitOpCode::Call),
    (OpCode::Calli, EmitOpCode::Calli),
    (OpCode::Ret, EmitOpCode::Ret),
    (OpCode::BrS, EmitOpCode::BrS),
    (OpCode::BrfalseS, EmitOpCode::BrfalseS),
    (OpCode::BrtrueS, EmitOpCode::BrtrueS),
    (OpCode::BeqS, EmitOpCode::BeqS),
    (OpCode::BgeS, EmitOpCode::BgeS),
    (OpCode::BgtS, EmitOpCode::BgtS),
    (OpCode::BleS, EmitOpCode::BleS),
    (OpCode::BltS, EmitOpCode::BltS),
    (OpCode::BneUnS, EmitOpCode::BneUnS),
    (OpCode::BgeUnS, EmitOpCode::BgeUnS),
    (OpCode::BgtUnS, EmitOpCode::BgtUnS),
    (OpCode::BleUnS, EmitOpCode::BleUnS),
    (OpCode::BltUnS, EmitOpCode::BltUnS),
    (OpCode::Br, EmitOpCode::Br),
    (OpCode::Brfalse, EmitOpCode::Brfalse),
    (OpCode::Brtrue, EmitOpCode::Brtrue),
    (OpCode::Beq, EmitOpCode::Beq),
    (OpCode::Bge, EmitOpCode::Bge),
    (OpCode::Bgt, EmitOpCode::Bgt),
    (OpCode::Ble, EmitOpCode::Ble),
    (OpCode::Blt, EmitOpCode::Blt),
    (OpCode::BneUn, EmitOpCode::BneUn),
    (OpCode::BgeUn, EmitOpCode::BgeUn),
    (OpCode::BgtUn, EmitOpCode::BgtUn),
    (OpCode::BleUn, EmitOpCode::BleUn),
    (OpCode::BltUn, EmitOpCode::BltUn),
    (OpCode::Switch, EmitOpCode::Switch),
    (OpCode::LdindI1, EmitOpCode::LdindI1),
    (OpCode::LdindU1, EmitOpCode::LdindU1),
    (OpCode::LdindI2, EmitOpCode::LdindI2),
    (OpCode::LdindU2, EmitOpCode::LdindU2),
    (OpCode::LdindI4, EmitOpCode::LdindI4),
    (OpCode::LdindU4, EmitOpCode::LdindU4),
    (OpCode::LdindI8, EmitOpCode::LdindI8),
    (OpCode::LdindI, EmitOpCode::LdindI),
    (OpCode::LdindR4, EmitOpCode::LdindR4),
    (OpCode::LdindR8, EmitOpCode::LdindR8),
    (OpCode::LdindRef, EmitOpCode::LdindRef),
    (OpCode::StindRef, EmitOpCode::StindRef),
    (OpCode::StindI1, EmitOpCode::StindI1),
    (OpCode::StindI2, EmitOpCode::StindI2),
    (OpCode::StindI4, EmitOpCode::StindI4),
    (OpCode::StindI8, EmitOpCode::StindI8),
    (OpCode::StindR4, EmitOpCode::StindR4),
    (OpCode::StindR8, EmitOpCode::StindR8),
    (OpCode::Add, EmitOpCode::Add),
    (OpCode::Sub, EmitOpCode::Sub),
    (OpCode::Mul, EmitOpCode::Mul),
    (OpCode::Div, EmitOpCode::Div),
    (OpCode::DivUn, EmitOpCode::DivUn),
    (OpCode::Rem, EmitOpCode::Rem),
    (OpCode::RemUn, EmitOpCode::RemUn),
    (OpCode::And, EmitOpCode::And),
    (OpCode::Or, EmitOpCode::Or),
    (OpCode::Xor, EmitOpCode::Xor),
    (OpCode::Shl, EmitOpCode::Shl),
    (OpCode::Shr, EmitOpCode::Shr),
    (OpCode::ShrUn, EmitOpCode::ShrUn),
    (OpCode::Neg, EmitOpCode::Neg),
    (OpCode::Not, EmitOpCode::Not),
    (OpCode::ConvI1, EmitOpCode::ConvI1),
    (OpCode::ConvI2, EmitOpCode::ConvI2),
    (OpCode::ConvI4, EmitOpCode::ConvI4),
    (OpCode::ConvI8, EmitOpCode::ConvI8),
    (OpCode::ConvR4, EmitOpCode::ConvR4),
    (OpCode::ConvR8, EmitOpCode::ConvR8),
    (OpCode::ConvU4, EmitOpCode::ConvU4),
    (OpCode::ConvU8, EmitOpCode::ConvU8),
    (OpCode::Callvirt, EmitOpCode::Callvirt),
    (OpCode::Cpobj, EmitOpCode::Cpobj),
    (OpCode::Ldobj, EmitOpCode::Ldobj),
    (OpCode::Ldstr, EmitOpCode::Ldstr),
    (OpCode::Newobj, EmitOpCode::Newobj),
    (OpCode::Castclass, EmitOpCode::Castclass),
    (OpCode::Isinst, EmitOpCode::Isinst),
    (OpCode::ConvRUn, EmitOpCode::ConvRUn),
    (OpCode::Unbox, EmitOpCode::Unbox),
    (OpCode::Throw, EmitOpCode::Throw),
    (OpCode::Ldfld, EmitOpCode::Ldfld),
    (OpCode::Ldflda, EmitOpCode::Ldflda),
    (OpCode::Stfld, EmitOpCode::Stfld),
    (OpCode::Ldsfld, EmitOpCode::Ldsfld),
    (OpCode::Ldsflda, EmitOpCode::Ldsflda),
    (OpCode::Stsfld, EmitOpCode::Stsfld),
    (OpCode::Stobj, EmitOpCode::Stobj),
    (OpCode::ConvOvfI1Un, EmitOpCode::ConvOvfI1Un),
    (OpCode::ConvOvfI2Un, EmitOpCode::ConvOvfI2Un),
    (OpCode::ConvOvfI4Un, EmitOpCode::ConvOvfI4Un),
    (OpCode::ConvOvfI8Un, EmitOpCode::ConvOvfI8Un),
    (OpCode::ConvOvfU1Un, EmitOpCode::ConvOvfU1Un),
    (OpCode::ConvOvfU2Un, EmitOpCode::ConvOvfU2Un),
    (OpCode::ConvOvfU4Un, EmitOpCode::ConvOvfU4Un),
    (OpCode::ConvOvfU8Un, EmitOpCode::ConvOvfU8Un),
    (OpCode::ConvOvfIUn, EmitOpCode::ConvOvfIUn),
    (OpCode::ConvOvfUUn, EmitOpCode::ConvOvfUUn),
    (OpCode::Box, EmitOpCode::Box),
    (OpCode::Newarr, EmitOpCode::Newarr),
    (OpCode::Ldlen, EmitOpCode::Ldlen),
    (OpCode::Ldelema, EmitOpCode::Ldelema),
    (OpCode::LdelemI1, EmitOpCode::LdelemI1),
    (OpCode::LdelemU1, EmitOpCode::LdelemU1),
    (OpCode::LdelemI2, EmitOpCode::LdelemI2),
    (OpCode::LdelemU2, EmitOpCode::LdelemU2),
    (OpCode::LdelemI4, EmitOpCode::LdelemI4),
    (OpCode::LdelemU4, EmitOpCode::LdelemU4),
    (OpCode::LdelemI8, EmitOpCode::LdelemI8),
    (OpCode::LdelemI, EmitOpCode::LdelemI),
    (OpCode::LdelemR4, EmitOpCode::LdelemR4),
    (OpCode::LdelemR8, EmitOpCode::LdelemR8),
    (OpCode::LdelemRef, EmitOpCode::LdelemRef),
    (OpCode::StelemI, EmitOpCode::StelemI),
    (OpCode::StelemI1, EmitOpCode::StelemI1),
    (OpCode::StelemI2, EmitOpCode::StelemI2),
    (OpCode::StelemI4, EmitOpCode::StelemI4),
    (OpCode::StelemI8, EmitOpCode::StelemI8),
    (OpCode::StelemR4, EmitOpCode::StelemR4),
    (OpCode::StelemR8, EmitOpCode::StelemR8),
    (OpCode::StelemRef, EmitOpCode::StelemRef),
    (OpCode::LdelemAny, EmitOpCode::Ldelem),
    (OpCode::StelemAny, EmitOpCode::Stelem),
    (OpCode::UnboxAny, EmitOpCode::UnboxAny),
    (OpCode::ConvOvfI1, EmitOpCode::ConvOvfI1),
    (OpCode::ConvOvfU1, EmitOpCode::ConvOvfU1),
    (OpCode::ConvOvfI2, EmitOpCode::ConvOvfI2),
    (OpCode::ConvOvfU2, EmitOpCode::ConvOvfU2),
    (OpCode::ConvOvfI4, EmitOpCode::ConvOvfI4),
    (OpCode::ConvOvfU4, EmitOpCode::ConvOvfU4),
    (OpCode::ConvOvfI8, EmitOpCode::ConvOvfI8),
    (OpCode::ConvOvfU8, EmitOpCode::ConvOvfU8),
    (OpCode::Refanyval, EmitOpCode::Refanyval),
    (OpCode::Ckfinite, EmitOpCode::Ckfinite),
    (OpCode::Mkrefany, EmitOpCode::Mkrefany),
    (OpCode::Ldtoken, EmitOpCode::Ldtoken),
    (OpCode::ConvU2, EmitOpCode::ConvU2),
    (OpCode::ConvU1, EmitOpCode::ConvU1),
    (OpCode::ConvI, EmitOpCode::ConvI),
    (OpCode::ConvOvfI, EmitOpCode::ConvOvfI),
    (OpCode::ConvOvfU, EmitOpCode::ConvOvfU),
    (OpCode::AddOvf, EmitOpCode::AddOvf),
    (OpCode::AddOvfUn, EmitOpCode::AddOvfUn),
    (OpCode::MulOvf, EmitOpCode::MulOvf),
    (OpCode::MulOvfUn, EmitOpCode::MulOvfUn),
    (OpCode::SubOvf, EmitOpCode::SubOvf),
    (OpCode::SubOvfUn, EmitOpCode::SubOvfUn),
    (OpCode::Endfinally, EmitOpCode::Endfinally),
    (OpCode::Leave, EmitOpCode::Leave),
    (OpCode::LeaveS, EmitOpCode::LeaveS),
    (OpCode::StindI, EmitOpCode::StindI),
    (OpCode::ConvU, EmitOpCode::ConvU),
    (OpCode::Arglist, EmitOpCode::Arglist),
    (OpCode::Ceq, EmitOpCode::Ceq),
    (OpCode::Cgt, EmitOpCode::Cgt),
    (OpCode::CgtUn, EmitOpCode::CgtUn),
    (OpCode::Clt, EmitOpCode::Clt),
    (OpCode::CltUn, EmitOpCode::CltUn),
    (OpCode::Ldftn, EmitOpCode::Ldftn),
    (OpCode::Ldvirtftn, EmitOpCode::Ldvirtftn),
    (OpCode::Ldarg, EmitOpCode::Ldarg),
    (OpCode::Ldarga, EmitOpCode::Ldarga),
    (OpCode::Starg, EmitOpCode::Starg),
    (OpCode::Ldloc, EmitOpCode::Ldloc),
    (OpCode::Ldloca, EmitOpCode::Ldloca),
    (OpCode::Stloc, EmitOpCode::Stloc),
    (OpCode::Localloc, EmitOpCode::Localloc),
    (OpCode::Endfilter, EmitOpCode::Endfilter),
    (OpCode::Unaligned, EmitOpCode::Unaligned),
    (OpCode::Volatile, EmitOpCode::Volatile),
    (OpCode::Tail, EmitOpCode::Tailcall),
    (OpCode::Initobj, EmitOpCode::Initobj),
    (OpCode::Constrained, EmitOpCode::Constrained),
    (OpCode::Cpblk, EmitOpCode::Cpblk),
    (OpCode::Initblk, EmitOpCode::Initblk),
    (OpCode::Rethrow, EmitOpCode::Rethrow),
    (OpCode::Sizeof, EmitOpCode::Sizeof),
    (OpCode::Refanytype, EmitOpCode::Refanytype),
    (OpCode::Readonly, EmitOpCode::Readonly),
];

fn forward() -> &'static HashMap<OpCode, EmitOpCode> {
    static FORWARD: OnceLock<HashMap<OpCode, EmitOpCode>> = OnceLock::new();
    FORWARD.get_or_init(|| OPCODE_MAP.iter().copied().collect())
}

fn backward() -> &'static HashMap<EmitOpCode, OpCode> {
    static BACKWARD: OnceLock<HashMap<EmitOpCode, OpCode>> = OnceLock::new();
    BACKWARD.get_or_init(|| OPCODE_MAP.iter().map(|(from, to)| (*to, *from)).collect())
}

/// Look up the live counterpart of a static opcode.
///
/// # Errors
/// Returns [`crate::Error::UnsupportedInstruction`] for opcodes without one.
pub fn emit_opcode(opcode: OpCode) -> Result<EmitOpCode> {
    forward()
        .get(&opcode)
        .copied()
        .ok_or_else(|| Error::UnsupportedInstruction(format!("{opcode} has no live counterpart")))
}

impl EmitOpCode {
    /// The static opcode this one was mapped from.
    #[must_use]
    pub fn source(self) -> OpCode {
        // every live opcode is the image of exactly one static opcode
        backward().get(&self).copied().unwrap_or(OpCode::Nop)
    }

    /// Assembler mnemonic.
    #[must_use]
    pub fn mnemonic(self) -> &'static str {
        self.into()
    }

    /// Shape of the operand this opcode takes.
    #[must_use]
    pub fn operand_type(self) -> OperandType {
        self.source().operand_type()
    }

    /// Control-flow class.
    #[must_use]
    pub fn flow(self) -> FlowType {
        self.source().flow()
    }

    /// `true` for `tail.`, `constrained.`, `volatile.`, `unaligned.` and `readonly.`.
    #[must_use]
    pub fn is_prefix(self) -> bool {
        self.flow() == FlowType::Prefix
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn map_covers_every_live_opcode_once() {
        assert_eq!(OPCODE_MAP.len(), EmitOpCode::COUNT);
        for live in EmitOpCode::iter() {
            assert_eq!(OPCODE_MAP.iter().filter(|(_, to)| *to == live).count(), 1, "{live}");
        }
    }

    #[test]
    fn renamed_entries() {
        assert_eq!(emit_opcode(OpCode::LdelemAny).unwrap(), EmitOpCode::Ldelem);
        assert_eq!(emit_opcode(OpCode::StelemAny).unwrap(), EmitOpCode::Stelem);
        assert_eq!(emit_opcode(OpCode::Tail).unwrap(), EmitOpCode::Tailcall);
        assert_eq!(EmitOpCode::Tailcall.source(), OpCode::Tail);
        assert!(EmitOpCode::Tailcall.is_prefix());
        assert_eq!(EmitOpCode::Ldelem.mnemonic(), "ldelem");
    }

    #[test]
    fn no_prefix_is_unsupported() {
        assert!(matches!(emit_opcode(OpCode::No), Err(Error::UnsupportedInstruction(_))));
    }

    #[test]
    fn mnemonics_follow_the_static_set() {
        for (from, to) in OPCODE_MAP {
            if !matches!(from, OpCode::LdelemAny | OpCode::StelemAny) {
                assert_eq!(from.mnemonic(), to.mnemonic());
            }
            assert_eq!(from.operand_type(), to.operand_type());
        }
    }
}
