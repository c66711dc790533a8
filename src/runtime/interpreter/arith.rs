//! Arithmetic, comparison and conversion on stack values.

use std::cmp::Ordering;

use crate::{
    runtime::{corlib::Fault, value::Value, Domain},
    Error, Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum BinaryOp {
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
    AddOvf,
    AddOvfUn,
    SubOvf,
    SubOvfUn,
    MulOvf,
    MulOvfUn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ShiftOp {
    Shl,
    Shr,
    ShrUn,
}

/// Target of a `conv` family instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ConvTarget {
    I1,
    U1,
    I2,
    U2,
    I4,
    U4,
    I8,
    U8,
    I,
    U,
    R4,
    R8,
    RUn,
}

impl ConvTarget {
    fn range(self) -> (i128, i128) {
        match self {
            ConvTarget::I1 => (i128::from(i8::MIN), i128::from(i8::MAX)),
            ConvTarget::U1 => (0, i128::from(u8::MAX)),
            ConvTarget::I2 => (i128::from(i16::MIN), i128::from(i16::MAX)),
            ConvTarget::U2 => (0, i128::from(u16::MAX)),
            ConvTarget::I4 => (i128::from(i32::MIN), i128::from(i32::MAX)),
            ConvTarget::U4 => (0, i128::from(u32::MAX)),
            ConvTarget::I8 | ConvTarget::I => (i128::from(i64::MIN), i128::from(i64::MAX)),
            ConvTarget::U8 | ConvTarget::U => (0, i128::from(u64::MAX)),
            ConvTarget::R4 | ConvTarget::R8 | ConvTarget::RUn => (i128::MIN, i128::MAX),
        }
    }
}

/// Operand pair after stack-type promotion.
enum Operands {
    I4(i32, i32),
    I8(i64, i64),
    Native(i64, i64),
    F(f64, f64),
}

fn promote(a: &Value, b: &Value) -> Result<Operands> {
    Ok(match (a, b) {
        (Value::I4(a), Value::I4(b)) => Operands::I4(*a, *b),
        (Value::I8(a), Value::I8(b)) => Operands::I8(*a, *b),
        (Value::NativeInt(a), Value::NativeInt(b)) | (Value::NativeInt(a), Value::I8(b)) | (Value::I8(a), Value::NativeInt(b)) => {
            Operands::Native(*a, *b)
        }
        (Value::NativeInt(a), Value::I4(b)) => Operands::Native(*a, i64::from(*b)),
        (Value::I4(a), Value::NativeInt(b)) => Operands::Native(i64::from(*a), *b),
        (Value::F(a), Value::F(b)) => Operands::F(*a, *b),
        (a, b) => {
            return Err(Error::NotSupported(format!(
                "Arithmetic on {a:?} and {b:?}"
            )))
        }
    })
}

fn overflow(domain: &Domain) -> Error {
    domain.raise(Fault::Overflow, "Arithmetic operation resulted in an overflow.")
}

fn divide_by_zero(domain: &Domain) -> Error {
    domain.raise(Fault::DivideByZero, "Attempted to divide by zero.")
}

macro_rules! integer_binary {
    ($domain:expr, $op:expr, $a:expr, $b:expr, $signed:ty, $unsigned:ty) => {{
        let (a, b): ($signed, $signed) = ($a, $b);
        let (ua, ub) = (a as $unsigned, b as $unsigned);
        match $op {
            BinaryOp::Add => a.wrapping_add(b),
            BinaryOp::Sub => a.wrapping_sub(b),
            BinaryOp::Mul => a.wrapping_mul(b),
            BinaryOp::Div | BinaryOp::Rem if b == 0 => return Err(divide_by_zero($domain)),
            BinaryOp::DivUn | BinaryOp::RemUn if b == 0 => return Err(divide_by_zero($domain)),
            BinaryOp::Div => a.checked_div(b).ok_or_else(|| overflow($domain))?,
            BinaryOp::Rem => a.checked_rem(b).ok_or_else(|| overflow($domain))?,
            BinaryOp::DivUn => (ua / ub) as $signed,
            BinaryOp::RemUn => (ua % ub) as $signed,
            BinaryOp::And => a & b,
            BinaryOp::Or => a | b,
            BinaryOp::Xor => a ^ b,
            BinaryOp::AddOvf => a.checked_add(b).ok_or_else(|| overflow($domain))?,
            BinaryOp::SubOvf => a.checked_sub(b).ok_or_else(|| overflow($domain))?,
            BinaryOp::MulOvf => a.checked_mul(b).ok_or_else(|| overflow($domain))?,
            BinaryOp::AddOvfUn => ua.checked_add(ub).ok_or_else(|| overflow($domain))? as $signed,
            BinaryOp::SubOvfUn => ua.checked_sub(ub).ok_or_else(|| overflow($domain))? as $signed,
            BinaryOp::MulOvfUn => ua.checked_mul(ub).ok_or_else(|| overflow($domain))? as $signed,
        }
    }};
}

/// Apply a two-operand arithmetic or bitwise instruction.
pub(super) fn binary(domain: &Domain, op: BinaryOp, a: &Value, b: &Value) -> Result<Value> {
    Ok(match promote(a, b)? {
        Operands::I4(a, b) => Value::I4(integer_binary!(domain, op, a, b, i32, u32)),
        Operands::I8(a, b) => Value::I8(integer_binary!(domain, op, a, b, i64, u64)),
        Operands::Native(a, b) => Value::NativeInt(integer_binary!(domain, op, a, b, i64, u64)),
        Operands::F(a, b) => Value::F(match op {
            BinaryOp::Add | BinaryOp::AddOvf => a + b,
            BinaryOp::Sub | BinaryOp::SubOvf => a - b,
            BinaryOp::Mul | BinaryOp::MulOvf => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Rem => a % b,
            other => {
                return Err(Error::NotSupported(format!(
                    "{other:?} on floating point values"
                )))
            }
        }),
    })
}

/// Apply `shl`, `shr` or `shr.un`.
pub(super) fn shift(op: ShiftOp, value: &Value, amount: &Value) -> Result<Value> {
    let amount = match amount {
        Value::I4(v) => *v as u32,
        Value::NativeInt(v) => *v as u32,
        other => return Err(Error::NotSupported(format!("Shift by {other:?}"))),
    };
    Ok(match value {
        Value::I4(v) => Value::I4(match op {
            ShiftOp::Shl => v.wrapping_shl(amount),
            ShiftOp::Shr => v.wrapping_shr(amount),
            ShiftOp::ShrUn => (*v as u32).wrapping_shr(amount) as i32,
        }),
        Value::I8(v) | Value::NativeInt(v) => {
            let shifted = match op {
                ShiftOp::Shl => v.wrapping_shl(amount),
                ShiftOp::Shr => v.wrapping_shr(amount),
                ShiftOp::ShrUn => (*v as u64).wrapping_shr(amount) as i64,
            };
            if matches!(value, Value::I8(_)) {
                Value::I8(shifted)
            } else {
                Value::NativeInt(shifted)
            }
        }
        other => return Err(Error::NotSupported(format!("Shift of {other:?}"))),
    })
}

/// `neg`
pub(super) fn negate(value: &Value) -> Result<Value> {
    Ok(match value {
        Value::I4(v) => Value::I4(v.wrapping_neg()),
        Value::I8(v) => Value::I8(v.wrapping_neg()),
        Value::NativeInt(v) => Value::NativeInt(v.wrapping_neg()),
        Value::F(v) => Value::F(-v),
        other => return Err(Error::NotSupported(format!("neg of {other:?}"))),
    })
}

/// `not`
pub(super) fn complement(value: &Value) -> Result<Value> {
    Ok(match value {
        Value::I4(v) => Value::I4(!v),
        Value::I8(v) => Value::I8(!v),
        Value::NativeInt(v) => Value::NativeInt(!v),
        other => return Err(Error::NotSupported(format!("not of {other:?}"))),
    })
}

fn identity(value: &Value) -> Option<usize> {
    match value {
        Value::Null => Some(0),
        Value::Object(object) => Some(object.address()),
        _ => None,
    }
}

/// Order two stack values; `None` means unordered (a NaN was involved).
pub(super) fn compare(a: &Value, b: &Value, unsigned: bool) -> Result<Option<Ordering>> {
    if let (Some(a), Some(b)) = (identity(a), identity(b)) {
        return Ok(Some(a.cmp(&b)));
    }
    match (a, b) {
        (Value::ByRef(x), Value::ByRef(y)) => {
            return Ok(Some(if x == y { Ordering::Equal } else { Ordering::Greater }))
        }
        (Value::FnPtr(x), Value::FnPtr(y)) => {
            return Ok(Some(if x == y { Ordering::Equal } else { Ordering::Greater }))
        }
        _ => {}
    }
    Ok(match promote(a, b)? {
        Operands::I4(a, b) if unsigned => Some((a as u32).cmp(&(b as u32))),
        Operands::I4(a, b) => Some(a.cmp(&b)),
        Operands::I8(a, b) | Operands::Native(a, b) if unsigned => Some((a as u64).cmp(&(b as u64))),
        Operands::I8(a, b) | Operands::Native(a, b) => Some(a.cmp(&b)),
        Operands::F(a, b) => a.partial_cmp(&b),
    })
}

/// Apply a `conv`, `conv.ovf` or `conv.ovf.*.un` instruction.
pub(super) fn convert(
    domain: &Domain,
    value: &Value,
    target: ConvTarget,
    checked: bool,
    unsigned_source: bool,
) -> Result<Value> {
    let integer = match value {
        Value::I4(v) if unsigned_source => Some(i128::from(*v as u32)),
        Value::I4(v) => Some(i128::from(*v)),
        Value::I8(v) | Value::NativeInt(v) if unsigned_source => Some(i128::from(*v as u64)),
        Value::I8(v) | Value::NativeInt(v) => Some(i128::from(*v)),
        Value::F(_) => None,
        other => return Err(Error::NotSupported(format!("Conversion of {other:?}"))),
    };

    match target {
        ConvTarget::R4 | ConvTarget::R8 | ConvTarget::RUn => {
            let float = match (value, integer) {
                (Value::F(v), _) => *v,
                (_, Some(v)) if target == ConvTarget::RUn => {
                    let unsigned = match value {
                        Value::I4(v) => i128::from(*v as u32),
                        Value::I8(v) | Value::NativeInt(v) => i128::from(*v as u64),
                        _ => v,
                    };
                    unsigned as f64
                }
                (_, Some(v)) => v as f64,
                (_, None) => 0.0,
            };
            return Ok(Value::F(if target == ConvTarget::R4 {
                f64::from(float as f32)
            } else {
                float
            }));
        }
        _ => {}
    }

    let integer = match (value, integer) {
        (_, Some(v)) => v,
        (Value::F(v), None) => {
            if checked {
                let (low, high) = target.range();
                if v.is_nan() || v.trunc() < low as f64 || v.trunc() > high as f64 {
                    return Err(overflow(domain));
                }
            }
            if v.is_nan() {
                0
            } else {
                v.trunc() as i128
            }
        }
        _ => 0,
    };
    if checked {
        let (low, high) = target.range();
        if integer < low || integer > high {
            return Err(overflow(domain));
        }
    }
    Ok(match target {
        ConvTarget::I1 => Value::I4(i32::from(integer as i8)),
        ConvTarget::U1 => Value::I4(i32::from(integer as u8)),
        ConvTarget::I2 => Value::I4(i32::from(integer as i16)),
        ConvTarget::U2 => Value::I4(i32::from(integer as u16)),
        ConvTarget::I4 | ConvTarget::U4 => Value::I4(integer as i32),
        ConvTarget::I8 | ConvTarget::U8 => Value::I8(integer as i64),
        ConvTarget::I | ConvTarget::U => Value::NativeInt(integer as i64),
        ConvTarget::R4 | ConvTarget::R8 | ConvTarget::RUn => Value::F(integer as f64),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_arithmetic_wraps_and_checks() {
        let domain = Domain::new().unwrap();
        assert_eq!(
            binary(&domain, BinaryOp::Add, &Value::I4(i32::MAX), &Value::I4(1)).unwrap(),
            Value::I4(i32::MIN)
        );
        assert!(matches!(
            binary(&domain, BinaryOp::AddOvf, &Value::I4(i32::MAX), &Value::I4(1)),
            Err(Error::Exception(_))
        ));
        assert!(matches!(
            binary(&domain, BinaryOp::Div, &Value::I4(1), &Value::I4(0)),
            Err(Error::Exception(_))
        ));
        assert_eq!(
            binary(&domain, BinaryOp::DivUn, &Value::I4(-2), &Value::I4(2)).unwrap(),
            Value::I4(0x7fff_ffff)
        );
        assert_eq!(
            binary(&domain, BinaryOp::Add, &Value::NativeInt(2), &Value::I4(3)).unwrap(),
            Value::NativeInt(5)
        );
    }

    #[test]
    fn comparisons() {
        assert_eq!(compare(&Value::I4(-1), &Value::I4(1), false).unwrap(), Some(Ordering::Less));
        assert_eq!(compare(&Value::I4(-1), &Value::I4(1), true).unwrap(), Some(Ordering::Greater));
        assert_eq!(compare(&Value::F(f64::NAN), &Value::F(1.0), false).unwrap(), None);
        assert_eq!(compare(&Value::Null, &Value::Null, false).unwrap(), Some(Ordering::Equal));
    }

    #[test]
    fn conversions() {
        let domain = Domain::new().unwrap();
        assert_eq!(
            convert(&domain, &Value::I4(300), ConvTarget::U1, false, false).unwrap(),
            Value::I4(44)
        );
        assert!(convert(&domain, &Value::I4(300), ConvTarget::U1, true, false).is_err());
        assert_eq!(
            convert(&domain, &Value::I4(-1), ConvTarget::I8, false, true).unwrap(),
            Value::I8(0xffff_ffff)
        );
        assert_eq!(
            convert(&domain, &Value::F(-2.7), ConvTarget::I4, false, false).unwrap(),
            Value::I4(-2)
        );
        assert_eq!(
            convert(&domain, &Value::I4(-1), ConvTarget::RUn, false, false).unwrap(),
            Value::F(4_294_967_295.0)
        );
    }

    #[test]
    fn shifts() {
        assert_eq!(shift(ShiftOp::ShrUn, &Value::I4(-1), &Value::I4(28)).unwrap(), Value::I4(15));
        assert_eq!(shift(ShiftOp::Shr, &Value::I4(-16), &Value::I4(2)).unwrap(), Value::I4(-4));
        assert_eq!(shift(ShiftOp::Shl, &Value::I8(1), &Value::I4(40)).unwrap(), Value::I8(1 << 40));
    }
}
