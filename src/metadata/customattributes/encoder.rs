//! Custom attribute blob encoding, the inverse of
//! [`crate::metadata::customattributes::CustomAttributeParser`].

use crate::{
    file::writer::Writer,
    metadata::customattributes::{
        ArgumentType, CustomAttributeArgument, CustomAttributeNamedArgument, CustomAttributeValue,
        SERIALIZATION_TYPE,
    },
    Result,
};

/// Encode a complete attribute blob: prolog, fixed arguments, named arguments.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if a value does not fit its declared type or there are
/// more than `u16::MAX` named arguments.
pub fn encode_custom_attribute_value(value: &CustomAttributeValue) -> Result<Vec<u8>> {
    let mut writer = Writer::new();
    writer.write_le::<u16>(0x0001);
    for argument in &value.fixed_args {
        encode_value(&mut writer, argument)?;
    }

    let Ok(count) = u16::try_from(value.named_args.len()) else {
        return Err(malformed_error!("Too many named arguments - {}", value.named_args.len()));
    };
    writer.write_le::<u16>(count);
    for named in &value.named_args {
        encode_named_argument(&mut writer, named)?;
    }
    Ok(writer.into_inner())
}

/// Encode one named argument.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if the value does not fit the declared type.
pub fn encode_named_argument(writer: &mut Writer, named: &CustomAttributeNamedArgument) -> Result<()> {
    writer.write_le::<u8>(if named.is_field {
        SERIALIZATION_TYPE::FIELD
    } else {
        SERIALIZATION_TYPE::PROPERTY
    });
    encode_field_or_prop_type(writer, &named.arg_type)?;
    writer.write_ser_string(Some(&named.name))?;
    encode_checked(writer, &named.arg_type, &named.value)
}

fn encode_field_or_prop_type(writer: &mut Writer, arg_type: &ArgumentType) -> Result<()> {
    let code = match arg_type {
        ArgumentType::Boolean => SERIALIZATION_TYPE::BOOLEAN,
        ArgumentType::Char => SERIALIZATION_TYPE::CHAR,
        ArgumentType::I1 => SERIALIZATION_TYPE::I1,
        ArgumentType::U1 => SERIALIZATION_TYPE::U1,
        ArgumentType::I2 => SERIALIZATION_TYPE::I2,
        ArgumentType::U2 => SERIALIZATION_TYPE::U2,
        ArgumentType::I4 => SERIALIZATION_TYPE::I4,
        ArgumentType::U4 => SERIALIZATION_TYPE::U4,
        ArgumentType::I8 => SERIALIZATION_TYPE::I8,
        ArgumentType::U8 => SERIALIZATION_TYPE::U8,
        ArgumentType::R4 => SERIALIZATION_TYPE::R4,
        ArgumentType::R8 => SERIALIZATION_TYPE::R8,
        ArgumentType::String => SERIALIZATION_TYPE::STRING,
        ArgumentType::Type => SERIALIZATION_TYPE::TYPE,
        ArgumentType::Object => SERIALIZATION_TYPE::TAGGED_OBJECT,
        ArgumentType::Enum(name) => {
            writer.write_le::<u8>(SERIALIZATION_TYPE::ENUM);
            return writer.write_ser_string(Some(name));
        }
        ArgumentType::Array(element) => {
            writer.write_le::<u8>(SERIALIZATION_TYPE::SZARRAY);
            return encode_field_or_prop_type(writer, element);
        }
    };
    writer.write_le::<u8>(code);
    Ok(())
}

fn encode_checked(
    writer: &mut Writer,
    declared: &ArgumentType,
    value: &CustomAttributeArgument,
) -> Result<()> {
    let actual = value.argument_type();
    if *declared != actual {
        return Err(malformed_error!(
            "Attribute value of type {:?} stored in a slot of type {:?}",
            actual,
            declared
        ));
    }
    encode_value(writer, value)
}

fn encode_value(writer: &mut Writer, value: &CustomAttributeArgument) -> Result<()> {
    match value {
        CustomAttributeArgument::Bool(v) => writer.write_le::<u8>(u8::from(*v)),
        CustomAttributeArgument::Char(v) => writer.write_le::<u16>(*v),
        CustomAttributeArgument::I1(v) => writer.write_le::<i8>(*v),
        CustomAttributeArgument::U1(v) => writer.write_le::<u8>(*v),
        CustomAttributeArgument::I2(v) => writer.write_le::<i16>(*v),
        CustomAttributeArgument::U2(v) => writer.write_le::<u16>(*v),
        CustomAttributeArgument::I4(v) => writer.write_le::<i32>(*v),
        CustomAttributeArgument::U4(v) => writer.write_le::<u32>(*v),
        CustomAttributeArgument::I8(v) => writer.write_le::<i64>(*v),
        CustomAttributeArgument::U8(v) => writer.write_le::<u64>(*v),
        CustomAttributeArgument::R4(v) => writer.write_le::<f32>(*v),
        CustomAttributeArgument::R8(v) => writer.write_le::<f64>(*v),
        CustomAttributeArgument::String(v) | CustomAttributeArgument::Type(v) => {
            writer.write_ser_string(v.as_deref())?;
        }
        CustomAttributeArgument::Enum { value, .. } => encode_value(writer, value)?,
        CustomAttributeArgument::Array { element, values } => match values {
            None => writer.write_le::<u32>(u32::MAX),
            Some(values) => {
                let Ok(count) = u32::try_from(values.len()) else {
                    return Err(malformed_error!("Attribute array too long - {}", values.len()));
                };
                writer.write_le::<u32>(count);
                for item in values {
                    encode_checked(writer, element, item)?;
                }
            }
        },
        CustomAttributeArgument::Boxed(inner) => {
            encode_field_or_prop_type(writer, &inner.argument_type())?;
            encode_value(writer, inner)?;
        }
    }
    Ok(())
}
