//! Method body encoding (ECMA-335 II.25.4).
//!
//! A body starts with either a one-byte tiny header or a twelve-byte fat header, followed by
//! the code and, for fat bodies, 4-aligned extra data sections carrying exception-handling
//! clauses. The writer only produces fat EH sections; the reader accepts both small and fat
//! sections.

use crate::{
    disassembler::{decode_code, encode_instructions, DecodedCode, EncodedCode, TokenProvider},
    file::{parser::Parser, writer::Writer},
    metadata::{
        image::tables::{ReferenceTables, TableBuilder},
        method::{ExceptionHandler, ExceptionHandlerFlags, MethodBody},
        signatures::TypeTokenResolver,
        token::Token,
    },
    Result,
};

const TINY_FORMAT: u8 = 0x2;
const FAT_FORMAT: u16 = 0x3;
const FORMAT_MASK: u8 = 0x3;
const MORE_SECTS: u16 = 0x8;
const INIT_LOCALS: u16 = 0x10;
const FAT_HEADER_DWORDS: u16 = 3;

const SECTION_EH_TABLE: u8 = 0x01;
const SECTION_FAT_FORMAT: u8 = 0x40;
const SECTION_MORE_SECTS: u8 = 0x80;

const SMALL_CLAUSE_SIZE: usize = 12;
const FAT_CLAUSE_SIZE: usize = 24;

fn uses_tiny_header(body: &MethodBody, code_size: usize) -> bool {
    code_size < 64
        && body.max_stack == 8
        && body.init_locals
        && body.locals.is_empty()
        && body.exception_handlers.is_empty()
}

/// Encode a body, allocating tokens for every operand, the locals and the caught types.
///
/// # Errors
/// Returns encoder errors and [`crate::Error::Malformed`] for handler boundaries past the end
/// of the body.
pub fn encode_body(body: &MethodBody, tables: &mut TableBuilder) -> Result<Vec<u8>> {
    let encoded = encode_instructions(&body.instructions, tables)?;
    let code_size = encoded.code.len();
    let mut writer = Writer::new();

    if uses_tiny_header(body, code_size) {
        writer.write_le::<u8>(((code_size as u8) << 2) | TINY_FORMAT);
        writer.write_bytes(&encoded.code);
        return Ok(writer.into_inner());
    }

    let mut flags = FAT_FORMAT | (FAT_HEADER_DWORDS << 12);
    if !body.exception_handlers.is_empty() {
        flags |= MORE_SECTS;
    }
    if body.init_locals {
        flags |= INIT_LOCALS;
    }
    let locals = if body.locals.is_empty() {
        Token::new(0)
    } else {
        tables.locals_token(&body.locals)?
    };

    writer.write_le::<u16>(flags);
    writer.write_le::<u16>(body.max_stack);
    writer.write_le::<u32>(u32::try_from(code_size).map_err(|_| malformed_error!("Method body too large"))?);
    writer.write_le::<u32>(locals.value());
    writer.write_bytes(&encoded.code);

    if !body.exception_handlers.is_empty() {
        writer.align(4);
        write_eh_section(&mut writer, body, &encoded, tables)?;
    }
    Ok(writer.into_inner())
}

fn write_eh_section(
    writer: &mut Writer,
    body: &MethodBody,
    encoded: &EncodedCode,
    tables: &mut TableBuilder,
) -> Result<()> {
    let size = 4 + FAT_CLAUSE_SIZE * body.exception_handlers.len();
    if size > 0x00FF_FFFF {
        return Err(malformed_error!("Too many exception clauses - {}", body.exception_handlers.len()));
    }
    writer.write_le::<u8>(SECTION_EH_TABLE | SECTION_FAT_FORMAT);
    writer.write_le::<u8>(size as u8);
    writer.write_le::<u16>((size >> 8) as u16);

    for handler in &body.exception_handlers {
        let try_start = encoded.offset_of(handler.try_start)?;
        let try_end = encoded.offset_of(handler.try_end)?;
        let handler_start = encoded.offset_of(handler.handler_start)?;
        let handler_end = encoded.offset_of(handler.handler_end)?;
        if try_end < try_start || handler_end < handler_start {
            return Err(malformed_error!("Exception region ends before it starts"));
        }

        let class_or_filter = match (&handler.catch_type, handler.filter_start) {
            (_, Some(filter)) => encoded.offset_of(filter)?,
            (Some(catch_type), None) => tables.type_token(catch_type)?.value(),
            (None, None) => 0,
        };

        writer.write_le::<u32>(u32::from(handler.flags.bits()));
        writer.write_le::<u32>(try_start);
        writer.write_le::<u32>(try_end - try_start);
        writer.write_le::<u32>(handler_start);
        writer.write_le::<u32>(handler_end - handler_start);
        writer.write_le::<u32>(class_or_filter);
    }
    Ok(())
}

/// Decode a body against the image's reference tables.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for unknown header formats, damaged sections and
/// region boundaries that are not instruction boundaries, and
/// [`crate::Error::OutOfBounds`] for truncated data.
pub fn decode_body(data: &[u8], tables: &ReferenceTables) -> Result<MethodBody> {
    let mut parser = Parser::new(data);
    let first = parser.peek_byte()?;

    if first & FORMAT_MASK == TINY_FORMAT {
        parser.advance_by(1)?;
        let code = parser.read_bytes(usize::from(first >> 2))?;
        let decoded = decode_code(code, tables)?;
        return Ok(MethodBody {
            instructions: decoded.instructions,
            ..MethodBody::default()
        });
    }

    let flags = parser.read_le::<u16>()?;
    if flags & u16::from(FORMAT_MASK) != FAT_FORMAT {
        return Err(malformed_error!("Invalid method header format - 0x{:02x}", first));
    }
    if flags >> 12 != FAT_HEADER_DWORDS {
        return Err(malformed_error!("Invalid fat header size - {}", flags >> 12));
    }
    let max_stack = parser.read_le::<u16>()?;
    let code_size = parser.read_le::<u32>()? as usize;
    let locals_token = Token::new(parser.read_le::<u32>()?);
    let code = parser.read_bytes(code_size)?;
    let decoded = decode_code(code, tables)?;

    let locals = if locals_token.is_null() {
        Vec::new()
    } else {
        tables.resolve_locals(locals_token)?
    };

    let mut exception_handlers = Vec::new();
    let mut more = flags & MORE_SECTS != 0;
    while more {
        parser.align(4)?;
        more = read_section(&mut parser, &decoded, tables, &mut exception_handlers)?;
    }

    Ok(MethodBody {
        max_stack,
        init_locals: flags & INIT_LOCALS != 0,
        locals,
        instructions: decoded.instructions,
        exception_handlers,
    })
}

/// Read one extra data section, returning whether another follows.
fn read_section(
    parser: &mut Parser,
    decoded: &DecodedCode,
    tables: &ReferenceTables,
    handlers: &mut Vec<ExceptionHandler>,
) -> Result<bool> {
    let kind = parser.read_le::<u8>()?;
    let is_fat = kind & SECTION_FAT_FORMAT != 0;
    let (size, clause_size) = if is_fat {
        let low = usize::from(parser.read_le::<u8>()?);
        let high = usize::from(parser.read_le::<u16>()?);
        (low | (high << 8), FAT_CLAUSE_SIZE)
    } else {
        let size = usize::from(parser.read_le::<u8>()?);
        parser.advance_by(2)?;
        (size, SMALL_CLAUSE_SIZE)
    };
    if size < 4 || (size - 4) % clause_size != 0 {
        return Err(malformed_error!("Invalid method section size - {}", size));
    }

    if kind & SECTION_EH_TABLE == 0 {
        parser.advance_by(size - 4)?;
        return Ok(kind & SECTION_MORE_SECTS != 0);
    }

    for _ in 0..(size - 4) / clause_size {
        let (flags, try_offset, try_length, handler_offset, handler_length) = if is_fat {
            (
                parser.read_le::<u32>()?,
                parser.read_le::<u32>()?,
                parser.read_le::<u32>()?,
                parser.read_le::<u32>()?,
                parser.read_le::<u32>()?,
            )
        } else {
            (
                u32::from(parser.read_le::<u16>()?),
                u32::from(parser.read_le::<u16>()?),
                u32::from(parser.read_le::<u8>()?),
                u32::from(parser.read_le::<u16>()?),
                u32::from(parser.read_le::<u8>()?),
            )
        };
        let class_or_filter = parser.read_le::<u32>()?;

        let flags = u16::try_from(flags)
            .ok()
            .and_then(ExceptionHandlerFlags::from_bits)
            .ok_or_else(|| malformed_error!("Invalid exception clause flags - 0x{:x}", flags))?;
        let boundary = |offset: u32, length: u32| -> Result<(usize, usize)> {
            let end = offset
                .checked_add(length)
                .ok_or_else(|| malformed_error!("Exception region overflows"))?;
            Ok((decoded.index_of(offset as usize)?, decoded.index_of(end as usize)?))
        };
        let (try_start, try_end) = boundary(try_offset, try_length)?;
        let (handler_start, handler_end) = boundary(handler_offset, handler_length)?;

        let mut handler = ExceptionHandler {
            flags,
            try_start,
            try_end,
            handler_start,
            handler_end,
            catch_type: None,
            filter_start: None,
        };
        if flags.contains(ExceptionHandlerFlags::FILTER) {
            handler.filter_start = Some(decoded.index_of(class_or_filter as usize)?);
        } else if flags.is_empty() {
            handler.catch_type = Some(tables.resolve_type_token(Token::new(class_or_filter))?);
        }
        handlers.push(handler);
    }

    Ok(kind & SECTION_MORE_SECTS != 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        disassembler::OpCode,
        metadata::{
            method::{HandlerKind, Instruction, Operand},
            streams::{Blob, Strings, UserStrings},
            typesystem::{AssemblyName, TypeReference},
        },
    };

    fn round_trip(body: &MethodBody) -> (Vec<u8>, MethodBody) {
        let mut tables = TableBuilder::new();
        let bytes = encode_body(body, &mut tables).unwrap();
        let encoded_tables = tables.encode_tables().unwrap();
        let strings = tables.strings.into_inner();
        let blobs = tables.blobs.into_inner();
        let user_strings = tables.user_strings.into_inner();
        let reader = ReferenceTables::parse(
            &encoded_tables,
            Strings::from(&strings).unwrap(),
            Blob::from(&blobs).unwrap(),
            UserStrings::from(&user_strings).unwrap(),
        )
        .unwrap();
        let decoded = decode_body(&bytes, &reader).unwrap();
        (bytes, decoded)
    }

    #[test]
    fn small_body_uses_tiny_header() {
        let body = MethodBody::new()
            .push(Instruction::new(OpCode::Ldstr, Operand::String("hi".into())))
            .push(Instruction::simple(OpCode::Ret));
        let (bytes, decoded) = round_trip(&body);
        assert_eq!(bytes[0] & FORMAT_MASK, TINY_FORMAT);
        assert_eq!(usize::from(bytes[0] >> 2), bytes.len() - 1);
        assert_eq!(decoded, body);
    }

    #[test]
    fn locals_and_handlers_use_fat_header() {
        let exception = TypeReference::external_class(AssemblyName::corlib(), "System", "Exception");
        let body = MethodBody::new()
            .max_stack(2)
            .local(TypeReference::int32())
            .push(Instruction::load_int32(1))
            .push(Instruction::store_local(0))
            .push(Instruction::new(OpCode::LeaveS, Operand::Target(6)))
            .push(Instruction::simple(OpCode::Pop))
            .push(Instruction::new(OpCode::LeaveS, Operand::Target(6)))
            .push(Instruction::simple(OpCode::Endfinally))
            .push(Instruction::simple(OpCode::Ret))
            .handler(ExceptionHandler::catch((0, 3), (3, 5), exception.clone()))
            .handler(ExceptionHandler::finally((0, 5), (5, 6)));

        let (bytes, decoded) = round_trip(&body);
        assert_eq!(bytes[0] & FORMAT_MASK, 0x3);
        assert_eq!(decoded, body);
        assert_eq!(decoded.exception_handlers[0].kind(), HandlerKind::Catch);
        assert_eq!(decoded.exception_handlers[0].catch_type, Some(exception));
        assert_eq!(decoded.exception_handlers[1].kind(), HandlerKind::Finally);
    }

    #[test]
    fn small_eh_section_is_read() {
        // fat header, 4 bytes of code (nop, nop, endfinally, ret), one small finally clause
        #[rustfmt::skip]
        let data = [
            0x1B, 0x30, 0x01, 0x00, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0xDC, 0x2A,
            0x01, 0x10, 0x00, 0x00,
            0x02, 0x00, 0x00, 0x00, 0x02, 0x02, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00,
        ];
        let mut tables = TableBuilder::new();
        let encoded_tables = tables.encode_tables().unwrap();
        let strings = tables.strings.into_inner();
        let blobs = tables.blobs.into_inner();
        let user_strings = tables.user_strings.into_inner();
        let reader = ReferenceTables::parse(
            &encoded_tables,
            Strings::from(&strings).unwrap(),
            Blob::from(&blobs).unwrap(),
            UserStrings::from(&user_strings).unwrap(),
        )
        .unwrap();

        let body = decode_body(&data, &reader).unwrap();
        assert_eq!(body.max_stack, 1);
        assert!(body.init_locals);
        assert_eq!(body.exception_handlers, vec![ExceptionHandler::finally((0, 2), (2, 3))]);
    }

    #[test]
    fn unknown_header_is_rejected() {
        let mut tables = TableBuilder::new();
        let encoded_tables = tables.encode_tables().unwrap();
        let strings = tables.strings.into_inner();
        let blobs = tables.blobs.into_inner();
        let user_strings = tables.user_strings.into_inner();
        let reader = ReferenceTables::parse(
            &encoded_tables,
            Strings::from(&strings).unwrap(),
            Blob::from(&blobs).unwrap(),
            UserStrings::from(&user_strings).unwrap(),
        )
        .unwrap();
        assert!(decode_body(&[0x01, 0x00], &reader).is_err());
        assert!(decode_body(&[], &reader).is_err());
    }
}
