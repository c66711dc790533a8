//! Reference tables of a module image.
//!
//! Every reference from IL, signatures and definitions to a type or member goes through one
//! of these tables:
//!
//! | Table | Row |
//! |---|---|
//! | `AssemblyRef` | name, version, culture, public key |
//! | `ModuleRef` | module name |
//! | `TypeRef` | resolution scope token, namespace, name, value-type flag |
//! | `TypeSpec` | signature blob of a constructed type |
//! | `MemberRef` | parent type token, name, field or method signature blob |
//! | `MethodSpec` | generic method token, instantiation blob |
//! | `StandAloneSig` | call-site or locals signature blob |
//!
//! [`TableBuilder`] allocates rows (deduplicated) while the image writer walks the static
//! model; [`ReferenceTables`] decodes them back into symbolic references.

use std::collections::HashMap;

use crate::{
    disassembler::{TokenProvider, TokenResolver},
    file::{parser::Parser, writer::Writer},
    metadata::{
        members::{FieldReference, MemberReference, MethodReference},
        signatures::{
            MethodSignature, SignatureEncoder, SignatureParser, TypeTokenAllocator,
            TypeTokenResolver, SIGNATURE,
        },
        streams::{Blob, BlobBuilder, Strings, StringsBuilder, UserStrings, UserStringsBuilder},
        token::{Token, TABLE},
        typesystem::{AssemblyName, AssemblyVersion, NamedType, ResolutionScope, TypeReference},
    },
    Result,
};

/// Order in which tables appear in the `#~` stream.
const TABLE_ORDER: [u8; 7] = [
    TABLE::ASSEMBLY_REF,
    TABLE::MODULE_REF,
    TABLE::TYPE_REF,
    TABLE::TYPE_SPEC,
    TABLE::MEMBER_REF,
    TABLE::METHOD_SPEC,
    TABLE::STAND_ALONE_SIG,
];

fn row_token(table: u8, index: usize) -> Result<Token> {
    let row = u32::try_from(index + 1)
        .ok()
        .filter(|row| *row <= 0x00FF_FFFF)
        .ok_or_else(|| malformed_error!("Table 0x{:02x} overflows the token range", table))?;
    Ok(Token::from_parts(table, row))
}

#[derive(Debug, Clone, Copy)]
struct TypeRefRow {
    scope: Token,
    namespace: u32,
    name: u32,
    is_value_type: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct MemberRefRow {
    parent: Token,
    name: u32,
    signature: u32,
}

/// Allocates reference rows and heap entries while an image is written.
#[derive(Default)]
pub struct TableBuilder {
    /// `#Strings`
    pub strings: StringsBuilder,
    /// `#Blob`
    pub blobs: BlobBuilder,
    /// `#US`
    pub user_strings: UserStringsBuilder,
    assembly_refs: Vec<AssemblyName>,
    assembly_ref_index: HashMap<AssemblyName, Token>,
    module_refs: Vec<String>,
    module_ref_index: HashMap<String, Token>,
    type_refs: Vec<TypeRefRow>,
    type_ref_index: HashMap<TypeReference, Token>,
    type_specs: Vec<u32>,
    type_spec_index: HashMap<TypeReference, Token>,
    member_refs: Vec<MemberRefRow>,
    member_ref_index: HashMap<MemberRefRow, Token>,
    method_specs: Vec<(Token, u32)>,
    method_spec_index: HashMap<(Token, u32), Token>,
    stand_alone_sigs: Vec<u32>,
    stand_alone_sig_index: HashMap<u32, Token>,
}

impl TableBuilder {
    /// An empty set of tables and heaps.
    #[must_use]
    pub fn new() -> Self {
        TableBuilder::default()
    }

    /// Add a signature-like blob built with a [`SignatureEncoder`].
    ///
    /// # Errors
    /// Propagates encoding errors.
    pub fn signature_blob(
        &mut self,
        encode: impl FnOnce(&mut SignatureEncoder<'_>) -> Result<()>,
    ) -> Result<u32> {
        let blob = {
            let mut encoder = SignatureEncoder::new(self);
            encode(&mut encoder)?;
            encoder.finish()
        };
        self.blobs.add(&blob)
    }

    fn assembly_ref(&mut self, assembly: &AssemblyName) -> Result<Token> {
        if let Some(token) = self.assembly_ref_index.get(assembly) {
            return Ok(*token);
        }
        self.strings.add(&assembly.name)?;
        if let Some(culture) = &assembly.culture {
            self.strings.add(culture)?;
        }
        if let Some(key) = &assembly.public_key {
            self.blobs.add(key)?;
        }
        let token = row_token(TABLE::ASSEMBLY_REF, self.assembly_refs.len())?;
        self.assembly_refs.push(assembly.clone());
        self.assembly_ref_index.insert(assembly.clone(), token);
        Ok(token)
    }

    fn module_ref(&mut self, module: &str) -> Result<Token> {
        if let Some(token) = self.module_ref_index.get(module) {
            return Ok(*token);
        }
        self.strings.add(module)?;
        let token = row_token(TABLE::MODULE_REF, self.module_refs.len())?;
        self.module_refs.push(module.to_string());
        self.module_ref_index.insert(module.to_string(), token);
        Ok(token)
    }

    fn type_ref(&mut self, ty: &TypeReference, named: &NamedType) -> Result<Token> {
        if let Some(token) = self.type_ref_index.get(ty) {
            return Ok(*token);
        }
        let scope = match &named.scope {
            ResolutionScope::Module(module) => self.module_ref(module)?,
            ResolutionScope::Assembly(assembly) => self.assembly_ref(assembly)?,
            ResolutionScope::Nested(outer) => self.type_token(outer)?,
        };
        if scope.table() == TABLE::TYPE_SPEC {
            return Err(malformed_error!("Nested type {} inside a constructed type", ty));
        }
        let row = TypeRefRow {
            scope,
            namespace: self.strings.add(&named.namespace)?,
            name: self.strings.add(&named.name)?,
            is_value_type: named.is_value_type,
        };
        let token = row_token(TABLE::TYPE_REF, self.type_refs.len())?;
        self.type_refs.push(row);
        self.type_ref_index.insert(ty.clone(), token);
        Ok(token)
    }

    fn type_spec(&mut self, ty: &TypeReference) -> Result<Token> {
        if let Some(token) = self.type_spec_index.get(ty) {
            return Ok(*token);
        }
        let blob = self.signature_blob(|encoder| encoder.encode_type(ty))?;
        let token = row_token(TABLE::TYPE_SPEC, self.type_specs.len())?;
        self.type_specs.push(blob);
        self.type_spec_index.insert(ty.clone(), token);
        Ok(token)
    }

    fn member_ref(&mut self, row: MemberRefRow) -> Result<Token> {
        if let Some(token) = self.member_ref_index.get(&row) {
            return Ok(*token);
        }
        let token = row_token(TABLE::MEMBER_REF, self.member_refs.len())?;
        self.member_refs.push(row);
        self.member_ref_index.insert(row, token);
        Ok(token)
    }

    fn stand_alone_sig(&mut self, blob: u32) -> Result<Token> {
        if let Some(token) = self.stand_alone_sig_index.get(&blob) {
            return Ok(*token);
        }
        let token = row_token(TABLE::STAND_ALONE_SIG, self.stand_alone_sigs.len())?;
        self.stand_alone_sigs.push(blob);
        self.stand_alone_sig_index.insert(blob, token);
        Ok(token)
    }

    /// `StandAloneSig` token for a locals signature.
    ///
    /// # Errors
    /// Propagates encoding errors.
    pub fn locals_token(&mut self, locals: &[TypeReference]) -> Result<Token> {
        let blob = self.signature_blob(|encoder| encoder.encode_local_var_signature(locals))?;
        self.stand_alone_sig(blob)
    }

    /// Serialize the `#~` stream.
    ///
    /// Must run after every row has been allocated; it adds nothing to the heaps.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if a string was never added to the heap.
    pub fn encode_tables(&mut self) -> Result<Vec<u8>> {
        let mut writer = Writer::new();
        for table in TABLE_ORDER {
            writer.write_le::<u8>(table);
            match table {
                TABLE::ASSEMBLY_REF => {
                    writer.write_le::<u32>(self.assembly_refs.len() as u32);
                    for assembly in &self.assembly_refs {
                        writer.write_le::<u32>(self.strings.add(&assembly.name)?);
                        writer.write_le::<u16>(assembly.version.major);
                        writer.write_le::<u16>(assembly.version.minor);
                        writer.write_le::<u16>(assembly.version.build);
                        writer.write_le::<u16>(assembly.version.revision);
                        let culture = match &assembly.culture {
                            Some(culture) => self.strings.add(culture)?,
                            None => 0,
                        };
                        writer.write_le::<u32>(culture);
                        let key = match &assembly.public_key {
                            Some(key) => self.blobs.add(key)?,
                            None => 0,
                        };
                        writer.write_le::<u32>(key);
                    }
                }
                TABLE::MODULE_REF => {
                    writer.write_le::<u32>(self.module_refs.len() as u32);
                    for module in &self.module_refs {
                        writer.write_le::<u32>(self.strings.add(module)?);
                    }
                }
                TABLE::TYPE_REF => {
                    writer.write_le::<u32>(self.type_refs.len() as u32);
                    for row in &self.type_refs {
                        writer.write_le::<u32>(row.scope.value());
                        writer.write_le::<u32>(row.namespace);
                        writer.write_le::<u32>(row.name);
                        writer.write_le::<u8>(u8::from(row.is_value_type));
                    }
                }
                TABLE::TYPE_SPEC => {
                    writer.write_le::<u32>(self.type_specs.len() as u32);
                    for blob in &self.type_specs {
                        writer.write_le::<u32>(*blob);
                    }
                }
                TABLE::MEMBER_REF => {
                    writer.write_le::<u32>(self.member_refs.len() as u32);
                    for row in &self.member_refs {
                        writer.write_le::<u32>(row.parent.value());
                        writer.write_le::<u32>(row.name);
                        writer.write_le::<u32>(row.signature);
                    }
                }
                TABLE::METHOD_SPEC => {
                    writer.write_le::<u32>(self.method_specs.len() as u32);
                    for (method, instantiation) in &self.method_specs {
                        writer.write_le::<u32>(method.value());
                        writer.write_le::<u32>(*instantiation);
                    }
                }
                _ => {
                    writer.write_le::<u32>(self.stand_alone_sigs.len() as u32);
                    for blob in &self.stand_alone_sigs {
                        writer.write_le::<u32>(*blob);
                    }
                }
            }
        }
        Ok(writer.into_inner())
    }
}

impl TypeTokenAllocator for TableBuilder {
    fn allocate_type_token(&mut self, ty: &TypeReference) -> Result<Token> {
        self.type_token(ty)
    }
}

impl TokenProvider for TableBuilder {
    fn type_token(&mut self, ty: &TypeReference) -> Result<Token> {
        match ty {
            TypeReference::Named(named) => self.type_ref(ty, named),
            _ => self.type_spec(ty),
        }
    }

    fn field_token(&mut self, field: &FieldReference) -> Result<Token> {
        let parent = self.type_token(&field.declaring)?;
        let name = self.strings.add(&field.name)?;
        let signature = self.signature_blob(|encoder| encoder.encode_field_signature(&field.field_type))?;
        self.member_ref(MemberRefRow {
            parent,
            name,
            signature,
        })
    }

    fn method_token(&mut self, method: &MethodReference) -> Result<Token> {
        let parent = self.type_token(&method.declaring)?;
        let name = self.strings.add(&method.name)?;
        let signature =
            self.signature_blob(|encoder| encoder.encode_method_signature(&method.signature))?;
        let token = self.member_ref(MemberRefRow {
            parent,
            name,
            signature,
        })?;
        if method.generic_arguments.is_empty() {
            return Ok(token);
        }

        let instantiation = self.signature_blob(|encoder| {
            encoder.encode_method_spec_signature(&method.generic_arguments)
        })?;
        if let Some(spec) = self.method_spec_index.get(&(token, instantiation)) {
            return Ok(*spec);
        }
        let spec = row_token(TABLE::METHOD_SPEC, self.method_specs.len())?;
        self.method_specs.push((token, instantiation));
        self.method_spec_index.insert((token, instantiation), spec);
        Ok(spec)
    }

    fn string_token(&mut self, value: &str) -> Result<Token> {
        Ok(Token::from_parts(TABLE::USER_STRING, self.user_strings.add(value)?))
    }

    fn signature_token(&mut self, signature: &MethodSignature) -> Result<Token> {
        let blob = self.signature_blob(|encoder| encoder.encode_method_signature(signature))?;
        self.stand_alone_sig(blob)
    }
}

/// Type rows decoded so far; `TypeSpec` blobs may only refer to `TypeRef` rows and earlier
/// `TypeSpec` rows.
struct TypeView<'t> {
    refs: &'t [TypeReference],
    specs: &'t [TypeReference],
}

impl TypeTokenResolver for TypeView<'_> {
    fn resolve_type_token(&self, token: Token) -> Result<TypeReference> {
        let rows = match token.table() {
            TABLE::TYPE_REF => self.refs,
            TABLE::TYPE_SPEC => self.specs,
            _ => return Err(malformed_error!("Token {} is not a type", token)),
        };
        token
            .index()
            .and_then(|index| rows.get(index))
            .cloned()
            .ok_or_else(|| malformed_error!("Dangling type token {}", token))
    }
}

/// The decoded reference tables and heaps of an image.
pub struct ReferenceTables<'a> {
    /// `#Strings`
    pub strings: Strings<'a>,
    /// `#Blob`
    pub blobs: Blob<'a>,
    user_strings: UserStrings<'a>,
    type_refs: Vec<TypeReference>,
    type_specs: Vec<TypeReference>,
    member_refs: Vec<MemberReference>,
    method_specs: Vec<MethodReference>,
    stand_alone_sigs: Vec<&'a [u8]>,
}

impl<'a> ReferenceTables<'a> {
    /// Decode the `#~` stream against the heaps.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for unknown tables, dangling tokens and damaged
    /// signatures, and [`crate::Error::OutOfBounds`] for truncated data.
    pub fn parse(tables: &'a [u8], strings: Strings<'a>, blobs: Blob<'a>, user_strings: UserStrings<'a>) -> Result<Self> {
        let mut parser = Parser::new(tables);
        let mut assembly_refs = Vec::new();
        let mut module_refs = Vec::new();
        let mut result = ReferenceTables {
            strings,
            blobs,
            user_strings,
            type_refs: Vec::new(),
            type_specs: Vec::new(),
            member_refs: Vec::new(),
            method_specs: Vec::new(),
            stand_alone_sigs: Vec::new(),
        };

        for expected in TABLE_ORDER {
            let table = parser.read_le::<u8>()?;
            if table != expected {
                return Err(malformed_error!("Expected table 0x{:02x}, found 0x{:02x}", expected, table));
            }
            let rows = parser.read_le::<u32>()? as usize;
            if rows > parser.remaining() {
                return Err(crate::Error::OutOfBounds);
            }

            for _ in 0..rows {
                match table {
                    TABLE::ASSEMBLY_REF => {
                        let name = result.string(parser.read_le::<u32>()?)?;
                        let version = AssemblyVersion::new(
                            parser.read_le::<u16>()?,
                            parser.read_le::<u16>()?,
                            parser.read_le::<u16>()?,
                            parser.read_le::<u16>()?,
                        );
                        let culture = match parser.read_le::<u32>()? {
                            0 => None,
                            index => Some(result.string(index)?),
                        };
                        let public_key = match parser.read_le::<u32>()? {
                            0 => None,
                            index => Some(result.blob(index)?.to_vec()),
                        };
                        assembly_refs.push(AssemblyName {
                            name,
                            version,
                            culture,
                            public_key,
                        });
                    }
                    TABLE::MODULE_REF => module_refs.push(result.string(parser.read_le::<u32>()?)?),
                    TABLE::TYPE_REF => {
                        let scope_token = Token::new(parser.read_le::<u32>()?);
                        let scope = result.scope(scope_token, &assembly_refs, &module_refs)?;
                        let namespace = result.string(parser.read_le::<u32>()?)?;
                        let name = result.string(parser.read_le::<u32>()?)?;
                        let is_value_type = parser.read_le::<u8>()? != 0;
                        result
                            .type_refs
                            .push(TypeReference::named(scope, namespace, name, is_value_type));
                    }
                    TABLE::TYPE_SPEC => {
                        let blob = result.blob(parser.read_le::<u32>()?)?;
                        let ty = {
                            let view = TypeView {
                                refs: &result.type_refs,
                                specs: &result.type_specs,
                            };
                            SignatureParser::new(blob, &view).parse_type()?
                        };
                        result.type_specs.push(ty);
                    }
                    TABLE::MEMBER_REF => {
                        let parent = Token::new(parser.read_le::<u32>()?);
                        let declaring = result.resolve_type(parent)?;
                        let name = result.string(parser.read_le::<u32>()?)?;
                        let blob = result.blob(parser.read_le::<u32>()?)?;
                        let member = if blob.first() == Some(&SIGNATURE::FIELD) {
                            let field_type = SignatureParser::new(blob, &result).parse_field_signature()?;
                            MemberReference::Field(FieldReference::new(declaring, name, field_type))
                        } else {
                            let signature = SignatureParser::new(blob, &result).parse_method_signature()?;
                            MemberReference::Method(MethodReference::new(declaring, name, signature))
                        };
                        result.member_refs.push(member);
                    }
                    TABLE::METHOD_SPEC => {
                        let method = result.resolve_method(Token::new(parser.read_le::<u32>()?))?;
                        let blob = result.blob(parser.read_le::<u32>()?)?;
                        let arguments = SignatureParser::new(blob, &result).parse_method_spec_signature()?;
                        result.method_specs.push(method.instantiate(arguments));
                    }
                    _ => {
                        let blob = result.blob(parser.read_le::<u32>()?)?;
                        result.stand_alone_sigs.push(blob);
                    }
                }
            }
        }

        Ok(result)
    }

    fn scope(&self, token: Token, assemblies: &[AssemblyName], modules: &[String]) -> Result<ResolutionScope> {
        let index = token
            .index()
            .ok_or_else(|| malformed_error!("Null resolution scope"))?;
        let dangling = || malformed_error!("Dangling resolution scope {}", token);
        Ok(match token.table() {
            TABLE::ASSEMBLY_REF => ResolutionScope::Assembly(assemblies.get(index).cloned().ok_or_else(dangling)?),
            TABLE::MODULE_REF => ResolutionScope::Module(modules.get(index).cloned().ok_or_else(dangling)?),
            TABLE::TYPE_REF => ResolutionScope::Nested(Box::new(self.type_refs.get(index).cloned().ok_or_else(dangling)?)),
            _ => return Err(malformed_error!("Invalid resolution scope {}", token)),
        })
    }

    /// An identifier from `#Strings`.
    ///
    /// # Errors
    /// See [`Strings::get`].
    pub fn string(&self, index: u32) -> Result<String> {
        Ok(self.strings.get(index as usize)?.to_string())
    }

    /// A value from `#Blob`.
    ///
    /// # Errors
    /// See [`Blob::get`].
    pub fn blob(&self, index: u32) -> Result<&'a [u8]> {
        self.blobs.get(index as usize)
    }

    /// Decode a locals signature token.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for dangling tokens and damaged signatures.
    pub fn resolve_locals(&self, token: Token) -> Result<Vec<TypeReference>> {
        let blob = self.stand_alone_blob(token)?;
        SignatureParser::new(blob, self).parse_local_var_signature()
    }

    fn stand_alone_blob(&self, token: Token) -> Result<&'a [u8]> {
        if token.table() != TABLE::STAND_ALONE_SIG {
            return Err(malformed_error!("Token {} is not a stand-alone signature", token));
        }
        token
            .index()
            .and_then(|index| self.stand_alone_sigs.get(index))
            .copied()
            .ok_or_else(|| malformed_error!("Dangling signature token {}", token))
    }
}

impl TypeTokenResolver for ReferenceTables<'_> {
    fn resolve_type_token(&self, token: Token) -> Result<TypeReference> {
        TypeView {
            refs: &self.type_refs,
            specs: &self.type_specs,
        }
        .resolve_type_token(token)
    }
}

impl TokenResolver for ReferenceTables<'_> {
    fn resolve_type(&self, token: Token) -> Result<TypeReference> {
        self.resolve_type_token(token)
    }

    fn resolve_field(&self, token: Token) -> Result<FieldReference> {
        match self.resolve_member(token)? {
            MemberReference::Field(field) => Ok(field),
            other => Err(malformed_error!("Token {} is not a field - {}", token, other)),
        }
    }

    fn resolve_method(&self, token: Token) -> Result<MethodReference> {
        match self.resolve_member(token)? {
            MemberReference::Method(method) => Ok(method),
            other => Err(malformed_error!("Token {} is not a method - {}", token, other)),
        }
    }

    fn resolve_member(&self, token: Token) -> Result<MemberReference> {
        let dangling = || malformed_error!("Dangling member token {}", token);
        match token.table() {
            TABLE::TYPE_REF | TABLE::TYPE_SPEC => Ok(MemberReference::Type(self.resolve_type_token(token)?)),
            TABLE::MEMBER_REF => token
                .index()
                .and_then(|index| self.member_refs.get(index))
                .cloned()
                .ok_or_else(dangling),
            TABLE::METHOD_SPEC => token
                .index()
                .and_then(|index| self.method_specs.get(index))
                .cloned()
                .map(MemberReference::Method)
                .ok_or_else(dangling),
            _ => Err(malformed_error!("Token {} is not a member", token)),
        }
    }

    fn resolve_string(&self, token: Token) -> Result<String> {
        if token.table() != TABLE::USER_STRING {
            return Err(malformed_error!("Token {} is not a user string", token));
        }
        self.user_strings.get(token.row() as usize)
    }

    fn resolve_signature(&self, token: Token) -> Result<MethodSignature> {
        let blob = self.stand_alone_blob(token)?;
        SignatureParser::new(blob, self).parse_method_signature()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::typesystem::GenericOwner;

    #[test]
    fn rows_are_deduplicated_and_decodable() {
        let list = TypeReference::external_class(AssemblyName::corlib(), "System.Collections.Generic", "List`1");
        let nested = TypeReference::nested(TypeReference::module_class("m.dll", "N", "Outer"), "Inner", true);
        let list_of_t = list.clone().instantiate(vec![TypeReference::GenericParameter {
            owner: GenericOwner::Method,
            position: 0,
        }]);
        let add = MethodReference::new(
            list_of_t.clone(),
            "Add",
            MethodSignature::new_instance(
                TypeReference::void(),
                vec![TypeReference::GenericParameter {
                    owner: GenericOwner::Type,
                    position: 0,
                }],
            ),
        );
        let generic_call = MethodReference::new(
            nested.clone(),
            "Make",
            MethodSignature::new_static(TypeReference::object(), vec![]).with_generic_arity(1),
        )
        .instantiate(vec![TypeReference::string()]);
        let field = FieldReference::new(nested.clone(), "count", TypeReference::int32());

        let mut builder = TableBuilder::new();
        let list_token = builder.type_token(&list).unwrap();
        assert_eq!(builder.type_token(&list).unwrap(), list_token);
        let nested_token = builder.type_token(&nested).unwrap();
        let spec_token = builder.type_token(&list_of_t).unwrap();
        assert_eq!(spec_token.table(), TABLE::TYPE_SPEC);
        let add_token = builder.method_token(&add).unwrap();
        let call_token = builder.method_token(&generic_call).unwrap();
        assert_eq!(call_token.table(), TABLE::METHOD_SPEC);
        let field_token = builder.field_token(&field).unwrap();
        let string_token = builder.string_token("hello").unwrap();
        let locals_token = builder.locals_token(&[TypeReference::int32(), list_of_t.clone()]).unwrap();

        let tables = builder.encode_tables().unwrap();
        let strings = builder.strings.into_inner();
        let blobs = builder.blobs.into_inner();
        let user_strings = builder.user_strings.into_inner();
        let decoded = ReferenceTables::parse(
            &tables,
            Strings::from(&strings).unwrap(),
            Blob::from(&blobs).unwrap(),
            UserStrings::from(&user_strings).unwrap(),
        )
        .unwrap();

        assert_eq!(decoded.resolve_type(list_token).unwrap(), list);
        assert_eq!(decoded.resolve_type(nested_token).unwrap(), nested);
        assert_eq!(decoded.resolve_type(spec_token).unwrap(), list_of_t);
        assert_eq!(decoded.resolve_method(add_token).unwrap(), add);
        assert_eq!(decoded.resolve_method(call_token).unwrap(), generic_call);
        assert_eq!(decoded.resolve_field(field_token).unwrap(), field);
        assert_eq!(decoded.resolve_string(string_token).unwrap(), "hello");
        assert_eq!(decoded.resolve_locals(locals_token).unwrap()[1], list_of_t);
        assert!(decoded.resolve_field(add_token).is_err());
        assert!(decoded.resolve_type(Token::from_parts(TABLE::TYPE_REF, 99)).is_err());
    }
}
