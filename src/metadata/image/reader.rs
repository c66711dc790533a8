use uguid::Guid;

use crate::{
    disassembler::TokenResolver,
    file::parser::Parser,
    metadata::{
        customattributes::CustomAttribute,
        definitions::{
            Constant, EventAttributes, EventDefinition, FieldAttributes, FieldDefinition,
            GenericParamAttributes, GenericParameterDefinition, MethodAttributes, MethodDefinition,
            MethodImplAttributes, ParamAttributes, ParameterDefinition, PropertyAttributes,
            PropertyDefinition, StaticAssembly, StaticModule, TypeAttributes, TypeDefinition,
        },
        image::{body::decode_body, tables::ReferenceTables, IMAGE_MAGIC, IMAGE_VERSION, NO_INDEX},
        resources::Resource,
        security::{PermissionSet, SecurityAction, SecurityDeclaration},
        signatures::{SignatureParser, TypeTokenResolver},
        streams::{Blob, StreamHeader, Strings, UserStrings},
        token::Token,
        typesystem::{AssemblyName, AssemblyVersion, TypeReference},
    },
    Error, Result,
};

/// Deepest nesting of type definitions accepted by the reader.
const MAX_NESTING: usize = 64;

/// Decode a module image.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for a wrong magic or version, missing streams, dangling
/// tokens and damaged blobs, [`crate::Error::OutOfBounds`] for truncated data and
/// [`crate::Error::RecursionLimit`] for absurdly deep type nesting.
pub fn read_image(data: &[u8]) -> Result<StaticAssembly> {
    let mut parser = Parser::new(data);
    if parser.read_bytes(IMAGE_MAGIC.len())? != IMAGE_MAGIC {
        return Err(malformed_error!("Not a module image"));
    }
    let version = parser.read_le::<u16>()?;
    if version != IMAGE_VERSION {
        return Err(malformed_error!("Unsupported image version - {}", version));
    }

    let stream_count = parser.read_le::<u16>()?;
    let mut headers = Vec::with_capacity(usize::from(stream_count));
    for _ in 0..stream_count {
        headers.push(StreamHeader::read(&mut parser)?);
    }
    let stream = |name: &str| -> Result<&[u8]> {
        let header = headers
            .iter()
            .find(|header| header.name == name)
            .ok_or_else(|| malformed_error!("Missing stream {}", name))?;
        let start = header.offset as usize;
        let end = start.checked_add(header.size as usize).ok_or(Error::OutOfBounds)?;
        data.get(start..end).ok_or(Error::OutOfBounds)
    };

    let tables = ReferenceTables::parse(
        stream("#~")?,
        Strings::from(stream("#Strings")?)?,
        Blob::from(stream("#Blob")?)?,
        UserStrings::from(stream("#US")?)?,
    )?;
    let mut defs = DefsReader {
        parser: Parser::new(stream("#Defs")?),
        tables: &tables,
    };
    let assembly = defs.assembly()?;

    log::debug!(
        "Read assembly {} with {} module(s)",
        assembly.name.name,
        assembly.modules.len()
    );
    Ok(assembly)
}

struct DefsReader<'a, 't> {
    parser: Parser<'a>,
    tables: &'t ReferenceTables<'a>,
}

impl<'a> DefsReader<'a, '_> {
    fn u8(&mut self) -> Result<u8> {
        self.parser.read_le::<u8>()
    }

    fn u16(&mut self) -> Result<u16> {
        self.parser.read_le::<u16>()
    }

    fn u32(&mut self) -> Result<u32> {
        self.parser.read_le::<u32>()
    }

    fn string(&mut self) -> Result<String> {
        let index = self.u32()?;
        self.tables.string(index)
    }

    fn blob(&mut self) -> Result<&'a [u8]> {
        let index = self.u32()?;
        self.tables.blob(index)
    }

    fn count(&mut self) -> Result<usize> {
        let count = self.u32()? as usize;
        // every entry takes at least one byte
        if count > self.parser.remaining() {
            return Err(Error::OutOfBounds);
        }
        Ok(count)
    }

    fn list<T>(&mut self, mut read: impl FnMut(&mut Self) -> Result<T>) -> Result<Vec<T>> {
        let count = self.count()?;
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            items.push(read(self)?);
        }
        Ok(items)
    }

    fn index(&mut self) -> Result<Option<usize>> {
        Ok(match self.u32()? {
            NO_INDEX => None,
            index => Some(index as usize),
        })
    }

    fn type_token(&mut self) -> Result<TypeReference> {
        let token = Token::new(self.u32()?);
        self.tables.resolve_type_token(token)
    }

    fn constant(&mut self) -> Result<Option<Constant>> {
        let element_type = self.u8()?;
        let data = self.blob()?;
        if element_type == 0 {
            return Ok(None);
        }
        Constant::decode(element_type, data).map(Some)
    }

    fn attributes(&mut self) -> Result<Vec<CustomAttribute>> {
        self.list(|reader| {
            let constructor = reader.tables.resolve_method(Token::new(reader.u32()?))?;
            let blob = reader.blob()?.to_vec();
            Ok(CustomAttribute { constructor, blob })
        })
    }

    fn security(&mut self) -> Result<Vec<SecurityDeclaration>> {
        self.list(|reader| {
            let action = SecurityAction::from(reader.u16()?);
            let permission_set = PermissionSet::parse(reader.blob()?)?;
            Ok(SecurityDeclaration::new(action, permission_set))
        })
    }

    fn assembly(&mut self) -> Result<StaticAssembly> {
        let name = self.string()?;
        let version = AssemblyVersion::new(self.u16()?, self.u16()?, self.u16()?, self.u16()?);
        let culture = Some(self.string()?).filter(|culture| !culture.is_empty());
        let public_key = Some(self.blob()?.to_vec()).filter(|key| !key.is_empty());
        let custom_attributes = self.attributes()?;
        let security = self.security()?;
        let modules = self.list(Self::module)?;

        Ok(StaticAssembly {
            name: AssemblyName {
                name,
                version,
                culture,
                public_key,
            },
            modules,
            custom_attributes,
            security,
        })
    }

    fn module(&mut self) -> Result<StaticModule> {
        let name = self.string()?;
        let mut mvid = [0u8; 16];
        mvid.copy_from_slice(self.parser.read_bytes(16)?);
        let custom_attributes = self.attributes()?;
        let resources = self.list(|reader| {
            let name = reader.string()?;
            let public = reader.u8()? != 0;
            let data = reader.blob()?.to_vec();
            Ok(Resource { name, public, data })
        })?;
        let types = self.list(|reader| reader.type_definition(0))?;

        Ok(StaticModule {
            name,
            mvid: Guid::from_bytes(mvid),
            types,
            resources,
            custom_attributes,
        })
    }

    fn type_definition(&mut self, depth: usize) -> Result<TypeDefinition> {
        if depth > MAX_NESTING {
            return Err(Error::RecursionLimit(MAX_NESTING));
        }

        let namespace = self.string()?;
        let name = self.string()?;
        let attributes = TypeAttributes::from_bits_retain(self.u32()?);
        let base_type = match Token::new(self.u32()?) {
            token if token.is_null() => None,
            token => Some(self.tables.resolve_type_token(token)?),
        };
        let interfaces = self.list(Self::type_token)?;
        let generic_parameters = self.generic_parameters()?;
        let packing_size = match (self.u8()?, self.u16()?) {
            (0, _) => None,
            (_, packing) => Some(packing),
        };
        let class_size = match (self.u8()?, self.u32()?) {
            (0, _) => None,
            (_, size) => Some(size),
        };
        let fields = self.list(Self::field)?;
        let methods = self.list(Self::method)?;
        let properties = self.list(Self::property)?;
        let events = self.list(Self::event)?;
        let custom_attributes = self.attributes()?;
        let security = self.security()?;
        let nested_types = self.list(|reader| reader.type_definition(depth + 1))?;

        let accessor_out_of_range = properties
            .iter()
            .flat_map(PropertyDefinition::accessors)
            .chain(events.iter().flat_map(EventDefinition::accessors))
            .any(|index| index >= methods.len());
        if accessor_out_of_range {
            return Err(malformed_error!("Accessor of {}.{} is not one of its methods", namespace, name));
        }

        Ok(TypeDefinition {
            namespace,
            name,
            attributes,
            base_type,
            interfaces,
            generic_parameters,
            fields,
            methods,
            properties,
            events,
            nested_types,
            custom_attributes,
            security,
            packing_size,
            class_size,
        })
    }

    fn generic_parameters(&mut self) -> Result<Vec<GenericParameterDefinition>> {
        self.list(|reader| {
            Ok(GenericParameterDefinition {
                name: reader.string()?,
                attributes: GenericParamAttributes::from_bits_retain(reader.u16()?),
                constraints: reader.list(Self::type_token)?,
                custom_attributes: reader.attributes()?,
            })
        })
    }

    fn field(&mut self) -> Result<FieldDefinition> {
        let name = self.string()?;
        let attributes = FieldAttributes::from_bits_retain(self.u16()?);
        let field_type = SignatureParser::new(self.blob()?, self.tables).parse_field_signature()?;
        Ok(FieldDefinition {
            name,
            attributes,
            field_type,
            constant: self.constant()?,
            custom_attributes: self.attributes()?,
        })
    }

    fn parameter(&mut self, name: String) -> Result<ParameterDefinition> {
        Ok(ParameterDefinition {
            name,
            attributes: ParamAttributes::from_bits_retain(self.u16()?),
            constant: self.constant()?,
            custom_attributes: self.attributes()?,
        })
    }

    fn method(&mut self) -> Result<MethodDefinition> {
        let name = self.string()?;
        let attributes = MethodAttributes::from_bits_retain(self.u16()?);
        let impl_attributes = MethodImplAttributes::from_bits_retain(self.u16()?);
        let signature = SignatureParser::new(self.blob()?, self.tables).parse_method_signature()?;
        let generic_parameters = self.generic_parameters()?;
        let parameters = self.list(|reader| {
            let name = reader.string()?;
            reader.parameter(name)
        })?;
        if parameters.len() != signature.parameters.len() {
            return Err(malformed_error!(
                "Method {} declares {} parameters for a signature with {}",
                name,
                parameters.len(),
                signature.parameters.len()
            ));
        }
        let return_parameter = self.parameter(String::new())?;
        let overrides = self.list(|reader| reader.tables.resolve_method(Token::new(reader.u32()?)))?;
        let body = match self.u32()? {
            0 => None,
            index => {
                let data = self.tables.blob(index)?;
                Some(decode_body(data, self.tables).inspect_err(|error| {
                    log::warn!("Cannot decode body of {}: {}", name, error);
                })?)
            }
        };

        Ok(MethodDefinition {
            name,
            attributes,
            impl_attributes,
            signature,
            parameters,
            return_parameter,
            generic_parameters,
            overrides,
            body,
            custom_attributes: self.attributes()?,
            security: self.security()?,
        })
    }

    fn property(&mut self) -> Result<PropertyDefinition> {
        let name = self.string()?;
        let attributes = PropertyAttributes::from_bits_retain(self.u16()?);
        let (has_this, property_type, parameters) =
            SignatureParser::new(self.blob()?, self.tables).parse_property_signature()?;
        Ok(PropertyDefinition {
            name,
            attributes,
            has_this,
            property_type,
            parameters,
            getter: self.index()?,
            setter: self.index()?,
            others: self.list(|reader| {
                reader
                    .index()?
                    .ok_or_else(|| malformed_error!("Missing property accessor index"))
            })?,
            constant: self.constant()?,
            custom_attributes: self.attributes()?,
        })
    }

    fn event(&mut self) -> Result<EventDefinition> {
        Ok(EventDefinition {
            name: self.string()?,
            attributes: EventAttributes::from_bits_retain(self.u16()?),
            event_type: self.type_token()?,
            add: self.index()?,
            remove: self.index()?,
            raise: self.index()?,
            others: self.list(|reader| {
                reader
                    .index()?
                    .ok_or_else(|| malformed_error!("Missing event accessor index"))
            })?,
            custom_attributes: self.attributes()?,
        })
    }
}
