use crate::{
    disassembler::TokenProvider,
    file::writer::Writer,
    metadata::{
        customattributes::CustomAttribute,
        definitions::{
            Constant, EventDefinition, FieldDefinition, GenericParameterDefinition, MethodDefinition,
            ParameterDefinition, PropertyDefinition, StaticAssembly, StaticModule, TypeDefinition,
        },
        image::{body::encode_body, tables::TableBuilder, IMAGE_MAGIC, IMAGE_VERSION, NO_INDEX},
        security::SecurityDeclaration,
        streams::StreamHeader,
        typesystem::TypeReference,
    },
    Result,
};

/// Encode `assembly` as a module image.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if a definition cannot be encoded, e.g. a branch out of
/// short-form range or a name containing NUL, and [`crate::Error::UnsupportedInstruction`] for
/// operands that do not fit their opcode.
pub fn write_image(assembly: &StaticAssembly) -> Result<Vec<u8>> {
    let mut defs = DefsWriter::default();
    defs.assembly(assembly)?;

    let DefsWriter { mut tables, out } = defs;
    let table_bytes = tables.encode_tables()?;
    let streams: [(&str, Vec<u8>); 5] = [
        ("#Strings", tables.strings.into_inner()),
        ("#US", tables.user_strings.into_inner()),
        ("#Blob", tables.blobs.into_inner()),
        ("#~", table_bytes),
        ("#Defs", out.into_inner()),
    ];

    let directory_size = 8 + streams
        .iter()
        .map(|(name, _)| StreamHeader::encoded_size(name))
        .sum::<usize>();
    let mut offset = directory_size;
    let mut headers = Vec::with_capacity(streams.len());
    for (name, data) in &streams {
        headers.push(StreamHeader {
            offset: u32::try_from(offset).map_err(|_| malformed_error!("Image too large"))?,
            size: u32::try_from(data.len()).map_err(|_| malformed_error!("Stream {} too large", name))?,
            name: (*name).to_string(),
        });
        offset = (offset + data.len()).next_multiple_of(4);
    }

    let mut writer = Writer::new();
    writer.write_bytes(&IMAGE_MAGIC);
    writer.write_le::<u16>(IMAGE_VERSION);
    writer.write_le::<u16>(streams.len() as u16);
    for header in &headers {
        header.write(&mut writer);
    }
    for (_, data) in &streams {
        writer.write_bytes(data);
        writer.align(4);
    }

    log::debug!(
        "Encoded assembly {} as a {} byte image",
        assembly.name.name,
        writer.pos()
    );
    Ok(writer.into_inner())
}

/// Serializes the definition tree into `#Defs` while allocating rows in the reference tables.
#[derive(Default)]
struct DefsWriter {
    tables: TableBuilder,
    out: Writer,
}

impl DefsWriter {
    fn string(&mut self, value: &str) -> Result<()> {
        let index = self.tables.strings.add(value)?;
        self.out.write_le::<u32>(index);
        Ok(())
    }

    fn blob(&mut self, value: &[u8]) -> Result<()> {
        let index = self.tables.blobs.add(value)?;
        self.out.write_le::<u32>(index);
        Ok(())
    }

    fn count(&mut self, len: usize) -> Result<()> {
        let len = u32::try_from(len).map_err(|_| malformed_error!("Too many entries - {}", len))?;
        self.out.write_le::<u32>(len);
        Ok(())
    }

    fn index(&mut self, index: Option<usize>) -> Result<()> {
        match index {
            Some(index) => {
                let index = u32::try_from(index)
                    .ok()
                    .filter(|i| *i != NO_INDEX)
                    .ok_or_else(|| malformed_error!("Accessor index too large - {}", index))?;
                self.out.write_le::<u32>(index);
            }
            None => self.out.write_le::<u32>(NO_INDEX),
        }
        Ok(())
    }

    fn type_token(&mut self, ty: &TypeReference) -> Result<()> {
        let token = self.tables.type_token(ty)?;
        self.out.write_le::<u32>(token.value());
        Ok(())
    }

    fn types(&mut self, types: &[TypeReference]) -> Result<()> {
        self.count(types.len())?;
        for ty in types {
            self.type_token(ty)?;
        }
        Ok(())
    }

    fn constant(&mut self, constant: Option<&Constant>) -> Result<()> {
        match constant {
            Some(constant) => {
                self.out.write_le::<u8>(constant.element_type());
                self.blob(&constant.encode())
            }
            None => {
                self.out.write_le::<u8>(0);
                self.out.write_le::<u32>(0);
                Ok(())
            }
        }
    }

    fn attributes(&mut self, attributes: &[CustomAttribute]) -> Result<()> {
        self.count(attributes.len())?;
        for attribute in attributes {
            let token = self.tables.method_token(&attribute.constructor)?;
            self.out.write_le::<u32>(token.value());
            self.blob(&attribute.blob)?;
        }
        Ok(())
    }

    fn security(&mut self, declarations: &[SecurityDeclaration]) -> Result<()> {
        self.count(declarations.len())?;
        for declaration in declarations {
            self.out.write_le::<u16>(declaration.action.value());
            self.blob(&declaration.permission_set.encode()?)?;
        }
        Ok(())
    }

    fn assembly(&mut self, assembly: &StaticAssembly) -> Result<()> {
        let name = &assembly.name;
        self.string(&name.name)?;
        self.out.write_le::<u16>(name.version.major);
        self.out.write_le::<u16>(name.version.minor);
        self.out.write_le::<u16>(name.version.build);
        self.out.write_le::<u16>(name.version.revision);
        self.string(name.culture.as_deref().unwrap_or_default())?;
        self.blob(name.public_key.as_deref().unwrap_or_default())?;
        self.attributes(&assembly.custom_attributes)?;
        self.security(&assembly.security)?;

        self.count(assembly.modules.len())?;
        for module in &assembly.modules {
            self.module(module)?;
        }
        Ok(())
    }

    fn module(&mut self, module: &StaticModule) -> Result<()> {
        self.string(&module.name)?;
        self.out.write_bytes(&module.mvid.to_bytes());
        self.attributes(&module.custom_attributes)?;

        self.count(module.resources.len())?;
        for resource in &module.resources {
            self.string(&resource.name)?;
            self.out.write_le::<u8>(u8::from(resource.public));
            self.blob(&resource.data)?;
        }

        self.count(module.types.len())?;
        for ty in &module.types {
            self.type_definition(ty)?;
        }
        Ok(())
    }

    fn type_definition(&mut self, ty: &TypeDefinition) -> Result<()> {
        self.string(&ty.namespace)?;
        self.string(&ty.name)?;
        self.out.write_le::<u32>(ty.attributes.bits());
        match &ty.base_type {
            Some(base) => self.type_token(base)?,
            None => self.out.write_le::<u32>(0),
        }
        self.types(&ty.interfaces)?;
        self.generic_parameters(&ty.generic_parameters)?;

        match ty.packing_size {
            Some(packing) => {
                self.out.write_le::<u8>(1);
                self.out.write_le::<u16>(packing);
            }
            None => {
                self.out.write_le::<u8>(0);
                self.out.write_le::<u16>(0);
            }
        }
        match ty.class_size {
            Some(size) => {
                self.out.write_le::<u8>(1);
                self.out.write_le::<u32>(size);
            }
            None => {
                self.out.write_le::<u8>(0);
                self.out.write_le::<u32>(0);
            }
        }

        self.count(ty.fields.len())?;
        for field in &ty.fields {
            self.field(field)?;
        }
        self.count(ty.methods.len())?;
        for method in &ty.methods {
            self.method(method)?;
        }
        self.count(ty.properties.len())?;
        for property in &ty.properties {
            self.property(property)?;
        }
        self.count(ty.events.len())?;
        for event in &ty.events {
            self.event(event)?;
        }
        self.attributes(&ty.custom_attributes)?;
        self.security(&ty.security)?;

        self.count(ty.nested_types.len())?;
        for nested in &ty.nested_types {
            self.type_definition(nested)?;
        }
        Ok(())
    }

    fn generic_parameters(&mut self, parameters: &[GenericParameterDefinition]) -> Result<()> {
        self.count(parameters.len())?;
        for parameter in parameters {
            self.string(&parameter.name)?;
            self.out.write_le::<u16>(parameter.attributes.bits());
            self.types(&parameter.constraints)?;
            self.attributes(&parameter.custom_attributes)?;
        }
        Ok(())
    }

    fn field(&mut self, field: &FieldDefinition) -> Result<()> {
        self.string(&field.name)?;
        self.out.write_le::<u16>(field.attributes.bits());
        let signature = self
            .tables
            .signature_blob(|encoder| encoder.encode_field_signature(&field.field_type))?;
        self.out.write_le::<u32>(signature);
        self.constant(field.constant.as_ref())?;
        self.attributes(&field.custom_attributes)
    }

    fn parameter(&mut self, parameter: &ParameterDefinition, named: bool) -> Result<()> {
        if named {
            self.string(&parameter.name)?;
        }
        self.out.write_le::<u16>(parameter.attributes.bits());
        self.constant(parameter.constant.as_ref())?;
        self.attributes(&parameter.custom_attributes)
    }

    fn method(&mut self, method: &MethodDefinition) -> Result<()> {
        self.string(&method.name)?;
        self.out.write_le::<u16>(method.attributes.bits());
        self.out.write_le::<u16>(method.impl_attributes.bits());
        let signature = self
            .tables
            .signature_blob(|encoder| encoder.encode_method_signature(&method.signature))?;
        self.out.write_le::<u32>(signature);
        self.generic_parameters(&method.generic_parameters)?;

        self.count(method.parameters.len())?;
        for parameter in &method.parameters {
            self.parameter(parameter, true)?;
        }
        self.parameter(&method.return_parameter, false)?;

        self.count(method.overrides.len())?;
        for overridden in &method.overrides {
            let token = self.tables.method_token(overridden)?;
            self.out.write_le::<u32>(token.value());
        }

        match &method.body {
            Some(body) => {
                let bytes = encode_body(body, &mut self.tables).inspect_err(|error| {
                    log::warn!("Cannot encode body of {}: {}", method.name, error);
                })?;
                self.blob(&bytes)?;
            }
            None => self.out.write_le::<u32>(0),
        }
        self.attributes(&method.custom_attributes)?;
        self.security(&method.security)
    }

    fn property(&mut self, property: &PropertyDefinition) -> Result<()> {
        self.string(&property.name)?;
        self.out.write_le::<u16>(property.attributes.bits());
        let signature = self.tables.signature_blob(|encoder| {
            encoder.encode_property_signature(
                property.has_this,
                &property.property_type,
                &property.parameters,
            )
        })?;
        self.out.write_le::<u32>(signature);
        self.index(property.getter)?;
        self.index(property.setter)?;
        self.count(property.others.len())?;
        for other in &property.others {
            self.index(Some(*other))?;
        }
        self.constant(property.constant.as_ref())?;
        self.attributes(&property.custom_attributes)
    }

    fn event(&mut self, event: &EventDefinition) -> Result<()> {
        self.string(&event.name)?;
        self.out.write_le::<u16>(event.attributes.bits());
        self.type_token(&event.event_type)?;
        self.index(event.add)?;
        self.index(event.remove)?;
        self.index(event.raise)?;
        self.count(event.others.len())?;
        for other in &event.others {
            self.index(Some(*other))?;
        }
        self.attributes(&event.custom_attributes)
    }
}
