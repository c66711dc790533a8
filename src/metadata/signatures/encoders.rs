use crate::{
    file::writer::Writer,
    metadata::{
        signatures::{MethodSignature, TypeTokenAllocator, SIGNATURE},
        typesystem::{GenericOwner, TypeReference, ELEMENT_TYPE},
    },
    Result,
};

/// Encoder for signature blobs; named types are turned into tokens by the allocator.
pub struct SignatureEncoder<'t> {
    writer: Writer,
    tokens: &'t mut dyn TypeTokenAllocator,
}

impl<'t> SignatureEncoder<'t> {
    /// Create an encoder that allocates `TypeDefOrRef` tokens through `tokens`.
    pub fn new(tokens: &'t mut dyn TypeTokenAllocator) -> Self {
        SignatureEncoder {
            writer: Writer::new(),
            tokens,
        }
    }

    /// Finish and return the blob.
    #[must_use]
    pub fn finish(self) -> Vec<u8> {
        self.writer.into_inner()
    }

    /// Encode one type.
    ///
    /// # Errors
    /// Propagates allocator failures and compression overflows.
    pub fn encode_type(&mut self, ty: &TypeReference) -> Result<()> {
        match ty {
            TypeReference::Primitive(primitive) => self.writer.write_le(primitive.element_type()),
            TypeReference::Named(named) => {
                self.writer.write_le(if named.is_value_type {
                    ELEMENT_TYPE::VALUETYPE
                } else {
                    ELEMENT_TYPE::CLASS
                });
                let token = self.tokens.allocate_type_token(ty)?;
                self.writer.write_compressed_token(token)?;
            }
            TypeReference::GenericParameter { owner, position } => {
                self.writer.write_le(match owner {
                    GenericOwner::Type => ELEMENT_TYPE::VAR,
                    GenericOwner::Method => ELEMENT_TYPE::MVAR,
                });
                self.writer.write_compressed_uint(u32::from(*position))?;
            }
            TypeReference::Vector(element) => {
                self.writer.write_le(ELEMENT_TYPE::SZARRAY);
                self.encode_type(element)?;
            }
            TypeReference::Array { element, rank } => {
                self.writer.write_le(ELEMENT_TYPE::ARRAY);
                self.encode_type(element)?;
                self.writer.write_compressed_uint(*rank)?;
                self.writer.write_compressed_uint(0)?;
                self.writer.write_compressed_uint(0)?;
            }
            TypeReference::Pointer(element) => {
                self.writer.write_le(ELEMENT_TYPE::PTR);
                self.encode_type(element)?;
            }
            TypeReference::ByRef(element) => {
                self.writer.write_le(ELEMENT_TYPE::BYREF);
                self.encode_type(element)?;
            }
            TypeReference::GenericInstance { element, arguments } => {
                if !matches!(element.as_ref(), TypeReference::Named(_)) {
                    return Err(malformed_error!(
                        "Generic instance over non-named type - {}",
                        element
                    ));
                }
                self.writer.write_le(ELEMENT_TYPE::GENERICINST);
                self.encode_type(element)?;
                self.writer.write_compressed_uint(arguments.len() as u32)?;
                for argument in arguments {
                    self.encode_type(argument)?;
                }
            }
            TypeReference::FunctionPointer(signature) => {
                self.writer.write_le(ELEMENT_TYPE::FNPTR);
                self.encode_method_signature(signature)?;
            }
            TypeReference::Pinned(element) => {
                self.writer.write_le(ELEMENT_TYPE::PINNED);
                self.encode_type(element)?;
            }
            TypeReference::ModifierRequired { modifier, element }
            | TypeReference::ModifierOptional { modifier, element } => {
                self.writer
                    .write_le(if matches!(ty, TypeReference::ModifierRequired { .. }) {
                        ELEMENT_TYPE::CMOD_REQD
                    } else {
                        ELEMENT_TYPE::CMOD_OPT
                    });
                let token = self.tokens.allocate_type_token(modifier)?;
                self.writer.write_compressed_token(token)?;
                self.encode_type(element)?;
            }
            TypeReference::Sentinel => self.writer.write_le(ELEMENT_TYPE::SENTINEL),
        }
        Ok(())
    }

    /// Encode a method signature.
    ///
    /// # Errors
    /// See [`SignatureEncoder::encode_type`].
    pub fn encode_method_signature(&mut self, signature: &MethodSignature) -> Result<()> {
        let mut lead = signature.convention.bits();
        if signature.has_this {
            lead |= SIGNATURE::HAS_THIS;
        }
        if signature.explicit_this {
            lead |= SIGNATURE::EXPLICIT_THIS;
        }
        if signature.generic_arity > 0 {
            lead |= SIGNATURE::GENERIC;
        }
        self.writer.write_le(lead);

        if signature.generic_arity > 0 {
            self.writer.write_compressed_uint(signature.generic_arity)?;
        }

        let count = signature
            .parameters
            .iter()
            .filter(|p| !matches!(p, TypeReference::Sentinel))
            .count();
        self.writer.write_compressed_uint(count as u32)?;
        self.encode_type(&signature.return_type)?;
        for parameter in &signature.parameters {
            self.encode_type(parameter)?;
        }
        Ok(())
    }

    /// Encode a field signature.
    ///
    /// # Errors
    /// See [`SignatureEncoder::encode_type`].
    pub fn encode_field_signature(&mut self, field_type: &TypeReference) -> Result<()> {
        self.writer.write_le(SIGNATURE::FIELD);
        self.encode_type(field_type)
    }

    /// Encode a property signature.
    ///
    /// # Errors
    /// See [`SignatureEncoder::encode_type`].
    pub fn encode_property_signature(
        &mut self,
        has_this: bool,
        property_type: &TypeReference,
        parameters: &[TypeReference],
    ) -> Result<()> {
        let mut lead = SIGNATURE::PROPERTY;
        if has_this {
            lead |= SIGNATURE::HAS_THIS;
        }
        self.writer.write_le(lead);
        self.writer.write_compressed_uint(parameters.len() as u32)?;
        self.encode_type(property_type)?;
        for parameter in parameters {
            self.encode_type(parameter)?;
        }
        Ok(())
    }

    /// Encode a locals signature.
    ///
    /// # Errors
    /// See [`SignatureEncoder::encode_type`].
    pub fn encode_local_var_signature(&mut self, locals: &[TypeReference]) -> Result<()> {
        self.writer.write_le(SIGNATURE::LOCAL_SIG);
        self.writer.write_compressed_uint(locals.len() as u32)?;
        for local in locals {
            self.encode_type(local)?;
        }
        Ok(())
    }

    /// Encode a method instantiation.
    ///
    /// # Errors
    /// See [`SignatureEncoder::encode_type`].
    pub fn encode_method_spec_signature(&mut self, arguments: &[TypeReference]) -> Result<()> {
        self.writer.write_le(SIGNATURE::GENERIC_INST);
        self.writer.write_compressed_uint(arguments.len() as u32)?;
        for argument in arguments {
            self.encode_type(argument)?;
        }
        Ok(())
    }
}
