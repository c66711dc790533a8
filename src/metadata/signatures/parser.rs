use crate::{
    file::parser::Parser,
    metadata::{
        signatures::{CallingConvention, MethodSignature, TypeTokenResolver, SIGNATURE},
        typesystem::{GenericOwner, PrimitiveType, TypeReference, ELEMENT_TYPE},
    },
    Error::RecursionLimit,
    Result,
};

/// Nesting bound for constructed types inside one blob.
const MAX_RECURSION_DEPTH: usize = 50;

/// Decoder for signature blobs that turns embedded tokens into symbolic references.
///
/// Use one parser per blob; the recursion counter is not reset between signatures.
pub struct SignatureParser<'a, 'r> {
    parser: Parser<'a>,
    tokens: &'r dyn TypeTokenResolver,
    depth: usize,
}

impl<'a, 'r> SignatureParser<'a, 'r> {
    /// Create a parser over `data` resolving `TypeDefOrRef` tokens through `tokens`.
    #[must_use]
    pub fn new(data: &'a [u8], tokens: &'r dyn TypeTokenResolver) -> Self {
        SignatureParser {
            parser: Parser::new(data),
            tokens,
            depth: 0,
        }
    }

    /// Parse a single type.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for unknown element codes,
    /// [`crate::Error::RecursionLimit`] for absurd nesting and whatever the token resolver
    /// reports for dangling tokens.
    pub fn parse_type(&mut self) -> Result<TypeReference> {
        self.depth += 1;
        if self.depth >= MAX_RECURSION_DEPTH {
            return Err(RecursionLimit(MAX_RECURSION_DEPTH));
        }

        let current_byte = self.parser.read_le::<u8>()?;
        let parsed = match current_byte {
            ELEMENT_TYPE::PTR => TypeReference::Pointer(Box::new(self.parse_type()?)),
            ELEMENT_TYPE::BYREF => TypeReference::ByRef(Box::new(self.parse_type()?)),
            ELEMENT_TYPE::VALUETYPE | ELEMENT_TYPE::CLASS => {
                self.parse_type_token(current_byte == ELEMENT_TYPE::VALUETYPE)?
            }
            ELEMENT_TYPE::VAR => TypeReference::GenericParameter {
                owner: GenericOwner::Type,
                position: self.read_position()?,
            },
            ELEMENT_TYPE::MVAR => TypeReference::GenericParameter {
                owner: GenericOwner::Method,
                position: self.read_position()?,
            },
            ELEMENT_TYPE::ARRAY => {
                let element = self.parse_type()?;
                let rank = self.parser.read_compressed_uint()?;

                // Sizes and lower bounds are not part of the modeled shape.
                let num_sizes = self.parser.read_compressed_uint()?;
                for _ in 0..num_sizes {
                    self.parser.read_compressed_uint()?;
                }
                let num_lo_bounds = self.parser.read_compressed_uint()?;
                for _ in 0..num_lo_bounds {
                    self.parser.read_compressed_int()?;
                }

                TypeReference::Array {
                    element: Box::new(element),
                    rank,
                }
            }
            ELEMENT_TYPE::GENERICINST => {
                let peek_byte = self.parser.peek_byte()?;
                if peek_byte != ELEMENT_TYPE::CLASS && peek_byte != ELEMENT_TYPE::VALUETYPE {
                    return Err(malformed_error!(
                        "GENERICINST - Next byte is not TYPE_CLASS or TYPE_VALUE - {}",
                        peek_byte
                    ));
                }

                let element = self.parse_type()?;
                let arg_count = self.parser.read_compressed_uint()?;
                let mut arguments = Vec::with_capacity(arg_count as usize);
                for _ in 0..arg_count {
                    arguments.push(self.parse_type()?);
                }

                TypeReference::GenericInstance {
                    element: Box::new(element),
                    arguments,
                }
            }
            ELEMENT_TYPE::FNPTR => {
                TypeReference::FunctionPointer(Box::new(self.parse_method_signature()?))
            }
            ELEMENT_TYPE::SZARRAY => TypeReference::Vector(Box::new(self.parse_type()?)),
            ELEMENT_TYPE::CMOD_REQD => {
                let modifier = self.parse_type_token(false)?;
                TypeReference::ModifierRequired {
                    modifier: Box::new(modifier),
                    element: Box::new(self.parse_type()?),
                }
            }
            ELEMENT_TYPE::CMOD_OPT => {
                let modifier = self.parse_type_token(false)?;
                TypeReference::ModifierOptional {
                    modifier: Box::new(modifier),
                    element: Box::new(self.parse_type()?),
                }
            }
            ELEMENT_TYPE::SENTINEL => TypeReference::Sentinel,
            ELEMENT_TYPE::PINNED => TypeReference::Pinned(Box::new(self.parse_type()?)),
            code => match PrimitiveType::from_element_type(code) {
                Some(primitive) => TypeReference::Primitive(primitive),
                None => return Err(malformed_error!("Unsupported ELEMENT_TYPE - {}", code)),
            },
        };

        self.depth -= 1;
        Ok(parsed)
    }

    fn read_position(&mut self) -> Result<u16> {
        let position = self.parser.read_compressed_uint()?;
        u16::try_from(position)
            .map_err(|_| malformed_error!("Generic parameter position too large - {}", position))
    }

    fn parse_type_token(&mut self, is_value_type: bool) -> Result<TypeReference> {
        let token = self.parser.read_compressed_token()?;
        let mut resolved = self.tokens.resolve_type_token(token)?;
        if let TypeReference::Named(named) = &mut resolved {
            named.is_value_type = is_value_type;
        }
        Ok(resolved)
    }

    /// Parse a `MethodDefSig`, `MethodRefSig` or `StandAloneMethodSig`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the lead byte is not a method calling convention.
    pub fn parse_method_signature(&mut self) -> Result<MethodSignature> {
        let lead = self.parser.read_le::<u8>()?;
        let Some(convention) = CallingConvention::from_bits(lead) else {
            return Err(malformed_error!(
                "Invalid method signature calling convention - {}",
                lead
            ));
        };

        let generic_arity = if lead & SIGNATURE::GENERIC != 0 {
            self.parser.read_compressed_uint()?
        } else {
            0
        };

        let param_count = self.parser.read_compressed_uint()?;
        let return_type = self.parse_type()?;
        let mut parameters = Vec::with_capacity(param_count as usize);
        while parameters
            .iter()
            .filter(|p| !matches!(p, TypeReference::Sentinel))
            .count()
            < param_count as usize
        {
            parameters.push(self.parse_type()?);
        }

        Ok(MethodSignature {
            has_this: lead & SIGNATURE::HAS_THIS != 0,
            explicit_this: lead & SIGNATURE::EXPLICIT_THIS != 0,
            convention,
            generic_arity,
            return_type,
            parameters,
        })
    }

    /// Parse a `FieldSig`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the lead byte is not `FIELD`.
    pub fn parse_field_signature(&mut self) -> Result<TypeReference> {
        let lead = self.parser.read_le::<u8>()?;
        if lead != SIGNATURE::FIELD {
            return Err(malformed_error!("Invalid field signature lead - {}", lead));
        }
        self.parse_type()
    }

    /// Parse a `PropertySig`, returning `(has_this, property type, index parameters)`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the lead byte is not `PROPERTY`.
    pub fn parse_property_signature(
        &mut self,
    ) -> Result<(bool, TypeReference, Vec<TypeReference>)> {
        let lead = self.parser.read_le::<u8>()?;
        if lead & SIGNATURE::KIND_MASK != SIGNATURE::PROPERTY {
            return Err(malformed_error!("Invalid property signature lead - {}", lead));
        }

        let count = self.parser.read_compressed_uint()?;
        let property_type = self.parse_type()?;
        let mut parameters = Vec::with_capacity(count as usize);
        for _ in 0..count {
            parameters.push(self.parse_type()?);
        }

        Ok((lead & SIGNATURE::HAS_THIS != 0, property_type, parameters))
    }

    /// Parse a `LocalVarSig`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the lead byte is not `LOCAL_SIG`.
    pub fn parse_local_var_signature(&mut self) -> Result<Vec<TypeReference>> {
        let lead = self.parser.read_le::<u8>()?;
        if lead != SIGNATURE::LOCAL_SIG {
            return Err(malformed_error!("Invalid local signature lead - {}", lead));
        }

        let count = self.parser.read_compressed_uint()?;
        let mut locals = Vec::with_capacity(count as usize);
        for _ in 0..count {
            locals.push(self.parse_type()?);
        }
        Ok(locals)
    }

    /// Parse a `MethodSpec` instantiation blob.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the lead byte is not `GENERIC_INST`.
    pub fn parse_method_spec_signature(&mut self) -> Result<Vec<TypeReference>> {
        let lead = self.parser.read_le::<u8>()?;
        if lead != SIGNATURE::GENERIC_INST {
            return Err(malformed_error!("Invalid method spec lead - {}", lead));
        }

        let count = self.parser.read_compressed_uint()?;
        let mut arguments = Vec::with_capacity(count as usize);
        for _ in 0..count {
            arguments.push(self.parse_type()?);
        }
        Ok(arguments)
    }
}
