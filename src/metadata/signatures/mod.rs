//! Method, field, property and local signatures and their blob encoding.
//!
//! Signatures in an image embed `TypeDefOrRef` tokens; the parser and encoder translate
//! between those tokens and [`crate::metadata::typesystem::TypeReference`] values through the
//! [`TypeTokenResolver`] and [`TypeTokenAllocator`] seams, which the image reader and writer
//! implement over their reference tables.
//!
//! # References
//!
//! - ECMA-335 6th Edition, Partition II, Section 23.2 - Blobs and Signatures

mod encoders;
mod parser;
mod types;

pub use encoders::SignatureEncoder;
pub use parser::SignatureParser;
pub use types::{CallingConvention, MethodSignature, SIGNATURE};

use crate::{
    metadata::{token::Token, typesystem::TypeReference},
    Result,
};

/// Maps `TypeDefOrRef` tokens found in blobs to symbolic references.
pub trait TypeTokenResolver {
    /// Look up the type addressed by `token`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for dangling tokens.
    fn resolve_type_token(&self, token: Token) -> Result<TypeReference>;
}

/// Allocates `TypeDefOrRef` tokens for named types while encoding blobs.
pub trait TypeTokenAllocator {
    /// Return the token for `ty`, adding a row if needed.
    ///
    /// # Errors
    /// Implementation specific.
    fn allocate_type_token(&mut self, ty: &TypeReference) -> Result<Token>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{
        token::TABLE,
        typesystem::{AssemblyName, GenericOwner, PrimitiveType},
    };

    #[derive(Default)]
    struct Table(Vec<TypeReference>);

    impl TypeTokenResolver for Table {
        fn resolve_type_token(&self, token: Token) -> Result<TypeReference> {
            token
                .index()
                .and_then(|i| self.0.get(i).cloned())
                .ok_or_else(|| malformed_error!("dangling {}", token))
        }
    }

    impl TypeTokenAllocator for Table {
        fn allocate_type_token(&mut self, ty: &TypeReference) -> Result<Token> {
            let mut plain = ty.clone();
            if let TypeReference::Named(named) = &mut plain {
                named.is_value_type = false;
            }
            let row = match self.0.iter().position(|t| *t == plain) {
                Some(i) => i + 1,
                None => {
                    self.0.push(plain);
                    self.0.len()
                }
            };
            Ok(Token::from_parts(TABLE::TYPE_REF, row as u32))
        }
    }

    #[test]
    fn generic_method_signature_survives_encoding() {
        let list = TypeReference::external_class(AssemblyName::corlib(), "System.Collections.Generic", "List`1");
        let signature = MethodSignature::new_instance(
            TypeReference::GenericParameter {
                owner: GenericOwner::Method,
                position: 0,
            },
            vec![
                list.instantiate(vec![TypeReference::GenericParameter {
                    owner: GenericOwner::Type,
                    position: 1,
                }]),
                TypeReference::int32().by_ref(),
                TypeReference::string().vector(),
                TypeReference::Array {
                    element: Box::new(TypeReference::Primitive(PrimitiveType::R8)),
                    rank: 2,
                },
            ],
        )
        .with_generic_arity(1);

        let mut table = Table::default();
        let mut encoder = SignatureEncoder::new(&mut table);
        encoder.encode_method_signature(&signature).unwrap();
        let blob = encoder.finish();

        let decoded = SignatureParser::new(&blob, &table)
            .parse_method_signature()
            .unwrap();
        assert_eq!(decoded, signature);
    }

    #[test]
    fn value_type_flag_comes_from_element_code() {
        let point = TypeReference::named(
            crate::metadata::typesystem::ResolutionScope::Module("m".into()),
            "Geo",
            "Point",
            true,
        );
        let mut table = Table::default();
        let mut encoder = SignatureEncoder::new(&mut table);
        encoder.encode_field_signature(&point).unwrap();
        let blob = encoder.finish();
        assert_eq!(blob[1], ELEMENT_TYPE_VALUETYPE);

        let decoded = SignatureParser::new(&blob, &table)
            .parse_field_signature()
            .unwrap();
        assert_eq!(decoded, point);
    }

    const ELEMENT_TYPE_VALUETYPE: u8 = crate::metadata::typesystem::ELEMENT_TYPE::VALUETYPE;

    #[test]
    fn locals_with_pinned_entry() {
        let locals = vec![
            TypeReference::int32(),
            TypeReference::Pinned(Box::new(TypeReference::string().by_ref())),
        ];
        let mut table = Table::default();
        let mut encoder = SignatureEncoder::new(&mut table);
        encoder.encode_local_var_signature(&locals).unwrap();
        let blob = encoder.finish();
        assert_eq!(blob, vec![0x07, 0x02, 0x08, 0x45, 0x10, 0x0e]);
        assert_eq!(
            SignatureParser::new(&blob, &table)
                .parse_local_var_signature()
                .unwrap(),
            locals
        );
    }

    #[test]
    fn bad_lead_byte() {
        let table = Table::default();
        assert!(SignatureParser::new(&[0x07, 0x00], &table)
            .parse_field_signature()
            .is_err());
        assert!(SignatureParser::new(&[0x0F, 0x00, 0x01], &table)
            .parse_method_signature()
            .is_err());
    }
}
