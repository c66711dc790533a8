//! Custom attribute blobs to live attributes.
//!
//! A blob is decoded against its constructor reference, then every argument naming a type is
//! resolved. Type names travel as strings in the blob, so an argument counts as a type when
//! either its own serialization says so or the declared type of the constructor parameter,
//! field or property it binds to is `System.Type` or `System.Type[]`.
//!
//! Arguments bound to `object` or `object[]` keep their raw value unless the blob tags a lone
//! boxed value as a type. Strings inside an `object[]` are never reinterpreted, even when they
//! were meant as type names.

use log::trace;

use crate::{
    emit::{LiveArgument, LiveAttribute, LiveNamedArgument, RuntimeType},
    instrument::resolver::{GenericContext, SymbolResolver},
    metadata::{
        customattributes::{ArgumentType, CustomAttribute, CustomAttributeArgument},
        typesystem::TypeReference,
    },
    runtime::corlib,
    Result,
};

/// What an argument slot was declared as, as far as type names are concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Type,
    TypeArray,
    Other,
}

impl Slot {
    fn of_reference(declared: &TypeReference) -> Self {
        match declared {
            TypeReference::Vector(element) if element.is_named("System", "Type") => Slot::TypeArray,
            _ if declared.is_named("System", "Type") => Slot::Type,
            _ => Slot::Other,
        }
    }

    fn of_argument_type(declared: &ArgumentType) -> Self {
        match declared {
            ArgumentType::Type => Slot::Type,
            ArgumentType::Array(element) if **element == ArgumentType::Type => Slot::TypeArray,
            _ => Slot::Other,
        }
    }

    fn of_live(declared: &RuntimeType) -> Self {
        let ty = RuntimeType::Type(corlib::TYPE);
        match declared {
            RuntimeType::Vector(element) if **element == ty => Slot::TypeArray,
            _ if *declared == ty => Slot::Type,
            _ => Slot::Other,
        }
    }
}

/// Translates attached attributes for one build.
pub struct AttributeTranslator<'r, 'a> {
    resolver: &'r SymbolResolver<'a>,
}

impl<'r, 'a> AttributeTranslator<'r, 'a> {
    /// A translator resolving through `resolver`.
    #[must_use]
    pub fn new(resolver: &'r SymbolResolver<'a>) -> Self {
        AttributeTranslator { resolver }
    }

    /// Decode `attribute` and resolve its constructor and every type it names.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for damaged blobs and any resolution error of the
    /// constructor, of an enum type or of a type name.
    pub fn translate(&self, attribute: &CustomAttribute) -> Result<LiveAttribute> {
        let constructor = self
            .resolver
            .resolve_method(&attribute.constructor, &GenericContext::default())?;
        let value = attribute.decode(self.resolver)?;

        let fixed_args = attribute
            .constructor
            .signature
            .parameters
            .iter()
            .zip(value.fixed_args)
            .map(|(declared, argument)| self.argument(argument, Slot::of_reference(declared)))
            .collect::<Result<Vec<_>>>()?;

        let owner = constructor.owner.definition();
        let mut named_args = Vec::with_capacity(value.named_args.len());
        for named in value.named_args {
            let mut slot = Slot::of_argument_type(&named.arg_type);
            if slot == Slot::Other {
                if let Some(owner) = owner {
                    if let Some(declared) = self.resolver.member_type(owner, named.is_field, &named.name)? {
                        slot = Slot::of_live(&declared);
                    }
                }
            }
            named_args.push(LiveNamedArgument {
                is_field: named.is_field,
                name: named.name,
                value: self.argument(named.value, slot)?,
            });
        }

        trace!(
            "Attribute {} with {} fixed and {} named argument(s)",
            attribute.constructor.declaring,
            fixed_args.len(),
            named_args.len()
        );
        Ok(LiveAttribute {
            constructor,
            fixed_args,
            named_args,
        })
    }

    /// Translate every attribute of a list, in order.
    ///
    /// # Errors
    /// See [`AttributeTranslator::translate`].
    pub fn translate_all(&self, attributes: &[CustomAttribute]) -> Result<Vec<LiveAttribute>> {
        attributes.iter().map(|attribute| self.translate(attribute)).collect()
    }

    fn type_name(&self, name: Option<String>) -> Result<Option<RuntimeType>> {
        name.map(|name| self.resolver.resolve_type_name(&name)).transpose()
    }

    fn argument(&self, argument: CustomAttributeArgument, slot: Slot) -> Result<LiveArgument> {
        Ok(match (argument, slot) {
            (CustomAttributeArgument::Type(name), _)
            | (CustomAttributeArgument::String(name), Slot::Type) => LiveArgument::Type(self.type_name(name)?),
            (CustomAttributeArgument::Boxed(inner), _)
                if matches!(*inner, CustomAttributeArgument::Type(_)) =>
            {
                match *inner {
                    CustomAttributeArgument::Type(name) => LiveArgument::Type(self.type_name(name)?),
                    other => LiveArgument::Value(CustomAttributeArgument::Boxed(Box::new(other))),
                }
            }
            (CustomAttributeArgument::Array { element, values }, slot)
                if element == ArgumentType::Type
                    || (slot == Slot::TypeArray && element == ArgumentType::String) =>
            {
                let values = values
                    .map(|values| {
                        values
                            .into_iter()
                            .map(|value| match value {
                                CustomAttributeArgument::Type(name)
                                | CustomAttributeArgument::String(name) => self.type_name(name),
                                other => Err(malformed_error!(
                                    "Type array holds a {:?} value",
                                    other.argument_type()
                                )),
                            })
                            .collect::<Result<Vec<_>>>()
                    })
                    .transpose()?;
                LiveArgument::TypeArray(values)
            }
            (argument, _) => LiveArgument::Value(argument),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        emit::{AssemblyBuilder, LiveParameter, LiveProperty, LiveSignature, TypeHandle},
        metadata::{
            customattributes::{CustomAttributeNamedArgument, CustomAttributeValue},
            definitions::{
                FieldAttributes, MethodAttributes, MethodImplAttributes, PropertyAttributes,
                TypeAttributes,
            },
            members::MethodReference,
            signatures::{CallingConvention, MethodSignature},
            typesystem::{AssemblyName, PrimitiveType},
        },
        runtime::Domain,
        Error,
    };
    use uguid::Guid;

    fn system_type() -> TypeReference {
        TypeReference::external_class(AssemblyName::corlib(), "System", "Type")
    }

    fn mark() -> TypeReference {
        TypeReference::module_class("Marks.dll", "Tests", "MarkAttribute")
    }

    /// `Tests.MarkAttribute(Type)` with field `Hint: string` and property `Kind: Type`.
    fn marks(domain: &Domain) -> (AssemblyBuilder, TypeHandle) {
        let mut builder = AssemblyBuilder::new(domain.reserve_id(), AssemblyName::new("Marks"));
        let module = builder.define_module("Marks.dll", Guid::ZERO);
        let ty = builder
            .define_type(module, "Tests", "MarkAttribute", TypeAttributes::PUBLIC, None)
            .unwrap();
        builder
            .set_parent(ty, Some(RuntimeType::Type(corlib::ATTRIBUTE)))
            .unwrap();
        let ctor = builder
            .define_method(
                ty,
                ".ctor",
                MethodAttributes::PUBLIC | MethodAttributes::SPECIAL_NAME | MethodAttributes::RT_SPECIAL_NAME,
                MethodImplAttributes::empty(),
                vec![],
            )
            .unwrap();
        let signature = LiveSignature {
            has_this: true,
            convention: CallingConvention::Default,
            generic_arity: 0,
            return_type: corlib::primitive_type(PrimitiveType::Void),
            parameters: vec![RuntimeType::Type(corlib::TYPE)],
        };
        builder
            .set_signature(ctor, signature, vec![LiveParameter::default()], LiveParameter::default())
            .unwrap();
        builder
            .define_field(
                ty,
                "Hint",
                FieldAttributes::PUBLIC,
                corlib::primitive_type(PrimitiveType::String),
            )
            .unwrap();
        builder
            .define_property(
                ty,
                LiveProperty {
                    name: "Kind".to_string(),
                    attributes: PropertyAttributes::empty(),
                    property_type: RuntimeType::Type(corlib::TYPE),
                    parameters: vec![],
                    getter: None,
                    setter: None,
                    others: vec![],
                    constant: None,
                    custom_attributes: vec![],
                },
            )
            .unwrap();
        (builder, ty)
    }

    fn constructor() -> MethodReference {
        MethodReference::new(
            mark(),
            ".ctor",
            MethodSignature::new_instance(TypeReference::void(), vec![system_type()]),
        )
    }

    #[test]
    fn type_arguments_resolve() {
        let domain = Domain::new().unwrap();
        let (builder, ty) = marks(&domain);
        let resolver = SymbolResolver::new(&domain).building(&builder);
        let value = CustomAttributeValue {
            fixed_args: vec![CustomAttributeArgument::Type(Some("System.Exception".to_string()))],
            named_args: vec![
                CustomAttributeNamedArgument {
                    is_field: true,
                    name: "Hint".to_string(),
                    arg_type: ArgumentType::String,
                    value: CustomAttributeArgument::String(Some("System.Exception".to_string())),
                },
                CustomAttributeNamedArgument {
                    is_field: false,
                    name: "Kind".to_string(),
                    arg_type: ArgumentType::String,
                    value: CustomAttributeArgument::String(Some("Tests.MarkAttribute".to_string())),
                },
            ],
        };
        let attribute = CustomAttribute::new(constructor(), &value).unwrap();
        let live = AttributeTranslator::new(&resolver).translate(&attribute).unwrap();

        assert_eq!(live.constructor.handle.declaring, ty);
        assert_eq!(
            live.fixed_args,
            vec![LiveArgument::Type(Some(RuntimeType::Type(corlib::EXCEPTION)))]
        );
        assert_eq!(
            live.named_args[0].value,
            LiveArgument::Value(CustomAttributeArgument::String(Some("System.Exception".to_string())))
        );
        assert_eq!(live.named_args[1].value, LiveArgument::Type(Some(RuntimeType::Type(ty))));
    }

    #[test]
    fn object_arrays_keep_strings() {
        let domain = Domain::new().unwrap();
        let resolver = SymbolResolver::new(&domain);
        let translator = AttributeTranslator::new(&resolver);
        let array = CustomAttributeArgument::Array {
            element: ArgumentType::Object,
            values: Some(vec![CustomAttributeArgument::Boxed(Box::new(
                CustomAttributeArgument::String(Some("System.Exception".to_string())),
            ))]),
        };
        assert_eq!(
            translator.argument(array.clone(), Slot::Other).unwrap(),
            LiveArgument::Value(array)
        );
        assert_eq!(
            translator
                .argument(
                    CustomAttributeArgument::Boxed(Box::new(CustomAttributeArgument::Type(None))),
                    Slot::Other
                )
                .unwrap(),
            LiveArgument::Type(None)
        );
    }

    #[test]
    fn unknown_type_names_fail() {
        let domain = Domain::new().unwrap();
        let (builder, _) = marks(&domain);
        let resolver = SymbolResolver::new(&domain).building(&builder);
        let value = CustomAttributeValue {
            fixed_args: vec![CustomAttributeArgument::Type(Some("Nowhere.Thing".to_string()))],
            named_args: vec![],
        };
        let attribute = CustomAttribute::new(constructor(), &value).unwrap();
        assert!(matches!(
            AttributeTranslator::new(&resolver).translate(&attribute),
            Err(Error::UnresolvedSymbol(_))
        ));
    }
}
