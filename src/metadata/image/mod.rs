//! Binary module image: the on-disk form of a
//! [`StaticAssembly`](crate::metadata::definitions::StaticAssembly).
//!
//! # Layout
//!
//! ```text
//! "DWMI" | version: u16 | stream count: u16 | stream directory | streams (4-aligned)
//! ```
//!
//! | Stream | Content |
//! |---|---|
//! | `#Strings` | identifiers |
//! | `#US` | `ldstr` literals |
//! | `#Blob` | signatures, method bodies, constants, attribute values, permission sets |
//! | `#~` | reference tables, see [`tables`] |
//! | `#Defs` | the definition tree: assembly, modules, types and their members |
//!
//! Definitions are stored as a tree in declaration order. Every cross-reference, whether it
//! appears in a signature, an instruction, an attribute or a base type list, goes through a
//! token into the reference tables, including references to types of the same module (a
//! `TypeRef` scoped to the module). Method bodies use the ECMA-335 tiny and fat header
//! encodings; see [`body`].
//!
//! # Examples
//!
//! ```rust,no_run
//! use dotweave::metadata::{
//!     definitions::{StaticAssembly, TypeAttributes, TypeDefinition},
//!     image::{read_image, write_image},
//!     typesystem::AssemblyName,
//! };
//!
//! let mut assembly = StaticAssembly::new(AssemblyName::new("Sample"));
//! if let Some(module) = assembly.main_module_mut() {
//!     module.types.push(TypeDefinition::new("Ns", "Empty", TypeAttributes::PUBLIC));
//! }
//! let bytes = write_image(&assembly)?;
//! assert_eq!(read_image(&bytes)?, assembly);
//! # Ok::<(), dotweave::Error>(())
//! ```

pub mod body;
mod reader;
pub mod tables;
mod writer;

pub use reader::read_image;
pub use writer::write_image;

/// First four bytes of every image.
pub const IMAGE_MAGIC: [u8; 4] = *b"DWMI";
/// Format version written and accepted.
pub const IMAGE_VERSION: u16 = 1;
/// Placeholder for an absent accessor index in `#Defs`.
pub(crate) const NO_INDEX: u32 = u32::MAX;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        disassembler::OpCode,
        metadata::{
            customattributes::{CustomAttribute, CustomAttributeArgument, CustomAttributeValue},
            definitions::{
                Constant, EventDefinition, FieldAttributes, FieldDefinition,
                GenericParameterDefinition, MethodAttributes, MethodDefinition, PropertyDefinition,
                StaticAssembly, TypeAttributes, TypeDefinition,
            },
            members::{FieldReference, MethodReference},
            method::{ExceptionHandler, Instruction, MethodBody, Operand},
            resources::Resource,
            security::{Permission, PermissionSet, SecurityAction, SecurityDeclaration},
            signatures::MethodSignature,
            typesystem::{AssemblyName, AssemblyVersion, GenericOwner, TypeReference},
        },
        Error,
    };

    fn sample_assembly() -> StaticAssembly {
        let mut name = AssemblyName::new("Sample").with_version(AssemblyVersion::new(1, 2, 3, 4));
        name.public_key = Some(vec![0x00, 0x24, 0x00, 0x00]);
        let mut assembly = StaticAssembly::new(name);

        let object = TypeReference::object();
        let exception = TypeReference::external_class(AssemblyName::corlib(), "System", "Exception");
        let note = TypeReference::module_class("Sample.dll", "Sample", "NoteAttribute");
        let note_ctor = MethodReference::new(
            note,
            ".ctor",
            MethodSignature::new_instance(TypeReference::void(), vec![TypeReference::string()]),
        );
        let attribute = CustomAttribute::new(
            note_ctor,
            &CustomAttributeValue {
                fixed_args: vec![CustomAttributeArgument::String(Some("marked".into()))],
                named_args: vec![],
            },
        )
        .unwrap();

        let mut calculator = TypeDefinition::new("Sample", "Calculator", TypeAttributes::PUBLIC);
        calculator.base_type = Some(object.clone());
        calculator.generic_parameters.push(GenericParameterDefinition::new("T"));
        calculator.custom_attributes.push(attribute.clone());
        calculator.packing_size = Some(4);

        let self_type = calculator.self_reference("Sample.dll", None);
        let total = FieldDefinition::new("total", FieldAttributes::PRIVATE, TypeReference::int32());
        let mut limit = FieldDefinition::new(
            "Limit",
            FieldAttributes::PUBLIC | FieldAttributes::STATIC | FieldAttributes::LITERAL,
            TypeReference::int32(),
        );
        limit.constant = Some(Constant::I4(100));
        calculator.fields.push(total);
        calculator.fields.push(limit);

        let total_ref = FieldReference::new(self_type, "total", TypeReference::int32());
        let add = MethodDefinition::new(
            "Add",
            MethodAttributes::PUBLIC,
            MethodSignature::new_instance(TypeReference::int32(), vec![TypeReference::int32()]),
        )
        .with_body(
            MethodBody::new()
                .max_stack(3)
                .local(TypeReference::int32())
                .push(Instruction::load_argument(0))
                .push(Instruction::load_argument(0))
                .push(Instruction::new(OpCode::Ldfld, Operand::Field(total_ref.clone())))
                .push(Instruction::load_argument(1))
                .push(Instruction::simple(OpCode::Add))
                .push(Instruction::new(OpCode::Stfld, Operand::Field(total_ref.clone())))
                .push(Instruction::new(OpCode::LeaveS, Operand::Target(9)))
                .push(Instruction::simple(OpCode::Pop))
                .push(Instruction::new(OpCode::LeaveS, Operand::Target(9)))
                .push(Instruction::load_argument(0))
                .push(Instruction::new(OpCode::Ldfld, Operand::Field(total_ref)))
                .push(Instruction::simple(OpCode::Ret))
                .handler(ExceptionHandler::catch((0, 7), (7, 9), exception)),
        );
        let get_total = MethodDefinition::new(
            "get_Total",
            MethodAttributes::PUBLIC | MethodAttributes::SPECIAL_NAME,
            MethodSignature::new_instance(TypeReference::int32(), vec![]),
        )
        .with_body(
            MethodBody::new()
                .push(Instruction::new(OpCode::Ldstr, Operand::String("caf\u{e9}".into())))
                .push(Instruction::simple(OpCode::Pop))
                .push(Instruction::load_int32(7))
                .push(Instruction::simple(OpCode::Ret)),
        );
        let abstract_method = MethodDefinition::new(
            "Describe",
            MethodAttributes::PUBLIC | MethodAttributes::VIRTUAL | MethodAttributes::ABSTRACT,
            MethodSignature::new_instance(TypeReference::string(), vec![]),
        );
        calculator.methods.push(add);
        calculator.methods.push(get_total);
        calculator.methods.push(abstract_method);

        let mut property = PropertyDefinition::new("Total", TypeReference::int32());
        property.getter = Some(1);
        calculator.properties.push(property);
        let mut event = EventDefinition::new(
            "Changed",
            TypeReference::external_class(AssemblyName::corlib(), "System", "EventHandler"),
        );
        event.others.push(0);
        calculator.events.push(event);

        let mut nested = TypeDefinition::new("", "Helper", TypeAttributes::NESTED_PRIVATE);
        nested.base_type = Some(object);
        calculator.nested_types.push(nested);
        calculator.generic_parameters[0].constraints.push(TypeReference::GenericParameter {
            owner: GenericOwner::Type,
            position: 0,
        });

        let permission = Permission::new("System.Security.Permissions.SecurityPermissionAttribute, mscorlib", &[]).unwrap();
        assembly.security.push(SecurityDeclaration::new(
            SecurityAction::RequestMinimum,
            PermissionSet::from_permissions([permission]),
        ));
        assembly.custom_attributes.push(attribute);

        let module = assembly.main_module_mut().unwrap();
        module.types.push(calculator);
        module.types.push(TypeDefinition::new("Sample", "NoteAttribute", TypeAttributes::PUBLIC));
        module.resources.push(Resource::new("data.bin", vec![1, 2, 3]).private());
        module.mvid = uguid::guid!("01234567-89ab-cdef-0123-456789abcdef");
        assembly
    }

    #[test]
    fn assembly_survives_image_round_trip() {
        let assembly = sample_assembly();
        let bytes = write_image(&assembly).unwrap();
        assert_eq!(&bytes[..4], &IMAGE_MAGIC);
        assert_eq!(bytes.len() % 4, 0);

        let decoded = read_image(&bytes).unwrap();
        assert_eq!(decoded, assembly);
        assert_eq!(write_image(&decoded).unwrap(), bytes);
    }

    #[test]
    fn damaged_images_are_rejected() {
        let bytes = write_image(&sample_assembly()).unwrap();

        let mut wrong_magic = bytes.clone();
        wrong_magic[0] = b'X';
        assert!(matches!(read_image(&wrong_magic), Err(Error::Malformed { .. })));

        let mut wrong_version = bytes.clone();
        wrong_version[4] = 9;
        assert!(read_image(&wrong_version).is_err());

        assert!(read_image(&bytes[..bytes.len() / 2]).is_err());
        assert!(read_image(&[]).is_err());
    }

    #[test]
    fn short_branch_out_of_range_fails_the_whole_write() {
        let mut assembly = sample_assembly();
        let mut body = MethodBody::new().push(Instruction::new(OpCode::BrS, Operand::Target(201)));
        for _ in 0..200 {
            body = body.push(Instruction::new(OpCode::Ldstr, Operand::String("x".into())));
        }
        body = body.push(Instruction::simple(OpCode::Ret));
        let method = MethodDefinition::new(
            "Far",
            MethodAttributes::PUBLIC | MethodAttributes::STATIC,
            MethodSignature::new_static(TypeReference::void(), vec![]),
        )
        .with_body(body);
        assembly.main_module_mut().unwrap().types[0].methods.push(method);

        assert!(write_image(&assembly).is_err());
    }
}
