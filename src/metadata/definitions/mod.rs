//! Definitions of the static module model.
//!
//! A [`StaticAssembly`] owns its modules, a module owns its top-level types and resources, and
//! each [`TypeDefinition`] owns its members and nested types. Definitions never point at one
//! another directly: everything that crosses a definition boundary is a symbolic
//! [`TypeReference`](crate::metadata::typesystem::TypeReference) or member reference, and the
//! only indices are accessor links from properties and events into their type's method list.
//!
//! The static model is read from a binary image once and is otherwise treated as read-only
//! input; the static rewrite strategy works on a clone.

mod constant;
mod flags;
mod members;
mod typedef;

use std::path::Path;

pub use constant::Constant;
pub use flags::{
    EventAttributes, FieldAttributes, GenericParamAttributes, MethodAttributes,
    MethodImplAttributes, ParamAttributes, PropertyAttributes, TypeAttributes,
};
pub use members::{
    EventDefinition, FieldDefinition, GenericParameterDefinition, MethodDefinition,
    ParameterDefinition, PropertyDefinition,
};
pub use typedef::TypeDefinition;

use uguid::Guid;

use crate::{
    file,
    metadata::{
        customattributes::CustomAttribute, image, resources::Resource,
        security::SecurityDeclaration, typesystem::AssemblyName,
    },
    Result,
};

/// A compiled assembly: identity, modules and assembly-level metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticAssembly {
    /// Identity
    pub name: AssemblyName,
    /// Modules; the first is the manifest module
    pub modules: Vec<StaticModule>,
    /// Assembly-level custom attributes
    pub custom_attributes: Vec<CustomAttribute>,
    /// Assembly-level security, including permission requests
    pub security: Vec<SecurityDeclaration>,
}

impl StaticAssembly {
    /// An assembly with a single empty module named `{name}.dll`.
    #[must_use]
    pub fn new(name: AssemblyName) -> Self {
        let module = StaticModule::new(format!("{}.dll", name.name));
        StaticAssembly {
            name,
            modules: vec![module],
            custom_attributes: Vec::new(),
            security: Vec::new(),
        }
    }

    /// Read an assembly image from disk.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be read and the image reader's
    /// errors for damaged content.
    pub fn from_file(path: &Path) -> Result<Self> {
        file::with_mapped_file(path, image::read_image)
    }

    /// Decode an assembly image.
    ///
    /// # Errors
    /// See [`image::read_image`].
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        image::read_image(data)
    }

    /// Encode the assembly as an image.
    ///
    /// # Errors
    /// See [`image::write_image`].
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        image::write_image(self)
    }

    /// Encode the assembly and write it to `path`. Nothing is written if encoding fails.
    ///
    /// # Errors
    /// Returns encoding errors or [`crate::Error::FileError`].
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let bytes = image::write_image(self)?;
        file::write_file(path, &bytes)
    }

    /// The manifest module.
    #[must_use]
    pub fn main_module(&self) -> Option<&StaticModule> {
        self.modules.first()
    }

    /// The manifest module, mutably.
    pub fn main_module_mut(&mut self) -> Option<&mut StaticModule> {
        self.modules.first_mut()
    }

    /// Find a module by name.
    #[must_use]
    pub fn module(&self, name: &str) -> Option<&StaticModule> {
        self.modules.iter().find(|m| m.name == name)
    }
}

/// One module of an assembly.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticModule {
    /// Module file name
    pub name: String,
    /// Module version id
    pub mvid: Guid,
    /// Top-level types
    pub types: Vec<TypeDefinition>,
    /// Embedded resources
    pub resources: Vec<Resource>,
    /// Module-level custom attributes
    pub custom_attributes: Vec<CustomAttribute>,
}

impl StaticModule {
    /// An empty module with a zero version id.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        StaticModule {
            name: name.into(),
            mvid: Guid::ZERO,
            types: Vec::new(),
            resources: Vec::new(),
            custom_attributes: Vec::new(),
        }
    }

    /// Find a type by `namespace` and a `+`-separated nested name path.
    #[must_use]
    pub fn find_type(&self, namespace: &str, path: &str) -> Option<&TypeDefinition> {
        let mut segments = path.split('+');
        let first = segments.next()?;
        let mut current = self
            .types
            .iter()
            .find(|t| t.namespace == namespace && t.name == first)?;
        for segment in segments {
            current = current.nested(segment)?;
        }
        Some(current)
    }

    /// Count of types including nested ones.
    #[must_use]
    pub fn type_count(&self) -> usize {
        fn count(types: &[TypeDefinition]) -> usize {
            types.iter().map(|t| 1 + count(&t.nested_types)).sum()
        }
        count(&self.types)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::typesystem::TypeReference;

    #[test]
    fn nested_lookup_and_references() {
        let mut outer = TypeDefinition::new("Samples", "Outer`1", TypeAttributes::PUBLIC)
            .extends(TypeReference::object());
        outer.generic_parameters.push(GenericParameterDefinition::new("T"));
        outer.nested_types.push(
            TypeDefinition::new("", "Inner", TypeAttributes::NESTED_PUBLIC | TypeAttributes::SEALED)
                .extends(TypeReference::named(
                    crate::metadata::typesystem::ResolutionScope::Assembly(AssemblyName::corlib()),
                    "System",
                    "ValueType",
                    false,
                )),
        );

        let mut module = StaticModule::new("Samples.dll");
        module.types.push(outer);
        assert_eq!(module.type_count(), 2);

        let inner = module.find_type("Samples", "Outer`1+Inner").unwrap();
        assert!(inner.is_value_type());

        let outer = module.find_type("Samples", "Outer`1").unwrap();
        let outer_ref = outer.reference("Samples.dll", None);
        assert_eq!(outer.self_reference("Samples.dll", None).to_string(), "Samples.Outer`1<!0>");
        assert_eq!(
            inner.reference("Samples.dll", Some(&outer_ref)).to_string(),
            "Samples.Outer`1/Inner"
        );
        assert!(module.find_type("Samples", "Outer`1+Missing").is_none());
    }
}
