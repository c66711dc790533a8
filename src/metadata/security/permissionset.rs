//! Permission sets in the binary `.` format (ECMA-335 II.23.1.3).
//!
//! Layout:
//! - `.` (0x2E)
//! - compressed permission count
//! - per permission: the class name as a `SerString`, then a compressed byte length and that
//!   many bytes holding a compressed named-argument count followed by custom-attribute style
//!   named arguments
//!
//! Property bytes are kept encoded; named arguments that use enums can only be decoded with
//! an [`EnumResolver`].

use std::fmt;

use crate::{
    file::{parser::Parser, writer::Writer},
    metadata::customattributes::{
        encode_named_argument, CustomAttributeNamedArgument, CustomAttributeParser, EnumResolver,
    },
    Result,
};

/// One permission: a permission class and its encoded property assignments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Permission {
    /// Assembly-qualified permission class name
    pub class_name: String,
    /// Compressed named-argument count followed by the named arguments
    pub properties: Vec<u8>,
}

impl Permission {
    /// Build a permission from decoded property assignments.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if an argument does not fit its declared type.
    pub fn new(class_name: impl Into<String>, arguments: &[CustomAttributeNamedArgument]) -> Result<Self> {
        let mut writer = Writer::new();
        writer.write_compressed_uint(u32::try_from(arguments.len()).map_err(|_| {
            malformed_error!("Too many permission properties - {}", arguments.len())
        })?)?;
        for argument in arguments {
            encode_named_argument(&mut writer, argument)?;
        }

        Ok(Permission {
            class_name: class_name.into(),
            properties: writer.into_inner(),
        })
    }

    /// Simple class name, without namespace or assembly.
    #[must_use]
    pub fn simple_name(&self) -> &str {
        let type_part = self.class_name.split(',').next().unwrap_or_default().trim();
        type_part.rsplit('.').next().unwrap_or(type_part)
    }

    /// Decode the property assignments.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for damaged data or
    /// [`crate::Error::UnresolvedSymbol`] for unknown enums.
    pub fn named_arguments(&self, enums: &dyn EnumResolver) -> Result<Vec<CustomAttributeNamedArgument>> {
        if self.properties.is_empty() {
            return Ok(Vec::new());
        }

        let mut counter = Parser::new(&self.properties);
        let count = counter.read_compressed_uint()?;
        let mut parser = CustomAttributeParser::new(&self.properties[counter.pos()..], enums);
        let mut arguments = Vec::with_capacity(count as usize);
        for _ in 0..count {
            arguments.push(parser.parse_named_argument()?);
        }
        Ok(arguments)
    }
}

/// An ordered set of permissions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct PermissionSet {
    permissions: Vec<Permission>,
}

impl PermissionSet {
    /// An empty set.
    #[must_use]
    pub fn new() -> Self {
        PermissionSet::default()
    }

    /// Build a set from permissions, keeping the first of any duplicated class.
    #[must_use]
    pub fn from_permissions(permissions: impl IntoIterator<Item = Permission>) -> Self {
        let mut set = PermissionSet::new();
        for permission in permissions {
            set.add(permission);
        }
        set
    }

    /// Decode a permission-set blob.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] for the XML format and [`crate::Error::Malformed`]
    /// or [`crate::Error::OutOfBounds`] for damaged data.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut parser = Parser::new(data);
        match parser.read_le::<u8>()? {
            b'.' => {}
            b'<' => return Err(crate::Error::NotSupported("XML permission sets".to_string())),
            other => return Err(malformed_error!("Unknown permission set format - 0x{:02x}", other)),
        }

        let count = parser.read_compressed_uint()? as usize;
        let mut permissions = Vec::with_capacity(count.min(parser.remaining()));
        for _ in 0..count {
            let Some(class_name) = parser.read_ser_string()? else {
                return Err(malformed_error!("Permission without a class name"));
            };
            let length = parser.read_compressed_uint()? as usize;
            let properties = parser.read_bytes(length)?.to_vec();
            permissions.push(Permission {
                class_name,
                properties,
            });
        }

        Ok(PermissionSet { permissions })
    }

    /// Encode as a `.`-format blob.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if a length exceeds the compressed integer range.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut writer = Writer::new();
        writer.write_le::<u8>(b'.');
        writer.write_compressed_uint(u32::try_from(self.permissions.len()).map_err(|_| {
            malformed_error!("Too many permissions - {}", self.permissions.len())
        })?)?;
        for permission in &self.permissions {
            writer.write_ser_string(Some(&permission.class_name))?;
            writer.write_compressed_uint(u32::try_from(permission.properties.len()).map_err(|_| {
                malformed_error!("Permission properties too long - {}", permission.properties.len())
            })?)?;
            writer.write_bytes(&permission.properties);
        }
        Ok(writer.into_inner())
    }

    /// The permissions, in order.
    #[must_use]
    pub fn permissions(&self) -> &[Permission] {
        &self.permissions
    }

    /// `true` if there are no permissions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty()
    }

    /// Find a permission by full or simple class name.
    #[must_use]
    pub fn get_permission(&self, class_name: &str) -> Option<&Permission> {
        self.permissions
            .iter()
            .find(|p| p.class_name == class_name || p.simple_name() == class_name)
    }

    /// Add a permission unless one of the same class is already present.
    ///
    /// Returns `true` if the set changed.
    pub fn add(&mut self, permission: Permission) -> bool {
        if self.permissions.iter().any(|p| p.class_name == permission.class_name) {
            return false;
        }
        self.permissions.push(permission);
        true
    }

    /// The union of two sets. Where both contain the same class, this set's entry wins.
    #[must_use]
    pub fn union(&self, other: &PermissionSet) -> PermissionSet {
        let mut result = self.clone();
        for permission in &other.permissions {
            result.add(permission.clone());
        }
        result
    }
}

impl fmt::Display for PermissionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, permission) in self.permissions.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", permission.simple_name())?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::{
            customattributes::{ArgumentType, CustomAttributeArgument},
            typesystem::PrimitiveType,
        },
        Error,
    };

    struct NoEnums;

    impl EnumResolver for NoEnums {
        fn enum_underlying_type(&self, type_name: &str) -> Result<PrimitiveType> {
            Err(Error::UnresolvedSymbol(type_name.to_string()))
        }
    }

    const FILE_IO: &str = "System.Security.Permissions.FileIOPermissionAttribute, mscorlib";

    fn file_io() -> Permission {
        Permission::new(
            FILE_IO,
            &[CustomAttributeNamedArgument {
                is_field: false,
                name: "Read".into(),
                arg_type: ArgumentType::String,
                value: CustomAttributeArgument::String(Some("C:\\Data".into())),
            }],
        )
        .unwrap()
    }

    #[test]
    fn binary_format_round_trip() {
        let set = PermissionSet::from_permissions([file_io()]);
        let blob = set.encode().unwrap();
        assert_eq!(blob[0], b'.');
        assert_eq!(blob[1], 1);

        let parsed = PermissionSet::parse(&blob).unwrap();
        assert_eq!(parsed, set);
        let arguments = parsed.permissions()[0].named_arguments(&NoEnums).unwrap();
        assert_eq!(arguments[0].name, "Read");
        assert_eq!(parsed.get_permission("FileIOPermissionAttribute"), Some(&file_io()));
    }

    #[test]
    fn empty_and_unknown_formats() {
        assert!(PermissionSet::parse(&[b'.', 0]).unwrap().is_empty());
        assert!(matches!(
            PermissionSet::parse(b"<PermissionSet/>"),
            Err(Error::NotSupported(_))
        ));
        assert!(PermissionSet::parse(&[0x11]).is_err());
        assert!(PermissionSet::parse(&[b'.', 1, 3, b'A']).is_err());
    }

    #[test]
    fn union_keeps_first_of_each_class() {
        let security = Permission::new("System.Security.Permissions.SecurityPermissionAttribute, mscorlib", &[])
            .unwrap();
        let left = PermissionSet::from_permissions([file_io()]);
        let right = PermissionSet::from_permissions([
            Permission::new(FILE_IO, &[]).unwrap(),
            security.clone(),
        ]);

        let union = left.union(&right);
        assert_eq!(union.permissions().len(), 2);
        assert_eq!(union.permissions()[0], file_io());
        assert_eq!(union.permissions()[1], security);
        assert_eq!(union.to_string(), "{FileIOPermissionAttribute, SecurityPermissionAttribute}");
    }
}
