use std::{collections::HashMap, sync::Arc};

use uguid::Guid;

use crate::{
    emit::{
        handles::{AssemblyId, FieldHandle, MethodHandle, TypeHandle},
        types::{LiveAttribute, LiveField, LiveMethod, LiveType},
    },
    metadata::{
        resources::Resource,
        security::{PermissionSet, SecurityAction, SecurityDeclaration},
        typesystem::AssemblyName,
    },
    Result,
};

/// A module of a live assembly.
#[derive(Debug, Clone)]
pub struct LiveModule {
    /// Module name
    pub name: String,
    /// Module version id
    pub mvid: Guid,
    /// Embedded resources, copied verbatim
    pub resources: Vec<Resource>,
    /// Top-level types declared in this module
    pub types: Vec<TypeHandle>,
    /// Attached attributes
    pub custom_attributes: Vec<LiveAttribute>,
}

/// The three assembly-wide permission requests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PermissionRequests {
    /// Permissions the assembly cannot run without
    pub minimum: PermissionSet,
    /// Permissions the assembly would like to have
    pub optional: PermissionSet,
    /// Permissions the assembly must never be granted
    pub refuse: PermissionSet,
}

impl PermissionRequests {
    /// Union `set` into the request named by `action`.
    ///
    /// Returns `false` and changes nothing for actions that are not requests.
    pub fn add(&mut self, action: SecurityAction, set: &PermissionSet) -> bool {
        let target = match action {
            SecurityAction::RequestMinimum => &mut self.minimum,
            SecurityAction::RequestOptional => &mut self.optional,
            SecurityAction::RequestRefuse => &mut self.refuse,
            _ => return false,
        };
        *target = target.union(set);
        true
    }
}

/// A sealed, executable assembly.
#[derive(Debug)]
pub struct LoadedAssembly {
    pub(crate) id: AssemblyId,
    pub(crate) name: AssemblyName,
    pub(crate) modules: Vec<LiveModule>,
    pub(crate) types: Vec<Arc<LiveType>>,
    pub(crate) by_name: HashMap<String, TypeHandle>,
    pub(crate) custom_attributes: Vec<LiveAttribute>,
    pub(crate) security: Vec<SecurityDeclaration>,
    pub(crate) permission_requests: PermissionRequests,
}

impl LoadedAssembly {
    /// Id inside the owning domain.
    #[must_use]
    pub fn id(&self) -> AssemblyId {
        self.id
    }

    /// Simple name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name.name
    }

    /// Full identity.
    #[must_use]
    pub fn assembly_name(&self) -> &AssemblyName {
        &self.name
    }

    /// Modules in declaration order.
    #[must_use]
    pub fn modules(&self) -> &[LiveModule] {
        &self.modules
    }

    /// Every type, nested ones included, in declaration order.
    #[must_use]
    pub fn types(&self) -> &[Arc<LiveType>] {
        &self.types
    }

    /// Assembly-level attributes.
    #[must_use]
    pub fn custom_attributes(&self) -> &[LiveAttribute] {
        &self.custom_attributes
    }

    /// Assembly-level declarative security other than permission requests.
    #[must_use]
    pub fn security(&self) -> &[SecurityDeclaration] {
        &self.security
    }

    /// The unioned permission requests.
    #[must_use]
    pub fn permission_requests(&self) -> &PermissionRequests {
        &self.permission_requests
    }

    /// The type behind `handle`, if it belongs to this assembly.
    #[must_use]
    pub fn type_by_handle(&self, handle: TypeHandle) -> Option<&Arc<LiveType>> {
        if handle.assembly != self.id {
            return None;
        }
        self.types.get(handle.index as usize)
    }

    /// A top-level type by `Namespace.Name`, or a nested one by `Outer+Inner`.
    #[must_use]
    pub fn find_type(&self, full_name: &str) -> Option<&Arc<LiveType>> {
        let mut path = full_name.split('+');
        let outer = self.by_name.get(path.next()?)?;
        let mut current = self.type_by_handle(*outer)?;
        for name in path {
            current = self.find_nested(current.handle, name)?;
        }
        Some(current)
    }

    /// The type nested in `outer` called `name`.
    #[must_use]
    pub fn find_nested(&self, outer: TypeHandle, name: &str) -> Option<&Arc<LiveType>> {
        self.type_by_handle(outer)?
            .nested_types
            .iter()
            .filter_map(|handle| self.type_by_handle(*handle))
            .find(|nested| nested.name == name)
    }

    /// The type by full name, restricted to one module.
    #[must_use]
    pub fn find_type_in_module(&self, module: &str, full_name: &str) -> Option<&Arc<LiveType>> {
        self.find_type(full_name).filter(|ty| ty.module == module)
    }

    /// The method behind `handle`.
    #[must_use]
    pub fn method(&self, handle: MethodHandle) -> Option<&Arc<LiveMethod>> {
        self.type_by_handle(handle.declaring)?.method(handle.index)
    }

    /// The field behind `handle`.
    #[must_use]
    pub fn field(&self, handle: FieldHandle) -> Option<&LiveField> {
        self.type_by_handle(handle.declaring)?.field(handle.index)
    }

    /// The method `Namespace.Type::name`, which must not be overloaded.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnresolvedSymbol`] if the type or method does not exist or the
    /// name is overloaded.
    pub fn find_method(&self, type_name: &str, name: &str) -> Result<&Arc<LiveMethod>> {
        self.find_type(type_name)
            .ok_or_else(|| unresolved!("{} has no type {}", self.name.name, type_name))?
            .method_by_name(name)
    }
}
