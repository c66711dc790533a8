//! Manifest resources embedded in a module.
//!
//! Resources carry no cross-type references. The staged builder copies them into the live
//! assembly while the owning module is declared.

use std::fmt;

/// An embedded manifest resource.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Resource {
    /// Resource name
    pub name: String,
    /// Visible outside the assembly
    pub public: bool,
    /// Resource bytes
    pub data: Vec<u8>,
}

impl Resource {
    /// A public resource.
    #[must_use]
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Resource {
            name: name.into(),
            public: true,
            data,
        }
    }

    /// Mark the resource assembly-private.
    #[must_use]
    pub fn private(mut self) -> Self {
        self.public = false;
        self
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("name", &self.name)
            .field("public", &self.public)
            .field("len", &self.data.len())
            .finish()
    }
}
