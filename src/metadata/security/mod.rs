//! Declarative security: security actions and `.`-format permission sets.
//!
//! Security declarations attach to assemblies, types and methods. Assembly-level
//! `RequestMinimum`, `RequestOptional` and `RequestRefuse` declarations are not attached as
//! declarations when a live assembly is built; they are unioned into the assembly's three
//! permission requests instead (see [`crate::emit::PermissionRequests`]).
//!
//! # References
//!
//! - ECMA-335 6th Edition, Partition II, Section 22.11 - DeclSecurity
//! - ECMA-335 6th Edition, Partition II, Section 23.1.3 - Security actions

mod permissionset;
mod types;

pub use permissionset::{Permission, PermissionSet};
pub use types::{SecurityAction, SecurityDeclaration};
