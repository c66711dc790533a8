use std::fmt;

use crate::metadata::security::PermissionSet;

/// A declarative security attachment: an action applied to a permission set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SecurityDeclaration {
    /// How the permission set is applied
    pub action: SecurityAction,
    /// The permissions
    pub permission_set: PermissionSet,
}

impl SecurityDeclaration {
    /// Create a declaration.
    #[must_use]
    pub fn new(action: SecurityAction, permission_set: PermissionSet) -> Self {
        SecurityDeclaration {
            action,
            permission_set,
        }
    }
}

/// Security actions as defined in ECMA-335 II.22.11.
///
/// # Reference
/// * <https://learn.microsoft.com/en-us/dotnet/api/system.security.permissions.securityaction>
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecurityAction {
    /// Refuse Demand for the specified permission.
    Deny,
    /// All callers in the call chain must hold the permission.
    Demand,
    /// Satisfy Demand for the specified permission without further checks.
    Assert,
    /// Non-CAS demand.
    NonCasDemand,
    /// The immediate caller must hold the permission.
    LinkDemand,
    /// Required to inherit from a class or override a virtual method.
    InheritanceDemand,
    /// Minimum permissions required to run. Assembly level only.
    RequestMinimum,
    /// Optional permissions to grant. Assembly level only.
    RequestOptional,
    /// Permissions that must not be granted. Assembly level only.
    RequestRefuse,
    /// Reserved for prejitting.
    PrejitGrant,
    /// Reserved for prejitting.
    PrejitDeny,
    /// Non-CAS version of `LinkDemand`.
    NonCasLinkDemand,
    /// Non-CAS version of `InheritanceDemand`.
    NonCasInheritance,
    /// Choice variant of `LinkDemand`.
    LinkDemandChoice,
    /// Choice variant of `InheritanceDemand`.
    InheritanceDemandChoice,
    /// Choice variant of `Demand`.
    DemandChoice,
    /// Refuse Demand for everything but the specified permission.
    PermitOnly,
    /// Any other value.
    Unknown(u16),
}

impl SecurityAction {
    /// The encoded value.
    #[must_use]
    pub fn value(self) -> u16 {
        match self {
            SecurityAction::Deny => 0x0001,
            SecurityAction::Demand => 0x0002,
            SecurityAction::Assert => 0x0003,
            SecurityAction::NonCasDemand => 0x0004,
            SecurityAction::LinkDemand => 0x0005,
            SecurityAction::InheritanceDemand => 0x0006,
            SecurityAction::RequestMinimum => 0x0007,
            SecurityAction::RequestOptional => 0x0008,
            SecurityAction::RequestRefuse => 0x0009,
            SecurityAction::PrejitGrant => 0x000A,
            SecurityAction::PrejitDeny => 0x000B,
            SecurityAction::NonCasLinkDemand => 0x000C,
            SecurityAction::NonCasInheritance => 0x000D,
            SecurityAction::LinkDemandChoice => 0x000E,
            SecurityAction::InheritanceDemandChoice => 0x000F,
            SecurityAction::DemandChoice => 0x0010,
            SecurityAction::PermitOnly => 0x0011,
            SecurityAction::Unknown(value) => value,
        }
    }

    /// `true` for the three assembly permission requests.
    #[must_use]
    pub fn is_request(self) -> bool {
        matches!(
            self,
            SecurityAction::RequestMinimum
                | SecurityAction::RequestOptional
                | SecurityAction::RequestRefuse
        )
    }
}

impl From<u16> for SecurityAction {
    fn from(value: u16) -> Self {
        match value {
            0x0001 => SecurityAction::Deny,
            0x0002 => SecurityAction::Demand,
            0x0003 => SecurityAction::Assert,
            0x0004 => SecurityAction::NonCasDemand,
            0x0005 => SecurityAction::LinkDemand,
            0x0006 => SecurityAction::InheritanceDemand,
            0x0007 => SecurityAction::RequestMinimum,
            0x0008 => SecurityAction::RequestOptional,
            0x0009 => SecurityAction::RequestRefuse,
            0x000A => SecurityAction::PrejitGrant,
            0x000B => SecurityAction::PrejitDeny,
            0x000C => SecurityAction::NonCasLinkDemand,
            0x000D => SecurityAction::NonCasInheritance,
            0x000E => SecurityAction::LinkDemandChoice,
            0x000F => SecurityAction::InheritanceDemandChoice,
            0x0010 => SecurityAction::DemandChoice,
            0x0011 => SecurityAction::PermitOnly,
            _ => SecurityAction::Unknown(value),
        }
    }
}

impl fmt::Display for SecurityAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecurityAction::Unknown(value) => write!(f, "Unknown(0x{value:04x})"),
            other => write!(f, "{other:?}"),
        }
    }
}
