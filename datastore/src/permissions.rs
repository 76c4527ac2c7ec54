//! Permission engine contract and the profile-table implementation.

use serde::Deserialize;
use std::collections::{HashMap, HashSet};

/// The acting caller, carrying the permission profile it resolved to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Principal {
    pub profile: String,
}

impl Principal {
    pub fn new(profile: impl Into<String>) -> Self {
        Self {
            profile: profile.into(),
        }
    }
}

/// Boolean-capable permission checks per (principal, type, field).
pub trait PermissionEngine: Send + Sync {
    /// May the principal create or update records of this type at all?
    fn can_modify(&self, principal: &Principal, type_name: &str) -> bool;

    /// May the principal write this specific field?
    fn can_write_field(&self, principal: &Principal, type_name: &str, field: &str) -> bool;
}

/// Grants for one record type within a profile.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct TypeGrant {
    /// Type-level create/update permission.
    #[serde(default)]
    pub modify: bool,
    /// Fields the profile may not write even when `modify` is granted.
    #[serde(default)]
    pub readonly_fields: HashSet<String>,
}

/// Permission tables keyed by profile name, then record type.
///
/// Anything not explicitly granted is denied: an unknown profile or a type
/// missing from the profile's table yields no access.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct ProfilePermissions {
    #[serde(flatten)]
    profiles: HashMap<String, HashMap<String, TypeGrant>>,
}

impl ProfilePermissions {
    pub fn new(profiles: HashMap<String, HashMap<String, TypeGrant>>) -> Self {
        Self { profiles }
    }

    fn grant(&self, principal: &Principal, type_name: &str) -> Option<&TypeGrant> {
        self.profiles.get(&principal.profile)?.get(type_name)
    }
}

impl PermissionEngine for ProfilePermissions {
    fn can_modify(&self, principal: &Principal, type_name: &str) -> bool {
        self.grant(principal, type_name).is_some_and(|g| g.modify)
    }

    fn can_write_field(&self, principal: &Principal, type_name: &str, field: &str) -> bool {
        self.grant(principal, type_name)
            .is_some_and(|g| g.modify && !g.readonly_fields.contains(field))
    }
}
