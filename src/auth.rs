//! Actor identity and administrative role checks.
//!
//! Role checks are membership in a set of roles. Never compare an actor's
//! role against a combined flag value; `SuperAdmin | SiteAdmin` matches
//! neither role alone.

use std::collections::HashSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    SiteAdmin,
}

impl FromStr for Role {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "super_admin" => Ok(Role::SuperAdmin),
            "site_admin" => Ok(Role::SiteAdmin),
            other => Err(ServiceError::ValidationError(format!(
                "Unknown role: {other}"
            ))),
        }
    }
}

/// The party performing an operation. `id` is `None` for system-triggered
/// actions (gateway callbacks, scheduled jobs).
#[derive(Debug, Clone, Default)]
pub struct Actor {
    pub id: Option<Uuid>,
    pub roles: HashSet<Role>,
}

impl Actor {
    /// System actor for machine-initiated operations.
    pub fn system() -> Self {
        Self::default()
    }

    /// A regular user with no administrative roles.
    pub fn user(id: Uuid) -> Self {
        Self {
            id: Some(id),
            roles: HashSet::new(),
        }
    }

    pub fn with_roles(id: Uuid, roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            id: Some(id),
            roles: roles.into_iter().collect(),
        }
    }

    pub fn has_any_role(&self, allowed: &[Role]) -> bool {
        allowed.iter().any(|role| self.roles.contains(role))
    }
}

/// Requires the actor to hold at least one of the allowed roles.
pub fn require_any_role(actor: &Actor, allowed: &[Role]) -> Result<(), ServiceError> {
    if actor.has_any_role(allowed) {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(format!(
            "Requires one of roles: {allowed:?}"
        )))
    }
}
