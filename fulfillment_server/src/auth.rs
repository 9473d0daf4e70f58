//! Staff authentication.
//!
//! Staff tooling authenticates with a static API key in the `sfg-api-key` header. Keys are configured via the
//! `SFG_API_KEYS` environment variable as comma-separated `label:key:role|role` entries, e.g.
//! `carol:0a1b2c…:write|read_all,dash:9f8e…:read_all`. The ACL middleware resolves the key into [`StaffClaims`]
//! before any business logic runs; handlers that need the actor's name extract the claims from the request.

use std::{collections::HashMap, fmt, future::Ready};

use actix_web::{dev::Payload, FromRequest, HttpMessage, HttpRequest};
use fulfillment_engine::db_types::{Role, Roles};
use log::*;

use crate::errors::{AuthError, ServerError};

pub const API_KEY_HEADER: &str = "sfg-api-key";

/// The resolved identity of a staff request. Inserted into request extensions by the ACL middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaffClaims {
    /// The human label attached to the key, used as the audit actor for notes and movements.
    pub label: String,
    pub roles: Roles,
}

impl StaffClaims {
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&Role::SuperAdmin) || self.roles.contains(&role)
    }
}

impl FromRequest for StaffClaims {
    type Error = ServerError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let claims = req.extensions().get::<StaffClaims>().cloned();
        std::future::ready(claims.ok_or_else(|| {
            warn!("💻️ No staff claims found in request extensions. Is the route missing its ACL wrapper?");
            ServerError::AuthenticationError(AuthError::MissingApiKey)
        }))
    }
}

/// The configured key set. Lookups are by the key string itself; the map is tiny and lives for the process
/// lifetime.
#[derive(Clone, Default)]
pub struct ApiKeyRegistry {
    keys: HashMap<String, StaffClaims>,
}

impl fmt::Debug for ApiKeyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiKeyRegistry ({} keys)", self.keys.len())
    }
}

impl ApiKeyRegistry {
    pub fn from_env_var(value: Option<String>) -> Self {
        let mut keys = HashMap::new();
        let Some(value) = value else {
            warn!("🪛️ SFG_API_KEYS is not set. No staff endpoints will be accessible.");
            return Self { keys };
        };
        for entry in value.split(',').filter(|e| !e.trim().is_empty()) {
            let parts: Vec<&str> = entry.trim().splitn(3, ':').collect();
            let [label, key, roles] = parts.as_slice() else {
                warn!("🪛️ Ignoring malformed SFG_API_KEYS entry (want label:key:role|role): {entry}");
                continue;
            };
            let roles: Roles = roles
                .split('|')
                .filter_map(|r| {
                    r.parse::<Role>()
                        .map_err(|e| warn!("🪛️ Ignoring invalid role in SFG_API_KEYS entry {label}: {e}"))
                        .ok()
                })
                .collect();
            if roles.is_empty() {
                warn!("🪛️ SFG_API_KEYS entry {label} carries no valid roles and was skipped");
                continue;
            }
            if key.len() < 16 {
                warn!("🪛️ The API key for {label} is shorter than 16 characters. Use a longer one.");
            }
            keys.insert(key.to_string(), StaffClaims { label: label.to_string(), roles });
        }
        info!("🪛️ {} staff API keys configured", keys.len());
        Self { keys }
    }

    pub fn with_key(mut self, label: &str, key: &str, roles: Roles) -> Self {
        self.keys.insert(key.to_string(), StaffClaims { label: label.to_string(), roles });
        self
    }

    pub fn resolve(&self, key: &str) -> Option<&StaffClaims> {
        self.keys.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_labelled_keys_with_roles() {
        let registry = ApiKeyRegistry::from_env_var(Some(
            "carol:0123456789abcdef0123:write|read_all, dash:fedcba98765432100123:read_all".to_string(),
        ));
        let carol = registry.resolve("0123456789abcdef0123").unwrap();
        assert_eq!(carol.label, "carol");
        assert!(carol.has_role(Role::Write));
        assert!(carol.has_role(Role::ReadAll));
        let dash = registry.resolve("fedcba98765432100123").unwrap();
        assert!(dash.has_role(Role::ReadAll));
        assert!(!dash.has_role(Role::Write));
    }

    #[test]
    fn super_admin_implies_everything() {
        let registry =
            ApiKeyRegistry::from_env_var(Some("root:aaaaaaaaaaaaaaaaaaaa:super_admin".to_string()));
        let root = registry.resolve("aaaaaaaaaaaaaaaaaaaa").unwrap();
        assert!(root.has_role(Role::Write));
        assert!(root.has_role(Role::ReadAll));
    }

    #[test]
    fn malformed_entries_are_skipped() {
        let registry = ApiKeyRegistry::from_env_var(Some("garbage,carol:key_without_roles:".to_string()));
        assert!(registry.is_empty());
    }

    #[test]
    fn unset_means_no_access() {
        let registry = ApiKeyRegistry::from_env_var(None);
        assert!(registry.is_empty());
        assert!(registry.resolve("anything").is_none());
    }
}
