//! Caller identity for a pipeline run.
//!
//! Authentication happens upstream; the runner only receives the resolved
//! context. It uses it for two things: deciding whether relation hydration
//! may skip permission checks, and stamping the actor on change events.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tessera_events::Actor;
use uuid::Uuid;

/// How the caller authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// API key authentication
    ApiKey,

    /// JWT token authentication
    Jwt,
}

/// Resolved caller context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    pub workspace_id: Uuid,

    /// User ID (JWT callers)
    pub user_id: Option<String>,

    /// API key ID (API-key callers)
    pub api_key_id: Option<String>,

    pub auth_method: AuthMethod,

    /// Object types this caller may read. `None` means all of them.
    pub readable_object_types: Option<BTreeSet<String>>,
}

impl AuthContext {
    /// Context for an API-key principal.
    pub fn api_key(workspace_id: Uuid, api_key_id: impl Into<String>) -> Self {
        Self {
            workspace_id,
            user_id: None,
            api_key_id: Some(api_key_id.into()),
            auth_method: AuthMethod::ApiKey,
            readable_object_types: None,
        }
    }

    /// Context for a user authenticated by JWT.
    pub fn user(workspace_id: Uuid, user_id: impl Into<String>) -> Self {
        Self {
            workspace_id,
            user_id: Some(user_id.into()),
            api_key_id: None,
            auth_method: AuthMethod::Jwt,
            readable_object_types: None,
        }
    }

    /// Restrict reads to the given object types.
    pub fn with_readable_object_types<I, S>(mut self, object_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.readable_object_types = Some(object_types.into_iter().map(Into::into).collect());
        self
    }

    /// API-key principals are trusted and bypass per-object permission checks.
    pub fn is_trusted_caller(&self) -> bool {
        self.auth_method == AuthMethod::ApiKey
    }

    pub fn can_read(&self, object_type: &str) -> bool {
        match &self.readable_object_types {
            Some(allowed) => allowed.contains(object_type),
            None => true,
        }
    }

    pub fn actor(&self) -> Actor {
        Actor {
            workspace_id: Some(self.workspace_id),
            user_id: self.user_id.clone(),
            api_key_id: self.api_key_id.clone(),
        }
    }
}
