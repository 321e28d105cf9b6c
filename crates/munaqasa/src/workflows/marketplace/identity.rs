use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::domain::{Role, UserId};

/// Verified caller identity handed over by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Resolves an opaque credential into a verified actor.
pub trait IdentityProvider: Send + Sync {
    fn resolve(&self, token: &str) -> Option<Actor>;
}

/// Static token table, typically loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct TokenRegistry {
    tokens: HashMap<String, Actor>,
}

impl TokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>, actor: Actor) -> Self {
        self.insert(token, actor);
        self
    }

    pub fn insert(&mut self, token: impl Into<String>, actor: Actor) {
        self.tokens.insert(token.into(), actor);
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Distinct actors known to the registry, ordered by user id.
    pub fn actors(&self) -> Vec<Actor> {
        let mut actors: Vec<Actor> = self.tokens.values().copied().collect();
        actors.sort_by_key(|actor| actor.user_id);
        actors.dedup();
        actors
    }

    /// Parse `token=user_id:role` entries separated by commas.
    pub fn parse(spec: &str) -> Result<Self, IdentitySpecError> {
        let mut registry = Self::new();

        for entry in spec.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
            let (token, identity) = entry
                .split_once('=')
                .ok_or_else(|| IdentitySpecError::Malformed(entry.to_string()))?;
            let (user_id, role) = identity
                .split_once(':')
                .ok_or_else(|| IdentitySpecError::Malformed(entry.to_string()))?;

            let token = token.trim();
            if token.is_empty() {
                return Err(IdentitySpecError::Malformed(entry.to_string()));
            }
            let user_id = user_id
                .trim()
                .parse::<i64>()
                .map_err(|_| IdentitySpecError::InvalidUserId(entry.to_string()))?;
            let role =
                Role::parse(role).ok_or_else(|| IdentitySpecError::UnknownRole(role.to_string()))?;

            registry.insert(token, Actor::new(UserId(user_id), role));
        }

        Ok(registry)
    }
}

impl IdentityProvider for TokenRegistry {
    fn resolve(&self, token: &str) -> Option<Actor> {
        self.tokens.get(token).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentitySpecError {
    #[error("identity entry '{0}' must look like token=user_id:role")]
    Malformed(String),
    #[error("identity entry '{0}' has a non-numeric user id")]
    InvalidUserId(String),
    #[error("unknown role '{0}'")]
    UnknownRole(String),
}
