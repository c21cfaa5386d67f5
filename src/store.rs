//! Credential store
//!
//! The sub-negotiation looks passwords up through this trait under a
//! bounded deadline, so implementations may reach out to external systems.

use async_trait::async_trait;
use std::collections::HashMap;

/// Source of passwords for username/password authentication
#[async_trait]
pub trait Store: Send + Sync {
    /// Look up the password for a username.
    ///
    /// `Ok(None)` means the user is unknown and fails authentication;
    /// `Err` terminates the session without a status reply.
    async fn get_password(&self, username: &str) -> anyhow::Result<Option<String>>;
}

/// In-memory store over the configured static credentials
#[derive(Debug, Default)]
pub struct StaticStore {
    credentials: HashMap<String, String>,
}

impl StaticStore {
    /// Create a store from a username to password map
    pub fn new(credentials: HashMap<String, String>) -> Self {
        StaticStore { credentials }
    }
}

#[async_trait]
impl Store for StaticStore {
    async fn get_password(&self, username: &str) -> anyhow::Result<Option<String>> {
        Ok(self.credentials.get(username).cloned())
    }
}
