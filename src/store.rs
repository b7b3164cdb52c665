//! Persistence collaborators.
//!
//! Flat key-value semantics per entity: `get` returns `Option`, `create` is
//! fire-once, `delete` is idempotent. There is no update operation for the
//! token entities; delete-and-recreate is the only mutation path, which is
//! also how remember-me rotation is implemented.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::client::RemoteHost;
use crate::error::{FedError, Result};
use crate::user::LocalUser;

/// Ephemeral credential for one login handshake in progress.
///
/// At most one live token per `(hostname, token)` key; consumed exactly once
/// after callback processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestToken {
    pub hostname: String,
    pub token: String,
    pub secret: String,
    pub created: DateTime<Utc>,
}

impl RequestToken {
    pub fn key(hostname: &str, token: &str) -> String {
        format!("{hostname}/{token}")
    }

    pub fn key_of(&self) -> String {
        Self::key(&self.hostname, &self.token)
    }
}

/// Bearer credential behind the `rememberme` cookie.
///
/// Presenting one consumes it; a fresh token replaces it on every successful
/// use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RememberMe {
    pub uuid: String,
    pub user: String,
    pub created: DateTime<Utc>,
}

impl RememberMe {
    /// Build a new token for the given owner. The random value and creation
    /// time are generated here; callers never supply them.
    pub fn mint(user_id: &str) -> Result<Self> {
        if user_id.is_empty() {
            return Err(FedError::Validation(
                "no user ID for rememberme".to_string(),
            ));
        }
        Ok(Self {
            uuid: Uuid::new_v4().to_string(),
            user: user_id.to_string(),
            created: Utc::now(),
        })
    }
}

/// Single-use token minted for a dialback handshake with one remote host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialbackRecord {
    pub token: String,
    pub host: String,
    pub created: DateTime<Utc>,
}

/// Storage for the short-lived and long-lived login tokens.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn get_request_token(&self, hostname: &str, token: &str)
        -> Result<Option<RequestToken>>;
    async fn create_request_token(&self, token: RequestToken) -> Result<RequestToken>;
    async fn delete_request_token(&self, hostname: &str, token: &str) -> Result<()>;

    async fn get_rememberme(&self, value: &str) -> Result<Option<RememberMe>>;
    /// Mints and persists a fresh token for `user_id`. Fails with
    /// `Validation` when the owner id is empty.
    async fn create_rememberme(&self, user_id: &str) -> Result<RememberMe>;
    async fn delete_rememberme(&self, value: &str) -> Result<()>;
}

/// Storage for local user projections, keyed by normalized webfinger id.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_user(&self, id: &str) -> Result<Option<LocalUser>>;
    async fn create_user(&self, user: LocalUser) -> Result<LocalUser>;
}

/// Cache of discovered remote hosts, keyed by hostname.
#[async_trait]
pub trait HostStore: Send + Sync {
    async fn get_host(&self, hostname: &str) -> Result<Option<RemoteHost>>;
    /// Inserts or refreshes; hosts are never deleted by this subsystem.
    async fn put_host(&self, host: RemoteHost) -> Result<RemoteHost>;
}

/// Storage for in-flight dialback tokens.
#[async_trait]
pub trait DialbackStore: Send + Sync {
    async fn insert_dialback(&self, record: DialbackRecord) -> Result<()>;
    /// Removes and returns the record, enforcing single use.
    async fn take_dialback(&self, host: &str, token: &str) -> Result<Option<DialbackRecord>>;
}

/// In-memory implementation of all storage traits; the default driver and
/// the one the tests use.
#[derive(Default)]
pub struct MemoryStore {
    request_tokens: RwLock<HashMap<String, RequestToken>>,
    remembermes: RwLock<HashMap<String, RememberMe>>,
    users: RwLock<HashMap<String, LocalUser>>,
    hosts: RwLock<HashMap<String, RemoteHost>>,
    dialbacks: RwLock<HashMap<String, DialbackRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

// Lock poisoning cannot happen here: no panics while holding a guard.
fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn get_request_token(
        &self,
        hostname: &str,
        token: &str,
    ) -> Result<Option<RequestToken>> {
        Ok(read(&self.request_tokens)
            .get(&RequestToken::key(hostname, token))
            .cloned())
    }

    async fn create_request_token(&self, token: RequestToken) -> Result<RequestToken> {
        let mut map = write(&self.request_tokens);
        let key = token.key_of();
        if map.contains_key(&key) {
            return Err(FedError::Validation(format!(
                "request token already exists: {key}"
            )));
        }
        map.insert(key, token.clone());
        Ok(token)
    }

    async fn delete_request_token(&self, hostname: &str, token: &str) -> Result<()> {
        write(&self.request_tokens).remove(&RequestToken::key(hostname, token));
        Ok(())
    }

    async fn get_rememberme(&self, value: &str) -> Result<Option<RememberMe>> {
        Ok(read(&self.remembermes).get(value).cloned())
    }

    async fn create_rememberme(&self, user_id: &str) -> Result<RememberMe> {
        let token = RememberMe::mint(user_id)?;
        write(&self.remembermes).insert(token.uuid.clone(), token.clone());
        Ok(token)
    }

    async fn delete_rememberme(&self, value: &str) -> Result<()> {
        write(&self.remembermes).remove(value);
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn get_user(&self, id: &str) -> Result<Option<LocalUser>> {
        Ok(read(&self.users).get(id).cloned())
    }

    async fn create_user(&self, user: LocalUser) -> Result<LocalUser> {
        let mut map = write(&self.users);
        if map.contains_key(&user.id) {
            return Err(FedError::Validation(format!(
                "user already exists: {}",
                user.id
            )));
        }
        map.insert(user.id.clone(), user.clone());
        Ok(user)
    }
}

#[async_trait]
impl HostStore for MemoryStore {
    async fn get_host(&self, hostname: &str) -> Result<Option<RemoteHost>> {
        Ok(read(&self.hosts).get(hostname).cloned())
    }

    async fn put_host(&self, host: RemoteHost) -> Result<RemoteHost> {
        write(&self.hosts).insert(host.hostname.clone(), host.clone());
        Ok(host)
    }
}

#[async_trait]
impl DialbackStore for MemoryStore {
    async fn insert_dialback(&self, record: DialbackRecord) -> Result<()> {
        write(&self.dialbacks).insert(record.token.clone(), record);
        Ok(())
    }

    async fn take_dialback(&self, host: &str, token: &str) -> Result<Option<DialbackRecord>> {
        let mut map = write(&self.dialbacks);
        match map.get(token) {
            Some(record) if record.host == host => Ok(map.remove(token)),
            _ => Ok(None),
        }
    }
}
