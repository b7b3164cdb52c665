//! Transport session layer.
//!
//! Server-side session records addressed by an HMAC-signed cookie id. The
//! core only ever touches two fields: the authenticated user id and the
//! transient remember-me flag recorded between login begin and callback.

use std::collections::HashMap;
use std::sync::RwLock;

use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "sid";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionData {
    pub user_id: Option<String>,
    pub rememberme_checked: bool,
}

pub struct SessionManager {
    secret: String,
    sessions: RwLock<HashMap<String, SessionData>>,
}

impl SessionManager {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    fn mac(&self, id: &str) -> Hmac<Sha256> {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret.as_bytes())
            .unwrap_or_else(|_| unreachable!("hmac key length is unrestricted"));
        mac.update(id.as_bytes());
        mac
    }

    /// Cookie value for a session id: `{id}.{signature}`.
    pub fn cookie_value(&self, id: &str) -> String {
        let signature = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .encode(self.mac(id).finalize().into_bytes());
        format!("{id}.{signature}")
    }

    /// Extract the session id from a presented cookie value, rejecting
    /// tampered signatures.
    pub fn verify_cookie(&self, value: &str) -> Option<String> {
        let (id, signature) = value.rsplit_once('.')?;
        let signature = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(signature)
            .ok()?;
        self.mac(id).verify_slice(&signature).ok()?;
        Some(id.to_string())
    }

    /// Resolve a presented cookie into `(session id, data, is_new)`. A
    /// missing or tampered cookie starts a fresh session.
    pub fn open(&self, cookie: Option<&str>) -> (String, SessionData, bool) {
        if let Some(id) = cookie.and_then(|value| self.verify_cookie(value)) {
            let data = self.get(&id);
            return (id, data, false);
        }
        (Uuid::new_v4().to_string(), SessionData::default(), true)
    }

    pub fn get(&self, id: &str) -> SessionData {
        self.sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn save(&self, id: &str, data: SessionData) {
        self.sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.to_string(), data);
    }

    pub fn update(&self, id: &str, f: impl FnOnce(&mut SessionData)) -> SessionData {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        let data = sessions.entry(id.to_string()).or_default();
        f(data);
        data.clone()
    }
}
