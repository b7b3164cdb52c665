//! fedlogin — federated login and session continuity for pump.io-style
//! social web clients.
//!
//! A site embeds this crate to let visitors log in with a `user@host`
//! webfinger address: the crate discovers the remote host's endpoints,
//! registers as an OAuth consumer (proving its identity over dialback),
//! walks the token-exchange handshake, and projects the remote profile into
//! a local user record. Session continuity across restarts comes from a
//! rotating single-use `rememberme` cookie.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use fedlogin::client::HostClient;
//! use fedlogin::config::SiteConfig;
//! use fedlogin::store::MemoryStore;
//! use fedlogin::web::{self, AppState};
//!
//! # async fn example() -> fedlogin::error::Result<()> {
//! let config = SiteConfig::from_env();
//! let store = Arc::new(MemoryStore::new());
//! let client = Arc::new(HostClient::new(
//!     config.clone(),
//!     store.clone(),
//!     store.clone(),
//!     store.clone(),
//! ));
//! let state = AppState::new(config, client, store.clone(), store.clone(), store);
//! web::serve(state).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod dialback;
pub mod error;
pub mod login;
pub mod middleware;
pub mod session;
pub mod store;
pub mod user;
pub mod web;

pub use client::{HostClient, RemoteHost};
pub use config::{Protocol, SiteConfig};
pub use error::{FedError, Result};
pub use login::{LoginOutcome, LoginService};
pub use middleware::{Authenticator, Resolution};
pub use store::{MemoryStore, RememberMe, RequestToken};
pub use user::{Activity, ActivityVerb, LocalUser, Person};
