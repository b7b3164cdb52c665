//! Per-request identity resolution and access guards.
//!
//! Every request passes through [`Authenticator::resolve`] exactly once; the
//! outcome says who the request belongs to, whether the remember-me cookie
//! was rotated, and whether a dead cookie should be cleared. Route handlers
//! then apply the pure guard functions to enforce their access rules.

use std::sync::Arc;

use crate::error::{FedError, Result};
use crate::store::{RememberMe, TokenStore, UserStore};
use crate::user::LocalUser;

/// Outcome of resolving one request's identity.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// The authenticated user, if any.
    pub user: Option<LocalUser>,
    /// User id to record in the session when it was newly established by a
    /// remember-me redemption this request.
    pub established_user_id: Option<String>,
    /// Replacement token to hand back as a fresh cookie.
    pub rotated: Option<RememberMe>,
    /// The presented remember-me cookie was unknown and should be cleared.
    pub clear_cookie: bool,
}

pub struct Authenticator {
    users: Arc<dyn UserStore>,
    tokens: Arc<dyn TokenStore>,
}

impl Authenticator {
    pub fn new(users: Arc<dyn UserStore>, tokens: Arc<dyn TokenStore>) -> Self {
        Self { users, tokens }
    }

    /// Resolve the request's identity from the session and the remember-me
    /// cookie.
    ///
    /// Precedence: an authenticated session wins; otherwise a valid
    /// remember-me cookie is redeemed (consumed and replaced); otherwise the
    /// request is anonymous. A session naming a user the store no longer has
    /// is an error; an unknown remember-me cookie only downgrades to
    /// anonymous and asks for the cookie to be cleared.
    pub async fn resolve(
        &self,
        session_user: Option<&str>,
        rememberme: Option<&str>,
    ) -> Result<Resolution> {
        if let Some(id) = session_user {
            let user = self
                .users
                .get_user(id)
                .await?
                .ok_or_else(|| FedError::Auth(format!("session names unknown user {id}")))?;
            return Ok(Resolution {
                user: Some(user),
                ..Resolution::default()
            });
        }

        let Some(value) = rememberme else {
            return Ok(Resolution::default());
        };

        let Some(token) = self.tokens.get_rememberme(value).await? else {
            tracing::debug!("unknown remember-me cookie; clearing");
            return Ok(Resolution {
                clear_cookie: true,
                ..Resolution::default()
            });
        };

        let user_id = token.user.clone();
        let (_, user, fresh) = tokio::try_join!(
            self.tokens.delete_rememberme(value),
            async {
                self.users
                    .get_user(&user_id)
                    .await?
                    .ok_or_else(|| FedError::not_found("user", &user_id))
            },
            self.tokens.create_rememberme(&token.user),
        )
        .map_err(|e| FedError::Auth(format!("remember-me redemption failed: {e}")))?;

        tracing::debug!(user_id = %user.id, "redeemed remember-me cookie");
        Ok(Resolution {
            established_user_id: Some(user.id.clone()),
            user: Some(user),
            rotated: Some(fresh),
            clear_cookie: false,
        })
    }
}

/// Require an authenticated user.
pub fn require_user(user: Option<&LocalUser>) -> Result<&LocalUser> {
    user.ok_or_else(|| FedError::Auth("User is required".to_string()))
}

/// Require that nobody is logged in.
pub fn require_anonymous(user: Option<&LocalUser>) -> Result<()> {
    match user {
        None => Ok(()),
        Some(_) => Err(FedError::Auth("Already logged in".to_string())),
    }
}

/// Always passes. Marks routes that tolerate either state.
pub fn optional(user: Option<&LocalUser>) -> Option<&LocalUser> {
    user
}

/// Require that the authenticated user matches the addressed id.
pub fn require_self<'a>(user: Option<&'a LocalUser>, id: &str) -> Result<&'a LocalUser> {
    let user = require_user(user)?;
    if user.id != id {
        return Err(FedError::Auth("Must be the same user".to_string()));
    }
    Ok(user)
}
