//! The federated login flow.
//!
//! Two halves of one handshake: [`LoginService::begin`] turns a webfinger
//! address into an authorization redirect on the user's home host, and
//! [`LoginService::complete`] turns the callback verifier into a local user
//! record. Session mutation is left to the web layer; this service only
//! reports what happened.

use std::sync::Arc;

use crate::client::HostClient;
use crate::error::{FedError, Result};
use crate::store::{RememberMe, TokenStore};
use crate::user::{self, LocalUser};

/// Outcome of a completed login handshake.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user: LocalUser,
    /// Whether this login created the local user record.
    pub is_new: bool,
    /// Token for the long-lived cookie, when the user asked to be remembered.
    pub rememberme: Option<RememberMe>,
}

pub struct LoginService {
    client: Arc<HostClient>,
    tokens: Arc<dyn TokenStore>,
    users: Arc<dyn crate::store::UserStore>,
}

impl LoginService {
    pub fn new(
        client: Arc<HostClient>,
        tokens: Arc<dyn TokenStore>,
        users: Arc<dyn crate::store::UserStore>,
    ) -> Self {
        Self {
            client,
            tokens,
            users,
        }
    }

    /// Start a login for the given webfinger address. Returns the remote
    /// authorization URL to redirect the browser to.
    pub async fn begin(&self, webfinger: &str) -> Result<String> {
        let webfinger = webfinger.trim();
        let hostname = user::hostname_of(webfinger)?;
        tracing::info!(webfinger = %user::normalize_id(webfinger), "starting login");
        let host = self.client.ensure(&hostname).await?;
        let request_token = self.client.get_request_token(&host).await?;
        Ok(host.authorize_url(&request_token))
    }

    /// Finish a login: redeem the callback's verifier against the request
    /// token recorded by [`begin`](Self::begin).
    ///
    /// The request token is consumed whether or not the exchange succeeds
    /// downstream; replaying the callback yields `NotFound`.
    pub async fn complete(
        &self,
        hostname: &str,
        oauth_token: &str,
        verifier: &str,
        remember: bool,
    ) -> Result<LoginOutcome> {
        let (request_token, host) = tokio::try_join!(
            async {
                self.tokens
                    .get_request_token(hostname, oauth_token)
                    .await?
                    .ok_or_else(|| {
                        FedError::not_found("request token", format!("{hostname}/{oauth_token}"))
                    })
            },
            async {
                self.client
                    .ensure(hostname)
                    .await
            },
        )?;

        let (access_token, token_secret, _extra) = self
            .client
            .get_access_token(&host, &request_token, verifier)
            .await?;

        let (_, person) = tokio::try_join!(
            self.tokens.delete_request_token(hostname, oauth_token),
            self.client.whoami(&host, &access_token, &token_secret),
        )?;

        let (user, is_new) =
            user::resolve_or_create(self.users.as_ref(), &person, &access_token, &token_secret)
                .await?;

        let rememberme = if remember {
            Some(self.tokens.create_rememberme(&user.id).await?)
        } else {
            None
        };

        tracing::info!(user_id = %user.id, is_new, "login completed");
        Ok(LoginOutcome {
            user,
            is_new,
            rememberme,
        })
    }
}
