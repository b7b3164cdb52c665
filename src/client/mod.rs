//! Per-hostname remote host client.
//!
//! Speaks the federated handshake protocol to exactly one remote hostname at
//! a time: discovery, consumer registration, the OAuth token exchanges, and
//! the authenticated whoami and outbox calls. Remote calls are isolated per
//! hostname so one misbehaving peer cannot corrupt state for another, and
//! discovery results are cached as [`RemoteHost`] records.

pub mod discovery;
pub mod oauth;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{Protocol, SiteConfig};
use crate::dialback::Dialback;
use crate::error::{FedError, Result};
use crate::store::{DialbackStore, HostStore, RequestToken, TokenStore};
use crate::user::{Activity, LocalUser, Person};

use oauth::Credentials;

/// A federated peer: cached consumer credentials and discovered endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteHost {
    pub hostname: String,
    pub consumer_key: String,
    pub consumer_secret: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration_endpoint: Option<String>,
    pub request_token_endpoint: String,
    pub authorize_endpoint: String,
    pub access_token_endpoint: String,
    pub whoami_endpoint: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl RemoteHost {
    /// Redirect target on this host's authorization endpoint for the given
    /// request token. Pure and deterministic.
    pub fn authorize_url(&self, token: &RequestToken) -> String {
        let sep = if self.authorize_endpoint.contains('?') {
            '&'
        } else {
            '?'
        };
        format!(
            "{}{}oauth_token={}",
            self.authorize_endpoint,
            sep,
            oauth::encode(&token.token)
        )
    }
}

#[derive(Debug, Deserialize)]
struct ClientRegistration {
    client_id: String,
    client_secret: String,
}

/// Client side of the federated handshake.
pub struct HostClient {
    http: reqwest::Client,
    site: SiteConfig,
    hosts: Arc<dyn HostStore>,
    tokens: Arc<dyn TokenStore>,
    dialback: Dialback,
    remote_protocol: Protocol,
}

impl HostClient {
    pub fn new(
        site: SiteConfig,
        hosts: Arc<dyn HostStore>,
        tokens: Arc<dyn TokenStore>,
        dialbacks: Arc<dyn DialbackStore>,
    ) -> Self {
        let dialback = Dialback::new(site.hostname.clone(), dialbacks);
        Self {
            http: reqwest::Client::new(),
            site,
            hosts,
            tokens,
            dialback,
            remote_protocol: Protocol::Https,
        }
    }

    /// Scheme used to reach remote hosts. Tests point this at plain HTTP
    /// mock servers.
    pub fn with_remote_protocol(mut self, protocol: Protocol) -> Self {
        self.remote_protocol = protocol;
        self
    }

    fn root(&self, hostname: &str) -> String {
        format!("{}://{}", self.remote_protocol, hostname)
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .header(reqwest::header::USER_AGENT, self.site.user_agent())
    }

    /// Return the cached host record, or discover the hostname's endpoints,
    /// register as a consumer, and persist the result.
    pub async fn ensure(&self, hostname: &str) -> Result<RemoteHost> {
        let hostname = hostname.to_lowercase();
        if let Some(host) = self.hosts.get_host(&hostname).await? {
            return Ok(host);
        }

        tracing::info!(hostname = %hostname, "discovering remote host");
        let endpoints = discovery::fetch_endpoints(
            &self.http,
            &self.root(&hostname),
            &self.site.user_agent(),
        )
        .await?;
        let (consumer_key, consumer_secret) = match &endpoints.registration {
            Some(url) => self.register_client(&hostname, url).await?,
            // Hosts without client registration accept dialback identity:
            // consumer key is our hostname, secret is empty.
            None => (self.site.hostname.clone(), String::new()),
        };

        let now = Utc::now();
        self.hosts
            .put_host(RemoteHost {
                hostname,
                consumer_key,
                consumer_secret,
                registration_endpoint: endpoints.registration,
                request_token_endpoint: endpoints.request_token,
                authorize_endpoint: endpoints.authorize,
                access_token_endpoint: endpoints.access_token,
                whoami_endpoint: endpoints.whoami,
                created: now,
                updated: now,
            })
            .await
    }

    async fn register_client(&self, hostname: &str, url: &str) -> Result<(String, String)> {
        let record = self.dialback.mint().await?;
        tracing::debug!(hostname = %hostname, "registering as oauth consumer");
        let resp = self
            .request(reqwest::Method::POST, url)
            .header(reqwest::header::AUTHORIZATION, Dialback::header(&record))
            .header(reqwest::header::DATE, record.created.to_rfc2822())
            .form(&[
                ("type", "client_associate"),
                ("application_name", &self.site.name),
                ("application_type", "web"),
            ])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(FedError::Handshake(format!(
                "client registration with {hostname} failed with status {}",
                resp.status()
            )));
        }
        let registration: ClientRegistration = resp.json().await.map_err(|e| {
            FedError::Handshake(format!("client registration response unparsable: {e}"))
        })?;
        Ok((registration.client_id, registration.client_secret))
    }

    /// Obtain and persist a temporary credential for one login handshake.
    pub async fn get_request_token(&self, host: &RemoteHost) -> Result<RequestToken> {
        let callback = self.site.url(&format!("/authorized/{}", host.hostname));
        let credentials = Credentials::consumer(&host.consumer_key, &host.consumer_secret);
        let auth = oauth::authorization_header(
            "POST",
            &host.request_token_endpoint,
            &credentials,
            &[("oauth_callback", &callback)],
        )?;
        let resp = self
            .request(reqwest::Method::POST, &host.request_token_endpoint)
            .header(reqwest::header::AUTHORIZATION, auth)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(FedError::Handshake(format!(
                "request token from {} failed with status {}",
                host.hostname,
                resp.status()
            )));
        }
        let body = resp.text().await?;
        let (token, secret, _extra) = oauth::parse_token_response(&body)?;
        self.tokens
            .create_request_token(RequestToken {
                hostname: host.hostname.clone(),
                token,
                secret,
                created: Utc::now(),
            })
            .await
    }

    /// Exchange a verified request token for a long-lived access token.
    pub async fn get_access_token(
        &self,
        host: &RemoteHost,
        token: &RequestToken,
        verifier: &str,
    ) -> Result<(String, String, HashMap<String, String>)> {
        let credentials = Credentials::consumer(&host.consumer_key, &host.consumer_secret)
            .with_token(&token.token, &token.secret);
        let auth = oauth::authorization_header(
            "POST",
            &host.access_token_endpoint,
            &credentials,
            &[("oauth_verifier", verifier)],
        )?;
        let resp = self
            .request(reqwest::Method::POST, &host.access_token_endpoint)
            .header(reqwest::header::AUTHORIZATION, auth)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(FedError::Handshake(format!(
                "access token from {} failed with status {}",
                host.hostname,
                resp.status()
            )));
        }
        let body = resp.text().await?;
        oauth::parse_token_response(&body)
    }

    /// Fetch the canonical remote profile for the authorized credentials.
    pub async fn whoami(
        &self,
        host: &RemoteHost,
        access_token: &str,
        token_secret: &str,
    ) -> Result<Person> {
        let credentials = Credentials::consumer(&host.consumer_key, &host.consumer_secret)
            .with_token(access_token, token_secret);
        let auth = oauth::authorization_header("GET", &host.whoami_endpoint, &credentials, &[])?;
        let resp = self
            .request(reqwest::Method::GET, &host.whoami_endpoint)
            .header(reqwest::header::AUTHORIZATION, auth)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(FedError::Handshake(format!(
                "whoami at {} failed with status {}",
                host.hostname,
                resp.status()
            )));
        }
        let person: Person = resp
            .json()
            .await
            .map_err(|e| FedError::Identity(format!("whoami response unparsable: {e}")))?;
        person.federation_links().map_err(|e| match e {
            FedError::Validation(msg) => FedError::Identity(msg),
            other => other,
        })?;
        Ok(person)
    }

    /// Post an activity to the user's remote outbox.
    pub async fn post_activity(
        &self,
        user: &LocalUser,
        activity: &Activity,
    ) -> Result<serde_json::Value> {
        let hostname = user.hostname()?;
        let host = self
            .hosts
            .get_host(&hostname)
            .await?
            .ok_or_else(|| FedError::not_found("host", hostname))?;
        let credentials = Credentials::consumer(&host.consumer_key, &host.consumer_secret)
            .with_token(&user.token, &user.secret);
        let auth = oauth::authorization_header("POST", &user.outbox, &credentials, &[])?;
        let resp = self
            .request(reqwest::Method::POST, &user.outbox)
            .header(reqwest::header::AUTHORIZATION, auth)
            .json(activity)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(FedError::Handshake(format!(
                "posting to {} failed with status {status}: {body}",
                user.outbox
            )));
        }
        let json_body = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/json"));
        if !json_body {
            return Err(FedError::Handshake(format!(
                "posting to {} returned a non-JSON body",
                user.outbox
            )));
        }
        let posted = resp.json().await?;
        tracing::info!(user_id = %user.id, verb = %activity.verb, "posted activity");
        Ok(posted)
    }
}
