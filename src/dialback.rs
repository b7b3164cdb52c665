//! Dialback trust bootstrap.
//!
//! Before a remote host hands consumer credentials to a client that merely
//! claims a hostname, it calls that hostname's advertised dialback endpoint
//! to confirm the request really originated there. We mint a single-use token
//! per outbound dialback-authenticated request and answer the verification
//! callback here.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{FedError, Result};
use crate::store::{DialbackRecord, DialbackStore};

/// Maximum skew accepted between the echoed date and the minted token.
fn date_window() -> Duration {
    Duration::minutes(5)
}

/// Form body a remote host posts to our dialback endpoint.
#[derive(Debug, Deserialize)]
pub struct DialbackQuery {
    pub host: String,
    pub token: String,
    pub date: String,
    #[serde(default)]
    pub url: Option<String>,
}

pub struct Dialback {
    hostname: String,
    store: Arc<dyn DialbackStore>,
}

impl Dialback {
    pub fn new(hostname: impl Into<String>, store: Arc<dyn DialbackStore>) -> Self {
        Self {
            hostname: hostname.into(),
            store,
        }
    }

    /// Mint and persist a token for one outbound request.
    pub async fn mint(&self) -> Result<DialbackRecord> {
        let record = DialbackRecord {
            token: Uuid::new_v4().to_string(),
            host: self.hostname.clone(),
            created: Utc::now(),
        };
        self.store.insert_dialback(record.clone()).await?;
        Ok(record)
    }

    /// `Authorization` header value claiming this site's identity.
    pub fn header(record: &DialbackRecord) -> String {
        format!(
            "Dialback host=\"{}\", token=\"{}\"",
            record.host, record.token
        )
    }

    /// Answer a verification callback. The token is consumed whether or not
    /// verification succeeds.
    pub async fn verify(&self, query: &DialbackQuery) -> Result<()> {
        if query.host != self.hostname {
            return Err(FedError::Auth(format!(
                "dialback for unknown host {}",
                query.host
            )));
        }
        let date = parse_http_date(&query.date)?;
        let record = self
            .store
            .take_dialback(&query.host, &query.token)
            .await?
            .ok_or_else(|| FedError::Auth("unknown or reused dialback token".to_string()))?;
        let skew = (date - record.created).abs();
        if skew > date_window() {
            return Err(FedError::Auth(format!(
                "dialback date out of range by {}s",
                skew.num_seconds()
            )));
        }
        tracing::debug!(host = %query.host, "dialback verified");
        Ok(())
    }
}

fn parse_http_date(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| FedError::Auth(format!("unparsable dialback date {value}: {e}")))
}
