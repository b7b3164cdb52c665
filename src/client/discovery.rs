//! Webfinger-style host discovery.
//!
//! A remote host advertises its dialback/OAuth endpoints in a small metadata
//! document at `/.well-known/host-meta.json`.

use serde::{Deserialize, Serialize};

use crate::error::{FedError, Result};

pub const REL_REGISTRATION: &str = "registration_endpoint";
pub const REL_REQUEST_TOKEN: &str = "http://apinamespace.org/oauth/request_token";
pub const REL_AUTHORIZE: &str = "http://apinamespace.org/oauth/authorize";
pub const REL_ACCESS_TOKEN: &str = "http://apinamespace.org/oauth/access_token";
pub const REL_WHOAMI: &str = "http://apinamespace.org/activitypub/whoami";
pub const REL_DIALBACK: &str = "dialback";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostMetaLink {
    pub rel: String,
    pub href: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostMeta {
    #[serde(default)]
    pub links: Vec<HostMetaLink>,
}

impl HostMeta {
    pub fn link(&self, rel: &str) -> Option<&str> {
        self.links
            .iter()
            .find(|link| link.rel == rel)
            .map(|link| link.href.as_str())
    }
}

/// Endpoint URLs learned from one host's metadata document.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub registration: Option<String>,
    pub request_token: String,
    pub authorize: String,
    pub access_token: String,
    pub whoami: String,
}

/// Fetch and validate a remote host's metadata document.
///
/// `root` is the scheme-qualified host root, e.g. `https://example.org`.
pub async fn fetch_endpoints(
    client: &reqwest::Client,
    root: &str,
    user_agent: &str,
) -> Result<Endpoints> {
    let url = format!("{root}/.well-known/host-meta.json");
    let resp = client
        .get(&url)
        .header(reqwest::header::USER_AGENT, user_agent)
        .header("Accept", "application/json")
        .send()
        .await
        .map_err(|e| FedError::Discovery(format!("host-meta fetch failed for {root}: {e}")))?;
    if !resp.status().is_success() {
        return Err(FedError::Discovery(format!(
            "host-meta fetch for {root} returned status {}",
            resp.status()
        )));
    }
    let meta: HostMeta = resp
        .json()
        .await
        .map_err(|e| FedError::Discovery(format!("host-meta for {root} unparsable: {e}")))?;

    let require = |rel: &str| -> Result<String> {
        meta.link(rel)
            .map(str::to_string)
            .ok_or_else(|| FedError::Discovery(format!("host-meta for {root} missing link {rel}")))
    };

    Ok(Endpoints {
        registration: meta.link(REL_REGISTRATION).map(str::to_string),
        request_token: require(REL_REQUEST_TOKEN)?,
        authorize: require(REL_AUTHORIZE)?,
        access_token: require(REL_ACCESS_TOKEN)?,
        whoami: require(REL_WHOAMI)?,
    })
}
