//! OAuth 1.0a request signing (HMAC-SHA1) and form-encoded token responses.

use std::borrow::Cow;
use std::collections::HashMap;

use base64::Engine;
use hmac::{Hmac, Mac};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha1::Sha1;
use uuid::Uuid;

use crate::error::{FedError, Result};

/// RFC 3986 unreserved characters pass through; everything else is encoded.
const OAUTH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Consumer and (optionally) token credentials for one signed request.
#[derive(Debug, Clone, Copy)]
pub struct Credentials<'a> {
    pub consumer_key: &'a str,
    pub consumer_secret: &'a str,
    pub token: Option<&'a str>,
    pub token_secret: Option<&'a str>,
}

impl<'a> Credentials<'a> {
    pub fn consumer(consumer_key: &'a str, consumer_secret: &'a str) -> Self {
        Self {
            consumer_key,
            consumer_secret,
            token: None,
            token_secret: None,
        }
    }

    pub fn with_token(mut self, token: &'a str, token_secret: &'a str) -> Self {
        self.token = Some(token);
        self.token_secret = Some(token_secret);
        self
    }
}

pub(crate) fn encode(value: &str) -> Cow<'_, str> {
    utf8_percent_encode(value, OAUTH_ENCODE_SET).into()
}

/// Normalized signature base string per RFC 5849 §3.4.1.
pub(crate) fn base_string(method: &str, url: &str, params: &[(String, String)]) -> Result<String> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| FedError::Handshake(format!("unsignable URL {url}: {e}")))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| FedError::Handshake(format!("unsignable URL {url}: no host")))?;
    let base_uri = match parsed.port() {
        Some(port) => format!("{}://{}:{}{}", parsed.scheme(), host, port, parsed.path()),
        None => format!("{}://{}{}", parsed.scheme(), host, parsed.path()),
    };

    let mut pairs: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (encode(k).into_owned(), encode(v).into_owned()))
        .collect();
    for (k, v) in parsed.query_pairs() {
        pairs.push((encode(&k).into_owned(), encode(&v).into_owned()));
    }
    pairs.sort();
    let param_string = pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    Ok(format!(
        "{}&{}&{}",
        method.to_uppercase(),
        encode(&base_uri),
        encode(&param_string)
    ))
}

/// HMAC-SHA1 signature over the base string, base64-encoded.
pub(crate) fn sign(base: &str, consumer_secret: &str, token_secret: Option<&str>) -> String {
    let key = format!(
        "{}&{}",
        encode(consumer_secret),
        encode(token_secret.unwrap_or(""))
    );
    // HMAC accepts keys of any length.
    let mut mac = Hmac::<Sha1>::new_from_slice(key.as_bytes())
        .unwrap_or_else(|_| unreachable!("hmac key length is unrestricted"));
    mac.update(base.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
}

/// Build the `Authorization: OAuth ...` header for one request.
///
/// `extra` holds additional protocol parameters (`oauth_callback`,
/// `oauth_verifier`); they are signed and carried in the header.
pub fn authorization_header(
    method: &str,
    url: &str,
    credentials: &Credentials<'_>,
    extra: &[(&str, &str)],
) -> Result<String> {
    let nonce = Uuid::new_v4().simple().to_string();
    let timestamp = chrono::Utc::now().timestamp().to_string();

    let mut params: Vec<(String, String)> = vec![
        (
            "oauth_consumer_key".to_string(),
            credentials.consumer_key.to_string(),
        ),
        ("oauth_nonce".to_string(), nonce),
        (
            "oauth_signature_method".to_string(),
            "HMAC-SHA1".to_string(),
        ),
        ("oauth_timestamp".to_string(), timestamp),
        ("oauth_version".to_string(), "1.0".to_string()),
    ];
    if let Some(token) = credentials.token {
        params.push(("oauth_token".to_string(), token.to_string()));
    }
    for (k, v) in extra {
        params.push((k.to_string(), v.to_string()));
    }

    let base = base_string(method, url, &params)?;
    let signature = sign(&base, credentials.consumer_secret, credentials.token_secret);
    params.push(("oauth_signature".to_string(), signature));

    let fields = params
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", encode(k), encode(v)))
        .collect::<Vec<_>>()
        .join(", ");
    Ok(format!("OAuth {fields}"))
}

/// Decode an `application/x-www-form-urlencoded` body.
pub fn parse_form(body: &str) -> HashMap<String, String> {
    body.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_component(k), decode_component(v))
        })
        .collect()
}

fn decode_component(value: &str) -> String {
    let value = value.replace('+', " ");
    percent_decode_str(&value).decode_utf8_lossy().into_owned()
}

/// Parse a temporary- or access-token response body into
/// `(token, token_secret, remaining fields)`.
pub fn parse_token_response(body: &str) -> Result<(String, String, HashMap<String, String>)> {
    let mut fields = parse_form(body);
    let token = fields
        .remove("oauth_token")
        .ok_or_else(|| FedError::Handshake("token response missing oauth_token".to_string()))?;
    let secret = fields.remove("oauth_token_secret").ok_or_else(|| {
        FedError::Handshake("token response missing oauth_token_secret".to_string())
    })?;
    Ok((token, secret, fields))
}
