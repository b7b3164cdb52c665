//! Local projections of remote identities.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{FedError, Result};
use crate::store::UserStore;

/// Strip the `acct:` scheme prefix from a webfinger identifier.
pub fn normalize_id(id: &str) -> &str {
    id.strip_prefix("acct:").unwrap_or(id)
}

/// Hostname part of a `user@host` identifier, lowercased.
pub fn hostname_of(id: &str) -> Result<String> {
    normalize_id(id)
        .split_once('@')
        .map(|(_, host)| host.to_lowercase())
        .filter(|host| !host.is_empty())
        .ok_or_else(|| FedError::Validation(format!("not a user@host identifier: {id}")))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Href {
    pub href: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    pub url: String,
}

/// Identity document returned by a remote host's whoami endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Person {
    pub id: String,
    #[serde(rename = "displayName", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub links: HashMap<String, Href>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub followers: Option<Collection>,
}

impl Person {
    pub fn inbox(&self) -> Option<&str> {
        self.links.get("activity-inbox").map(|l| l.href.as_str())
    }

    pub fn outbox(&self) -> Option<&str> {
        self.links.get("activity-outbox").map(|l| l.href.as_str())
    }

    pub fn followers_url(&self) -> Option<&str> {
        self.followers.as_ref().map(|c| c.url.as_str())
    }

    /// A profile lacking any of these endpoints is not federation-capable.
    pub fn federation_links(&self) -> Result<(&str, &str, &str)> {
        let inbox = self
            .inbox()
            .ok_or_else(|| FedError::Validation(format!("no activity inbox for {}", self.id)))?;
        let outbox = self
            .outbox()
            .ok_or_else(|| FedError::Validation(format!("no activity outbox for {}", self.id)))?;
        let followers = self
            .followers_url()
            .ok_or_else(|| FedError::Validation(format!("no followers for {}", self.id)))?;
        Ok((inbox, outbox, followers))
    }
}

/// Local record for a remote identity, keyed by normalized `user@host` id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalUser {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    pub token: String,
    pub secret: String,
    pub inbox: String,
    pub outbox: String,
    pub followers: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl LocalUser {
    /// Project an identity document into a new local user holding the given
    /// access credentials.
    pub fn from_person(person: &Person, token: &str, secret: &str) -> Result<Self> {
        let (inbox, outbox, followers) = person.federation_links()?;
        let now = Utc::now();
        Ok(Self {
            id: normalize_id(&person.id).to_string(),
            name: person.display_name.clone(),
            homepage: person.url.clone(),
            token: token.to_string(),
            secret: secret.to_string(),
            inbox: inbox.to_string(),
            outbox: outbox.to_string(),
            followers: followers.to_string(),
            created: now,
            updated: now,
        })
    }

    pub fn hostname(&self) -> Result<String> {
        hostname_of(&self.id)
    }
}

/// Map a remote identity to a local user, creating one on first contact.
///
/// Repeat logins return the stored record as-is; profile fields are not
/// refreshed.
pub async fn resolve_or_create(
    users: &dyn UserStore,
    person: &Person,
    token: &str,
    secret: &str,
) -> Result<(LocalUser, bool)> {
    let id = normalize_id(&person.id);
    if let Some(user) = users.get_user(id).await? {
        tracing::debug!(user_id = %user.id, "resolved existing user");
        return Ok((user, false));
    }
    let user = users
        .create_user(LocalUser::from_person(person, token, secret)?)
        .await?;
    tracing::info!(user_id = %user.id, "created user from remote identity");
    Ok((user, true))
}

/// The closed set of activity verbs a user can post.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ActivityVerb {
    Accept,
    Access,
    Acknowledge,
    Add,
    Agree,
    Append,
    Approve,
    Archive,
    Assign,
    At,
    Attach,
    Attend,
    Author,
    Authorize,
    Borrow,
    Build,
    Cancel,
    Checkin,
    Close,
    Complete,
    Confirm,
    Consume,
    Create,
    Delete,
    Deliver,
    Deny,
    Disagree,
    Dislike,
    Experience,
    Favorite,
    Find,
    Follow,
    Give,
    Host,
    Ignore,
    Insert,
    Install,
    Interact,
    Invite,
    Join,
    Leave,
    Like,
    Listen,
    Lose,
    MakeFriend,
    Open,
    Play,
    Post,
    Present,
    Purchase,
    Qualify,
    Read,
    Receive,
    Reject,
    Remove,
    RemoveFriend,
    Replace,
    Request,
    RequestFriend,
    Resolve,
    Return,
    Retract,
    RsvpMaybe,
    RsvpNo,
    RsvpYes,
    Satisfy,
    Save,
    Schedule,
    Search,
    Sell,
    Send,
    Share,
    Sponsor,
    Start,
    StopFollowing,
    Submit,
    Tag,
    Terminate,
    Tie,
    Unfavorite,
    Unlike,
    Unsatisfy,
    Unsave,
    Unshare,
    Update,
    Use,
    Watch,
    Win,
}

/// One activity to post to a user's remote outbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub verb: ActivityVerb,
    pub object: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published: Option<DateTime<Utc>>,
}

impl Activity {
    pub fn new(verb: ActivityVerb, object: serde_json::Value) -> Self {
        Self {
            verb,
            object,
            target: None,
            published: Some(Utc::now()),
        }
    }

    pub fn with_target(mut self, target: serde_json::Value) -> Self {
        self.target = Some(target);
        self
    }
}
