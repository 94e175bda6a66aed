//! `/.well-known/webfinger` resource descriptor handling.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::DiscoveryError;

static ACCT_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^acct:([\p{L}0-9_.\-]+)@(.*)$").expect("compile acct regex"));

/// A webfinger link entry.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct WebfingerLink {
    pub rel: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub href: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

/// A JRD webfinger response.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Webfinger {
    pub subject: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    pub links: Vec<WebfingerLink>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

/// Parses `resource=acct:name@domain`, requiring `domain` to equal
/// `local_domain`. Returns the extracted account name.
pub fn extract_acct_name<'q>(resource: &'q str, local_domain: &str) -> Result<&'q str, DiscoveryError> {
    let captures = ACCT_REGEX
        .captures(resource)
        .ok_or(DiscoveryError::WrongFormat)?;
    let name = captures.get(1).ok_or(DiscoveryError::WrongFormat)?;
    let domain = captures.get(2).map(|m| m.as_str()).unwrap_or_default();
    if domain != local_domain {
        return Err(DiscoveryError::WrongDomain);
    }
    Ok(name.as_str())
}

/// Builds the webfinger response for one actor IRI: a `self` link (AS2
/// JSON) and a `profile-page` link (HTML), as produced for the common case
/// where the same URL serves both representations via content negotiation.
pub fn build_webfinger_response(subject: impl Into<String>, actor_url: &str, actor_type: Option<&str>) -> Webfinger {
    let mut properties = BTreeMap::new();
    if let Some(kind) = actor_type {
        properties.insert(
            "https://www.w3.org/ns/activitystreams#type".to_string(),
            kind.to_string(),
        );
    }
    Webfinger {
        subject: subject.into(),
        aliases: vec![],
        links: vec![
            WebfingerLink {
                rel: Some("self".to_string()),
                kind: Some("application/activity+json".to_string()),
                href: Some(actor_url.to_string()),
                properties,
                ..Default::default()
            },
            WebfingerLink {
                rel: Some("http://webfinger.net/rel/profile-page".to_string()),
                kind: Some("text/html".to_string()),
                href: Some(actor_url.to_string()),
                ..Default::default()
            },
        ],
        properties: BTreeMap::new(),
    }
}
