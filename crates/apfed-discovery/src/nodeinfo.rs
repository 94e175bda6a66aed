//! `/.well-known/nodeinfo` pointer document and the NodeInfo 2.1 document.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::DiscoveryError;

static SOFTWARE_NAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9-]+$").expect("compile software name regex"));

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInfoPointerLink {
    pub rel: String,
    pub href: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInfoPointer {
    pub links: Vec<NodeInfoPointerLink>,
}

impl NodeInfoPointer {
    pub fn for_base_url(base_url: &str) -> Self {
        Self {
            links: vec![NodeInfoPointerLink {
                rel: "http://nodeinfo.diaspora.software/ns/schema/2.1".to_string(),
                href: format!("{}/nodeinfo/2.1", base_url.trim_end_matches('/')),
            }],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoftwareInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageStats {
    pub users: UserStats,
    pub local_posts: i64,
    pub local_comments: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserStats {
    pub total: i64,
    pub active_halfyear: i64,
    pub active_month: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInfo {
    pub version: String,
    pub software: SoftwareInfo,
    pub protocols: Vec<String>,
    pub usage: UsageStats,
    pub open_registrations: bool,
}

/// Validates a NodeInfo 2.1 document: `software.name` must match
/// `^[a-z0-9-]+$`, `protocols` must be non-empty, every count must be
/// non-negative, and `software.version` must be a serialized SemVer.
pub fn validate_node_info(info: &NodeInfo) -> Result<(), DiscoveryError> {
    if !SOFTWARE_NAME_REGEX.is_match(&info.software.name) {
        return Err(DiscoveryError::InvalidNodeInfo(
            "Invalid software name".to_string(),
        ));
    }
    if info.protocols.is_empty() {
        return Err(DiscoveryError::InvalidNodeInfo(
            "protocols must not be empty".to_string(),
        ));
    }
    if info.usage.users.total < 0
        || info.usage.users.active_halfyear < 0
        || info.usage.users.active_month < 0
        || info.usage.local_posts < 0
        || info.usage.local_comments < 0
    {
        return Err(DiscoveryError::InvalidNodeInfo(
            "counts must be non-negative".to_string(),
        ));
    }
    semver::Version::parse(&info.software.version).map_err(|_| {
        DiscoveryError::InvalidNodeInfo("software.version is not a valid SemVer".to_string())
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_node_info() -> NodeInfo {
        NodeInfo {
            version: "2.1".to_string(),
            software: SoftwareInfo {
                name: "apfed".to_string(),
                version: "1.2.3".to_string(),
            },
            protocols: vec!["activitypub".to_string()],
            usage: UsageStats {
                users: UserStats {
                    total: 10,
                    active_halfyear: 5,
                    active_month: 2,
                },
                local_posts: 100,
                local_comments: 40,
            },
            open_registrations: false,
        }
    }

    #[test]
    fn valid_document_passes() {
        assert!(validate_node_info(&valid_node_info()).is_ok());
    }

    #[test]
    fn scenario_c_invalid_software_name_is_rejected() {
        let mut info = valid_node_info();
        info.software.name = "INVALID-NAME".to_string();
        let err = validate_node_info(&info).unwrap_err();
        match err {
            DiscoveryError::InvalidNodeInfo(msg) => assert_eq!(msg, "Invalid software name"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn empty_protocols_is_rejected() {
        let mut info = valid_node_info();
        info.protocols.clear();
        assert!(validate_node_info(&info).is_err());
    }

    #[test]
    fn negative_counts_are_rejected() {
        let mut info = valid_node_info();
        info.usage.local_posts = -1;
        assert!(validate_node_info(&info).is_err());
    }

    #[test]
    fn non_semver_version_is_rejected() {
        let mut info = valid_node_info();
        info.software.version = "not-a-version".to_string();
        assert!(validate_node_info(&info).is_err());
    }

    #[test]
    fn pointer_document_points_at_2_1() {
        let pointer = NodeInfoPointer::for_base_url("https://example.com");
        assert_eq!(pointer.links[0].href, "https://example.com/nodeinfo/2.1");
    }
}
