//! Discovery endpoints: WebFinger (RFC 7033) and NodeInfo.

mod error;
mod nodeinfo;
mod webfinger;

pub use error::DiscoveryError;
pub use nodeinfo::{
    validate_node_info, NodeInfo, NodeInfoPointer, NodeInfoPointerLink, SoftwareInfo, UsageStats,
    UserStats,
};
pub use webfinger::{build_webfinger_response, extract_acct_name, Webfinger, WebfingerLink};
