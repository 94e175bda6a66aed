use apfed_error::ApfedError;

/// Narrow, synchronously-thrown errors for WebFinger and NodeInfo input
/// validation, converted into the shared taxonomy at the crate boundary.
#[derive(thiserror::Error, Debug)]
pub enum DiscoveryError {
    #[error("the webfinger identifier is invalid")]
    WrongFormat,
    #[error("the webfinger identifier doesn't match the local domain")]
    WrongDomain,
    #[error("no self link resolved to an actor")]
    NoValidLink,
    #[error("invalid node info: {0}")]
    InvalidNodeInfo(String),
}

impl From<DiscoveryError> for ApfedError {
    fn from(value: DiscoveryError) -> Self {
        ApfedError::malformed_input(value.to_string())
    }
}
