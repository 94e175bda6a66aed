//! Shared error taxonomy used by every crate in the federation workspace.

use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Broad grouping of [`ErrorCode`]s, useful for metrics and log filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Malformed request bodies, templates, or JSON-LD documents.
    Input,
    /// Signature and key-related authentication failures.
    Security,
    /// Dispatch/routing outcomes: not found, not acceptable.
    Dispatch,
    /// Outbound delivery outcomes: transient/permanent failure.
    Delivery,
    /// Conflicts raised while registering handlers or listeners.
    Registration,
    /// Anything else: I/O, serialization, or invariant violations.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCategory::Input => "input",
            ErrorCategory::Security => "security",
            ErrorCategory::Dispatch => "dispatch",
            ErrorCategory::Delivery => "delivery",
            ErrorCategory::Registration => "registration",
            ErrorCategory::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// The error kinds named in the error handling design, one variant per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    MalformedInput,
    UnsupportedKey,
    InvalidSignature,
    NotFound,
    NotAcceptable,
    Transient,
    Permanent,
    DuplicateRegistration,
    /// Not one of the named kinds above; a catch-all for internal failures
    /// (serialization, I/O, invariant violations) that still need to flow
    /// through the shared error type.
    Internal,
}

impl ErrorCode {
    pub fn category(self) -> ErrorCategory {
        match self {
            ErrorCode::MalformedInput => ErrorCategory::Input,
            ErrorCode::UnsupportedKey | ErrorCode::InvalidSignature => ErrorCategory::Security,
            ErrorCode::NotFound | ErrorCode::NotAcceptable => ErrorCategory::Dispatch,
            ErrorCode::Transient | ErrorCode::Permanent => ErrorCategory::Delivery,
            ErrorCode::DuplicateRegistration => ErrorCategory::Registration,
            ErrorCode::Internal => ErrorCategory::Internal,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::MalformedInput => "MALFORMED_INPUT",
            ErrorCode::UnsupportedKey => "UNSUPPORTED_KEY",
            ErrorCode::InvalidSignature => "INVALID_SIGNATURE",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::NotAcceptable => "NOT_ACCEPTABLE",
            ErrorCode::Transient => "TRANSIENT",
            ErrorCode::Permanent => "PERMANENT",
            ErrorCode::DuplicateRegistration => "DUPLICATE_REGISTRATION",
            ErrorCode::Internal => "INTERNAL",
        }
    }

    /// The HTTP status a caller SHOULD use when surfacing this code on an
    /// inbound request path. Outbound-only codes (`Transient`, `Permanent`)
    /// have no natural HTTP mapping and return `None`.
    pub fn http_status(self) -> Option<u16> {
        match self {
            ErrorCode::MalformedInput => Some(400),
            ErrorCode::UnsupportedKey | ErrorCode::InvalidSignature => Some(401),
            ErrorCode::NotFound => Some(404),
            ErrorCode::NotAcceptable => Some(406),
            ErrorCode::DuplicateRegistration => Some(409),
            ErrorCode::Transient | ErrorCode::Permanent | ErrorCode::Internal => None,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The shared error type every fallible public function in this workspace
/// returns (directly, or converted into via `From`).
pub struct ApfedError {
    code: ErrorCode,
    message: String,
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    context: BTreeMap<String, serde_json::Value>,
}

impl ApfedError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
            context: BTreeMap::new(),
        }
    }

    pub fn malformed_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::MalformedInput, message)
    }

    pub fn unsupported_key(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::UnsupportedKey, message)
    }

    pub fn invalid_signature(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidSignature, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn not_acceptable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotAcceptable, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Transient, message)
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Permanent, message)
    }

    pub fn duplicate_registration(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DuplicateRegistration, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }

    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or(serde_json::Value::Null);
        self.context.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn context(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.context
    }

    /// Whether this error should drive an outbox retry, per the retry
    /// termination property.
    pub fn is_retryable(&self) -> bool {
        matches!(self.code, ErrorCode::Transient)
    }

    pub fn to_dto(&self) -> ApfedErrorDto {
        ApfedErrorDto {
            code: self.code,
            category: self.code.category(),
            message: self.message.clone(),
            context: self.context.clone(),
        }
    }
}

impl fmt::Debug for ApfedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApfedError")
            .field("code", &self.code)
            .field("message", &self.message)
            .field("context", &self.context)
            .field("source", &self.source.as_ref().map(|s| s.to_string()))
            .finish()
    }
}

impl fmt::Display for ApfedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(source) = &self.source {
            write!(f, ": {source}")?;
        }
        Ok(())
    }
}

impl StdError for ApfedError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|s| s.as_ref() as &(dyn StdError + 'static))
    }
}

/// Serializable snapshot of an [`ApfedError`], for HTTP error bodies and logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApfedErrorDto {
    pub code: ErrorCode,
    pub category: ErrorCategory,
    pub message: String,
    #[serde(default)]
    pub context: BTreeMap<String, serde_json::Value>,
}

impl From<&ApfedError> for ApfedErrorDto {
    fn from(value: &ApfedError) -> Self {
        value.to_dto()
    }
}

pub type Result<T> = std::result::Result<T, ApfedError>;

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_CODES: &[ErrorCode] = &[
        ErrorCode::MalformedInput,
        ErrorCode::UnsupportedKey,
        ErrorCode::InvalidSignature,
        ErrorCode::NotFound,
        ErrorCode::NotAcceptable,
        ErrorCode::Transient,
        ErrorCode::Permanent,
        ErrorCode::DuplicateRegistration,
        ErrorCode::Internal,
    ];

    #[test]
    fn code_serde_roundtrip() {
        for code in ALL_CODES {
            let json = serde_json::to_string(code).unwrap();
            let back: ErrorCode = serde_json::from_str(&json).unwrap();
            assert_eq!(*code, back);
            assert_eq!(json.trim_matches('"'), code.as_str());
        }
    }

    #[test]
    fn only_transient_is_retryable() {
        for code in ALL_CODES {
            let err = ApfedError::new(*code, "x");
            assert_eq!(err.is_retryable(), *code == ErrorCode::Transient);
        }
    }

    #[test]
    fn category_mapping_matches_error_handling_design() {
        assert_eq!(ErrorCode::MalformedInput.category(), ErrorCategory::Input);
        assert_eq!(ErrorCode::UnsupportedKey.category(), ErrorCategory::Security);
        assert_eq!(ErrorCode::InvalidSignature.category(), ErrorCategory::Security);
        assert_eq!(ErrorCode::NotFound.category(), ErrorCategory::Dispatch);
        assert_eq!(ErrorCode::NotAcceptable.category(), ErrorCategory::Dispatch);
        assert_eq!(ErrorCode::Transient.category(), ErrorCategory::Delivery);
        assert_eq!(ErrorCode::Permanent.category(), ErrorCategory::Delivery);
        assert_eq!(
            ErrorCode::DuplicateRegistration.category(),
            ErrorCategory::Registration
        );
    }

    #[test]
    fn builder_chains_context_and_source() {
        let source = std::io::Error::other("boom");
        let err = ApfedError::not_found("no such actor")
            .with_context("actor_id", "https://example.org/users/1")
            .with_source(source);
        assert_eq!(err.code(), ErrorCode::NotFound);
        assert!(err.to_string().contains("no such actor"));
        assert!(err.to_string().contains("boom"));
        assert_eq!(
            err.context().get("actor_id").unwrap(),
            "https://example.org/users/1"
        );
    }

    #[test]
    fn dto_roundtrips_through_json() {
        let err = ApfedError::permanent("gone").with_context("http_status", 410);
        let dto = err.to_dto();
        let json = serde_json::to_string(&dto).unwrap();
        let back: ApfedErrorDto = serde_json::from_str(&json).unwrap();
        assert_eq!(back.code, ErrorCode::Permanent);
        assert_eq!(back.category, ErrorCategory::Delivery);
    }

    #[test]
    fn http_status_defined_only_for_inbound_codes() {
        assert_eq!(ErrorCode::MalformedInput.http_status(), Some(400));
        assert_eq!(ErrorCode::NotFound.http_status(), Some(404));
        assert_eq!(ErrorCode::Transient.http_status(), None);
        assert_eq!(ErrorCode::Permanent.http_status(), None);
    }
}
