use thiserror::Error;

/// Failure taxonomy shared by the sources, ledger, and update pipeline.
///
/// Every variant is recovered at per-plugin granularity by the update
/// engine; a malformed ledger file at load time is the only condition the
/// caller must treat as fatal.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// No version or artifact satisfies the request.
    #[error("not found: {0}")]
    NotFound(String),

    /// A version token, locator, or the ledger file failed to parse.
    #[error("parse error: {0}")]
    Parse(String),

    /// Transport or HTTP-level failure talking to a remote catalog.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A downloaded artifact did not match its declared digest.
    #[error("downloaded file hash mismatch: expected {expected}, got {actual}")]
    Integrity { expected: String, actual: String },

    /// A service tag no configured catalog answers for.
    #[error("unknown service: {0}")]
    UnknownService(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
