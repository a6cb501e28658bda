// Error taxonomy shared by the exporter and the query path

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MirageError>;

/// Every failure mode the mirror distinguishes. The exporter logs these and
/// keeps going; the HTTP surface maps them to status codes in
/// `server::error`.
#[derive(Debug, Error)]
pub enum MirageError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("invalid {0}")]
    BadInput(&'static str),

    #[error("invalid operation type {0}")]
    BadOperationType(String),

    #[error("malformed entry: {0}")]
    BadEntry(String),

    #[error("key is not a did:key")]
    NotADidKey,

    #[error("multikey is not prefixed correctly")]
    BadMultibasePrefix,

    #[error("unsupported key type")]
    UnsupportedCurve,

    #[error("upstream unavailable: {0}")]
    Upstream(String),

    #[error("store failure: {0}")]
    Store(#[from] sqlx::Error),

    #[error("lookup tier failure: {0}")]
    Lookup(#[from] redis::RedisError),

    #[error("handle did mismatch: {handle} is claimed by {claimed} but resolves to {resolved}")]
    HandleDidMismatch {
        handle: String,
        claimed: String,
        resolved: String,
    },

    #[error("did has been tombstoned")]
    Gone,
}

impl From<reqwest::Error> for MirageError {
    fn from(e: reqwest::Error) -> Self {
        MirageError::Upstream(e.to_string())
    }
}
