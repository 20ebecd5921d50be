use thiserror::Error;

/// Bad domain or zone input. Raised before the store or scheduler is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("domain name is empty")]
    EmptyLabel,

    #[error("domain name must have at least {min} characters: {label}")]
    LabelTooShort { label: String, min: usize },

    #[error("domain name must have at most {max} characters: {label}")]
    LabelTooLong { label: String, max: usize },

    #[error("domain name contains invalid characters: {0}")]
    InvalidLabel(String),

    #[error("unsupported zone: {zone}. Supported zones: {supported}")]
    UnsupportedZone { zone: String, supported: String },
}

/// Outcome of a failed registry lookup.
///
/// Cloned verbatim to every waiter of a fetch epoch, so it only carries
/// owned strings and never the underlying transport error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("registry lookup timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("registry unreachable: {0}")]
    Unreachable(String),

    #[error("unparsable registry response: {0}")]
    UnparsableResponse(String),

    #[error("registry rejected domain: {0}")]
    InvalidDomain(String),

    #[error("registry lookup interrupted: {0}")]
    Interrupted(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt stored value in column {column}: {value}")]
    Corrupt { column: &'static str, value: String },
}

/// Everything `QueryService::check_domain` can hand back to a caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}
