//! Provisioning error types

use thiserror::Error;

/// Classification of a failed provider call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// The addressed resource does not exist
    NotFound,
    /// The resource already exists or is in a conflicting state
    Conflict,
    /// Credentials were rejected or lack permission
    AccessDenied,
    /// The provider asked us to slow down
    Throttled,
    /// The request never got a response (connect failure, timeout)
    Transport,
    /// The provider rejected the request for another reason
    Service,
    /// The provider answered but the payload was not usable
    Malformed,
}

impl std::fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiErrorKind::NotFound => write!(f, "not found"),
            ApiErrorKind::Conflict => write!(f, "conflict"),
            ApiErrorKind::AccessDenied => write!(f, "access denied"),
            ApiErrorKind::Throttled => write!(f, "throttled"),
            ApiErrorKind::Transport => write!(f, "transport"),
            ApiErrorKind::Service => write!(f, "service"),
            ApiErrorKind::Malformed => write!(f, "malformed response"),
        }
    }
}

/// Error returned by a provider API implementation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub message: String,
}

impl ApiError {
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Conflict, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Transport, message)
    }

    pub fn service(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Service, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Malformed, message)
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ApiErrorKind::NotFound
    }
}

/// Provisioning errors
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("State store error at {path}: {message}")]
    Persistence { path: String, message: String },

    #[error("Persisted attribute not found: {path}")]
    NotFound { path: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Failed to create {policy} policy {name}: {source}")]
    PolicyCreation {
        policy: String,
        name: String,
        #[source]
        source: ApiError,
    },

    #[error("Failed to delete {policy} policy {name}: {source}")]
    PolicyDeletion {
        policy: String,
        name: String,
        #[source]
        source: ApiError,
    },

    #[error("Failed to create collection {name}: {source}")]
    CollectionCreation {
        name: String,
        #[source]
        source: ApiError,
    },

    #[error("Failed to delete collection {id}: {source}")]
    CollectionDeletion {
        id: String,
        #[source]
        source: ApiError,
    },

    #[error("Failed to create index {name}: {source}")]
    IndexCreation {
        name: String,
        #[source]
        source: ApiError,
    },

    #[error("Failed to delete index {name}: {source}")]
    IndexDeletion {
        name: String,
        #[source]
        source: ApiError,
    },

    #[error("Timed out waiting for {resource} after {attempts} attempts")]
    ProvisioningTimeout { resource: String, attempts: u32 },

    #[error("Failed to create knowledge base {name}: {source}")]
    KnowledgeBaseCreation {
        name: String,
        #[source]
        source: ApiError,
    },

    #[error("Failed to delete knowledge base {id}: {source}")]
    KnowledgeBaseDeletion {
        id: String,
        #[source]
        source: ApiError,
    },

    #[error("Failed to create data source {name}: {source}")]
    DataSourceCreation {
        name: String,
        #[source]
        source: ApiError,
    },

    #[error("Failed to delete data source {id}: {source}")]
    DataSourceDeletion {
        id: String,
        #[source]
        source: ApiError,
    },

    #[error("Failed to start ingestion job for data source {data_source_id}: {source}")]
    SyncTrigger {
        data_source_id: String,
        #[source]
        source: ApiError,
    },

    #[error("{key} is locked by request {holder} since {acquired_at}")]
    LeaseConflict {
        key: String,
        holder: String,
        acquired_at: String,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProvisionError {
    pub fn persistence(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Persistence {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ProvisionError::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, ProvisionError>;
