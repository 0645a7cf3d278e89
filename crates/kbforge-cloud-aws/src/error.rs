//! Error types for the AWS backends

use aws_smithy_runtime_api::client::result::SdkError;
use aws_smithy_types::error::display::DisplayErrorContext;
use aws_smithy_types::error::metadata::ProvideErrorMetadata;
use kbforge_cloud::{ApiError, ApiErrorKind};
use thiserror::Error;

/// Errors raised while setting up AWS clients
#[derive(Error, Debug)]
pub enum AwsError {
    #[error("Missing AWS region configuration")]
    MissingRegion,

    #[error("No AWS credentials provider configured")]
    MissingCredentials,

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, AwsError>;

/// Map a service error code onto the provider-neutral classification
pub(crate) fn classify_code(code: &str) -> ApiErrorKind {
    match code {
        "ResourceNotFoundException" | "ParameterNotFound" => ApiErrorKind::NotFound,
        "ConflictException" | "ParameterAlreadyExists" => ApiErrorKind::Conflict,
        "AccessDeniedException" | "UnrecognizedClientException" => ApiErrorKind::AccessDenied,
        "ThrottlingException" | "TooManyRequestsException" | "TooManyUpdates" => {
            ApiErrorKind::Throttled
        }
        _ => ApiErrorKind::Service,
    }
}

/// Convert an SDK error into an [`ApiError`]
pub(crate) fn api_error<E, R>(err: SdkError<E, R>) -> ApiError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    let message = DisplayErrorContext(&err).to_string();
    let kind = match &err {
        SdkError::ServiceError(context) => context
            .err()
            .code()
            .map(classify_code)
            .unwrap_or(ApiErrorKind::Service),
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => ApiErrorKind::Transport,
        SdkError::ResponseError(_) => ApiErrorKind::Malformed,
        _ => ApiErrorKind::Service,
    };
    ApiError::new(kind, message)
}

/// Classify an HTTP status from the index data plane
pub(crate) fn classify_status(status: u16) -> ApiErrorKind {
    match status {
        404 => ApiErrorKind::NotFound,
        409 => ApiErrorKind::Conflict,
        401 | 403 => ApiErrorKind::AccessDenied,
        429 => ApiErrorKind::Throttled,
        _ => ApiErrorKind::Service,
    }
}
