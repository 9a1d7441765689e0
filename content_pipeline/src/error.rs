use thiserror::Error;
use types::{Platform, PostStatus};

/// Errors that abort a run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0} API key is not configured")]
    MissingApiKey(&'static str),

    #[error("{service} request failed with status {status}: {body}")]
    UpstreamStatus {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("{service} request failed: {message}")]
    Transport {
        service: &'static str,
        message: String,
    },

    #[error("Failed to parse AI response as JSON")]
    ResponseParse,

    #[error("AI response did not contain an article")]
    MissingArticle,

    #[error("{service} returned no usable content")]
    EmptyResponse { service: &'static str },

    #[error("failed to store media: {0}")]
    Media(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("DynamoDB error: {0}")]
    DynamoDb(String),

    #[error("failed to convert item: {0}")]
    Serde(#[from] serde_dynamo::Error),

    #[error("store is unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub(crate) fn dynamodb<E: std::fmt::Debug + std::fmt::Display>(
        operation: &str,
        error: E,
    ) -> Self {
        tracing::error!("DynamoDB {operation} error: {:?}", error);
        Self::DynamoDb(format!("{operation}: {error}"))
    }
}

/// Errors of the approval, publishing and connection workflow.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("social post {0} not found")]
    PostNotFound(String),

    #[error("post must be approved before publishing")]
    NotApproved,

    #[error("post is {0:?} and cannot be changed")]
    InvalidState(PostStatus),

    #[error("scheduled time must be in the future")]
    ScheduleInPast,

    #[error("platform not connected")]
    NotConnected,

    #[error("expires_in must be between 0 and {max} seconds, got {got}")]
    InvalidExpiry { got: u64, max: u64 },

    #[error("no {0} connection found")]
    ConnectionNotFound(Platform),

    #[error("secrets error: {0}")]
    Secrets(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
