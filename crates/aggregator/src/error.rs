use axum::http::StatusCode;

use crate::source::SourceId;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AggregationError {
    #[error("{upstream} is unavailable: {message}")]
    UpstreamUnavailable { upstream: SourceId, message: String },

    #[error("{upstream} returned an unparseable response: {message}")]
    UpstreamUnparseable { upstream: SourceId, message: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("aggregation was cancelled before all sources answered")]
    Cancelled,
}

impl AggregationError {
    pub fn unavailable(upstream: SourceId, message: impl Into<String>) -> Self {
        AggregationError::UpstreamUnavailable {
            upstream,
            message: message.into(),
        }
    }

    pub fn unparseable(upstream: SourceId, message: impl Into<String>) -> Self {
        AggregationError::UpstreamUnparseable {
            upstream,
            message: message.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AggregationError::UpstreamUnavailable { .. } => "ERR_UPSTREAM_UNAVAILABLE",
            AggregationError::UpstreamUnparseable { .. } => "ERR_UPSTREAM_UNPARSEABLE",
            AggregationError::InvalidInput(_) => "ERR_INVALID_INPUT",
            AggregationError::NotFound(_) => "ERR_NOT_FOUND",
            AggregationError::Cancelled => "ERR_TIMEOUT",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AggregationError::UpstreamUnavailable { .. }
            | AggregationError::UpstreamUnparseable { .. } => StatusCode::BAD_GATEWAY,
            AggregationError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AggregationError::NotFound(_) => StatusCode::NOT_FOUND,
            AggregationError::Cancelled => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    pub fn retryable(&self) -> bool {
        matches!(
            self,
            AggregationError::UpstreamUnavailable { .. } | AggregationError::Cancelled
        )
    }

    pub fn upstream_source(&self) -> Option<SourceId> {
        match self {
            AggregationError::UpstreamUnavailable { upstream, .. }
            | AggregationError::UpstreamUnparseable { upstream, .. } => Some(*upstream),
            _ => None,
        }
    }
}
