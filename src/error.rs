use crate::stitch::cancel::Interrupt;
use crate::stitch::finish::FinishReason;
use thiserror::Error;

/// Failure of one request/response exchange with the generation service.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("quota exceeded (429): {0}")]
    QuotaExceeded(String),
    #[error("service returned status {code}: {body}")]
    Status { code: u16, body: String },
    #[error("malformed service response: {0}")]
    Malformed(String),
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

/// Fatal outcome of a generation session. No partial text is ever attached.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("invalid argument: {reason} (session={session_id})")]
    InvalidArgument { session_id: String, reason: String },
    #[error("failed to open service session (session={session_id}): {source}")]
    SessionOpen {
        session_id: String,
        #[source]
        source: TransportError,
    },
    #[error(
        "chunk {chunk_index} failed after {attempts} attempts (session={session_id}): {source}"
    )]
    RetryExhausted {
        session_id: String,
        chunk_index: usize,
        attempts: usize,
        #[source]
        source: TransportError,
    },
    #[error(
        "chunk {chunk_index} ended with non-continuable finish reason {reason} (session={session_id})"
    )]
    NonContinuableFinish {
        session_id: String,
        chunk_index: usize,
        reason: FinishReason,
    },
    #[error("chunk ceiling of {max_chunks} reached without a stop finish (session={session_id})")]
    CeilingExceeded {
        session_id: String,
        max_chunks: usize,
    },
    #[error("generation {} before chunk {chunk_index} (session={session_id})", .interrupt.label())]
    Cancelled {
        session_id: String,
        chunk_index: usize,
        interrupt: Interrupt,
    },
}

impl GenerationError {
    pub fn session_id(&self) -> &str {
        match self {
            GenerationError::InvalidArgument { session_id, .. }
            | GenerationError::SessionOpen { session_id, .. }
            | GenerationError::RetryExhausted { session_id, .. }
            | GenerationError::NonContinuableFinish { session_id, .. }
            | GenerationError::CeilingExceeded { session_id, .. }
            | GenerationError::Cancelled { session_id, .. } => session_id,
        }
    }

    /// Stable code for audit lines and machine-readable reports.
    pub fn code(&self) -> &'static str {
        match self {
            GenerationError::InvalidArgument { .. } => "INVALID_ARGUMENT",
            GenerationError::SessionOpen { .. } => "SESSION_OPEN",
            GenerationError::RetryExhausted { .. } => "RETRY_EXHAUSTED",
            GenerationError::NonContinuableFinish { .. } => "NON_CONTINUABLE_FINISH",
            GenerationError::CeilingExceeded { .. } => "CEILING_EXCEEDED",
            GenerationError::Cancelled { .. } => "CANCELLED",
        }
    }
}
