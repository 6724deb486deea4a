use crate::error::{GenerationError, TransportError};
use crate::logging::SessionLog;
use crate::stitch::cancel::CancelToken;
use crate::stitch::config::GenerationConfig;
use crate::stitch::finish::{FinishReason, classify};

#[derive(Debug, Clone, PartialEq)]
pub struct SamplingParams {
    pub max_output_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
}

impl From<&GenerationConfig> for SamplingParams {
    fn from(cfg: &GenerationConfig) -> Self {
        Self {
            max_output_tokens: cfg.max_output_tokens,
            temperature: cfg.temperature,
            top_p: cfg.top_p,
        }
    }
}

/// What the service hands back for one exchange, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawReply {
    pub text: String,
    pub finish_token: String,
}

/// A remote text-generation service with conversational sessions.
///
/// The handle is owned by one generation run for its whole duration.
pub trait GenerationService {
    type Handle;

    fn open_session(&self, model: &str) -> Result<Self::Handle, TransportError>;

    fn send(
        &self,
        handle: &mut Self::Handle,
        message: &str,
        params: &SamplingParams,
    ) -> Result<RawReply, TransportError>;
}

/// Successful exchange after retries.
#[derive(Debug, Clone, PartialEq)]
pub struct Exchange {
    pub text: String,
    pub finish_reason: FinishReason,
    /// Zero-based number of the attempt that succeeded.
    pub attempts_used: usize,
}

pub(crate) struct ChunkRequest<'a> {
    pub chunk_index: usize,
    pub message: &'a str,
}

/// Perform one logical exchange, retrying transient failures.
///
/// Up to `max_retries + 1` tries. Attempt `n > 0` is preceded by the
/// configured backoff sleep. Cancellation is honoured before every dispatch
/// and during every sleep.
pub(crate) fn send_with_retry<S: GenerationService>(
    service: &S,
    handle: &mut S::Handle,
    request: ChunkRequest<'_>,
    cfg: &GenerationConfig,
    cancel: &CancelToken,
    log: &SessionLog,
) -> Result<Exchange, GenerationError> {
    let params = SamplingParams::from(cfg);
    let interrupted = |interrupt| GenerationError::Cancelled {
        session_id: log.session_id().to_string(),
        chunk_index: request.chunk_index,
        interrupt,
    };

    let mut last_err: Option<TransportError> = None;
    for attempt in 0..=cfg.max_retries {
        if attempt > 0 {
            let delay = cfg.retry_delay(attempt);
            {
                let _guard = log.span().enter();
                tracing::info!(
                    chunk = request.chunk_index,
                    attempt,
                    delay_secs = delay.as_secs_f64(),
                    "backing off before retry"
                );
            }
            cancel.sleep(delay).map_err(interrupted)?;
        }
        cancel.check().map_err(interrupted)?;

        match service.send(handle, request.message, &params) {
            Ok(reply) => {
                let finish_reason = {
                    let _guard = log.span().enter();
                    classify(&reply.finish_token)
                };
                return Ok(Exchange {
                    text: reply.text,
                    finish_reason,
                    attempts_used: attempt,
                });
            }
            Err(err) => {
                let _guard = log.span().enter();
                tracing::warn!(
                    chunk = request.chunk_index,
                    attempt,
                    max_retries = cfg.max_retries,
                    error = %err,
                    "chunk request failed"
                );
                last_err = Some(err);
            }
        }
    }

    let source = last_err.unwrap_or_else(|| {
        TransportError::Unavailable("no attempt was made".to_string())
    });
    Err(GenerationError::RetryExhausted {
        session_id: log.session_id().to_string(),
        chunk_index: request.chunk_index,
        attempts: cfg.max_retries + 1,
        source,
    })
}
