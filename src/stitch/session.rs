use serde::Serialize;
use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};

use crate::error::GenerationError;
use crate::logging::SessionLog;
use crate::stitch::cancel::CancelToken;
use crate::stitch::config::GenerationConfig;
use crate::stitch::continuation;
use crate::stitch::finish::FinishReason;
use crate::stitch::overlap::find_overlap;
use crate::stitch::transport::{ChunkRequest, GenerationService, send_with_retry};

/// One finalized response unit, after recap removal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    pub index: usize,
    pub text: String,
    pub finish_reason: FinishReason,
    pub overlap_removed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationResult {
    pub text: String,
    pub chunks_consumed: usize,
    pub finish_reason: FinishReason,
    #[serde(serialize_with = "serialize_secs")]
    pub total_duration: Duration,
    pub session_id: String,
    pub retries_used: usize,
    pub overlaps_removed: usize,
    pub total_chars: usize,
}

fn serialize_secs<S: serde::Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(value.as_secs_f64())
}

/// Per-run knobs that are not part of the immutable generation config.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub session_id: Option<String>,
    pub cancel: CancelToken,
    /// Receives every finalized chunk. Sending never blocks the session.
    pub sink: Option<Sender<Chunk>>,
}

pub fn new_session_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(12);
    id
}

/// Loop state owned by exactly one `generate` call.
struct Session {
    log: SessionLog,
    chunks: Vec<Chunk>,
    retries_used: usize,
    overlaps_removed: usize,
    started: Instant,
}

impl Session {
    fn new(log: SessionLog) -> Self {
        Self {
            log,
            chunks: Vec::new(),
            retries_used: 0,
            overlaps_removed: 0,
            started: Instant::now(),
        }
    }

    fn session_id(&self) -> String {
        self.log.session_id().to_string()
    }

    fn finish(self) -> GenerationResult {
        let text: String = self.chunks.iter().map(|chunk| chunk.text.as_str()).collect();
        let finish_reason = self
            .chunks
            .last()
            .map(|chunk| chunk.finish_reason.clone())
            .unwrap_or(FinishReason::Stop);
        GenerationResult {
            total_chars: text.chars().count(),
            text,
            chunks_consumed: self.chunks.len(),
            finish_reason,
            total_duration: self.started.elapsed(),
            session_id: self.log.session_id().to_string(),
            retries_used: self.retries_used,
            overlaps_removed: self.overlaps_removed,
        }
    }
}

/// Drives one prompt to a complete, stop-terminated artifact.
pub struct Generator<S: GenerationService> {
    service: S,
    model: String,
    config: GenerationConfig,
}

impl<S: GenerationService> Generator<S> {
    pub fn new(service: S, model: impl Into<String>, config: GenerationConfig) -> Self {
        Self {
            service,
            model: model.into(),
            config,
        }
    }

    pub fn generate(&self, prompt: &str) -> Result<GenerationResult, GenerationError> {
        self.generate_with(prompt, SessionOptions::default())
    }

    /// Run a full session.
    ///
    /// Returns either a complete result whose last chunk finished with
    /// `Stop`, or an error. Accumulated chunks are dropped on every error path.
    pub fn generate_with(
        &self,
        prompt: &str,
        opts: SessionOptions,
    ) -> Result<GenerationResult, GenerationError> {
        let session_id = opts.session_id.unwrap_or_else(new_session_id);
        let log = SessionLog::new(session_id, &self.config);
        let cfg = &self.config;

        if prompt.trim().is_empty() {
            return Err(GenerationError::InvalidArgument {
                session_id: log.session_id().to_string(),
                reason: "prompt must not be blank".to_string(),
            });
        }

        {
            let _guard = log.span().enter();
            tracing::info!(
                model = %self.model,
                prompt_chars = prompt.chars().count(),
                max_chunks = cfg.max_chunks,
                "generation started"
            );
        }
        log.prompt(prompt);

        let mut handle = self
            .service
            .open_session(&self.model)
            .map_err(|source| GenerationError::SessionOpen {
                session_id: log.session_id().to_string(),
                source,
            })?;

        let mut session = Session::new(log);
        let mut completed_normally = false;

        for chunk_index in 0..cfg.max_chunks {
            let message = match session.chunks.last() {
                Some(previous) => {
                    let built = continuation::build(&previous.text, cfg);
                    session.log.continuation(chunk_index, &built);
                    built
                }
                None => prompt.to_string(),
            };

            let exchange = send_with_retry(
                &self.service,
                &mut handle,
                ChunkRequest {
                    chunk_index,
                    message: &message,
                },
                cfg,
                &opts.cancel,
                &session.log,
            )?;
            session.retries_used += exchange.attempts_used;
            session.log.response(chunk_index, &exchange.text);

            let mut text = exchange.text;
            let mut overlap_removed = 0usize;
            if let Some(previous) = session.chunks.last() {
                let overlap = find_overlap(&previous.text, &text, cfg);
                if !overlap.is_empty() {
                    session.log.overlap(chunk_index, overlap.chars, &overlap.text);
                    text = overlap.strip(&text).to_string();
                    overlap_removed = overlap.chars;
                    session.overlaps_removed += 1;
                }
            }

            let chunk = Chunk {
                index: chunk_index,
                text,
                finish_reason: exchange.finish_reason.clone(),
                overlap_removed,
            };
            {
                let _guard = session.log.span().enter();
                tracing::info!(
                    chunk = chunk_index,
                    chars = chunk.text.chars().count(),
                    finish = %chunk.finish_reason,
                    attempts_used = exchange.attempts_used,
                    overlap_removed,
                    "chunk stored"
                );
            }
            if let Some(sink) = &opts.sink
                && sink.send(chunk.clone()).is_err()
            {
                let _guard = session.log.span().enter();
                tracing::debug!(chunk = chunk_index, "chunk sink disconnected");
            }
            session.chunks.push(chunk);

            match exchange.finish_reason {
                FinishReason::Stop => {
                    completed_normally = true;
                    break;
                }
                reason if reason.is_continuable() => {
                    if chunk_index + 1 < cfg.max_chunks {
                        opts.cancel.sleep(cfg.inter_chunk_delay()).map_err(|interrupt| {
                            GenerationError::Cancelled {
                                session_id: session.session_id(),
                                chunk_index: chunk_index + 1,
                                interrupt,
                            }
                        })?;
                    }
                }
                reason => {
                    let _guard = session.log.span().enter();
                    tracing::error!(
                        chunk = chunk_index,
                        finish = %reason,
                        "non-continuable finish"
                    );
                    return Err(GenerationError::NonContinuableFinish {
                        session_id: session.session_id(),
                        chunk_index,
                        reason,
                    });
                }
            }
        }

        if !completed_normally {
            let _guard = session.log.span().enter();
            tracing::error!(max_chunks = cfg.max_chunks, "chunk ceiling reached");
            return Err(GenerationError::CeilingExceeded {
                session_id: session.session_id(),
                max_chunks: cfg.max_chunks,
            });
        }

        let log = session.log.clone();
        let result = session.finish();
        {
            let _guard = log.span().enter();
            tracing::info!(
                chunks = result.chunks_consumed,
                chars = result.total_chars,
                retries = result.retries_used,
                overlaps = result.overlaps_removed,
                duration_secs = result.total_duration.as_secs_f64(),
                "generation complete"
            );
        }
        Ok(result)
    }
}
