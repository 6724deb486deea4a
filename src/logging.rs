use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use tracing::Span;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::{Layer, layer::SubscriberExt, util::SubscriberInitExt};

use crate::stitch::config::GenerationConfig;

const LOG_ENV: &str = "STITCH_LOG";
const FILE_FILTER: &str = "stitch=debug,warn";

/// Install the process subscriber: stderr at `STITCH_LOG` (default `info`),
/// plus a debug-level plain-text copy in `log_file` when given.
pub fn init(log_file: Option<&Path>) -> Result<()> {
    let console_filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let console = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(console_filter);

    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            let file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .with_filter(EnvFilter::new(FILE_FILTER)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .try_init()
        .context("failed to install log subscriber")?;
    Ok(())
}

#[derive(Debug, Clone, Copy, Default)]
struct PayloadCapture {
    prompts: bool,
    responses: bool,
    continuations: bool,
    overlaps: bool,
}

/// Logging handle scoped to one generation session.
///
/// Every event is emitted inside the session span so the session id is
/// attached to all of them. Payload text is only written when the matching
/// capture toggle is on; otherwise just its size is logged.
#[derive(Debug, Clone)]
pub struct SessionLog {
    session_id: String,
    span: Span,
    capture: PayloadCapture,
}

impl SessionLog {
    pub fn new(session_id: impl Into<String>, cfg: &GenerationConfig) -> Self {
        let session_id = session_id.into();
        let span = tracing::info_span!("session", session = %session_id);
        Self {
            session_id,
            span,
            capture: PayloadCapture {
                prompts: cfg.log_prompts,
                responses: cfg.log_responses,
                continuations: cfg.log_continuations,
                overlaps: cfg.log_overlaps,
            },
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn prompt(&self, text: &str) {
        let _guard = self.span.enter();
        if self.capture.prompts {
            tracing::debug!(chars = text.chars().count(), payload = text, "prompt");
        } else {
            tracing::debug!(chars = text.chars().count(), "prompt");
        }
    }

    pub fn continuation(&self, chunk_index: usize, text: &str) {
        let _guard = self.span.enter();
        if self.capture.continuations {
            tracing::debug!(chunk = chunk_index, payload = text, "continuation built");
        } else {
            tracing::debug!(
                chunk = chunk_index,
                chars = text.chars().count(),
                "continuation built"
            );
        }
    }

    pub fn response(&self, chunk_index: usize, text: &str) {
        let _guard = self.span.enter();
        if self.capture.responses {
            tracing::debug!(chunk = chunk_index, payload = text, "response received");
        } else {
            tracing::debug!(chunk = chunk_index, chars = text.chars().count(), "response received");
        }
    }

    pub fn overlap(&self, chunk_index: usize, stripped: usize, text: &str) {
        let _guard = self.span.enter();
        if self.capture.overlaps {
            tracing::info!(chunk = chunk_index, stripped, payload = text, "recap stripped");
        } else {
            tracing::info!(chunk = chunk_index, stripped, "recap stripped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::SessionLog;
    use crate::stitch::config::GenerationConfig;

    #[test]
    fn payload_capture_follows_config_toggles() {
        let cfg = GenerationConfig {
            log_responses: true,
            ..GenerationConfig::default()
        };
        let log = SessionLog::new("abc123", &cfg);
        assert_eq!(log.session_id(), "abc123");
        assert!(log.capture.responses);
        assert!(!log.capture.prompts);
        assert!(!log.capture.continuations);
        assert!(!log.capture.overlaps);
    }
}
