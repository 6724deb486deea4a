use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use crate::commands::CommandReport;
use crate::gemini::client::{GeminiService, resolve_api_key};
use crate::logging;
use crate::stitch::audit;
use crate::stitch::blocks::extract_blocks;
use crate::stitch::cancel::CancelToken;
use crate::stitch::config::load_config;
use crate::stitch::paths::{resolve_paths, validate_session_id};
use crate::stitch::session::{Chunk, Generator, SessionOptions, new_session_id};
use crate::stitch::util::{sha256_hex, truncate_with_ellipsis};

const STREAM_PREVIEW_CHARS: usize = 80;

#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub prompt: Option<String>,
    pub prompt_file: Option<PathBuf>,
    pub session_id: Option<String>,
    pub out_dir: Option<PathBuf>,
    pub stream: bool,
    pub deadline_secs: Option<u64>,
    pub dry_run: bool,
}

fn resolve_prompt(opts: &GenerateOptions, report: &mut CommandReport) -> Result<Option<String>> {
    match (&opts.prompt, &opts.prompt_file) {
        (Some(_), Some(_)) => {
            report.issue("use only one of PROMPT or --prompt-file");
            Ok(None)
        }
        (Some(prompt), None) => Ok(Some(prompt.clone())),
        (None, Some(path)) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            Ok(Some(raw))
        }
        (None, None) => {
            report.issue("missing prompt: pass PROMPT or --prompt-file");
            Ok(None)
        }
    }
}

fn spawn_stream_printer(rx: mpsc::Receiver<Chunk>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        for chunk in rx {
            eprintln!(
                "chunk {} finish={} chars={} overlap_removed={} | {}",
                chunk.index,
                chunk.finish_reason,
                chunk.text.chars().count(),
                chunk.overlap_removed,
                truncate_with_ellipsis(&chunk.text, STREAM_PREVIEW_CHARS)
            );
        }
    })
}

fn join_stream_printer(printer: thread::JoinHandle<()>, report: &mut CommandReport) {
    if printer.join().is_err() {
        tracing::warn!("stream printer thread panicked; chunk previews may be incomplete");
        report.detail("stream.printer=failed");
    }
}

pub fn run(opts: &GenerateOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("generate");

    let Some(prompt) = resolve_prompt(opts, &mut report)? else {
        return Ok(report);
    };
    let cfg = load_config()?;
    let mut paths = resolve_paths()?;
    if let Some(out) = &opts.out_dir {
        paths.output_dir = out.clone();
    }
    let session_id = opts.session_id.clone().unwrap_or_else(new_session_id);
    if let Err(err) = validate_session_id(&session_id) {
        report.issue(format!("invalid argument: {err}"));
        return Ok(report);
    }

    report.detail(format!("session_id={session_id}"));
    report.detail(format!("model={}", cfg.service.model));
    report.detail(format!("prompt_chars={}", prompt.chars().count()));

    if prompt.trim().is_empty() {
        report.issue(format!(
            "invalid argument: prompt must not be blank (session={session_id})"
        ));
        audit::append_event(&paths, &session_id, "generate", "rejected", "blank prompt")?;
        return Ok(report);
    }

    if opts.dry_run {
        report.detail("generate.dry_run=true");
        report.detail(format!("max_chunks={}", cfg.generation.max_chunks));
        report.detail(format!("max_output_tokens={}", cfg.generation.max_output_tokens));
        return Ok(report);
    }

    let Some(api_key) = resolve_api_key() else {
        report.issue("GEMINI_API_KEY is not set (AI_API_KEY is accepted as a fallback)");
        return Ok(report);
    };

    logging::init(Some(&paths.session_log_file(&session_id)))?;

    let session_dir = paths.session_dir(&session_id);
    fs::create_dir_all(&session_dir)
        .with_context(|| format!("failed to create {}", session_dir.display()))?;
    let prompt_path = session_dir.join("prompt.txt");
    fs::write(&prompt_path, &prompt)
        .with_context(|| format!("failed to write {}", prompt_path.display()))?;
    report.detail(format!("prompt_path={}", prompt_path.display()));

    let service = GeminiService::new(api_key, &cfg.service)?;
    let generator = Generator::new(service, cfg.service.model.clone(), cfg.generation.clone());

    let cancel = match opts.deadline_secs {
        Some(secs) => CancelToken::with_timeout(Duration::from_secs(secs)),
        None => CancelToken::new(),
    };
    let (sink, printer) = if opts.stream {
        let (tx, rx) = mpsc::channel();
        (Some(tx), Some(spawn_stream_printer(rx)))
    } else {
        (None, None)
    };

    let outcome = generator.generate_with(
        &prompt,
        SessionOptions {
            session_id: Some(session_id.clone()),
            cancel,
            sink,
        },
    );
    if let Some(printer) = printer {
        join_stream_printer(printer, &mut report);
    }

    let prompt_digest = sha256_hex(&prompt);
    let result = match outcome {
        Ok(result) => result,
        Err(err) => {
            report.issue(format!("{}: {err}", err.code()));
            audit::append_event(
                &paths,
                err.session_id(),
                "generate",
                "failed",
                &format!("code={} prompt_sha256={prompt_digest}", err.code()),
            )?;
            return Ok(report);
        }
    };

    let result_path = session_dir.join("result.txt");
    fs::write(&result_path, &result.text)
        .with_context(|| format!("failed to write {}", result_path.display()))?;

    let blocks = extract_blocks(&result.text);
    let truncated_blocks = blocks.iter().filter(|b| b.truncated).count();

    report.detail(format!("chunks={}", result.chunks_consumed));
    report.detail(format!("chars={}", result.total_chars));
    report.detail(format!("finish_reason={}", result.finish_reason));
    report.detail(format!("retries_used={}", result.retries_used));
    report.detail(format!("overlaps_removed={}", result.overlaps_removed));
    report.detail(format!(
        "duration_secs={:.3}",
        result.total_duration.as_secs_f64()
    ));
    report.detail(format!("blocks={}", blocks.len()));
    if truncated_blocks > 0 {
        report.detail(format!("blocks.truncated={truncated_blocks}"));
    }
    report.detail(format!("result_path={}", result_path.display()));
    report.detail(format!(
        "log_path={}",
        paths.session_log_file(&session_id).display()
    ));

    audit::append_event(
        &paths,
        &session_id,
        "generate",
        "ok",
        &format!(
            "chunks={} chars={} retries={} overlaps={} prompt_sha256={prompt_digest}",
            result.chunks_consumed,
            result.total_chars,
            result.retries_used,
            result.overlaps_removed
        ),
    )?;

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::{GenerateOptions, join_stream_printer, resolve_prompt};
    use crate::commands::CommandReport;
    use std::fs;

    #[test]
    fn prompt_and_prompt_file_are_mutually_exclusive() {
        let mut report = CommandReport::new("generate");
        let opts = GenerateOptions {
            prompt: Some("a".to_string()),
            prompt_file: Some("b.txt".into()),
            ..GenerateOptions::default()
        };
        let got = resolve_prompt(&opts, &mut report).expect("resolve");
        assert!(got.is_none());
        assert!(!report.ok);
    }

    #[test]
    fn prompt_file_is_read_verbatim() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("prompt.txt");
        fs::write(&path, "build a todo app\n").expect("write prompt");
        let mut report = CommandReport::new("generate");
        let opts = GenerateOptions {
            prompt_file: Some(path),
            ..GenerateOptions::default()
        };
        let got = resolve_prompt(&opts, &mut report).expect("resolve");
        assert_eq!(got.as_deref(), Some("build a todo app\n"));
        assert!(report.ok);
    }

    #[test]
    fn printer_panic_is_reported_without_failing_the_run() {
        let printer: std::thread::JoinHandle<()> = std::thread::spawn(|| panic!("broken pipe"));
        let mut report = CommandReport::new("generate");
        join_stream_printer(printer, &mut report);
        assert!(report.ok);
        assert!(report.details.iter().any(|d| d == "stream.printer=failed"));
    }
}
