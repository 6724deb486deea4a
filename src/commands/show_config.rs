use anyhow::Result;
use std::env;

use crate::commands::CommandReport;
use crate::gemini::client::resolve_api_key;
use crate::stitch::config::{load_config, resolve_config_path};
use crate::stitch::paths::resolve_paths;

include!(concat!(env!("OUT_DIR"), "/stitch_env_allowlist.rs"));

fn unknown_env_keys<I>(keys: I, allowlist: &[&str]) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut out: Vec<String> = keys
        .into_iter()
        .filter(|key| key.starts_with("STITCH_"))
        .filter(|key| !allowlist.contains(&key.as_str()))
        .collect();
    out.sort();
    out
}

pub fn run() -> Result<CommandReport> {
    let mut report = CommandReport::new("config");
    let cfg = load_config()?;
    let paths = resolve_paths()?;
    let g = &cfg.generation;

    report.detail(format!("build_id={}", env!("BUILD_UUID")));
    match resolve_config_path() {
        Some(path) => report.detail(format!(
            "config_path={} exists={}",
            path.display(),
            path.exists()
        )),
        None => report.detail("config_path=none"),
    }
    report.detail(format!("stitch_home={}", paths.stitch_home.display()));
    report.detail(format!("output_dir={}", paths.output_dir.display()));
    report.detail(format!("logs_dir={}", paths.logs_dir.display()));
    report.detail(format!("service.model={}", cfg.service.model));
    report.detail(format!("service.base_url={}", cfg.service.base_url));
    report.detail(format!(
        "service.request_timeout_secs={}",
        cfg.service.request_timeout_secs
    ));
    report.detail(format!("service.api_key_set={}", resolve_api_key().is_some()));
    report.detail(format!("generation.max_output_tokens={}", g.max_output_tokens));
    report.detail(format!("generation.temperature={}", g.temperature));
    report.detail(format!("generation.top_p={}", g.top_p));
    report.detail(format!("generation.anchor_chars={}", g.anchor_chars));
    report.detail(format!("generation.overlap_window={}", g.overlap_window));
    report.detail(format!("generation.min_overlap_chars={}", g.min_overlap_chars));
    report.detail(format!("generation.max_chunks={}", g.max_chunks));
    report.detail(format!(
        "generation.inter_chunk_delay_secs={}",
        g.inter_chunk_delay_secs
    ));
    report.detail(format!("generation.max_retries={}", g.max_retries));
    report.detail(format!("generation.retry_backoff_secs={}", g.retry_backoff_secs));
    report.detail(format!("generation.backoff={}", g.backoff.label()));
    report.detail(format!(
        "generation.log_payloads=prompts:{} responses:{} continuations:{} overlaps:{}",
        g.log_prompts, g.log_responses, g.log_continuations, g.log_overlaps
    ));

    for key in unknown_env_keys(env::vars().map(|(k, _)| k), GENERATED_STITCH_ENV_ALLOWLIST) {
        report.issue(format!("unknown environment variable {key}"));
    }

    Ok(report)
}
