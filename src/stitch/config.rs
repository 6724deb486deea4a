use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackoffMode {
    /// `unit * attempt`
    #[default]
    Linear,
    /// `unit * 2^attempt`
    Exponential,
}

impl BackoffMode {
    fn parse(raw: &str) -> Option<BackoffMode> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "linear" => Some(BackoffMode::Linear),
            "exponential" | "exp" => Some(BackoffMode::Exponential),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            BackoffMode::Linear => "linear",
            BackoffMode::Exponential => "exponential",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub max_output_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
    pub anchor_chars: usize,
    pub overlap_window: usize,
    pub min_overlap_chars: usize,
    pub max_chunks: usize,
    pub inter_chunk_delay_secs: f64,
    pub max_retries: usize,
    pub retry_backoff_secs: f64,
    pub backoff: BackoffMode,
    pub log_prompts: bool,
    pub log_responses: bool,
    pub log_continuations: bool,
    pub log_overlaps: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_output_tokens: 8192,
            temperature: 0.5,
            top_p: 0.9,
            anchor_chars: 300,
            overlap_window: 600,
            min_overlap_chars: 40,
            max_chunks: 50,
            inter_chunk_delay_secs: 1.0,
            max_retries: 3,
            retry_backoff_secs: 2.0,
            backoff: BackoffMode::Linear,
            log_prompts: false,
            log_responses: false,
            log_continuations: false,
            log_overlaps: false,
        }
    }
}

/// Upper bound for any configured delay, in seconds (30 days).
pub const MAX_DELAY_SECS: f64 = 30.0 * 86_400.0;

fn secs_to_duration(secs: f64) -> Duration {
    match Duration::try_from_secs_f64(secs) {
        Ok(duration) => duration,
        Err(_) if secs > 0.0 => Duration::MAX,
        Err(_) => Duration::ZERO,
    }
}

impl GenerationConfig {
    pub fn inter_chunk_delay(&self) -> Duration {
        secs_to_duration(self.inter_chunk_delay_secs)
    }

    /// Sleep before retry `attempt` (1-based for every try after the first).
    pub fn retry_delay(&self, attempt: usize) -> Duration {
        let factor = match self.backoff {
            BackoffMode::Linear => attempt as f64,
            BackoffMode::Exponential => 2f64.powi(attempt.min(30) as i32),
        };
        secs_to_duration(self.retry_backoff_secs * factor)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub model: String,
    pub base_url: String,
    pub request_timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash".to_string(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            request_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StitchConfig {
    pub generation: GenerationConfig,
    pub service: ServiceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialStitchConfig {
    generation: Option<GenerationConfig>,
    service: Option<ServiceConfig>,
}

fn env_or_f64(var: &str, fallback: f64) -> f64 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<f64>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_u64(var: &str, fallback: u64) -> u64 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<u64>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_usize(var: &str, fallback: usize) -> usize {
    match env::var(var) {
        Ok(v) => v.trim().parse::<usize>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_bool(var: &str, fallback: bool) -> bool {
    match env::var(var) {
        Ok(v) => {
            let trimmed = v.trim();
            match trimmed {
                "1" | "true" | "TRUE" | "yes" | "on" => true,
                "0" | "false" | "FALSE" | "no" | "off" => false,
                _ => fallback,
            }
        }
        Err(_) => fallback,
    }
}

fn env_or_string(var: &str, fallback: &str) -> String {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => fallback.to_string(),
    }
}

fn non_negative(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(anyhow!("invalid {name}: must be a finite value >= 0"));
    }
    Ok(())
}

fn bounded_delay(name: &str, value: f64) -> Result<()> {
    non_negative(name, value)?;
    if value > MAX_DELAY_SECS {
        return Err(anyhow!("invalid {name}: must be <= {MAX_DELAY_SECS} seconds"));
    }
    Ok(())
}

pub fn validate(cfg: &StitchConfig) -> Result<()> {
    let g = &cfg.generation;
    if g.max_chunks == 0 {
        return Err(anyhow!("invalid max_chunks: must be >= 1"));
    }
    if g.max_output_tokens == 0 {
        return Err(anyhow!("invalid max_output_tokens: must be >= 1"));
    }
    if g.min_overlap_chars == 0 {
        return Err(anyhow!("invalid min_overlap_chars: must be >= 1"));
    }
    non_negative("temperature", g.temperature)?;
    non_negative("top_p", g.top_p)?;
    bounded_delay("inter_chunk_delay_secs", g.inter_chunk_delay_secs)?;
    bounded_delay("retry_backoff_secs", g.retry_backoff_secs)?;
    if cfg.service.model.trim().is_empty() {
        return Err(anyhow!("invalid service model: cannot be empty"));
    }
    if cfg.service.request_timeout_secs == 0 {
        return Err(anyhow!("invalid request timeout: must be >= 1 second"));
    }
    Ok(())
}

pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(custom) = env::var("STITCH_CONFIG_PATH") {
        let trimmed = custom.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }

    let home = dirs::home_dir()?;
    Some(home.join(".stitch").join("stitch.toml"))
}

fn merge_file_config(base: &mut StitchConfig) -> Result<()> {
    let Some(path) = resolve_config_path() else {
        return Ok(());
    };
    if !path.exists() {
        return Ok(());
    }

    let raw = fs::read_to_string(&path)?;
    let parsed: PartialStitchConfig = toml::from_str(&raw)
        .map_err(|err| anyhow!("failed to parse stitch config {}: {err}", path.display()))?;
    if let Some(generation) = parsed.generation {
        base.generation = generation;
    }
    if let Some(service) = parsed.service {
        base.service = service;
    }
    Ok(())
}

fn apply_env_overrides(cfg: &mut StitchConfig) {
    let g = &mut cfg.generation;
    g.max_output_tokens =
        env_or_u64("STITCH_MAX_OUTPUT_TOKENS", u64::from(g.max_output_tokens))
            .min(u64::from(u32::MAX)) as u32;
    g.temperature = env_or_f64("STITCH_TEMPERATURE", g.temperature);
    g.top_p = env_or_f64("STITCH_TOP_P", g.top_p);
    g.anchor_chars = env_or_usize("STITCH_ANCHOR_CHARS", g.anchor_chars);
    g.overlap_window = env_or_usize("STITCH_OVERLAP_WINDOW", g.overlap_window);
    g.min_overlap_chars = env_or_usize("STITCH_MIN_OVERLAP_CHARS", g.min_overlap_chars);
    g.max_chunks = env_or_usize("STITCH_MAX_CHUNKS", g.max_chunks);
    g.inter_chunk_delay_secs =
        env_or_f64("STITCH_INTER_CHUNK_DELAY_SECS", g.inter_chunk_delay_secs);
    g.max_retries = env_or_usize("STITCH_MAX_RETRIES", g.max_retries);
    g.retry_backoff_secs = env_or_f64("STITCH_RETRY_BACKOFF_SECS", g.retry_backoff_secs);
    if let Ok(raw) = env::var("STITCH_BACKOFF")
        && let Some(mode) = BackoffMode::parse(&raw)
    {
        g.backoff = mode;
    }
    g.log_prompts = env_or_bool("STITCH_LOG_PROMPTS", g.log_prompts);
    g.log_responses = env_or_bool("STITCH_LOG_RESPONSES", g.log_responses);
    g.log_continuations = env_or_bool("STITCH_LOG_CONTINUATIONS", g.log_continuations);
    g.log_overlaps = env_or_bool("STITCH_LOG_OVERLAPS", g.log_overlaps);

    let s = &mut cfg.service;
    s.model = env_or_string("STITCH_MODEL", &s.model);
    s.base_url = env_or_string("STITCH_BASE_URL", &s.base_url);
    s.request_timeout_secs = env_or_u64("STITCH_REQUEST_TIMEOUT_SECS", s.request_timeout_secs);
}

pub fn load_config() -> Result<StitchConfig> {
    let mut cfg = StitchConfig::default();
    merge_file_config(&mut cfg)?;
    apply_env_overrides(&mut cfg);
    validate(&cfg)?;
    Ok(cfg)
}
