use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

use crate::commands::CommandReport;
use crate::stitch::blocks::extract_blocks;

#[derive(Debug, Clone)]
pub struct BlocksOptions {
    pub file: PathBuf,
}

pub fn run(opts: &BlocksOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("blocks");
    let text = fs::read_to_string(&opts.file)
        .with_context(|| format!("failed to read {}", opts.file.display()))?;

    let blocks = extract_blocks(&text);
    report.detail(format!("file={}", opts.file.display()));
    report.detail(format!("blocks={}", blocks.len()));
    for (idx, block) in blocks.iter().enumerate() {
        report.detail(format!(
            "block[{idx}] lang={} path={} lines={} truncated={}",
            if block.lang.is_empty() { "none" } else { &block.lang },
            block.path_hint.as_deref().unwrap_or("none"),
            block.body.lines().count(),
            block.truncated
        ));
    }

    Ok(report)
}
