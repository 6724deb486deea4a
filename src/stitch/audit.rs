use crate::stitch::paths::StitchPaths;
use crate::stitch::util::now_epoch_secs;
use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::fs;
use std::io::Write;

#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub at: String,
    pub at_epoch_secs: u64,
    pub session_id: String,
    pub phase: String,
    pub status: String,
    pub message: String,
}

pub fn append_event(
    paths: &StitchPaths,
    session_id: &str,
    phase: &str,
    status: &str,
    message: &str,
) -> Result<()> {
    fs::create_dir_all(&paths.logs_dir)
        .with_context(|| format!("failed to create {}", paths.logs_dir.display()))?;
    let event = AuditEvent {
        at: Utc::now().to_rfc3339(),
        at_epoch_secs: now_epoch_secs()?,
        session_id: session_id.to_string(),
        phase: phase.to_string(),
        status: status.to_string(),
        message: message.to_string(),
    };

    let line = format!("{}\n", serde_json::to_string(&event)?);
    let path = paths.audit_log_file();
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    file.write_all(line.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::append_event;
    use crate::stitch::paths::StitchPaths;
    use std::fs;

    #[test]
    fn events_are_appended_as_json_lines() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let paths = StitchPaths {
            stitch_home: tmp.path().to_path_buf(),
            output_dir: tmp.path().join("output"),
            logs_dir: tmp.path().join("logs"),
        };
        append_event(&paths, "s1", "generate", "ok", "first").expect("append");
        append_event(&paths, "s2", "generate", "failed", "second").expect("append");

        let raw = fs::read_to_string(paths.audit_log_file()).expect("read audit");
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).expect("json");
        assert_eq!(first["session_id"], "s1");
        assert_eq!(first["status"], "ok");
        assert!(first["at"].as_str().is_some_and(|at| at.contains('T')));
    }
}
