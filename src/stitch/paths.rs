use anyhow::Result;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct StitchPaths {
    pub stitch_home: PathBuf,
    pub output_dir: PathBuf,
    pub logs_dir: PathBuf,
}

impl StitchPaths {
    pub fn session_dir(&self, session_id: &str) -> PathBuf {
        self.output_dir.join(session_id)
    }

    pub fn session_log_file(&self, session_id: &str) -> PathBuf {
        self.logs_dir.join(format!("session_{session_id}.log"))
    }

    pub fn audit_log_file(&self) -> PathBuf {
        self.logs_dir.join("audit.log")
    }
}

const MAX_SESSION_ID_LEN: usize = 64;

/// Session ids become directory and file names, so only `[A-Za-z0-9_-]` is accepted.
pub fn validate_session_id(session_id: &str) -> Result<()> {
    if session_id.is_empty() || session_id.len() > MAX_SESSION_ID_LEN {
        return Err(anyhow::anyhow!(
            "session id must be 1..={MAX_SESSION_ID_LEN} characters"
        ));
    }
    if !session_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(anyhow::anyhow!(
            "session id `{session_id}` may only contain letters, digits, '-' and '_'"
        ));
    }
    Ok(())
}

fn required_home_dir() -> Result<PathBuf> {
    if let Some(home) = dirs::home_dir() {
        return Ok(home);
    }
    Err(anyhow::anyhow!("HOME directory could not be resolved"))
}

fn env_or_default_path(var: &str, fallback: PathBuf) -> PathBuf {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => fallback,
    }
}

pub fn resolve_paths() -> Result<StitchPaths> {
    let stitch_home = match env::var("STITCH_HOME") {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => required_home_dir()?.join(".stitch"),
    };

    let output_dir = env_or_default_path("STITCH_OUTPUT_DIR", stitch_home.join("output"));
    let logs_dir = env_or_default_path("STITCH_LOGS_DIR", stitch_home.join("logs"));

    Ok(StitchPaths {
        stitch_home,
        output_dir,
        logs_dir,
    })
}

#[cfg(test)]
mod tests {
    use super::{StitchPaths, validate_session_id};
    use std::path::PathBuf;

    #[test]
    fn session_files_are_namespaced_by_id() {
        let paths = StitchPaths {
            stitch_home: PathBuf::from("/s"),
            output_dir: PathBuf::from("/s/output"),
            logs_dir: PathBuf::from("/s/logs"),
        };
        assert_eq!(paths.session_dir("abc"), PathBuf::from("/s/output/abc"));
        assert_eq!(
            paths.session_log_file("abc"),
            PathBuf::from("/s/logs/session_abc.log")
        );
        assert_eq!(paths.audit_log_file(), PathBuf::from("/s/logs/audit.log"));
    }

    #[test]
    fn session_ids_cannot_escape_the_output_dir() {
        assert!(validate_session_id("a1b2c3d4e5f6").is_ok());
        assert!(validate_session_id("nightly_run-2").is_ok());
        for bad in ["", "../../x", "a/b", "a\\b", "..", "with space"] {
            assert!(validate_session_id(bad).is_err(), "accepted {bad:?}");
        }
        assert!(validate_session_id(&"x".repeat(65)).is_err());
    }
}
