use serde::Serialize;
use std::fmt;

/// Why the service stopped producing a chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "raw", rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    MaxTokens,
    Safety,
    Recitation,
    /// Anything the classifier does not recognise. Keeps the raw service token.
    Other(String),
}

impl FinishReason {
    pub fn label(&self) -> &str {
        match self {
            FinishReason::Stop => "stop",
            FinishReason::MaxTokens => "max_tokens",
            FinishReason::Safety => "safety",
            FinishReason::Recitation => "recitation",
            FinishReason::Other(_) => "other",
        }
    }

    /// Only a token-budget cut can be resumed with a continuation request.
    pub fn is_continuable(&self) -> bool {
        matches!(self, FinishReason::MaxTokens)
    }
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinishReason::Other(raw) => write!(f, "other({raw})"),
            known => f.write_str(known.label()),
        }
    }
}

fn normalize_token(raw: &str) -> String {
    let upper = raw.trim().to_ascii_uppercase();
    for prefix in ["FINISHREASON.", "FINISH_REASON_"] {
        if let Some(rest) = upper.strip_prefix(prefix) {
            return rest.to_string();
        }
    }
    upper
}

/// Map a raw finish token from the service into a [`FinishReason`].
///
/// Never fails: unknown tokens degrade to [`FinishReason::Other`] and are
/// logged as an anomaly so generation can still decide what to do with them.
pub fn classify(raw: &str) -> FinishReason {
    match normalize_token(raw).as_str() {
        "STOP" | "1" => FinishReason::Stop,
        "MAX_TOKENS" | "2" => FinishReason::MaxTokens,
        "SAFETY" | "3" => FinishReason::Safety,
        "RECITATION" | "4" => FinishReason::Recitation,
        _ => {
            tracing::warn!(raw_token = raw, "unrecognised finish reason");
            FinishReason::Other(raw.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{FinishReason, classify};

    #[test]
    fn classify_maps_known_tokens() {
        assert_eq!(classify("STOP"), FinishReason::Stop);
        assert_eq!(classify("MAX_TOKENS"), FinishReason::MaxTokens);
        assert_eq!(classify("SAFETY"), FinishReason::Safety);
        assert_eq!(classify("RECITATION"), FinishReason::Recitation);
    }

    #[test]
    fn classify_accepts_prefixed_lowercase_and_numeric_forms() {
        assert_eq!(classify(" stop "), FinishReason::Stop);
        assert_eq!(classify("FinishReason.MAX_TOKENS"), FinishReason::MaxTokens);
        assert_eq!(classify("FINISH_REASON_SAFETY"), FinishReason::Safety);
        assert_eq!(classify("2"), FinishReason::MaxTokens);
    }

    #[test]
    fn classify_keeps_raw_token_for_unknown_values() {
        assert_eq!(
            classify("BLOCKLIST"),
            FinishReason::Other("BLOCKLIST".to_string())
        );
        assert_eq!(classify(""), FinishReason::Other(String::new()));
        assert_eq!(
            classify("FINISH_REASON_UNSPECIFIED"),
            FinishReason::Other("FINISH_REASON_UNSPECIFIED".to_string())
        );
    }

    #[test]
    fn only_max_tokens_is_continuable() {
        assert!(FinishReason::MaxTokens.is_continuable());
        assert!(!FinishReason::Stop.is_continuable());
        assert!(!FinishReason::Safety.is_continuable());
        assert!(!FinishReason::Other("OTHER".to_string()).is_continuable());
    }

    #[test]
    fn display_includes_raw_token_for_other() {
        assert_eq!(FinishReason::Other("X".to_string()).to_string(), "other(X)");
        assert_eq!(FinishReason::Recitation.to_string(), "recitation");
    }
}
