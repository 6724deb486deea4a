use serde::Serialize;

/// A fenced code block found in generated text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeBlock {
    /// Path taken from the nearest heading above the fence, if any.
    pub path_hint: Option<String>,
    pub lang: String,
    pub body: String,
    /// Fence was never closed.
    pub truncated: bool,
}

/// Parse a heading like ``#### `backend/app/main.py` `` or ``**`schema.sql`**``.
fn heading_path(line: &str) -> Option<String> {
    let trimmed = line.trim();
    let rest = if trimmed.starts_with('#') {
        let hashes = trimmed.chars().take_while(|c| *c == '#').count();
        if hashes > 6 {
            return None;
        }
        let after = &trimmed[hashes..];
        if !after.starts_with(char::is_whitespace) {
            return None;
        }
        after.trim_start()
    } else if let Some(after) = trimmed.strip_prefix("**") {
        after
    } else {
        return None;
    };

    let inner = rest.strip_prefix('`')?;
    let end = inner.find('`')?;
    let path = inner[..end].trim();
    if path.is_empty() {
        None
    } else {
        Some(path.to_string())
    }
}

fn fence_lang(line: &str) -> Option<String> {
    let lang = line.trim_start().strip_prefix("```")?;
    let lang = lang.trim();
    if lang
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '#')
    {
        Some(lang.to_ascii_lowercase())
    } else {
        None
    }
}

fn is_fence_close(line: &str) -> bool {
    line.trim() == "```"
}

pub fn extract_blocks(text: &str) -> Vec<CodeBlock> {
    let mut blocks = Vec::new();
    let mut pending_path: Option<String> = None;
    let mut open: Option<(Option<String>, String, Vec<&str>)> = None;

    for line in text.lines() {
        if open.is_some() {
            if is_fence_close(line) {
                if let Some((path_hint, lang, body)) = open.take() {
                    blocks.push(CodeBlock {
                        path_hint,
                        lang,
                        body: body.join("\n"),
                        truncated: false,
                    });
                }
            } else if let Some((_, _, body)) = open.as_mut() {
                body.push(line);
            }
            continue;
        }

        if let Some(lang) = fence_lang(line) {
            open = Some((pending_path.take(), lang, Vec::new()));
            continue;
        }
        if let Some(path) = heading_path(line) {
            pending_path = Some(path);
        }
    }

    if let Some((path_hint, lang, body)) = open {
        blocks.push(CodeBlock {
            path_hint,
            lang,
            body: body.join("\n"),
            truncated: true,
        });
    }

    blocks
}
