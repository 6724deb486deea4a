use crate::stitch::config::GenerationConfig;

/// Last `anchor_chars` characters of the trimmed previous chunk, verbatim.
pub fn anchor(previous: &str, anchor_chars: usize) -> &str {
    let trimmed = previous.trim();
    let total = trimmed.chars().count();
    let skip = total.saturating_sub(anchor_chars);
    match trimmed.char_indices().nth(skip) {
        Some((byte_idx, _)) => &trimmed[byte_idx..],
        None => "",
    }
}

/// Follow-up instruction that resumes generation right after the previous chunk.
pub fn build(previous: &str, cfg: &GenerationConfig) -> String {
    let anchor = anchor(previous, cfg.anchor_chars);
    format!(
        "Your previous response was cut off by the output limit. Continue it from the exact point where it stopped.\n\
         Do not repeat, restate or summarize anything you already wrote. Do not add an introduction or a closing remark about continuing.\n\
         The previous response ended with this text (verbatim, between the markers):\n\
         <<<END_OF_PREVIOUS>>>\n\
         {anchor}\n\
         <<<END_OF_PREVIOUS>>>\n\
         Resume with the very next character after that text. If it stopped inside a code block, keep writing the same code block without reopening the fence."
    )
}
