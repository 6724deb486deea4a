use crate::stitch::config::GenerationConfig;

/// Recap detected at the head of a continuation chunk.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Overlap {
    /// Number of leading characters (not bytes) to drop from the next chunk.
    pub chars: usize,
    pub text: String,
}

impl Overlap {
    pub fn is_empty(&self) -> bool {
        self.chars == 0
    }

    /// Remove the recap from the head of `next`.
    pub fn strip<'a>(&self, next: &'a str) -> &'a str {
        if self.chars == 0 {
            return next;
        }
        match next.char_indices().nth(self.chars) {
            Some((byte_idx, _)) => &next[byte_idx..],
            None => "",
        }
    }
}

fn tail_chars(text: &str, window: usize) -> Vec<char> {
    let total = text.chars().count();
    text.chars().skip(total.saturating_sub(window)).collect()
}

/// Length of the longest common substring of `a` and `b`.
fn longest_common_substring(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }

    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    let mut best = 0usize;

    for &ca in a {
        for (j, &cb) in b.iter().enumerate() {
            if ca == cb {
                let run = prev[j] + 1;
                curr[j + 1] = run;
                best = best.max(run);
            } else {
                curr[j + 1] = 0;
            }
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    best
}

/// Detect model recap between two adjacent chunks.
///
/// Scans the last `overlap_window` characters of `previous` for the longest
/// run shared with `next`. It only counts when it is at least
/// `min_overlap_chars` long, `next` starts with it, and `previous` ends with
/// it. A run repeated from the middle of `previous` is new content, not
/// recap. Matching is exact and case-sensitive.
pub fn find_overlap(previous: &str, next: &str, cfg: &GenerationConfig) -> Overlap {
    let tail = tail_chars(previous, cfg.overlap_window);
    let head: Vec<char> = next.chars().collect();

    let len = longest_common_substring(&tail, &head);
    if len == 0 || len < cfg.min_overlap_chars {
        return Overlap::default();
    }
    if !tail.ends_with(&head[..len]) {
        return Overlap::default();
    }

    Overlap {
        chars: len,
        text: head[..len].iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::{Overlap, find_overlap, longest_common_substring};
    use crate::stitch::config::GenerationConfig;

    fn cfg(window: usize, min: usize) -> GenerationConfig {
        GenerationConfig {
            overlap_window: window,
            min_overlap_chars: min,
            ..GenerationConfig::default()
        }
    }

    #[test]
    fn recap_at_start_of_next_chunk_is_detected() {
        let previous = "...The quick brown fox";
        let next = "brown fox jumps over";
        let got = find_overlap(previous, next, &cfg(50, 5));
        assert_eq!(got.chars, 9);
        assert_eq!(got.text, "brown fox");
        assert_eq!(got.strip(next), " jumps over");
        assert_eq!(
            format!("{previous}{}", got.strip(next)),
            "...The quick brown fox jumps over"
        );
    }

    #[test]
    fn mid_text_match_is_not_recap() {
        let previous = "alpha beta gamma delta";
        let next = "zzz gamma delta and more";
        let got = find_overlap(previous, next, &cfg(100, 5));
        assert!(got.is_empty());
        assert_eq!(got.strip(next), next);
    }

    #[test]
    fn short_match_below_threshold_is_ignored() {
        let got = find_overlap("hello world", "world peace", &cfg(100, 6));
        assert!(got.is_empty());
        let got = find_overlap("hello world", "world peace", &cfg(100, 5));
        assert_eq!(got.chars, 5);
    }

    #[test]
    fn only_the_tail_window_is_scanned() {
        let previous = format!("{}{}", "recap text here", "x".repeat(100));
        let next = "recap text here continues";
        let got = find_overlap(&previous, next, &cfg(50, 5));
        assert!(got.is_empty());
    }

    #[test]
    fn matching_is_case_sensitive() {
        let got = find_overlap("The Brown Fox", "the brown fox runs", &cfg(50, 5));
        assert!(got.is_empty());
    }

    #[test]
    fn longer_mid_text_match_disqualifies_prefix_match() {
        // The longest shared run sits in the middle of `next`, so nothing is stripped.
        let previous = "start abcdefghijklmnop";
        let next = "start xx abcdefghijklmnop";
        let got = find_overlap(previous, next, &cfg(100, 3));
        assert!(got.is_empty());
    }

    #[test]
    fn prefix_match_from_middle_of_tail_is_kept() {
        // `next` repeats the import line but `previous` does not end with it.
        let previous = "import React from 'react';\nexport default A;\n";
        let next = "import React from 'react';\nexport default B;\n";
        let got = find_overlap(previous, next, &cfg(200, 10));
        assert!(got.is_empty());
        assert_eq!(got.strip(next), next);
    }

    #[test]
    fn identical_chunk_is_stripped_but_shared_header_is_not() {
        let previous = "header line one\nbody ends";
        let next = "header line one\nbody ends";
        // Identical text is a true suffix and is stripped whole.
        assert_eq!(find_overlap(previous, next, &cfg(100, 5)).chars, next.chars().count());

        let previous = "header line one\nbody ends here";
        let next = "header line one\nand then more";
        assert!(find_overlap(previous, next, &cfg(100, 5)).is_empty());
    }

    #[test]
    fn multibyte_characters_are_counted_as_chars() {
        let previous = "résumé über naïve";
        let next = "über naïve café";
        let got = find_overlap(previous, next, &cfg(50, 4));
        assert_eq!(got.text, "über naïve");
        assert_eq!(got.chars, 10);
        assert_eq!(got.strip(next), " café");
    }

    #[test]
    fn repeated_calls_are_deterministic() {
        let c = cfg(40, 4);
        let a = find_overlap("some prior text ending here", "ending here and beyond", &c);
        let b = find_overlap("some prior text ending here", "ending here and beyond", &c);
        assert_eq!(a, b);
        assert_eq!(a.chars, "ending here".chars().count());
    }

    #[test]
    fn empty_inputs_yield_no_overlap() {
        assert!(find_overlap("", "abc", &cfg(10, 1)).is_empty());
        assert!(find_overlap("abc", "", &cfg(10, 1)).is_empty());
        assert_eq!(longest_common_substring(&[], &['a']), 0);
    }

    #[test]
    fn strip_of_whole_chunk_leaves_empty_text() {
        let overlap = Overlap {
            chars: 3,
            text: "abc".to_string(),
        };
        assert_eq!(overlap.strip("abc"), "");
    }
}
