//! Snippet construction: locate the best query match in a chunk, window it,
//! clean it up and optionally highlight the query words.

use regex::RegexBuilder;

/// Longest snippet emitted after cleaning, in characters.
pub const MAX_SNIPPET_CHARS: usize = 200;

/// Window the chunk text around the best match of `query`, keeping `radius`
/// characters of context on each side. Returns `(snippet, start, end)` where
/// the positions are byte offsets into the original text; the snippet gains
/// leading/trailing `...` when it does not touch the text edges.
pub fn make_snippet(chunk_text: &str, query: &str, radius: usize) -> (String, usize, usize) {
    if chunk_text.is_empty() || query.trim().is_empty() {
        let end = floor_boundary(chunk_text, (radius * 2).min(chunk_text.len()));
        return (chunk_text[..end].to_string(), 0, end);
    }

    let (start, end) = match find_best_match(chunk_text, query) {
        Some(pos) => {
            let start = floor_boundary(chunk_text, pos.saturating_sub(radius));
            let end =
                ceil_boundary(chunk_text, (pos + query.len() + radius).min(chunk_text.len()));
            (start, end)
        }
        None => (0, floor_boundary(chunk_text, (radius * 2).min(chunk_text.len()))),
    };

    let mut snippet = String::new();
    if start > 0 {
        snippet.push_str("...");
    }
    snippet.push_str(&chunk_text[start..end]);
    if end < chunk_text.len() {
        snippet.push_str("...");
    }
    (snippet, start, end)
}

/// Byte position of the exact lowercase phrase, else the earliest occurrence
/// of any query word, else `None`.
fn find_best_match(text: &str, query: &str) -> Option<usize> {
    let text_lower = text.to_lowercase();
    let query_lower = query.to_lowercase();
    let query_lower = query_lower.trim();

    let clamp = |pos: usize| floor_boundary(text, pos.min(text.len()));

    if let Some(pos) = text_lower.find(query_lower) {
        return Some(clamp(pos));
    }

    let earliest = query_lower
        .split_whitespace()
        .filter_map(|word| text_lower.find(word))
        .min()?;
    Some(clamp(earliest))
}

/// Collapse whitespace runs and trim.
pub fn clean_snippet(snippet: &str) -> String {
    snippet.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncate to `max_chars` characters, preferring a word boundary when one
/// falls in the last 20% of the window, and append `...`.
pub fn truncate_snippet(snippet: &str, max_chars: usize) -> String {
    if snippet.chars().count() <= max_chars {
        return snippet.to_string();
    }
    let cut = snippet
        .char_indices()
        .nth(max_chars)
        .map(|(i, _)| i)
        .unwrap_or(snippet.len());
    let mut truncated = &snippet[..cut];
    if let Some(last_space) = truncated.rfind(' ') {
        if (last_space as f32) > (cut as f32) * 0.8 {
            truncated = &truncated[..last_space];
        }
    }
    format!("{truncated}...")
}

/// Wrap each query word with `**…**`, case-insensitively and on word
/// boundaries only.
pub fn highlight_query(snippet: &str, query: &str) -> String {
    let words: Vec<String> =
        query.to_lowercase().split_whitespace().map(|w| regex::escape(w)).collect();
    if words.is_empty() {
        return snippet.to_string();
    }
    let pattern = format!(r"\b({})\b", words.join("|"));
    let re = match RegexBuilder::new(&pattern).case_insensitive(true).build() {
        Ok(re) => re,
        Err(_) => return snippet.to_string(),
    };
    re.replace_all(snippet, "**$1**").into_owned()
}

fn floor_boundary(s: &str, mut i: usize) -> usize {
    i = i.min(s.len());
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn ceil_boundary(s: &str, mut i: usize) -> usize {
    i = i.min(s.len());
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT: &str = "This long document covers machine learning and neural networks. \
Machine learning has become increasingly important in recent years of research.";

    #[test]
    fn snippet_windows_around_the_phrase() {
        let (snippet, start, end) = make_snippet(TEXT, "machine learning", 20);
        assert!(start <= end && end <= TEXT.len());
        assert!(snippet.to_lowercase().contains("machine learning"));
        assert!(snippet.starts_with("...") && snippet.ends_with("..."));
        // Positions refer to the original text.
        assert!(TEXT[start..end].to_lowercase().contains("machine learning"));
    }

    #[test]
    fn snippet_at_text_start_has_no_leading_ellipsis() {
        let (snippet, start, _) = make_snippet(TEXT, "This long document", 10);
        assert_eq!(start, 0);
        assert!(!snippet.starts_with("..."));
    }

    #[test]
    fn falls_back_to_earliest_query_word() {
        let (snippet, ..) = make_snippet(TEXT, "quantum networks", 15);
        assert!(snippet.to_lowercase().contains("networks"));
    }

    #[test]
    fn no_match_returns_the_head_window() {
        let (snippet, start, end) = make_snippet(TEXT, "zebra xylophone", 25);
        assert_eq!(start, 0);
        assert_eq!(end, 50);
        assert!(TEXT.starts_with(snippet.trim_end_matches("...")));
    }

    #[test]
    fn empty_inputs_are_safe() {
        assert_eq!(make_snippet("", "query", 10), (String::new(), 0, 0));
        let (snippet, start, end) = make_snippet("short text", "", 10);
        assert_eq!((start, end), (0, 10));
        assert_eq!(snippet, "short text");
    }

    #[test]
    fn clean_collapses_whitespace() {
        assert_eq!(clean_snippet("  a\n\n b\t c  "), "a b c");
    }

    #[test]
    fn truncate_prefers_word_boundary() {
        let long = "word ".repeat(60);
        let out = truncate_snippet(&long, MAX_SNIPPET_CHARS);
        assert!(out.ends_with("..."));
        assert!(out.chars().count() <= MAX_SNIPPET_CHARS + 3);
        assert!(!out.trim_end_matches("...").ends_with("wor"));
    }

    #[test]
    fn truncate_is_char_safe() {
        let text = "é".repeat(300);
        let out = truncate_snippet(&text, MAX_SNIPPET_CHARS);
        assert!(out.ends_with("..."));
    }

    #[test]
    fn highlight_wraps_words_case_insensitively() {
        let out = highlight_query("Machine learning beats machinery", "machine LEARNING");
        assert_eq!(out, "**Machine** **learning** beats machinery");
    }

    #[test]
    fn highlight_with_empty_query_is_identity() {
        assert_eq!(highlight_query("unchanged", "  "), "unchanged");
    }
}
