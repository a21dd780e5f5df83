//! Result Formatter (C7): produces a highlighted snippet from content and
//! a set of matched search terms.

use regex::Regex;

/// Configurable formatting options (SPEC_FULL.md §4.7 supplemental: markers
/// are caller-configurable rather than hardcoded to one markup flavor).
#[derive(Debug, Clone)]
pub struct FormatOptions {
    pub max_length: usize,
    pub context_length: usize,
    pub max_highlights: usize,
    pub preserve_words: bool,
    pub highlight_start: String,
    pub highlight_end: String,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            max_length: 200,
            context_length: 60,
            max_highlights: 5,
            preserve_words: true,
            highlight_start: "<mark>".into(),
            highlight_end: "</mark>".into(),
        }
    }
}

/// Snippet metadata produced for one (content, terms) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Snippet {
    pub snippet: String,
    pub match_count: usize,
    pub highlighted_terms: Vec<String>,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Copy)]
struct Match {
    start: usize,
    end: usize,
}

fn find_matches(content: &str, terms: &[String]) -> Vec<Match> {
    let mut matches = Vec::new();
    for term in terms {
        if term.is_empty() {
            continue;
        }
        let Ok(re) = Regex::new(&format!("(?i){}", regex::escape(term))) else {
            continue;
        };
        for m in re.find_iter(content) {
            matches.push(Match {
                start: m.start(),
                end: m.end(),
            });
        }
    }
    matches.sort_by_key(|m| m.start);
    matches
}

fn extend_to_word_boundary(content: &str, mut start: usize, mut end: usize) -> (usize, usize) {
    while start > 0 && !content.is_char_boundary(start) {
        start -= 1;
    }
    while end < content.len() && !content.is_char_boundary(end) {
        end += 1;
    }
    while start > 0 && !content.as_bytes()[start - 1].is_ascii_whitespace() {
        start -= 1;
    }
    while end < content.len() && !content.as_bytes()[end].is_ascii_whitespace() {
        end += 1;
    }
    (start, end)
}

/// Finds the best snippet window around the first few matches, applies
/// highlighting, and adds ellipses where the window doesn't span the
/// whole content (spec §4.7 algorithm).
pub fn format_snippet(content: &str, terms: &[String], options: &FormatOptions) -> Snippet {
    let matches = find_matches(content, terms);

    if matches.is_empty() {
        let mut end = options.max_length.min(content.len());
        while end > 0 && !content.is_char_boundary(end) {
            end -= 1;
        }
        if options.preserve_words && end < content.len() && end > content.len() * 4 / 5 {
            if let Some(pos) = content[..end].rfind(char::is_whitespace) {
                end = pos;
            }
        }
        let suffix = if end < content.len() { "..." } else { "" };
        return Snippet {
            snippet: format!("{}{}", &content[..end], suffix),
            match_count: 0,
            highlighted_terms: Vec::new(),
            start: 0,
            end,
        };
    }

    let mut best_region = (0usize, content.len().min(options.max_length));
    let mut best_score = f64::MIN;

    for m in matches.iter().take(5) {
        let region_start = m.start.saturating_sub(options.context_length);
        let region_end = (region_start + options.max_length).min(content.len());

        let match_count_inside = matches
            .iter()
            .filter(|other| other.start >= region_start && other.end <= region_end)
            .count();
        let match_len_inside: usize = matches
            .iter()
            .filter(|other| other.start >= region_start && other.end <= region_end)
            .map(|other| other.end - other.start)
            .sum();
        let score = match_count_inside as f64
            + (match_len_inside as f64 / options.max_length as f64);

        if score > best_score {
            best_score = score;
            best_region = (region_start, region_end);
        }
    }

    let (mut start, mut end) = best_region;
    while start > 0 && !content.is_char_boundary(start) {
        start -= 1;
    }
    while end < content.len() && !content.is_char_boundary(end) {
        end += 1;
    }

    if options.preserve_words {
        let (s, e) = extend_to_word_boundary(content, start, end);
        start = s;
        end = e;
    }

    let mut region = content[start..end].to_string();
    let mut highlighted_terms = Vec::new();

    let mut in_region: Vec<Match> = matches
        .iter()
        .filter(|m| m.start >= start && m.end <= end)
        .cloned()
        .collect();
    in_region.truncate(options.max_highlights);

    // Apply last-to-first so earlier insertions don't shift later indices.
    for m in in_region.iter().rev() {
        let rel_start = m.start - start;
        let rel_end = m.end - start;
        highlighted_terms.push(region[rel_start..rel_end].to_string());
        region = format!(
            "{}{}{}{}{}",
            &region[..rel_start],
            options.highlight_start,
            &region[rel_start..rel_end],
            options.highlight_end,
            &region[rel_end..]
        );
    }
    highlighted_terms.reverse();

    let prefix = if start > 0 { "..." } else { "" };
    let suffix = if end < content.len() { "..." } else { "" };

    Snippet {
        snippet: format!("{}{}{}", prefix, region, suffix),
        match_count: matches.len(),
        highlighted_terms,
        start,
        end,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_matches_returns_prefix_truncation() {
        let s = format_snippet(
            "the quick brown fox",
            &["zebra".to_string()],
            &FormatOptions::default(),
        );
        assert_eq!(s.match_count, 0);
        assert!(s.snippet.starts_with("the quick brown fox"));
    }

    #[test]
    fn single_match_is_highlighted() {
        let opts = FormatOptions::default();
        let s = format_snippet("the quick brown fox jumps", &["quick".to_string()], &opts);
        assert_eq!(s.match_count, 1);
        assert!(s.snippet.contains("<mark>quick</mark>") || s.snippet.contains("<mark>Quick</mark>"));
    }

    #[test]
    fn ellipsis_added_when_region_does_not_span_whole_content() {
        let long = format!("{}needle{}", "a ".repeat(200), " b".repeat(200));
        let s = format_snippet(&long, &["needle".to_string()], &FormatOptions::default());
        assert!(s.snippet.starts_with("..."));
        assert!(s.snippet.ends_with("..."));
    }

    #[test]
    fn case_insensitive_matching() {
        let s = format_snippet("Hello World", &["hello".to_string()], &FormatOptions::default());
        assert_eq!(s.match_count, 1);
    }

    #[test]
    fn configurable_markers_are_honored() {
        let mut opts = FormatOptions::default();
        opts.highlight_start = "[[".into();
        opts.highlight_end = "]]".into();
        let s = format_snippet("match here", &["match".to_string()], &opts);
        assert!(s.snippet.contains("[[match]]"));
    }
}
