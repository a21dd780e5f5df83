//! Query Parser (C6): pure, no I/O. Shared by the assembler's candidate
//! lookup and the hybrid search engine's strategy auto-selection.

const MAX_QUERY_LEN: usize = 2_048;
const OPERATOR_CHARS: &[char] = &['\'', '"', '*', '(', ')', '{', '}', '[', ']', '\\'];

/// How the caller wants the query matched against content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMatchType {
    Exact,
    Prefix,
    Fuzzy,
}

/// A parsed, normalized query ready for downstream scoring or FTS
/// delegation.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedQuery {
    pub query: String,
    pub match_type: QueryMatchType,
    pub has_operators: bool,
    pub is_valid: bool,
    pub error: Option<String>,
}

/// Validation result for `validate`.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub error: Option<String>,
}

fn has_unmatched_quotes(query: &str) -> bool {
    query.chars().filter(|c| *c == '"').count() % 2 != 0
}

/// Rejects empty, over-length, or unbalanced-quote queries.
pub fn validate(query: &str) -> ValidationResult {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return ValidationResult {
            is_valid: false,
            error: Some("query must not be empty".into()),
        };
    }
    if query.len() > MAX_QUERY_LEN {
        return ValidationResult {
            is_valid: false,
            error: Some(format!(
                "query exceeds maximum length of {} characters",
                MAX_QUERY_LEN
            )),
        };
    }
    if has_unmatched_quotes(query) {
        return ValidationResult {
            is_valid: false,
            error: Some("query has unmatched quotes".into()),
        };
    }
    ValidationResult {
        is_valid: true,
        error: None,
    }
}

/// Shapes a raw query according to `match_type`, applying the exact/prefix
/// wrapping and reporting validity and operator presence.
pub fn parse(query: &str, match_type: QueryMatchType) -> ParsedQuery {
    let validation = validate(query);
    let has_operators = query.chars().any(|c| OPERATOR_CHARS.contains(&c));

    let shaped = if !validation.is_valid {
        query.to_string()
    } else {
        match match_type {
            QueryMatchType::Exact => format!("\"{}\"", query.trim()),
            QueryMatchType::Prefix => format!("{}*", query.trim()),
            QueryMatchType::Fuzzy => query.trim().to_string(),
        }
    };

    ParsedQuery {
        query: shaped,
        match_type,
        has_operators,
        is_valid: validation.is_valid,
        error: validation.error,
    }
}

/// Extracts search terms: quoted phrases are preserved whole, operator
/// characters are stripped, and the remainder is split on whitespace.
pub fn extract_terms(query: &str) -> Vec<String> {
    let mut terms = Vec::new();
    let mut chars = query.chars().peekable();
    let mut current = String::new();

    while let Some(c) = chars.next() {
        if c == '"' {
            let mut phrase = String::new();
            for c2 in chars.by_ref() {
                if c2 == '"' {
                    break;
                }
                phrase.push(c2);
            }
            if !phrase.trim().is_empty() {
                terms.push(phrase.trim().to_string());
            }
            continue;
        }
        if OPERATOR_CHARS.contains(&c) {
            continue;
        }
        if c.is_whitespace() {
            if !current.is_empty() {
                terms.push(std::mem::take(&mut current));
            }
        } else {
            current.push(c);
        }
    }
    if !current.is_empty() {
        terms.push(current);
    }
    terms
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_exact_wraps_in_quotes() {
        let p = parse("hello world", QueryMatchType::Exact);
        assert_eq!(p.query, "\"hello world\"");
        assert!(p.is_valid);
    }

    #[test]
    fn parse_prefix_appends_star() {
        let p = parse("hel", QueryMatchType::Prefix);
        assert_eq!(p.query, "hel*");
    }

    #[test]
    fn parse_detects_operators() {
        let p = parse("foo (bar)", QueryMatchType::Fuzzy);
        assert!(p.has_operators);
    }

    #[test]
    fn validate_rejects_empty() {
        assert!(!validate("   ").is_valid);
    }

    #[test]
    fn validate_rejects_too_long() {
        let q = "a".repeat(MAX_QUERY_LEN + 1);
        assert!(!validate(&q).is_valid);
    }

    #[test]
    fn validate_rejects_unmatched_quotes() {
        assert!(!validate("\"unterminated").is_valid);
    }

    #[test]
    fn extract_terms_preserves_quoted_phrases() {
        let terms = extract_terms("find \"machine learning\" papers");
        assert_eq!(terms, vec!["find", "machine learning", "papers"]);
    }

    #[test]
    fn extract_terms_strips_operator_characters() {
        let terms = extract_terms("foo* (bar) [baz]");
        assert_eq!(terms, vec!["foo", "bar", "baz"]);
    }

    #[test]
    fn extract_terms_discards_empty_tokens() {
        let terms = extract_terms("   foo    bar   ");
        assert_eq!(terms, vec!["foo", "bar"]);
    }

    #[test]
    fn extract_terms_handles_unicode_content() {
        let terms = extract_terms("café \"naïve résumé\"");
        assert_eq!(terms, vec!["café", "naïve résumé"]);
    }

    #[test]
    fn extract_terms_all_operator_string_yields_nothing() {
        let terms = extract_terms("***\"\"(((");
        assert!(terms.is_empty());
    }
}
