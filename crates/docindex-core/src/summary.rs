//! Highlight summary truncation.
//!
//! The index returns a dynamic summary for the highlight field: matching
//! excerpts joined by [`SUMMARY_SEPARATOR`]. [`truncate_summary`] bounds the
//! total length and cuts the last excerpt at a word boundary.
//!
//! # Algorithm
//!
//! 1. Split on the separator and walk the excerpts in order.
//! 2. While the running length stays within `max_chars`, keep excerpts as-is.
//! 3. For the excerpt that would overflow, keep only the remaining budget,
//!    strip leading whitespace, and drop the trailing partial word.
//! 4. If no word boundary is left, put the ellipsis on the previous excerpt
//!    instead and stop.
//! 5. Otherwise drop one trailing punctuation character, append the
//!    ellipsis, and stop.
//!
//! An ellipsis ending the final excerpt does not count toward the length, so
//! running the truncator over its own output returns it unchanged. Ellipses
//! inside earlier excerpts are ordinary text.

pub const SUMMARY_SEPARATOR: &str = "<sep />";
pub const DEFAULT_MAX_SUMMARY_CHARS: usize = 400;

const ELLIPSIS: &str = "...";

/// Truncate a separator-joined summary into displayable fragments.
///
/// # Example
///
/// ```rust
/// use docindex_core::summary::truncate_summary;
///
/// let out = truncate_summary("hello world foo<sep />bar baz", 8);
/// assert_eq!(out, vec!["hello...".to_string()]);
/// ```
pub fn truncate_summary(dynamic_summary: &str, max_chars: usize) -> Vec<String> {
    if dynamic_summary.is_empty() {
        return Vec::new();
    }

    let mut current_len = 0usize;
    let mut fragments: Vec<String> = Vec::new();

    let mut sections = dynamic_summary.split(SUMMARY_SEPARATOR).peekable();
    while let Some(section) = sections.next() {
        let section_len = if sections.peek().is_none() {
            display_len(section)
        } else {
            section.chars().count()
        };
        if current_len + section_len <= max_chars {
            fragments.push(section.to_string());
            current_len += section_len;
            continue;
        }

        let budget = max_chars.saturating_sub(current_len);
        let truncated: String = section.chars().take(budget).collect();
        let truncated = truncated.trim_start();

        let kept = truncated
            .rsplit_once(' ')
            .map(|(head, _)| strip_trailing_punctuation(head))
            .filter(|head| !head.is_empty());

        match kept {
            Some(head) => fragments.push(format!("{}{}", head, ELLIPSIS)),
            None => {
                if let Some(last) = fragments.last_mut() {
                    if !last.ends_with(ELLIPSIS) {
                        last.push_str(ELLIPSIS);
                    }
                }
            }
        }
        break;
    }

    fragments
}

/// Character count of the final excerpt, not counting a trailing ellipsis.
fn display_len(section: &str) -> usize {
    section
        .strip_suffix(ELLIPSIS)
        .unwrap_or(section)
        .chars()
        .count()
}

fn strip_trailing_punctuation(s: &str) -> &str {
    match s.chars().last() {
        Some(c) if c.is_ascii_punctuation() => &s[..s.len() - c.len_utf8()],
        _ => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejoin(fragments: &[String]) -> String {
        fragments.join(SUMMARY_SEPARATOR)
    }

    #[test]
    fn test_empty_summary() {
        assert!(truncate_summary("", 400).is_empty());
    }

    #[test]
    fn test_short_summary_unchanged() {
        let out = truncate_summary("alpha beta<sep />gamma", 400);
        assert_eq!(out, vec!["alpha beta", "gamma"]);
    }

    #[test]
    fn test_truncates_at_word_boundary() {
        let out = truncate_summary("hello world foo<sep />bar baz", 8);
        assert_eq!(out, vec!["hello..."]);
        assert_eq!(truncate_summary(&rejoin(&out), 8), out);
    }

    #[test]
    fn test_no_boundary_marks_previous_fragment() {
        let out = truncate_summary("first part<sep />overflowingword", 14);
        assert_eq!(out, vec!["first part..."]);
        assert_eq!(truncate_summary(&rejoin(&out), 14), out);
    }

    #[test]
    fn test_no_boundary_without_previous_fragment() {
        assert!(truncate_summary("supercalifragilistic", 5).is_empty());
    }

    #[test]
    fn test_strips_single_trailing_punctuation() {
        let out = truncate_summary("one, two, three four", 12);
        assert_eq!(out, vec!["one, two..."]);
    }

    #[test]
    fn test_leading_whitespace_is_dropped() {
        let out = truncate_summary("abc<sep />   de fg hi", 10);
        assert_eq!(out, vec!["abc", "de..."]);
    }

    #[test]
    fn test_idempotent_when_ellipsis_exceeds_cut() {
        let out = truncate_summary("ab cd", 4);
        assert_eq!(out, vec!["ab..."]);
        assert_eq!(truncate_summary(&rejoin(&out), 4), out);
    }

    #[test]
    fn test_exact_fit_then_overflow() {
        let out = truncate_summary("abcd<sep />efgh", 4);
        assert_eq!(out, vec!["abcd..."]);
        assert_eq!(truncate_summary(&rejoin(&out), 4), out);
    }

    #[test]
    fn test_inner_ellipsis_counts_toward_length() {
        let out = truncate_summary("ab...<sep />cd", 5);
        assert_eq!(out, vec!["ab..."]);
        let out = truncate_summary("ab...<sep />cd", 7);
        assert_eq!(out, vec!["ab...", "cd"]);
    }

    #[test]
    fn test_counts_characters_not_bytes() {
        let out = truncate_summary("héllo wörld", 11);
        assert_eq!(out, vec!["héllo wörld"]);
    }
}
