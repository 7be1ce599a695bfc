//! Predicate construction for the index's query language.
//!
//! [`build_filters`] turns [`IndexFilters`] into a prefix that is spliced in
//! front of a mode-specific match clause. The prefix is either empty or ends
//! with `" and "`, so callers can always write `{prefix}{clause}`.
//!
//! Clauses are emitted in a fixed order: hidden, ACL, source type, document
//! set, recency.
//!
//! Access control is enforced only here. Retrieved chunks are not checked
//! against the ACL a second time.

use chrono::{DateTime, Duration, Utc};

use crate::codec::fields;
use crate::models::IndexFilters;

/// Documents without an update time are only admitted by recency filters
/// whose cutoff is older than this many days (roughly one fiscal quarter).
pub const UNTIMED_DOC_GRACE_DAYS: i64 = 92;

/// Build the filter prefix for a query.
///
/// `now` is the reference instant for the untimed-document grace window.
///
/// # Example
///
/// ```rust
/// use chrono::Utc;
/// use docindex_core::filters::build_filters;
/// use docindex_core::models::IndexFilters;
///
/// let prefix = build_filters(&IndexFilters::default(), true, Utc::now());
/// assert_eq!(prefix, "");
/// ```
pub fn build_filters(filters: &IndexFilters, include_hidden: bool, now: DateTime<Utc>) -> String {
    let mut filter_str = String::new();

    if !include_hidden {
        filter_str.push_str(&format!("!({}=true) and ", fields::HIDDEN));
    }

    filter_str.push_str(&or_group(
        fields::ACCESS_CONTROL_LIST,
        filters.access_control_list.as_deref(),
    ));
    filter_str.push_str(&or_group(fields::SOURCE_TYPE, filters.source_type.as_deref()));
    filter_str.push_str(&or_group(fields::DOCUMENT_SETS, filters.document_set.as_deref()));
    filter_str.push_str(&time_filter(filters.time_cutoff, now));

    filter_str
}

/// `(key contains "a" or key contains "b") and `, skipping empty values.
///
/// Returns an empty string when no usable value remains.
fn or_group(key: &str, vals: Option<&[String]>) -> String {
    let Some(vals) = vals else {
        return String::new();
    };

    let clauses: Vec<String> = vals
        .iter()
        .filter(|v| !v.is_empty())
        .map(|v| format!("{} contains {}", key, quote(v)))
        .collect();

    if key.is_empty() || clauses.is_empty() {
        return String::new();
    }

    format!("({}) and ", clauses.join(" or "))
}

fn time_filter(cutoff: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(cutoff) = cutoff else {
        return String::new();
    };

    let include_untimed = now - Duration::days(UNTIMED_DOC_GRACE_DAYS) > cutoff;
    let cutoff_secs = cutoff.timestamp();

    if include_untimed {
        // Untimed documents store -1, which is older than any cutoff.
        return format!(
            "!({field} < {secs} and {field} != -1) and ",
            field = fields::DOC_UPDATED_AT,
            secs = cutoff_secs
        );
    }

    format!("({} >= {}) and ", fields::DOC_UPDATED_AT, cutoff_secs)
}

/// Quote a value as a query-language string literal.
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_empty_filters_empty_predicate() {
        assert_eq!(build_filters(&IndexFilters::default(), true, now()), "");
    }

    #[test]
    fn test_hidden_excluded_by_default() {
        assert_eq!(
            build_filters(&IndexFilters::default(), false, now()),
            "!(hidden=true) and "
        );
    }

    #[test]
    fn test_acl_with_only_empty_entries_emits_nothing() {
        let filters = IndexFilters {
            access_control_list: Some(vec![String::new(), String::new()]),
            ..Default::default()
        };
        assert_eq!(build_filters(&filters, true, now()), "");

        let filters = IndexFilters {
            access_control_list: Some(vec![]),
            ..Default::default()
        };
        assert_eq!(build_filters(&filters, true, now()), "");
    }

    #[test]
    fn test_clause_order_is_fixed() {
        let filters = IndexFilters {
            access_control_list: Some(vec!["user_email:a@b.c".into(), "PUBLIC".into()]),
            source_type: Some(vec!["web".into()]),
            document_set: Some(vec!["eng".into()]),
            time_cutoff: Some(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()),
        };
        let got = build_filters(&filters, false, now());
        assert_eq!(
            got,
            "!(hidden=true) and \
             (access_control_list contains \"user_email:a@b.c\" or access_control_list contains \"PUBLIC\") and \
             (source_type contains \"web\") and \
             (document_sets contains \"eng\") and \
             (doc_updated_at >= 1714521600) and "
        );
    }

    #[test]
    fn test_values_are_escaped() {
        let filters = IndexFilters {
            document_set: Some(vec![r#"x" or true or "y"#.into()]),
            ..Default::default()
        };
        let got = build_filters(&filters, true, now());
        assert_eq!(
            got,
            r#"(document_sets contains "x\" or true or \"y") and "#
        );
    }

    #[test]
    fn test_old_cutoff_admits_untimed_documents() {
        let cutoff = now() - Duration::days(UNTIMED_DOC_GRACE_DAYS + 1);
        let filters = IndexFilters {
            time_cutoff: Some(cutoff),
            ..Default::default()
        };
        let got = build_filters(&filters, true, now());
        assert_eq!(
            got,
            format!(
                "!(doc_updated_at < {} and doc_updated_at != -1) and ",
                cutoff.timestamp()
            )
        );
    }

    #[test]
    fn test_recent_cutoff_excludes_untimed_documents() {
        let cutoff = now() - Duration::days(7);
        let filters = IndexFilters {
            time_cutoff: Some(cutoff),
            ..Default::default()
        };
        let got = build_filters(&filters, true, now());
        assert_eq!(got, format!("(doc_updated_at >= {}) and ", cutoff.timestamp()));
    }

    #[test]
    fn test_quote_control_chars() {
        assert_eq!(quote("a\\b"), r#""a\\b""#);
        assert_eq!(quote("line\nbreak"), r#""line\nbreak""#);
        assert_eq!(quote("\u{1}"), r#""\u0001""#);
    }
}
