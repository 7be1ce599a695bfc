//! Removal of characters the index refuses to store.
//!
//! Applied only after the index has rejected a chunk, so the common path
//! never walks the text character by character.

/// Strip control characters (other than tab, newline, carriage return) and
/// the non-characters U+FFFE / U+FFFF.
pub fn remove_invalid_unicode_chars(text: &str) -> String {
    text.chars().filter(|c| !is_invalid(*c)).collect()
}

fn is_invalid(c: char) -> bool {
    matches!(
        c,
        '\u{0}'..='\u{8}' | '\u{b}' | '\u{c}' | '\u{e}'..='\u{1f}' | '\u{fffe}' | '\u{ffff}'
    )
}
