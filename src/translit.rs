//! Transliteration of non-Latin scripts to ASCII, so that a query typed
//! on a Latin keyboard still finds "Иван" or "José".

use deunicode::deunicode;

/// Transliterate a string to ASCII, collapsing runs of whitespace.
pub fn transliterate(s: &str) -> String {
    let result = deunicode(s);
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}
