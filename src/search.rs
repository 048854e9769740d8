use crate::translit;

/// Normalize a string for name matching.
/// Applies lowercase and transliteration (e.g., "Иван" -> "ivan").
pub fn normalize(s: &str) -> String {
    translit::transliterate(s).to_lowercase()
}

/// Normalized filter for a search term, or `None` when the term means
/// "no filter".
pub fn normalize_query(query: &str) -> Option<String> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(normalize(trimmed))
    }
}

/// Whether `name` matches an already-normalized filter.
pub fn matches(name: &str, normalized_filter: &str) -> bool {
    normalize(name).contains(normalized_filter)
}
