// 🧹 Normalization - canonical token forms
// The same rules run at extraction, reconciliation and fingerprint time,
// so the three stages can never disagree about what a token "is".

/// Canonical form for free-text comparison: trimmed, lowercased,
/// internal whitespace collapsed to single spaces.
///
/// Total function: anything unusable comes out as the empty string.
pub fn normalize_token(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Canonical form for plates and unit codes: uppercased, only letters,
/// digits and '-' survive ("abc 123!" → "ABC123").
pub fn normalize_plate(raw: &str) -> String {
    raw.to_uppercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect()
}

/// Plate form with separators removed as well, for loose comparison
/// ("ABC-123" y "ABC123" son la misma placa).
pub fn compact_plate(raw: &str) -> String {
    normalize_plate(raw).replace('-', "")
}

/// Strip list markers and colon-delimited annotations from a person token:
/// "1. Juan" → "Juan", "- Pedro" → "Pedro", "Juan: llegó tarde" → "Juan".
pub fn clean_person_token(raw: &str) -> String {
    let without_annotation = match raw.find(':') {
        Some(pos) => &raw[..pos],
        None => raw,
    };

    without_annotation
        .trim_start_matches(|c: char| {
            c.is_ascii_digit()
                || c == '.'
                || c == ')'
                || c == '-'
                || c == '•'
                || c == '*'
                || c.is_whitespace()
        })
        .trim()
        .to_string()
}

/// Display form for person names: "juan perez" → "Juan Perez".
pub fn title_case_name(raw: &str) -> String {
    raw.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================================
// TESTS
// ============================================================================
