//! Language table lookups backing the translation instruction.

/// Resolve an ISO 639-1 code to its English display name.
pub fn language_name(code: &str) -> Option<&'static str> {
    isolang::Language::from_639_1(code).map(|lang| lang.to_name())
}

/// All languages with an ISO 639-1 code, as (code, name) pairs sorted by name.
pub fn all_languages() -> Vec<(&'static str, &'static str)> {
    let mut languages = Vec::new();
    for i in 0..10000 {
        if let Some(lang) = isolang::Language::from_usize(i) {
            if let Some(code) = lang.to_639_1() {
                languages.push((code, lang.to_name()));
            }
        }
    }
    languages.sort_by_key(|&(_, name)| name);
    languages.dedup_by_key(|&mut (code, _)| code);
    languages
}
