use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Separators seen in event names, most specific first.
const SEPARATORS: &[&str] = &[" vs. ", " vs ", " VS ", " v ", " \u{2013} ", " - "];

/// "Arsenal vs Chelsea" / "Arsenal - Chelsea" → ("Arsenal", "Chelsea")
pub fn split_teams(name: &str) -> Option<(String, String)> {
    for sep in SEPARATORS {
        if let Some(pos) = name.find(sep) {
            let t1 = name[..pos].trim();
            let t2 = name[(pos + sep.len())..].trim();
            if !t1.is_empty() && !t2.is_empty() {
                return Some((t1.to_string(), t2.to_string()));
            }
        }
    }
    None
}

/// Lowercase, diacritics stripped, punctuation collapsed to single spaces.
pub fn normalize_team_name(name: &str) -> String {
    name.nfkd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Bookmaker-independent key for the same fixture.
pub fn match_key(home: &str, away: &str) -> String {
    format!("{}_vs_{}", normalize_team_name(home), normalize_team_name(away))
}
