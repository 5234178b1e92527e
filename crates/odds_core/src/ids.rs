use regex::Regex;
use std::sync::OnceLock;

fn non_digits() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\D").expect("static regex"))
}

/// `sr:match:50850679` → `50850679`. Ids without digits come back empty.
pub fn normalize_event_id(raw: &str) -> String {
    non_digits().replace_all(raw, "").into_owned()
}
