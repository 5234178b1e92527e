//! Shape sniffing for undocumented sportsbook JSON.
//!
//! The sites change their envelope without notice, so each scraper keeps an
//! ordered list of JSON pointers and takes the first that yields a non-empty
//! array. A known envelope holding an empty array is still a match (an empty
//! listing), only a body with none of the paths is an unknown shape. The
//! matched pointer is reported so a shape change shows up in logs.

use serde_json::Value;

#[derive(Debug, Clone, Copy)]
pub struct Sniffed<'a> {
    pub path:  &'static str,
    pub items: &'a [Value],
}

impl Sniffed<'_> {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// First non-empty array among `paths` (JSON pointers, "" = root), else the
/// first path holding an empty array.
pub fn sniff_array<'a>(root: &'a Value, paths: &[&'static str]) -> Option<Sniffed<'a>> {
    let mut empty = None;
    for &path in paths {
        let node = if path.is_empty() { Some(root) } else { root.pointer(path) };
        match node.and_then(Value::as_array) {
            Some(items) if !items.is_empty() => return Some(Sniffed { path, items }),
            Some(items) => {
                empty.get_or_insert(Sniffed { path, items });
            }
            None => {}
        }
    }
    empty
}

/// First string found among `paths` under `node`, trimmed and non-empty.
pub fn first_str<'a>(node: &'a Value, paths: &[&str]) -> Option<&'a str> {
    paths.iter().find_map(|p| {
        node.pointer(p)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    })
}

/// String-or-number field rendered as a string (ids come both ways).
pub fn first_scalar(node: &Value, paths: &[&str]) -> Option<String> {
    paths.iter().find_map(|p| match node.pointer(p)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// `[{name, events: [...]}, ...]` → `(tournament, event)` pairs.
pub fn flatten_tournaments(tournaments: &[Value]) -> Vec<(&Value, &Value)> {
    tournaments
        .iter()
        .flat_map(|t| {
            t.get("events")
                .and_then(Value::as_array)
                .map(|events| events.iter().map(move |e| (t, e)).collect::<Vec<_>>())
                .unwrap_or_default()
        })
        .collect()
}

/// Numeric field that may arrive as a number, a numeric string or a bool.
pub fn as_i64_loose(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(*b as i64),
        _ => None,
    }
}

/// Truthy flag: `true`, non-zero numbers, `"true"`/`"1"`.
pub fn is_truthy(v: Option<&Value>) -> bool {
    match v {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PATHS: &[&str] = &["/responses/0/responses", "/queries/0/events", "/data/tournaments", ""];

    #[test]
    fn skips_empty_arrays_and_reports_the_matching_path() {
        let body = json!({
            "responses": [{ "responses": [] }],
            "queries": [{ "events": [{ "id": 1 }, { "id": 2 }] }]
        });
        let hit = sniff_array(&body, PATHS).unwrap();
        assert_eq!(hit.path, "/queries/0/events");
        assert_eq!(hit.items.len(), 2);
    }

    #[test]
    fn empty_envelope_is_a_match_not_an_unknown_shape() {
        let body = json!({ "bizCode": 10000, "message": "0#0", "data": { "tournaments": [] } });
        let hit = sniff_array(&body, PATHS).unwrap();
        assert_eq!(hit.path, "/data/tournaments");
        assert!(hit.is_empty());

        let body = json!({ "responses": [{ "responses": [] }], "queries": [{ "events": [] }] });
        assert_eq!(sniff_array(&body, PATHS).unwrap().path, "/responses/0/responses");
    }

    #[test]
    fn root_array_is_a_valid_shape() {
        let body = json!([{ "id": "x" }]);
        let hit = sniff_array(&body, PATHS).unwrap();
        assert_eq!(hit.path, "");
    }

    #[test]
    fn no_shape_matches_objects_or_missing_keys() {
        let body = json!({ "data": { "tournaments": {} }, "bizCode": 10000 });
        assert!(sniff_array(&body, PATHS).is_none());
    }

    #[test]
    fn flatten_keeps_tournament_context() {
        let tournaments = vec![
            json!({ "name": "Premier League", "events": [{ "eventId": "a" }, { "eventId": "b" }] }),
            json!({ "name": "No events" }),
            json!({ "name": "Serie A", "events": [{ "eventId": "c" }] }),
        ];
        let pairs = flatten_tournaments(&tournaments);
        assert_eq!(pairs.len(), 3);
        assert_eq!(pairs[2].0["name"], "Serie A");
        assert_eq!(pairs[2].1["eventId"], "c");
    }

    #[test]
    fn scalar_and_flag_helpers_accept_loose_types() {
        let v = json!({ "id": 123, "sid": " 45 ", "flag": "true", "zero": 0, "status": "2" });
        assert_eq!(first_scalar(&v, &["/missing", "/id"]).as_deref(), Some("123"));
        assert_eq!(first_scalar(&v, &["/sid"]).as_deref(), Some("45"));
        assert!(is_truthy(v.get("flag")));
        assert!(!is_truthy(v.get("zero")));
        assert!(!is_truthy(v.get("missing")));
        assert_eq!(as_i64_loose(&v["status"]), Some(2));
    }
}
