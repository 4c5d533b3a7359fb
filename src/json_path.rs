//! Dotted-path lookup over loosely shaped third-party JSON.
//!
//! `"data.power"` walks object keys only. Array indices, wildcards and escaped
//! dots are not part of the language; paths that would need them, and paths
//! with empty segments, resolve to [`PathLookup::NotFound`].

use serde_json::Value as JsonValue;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathLookup<'a> {
    Found(&'a JsonValue),
    NotFound,
}

impl<'a> PathLookup<'a> {
    pub fn found(self) -> Option<&'a JsonValue> {
        match self {
            PathLookup::Found(value) => Some(value),
            PathLookup::NotFound => None,
        }
    }
}

pub fn extract<'a>(document: &'a JsonValue, path: &str) -> PathLookup<'a> {
    let path = path.trim();
    if path.is_empty() {
        return PathLookup::NotFound;
    }

    let mut current = document;
    for segment in path.split('.') {
        if segment.is_empty() {
            return PathLookup::NotFound;
        }
        match current.as_object().and_then(|object| object.get(segment)) {
            Some(next) => current = next,
            None => return PathLookup::NotFound,
        }
    }
    PathLookup::Found(current)
}

/// Numeric value at `path`. Numeric strings are accepted since many
/// inverter gateways quote their numbers.
pub fn extract_number(document: &JsonValue, path: &str) -> Option<f64> {
    let value = match extract(document, path) {
        PathLookup::Found(JsonValue::Number(number)) => number.as_f64(),
        PathLookup::Found(JsonValue::String(raw)) => raw.trim().parse::<f64>().ok(),
        _ => None,
    };
    value.filter(|value| value.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn walks_nested_objects() {
        let doc = json!({"data": {"measurements": {"power": 12.5}}});
        assert_eq!(
            extract(&doc, "data.measurements.power"),
            PathLookup::Found(&json!(12.5))
        );
        assert_eq!(extract(&doc, "data").found(), doc.get("data"));
    }

    #[test]
    fn any_missing_segment_is_not_found() {
        let doc = json!({"a": {"b": {"c": {"d": 1}}}});
        for path in ["x", "a.x", "a.b.x", "a.b.c.x", "a.b.c.d.e", "x.b.c.d"] {
            assert_eq!(extract(&doc, path), PathLookup::NotFound, "path {path}");
        }
    }

    #[test]
    fn scalars_and_arrays_are_not_indexable() {
        let doc = json!({"power": 3, "list": [{"value": 1}], "text": "abc"});
        assert_eq!(extract(&doc, "power.value"), PathLookup::NotFound);
        assert_eq!(extract(&doc, "list.0"), PathLookup::NotFound);
        assert_eq!(extract(&doc, "list.0.value"), PathLookup::NotFound);
        assert_eq!(extract(&doc, "text.length"), PathLookup::NotFound);
        assert_eq!(extract(&json!(null), "a"), PathLookup::NotFound);
        assert_eq!(extract(&json!([1, 2]), "0"), PathLookup::NotFound);
    }

    #[test]
    fn empty_segments_are_rejected() {
        let doc = json!({"a": {"": {"b": 1}}, "": 2});
        for path in ["", "  ", ".", "a.", ".a", "a..b"] {
            assert_eq!(extract(&doc, path), PathLookup::NotFound, "path {path:?}");
        }
    }

    #[test]
    fn numbers_may_be_quoted() {
        let doc = json!({"p": "12.5", "q": 7, "r": "n/a", "s": null, "t": true});
        assert_eq!(extract_number(&doc, "p"), Some(12.5));
        assert_eq!(extract_number(&doc, "q"), Some(7.0));
        assert_eq!(extract_number(&doc, "r"), None);
        assert_eq!(extract_number(&doc, "s"), None);
        assert_eq!(extract_number(&doc, "t"), None);
        assert_eq!(extract_number(&doc, "missing"), None);
    }
}
