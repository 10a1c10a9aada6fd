//! Request variables: a flat map of name → JSON scalar.

use std::collections::BTreeMap;

use serde_json::Value;

/// Variables supplied with a request. Sorted for stable rendering.
pub type Variables = BTreeMap<String, Value>;

/// Render a variable value as plain text. `null` has no text.
pub fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

/// Missing, `null`, or whitespace-only.
pub fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

/// Text of a variable when present and non-blank.
pub fn text_of(variables: &Variables, name: &str) -> Option<String> {
    let value = variables.get(name)?;
    if is_blank(Some(value)) {
        return None;
    }
    value_text(value)
}

/// `true` for a JSON `true` or the string `"true"`.
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s == "true",
        _ => false,
    }
}

/// Build a variable map from `key=value` pairs, e.g. from a CLI.
pub fn from_pairs<I, S>(pairs: I) -> Variables
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    pairs
        .into_iter()
        .filter_map(|pair| {
            let (k, v) = pair.as_ref().split_once('=')?;
            Some((k.trim().to_string(), Value::String(v.to_string())))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn blank_covers_null_and_whitespace() {
        assert!(is_blank(None));
        assert!(is_blank(Some(&json!(null))));
        assert!(is_blank(Some(&json!("   "))));
        assert!(!is_blank(Some(&json!(0))));
        assert!(!is_blank(Some(&json!(false))));
    }

    #[test]
    fn pairs_split_on_first_equals() {
        let vars = from_pairs(["a=1", "b=x=y", "junk"]);
        assert_eq!(vars.len(), 2);
        assert_eq!(vars["b"], json!("x=y"));
    }

    #[test]
    fn truthy_accepts_bool_and_string() {
        assert!(is_truthy(Some(&json!(true))));
        assert!(is_truthy(Some(&json!("true"))));
        assert!(!is_truthy(Some(&json!("yes"))));
        assert!(!is_truthy(None));
    }
}
