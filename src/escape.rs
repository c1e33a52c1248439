use crate::value::{SafeString, Value};

/// Escape `&`, `<`, `>`, `"` and `'` as HTML entities.
///
/// Single pass, so an `&` introduced by an entity is never escaped again.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escape a value that goes into an attribute.
///
/// Safe strings pass through untouched, strings come back escaped (and so
/// marked safe), arrays become the literal `[object Array]`. Every other value
/// is returned as is and the caller stringifies it.
pub fn escape_attr(value: &Value) -> Value {
    match value {
        Value::Safe(_) => value.clone(),
        Value::String(s) => Value::Safe(SafeString::new(escape(s))),
        Value::Array(_) => Value::String("[object Array]".to_string()),
        _ => value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    #[test]
    fn test_escape_entities() {
        assert_eq!(
            escape(r#"<script>alert("x" & 'y')</script>"#),
            "&lt;script&gt;alert(&quot;x&quot; &amp; &#39;y&#39;)&lt;/script&gt;"
        );
    }

    #[test]
    fn test_escape_does_not_double_escape() {
        assert_eq!(escape("&lt;"), "&amp;lt;");
        assert_eq!(escape("plain text"), "plain text");
    }

    #[test]
    fn test_escape_attr() {
        assert_eq!(
            escape_attr(&Value::from("<a>")),
            Value::Safe(SafeString::new("&lt;a&gt;"))
        );
        assert_eq!(
            escape_attr(&Value::Safe(SafeString::new("<div"))),
            Value::Safe(SafeString::new("<div"))
        );
        assert_eq!(
            escape_attr(&Value::from(vec!["a", "b"])),
            Value::from("[object Array]")
        );
        assert_eq!(escape_attr(&Value::from(3)), Value::from(3));
        assert_eq!(
            escape_attr(&Value::Object(IndexMap::new())),
            Value::Object(IndexMap::new())
        );
    }
}
