//! Attribute list to HTML attribute string.
//!
//! - names and values are escaped
//! - positional attributes: only strings without whitespace are kept,
//!   `"disabled" someVar => disabled someValue`; numbers, arrays, objects,
//!   booleans, `null` and `undefined` are dropped
//! - keyword attributes: strings and numbers are written as is,
//!   `attr1=123 attr2="test"`; arrays become `[object Array]` and objects
//!   `[object Object]`; `null` and `undefined` are skipped
//! - identical tokens are written once, in order of first appearance

use indexmap::IndexSet;

use crate::escape::{escape, escape_attr};
use crate::value::Value;

pub fn convert_attrs(attrs: &[Value]) -> String {
    let mut collect: IndexSet<String> = IndexSet::new();

    for item in attrs {
        match item {
            Value::String(s) if is_bare_attribute(s) => {
                collect.insert(escape(s));
            }
            Value::Keywords(map) => {
                for (key, value) in map {
                    if value.is_nullish() {
                        continue;
                    }
                    collect.insert(format!("{}=\"{}\"", escape(key), escape_attr(value)));
                }
            }
            Value::Undefined | Value::Null | Value::Bool(false) | Value::String(_) => {}
            Value::Number(n) if *n == 0.0 || n.is_nan() => {}
            Value::Bool(true)
            | Value::Number(_)
            | Value::Safe(_)
            | Value::Array(_)
            | Value::Object(_) => {
                tracing::warn!(kind = item.type_name(), value = %item, "unexpected attr type");
            }
        }
    }

    collect.into_iter().collect::<Vec<_>>().join(" ")
}

fn is_bare_attribute(s: &str) -> bool {
    !s.is_empty() && !s.chars().any(char::is_whitespace)
}
