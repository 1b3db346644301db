//! Method identity.
//!
//! A [`MethodKey`] is the JSON serialisation of the fixed-order tuple
//! `[verb, url, params, body, headers]`. Object keys are sorted at every
//! depth before serialising, so two structurally equal descriptors produce
//! byte-identical keys no matter in which order their maps were filled.
//! Config and transforms never reach the key.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::MethodDescriptor;

/// Stable identity string of a request descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MethodKey(String);

impl MethodKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for MethodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for MethodKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Compute the identity key of a method.
///
/// ```rust
/// # use reqstate::{MethodDescriptor, compute_key};
/// let a = MethodDescriptor::get("/todos").param("page", 1).param("size", 20);
/// let b = MethodDescriptor::get("/todos").param("size", 20).param("page", 1);
/// assert_eq!(compute_key(&a), compute_key(&b));
/// ```
pub fn compute_key(method: &MethodDescriptor) -> MethodKey {
    let params = canonical_map(method.params.iter());
    let headers = canonical_map(method.headers.iter());
    let body = method.body.as_ref().map(canonical).unwrap_or(Value::Null);
    let identity = Value::Array(vec![
        Value::String(method.verb.as_str().to_string()),
        Value::String(method.url.clone()),
        params,
        body,
        headers,
    ]);
    MethodKey(identity.to_string())
}

/// Rebuild `value` with every object's keys inserted in sorted order.
///
/// `serde_json::Map` is sorted by default, but keeps insertion order when
/// another crate in the build enables `preserve_order`.
fn canonical(value: &Value) -> Value {
    match value {
        Value::Object(map) => canonical_map(map.iter()),
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        other => other.clone(),
    }
}

fn canonical_map<'a>(entries: impl Iterator<Item = (&'a String, &'a Value)>) -> Value {
    let mut sorted: Vec<(&String, &Value)> = entries.collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let mut map = Map::new();
    for (k, v) in sorted {
        map.insert(k.clone(), canonical(v));
    }
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_is_fixed_order_tuple() {
        let method = MethodDescriptor::post("/users", json!({"name": "Ada"}))
            .param("v", 2)
            .header("x-id", "1");
        assert_eq!(
            compute_key(&method).as_str(),
            r#"["POST","/users",{"v":2},{"name":"Ada"},{"x-id":"1"}]"#
        );
    }

    #[test]
    fn missing_body_serialises_as_null() {
        let method = MethodDescriptor::get("/users");
        assert_eq!(compute_key(&method).as_str(), r#"["GET","/users",{},null,{}]"#);
    }

    #[test]
    fn canonical_sorts_nested_objects() {
        let mut inner = Map::new();
        inner.insert("z".into(), json!(1));
        inner.insert("a".into(), json!([{"y": 1, "b": 2}]));
        let value = canonical(&Value::Object(inner));
        assert_eq!(value.to_string(), r#"{"a":[{"b":2,"y":1}],"z":1}"#);
    }
}
