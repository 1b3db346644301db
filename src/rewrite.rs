//! Placeholder data with response-driven fields.
//!
//! Initial data for a request may mark fields that should be filled from
//! the response once it arrives. A field is such a directive when it is
//!
//! - an object `{ "action": "responsed", "value": <transform>, "default": <value> }`
//!   anywhere in the tree, or
//! - an object entry whose key starts with `+` and whose value is a
//!   transform, or a sequence `[transform, default]`.
//!
//! [`walk`] replaces every directive with its default (or `null`), strips
//! the `+` from shorthand keys, and records the path of each directive.
//! [`apply_directives`] later runs each transform over the response and
//! writes the results back at those paths.
//!
//! ```rust
//! # use reqstate::rewrite::{Node, walk};
//! # use serde_json::json;
//! let initial = Node::object([
//!     ("title", Node::from("loading")),
//!     ("+id", Node::transform_or(|r| r["id"].clone(), 0)),
//! ]);
//! let rewritten = walk(initial);
//! assert_eq!(rewritten.data, json!({"title": "loading", "id": 0}));
//! assert_eq!(rewritten.hydrate(&json!({"id": 7})), json!({"title": "loading", "id": 7}));
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::warn;

/// Computes a field's value from the response data.
pub type Transform = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

const RESPONSED: &str = "responsed";

/// Initial data tree that may contain transforms.
#[derive(Clone)]
pub enum Node {
    Value(Value),
    Array(Vec<Node>),
    /// Entries in declaration order.
    Object(Vec<(String, Node)>),
    Transform(Transform),
}

impl Node {
    pub fn transform<F>(f: F) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        Node::Transform(Arc::new(f))
    }

    /// Shorthand `[transform, default]`, for use under a `+` key.
    pub fn transform_or<F>(f: F, default: impl Into<Node>) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        Node::Array(vec![Node::transform(f), default.into()])
    }

    /// Full form `{ action: "responsed", value: f }`, default `null`.
    pub fn responsed<F>(f: F) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        Node::Object(vec![
            ("action".to_string(), Node::from(RESPONSED)),
            ("value".to_string(), Node::transform(f)),
        ])
    }

    /// Full form with a default.
    pub fn responsed_or<F>(f: F, default: impl Into<Node>) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        Node::Object(vec![
            ("action".to_string(), Node::from(RESPONSED)),
            ("value".to_string(), Node::transform(f)),
            ("default".to_string(), default.into()),
        ])
    }

    pub fn object<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Node>,
    {
        Node::Object(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn array<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Node>,
    {
        Node::Array(items.into_iter().map(Into::into).collect())
    }

    /// Plain JSON view. Transforms left outside a directive become `null`.
    pub fn into_value(self) -> Value {
        match self {
            Node::Value(v) => v,
            Node::Array(items) => Value::Array(items.into_iter().map(Node::into_value).collect()),
            Node::Object(entries) => Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, v.into_value()))
                    .collect(),
            ),
            Node::Transform(_) => Value::Null,
        }
    }
}

impl Default for Node {
    fn default() -> Self {
        Node::Value(Value::Null)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Value(v) => write!(f, "{v}"),
            Node::Array(items) => f.debug_list().entries(items).finish(),
            Node::Object(entries) => f
                .debug_map()
                .entries(entries.iter().map(|(k, v)| (k, v)))
                .finish(),
            Node::Transform(_) => f.write_str("<transform>"),
        }
    }
}

impl From<Value> for Node {
    fn from(v: Value) -> Self {
        Node::Value(v)
    }
}

macro_rules! node_from_scalar {
    ($($t:ty),*) => {
        $(impl From<$t> for Node {
            fn from(v: $t) -> Self {
                Node::Value(Value::from(v))
            }
        })*
    };
}

node_from_scalar!(&str, String, bool, i32, i64, u64, f64);

/// One step into a JSON tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(k) => f.write_str(k),
            PathSegment::Index(i) => write!(f, "[{i}]"),
        }
    }
}

/// A field to fill from the response.
#[derive(Clone)]
pub struct Directive {
    /// Location in the rewritten data. Empty for the root.
    pub path: Vec<PathSegment>,
    pub transform: Transform,
}

impl fmt::Debug for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Directive")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Output of [`walk`].
#[derive(Debug, Clone, Default)]
pub struct Rewritten {
    /// Initial data with every directive replaced by its default.
    pub data: Value,
    pub directives: Vec<Directive>,
}

impl Rewritten {
    /// The placeholder data with every directive applied to `response`.
    pub fn hydrate(&self, response: &Value) -> Value {
        let mut data = self.data.clone();
        apply_directives(&mut data, &self.directives, response);
        data
    }

    pub fn has_directives(&self) -> bool {
        !self.directives.is_empty()
    }
}

/// Discover directives in `root` and replace them with their defaults.
pub fn walk(root: Node) -> Rewritten {
    let mut directives = Vec::new();
    let data = match directive_of(&root, None) {
        Some((transform, default)) => {
            directives.push(Directive {
                path: Vec::new(),
                transform,
            });
            default.into_value()
        }
        None => walk_node(root, &mut Vec::new(), &mut directives),
    };
    Rewritten { data, directives }
}

fn walk_node(node: Node, path: &mut Vec<PathSegment>, out: &mut Vec<Directive>) -> Value {
    match node {
        Node::Value(v) => v,
        Node::Transform(_) => Value::Null,
        Node::Array(items) => {
            let mut values = Vec::with_capacity(items.len());
            for (i, item) in items.into_iter().enumerate() {
                path.push(PathSegment::Index(i));
                let value = match directive_of(&item, None) {
                    Some((transform, default)) => {
                        out.push(Directive {
                            path: path.clone(),
                            transform,
                        });
                        default.into_value()
                    }
                    None => walk_node(item, path, out),
                };
                path.pop();
                values.push(value);
            }
            Value::Array(values)
        }
        Node::Object(entries) => {
            let mut map = Map::new();
            // A directive entry wins over a plain entry of the same final name.
            let mut filled: HashSet<String> = HashSet::new();
            for (key, child) in entries {
                if let Some((transform, default)) = directive_of(&child, Some(key.as_str())) {
                    let name = key.strip_prefix('+').unwrap_or(&key).to_string();
                    path.push(PathSegment::Key(name.clone()));
                    out.push(Directive {
                        path: path.clone(),
                        transform,
                    });
                    path.pop();
                    map.insert(name.clone(), default.into_value());
                    filled.insert(name);
                } else if !filled.contains(&key) {
                    path.push(PathSegment::Key(key.clone()));
                    let value = walk_node(child, path, out);
                    path.pop();
                    map.insert(key, value);
                }
            }
            Value::Object(map)
        }
    }
}

/// Transform and default of a directive node.
///
/// `key` is the entry name when the node sits in an object; the shorthand
/// forms only count under a `+`-prefixed key.
fn directive_of(node: &Node, key: Option<&str>) -> Option<(Transform, Node)> {
    match node {
        Node::Object(entries) => {
            let field = |name: &str| entries.iter().find(|(k, _)| k == name).map(|(_, v)| v);
            match (field("action"), field("value")) {
                (Some(Node::Value(Value::String(action))), Some(Node::Transform(f)))
                    if action == RESPONSED =>
                {
                    Some((f.clone(), field("default").cloned().unwrap_or_default()))
                }
                _ => None,
            }
        }
        _ if !key.is_some_and(|k| k.starts_with('+')) => None,
        Node::Transform(f) => Some((f.clone(), Node::default())),
        Node::Array(items) => match items.as_slice() {
            [Node::Transform(f)] => Some((f.clone(), Node::default())),
            [Node::Transform(f), default] => Some((f.clone(), default.clone())),
            _ => None,
        },
        Node::Value(_) => None,
    }
}

/// Write each directive's transform of `response` into `target`.
///
/// Missing object keys along a path are created (a `null` becomes an
/// object). A path that runs into a scalar or past the end of an array is
/// skipped with a warning.
pub fn apply_directives(target: &mut Value, directives: &[Directive], response: &Value) {
    for directive in directives {
        let value = (directive.transform)(response);
        match slot_at(target, &directive.path) {
            Some(slot) => *slot = value,
            None => warn!(
                path = %display_path(&directive.path),
                "response field path does not exist in placeholder data, skipping"
            ),
        }
    }
}

fn slot_at<'a>(root: &'a mut Value, path: &[PathSegment]) -> Option<&'a mut Value> {
    let mut current = root;
    for segment in path {
        current = match segment {
            PathSegment::Key(key) => {
                if current.is_null() {
                    *current = Value::Object(Map::new());
                }
                current
                    .as_object_mut()?
                    .entry(key.clone())
                    .or_insert(Value::Null)
            }
            PathSegment::Index(i) => current.as_array_mut()?.get_mut(*i)?,
        };
    }
    Some(current)
}

fn display_path(path: &[PathSegment]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(".")
}
