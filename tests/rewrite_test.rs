//! Tests for placeholder data with response-driven fields.

use reqstate::Node;
use reqstate::rewrite::{PathSegment, apply_directives, walk};
use serde_json::{Value, json};

fn key(name: &str) -> PathSegment {
    PathSegment::Key(name.to_string())
}

// =========================================================================
// Discovery
// =========================================================================

#[test]
fn shorthand_directive_under_plus_key() {
    let initial = Node::object([(
        "user",
        Node::object([(
            "+name",
            Node::transform_or(|d| d["fullName"].clone(), "anonymous"),
        )]),
    )]);

    let rewritten = walk(initial);

    assert_eq!(rewritten.data, json!({"user": {"name": "anonymous"}}));
    assert_eq!(rewritten.directives.len(), 1);
    assert_eq!(rewritten.directives[0].path, vec![key("user"), key("name")]);

    let mut data = rewritten.data.clone();
    apply_directives(&mut data, &rewritten.directives, &json!({"fullName": "Ada"}));
    assert_eq!(data, json!({"user": {"name": "Ada"}}));
}

#[test]
fn bare_transform_under_plus_key_defaults_to_null() {
    let rewritten = walk(Node::object([(
        "+count",
        Node::transform(|d| d["items"].as_array().map_or(0, Vec::len).into()),
    )]));

    assert_eq!(rewritten.data, json!({"count": null}));
    assert_eq!(rewritten.hydrate(&json!({"items": [1, 2, 3]})), json!({"count": 3}));
}

#[test]
fn full_form_is_recognised_anywhere() {
    let initial = Node::object([
        ("title", Node::from("Todos")),
        (
            "total",
            Node::responsed_or(|d| d["total"].clone(), 0),
        ),
    ]);

    let rewritten = walk(initial);

    assert_eq!(rewritten.data, json!({"title": "Todos", "total": 0}));
    assert_eq!(rewritten.directives[0].path, vec![key("total")]);
    assert_eq!(
        rewritten.hydrate(&json!({"total": 12})),
        json!({"title": "Todos", "total": 12})
    );
}

#[test]
fn full_form_without_default_is_null() {
    let rewritten = walk(Node::object([("x", Node::responsed(|d| d.clone()))]));
    assert_eq!(rewritten.data, json!({"x": null}));
}

#[test]
fn root_directive_replaces_the_whole_value() {
    let rewritten = walk(Node::responsed_or(|d| d["list"].clone(), Node::array(Vec::<Node>::new())));

    assert_eq!(rewritten.data, json!([]));
    assert!(rewritten.directives[0].path.is_empty());
    assert_eq!(rewritten.hydrate(&json!({"list": [1]})), json!([1]));
}

#[test]
fn plain_values_have_no_directives() {
    let rewritten = walk(Node::from(json!({"a": [1, {"+b": 2}]})));

    assert!(!rewritten.has_directives());
    assert_eq!(rewritten.data, json!({"a": [1, {"+b": 2}]}));
}

#[test]
fn shorthand_without_plus_is_not_a_directive() {
    let rewritten = walk(Node::object([(
        "name",
        Node::transform_or(|d| d.clone(), "x"),
    )]));

    assert!(!rewritten.has_directives());
    assert_eq!(rewritten.data, json!({"name": [null, "x"]}));
}

#[test]
fn array_elements_use_index_paths() {
    let initial = Node::object([(
        "rows",
        Node::array([
            Node::from("static"),
            Node::responsed_or(|d| d["first"].clone(), "?"),
        ]),
    )]);

    let rewritten = walk(initial);

    assert_eq!(rewritten.data, json!({"rows": ["static", "?"]}));
    assert_eq!(
        rewritten.directives[0].path,
        vec![key("rows"), PathSegment::Index(1)]
    );
    assert_eq!(
        rewritten.hydrate(&json!({"first": "row one"})),
        json!({"rows": ["static", "row one"]})
    );
}

#[test]
fn directive_wins_over_plain_key_of_same_name() {
    let before = walk(Node::object([
        ("name", Node::from("plain")),
        ("+name", Node::transform_or(|d| d.clone(), "directive")),
    ]));
    let after = walk(Node::object([
        ("+name", Node::transform_or(|d| d.clone(), "directive")),
        ("name", Node::from("plain")),
    ]));

    assert_eq!(before.data, json!({"name": "directive"}));
    assert_eq!(after.data, json!({"name": "directive"}));
    assert_eq!(before.directives.len(), 1);
    assert_eq!(after.directives.len(), 1);
}

#[test]
fn nested_directives_collect_in_order() {
    let initial = Node::object([
        ("+a", Node::transform_or(|_| json!(1), 0)),
        (
            "inner",
            Node::object([("+b", Node::transform_or(|_| json!(2), 0))]),
        ),
    ]);

    let rewritten = walk(initial);
    let paths: Vec<_> = rewritten.directives.iter().map(|d| d.path.clone()).collect();

    assert_eq!(paths, vec![vec![key("a")], vec![key("inner"), key("b")]]);
    assert_eq!(rewritten.hydrate(&Value::Null), json!({"a": 1, "inner": {"b": 2}}));
}

// =========================================================================
// Application
// =========================================================================

#[test]
fn paths_into_scalars_are_skipped() {
    let rewritten = walk(Node::object([(
        "user",
        Node::object([("+name", Node::transform_or(|_| json!("Ada"), ""))]),
    )]));

    let mut replaced = json!({"user": "not an object"});
    apply_directives(&mut replaced, &rewritten.directives, &Value::Null);

    assert_eq!(replaced, json!({"user": "not an object"}));
}

#[test]
fn missing_keys_are_created() {
    let rewritten = walk(Node::object([(
        "user",
        Node::object([("+name", Node::transform_or(|_| json!("Ada"), ""))]),
    )]));

    let mut empty = Value::Null;
    apply_directives(&mut empty, &rewritten.directives, &Value::Null);

    assert_eq!(empty, json!({"user": {"name": "Ada"}}));
}
