//! End-to-end tests for chain resolution and precedence-ordered merging.
//!
//! Exercises the full pipeline over an in-memory source: fetch root, walk
//! both directions, reduce, fill.

use config_loom::env::{EnvLiteral, EnvVar, MemoryEnv};
use config_loom::error::{ChainError, ConfigError, WalkDirection};
use config_loom::load::load_config_with;
use config_loom::node::ConfigNode;
use config_loom::source::{Locator, MemorySource};
use serde_json::json;

fn node(data: serde_json::Value) -> ConfigNode {
    ConfigNode::new().with_data(data)
}

#[tokio::test]
async fn child_overrides_root_overrides_ancestor() {
    let source = MemorySource::new()
        .with_node(
            Locator::config_dir("ancestor.yaml"),
            node(json!({"x": "A", "nested": {"p": 1, "q": 2}, "only_a": 1})),
        )
        .with_node(
            Locator::config_dir("child.yaml"),
            node(json!({"x": "C", "nested": {"r": 4}})),
        )
        .with_node(
            Locator::config_dir("root.yaml"),
            node(json!({"x": "R", "nested": {"q": 3}}))
                .with_parent(Locator::config_dir("ancestor.yaml"))
                .with_child(Locator::config_dir("child.yaml")),
        );

    let env = MemoryEnv::new();
    let filled = load_config_with(&source, &env, Locator::config_dir("root.yaml"))
        .await
        .expect("resolution should succeed");

    // x defined everywhere: the child wins.
    assert_eq!(filled.data["x"], json!("C"));
    // Nested keys merge field-by-field across all three levels.
    assert_eq!(filled.data["nested"], json!({"p": 1, "q": 3, "r": 4}));
    // Keys only the ancestor defines survive untouched.
    assert_eq!(filled.data["only_a"], json!(1));
}

#[tokio::test]
async fn deeper_children_have_final_precedence() {
    let source = MemorySource::new()
        .with_node(
            Locator::config_dir("child.yaml"),
            node(json!({"x": "child"})).with_child(Locator::config_dir("grandchild.yaml")),
        )
        .with_node(
            Locator::config_dir("grandchild.yaml"),
            node(json!({"x": "grandchild"})),
        );

    let root = node(json!({"x": "root"})).with_child(Locator::config_dir("child.yaml"));
    let source = source.with_node(Locator::config_dir("root.yaml"), root);

    let env = MemoryEnv::new();
    let filled = load_config_with(&source, &env, Locator::config_dir("root.yaml"))
        .await
        .expect("resolution should succeed");
    assert_eq!(filled.data["x"], json!("grandchild"));
}

#[tokio::test]
async fn arrays_replace_wholesale_across_the_chain() {
    let source = MemorySource::new()
        .with_node(
            Locator::config_dir("ancestor.yaml"),
            node(json!({"z": [1, 2]})),
        )
        .with_node(
            Locator::config_dir("root.yaml"),
            node(json!({"z": [3]})).with_parent(Locator::config_dir("ancestor.yaml")),
        );

    let env = MemoryEnv::new();
    let filled = load_config_with(&source, &env, Locator::config_dir("root.yaml"))
        .await
        .expect("resolution should succeed");
    assert_eq!(filled.data["z"], json!([3]));
}

#[tokio::test]
async fn env_maps_merge_by_shallow_override() {
    let source = MemorySource::new()
        .with_node(
            Locator::config_dir("ancestor.yaml"),
            node(json!({})).with_env("A", 1).with_env("B", 2),
        )
        .with_node(
            Locator::config_dir("root.yaml"),
            node(json!({}))
                .with_env("B", 3)
                .with_parent(Locator::config_dir("ancestor.yaml")),
        );

    let env = MemoryEnv::new();
    let filled = load_config_with(&source, &env, Locator::config_dir("root.yaml"))
        .await
        .expect("resolution should succeed");
    assert_eq!(filled.env_value("A"), Some(&EnvLiteral::from(1)));
    assert_eq!(filled.env_value("B"), Some(&EnvLiteral::from(3)));
}

#[tokio::test]
async fn resolvers_in_inherited_nodes_fill_against_the_environment() {
    let source = MemorySource::new()
        .with_node(
            Locator::config_dir("base.yaml"),
            node(json!({}))
                .with_env("HOST", EnvVar::string().or_default("localhost"))
                .with_env("PORT", EnvVar::number().or_default(5432)),
        )
        .with_node(
            Locator::config_dir("root.yaml"),
            node(json!({})).with_parent(Locator::config_dir("base.yaml")),
        );

    let env = MemoryEnv::new().with_var("HOST", "db.internal");
    let filled = load_config_with(&source, &env, Locator::config_dir("root.yaml"))
        .await
        .expect("resolution should succeed");

    // Present variable wins; absent one takes its default.
    assert_eq!(filled.env_value("HOST"), Some(&EnvLiteral::from("db.internal")));
    assert_eq!(filled.env_value("PORT"), Some(&EnvLiteral::from(5432)));
}

#[tokio::test]
async fn unresolvable_second_ancestor_fails_the_whole_load() {
    let source = MemorySource::new()
        .with_node(
            Locator::config_dir("first.yaml"),
            node(json!({"tier": 1})).with_parent(Locator::config_dir("second.yaml")),
        )
        .with_node(
            Locator::config_dir("root.yaml"),
            node(json!({"tier": 0})).with_parent(Locator::config_dir("first.yaml")),
        );

    let env = MemoryEnv::new();
    let err = load_config_with(&source, &env, Locator::config_dir("root.yaml"))
        .await
        .expect_err("missing second ancestor must abort");

    // No partial merge of first ancestor + root: the call rejects outright.
    match err {
        ConfigError::Chain(ChainError::Fetch {
            direction, rank, ..
        }) => {
            assert_eq!(direction, WalkDirection::Parent);
            assert_eq!(rank, 2);
        }
        other => panic!("expected chain fetch error, got {:?}", other),
    }
}

#[tokio::test]
async fn merge_order_is_rank_derived_not_fetch_derived() {
    // Two resolutions over the same locators must merge identically; the
    // chain is discovered incrementally so this holds by construction, but
    // pin it down anyway.
    let source = MemorySource::new()
        .with_node(
            Locator::config_dir("parent.yaml"),
            node(json!({"v": "parent", "p": true})),
        )
        .with_node(
            Locator::config_dir("root.yaml"),
            node(json!({"v": "root"})).with_parent(Locator::config_dir("parent.yaml")),
        );

    let env = MemoryEnv::new();
    let first = load_config_with(&source, &env, Locator::config_dir("root.yaml"))
        .await
        .expect("first resolution");
    let second = load_config_with(&source, &env, Locator::config_dir("root.yaml"))
        .await
        .expect("second resolution");
    assert_eq!(first, second);
    assert_eq!(first.data["v"], json!("root"));
}

#[tokio::test]
async fn non_overlapping_keys_from_child_and_root_all_survive() {
    let source = MemorySource::new()
        .with_node(
            Locator::config_dir("b.yaml"),
            node(json!({"a": 100, "d": 101})),
        )
        .with_node(
            Locator::config_dir("root.yaml"),
            node(json!({"b": 200, "e": 201})).with_child(Locator::config_dir("b.yaml")),
        );

    let env = MemoryEnv::new();
    let filled = load_config_with(&source, &env, Locator::config_dir("root.yaml"))
        .await
        .expect("resolution should succeed");
    assert_eq!(
        filled.data,
        json!({"a": 100, "b": 200, "d": 101, "e": 201})
    );
}
