//! Configuration node data model.
//!
//! A [`ConfigNode`] is the unit of configuration: a nested `data` tree, an
//! `env` map of literals or resolvers, and optional `parent`/`child` links to
//! less- and more-specific nodes. Nodes deserialize from YAML or JSON
//! documents:
//!
//! ```yaml
//! data:
//!   server:
//!     port: 8080
//! env:
//!   HOST: localhost
//!   API_TOKEN: { string: { or_exit: "API_TOKEN must be set" } }
//!   TIMEOUT: { number: { or_default: 30 } }
//! parent: { kind: config_dir, path: base.yaml }
//! watch: 500
//! ```

use crate::env::{EnvLiteral, EnvValue};
use crate::source::Locator;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

/// One configuration tree, as fetched from a source or built in code.
///
/// Nodes live for the duration of a single resolution pass; the chain they
/// form is discarded after the merge.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigNode {
    /// Arbitrary nested settings. Insertion order is irrelevant for merging.
    #[serde(default = "empty_object")]
    pub data: Value,

    /// Environment entries: literal values or lazily-evaluated resolvers.
    #[serde(default)]
    pub env: BTreeMap<String, EnvValue>,

    /// Less-specific ancestor, applied before (and overridden by) this node.
    #[serde(default)]
    pub parent: Option<Locator>,

    /// More-specific descendant, applied after (and overriding) this node.
    #[serde(default)]
    pub child: Option<Locator>,

    /// Interval in milliseconds signalling that the node's live value should
    /// be tracked by a watcher.
    #[serde(default)]
    pub watch: Option<u64>,
}

impl Default for ConfigNode {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigNode {
    /// An empty node with no data, env entries, or links.
    pub fn new() -> Self {
        Self {
            data: empty_object(),
            env: BTreeMap::new(),
            parent: None,
            child: None,
            watch: None,
        }
    }

    /// Set the data tree.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    /// Add one env entry.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<EnvValue>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Link a less-specific ancestor.
    pub fn with_parent(mut self, locator: Locator) -> Self {
        self.parent = Some(locator);
        self
    }

    /// Link a more-specific descendant.
    pub fn with_child(mut self, locator: Locator) -> Self {
        self.child = Some(locator);
        self
    }

    /// Mark the node's live value for tracking.
    pub fn with_watch(mut self, interval_ms: u64) -> Self {
        self.watch = Some(interval_ms);
        self
    }

    /// A node with neither parent nor child terminates the chain in both
    /// directions.
    pub fn is_terminal(&self) -> bool {
        self.parent.is_none() && self.child.is_none()
    }
}

/// The single node produced by reducing a chain. `parent`/`child` links are
/// no longer meaningful on it.
pub type MergedConfig = ConfigNode;

/// A merged configuration whose env entries are all resolved literals.
///
/// `None` entries come from `or_nothing` resolvers: the variable was absent
/// and the policy said that is fine.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct FilledConfig {
    pub data: Value,
    pub env: BTreeMap<String, Option<EnvLiteral>>,
    /// Carried through from the merged node for live-tracking consumers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watch: Option<u64>,
}

impl FilledConfig {
    /// Look up a nested data value by JSON pointer (`/server/port`).
    pub fn data_at(&self, pointer: &str) -> Option<&Value> {
        self.data.pointer(pointer)
    }

    /// Resolved env entry, if present and not `or_nothing`-absent.
    pub fn env_value(&self, name: &str) -> Option<&EnvLiteral> {
        self.env.get(name).and_then(|v| v.as_ref())
    }
}
