//! Inheritance chain resolution.
//!
//! Starting from a root node, follow `child` links to collect descendants at
//! ranks −1, −2, … and `parent` links to collect ancestors at ranks 1, 2, ….
//! Both walks start from the original root: a descendant's own `parent` link
//! and an ancestor's own `child` link are never followed. Each locator is
//! fetched sequentially (the next hop is only known once the previous node
//! has been materialized), so merge order never depends on IO timing.
//!
//! Any fetch failure aborts the whole resolution; a truncated chain is never
//! merged.

use crate::error::{ChainError, WalkDirection};
use crate::node::ConfigNode;
use crate::source::{ConfigSource, Locator};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// Hard cap on the number of nodes either walk may collect. Chains this deep
/// are assumed to be cyclic through distinct locators.
pub const MAX_CHAIN_DEPTH: usize = 64;

/// Rank-indexed inheritance sequence: negative ranks are descendants (more
/// negative = deeper child), zero is the root, positive ranks are ancestors
/// (more positive = more distant). Built once per resolution and discarded
/// after the merge.
#[derive(Debug, Clone)]
pub struct ConfigChain {
    nodes: BTreeMap<i32, ConfigNode>,
}

impl ConfigChain {
    pub fn get(&self, rank: i32) -> Option<&ConfigNode> {
        self.nodes.get(&rank)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Ranks in ascending order (deepest child first).
    pub fn ranks(&self) -> impl Iterator<Item = i32> + '_ {
        self.nodes.keys().copied()
    }

    /// Nodes in merge precedence order: most distant ancestor first, deepest
    /// child last.
    pub fn into_descending(self) -> impl Iterator<Item = ConfigNode> {
        self.nodes.into_iter().rev().map(|(_, node)| node)
    }
}

/// Walk both directions from `root` and assemble the full chain.
pub async fn resolve_chain(
    source: &dyn ConfigSource,
    root: ConfigNode,
) -> Result<ConfigChain, ChainError> {
    let mut nodes: BTreeMap<i32, ConfigNode> = BTreeMap::new();
    let mut visited: HashSet<Locator> = HashSet::new();

    // Descend through child links from the original root.
    let mut rank = 0i32;
    let mut next = root.child.clone();
    while let Some(locator) = next {
        rank -= 1;
        let node = walk_step(source, &mut visited, WalkDirection::Child, rank, locator).await?;
        next = node.child.clone();
        nodes.insert(rank, node);
    }

    // Ascend through parent links, again from the original root.
    let mut rank = 0i32;
    let mut next = root.parent.clone();
    while let Some(locator) = next {
        rank += 1;
        let node = walk_step(source, &mut visited, WalkDirection::Parent, rank, locator).await?;
        next = node.parent.clone();
        nodes.insert(rank, node);
    }

    nodes.insert(0, root);
    debug!(
        "resolved chain of {} nodes (ranks {:?}..={:?})",
        nodes.len(),
        nodes.keys().next(),
        nodes.keys().next_back(),
    );
    Ok(ConfigChain { nodes })
}

async fn walk_step(
    source: &dyn ConfigSource,
    visited: &mut HashSet<Locator>,
    direction: WalkDirection,
    rank: i32,
    locator: Locator,
) -> Result<ConfigNode, ChainError> {
    if !visited.insert(locator.clone()) {
        return Err(ChainError::Cycle { direction, locator });
    }
    if rank.unsigned_abs() as usize > MAX_CHAIN_DEPTH {
        return Err(ChainError::DepthExceeded {
            direction,
            max: MAX_CHAIN_DEPTH,
        });
    }
    source
        .fetch(&locator)
        .await
        .map_err(|source| ChainError::Fetch {
            direction,
            rank,
            locator,
            source,
        })
}
