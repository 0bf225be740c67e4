// Copyright 2024 OctoFHIR Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Dependency graph over variable and expression names
//!
//! Nodes live in an arena addressed by [`NodeId`]; adjacency is stored as id
//! lists in both directions. The graph is kept acyclic: an edge that would
//! close a cycle is rejected with the cycle path.

use crate::error::{CalcError, Result};
use indexmap::IndexMap;
use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};
use std::collections::{BTreeSet, VecDeque};
use std::fmt;

/// Stable index of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(usize);

/// What a node stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NodeKind {
    /// A variable of the variable store
    Variable,
    /// A registered expression
    Expression,
}

/// A graph vertex
#[derive(Debug, Clone)]
pub struct DependencyNode {
    key: String,
    name: String,
    kind: NodeKind,
    precedents: Vec<NodeId>,
    dependents: Vec<NodeId>,
}

impl DependencyNode {
    /// Normalized key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Name as registered
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Nodes this node depends on
    pub fn precedents(&self) -> &[NodeId] {
        &self.precedents
    }

    /// Nodes depending on this node
    pub fn dependents(&self) -> &[NodeId] {
        &self.dependents
    }
}

/// Directed acyclic graph of "depends on" edges
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: Vec<Option<DependencyNode>>,
    index: IndexMap<String, NodeId>,
    free: Vec<NodeId>,
}

impl DependencyGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Check if the graph has no nodes
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Remove every node
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.index.clear();
        self.free.clear();
    }

    /// Node id by key
    pub fn id(&self, key: &str) -> Option<NodeId> {
        self.index.get(key).copied()
    }

    /// Node by id
    pub fn node(&self, id: NodeId) -> Option<&DependencyNode> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    /// Node by key
    pub fn node_by_key(&self, key: &str) -> Option<&DependencyNode> {
        self.id(key).and_then(|id| self.node(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut DependencyNode> {
        self.nodes.get_mut(id.0).and_then(Option::as_mut)
    }

    fn require(&self, key: &str) -> Result<NodeId> {
        self.id(key).ok_or_else(|| CalcError::key_not_found(key))
    }

    /// Add a node, or return the existing one with this key
    pub fn add_node(&mut self, key: &str, name: &str, kind: NodeKind) -> NodeId {
        if let Some(id) = self.id(key) {
            return id;
        }
        let node = DependencyNode {
            key: key.to_string(),
            name: name.to_string(),
            kind,
            precedents: Vec::new(),
            dependents: Vec::new(),
        };
        let id = match self.free.pop() {
            Some(id) => {
                self.nodes[id.0] = Some(node);
                id
            }
            None => {
                self.nodes.push(Some(node));
                NodeId(self.nodes.len() - 1)
            }
        };
        self.index.insert(key.to_string(), id);
        id
    }

    /// Record that `from` depends on `to`
    ///
    /// Fails with [`CalcError::CyclicDependency`] when `to` already depends on
    /// `from`, directly or transitively, or when both are the same node.
    pub fn add_edge(&mut self, from: &str, to: &str) -> Result<()> {
        let from_id = self.require(from)?;
        let to_id = self.require(to)?;

        if let Some(path) = self.path_between(to_id, from_id) {
            let mut cycle = vec![self.name_of(from_id)];
            cycle.extend(path.into_iter().map(|id| self.name_of(id)));
            log::warn!("Rejecting dependency {from} -> {to}: {}", cycle.join(" -> "));
            return Err(CalcError::CyclicDependency { path: cycle });
        }

        if self.node(from_id).is_some_and(|n| n.precedents.contains(&to_id)) {
            return Ok(());
        }
        log::trace!("Adding dependency edge {from} -> {to}");
        if let Some(node) = self.node_mut(from_id) {
            node.precedents.push(to_id);
        }
        if let Some(node) = self.node_mut(to_id) {
            node.dependents.push(from_id);
        }
        Ok(())
    }

    /// Remove a node and all its edges
    ///
    /// The slot is reused by the next added node, so a [`NodeId`] must not be
    /// kept across removals.
    pub fn remove_node(&mut self, key: &str) -> Option<DependencyNode> {
        let id = self.index.shift_remove(key)?;
        let node = self.nodes.get_mut(id.0)?.take()?;
        self.free.push(id);
        for precedent in &node.precedents {
            if let Some(p) = self.node_mut(*precedent) {
                p.dependents.retain(|d| *d != id);
            }
        }
        for dependent in &node.dependents {
            if let Some(d) = self.node_mut(*dependent) {
                d.precedents.retain(|p| *p != id);
            }
        }
        Some(node)
    }

    fn name_of(&self, id: NodeId) -> String {
        self.node(id)
            .map(|n| n.name.clone())
            .unwrap_or_else(|| format!("#{}", id.0))
    }

    /// Precedent path from `start` to `goal`, both included
    fn path_between(&self, start: NodeId, goal: NodeId) -> Option<Vec<NodeId>> {
        let mut parent: IndexMap<NodeId, Option<NodeId>> = IndexMap::new();
        let mut queue = VecDeque::from([start]);
        parent.insert(start, None);

        while let Some(current) = queue.pop_front() {
            if current == goal {
                let mut path = vec![current];
                let mut cursor = current;
                while let Some(Some(prev)) = parent.get(&cursor) {
                    path.push(*prev);
                    cursor = *prev;
                }
                path.reverse();
                return Some(path);
            }
            for next in self.node(current).map(|n| n.precedents.as_slice()).unwrap_or_default() {
                if !parent.contains_key(next) {
                    parent.insert(*next, Some(current));
                    queue.push_back(*next);
                }
            }
        }
        None
    }

    /// Direct dependents of a node
    pub fn dependents(&self, key: &str) -> Vec<&DependencyNode> {
        self.neighbours(key, |n| &n.dependents)
    }

    /// Direct precedents of a node
    pub fn precedents(&self, key: &str) -> Vec<&DependencyNode> {
        self.neighbours(key, |n| &n.precedents)
    }

    fn neighbours(
        &self,
        key: &str,
        edges: impl Fn(&DependencyNode) -> &Vec<NodeId>,
    ) -> Vec<&DependencyNode> {
        self.node_by_key(key)
            .map(|node| edges(node).iter().filter_map(|id| self.node(*id)).collect())
            .unwrap_or_default()
    }

    fn closure(&self, roots: &[NodeId], forward: bool) -> BTreeSet<NodeId> {
        let mut seen: BTreeSet<NodeId> = roots.iter().copied().collect();
        let mut queue: VecDeque<NodeId> = roots.iter().copied().collect();
        while let Some(id) = queue.pop_front() {
            let Some(node) = self.node(id) else { continue };
            let next = if forward { &node.dependents } else { &node.precedents };
            for n in next {
                if seen.insert(*n) {
                    queue.push_back(*n);
                }
            }
        }
        seen
    }

    /// Order a node set so every node follows the nodes it depends on
    ///
    /// Ties are broken by registration order.
    fn topological(&self, set: &BTreeSet<NodeId>) -> Vec<NodeId> {
        let mut pending: IndexMap<NodeId, usize> = set
            .iter()
            .map(|id| {
                let count = self
                    .node(*id)
                    .map(|n| n.precedents.iter().filter(|p| set.contains(*p)).count())
                    .unwrap_or(0);
                (*id, count)
            })
            .collect();
        let rank = |id: NodeId| {
            self.node(id)
                .and_then(|n| self.index.get_index_of(&n.key))
                .unwrap_or(usize::MAX)
        };
        let mut ready: BTreeSet<(usize, NodeId)> = pending
            .iter()
            .filter(|(_, c)| **c == 0)
            .map(|(id, _)| (rank(*id), *id))
            .collect();
        let mut order = Vec::with_capacity(set.len());

        while let Some((_, id)) = ready.pop_first() {
            order.push(id);
            pending.shift_remove(&id);
            for dependent in self.node(id).map(|n| n.dependents.as_slice()).unwrap_or_default() {
                if let Some(count) = pending.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert((rank(*dependent), *dependent));
                    }
                }
            }
        }
        order
    }

    fn ids(&self, keys: &[&str]) -> Result<Vec<NodeId>> {
        keys.iter().map(|k| self.require(k)).collect()
    }

    /// Keys of the transitive dependents of `keys`, in evaluation order
    pub fn dependents_in_order(&self, keys: &[&str], include_roots: bool) -> Result<Vec<String>> {
        let roots = self.ids(keys)?;
        let mut set = self.closure(&roots, true);
        if !include_roots {
            for root in &roots {
                set.remove(root);
            }
        }
        Ok(self.keys_of(self.topological(&set)))
    }

    /// Keys of `keys` and everything they transitively depend on, in evaluation order
    pub fn precedents_in_order(&self, keys: &[&str]) -> Result<Vec<String>> {
        let roots = self.ids(keys)?;
        let set = self.closure(&roots, false);
        Ok(self.keys_of(self.topological(&set)))
    }

    /// Every key, in evaluation order
    pub fn evaluation_order(&self) -> Vec<String> {
        let set: BTreeSet<NodeId> = self.index.values().copied().collect();
        self.keys_of(self.topological(&set))
    }

    fn keys_of(&self, ids: Vec<NodeId>) -> Vec<String> {
        ids.into_iter()
            .filter_map(|id| self.node(id).map(|n| n.key.clone()))
            .collect()
    }

    /// Live nodes in registration order
    pub fn nodes(&self) -> impl Iterator<Item = &DependencyNode> {
        self.index.values().filter_map(|id| self.node(*id))
    }
}

struct NodeView<'a> {
    graph: &'a DependencyGraph,
    node: &'a DependencyNode,
}

impl Serialize for NodeView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let depends_on: Vec<&str> = self
            .node
            .precedents
            .iter()
            .filter_map(|id| self.graph.node(*id).map(|n| n.name.as_str()))
            .collect();
        let mut state = serializer.serialize_struct("DependencyNode", 2)?;
        state.serialize_field("kind", &self.node.kind)?;
        state.serialize_field("depends_on", &depends_on)?;
        state.end()
    }
}

/// Serialized as a map from node name to its kind and precedents
impl Serialize for DependencyGraph {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for node in self.nodes() {
            map.serialize_entry(&node.name, &NodeView { graph: self, node })?;
        }
        map.end()
    }
}

impl fmt::Display for DependencyGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for node in self.nodes() {
            let precedents: Vec<String> = node.precedents.iter().map(|id| self.name_of(*id)).collect();
            if precedents.is_empty() {
                writeln!(f, "{}", node.name)?;
            } else {
                writeln!(f, "{} -> {}", node.name, precedents.join(", "))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn chain() -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        graph.add_node("a", "a", NodeKind::Variable);
        graph.add_node("b", "b", NodeKind::Expression);
        graph.add_node("c", "c", NodeKind::Expression);
        graph.add_edge("b", "a").unwrap();
        graph.add_edge("c", "b").unwrap();
        graph
    }

    #[test]
    fn test_dependents_in_order() {
        let mut graph = chain();
        graph.add_node("d", "d", NodeKind::Expression);
        graph.add_edge("d", "a").unwrap();
        graph.add_edge("d", "c").unwrap();

        assert_eq!(graph.dependents_in_order(&["a"], false).unwrap(), vec!["b", "c", "d"]);
        assert_eq!(graph.dependents_in_order(&["b"], true).unwrap(), vec!["b", "c", "d"]);
        assert_eq!(graph.precedents_in_order(&["c"]).unwrap(), vec!["a", "b", "c"]);
        assert_eq!(graph.evaluation_order(), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_cycle_rejected_with_path() {
        let mut graph = chain();
        let err = graph.add_edge("a", "c").unwrap_err();
        assert_eq!(
            err,
            CalcError::CyclicDependency {
                path: vec!["a".into(), "c".into(), "b".into(), "a".into()]
            }
        );
        assert!(graph.precedents("a").is_empty());
    }

    #[test]
    fn test_self_edge_is_a_cycle() {
        let mut graph = chain();
        let err = graph.add_edge("b", "b").unwrap_err();
        assert_eq!(
            err,
            CalcError::CyclicDependency {
                path: vec!["b".into(), "b".into()]
            }
        );
    }

    #[test]
    fn test_remove_node_drops_edges() {
        let mut graph = chain();
        graph.remove_node("c").unwrap();
        assert!(graph.dependents("b").is_empty());
        assert_eq!(graph.len(), 2);
        assert!(graph.add_edge("b", "c").is_err());
    }

    #[test]
    fn test_removed_slots_are_reused() {
        let mut graph = chain();
        for round in 0..10 {
            let key = format!("tmp{round}");
            graph.add_node(&key, &key, NodeKind::Expression);
            graph.add_edge(&key, "c").unwrap();
            graph.remove_node(&key).unwrap();
        }
        assert_eq!(graph.nodes.len(), 4);

    }

    #[test]
    fn test_order_follows_registration_after_reuse() {
        let mut graph = DependencyGraph::new();
        graph.add_node("x", "x", NodeKind::Variable);
        graph.add_node("y", "y", NodeKind::Variable);
        graph.remove_node("x").unwrap();
        graph.add_node("z", "z", NodeKind::Variable);

        assert_eq!(graph.id("z"), Some(NodeId(0)));
        assert_eq!(graph.evaluation_order(), vec!["y", "z"]);
    }

    #[test]
    fn test_duplicate_edges_ignored() {
        let mut graph = chain();
        graph.add_edge("c", "b").unwrap();
        assert_eq!(graph.precedents("c").len(), 1);
        assert_eq!(graph.dependents("b").len(), 1);
    }

    #[test]
    fn test_serialize_and_display() {
        let graph = chain();
        let json = serde_json::to_value(&graph).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "a": { "kind": "Variable", "depends_on": [] },
                "b": { "kind": "Expression", "depends_on": ["a"] },
                "c": { "kind": "Expression", "depends_on": ["b"] },
            })
        );
        assert_eq!(graph.to_string(), "a\nb -> a\nc -> b\n");
    }
}
