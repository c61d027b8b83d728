// src/resolver/graph.rs

//! Order graph over transaction elements
//!
//! Nodes are element indices and edges live in one arena; adjacency is a
//! list of edge ids per node. An edge `q -> p` means "p requires q", so q
//! has to come first. Loop repair rebuilds the graph without the severed
//! relations, so every edge in the arena is live.

use std::fmt;

/// Edge classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum EdgeKind {
    /// Needed while a scriptlet of the requirer runs; never severed
    PreReq,
    /// Ordinary requirement; may be severed to break a loop
    CoReq,
}

/// Index into the edge arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(usize);

/// A "provider before requirer" relation
#[derive(Debug, Clone)]
pub struct Edge {
    pub provider: usize,
    pub requirer: usize,
    pub kind: EdgeKind,
    /// The requirement that produced the edge
    pub dependency: String,
}

/// Per-node ordering state
#[derive(Debug, Clone, Default)]
pub struct NodeState {
    /// Unemitted predecessors
    pub npreds: usize,
    pub succs: Vec<EdgeId>,
    pub preds: Vec<EdgeId>,
    /// Longest predecessor chain leading here
    pub depth: usize,
    /// Root this node was reached from
    pub tree: Option<usize>,
    /// Predecessor that released this node
    pub parent: Option<usize>,
    pub emitted: bool,
}

impl NodeState {
    /// Number of successor edges
    pub fn degree(&self) -> usize {
        self.succs.len()
    }
}

/// Arena-backed dependency graph
#[derive(Debug, Clone, Default)]
pub struct OrderGraph {
    nodes: Vec<NodeState>,
    edges: Vec<Edge>,
}

impl OrderGraph {
    pub fn new(nodes: usize) -> Self {
        Self {
            nodes: vec![NodeState::default(); nodes],
            edges: Vec::new(),
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn node(&self, index: usize) -> &NodeState {
        &self.nodes[index]
    }

    pub fn node_mut(&mut self, index: usize) -> &mut NodeState {
        &mut self.nodes[index]
    }

    /// Record "requirer needs provider"
    pub fn add_edge(
        &mut self,
        provider: usize,
        requirer: usize,
        kind: EdgeKind,
        dependency: impl Into<String>,
    ) -> EdgeId {
        let id = EdgeId(self.edges.len());
        self.edges.push(Edge {
            provider,
            requirer,
            kind,
            dependency: dependency.into(),
        });
        self.nodes[provider].succs.push(id);
        self.nodes[requirer].preds.push(id);
        self.nodes[requirer].npreds += 1;
        id
    }

    /// Successor edges of a node
    pub fn successors(&self, index: usize) -> impl Iterator<Item = &Edge> + '_ {
        self.nodes[index].succs.iter().map(|id| &self.edges[id.0])
    }

    /// Predecessor edges of a node
    pub fn predecessors(&self, index: usize) -> impl Iterator<Item = &Edge> + '_ {
        self.nodes[index].preds.iter().map(|id| &self.edges[id.0])
    }

    /// Nodes that were never emitted
    pub fn remaining(&self) -> impl Iterator<Item = usize> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| !n.emitted)
            .map(|(i, _)| i)
    }
}

impl fmt::Display for OrderGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for edge in &self.edges {
            writeln!(
                f,
                "{} -> {} ({}, {})",
                edge.provider, edge.requirer, edge.kind, edge.dependency
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_edges() {
        let mut g = OrderGraph::new(3);
        g.add_edge(0, 1, EdgeKind::CoReq, "a");
        g.add_edge(0, 2, EdgeKind::PreReq, "a");

        assert_eq!(g.edge_count(), 2);
        assert_eq!(g.node(0).degree(), 2);
        assert_eq!(g.node(1).npreds, 1);
        assert_eq!(g.successors(0).count(), 2);
        assert_eq!(g.predecessors(2).map(|e| e.provider).collect::<Vec<_>>(), vec![0]);
        assert_eq!(g.predecessors(0).count(), 0);
        assert_eq!(g.to_string(), "0 -> 1 (coreq, a)\n0 -> 2 (prereq, a)\n");
    }

    #[test]
    fn test_remaining() {
        let mut g = OrderGraph::new(3);
        g.node_mut(1).emitted = true;
        assert_eq!(g.remaining().collect::<Vec<_>>(), vec![0, 2]);
    }
}
