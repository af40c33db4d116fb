// This module implements the generic directed graph used by the CFG builder and the
// dominator pass. Nodes are small dense integer ids (a proc's block indices); each node keeps
// its predecessor list and an ordered successor edge list. classify() performs one
// depth-first walk from the entry node with an explicit stack, recording discovery (pre)
// numbers, tree edges and the postorder; the postorder is reversed into the reverse
// postorder (RPO) and every edge is then classified as tree, forward, backward or cross
// from its endpoints' discovery and RPO numbers. The RPO produced here is the iteration
// order the dominator fixpoint depends on. Nodes unreachable from the entry keep no
// numbers and their edges stay unclassified.

//! Directed graph with reverse-postorder sorting and edge classification.

use std::fmt;

/// Dense node identifier.
pub type NodeId = u32;

/// DFS classification of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// Not yet classified, or the source is unreachable.
    Unclassified,
    /// Edge of the DFS spanning tree.
    Tree,
    /// Edge to a proper descendant that is not a tree edge.
    Forward,
    /// Edge to an ancestor (or self); marks a loop.
    Backward,
    /// Edge between unrelated subtrees.
    Cross,
}

impl EdgeKind {
    fn as_str(self) -> &'static str {
        match self {
            EdgeKind::Unclassified => "?",
            EdgeKind::Tree => "tree",
            EdgeKind::Forward => "forward",
            EdgeKind::Backward => "backward",
            EdgeKind::Cross => "cross",
        }
    }
}

/// Outgoing edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub target: NodeId,
    pub kind: EdgeKind,
}

#[derive(Debug, Clone, Default)]
struct GraphNode {
    preds: Vec<NodeId>,
    succs: Vec<Edge>,
    pre: Option<u32>,
    rpo: Option<u32>,
}

/// Directed graph keyed by dense node ids.
#[derive(Debug, Clone)]
pub struct Graph {
    entry: NodeId,
    nodes: Vec<GraphNode>,
    rpo_order: Vec<NodeId>,
    edge_count: usize,
}

impl Graph {
    /// Create a graph whose DFS starts at `entry`.
    pub fn new(entry: NodeId) -> Self {
        let mut graph = Self {
            entry,
            nodes: Vec::new(),
            rpo_order: Vec::new(),
            edge_count: 0,
        };
        graph.add_node(entry);
        graph
    }

    pub fn entry(&self) -> NodeId {
        self.entry
    }

    /// Make sure `node` exists; ids below it are created as isolated nodes.
    pub fn add_node(&mut self, node: NodeId) {
        let needed = node as usize + 1;
        if self.nodes.len() < needed {
            self.nodes.resize_with(needed, GraphNode::default);
        }
    }

    /// Insert `from -> to`. Returns false if the edge already existed.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId) -> bool {
        self.add_node(from.max(to));
        if self.nodes[from as usize].succs.iter().any(|e| e.target == to) {
            return false;
        }
        self.nodes[from as usize].succs.push(Edge {
            target: to,
            kind: EdgeKind::Unclassified,
        });
        self.nodes[to as usize].preds.push(from);
        self.edge_count += 1;
        true
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    /// Predecessors of `node` in insertion order.
    pub fn preds(&self, node: NodeId) -> &[NodeId] {
        self.nodes
            .get(node as usize)
            .map(|n| n.preds.as_slice())
            .unwrap_or(&[])
    }

    /// Successor edges of `node` in insertion order.
    pub fn succ_edges(&self, node: NodeId) -> &[Edge] {
        self.nodes
            .get(node as usize)
            .map(|n| n.succs.as_slice())
            .unwrap_or(&[])
    }

    /// Successor ids of `node` in insertion order.
    pub fn succs(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.succ_edges(node).iter().map(|e| e.target)
    }

    pub fn has_edge(&self, from: NodeId, to: NodeId) -> bool {
        self.succs(from).any(|t| t == to)
    }

    /// Classification of `from -> to`, if that edge exists.
    pub fn edge_kind(&self, from: NodeId, to: NodeId) -> Option<EdgeKind> {
        self.succ_edges(from)
            .iter()
            .find(|e| e.target == to)
            .map(|e| e.kind)
    }

    /// Reachable nodes in reverse postorder. Empty until [`Graph::classify`] ran.
    pub fn rpo(&self) -> &[NodeId] {
        &self.rpo_order
    }

    /// Position of `node` in the reverse postorder.
    pub fn rpo_number(&self, node: NodeId) -> Option<u32> {
        self.nodes.get(node as usize).and_then(|n| n.rpo)
    }

    /// DFS discovery number of `node`.
    pub fn pre_number(&self, node: NodeId) -> Option<u32> {
        self.nodes.get(node as usize).and_then(|n| n.pre)
    }

    pub fn is_reachable(&self, node: NodeId) -> bool {
        self.rpo_number(node).is_some()
    }

    /// Depth-first walk from the entry computing discovery numbers, the reverse
    /// postorder and the kind of every edge.
    pub fn classify(&mut self) {
        for node in &mut self.nodes {
            node.pre = None;
            node.rpo = None;
            for edge in &mut node.succs {
                edge.kind = EdgeKind::Unclassified;
            }
        }

        let mut postorder = Vec::with_capacity(self.nodes.len());
        let mut pre_counter = 0u32;
        // (node, index of the next successor to visit)
        let mut stack: Vec<(NodeId, usize)> = vec![(self.entry, 0)];
        self.nodes[self.entry as usize].pre = Some(pre_counter);
        pre_counter += 1;

        while let Some(&(node, next)) = stack.last() {
            let succ_count = self.nodes[node as usize].succs.len();
            if next < succ_count {
                if let Some(top) = stack.last_mut() {
                    top.1 += 1;
                }
                let target = self.nodes[node as usize].succs[next].target;
                if self.nodes[target as usize].pre.is_none() {
                    self.nodes[target as usize].pre = Some(pre_counter);
                    pre_counter += 1;
                    self.nodes[node as usize].succs[next].kind = EdgeKind::Tree;
                    stack.push((target, 0));
                }
            } else {
                stack.pop();
                postorder.push(node);
            }
        }

        postorder.reverse();
        for (idx, &node) in postorder.iter().enumerate() {
            self.nodes[node as usize].rpo = Some(idx as u32);
        }
        self.rpo_order = postorder;

        for from in 0..self.nodes.len() {
            let (Some(from_pre), Some(from_rpo)) = (self.nodes[from].pre, self.nodes[from].rpo) else {
                continue;
            };
            for i in 0..self.nodes[from].succs.len() {
                let edge = self.nodes[from].succs[i];
                if edge.kind == EdgeKind::Tree {
                    continue;
                }
                let target = &self.nodes[edge.target as usize];
                let (Some(to_pre), Some(to_rpo)) = (target.pre, target.rpo) else {
                    continue;
                };
                let kind = if to_rpo <= from_rpo {
                    if to_pre <= from_pre {
                        EdgeKind::Backward
                    } else {
                        EdgeKind::Cross
                    }
                } else if to_pre > from_pre {
                    EdgeKind::Forward
                } else {
                    EdgeKind::Cross
                };
                self.nodes[from].succs[i].kind = kind;
            }
        }
    }

    /// Nodes that have no path from the entry.
    pub fn unreachable_nodes(&self) -> Vec<NodeId> {
        (0..self.nodes.len() as NodeId)
            .filter(|&n| !self.is_reachable(n))
            .collect()
    }
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (id, node) in self.nodes.iter().enumerate() {
            write!(f, "L{} ->", id)?;
            for edge in &node.succs {
                write!(f, " L{}[{}]", edge.target, edge.kind.as_str())?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diamond() -> Graph {
        let mut g = Graph::new(0);
        g.add_edge(0, 1);
        g.add_edge(0, 2);
        g.add_edge(1, 3);
        g.add_edge(2, 3);
        g.classify();
        g
    }

    #[test]
    fn test_duplicate_edges_are_ignored() {
        let mut g = Graph::new(0);
        assert!(g.add_edge(0, 1));
        assert!(!g.add_edge(0, 1));
        assert_eq!(g.edge_count(), 1);
        assert_eq!(g.preds(1), &[0]);
    }

    #[test]
    fn test_rpo_of_diamond() {
        let g = diamond();
        assert_eq!(g.rpo()[0], 0);
        assert_eq!(*g.rpo().last().unwrap(), 3);
        assert_eq!(g.rpo().len(), 4);
    }

    #[test]
    fn test_diamond_edge_kinds() {
        let g = diamond();
        assert_eq!(g.edge_kind(0, 1), Some(EdgeKind::Tree));
        assert_eq!(g.edge_kind(0, 2), Some(EdgeKind::Tree));
        assert_eq!(g.edge_kind(1, 3), Some(EdgeKind::Tree));
        // 3 was discovered through 1 before 2 got visited
        assert_eq!(g.edge_kind(2, 3), Some(EdgeKind::Cross));
    }

    #[test]
    fn test_loop_back_edge() {
        let mut g = Graph::new(0);
        g.add_edge(0, 1);
        g.add_edge(1, 2);
        g.add_edge(2, 1);
        g.add_edge(1, 3);
        g.classify();
        assert_eq!(g.edge_kind(2, 1), Some(EdgeKind::Backward));
        assert_eq!(g.edge_kind(1, 3), Some(EdgeKind::Tree));
    }

    #[test]
    fn test_forward_edge() {
        let mut g = Graph::new(0);
        g.add_edge(0, 1);
        g.add_edge(1, 2);
        g.add_edge(0, 2);
        g.classify();
        assert_eq!(g.edge_kind(0, 2), Some(EdgeKind::Forward));
    }

    #[test]
    fn test_self_loop_is_backward() {
        let mut g = Graph::new(0);
        g.add_edge(0, 0);
        g.classify();
        assert_eq!(g.edge_kind(0, 0), Some(EdgeKind::Backward));
    }

    #[test]
    fn test_unreachable_nodes() {
        let mut g = Graph::new(0);
        g.add_edge(0, 1);
        g.add_edge(2, 1);
        g.classify();
        assert_eq!(g.unreachable_nodes(), vec![2]);
        assert_eq!(g.edge_kind(2, 1), Some(EdgeKind::Unclassified));
    }
}
