//! Dominator tree computed with the iterative Cooper-Harvey-Kennedy scheme.
//!
//! The graph must have been classified first ([`Graph::classify`]); the
//! fixpoint walks nodes in the reverse postorder produced there and compares
//! RPO numbers while intersecting dominator chains.

use super::graph::{Graph, NodeId};
use std::fmt;

/// Immediate dominators of every node of one graph.
#[derive(Debug, Clone)]
pub struct DominatorTree {
    entry: NodeId,
    idom: Vec<Option<NodeId>>,
}

impl DominatorTree {
    /// Compute the dominator tree of `graph`.
    pub fn compute(graph: &Graph) -> Self {
        let entry = graph.entry();
        let mut idom: Vec<Option<NodeId>> = vec![None; graph.node_count()];
        idom[entry as usize] = Some(entry);

        let rpo = graph.rpo();
        let mut changed = true;
        let mut passes = 0;
        while changed {
            changed = false;
            passes += 1;
            for &node in rpo.iter().filter(|&&n| n != entry) {
                let mut new_idom: Option<NodeId> = None;
                for &pred in graph.preds(node) {
                    if idom[pred as usize].is_none() {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => pred,
                        Some(current) => Self::intersect(graph, &idom, current, pred),
                    });
                }
                if new_idom.is_some() && idom[node as usize] != new_idom {
                    idom[node as usize] = new_idom;
                    changed = true;
                }
            }
        }
        log::trace!("dominator fixpoint reached after {} passes", passes);

        Self { entry, idom }
    }

    /// Walk both chains up until they meet. Both inputs must already have an
    /// immediate dominator.
    fn intersect(graph: &Graph, idom: &[Option<NodeId>], mut a: NodeId, mut b: NodeId) -> NodeId {
        let number = |n: NodeId| graph.rpo_number(n).unwrap_or(u32::MAX);
        while a != b {
            while number(a) > number(b) {
                a = idom[a as usize].unwrap_or(graph.entry());
            }
            while number(b) > number(a) {
                b = idom[b as usize].unwrap_or(graph.entry());
            }
        }
        a
    }

    pub fn entry(&self) -> NodeId {
        self.entry
    }

    /// Immediate dominator of `node`. The entry is its own immediate dominator;
    /// unreachable nodes have none.
    pub fn idom(&self, node: NodeId) -> Option<NodeId> {
        self.idom.get(node as usize).copied().flatten()
    }

    /// Does `a` dominate `b`? Every reachable node dominates itself.
    pub fn dominates(&self, a: NodeId, b: NodeId) -> bool {
        let mut current = b;
        loop {
            if current == a {
                return true;
            }
            match self.idom(current) {
                Some(parent) if parent != current => current = parent,
                _ => return false,
            }
        }
    }

    /// Nodes whose immediate dominator is `node`, excluding the entry itself.
    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.idom
            .iter()
            .enumerate()
            .filter(|&(n, d)| *d == Some(node) && n as NodeId != node)
            .map(|(n, _)| n as NodeId)
            .collect()
    }
}

impl fmt::Display for DominatorTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (node, dom) in self.idom.iter().enumerate() {
            match dom {
                Some(d) => writeln!(f, "IDOM(L{}) = L{}", node, d)?,
                None => writeln!(f, "IDOM(L{}) = ?", node)?,
            }
        }
        Ok(())
    }
}
