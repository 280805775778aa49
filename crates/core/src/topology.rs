//! Parent links, depths and post-order for the node arena.
//!
//! Nodes only store child indices, so the upward structure is recomputed
//! here once per pass. Building the topology also rejects arenas that are
//! not a tree rooted at [`Document::root`].

use crate::document::{Document, NodeIndex};
use crate::error::CleanError;

#[derive(Debug, Clone)]
pub struct Topology {
    root: NodeIndex,
    /// Parent and position among the parent's children.
    parent: Vec<Option<(NodeIndex, usize)>>,
    depth: Vec<usize>,
    post_order: Vec<NodeIndex>,
}

impl Topology {
    pub fn build(doc: &Document) -> Result<Self, CleanError> {
        let count = doc.nodes.len();
        if doc.root.index() >= count {
            return Err(CleanError::MalformedTree {
                node: doc.root,
                reason: format!("root index out of range (arena holds {} nodes)", count),
            });
        }

        let mut parent = vec![None; count];
        let mut depth = vec![0; count];
        let mut seen = vec![false; count];
        let mut post_order = Vec::with_capacity(count);

        // (node, next child position) -- explicit stack keeps deep chains off the call stack
        let mut stack: Vec<(NodeIndex, usize)> = vec![(doc.root, 0)];
        seen[doc.root.index()] = true;

        while let Some(&(node, position)) = stack.last() {
            let children = doc.node(node).children.nodes();
            if position < children.len() {
                if let Some(top) = stack.last_mut() {
                    top.1 += 1;
                }
                let child = children[position];
                if child.index() >= count {
                    return Err(CleanError::MalformedTree {
                        node,
                        reason: format!("child index {} out of range", child.0),
                    });
                }
                if seen[child.index()] {
                    return Err(CleanError::MalformedTree {
                        node: child,
                        reason: "node is linked from more than one place".to_string(),
                    });
                }
                seen[child.index()] = true;
                parent[child.index()] = Some((node, position));
                depth[child.index()] = depth[node.index()] + 1;
                stack.push((child, 0));
            } else {
                post_order.push(node);
                stack.pop();
            }
        }

        if let Some(orphan) = seen.iter().position(|s| !s) {
            return Err(CleanError::MalformedTree {
                node: NodeIndex::new(orphan),
                reason: "node is not reachable from the root".to_string(),
            });
        }

        Ok(Topology {
            root: doc.root,
            parent,
            depth,
            post_order,
        })
    }

    pub fn root(&self) -> NodeIndex {
        self.root
    }

    pub fn parent(&self, node: NodeIndex) -> Option<NodeIndex> {
        self.parent[node.index()].map(|(p, _)| p)
    }

    /// Position of `node` among its parent's children.
    pub fn position(&self, node: NodeIndex) -> Option<usize> {
        self.parent[node.index()].map(|(_, k)| k)
    }

    pub fn depth(&self, node: NodeIndex) -> usize {
        self.depth[node.index()]
    }

    /// Children before parents, siblings in document order.
    pub fn post_order(&self) -> &[NodeIndex] {
        &self.post_order
    }

    /// Root-first path ending at `node`.
    pub fn path(&self, node: NodeIndex) -> Vec<NodeIndex> {
        let mut path = vec![node];
        let mut current = node;
        while let Some(p) = self.parent(current) {
            path.push(p);
            current = p;
        }
        path.reverse();
        path
    }

    pub fn is_ancestor_or_self(&self, ancestor: NodeIndex, node: NodeIndex) -> bool {
        let mut current = node;
        loop {
            if current == ancestor {
                return true;
            }
            if self.depth(current) <= self.depth(ancestor) {
                return false;
            }
            match self.parent(current) {
                Some(p) => current = p,
                None => return false,
            }
        }
    }

    pub fn lca(&self, a: NodeIndex, b: NodeIndex) -> NodeIndex {
        let (mut a, mut b) = (a, b);
        while self.depth(a) > self.depth(b) {
            a = self.parent(a).unwrap_or(self.root);
        }
        while self.depth(b) > self.depth(a) {
            b = self.parent(b).unwrap_or(self.root);
        }
        while a != b {
            a = self.parent(a).unwrap_or(self.root);
            b = self.parent(b).unwrap_or(self.root);
        }
        a
    }

    /// Lowest common ancestor of a node set, by repeated pairwise reduction.
    /// `None` for an empty set.
    pub fn lca_all(&self, nodes: impl IntoIterator<Item = NodeIndex>) -> Option<NodeIndex> {
        nodes.into_iter().reduce(|acc, n| self.lca(acc, n))
    }
}
