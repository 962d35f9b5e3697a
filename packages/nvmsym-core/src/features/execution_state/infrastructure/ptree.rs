//! Process tree
//!
//! Records how states were forked. The tree owns every node; a state only
//! remembers the id of its leaf.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct StateId(pub u64);

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PTreeNodeId(pub usize);

#[derive(Debug, Clone)]
pub struct PTreeNode {
    pub parent: Option<PTreeNodeId>,
    pub left: Option<PTreeNodeId>,
    pub right: Option<PTreeNodeId>,
    /// Set on leaves only
    pub state: Option<StateId>,
}

#[derive(Debug, Clone)]
pub struct PTree {
    nodes: Vec<Option<PTreeNode>>,
    root: PTreeNodeId,
}

impl PTree {
    pub fn new(initial: StateId) -> Self {
        Self {
            nodes: vec![Some(PTreeNode {
                parent: None,
                left: None,
                right: None,
                state: Some(initial),
            })],
            root: PTreeNodeId(0),
        }
    }

    pub fn root(&self) -> PTreeNodeId {
        self.root
    }

    pub fn node(&self, id: PTreeNodeId) -> Option<&PTreeNode> {
        self.nodes.get(id.0).and_then(|n| n.as_ref())
    }

    /// Live nodes
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&mut self, node: PTreeNode) -> PTreeNodeId {
        self.nodes.push(Some(node));
        PTreeNodeId(self.nodes.len() - 1)
    }

    /// Split leaf `node` into two children holding `left` and `right`
    ///
    /// # Panics
    /// If `node` is not a live leaf.
    pub fn attach(&mut self, node: PTreeNodeId, left: StateId, right: StateId) -> (PTreeNodeId, PTreeNodeId) {
        assert!(
            self.node(node).map(|n| n.left.is_none() && n.right.is_none()).unwrap_or(false),
            "attach on a node that is not a live leaf"
        );
        let l = self.push(PTreeNode {
            parent: Some(node),
            left: None,
            right: None,
            state: Some(left),
        });
        let r = self.push(PTreeNode {
            parent: Some(node),
            left: None,
            right: None,
            state: Some(right),
        });
        if let Some(n) = self.nodes[node.0].as_mut() {
            n.state = None;
            n.left = Some(l);
            n.right = Some(r);
        }
        (l, r)
    }

    /// Remove leaf `node` and every ancestor left without children
    pub fn remove(&mut self, node: PTreeNodeId) {
        let mut current = Some(node);
        while let Some(id) = current {
            let Some(n) = self.node(id) else {
                return;
            };
            if n.left.is_some() || n.right.is_some() {
                return;
            }
            let parent = n.parent;
            self.nodes[id.0] = None;
            if let Some(p) = parent.and_then(|p| self.nodes[p.0].as_mut()) {
                if p.left == Some(id) {
                    p.left = None;
                }
                if p.right == Some(id) {
                    p.right = None;
                }
            }
            current = parent;
        }
    }

    pub fn leaves(&self) -> Vec<(PTreeNodeId, StateId)> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, n)| n.as_ref().and_then(|n| n.state).map(|s| (PTreeNodeId(i), s)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attach_moves_state_to_leaves() {
        let mut tree = PTree::new(StateId(1));
        let (l, r) = tree.attach(tree.root(), StateId(1), StateId(2));
        assert!(tree.node(tree.root()).unwrap().state.is_none());
        assert_eq!(tree.node(l).unwrap().state, Some(StateId(1)));
        assert_eq!(tree.node(r).unwrap().parent, Some(tree.root()));
        assert_eq!(tree.leaves().len(), 2);
    }

    #[test]
    fn test_remove_prunes_empty_parents() {
        let mut tree = PTree::new(StateId(1));
        let (l, r) = tree.attach(tree.root(), StateId(1), StateId(2));
        tree.remove(l);
        assert_eq!(tree.len(), 2);
        tree.remove(r);
        assert!(tree.is_empty());
    }

    #[test]
    #[should_panic(expected = "not a live leaf")]
    fn test_attach_inner_node_panics() {
        let mut tree = PTree::new(StateId(1));
        let root = tree.root();
        tree.attach(root, StateId(1), StateId(2));
        tree.attach(root, StateId(3), StateId(4));
    }
}
