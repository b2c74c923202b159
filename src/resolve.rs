//! Fork arbitration: choosing the canonical head of a game.
//!
//! From a starting node the resolver repeatedly moves to the canonical child,
//! the valid successor with the earliest `created_at`, ties broken by the
//! smallest id bytes. The order is total, so every observer holding the same
//! events lands on the same head no matter how the events arrived.

use crate::tree::{MoveNode, MoveTree};

/// Head reached by a resolution step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub head: MoveNode,
    /// `true` once the head has no valid successor in the snapshot.
    pub settled: bool,
}

/// Pick the canonical child among siblings.
pub fn canonical_child(children: impl IntoIterator<Item = MoveNode>) -> Option<MoveNode> {
    children.into_iter().min_by_key(MoveNode::order_key)
}

/// Step-by-step resolution from a starting head.
///
/// Yields `settled = false` for every node the head advances through and a
/// final item with `settled = true` at the leaf.
pub struct Steps<'a> {
    tree: &'a MoveTree,
    head: Option<MoveNode>,
}

impl<'a> Steps<'a> {
    pub fn new(tree: &'a MoveTree, from: MoveNode) -> Self {
        Self {
            tree,
            head: Some(from),
        }
    }
}

impl Iterator for Steps<'_> {
    type Item = Resolution;

    fn next(&mut self) -> Option<Resolution> {
        let head = self.head.take()?;
        match canonical_child(self.tree.children_of(&head)) {
            Some(child) => {
                self.head = Some(child.clone());
                Some(Resolution {
                    head: child,
                    settled: false,
                })
            }
            None => Some(Resolution {
                head,
                settled: true,
            }),
        }
    }
}

/// Resolve all the way to a leaf starting at `from`.
pub fn resolve(tree: &MoveTree, from: MoveNode) -> Resolution {
    let fallback = Resolution {
        head: from.clone(),
        settled: true,
    };
    Steps::new(tree, from).last().unwrap_or(fallback)
}

/// Resolve from the root, or `None` while no valid start is known.
pub fn resolve_tree(tree: &MoveTree) -> Option<Resolution> {
    tree.root().map(|root| resolve(tree, root))
}
