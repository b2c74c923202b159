//! Move tree over an immutable snapshot of a game's events.
//!
//! Nodes are never linked to each other. A node stores its parent id, and
//! children are found by scanning the snapshot for candidates that name the
//! node as parent and pass the succession checks against it. Because every
//! edge extends the history by one move, the structure is always a tree.

use std::collections::BTreeMap;

use shakmaty::Chess;
use tracing::debug;

use crate::{
    content,
    event::{Event, EventId},
    rules,
    validate::{self, Candidate},
};

/// A validated position in a game.
#[derive(Debug, Clone)]
pub struct MoveNode {
    pub id: EventId,
    /// Id of the start event.
    pub game: EventId,
    pub parent: Option<EventId>,
    pub event: Event,
    /// SAN moves from the start up to and including this node's move.
    pub history: Vec<String>,
    /// Position recomputed from the parent, never taken from the event.
    pub position: Chess,
}

impl PartialEq for MoveNode {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for MoveNode {}

impl MoveNode {
    /// SAN of the move that produced this node, `None` at the root.
    pub fn mv(&self) -> Option<&str> {
        self.history.last().map(String::as_str)
    }

    /// Number of half-moves played.
    pub fn ply(&self) -> usize {
        self.history.len()
    }

    pub fn fen(&self) -> String {
        rules::to_fen(&self.position)
    }

    pub fn pgn(&self) -> String {
        content::to_pgn(&self.history)
    }

    pub fn created_at(&self) -> u64 {
        self.event.created_at
    }

    /// Canonical sibling order: earliest `created_at`, then smallest id.
    pub fn order_key(&self) -> (u64, EventId) {
        (self.event.created_at, self.id)
    }
}

/// Snapshot of one game's candidate events.
pub struct MoveTree {
    game: EventId,
    candidates: BTreeMap<EventId, Candidate>,
}

impl MoveTree {
    /// Build a snapshot, dropping events that fail the parent-free checks or
    /// belong to another game. Duplicate deliveries collapse by id.
    pub fn new(game: EventId, events: impl IntoIterator<Item = Event>) -> Self {
        let mut candidates = BTreeMap::new();
        for ev in events {
            let id = ev.id.clone();
            match validate::admit(ev) {
                Ok(cand) if cand.game() == game => {
                    candidates.insert(cand.id, cand);
                }
                Ok(_) => debug!(event = %id, game = %game, "event belongs to another game"),
                Err(e) => debug!(event = %id, class = ?e.class(), reason = %e, "dropping event"),
            }
        }
        Self { game, candidates }
    }

    pub fn game(&self) -> EventId {
        self.game
    }

    /// Number of candidates that passed the parent-free checks.
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Root node, if the start event is present and valid.
    pub fn root(&self) -> Option<MoveNode> {
        let cand = self.candidates.get(&self.game)?;
        validate::root(self.game, cand).ok()
    }

    /// Valid successors of `node` in canonical order.
    pub fn children_of(&self, node: &MoveNode) -> Vec<MoveNode> {
        let mut children: Vec<MoveNode> = self
            .candidates
            .values()
            .filter(|c| c.parent() == Some(node.id))
            .filter_map(|c| match validate::successor(node, c) {
                Ok(child) => Some(child),
                Err(e) => {
                    debug!(event = %c.id, parent = %node.id, reason = %e, "rejecting successor");
                    None
                }
            })
            .collect();
        children.sort_by_key(MoveNode::order_key);
        children
    }

    /// Whether `ev` would be admitted as a child of `node`.
    pub fn is_valid_successor(&self, node: &MoveNode, ev: &Event) -> bool {
        validate::admit(ev.clone())
            .and_then(|cand| validate::successor(node, &cand))
            .is_ok()
    }

    /// Look up an admitted node by id, validating its whole ancestry.
    pub fn node(&self, id: &EventId) -> Option<MoveNode> {
        let mut chain = vec![self.candidates.get(id)?];
        while let Some(parent) = chain.last().and_then(|c| c.parent()) {
            if chain.len() > self.candidates.len() {
                return None;
            }
            chain.push(self.candidates.get(&parent)?);
        }
        let mut iter = chain.into_iter().rev();
        let mut node = validate::root(self.game, iter.next()?).ok()?;
        for cand in iter {
            node = validate::successor(&node, cand).ok()?;
        }
        Some(node)
    }

    /// Every admitted node, depth-first from the root with siblings in
    /// canonical order. Branches off the canonical path are included.
    pub fn walk(&self) -> Vec<MoveNode> {
        let mut out = Vec::new();
        let mut stack: Vec<MoveNode> = self.root().into_iter().collect();
        while let Some(node) = stack.pop() {
            let children = self.children_of(&node);
            stack.extend(children.into_iter().rev());
            out.push(node);
        }
        out
    }
}
