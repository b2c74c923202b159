//! Admission checks for candidate game events.
//!
//! The pipeline runs in a fixed order and stops at the first failure:
//!
//! 1. structure: well-formed hex fields, game kind, id equals the content hash
//! 2. signature: BIP-340 Schnorr over the id
//! 3. schema: content is a start or a move payload
//! 4. topology: `e` tags point at the genesis reference, or at a start and an
//!    admitted parent of the same game
//! 5. succession: history extends the parent's by exactly the declared move,
//!    the move is legal, and the claimed FEN matches the recomputed position
//!
//! Steps 1–4 (tag shape only) depend on the event alone and run once per
//! snapshot in [`admit`]. Parent resolution and step 5 need a parent node and
//! run in [`successor`].

use crate::{
    codec,
    content::{GameContent, SchemaError},
    event::{Event, EventId, GAME_KIND},
    rules::{self, IllegalMove, GENESIS_REF},
    tree::MoveNode,
};

/// Reason a candidate event was not admitted.
///
/// Rejections are routine: peers may be buggy or hostile. Callers drop the
/// event and carry on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("malformed event: {0}")]
    Malformed(String),
    #[error("unexpected kind {0}")]
    WrongKind(u32),
    #[error("id does not match content hash")]
    IdMismatch,
    #[error("invalid signature")]
    BadSignature,
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("bad topology: {0}")]
    Topology(&'static str),
    #[error("parent {0} is not an admitted node of this game")]
    UnknownParent(EventId),
    #[error("history is not the parent history plus the move")]
    HistoryNotSuccessor,
    #[error(transparent)]
    Illegal(#[from] IllegalMove),
    #[error("claimed fen does not match the position after the move")]
    FenMismatch,
}

/// Coarse grouping of rejections for logs and counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionClass {
    /// Hash, signature, or schema failure.
    Malformed,
    /// Well-formed but not a legal continuation.
    IllegalSuccession,
}

impl Rejection {
    pub fn class(&self) -> RejectionClass {
        match self {
            Rejection::Malformed(_)
            | Rejection::WrongKind(_)
            | Rejection::IdMismatch
            | Rejection::BadSignature
            | Rejection::Schema(_)
            | Rejection::Topology(_) => RejectionClass::Malformed,
            Rejection::UnknownParent(_)
            | Rejection::HistoryNotSuccessor
            | Rejection::Illegal(_)
            | Rejection::FenMismatch => RejectionClass::IllegalSuccession,
        }
    }
}

/// Where an admitted event claims to attach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    /// Root of its own game.
    Start,
    /// Successor of `parent` within `game`.
    Move { game: EventId, parent: EventId },
}

/// Event that passed every check that does not need a parent.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub id: EventId,
    pub event: Event,
    pub content: GameContent,
    pub link: Link,
}

impl Candidate {
    /// Game this candidate belongs to.
    pub fn game(&self) -> EventId {
        match self.link {
            Link::Start => self.id,
            Link::Move { game, .. } => game,
        }
    }

    pub fn parent(&self) -> Option<EventId> {
        match self.link {
            Link::Start => None,
            Link::Move { parent, .. } => Some(parent),
        }
    }

    /// Canonical sibling order: earliest `created_at`, then smallest id.
    pub fn order_key(&self) -> (u64, EventId) {
        (self.event.created_at, self.id)
    }
}

/// Parse a wire event, treating any shape error as malformed input.
pub fn parse_event(json: &str) -> Result<Event, Rejection> {
    serde_json::from_str(json).map_err(|e| Rejection::Malformed(e.to_string()))
}

/// Run structure, signature, schema, and tag-shape checks.
pub fn admit(event: Event) -> Result<Candidate, Rejection> {
    let id = EventId::from_hex(&event.id)
        .filter(|_| event.id.bytes().all(|b| !b.is_ascii_uppercase()))
        .ok_or_else(|| Rejection::Malformed("id is not 32-byte lowercase hex".into()))?;
    if event.pubkey.len() != 64 {
        return Err(Rejection::Malformed("pubkey is not 32-byte hex".into()));
    }
    if event.sig.len() != 128 {
        return Err(Rejection::Malformed("sig is not 64-byte hex".into()));
    }
    if event.kind != GAME_KIND {
        return Err(Rejection::WrongKind(event.kind));
    }
    let hash = codec::event_hash(&event).map_err(|e| Rejection::Malformed(e.to_string()))?;
    if hash != id.0 {
        return Err(Rejection::IdMismatch);
    }
    codec::verify_signature(&event, &hash)?;

    let content = GameContent::parse(&event.content)?;
    let link = match (&content, event.event_refs().as_slice()) {
        (GameContent::Start, [genesis]) if *genesis == GENESIS_REF => Link::Start,
        (GameContent::Start, _) => {
            return Err(Rejection::Topology("start must reference only the genesis"))
        }
        (GameContent::Move { .. }, [start, parent]) => {
            let game = EventId::from_hex(start)
                .ok_or(Rejection::Topology("start reference is not an event id"))?;
            let parent = EventId::from_hex(parent)
                .ok_or(Rejection::Topology("parent reference is not an event id"))?;
            Link::Move { game, parent }
        }
        (GameContent::Move { .. }, _) => {
            return Err(Rejection::Topology("move must reference a start and a parent"))
        }
    };
    Ok(Candidate {
        id,
        event,
        content,
        link,
    })
}

/// Turn a start candidate into the root node of `game`.
pub fn root(game: EventId, cand: &Candidate) -> Result<MoveNode, Rejection> {
    if cand.link != Link::Start || cand.id != game {
        return Err(Rejection::Topology("not the start of this game"));
    }
    Ok(MoveNode {
        id: cand.id,
        game,
        parent: None,
        event: cand.event.clone(),
        history: Vec::new(),
        position: rules::starting_position(),
    })
}

/// Check that `cand` is a legal continuation of `parent`.
pub fn successor(parent: &MoveNode, cand: &Candidate) -> Result<MoveNode, Rejection> {
    let Link::Move { game, parent: parent_ref } = cand.link else {
        return Err(Rejection::Topology("a start cannot succeed a node"));
    };
    if parent_ref != parent.id {
        return Err(Rejection::UnknownParent(parent_ref));
    }
    if game != parent.game {
        return Err(Rejection::Topology("start reference differs from the parent's game"));
    }
    let GameContent::Move { fen, mv, history } = &cand.content else {
        return Err(Rejection::Topology("a start cannot succeed a node"));
    };
    let extends = history.len() == parent.history.len() + 1
        && history.starts_with(&parent.history)
        && history.last() == Some(mv);
    if !extends {
        return Err(Rejection::HistoryNotSuccessor);
    }
    let position = rules::apply_move(&parent.position, mv)?;
    if !rules::same_position(&position, fen) {
        return Err(Rejection::FenMismatch);
    }
    Ok(MoveNode {
        id: cand.id,
        game,
        parent: Some(parent.id),
        event: cand.event.clone(),
        history: history.clone(),
        position,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{codec, event::Tag, testutil::*};

    #[test]
    fn admits_signed_start_and_move() {
        let s = start(&alice(), 10);
        let cand = admit(s.clone()).unwrap();
        assert_eq!(cand.link, Link::Start);
        let root_node = root(cand.id, &cand).unwrap();
        assert_eq!(root_node.history.len(), 0);

        let m = play(&alice(), &root_node, "e4", 11);
        let mc = admit(m).unwrap();
        assert_eq!(mc.parent(), Some(root_node.id));
        let node = successor(&root_node, &mc).unwrap();
        assert_eq!(node.history, vec!["e4".to_string()]);
    }

    #[test]
    fn hash_mismatch_rejected_even_with_valid_signature() {
        let mut s = start(&alice(), 10);
        // Re-sign after tampering so only the id is wrong.
        s.created_at = 11;
        s.sig = codec::sign(&s, &alice()).unwrap();
        assert_eq!(admit(s).unwrap_err(), Rejection::IdMismatch);
    }

    #[test]
    fn bad_signature_rejected_even_with_valid_hash() {
        let mut s = start(&alice(), 10);
        s.sig = codec::sign(&s, &bob()).unwrap();
        assert_eq!(admit(s).unwrap_err(), Rejection::BadSignature);
    }

    #[test]
    fn structural_failures() {
        let mut s = start(&alice(), 10);
        s.id = s.id.to_uppercase();
        assert!(matches!(admit(s).unwrap_err(), Rejection::Malformed(_)));

        let mut s = start(&alice(), 10);
        s.sig.truncate(10);
        assert!(matches!(admit(s).unwrap_err(), Rejection::Malformed(_)));

        let nested = r#"{"id":"a","pubkey":"b","kind":30,"created_at":1,"tags":[["e",["x"]]],"content":"","sig":"c"}"#;
        assert!(matches!(parse_event(nested), Err(Rejection::Malformed(_))));
        let float_ts = r#"{"id":"a","pubkey":"b","kind":30,"created_at":1.5,"tags":[],"content":"","sig":"c"}"#;
        assert!(matches!(parse_event(float_ts), Err(Rejection::Malformed(_))));
    }

    #[test]
    fn wrong_kind_rejected() {
        let ev = signed(&alice(), 1, vec![Tag::event(GENESIS_REF)], r#"{"history":[]}"#, 5);
        assert_eq!(admit(ev).unwrap_err(), Rejection::WrongKind(1));
    }

    #[test]
    fn start_topology() {
        let ev = signed(
            &alice(),
            GAME_KIND,
            vec![Tag::event("ab".repeat(32))],
            r#"{"history":[]}"#,
            5,
        );
        assert!(matches!(admit(ev).unwrap_err(), Rejection::Topology(_)));
        let ev = signed(
            &alice(),
            GAME_KIND,
            vec![Tag::event(GENESIS_REF), Tag::event(GENESIS_REF)],
            r#"{"history":[]}"#,
            5,
        );
        assert!(matches!(admit(ev).unwrap_err(), Rejection::Topology(_)));
    }

    #[test]
    fn move_needs_two_refs() {
        let s = root_of(&start(&alice(), 1));
        let content = crate::content::GameContent::Move {
            fen: "x".into(),
            mv: "e4".into(),
            history: vec!["e4".into()],
        }
        .to_json();
        let ev = signed(&alice(), GAME_KIND, vec![Tag::event(s.id.to_hex())], &content, 2);
        assert!(matches!(admit(ev).unwrap_err(), Rejection::Topology(_)));
    }

    #[test]
    fn history_must_extend_parent() {
        let s = root_of(&start(&alice(), 1));
        let m1 = successor(&s, &admit(play(&alice(), &s, "e4", 2)).unwrap()).unwrap();
        // Claims to follow m1 but drops e4 from the history.
        let bogus = raw_move(&bob(), &m1, "e5", vec!["e5"], None, 3);
        assert_eq!(
            successor(&m1, &admit(bogus).unwrap()).unwrap_err(),
            Rejection::HistoryNotSuccessor
        );
        // Right length, wrong prefix.
        let bogus = raw_move(&bob(), &m1, "e5", vec!["d4", "e5"], None, 3);
        assert_eq!(
            successor(&m1, &admit(bogus).unwrap()).unwrap_err(),
            Rejection::HistoryNotSuccessor
        );
    }

    #[test]
    fn illegal_move_rejected() {
        let s = root_of(&start(&alice(), 1));
        let bogus = raw_move(&bob(), &s, "e5", vec!["e5"], None, 3);
        assert!(matches!(
            successor(&s, &admit(bogus).unwrap()).unwrap_err(),
            Rejection::Illegal(_)
        ));
    }

    #[test]
    fn forged_fen_rejected() {
        let s = root_of(&start(&alice(), 1));
        let forged = raw_move(
            &bob(),
            &s,
            "e4",
            vec!["e4"],
            Some("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR b KQkq - 0 1"),
            3,
        );
        let err = successor(&s, &admit(forged).unwrap()).unwrap_err();
        assert_eq!(err, Rejection::FenMismatch);
        assert_eq!(err.class(), RejectionClass::IllegalSuccession);
    }

    #[test]
    fn wrong_parent_and_game() {
        let s = root_of(&start(&alice(), 1));
        let other = root_of(&start(&bob(), 2));
        let m = admit(play(&alice(), &s, "e4", 3)).unwrap();
        assert_eq!(
            successor(&other, &m).unwrap_err(),
            Rejection::UnknownParent(s.id)
        );
        assert!(root(other.id, &m).is_err());
        assert!(root(s.id, &admit(start(&bob(), 2)).unwrap()).is_err());
    }
}
