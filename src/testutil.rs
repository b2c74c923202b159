//! Signed fixtures shared by unit tests.

use secp256k1::Keypair;

use crate::{
    codec,
    content::GameContent,
    event::{Event, EventId, Tag},
    game, rules,
    tree::MoveNode,
    validate,
};

pub fn alice() -> Keypair {
    codec::keypair_from_hex(&"01".repeat(32)).unwrap()
}

pub fn bob() -> Keypair {
    codec::keypair_from_hex(&"02".repeat(32)).unwrap()
}

pub fn signed(keys: &Keypair, kind: u32, tags: Vec<Tag>, content: &str, created_at: u64) -> Event {
    let ev = Event {
        id: String::new(),
        pubkey: String::new(),
        kind,
        created_at,
        tags,
        content: content.into(),
        sig: String::new(),
    };
    codec::finalize(ev, keys).unwrap()
}

pub fn start(keys: &Keypair, created_at: u64) -> Event {
    game::new_start(keys, created_at).unwrap()
}

pub fn root_of(start: &Event) -> MoveNode {
    let cand = validate::admit(start.clone()).unwrap();
    validate::root(cand.id, &cand).unwrap()
}

/// Legal move built the way a well-behaved client would.
pub fn play(keys: &Keypair, parent: &MoveNode, san: &str, created_at: u64) -> Event {
    game::new_move(keys, parent, san, created_at).unwrap()
}

pub fn node_of(parent: &MoveNode, ev: &Event) -> MoveNode {
    let cand = validate::admit(ev.clone()).unwrap();
    validate::successor(parent, &cand).unwrap()
}

/// Correctly signed move with arbitrary payload. When `fen` is `None` the
/// FEN is recomputed if the move is legal, or the parent's is reused.
pub fn raw_move(
    keys: &Keypair,
    parent: &MoveNode,
    san: &str,
    history: Vec<&str>,
    fen: Option<&str>,
    created_at: u64,
) -> Event {
    let fen = match fen {
        Some(f) => f.to_string(),
        None => rules::apply_move(&parent.position, san)
            .map(|p| rules::to_fen(&p))
            .unwrap_or_else(|_| parent.fen()),
    };
    let content = GameContent::Move {
        fen,
        mv: san.into(),
        history: history.into_iter().map(String::from).collect(),
    };
    signed(
        keys,
        crate::event::GAME_KIND,
        vec![Tag::event(parent.game.to_hex()), Tag::event(parent.id.to_hex())],
        &content.to_json(),
        created_at,
    )
}

pub fn id_of(ev: &Event) -> EventId {
    EventId::from_hex(&ev.id).unwrap()
}
