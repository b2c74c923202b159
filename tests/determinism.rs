use chesstr::{
    codec,
    event::{Event, EventId, Tag, GAME_KIND},
    game::{self, Games, HeadState},
    resolve,
    storage::MemoryStore,
    tree::{MoveNode, MoveTree},
    validate,
};
use proptest::prelude::*;
use secp256k1::Keypair;

fn keys(byte: u8) -> Keypair {
    codec::keypair_from_hex(&format!("{byte:02x}").repeat(32)).unwrap()
}

fn id(ev: &Event) -> EventId {
    EventId::from_hex(&ev.id).unwrap()
}

fn child(parent: &MoveNode, ev: &Event) -> MoveNode {
    validate::successor(parent, &validate::admit(ev.clone()).unwrap()).unwrap()
}

/// Signed move whose claimed position is wrong.
fn forged_fen(keys: &Keypair, parent: &MoveNode, created_at: u64) -> Event {
    let mut history = parent.history.clone();
    history.push("Nf3".to_string());
    let content = serde_json::json!({
        "fen": parent.fen(),
        "move": "Nf3",
        "history": history,
    });
    let ev = Event {
        id: String::new(),
        pubkey: String::new(),
        kind: GAME_KIND,
        created_at,
        tags: vec![Tag::event(parent.game.to_hex()), Tag::event(parent.id.to_hex())],
        content: content.to_string(),
        sig: String::new(),
    };
    codec::finalize(ev, keys).unwrap()
}

struct Fixture {
    game: EventId,
    events: Vec<Event>,
    head: EventId,
}

/// A forked game with equal timestamps, an early forgery, and a bad signature.
fn fixture() -> Fixture {
    let (white, black) = (keys(1), keys(2));
    let s = game::new_start(&white, 1).unwrap();
    let root = validate::root(id(&s), &validate::admit(s.clone()).unwrap()).unwrap();
    let e4 = game::new_move(&white, &root, "e4", 100).unwrap();
    let d4 = game::new_move(&white, &root, "d4", 105).unwrap();
    let forged = forged_fen(&white, &root, 50);
    let mut bad_sig = game::new_move(&white, &root, "c4", 10).unwrap();
    bad_sig.sig = codec::sign(&bad_sig, &black).unwrap();

    let e4_node = child(&root, &e4);
    let e5 = game::new_move(&black, &e4_node, "e5", 110).unwrap();
    let c5 = game::new_move(&black, &e4_node, "c5", 110).unwrap();
    let d5 = game::new_move(&black, &child(&root, &d4), "d5", 106).unwrap();

    let reply = if id(&e5) < id(&c5) { &e5 } else { &c5 };
    let reply_node = child(&e4_node, reply);
    let nf3 = game::new_move(&white, &reply_node, "Nf3", 120).unwrap();

    Fixture {
        game: id(&s),
        head: id(&nf3),
        events: vec![s, e4, d4, forged, bad_sig, e5, c5, d5, nf3],
    }
}

#[test]
fn fixture_resolves_along_earliest_children() {
    let fx = fixture();
    let tree = MoveTree::new(fx.game, fx.events.clone());
    let res = resolve::resolve_tree(&tree).unwrap();
    assert_eq!(res.head.id, fx.head);
    assert_eq!(res.head.ply(), 3);
    assert!(res.settled);
    assert!(res.head.pgn().starts_with("1. e4"));
    // forgery and bad signature never become nodes
    assert_eq!(tree.walk().len(), 7);
}

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(64))]

    #[test]
    fn snapshot_order_does_not_matter(events in Just(fixture().events).prop_shuffle()) {
        let fx = fixture();
        let tree = MoveTree::new(fx.game, events);
        let res = resolve::resolve_tree(&tree).unwrap();
        prop_assert_eq!(res.head.id, fx.head);
    }

    #[test]
    fn arrival_order_does_not_matter(events in Just(fixture().events).prop_shuffle()) {
        let fx = fixture();
        let games = Games::new(MemoryStore::default());
        for ev in events {
            games.ingest(ev).unwrap();
            // Every intermediate head is an admitted node or still pending.
            if let HeadState::Resolved(res) = games.resolve_head(&fx.game).unwrap() {
                prop_assert!(res.settled);
                prop_assert_eq!(res.head.game, fx.game);
            }
        }
        match games.resolve_head(&fx.game).unwrap() {
            HeadState::Resolved(res) => prop_assert_eq!(res.head.id, fx.head),
            HeadState::Pending => prop_assert!(false, "start was ingested"),
        }
    }

    #[test]
    fn subscribers_end_on_the_same_head(events in Just(fixture().events).prop_shuffle()) {
        use std::sync::{Arc, Mutex};
        let fx = fixture();
        let games = Games::new(MemoryStore::default());
        let last: Arc<Mutex<Option<EventId>>> = Arc::default();
        let sink = last.clone();
        games
            .subscribe_to_head_changes(&fx.game, move |res| {
                *sink.lock().unwrap() = Some(res.head.id);
            })
            .unwrap();
        for ev in events {
            games.ingest(ev).unwrap();
        }
        prop_assert_eq!(*last.lock().unwrap(), Some(fx.head));
    }
}
