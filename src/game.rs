//! Game service: resolves heads from the store and notifies watchers.
//!
//! Ingestion pushes events in; every new event for a watched game triggers a
//! fresh resolution from the root, and subscribers hear about it only when
//! the head actually moves.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard},
};

use anyhow::{anyhow, Result};
use secp256k1::Keypair;
use serde::Serialize;
use tracing::{debug, info};

use crate::{
    codec,
    content::GameContent,
    event::{Event, EventId, Tag, GAME_KIND},
    ident,
    resolve::{self, Resolution},
    rules::{self, GENESIS_REF},
    storage::EventStore,
    tree::{MoveNode, MoveTree},
    validate,
};

/// Build and sign a game start.
pub fn new_start(keys: &Keypair, created_at: u64) -> Result<Event> {
    let ev = Event {
        id: String::new(),
        pubkey: String::new(),
        kind: GAME_KIND,
        created_at,
        tags: vec![Tag::event(GENESIS_REF)],
        content: GameContent::Start.to_json(),
        sig: String::new(),
    };
    codec::finalize(ev, keys)
}

/// Build and sign a move continuing from `parent`.
///
/// The resulting FEN and history are derived from the parent, so the event is
/// valid as long as `san` is legal there.
pub fn new_move(keys: &Keypair, parent: &MoveNode, san: &str, created_at: u64) -> Result<Event> {
    let position = rules::apply_move(&parent.position, san)?;
    let mut history = parent.history.clone();
    history.push(san.to_string());
    let content = GameContent::Move {
        fen: rules::to_fen(&position),
        mv: san.to_string(),
        history,
    };
    let ev = Event {
        id: String::new(),
        pubkey: String::new(),
        kind: GAME_KIND,
        created_at,
        tags: vec![
            Tag::event(parent.game.to_hex()),
            Tag::event(parent.id.to_hex()),
        ],
        content: content.to_json(),
        sig: String::new(),
    };
    codec::finalize(ev, keys)
}

/// Outcome of resolving a game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadState {
    /// No valid start observed yet.
    Pending,
    Resolved(Resolution),
}

/// Serializable summary of a resolved head.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HeadView {
    pub game: String,
    pub note: String,
    pub head: String,
    pub ply: usize,
    #[serde(rename = "move")]
    pub mv: Option<String>,
    pub fen: String,
    pub pgn: String,
    pub created_at: u64,
    pub settled: bool,
}

impl From<&Resolution> for HeadView {
    fn from(res: &Resolution) -> Self {
        let head = &res.head;
        Self {
            game: head.game.to_hex(),
            note: ident::encode(&head.game),
            head: head.id.to_hex(),
            ply: head.ply(),
            mv: head.mv().map(str::to_string),
            fen: head.fen(),
            pgn: head.pgn(),
            created_at: head.created_at(),
            settled: res.settled,
        }
    }
}

/// One admitted node in a tree listing.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TreeEntry {
    pub id: String,
    pub parent: Option<String>,
    #[serde(rename = "move")]
    pub mv: Option<String>,
    pub ply: usize,
    pub created_at: u64,
    pub pubkey: String,
    /// Whether the node lies on the path from the root to the head.
    pub canonical: bool,
}

/// Admitted nodes of `tree` with the canonical path marked.
pub fn tree_entries(tree: &MoveTree) -> Vec<TreeEntry> {
    let nodes = tree.walk();
    let index: HashMap<EventId, &MoveNode> = nodes.iter().map(|n| (n.id, n)).collect();
    let mut canonical = HashSet::new();
    if let Some(res) = resolve::resolve_tree(tree) {
        let mut cursor = Some(res.head.id);
        while let Some(id) = cursor {
            canonical.insert(id);
            cursor = index.get(&id).and_then(|n| n.parent);
        }
    }
    nodes
        .iter()
        .map(|n| TreeEntry {
            id: n.id.to_hex(),
            parent: n.parent.map(|p| p.to_hex()),
            mv: n.mv().map(str::to_string),
            ply: n.ply(),
            created_at: n.created_at(),
            pubkey: n.event.pubkey.clone(),
            canonical: canonical.contains(&n.id),
        })
        .collect()
}

/// Callback fired with the new head of a watched game.
pub type HeadCallback = Arc<dyn Fn(&Resolution) + Send + Sync>;

/// Subscribers of one game.
///
/// `gate` is held from snapshot to notification so concurrent ingests of the
/// same game resolve and notify one at a time, in order.
#[derive(Default)]
struct Watch {
    gate: Arc<Mutex<()>>,
    last: Option<EventId>,
    callbacks: Vec<HeadCallback>,
}

/// Resolves games held in an [`EventStore`].
pub struct Games<S> {
    store: S,
    watches: Mutex<HashMap<EventId, Watch>>,
}

impl<S: EventStore> Games<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            watches: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Snapshot the events currently known for `game`.
    pub fn snapshot(&self, game: &EventId) -> Result<MoveTree> {
        let events = self.store.events_for_game(game)?;
        Ok(MoveTree::new(*game, events))
    }

    /// Resolve the canonical head of `game` from its root.
    pub fn resolve_head(&self, game: &EventId) -> Result<HeadState> {
        let tree = self.snapshot(game)?;
        Ok(match resolve::resolve_tree(&tree) {
            Some(res) => HeadState::Resolved(res),
            None => HeadState::Pending,
        })
    }

    /// Call `callback` whenever the head of `game` changes.
    ///
    /// The current head is recorded without firing; a game that is still
    /// pending fires as soon as its start arrives. Callbacks run on the
    /// ingesting thread and must not ingest into the same service.
    pub fn subscribe_to_head_changes(
        &self,
        game: &EventId,
        callback: impl Fn(&Resolution) + Send + Sync + 'static,
    ) -> Result<()> {
        let gate = self.lock_watches()?.entry(*game).or_default().gate.clone();
        let _turn = lock_gate(&gate)?;
        let current = match self.resolve_head(game)? {
            HeadState::Resolved(res) => Some(res.head.id),
            HeadState::Pending => None,
        };
        let mut watches = self.lock_watches()?;
        let watch = watches.entry(*game).or_default();
        if watch.callbacks.is_empty() {
            watch.last = current;
        }
        watch.callbacks.push(Arc::new(callback));
        Ok(())
    }

    /// Store an event and re-resolve its game if anyone is watching.
    ///
    /// Events failing the parent-free checks are dropped silently; returns
    /// whether the event was new to the store.
    pub fn ingest(&self, ev: Event) -> Result<bool> {
        let cand = match validate::admit(ev) {
            Ok(cand) => cand,
            Err(e) => {
                debug!(reason = %e, "dropping event at ingest");
                return Ok(false);
            }
        };
        if !self.store.insert(&cand.event)? {
            return Ok(false);
        }
        self.refresh(&cand.game())?;
        Ok(true)
    }

    /// Re-resolve a watched game and notify on head change.
    fn refresh(&self, game: &EventId) -> Result<()> {
        let Some(gate) = self.lock_watches()?.get(game).map(|w| w.gate.clone()) else {
            return Ok(());
        };
        let _turn = lock_gate(&gate)?;
        let HeadState::Resolved(res) = self.resolve_head(game)? else {
            return Ok(());
        };
        let callbacks = {
            let mut watches = self.lock_watches()?;
            let Some(watch) = watches.get_mut(game) else {
                return Ok(());
            };
            if watch.last == Some(res.head.id) {
                return Ok(());
            }
            watch.last = Some(res.head.id);
            watch.callbacks.clone()
        };
        info!(game = %game, head = %res.head.id, ply = res.head.ply(), "head changed");
        for cb in callbacks {
            cb(&res);
        }
        Ok(())
    }

    fn lock_watches(&self) -> Result<MutexGuard<'_, HashMap<EventId, Watch>>> {
        self.watches
            .lock()
            .map_err(|_| anyhow!("head watch table poisoned"))
    }
}

fn lock_gate(gate: &Mutex<()>) -> Result<MutexGuard<'_, ()>> {
    gate.lock().map_err(|_| anyhow!("head refresh gate poisoned"))
}
