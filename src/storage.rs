//! Event storage behind the [`EventStore`] trait: an in-memory table and a
//! minimal file-backed store.

use std::{
    collections::{HashMap, HashSet},
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::RwLock,
};

use anyhow::{anyhow, bail, Result};
use rand::{seq::SliceRandom, thread_rng};
use serde_json::to_writer;
use tracing::warn;

use crate::{
    codec,
    event::{Event, EventId},
};

/// Append-only source of game events.
///
/// Implementations must be safe to share between threads: one writer appends
/// while any number of resolution passes read.
pub trait EventStore: Send + Sync {
    /// Fetch a single event by id.
    fn get_event(&self, id: &EventId) -> Result<Option<Event>>;
    /// Every stored event claiming to belong to `game`, start included.
    fn events_for_game(&self, game: &EventId) -> Result<Vec<Event>>;
    /// Store `ev`, returning `false` if it was already present.
    fn insert(&self, ev: &Event) -> Result<bool>;
}

#[derive(Default)]
struct Tables {
    events: HashMap<EventId, Event>,
    by_game: HashMap<EventId, Vec<EventId>>,
}

/// In-memory store guarded by a read/write lock.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl EventStore for MemoryStore {
    fn get_event(&self, id: &EventId) -> Result<Option<Event>> {
        let tables = self.tables.read().map_err(|_| anyhow!("store lock poisoned"))?;
        Ok(tables.events.get(id).cloned())
    }

    fn events_for_game(&self, game: &EventId) -> Result<Vec<Event>> {
        let tables = self.tables.read().map_err(|_| anyhow!("store lock poisoned"))?;
        Ok(tables
            .by_game
            .get(game)
            .into_iter()
            .flatten()
            .filter_map(|id| tables.events.get(id).cloned())
            .collect())
    }

    fn insert(&self, ev: &Event) -> Result<bool> {
        let id = parse_id(&ev.id)?;
        let mut tables = self.tables.write().map_err(|_| anyhow!("store lock poisoned"))?;
        if tables.events.contains_key(&id) {
            return Ok(false);
        }
        if let Some(game) = ev.game_ref().as_deref().and_then(EventId::from_hex) {
            tables.by_game.entry(game).or_default().push(id);
        }
        tables.events.insert(id, ev.clone());
        Ok(true)
    }
}

/// Persistent store for events and the per-game index rooted at `root`.
///
/// Layout:
/// - `events/ab/cd/<id>.json` one file per event
/// - `log/events.ndjson` every ingested event in arrival order
/// - `index/by-game/<game>.txt` newline-separated ids per game
#[derive(Clone)]
pub struct Store {
    root: PathBuf,
    verify_sig: bool,
}

impl Store {
    /// Create a new store rooted at `root`.
    pub fn new(root: PathBuf, verify_sig: bool) -> Self {
        Self { root, verify_sig }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Ensure the on-disk directory structure exists.
    pub fn init(&self) -> Result<()> {
        for d in ["events", "log", "index/by-game"] {
            fs::create_dir_all(self.root.join(d))?;
        }
        Ok(())
    }

    /// Ingest an event if it doesn't already exist on disk.
    pub fn ingest(&self, ev: &Event) -> Result<bool> {
        // Optionally verify the event's id and signature before writing.
        if self.verify_sig {
            codec::verify(ev)?;
        }
        let id = parse_id(&ev.id)?;
        let path = self.event_path(&id);
        if path.exists() {
            return Ok(false);
        }
        // Write the event JSON atomically to its canonical path. Only the
        // writer that creates the file goes on to log and index it.
        let parent_dir = path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        fs::create_dir_all(&parent_dir)?;
        let tmp = tempfile::NamedTempFile::new_in(&parent_dir)?;
        to_writer(&tmp, ev)?;
        if let Err(e) = tmp.persist_noclobber(&path) {
            if path.exists() {
                return Ok(false);
            }
            return Err(e.error.into());
        }

        // Append the event to a newline-delimited log for easy tailing.
        fs::create_dir_all(self.root.join("log"))?;
        let mut log_file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.root.join("log/events.ndjson"))?;
        serde_json::to_writer(&mut log_file, ev)?;
        log_file.write_all(b"\n")?;

        self.index_event(ev)?;
        Ok(true)
    }

    /// Verify ids and signatures for a random sample of stored events.
    pub fn verify_sample(&self, sample: usize) -> Result<usize> {
        let mut paths = self.event_files()?;
        let mut rng = thread_rng();
        paths.shuffle(&mut rng);
        let take = sample.min(paths.len());
        for p in paths.iter().take(take) {
            let ev = read_event(p)?;
            codec::verify(&ev).map_err(|e| anyhow!("{}: {e}", ev.id))?;
        }
        Ok(take)
    }

    /// Rebuild the per-game index from the `events/` tree.
    pub fn reindex(&self) -> Result<usize> {
        let index_dir = self.root.join("index");
        if index_dir.exists() {
            fs::remove_dir_all(&index_dir)?;
        }
        fs::create_dir_all(self.root.join("index/by-game"))?;
        let mut count = 0;
        for path in self.event_files()? {
            match read_event(&path) {
                Ok(ev) => {
                    self.index_event(&ev)?;
                    count += 1;
                }
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable event"),
            }
        }
        Ok(count)
    }

    /// Record the event under the game it claims to belong to.
    fn index_event(&self, ev: &Event) -> Result<()> {
        if let Some(game) = ev.game_ref().as_deref().and_then(EventId::from_hex) {
            self.append_index("index/by-game", &game.to_hex(), &ev.id)?;
        }
        Ok(())
    }

    /// Append an event ID to the index file under `prefix/name.txt`.
    fn append_index(&self, prefix: &str, name: &str, id: &str) -> Result<()> {
        let path = self.root.join(prefix).join(format!("{}.txt", name));
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut f = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        writeln!(f, "{}", id)?;
        Ok(())
    }

    /// Compute the canonical path for an event ID.
    fn event_path(&self, id: &EventId) -> PathBuf {
        let hex = id.to_hex();
        self.root
            .join("events")
            .join(&hex[0..2])
            .join(&hex[2..4])
            .join(format!("{}.json", hex))
    }

    fn event_files(&self) -> Result<Vec<PathBuf>> {
        let mut paths = vec![];
        let events_dir = self.root.join("events");
        if !events_dir.exists() {
            return Ok(paths);
        }
        for entry in walkdir::WalkDir::new(events_dir) {
            let entry = entry?;
            if entry.file_type().is_file() {
                paths.push(entry.into_path());
            }
        }
        Ok(paths)
    }
}

impl EventStore for Store {
    fn get_event(&self, id: &EventId) -> Result<Option<Event>> {
        let path = self.event_path(id);
        if !path.exists() {
            return Ok(None);
        }
        read_event(&path).map(Some)
    }

    fn events_for_game(&self, game: &EventId) -> Result<Vec<Event>> {
        let path = self
            .root
            .join("index/by-game")
            .join(format!("{}.txt", game.to_hex()));
        let mut events = vec![];
        for id in read_ids(&path)? {
            let Some(id) = EventId::from_hex(&id) else {
                continue;
            };
            match self.get_event(&id) {
                Ok(Some(ev)) => events.push(ev),
                Ok(None) => warn!(event = %id, "indexed event missing from store"),
                Err(e) => warn!(event = %id, error = %e, "skipping unreadable event"),
            }
        }
        Ok(events)
    }

    fn insert(&self, ev: &Event) -> Result<bool> {
        self.ingest(ev)
    }
}

fn parse_id(id: &str) -> Result<EventId> {
    match EventId::from_hex(id) {
        Some(id) => Ok(id),
        None => bail!("invalid event id: {id:?}"),
    }
}

fn read_event(path: &Path) -> Result<Event> {
    let data = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

/// Read newline-separated IDs from a text file.
fn read_ids(path: &Path) -> Result<HashSet<String>> {
    if !path.exists() {
        return Ok(Default::default());
    }
    let data = fs::read_to_string(path)?;
    Ok(data.lines().map(|s| s.to_string()).collect())
}
