//! Event-sourced chess games over signed Nostr events.
//!
//! Moves are content-addressed events that reference their game start and
//! their parent move. Peers may publish conflicting continuations; every
//! observer resolves the same canonical head from the same set of events.

pub mod codec;
pub mod config;
pub mod content;
pub mod event;
pub mod game;
pub mod ident;
pub mod resolve;
pub mod rules;
pub mod server;
pub mod storage;
pub mod tree;
pub mod validate;

#[cfg(test)]
mod testutil;
