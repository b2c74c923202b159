//! Game payloads carried in event content.
//!
//! Content is untrusted text. Parsing never panics and never guesses: it
//! either yields one of the two payload shapes or a reason for rejecting it.

use serde::{Deserialize, Serialize};

/// Payload of a game event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameContent {
    /// Opens a game from the standard starting position.
    Start,
    /// Extends a game by one ply.
    Move {
        /// Claimed FEN after the move.
        fen: String,
        /// SAN of the move, also the last element of `history`.
        mv: String,
        /// Every SAN move from the start up to and including `mv`.
        history: Vec<String>,
    },
}

/// Wire form shared by both payloads.
#[derive(Debug, Serialize, Deserialize)]
struct RawContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fen: Option<String>,
    #[serde(rename = "move", default, skip_serializing_if = "Option::is_none")]
    mv: Option<String>,
    history: Vec<String>,
}

/// Why content failed schema validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("content is not a game payload: {0}")]
    NotJson(String),
    #[error("start declares a move")]
    StartWithMove,
    #[error("start is not the standard starting position")]
    StartNotInitial,
    #[error("move payload has no `move` field")]
    MissingMove,
    #[error("move payload has no `fen` field")]
    MissingFen,
    #[error("last history entry {last:?} does not match move {mv:?}")]
    HistoryMismatch { last: String, mv: String },
}

impl GameContent {
    /// Validate raw content against the two payload shapes.
    pub fn parse(content: &str) -> Result<Self, SchemaError> {
        let raw: RawContent =
            serde_json::from_str(content).map_err(|e| SchemaError::NotJson(e.to_string()))?;
        let Some(last) = raw.history.last() else {
            if raw.mv.is_some() {
                return Err(SchemaError::StartWithMove);
            }
            if let Some(fen) = &raw.fen {
                let initial = crate::rules::starting_position();
                if !crate::rules::same_position(&initial, fen) {
                    return Err(SchemaError::StartNotInitial);
                }
            }
            return Ok(GameContent::Start);
        };
        let mv = raw.mv.ok_or(SchemaError::MissingMove)?;
        if *last != mv {
            return Err(SchemaError::HistoryMismatch {
                last: last.clone(),
                mv,
            });
        }
        let fen = raw.fen.ok_or(SchemaError::MissingFen)?;
        Ok(GameContent::Move {
            fen,
            mv,
            history: raw.history,
        })
    }

    /// Serialize back to the wire form.
    pub fn to_json(&self) -> String {
        let raw = match self {
            GameContent::Start => RawContent {
                fen: Some(crate::rules::START_FEN.to_string()),
                mv: None,
                history: vec![],
            },
            GameContent::Move { fen, mv, history } => RawContent {
                fen: Some(fen.clone()),
                mv: Some(mv.clone()),
                history: history.clone(),
            },
        };
        // A struct of strings always serializes.
        serde_json::to_string(&raw).unwrap_or_default()
    }

    pub fn is_start(&self) -> bool {
        matches!(self, GameContent::Start)
    }
}

/// Render a SAN history as numbered movetext, e.g. `1. e4 e5 2. Nf3`.
pub fn to_pgn(history: &[String]) -> String {
    let mut out = String::new();
    for (i, pair) in history.chunks(2).enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&format!("{}. {}", i + 1, pair[0]));
        if let Some(reply) = pair.get(1) {
            out.push(' ');
            out.push_str(reply);
        }
    }
    out
}
