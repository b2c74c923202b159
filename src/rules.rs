//! Stateless chess rules: the starting position, the genesis reference, and
//! move application.
//!
//! Every function here is pure, so concurrent resolution passes can share it
//! without coordination.

use sha2::{Digest, Sha256};
use shakmaty::{fen::Fen, san::SanPlus, CastlingMode, Chess, EnPassantMode, Position};

/// FEN of the standard starting position.
pub const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// SHA-256 of [`START_FEN`]; every game start references it.
pub const GENESIS_REF: &str = "b1791d7fc9ae3d38966568c257ffb3a02cbf8394cdb4805bc70f64fc3c0b6879";

/// Why a move could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IllegalMove {
    #[error("unparseable move notation: {0}")]
    Notation(String),
    #[error("move {0} is not legal in this position")]
    NotLegal(String),
}

/// Hash a FEN string into the reference form used by starts.
pub fn position_ref(fen: &str) -> String {
    hex::encode(Sha256::digest(fen.as_bytes()))
}

pub fn starting_position() -> Chess {
    Chess::default()
}

/// Apply a SAN move to `pos`, returning the resulting position.
///
/// Check and mate suffixes are accepted but not required to be accurate.
pub fn apply_move(pos: &Chess, san: &str) -> Result<Chess, IllegalMove> {
    let parsed: SanPlus = san
        .parse()
        .map_err(|_| IllegalMove::Notation(san.to_string()))?;
    let m = parsed
        .san
        .to_move(pos)
        .map_err(|_| IllegalMove::NotLegal(san.to_string()))?;
    pos.clone()
        .play(m)
        .map_err(|_| IllegalMove::NotLegal(san.to_string()))
}

/// Parse a FEN into a playable position.
///
/// An en passant square that allows no capture is dropped rather than
/// rejected, since writers disagree on whether to emit it.
pub fn parse_fen(fen: &str) -> Option<Chess> {
    let parsed: Fen = fen.parse().ok()?;
    parsed
        .into_position::<Chess>(CastlingMode::Standard)
        .or_else(|e| e.ignore_invalid_ep_square())
        .ok()
}

/// Render `pos` as FEN.
pub fn to_fen(pos: &Chess) -> String {
    Fen::from_position(pos, EnPassantMode::Legal).to_string()
}

/// Whether `fen` denotes the same position as `pos`.
///
/// Compares board, side to move, castling rights, and the legal en passant
/// square; move counters are ignored.
pub fn same_position(pos: &Chess, fen: &str) -> bool {
    parse_fen(fen).is_some_and(|claimed| claimed == *pos)
}
