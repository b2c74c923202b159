//! Human-shareable game ids (`note1…`).

use bech32::{primitives::decode::CheckedHrpstring, Bech32, Hrp};

use crate::event::EventId;

/// Human-readable prefix of encoded ids.
pub const HRP: Hrp = Hrp::parse_unchecked("note");

/// Why a human-supplied id was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentError {
    #[error("invalid bech32 string: {0}")]
    Bech32(String),
    #[error("expected prefix `note`, found `{0}`")]
    WrongPrefix(String),
    #[error("expected 32 bytes, found {0}")]
    WrongLength(usize),
    #[error("not a note id or hex event id: {0}")]
    Unrecognized(String),
}

/// Encode a raw event id as `note1…`.
pub fn encode(id: &EventId) -> String {
    // 32 bytes stays well below the bech32 length limit, so this cannot fail.
    bech32::encode::<Bech32>(HRP, &id.0).unwrap_or_default()
}

/// Decode a `note1…` string back to the raw id.
pub fn decode(s: &str) -> Result<EventId, IdentError> {
    let checked =
        CheckedHrpstring::new::<Bech32>(s).map_err(|e| IdentError::Bech32(e.to_string()))?;
    if checked.hrp() != HRP {
        return Err(IdentError::WrongPrefix(checked.hrp().to_string()));
    }
    let bytes: Vec<u8> = checked.byte_iter().collect();
    let raw: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| IdentError::WrongLength(bytes.len()))?;
    Ok(EventId(raw))
}

/// Accept either a `note1…` id or a 64-character hex id.
pub fn parse_game_ref(s: &str) -> Result<EventId, IdentError> {
    let s = s.trim();
    if s.to_ascii_lowercase().starts_with("note1") {
        return decode(s);
    }
    EventId::from_hex(s).ok_or_else(|| IdentError::Unrecognized(s.to_string()))
}
