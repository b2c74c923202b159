//! Canonical event serialization, hashing, and Schnorr signatures.

use anyhow::{anyhow, Context, Result};
use secp256k1::{schnorr::Signature, Keypair, Message, Secp256k1, XOnlyPublicKey};
use sha2::{Digest, Sha256};

use crate::{event::Event, validate::Rejection};

/// Serialize the hash input `[0, pubkey, created_at, kind, tags, content]`.
///
/// serde_json writes compact output with the same escaping rules as NIP-01,
/// so the bytes match any other conforming implementation.
pub fn canonical_bytes(ev: &Event) -> serde_json::Result<Vec<u8>> {
    let arr = serde_json::json!([0, ev.pubkey, ev.created_at, ev.kind, ev.tags, ev.content]);
    serde_json::to_vec(&arr)
}

/// Recompute the event hash from its fields.
pub fn event_hash(ev: &Event) -> serde_json::Result<[u8; 32]> {
    let data = canonical_bytes(ev)?;
    Ok(Sha256::digest(&data).into())
}

/// Load a keypair from a 32-byte hex secret.
pub fn keypair_from_hex(secret: &str) -> Result<Keypair> {
    let bytes = hex::decode(secret.trim()).context("secret key is not hex")?;
    let secp = Secp256k1::signing_only();
    Keypair::from_seckey_slice(&secp, &bytes).map_err(|e| anyhow!("invalid secret key: {e}"))
}

/// Sign the event hash, returning the hex signature.
///
/// The signature covers the recomputed hash, not whatever is in `ev.id`.
pub fn sign(ev: &Event, keys: &Keypair) -> Result<String> {
    let hash = event_hash(ev)?;
    let secp = Secp256k1::signing_only();
    let msg = Message::from_digest(hash);
    let sig = secp.sign_schnorr_no_aux_rand(&msg, keys);
    Ok(hex::encode(sig.as_ref()))
}

/// Fill in `pubkey`, `id`, and `sig` so the event is ready to publish.
pub fn finalize(mut ev: Event, keys: &Keypair) -> Result<Event> {
    ev.pubkey = hex::encode(keys.x_only_public_key().0.serialize());
    ev.id = hex::encode(event_hash(&ev)?);
    ev.sig = sign(&ev, keys)?;
    Ok(ev)
}

/// Verify an event's id and Schnorr signature.
pub fn verify(ev: &Event) -> Result<(), Rejection> {
    let hash = event_hash(ev).map_err(|e| Rejection::Malformed(e.to_string()))?;
    if hex::encode(hash) != ev.id {
        return Err(Rejection::IdMismatch);
    }
    verify_signature(ev, &hash)
}

/// Check the signature against an already-verified hash.
pub(crate) fn verify_signature(ev: &Event, hash: &[u8; 32]) -> Result<(), Rejection> {
    let sig_bytes = hex::decode(&ev.sig).map_err(|_| Rejection::BadSignature)?;
    let sig = Signature::from_slice(&sig_bytes).map_err(|_| Rejection::BadSignature)?;
    let pk_bytes = hex::decode(&ev.pubkey).map_err(|_| Rejection::BadSignature)?;
    let pk = XOnlyPublicKey::from_slice(&pk_bytes).map_err(|_| Rejection::BadSignature)?;
    let secp = Secp256k1::verification_only();
    let msg = Message::from_digest(*hash);
    secp.verify_schnorr(&sig, &msg, &pk)
        .map_err(|_| Rejection::BadSignature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Tag, GAME_KIND};

    fn keys() -> Keypair {
        keypair_from_hex(&"01".repeat(32)).unwrap()
    }

    fn unsigned(content: &str) -> Event {
        Event {
            id: String::new(),
            pubkey: String::new(),
            kind: GAME_KIND,
            created_at: 1_700_000_000,
            tags: vec![Tag::event("ab".repeat(32))],
            content: content.into(),
            sig: String::new(),
        }
    }

    #[test]
    fn canonical_bytes_layout() {
        let mut ev = unsigned("{\"history\":[]}");
        ev.pubkey = "00".repeat(32);
        let bytes = canonical_bytes(&ev).unwrap();
        let expected = format!(
            "[0,\"{}\",1700000000,30,[[\"e\",\"{}\"]],\"{{\\\"history\\\":[]}}\"]",
            "00".repeat(32),
            "ab".repeat(32)
        );
        assert_eq!(String::from_utf8(bytes).unwrap(), expected);
    }

    #[test]
    fn canonical_bytes_escape_like_nip01() {
        let mut ev = unsigned("line\nbreak \"quoted\" é/");
        ev.tags.clear();
        let text = String::from_utf8(canonical_bytes(&ev).unwrap()).unwrap();
        assert!(text.ends_with("\"line\\nbreak \\\"quoted\\\" é/\"]"));
    }

    #[test]
    fn event_hash_is_sha256_of_canonical_bytes() {
        let ev = unsigned("");
        let expected: [u8; 32] = Sha256::digest(canonical_bytes(&ev).unwrap()).into();
        assert_eq!(event_hash(&ev).unwrap(), expected);
    }

    #[test]
    fn finalize_then_verify() {
        let ev = finalize(unsigned("{}"), &keys()).unwrap();
        assert_eq!(ev.id.len(), 64);
        assert_eq!(ev.sig.len(), 128);
        assert!(verify(&ev).is_ok());
    }

    #[test]
    fn tampered_content_fails_id_check() {
        let mut ev = finalize(unsigned("{}"), &keys()).unwrap();
        ev.content = "{\"x\":1}".into();
        assert_eq!(verify(&ev), Err(Rejection::IdMismatch));
    }

    #[test]
    fn flipped_signature_fails() {
        let mut ev = finalize(unsigned("{}"), &keys()).unwrap();
        let replacement = if ev.sig.starts_with("00") { "11" } else { "00" };
        ev.sig.replace_range(0..2, replacement);
        assert_eq!(verify(&ev), Err(Rejection::BadSignature));
    }

    #[test]
    fn signature_from_other_key_fails() {
        let mut ev = finalize(unsigned("{}"), &keys()).unwrap();
        let other = keypair_from_hex(&"02".repeat(32)).unwrap();
        ev.sig = sign(&ev, &other).unwrap();
        assert_eq!(verify(&ev), Err(Rejection::BadSignature));
    }

    #[test]
    fn bad_secret_rejected() {
        assert!(keypair_from_hex("zz").is_err());
        assert!(keypair_from_hex(&"00".repeat(32)).is_err());
    }
}
