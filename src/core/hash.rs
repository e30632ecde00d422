//! State Hashing for Verification
//!
//! Provides deterministic hashing of engine-produced game state for:
//! - Comparing a from-scratch replay against incremental processing
//! - Logging a compact fingerprint of the current board

use sha2::{Sha256, Digest};

use crate::game::GameState;

/// Hash output type (256 bits / 32 bytes)
pub type StateHash = [u8; 32];

/// Deterministic hasher for game state.
///
/// Wraps SHA-256 with a domain separator.
/// Order of updates is critical for determinism.
pub struct StateHasher {
    hasher: Sha256,
}

impl StateHasher {
    /// Create a new hasher with domain separator.
    pub fn new(domain: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(domain);
        Self { hasher }
    }

    /// Create hasher for game state.
    pub fn for_game_state() -> Self {
        Self::new(b"TANK_GAME_STATE_V1")
    }

    /// Update with raw bytes.
    #[inline]
    pub fn update_bytes(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    /// Update with a u64 value (little-endian).
    #[inline]
    pub fn update_u64(&mut self, value: u64) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Update with a JSON value in canonical form.
    ///
    /// `serde_json::Map` keeps keys sorted, so the compact rendering is
    /// stable for equal values.
    pub fn update_json(&mut self, value: &serde_json::Value) {
        let rendered = value.to_string();
        self.update_u64(rendered.len() as u64);
        self.update_bytes(rendered.as_bytes());
    }

    /// Finalize and return the hash.
    pub fn finalize(self) -> StateHash {
        self.hasher.finalize().into()
    }
}

/// Compute the fingerprint of a single game state.
pub fn state_hash(state: &GameState) -> StateHash {
    let mut hasher = StateHasher::for_game_state();
    hasher.update_json(state);
    hasher.finalize()
}

/// Short hex prefix of a hash, for log lines.
pub fn short_hex(hash: &StateHash) -> String {
    hex::encode(&hash[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_state_hash_determinism() {
        let state = json!({ "board": { "tanks": [1, 2, 3] }, "day": 4 });

        assert_eq!(state_hash(&state), state_hash(&state.clone()));
    }

    #[test]
    fn test_key_order_does_not_matter() {
        let a: GameState = serde_json::from_str(r#"{"a": 1, "b": 2}"#).unwrap();
        let b: GameState = serde_json::from_str(r#"{"b": 2, "a": 1}"#).unwrap();

        assert_eq!(state_hash(&a), state_hash(&b));
    }

    #[test]
    fn test_different_states_differ() {
        assert_ne!(state_hash(&json!({ "v": 1 })), state_hash(&json!({ "v": 2 })));
    }

    #[test]
    fn test_domain_separation() {
        let data = [1u8, 2, 3, 4];

        let hash = |domain: &[u8]| {
            let mut h = StateHasher::new(domain);
            h.update_bytes(&data);
            h.finalize()
        };

        assert_ne!(hash(b"DOMAIN_A"), hash(b"DOMAIN_B"));
    }

    #[test]
    fn test_short_hex() {
        let hash = [0xab; 32];
        assert_eq!(short_hex(&hash), "abababababababab");
    }
}
