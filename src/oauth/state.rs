//! OAuth `state` parameter for CSRF protection.
//!
//! One state is generated per authorization attempt, compared once by the
//! callback listener, then discarded. It is never persisted.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::Rng;

/// Random bytes per state (encodes to 43 URL-safe characters)
const STATE_BYTES: usize = 32;

/// Generates a fresh, URL-safe, unguessable state token.
pub fn generate_state() -> String {
    let bytes: [u8; STATE_BYTES] = rand::thread_rng().gen();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Compares a received state against the expected one without short-circuiting
/// on the first differing byte.
pub fn states_match(expected: &str, received: &str) -> bool {
    let (a, b) = (expected.as_bytes(), received.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_state_is_url_safe() {
        let state = generate_state();
        assert_eq!(state.len(), 43);
        assert!(state
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_eq!(urlencoding::encode(&state), state);
    }

    #[test]
    fn test_states_are_unique() {
        let states: HashSet<String> = (0..1000).map(|_| generate_state()).collect();
        assert_eq!(states.len(), 1000);
    }

    #[test]
    fn test_states_match() {
        let state = generate_state();
        assert!(states_match(&state, &state.clone()));
        assert!(!states_match(&state, &generate_state()));
        assert!(!states_match("abc", "abcd"));
        assert!(!states_match("abc", ""));
    }
}
