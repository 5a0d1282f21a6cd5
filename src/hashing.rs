//! Stable 64-bit identifiers for endpoints and sessions.
//!
//! The seed is chosen once per process, so equal strings map to equal ids
//! for the lifetime of the client but are not portable across runs.

use std::collections::hash_map::RandomState;
use std::hash::BuildHasher;
use std::sync::OnceLock;

static SEED: OnceLock<RandomState> = OnceLock::new();

pub(crate) fn stable_hash(s: &str) -> u64 {
    SEED.get_or_init(RandomState::new).hash_one(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_input_same_hash() {
        assert_eq!(stable_hash("node-1:2136"), stable_hash("node-1:2136"));
    }

    #[test]
    fn test_different_inputs_differ() {
        // Not a guarantee in theory, but a 64-bit collision between two
        // fixed strings would be remarkable.
        assert_ne!(stable_hash("node-1:2136"), stable_hash("node-2:2136"));
    }
}
