use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hasher};

/// Linear-congruential stream used for treap priorities and skip-list levels.
///
/// x ← 1664525·x + 1013904223 (mod 2^32). Each map owns its own stream so
/// that operations on one map never perturb the level/priority sequence of
/// another.
#[derive(Clone, Copy)]
pub(crate) struct Lcg32 {
    state: u32,
}

impl Lcg32 {
    pub(crate) fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    /// Seeds from process-local entropy; `new` gives a deterministic stream.
    pub(crate) fn from_entropy() -> Self {
        let sample = RandomState::new().build_hasher().finish();
        Self::new((sample ^ (sample >> 32)) as u32)
    }

    pub(crate) fn next_u32(&mut self) -> u32 {
        self.state = self.state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::Lcg32;

    #[test]
    fn known_sequence() {
        let mut rng = Lcg32::new(0);
        assert_eq!(rng.next_u32(), 1_013_904_223);
        assert_eq!(rng.next_u32(), 1_196_435_762);
    }

    #[test]
    fn entropy_streams_differ() {
        let mut a = Lcg32::from_entropy();
        let mut b = Lcg32::from_entropy();
        let sa: Vec<u32> = (0..8).map(|_| a.next_u32()).collect();
        let sb: Vec<u32> = (0..8).map(|_| b.next_u32()).collect();
        assert_ne!(sa, sb);
    }
}
