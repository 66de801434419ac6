// src/exam/selector.rs

use std::sync::Mutex;

use rand::{RngCore, SeedableRng, rngs::StdRng, seq::SliceRandom};

use crate::models::question::Question;

/// Source of randomness for question selection and certificate numbers.
pub trait EntropySource: Send + Sync {
    /// Hands out a fresh generator for one operation.
    fn rng(&self) -> StdRng;
}

/// Production entropy: every generator is seeded from the OS.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn rng(&self) -> StdRng {
        StdRng::from_os_rng()
    }
}

/// Deterministic entropy: the same seed yields the same sequence of
/// generators, and therefore the same selections.
pub struct SeededEntropy {
    root: Mutex<StdRng>,
}

impl SeededEntropy {
    pub fn new(seed: u64) -> Self {
        Self {
            root: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl EntropySource for SeededEntropy {
    fn rng(&self) -> StdRng {
        let mut root = self
            .root
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        StdRng::seed_from_u64(root.next_u64())
    }
}

/// Picks `requested` questions from `pool` in random order.
///
/// The whole pool is shuffled (Fisher-Yates, every permutation equally
/// likely) and truncated, so a pool no larger than `requested` comes back
/// complete but still in random order.
pub fn select<R: RngCore + ?Sized>(
    mut pool: Vec<Question>,
    requested: usize,
    rng: &mut R,
) -> Vec<Question> {
    pool.shuffle(rng);
    pool.truncate(requested);
    pool
}
