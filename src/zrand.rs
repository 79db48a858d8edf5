//! The Z-machine's `random` opcode PRNG.
//!
//! Mirrors the `random N` semantics from spec.md §4.7/§8: positive range
//! draws uniformly from `1..=range`, a non-positive range reseeds and
//! returns 0.

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

pub enum RandMode {
    Predictable,
    RandomUniform,
}

pub struct ZRand {
    rng: Box<dyn RngCore + Send>,
    mode: RandMode,
}

impl ZRand {
    pub fn new_uniform() -> ZRand {
        ZRand {
            rng: Box::new(rand::thread_rng()),
            mode: RandMode::RandomUniform,
        }
    }

    pub fn new_predictable(seed: u64) -> ZRand {
        ZRand {
            rng: Box::new(StdRng::seed_from_u64(seed)),
            mode: RandMode::Predictable,
        }
    }

    pub fn mode(&self) -> &RandMode {
        &self.mode
    }

    /// Reseed from a story-supplied seed (`random -n`).
    pub fn reseed(&mut self, seed: u64) {
        self.rng = Box::new(StdRng::seed_from_u64(seed));
        self.mode = RandMode::Predictable;
    }

    /// Reseed from host entropy (`random 0`).
    pub fn reseed_from_entropy(&mut self) {
        self.rng = Box::new(rand::thread_rng());
        self.mode = RandMode::RandomUniform;
    }

    /// Implements the `random range` opcode for `range > 0`: uniform in
    /// `1..=range`.
    pub fn next_in_range(&mut self, range: u16) -> u16 {
        if range == 0 {
            return 0;
        }
        self.rng.gen_range(1..=range)
    }
}
