//! A seeded RNG wrapper, one instance owned exclusively by each
//! [`crate::generator::SynthesisGenerator`] worker.

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Wraps a deterministic, seedable RNG behind a fixed concrete type so that
/// callers never need to name the generic RNG type.
///
/// Each [`crate::pipeline::DataPipeline`] worker owns exactly one `Random`,
/// seeded as `base_seed + worker_index`, so that a pipeline run is
/// reproducible given the same base seed and worker count.
pub struct Random {
    seed: u64,
    inner: ChaCha8Rng,
}

impl Random {
    /// Creates a `Random` deterministically seeded from `seed`.
    pub fn seeded(seed: u64) -> Self {
        Random {
            seed,
            inner: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// A fixed-seed RNG for use in tests, so assertions about sampled values
    /// are reproducible.
    pub fn testing() -> Self {
        Random::seeded(0)
    }

    /// The seed this instance was constructed with.
    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl RngCore for Random {
    fn next_u32(&mut self) -> u32 {
        self.inner.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.inner.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.inner.fill_bytes(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.inner.try_fill_bytes(dest)
    }
}
