use log::debug;
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Random source for the `random` opcode: uniform from entropy until the
/// story seeds it, then a repeatable sequence
pub struct ZRand {
    rng: StdRng,
}

impl ZRand {
    pub fn new_uniform() -> ZRand {
        ZRand {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn new_predictable(seed: u64) -> ZRand {
        ZRand {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Switch to a predictable sequence
    pub fn seed(&mut self, seed: u64) {
        debug!("Random generator seeded with {}", seed);
        *self = ZRand::new_predictable(seed);
    }

    /// Switch back to an unpredictable sequence
    pub fn reseed(&mut self) {
        debug!("Random generator reseeded from entropy");
        *self = ZRand::new_uniform();
    }

    /// Uniform value in 1..=range
    pub fn gen_range(&mut self, range: u16) -> u16 {
        self.rng.gen_range(1..=range.max(1))
    }
}
