use parking_lot::Mutex;
use rand::{Rng as _, SeedableRng as _};
use rand_xoshiro::Xoshiro256StarStar;

/// Per-occurrence sampling decisions.
///
/// A sample rate of `1` (or greater), or no sample rate at all, always passes without consulting the random number
/// generator. A sample rate of `0` (or lower, or NaN) never passes. Any other rate passes when a uniform draw from
/// `[0, 1)` is less than or equal to the rate, with each draw independent of the last.
pub(crate) struct Sampler {
    rng: Mutex<Xoshiro256StarStar>,
}

impl Sampler {
    /// Creates a new `Sampler` seeded from the thread-local random number generator.
    pub fn new() -> Self {
        Self { rng: Mutex::new(Xoshiro256StarStar::from_rng(&mut rand::rng())) }
    }

    /// Creates a new `Sampler` with a fixed seed.
    pub fn with_seed(seed: u64) -> Self {
        Self { rng: Mutex::new(Xoshiro256StarStar::seed_from_u64(seed)) }
    }

    /// Returns `true` if an occurrence with the given sample rate should be emitted.
    pub fn sample(&self, sample_rate: Option<f64>) -> bool {
        match sample_rate {
            None => true,
            Some(rate) if rate >= 1.0 => true,
            Some(rate) if rate.is_nan() || rate <= 0.0 => false,
            Some(rate) => self.rng.lock().random::<f64>() <= rate,
        }
    }
}
