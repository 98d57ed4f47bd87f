use std::sync::atomic::{AtomicU64, Ordering};

const WEYL_CONSTANT: u64 = 0x9E3779B97F4A7C15;

/// A lock-free, non-cryptographic sampler built on a Weyl sequence.
///
/// Decides which writes also pay for an expiry sweep of their shard.
#[derive(Debug)]
pub(crate) struct FastRng {
  state: AtomicU64,
}

impl FastRng {
  pub(crate) fn new(seed: u64) -> Self {
    Self {
      state: AtomicU64::new(seed.max(1)),
    }
  }

  #[inline]
  fn next(&self) -> u64 {
    // SplitMix64 finalizer over the Weyl state.
    let mut z = self.state.fetch_add(WEYL_CONSTANT, Ordering::Relaxed);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
  }

  /// Returns true with a probability of 1 in `denominator_pow2`.
  #[inline]
  pub(crate) fn should_run(&self, denominator_pow2: u32) -> bool {
    let mask = u64::from(denominator_pow2.max(1) - 1);
    (self.next() & mask) == 0
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn denominator_of_one_always_runs() {
    let rng = FastRng::new(42);
    assert!((0..100).all(|_| rng.should_run(1)));
  }

  #[test]
  fn sampling_rate_is_roughly_one_in_n() {
    let rng = FastRng::new(7);
    let hits = (0..16_000).filter(|_| rng.should_run(16)).count();
    assert!((500..1_500).contains(&hits), "got {hits} hits");
  }
}
