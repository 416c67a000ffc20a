use xxhash_rust::xxh3::xxh3_64_with_seed;

const XXH3_SEED: u64 = 0x7e1e_ca57_5eed_0001;

/// Stable 64-bit seed for a textual seed (pool path, `--seed` value, ...).
///
/// xxh3 output is fixed by the algorithm, so the same string maps to the same seed on every
/// platform and release.
pub fn seed_from_str(s: &str) -> u64 {
    xxh3_64_with_seed(s.as_bytes(), XXH3_SEED)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rng64 {
    state: u64,
}

impl Rng64 {
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    pub fn from_str_seed(seed: &str) -> Self {
        Self::new(seed_from_str(seed))
    }

    pub fn next_u64(&mut self) -> u64 {
        // SplitMix64
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Uniform index in `[0, n)` via multiply-high range reduction. `n` must be non-zero.
    pub fn below(&mut self, n: usize) -> usize {
        debug_assert!(n > 0);
        let wide = u128::from(self.next_u64()).wrapping_mul(n as u128);
        (wide >> 64) as usize
    }

    /// In-place Fisher–Yates.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.below(i + 1);
            items.swap(i, j);
        }
    }
}
