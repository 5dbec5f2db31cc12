use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};

// Session RNG: entropy-seeded by default, or derived from a seed phrase
// phrase -> SHA-256 -> 32-byte StdRng seed, so a whole session can be replayed

pub fn derive_hash_hex(input: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input);
    hex::encode(hasher.finalize())
}

pub fn derive_seed(phrase: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(phrase.as_bytes());
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

#[derive(Debug, Clone)]
pub struct SpinRng {
    inner: StdRng,
}

impl SpinRng {
    pub fn from_entropy() -> Self {
        Self {
            inner: StdRng::from_entropy(),
        }
    }

    pub fn from_seed_phrase(phrase: &str) -> Self {
        Self {
            inner: StdRng::from_seed(derive_seed(phrase)),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            inner: StdRng::seed_from_u64(seed),
        }
    }

    /// Uniform index in `0..len`, or `None` for an empty range.
    pub fn pick_index(&mut self, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }
        Some(self.inner.gen_range(0..len))
    }

    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        self.pick_index(items.len()).map(|i| &items[i])
    }

    /// Unbiased Fisher-Yates permutation of a copy of `items`.
    pub fn shuffled<T: Clone>(&mut self, items: &[T]) -> Vec<T> {
        let mut out = items.to_vec();
        out.shuffle(&mut self.inner);
        out
    }
}

impl Default for SpinRng {
    fn default() -> Self {
        Self::from_entropy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_phrase_determinism() {
        let mut rng1 = SpinRng::from_seed_phrase("niko-vs-safwan");
        let mut rng2 = SpinRng::from_seed_phrase("niko-vs-safwan");
        let items: Vec<u32> = (0..20).collect();
        assert_eq!(rng1.shuffled(&items), rng2.shuffled(&items));
        assert_eq!(rng1.pick_index(40), rng2.pick_index(40));
    }

    #[test]
    fn test_pick_empty() {
        let mut rng = SpinRng::seeded(1);
        let empty: [u8; 0] = [];
        assert_eq!(rng.pick_index(0), None);
        assert!(rng.pick(&empty).is_none());
    }

    #[test]
    fn test_shuffle_is_permutation() {
        let mut rng = SpinRng::seeded(9);
        let items: Vec<u32> = (0..40).collect();
        let mut out = rng.shuffled(&items);
        out.sort();
        assert_eq!(out, items);
    }

    #[test]
    fn test_hash_hex_stable() {
        assert_eq!(derive_hash_hex(b"seed"), derive_hash_hex(b"seed"));
        assert_eq!(derive_hash_hex(b"seed").len(), 64);
    }
}
