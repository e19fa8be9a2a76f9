//! Deterministic index scrambling after Miller's shuffle algorithm.
//!
//! Each output position `i` takes `items[s(i)]`, where `s` is a seeded
//! bijection on `[0, n)` built from modular spin-mixing and XOR folds. The
//! same seed and size always yield the same order.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

const P1: u64 = 24317;
const P2: u64 = 32141;
const P3: u64 = 63629;

/// Scramble `index` for a list of `len` items under `seed`
///
/// Returns `None` for an empty list. Indices at or beyond `len` fold the
/// overflow into the seed, so they map to a different permutation.
pub fn scrambled_index(index: u64, seed: u64, len: u64) -> Option<u64> {
    if len == 0 {
        return None;
    }

    let seed = seed.wrapping_add(131u64.wrapping_mul(index / len));
    let n = u128::from(len);

    // cut the deck
    let mut si = (u128::from(index) + u128::from(seed)) % n;

    let r1 = u128::from(seed % P1 + 42);
    let r2 = u128::from((seed.wrapping_mul(0x89) ^ (seed % P1 + 42)) % P2);
    let r3 = (r1 + r2 + u128::from(P3)) % n;
    let r4 = r1 ^ r2 ^ r3;
    let rx = u128::from((seed / len) % len + 1);
    let rx2 = u128::from((seed / len / len) % len + 1);

    let (p1, p2, p3) = (u128::from(P1), u128::from(P2), u128::from(P3));

    if si % 3 == 0 {
        si = ((si / 3) * p1 + r1) % n.div_ceil(3) * 3;
    }
    if si % 2 == 0 {
        si = ((si / 2) * p2 + r2) % n.div_ceil(2) * 2;
    }
    if si < n / 2 {
        si = (si * p3 + r4) % (n / 2);
    }

    if (si ^ rx) < n {
        si ^= rx;
    }
    si = (si * p3 + r3) % n;
    if (si ^ rx2) < n {
        si ^= rx2;
    }

    Some(si as u64)
}

/// Whether [`scrambled_index`] is a bijection for lists of `len` items
///
/// Every mixing step is a bijection as long as its modulus shares no factor
/// with the prime it multiplies by. That always holds below 63629 items.
pub fn is_bijective_len(len: u64) -> bool {
    len.div_ceil(3) % P1 != 0
        && len.div_ceil(2) % P2 != 0
        && (len / 2 == 0 || (len / 2) % P3 != 0)
        && len % P3 != 0
}

/// Seeded, reproducible shuffle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MillerShuffle {
    seed: u64,
}

impl MillerShuffle {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Draw a fresh session seed
    pub fn random() -> Self {
        Self::new(rand::random())
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// The permutation applied to a list of `len` items
    ///
    /// Position `i` of the output takes the input at `order[i]`.
    pub fn order(&self, len: usize) -> Vec<usize> {
        let n = len as u64;
        if is_bijective_len(n) {
            return (0..n)
                .filter_map(|i| scrambled_index(i, self.seed, n))
                .map(|si| si as usize)
                .collect();
        }

        // Sizes sharing a factor with the mixing primes would collide;
        // fall back to Fisher-Yates driven by the same seed.
        let mut order: Vec<usize> = (0..len).collect();
        order.shuffle(&mut StdRng::seed_from_u64(self.seed));
        order
    }

    pub fn shuffle<T>(&self, items: Vec<T>) -> Vec<T> {
        if items.len() <= 1 {
            return items;
        }

        let order = self.order(items.len());
        let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
        order
            .into_iter()
            .filter_map(|index| slots[index].take())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    const SEEDS: [u64; 6] = [0, 1, 42, 12345, 0xDEAD_BEEF_CAFE_F00D, u64::MAX];

    #[test]
    fn empty_list_has_no_index() {
        assert_eq!(scrambled_index(0, 42, 0), None);
    }

    #[test]
    fn single_item_maps_to_itself() {
        for seed in SEEDS {
            assert_eq!(scrambled_index(0, seed, 1), Some(0));
        }
    }

    #[test]
    fn known_order_for_fixed_seed() {
        let order: Vec<u64> = (0..10)
            .map(|i| scrambled_index(i, 42, 10).unwrap())
            .collect();

        assert_eq!(order, vec![2, 5, 7, 0, 4, 8, 6, 3, 9, 1]);
    }

    #[test]
    fn scramble_is_injective_for_small_sizes() {
        for n in 1..=300u64 {
            for seed in SEEDS {
                let seen: HashSet<u64> = (0..n)
                    .map(|i| scrambled_index(i, seed, n).unwrap())
                    .collect();
                assert_eq!(seen.len() as u64, n, "collision for n={n} seed={seed}");
                assert!(seen.iter().all(|&si| si < n));
            }
        }
    }

    #[test]
    fn scramble_is_injective_for_larger_sizes() {
        for n in [1000u64, 4096, 5000] {
            let seen: HashSet<u64> = (0..n)
                .map(|i| scrambled_index(i, 987_654_321, n).unwrap())
                .collect();
            assert_eq!(seen.len() as u64, n);
        }
    }

    #[test]
    fn same_seed_gives_same_order() {
        let a = MillerShuffle::new(7).shuffle((0..50).collect::<Vec<_>>());
        let b = MillerShuffle::new(7).shuffle((0..50).collect::<Vec<_>>());
        assert_eq!(a, b);
    }

    #[test]
    fn shuffle_keeps_every_element() {
        let input: Vec<String> = (0..37).map(|i| format!("episode-{i}")).collect();
        let mut output = MillerShuffle::random().shuffle(input.clone());

        assert_eq!(output.len(), input.len());
        output.sort();
        let mut expected = input;
        expected.sort();
        assert_eq!(output, expected);
    }

    #[test]
    fn bijective_range_limits() {
        assert!(is_bijective_len(1));
        assert!(is_bijective_len(63628));
        assert!(!is_bijective_len(63629));
        assert!(!is_bijective_len(2 * 32141));
    }

    #[test]
    fn fallback_sizes_still_permute() {
        let n = 63629;
        let order = MillerShuffle::new(3).order(n);
        let seen: HashSet<usize> = order.iter().copied().collect();

        assert_eq!(seen.len(), n);
        assert_eq!(order, MillerShuffle::new(3).order(n));
    }
}
