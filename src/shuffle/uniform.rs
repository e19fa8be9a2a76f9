use rand::seq::SliceRandom;

/// Fresh uniform permutation on every call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UniformShuffle;

impl UniformShuffle {
    pub fn shuffle<T>(&self, mut items: Vec<T>) -> Vec<T> {
        items.shuffle(&mut rand::rng());
        items
    }
}
