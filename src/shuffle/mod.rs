//! Ordering of items before they are enqueued for playback.

pub mod miller;
mod uniform;

use serde::Deserialize;

use crate::config::ShuffleConfig;

pub use miller::MillerShuffle;
pub use uniform::UniformShuffle;

/// Which shuffle to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ShuffleStrategy {
    /// Fresh random permutation every time
    #[default]
    Uniform,
    /// Reproducible permutation derived from a seed
    Miller,
}

/// A configured shuffle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shuffler {
    Uniform(UniformShuffle),
    Miller(MillerShuffle),
}

impl Shuffler {
    /// Build from config; a Miller shuffle without a fixed seed draws one
    pub fn from_config(config: &ShuffleConfig) -> Self {
        Self::new(config.strategy, config.seed)
    }

    pub fn new(strategy: ShuffleStrategy, seed: Option<u64>) -> Self {
        match strategy {
            ShuffleStrategy::Uniform => Self::Uniform(UniformShuffle),
            ShuffleStrategy::Miller => Self::Miller(
                seed.map(MillerShuffle::new)
                    .unwrap_or_else(MillerShuffle::random),
            ),
        }
    }

    /// The seed in use, if the order is reproducible
    pub fn seed(&self) -> Option<u64> {
        match self {
            Self::Uniform(_) => None,
            Self::Miller(miller) => Some(miller.seed()),
        }
    }

    pub fn shuffle<T>(&self, items: Vec<T>) -> Vec<T> {
        match self {
            Self::Uniform(uniform) => uniform.shuffle(items),
            Self::Miller(miller) => miller.shuffle(items),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_selects_strategy() {
        let config = ShuffleConfig {
            strategy: ShuffleStrategy::Miller,
            seed: Some(42),
        };

        let shuffler = Shuffler::from_config(&config);
        assert_eq!(shuffler, Shuffler::Miller(MillerShuffle::new(42)));
        assert_eq!(shuffler.seed(), Some(42));
    }

    #[test]
    fn default_is_uniform_without_seed() {
        let shuffler = Shuffler::from_config(&ShuffleConfig::default());
        assert_eq!(shuffler, Shuffler::Uniform(UniformShuffle));
        assert_eq!(shuffler.seed(), None);
    }

    #[test]
    fn seeded_shuffler_applies_known_order() {
        let shuffler = Shuffler::new(ShuffleStrategy::Miller, Some(42));
        let items: Vec<char> = "abcdefghij".chars().collect();

        let shuffled: String = shuffler.shuffle(items).into_iter().collect();
        assert_eq!(shuffled, "cfhaeigdjb");
    }
}
