use std::str::FromStr;

use crate::error::ObjectError;

/// How a process obtains its hash seed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HashSeedPolicy {
    /// Use the given seed verbatim. This is the default: archives built
    /// under a fixed seed are reproducible byte for byte.
    Fixed(u64),
    /// Draw a fresh seed at startup, matching hosts that randomize hashing
    /// per process.
    Random,
}

impl HashSeedPolicy {
    /// Resolve the policy into a concrete seed for this process.
    pub fn resolve(self) -> HashSeed {
        match self {
            Self::Fixed(value) => HashSeed(value),
            Self::Random => HashSeed(rand::random()),
        }
    }

    pub fn is_random(self) -> bool {
        matches!(self, Self::Random)
    }
}

impl Default for HashSeedPolicy {
    fn default() -> Self {
        Self::Fixed(0)
    }
}

impl FromStr for HashSeedPolicy {
    type Err = ObjectError;

    /// Accepts `"random"` or a decimal `u64`.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        if text.eq_ignore_ascii_case("random") {
            return Ok(Self::Random);
        }
        text.parse::<u64>()
            .map(Self::Fixed)
            .map_err(|_| ObjectError::InvalidSeed { text: text.into() })
    }
}

impl std::fmt::Display for HashSeedPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fixed(value) => write!(f, "{value}"),
            Self::Random => write!(f, "random"),
        }
    }
}

/// A resolved per-process hash seed.
///
/// The seed keys every value hash, so frozen-set iteration order (and with
/// it the literal set wire layout) shifts whenever the seed does.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HashSeed(u64);

impl HashSeed {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(self) -> u64 {
        self.0
    }

    /// Derive the 32-byte key used for seeded value hashing.
    pub(crate) fn key(self) -> [u8; 32] {
        blake3::derive_key("sharc object hash v1", &self.0.to_le_bytes())
    }
}

impl std::fmt::Display for HashSeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_fixed_seed() {
        let policy: HashSeedPolicy = "12345".parse().unwrap();
        assert_eq!(policy, HashSeedPolicy::Fixed(12345));
        assert_eq!(policy.resolve().value(), 12345);
    }

    #[test]
    fn parse_random_seed() {
        let policy: HashSeedPolicy = "RANDOM".parse().unwrap();
        assert!(policy.is_random());
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("".parse::<HashSeedPolicy>().is_err());
        assert!("-1".parse::<HashSeedPolicy>().is_err());
        assert!("seed".parse::<HashSeedPolicy>().is_err());
    }

    #[test]
    fn display_roundtrip() {
        assert_eq!(HashSeedPolicy::Fixed(7).to_string(), "7");
        assert_eq!(HashSeedPolicy::Random.to_string(), "random");
    }

    #[test]
    fn distinct_seeds_derive_distinct_keys() {
        assert_ne!(HashSeed::new(1).key(), HashSeed::new(2).key());
    }
}
