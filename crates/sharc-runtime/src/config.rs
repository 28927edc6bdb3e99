//! Runtime configuration.
//!
//! Everything is driven by `SHARC_*` environment variables so the archive
//! machinery can be switched on under an unmodified host program; callers
//! with their own surface (the command line, tests) fill the same struct
//! directly.

use std::path::PathBuf;
use std::str::FromStr;

use sharc_archive::ArchiveStamp;
use sharc_codec::SetLayout;
use sharc_object::HashSeedPolicy;

use crate::builder::ConflictPolicy;
use crate::error::{RuntimeError, RuntimeResult};

pub const DEFAULT_ARCHIVE: &str = "modules.sharc";
pub const DEFAULT_LIST: &str = "modules.lst";

const ENV_MODE: &str = "SHARC_MODE";
const ENV_ARCHIVE: &str = "SHARC_ARCHIVE";
const ENV_LIST: &str = "SHARC_LIST";
const ENV_DUMP_LIST: &str = "SHARC_DUMP_LIST";
const ENV_VERBOSE: &str = "SHARC_VERBOSE";
const ENV_SEED: &str = "SHARC_SEED";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Build an archive from a recorded module list.
    Dump,
    /// Map an archive and serve imports from it.
    Share,
    /// Serialize one literal into a single-record archive.
    DebugDump,
    /// Load the single record back and print its repr.
    DebugLoad,
}

impl FromStr for Mode {
    type Err = RuntimeError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match text {
            "dump" => Ok(Self::Dump),
            "share" => Ok(Self::Share),
            "debug-dump" => Ok(Self::DebugDump),
            "debug-load" => Ok(Self::DebugLoad),
            other => Err(RuntimeError::Config { reason: format!("unknown mode {other:?}") }),
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dump => write!(f, "dump"),
            Self::Share => write!(f, "share"),
            Self::DebugDump => write!(f, "debug-dump"),
            Self::DebugLoad => write!(f, "debug-load"),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct RuntimeConfig {
    /// `None` means plain imports with no archive involvement.
    pub mode: Option<Mode>,
    pub archive: Option<PathBuf>,
    pub list: Option<PathBuf>,
    /// Record every import of the run into this list file.
    pub dump_list: Option<PathBuf>,
    pub verbose: u8,
    pub seed: HashSeedPolicy,
    /// Explicit set layout for dumps. When absent, sets are canonicalized.
    pub set_layout: Option<SetLayout>,
    pub conflicts: ConflictPolicy,
}

impl RuntimeConfig {
    /// Read the `SHARC_*` variables from the process environment.
    pub fn from_env() -> RuntimeResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> RuntimeResult<Self> {
        let mut config = Self::default();
        if let Some(text) = lookup(ENV_MODE) {
            config.mode = Some(text.parse()?);
        }
        if let Some(text) = lookup(ENV_ARCHIVE) {
            config.archive = Some(PathBuf::from(text));
        }
        if let Some(text) = lookup(ENV_LIST) {
            config.list = Some(PathBuf::from(text));
        }
        if let Some(text) = lookup(ENV_DUMP_LIST) {
            config.dump_list = Some(PathBuf::from(text));
        }
        if let Some(text) = lookup(ENV_VERBOSE) {
            config.verbose = text.parse().map_err(|_| RuntimeError::Config {
                reason: format!("{ENV_VERBOSE} must be a small integer, got {text:?}"),
            })?;
        }
        if let Some(text) = lookup(ENV_SEED) {
            config.seed = text
                .parse()
                .map_err(|e| RuntimeError::Config { reason: format!("{ENV_SEED}: {e}") })?;
        }
        Ok(config)
    }

    pub fn archive_path(&self) -> PathBuf {
        self.archive.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_ARCHIVE))
    }

    pub fn list_path(&self) -> PathBuf {
        self.list.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_LIST))
    }

    /// Layout frozen sets get in a dump. Canonical unless asked otherwise,
    /// whatever the seed policy, so archives stay seed-portable.
    pub fn build_set_layout(&self) -> SetLayout {
        self.set_layout.unwrap_or_default()
    }

    /// Stamp for a dump started now. Resolves the seed policy, so under
    /// the random policy each call stamps a fresh seed.
    pub fn stamp(&self) -> ArchiveStamp {
        ArchiveStamp {
            seed_policy: self.seed,
            seed: self.seed.resolve(),
            set_layout: self.build_set_layout(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> RuntimeResult<RuntimeConfig> {
        let owned: Vec<(String, String)> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        RuntimeConfig::from_lookup(move |key| {
            owned.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
        })
    }

    #[test]
    fn defaults_are_inert() {
        let config = from_pairs(&[]).unwrap();
        assert_eq!(config.mode, None);
        assert_eq!(config.verbose, 0);
        assert_eq!(config.seed, HashSeedPolicy::Fixed(0));
        assert_eq!(config.build_set_layout(), SetLayout::Canonical);
        assert_eq!(config.archive_path(), PathBuf::from(DEFAULT_ARCHIVE));
        assert_eq!(config.list_path(), PathBuf::from(DEFAULT_LIST));
        assert!(config.dump_list.is_none());
    }

    #[test]
    fn every_mode_parses() {
        for (text, mode) in [
            ("dump", Mode::Dump),
            ("share", Mode::Share),
            ("debug-dump", Mode::DebugDump),
            ("debug-load", Mode::DebugLoad),
        ] {
            let config = from_pairs(&[("SHARC_MODE", text)]).unwrap();
            assert_eq!(config.mode, Some(mode));
            assert_eq!(mode.to_string(), text);
        }
        assert!(from_pairs(&[("SHARC_MODE", "replay")]).is_err());
    }

    #[test]
    fn paths_and_verbosity_flow_through() {
        let config = from_pairs(&[
            ("SHARC_ARCHIVE", "/tmp/a.sharc"),
            ("SHARC_LIST", "/tmp/mods.lst"),
            ("SHARC_DUMP_LIST", "/tmp/out.lst"),
            ("SHARC_VERBOSE", "2"),
        ])
        .unwrap();
        assert_eq!(config.archive_path(), PathBuf::from("/tmp/a.sharc"));
        assert_eq!(config.list_path(), PathBuf::from("/tmp/mods.lst"));
        assert_eq!(config.dump_list, Some(PathBuf::from("/tmp/out.lst")));
        assert_eq!(config.verbose, 2);

        let err = from_pairs(&[("SHARC_VERBOSE", "loud")]).unwrap_err();
        assert!(err.to_string().contains("SHARC_VERBOSE"));
    }

    #[test]
    fn seed_policy_parses() {
        let config = from_pairs(&[("SHARC_SEED", "42")]).unwrap();
        assert_eq!(config.seed, HashSeedPolicy::Fixed(42));

        let config = from_pairs(&[("SHARC_SEED", "random")]).unwrap();
        assert!(config.seed.is_random());

        assert!(from_pairs(&[("SHARC_SEED", "lucky")]).is_err());
    }

    #[test]
    fn explicit_set_layout_wins() {
        let config = RuntimeConfig {
            set_layout: Some(SetLayout::Literal),
            ..RuntimeConfig::default()
        };
        assert_eq!(config.build_set_layout(), SetLayout::Literal);
        assert_eq!(config.stamp().set_layout, SetLayout::Literal);
    }

    #[test]
    fn stamp_resolves_the_seed() {
        let config =
            RuntimeConfig { seed: HashSeedPolicy::Fixed(9), ..RuntimeConfig::default() };
        let stamp = config.stamp();
        assert_eq!(stamp.seed.value(), 9);
        assert_eq!(stamp.seed_policy, HashSeedPolicy::Fixed(9));
    }
}
