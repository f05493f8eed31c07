//! `starkguard.toml` configuration.
//!
//! Every field has a default, so an absent file and an empty file behave the
//! same. Command-line flags and `STARKGUARD_*` environment variables are
//! layered on top by the binary.

use crate::compare::DEFAULT_THRESHOLD_PERCENT;
use crate::error::{Error, Result};
use crate::pipeline::DEFAULT_TEST_NAME;
use crate::types::{Digest, ProveInput};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "starkguard.toml";

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Record store directory.
    pub store_dir: PathBuf,
    /// Verdict threshold in percent.
    pub threshold_percent: f64,
    /// Label stamped on captured records.
    pub test_name: String,
    /// Worker threads for `verify-all`.
    pub jobs: usize,
    /// Default proving input.
    pub input: InputConfig,
    /// Reference engine knobs.
    pub engine: EngineConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from(".starkguard"),
            threshold_percent: DEFAULT_THRESHOLD_PERCENT,
            test_name: DEFAULT_TEST_NAME.to_owned(),
            jobs: 1,
            input: InputConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

/// `[input]` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InputConfig {
    /// Block count.
    pub length: u64,
    /// Block commitment digest.
    pub block_commitment: Digest,
    /// Nonce digest.
    pub nonce: Digest,
}

impl Default for InputConfig {
    fn default() -> Self {
        let d = ProveInput::default();
        Self {
            length: d.length,
            block_commitment: d.block_commitment,
            nonce: d.nonce,
        }
    }
}

impl From<InputConfig> for ProveInput {
    fn from(c: InputConfig) -> Self {
        Self::new(c.length, c.block_commitment, c.nonce)
    }
}

/// `[engine]` table for the reference engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Extra hashing rounds per codeword (simulated work).
    pub grind_rounds: u32,
    /// Domain separation salt; changing it changes every proof.
    pub salt: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            grind_rounds: 1024,
            salt: String::new(),
        }
    }
}

impl Config {
    /// Load configuration.
    ///
    /// With `Some(path)` the file must exist. With `None`, [`DEFAULT_CONFIG_FILE`]
    /// is read if present and defaults are used otherwise.
    ///
    /// # Errors
    /// [`Error::Io`] on read failure, [`Error::Config`] on bad TOML or values.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let p = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !p.exists() {
                    return Ok(Self::default());
                }
                p
            }
        };
        let text = std::fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
        let cfg = Self::from_toml_str(&text)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        tracing::debug!(config = %path.display(), "configuration loaded");
        Ok(cfg)
    }

    /// Parse and validate TOML text.
    ///
    /// # Errors
    /// [`Error::Config`] on syntax errors, unknown keys or invalid values.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check value ranges.
    ///
    /// # Errors
    /// [`Error::Config`] naming the offending key.
    pub fn validate(&self) -> Result<()> {
        if !self.threshold_percent.is_finite() || self.threshold_percent <= 0.0 {
            return Err(Error::Config(format!(
                "threshold_percent must be a positive number, got {}",
                self.threshold_percent
            )));
        }
        if self.jobs == 0 {
            return Err(Error::Config("jobs must be at least 1".into()));
        }
        if self.input.length == 0 {
            return Err(Error::Config("input.length must be at least 1".into()));
        }
        if self.test_name.trim().is_empty() {
            return Err(Error::Config("test_name must not be empty".into()));
        }
        Ok(())
    }

    /// Default proving input.
    #[must_use]
    pub fn prove_input(&self) -> ProveInput {
        self.input.into()
    }
}
