//! YAML configuration.
//!
//! Every field has a default, so an empty file (or no file at all) is a
//! valid configuration. Lookup order is the explicit path, then
//! `tierscan.yaml` / `.tierscan.yaml` in the working directory, then the
//! same names in the user configuration directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use directories::ProjectDirs;
use serde::{Deserialize, Deserializer, Serialize};

use crate::cache::{DEFAULT_MAX_ENTRIES, DEFAULT_TTL};
use crate::detect::DetectorsConfig;
use crate::parser::{ManagerOptions, NativeConfig};
use crate::scan::WalkOptions;

/// File names searched for, in order.
pub const CONFIG_FILE_NAMES: &[&str] = &["tierscan.yaml", ".tierscan.yaml"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scan: ScanConfig,
    pub cache: CacheConfig,
    pub parser: ParserConfig,
    pub detectors: DetectorsConfig,
}

/// What to walk and how many workers to use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Glob patterns to exclude, relative to each scanned root.
    pub exclude: Vec<String>,
    pub extensions: Vec<String>,
    pub include_tests: bool,
    /// Bytes, or a size such as `"10MB"`.
    #[serde(deserialize_with = "deserialize_size")]
    pub max_file_size: u64,
    /// Worker threads; 0 means available parallelism.
    pub workers: usize,
    pub follow_links: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        let walk = WalkOptions::default();
        Self {
            exclude: walk.exclude,
            extensions: walk.extensions,
            include_tests: walk.include_tests,
            max_file_size: walk.max_file_size,
            workers: 0,
            follow_links: walk.follow_links,
        }
    }
}

impl ScanConfig {
    pub fn walk_options(&self) -> WalkOptions {
        WalkOptions {
            exclude: self.exclude.clone(),
            extensions: self.extensions.clone(),
            include_tests: self.include_tests,
            max_file_size: self.max_file_size,
            follow_links: self.follow_links,
        }
    }

    /// Configured worker count, or the host's parallelism when unset.
    pub fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            ttl_secs: DEFAULT_TTL.as_secs(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    pub native: NativeConfig,
    pub disable_native: bool,
    pub disable_heuristic: bool,
}

impl ParserConfig {
    /// Whether the process-wide manager (built with default options) can
    /// serve this configuration.
    pub fn is_default(&self) -> bool {
        *self == ParserConfig::default()
    }

    pub fn manager_options(&self) -> ManagerOptions {
        ManagerOptions {
            native: self.native.clone(),
            disable_native: self.disable_native,
            disable_heuristic: self.disable_heuristic,
            ..ManagerOptions::default()
        }
    }
}

impl Config {
    /// Parse a YAML document.
    pub fn from_yaml(text: &str) -> anyhow::Result<Self> {
        // serde_yaml maps an empty document to unit, not to a struct.
        if text.trim().is_empty() {
            return Ok(Config::default());
        }
        let config: Config = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn parse_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("invalid config {}", path.display()))
    }

    /// Load `explicit` if given, else the first discovered file, else defaults.
    /// Returns the file actually used.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            return Ok((Self::parse_file(path)?, Some(path.to_path_buf())));
        }
        match discover() {
            Some(path) => {
                tracing::debug!(path = %path.display(), "using config file");
                Ok((Self::parse_file(&path)?, Some(path)))
            }
            None => Ok((Config::default(), None)),
        }
    }

    /// Reject values no scan can work with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.scan.extensions.is_empty() {
            anyhow::bail!("scan.extensions must not be empty");
        }
        if self.scan.max_file_size == 0 {
            anyhow::bail!("scan.max_file_size must be positive");
        }
        if self.cache.max_entries == 0 {
            anyhow::bail!("cache.max_entries must be positive");
        }
        if self.cache.ttl_secs == 0 {
            anyhow::bail!("cache.ttl_secs must be positive");
        }
        if self.detectors.complexity.max_complexity == 0 {
            anyhow::bail!("detectors.complexity.max_complexity must be positive");
        }
        if self.parser.native.max_complexity_calc == 0 {
            anyhow::bail!("parser.native.max_complexity_calc must be positive");
        }
        Ok(())
    }
}

/// First config file found in the working directory or the user config
/// directory.
pub fn discover() -> Option<PathBuf> {
    let local = CONFIG_FILE_NAMES.iter().map(PathBuf::from);
    let user = ProjectDirs::from("", "", "tierscan")
        .map(|dirs| {
            CONFIG_FILE_NAMES
                .iter()
                .map(|name| dirs.config_dir().join(name))
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    local.chain(user).find(|p| p.is_file())
}

/// Parse `"512"`, `"64KB"`, `"10MB"`, `"1GiB"` and similar into bytes.
pub fn parse_size(text: &str) -> anyhow::Result<u64> {
    let text = text.trim();
    let split = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    let (digits, unit) = text.split_at(split);
    let value: u64 = digits
        .parse()
        .with_context(|| format!("invalid size: {:?}", text))?;
    let multiplier: u64 = match unit.trim().to_ascii_uppercase().as_str() {
        "" | "B" => 1,
        "K" | "KB" | "KIB" => 1024,
        "M" | "MB" | "MIB" => 1024 * 1024,
        "G" | "GB" | "GIB" => 1024 * 1024 * 1024,
        other => anyhow::bail!("unknown size unit {:?} in {:?}", other, text),
    };
    value
        .checked_mul(multiplier)
        .with_context(|| format!("size out of range: {:?}", text))
}

fn deserialize_size<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Size {
        Bytes(u64),
        Text(String),
    }

    match Size::deserialize(deserializer)? {
        Size::Bytes(n) => Ok(n),
        Size::Text(s) => parse_size(&s).map_err(serde::de::Error::custom),
    }
}
