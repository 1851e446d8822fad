//! Run configuration for a repair session.
//!
//! A run is configured from four layers, lowest precedence first:
//! built-in defaults, the `mend.toml` file, `MEND_*` environment variables,
//! and CLI flags. `ResolvedConfig` records which layer supplied each key.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use mendtool_core::concretize::ConcretizationStrategy;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::fault::parse_location;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "mend.toml";

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },

    #[error("{0}")]
    Invalid(String),
}

// ============================================================================
// Config File
// ============================================================================

/// How fix locations are chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationMode {
    /// Walk covered lines in fault-localization order.
    #[default]
    Ranked,
    /// Use a single known faulty line.
    Perfect,
}

impl FromStr for LocationMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ranked" | "flfreq" => Ok(LocationMode::Ranked),
            "perfect" | "pfl" => Ok(LocationMode::Perfect),
            _ => Err(()),
        }
    }
}

/// Everything a repair run needs besides the collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairConfig {
    /// Root of the program's source tree (package directories below it).
    #[serde(default = "default_source_dir")]
    pub source_dir: PathBuf,

    /// Where compiled candidate classes go.
    #[serde(default = "default_target_dir")]
    pub target_dir: PathBuf,

    #[serde(default)]
    pub compile_classpath: Vec<String>,

    #[serde(default)]
    pub test_classpath: Vec<String>,

    /// Change pool directories, searched in order.
    #[serde(default)]
    pub pools: Vec<PathBuf>,

    /// Upper bound on verified candidates.
    #[serde(default = "default_patch_count")]
    pub patch_count: usize,

    /// Apply attempts per (location, change) pair.
    #[serde(default = "default_max_trials")]
    pub max_trials: usize,

    /// Changes tried at one location before moving on.
    #[serde(default = "default_max_change_count")]
    pub max_change_count: usize,

    /// Resident change payloads per pool.
    #[serde(default = "default_max_pool_load")]
    pub max_pool_load: usize,

    #[serde(default = "default_test_timeout_secs")]
    pub test_timeout_secs: u64,

    /// Wall-clock budget for the whole search.
    #[serde(default)]
    pub time_budget_hours: Option<f64>,

    #[serde(default)]
    pub location_strategy: LocationMode,

    #[serde(default)]
    pub concretization: ConcretizationStrategy,

    /// Ranked covered lines, `Class#line,score` per line.
    #[serde(default = "default_fault_file")]
    pub fault_file: PathBuf,

    /// `Class#line` for the perfect location strategy.
    #[serde(default)]
    pub perfect_location: Option<String>,

    #[serde(default = "default_trigger_tests")]
    pub trigger_tests: PathBuf,

    #[serde(default = "default_relevant_tests")]
    pub relevant_tests: PathBuf,

    #[serde(default = "default_all_tests")]
    pub all_tests: PathBuf,

    #[serde(default = "default_flaky_tests")]
    pub flaky_tests: PathBuf,

    /// Trigger failures of the unpatched program. Defaults to the number of
    /// trigger tests.
    #[serde(default)]
    pub trigger_failures: Option<usize>,

    #[serde(default = "default_candidate_dir")]
    pub candidate_dir: PathBuf,

    #[serde(default = "default_patch_dir")]
    pub patch_dir: PathBuf,

    /// Where covered-line and location reports are written.
    #[serde(default = "default_report_dir")]
    pub report_dir: PathBuf,

    /// Compile command template: `{file}`, `{classpath}`, `{target}`.
    #[serde(default = "default_compile_command")]
    pub compile_command: Vec<String>,

    /// Test command template: `{classpath}`, `{tests}`.
    #[serde(default = "default_test_command")]
    pub test_command: Vec<String>,
}

fn default_source_dir() -> PathBuf {
    PathBuf::from("src")
}

fn default_target_dir() -> PathBuf {
    PathBuf::from("target/classes")
}

fn default_patch_count() -> usize {
    20
}

fn default_max_trials() -> usize {
    10
}

fn default_max_change_count() -> usize {
    25
}

fn default_max_pool_load() -> usize {
    1000
}

fn default_test_timeout_secs() -> u64 {
    10
}

fn default_fault_file() -> PathBuf {
    PathBuf::from("faults.txt")
}

fn default_trigger_tests() -> PathBuf {
    PathBuf::from("tests.trigger")
}

fn default_relevant_tests() -> PathBuf {
    PathBuf::from("tests.relevant")
}

fn default_all_tests() -> PathBuf {
    PathBuf::from("tests.all")
}

fn default_flaky_tests() -> PathBuf {
    PathBuf::from("tests.broken")
}

fn default_candidate_dir() -> PathBuf {
    PathBuf::from("candidates")
}

fn default_patch_dir() -> PathBuf {
    PathBuf::from("patches")
}

fn default_report_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_compile_command() -> Vec<String> {
    ["javac", "-nowarn", "-d", "{target}", "-cp", "{classpath}", "{file}"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_test_command() -> Vec<String> {
    ["java", "-cp", "{classpath}", "org.junit.runner.JUnitCore", "{tests}"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for RepairConfig {
    fn default() -> Self {
        RepairConfig {
            source_dir: default_source_dir(),
            target_dir: default_target_dir(),
            compile_classpath: Vec::new(),
            test_classpath: Vec::new(),
            pools: Vec::new(),
            patch_count: default_patch_count(),
            max_trials: default_max_trials(),
            max_change_count: default_max_change_count(),
            max_pool_load: default_max_pool_load(),
            test_timeout_secs: default_test_timeout_secs(),
            time_budget_hours: None,
            location_strategy: LocationMode::default(),
            concretization: ConcretizationStrategy::default(),
            fault_file: default_fault_file(),
            perfect_location: None,
            trigger_tests: default_trigger_tests(),
            relevant_tests: default_relevant_tests(),
            all_tests: default_all_tests(),
            flaky_tests: default_flaky_tests(),
            trigger_failures: None,
            candidate_dir: default_candidate_dir(),
            patch_dir: default_patch_dir(),
            report_dir: default_report_dir(),
            compile_command: default_compile_command(),
            test_command: default_test_command(),
        }
    }
}

impl RepairConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::load_with_keys(path).map(|(config, _)| config)
    }

    /// Load from a TOML file, also returning the top-level keys it set.
    fn load_with_keys(path: &Path) -> Result<(Self, BTreeSet<String>), ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let parse_err = |e: toml::de::Error| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        };
        let table: toml::Table = toml::from_str(&content).map_err(parse_err)?;
        let config: RepairConfig = toml::from_str(&content).map_err(parse_err)?;
        let keys: BTreeSet<String> = table.keys().cloned().collect();
        for key in &keys {
            if !KEYS.contains(&key.as_str()) {
                warn!(key = %key, path = %path.display(), "ignoring unknown config key");
            }
        }
        Ok((config, keys))
    }

    pub fn test_timeout(&self) -> Duration {
        Duration::from_secs(self.test_timeout_secs)
    }

    pub fn time_budget(&self) -> Option<Duration> {
        self.time_budget_hours
            .filter(|h| *h > 0.0 && h.is_finite())
            .map(|h| Duration::from_secs_f64(h * 3600.0))
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.patch_count == 0 {
            return Err(ConfigError::Invalid("patch_count must be at least 1".to_string()));
        }
        if self.max_trials == 0 {
            return Err(ConfigError::Invalid("max_trials must be at least 1".to_string()));
        }
        if self.max_change_count == 0 {
            return Err(ConfigError::Invalid(
                "max_change_count must be at least 1".to_string(),
            ));
        }
        if let Some(hours) = self.time_budget_hours {
            if hours <= 0.0 || !hours.is_finite() {
                return Err(ConfigError::InvalidValue {
                    key: "time_budget_hours".to_string(),
                    value: hours.to_string(),
                });
            }
        }
        if self.location_strategy == LocationMode::Perfect {
            let Some(loc) = &self.perfect_location else {
                return Err(ConfigError::Invalid(
                    "perfect location strategy needs perfect_location (Class#line)".to_string(),
                ));
            };
            if parse_location(loc).is_none() {
                return Err(ConfigError::InvalidValue {
                    key: "perfect_location".to_string(),
                    value: loc.clone(),
                });
            }
        }
        if self.compile_command.is_empty() || self.test_command.is_empty() {
            return Err(ConfigError::Invalid(
                "compile_command and test_command must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Precedence
// ============================================================================

/// Configuration value source (for precedence tracking).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSource {
    Default = 0,
    ConfigFile = 1,
    EnvVar = 2,
    CliFlag = 3,
}

/// A configuration value with its source.
#[derive(Debug, Clone)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        ConfigValue { value, source }
    }

    /// Merge with another value, preferring higher precedence.
    pub fn merge(self, other: Self) -> Self {
        if other.source >= self.source {
            other
        } else {
            self
        }
    }
}

/// Keys recognized in the config file.
const KEYS: &[&str] = &[
    "source_dir",
    "target_dir",
    "compile_classpath",
    "test_classpath",
    "pools",
    "patch_count",
    "max_trials",
    "max_change_count",
    "max_pool_load",
    "test_timeout_secs",
    "time_budget_hours",
    "location_strategy",
    "concretization",
    "fault_file",
    "perfect_location",
    "trigger_tests",
    "relevant_tests",
    "all_tests",
    "flaky_tests",
    "trigger_failures",
    "candidate_dir",
    "patch_dir",
    "report_dir",
    "compile_command",
    "test_command",
];

/// Values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub pools: Vec<PathBuf>,
    pub source_dir: Option<PathBuf>,
    pub fault_file: Option<PathBuf>,
    pub patch_count: Option<usize>,
    pub max_trials: Option<usize>,
    pub max_change_count: Option<usize>,
    pub max_pool_load: Option<usize>,
    pub test_timeout_secs: Option<u64>,
    pub time_budget_hours: Option<f64>,
    pub location_strategy: Option<LocationMode>,
    pub concretization: Option<ConcretizationStrategy>,
    pub perfect_location: Option<String>,
}

/// The effective configuration and where each key came from.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config: RepairConfig,
    sources: BTreeMap<&'static str, ConfigSource>,
}

impl ResolvedConfig {
    /// Resolve from the process environment.
    pub fn resolve(
        config_file: Option<&Path>,
        overrides: &ConfigOverrides,
    ) -> Result<Self, ConfigError> {
        Self::resolve_with_env(config_file, |key| std::env::var(key).ok(), overrides)
    }

    /// Resolve configuration from all sources.
    ///
    /// Precedence (highest to lowest):
    /// 1. CLI flags
    /// 2. Environment variables
    /// 3. Config file
    /// 4. Defaults
    pub fn resolve_with_env(
        config_file: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
        overrides: &ConfigOverrides,
    ) -> Result<Self, ConfigError> {
        let (config, file_keys) = match config_file {
            Some(path) => RepairConfig::load_with_keys(path)?,
            None => (RepairConfig::default(), BTreeSet::new()),
        };
        let sources = KEYS
            .iter()
            .map(|key| {
                let source = if file_keys.contains(*key) {
                    ConfigSource::ConfigFile
                } else {
                    ConfigSource::Default
                };
                (*key, source)
            })
            .collect();
        let mut resolved = ResolvedConfig { config, sources };
        resolved.apply_env_vars(env)?;
        resolved.apply_cli_overrides(overrides);
        resolved.config.validate()?;
        debug!(config = ?resolved.config, "resolved configuration");
        Ok(resolved)
    }

    pub fn source_of(&self, key: &str) -> ConfigSource {
        self.sources.get(key).copied().unwrap_or(ConfigSource::Default)
    }

    fn set<T: Default>(
        &mut self,
        key: &'static str,
        value: ConfigValue<T>,
        field: impl FnOnce(&mut RepairConfig) -> &mut T,
    ) {
        let source = self.source_of(key);
        let slot = field(&mut self.config);
        let merged = ConfigValue::new(std::mem::take(slot), source).merge(value);
        *slot = merged.value;
        self.sources.insert(key, merged.source);
    }

    fn apply_env_vars(&mut self, env: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        fn from_env<T>(value: T) -> ConfigValue<T> {
            ConfigValue::new(value, ConfigSource::EnvVar)
        }

        if let Some(pools) = env("MEND_POOLS") {
            let pools: Vec<PathBuf> = std::env::split_paths(&pools).collect();
            self.set("pools", from_env(pools), |c| &mut c.pools);
        }
        if let Some(dir) = env("MEND_SOURCE_DIR") {
            self.set("source_dir", from_env(PathBuf::from(dir)), |c| &mut c.source_dir);
        }
        if let Some(n) = env("MEND_PATCH_COUNT") {
            let n = parse_value("MEND_PATCH_COUNT", &n)?;
            self.set("patch_count", from_env(n), |c| &mut c.patch_count);
        }
        if let Some(n) = env("MEND_MAX_TRIALS") {
            let n = parse_value("MEND_MAX_TRIALS", &n)?;
            self.set("max_trials", from_env(n), |c| &mut c.max_trials);
        }
        if let Some(n) = env("MEND_MAX_CHANGE_COUNT") {
            let n = parse_value("MEND_MAX_CHANGE_COUNT", &n)?;
            self.set("max_change_count", from_env(n), |c| &mut c.max_change_count);
        }
        if let Some(n) = env("MEND_TEST_TIMEOUT") {
            let n = parse_value("MEND_TEST_TIMEOUT", &n)?;
            self.set("test_timeout_secs", from_env(n), |c| &mut c.test_timeout_secs);
        }
        if let Some(h) = env("MEND_TIME_BUDGET") {
            let h: f64 = parse_value("MEND_TIME_BUDGET", &h)?;
            self.set("time_budget_hours", from_env(Some(h)), |c| &mut c.time_budget_hours);
        }
        if let Some(name) = env("MEND_CONCRETIZATION") {
            let strategy = ConcretizationStrategy::from_name(&name).ok_or(ConfigError::InvalidValue {
                key: "MEND_CONCRETIZATION".to_string(),
                value: name,
            })?;
            self.set("concretization", from_env(strategy), |c| &mut c.concretization);
        }
        if let Some(mode) = env("MEND_LOCATION_STRATEGY") {
            let mode = parse_value("MEND_LOCATION_STRATEGY", &mode)?;
            self.set("location_strategy", from_env(mode), |c| &mut c.location_strategy);
        }
        Ok(())
    }

    fn apply_cli_overrides(&mut self, o: &ConfigOverrides) {
        fn from_cli<T>(value: T) -> ConfigValue<T> {
            ConfigValue::new(value, ConfigSource::CliFlag)
        }

        if !o.pools.is_empty() {
            self.set("pools", from_cli(o.pools.clone()), |c| &mut c.pools);
        }
        if let Some(dir) = &o.source_dir {
            self.set("source_dir", from_cli(dir.clone()), |c| &mut c.source_dir);
        }
        if let Some(file) = &o.fault_file {
            self.set("fault_file", from_cli(file.clone()), |c| &mut c.fault_file);
        }
        if let Some(n) = o.patch_count {
            self.set("patch_count", from_cli(n), |c| &mut c.patch_count);
        }
        if let Some(n) = o.max_trials {
            self.set("max_trials", from_cli(n), |c| &mut c.max_trials);
        }
        if let Some(n) = o.max_change_count {
            self.set("max_change_count", from_cli(n), |c| &mut c.max_change_count);
        }
        if let Some(n) = o.max_pool_load {
            self.set("max_pool_load", from_cli(n), |c| &mut c.max_pool_load);
        }
        if let Some(n) = o.test_timeout_secs {
            self.set("test_timeout_secs", from_cli(n), |c| &mut c.test_timeout_secs);
        }
        if let Some(h) = o.time_budget_hours {
            self.set("time_budget_hours", from_cli(Some(h)), |c| &mut c.time_budget_hours);
        }
        if let Some(mode) = o.location_strategy {
            self.set("location_strategy", from_cli(mode), |c| &mut c.location_strategy);
        }
        if let Some(strategy) = o.concretization {
            self.set("concretization", from_cli(strategy), |c| &mut c.concretization);
        }
        if let Some(loc) = &o.perfect_location {
            self.set("perfect_location", from_cli(Some(loc.clone())), |c| &mut c.perfect_location);
        }
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: raw.to_string(),
    })
}
