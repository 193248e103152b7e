// SPDX-License-Identifier: MIT OR Apache-2.0
//! Configuration loading, validation, and merging for integration health probing.
//!
//! [`HealthConfig`] holds the process-wide settings. Probes never read it (or the
//! environment) directly: the runtime resolves an immutable [`ProbeConfig`] per
//! integration via [`HealthConfig::probe_config`] and hands that to the probe.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use ih_error::{Coded, ErrorCode};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Why a configuration could not be loaded or used.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read {path}")]
    Unreadable {
        /// Path as given.
        path: String,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// TOML syntax or type mismatch, in the file or an `IH_*` variable.
    #[error("malformed configuration: {reason}")]
    Malformed {
        /// Parser message.
        reason: String,
    },

    /// One or more values are out of range.
    #[error("invalid configuration: {}", problems.join("; "))]
    Invalid {
        /// Each rejected value, described.
        problems: Vec<String>,
    },

    /// The per-integration section for one integration is unusable.
    #[error("invalid config for integration '{integration}': {reason}")]
    InvalidOverride {
        /// Integration name the section belongs to.
        integration: String,
        /// What is wrong with it.
        reason: String,
    },
}

impl Coded for ConfigError {
    fn code(&self) -> ErrorCode {
        ErrorCode::ConfigInvalid
    }
}

/// Settings that load fine but are probably not what the operator meant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// No `results_path`: nothing outlives the process.
    NoResultsPath,
    /// A hung integration will hold a worker this long.
    LargeTimeout {
        /// `"global"` or the integration name.
        scope: String,
        /// Seconds.
        secs: u64,
    },
    /// Keys are set but mock mode never uses them.
    UnusedApiKeys {
        /// How many.
        count: usize,
    },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoResultsPath => {
                f.write_str("results_path unset, results are kept in memory only")
            }
            Self::LargeTimeout { scope, secs } => write!(f, "{scope} timeout is large ({secs}s)"),
            Self::UnusedApiKeys { count } => {
                write!(f, "{count} api key(s) configured but mock_mode is on")
            }
        }
    }
}

/// Top-level settings for a probing run.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct HealthConfig {
    /// Per-capability-check timeout in seconds.
    #[serde(default = "default_test_timeout")]
    pub test_timeout: u64,

    /// Run independent probes (and checks within a probe) concurrently.
    #[serde(default = "default_true")]
    pub parallel_tests: bool,

    /// Construct integrations in mock mode so no real provider is contacted.
    #[serde(default)]
    pub mock_mode: bool,

    /// Upper bound on probes in flight when `parallel_tests` is on.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Log level override (e.g. `"debug"`, `"info"`, `"warn"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// JSONL file results are appended to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results_path: Option<String>,

    /// Namespace name patterns (`*` wildcard) to restrict discovery to.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub discovery_patterns: Vec<String>,

    /// Provider name → API key.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub api_keys: BTreeMap<String, String>,

    /// Integration name → per-integration settings.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub integrations: BTreeMap<String, IntegrationOverride>,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            test_timeout: DEFAULT_TEST_TIMEOUT_SECS,
            parallel_tests: true,
            mock_mode: false,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            log_level: Some("info".into()),
            results_path: None,
            discovery_patterns: Vec::new(),
            api_keys: BTreeMap::new(),
            integrations: BTreeMap::new(),
        }
    }
}

/// Settings for a single integration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct IntegrationOverride {
    /// Timeout in seconds for this integration's checks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    /// Arbitrary constructor arguments passed through untouched.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, serde_json::Value>,
}

/// Immutable settings for one probe, resolved from [`HealthConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeConfig {
    /// Bound on each capability check.
    pub timeout: Duration,
    /// Construct in mock mode.
    pub mock_mode: bool,
    /// Run this probe's checks concurrently.
    pub parallel: bool,
    /// Provider the integration belongs to, as extracted from its name.
    pub provider: String,
    /// API key for `provider`, if configured.
    pub api_key: Option<String>,
    /// Constructor pass-through arguments.
    pub params: BTreeMap<String, serde_json::Value>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TEST_TIMEOUT_SECS),
            mock_mode: true,
            parallel: false,
            provider: String::new(),
            api_key: None,
            params: BTreeMap::new(),
        }
    }
}

/// Default per-check timeout.
pub const DEFAULT_TEST_TIMEOUT_SECS: u64 = 30;

/// Default probe worker count.
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

const MAX_TIMEOUT_SECS: u64 = 3_600;

const LARGE_TIMEOUT_THRESHOLD: u64 = 300;

const MAX_CONCURRENCY: usize = 256;

const VALID_LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];

fn default_test_timeout() -> u64 {
    DEFAULT_TEST_TIMEOUT_SECS
}

fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}

fn default_true() -> bool {
    true
}

/// Load a [`HealthConfig`] from an optional TOML file path, then apply
/// environment overrides.
pub fn load_config(path: Option<&Path>) -> Result<HealthConfig, ConfigError> {
    let mut config = match path {
        Some(p) => {
            let content = std::fs::read_to_string(p).map_err(|source| ConfigError::Unreadable {
                path: p.display().to_string(),
                source,
            })?;
            parse_toml(&content)?
        }
        None => HealthConfig::default(),
    };
    apply_env_overrides(&mut config)?;
    Ok(config)
}

/// Parse a TOML string into a [`HealthConfig`].
pub fn parse_toml(content: &str) -> Result<HealthConfig, ConfigError> {
    toml::from_str::<HealthConfig>(content).map_err(|e| ConfigError::Malformed {
        reason: e.to_string(),
    })
}

/// Apply overrides from the process environment.
///
/// See [`apply_overrides_from`] for the recognised variables.
pub fn apply_env_overrides(config: &mut HealthConfig) -> Result<(), ConfigError> {
    apply_overrides_from(config, std::env::vars())
}

/// Apply overrides from an explicit set of variables.
///
/// Recognised variables:
/// - `IH_TEST_TIMEOUT`, `IH_MAX_CONCURRENCY` (integers)
/// - `IH_PARALLEL_TESTS`, `IH_MOCK_MODE` (`true`/`1`/`yes` are truthy)
/// - `IH_LOG_LEVEL`, `IH_RESULTS_PATH`
/// - `<PROVIDER>_API_KEY`, stored under the lower-cased provider name
pub fn apply_overrides_from(
    config: &mut HealthConfig,
    vars: impl IntoIterator<Item = (String, String)>,
) -> Result<(), ConfigError> {
    for (key, value) in vars {
        match key.as_str() {
            "IH_TEST_TIMEOUT" => config.test_timeout = parse_env_number(&key, &value)?,
            "IH_MAX_CONCURRENCY" => config.max_concurrency = parse_env_number(&key, &value)?,
            "IH_PARALLEL_TESTS" => config.parallel_tests = parse_env_bool(&value),
            "IH_MOCK_MODE" => config.mock_mode = parse_env_bool(&value),
            "IH_LOG_LEVEL" => config.log_level = Some(value),
            "IH_RESULTS_PATH" => config.results_path = Some(value),
            _ => {
                if let Some(provider) = key.strip_suffix("_API_KEY") {
                    if !provider.is_empty() && !value.is_empty() {
                        config.api_keys.insert(provider.to_lowercase(), value);
                    }
                }
            }
        }
    }
    Ok(())
}

fn parse_env_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Malformed {
        reason: format!("{key}: expected an integer, got '{value}'"),
    })
}

fn parse_env_bool(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "true" | "1" | "yes")
}

/// Validate a parsed configuration, returning advisory warnings.
///
/// Hard errors (out-of-range timeouts or concurrency, unknown log level) come
/// back together in [`ConfigError::Invalid`]. Soft issues come back as warnings.
pub fn validate_config(config: &HealthConfig) -> Result<Vec<ConfigWarning>, ConfigError> {
    let mut errors: Vec<String> = Vec::new();
    let mut warnings: Vec<ConfigWarning> = Vec::new();

    if let Some(ref level) = config.log_level {
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            errors.push(format!("invalid log_level '{level}'"));
        }
    }

    check_timeout("global", config.test_timeout, &mut errors, &mut warnings);

    if config.max_concurrency == 0 || config.max_concurrency > MAX_CONCURRENCY {
        errors.push(format!(
            "max_concurrency {} out of range (1..={MAX_CONCURRENCY})",
            config.max_concurrency
        ));
    }

    for (name, entry) in &config.integrations {
        if name.trim().is_empty() {
            errors.push("integration name must not be empty".into());
        }
        if let Some(t) = entry.timeout {
            check_timeout(name, t, &mut errors, &mut warnings);
        }
    }

    if config.results_path.is_none() {
        warnings.push(ConfigWarning::NoResultsPath);
    }
    if config.mock_mode && !config.api_keys.is_empty() {
        warnings.push(ConfigWarning::UnusedApiKeys {
            count: config.api_keys.len(),
        });
    }

    if errors.is_empty() {
        Ok(warnings)
    } else {
        Err(ConfigError::Invalid { problems: errors })
    }
}

fn check_timeout(
    scope: &str,
    secs: u64,
    errors: &mut Vec<String>,
    warnings: &mut Vec<ConfigWarning>,
) {
    if secs == 0 || secs > MAX_TIMEOUT_SECS {
        errors.push(format!(
            "{scope}: timeout {secs}s out of range (1..={MAX_TIMEOUT_SECS})"
        ));
    } else if secs > LARGE_TIMEOUT_THRESHOLD {
        warnings.push(ConfigWarning::LargeTimeout {
            scope: scope.to_string(),
            secs,
        });
    }
}

/// Merge two configurations. Values in `overlay` take precedence over `base`.
///
/// Scalar settings always come from the overlay; optional settings fall back to
/// the base; key and integration maps are combined with the overlay winning on
/// collisions.
pub fn merge_configs(base: HealthConfig, overlay: HealthConfig) -> HealthConfig {
    let mut api_keys = base.api_keys;
    api_keys.extend(overlay.api_keys);
    let mut integrations = base.integrations;
    integrations.extend(overlay.integrations);
    let discovery_patterns = if overlay.discovery_patterns.is_empty() {
        base.discovery_patterns
    } else {
        overlay.discovery_patterns
    };
    HealthConfig {
        test_timeout: overlay.test_timeout,
        parallel_tests: overlay.parallel_tests,
        mock_mode: overlay.mock_mode,
        max_concurrency: overlay.max_concurrency,
        log_level: overlay.log_level.or(base.log_level),
        results_path: overlay.results_path.or(base.results_path),
        discovery_patterns,
        api_keys,
        integrations,
    }
}

impl HealthConfig {
    /// Resolve the immutable settings for the integration called `integration_name`.
    ///
    /// Fails only for this integration when its own section is unusable; the
    /// caller records that as a configuration error in the integration's result.
    pub fn probe_config(&self, integration_name: &str) -> Result<ProbeConfig, ConfigError> {
        let entry = self.integrations.get(integration_name);
        let timeout_secs = match entry.and_then(|e| e.timeout) {
            Some(0) => {
                return Err(ConfigError::InvalidOverride {
                    integration: integration_name.to_string(),
                    reason: "timeout must be at least 1s".into(),
                });
            }
            Some(t) if t > MAX_TIMEOUT_SECS => {
                return Err(ConfigError::InvalidOverride {
                    integration: integration_name.to_string(),
                    reason: format!("timeout {t}s exceeds {MAX_TIMEOUT_SECS}s"),
                });
            }
            Some(t) => t,
            None => self.test_timeout.max(1),
        };
        let provider = extract_provider_name(integration_name);
        Ok(ProbeConfig {
            timeout: Duration::from_secs(timeout_secs),
            mock_mode: self.mock_mode,
            parallel: self.parallel_tests,
            api_key: self.api_keys.get(&provider).cloned(),
            provider,
            params: entry.map(|e| e.params.clone()).unwrap_or_default(),
        })
    }
}

/// Map an integration class name to the provider whose credentials it needs.
pub fn extract_provider_name(integration_name: &str) -> String {
    let name = integration_name.to_lowercase();
    let contains_any = |needles: &[&str]| needles.iter().any(|n| name.contains(n));

    if contains_any(&["openai"]) {
        "openai".into()
    } else if contains_any(&["anthropic", "claude"]) {
        "anthropic".into()
    } else if contains_any(&["google", "gemini"]) {
        "google".into()
    } else if contains_any(&["azure"]) {
        "azure".into()
    } else if contains_any(&["aws", "bedrock"]) {
        "aws".into()
    } else if contains_any(&["huggingface", "hf"]) {
        "huggingface".into()
    } else if contains_any(&["cohere"]) {
        "cohere".into()
    } else if contains_any(&["mlx"]) {
        "mlx".into()
    } else {
        name
    }
}
