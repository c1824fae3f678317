use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::output::is_plain_filename;

pub const CONFIG_FILE_NAME: &str = "config/config.json";
pub const CATALOG_FILE_NAME: &str = "config/sports.json";
pub const DOTENV_FILE_NAME: &str = "config/.env";
pub const LOG_DIR_NAME: &str = "logs";

pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";
pub const API_URL_ENV: &str = "ANTHROPIC_API_URL";
pub const OUTPUT_DIRECTORY_ENV: &str = "OUTPUT_DIRECTORY";

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";
pub const DEFAULT_API_URL: &str = "https://api.anthropic.com/v1/messages";
pub const DEFAULT_MAX_TOKENS: u32 = 16_000;
pub const DEFAULT_TEMPERATURE: f64 = 1.0;
pub const DEFAULT_THINKING_BUDGET: u32 = 10_000;
pub const DEFAULT_WEB_SEARCH_MAX_USES: u32 = 10;
pub const DEFAULT_MAX_ITERATIONS: u32 = 25;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_DELAY_SECS: u64 = 30;
pub const DEFAULT_CLEANUP_DAYS: u32 = 1;
pub const DEFAULT_OUTPUT_DIR: &str = "output";
pub const DEFAULT_TMP_DIR: &str = "tmp";
pub const DEFAULT_TOPIC_TEMPLATE: &str = "prompt-schedule-getter.txt";
pub const DEFAULT_AGGREGATE_TEMPLATE: &str = "prompt-html-builder.txt";
pub const DEFAULT_AGGREGATE_FILENAME: &str = "index.html";

const KNOWN_KEYS: &[&str] = &[
    "model",
    "max_tokens",
    "temperature",
    "thinking_budget_tokens",
    "web_search_max_uses",
    "max_iterations",
    "request_timeout_secs",
    "api_url",
    "output_directory",
    "tmp_directory",
    "cleanup_days",
    "delay_between_sports",
    "delay_before_aggregate",
    "topic_template",
    "aggregate_template",
    "aggregate_filename",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{} is not valid JSON: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{} must contain a JSON object at the top level", .path.display())]
    NotAnObject { path: PathBuf },
    #[error("ANTHROPIC_API_KEY is not set")]
    MissingApiKey,
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Indicates where the configuration was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    /// No config file was found; built-in defaults (plus environment) apply.
    Default,
    /// Values were read from the JSON config file.
    File,
}

/// Which layer supplied a single setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingSource {
    Default,
    ConfigFile,
    Environment,
}

impl fmt::Display for SettingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SettingSource::Default => "default",
            SettingSource::ConfigFile => "config file",
            SettingSource::Environment => "environment",
        })
    }
}

/// Credential wrapper that never prints its contents.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Request parameters handed to the completion provider without interpretation.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelParameters {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    /// Extended thinking budget; zero disables thinking.
    pub thinking_budget_tokens: u32,
    /// Web search tool budget; zero disables the tool.
    pub web_search_max_uses: u32,
    pub max_iterations: u32,
    pub request_timeout: Duration,
}

impl Default for ModelParameters {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            thinking_budget_tokens: DEFAULT_THINKING_BUDGET,
            web_search_max_uses: DEFAULT_WEB_SEARCH_MAX_USES,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

/// The one configuration value of a run. Built once, then only read.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveConfig {
    pub base_directory: PathBuf,
    pub output_directory: PathBuf,
    pub output_directory_source: SettingSource,
    pub scratch_directory: PathBuf,
    pub delay_between_topics: Duration,
    pub delay_before_aggregate: Duration,
    pub cleanup_days: u32,
    pub topic_template: PathBuf,
    pub aggregate_template: PathBuf,
    pub aggregate_filename: String,
    pub api_url: String,
    pub api_key: Option<ApiKey>,
    pub model: ModelParameters,
}

impl EffectiveConfig {
    /// Built-in defaults anchored at `base_directory`.
    pub fn defaults(base_directory: &Path) -> Self {
        let delay = Duration::from_secs(DEFAULT_DELAY_SECS);
        Self {
            base_directory: base_directory.to_path_buf(),
            output_directory: base_directory.join(DEFAULT_OUTPUT_DIR),
            output_directory_source: SettingSource::Default,
            scratch_directory: base_directory.join(DEFAULT_TMP_DIR),
            delay_between_topics: delay,
            delay_before_aggregate: delay,
            cleanup_days: DEFAULT_CLEANUP_DAYS,
            topic_template: base_directory.join(DEFAULT_TOPIC_TEMPLATE),
            aggregate_template: base_directory.join(DEFAULT_AGGREGATE_TEMPLATE),
            aggregate_filename: DEFAULT_AGGREGATE_FILENAME.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            api_key: None,
            model: ModelParameters::default(),
        }
    }

    pub fn cleanup_max_age(&self) -> Duration {
        Duration::from_secs(u64::from(self.cleanup_days) * 24 * 60 * 60)
    }
}

/// Result returned by [`ConfigResolver::resolve`], capturing the source and any non-fatal issues.
#[derive(Debug, Clone)]
pub struct ConfigLoadResult {
    pub config: EffectiveConfig,
    pub warnings: Vec<String>,
    pub source: ConfigSource,
}

/// Captured environment variables.
///
/// Only the resolver looks at this; nothing else in the crate reads the
/// process environment.
#[derive(Clone, Default)]
pub struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl fmt::Debug for EnvSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.vars.keys().collect();
        keys.sort();
        f.debug_struct("EnvSnapshot").field("keys", &keys).finish()
    }
}

impl EnvSnapshot {
    /// Capture the process environment, skipping non-UTF-8 entries.
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars_os()
                .filter_map(|(key, value)| {
                    Some((key.into_string().ok()?, value.into_string().ok()?))
                })
                .collect(),
        }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }

    /// Layer values from a dotenv file underneath the captured variables.
    ///
    /// Variables already present win. A missing file is not an error; an
    /// unreadable or malformed one is reported back as a warning string.
    pub fn with_dotenv(mut self, path: &Path) -> (Self, Option<String>) {
        if !path.exists() {
            return (self, None);
        }
        let iter = match dotenvy::from_path_iter(path) {
            Ok(iter) => iter,
            Err(err) => {
                return (
                    self,
                    Some(format!("Failed to read {}: {}", path.display(), err)),
                );
            }
        };
        for item in iter {
            match item {
                Ok((key, value)) => {
                    self.vars.entry(key).or_insert(value);
                }
                Err(err) => {
                    return (
                        self,
                        Some(format!("Failed to parse {}: {}", path.display(), err)),
                    );
                }
            }
        }
        (self, None)
    }

    /// Trimmed, non-empty value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }
}

/// Merges built-in defaults, the JSON config file and the environment.
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    base_directory: PathBuf,
}

impl ConfigResolver {
    pub fn new(base_directory: impl Into<PathBuf>) -> Self {
        Self {
            base_directory: base_directory.into(),
        }
    }

    pub fn base_directory(&self) -> &Path {
        &self.base_directory
    }

    pub fn default_config_path(&self) -> PathBuf {
        self.base_directory.join(CONFIG_FILE_NAME)
    }

    pub fn default_catalog_path(&self) -> PathBuf {
        self.base_directory.join(CATALOG_FILE_NAME)
    }

    pub fn dotenv_path(&self) -> PathBuf {
        self.base_directory.join(DOTENV_FILE_NAME)
    }

    pub fn log_directory(&self) -> PathBuf {
        self.base_directory.join(LOG_DIR_NAME)
    }

    /// Resolve the effective configuration.
    ///
    /// `config_path` defaults to `<base>/config/config.json`. Only an existing
    /// file that cannot be read or is not a JSON object is an error.
    pub fn resolve(
        &self,
        config_path: Option<&Path>,
        env: &EnvSnapshot,
    ) -> Result<ConfigLoadResult, ConfigError> {
        let path = config_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.default_config_path());
        let mut warnings = Vec::new();

        let (object, source) = match fs::read_to_string(&path) {
            Ok(raw) => {
                let value: Value = serde_json::from_str(&raw).map_err(|source| {
                    ConfigError::Parse {
                        path: path.clone(),
                        source,
                    }
                })?;
                match value {
                    Value::Object(object) => (object, ConfigSource::File),
                    _ => return Err(ConfigError::NotAnObject { path }),
                }
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                warnings.push(format!(
                    "Config file not found at {}, using defaults",
                    path.display()
                ));
                (Map::new(), ConfigSource::Default)
            }
            Err(source) => return Err(ConfigError::Read { path, source }),
        };

        let config = self.merge(&object, env, &mut warnings);
        Ok(ConfigLoadResult {
            config,
            warnings,
            source,
        })
    }

    fn merge(
        &self,
        object: &Map<String, Value>,
        env: &EnvSnapshot,
        warnings: &mut Vec<String>,
    ) -> EffectiveConfig {
        let mut config = EffectiveConfig::defaults(&self.base_directory);

        for key in object.keys() {
            if !KNOWN_KEYS.contains(&key.as_str()) {
                warnings.push(format!("Ignoring unknown config key '{key}'"));
            }
        }

        let mut file = FileValues { object, warnings };

        if let Some(model) = file.string("model") {
            config.model.model = model;
        }
        if let Some(max_tokens) = file.positive_u32("max_tokens") {
            config.model.max_tokens = max_tokens;
        }
        if let Some(temperature) = file.non_negative_f64("temperature") {
            config.model.temperature = temperature;
        }
        if let Some(budget) = file.u32("thinking_budget_tokens") {
            config.model.thinking_budget_tokens = budget;
        }
        if let Some(uses) = file.u32("web_search_max_uses") {
            config.model.web_search_max_uses = uses;
        }
        if let Some(iterations) = file.positive_u32("max_iterations") {
            config.model.max_iterations = iterations;
        }
        if let Some(timeout) = file.positive_u32("request_timeout_secs") {
            config.model.request_timeout = Duration::from_secs(u64::from(timeout));
        }
        if let Some(url) = file.string("api_url") {
            config.api_url = url;
        }
        if let Some(dir) = file.string("output_directory") {
            config.output_directory = self.resolve_path(&dir);
            config.output_directory_source = SettingSource::ConfigFile;
        }
        if let Some(dir) = file.string("tmp_directory") {
            config.scratch_directory = self.resolve_path(&dir);
        }
        if let Some(days) = file.u32("cleanup_days") {
            config.cleanup_days = days;
        }
        if let Some(delay) = file.seconds("delay_between_sports") {
            config.delay_between_topics = delay;
        }
        config.delay_before_aggregate = file
            .seconds("delay_before_aggregate")
            .unwrap_or(config.delay_between_topics);
        if let Some(template) = file.string("topic_template") {
            config.topic_template = self.resolve_path(&template);
        }
        if let Some(template) = file.string("aggregate_template") {
            config.aggregate_template = self.resolve_path(&template);
        }
        if let Some(name) = file.string("aggregate_filename") {
            if is_plain_filename(&name) {
                config.aggregate_filename = name;
            } else {
                file.warnings.push(format!(
                    "aggregate_filename '{name}' must be a plain file name; using {DEFAULT_AGGREGATE_FILENAME}"
                ));
            }
        }

        if let Some(dir) = env.get(OUTPUT_DIRECTORY_ENV) {
            config.output_directory = self.resolve_path(dir);
            config.output_directory_source = SettingSource::Environment;
        }
        if let Some(url) = env.get(API_URL_ENV) {
            config.api_url = url.to_string();
        }
        config.api_key = env.get(API_KEY_ENV).map(ApiKey::new);

        config
    }

    fn resolve_path(&self, raw: &str) -> PathBuf {
        let expanded = PathBuf::from(shellexpand::tilde(raw).as_ref());
        if expanded.is_absolute() {
            expanded
        } else {
            self.base_directory.join(expanded)
        }
    }
}

/// Typed accessors over the config object. A present key with an unusable
/// value yields `None` plus a warning so the default stays in effect.
struct FileValues<'a> {
    object: &'a Map<String, Value>,
    warnings: &'a mut Vec<String>,
}

impl FileValues<'_> {
    fn reject(&mut self, key: &str, expected: &str, value: &Value) {
        self.warnings.push(format!(
            "Config key '{key}' must be {expected} (found {value}); using default"
        ));
    }

    fn string(&mut self, key: &str) -> Option<String> {
        let value = self.object.get(key)?;
        match value.as_str().map(str::trim) {
            Some(text) if !text.is_empty() => Some(text.to_string()),
            _ => {
                self.reject(key, "a non-empty string", value);
                None
            }
        }
    }

    fn u32(&mut self, key: &str) -> Option<u32> {
        let value = self.object.get(key)?;
        match value.as_u64().and_then(|number| u32::try_from(number).ok()) {
            Some(number) => Some(number),
            None => {
                self.reject(key, "a non-negative integer", value);
                None
            }
        }
    }

    fn positive_u32(&mut self, key: &str) -> Option<u32> {
        let value = self.object.get(key)?;
        match value.as_u64().and_then(|number| u32::try_from(number).ok()) {
            Some(number) if number > 0 => Some(number),
            _ => {
                self.reject(key, "a positive integer", value);
                None
            }
        }
    }

    fn non_negative_f64(&mut self, key: &str) -> Option<f64> {
        let value = self.object.get(key)?;
        match value.as_f64() {
            Some(number) if number.is_finite() && number >= 0.0 => Some(number),
            _ => {
                self.reject(key, "a non-negative number", value);
                None
            }
        }
    }

    fn seconds(&mut self, key: &str) -> Option<Duration> {
        let seconds = self.non_negative_f64(key)?;
        match Duration::try_from_secs_f64(seconds) {
            Ok(duration) => Some(duration),
            Err(_) => {
                if let Some(value) = self.object.get(key) {
                    self.reject(key, "a representable number of seconds", value);
                }
                None
            }
        }
    }
}
