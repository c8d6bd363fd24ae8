//! Application configuration for govdata.
//!
//! User config lives at `~/.govdata/govdata.toml`.
//! CLI flags override config file values, which override defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{GovDataError, Result};
use crate::types::SchemeKind;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "govdata.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".govdata";

// ---------------------------------------------------------------------------
// Config structs (matching govdata.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Remote data source settings.
    #[serde(default)]
    pub source: SourceConfig,

    /// Store location.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Orchestration settings.
    #[serde(default)]
    pub pipeline: PipelineSettings,

    /// Scheme key → resource identifier.
    #[serde(default = "default_schemes")]
    pub schemes: BTreeMap<String, String>,

    /// State code → population, used for per-capita metrics.
    #[serde(default)]
    pub population: BTreeMap<String, u64>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            source: SourceConfig::default(),
            database: DatabaseConfig::default(),
            pipeline: PipelineSettings::default(),
            schemes: default_schemes(),
            population: BTreeMap::new(),
        }
    }
}

/// Placeholder resource ids; real ones come from the config file or a mapping file.
fn default_schemes() -> BTreeMap<String, String> {
    SchemeKind::ALL
        .into_iter()
        .map(|kind| {
            let stem = match kind {
                SchemeKind::StartupIndia => "startup",
                other => other.key(),
            };
            (kind.key().to_string(), format!("dummy-{stem}-resource-id"))
        })
        .collect()
}

/// `[source]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Fixed base endpoint of the tabular data API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// HTTP timeout for a single fetch, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Extra fetch attempts after the first one fails.
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Pause between fetch attempts, in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Extra query parameters sent with every fetch.
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
            retries: default_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            params: BTreeMap::new(),
        }
    }
}

fn default_base_url() -> String {
    "https://data.gov.in/api/datastore/resource.json".into()
}
fn default_api_key_env() -> String {
    "DATA_GOV_API_KEY".into()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_retries() -> u32 {
    1
}
fn default_retry_delay_ms() -> u64 {
    500
}

/// `[database]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the libSQL database file.
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "var/govdata.db".into()
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Maximum scheme pipelines in flight during `run-all`.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

fn default_concurrency() -> u32 {
    1
}

// ---------------------------------------------------------------------------
// Fetch config (runtime, merged from config + environment)
// ---------------------------------------------------------------------------

/// Runtime fetch configuration: parsed endpoint, resolved credential, limits.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Base endpoint all fetches go to.
    pub base_url: Url,
    /// API key resolved from the environment, if set.
    pub api_key: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Extra attempts after a transport failure.
    pub retries: u32,
    /// Pause between attempts.
    pub retry_delay: Duration,
    /// Query parameters sent with every fetch.
    pub params: BTreeMap<String, String>,
}

impl FetchConfig {
    /// Build the runtime fetch config from the file config and environment.
    pub fn from_app(config: &AppConfig) -> Result<Self> {
        let base_url = Url::parse(&config.source.base_url).map_err(|e| {
            GovDataError::config(format!(
                "invalid source.base_url '{}': {e}",
                config.source.base_url
            ))
        })?;

        Ok(Self {
            base_url,
            api_key: resolve_api_key(config),
            timeout: Duration::from_secs(config.source.timeout_secs),
            retries: config.source.retries,
            retry_delay: Duration::from_millis(config.source.retry_delay_ms),
            params: config.source.params.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.govdata/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| GovDataError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.govdata/govdata.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| GovDataError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| GovDataError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| GovDataError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| GovDataError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| GovDataError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the API key from the env var named in config.
///
/// A missing key is not an error: the source is queried with an empty key
/// and will most likely refuse, which the extractor degrades to empty.
pub fn resolve_api_key(config: &AppConfig) -> Option<String> {
    let var_name = &config.source.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Some(val),
        _ => {
            tracing::warn!(var = %var_name, "API key env var not set, requests will carry an empty key");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Scheme mapping & population
// ---------------------------------------------------------------------------

/// Parse the `[schemes]` section into a typed mapping.
pub fn scheme_mapping(config: &AppConfig) -> Result<BTreeMap<SchemeKind, String>> {
    typed_mapping(&config.schemes)
}

/// Load a `{scheme: resource_id}` JSON mapping file.
pub fn load_mapping_file(path: &Path) -> Result<BTreeMap<SchemeKind, String>> {
    let content = std::fs::read_to_string(path).map_err(|e| GovDataError::io(path, e))?;
    let raw: BTreeMap<String, String> = serde_json::from_str(&content).map_err(|e| {
        GovDataError::parse(format!("mapping file {} is not a JSON object of strings: {e}", path.display()))
    })?;
    typed_mapping(&raw)
}

fn typed_mapping(raw: &BTreeMap<String, String>) -> Result<BTreeMap<SchemeKind, String>> {
    raw.iter()
        .map(|(key, rid)| Ok((key.parse::<SchemeKind>()?, rid.clone())))
        .collect()
}

/// Load a `{state_code: population}` JSON file.
pub fn load_population_file(path: &Path) -> Result<BTreeMap<String, u64>> {
    let content = std::fs::read_to_string(path).map_err(|e| GovDataError::io(path, e))?;
    serde_json::from_str(&content).map_err(|e| {
        GovDataError::parse(format!(
            "population file {} is not a JSON object of integers: {e}",
            path.display()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("base_url"));
        assert!(toml_str.contains("DATA_GOV_API_KEY"));
        assert!(toml_str.contains("dummy-pmay-resource-id"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.source.timeout_secs, 30);
        assert_eq!(parsed.source.retries, 1);
        assert_eq!(parsed.pipeline.concurrency, 1);
        assert_eq!(parsed.schemes.len(), 4);
    }

    #[test]
    fn config_with_schemes_and_population() {
        let toml_str = r#"
[source]
timeout_secs = 5

[source.params]
limit = "500"

[schemes]
pmay = "rid-1"
mnrega = "rid-2"

[population]
MH = 112374333
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.source.timeout_secs, 5);
        assert_eq!(config.source.params.get("limit").map(String::as_str), Some("500"));
        assert_eq!(config.population.get("MH"), Some(&112_374_333));

        let mapping = scheme_mapping(&config).expect("typed mapping");
        assert_eq!(mapping.len(), 2);
        assert_eq!(mapping[&SchemeKind::Pmay], "rid-1");
    }

    #[test]
    fn unknown_scheme_key_is_rejected() {
        let toml_str = r#"
[schemes]
pmay = "rid-1"
ujjwala = "rid-9"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        let err = scheme_mapping(&config).unwrap_err();
        assert!(err.to_string().contains("ujjwala"));
    }

    #[test]
    fn fetch_config_from_app_config() {
        let mut app = AppConfig::default();
        app.source.api_key_env = "GOVDATA_TEST_NONEXISTENT_KEY_12345".into();
        let fetch = FetchConfig::from_app(&app).expect("fetch config");
        assert_eq!(fetch.timeout, Duration::from_secs(30));
        assert_eq!(fetch.retry_delay, Duration::from_millis(500));
        assert!(fetch.api_key.is_none());
        assert_eq!(fetch.base_url.host_str(), Some("data.gov.in"));
    }

    #[test]
    fn fetch_config_rejects_bad_url() {
        let mut app = AppConfig::default();
        app.source.base_url = "not a url".into();
        let err = FetchConfig::from_app(&app).unwrap_err();
        assert!(err.to_string().contains("source.base_url"));
    }

    #[test]
    fn mapping_file_parses() {
        let path = std::env::temp_dir().join(format!(
            "govdata_mapping_{}.json",
            std::process::id()
        ));
        std::fs::write(&path, r#"{"pmay": "rid-1", "saubhagya": "rid-4"}"#).unwrap();
        let mapping = load_mapping_file(&path).expect("load mapping");
        assert_eq!(mapping[&SchemeKind::Saubhagya], "rid-4");
        let _ = std::fs::remove_file(&path);
    }
}
