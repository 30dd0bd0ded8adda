//! Loader for `feedline.yaml` with environment overlays.
//!
//! Precedence, lowest first: built-in defaults, YAML files and inline snippets
//! in the order they were added, then `FEEDLINE__`-prefixed environment
//! variables (`FEEDLINE__STORE__DATABASE_URL` sets `store.database_url`).
//! `${VAR}` placeholders in any string value are expanded after merging.
//!
//! ```yaml
//! source:  { mode: synthetic, seed: 7 }
//! store:   { database_url: "sqlite://feedline.db" }
//! ingest:  { bearer_token: "${X_BEARER_TOKEN}", provider_user_id: "2244994945", owner_user_id: 1 }
//! logging: { format: json, emit_stderr: true }
//! ```
use config::{Config, ConfigError, Environment, File, FileFormat};
use feedline_common::observability::LogFormat;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

const MAXIMUM_ENV_EXPANSION_DEPTH: usize = 8;
const ENV_PREFIX: &str = "FEEDLINE";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FeedlineConfig {
    pub source: SourceSection,
    pub store: StoreSection,
    /// Absent when the binary only lists what is already stored.
    pub ingest: Option<IngestSection>,
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SourceSection {
    /// `live` or `synthetic`.
    pub mode: String,
    pub seed: u64,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for SourceSection {
    fn default() -> Self {
        Self {
            mode: "synthetic".into(),
            seed: 0,
            base_url: "https://api.twitter.com".into(),
            timeout_secs: 15,
        }
    }
}

impl SourceSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    pub database_url: String,
    pub max_connections: u32,
    pub busy_timeout_ms: u64,
    pub op_timeout_ms: u64,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            database_url: "sqlite://feedline.db".into(),
            max_connections: 5,
            busy_timeout_ms: 5_000,
            op_timeout_ms: 10_000,
        }
    }
}

impl StoreSection {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }
}

/// Credentials and targets for one ingestion run.
#[derive(Clone, PartialEq, Deserialize)]
pub struct IngestSection {
    #[serde(deserialize_with = "lenient_string")]
    pub bearer_token: String,
    #[serde(deserialize_with = "lenient_string")]
    pub provider_user_id: String,
    pub owner_user_id: i64,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
}

impl fmt::Debug for IngestSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestSection")
            .field("bearer_token", &"<redacted>")
            .field("provider_user_id", &self.provider_user_id)
            .field("owner_user_id", &self.owner_user_id)
            .field("max_results", &self.max_results)
            .finish()
    }
}

fn default_max_results() -> u32 {
    20
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub format: LogFormat,
    pub emit_stderr: bool,
    pub default_filter: String,
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            emit_stderr: false,
            default_filter: "info".into(),
            log_dir: None,
        }
    }
}

/// Ids and tokens may arrive as YAML/env integers.
fn lenient_string<'de, D>(de: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(de)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string, got {other}"
        ))),
    }
}

/// `~/.config/feedline/feedline.yaml` on Linux.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("feedline").join("feedline.yaml"))
}

fn expand_env_in_value(v: &mut Value) {
    match v {
        Value::String(s) => {
            if s.contains('$') {
                let mut cur = std::mem::take(s);
                for _ in 0..MAXIMUM_ENV_EXPANSION_DEPTH {
                    let expanded = match shellexpand::env(&cur) {
                        Ok(cow) => cow.into_owned(),
                        Err(_) => cur.clone(),
                    };
                    if expanded == cur {
                        break;
                    }
                    cur = expanded;
                }
                *s = cur;
            }
        }
        Value::Array(arr) => arr.iter_mut().for_each(expand_env_in_value),
        Value::Object(obj) => obj.values_mut().for_each(expand_env_in_value),
        _ => {}
    }
}

/// Builder hiding the `config` crate wiring.
pub struct FeedlineConfigLoader {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
}

impl Default for FeedlineConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedlineConfigLoader {
    /// ```
    /// use feedline_config::FeedlineConfigLoader;
    ///
    /// let cfg = FeedlineConfigLoader::new()
    ///     .with_yaml_str("source:\n  mode: live\n")
    ///     .load()
    ///     .expect("valid config");
    ///
    /// assert_eq!(cfg.source.mode, "live");
    /// assert_eq!(cfg.store.max_connections, 5);
    /// assert!(cfg.ingest.is_none());
    /// ```
    pub fn new() -> Self {
        Self {
            builder: Config::builder(),
        }
    }

    /// Attach a YAML/TOML/JSON file; the format is inferred from the suffix.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(true));
        self
    }

    /// Like [`with_file`](Self::with_file) but silently skipped when missing.
    pub fn with_optional_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(false));
        self
    }

    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.builder = self
            .builder
            .add_source(File::from_str(yaml, FileFormat::Yaml));
        self
    }

    /// Merge all sources, overlay the environment, expand `${VAR}`, and
    /// deserialize into [`FeedlineConfig`].
    pub fn load(self) -> Result<FeedlineConfig, ConfigError> {
        let cfg = self
            .builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut v: Value = cfg.try_deserialize()?;
        expand_env_in_value(&mut v);

        let typed: FeedlineConfig =
            serde_json::from_value(v).map_err(|e| ConfigError::Message(e.to_string()))?;
        typed.validate()?;
        Ok(typed)
    }
}

impl FeedlineConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.store.max_connections == 0 {
            return Err(ConfigError::Message(
                "store.max_connections must be at least 1".into(),
            ));
        }
        if self.store.op_timeout_ms == 0 || self.source.timeout_secs == 0 {
            return Err(ConfigError::Message("timeouts must be positive".into()));
        }
        if let Some(ingest) = &self.ingest {
            if ingest.max_results == 0 {
                return Err(ConfigError::Message(
                    "ingest.max_results must be positive".into(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn expands_simple_string() {
        temp_env::with_var("FOO", Some("bar"), || {
            let mut v = json!("prefix-${FOO}-suffix");
            expand_env_in_value(&mut v);
            assert_eq!(v, json!("prefix-bar-suffix"));
        });
    }

    #[test]
    fn expands_in_array_and_object() {
        temp_env::with_vars([("CITY", Some("Winston")), ("STATE", Some("NC"))], || {
            let mut v = json!(["hello-$CITY", { "loc": "${CITY}-${STATE}" }, 42, true, null]);
            expand_env_in_value(&mut v);
            assert_eq!(
                v,
                json!(["hello-Winston", { "loc": "Winston-NC" }, 42, true, null])
            );
        });
    }

    #[test]
    fn expands_recursively_across_env_values() {
        temp_env::with_vars(
            [
                ("BAZ", Some("qux")),
                ("BAR", Some("mid-${BAZ}")),
                ("FOO", Some("start-${BAR}-end")),
            ],
            || {
                let mut v = json!("X=${FOO}");
                expand_env_in_value(&mut v);
                assert_eq!(v, json!("X=start-mid-qux-end"));
            },
        );
    }

    #[test]
    fn stops_on_cycles() {
        temp_env::with_vars([("A", Some("${B}")), ("B", Some("${A}"))], || {
            let mut v = json!("x=${A}-y");
            expand_env_in_value(&mut v);
            let s = v.as_str().unwrap();
            assert!(s.starts_with("x=") && s.ends_with("-y"));
            assert!(s.contains("${"));
        });
    }

    #[test]
    fn unknown_vars_are_left_as_is() {
        let mut v = json!("hi-${DOES_NOT_EXIST}");
        expand_env_in_value(&mut v);
        assert_eq!(v, json!("hi-${DOES_NOT_EXIST}"));
    }

    #[test]
    fn numeric_ids_become_strings() {
        let ingest: IngestSection = serde_json::from_value(json!({
            "bearer_token": "tok",
            "provider_user_id": 2244994945u64,
            "owner_user_id": 1
        }))
        .unwrap();
        assert_eq!(ingest.provider_user_id, "2244994945");
        assert_eq!(ingest.max_results, 20);
    }

    #[test]
    fn debug_hides_bearer() {
        let ingest = IngestSection {
            bearer_token: "very-secret".into(),
            provider_user_id: "1".into(),
            owner_user_id: 1,
            max_results: 5,
        };
        let out = format!("{ingest:?}");
        assert!(!out.contains("very-secret"));
        assert!(out.contains("<redacted>"));
    }
}
