//! Dashboard configuration.
//!
//! Configuration is resolved once per refresh cycle from an ordered chain of
//! [`ConfigSource`]s layered on a `config` builder. Each source either
//! supplies a value for a key or does not apply to it; the first source that
//! applies wins. The default chain is environment variables, then an optional
//! configuration file, then built-in defaults.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ::config::builder::DefaultState;
use ::config::{
    Config, ConfigBuilder, ConfigError, Environment, File, FileFormat, Map, Source, Value,
    ValueKind,
};
use serde::Deserialize;
use tracing::debug;

use crate::error::{DashboardError, Result};

/// Prefix of every environment variable read by [`EnvSource`].
pub const ENV_PREFIX: &str = "ORDERPULSE";
/// Environment variable naming the configuration file.
pub const CONFIG_FILE_ENV_VAR: &str = "ORDERPULSE_CONFIG";
/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "orderpulse.json";

const LIST_SEPARATOR: &str = ",";
const KNOWN_KEYS: &str = "project, dataset, table, order_limit, auto_refresh, \
                          refresh_interval_secs, display_rows, categories, locations";

pub const DEFAULT_ORDER_LIMIT: usize = 10_000;
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(15);
pub const MIN_REFRESH_INTERVAL_SECS: u64 = 5;
pub const MAX_REFRESH_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_DISPLAY_ROWS: usize = 100;
pub const MIN_DISPLAY_ROWS: usize = 10;
pub const MAX_DISPLAY_ROWS: usize = 500;

/// Location of the order table in the warehouse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarehouseTarget {
    pub project: String,
    pub dataset: String,
    pub table: String,
}

impl WarehouseTarget {
    /// Fully qualified name of a table or view in the target dataset.
    pub fn qualified(&self, name: &str) -> String {
        format!("{}.{}.{}", self.project, self.dataset, name)
    }
}

impl Default for WarehouseTarget {
    fn default() -> Self {
        Self {
            project: "local".to_string(),
            dataset: "shopping_dev".to_string(),
            table: "orders".to_string(),
        }
    }
}

/// Automatic refresh policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshSettings {
    pub auto_refresh: bool,
    pub interval: Duration,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            auto_refresh: true,
            interval: DEFAULT_REFRESH_INTERVAL,
        }
    }
}

/// Display table settings and filter defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplaySettings {
    /// Row cap applied after filtering
    pub row_limit: usize,
    /// Default category filter (empty means no filtering)
    pub categories: Vec<String>,
    /// Default location filter (empty means no filtering)
    pub locations: Vec<String>,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            row_limit: DEFAULT_DISPLAY_ROWS,
            categories: Vec::new(),
            locations: Vec::new(),
        }
    }
}

/// Fully resolved configuration for one refresh cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardConfig {
    pub warehouse: WarehouseTarget,
    /// Number of most recent orders fetched per cycle
    pub order_limit: usize,
    pub refresh: RefreshSettings,
    pub display: DisplaySettings,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            warehouse: WarehouseTarget::default(),
            order_limit: DEFAULT_ORDER_LIMIT,
            refresh: RefreshSettings::default(),
            display: DisplaySettings::default(),
        }
    }
}

/// A configuration key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    Project,
    Dataset,
    Table,
    OrderLimit,
    AutoRefresh,
    RefreshIntervalSecs,
    DisplayRows,
    Categories,
    Locations,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 9] = [
        ConfigKey::Project,
        ConfigKey::Dataset,
        ConfigKey::Table,
        ConfigKey::OrderLimit,
        ConfigKey::AutoRefresh,
        ConfigKey::RefreshIntervalSecs,
        ConfigKey::DisplayRows,
        ConfigKey::Categories,
        ConfigKey::Locations,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ConfigKey::Project => "project",
            ConfigKey::Dataset => "dataset",
            ConfigKey::Table => "table",
            ConfigKey::OrderLimit => "order_limit",
            ConfigKey::AutoRefresh => "auto_refresh",
            ConfigKey::RefreshIntervalSecs => "refresh_interval_secs",
            ConfigKey::DisplayRows => "display_rows",
            ConfigKey::Categories => "categories",
            ConfigKey::Locations => "locations",
        }
    }

    /// Environment variable read by [`EnvSource`] for this key.
    pub fn env_var(&self) -> String {
        format!("{}_{}", ENV_PREFIX, self.name().to_uppercase())
    }

    /// Keys holding a list of values.
    pub fn is_list(&self) -> bool {
        matches!(self, ConfigKey::Categories | ConfigKey::Locations)
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One strategy in the configuration chain.
pub trait ConfigSource {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Add this source on top of `builder`. Later layers take precedence.
    fn layer(&self, builder: ConfigBuilder<DefaultState>) -> ConfigBuilder<DefaultState>;
}

/// Reads `ORDERPULSE_<KEY>` environment variables. List keys are
/// comma-separated.
#[derive(Debug, Clone, Default)]
pub struct EnvSource {
    vars: Option<Map<String, String>>,
}

impl EnvSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read from a fixed set of variables instead of the process environment.
    pub fn from_vars<K, V>(vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: Some(
                vars.into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }
}

impl ConfigSource for EnvSource {
    fn name(&self) -> &str {
        "environment"
    }

    fn layer(&self, builder: ConfigBuilder<DefaultState>) -> ConfigBuilder<DefaultState> {
        let env = ConfigKey::ALL
            .iter()
            .filter(|key| key.is_list())
            .fold(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .try_parsing(true)
                    .ignore_empty(true)
                    .list_separator(LIST_SEPARATOR),
                |env, key| env.with_list_parse_key(key.name()),
            )
            .source(self.vars.clone());
        builder.add_source(env)
    }
}

/// Reads a configuration file. The format follows the extension (`.yaml`,
/// `.yml`, `.toml`, otherwise JSON). A missing file does not apply.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// File named by `ORDERPULSE_CONFIG`, falling back to `orderpulse.json`.
    pub fn from_env() -> Self {
        let path = std::env::var(CONFIG_FILE_ENV_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));
        Self::new(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn format(&self) -> FileFormat {
        match self.path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => FileFormat::Yaml,
            Some("toml") => FileFormat::Toml,
            _ => FileFormat::Json,
        }
    }
}

impl ConfigSource for FileSource {
    fn name(&self) -> &str {
        "config file"
    }

    fn layer(&self, builder: ConfigBuilder<DefaultState>) -> ConfigBuilder<DefaultState> {
        // Only absence is tolerated: a file that exists must read and parse.
        if !self.path.is_file() {
            debug!(path = %self.path.display(), "config file not present");
            return builder;
        }
        builder.add_source(File::from(self.path.as_path()).format(self.format()).required(true))
    }
}

/// Fixed values, e.g. command-line overrides or test fixtures.
#[derive(Debug, Clone, Default)]
pub struct MapSource {
    name: String,
    values: Map<String, Value>,
}

impl MapSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: Map::new(),
        }
    }

    pub fn with(mut self, key: ConfigKey, value: impl Into<ValueKind>) -> Self {
        let value = Value::new(Some(&self.name), value);
        self.values.insert(key.name().to_string(), value);
        self
    }
}

impl Source for MapSource {
    fn clone_into_box(&self) -> Box<dyn Source + Send + Sync> {
        Box::new(self.clone())
    }

    fn collect(&self) -> std::result::Result<Map<String, Value>, ConfigError> {
        Ok(self.values.clone())
    }
}

impl ConfigSource for MapSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn layer(&self, builder: ConfigBuilder<DefaultState>) -> ConfigBuilder<DefaultState> {
        builder.add_source(self.clone())
    }
}

/// Merged but unvalidated values from every source.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    project: Option<String>,
    dataset: Option<String>,
    table: Option<String>,
    order_limit: Option<i64>,
    auto_refresh: Option<bool>,
    refresh_interval_secs: Option<i64>,
    display_rows: Option<i64>,
    categories: Option<Vec<String>>,
    locations: Option<Vec<String>>,
}

/// Ordered chain of configuration sources.
pub struct ConfigResolver {
    sources: Vec<Box<dyn ConfigSource>>,
}

impl ConfigResolver {
    /// An empty chain: every key falls back to its built-in default.
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    /// Environment variables, then the configuration file, then defaults.
    pub fn standard() -> Self {
        Self::new()
            .with_source(EnvSource::new())
            .with_source(FileSource::from_env())
    }

    /// Append a source with lower precedence than those already present.
    pub fn with_source(mut self, source: impl ConfigSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Resolve and validate a configuration.
    pub fn resolve(&self) -> Result<DashboardConfig> {
        debug!(sources = ?self.source_names(), "resolving configuration");

        // The builder gives precedence to later sources, the chain to earlier ones.
        let raw: RawConfig = self
            .sources
            .iter()
            .rev()
            .fold(Config::builder(), |builder, source| source.layer(builder))
            .build()
            .and_then(|config| config.try_deserialize())
            .map_err(config_error)?;

        let defaults = DashboardConfig::default();

        let warehouse = WarehouseTarget {
            project: text(ConfigKey::Project, raw.project, defaults.warehouse.project)?,
            dataset: text(ConfigKey::Dataset, raw.dataset, defaults.warehouse.dataset)?,
            table: text(ConfigKey::Table, raw.table, defaults.warehouse.table)?,
        };

        let order_limit = match raw.order_limit {
            Some(v) => in_range(ConfigKey::OrderLimit, v, 1, i64::MAX)? as usize,
            None => defaults.order_limit,
        };

        let interval = match raw.refresh_interval_secs {
            Some(v) => Duration::from_secs(in_range(
                ConfigKey::RefreshIntervalSecs,
                v,
                MIN_REFRESH_INTERVAL_SECS as i64,
                MAX_REFRESH_INTERVAL_SECS as i64,
            )? as u64),
            None => defaults.refresh.interval,
        };

        let row_limit = match raw.display_rows {
            Some(v) => in_range(
                ConfigKey::DisplayRows,
                v,
                MIN_DISPLAY_ROWS as i64,
                MAX_DISPLAY_ROWS as i64,
            )? as usize,
            None => defaults.display.row_limit,
        };

        Ok(DashboardConfig {
            warehouse,
            order_limit,
            refresh: RefreshSettings {
                auto_refresh: raw.auto_refresh.unwrap_or(defaults.refresh.auto_refresh),
                interval,
            },
            display: DisplaySettings {
                row_limit,
                categories: list(raw.categories),
                locations: list(raw.locations),
            },
        })
    }
}

impl Default for ConfigResolver {
    fn default() -> Self {
        Self::standard()
    }
}

impl fmt::Debug for ConfigResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigResolver")
            .field("sources", &self.source_names())
            .finish()
    }
}

fn invalid(key: ConfigKey, message: impl Into<String>) -> DashboardError {
    DashboardError::configuration(
        key.name(),
        message,
        format!(
            "Set {} or the '{}' entry of the config file to a valid value",
            key.env_var(),
            key.name()
        ),
    )
}

/// Read, parse and type errors from any layer.
fn config_error(e: ConfigError) -> DashboardError {
    DashboardError::configuration(
        "configuration",
        e.to_string(),
        format!(
            "Check the {}_* environment variables and the config file named by {}; \
             known keys are {}",
            ENV_PREFIX, CONFIG_FILE_ENV_VAR, KNOWN_KEYS
        ),
    )
}

fn text(key: ConfigKey, value: Option<String>, default: String) -> Result<String> {
    match value {
        Some(value) => {
            let value = value.trim();
            if value.is_empty() {
                return Err(invalid(key, "value is empty"));
            }
            Ok(value.to_string())
        }
        None => Ok(default),
    }
}

fn in_range(key: ConfigKey, value: i64, min: i64, max: i64) -> Result<i64> {
    if value < min || value > max {
        return Err(invalid(
            key,
            format!("{} is outside the allowed range {}..={}", value, min, max),
        ));
    }
    Ok(value)
}

fn list(values: Option<Vec<String>>) -> Vec<String> {
    values
        .unwrap_or_default()
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_without_sources() {
        let config = ConfigResolver::new().resolve().unwrap();
        assert_eq!(config, DashboardConfig::default());
        assert_eq!(config.order_limit, 10_000);
        assert_eq!(config.refresh.interval, Duration::from_secs(15));
        assert!(config.refresh.auto_refresh);
        assert!(config.display.categories.is_empty());
    }

    #[test]
    fn test_first_applicable_source_wins() {
        let resolver = ConfigResolver::new()
            .with_source(MapSource::new("overrides").with(ConfigKey::Dataset, "shopping_prod"))
            .with_source(
                MapSource::new("fallback")
                    .with(ConfigKey::Dataset, "ignored")
                    .with(ConfigKey::Table, "orders_v2"),
            );
        let config = resolver.resolve().unwrap();
        assert_eq!(config.warehouse.dataset, "shopping_prod");
        assert_eq!(config.warehouse.table, "orders_v2");
        assert_eq!(config.warehouse.project, "local");
    }

    #[test]
    fn test_interval_bounds_are_enforced() {
        let resolver = ConfigResolver::new()
            .with_source(MapSource::new("test").with(ConfigKey::RefreshIntervalSecs, "90"));
        let err = resolver.resolve().unwrap_err();
        assert!(matches!(err, DashboardError::Configuration { .. }));
        assert!(err.to_string().contains("ORDERPULSE_REFRESH_INTERVAL_SECS"));

        let ok = ConfigResolver::new()
            .with_source(MapSource::new("test").with(ConfigKey::RefreshIntervalSecs, 5i64))
            .resolve()
            .unwrap();
        assert_eq!(ok.refresh.interval, Duration::from_secs(5));
    }

    #[test]
    fn test_display_rows_and_booleans() {
        let config = ConfigResolver::new()
            .with_source(
                MapSource::new("test")
                    .with(ConfigKey::DisplayRows, "250")
                    .with(ConfigKey::AutoRefresh, "off")
                    .with(ConfigKey::Categories, vec!["Clothing", " Footwear", ""]),
            )
            .resolve()
            .unwrap();
        assert_eq!(config.display.row_limit, 250);
        assert!(!config.refresh.auto_refresh);
        assert_eq!(config.display.categories, vec!["Clothing", "Footwear"]);

        let err = ConfigResolver::new()
            .with_source(MapSource::new("test").with(ConfigKey::AutoRefresh, "maybe"))
            .resolve()
            .unwrap_err();
        assert!(err.is_hard());
    }

    #[test]
    fn test_env_source_reads_prefixed_variables() {
        let env = EnvSource::from_vars([
            ("ORDERPULSE_DATASET", "shopping_env"),
            ("ORDERPULSE_REFRESH_INTERVAL_SECS", "20"),
            ("ORDERPULSE_LOCATIONS", "Ohio,Texas"),
            ("ORDERPULSE_TABLE", ""),
            ("ORDERPULSE_LOG", "debug"),
            ("OTHER_DATASET", "ignored"),
        ]);
        let config = ConfigResolver::new().with_source(env).resolve().unwrap();
        assert_eq!(config.warehouse.dataset, "shopping_env");
        assert_eq!(config.warehouse.table, "orders");
        assert_eq!(config.refresh.interval, Duration::from_secs(20));
        assert_eq!(config.display.locations, vec!["Ohio", "Texas"]);
    }

    #[test]
    fn test_env_source_outranks_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"dataset": "from_file", "table": "orders_file"}}"#).unwrap();

        let config = ConfigResolver::new()
            .with_source(EnvSource::from_vars([("ORDERPULSE_DATASET", "from_env")]))
            .with_source(FileSource::new(file.path()))
            .resolve()
            .unwrap();
        assert_eq!(config.warehouse.dataset, "from_env");
        assert_eq!(config.warehouse.table, "orders_file");
    }

    #[test]
    fn test_json_file_source() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{"dataset": "shopping_test", "refresh_interval_secs": 30, "locations": ["Ohio"]}}"#
        )
        .unwrap();

        let config = ConfigResolver::new()
            .with_source(FileSource::new(file.path()))
            .resolve()
            .unwrap();
        assert_eq!(config.warehouse.dataset, "shopping_test");
        assert_eq!(config.refresh.interval, Duration::from_secs(30));
        assert_eq!(config.display.locations, vec!["Ohio"]);
    }

    #[test]
    fn test_file_list_values_keep_commas() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"locations": ["Washington, D.C.", "Ohio"]}}"#).unwrap();

        let config = ConfigResolver::new()
            .with_source(FileSource::new(file.path()))
            .resolve()
            .unwrap();
        assert_eq!(config.display.locations, vec!["Washington, D.C.", "Ohio"]);
    }

    #[test]
    fn test_yaml_file_source() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "dataset: shopping_yaml\ndisplay_rows: 50").unwrap();

        let config = ConfigResolver::new()
            .with_source(FileSource::new(file.path()))
            .resolve()
            .unwrap();
        assert_eq!(config.warehouse.dataset, "shopping_yaml");
        assert_eq!(config.display.row_limit, 50);
    }

    #[test]
    fn test_missing_file_does_not_apply() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigResolver::new()
            .with_source(FileSource::new(dir.path().join("absent.json")))
            .resolve()
            .unwrap();
        assert_eq!(config, DashboardConfig::default());
    }

    #[test]
    fn test_malformed_json_is_configuration_error() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"dataset": }}"#).unwrap();
        let err = ConfigResolver::new()
            .with_source(FileSource::new(file.path()))
            .resolve()
            .unwrap_err();
        assert!(matches!(err, DashboardError::Configuration { .. }));
    }

    #[test]
    fn test_unreadable_file_is_configuration_error() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        file.write_all(&[0xff, 0xfe, 0xfd]).unwrap();
        let err = ConfigResolver::new()
            .with_source(FileSource::new(file.path()))
            .resolve()
            .unwrap_err();
        assert!(matches!(err, DashboardError::Configuration { .. }));
        assert!(err.to_string().contains(CONFIG_FILE_ENV_VAR));
    }
}
