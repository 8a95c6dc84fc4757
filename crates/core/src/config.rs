use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pricing::PricingModel;

pub const DEFAULT_CONFIG_FILE: &str = "signcfg.toml";
pub const NESTED_CONFIG_FILE: &str = "config/signcfg.toml";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub host: HostConfig,
    pub workflow: WorkflowConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

/// Connection to the business system's HTTP API.
#[derive(Clone, Debug)]
pub struct HostConfig {
    pub base_url: Option<String>,
    pub api_key: Option<SecretString>,
    pub api_secret: Option<SecretString>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkflowConfig {
    pub default_price_list: String,
    pub default_uom: String,
    pub default_currency: String,
    pub default_qty: Decimal,
    /// Engine the local backend prices with.
    pub pricing_model: PricingModel,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub host_base_url: Option<String>,
    pub default_price_list: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://signcfg.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            host: HostConfig { base_url: None, api_key: None, api_secret: None, timeout_secs: 30 },
            workflow: WorkflowConfig::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            default_price_list: "Standard Selling".to_string(),
            default_uom: "Nos".to_string(),
            default_currency: "USD".to_string(),
            default_qty: Decimal::ONE,
            pricing_model: PricingModel::Profile,
        }
    }
}

impl HostConfig {
    /// A remote backend needs a base URL plus a complete key pair.
    pub fn is_configured(&self) -> bool {
        let present = |secret: &Option<SecretString>| {
            secret.as_ref().is_some_and(|value| !value.expose_secret().trim().is_empty())
        };
        self.base_url.as_deref().is_some_and(|url| !url.trim().is_empty())
            && present(&self.api_key)
            && present(&self.api_secret)
    }
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        match resolve_config_path(options.config_path.as_deref()) {
            Some(path) => read_patch(&path)?.merge_into(&mut config),
            None if options.require_file => {
                return Err(ConfigError::MissingConfigFile(
                    options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE)),
                ));
            }
            None => {}
        }

        config.apply_env_overrides()?;
        options.overrides.merge_into(&mut config);
        config.validate()?;

        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        let database = &mut self.database;
        overwrite(&mut database.url, env_value(&["SIGNCFG_DATABASE_URL"]));
        overwrite(
            &mut database.max_connections,
            env_parsed(&["SIGNCFG_DATABASE_MAX_CONNECTIONS"])?,
        );
        overwrite(&mut database.timeout_secs, env_parsed(&["SIGNCFG_DATABASE_TIMEOUT_SECS"])?);

        let host = &mut self.host;
        overwrite_some(&mut host.base_url, env_value(&["SIGNCFG_HOST_BASE_URL"]));
        overwrite_some(&mut host.api_key, env_value(&["SIGNCFG_HOST_API_KEY"]).map(Into::into));
        overwrite_some(
            &mut host.api_secret,
            env_value(&["SIGNCFG_HOST_API_SECRET"]).map(Into::into),
        );
        overwrite(&mut host.timeout_secs, env_parsed(&["SIGNCFG_HOST_TIMEOUT_SECS"])?);

        let workflow = &mut self.workflow;
        overwrite(
            &mut workflow.default_price_list,
            env_value(&["SIGNCFG_WORKFLOW_DEFAULT_PRICE_LIST"]),
        );
        overwrite(&mut workflow.default_uom, env_value(&["SIGNCFG_WORKFLOW_DEFAULT_UOM"]));
        overwrite(
            &mut workflow.default_currency,
            env_value(&["SIGNCFG_WORKFLOW_DEFAULT_CURRENCY"]),
        );
        overwrite(&mut workflow.default_qty, env_parsed(&["SIGNCFG_WORKFLOW_DEFAULT_QTY"])?);
        overwrite(
            &mut workflow.pricing_model,
            env_parsed(&["SIGNCFG_WORKFLOW_PRICING_MODEL"])?,
        );

        overwrite(
            &mut self.logging.level,
            env_value(&["SIGNCFG_LOGGING_LEVEL", "SIGNCFG_LOG_LEVEL"]),
        );
        if let Some(format) = env_value(&["SIGNCFG_LOGGING_FORMAT", "SIGNCFG_LOG_FORMAT"]) {
            self.logging.format = format.parse()?;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_host(&self.host)?;
        validate_workflow(&self.workflow)?;
        validate_logging(&self.logging)
    }
}

impl ConfigOverrides {
    fn merge_into(self, config: &mut AppConfig) {
        overwrite(&mut config.database.url, self.database_url);
        overwrite(&mut config.logging.level, self.log_level);
        overwrite(&mut config.logging.format, self.log_format);
        overwrite_some(&mut config.host.base_url, self.host_base_url);
        overwrite(&mut config.workflow.default_price_list, self.default_price_list);
    }
}

/// Returns the config file `load` would read, if any.
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then(|| path.to_path_buf());
    }

    [DEFAULT_CONFIG_FILE, NESTED_CONFIG_FILE]
        .into_iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    toml::from_str(&interpolate_env_vars(&raw)?)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

/// Replaces every `${NAME}` with the value of environment variable `NAME`.
fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(open) = rest.find("${") {
        output.push_str(&rest[..open]);
        let after_open = &rest[open + 2..];
        let close = after_open.find('}').ok_or(ConfigError::UnterminatedInterpolation)?;
        let var = &after_open[..close];
        let value = env::var(var)
            .map_err(|_| ConfigError::MissingEnvInterpolation { var: var.to_owned() })?;
        output.push_str(&value);
        rest = &after_open[close + 1..];
    }

    output.push_str(rest);
    Ok(output)
}

fn require(condition: bool, message: &str) -> Result<(), ConfigError> {
    if condition {
        Ok(())
    } else {
        Err(ConfigError::Validation(message.to_owned()))
    }
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    require(
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:",
        "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)",
    )?;
    require(database.max_connections > 0, "database.max_connections must be greater than zero")?;
    require(
        (1..=300).contains(&database.timeout_secs),
        "database.timeout_secs must be in range 1..=300",
    )
}

fn validate_host(host: &HostConfig) -> Result<(), ConfigError> {
    require((1..=300).contains(&host.timeout_secs), "host.timeout_secs must be in range 1..=300")?;
    require(
        host.base_url
            .as_deref()
            .map_or(true, |url| url.starts_with("http://") || url.starts_with("https://")),
        "host.base_url must start with http:// or https://",
    )?;
    require(
        host.api_key.is_some() == host.api_secret.is_some(),
        "host.api_key and host.api_secret must be configured together",
    )
}

fn validate_workflow(workflow: &WorkflowConfig) -> Result<(), ConfigError> {
    require(
        !workflow.default_price_list.trim().is_empty(),
        "workflow.default_price_list must not be empty",
    )?;
    require(!workflow.default_uom.trim().is_empty(), "workflow.default_uom must not be empty")?;
    require(
        !workflow.default_currency.trim().is_empty(),
        "workflow.default_currency must not be empty",
    )?;
    require(workflow.default_qty > Decimal::ZERO, "workflow.default_qty must be greater than zero")
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    require(
        matches!(
            logging.level.trim().to_ascii_lowercase().as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        ),
        "logging.level must be one of trace|debug|info|warn|error",
    )
}

fn overwrite<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

fn overwrite_some<T>(target: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *target = value;
    }
}

/// First non-blank value among `keys`; later keys are aliases.
fn env_value(keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| env::var(key).ok().filter(|value| !value.trim().is_empty()))
}

fn env_parsed<T: FromStr>(keys: &[&str]) -> Result<Option<T>, ConfigError> {
    let Some(value) = env_value(keys) else {
        return Ok(None);
    };
    value.trim().parse::<T>().map(Some).map_err(|_| ConfigError::InvalidEnvOverride {
        key: keys[0].to_owned(),
        value,
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    host: Option<HostPatch>,
    workflow: Option<WorkflowPatch>,
    logging: Option<LoggingPatch>,
}

impl ConfigPatch {
    fn merge_into(self, config: &mut AppConfig) {
        if let Some(database) = self.database {
            overwrite(&mut config.database.url, database.url);
            overwrite(&mut config.database.max_connections, database.max_connections);
            overwrite(&mut config.database.timeout_secs, database.timeout_secs);
        }
        if let Some(host) = self.host {
            overwrite_some(&mut config.host.base_url, host.base_url);
            overwrite_some(&mut config.host.api_key, host.api_key.map(SecretString::from));
            overwrite_some(&mut config.host.api_secret, host.api_secret.map(SecretString::from));
            overwrite(&mut config.host.timeout_secs, host.timeout_secs);
        }
        if let Some(workflow) = self.workflow {
            let target = &mut config.workflow;
            overwrite(&mut target.default_price_list, workflow.default_price_list);
            overwrite(&mut target.default_uom, workflow.default_uom);
            overwrite(&mut target.default_currency, workflow.default_currency);
            overwrite(&mut target.default_qty, workflow.default_qty);
            overwrite(&mut target.pricing_model, workflow.pricing_model);
        }
        if let Some(logging) = self.logging {
            overwrite(&mut config.logging.level, logging.level);
            overwrite(&mut config.logging.format, logging.format);
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct HostPatch {
    base_url: Option<String>,
    api_key: Option<String>,
    api_secret: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct WorkflowPatch {
    default_price_list: Option<String>,
    default_uom: Option<String>,
    default_currency: Option<String>,
    default_qty: Option<Decimal>,
    pricing_model: Option<PricingModel>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
