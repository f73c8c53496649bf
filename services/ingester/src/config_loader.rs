//! Configuration loader for the ingester service.
//!
//! Loads a single YAML document describing:
//! - service settings (polling, workers, shutdown, status port)
//! - retry policies for database access and file moves
//! - route/format/type id mappings
//! - products with their directories and filename rules
//! - the populator chain
//! - record persistence
//!
//! Supports environment variable substitution using `${VAR}` and
//! `${VAR:-default}` syntax.

use anyhow::{Context, Result};
use avi_common::{BulletinHeadingSource, FileConfig, MessageFormat};
use ingestion::{validate_products, AviationProduct, IdMappings, PopulatorInstanceSpec, RetryPolicy};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ============================================================================
// Configuration document
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    #[serde(default)]
    pub ingester: IngesterSettings,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub logging: LoggingConfig,
    pub ids: IdMappings,
    pub products: Vec<ProductConfig>,
    #[serde(default)]
    pub populators: Vec<PopulatorInstanceSpec>,
    pub persistence: PersistenceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IngesterSettings {
    pub poll_interval_secs: u64,
    pub workers: usize,
    pub once_filter_capacity: usize,
    /// Minimum age of a file seen for the first time.
    pub settle_time_millis: u64,
    /// Status HTTP server port; no server when absent.
    pub status_port: Option<u16>,
    pub bulletin_heading_sources: Vec<String>,
    pub shutdown: ShutdownSettings,
}

impl Default for IngesterSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 1,
            workers: 4,
            once_filter_capacity: 10_000,
            settle_time_millis: 1_000,
            status_port: None,
            bulletin_heading_sources: BulletinHeadingSource::DEFAULT_ORDER
                .iter()
                .map(|source| source.name().to_string())
                .collect(),
            shutdown: ShutdownSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShutdownSettings {
    pub timeout_secs: u64,
    pub poll_interval_millis: u64,
}

impl Default for ShutdownSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            poll_interval_millis: 100,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    pub database: RetryConfig,
    pub file_move: RetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    pub initial_interval_millis: u64,
    pub multiplier: f64,
    pub max_interval_millis: u64,
    /// Zero retries forever.
    pub timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_interval_millis: 500,
            multiplier: 2.0,
            max_interval_millis: 60_000,
            timeout_secs: 0,
        }
    }
}

impl RetryConfig {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
            .with_initial_interval(Duration::from_millis(self.initial_interval_millis))
            .with_multiplier(self.multiplier)
            .with_max_interval(Duration::from_millis(self.max_interval_millis))
            .with_timeout(Duration::from_secs(self.timeout_secs))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProductConfig {
    pub id: String,
    pub route: String,
    pub input_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub fail_dir: PathBuf,
    pub files: Vec<FileRuleConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileRuleConfig {
    pub pattern: String,
    pub format: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_timezone() -> String {
    "Z".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PersistenceConfig {
    /// JSON-lines file receiving the stored records.
    pub output_path: PathBuf,
    /// ICAO code to station id.
    #[serde(default)]
    pub stations: HashMap<String, i32>,
}

// ============================================================================
// Loading Functions
// ============================================================================

/// Load, expand and validate the service configuration.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ServiceConfig> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read configuration from {:?}", path.as_ref()))?;
    parse_config(&content).with_context(|| format!("Invalid configuration in {:?}", path.as_ref()))
}

/// Parse configuration text. Environment variables are expanded first.
pub fn parse_config(content: &str) -> Result<ServiceConfig> {
    let expanded = expand_env_vars(content)?;
    let config: ServiceConfig =
        serde_yaml::from_str(&expanded).with_context(|| "Failed to parse configuration YAML")?;
    validate_config(&config)?;
    Ok(config)
}

impl ServiceConfig {
    /// Products with compiled filename patterns and parsed time zones.
    pub fn products(&self) -> Result<Vec<AviationProduct>> {
        self.products.iter().map(convert_product).collect()
    }

    /// Service-wide heading source order.
    pub fn bulletin_heading_sources(&self) -> Result<Vec<BulletinHeadingSource>> {
        let sources = self
            .ingester
            .bulletin_heading_sources
            .iter()
            .map(|name| name.parse::<BulletinHeadingSource>())
            .collect::<std::result::Result<Vec<_>, _>>()?;
        anyhow::ensure!(!sources.is_empty(), "bulletin_heading_sources must not be empty");
        anyhow::ensure!(
            sources.len() == 1 || sources[0] != sources[1],
            "bulletin_heading_sources must not repeat a source"
        );
        anyhow::ensure!(sources.len() <= 2, "bulletin_heading_sources lists at most two sources");
        Ok(sources)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.ingester.poll_interval_secs)
    }

    pub fn settle_time(&self) -> Duration {
        Duration::from_millis(self.ingester.settle_time_millis)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.ingester.shutdown.timeout_secs)
    }

    pub fn shutdown_poll_interval(&self) -> Duration {
        Duration::from_millis(self.ingester.shutdown.poll_interval_millis)
    }

    /// Product id to route name, for populators resolving route ids.
    pub fn product_routes(&self) -> HashMap<String, String> {
        self.products
            .iter()
            .map(|product| (product.id.clone(), product.route.clone()))
            .collect()
    }
}

fn convert_product(cfg: &ProductConfig) -> Result<AviationProduct> {
    let files = cfg
        .files
        .iter()
        .enumerate()
        .map(|(index, rule)| {
            convert_file_rule(rule).with_context(|| format!("product '{}' file rule #{}", cfg.id, index))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(AviationProduct {
        id: cfg.id.clone(),
        route: cfg.route.clone(),
        input_dir: cfg.input_dir.clone(),
        archive_dir: cfg.archive_dir.clone(),
        fail_dir: cfg.fail_dir.clone(),
        files,
    })
}

fn convert_file_rule(rule: &FileRuleConfig) -> Result<FileConfig> {
    let pattern = Regex::new(&rule.pattern).with_context(|| format!("Invalid filename pattern {}", rule.pattern))?;
    let format: MessageFormat = rule.format.parse()?;
    let timezone = FileConfig::parse_timezone(&rule.timezone)?;
    Ok(FileConfig::new(pattern, format, timezone))
}

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand environment variables in YAML content.
/// Supports ${VAR} and ${VAR:-default} syntax.
fn expand_env_vars(content: &str) -> Result<String> {
    let mut result = String::with_capacity(content.len());
    let mut chars = content.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();

            let mut var_expr = String::new();
            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(c) => var_expr.push(c),
                    None => anyhow::bail!("Unclosed variable substitution: ${{{}", var_expr),
                }
            }
            result.push_str(&resolve_var_expr(&var_expr)?);
        } else {
            result.push(ch);
        }
    }

    Ok(result)
}

/// Resolve `VAR` or `VAR:-default`. An empty variable takes the default.
fn resolve_var_expr(expr: &str) -> Result<String> {
    if let Some((var_name, default)) = expr.split_once(":-") {
        match std::env::var(var_name.trim()) {
            Ok(val) if !val.is_empty() => Ok(val),
            _ => Ok(default.to_string()),
        }
    } else {
        std::env::var(expr.trim()).with_context(|| format!("Environment variable {} not set", expr))
    }
}

// ============================================================================
// Validation
// ============================================================================

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: [&str; 2] = ["json", "pretty"];

pub fn validate_log_settings(level: &str, format: &str) -> Result<()> {
    anyhow::ensure!(
        LOG_LEVELS.contains(&level),
        "Invalid log level: {}. Must be one of: {:?}",
        level,
        LOG_LEVELS
    );
    anyhow::ensure!(
        LOG_FORMATS.contains(&format),
        "Invalid log format: {}. Must be one of: {:?}",
        format,
        LOG_FORMATS
    );
    Ok(())
}

fn validate_config(config: &ServiceConfig) -> Result<()> {
    anyhow::ensure!(config.ingester.poll_interval_secs > 0, "poll_interval_secs must be greater than 0");
    anyhow::ensure!(config.ingester.workers > 0, "workers must be greater than 0");
    anyhow::ensure!(
        config.ingester.shutdown.poll_interval_millis > 0,
        "shutdown.poll_interval_millis must be greater than 0"
    );
    for (name, retry) in [("database", &config.retry.database), ("file_move", &config.retry.file_move)] {
        anyhow::ensure!(retry.multiplier >= 1.0, "retry.{}.multiplier must be at least 1.0", name);
        anyhow::ensure!(
            retry.initial_interval_millis <= retry.max_interval_millis,
            "retry.{}.initial_interval_millis must not exceed max_interval_millis",
            name
        );
    }
    validate_log_settings(&config.logging.level, &config.logging.format)?;
    config.bulletin_heading_sources()?;

    for product in &config.products {
        config
            .ids
            .route_id(&product.route)
            .with_context(|| format!("product '{}'", product.id))?;
    }
    let products = config.products()?;
    validate_products(&products)?;

    for (index, spec) in config.populators.iter().enumerate() {
        anyhow::ensure!(
            !spec.name.trim().is_empty(),
            "populator chain element #{} has an empty name",
            index
        );
    }
    Ok(())
}
