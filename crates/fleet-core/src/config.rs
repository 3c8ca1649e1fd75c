//! fleet.toml configuration parser.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{FleetError, FleetResult};
use crate::types::ActivationPolicy;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FleetConfig {
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefaultsConfig {
    pub project: Option<String>,
    pub region: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionConfig {
    pub concurrency: Option<usize>,
    pub call_timeout: Option<String>,
    pub operation_timeout: Option<String>,
    pub max_attempts: Option<u32>,
    pub initial_backoff: Option<String>,
    pub max_backoff: Option<String>,
    pub poll_interval: Option<String>,
    pub ready_timeout: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub name: String,
    pub project: Option<String>,
    /// Policy the instance is believed to be in when the registry loads.
    pub activation_policy: Option<ActivationPolicy>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub image: String,
    pub region: Option<String>,
    pub project: Option<String>,
    pub min_instances: Option<u32>,
    pub cpu: Option<String>,
    pub memory: Option<String>,
    #[serde(default)]
    pub depends_on_database: bool,
    pub ready_url: Option<String>,
}

/// Resolved execution knobs shared by the orchestrator, the pruner and
/// the control-plane client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionSettings {
    /// Maximum remote operations in flight at once.
    pub concurrency: usize,
    /// Timeout for a single HTTP round trip.
    pub call_timeout: Duration,
    /// Timeout for a whole client operation, including operation polling.
    pub operation_timeout: Duration,
    /// Attempts per operation when failures are transient.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Interval between long-running operation polls.
    pub poll_interval: Duration,
    /// How long to wait for `ready_url` to answer after warming.
    pub ready_timeout: Duration,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            concurrency: 4,
            call_timeout: Duration::from_secs(30),
            operation_timeout: Duration::from_secs(600),
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
            poll_interval: Duration::from_secs(2),
            ready_timeout: Duration::from_secs(300),
        }
    }
}

impl FleetConfig {
    pub fn from_file(path: &Path) -> FleetResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            FleetError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> FleetResult<Self> {
        toml::from_str(content).map_err(|e| FleetError::Configuration(e.to_string()))
    }

    /// Resolve `[execution]` against the built-in defaults.
    pub fn execution_settings(&self) -> FleetResult<ExecutionSettings> {
        let defaults = ExecutionSettings::default();
        let exec = &self.execution;

        let settings = ExecutionSettings {
            concurrency: exec.concurrency.unwrap_or(defaults.concurrency),
            call_timeout: duration_or(&exec.call_timeout, defaults.call_timeout)?,
            operation_timeout: duration_or(&exec.operation_timeout, defaults.operation_timeout)?,
            max_attempts: exec.max_attempts.unwrap_or(defaults.max_attempts),
            initial_backoff: duration_or(&exec.initial_backoff, defaults.initial_backoff)?,
            max_backoff: duration_or(&exec.max_backoff, defaults.max_backoff)?,
            poll_interval: duration_or(&exec.poll_interval, defaults.poll_interval)?,
            ready_timeout: duration_or(&exec.ready_timeout, defaults.ready_timeout)?,
        };

        if settings.concurrency == 0 {
            return Err(FleetError::Configuration(
                "execution.concurrency must be at least 1".to_string(),
            ));
        }
        if settings.max_attempts == 0 {
            return Err(FleetError::Configuration(
                "execution.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(settings)
    }
}

fn duration_or(value: &Option<String>, default: Duration) -> FleetResult<Duration> {
    match value {
        Some(s) => parse_duration(s),
        None => Ok(default),
    }
}

/// Parse a duration string like "500ms", "30s" or "5m".
pub fn parse_duration(s: &str) -> FleetResult<Duration> {
    let s = s.trim();
    let invalid = || FleetError::Configuration(format!("invalid duration '{s}'"));

    if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().map(Duration::from_millis).map_err(|_| invalid())
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().map(Duration::from_secs).map_err(|_| invalid())
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>()
            .map(|m| Duration::from_secs(m * 60))
            .map_err(|_| invalid())
    } else {
        s.parse::<u64>().map(Duration::from_secs).map_err(|_| invalid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[defaults]
project = "geo"
region = "europe-west8"

[execution]
concurrency = 2
call_timeout = "10s"
initial_backoff = "250ms"

[database]
name = "geodb"

[[services]]
name = "geoserver"
image = "europe-west8-docker.pkg.dev/geo/images/geoserver:latest"
cpu = "2"
memory = "4Gi"
depends_on_database = true

[[services]]
name = "tiles"
image = "europe-west8-docker.pkg.dev/geo/images/tiles:latest"
"#;

    #[test]
    fn parses_sample() {
        let config = FleetConfig::parse(SAMPLE).unwrap();
        assert_eq!(config.database.name, "geodb");
        assert_eq!(config.services.len(), 2);
        assert!(config.services[0].depends_on_database);
        assert!(!config.services[1].depends_on_database);
        assert_eq!(config.services[0].memory.as_deref(), Some("4Gi"));
    }

    #[test]
    fn execution_settings_fill_defaults() {
        let config = FleetConfig::parse(SAMPLE).unwrap();
        let settings = config.execution_settings().unwrap();
        assert_eq!(settings.concurrency, 2);
        assert_eq!(settings.call_timeout, Duration::from_secs(10));
        assert_eq!(settings.initial_backoff, Duration::from_millis(250));
        assert_eq!(settings.max_attempts, 3);
        assert_eq!(settings.operation_timeout, Duration::from_secs(600));
    }

    #[test]
    fn zero_concurrency_rejected() {
        let mut config = FleetConfig::parse(SAMPLE).unwrap();
        config.execution.concurrency = Some(0);
        assert!(matches!(
            config.execution_settings(),
            Err(FleetError::Configuration(_))
        ));
    }

    #[test]
    fn missing_database_is_configuration_error() {
        let err = FleetConfig::parse("[[services]]\nname = \"a\"\nimage = \"i\"\n").unwrap_err();
        assert!(matches!(err, FleetError::Configuration(_)));
    }

    #[test]
    fn parse_duration_values() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("7").unwrap(), Duration::from_secs(7));
        assert!(parse_duration("soon").is_err());
    }

    #[test]
    fn reads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fleet.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = FleetConfig::from_file(&path).unwrap();
        assert_eq!(config.defaults.project.as_deref(), Some("geo"));

        let missing = FleetConfig::from_file(&dir.path().join("nope.toml"));
        assert!(matches!(missing, Err(FleetError::Configuration(_))));
    }
}
