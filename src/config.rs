//! Configuration for rustible-elastic
//!
//! Handles loading and merging configuration from multiple sources:
//! - Default values
//! - System configuration (/etc/rustible-elastic/config.toml)
//! - User configuration (~/.rustible-elastic.toml)
//! - Project configuration (./rustible-elastic.toml)
//! - Environment variables
//!
//! Service profiles hold connection defaults that are copied into module
//! parameters the task did not set itself.

use crate::modules::ModuleParams;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Environment variable naming an extra config file
pub const CONFIG_ENV: &str = "RUSTIBLE_ELASTIC_CONFIG";

const ENV_PREFIX: &str = "RUSTIBLE_ELASTIC";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// ECE control plane
    pub ece: ServiceProfile,

    /// Elasticsearch cluster
    pub elasticsearch: ServiceProfile,

    /// Kibana instance
    pub kibana: ServiceProfile,

    /// Endgame platform
    pub endgame: ServiceProfile,

    /// Polling of long-running ECE operations
    pub polling: PollingConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

/// Connection defaults for one service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceProfile {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub protocol: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub api_key: Option<String>,
    pub validate_certs: Option<bool>,
    /// Request timeout in seconds
    pub timeout: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_secs: Option<u64>,
    pub timeout_secs: Option<u64>,
}

/// Logging settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `rustible_elastic=debug`
    pub level: Option<String>,

    /// `text` or `json`
    pub format: Option<String>,
}

/// Service a module talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Ece,
    Elasticsearch,
    Kibana,
    Endgame,
}

impl Service {
    /// Service of a module, from its name prefix.
    pub fn for_module(name: &str) -> Option<Self> {
        let prefix = name.split('_').next()?;
        match prefix {
            "ece" => Some(Service::Ece),
            "elastic" => Some(Service::Elasticsearch),
            "kibana" => Some(Service::Kibana),
            "endgame" => Some(Service::Endgame),
            _ => None,
        }
    }

    fn env_name(&self) -> &'static str {
        match self {
            Service::Ece => "ECE",
            Service::Elasticsearch => "ELASTICSEARCH",
            Service::Kibana => "KIBANA",
            Service::Endgame => "ENDGAME",
        }
    }
}

impl ServiceProfile {
    fn merge(&self, other: ServiceProfile) -> ServiceProfile {
        ServiceProfile {
            host: other.host.or_else(|| self.host.clone()),
            port: other.port.or(self.port),
            protocol: other.protocol.or_else(|| self.protocol.clone()),
            username: other.username.or_else(|| self.username.clone()),
            password: other.password.or_else(|| self.password.clone()),
            api_key: other.api_key.or_else(|| self.api_key.clone()),
            validate_certs: other.validate_certs.or(self.validate_certs),
            timeout: other.timeout.or(self.timeout),
        }
    }

    /// Profile values as `(key, value)` parameter pairs.
    fn param_values(&self) -> Vec<(&'static str, Value)> {
        let mut values = Vec::new();
        if let Some(ref host) = self.host {
            values.push(("host", Value::from(host.as_str())));
        }
        if let Some(port) = self.port {
            values.push(("port", Value::from(port)));
        }
        if let Some(ref protocol) = self.protocol {
            values.push(("protocol", Value::from(protocol.as_str())));
        }
        if let Some(ref username) = self.username {
            values.push(("username", Value::from(username.as_str())));
        }
        if let Some(ref password) = self.password {
            values.push(("password", Value::from(password.as_str())));
        }
        if let Some(ref api_key) = self.api_key {
            values.push(("api_key", Value::from(api_key.as_str())));
        }
        if let Some(validate_certs) = self.validate_certs {
            values.push(("validate_certs", Value::from(validate_certs)));
        }
        if let Some(timeout) = self.timeout {
            values.push(("timeout", Value::from(timeout)));
        }
        values
    }

    /// Copy profile values into `params` under `prefix`, keeping set keys.
    fn fill(&self, params: &mut ModuleParams, prefix: &str) {
        for (key, value) in self.param_values() {
            // Shared connection keys have no prefixed form.
            let key = match key {
                "protocol" | "validate_certs" | "timeout" if !prefix.is_empty() => continue,
                key => format!("{}{}", prefix, key),
            };
            params.entry(key).or_insert(value);
        }
    }
}

impl Config {
    /// Load configuration from all sources
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut config = Config::default();

        for path in Self::config_paths(config_path) {
            if path.exists() {
                config = config.merge_from_file(&path)?;
            }
        }

        config.apply_env_overrides();
        Ok(config)
    }

    /// Configuration files to check, lowest precedence first
    fn config_paths(explicit_path: Option<&Path>) -> Vec<PathBuf> {
        if let Some(path) = explicit_path {
            return vec![path.to_path_buf()];
        }

        let mut paths = vec![PathBuf::from("/etc/rustible-elastic/config.toml")];
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".rustible-elastic.toml"));
        }
        paths.push(PathBuf::from("rustible-elastic.toml"));

        if let Ok(env_config) = std::env::var(CONFIG_ENV) {
            paths.insert(0, PathBuf::from(env_config));
        }
        paths
    }

    /// Merge configuration from a file
    fn merge_from_file(&self, path: &Path) -> Result<Self> {
        Ok(self.merge(Self::from_file(path)?))
    }

    /// Parse one file; the format follows the extension
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let parsed = match extension {
            "yml" | "yaml" => serde_yaml::from_str(&content).map_err(anyhow::Error::from),
            "json" => serde_json::from_str(&content).map_err(anyhow::Error::from),
            _ => toml::from_str(&content).map_err(anyhow::Error::from),
        };
        parsed.with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Merge another config into this one; set fields of `other` win
    fn merge(&self, other: Config) -> Config {
        Config {
            ece: self.ece.merge(other.ece),
            elasticsearch: self.elasticsearch.merge(other.elasticsearch),
            kibana: self.kibana.merge(other.kibana),
            endgame: self.endgame.merge(other.endgame),
            polling: PollingConfig {
                interval_secs: other.polling.interval_secs.or(self.polling.interval_secs),
                timeout_secs: other.polling.timeout_secs.or(self.polling.timeout_secs),
            },
            logging: LoggingConfig {
                level: other.logging.level.or_else(|| self.logging.level.clone()),
                format: other.logging.format.or_else(|| self.logging.format.clone()),
            },
        }
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        for service in [
            Service::Ece,
            Service::Elasticsearch,
            Service::Kibana,
            Service::Endgame,
        ] {
            let var = |field: &str| {
                std::env::var(format!("{}_{}_{}", ENV_PREFIX, service.env_name(), field)).ok()
            };
            let (host, username, password, api_key) =
                (var("HOST"), var("USERNAME"), var("PASSWORD"), var("API_KEY"));

            let profile = self.profile_mut(service);
            if host.is_some() {
                profile.host = host;
            }
            if username.is_some() {
                profile.username = username;
            }
            if password.is_some() {
                profile.password = password;
            }
            if api_key.is_some() {
                profile.api_key = api_key;
            }
        }

        // RUSTIBLE_ELASTIC_POLL_TIMEOUT
        if let Ok(timeout) = std::env::var(format!("{}_POLL_TIMEOUT", ENV_PREFIX)) {
            if let Ok(n) = timeout.parse() {
                self.polling.timeout_secs = Some(n);
            }
        }
    }

    pub fn profile(&self, service: Service) -> &ServiceProfile {
        match service {
            Service::Ece => &self.ece,
            Service::Elasticsearch => &self.elasticsearch,
            Service::Kibana => &self.kibana,
            Service::Endgame => &self.endgame,
        }
    }

    fn profile_mut(&mut self, service: Service) -> &mut ServiceProfile {
        match service {
            Service::Ece => &mut self.ece,
            Service::Elasticsearch => &mut self.elasticsearch,
            Service::Kibana => &mut self.kibana,
            Service::Endgame => &mut self.endgame,
        }
    }

    /// Fill module parameters the task left unset from the service profile.
    ///
    /// Elasticsearch and Kibana tasks naming a `deployment_name` also get
    /// the `ece_*` keys from the ECE profile so they can use the proxy.
    pub fn fill_params(&self, service: Service, params: &mut ModuleParams) {
        self.profile(service).fill(params, "");

        match service {
            Service::Ece => {
                if let Some(timeout) = self.polling.timeout_secs {
                    params
                        .entry("completion_timeout".to_string())
                        .or_insert_with(|| Value::from(timeout));
                }
                if let Some(interval) = self.polling.interval_secs {
                    params
                        .entry("poll_interval".to_string())
                        .or_insert_with(|| Value::from(interval));
                }
            }
            Service::Elasticsearch | Service::Kibana if params.contains_key("deployment_name") => {
                self.ece.fill(params, "ece_");
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.kibana.host.is_none());
        assert!(config.polling.timeout_secs.is_none());
        assert!(config.logging.format.is_none());
    }

    #[test]
    fn test_service_for_module() {
        assert_eq!(Service::for_module("ece_cluster"), Some(Service::Ece));
        assert_eq!(
            Service::for_module("elastic_role_mapping"),
            Some(Service::Elasticsearch)
        );
        assert_eq!(Service::for_module("kibana_space"), Some(Service::Kibana));
        assert_eq!(
            Service::for_module("endgame_sensor_configuration"),
            Some(Service::Endgame)
        );
        assert_eq!(Service::for_module("apt"), None);
    }

    #[test]
    fn test_config_merge() {
        let base = Config {
            kibana: ServiceProfile {
                host: Some("kb-base".into()),
                username: Some("elastic".into()),
                ..Default::default()
            },
            ..Config::default()
        };
        let other = Config {
            kibana: ServiceProfile {
                host: Some("kb-project".into()),
                ..Default::default()
            },
            ..Config::default()
        };

        let merged = base.merge(other);
        assert_eq!(merged.kibana.host.as_deref(), Some("kb-project"));
        assert_eq!(merged.kibana.username.as_deref(), Some("elastic"));
    }

    #[test]
    fn test_from_file_formats() {
        let mut toml_file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            toml_file,
            "[kibana]\nhost = \"kb.local\"\nport = 5602\n\n[polling]\ntimeout_secs = 900"
        )
        .unwrap();
        let config = Config::from_file(toml_file.path()).unwrap();
        assert_eq!(config.kibana.host.as_deref(), Some("kb.local"));
        assert_eq!(config.kibana.port, Some(5602));
        assert_eq!(config.polling.timeout_secs, Some(900));

        let mut yaml_file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        writeln!(yaml_file, "ece:\n  host: ece.local\n  api_key: abc").unwrap();
        let config = Config::from_file(yaml_file.path()).unwrap();
        assert_eq!(config.ece.api_key.as_deref(), Some("abc"));

        let mut json_file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        writeln!(json_file, "{{\"logging\": {{\"format\": \"json\"}}}}").unwrap();
        let config = Config::from_file(json_file.path()).unwrap();
        assert_eq!(config.logging.format.as_deref(), Some("json"));
    }

    #[test]
    fn test_bad_file_is_an_error() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[kibana\nhost=").unwrap();
        assert!(Config::from_file(file.path()).is_err());
    }

    #[test]
    #[serial]
    fn test_env_override() {
        std::env::set_var("RUSTIBLE_ELASTIC_KIBANA_HOST", "kb.env");
        std::env::set_var("RUSTIBLE_ELASTIC_POLL_TIMEOUT", "120");
        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.kibana.host.as_deref(), Some("kb.env"));
        assert_eq!(config.polling.timeout_secs, Some(120));
        std::env::remove_var("RUSTIBLE_ELASTIC_KIBANA_HOST");
        std::env::remove_var("RUSTIBLE_ELASTIC_POLL_TIMEOUT");
    }

    #[test]
    #[serial]
    fn test_explicit_path_is_used_alone() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[endgame]\nhost = \"eg.local\"").unwrap();
        std::env::set_var(CONFIG_ENV, "/nonexistent/other.toml");
        let paths = Config::config_paths(Some(file.path()));
        std::env::remove_var(CONFIG_ENV);
        assert_eq!(paths, vec![file.path().to_path_buf()]);

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.endgame.host.as_deref(), Some("eg.local"));
    }

    #[test]
    fn test_fill_params_keeps_explicit_values() {
        let config = Config {
            elasticsearch: ServiceProfile {
                host: Some("es.local".into()),
                username: Some("elastic".into()),
                validate_certs: Some(false),
                ..Default::default()
            },
            ..Config::default()
        };
        let mut params: ModuleParams =
            serde_json::from_value(json!({"name": "m", "username": "admin"})).unwrap();
        config.fill_params(Service::Elasticsearch, &mut params);
        assert_eq!(params["host"], json!("es.local"));
        assert_eq!(params["username"], json!("admin"));
        assert_eq!(params["validate_certs"], json!(false));
    }

    #[test]
    fn test_fill_params_for_proxied_tasks() {
        let config = Config {
            ece: ServiceProfile {
                host: Some("ece.local".into()),
                api_key: Some("k".into()),
                timeout: Some(60),
                ..Default::default()
            },
            polling: PollingConfig {
                interval_secs: Some(5),
                timeout_secs: Some(600),
            },
            ..Config::default()
        };

        let mut params: ModuleParams =
            serde_json::from_value(json!({"deployment_name": "prod"})).unwrap();
        config.fill_params(Service::Kibana, &mut params);
        assert_eq!(params["ece_host"], json!("ece.local"));
        assert_eq!(params["ece_api_key"], json!("k"));
        assert!(!params.contains_key("ece_timeout"));

        let mut params = ModuleParams::new();
        config.fill_params(Service::Ece, &mut params);
        assert_eq!(params["host"], json!("ece.local"));
        assert_eq!(params["completion_timeout"], json!(600));
        assert_eq!(params["poll_interval"], json!(5));
    }
}
