//! Parameter handling shared by every module: desired state, connection
//! settings and client construction.
//!
//! ## Connection parameters
//!
//! | Parameter | Default | Description |
//! |-----------|---------|-------------|
//! | `host` | | Service hostname or full URL |
//! | `port` | service default | Service port |
//! | `protocol` | `https` | URL scheme |
//! | `username` / `password` | | Basic credentials |
//! | `api_key` | | API key, used instead of basic credentials |
//! | `validate_certs` | `true` | Verify TLS certificates |
//! | `timeout` | `30` | Request timeout in seconds |
//! | `retries` | `0` | Retries for transient failures |
//!
//! Elasticsearch and Kibana modules may instead set `ece_host` (plus
//! `ece_port`, `ece_username`, `ece_password`, `ece_api_key`) together with
//! `deployment_name`, and are then routed through the ECE proxy.

use super::{ModuleError, ModuleParams, ModuleResult, ParamExt};
use crate::client::{ece, elastic, endgame, kibana};
use crate::client::{Auth, ConnectionSettings, Ece, EceApiProxy, Elastic, Kibana, ProxyTarget};
use crate::poll::PollPolicy;
use std::time::Duration;
use tracing::debug;

/// Desired state of a managed object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum State {
    /// Object should exist
    #[default]
    Present,
    /// Object should not exist
    Absent,
}

impl State {
    pub fn from_str(s: &str) -> ModuleResult<Self> {
        match s.to_lowercase().as_str() {
            "present" => Ok(State::Present),
            "absent" => Ok(State::Absent),
            _ => Err(ModuleError::InvalidParameter(format!(
                "Invalid state '{}'. Valid states: present, absent",
                s
            ))),
        }
    }

    /// `state` parameter, defaulting to present.
    pub fn from_params(params: &ModuleParams) -> ModuleResult<Self> {
        match params.get_string("state")? {
            Some(s) => Self::from_str(&s),
            None => Ok(State::default()),
        }
    }
}

fn key(prefix: &str, name: &str) -> String {
    format!("{}{}", prefix, name)
}

/// Connection settings from `{prefix}host`, `{prefix}port`, ... parameters.
///
/// `protocol`, `validate_certs`, `timeout` and `retries` are shared by all
/// prefixes.
pub fn settings_with_prefix(
    params: &ModuleParams,
    prefix: &str,
    default_port: u16,
) -> ModuleResult<ConnectionSettings> {
    let host = params.get_string_required(&key(prefix, "host"))?;
    let port = match params.get_u32(&key(prefix, "port"))? {
        Some(port) => u16::try_from(port).map_err(|_| {
            ModuleError::InvalidParameter(format!("{} must be a valid port", key(prefix, "port")))
        })?,
        None => default_port,
    };

    let auth = match (
        params.get_string(&key(prefix, "api_key"))?,
        params.get_string(&key(prefix, "username"))?,
    ) {
        (Some(api_key), _) => Auth::ApiKey(api_key),
        (None, Some(username)) => {
            let password = params
                .get_string(&key(prefix, "password"))?
                .unwrap_or_default();
            Auth::basic(username, password)
        }
        (None, None) => Auth::None,
    };

    let timeout = params
        .get_u32("timeout")?
        .map(|s| Duration::from_secs(u64::from(s)))
        .unwrap_or(Duration::from_secs(crate::client::DEFAULT_TIMEOUT_SECS));

    Ok(ConnectionSettings::new(host, port)
        .with_protocol(
            params
                .get_string("protocol")?
                .unwrap_or_else(|| "https".to_string()),
        )
        .with_auth(auth)
        .with_timeout(timeout)
        .with_validate_certs(params.get_bool_or("validate_certs", true))
        .with_retries(params.get_u32("retries")?.unwrap_or(0)))
}

/// Direct connection settings for a service.
pub fn settings(params: &ModuleParams, default_port: u16) -> ModuleResult<ConnectionSettings> {
    settings_with_prefix(params, "", default_port)
}

/// Whether the module should go through the ECE deployment proxy.
pub fn uses_ece_proxy(params: &ModuleParams) -> bool {
    params.contains_key("ece_host") && params.contains_key("deployment_name")
}

/// ECE client from `host`/`port`/... parameters.
pub fn ece_client(params: &ModuleParams) -> ModuleResult<Ece> {
    Ok(Ece::new(&settings(params, ece::DEFAULT_PORT)?)?)
}

async fn proxy(params: &ModuleParams, target: ProxyTarget) -> ModuleResult<EceApiProxy> {
    let deployment_name = params.get_string_required("deployment_name")?;
    debug!(
        "Routing {:?} requests through ECE deployment '{}'",
        target, deployment_name
    );
    let ece = Ece::new(&settings_with_prefix(params, "ece_", ece::DEFAULT_PORT)?)?;
    Ok(EceApiProxy::for_deployment(&ece, &deployment_name, target).await?)
}

/// Elasticsearch client, direct or through the ECE proxy.
pub async fn elastic_client(params: &ModuleParams) -> ModuleResult<Elastic> {
    if uses_ece_proxy(params) {
        Ok(Elastic::with_transport(
            proxy(params, ProxyTarget::Elasticsearch).await?,
        ))
    } else {
        Ok(Elastic::new(&settings(params, elastic::DEFAULT_PORT)?)?)
    }
}

/// Kibana client, direct or through the ECE proxy, scoped to `space`.
pub async fn kibana_client(params: &ModuleParams) -> ModuleResult<Kibana> {
    let client = if uses_ece_proxy(params) {
        Kibana::with_transport(proxy(params, ProxyTarget::Kibana).await?)
    } else {
        Kibana::new(&settings(params, kibana::DEFAULT_PORT)?)?
    };
    Ok(match params.get_string("space")? {
        Some(space) => client.with_space(space),
        None => client,
    })
}

/// Endgame connection settings; login happens in the module.
pub fn endgame_settings(params: &ModuleParams) -> ModuleResult<ConnectionSettings> {
    settings(params, endgame::DEFAULT_PORT)
}

/// Poll policy from `poll_interval` and the given timeout parameter.
pub fn poll_policy(params: &ModuleParams, timeout_key: &str) -> ModuleResult<PollPolicy> {
    let defaults = PollPolicy::default();
    let interval = params
        .get_u32("poll_interval")?
        .map(|s| Duration::from_secs(u64::from(s)))
        .unwrap_or(defaults.interval);
    let timeout = params
        .get_u32(timeout_key)?
        .map(|s| Duration::from_secs(u64::from(s)))
        .unwrap_or(defaults.timeout);
    Ok(PollPolicy::constant(interval, timeout))
}

/// The string `id` of a document returned by an API.
pub fn id_of(document: &serde_json::Value, what: &str) -> ModuleResult<String> {
    document
        .get("id")
        .and_then(serde_json::Value::as_str)
        .map(String::from)
        .ok_or_else(|| ModuleError::ExecutionFailed(format!("{} without id", what)))
}

/// Require `key` to be one of `allowed`.
pub fn check_choice(params: &ModuleParams, key: &str, allowed: &[&str]) -> ModuleResult<()> {
    if let Some(value) = params.get_string(key)? {
        if !allowed.contains(&value.as_str()) {
            return Err(ModuleError::InvalidParameter(format!(
                "{} must be one of {}, got '{}'",
                key,
                allowed.join(", "),
                value
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: serde_json::Value) -> ModuleParams {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_state() {
        assert_eq!(State::from_params(&params(json!({}))).unwrap(), State::Present);
        assert_eq!(
            State::from_params(&params(json!({"state": "Absent"}))).unwrap(),
            State::Absent
        );
        assert!(State::from_params(&params(json!({"state": "gone"}))).is_err());
    }

    #[test]
    fn test_settings_defaults() {
        let s = settings(&params(json!({"host": "es.local"})), 9200).unwrap();
        assert_eq!(s.port, 9200);
        assert_eq!(s.protocol, "https");
        assert_eq!(s.auth, Auth::None);
        assert!(s.validate_certs);
    }

    #[test]
    fn test_settings_credentials() {
        let s = settings(
            &params(json!({
                "host": "es.local",
                "port": "9243",
                "username": "elastic",
                "password": "changeme",
                "validate_certs": "no",
                "timeout": 5
            })),
            9200,
        )
        .unwrap();
        assert_eq!(s.port, 9243);
        assert_eq!(s.auth, Auth::basic("elastic", "changeme"));
        assert!(!s.validate_certs);
        assert_eq!(s.timeout, Duration::from_secs(5));

        let s = settings(
            &params(json!({"host": "es.local", "api_key": "k", "username": "ignored"})),
            9200,
        )
        .unwrap();
        assert_eq!(s.auth, Auth::ApiKey("k".into()));
    }

    #[test]
    fn test_settings_with_prefix() {
        let p = params(json!({
            "host": "kibana.local",
            "ece_host": "ece.local",
            "ece_username": "admin",
            "ece_password": "pw",
            "deployment_name": "prod"
        }));
        assert!(uses_ece_proxy(&p));
        let s = settings_with_prefix(&p, "ece_", 12443).unwrap();
        assert_eq!(s.host, "ece.local");
        assert_eq!(s.port, 12443);
        assert_eq!(s.auth, Auth::basic("admin", "pw"));
    }

    #[test]
    fn test_settings_rejects_bad_port() {
        assert!(settings(&params(json!({"host": "h", "port": 70000})), 1).is_err());
        assert!(matches!(
            settings(&params(json!({})), 1),
            Err(ModuleError::MissingParameter(_))
        ));
    }

    #[test]
    fn test_poll_policy() {
        let p = params(json!({"completion_timeout": 30, "poll_interval": 1}));
        let policy = poll_policy(&p, "completion_timeout").unwrap();
        assert_eq!(policy.timeout, Duration::from_secs(30));
        assert_eq!(policy.interval, Duration::from_secs(1));
    }

    #[test]
    fn test_id_of() {
        assert_eq!(id_of(&json!({"id": "abc"}), "policy").unwrap(), "abc");
        assert!(id_of(&json!({"id": 3}), "policy").is_err());
    }

    #[test]
    fn test_check_choice() {
        let p = params(json!({"platform": "macos"}));
        assert!(check_choice(&p, "platform", &["windows", "linux", "macos"]).is_ok());
        assert!(check_choice(&p, "platform", &["windows"]).is_err());
        assert!(check_choice(&p, "missing", &["windows"]).is_ok());
    }
}
