//! ECE deployment module.
//!
//! ## Parameters
//!
//! | Parameter | Required | Description |
//! |-----------|----------|-------------|
//! | `cluster_name` | Yes | Deployment name |
//! | `elastic_version` | present | Stack version, e.g. `8.11.1` |
//! | `deployment_template` | present* | Template name, resolved to its id |
//! | `deployment_template_id` | present* | Template id, skips the lookup |
//! | `elasticsearch` | No | Topology list: `id`, `zone_count`, `size_mb`, `node_roles` |
//! | `zone_count` | No | Zones of the default `hot_content` topology (default: 1) |
//! | `memory_mb` | No | Memory of the default topology (default: 4096) |
//! | `kibana` | No | `{zone_count, size_mb}` or `false` (default: 1 zone, 1024 MB) |
//! | `apm` | No | `{zone_count, size_mb}` or `true` |
//! | `snapshot_repository` | No | Snapshot repository to attach |
//! | `wait_for_completion` | No | Wait for Elasticsearch and Kibana to start (default: false) |
//! | `completion_timeout` | No | Seconds to wait (default: 600) |
//! | `state` | No | present or absent (default: present) |
//! | `delete` | No | With absent, delete after shutting down (default: false) |
//!
//! ## Example
//!
//! ```yaml
//! - name: Create a deployment
//!   ece_cluster:
//!     host: ece.example.com
//!     username: admin
//!     password: "{{ ece_password }}"
//!     cluster_name: prod-logging
//!     elastic_version: 8.11.1
//!     deployment_template: default
//!     elasticsearch:
//!       - id: hot_content
//!         zone_count: 2
//!         size_mb: 8192
//!     wait_for_completion: true
//! ```

use crate::client::ece::{
    creation_credentials, resource_ref_id, resource_status_of, DeploymentRequest, Ece,
    ResourceKind, TopologySize, ELASTICSEARCH_REF_ID, KIBANA_REF_ID,
};
use crate::error::OptionalExt;
use crate::modules::common::{ece_client, poll_policy, State};
use crate::modules::{
    run_async, Diff, Module, ModuleContext, ModuleError, ModuleOutput, ModuleParams, ModuleResult,
    ParamExt,
};
use crate::poll::PollPolicy;
use serde_json::{json, Value};
use tracing::{info, warn};

const DEFAULT_TOPOLOGY_ID: &str = "hot_content";
const DEFAULT_ES_MEMORY_MB: u32 = 4096;
const DEFAULT_KIBANA_MEMORY_MB: u32 = 1024;
const DEFAULT_APM_MEMORY_MB: u32 = 512;

#[derive(Debug, Clone)]
enum Template {
    Id(String),
    Name(String),
}

#[derive(Debug, Clone)]
struct ClusterConfig {
    cluster_name: String,
    state: State,
    version: Option<String>,
    template: Option<Template>,
    elasticsearch: Vec<TopologySize>,
    kibana: Option<(u32, u32)>,
    apm: Option<(u32, u32)>,
    snapshot_repository: Option<String>,
    wait_for_completion: bool,
    delete: bool,
    poll: PollPolicy,
}

fn parse_size(value: &Value, default_mb: u32, what: &str) -> ModuleResult<Option<(u32, u32)>> {
    match value {
        Value::Bool(false) | Value::Null => Ok(None),
        Value::Bool(true) => Ok(Some((1, default_mb))),
        Value::Object(map) => {
            let number = |key: &str, default: u32| -> ModuleResult<u32> {
                match map.get(key) {
                    None => Ok(default),
                    Some(v) => v
                        .as_u64()
                        .and_then(|n| u32::try_from(n).ok())
                        .ok_or_else(|| {
                            ModuleError::InvalidParameter(format!(
                                "{}.{} must be a positive integer",
                                what, key
                            ))
                        }),
                }
            };
            Ok(Some((number("zone_count", 1)?, number("size_mb", default_mb)?)))
        }
        _ => Err(ModuleError::InvalidParameter(format!(
            "{} must be an object or a boolean",
            what
        ))),
    }
}

fn parse_topology(value: &Value) -> ModuleResult<TopologySize> {
    let id = value
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_TOPOLOGY_ID);
    let (zone_count, size_mb) = parse_size(value, DEFAULT_ES_MEMORY_MB, "elasticsearch")?
        .unwrap_or((1, DEFAULT_ES_MEMORY_MB));
    let mut topology = TopologySize::new(id, zone_count, size_mb);
    if let Some(roles) = value.get("node_roles").and_then(Value::as_array) {
        topology.node_roles = roles
            .iter()
            .filter_map(Value::as_str)
            .map(String::from)
            .collect();
    }
    Ok(topology)
}

impl ClusterConfig {
    fn from_params(params: &ModuleParams) -> ModuleResult<Self> {
        let cluster_name = params.get_string_required("cluster_name")?;
        let state = State::from_params(params)?;

        let template = match (
            params.get_string("deployment_template_id")?,
            params.get_string("deployment_template")?,
        ) {
            (Some(id), _) => Some(Template::Id(id)),
            (None, Some(name)) => Some(Template::Name(name)),
            (None, None) => None,
        };

        let elasticsearch = match params.get("elasticsearch") {
            Some(Value::Array(items)) => items
                .iter()
                .map(parse_topology)
                .collect::<ModuleResult<Vec<_>>>()?,
            Some(_) => {
                return Err(ModuleError::InvalidParameter(
                    "elasticsearch must be a list of topology elements".to_string(),
                ))
            }
            None => vec![TopologySize::new(
                DEFAULT_TOPOLOGY_ID,
                params.get_u32("zone_count")?.unwrap_or(1),
                params.get_u32("memory_mb")?.unwrap_or(DEFAULT_ES_MEMORY_MB),
            )],
        };

        let kibana = match params.get("kibana") {
            Some(value) => parse_size(value, DEFAULT_KIBANA_MEMORY_MB, "kibana")?,
            None => Some((1, DEFAULT_KIBANA_MEMORY_MB)),
        };
        let apm = match params.get("apm") {
            Some(value) => parse_size(value, DEFAULT_APM_MEMORY_MB, "apm")?,
            None => None,
        };

        Ok(Self {
            cluster_name,
            state,
            version: params.get_string("elastic_version")?,
            template,
            elasticsearch,
            kibana,
            apm,
            snapshot_repository: params.get_string("snapshot_repository")?,
            wait_for_completion: params.get_bool_or("wait_for_completion", false),
            delete: params.get_bool_or("delete", false),
            poll: poll_policy(params, "completion_timeout")?,
        })
    }

    fn request(&self, template_id: &str) -> ModuleResult<DeploymentRequest> {
        let version = self
            .version
            .clone()
            .ok_or_else(|| ModuleError::MissingParameter("elastic_version".to_string()))?;
        let mut request = DeploymentRequest::new(&self.cluster_name, version, template_id);
        for topology in &self.elasticsearch {
            request = request.with_elasticsearch(topology.clone());
        }
        if let Some((zones, size)) = self.kibana {
            request = request.with_kibana(zones, size);
        }
        if let Some((zones, size)) = self.apm {
            request = request.with_apm(zones, size);
        }
        if let Some(ref repository) = self.snapshot_repository {
            request = request.with_snapshot_repository(repository);
        }
        Ok(request)
    }
}

/// Module managing ECE deployments
pub struct EceClusterModule;

impl EceClusterModule {
    async fn resolve_template(ece: &Ece, template: &Template) -> ModuleResult<String> {
        match template {
            Template::Id(id) => Ok(id.clone()),
            Template::Name(name) => {
                let found = ece
                    .deployment_template_by_name(name)
                    .await?
                    .ok_or_else(|| {
                        ModuleError::NotFound(format!("deployment template '{}'", name))
                    })?;
                found
                    .get("id")
                    .and_then(Value::as_str)
                    .map(String::from)
                    .ok_or_else(|| {
                        ModuleError::ExecutionFailed(format!("template '{}' has no id", name))
                    })
            }
        }
    }

    /// Elasticsearch status from the list entry, else from the resource info.
    async fn elasticsearch_status(
        ece: &Ece,
        deployment_id: &str,
        deployment: &Value,
        ref_id: Option<&str>,
    ) -> ModuleResult<Option<String>> {
        if let Some(status) = deployment
            .pointer("/resources/elasticsearch/0/info/status")
            .and_then(Value::as_str)
        {
            return Ok(Some(status.to_string()));
        }
        let Some(ref_id) = ref_id else {
            return Ok(None);
        };
        let info = ece
            .resource_info(deployment_id, ResourceKind::Elasticsearch, ref_id)
            .await
            .optional()?;
        Ok(info.as_ref().and_then(resource_status_of).map(String::from))
    }

    async fn execute_async(
        &self,
        params: &ModuleParams,
        context: &ModuleContext,
    ) -> ModuleResult<ModuleOutput> {
        let config = ClusterConfig::from_params(params)?;
        let ece = ece_client(params)?;
        let existing = ece.deployment_by_name(&config.cluster_name).await?;

        match config.state {
            State::Present => self.ensure_present(&ece, &config, existing, context).await,
            State::Absent => self.ensure_absent(&ece, &config, existing, context).await,
        }
    }

    async fn ensure_present(
        &self,
        ece: &Ece,
        config: &ClusterConfig,
        existing: Option<Value>,
        context: &ModuleContext,
    ) -> ModuleResult<ModuleOutput> {
        if let Some(deployment) = existing {
            let id = deployment.get("id").cloned().unwrap_or(Value::Null);
            return Ok(ModuleOutput::ok(format!(
                "Deployment '{}' already exists",
                config.cluster_name
            ))
            .with_data("deployment_id", id)
            .with_data("cluster_name", json!(config.cluster_name)));
        }

        let template = config.template.as_ref().ok_or_else(|| {
            ModuleError::MissingParameter(
                "deployment_template or deployment_template_id".to_string(),
            )
        })?;

        let template_id = Self::resolve_template(ece, template).await?;
        let body = config.request(&template_id)?.to_body();

        if context.check_mode {
            return Ok(ModuleOutput::changed(format!(
                "Would create deployment '{}'",
                config.cluster_name
            ))
            .with_diff_if(context, || Diff::json(None, Some(&body))));
        }

        let response = ece.create_deployment(&body).await?;

        let deployment_id = response
            .get("id")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| {
                ModuleError::ExecutionFailed("create response carried no deployment id".to_string())
            })?;
        info!(
            "Created deployment '{}' ({})",
            config.cluster_name, deployment_id
        );

        if config.wait_for_completion {
            ece.wait_for_cluster_state(
                &deployment_id,
                ResourceKind::Elasticsearch,
                ELASTICSEARCH_REF_ID,
                "started",
                &config.poll,
            )
            .await?;
            if config.kibana.is_some() {
                ece.wait_for_cluster_state(
                    &deployment_id,
                    ResourceKind::Kibana,
                    KIBANA_REF_ID,
                    "started",
                    &config.poll,
                )
                .await?;
            }
        }

        Ok(ModuleOutput::changed(format!(
            "Created deployment '{}'",
            config.cluster_name
        ))
        .with_diff_if(context, || Diff::json(None, Some(&body)))
        .with_data("deployment_id", json!(deployment_id))
        .with_data("cluster_name", json!(config.cluster_name))
        .with_data(
            "credentials",
            creation_credentials(&response).unwrap_or(Value::Null),
        ))
    }

    async fn ensure_absent(
        &self,
        ece: &Ece,
        config: &ClusterConfig,
        existing: Option<Value>,
        context: &ModuleContext,
    ) -> ModuleResult<ModuleOutput> {
        let Some(deployment) = existing else {
            return Ok(ModuleOutput::ok(format!(
                "Deployment '{}' does not exist",
                config.cluster_name
            )));
        };

        let deployment_id = deployment
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| ModuleError::ExecutionFailed("deployment without id".to_string()))?;
        let es_ref_id = resource_ref_id(&deployment, ResourceKind::Elasticsearch);
        let status =
            Self::elasticsearch_status(ece, deployment_id, &deployment, es_ref_id.as_deref())
                .await?;
        let stopped = status.as_deref() == Some("stopped");

        if stopped && !config.delete {
            return Ok(ModuleOutput::ok(format!(
                "Deployment '{}' is already shut down",
                config.cluster_name
            ))
            .with_data("deployment_id", json!(deployment_id)));
        }

        let verb = if config.delete { "delete" } else { "shut down" };
        if context.check_mode {
            return Ok(ModuleOutput::changed(format!(
                "Would {} deployment '{}'",
                verb, config.cluster_name
            )));
        }

        if !stopped {
            ece.shutdown_deployment(deployment_id).await?;
        }

        if config.delete {
            match es_ref_id {
                Some(ref_id) => {
                    ece.wait_for_cluster_state(
                        deployment_id,
                        ResourceKind::Elasticsearch,
                        &ref_id,
                        "stopped",
                        &config.poll,
                    )
                    .await?;
                }
                None => warn!(
                    "Deployment {} has no Elasticsearch resource, deleting without waiting",
                    deployment_id
                ),
            }
            ece.delete_deployment(deployment_id).await?;
        }

        let done = if config.delete { "Deleted" } else { "Shut down" };
        Ok(ModuleOutput::changed(format!(
            "{} deployment '{}'",
            done, config.cluster_name
        ))
        .with_data("deployment_id", json!(deployment_id)))
    }
}

impl Module for EceClusterModule {
    fn name(&self) -> &'static str {
        "ece_cluster"
    }

    fn description(&self) -> &'static str {
        "Create, shut down and delete ECE deployments"
    }

    fn required_params(&self) -> &[&'static str] {
        &["host", "cluster_name"]
    }

    fn validate_params(&self, params: &ModuleParams) -> ModuleResult<()> {
        let config = ClusterConfig::from_params(params)?;
        if config.state == State::Present {
            if config.version.is_none() {
                return Err(ModuleError::MissingParameter("elastic_version".to_string()));
            }
            if config.elasticsearch.is_empty() {
                return Err(ModuleError::InvalidParameter(
                    "elasticsearch needs at least one topology element".to_string(),
                ));
            }
        }
        Ok(())
    }

    fn execute(
        &self,
        params: &ModuleParams,
        context: &ModuleContext,
    ) -> ModuleResult<ModuleOutput> {
        run_async(self.execute_async(params, context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn params(value: Value) -> ModuleParams {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_config_defaults() {
        let config = ClusterConfig::from_params(&params(json!({
            "cluster_name": "logs",
            "elastic_version": "8.11.1",
            "deployment_template": "default"
        })))
        .unwrap();
        assert_eq!(config.state, State::Present);
        assert_eq!(
            config.elasticsearch,
            vec![TopologySize::new("hot_content", 1, 4096)]
        );
        assert_eq!(config.kibana, Some((1, 1024)));
        assert_eq!(config.apm, None);
        assert!(!config.wait_for_completion);
    }

    #[test]
    fn test_config_topology_list() {
        let config = ClusterConfig::from_params(&params(json!({
            "cluster_name": "logs",
            "elastic_version": "8.11.1",
            "deployment_template_id": "default",
            "elasticsearch": [
                {"id": "hot_content", "zone_count": 2, "size_mb": 8192},
                {"id": "master", "size_mb": 1024, "node_roles": ["master"]}
            ],
            "kibana": false,
            "apm": true
        })))
        .unwrap();
        assert_eq!(config.elasticsearch.len(), 2);
        assert_eq!(config.elasticsearch[1].node_roles, vec!["master"]);
        assert_eq!(config.kibana, None);
        assert_eq!(config.apm, Some((1, DEFAULT_APM_MEMORY_MB)));

        let body = config.request("default").unwrap().to_body();
        assert!(body["resources"].get("kibana").is_none());
        assert_eq!(body["resources"]["apm"][0]["ref_id"], "main-apm");
    }

    #[test]
    fn test_validate_requires_version_when_present() {
        let module = EceClusterModule;
        let err = module
            .validate_params(&params(json!({"cluster_name": "logs"})))
            .unwrap_err();
        assert!(matches!(err, ModuleError::MissingParameter(p) if p == "elastic_version"));

        assert!(module
            .validate_params(&params(json!({"cluster_name": "logs", "state": "absent"})))
            .is_ok());
    }

    #[test]
    fn test_invalid_kibana_size() {
        assert!(ClusterConfig::from_params(&params(json!({
            "cluster_name": "logs",
            "kibana": "big"
        })))
        .is_err());
    }
}
