//! Elastic Cloud Enterprise management API.
//!
//! Covers deployments (create, inspect, shut down, delete), their resource
//! status, deployment templates and platform snapshot repositories. Paths are
//! relative to `/api/v1`.

use super::{encode_segment, list_at, ApiClient, ConnectionSettings, Transport};
use crate::error::{Error, OptionalExt, Result};
use crate::poll::PollPolicy;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use tracing::{debug, info};

/// Default ECE admin console / API port
pub const DEFAULT_PORT: u16 = 12443;

/// Region every resource of an on-premises ECE install lives in
pub const DEFAULT_REGION: &str = "ece-region";

/// ref_id used for the Elasticsearch resource of new deployments
pub const ELASTICSEARCH_REF_ID: &str = "main-elasticsearch";

/// ref_id used for the Kibana resource of new deployments
pub const KIBANA_REF_ID: &str = "main-kibana";

/// ref_id used for the APM resource of new deployments
pub const APM_REF_ID: &str = "main-apm";

const API: &str = "/api/v1";

/// Kind of resource inside a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Elasticsearch,
    Kibana,
    Apm,
    IntegrationsServer,
    EnterpriseSearch,
    Appsearch,
}

impl ResourceKind {
    /// Path segment and key used by the ECE API.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Elasticsearch => "elasticsearch",
            ResourceKind::Kibana => "kibana",
            ResourceKind::Apm => "apm",
            ResourceKind::IntegrationsServer => "integrations_server",
            ResourceKind::EnterpriseSearch => "enterprise_search",
            ResourceKind::Appsearch => "appsearch",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Size and placement of one cluster topology element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologySize {
    /// Topology element id (`hot_content`, `warm`, `master`, ...)
    pub id: String,
    /// Number of availability zones
    pub zone_count: u32,
    /// Memory per instance in MB
    pub size_mb: u32,
    /// Optional explicit node roles
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub node_roles: Vec<String>,
}

impl TopologySize {
    pub fn new(id: impl Into<String>, zone_count: u32, size_mb: u32) -> Self {
        Self {
            id: id.into(),
            zone_count,
            size_mb,
            node_roles: Vec::new(),
        }
    }

    fn to_topology(&self) -> Value {
        let mut topology = json!({
            "id": self.id,
            "zone_count": self.zone_count,
            "size": { "resource": "memory", "value": self.size_mb },
        });
        if !self.node_roles.is_empty() {
            topology["node_roles"] = json!(self.node_roles);
        }
        topology
    }
}

/// Parameters for a new deployment.
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentRequest {
    pub name: String,
    pub version: String,
    pub template_id: String,
    pub region: String,
    pub elasticsearch: Vec<TopologySize>,
    pub kibana: Option<TopologySize>,
    pub apm: Option<TopologySize>,
    pub snapshot_repository: Option<String>,
}

impl DeploymentRequest {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        template_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            template_id: template_id.into(),
            region: DEFAULT_REGION.to_string(),
            elasticsearch: Vec::new(),
            kibana: None,
            apm: None,
            snapshot_repository: None,
        }
    }

    pub fn with_elasticsearch(mut self, topology: TopologySize) -> Self {
        self.elasticsearch.push(topology);
        self
    }

    pub fn with_kibana(mut self, zone_count: u32, size_mb: u32) -> Self {
        self.kibana = Some(TopologySize::new("kibana", zone_count, size_mb));
        self
    }

    pub fn with_apm(mut self, zone_count: u32, size_mb: u32) -> Self {
        self.apm = Some(TopologySize::new("apm", zone_count, size_mb));
        self
    }

    pub fn with_snapshot_repository(mut self, repository: impl Into<String>) -> Self {
        self.snapshot_repository = Some(repository.into());
        self
    }

    /// Render the ECE create-deployment body.
    pub fn to_body(&self) -> Value {
        let topology: Vec<Value> = self
            .elasticsearch
            .iter()
            .map(TopologySize::to_topology)
            .collect();

        let mut elasticsearch = json!({
            "ref_id": ELASTICSEARCH_REF_ID,
            "region": self.region,
            "plan": {
                "cluster_topology": topology,
                "elasticsearch": { "version": self.version },
                "deployment_template": { "id": self.template_id },
            },
        });

        if let Some(ref repository) = self.snapshot_repository {
            elasticsearch["settings"] = json!({
                "snapshot": {
                    "enabled": true,
                    "repository": { "reference": { "repository_name": repository } },
                }
            });
        }

        let mut resources = json!({ "elasticsearch": [elasticsearch] });

        if let Some(ref kibana) = self.kibana {
            resources["kibana"] = json!([self.attached_resource(KIBANA_REF_ID, "kibana", kibana)]);
        }

        if let Some(ref apm) = self.apm {
            resources["apm"] = json!([self.attached_resource(APM_REF_ID, "apm", apm)]);
        }

        json!({ "name": self.name, "resources": resources })
    }

    fn attached_resource(&self, ref_id: &str, kind: &str, size: &TopologySize) -> Value {
        let mut plan = json!({
            "cluster_topology": [{
                "zone_count": size.zone_count,
                "size": { "resource": "memory", "value": size.size_mb },
            }],
        });
        plan[kind] = json!({ "version": self.version });

        json!({
            "ref_id": ref_id,
            "elasticsearch_cluster_ref_id": ELASTICSEARCH_REF_ID,
            "region": self.region,
            "plan": plan,
        })
    }
}

/// ref_id of the first resource of `kind` in a deployment document.
pub fn resource_ref_id(deployment: &Value, kind: ResourceKind) -> Option<String> {
    deployment
        .get("resources")?
        .get(kind.as_str())?
        .get(0)?
        .get("ref_id")?
        .as_str()
        .map(String::from)
}

/// Credentials returned for the Elasticsearch resource on creation.
pub fn creation_credentials(response: &Value) -> Option<Value> {
    response
        .get("resources")?
        .as_array()?
        .iter()
        .find_map(|r| r.get("credentials").cloned())
}

/// `info.status` of a resource info document.
pub fn resource_status_of(info: &Value) -> Option<&str> {
    info.pointer("/info/status").and_then(Value::as_str)
}

/// Client for the ECE REST API.
#[derive(Debug, Clone)]
pub struct Ece {
    client: ApiClient,
}

impl Ece {
    pub fn new(settings: &ConnectionSettings) -> Result<Self> {
        Ok(Self {
            client: ApiClient::new(settings)?,
        })
    }

    pub fn from_client(client: ApiClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    // ---------------------------------------------------------------------
    // Deployments
    // ---------------------------------------------------------------------

    /// All deployments visible to the user.
    pub async fn deployments(&self) -> Result<Vec<Value>> {
        let response = self.client.get(&format!("{}/deployments", API)).await?;
        list_at(&response, "deployments")
    }

    pub async fn deployment_by_name(&self, name: &str) -> Result<Option<Value>> {
        let deployments = self.deployments().await?;
        Ok(deployments
            .into_iter()
            .find(|d| d.get("name").and_then(Value::as_str) == Some(name)))
    }

    /// Full deployment document, `None` when the id is unknown.
    pub async fn deployment(&self, deployment_id: &str) -> Result<Option<Value>> {
        self.client
            .get_opt(&format!("{}/deployments/{}", API, encode_segment(deployment_id)))
            .await
    }

    pub async fn resource_info(
        &self,
        deployment_id: &str,
        kind: ResourceKind,
        ref_id: &str,
    ) -> Result<Value> {
        self.client
            .get(&format!(
                "{}/deployments/{}/{}/{}",
                API,
                encode_segment(deployment_id),
                kind,
                encode_segment(ref_id)
            ))
            .await
    }

    pub async fn resource_status(
        &self,
        deployment_id: &str,
        kind: ResourceKind,
        ref_id: &str,
    ) -> Result<String> {
        let info = self.resource_info(deployment_id, kind, ref_id).await?;
        resource_status_of(&info)
            .map(String::from)
            .ok_or_else(|| Error::invalid_response(format!("{} {} has no status", kind, ref_id)))
    }

    /// Block until a resource reports `state`, returning its final info.
    ///
    /// Resources that do not exist yet (404) count as not ready.
    pub async fn wait_for_cluster_state(
        &self,
        deployment_id: &str,
        kind: ResourceKind,
        ref_id: &str,
        state: &str,
        policy: &PollPolicy,
    ) -> Result<Value> {
        let what = format!(
            "{} '{}' of deployment {} to be {}",
            kind, ref_id, deployment_id, state
        );

        policy
            .poll_until(&what, move || async move {
                let info = self
                    .resource_info(deployment_id, kind, ref_id)
                    .await
                    .optional()?;

                match info {
                    Some(info) if resource_status_of(&info) == Some(state) => Ok(Some(info)),
                    Some(info) => {
                        debug!(
                            "{} {} is {}",
                            kind,
                            ref_id,
                            resource_status_of(&info).unwrap_or("unknown")
                        );
                        Ok(None)
                    }
                    None => Ok(None),
                }
            })
            .await
    }

    pub async fn create_deployment(&self, body: &Value) -> Result<Value> {
        info!(
            "Creating deployment '{}'",
            body.get("name").and_then(|v| v.as_str()).unwrap_or("")
        );
        self.client.post(&format!("{}/deployments", API), body).await
    }

    pub async fn update_deployment(&self, deployment_id: &str, body: &Value) -> Result<Value> {
        info!("Updating deployment {}", deployment_id);
        self.client
            .put(&format!("{}/deployments/{}", API, encode_segment(deployment_id)), body)
            .await
    }

    /// Shut down every resource of a deployment.
    pub async fn shutdown_deployment(&self, deployment_id: &str) -> Result<Value> {
        info!("Shutting down deployment {}", deployment_id);
        self.client
            .post(
                &format!("{}/deployments/{}/_shutdown", API, encode_segment(deployment_id)),
                &json!({}),
            )
            .await
    }

    /// Delete a deployment. ECE only allows this once it is shut down.
    pub async fn delete_deployment(&self, deployment_id: &str) -> Result<Value> {
        info!("Deleting deployment {}", deployment_id);
        self.client
            .delete(&format!("{}/deployments/{}", API, encode_segment(deployment_id)))
            .await
    }

    // ---------------------------------------------------------------------
    // Templates
    // ---------------------------------------------------------------------

    pub async fn deployment_templates(&self, region: Option<&str>) -> Result<Vec<Value>> {
        let region = region.unwrap_or(DEFAULT_REGION).to_string();
        let response = self
            .client
            .get_query(
                &format!("{}/deployments/templates", API),
                &[("region", region)],
            )
            .await?;
        match response {
            Value::Array(items) => Ok(items),
            other => Err(Error::invalid_response(format!(
                "expected a template list, got {}",
                other
            ))),
        }
    }

    pub async fn deployment_template_by_name(&self, name: &str) -> Result<Option<Value>> {
        let templates = self.deployment_templates(None).await?;
        Ok(templates
            .into_iter()
            .find(|t| t.get("name").and_then(Value::as_str) == Some(name)))
    }

    // ---------------------------------------------------------------------
    // Snapshot repositories
    // ---------------------------------------------------------------------

    pub async fn snapshot_repositories(&self) -> Result<Vec<Value>> {
        let response = self
            .client
            .get(&format!(
                "{}/platform/configuration/snapshots/repositories",
                API
            ))
            .await?;
        list_at(&response, "configs")
    }

    pub async fn snapshot_repository(&self, name: &str) -> Result<Option<Value>> {
        self.client
            .get_opt(&snapshot_repository_path(name))
            .await
    }

    pub async fn set_snapshot_repository(
        &self,
        name: &str,
        repository_type: &str,
        settings: &Value,
    ) -> Result<Value> {
        info!("Setting snapshot repository '{}' ({})", name, repository_type);
        self.client
            .put(
                &snapshot_repository_path(name),
                &json!({ "type": repository_type, "settings": settings }),
            )
            .await
    }

    pub async fn delete_snapshot_repository(&self, name: &str) -> Result<Value> {
        info!("Deleting snapshot repository '{}'", name);
        self.client.delete(&snapshot_repository_path(name)).await
    }
}

fn snapshot_repository_path(name: &str) -> String {
    format!(
        "{}/platform/configuration/snapshots/repositories/{}",
        API,
        encode_segment(name)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_deployment_body_minimal() {
        let request = DeploymentRequest::new("logs", "8.11.1", "default")
            .with_elasticsearch(TopologySize::new("hot_content", 1, 4096));

        let body = request.to_body();
        assert_eq!(body["name"], "logs");
        let es = &body["resources"]["elasticsearch"][0];
        assert_eq!(es["ref_id"], "main-elasticsearch");
        assert_eq!(es["region"], "ece-region");
        assert_eq!(es["plan"]["elasticsearch"]["version"], "8.11.1");
        assert_eq!(es["plan"]["deployment_template"]["id"], "default");
        assert_eq!(
            es["plan"]["cluster_topology"][0],
            json!({"id": "hot_content", "zone_count": 1, "size": {"resource": "memory", "value": 4096}})
        );
        assert!(es.get("settings").is_none());
        assert!(body["resources"].get("kibana").is_none());
        assert!(body["resources"].get("apm").is_none());
    }

    #[test]
    fn test_deployment_body_full() {
        let mut hot = TopologySize::new("hot_content", 2, 8192);
        hot.node_roles = vec!["data_hot".into(), "ingest".into()];
        let request = DeploymentRequest::new("prod", "8.11.1", "default")
            .with_elasticsearch(hot)
            .with_kibana(1, 1024)
            .with_apm(1, 512)
            .with_snapshot_repository("backups");

        let body = request.to_body();
        let es = &body["resources"]["elasticsearch"][0];
        assert_eq!(
            es["settings"]["snapshot"]["repository"]["reference"]["repository_name"],
            "backups"
        );
        assert_eq!(
            es["plan"]["cluster_topology"][0]["node_roles"],
            json!(["data_hot", "ingest"])
        );

        let kibana = &body["resources"]["kibana"][0];
        assert_eq!(kibana["ref_id"], "main-kibana");
        assert_eq!(kibana["elasticsearch_cluster_ref_id"], "main-elasticsearch");
        assert_eq!(kibana["plan"]["kibana"]["version"], "8.11.1");
        assert_eq!(kibana["plan"]["cluster_topology"][0]["size"]["value"], 1024);

        let apm = &body["resources"]["apm"][0];
        assert_eq!(apm["ref_id"], "main-apm");
        assert_eq!(apm["plan"]["apm"]["version"], "8.11.1");
    }

    #[test]
    fn test_resource_ref_id() {
        let deployment = json!({
            "id": "abc",
            "resources": {
                "elasticsearch": [{"ref_id": "es-1"}],
                "kibana": [{"ref_id": "kb-1"}],
                "apm": []
            }
        });
        assert_eq!(
            resource_ref_id(&deployment, ResourceKind::Elasticsearch),
            Some("es-1".to_string())
        );
        assert_eq!(
            resource_ref_id(&deployment, ResourceKind::Kibana),
            Some("kb-1".to_string())
        );
        assert_eq!(resource_ref_id(&deployment, ResourceKind::Apm), None);
        assert_eq!(resource_ref_id(&deployment, ResourceKind::Appsearch), None);
    }

    #[test]
    fn test_creation_credentials() {
        let response = json!({
            "id": "abc",
            "resources": [
                {"kind": "kibana", "ref_id": "main-kibana"},
                {"kind": "elasticsearch", "ref_id": "main-elasticsearch",
                 "credentials": {"username": "elastic", "password": "pw"}}
            ]
        });
        assert_eq!(
            creation_credentials(&response),
            Some(json!({"username": "elastic", "password": "pw"}))
        );
        assert_eq!(creation_credentials(&json!({"resources": []})), None);
    }

    #[test]
    fn test_resource_kind_serde() {
        assert_eq!(
            serde_json::to_value(ResourceKind::IntegrationsServer).unwrap(),
            json!("integrations_server")
        );
        assert_eq!(ResourceKind::Kibana.to_string(), "kibana");
    }
}
