//! Elasticsearch and Kibana access through the ECE deployment proxy.
//!
//! ECE exposes `/api/v1/deployments/{id}/{kind}/{ref_id}/proxy/...`, which
//! forwards a request to the deployment's resource using the ECE admin
//! credentials. This lets modules configure a deployment without knowing
//! its own endpoint or `elastic` password.

use super::ece::{resource_ref_id, Ece, ResourceKind};
use super::{encode_segment, ApiClient, ConnectionSettings, Transport};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use tracing::debug;

/// Which deployment resource a proxy forwards to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyTarget {
    Elasticsearch,
    Kibana,
}

impl ProxyTarget {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ProxyTarget::Elasticsearch => ResourceKind::Elasticsearch,
            ProxyTarget::Kibana => ResourceKind::Kibana,
        }
    }
}

/// Transport that tunnels requests through the ECE API.
#[derive(Debug, Clone)]
pub struct EceApiProxy {
    client: ApiClient,
    deployment_id: String,
    ref_id: String,
    target: ProxyTarget,
}

impl EceApiProxy {
    /// Proxy to a known deployment resource.
    pub fn new(
        settings: &ConnectionSettings,
        deployment_id: impl Into<String>,
        ref_id: impl Into<String>,
        target: ProxyTarget,
    ) -> Result<Self> {
        Ok(Self::from_client(
            ApiClient::new(settings)?,
            deployment_id,
            ref_id,
            target,
        ))
    }

    pub fn from_client(
        client: ApiClient,
        deployment_id: impl Into<String>,
        ref_id: impl Into<String>,
        target: ProxyTarget,
    ) -> Self {
        let mut client = client.with_header("x-management-request", "true");
        if target == ProxyTarget::Kibana {
            client = client.with_header("kbn-xsrf", "true");
        }
        Self {
            client,
            deployment_id: deployment_id.into(),
            ref_id: ref_id.into(),
            target,
        }
    }

    /// Resolve a deployment by name and proxy to its `target` resource.
    pub async fn for_deployment(ece: &Ece, deployment_name: &str, target: ProxyTarget) -> Result<Self> {
        let deployment = ece
            .deployment_by_name(deployment_name)
            .await?
            .ok_or_else(|| Error::not_found("deployment", deployment_name))?;

        let deployment_id = deployment
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::invalid_response("deployment without id"))?
            .to_string();

        let ref_id = resource_ref_id(&deployment, target.kind()).ok_or_else(|| {
            Error::not_found(
                format!("{} resource of deployment", target.kind()),
                deployment_name,
            )
        })?;

        debug!(
            "Proxying {} requests through deployment {} ({})",
            target.kind(),
            deployment_id,
            ref_id
        );

        Ok(Self::from_client(
            ece.client().clone(),
            deployment_id,
            ref_id,
            target,
        ))
    }

    pub fn deployment_id(&self) -> &str {
        &self.deployment_id
    }

    pub fn ref_id(&self) -> &str {
        &self.ref_id
    }

    /// ECE path that forwards `path` to the target resource.
    pub fn proxy_path(&self, path: &str) -> String {
        format!(
            "/api/v1/deployments/{}/{}/{}/proxy/{}",
            encode_segment(&self.deployment_id),
            self.target.kind(),
            encode_segment(&self.ref_id),
            path.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl Transport for EceApiProxy {
    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value> {
        let proxied = self.proxy_path(path);
        self.client.request(method, &proxied, query, body).await
    }
}
