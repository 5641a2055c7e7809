//! Elasticsearch REST API wrapper.

use super::{encode_segment, ApiClient, ConnectionSettings, Transport};
use crate::error::{Error, Result};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

/// Default Elasticsearch HTTP port
pub const DEFAULT_PORT: u16 = 9200;

/// Client for the Elasticsearch APIs used by the modules.
#[derive(Clone)]
pub struct Elastic {
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for Elastic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Elastic").finish_non_exhaustive()
    }
}

impl Elastic {
    /// Connect directly to a cluster.
    pub fn new(settings: &ConnectionSettings) -> Result<Self> {
        Ok(Self::with_transport(ApiClient::new(settings)?))
    }

    /// Use any transport, e.g. an [`EceApiProxy`](super::EceApiProxy).
    pub fn with_transport(transport: impl Transport + 'static) -> Self {
        Self {
            transport: Arc::new(transport),
        }
    }

    pub async fn info(&self) -> Result<Value> {
        self.transport.get("/").await
    }

    pub async fn version(&self) -> Result<String> {
        let info = self.info().await?;
        info.pointer("/version/number")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| Error::invalid_response("cluster info without version.number"))
    }

    pub async fn cluster_health(&self) -> Result<Value> {
        self.transport.get("/_cluster/health").await
    }

    // ---------------------------------------------------------------------
    // Role mappings
    // ---------------------------------------------------------------------

    /// The mapping body, `None` if it does not exist.
    pub async fn role_mapping(&self, name: &str) -> Result<Option<Value>> {
        let response = self
            .transport
            .get_opt(&format!("/_security/role_mapping/{}", encode_segment(name)))
            .await?;
        Ok(response.and_then(|r| r.get(name).cloned()))
    }

    pub async fn put_role_mapping(&self, name: &str, body: &Value) -> Result<Value> {
        info!("Putting role mapping '{}'", name);
        self.transport
            .put(&format!("/_security/role_mapping/{}", encode_segment(name)), body)
            .await
    }

    pub async fn delete_role_mapping(&self, name: &str) -> Result<Value> {
        info!("Deleting role mapping '{}'", name);
        self.transport
            .delete(&format!("/_security/role_mapping/{}", encode_segment(name)))
            .await
    }

    // ---------------------------------------------------------------------
    // Index templates
    // ---------------------------------------------------------------------

    /// The composable template body, `None` if it does not exist.
    pub async fn index_template(&self, name: &str) -> Result<Option<Value>> {
        let response = self
            .transport
            .get_opt(&format!("/_index_template/{}", encode_segment(name)))
            .await?;
        Ok(response.and_then(|r| {
            r.get("index_templates")?
                .as_array()?
                .iter()
                .find(|t| t.get("name").and_then(Value::as_str) == Some(name))?
                .get("index_template")
                .cloned()
        }))
    }

    pub async fn put_index_template(&self, name: &str, body: &Value) -> Result<Value> {
        info!("Putting index template '{}'", name);
        self.transport
            .put(&format!("/_index_template/{}", encode_segment(name)), body)
            .await
    }

    pub async fn delete_index_template(&self, name: &str) -> Result<Value> {
        info!("Deleting index template '{}'", name);
        self.transport
            .delete(&format!("/_index_template/{}", encode_segment(name)))
            .await
    }
}
