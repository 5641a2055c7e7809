//! Read-only lookup of an ECE deployment.
//!
//! Returns the deployment document together with the ref_ids of its
//! Elasticsearch and Kibana resources, which other modules need for
//! proxying.

use crate::client::ece::{resource_ref_id, ResourceKind};
use crate::modules::common::ece_client;
use crate::modules::{
    run_async, Module, ModuleContext, ModuleError, ModuleOutput, ModuleParams, ModuleResult,
    ParamExt,
};
use serde_json::{json, Value};

/// Module reporting facts about one deployment
pub struct EceClusterInfoModule;

impl EceClusterInfoModule {
    async fn execute_async(&self, params: &ModuleParams) -> ModuleResult<ModuleOutput> {
        let name = params.get_string_required("cluster_name")?;
        let ece = ece_client(params)?;

        let summary = ece
            .deployment_by_name(&name)
            .await?
            .ok_or_else(|| ModuleError::NotFound(format!("deployment '{}'", name)))?;
        let deployment_id = summary
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| ModuleError::ExecutionFailed("deployment without id".to_string()))?;

        // the list endpoint only carries a summary
        let deployment = ece.deployment(deployment_id).await?.unwrap_or_else(|| summary.clone());

        Ok(ModuleOutput::ok(format!("Found deployment '{}'", name))
            .with_data("deployment_id", json!(deployment_id))
            .with_data(
                "elasticsearch_ref_id",
                json!(resource_ref_id(&deployment, ResourceKind::Elasticsearch)),
            )
            .with_data(
                "kibana_ref_id",
                json!(resource_ref_id(&deployment, ResourceKind::Kibana)),
            )
            .with_data("deployment", deployment))
    }
}

impl Module for EceClusterInfoModule {
    fn name(&self) -> &'static str {
        "ece_cluster_info"
    }

    fn description(&self) -> &'static str {
        "Look up an ECE deployment and its resource ref_ids"
    }

    fn required_params(&self) -> &[&'static str] {
        &["host", "cluster_name"]
    }

    fn execute(
        &self,
        params: &ModuleParams,
        _context: &ModuleContext,
    ) -> ModuleResult<ModuleOutput> {
        // read-only, so check mode is no different
        run_async(self.execute_async(params))
    }
}
