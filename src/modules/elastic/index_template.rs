//! Elasticsearch composable index template module.
//!
//! The template body is either given whole in `body`, or assembled from
//! `index_patterns`, `template`, `priority`, `composed_of`, `data_stream`
//! and `_meta`. An existing template is only replaced when it lacks part of
//! the desired body.

use super::converge;
use crate::modules::common::{elastic_client, State};
use crate::modules::{
    run_async, Module, ModuleContext, ModuleError, ModuleOutput, ModuleParams, ModuleResult,
    ParamExt,
};
use serde_json::{json, Map, Value};

#[derive(Debug, Clone)]
struct IndexTemplateConfig {
    name: String,
    state: State,
    body: Value,
}

impl IndexTemplateConfig {
    fn from_params(params: &ModuleParams) -> ModuleResult<Self> {
        let body = match params.get_object("body")? {
            Some(body) => body,
            None => {
                let mut body = Map::new();
                if let Some(patterns) = params.get_vec_string("index_patterns")? {
                    body.insert("index_patterns".to_string(), json!(patterns));
                }
                for key in ["template", "data_stream", "_meta"] {
                    if let Some(value) = params.get_object(key)? {
                        body.insert(key.to_string(), value);
                    }
                }
                if let Some(priority) = params.get_i64("priority")? {
                    body.insert("priority".to_string(), json!(priority));
                }
                if let Some(composed_of) = params.get_vec_string("composed_of")? {
                    body.insert("composed_of".to_string(), json!(composed_of));
                }
                Value::Object(body)
            }
        };

        Ok(Self {
            name: params.get_string_required("name")?,
            state: State::from_params(params)?,
            body,
        })
    }
}

/// Module managing composable index templates
pub struct IndexTemplateModule;

impl IndexTemplateModule {
    async fn execute_async(
        &self,
        params: &ModuleParams,
        context: &ModuleContext,
    ) -> ModuleResult<ModuleOutput> {
        let config = IndexTemplateConfig::from_params(params)?;
        let elastic = elastic_client(params).await?;
        let existing = elastic.index_template(&config.name).await?;

        converge(
            &format!("index template '{}'", config.name),
            config.state,
            existing,
            &config.body,
            context,
            || elastic.put_index_template(&config.name, &config.body),
            || elastic.delete_index_template(&config.name),
        )
        .await
    }
}

impl Module for IndexTemplateModule {
    fn name(&self) -> &'static str {
        "elastic_index_template"
    }

    fn description(&self) -> &'static str {
        "Manage Elasticsearch composable index templates"
    }

    fn required_params(&self) -> &[&'static str] {
        &["name"]
    }

    fn validate_params(&self, params: &ModuleParams) -> ModuleResult<()> {
        let config = IndexTemplateConfig::from_params(params)?;
        if config.state == State::Present && config.body.get("index_patterns").is_none() {
            return Err(ModuleError::MissingParameter("index_patterns".to_string()));
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
