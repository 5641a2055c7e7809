//! Kibana action connector module.
//!
//! `connector_type` accepts a type id (`.slack`) or its display name
//! (`Slack`). Kibana never returns connector secrets, so they are only
//! sent on create, or on update when `update_secrets` is set.

use crate::client::Kibana;
use crate::modules::common::{id_of, kibana_client, State};
use crate::modules::{
    run_async, Diff, Module, ModuleContext, ModuleError, ModuleOutput, ModuleParams, ModuleResult,
    ParamExt,
};
use crate::util::is_subset;
use serde_json::{json, Value};

#[derive(Debug, Clone)]
struct ConnectorConfig {
    name: String,
    connector_type: Option<String>,
    config: Value,
    secrets: Value,
    update_secrets: bool,
    state: State,
}

impl ConnectorConfig {
    fn from_params(params: &ModuleParams) -> ModuleResult<Self> {
        Ok(Self {
            name: params.get_string_required("connector_name")?,
            connector_type: params.get_string("connector_type")?,
            config: params.get_object("config")?.unwrap_or_else(|| json!({})),
            secrets: params.get_object("secrets")?.unwrap_or_else(|| json!({})),
            update_secrets: params.get_bool_or("update_secrets", false),
            state: State::from_params(params)?,
        })
    }
}

/// Module managing Kibana action connectors
pub struct ConnectorModule;

impl ConnectorModule {
    async fn type_id(kibana: &Kibana, wanted: &str) -> ModuleResult<String> {
        kibana.connector_type_id(wanted).await?.ok_or_else(|| {
            ModuleError::InvalidParameter(format!("unknown connector type '{}'", wanted))
        })
    }

    async fn present(
        &self,
        kibana: &Kibana,
        config: &ConnectorConfig,
        existing: Option<Value>,
        context: &ModuleContext,
    ) -> ModuleResult<ModuleOutput> {
        let desired = json!({ "name": config.name, "config": config.config });

        let Some(current) = existing else {
            let wanted = config
                .connector_type
                .as_deref()
                .ok_or_else(|| ModuleError::MissingParameter("connector_type".to_string()))?;
            let type_id = Self::type_id(kibana, wanted).await?;
            let diff = || {
                Diff::json(
                    None,
                    Some(&json!({ "name": config.name, "connector_type_id": type_id, "config": config.config })),
                )
            };
            if context.check_mode {
                return Ok(ModuleOutput::changed(format!(
                    "Would create connector '{}'",
                    config.name
                ))
                .with_diff_if(context, diff));
            }
            let created = kibana
                .create_connector(&config.name, &type_id, &config.config, &config.secrets)
                .await?;
            return Ok(
                ModuleOutput::changed(format!("Created connector '{}'", config.name))
                    .with_diff_if(context, diff)
                    .with_data("connector_id", json!(id_of(&created, "connector")?)),
            );
        };

        let connector_id = id_of(&current, "connector")?;
        if let Some(ref wanted) = config.connector_type {
            let type_id = Self::type_id(kibana, wanted).await?;
            let current_type = current
                .get("connector_type_id")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if current_type != type_id {
                return Err(ModuleError::InvalidParameter(format!(
                    "connector '{}' is of type {}; its type cannot change to {}",
                    config.name, current_type, type_id
                )));
            }
        }

        if is_subset(&desired, &current) && !config.update_secrets {
            return Ok(
                ModuleOutput::ok(format!("Connector '{}' is up to date", config.name))
                    .with_data("connector_id", json!(connector_id)),
            );
        }

        let diff = || {
            let before = json!({ "name": current.get("name"), "config": current.get("config") });
            Diff::json(Some(&before), Some(&desired))
        };
        if context.check_mode {
            return Ok(
                ModuleOutput::changed(format!("Would update connector '{}'", config.name))
                    .with_diff_if(context, diff)
                    .with_data("connector_id", json!(connector_id)),
            );
        }

        kibana
            .update_connector(&connector_id, &config.name, &config.config, &config.secrets)
            .await?;
        Ok(
            ModuleOutput::changed(format!("Updated connector '{}'", config.name))
                .with_diff_if(context, diff)
                .with_data("connector_id", json!(connector_id)),
        )
    }

    async fn execute_async(
        &self,
        params: &ModuleParams,
        context: &ModuleContext,
    ) -> ModuleResult<ModuleOutput> {
        let config = ConnectorConfig::from_params(params)?;
        let kibana = kibana_client(params).await?;
        let existing = kibana.connector_by_name(&config.name).await?;

        match config.state {
            State::Present => self.present(&kibana, &config, existing, context).await,
            State::Absent => {
                let Some(current) = existing else {
                    return Ok(ModuleOutput::ok(format!(
                        "Connector '{}' does not exist",
                        config.name
                    )));
                };
                if context.check_mode {
                    return Ok(ModuleOutput::changed(format!(
                        "Would delete connector '{}'",
                        config.name
                    )));
                }
                kibana
                    .delete_connector(&id_of(&current, "connector")?)
                    .await?;
                Ok(ModuleOutput::changed(format!(
                    "Deleted connector '{}'",
                    config.name
                )))
            }
        }
    }
}

impl Module for ConnectorModule {
    fn name(&self) -> &'static str {
        "kibana_connector"
    }

    fn description(&self) -> &'static str {
        "Manage Kibana action connectors"
    }

    fn required_params(&self) -> &[&'static str] {
        &["connector_name"]
    }

    fn validate_params(&self, params: &ModuleParams) -> ModuleResult<()> {
        ConnectorConfig::from_params(params).map(|_| ())
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

    #[test]
    fn test_config_defaults() {
        let params: ModuleParams =
            serde_json::from_value(json!({"connector_name": "soc-slack"})).unwrap();
        let config = ConnectorConfig::from_params(&params).unwrap();
        assert_eq!(config.config, json!({}));
        assert_eq!(config.secrets, json!({}));
        assert!(!config.update_secrets);
        assert!(config.connector_type.is_none());
    }

    #[test]
    fn test_config_from_json_string() {
        let params: ModuleParams = serde_json::from_value(json!({
            "connector_name": "mail",
            "connector_type": "Email",
            "config": "{\"from\": \"soc@example.com\"}"
        }))
        .unwrap();
        let config = ConnectorConfig::from_params(&params).unwrap();
        assert_eq!(config.config["from"], "soc@example.com");
    }
}
