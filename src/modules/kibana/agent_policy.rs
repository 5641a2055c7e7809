//! Fleet agent policy module.
//!
//! ## Parameters
//!
//! | Parameter | Required | Description |
//! |-----------|----------|-------------|
//! | `name` | Yes | Agent policy name |
//! | `description` | No | Policy description |
//! | `namespace` | No | Data stream namespace (default: `default`) |
//! | `monitoring_enabled` | No | Agent monitoring: `logs`, `metrics` (default: both) |
//! | `fleet_setup` | No | Run Fleet setup first (default: false) |
//! | `state` | No | present or absent (default: present) |
//!
//! Returns `policy_id` and the first active `enrollment_key` of the policy.

use crate::client::Kibana;
use crate::modules::common::{id_of, kibana_client, State};
use crate::modules::{
    run_async, Diff, Module, ModuleContext, ModuleOutput, ModuleParams, ModuleResult, ParamExt,
};
use crate::util::is_subset;
use serde_json::{json, Value};

#[derive(Debug, Clone)]
struct AgentPolicyConfig {
    name: String,
    state: State,
    fleet_setup: bool,
    body: Value,
}

impl AgentPolicyConfig {
    fn from_params(params: &ModuleParams) -> ModuleResult<Self> {
        let name = params.get_string_required("name")?;
        let monitoring = params
            .get_vec_string("monitoring_enabled")?
            .unwrap_or_else(|| vec!["logs".to_string(), "metrics".to_string()]);

        let mut body = json!({
            "name": name,
            "namespace": params.get_string("namespace")?.unwrap_or_else(|| "default".to_string()),
            "monitoring_enabled": monitoring,
        });
        if let Some(description) = params.get_string("description")? {
            body["description"] = json!(description);
        }

        Ok(Self {
            name,
            state: State::from_params(params)?,
            fleet_setup: params.get_bool_or("fleet_setup", false),
            body,
        })
    }
}

/// Module managing Fleet agent policies
pub struct AgentPolicyModule;

impl AgentPolicyModule {
    /// API key of the first active enrollment key of a policy.
    async fn enrollment_key(kibana: &Kibana, policy_id: &str) -> ModuleResult<Value> {
        let keys = kibana.enrollment_keys(policy_id).await?;
        Ok(keys
            .into_iter()
            .find(|k| k.get("active").and_then(Value::as_bool).unwrap_or(true))
            .and_then(|k| k.get("api_key").cloned())
            .unwrap_or(Value::Null))
    }

    async fn execute_async(
        &self,
        params: &ModuleParams,
        context: &ModuleContext,
    ) -> ModuleResult<ModuleOutput> {
        let config = AgentPolicyConfig::from_params(params)?;
        let kibana = kibana_client(params).await?;

        if config.fleet_setup && !context.check_mode {
            kibana.fleet_setup().await?;
        }

        let existing = kibana.agent_policy_by_name(&config.name).await?;

        match config.state {
            State::Present => {
                let (output, policy_id) = match existing {
                    Some(ref current) if is_subset(&config.body, current) => (
                        ModuleOutput::ok(format!("Agent policy '{}' is up to date", config.name)),
                        Some(id_of(current, "agent policy")?),
                    ),
                    _ if context.check_mode => (
                        ModuleOutput::changed(format!(
                            "Would {} agent policy '{}'",
                            if existing.is_some() { "update" } else { "create" },
                            config.name
                        )),
                        existing
                            .as_ref()
                            .map(|p| id_of(p, "agent policy"))
                            .transpose()?,
                    ),
                    Some(ref current) => {
                        let id = id_of(current, "agent policy")?;
                        kibana.update_agent_policy(&id, &config.body).await?;
                        (
                            ModuleOutput::changed(format!("Updated agent policy '{}'", config.name)),
                            Some(id),
                        )
                    }
                    None => {
                        let created = kibana.create_agent_policy(&config.body).await?;
                        (
                            ModuleOutput::changed(format!("Created agent policy '{}'", config.name)),
                            Some(id_of(&created, "agent policy")?),
                        )
                    }
                };

                let mut output = output
                    .with_diff_if(context, || Diff::json(existing.as_ref(), Some(&config.body)));
                if let Some(id) = policy_id {
                    let key = Self::enrollment_key(&kibana, &id).await?;
                    output = output
                        .with_data("policy_id", json!(id))
                        .with_data("enrollment_key", key);
                }
                Ok(output)
            }
            State::Absent => {
                let Some(current) = existing else {
                    return Ok(ModuleOutput::ok(format!(
                        "Agent policy '{}' does not exist",
                        config.name
                    )));
                };
                if context.check_mode {
                    return Ok(ModuleOutput::changed(format!(
                        "Would delete agent policy '{}'",
                        config.name
                    )));
                }
                kibana
                    .delete_agent_policy(&id_of(&current, "agent policy")?)
                    .await?;
                Ok(ModuleOutput::changed(format!(
                    "Deleted agent policy '{}'",
                    config.name
                )))
            }
        }
    }
}

impl Module for AgentPolicyModule {
    fn name(&self) -> &'static str {
        "kibana_agent_policy"
    }

    fn description(&self) -> &'static str {
        "Manage Fleet agent policies"
    }

    fn required_params(&self) -> &[&'static str] {
        &["name"]
    }

    fn validate_params(&self, params: &ModuleParams) -> ModuleResult<()> {
        AgentPolicyConfig::from_params(params).map(|_| ())
    }

    fn execute(
        &self,
        params: &ModuleParams,
        context: &ModuleContext,
    ) -> ModuleResult<ModuleOutput> {
        run_async(self.execute_async(params, context))
    }
}
