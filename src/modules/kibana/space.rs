//! Kibana space module.

use crate::modules::common::{kibana_client, State};
use crate::modules::{
    run_async, Diff, Module, ModuleContext, ModuleOutput, ModuleParams, ModuleResult, ParamExt,
};
use crate::util::is_subset;
use serde_json::{json, Value};

#[derive(Debug, Clone)]
struct SpaceConfig {
    space_id: String,
    state: State,
    body: Value,
}

impl SpaceConfig {
    fn from_params(params: &ModuleParams) -> ModuleResult<Self> {
        let space_id = params.get_string_required("space_id")?;
        let mut body = json!({
            "id": space_id,
            "name": params.get_string("name")?.unwrap_or_else(|| space_id.clone()),
        });
        for key in ["description", "color", "initials"] {
            if let Some(value) = params.get_string(key)? {
                body[key] = json!(value);
            }
        }
        if let Some(features) = params.get_vec_string("disabled_features")? {
            body["disabledFeatures"] = json!(features);
        }

        Ok(Self {
            space_id,
            state: State::from_params(params)?,
            body,
        })
    }
}

/// Module managing Kibana spaces
pub struct SpaceModule;

impl SpaceModule {
    async fn execute_async(
        &self,
        params: &ModuleParams,
        context: &ModuleContext,
    ) -> ModuleResult<ModuleOutput> {
        let config = SpaceConfig::from_params(params)?;
        let kibana = kibana_client(params).await?;
        let existing = kibana.space_info(&config.space_id).await?;
        let label = format!("Space '{}'", config.space_id);

        match config.state {
            State::Present => {
                let diff = || Diff::json(existing.as_ref(), Some(&config.body));
                match existing {
                    Some(ref current) if is_subset(&config.body, current) => {
                        Ok(ModuleOutput::ok(format!("{} is up to date", label)))
                    }
                    _ if context.check_mode => Ok(ModuleOutput::changed(format!(
                        "Would {} {}",
                        if existing.is_some() { "update" } else { "create" },
                        label
                    ))
                    .with_diff_if(context, diff)),
                    Some(_) => {
                        kibana.update_space(&config.space_id, &config.body).await?;
                        Ok(ModuleOutput::changed(format!("{} updated", label))
                            .with_diff_if(context, diff))
                    }
                    None => {
                        kibana.create_space(&config.body).await?;
                        Ok(ModuleOutput::changed(format!("{} created", label))
                            .with_diff_if(context, diff))
                    }
                }
            }
            State::Absent => {
                if existing.is_none() {
                    return Ok(ModuleOutput::ok(format!("{} does not exist", label)));
                }
                if context.check_mode {
                    return Ok(ModuleOutput::changed(format!("Would delete {}", label)));
                }
                kibana.delete_space(&config.space_id).await?;
                Ok(ModuleOutput::changed(format!("{} deleted", label)))
            }
        }
    }
}

impl Module for SpaceModule {
    fn name(&self) -> &'static str {
        "kibana_space"
    }

    fn description(&self) -> &'static str {
        "Manage Kibana spaces"
    }

    fn required_params(&self) -> &[&'static str] {
        &["space_id"]
    }

    fn validate_params(&self, params: &ModuleParams) -> ModuleResult<()> {
        SpaceConfig::from_params(params).map(|_| ())
    }

    fn execute(
        &self,
        params: &ModuleParams,
        context: &ModuleContext,
    ) -> ModuleResult<ModuleOutput> {
        run_async(self.execute_async(params, context))
    }
}
