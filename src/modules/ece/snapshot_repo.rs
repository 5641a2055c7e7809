//! ECE platform snapshot repository module.
//!
//! ## Parameters
//!
//! | Parameter | Required | Description |
//! |-----------|----------|-------------|
//! | `name` | Yes | Repository name |
//! | `repository_type` | No | Repository type (default: `s3`) |
//! | `settings` | present | Repository settings (bucket, region, credentials...) |
//! | `state` | No | present or absent (default: present) |

use crate::modules::common::{ece_client, State};
use crate::modules::{
    run_async, Diff, Module, ModuleContext, ModuleError, ModuleOutput, ModuleParams, ModuleResult,
    ParamExt,
};
use serde_json::{json, Value};

const DEFAULT_REPOSITORY_TYPE: &str = "s3";

#[derive(Debug, Clone)]
struct SnapshotRepoConfig {
    name: String,
    repository_type: String,
    settings: Value,
    state: State,
}

impl SnapshotRepoConfig {
    fn from_params(params: &ModuleParams) -> ModuleResult<Self> {
        Ok(Self {
            name: params.get_string_required("name")?,
            repository_type: params
                .get_string("repository_type")?
                .unwrap_or_else(|| DEFAULT_REPOSITORY_TYPE.to_string()),
            settings: params.get_object("settings")?.unwrap_or_else(|| json!({})),
            state: State::from_params(params)?,
        })
    }

    fn desired(&self) -> Value {
        json!({ "type": self.repository_type, "settings": self.settings })
    }
}

/// Whether a stored repository differs from the desired type and settings.
fn repository_differs(existing: &Value, desired: &Value) -> bool {
    existing.get("type") != desired.get("type")
        || existing.get("settings") != desired.get("settings")
}

/// Module managing ECE snapshot repositories
pub struct EceSnapshotRepoModule;

impl EceSnapshotRepoModule {
    async fn execute_async(
        &self,
        params: &ModuleParams,
        context: &ModuleContext,
    ) -> ModuleResult<ModuleOutput> {
        let config = SnapshotRepoConfig::from_params(params)?;
        let ece = ece_client(params)?;
        let existing = ece.snapshot_repository(&config.name).await?;

        match config.state {
            State::Present => {
                let desired = config.desired();
                if let Some(ref current) = existing {
                    if !repository_differs(current, &desired) {
                        return Ok(ModuleOutput::ok(format!(
                            "Snapshot repository '{}' is up to date",
                            config.name
                        )));
                    }
                }

                let verb = if existing.is_some() { "update" } else { "create" };
                let output = if context.check_mode {
                    ModuleOutput::changed(format!(
                        "Would {} snapshot repository '{}'",
                        verb, config.name
                    ))
                } else {
                    ece.set_snapshot_repository(
                        &config.name,
                        &config.repository_type,
                        &config.settings,
                    )
                    .await?;
                    ModuleOutput::changed(format!(
                        "Snapshot repository '{}' {}d",
                        config.name, verb
                    ))
                };
                Ok(output.with_diff_if(context, || Diff::json(existing.as_ref(), Some(&desired))))
            }
            State::Absent => {
                if existing.is_none() {
                    return Ok(ModuleOutput::ok(format!(
                        "Snapshot repository '{}' does not exist",
                        config.name
                    )));
                }
                if context.check_mode {
                    return Ok(ModuleOutput::changed(format!(
                        "Would delete snapshot repository '{}'",
                        config.name
                    )));
                }
                ece.delete_snapshot_repository(&config.name).await?;
                Ok(ModuleOutput::changed(format!(
                    "Deleted snapshot repository '{}'",
                    config.name
                )))
            }
        }
    }
}

impl Module for EceSnapshotRepoModule {
    fn name(&self) -> &'static str {
        "ece_snapshot_repo"
    }

    fn description(&self) -> &'static str {
        "Manage ECE platform snapshot repositories"
    }

    fn required_params(&self) -> &[&'static str] {
        &["host", "name"]
    }

    fn validate_params(&self, params: &ModuleParams) -> ModuleResult<()> {
        let config = SnapshotRepoConfig::from_params(params)?;
        if config.state == State::Present && params.get("settings").is_none() {
            return Err(ModuleError::MissingParameter("settings".to_string()));
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
