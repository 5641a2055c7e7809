//! Endgame sensor configuration (deployment profile) module.
//!
//! ## Parameters
//!
//! | Parameter | Required | Description |
//! |-----------|----------|-------------|
//! | `name` | Yes | Profile name |
//! | `platform` | present | `windows`, `linux` or `macos` |
//! | `sensor_version` | present | Sensor version to deploy |
//! | `transceiver_host` | No | Host agents report to; stored as `config.transceiver.host` |
//! | `config` | No | Sensor configuration document |
//! | `state` | No | present or absent (default: present) |
//!
//! ## Example
//!
//! ```yaml
//! - name: Windows sensors
//!   endgame_sensor_configuration:
//!     host: endgame.example.com
//!     username: admin
//!     password: "{{ endgame_password }}"
//!     name: windows-default
//!     platform: windows
//!     sensor_version: "3.57.1"
//!     transceiver_host: egc.example.com
//! ```

use crate::client::Endgame;
use crate::modules::common::{check_choice, endgame_settings, id_of, State};
use crate::modules::{
    run_async, Diff, Module, ModuleContext, ModuleError, ModuleOutput, ModuleParams, ModuleResult,
    ParamExt,
};
use crate::util::is_subset;
use serde_json::{json, Value};

const PLATFORMS: &[&str] = &["windows", "linux", "macos"];

#[derive(Debug, Clone)]
struct SensorConfig {
    name: String,
    state: State,
    body: Value,
}

impl SensorConfig {
    fn from_params(params: &ModuleParams) -> ModuleResult<Self> {
        check_choice(params, "platform", PLATFORMS)?;
        let name = params.get_string_required("name")?;

        let mut config = params.get_object("config")?.unwrap_or_else(|| json!({}));
        if !config.is_object() {
            return Err(ModuleError::InvalidParameter(
                "config must be an object".to_string(),
            ));
        }
        if let Some(host) = params.get_string("transceiver_host")? {
            if !config.get("transceiver").is_some_and(Value::is_object) {
                config["transceiver"] = json!({});
            }
            config["transceiver"]["host"] = json!(host);
        }

        let mut body = json!({ "name": name, "config": config });
        if let Some(platform) = params.get_string("platform")? {
            body["platform"] = json!(platform);
        }
        if let Some(version) = params.get_string("sensor_version")? {
            body["sensor_version"] = json!(version);
        }

        Ok(Self {
            name,
            state: State::from_params(params)?,
            body,
        })
    }

    /// A new profile needs a platform and a sensor version.
    fn require_create_fields(&self) -> ModuleResult<()> {
        for key in ["platform", "sensor_version"] {
            if self.body.get(key).is_none() {
                return Err(ModuleError::MissingParameter(key.to_string()));
            }
        }
        Ok(())
    }
}

/// Module managing Endgame sensor configurations
pub struct SensorConfigurationModule;

impl SensorConfigurationModule {
    async fn execute_async(
        &self,
        params: &ModuleParams,
        context: &ModuleContext,
    ) -> ModuleResult<ModuleOutput> {
        let config = SensorConfig::from_params(params)?;
        let endgame = Endgame::login(&endgame_settings(params)?).await?;
        let existing = endgame.sensor_configuration_by_name(&config.name).await?;
        let label = format!("sensor configuration '{}'", config.name);

        match config.state {
            State::Present => {
                if existing.is_none() {
                    config.require_create_fields()?;
                }
                let diff = || Diff::json(existing.as_ref(), Some(&config.body));
                match existing {
                    Some(ref current) if is_subset(&config.body, current) => {
                        Ok(ModuleOutput::ok(format!("The {} is up to date", label))
                            .with_data("profile_id", json!(id_of(current, "sensor configuration")?)))
                    }
                    _ if context.check_mode => Ok(ModuleOutput::changed(format!(
                        "Would {} {}",
                        if existing.is_some() { "update" } else { "create" },
                        label
                    ))
                    .with_diff_if(context, diff)),
                    Some(ref current) => {
                        let id = id_of(current, "sensor configuration")?;
                        endgame.update_sensor_configuration(&id, &config.body).await?;
                        Ok(ModuleOutput::changed(format!("Updated {}", label))
                            .with_diff_if(context, diff)
                            .with_data("profile_id", json!(id)))
                    }
                    None => {
                        let created = endgame.create_sensor_configuration(&config.body).await?;
                        Ok(ModuleOutput::changed(format!("Created {}", label))
                            .with_diff_if(context, diff)
                            .with_data(
                                "profile_id",
                                json!(id_of(&created, "sensor configuration")?),
                            ))
                    }
                }
            }
            State::Absent => {
                let Some(current) = existing else {
                    return Ok(ModuleOutput::ok(format!("The {} does not exist", label)));
                };
                if context.check_mode {
                    return Ok(ModuleOutput::changed(format!("Would delete {}", label)));
                }
                endgame
                    .delete_sensor_configuration(&id_of(&current, "sensor configuration")?)
                    .await?;
                Ok(ModuleOutput::changed(format!("Deleted {}", label)))
            }
        }
    }
}

impl Module for SensorConfigurationModule {
    fn name(&self) -> &'static str {
        "endgame_sensor_configuration"
    }

    fn description(&self) -> &'static str {
        "Manage Endgame sensor configurations"
    }

    fn required_params(&self) -> &[&'static str] {
        &["host", "name"]
    }

    fn validate_params(&self, params: &ModuleParams) -> ModuleResult<()> {
        SensorConfig::from_params(params).map(|_| ())
    }

    fn execute(
        &self,
        params: &ModuleParams,
        context: &ModuleContext,
    ) -> ModuleResult<ModuleOutput> {
        run_async(self.execute_async(params, context))
    }
}
