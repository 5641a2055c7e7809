//! Fleet integration (package policy) module.
//!
//! ## Parameters
//!
//! | Parameter | Required | Description |
//! |-----------|----------|-------------|
//! | `name` | Yes | Package policy name |
//! | `agent_policy_name` | Yes | Agent policy the integration is attached to |
//! | `integration` | present | Package name, e.g. `system`, `windows`, `nginx` |
//! | `integration_version` | No | Package version (default: the version Fleet reports) |
//! | `install_package` | No | Install the package when Fleet has not yet (default: false) |
//! | `namespace` | No | Data stream namespace (default: `default`) |
//! | `description` | No | Policy description |
//! | `inputs` | No | Overrides deep-merged into the generated inputs |
//! | `enable_datasets` | No | Datasets to switch on |
//! | `disable_datasets` | No | Datasets to switch off |
//! | `state` | No | present or absent (default: present) |
//!
//! New policies start from the package's inputs with the defaults of the
//! System, Linux or Windows integration applied (every stream for any other
//! package). Existing policies keep their inputs and only receive the
//! overrides.
//!
//! ## Example
//!
//! ```yaml
//! - name: Collect Sysmon but not PowerShell logs
//!   kibana_package_policy:
//!     host: kibana.example.com
//!     name: windows-1
//!     agent_policy_name: windows-hosts
//!     integration: windows
//!     install_package: true
//!     disable_datasets: [windows.powershell, windows.powershell_operational]
//! ```

use crate::client::Kibana;
use crate::modules::common::{id_of, kibana_client, State};
use crate::modules::{
    run_async, Diff, Module, ModuleContext, ModuleError, ModuleOutput, ModuleParams, ModuleResult,
    ParamExt,
};
use crate::util::merge::deep_merge;
use crate::util::package_policy::{
    apply_defaults, build_inputs, policy_body, set_stream_enabled, PackageFamily,
};
use serde_json::{json, Value};
use tracing::info;

#[derive(Debug, Clone)]
struct PackagePolicyConfig {
    name: String,
    agent_policy_name: String,
    integration: Option<String>,
    integration_version: Option<String>,
    install_package: bool,
    namespace: String,
    description: Option<String>,
    inputs: Option<Value>,
    enable_datasets: Vec<String>,
    disable_datasets: Vec<String>,
    state: State,
}

impl PackagePolicyConfig {
    fn from_params(params: &ModuleParams) -> ModuleResult<Self> {
        let inputs = match params.get("inputs") {
            Some(Value::Array(items)) => Some(Value::Array(items.clone())),
            Some(Value::Null) | None => None,
            Some(_) => {
                return Err(ModuleError::InvalidParameter(
                    "inputs must be a list".to_string(),
                ))
            }
        };

        Ok(Self {
            name: params.get_string_required("name")?,
            agent_policy_name: params.get_string_required("agent_policy_name")?,
            integration: params.get_string("integration")?,
            integration_version: params.get_string("integration_version")?,
            install_package: params.get_bool_or("install_package", false),
            namespace: params
                .get_string("namespace")?
                .unwrap_or_else(|| "default".to_string()),
            description: params.get_string("description")?,
            inputs,
            enable_datasets: params.get_vec_string("enable_datasets")?.unwrap_or_default(),
            disable_datasets: params.get_vec_string("disable_datasets")?.unwrap_or_default(),
            state: State::from_params(params)?,
        })
    }

    /// Apply input overrides and dataset toggles to `inputs`.
    fn customize(&self, inputs: &mut Value) {
        if let Some(ref overrides) = self.inputs {
            deep_merge(inputs, overrides);
        }
        if let Some(list) = inputs.as_array_mut() {
            for dataset in &self.enable_datasets {
                set_stream_enabled(list, dataset, true);
            }
            for dataset in &self.disable_datasets {
                set_stream_enabled(list, dataset, false);
            }
        }
    }
}

/// Module managing Fleet package policies
pub struct PackagePolicyModule;

impl PackagePolicyModule {
    /// Package document, installing the package first when asked to.
    async fn package(
        kibana: &Kibana,
        config: &PackagePolicyConfig,
        integration: &str,
        context: &ModuleContext,
    ) -> ModuleResult<Value> {
        let mut package = kibana.package_info(integration).await?;
        let installed = package.get("status").and_then(Value::as_str) == Some("installed");

        if let Some(ref version) = config.integration_version {
            package["version"] = json!(version);
        }

        if !installed && config.install_package && !context.check_mode {
            let version = package
                .get("version")
                .and_then(Value::as_str)
                .map(String::from)
                .ok_or_else(|| {
                    ModuleError::ExecutionFailed(format!("package '{}' has no version", integration))
                })?;
            kibana.install_package(integration, &version).await?;
        }
        Ok(package)
    }

    async fn create(
        &self,
        kibana: &Kibana,
        config: &PackagePolicyConfig,
        agent_policy_id: &str,
        context: &ModuleContext,
    ) -> ModuleResult<ModuleOutput> {
        let integration = config
            .integration
            .as_deref()
            .ok_or_else(|| ModuleError::MissingParameter("integration".to_string()))?;
        let package = Self::package(kibana, config, integration, context).await?;

        let mut inputs = build_inputs(&package);
        apply_defaults(PackageFamily::from_package(integration), &mut inputs);
        let mut inputs = Value::Array(inputs);
        config.customize(&mut inputs);

        let inputs = match inputs {
            Value::Array(items) => items,
            _ => Vec::new(),
        };
        let mut body = policy_body(
            &config.name,
            &config.namespace,
            agent_policy_id,
            &package,
            inputs,
        );
        if let Some(ref description) = config.description {
            body["description"] = json!(description);
        }

        if context.check_mode {
            return Ok(ModuleOutput::changed(format!(
                "Would create package policy '{}'",
                config.name
            ))
            .with_diff_if(context, || Diff::json(None, Some(&body))));
        }

        let created = kibana.create_package_policy(&body).await?;
        info!(
            "Attached {} integration to agent policy {}",
            integration, agent_policy_id
        );
        Ok(
            ModuleOutput::changed(format!("Created package policy '{}'", config.name))
                .with_diff_if(context, || Diff::json(None, Some(&body)))
                .with_data("package_policy_id", json!(id_of(&created, "package policy")?)),
        )
    }

    async fn update(
        &self,
        kibana: &Kibana,
        config: &PackagePolicyConfig,
        existing: Value,
        context: &ModuleContext,
    ) -> ModuleResult<ModuleOutput> {
        let policy_id = id_of(&existing, "package policy")?;

        let mut desired = existing.clone();
        let mut inputs = desired.get("inputs").cloned().unwrap_or_else(|| json!([]));
        config.customize(&mut inputs);
        desired["inputs"] = inputs;
        if let Some(ref description) = config.description {
            desired["description"] = json!(description);
        }

        if desired == existing {
            return Ok(ModuleOutput::ok(format!(
                "Package policy '{}' is up to date",
                config.name
            ))
            .with_data("package_policy_id", json!(policy_id)));
        }

        let diff = || Diff::json(Some(&existing), Some(&desired));
        if context.check_mode {
            return Ok(ModuleOutput::changed(format!(
                "Would update package policy '{}'",
                config.name
            ))
            .with_diff_if(context, diff)
            .with_data("package_policy_id", json!(policy_id)));
        }

        kibana.update_package_policy(&policy_id, &desired).await?;
        Ok(
            ModuleOutput::changed(format!("Updated package policy '{}'", config.name))
                .with_diff_if(context, diff)
                .with_data("package_policy_id", json!(policy_id)),
        )
    }

    async fn execute_async(
        &self,
        params: &ModuleParams,
        context: &ModuleContext,
    ) -> ModuleResult<ModuleOutput> {
        let config = PackagePolicyConfig::from_params(params)?;
        let kibana = kibana_client(params).await?;

        let agent_policy = kibana.agent_policy_by_name(&config.agent_policy_name).await?;
        let agent_policy_id = match (agent_policy, config.state) {
            (Some(policy), _) => id_of(&policy, "agent policy")?,
            (None, State::Absent) => {
                return Ok(ModuleOutput::ok(format!(
                    "Agent policy '{}' does not exist",
                    config.agent_policy_name
                )))
            }
            (None, State::Present) => {
                return Err(ModuleError::NotFound(format!(
                    "agent policy '{}'",
                    config.agent_policy_name
                )))
            }
        };

        let existing = kibana
            .package_policy_by_name(Some(&agent_policy_id), &config.name)
            .await?;

        match (config.state, existing) {
            (State::Present, Some(existing)) => {
                self.update(&kibana, &config, existing, context).await
            }
            (State::Present, None) => {
                self.create(&kibana, &config, &agent_policy_id, context)
                    .await
            }
            (State::Absent, None) => Ok(ModuleOutput::ok(format!(
                "Package policy '{}' does not exist",
                config.name
            ))),
            (State::Absent, Some(existing)) => {
                if context.check_mode {
                    return Ok(ModuleOutput::changed(format!(
                        "Would delete package policy '{}'",
                        config.name
                    )));
                }
                kibana
                    .delete_package_policy(&id_of(&existing, "package policy")?)
                    .await?;
                Ok(ModuleOutput::changed(format!(
                    "Deleted package policy '{}'",
                    config.name
                )))
            }
        }
    }
}

impl Module for PackagePolicyModule {
    fn name(&self) -> &'static str {
        "kibana_package_policy"
    }

    fn description(&self) -> &'static str {
        "Manage Fleet integration policies"
    }

    fn required_params(&self) -> &[&'static str] {
        &["name", "agent_policy_name"]
    }

    fn validate_params(&self, params: &ModuleParams) -> ModuleResult<()> {
        PackagePolicyConfig::from_params(params).map(|_| ())
    }

    fn execute(
        &self,
        params: &ModuleParams,
        context: &ModuleContext,
    ) -> ModuleResult<ModuleOutput> {
        run_async(self.execute_async(params, context))
    }
}
