//! Subcommand implementations.

use anyhow::{bail, Context, Result};
use clap::Parser;
use rustible_elastic::config::{Config, Service};
use rustible_elastic::modules::{
    ModuleContext, ModuleOutput, ModuleParams, ModuleRegistry, ModuleStatus,
};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Arguments for the run command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Module to run, e.g. `kibana_agent_policy`
    pub module: String,

    /// Module parameters as a JSON object
    #[arg(short = 'a', long = "args", conflicts_with = "args_file")]
    pub args: Option<String>,

    /// File with module parameters (JSON or YAML)
    #[arg(long = "args-file")]
    pub args_file: Option<PathBuf>,

    /// Report what would change without changing anything
    #[arg(long)]
    pub check: bool,

    /// Include before/after diffs in the result
    #[arg(long)]
    pub diff: bool,
}

fn params_from_value(value: Value) -> Result<ModuleParams> {
    match value {
        Value::Object(map) => Ok(map.into_iter().collect()),
        Value::Null => Ok(ModuleParams::new()),
        other => bail!("module parameters must be an object, got {}", other),
    }
}

fn read_args_file(path: &Path) -> Result<ModuleParams> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read args file: {}", path.display()))?;
    let value: Value = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse args file: {}", path.display()))?,
        _ => serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse args file: {}", path.display()))?,
    };
    params_from_value(value)
}

impl RunArgs {
    /// Module parameters from `--args` or `--args-file`.
    pub fn params(&self) -> Result<ModuleParams> {
        if let Some(ref args) = self.args {
            let value: Value =
                serde_json::from_str(args).context("Failed to parse --args as JSON")?;
            return params_from_value(value);
        }
        if let Some(ref path) = self.args_file {
            return read_args_file(path);
        }
        Ok(ModuleParams::new())
    }

    /// Run the module; the result is written as JSON to stdout.
    pub fn execute(&self, config: &Config) -> Result<i32> {
        let registry = ModuleRegistry::with_builtins();
        let mut params = self.params()?;
        if let Some(service) = Service::for_module(&self.module) {
            config.fill_params(service, &mut params);
        }

        let context = ModuleContext::default()
            .with_check_mode(self.check)
            .with_diff_mode(self.diff);
        debug!(
            "Running {} (check: {}, diff: {})",
            self.module, self.check, self.diff
        );

        let (result, code) = match registry.execute(&self.module, &params, &context) {
            Ok(output) => {
                info!("{}: {}", self.module, output.msg);
                let code = if output.status == ModuleStatus::Failed { 1 } else { 0 };
                (output_json(&output)?, code)
            }
            Err(e) => (json!({ "failed": true, "msg": e.to_string() }), 1),
        };

        println!("{}", serde_json::to_string_pretty(&result)?);
        Ok(code)
    }
}

fn output_json(output: &ModuleOutput) -> Result<Value> {
    serde_json::to_value(output).context("Failed to serialize module output")
}

/// Print every module with its description.
pub fn list() -> Result<i32> {
    let registry = ModuleRegistry::with_builtins();
    let width = registry.names().iter().map(|n| n.len()).max().unwrap_or(0);
    for name in registry.names() {
        let description = registry
            .get(name)
            .map(|m| m.description())
            .unwrap_or_default();
        println!("{:width$}  {}", name, description, width = width);
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn run_args(args: Option<&str>, args_file: Option<PathBuf>) -> RunArgs {
        RunArgs {
            module: "kibana_space".to_string(),
            args: args.map(String::from),
            args_file,
            check: false,
            diff: false,
        }
    }

    #[test]
    fn test_params_from_json() {
        let params = run_args(Some(r#"{"space_id": "soc", "port": 5602}"#), None)
            .params()
            .unwrap();
        assert_eq!(params["space_id"], json!("soc"));
        assert_eq!(params["port"], json!(5602));
    }

    #[test]
    fn test_params_must_be_object() {
        assert!(run_args(Some("[1, 2]"), None).params().is_err());
        assert!(run_args(Some("{not json"), None).params().is_err());
        assert!(run_args(None, None).params().unwrap().is_empty());
    }

    #[test]
    fn test_params_from_yaml_file() {
        let mut file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        writeln!(file, "space_id: soc\ndisabled_features:\n  - canvas").unwrap();
        let params = run_args(None, Some(file.path().to_path_buf()))
            .params()
            .unwrap();
        assert_eq!(params["disabled_features"], json!(["canvas"]));
    }
}
