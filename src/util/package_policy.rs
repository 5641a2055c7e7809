//! Building package policy inputs from Fleet package metadata.

use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Datasets enabled by default for the System integration.
pub const SYSTEM_DATASETS: &[&str] = &[
    "system.auth",
    "system.syslog",
    "system.cpu",
    "system.diskio",
    "system.filesystem",
    "system.fsstat",
    "system.load",
    "system.memory",
    "system.network",
    "system.process",
    "system.process.summary",
    "system.socket_summary",
    "system.uptime",
];

/// Datasets enabled by default for the Linux integration.
pub const LINUX_DATASETS: &[&str] = &[
    "linux.memory",
    "linux.network_summary",
    "linux.pageinfo",
    "linux.service",
    "linux.socket",
    "linux.users",
];

/// Datasets enabled by default for the Windows integration.
pub const WINDOWS_DATASETS: &[&str] = &[
    "windows.forwarded",
    "windows.perfmon",
    "windows.powershell",
    "windows.powershell_operational",
    "windows.service",
    "windows.sysmon_operational",
];

/// Integrations with a curated default dataset list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageFamily {
    System,
    Linux,
    Windows,
    Other,
}

impl PackageFamily {
    pub fn from_package(name: &str) -> Self {
        match name {
            "system" => PackageFamily::System,
            "linux" => PackageFamily::Linux,
            "windows" => PackageFamily::Windows,
            _ => PackageFamily::Other,
        }
    }

    /// Default datasets; `None` means "enable everything".
    pub fn default_datasets(&self) -> Option<&'static [&'static str]> {
        match self {
            PackageFamily::System => Some(SYSTEM_DATASETS),
            PackageFamily::Linux => Some(LINUX_DATASETS),
            PackageFamily::Windows => Some(WINDOWS_DATASETS),
            PackageFamily::Other => None,
        }
    }
}

fn stream_dataset(stream: &Value) -> Option<&str> {
    stream.pointer("/data_stream/dataset").and_then(Value::as_str)
}

fn streams_mut(input: &mut Value) -> impl Iterator<Item = &mut Value> + '_ {
    input
        .get_mut("streams")
        .and_then(Value::as_array_mut)
        .into_iter()
        .flatten()
}

/// Recompute each input's `enabled` flag from its streams.
fn refresh_input_flags(inputs: &mut [Value]) {
    for input in inputs.iter_mut() {
        let any_enabled = input
            .get("streams")
            .and_then(Value::as_array)
            .map(|streams| streams.iter().any(|s| s["enabled"] == Value::Bool(true)))
            .unwrap_or(false);
        if let Some(map) = input.as_object_mut() {
            map.insert("enabled".to_string(), Value::Bool(any_enabled));
        }
    }
}

/// Turn a Fleet package document into the `inputs[]` of a package policy.
///
/// Streams start disabled; see [`apply_defaults`].
pub fn build_inputs(package_info: &Value) -> Vec<Value> {
    // input type -> policy template, in first-seen order
    let mut input_types: Vec<(String, String)> = Vec::new();
    for template in package_info
        .get("policy_templates")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        let template_name = template.get("name").and_then(Value::as_str).unwrap_or("");
        for input in template
            .get("inputs")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
        {
            if let Some(kind) = input.get("type").and_then(Value::as_str) {
                if !input_types.iter().any(|(t, _)| t == kind) {
                    input_types.push((kind.to_string(), template_name.to_string()));
                }
            }
        }
    }

    let mut streams_by_input: BTreeMap<&str, Vec<Value>> = BTreeMap::new();
    for data_stream in package_info
        .get("data_streams")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        let ds_type = data_stream.get("type").and_then(Value::as_str).unwrap_or("logs");
        let Some(dataset) = data_stream.get("dataset").and_then(Value::as_str) else {
            continue;
        };
        for stream in data_stream
            .get("streams")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
        {
            if let Some(input) = stream.get("input").and_then(Value::as_str) {
                streams_by_input.entry(input).or_default().push(json!({
                    "enabled": false,
                    "data_stream": { "type": ds_type, "dataset": dataset },
                    "vars": {},
                }));
            }
        }
    }

    input_types
        .into_iter()
        .map(|(kind, template)| {
            let streams = streams_by_input.remove(kind.as_str()).unwrap_or_default();
            json!({
                "type": kind,
                "policy_template": template,
                "enabled": false,
                "streams": streams,
            })
        })
        .collect()
}

/// Enable the family's default datasets and disable every other stream.
pub fn apply_defaults(family: PackageFamily, inputs: &mut [Value]) {
    let defaults = family.default_datasets();
    for input in inputs.iter_mut() {
        for stream in streams_mut(input) {
            let enabled = match (defaults, stream_dataset(stream)) {
                (None, _) => true,
                (Some(list), Some(dataset)) => list.contains(&dataset),
                (Some(_), None) => false,
            };
            if let Some(map) = stream.as_object_mut() {
                map.insert("enabled".to_string(), Value::Bool(enabled));
            }
        }
    }
    refresh_input_flags(inputs);
}

/// Flip every stream of `dataset`. Returns whether anything changed.
pub fn set_stream_enabled(inputs: &mut [Value], dataset: &str, enabled: bool) -> bool {
    let mut changed = false;
    for input in inputs.iter_mut() {
        for stream in streams_mut(input) {
            if stream_dataset(stream) == Some(dataset) && stream["enabled"] != Value::Bool(enabled) {
                if let Some(map) = stream.as_object_mut() {
                    map.insert("enabled".to_string(), Value::Bool(enabled));
                    changed = true;
                }
            }
        }
    }
    refresh_input_flags(inputs);
    changed
}

/// Datasets of every enabled stream.
pub fn enabled_datasets(inputs: &[Value]) -> Vec<String> {
    inputs
        .iter()
        .filter_map(|i| i.get("streams").and_then(Value::as_array))
        .flatten()
        .filter(|s| s["enabled"] == Value::Bool(true))
        .filter_map(|s| stream_dataset(s).map(String::from))
        .collect()
}

/// Package policy body for `package` attached to `agent_policy_id`.
pub fn policy_body(
    name: &str,
    namespace: &str,
    agent_policy_id: &str,
    package_info: &Value,
    inputs: Vec<Value>,
) -> Value {
    let mut package = Map::new();
    for key in ["name", "title", "version"] {
        if let Some(value) = package_info.get(key) {
            package.insert(key.to_string(), value.clone());
        }
    }
    json!({
        "name": name,
        "namespace": namespace,
        "policy_id": agent_policy_id,
        "enabled": true,
        "package": package,
        "inputs": inputs,
    })
}
