//! Kibana alerting rule module.
//!
//! ## Parameters
//!
//! | Parameter | Required | Description |
//! |-----------|----------|-------------|
//! | `alert_name` | Yes | Rule name |
//! | `rule_type_id` | create | Rule type, e.g. `.index-threshold` |
//! | `consumer` | No | Owning app (default: `alerts`) |
//! | `interval` | No | Check interval (default: `1m`) |
//! | `params` | No | Rule type parameters |
//! | `actions` | No | Actions; `connector_name` is resolved to the connector id |
//! | `tags` | No | Tags merged into the rule's tags |
//! | `notify_when` | No | `onActionGroupChange`, `onActiveAlert` or `onThrottleInterval` |
//! | `throttle` | No | Throttle interval for `onThrottleInterval` |
//! | `enabled` | No | Enable or disable the rule |
//! | `state` | No | present or absent (default: present) |
//!
//! ## Example
//!
//! ```yaml
//! - name: Alert on failed logins
//!   kibana_alert:
//!     host: kibana.example.com
//!     alert_name: failed-logins
//!     rule_type_id: .es-query
//!     interval: 5m
//!     params:
//!       index: [logs-*]
//!       timeField: "@timestamp"
//!       esQuery: '{"query":{"match":{"event.outcome":"failure"}}}'
//!       size: 100
//!       threshold: [10]
//!       thresholdComparator: ">"
//!       timeWindowSize: 5
//!       timeWindowUnit: m
//!     actions:
//!       - connector_name: soc-slack
//!         group: query matched
//!         params:
//!           message: "Too many failed logins"
//! ```

use crate::client::kibana::alerting::alert_update_body;
use crate::client::kibana::detection::rule_tags;
use crate::client::Kibana;
use crate::modules::common::{check_choice, id_of, kibana_client, State};
use crate::modules::{
    run_async, Diff, Module, ModuleContext, ModuleError, ModuleOutput, ModuleParams, ModuleResult,
    ParamExt,
};
use crate::util::{is_subset, merge_tags};
use serde_json::{json, Map, Value};
use tracing::debug;

const DEFAULT_ACTION_GROUP: &str = "default";

#[derive(Debug, Clone)]
struct AlertConfig {
    name: String,
    rule_type_id: Option<String>,
    consumer: String,
    interval: String,
    params: Value,
    actions: Vec<Value>,
    tags: Vec<String>,
    notify_when: Option<String>,
    throttle: Option<String>,
    enabled: Option<bool>,
    state: State,
}

impl AlertConfig {
    fn from_params(params: &ModuleParams) -> ModuleResult<Self> {
        check_choice(
            params,
            "notify_when",
            &["onActionGroupChange", "onActiveAlert", "onThrottleInterval"],
        )?;

        let actions = match params.get("actions") {
            Some(Value::Array(items)) => items.clone(),
            Some(Value::Null) | None => Vec::new(),
            Some(_) => {
                return Err(ModuleError::InvalidParameter(
                    "actions must be a list".to_string(),
                ))
            }
        };
        for action in &actions {
            if action.get("connector_name").is_none() && action.get("id").is_none() {
                return Err(ModuleError::InvalidParameter(
                    "every action needs connector_name or id".to_string(),
                ));
            }
        }

        Ok(Self {
            name: params.get_string_required("alert_name")?,
            rule_type_id: params.get_string("rule_type_id")?,
            consumer: params
                .get_string("consumer")?
                .unwrap_or_else(|| "alerts".to_string()),
            interval: params
                .get_string("interval")?
                .unwrap_or_else(|| "1m".to_string()),
            params: params.get_object("params")?.unwrap_or_else(|| json!({})),
            actions,
            tags: params.get_vec_string("tags")?.unwrap_or_default(),
            notify_when: params.get_string("notify_when")?,
            throttle: params.get_string("throttle")?,
            enabled: params.get_bool("enabled")?,
            state: State::from_params(params)?,
        })
    }

    /// Full rule body with resolved `actions` and the given `tags`.
    fn body(&self, actions: Vec<Value>, tags: Vec<String>) -> Value {
        let mut body = json!({
            "name": self.name,
            "consumer": self.consumer,
            "schedule": {"interval": self.interval},
            "params": self.params,
            "actions": actions,
            "tags": tags,
        });
        if let Some(ref rule_type_id) = self.rule_type_id {
            body["rule_type_id"] = json!(rule_type_id);
        }
        if let Some(ref notify_when) = self.notify_when {
            body["notify_when"] = json!(notify_when);
        }
        if let Some(ref throttle) = self.throttle {
            body["throttle"] = json!(throttle);
        }
        if let Some(enabled) = self.enabled {
            body["enabled"] = json!(enabled);
        }
        body
    }
}

/// Action with `connector_name` replaced by the connector `id` and a
/// default `group`.
fn resolve_action(action: &Value, connector_id: Option<String>) -> Value {
    let mut resolved = Map::new();
    if let Some(map) = action.as_object() {
        for (key, value) in map {
            if key != "connector_name" {
                resolved.insert(key.clone(), value.clone());
            }
        }
    }
    if let Some(id) = connector_id {
        resolved.insert("id".to_string(), json!(id));
    }
    resolved
        .entry("group")
        .or_insert_with(|| json!(DEFAULT_ACTION_GROUP));
    resolved.entry("params").or_insert_with(|| json!({}));
    Value::Object(resolved)
}

/// Module managing Kibana alerting rules
pub struct AlertModule;

impl AlertModule {
    async fn resolve_actions(kibana: &Kibana, actions: &[Value]) -> ModuleResult<Vec<Value>> {
        let mut resolved = Vec::with_capacity(actions.len());
        for action in actions {
            let connector_id = match action.get("connector_name").and_then(Value::as_str) {
                Some(name) => {
                    let connector = kibana
                        .connector_by_name(name)
                        .await?
                        .ok_or_else(|| ModuleError::NotFound(format!("connector '{}'", name)))?;
                    let id = id_of(&connector, "connector")?;
                    debug!("Resolved connector '{}' to {}", name, id);
                    Some(id)
                }
                None => None,
            };
            resolved.push(resolve_action(action, connector_id));
        }
        Ok(resolved)
    }

    async fn present(
        &self,
        kibana: &Kibana,
        config: &AlertConfig,
        existing: Option<Value>,
        context: &ModuleContext,
    ) -> ModuleResult<ModuleOutput> {
        let actions = Self::resolve_actions(kibana, &config.actions).await?;

        let Some(current) = existing else {
            if config.rule_type_id.is_none() {
                return Err(ModuleError::MissingParameter("rule_type_id".to_string()));
            }
            let body = config.body(actions, merge_tags(config.tags.as_slice(), &[]));
            let diff = || Diff::json(None, Some(&body));
            if context.check_mode {
                return Ok(
                    ModuleOutput::changed(format!("Would create alert '{}'", config.name))
                        .with_diff_if(context, diff),
                );
            }
            let created = kibana.create_alert(&body).await?;
            return Ok(
                ModuleOutput::changed(format!("Created alert '{}'", config.name))
                    .with_diff_if(context, diff)
                    .with_data("alert_id", json!(id_of(&created, "alert")?)),
            );
        };

        let alert_id = id_of(&current, "alert")?;
        let existing_tags = rule_tags(&current);
        let body = config.body(actions, merge_tags(&existing_tags, &config.tags));
        let update = alert_update_body(&body);

        let needs_update = !is_subset(&update, &current);
        let needs_toggle = config
            .enabled
            .is_some_and(|enabled| current.get("enabled").and_then(Value::as_bool) != Some(enabled));

        if !needs_update && !needs_toggle {
            return Ok(ModuleOutput::ok(format!("Alert '{}' is up to date", config.name))
                .with_data("alert_id", json!(alert_id)));
        }

        let diff = || Diff::json(Some(&current), Some(&body));
        if context.check_mode {
            return Ok(
                ModuleOutput::changed(format!("Would update alert '{}'", config.name))
                    .with_diff_if(context, diff)
                    .with_data("alert_id", json!(alert_id)),
            );
        }

        if needs_update {
            kibana.update_alert(&alert_id, &update).await?;
        }
        if let (true, Some(enabled)) = (needs_toggle, config.enabled) {
            kibana.set_alert_enabled(&alert_id, enabled).await?;
        }
        Ok(
            ModuleOutput::changed(format!("Updated alert '{}'", config.name))
                .with_diff_if(context, diff)
                .with_data("alert_id", json!(alert_id)),
        )
    }

    async fn execute_async(
        &self,
        params: &ModuleParams,
        context: &ModuleContext,
    ) -> ModuleResult<ModuleOutput> {
        let config = AlertConfig::from_params(params)?;
        let kibana = kibana_client(params).await?;
        let existing = kibana.alert_by_name(&config.name).await?;

        match config.state {
            State::Present => self.present(&kibana, &config, existing, context).await,
            State::Absent => {
                let Some(current) = existing else {
                    return Ok(ModuleOutput::ok(format!(
                        "Alert '{}' does not exist",
                        config.name
                    )));
                };
                if context.check_mode {
                    return Ok(ModuleOutput::changed(format!(
                        "Would delete alert '{}'",
                        config.name
                    )));
                }
                kibana.delete_alert(&id_of(&current, "alert")?).await?;
                Ok(ModuleOutput::changed(format!(
                    "Deleted alert '{}'",
                    config.name
                )))
            }
        }
    }
}

impl Module for AlertModule {
    fn name(&self) -> &'static str {
        "kibana_alert"
    }

    fn description(&self) -> &'static str {
        "Manage Kibana alerting rules"
    }

    fn required_params(&self) -> &[&'static str] {
        &["alert_name"]
    }

    fn validate_params(&self, params: &ModuleParams) -> ModuleResult<()> {
        AlertConfig::from_params(params).map(|_| ())
    }

    fn execute(
        &self,
        params: &ModuleParams,
        context: &ModuleContext,
    ) -> ModuleResult<ModuleOutput> {
        run_async(self.execute_async(params, context))
    }
}
