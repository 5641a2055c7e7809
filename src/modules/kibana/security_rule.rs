//! Elastic Security detection rule module.
//!
//! ## Parameters
//!
//! | Parameter | Required | Description |
//! |-----------|----------|-------------|
//! | `load_prebuilt` | No | Install or update the Elastic prebuilt rules first |
//! | `rule_id` | No | Rule to manage, by `rule_id` |
//! | `rule_name` | No | Rule to manage, by exact name |
//! | `enabled` | No | Enable or disable the rule |
//! | `tags` | No | Tags added to the rule |
//! | `body` | No | Rule definition used to create a custom rule that is missing |
//! | `state` | No | present or absent (default: present) |
//!
//! Either a rule selector or `load_prebuilt` must be given.
//!
//! ## Example
//!
//! ```yaml
//! - name: Turn on the prebuilt credential access rules
//!   kibana_security_rule:
//!     host: kibana.example.com
//!     load_prebuilt: true
//!     rule_name: "Potential Credential Access via LSASS Memory Dump"
//!     enabled: true
//!     tags: [soc-tier1]
//! ```

use crate::client::kibana::detection::rule_tags;
use crate::client::Kibana;
use crate::modules::common::{kibana_client, State};
use crate::modules::{
    run_async, Diff, Module, ModuleContext, ModuleError, ModuleOutput, ModuleParams, ModuleResult,
    ParamExt,
};
use crate::util::missing_tags;
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq)]
enum RuleSelector {
    RuleId(String),
    Name(String),
}

impl std::fmt::Display for RuleSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleSelector::RuleId(id) => write!(f, "detection rule {}", id),
            RuleSelector::Name(name) => write!(f, "detection rule '{}'", name),
        }
    }
}

#[derive(Debug, Clone)]
struct SecurityRuleConfig {
    load_prebuilt: bool,
    selector: Option<RuleSelector>,
    enabled: Option<bool>,
    tags: Vec<String>,
    body: Option<Value>,
    state: State,
}

impl SecurityRuleConfig {
    fn from_params(params: &ModuleParams) -> ModuleResult<Self> {
        let selector = match (params.get_string("rule_id")?, params.get_string("rule_name")?) {
            (Some(id), _) => Some(RuleSelector::RuleId(id)),
            (None, Some(name)) => Some(RuleSelector::Name(name)),
            (None, None) => None,
        };
        let load_prebuilt = params.get_bool_or("load_prebuilt", false);
        if selector.is_none() && !load_prebuilt {
            return Err(ModuleError::MissingParameter(
                "rule_id, rule_name or load_prebuilt".to_string(),
            ));
        }

        Ok(Self {
            load_prebuilt,
            selector,
            enabled: params.get_bool("enabled")?,
            tags: params.get_vec_string("tags")?.unwrap_or_default(),
            body: params.get_object("body")?,
            state: State::from_params(params)?,
        })
    }

    /// Custom rule body with the selector filled in.
    fn create_body(&self) -> Option<Value> {
        let mut body = self.body.clone()?;
        match self.selector {
            Some(RuleSelector::RuleId(ref id)) => body["rule_id"] = json!(id),
            Some(RuleSelector::Name(ref name)) => {
                if body.get("name").is_none() {
                    body["name"] = json!(name);
                }
            }
            None => {}
        }
        if let Some(enabled) = self.enabled {
            body["enabled"] = json!(enabled);
        }
        if !self.tags.is_empty() {
            let tags = crate::util::merge_tags(&rule_tags(&body), &self.tags);
            body["tags"] = json!(tags);
        }
        Some(body)
    }
}

/// Whether the prebuilt rule status reports rules to install or update.
fn prebuilt_pending(status: &Value) -> bool {
    ["rules_not_installed", "rules_not_updated"]
        .iter()
        .any(|key| status.get(*key).and_then(Value::as_u64).unwrap_or(0) > 0)
}

/// rule_id of a rule document, falling back to its id.
fn rule_id_of(rule: &Value) -> ModuleResult<String> {
    rule.get("rule_id")
        .or_else(|| rule.get("id"))
        .and_then(Value::as_str)
        .map(String::from)
        .ok_or_else(|| ModuleError::ExecutionFailed("detection rule without rule_id".to_string()))
}

/// Module managing detection engine rules
pub struct SecurityRuleModule;

impl SecurityRuleModule {
    async fn lookup(kibana: &Kibana, selector: &RuleSelector) -> ModuleResult<Option<Value>> {
        Ok(match selector {
            RuleSelector::RuleId(id) => kibana.detection_rule(id).await?,
            RuleSelector::Name(name) => kibana.detection_rule_by_name(name).await?,
        })
    }

    /// Load prebuilt rules when Kibana reports some missing or outdated.
    async fn prebuilt(kibana: &Kibana, context: &ModuleContext) -> ModuleResult<Option<String>> {
        let status = kibana.prebuilt_rules_status().await?;
        if !prebuilt_pending(&status) {
            return Ok(None);
        }
        if context.check_mode {
            return Ok(Some("would load prebuilt rules".to_string()));
        }
        let loaded = kibana.load_prebuilt_rules().await?;
        let installed = loaded.get("rules_installed").and_then(Value::as_u64).unwrap_or(0);
        let updated = loaded.get("rules_updated").and_then(Value::as_u64).unwrap_or(0);
        Ok(Some(format!(
            "loaded prebuilt rules ({} installed, {} updated)",
            installed, updated
        )))
    }

    async fn present(
        kibana: &Kibana,
        config: &SecurityRuleConfig,
        selector: &RuleSelector,
        existing: Option<Value>,
        context: &ModuleContext,
        changes: &mut Vec<String>,
    ) -> ModuleResult<Option<Diff>> {
        let Some(rule) = existing else {
            let body = config
                .create_body()
                .ok_or_else(|| ModuleError::NotFound(selector.to_string()))?;
            if !context.check_mode {
                kibana.create_detection_rule(&body).await?;
            }
            changes.push(format!("created {}", selector));
            return Ok(Some(Diff::json(None, Some(&body))));
        };

        let rule_id = rule_id_of(&rule)?;
        let before = json!({ "enabled": rule.get("enabled"), "tags": rule_tags(&rule) });
        let mut after = before.clone();

        if let Some(enabled) = config.enabled {
            if rule.get("enabled").and_then(Value::as_bool) != Some(enabled) {
                if !context.check_mode {
                    kibana.set_detection_rule_enabled(&rule_id, enabled).await?;
                }
                after["enabled"] = json!(enabled);
                changes.push(format!(
                    "{} {}",
                    if enabled { "enabled" } else { "disabled" },
                    selector
                ));
            }
        }

        let missing = missing_tags(&rule_tags(&rule), &config.tags);
        if !missing.is_empty() {
            if !context.check_mode {
                kibana.add_detection_rule_tags(&rule_id, &config.tags).await?;
            }
            after["tags"] = json!(crate::util::merge_tags(&rule_tags(&rule), &config.tags));
            changes.push(format!("tagged {} with {}", selector, missing.join(", ")));
        }

        Ok((before != after).then(|| Diff::json(Some(&before), Some(&after))))
    }

    async fn execute_async(
        &self,
        params: &ModuleParams,
        context: &ModuleContext,
    ) -> ModuleResult<ModuleOutput> {
        let config = SecurityRuleConfig::from_params(params)?;
        let kibana = kibana_client(params).await?;
        let mut changes = Vec::new();
        let mut diff = None;

        if config.load_prebuilt {
            if let Some(change) = Self::prebuilt(&kibana, context).await? {
                changes.push(change);
            }
        }

        if let Some(ref selector) = config.selector {
            let existing = Self::lookup(&kibana, selector).await?;
            match config.state {
                State::Present => {
                    diff = Self::present(&kibana, &config, selector, existing, context, &mut changes)
                        .await?;
                }
                State::Absent => {
                    if let Some(rule) = existing {
                        if !context.check_mode {
                            kibana.delete_detection_rule(&rule_id_of(&rule)?).await?;
                        }
                        changes.push(format!("deleted {}", selector));
                    }
                }
            }
        }

        if changes.is_empty() {
            return Ok(ModuleOutput::ok("Detection rules are up to date"));
        }
        let prefix = if context.check_mode { "Check mode: " } else { "" };
        let mut output = ModuleOutput::changed(format!("{}{}", prefix, changes.join("; ")));
        if let Some(diff) = diff {
            output = output.with_diff_if(context, || diff);
        }
        Ok(output)
    }
}

impl Module for SecurityRuleModule {
    fn name(&self) -> &'static str {
        "kibana_security_rule"
    }

    fn description(&self) -> &'static str {
        "Manage Elastic Security detection rules"
    }

    fn validate_params(&self, params: &ModuleParams) -> ModuleResult<()> {
        SecurityRuleConfig::from_params(params).map(|_| ())
    }

    fn execute(
        &self,
        params: &ModuleParams,
        context: &ModuleContext,
    ) -> ModuleResult<ModuleOutput> {
        run_async(self.execute_async(params, context))
    }
}
