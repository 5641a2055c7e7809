//! Elastic Security detection engine rules.

use super::Kibana;
use crate::client::list_at;
use crate::error::{Error, OptionalExt, Result};
use crate::util::tags::merge_tags;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};

const RULES: &str = "/api/detection_engine/rules";
const PAGE_SIZE: u64 = 100;

/// Tags of a rule document as strings.
pub fn rule_tags(rule: &Value) -> Vec<String> {
    rule.get("tags")
        .and_then(Value::as_array)
        .map(|tags| {
            tags.iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

impl Kibana {
    /// Every rule matching a KQL `filter`, following pagination.
    pub async fn find_detection_rules(&self, filter: Option<&str>) -> Result<Vec<Value>> {
        let mut rules = Vec::new();
        let mut page = 1u64;

        loop {
            let mut query = vec![
                ("page", page.to_string()),
                ("per_page", PAGE_SIZE.to_string()),
            ];
            if let Some(filter) = filter {
                query.push(("filter", filter.to_string()));
            }

            let response = self
                .transport()
                .get_query(&self.spaced(&format!("{}/_find", RULES)), &query)
                .await?;
            let data = list_at(&response, "data")?;
            let total = response.get("total").and_then(Value::as_u64).unwrap_or(0);
            let fetched = data.len();
            rules.extend(data);

            debug!("Fetched detection rule page {} ({} of {})", page, rules.len(), total);
            if fetched == 0 || rules.len() as u64 >= total {
                break;
            }
            page += 1;
        }

        Ok(rules)
    }

    pub async fn detection_rule(&self, rule_id: &str) -> Result<Option<Value>> {
        self.transport()
            .get_query(&self.spaced(RULES), &[("rule_id", rule_id.to_string())])
            .await
            .optional()
    }

    pub async fn detection_rule_by_name(&self, name: &str) -> Result<Option<Value>> {
        let filter = format!("alert.attributes.name: \"{}\"", name.replace('"', "\\\""));
        let rules = self.find_detection_rules(Some(&filter)).await?;
        Ok(rules
            .into_iter()
            .find(|r| r.get("name").and_then(Value::as_str) == Some(name)))
    }

    pub async fn create_detection_rule(&self, body: &Value) -> Result<Value> {
        info!(
            "Creating detection rule '{}'",
            body.get("name").and_then(|v| v.as_str()).unwrap_or("")
        );
        self.transport().post(&self.spaced(RULES), body).await
    }

    /// Replace a rule; `body` must carry `rule_id` or `id`.
    pub async fn update_detection_rule(&self, body: &Value) -> Result<Value> {
        if body.get("rule_id").is_none() && body.get("id").is_none() {
            return Err(Error::Config(
                "detection rule update requires rule_id or id".to_string(),
            ));
        }
        self.transport().put(&self.spaced(RULES), body).await
    }

    pub async fn patch_detection_rule(&self, rule_id: &str, patch: &Value) -> Result<Value> {
        let mut body = patch.clone();
        if !body.is_object() {
            return Err(Error::Config("detection rule patch must be an object".to_string()));
        }
        body["rule_id"] = json!(rule_id);
        debug!("Patching detection rule {}", rule_id);
        self.transport().patch(&self.spaced(RULES), &body).await
    }

    pub async fn delete_detection_rule(&self, rule_id: &str) -> Result<Value> {
        info!("Deleting detection rule {}", rule_id);
        self.transport()
            .request(
                Method::DELETE,
                &self.spaced(RULES),
                &[("rule_id", rule_id.to_string())],
                None,
            )
            .await
    }

    /// Install or update the Elastic prebuilt rules and timelines.
    pub async fn load_prebuilt_rules(&self) -> Result<Value> {
        info!("Loading prebuilt detection rules");
        self.transport()
            .request(
                Method::PUT,
                &self.spaced(&format!("{}/prepackaged", RULES)),
                &[],
                None,
            )
            .await
    }

    pub async fn prebuilt_rules_status(&self) -> Result<Value> {
        self.transport()
            .get(&self.spaced(&format!("{}/prepackaged/_status", RULES)))
            .await
    }

    pub async fn set_detection_rule_enabled(&self, rule_id: &str, enabled: bool) -> Result<Value> {
        info!(
            "{} detection rule {}",
            if enabled { "Enabling" } else { "Disabling" },
            rule_id
        );
        self.patch_detection_rule(rule_id, &json!({ "enabled": enabled }))
            .await
    }

    /// Merge `tags` into a rule's tags. Returns whether the rule changed.
    pub async fn add_detection_rule_tags(&self, rule_id: &str, tags: &[String]) -> Result<bool> {
        let rule = self
            .detection_rule(rule_id)
            .await?
            .ok_or_else(|| Error::not_found("detection rule", rule_id))?;

        let existing = rule_tags(&rule);
        let merged = merge_tags(&existing, tags);
        if merged == existing {
            return Ok(false);
        }

        info!("Tagging detection rule {} with {:?}", rule_id, tags);
        self.patch_detection_rule(rule_id, &json!({ "tags": merged }))
            .await?;
        Ok(true)
    }
}
