//! Kibana saved object module.
//!
//! Objects are addressed by `object_type` plus either `object_id` or a
//! `title` that must be unique within the type. Only `attributes` (and
//! `references` when given) are compared against the stored object.
//!
//! ## Example
//!
//! ```yaml
//! - name: SOC index pattern
//!   kibana_saved_object:
//!     host: kibana.example.com
//!     space: soc
//!     object_type: index-pattern
//!     object_id: logs-endpoint
//!     attributes:
//!       title: "logs-endpoint.*"
//!       timeFieldName: "@timestamp"
//! ```

use crate::client::Kibana;
use crate::modules::common::{id_of, kibana_client, State};
use crate::modules::{
    run_async, Diff, Module, ModuleContext, ModuleError, ModuleOutput, ModuleParams, ModuleResult,
    ParamExt,
};
use crate::util::is_subset;
use serde_json::{json, Value};

#[derive(Debug, Clone)]
struct SavedObjectConfig {
    object_type: String,
    object_id: Option<String>,
    title: Option<String>,
    attributes: Value,
    references: Option<Value>,
    overwrite: bool,
    state: State,
}

impl SavedObjectConfig {
    fn from_params(params: &ModuleParams) -> ModuleResult<Self> {
        let object_id = params.get_string("object_id")?;
        let mut attributes = params.get_object("attributes")?.unwrap_or_else(|| json!({}));
        let title = match params.get_string("title")? {
            Some(title) => Some(title),
            None => attributes
                .get("title")
                .and_then(Value::as_str)
                .map(String::from),
        };
        if object_id.is_none() && title.is_none() {
            return Err(ModuleError::MissingParameter(
                "object_id or title".to_string(),
            ));
        }
        if let (Some(title), Some(map)) = (title.as_deref(), attributes.as_object_mut()) {
            map.entry("title").or_insert_with(|| json!(title));
        }

        let references = match params.get("references") {
            Some(Value::Array(items)) => Some(Value::Array(items.clone())),
            Some(Value::Null) | None => None,
            Some(_) => {
                return Err(ModuleError::InvalidParameter(
                    "references must be a list".to_string(),
                ))
            }
        };

        Ok(Self {
            object_type: params.get_string_required("object_type")?,
            object_id,
            title,
            attributes,
            references,
            overwrite: params.get_bool_or("overwrite", false),
            state: State::from_params(params)?,
        })
    }

    fn up_to_date(&self, existing: &Value) -> bool {
        let attributes = existing.get("attributes").unwrap_or(&Value::Null);
        let references_match = match self.references {
            Some(ref references) => {
                is_subset(references, existing.get("references").unwrap_or(&Value::Null))
            }
            None => true,
        };
        is_subset(&self.attributes, attributes) && references_match
    }

    fn label(&self) -> String {
        match (&self.object_id, &self.title) {
            (Some(id), _) => format!("{} '{}'", self.object_type, id),
            (None, Some(title)) => format!("{} titled '{}'", self.object_type, title),
            (None, None) => self.object_type.clone(),
        }
    }
}

/// Module managing Kibana saved objects
pub struct SavedObjectModule;

impl SavedObjectModule {
    async fn lookup(kibana: &Kibana, config: &SavedObjectConfig) -> ModuleResult<Option<Value>> {
        if let Some(ref id) = config.object_id {
            return Ok(kibana.saved_object(&config.object_type, id).await?);
        }
        let title = config.title.as_deref().unwrap_or_default();
        let matches: Vec<Value> = kibana
            .find_saved_objects(&config.object_type, Some(title))
            .await?
            .into_iter()
            .filter(|o| o.pointer("/attributes/title").and_then(Value::as_str) == Some(title))
            .collect();
        match matches.len() {
            0 => Ok(None),
            1 => Ok(matches.into_iter().next()),
            n => Err(ModuleError::ExecutionFailed(format!(
                "{} {} objects are titled '{}'; set object_id",
                n, config.object_type, title
            ))),
        }
    }

    async fn execute_async(
        &self,
        params: &ModuleParams,
        context: &ModuleContext,
    ) -> ModuleResult<ModuleOutput> {
        let config = SavedObjectConfig::from_params(params)?;
        let kibana = kibana_client(params).await?;
        let existing = Self::lookup(&kibana, &config).await?;
        let label = config.label();

        match config.state {
            State::Present => {
                let desired = json!({
                    "attributes": config.attributes,
                    "references": config.references.clone().unwrap_or_else(|| json!([])),
                });
                let diff = || {
                    let before = existing
                        .as_ref()
                        .map(|e| json!({"attributes": e.get("attributes"), "references": e.get("references")}));
                    Diff::json(before.as_ref(), Some(&desired))
                };

                match existing {
                    Some(ref current) if config.up_to_date(current) => {
                        Ok(ModuleOutput::ok(format!("Saved object {} is up to date", label))
                            .with_data("object_id", json!(id_of(current, "saved object")?)))
                    }
                    _ if context.check_mode => Ok(ModuleOutput::changed(format!(
                        "Would {} saved object {}",
                        if existing.is_some() { "update" } else { "create" },
                        label
                    ))
                    .with_diff_if(context, diff)),
                    Some(ref current) => {
                        let id = id_of(current, "saved object")?;
                        kibana
                            .update_saved_object(
                                &config.object_type,
                                &id,
                                &config.attributes,
                                config.references.as_ref(),
                            )
                            .await?;
                        Ok(ModuleOutput::changed(format!("Updated saved object {}", label))
                            .with_diff_if(context, diff)
                            .with_data("object_id", json!(id)))
                    }
                    None => {
                        let created = kibana
                            .create_saved_object(
                                &config.object_type,
                                config.object_id.as_deref(),
                                &config.attributes,
                                config.references.as_ref(),
                                config.overwrite,
                            )
                            .await?;
                        Ok(ModuleOutput::changed(format!("Created saved object {}", label))
                            .with_diff_if(context, diff)
                            .with_data("object_id", json!(id_of(&created, "saved object")?)))
                    }
                }
            }
            State::Absent => {
                let Some(current) = existing else {
                    return Ok(ModuleOutput::ok(format!(
                        "Saved object {} does not exist",
                        label
                    )));
                };
                if context.check_mode {
                    return Ok(ModuleOutput::changed(format!(
                        "Would delete saved object {}",
                        label
                    )));
                }
                kibana
                    .delete_saved_object(&config.object_type, &id_of(&current, "saved object")?)
                    .await?;
                Ok(ModuleOutput::changed(format!("Deleted saved object {}", label)))
            }
        }
    }
}

impl Module for SavedObjectModule {
    fn name(&self) -> &'static str {
        "kibana_saved_object"
    }

    fn description(&self) -> &'static str {
        "Manage Kibana saved objects"
    }

    fn required_params(&self) -> &[&'static str] {
        &["object_type"]
    }

    fn validate_params(&self, params: &ModuleParams) -> ModuleResult<()> {
        SavedObjectConfig::from_params(params).map(|_| ())
    }

    fn execute(
        &self,
        params: &ModuleParams,
        context: &ModuleContext,
    ) -> ModuleResult<ModuleOutput> {
        run_async(self.execute_async(params, context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(value: Value) -> ModuleResult<SavedObjectConfig> {
        let params: ModuleParams = serde_json::from_value(value).unwrap();
        SavedObjectConfig::from_params(&params)
    }

    #[test]
    fn test_title_taken_from_attributes() {
        let config = config(json!({
            "object_type": "dashboard",
            "attributes": {"title": "SOC overview"}
        }))
        .unwrap();
        assert_eq!(config.title.as_deref(), Some("SOC overview"));
    }

    #[test]
    fn test_title_param_fills_attributes() {
        let config = config(json!({
            "object_type": "dashboard",
            "title": "Hosts",
            "attributes": {"description": "all hosts"}
        }))
        .unwrap();
        assert_eq!(config.attributes["title"], "Hosts");
    }

    #[test]
    fn test_needs_id_or_title() {
        assert!(matches!(
            config(json!({"object_type": "dashboard"})),
            Err(ModuleError::MissingParameter(_))
        ));
    }

    #[test]
    fn test_up_to_date_ignores_server_fields() {
        let config = config(json!({
            "object_type": "index-pattern",
            "object_id": "logs",
            "attributes": {"title": "logs-*"}
        }))
        .unwrap();
        let stored = json!({
            "id": "logs",
            "type": "index-pattern",
            "version": "WzEsMV0=",
            "attributes": {"title": "logs-*", "fields": "[]"},
            "references": []
        });
        assert!(config.up_to_date(&stored));

        let changed = json!({"id": "logs", "attributes": {"title": "metrics-*"}});
        assert!(!config.up_to_date(&changed));
    }
}
