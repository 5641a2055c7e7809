//! Alerting rules ("alerts") and action connectors.

use super::{find_by, Kibana};
use crate::client::{encode_segment, list_at};
use crate::error::{Error, Result};
use reqwest::Method;
use serde_json::{json, Map, Value};
use tracing::info;

const RULE: &str = "/api/alerting/rule";
const RULES_FIND: &str = "/api/alerting/rules/_find";
const CONNECTOR: &str = "/api/actions/connector";

/// Keys the rule update API accepts; everything else is create-only.
const ALERT_UPDATE_FIELDS: &[&str] = &[
    "name",
    "tags",
    "schedule",
    "params",
    "actions",
    "notify_when",
    "throttle",
];

/// Reduce a full rule body to the fields accepted on update.
pub fn alert_update_body(body: &Value) -> Value {
    let mut update = Map::new();
    if let Some(map) = body.as_object() {
        for field in ALERT_UPDATE_FIELDS {
            if let Some(value) = map.get(*field) {
                update.insert((*field).to_string(), value.clone());
            }
        }
    }
    Value::Object(update)
}

fn as_list(response: Value, what: &str) -> Result<Vec<Value>> {
    match response {
        Value::Array(items) => Ok(items),
        other => Err(Error::invalid_response(format!(
            "expected a list of {}, got {}",
            what, other
        ))),
    }
}

impl Kibana {
    // ---------------------------------------------------------------------
    // Alerting rules
    // ---------------------------------------------------------------------

    /// Rules whose name matches a full-text search for `name`.
    pub async fn find_alerts(&self, name: &str) -> Result<Vec<Value>> {
        let response = self
            .transport()
            .get_query(
                &self.spaced(RULES_FIND),
                &[
                    ("search_fields", "name".to_string()),
                    ("search", name.to_string()),
                    ("per_page", "100".to_string()),
                ],
            )
            .await?;
        list_at(&response, "data")
    }

    pub async fn alert_by_name(&self, name: &str) -> Result<Option<Value>> {
        Ok(find_by(self.find_alerts(name).await?, "name", name))
    }

    pub async fn create_alert(&self, body: &Value) -> Result<Value> {
        info!(
            "Creating alert '{}'",
            body.get("name").and_then(|v| v.as_str()).unwrap_or("")
        );
        self.transport().post(&self.spaced(RULE), body).await
    }

    pub async fn update_alert(&self, alert_id: &str, body: &Value) -> Result<Value> {
        info!("Updating alert {}", alert_id);
        self.transport()
            .put(
                &self.spaced(&format!("{}/{}", RULE, encode_segment(alert_id))),
                &alert_update_body(body),
            )
            .await
    }

    pub async fn delete_alert(&self, alert_id: &str) -> Result<Value> {
        info!("Deleting alert {}", alert_id);
        self.transport()
            .delete(&self.spaced(&format!("{}/{}", RULE, encode_segment(alert_id))))
            .await
    }

    pub async fn set_alert_enabled(&self, alert_id: &str, enabled: bool) -> Result<Value> {
        let action = if enabled { "_enable" } else { "_disable" };
        info!("{} alert {}", action, alert_id);
        self.transport()
            .request(
                Method::POST,
                &self.spaced(&format!("{}/{}/{}", RULE, encode_segment(alert_id), action)),
                &[],
                None,
            )
            .await
    }

    // ---------------------------------------------------------------------
    // Connectors
    // ---------------------------------------------------------------------

    pub async fn connectors(&self) -> Result<Vec<Value>> {
        let response = self
            .transport()
            .get(&self.spaced("/api/actions/connectors"))
            .await?;
        as_list(response, "connectors")
    }

    pub async fn connector_by_name(&self, name: &str) -> Result<Option<Value>> {
        Ok(find_by(self.connectors().await?, "name", name))
    }

    pub async fn connector_types(&self) -> Result<Vec<Value>> {
        let response = self
            .transport()
            .get(&self.spaced("/api/actions/connector_types"))
            .await?;
        as_list(response, "connector types")
    }

    /// Resolve a connector type given either its id (`.email`) or display
    /// name (`Email`), case-insensitively.
    pub async fn connector_type_id(&self, name_or_id: &str) -> Result<Option<String>> {
        let wanted = name_or_id.to_lowercase();
        Ok(self.connector_types().await?.into_iter().find_map(|t| {
            let id = t.get("id").and_then(Value::as_str)?;
            let name = t.get("name").and_then(Value::as_str).unwrap_or("");
            (id.to_lowercase() == wanted || name.to_lowercase() == wanted).then(|| id.to_string())
        }))
    }

    pub async fn create_connector(
        &self,
        name: &str,
        connector_type_id: &str,
        config: &Value,
        secrets: &Value,
    ) -> Result<Value> {
        info!("Creating connector '{}' ({})", name, connector_type_id);
        self.transport()
            .post(
                &self.spaced(CONNECTOR),
                &json!({
                    "name": name,
                    "connector_type_id": connector_type_id,
                    "config": config,
                    "secrets": secrets,
                }),
            )
            .await
    }

    pub async fn update_connector(
        &self,
        connector_id: &str,
        name: &str,
        config: &Value,
        secrets: &Value,
    ) -> Result<Value> {
        info!("Updating connector {}", connector_id);
        self.transport()
            .put(
                &self.spaced(&format!("{}/{}", CONNECTOR, encode_segment(connector_id))),
                &json!({ "name": name, "config": config, "secrets": secrets }),
            )
            .await
    }

    pub async fn delete_connector(&self, connector_id: &str) -> Result<Value> {
        info!("Deleting connector {}", connector_id);
        self.transport()
            .delete(&self.spaced(&format!("{}/{}", CONNECTOR, encode_segment(connector_id))))
            .await
    }
}
