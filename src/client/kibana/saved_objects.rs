//! Saved objects: CRUD, title lookup, NDJSON export and bulk import.

use super::Kibana;
use crate::client::{encode_segment, list_at};
use crate::error::{Error, Result};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};

const SAVED_OBJECTS: &str = "/api/saved_objects";

fn object_path(object_type: &str, object_id: &str) -> String {
    format!(
        "{}/{}/{}",
        SAVED_OBJECTS,
        encode_segment(object_type),
        encode_segment(object_id)
    )
}

fn overwrite_query(overwrite: bool) -> Vec<(&'static str, String)> {
    vec![("overwrite", overwrite.to_string())]
}

/// Split an export reply into objects, dropping the summary line.
pub fn parse_export(response: Value) -> Result<Vec<Value>> {
    let objects = match response {
        Value::Null => Vec::new(),
        // a single exported line is valid JSON on its own
        Value::Object(_) => vec![response],
        Value::Array(items) => items,
        Value::String(text) => text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(serde_json::from_str)
            .collect::<std::result::Result<Vec<Value>, _>>()?,
        other => {
            return Err(Error::invalid_response(format!(
                "unexpected export body: {}",
                other
            )))
        }
    };

    Ok(objects
        .into_iter()
        .filter(|o| o.get("exportedCount").is_none())
        .collect())
}

impl Kibana {
    pub async fn saved_object(&self, object_type: &str, object_id: &str) -> Result<Option<Value>> {
        self.transport()
            .get_opt(&self.spaced(&object_path(object_type, object_id)))
            .await
    }

    /// Saved objects of one type, optionally filtered by a title search.
    pub async fn find_saved_objects(
        &self,
        object_type: &str,
        title: Option<&str>,
    ) -> Result<Vec<Value>> {
        let mut query = vec![
            ("type", object_type.to_string()),
            ("per_page", "1000".to_string()),
        ];
        if let Some(title) = title {
            query.push(("search_fields", "title".to_string()));
            query.push(("search", format!("\"{}\"", title)));
        }

        let response = self
            .transport()
            .get_query(&self.spaced(&format!("{}/_find", SAVED_OBJECTS)), &query)
            .await?;
        list_at(&response, "saved_objects")
    }

    /// Saved object whose title matches exactly.
    pub async fn saved_object_by_title(
        &self,
        object_type: &str,
        title: &str,
    ) -> Result<Option<Value>> {
        let found = self.find_saved_objects(object_type, Some(title)).await?;
        Ok(found
            .into_iter()
            .find(|o| o.pointer("/attributes/title").and_then(Value::as_str) == Some(title)))
    }

    pub async fn create_saved_object(
        &self,
        object_type: &str,
        object_id: Option<&str>,
        attributes: &Value,
        references: Option<&Value>,
        overwrite: bool,
    ) -> Result<Value> {
        let path = match object_id {
            Some(id) => object_path(object_type, id),
            None => format!("{}/{}", SAVED_OBJECTS, encode_segment(object_type)),
        };
        info!("Creating {} saved object {}", object_type, object_id.unwrap_or("(new)"));

        let mut body = json!({ "attributes": attributes });
        if let Some(references) = references {
            body["references"] = references.clone();
        }

        self.transport()
            .request(
                Method::POST,
                &self.spaced(&path),
                &overwrite_query(overwrite),
                Some(&body),
            )
            .await
    }

    pub async fn update_saved_object(
        &self,
        object_type: &str,
        object_id: &str,
        attributes: &Value,
        references: Option<&Value>,
    ) -> Result<Value> {
        info!("Updating {} saved object {}", object_type, object_id);
        let mut body = json!({ "attributes": attributes });
        if let Some(references) = references {
            body["references"] = references.clone();
        }
        self.transport()
            .put(&self.spaced(&object_path(object_type, object_id)), &body)
            .await
    }

    pub async fn delete_saved_object(&self, object_type: &str, object_id: &str) -> Result<Value> {
        info!("Deleting {} saved object {}", object_type, object_id);
        self.transport()
            .delete(&self.spaced(&object_path(object_type, object_id)))
            .await
    }

    /// Export whole types and/or individual `(type, id)` pairs.
    pub async fn export_saved_objects(
        &self,
        types: &[String],
        objects: &[(String, String)],
    ) -> Result<Vec<Value>> {
        let mut body = json!({ "includeReferencesDeep": true, "excludeExportDetails": false });
        if !types.is_empty() {
            body["type"] = json!(types);
        }
        if !objects.is_empty() {
            body["objects"] = objects
                .iter()
                .map(|(t, id)| json!({ "type": t, "id": id }))
                .collect();
        }

        let response = self
            .transport()
            .post(&self.spaced(&format!("{}/_export", SAVED_OBJECTS)), &body)
            .await?;
        let exported = parse_export(response)?;
        debug!("Exported {} saved objects", exported.len());
        Ok(exported)
    }

    /// Create many objects at once (e.g. the output of an export).
    pub async fn bulk_create_saved_objects(
        &self,
        objects: &[Value],
        overwrite: bool,
    ) -> Result<Value> {
        info!("Bulk creating {} saved objects", objects.len());
        let body = Value::Array(
            objects
                .iter()
                .map(|o| {
                    let mut entry = json!({
                        "type": o.get("type").cloned().unwrap_or(Value::Null),
                        "attributes": o.get("attributes").cloned().unwrap_or_else(|| json!({})),
                    });
                    if let Some(id) = o.get("id") {
                        entry["id"] = id.clone();
                    }
                    if let Some(references) = o.get("references") {
                        entry["references"] = references.clone();
                    }
                    entry
                })
                .collect(),
        );

        self.transport()
            .request(
                Method::POST,
                &self.spaced(&format!("{}/_bulk_create", SAVED_OBJECTS)),
                &overwrite_query(overwrite),
                Some(&body),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_export_ndjson() {
        let ndjson = concat!(
            "{\"type\":\"dashboard\",\"id\":\"d1\",\"attributes\":{\"title\":\"A\"}}\n",
            "{\"type\":\"visualization\",\"id\":\"v1\",\"attributes\":{\"title\":\"B\"}}\n",
            "{\"exportedCount\":2,\"missingRefCount\":0,\"missingReferences\":[]}\n"
        );
        let objects = parse_export(Value::String(ndjson.to_string())).unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[1]["id"], "v1");
    }

    #[test]
    fn test_parse_export_single_line() {
        let objects = parse_export(json!({"type": "index-pattern", "id": "logs"})).unwrap();
        assert_eq!(objects.len(), 1);

        let summary_only = parse_export(json!({"exportedCount": 0})).unwrap();
        assert!(summary_only.is_empty());
    }

    #[test]
    fn test_parse_export_rejects_garbage() {
        assert!(parse_export(Value::String("{not json}\n".into())).is_err());
        assert!(parse_export(json!(3)).is_err());
    }
}
