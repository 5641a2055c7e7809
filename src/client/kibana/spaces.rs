//! Kibana spaces.

use super::Kibana;
use crate::client::encode_segment;
use crate::error::{Error, Result};
use serde_json::Value;
use tracing::info;

const SPACES: &str = "/api/spaces/space";

impl Kibana {
    pub async fn spaces(&self) -> Result<Vec<Value>> {
        match self.transport().get(SPACES).await? {
            Value::Array(items) => Ok(items),
            other => Err(Error::invalid_response(format!(
                "expected a list of spaces, got {}",
                other
            ))),
        }
    }

    pub async fn space_info(&self, space_id: &str) -> Result<Option<Value>> {
        self.transport()
            .get_opt(&format!("{}/{}", SPACES, encode_segment(space_id)))
            .await
    }

    pub async fn create_space(&self, body: &Value) -> Result<Value> {
        info!(
            "Creating space '{}'",
            body.get("id").and_then(|v| v.as_str()).unwrap_or("")
        );
        self.transport().post(SPACES, body).await
    }

    pub async fn update_space(&self, space_id: &str, body: &Value) -> Result<Value> {
        info!("Updating space '{}'", space_id);
        self.transport()
            .put(&format!("{}/{}", SPACES, encode_segment(space_id)), body)
            .await
    }

    pub async fn delete_space(&self, space_id: &str) -> Result<Value> {
        info!("Deleting space '{}'", space_id);
        self.transport()
            .delete(&format!("{}/{}", SPACES, encode_segment(space_id)))
            .await
    }
}
