//! Fleet: agent policies, enrollment keys, packages and package policies.

use super::{find_by, item_of, Kibana};
use crate::client::{encode_segment, list_at};
use crate::error::{Error, OptionalExt, Result};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::info;

const AGENT_POLICIES: &str = "/api/fleet/agent_policies";
const PACKAGE_POLICIES: &str = "/api/fleet/package_policies";
const PACKAGES: &str = "/api/fleet/epm/packages";
const PER_PAGE: &str = "1000";

/// Fields Fleet returns but rejects on update.
const READ_ONLY_POLICY_FIELDS: &[&str] = &[
    "id",
    "revision",
    "created_at",
    "created_by",
    "updated_at",
    "updated_by",
    "version",
    "elasticsearch",
];

/// Drop the fields Fleet refuses in a package policy update.
pub fn strip_read_only(policy: &mut Value) {
    if let Some(map) = policy.as_object_mut() {
        for field in READ_ONLY_POLICY_FIELDS {
            map.remove(*field);
        }
    }
    if let Some(inputs) = policy.get_mut("inputs").and_then(Value::as_array_mut) {
        for input in inputs {
            if let Some(map) = input.as_object_mut() {
                map.remove("compiled_input");
            }
            if let Some(streams) = input.get_mut("streams").and_then(Value::as_array_mut) {
                for stream in streams {
                    if let Some(map) = stream.as_object_mut() {
                        map.remove("id");
                        map.remove("compiled_stream");
                    }
                }
            }
        }
    }
}

impl Kibana {
    /// Initialise Fleet (idempotent on the server).
    pub async fn fleet_setup(&self) -> Result<Value> {
        self.transport().post("/api/fleet/setup", &json!({})).await
    }

    // ---------------------------------------------------------------------
    // Agent policies
    // ---------------------------------------------------------------------

    pub async fn agent_policies(&self) -> Result<Vec<Value>> {
        let response = self
            .transport()
            .get_query(AGENT_POLICIES, &[("perPage", PER_PAGE.to_string())])
            .await?;
        list_at(&response, "items")
    }

    pub async fn agent_policy_by_name(&self, name: &str) -> Result<Option<Value>> {
        Ok(find_by(self.agent_policies().await?, "name", name))
    }

    pub async fn agent_policy(&self, policy_id: &str) -> Result<Option<Value>> {
        let response = self
            .transport()
            .get_opt(&format!("{}/{}", AGENT_POLICIES, encode_segment(policy_id)))
            .await?;
        response.map(|r| item_of(r, "agent policy")).transpose()
    }

    pub async fn create_agent_policy(&self, body: &Value) -> Result<Value> {
        info!(
            "Creating agent policy '{}'",
            body.get("name").and_then(|v| v.as_str()).unwrap_or("")
        );
        let response = self.transport().post(AGENT_POLICIES, body).await?;
        item_of(response, "agent policy")
    }

    pub async fn update_agent_policy(&self, policy_id: &str, body: &Value) -> Result<Value> {
        info!("Updating agent policy {}", policy_id);
        let response = self
            .transport()
            .put(&format!("{}/{}", AGENT_POLICIES, encode_segment(policy_id)), body)
            .await?;
        item_of(response, "agent policy")
    }

    pub async fn delete_agent_policy(&self, policy_id: &str) -> Result<Value> {
        info!("Deleting agent policy {}", policy_id);
        self.transport()
            .post(
                &format!("{}/delete", AGENT_POLICIES),
                &json!({ "agentPolicyId": policy_id }),
            )
            .await
    }

    /// Enrollment API keys belonging to one agent policy.
    pub async fn enrollment_keys(&self, policy_id: &str) -> Result<Vec<Value>> {
        let response = self
            .transport()
            .get_query(
                "/api/fleet/enrollment_api_keys",
                &[("perPage", PER_PAGE.to_string())],
            )
            .await?;

        // Kibana 7.x calls the list `list`, 8.x calls it `items`
        let keys = match response.get("items") {
            Some(_) => list_at(&response, "items")?,
            None => list_at(&response, "list")?,
        };

        Ok(keys
            .into_iter()
            .filter(|k| k.get("policy_id").and_then(Value::as_str) == Some(policy_id))
            .collect())
    }

    // ---------------------------------------------------------------------
    // Packages
    // ---------------------------------------------------------------------

    /// Package metadata, including its policy templates and data streams.
    pub async fn package_info(&self, package: &str) -> Result<Value> {
        let response = self
            .transport()
            .get_opt(&format!("{}/{}", PACKAGES, encode_segment(package)))
            .await?
            .ok_or_else(|| Error::not_found("integration package", package))?;
        item_of(response, "package")
    }

    pub async fn install_package(&self, package: &str, version: &str) -> Result<Value> {
        info!("Installing package {}-{}", package, version);
        self.transport()
            .request(
                Method::POST,
                &format!(
                    "{}/{}/{}",
                    PACKAGES,
                    encode_segment(package),
                    encode_segment(version)
                ),
                &[],
                Some(&json!({ "force": false })),
            )
            .await
    }

    // ---------------------------------------------------------------------
    // Package policies
    // ---------------------------------------------------------------------

    pub async fn package_policies(&self) -> Result<Vec<Value>> {
        let response = self
            .transport()
            .get_query(PACKAGE_POLICIES, &[("perPage", PER_PAGE.to_string())])
            .await?;
        list_at(&response, "items")
    }

    /// Package policy by name, optionally restricted to one agent policy.
    pub async fn package_policy_by_name(
        &self,
        agent_policy_id: Option<&str>,
        name: &str,
    ) -> Result<Option<Value>> {
        Ok(self.package_policies().await?.into_iter().find(|p| {
            p.get("name").and_then(Value::as_str) == Some(name)
                && agent_policy_id.map_or(true, |id| {
                    p.get("policy_id").and_then(Value::as_str) == Some(id)
                })
        }))
    }

    pub async fn package_policy(&self, policy_id: &str) -> Result<Option<Value>> {
        let response = self
            .transport()
            .get(&format!("{}/{}", PACKAGE_POLICIES, encode_segment(policy_id)))
            .await
            .optional()?;
        response.map(|r| item_of(r, "package policy")).transpose()
    }

    pub async fn create_package_policy(&self, body: &Value) -> Result<Value> {
        info!(
            "Creating package policy '{}'",
            body.get("name").and_then(|v| v.as_str()).unwrap_or("")
        );
        let response = self.transport().post(PACKAGE_POLICIES, body).await?;
        item_of(response, "package policy")
    }

    pub async fn update_package_policy(&self, policy_id: &str, body: &Value) -> Result<Value> {
        info!("Updating package policy {}", policy_id);
        let mut body = body.clone();
        strip_read_only(&mut body);
        let response = self
            .transport()
            .put(
                &format!("{}/{}", PACKAGE_POLICIES, encode_segment(policy_id)),
                &body,
            )
            .await?;
        item_of(response, "package policy")
    }

    pub async fn delete_package_policy(&self, policy_id: &str) -> Result<Value> {
        info!("Deleting package policy {}", policy_id);
        self.transport()
            .post(
                &format!("{}/delete", PACKAGE_POLICIES),
                &json!({ "packagePolicyIds": [policy_id] }),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_strip_read_only() {
        let mut policy = json!({
            "id": "p1",
            "revision": 3,
            "version": "WzEsMV0=",
            "name": "system-1",
            "policy_id": "agent-1",
            "inputs": [{
                "type": "logfile",
                "compiled_input": {},
                "streams": [{"id": "s1", "compiled_stream": {}, "enabled": true}]
            }]
        });
        strip_read_only(&mut policy);
        assert_eq!(
            policy,
            json!({
                "name": "system-1",
                "policy_id": "agent-1",
                "inputs": [{"type": "logfile", "streams": [{"enabled": true}]}]
            })
        );
    }
}
