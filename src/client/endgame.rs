//! Endgame platform API: session login and sensor deployment profiles.

use super::kibana::find_by;
use super::{encode_segment, list_at, ApiClient, Auth, ConnectionSettings, Transport};
use crate::error::{Error, Result};
use serde_json::{json, Value};
use tracing::{debug, info};

/// Default Endgame HTTPS port
pub const DEFAULT_PORT: u16 = 443;

const API: &str = "/api/v1";

/// Client authenticated with an Endgame session token.
#[derive(Debug, Clone)]
pub struct Endgame {
    client: ApiClient,
}

impl Endgame {
    /// Log in with the username/password from `settings`.
    ///
    /// The login response carries a JWT in `metadata.token`; every later
    /// request sends it as `Authorization: JWT <token>`.
    pub async fn login(settings: &ConnectionSettings) -> Result<Self> {
        let (username, password) = match &settings.auth {
            Auth::Basic { username, password } => (username.clone(), password.clone()),
            _ => {
                return Err(Error::Authentication(
                    "Endgame login requires a username and password".to_string(),
                ))
            }
        };

        let mut client = ApiClient::new(&settings.clone().with_auth(Auth::None))?;
        debug!("Logging in to Endgame as {}", username);

        let response = client
            .post(
                &format!("{}/auth/login", API),
                &json!({ "username": username, "password": password }),
            )
            .await
            .map_err(|e| match e.status() {
                Some(401) | Some(403) => Error::Authentication(e.to_string()),
                _ => e,
            })?;

        let token = response
            .pointer("/metadata/token")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Authentication("login response carried no token".to_string()))?;

        client.set_auth(Auth::Jwt(token.to_string()));
        Ok(Self { client })
    }

    /// Wrap an already authenticated client.
    pub fn from_client(client: ApiClient) -> Self {
        Self { client }
    }

    /// Sensor configurations (deployment profiles).
    pub async fn sensor_configurations(&self) -> Result<Vec<Value>> {
        let response = self
            .client
            .get(&format!("{}/deployment-profiles", API))
            .await?;
        list_at(&response, "data")
    }

    pub async fn sensor_configuration_by_name(&self, name: &str) -> Result<Option<Value>> {
        Ok(find_by(self.sensor_configurations().await?, "name", name))
    }

    pub async fn create_sensor_configuration(&self, body: &Value) -> Result<Value> {
        info!(
            "Creating sensor configuration '{}'",
            body.get("name").and_then(|v| v.as_str()).unwrap_or("")
        );
        let response = self
            .client
            .post(&format!("{}/deployment-profiles", API), body)
            .await?;
        Ok(data_of(response))
    }

    pub async fn update_sensor_configuration(&self, profile_id: &str, body: &Value) -> Result<Value> {
        info!("Updating sensor configuration {}", profile_id);
        let response = self
            .client
            .put(
                &format!("{}/deployment-profiles/{}", API, encode_segment(profile_id)),
                body,
            )
            .await?;
        Ok(data_of(response))
    }

    pub async fn delete_sensor_configuration(&self, profile_id: &str) -> Result<Value> {
        info!("Deleting sensor configuration {}", profile_id);
        self.client
            .delete(&format!("{}/deployment-profiles/{}", API, encode_segment(profile_id)))
            .await
    }

    /// Endpoints whose name matches `name`.
    pub async fn endpoints(&self, name: &str) -> Result<Vec<Value>> {
        let response = self
            .client
            .get_query(&format!("{}/endpoints", API), &[("name", name.to_string())])
            .await?;
        list_at(&response, "data")
    }
}

fn data_of(response: Value) -> Value {
    match response {
        Value::Object(mut map) if map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}
