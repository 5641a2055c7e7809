//! Kibana REST API wrapper.
//!
//! The wrapper is split by API area:
//!
//! - [`fleet`]: agent policies, enrollment keys, packages, package policies
//! - [`saved_objects`]: saved object CRUD, export and bulk import
//! - [`alerting`]: alerting rules and their connectors
//! - [`detection`]: Elastic Security detection rules
//! - [`spaces`]: Kibana spaces
//!
//! Every request carries `kbn-xsrf: true`. Space-aware APIs are routed
//! through `/s/{space}` when the client was built with [`Kibana::with_space`].

pub mod alerting;
pub mod detection;
pub mod fleet;
pub mod saved_objects;
pub mod spaces;

use super::{encode_segment, ApiClient, ConnectionSettings, Transport};
use crate::error::{Error, Result};
use serde_json::Value;
use std::sync::Arc;

/// Default Kibana HTTP port
pub const DEFAULT_PORT: u16 = 5601;

/// Space id that needs no `/s/` prefix
pub const DEFAULT_SPACE: &str = "default";

/// Client for the Kibana APIs used by the modules.
#[derive(Clone)]
pub struct Kibana {
    transport: Arc<dyn Transport>,
    space: Option<String>,
}

impl std::fmt::Debug for Kibana {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kibana")
            .field("space", &self.space)
            .finish_non_exhaustive()
    }
}

impl Kibana {
    /// Connect directly to Kibana.
    pub fn new(settings: &ConnectionSettings) -> Result<Self> {
        let client = ApiClient::new(settings)?.with_header("kbn-xsrf", "true");
        Ok(Self::with_transport(client))
    }

    /// Use any transport, e.g. an [`EceApiProxy`](super::EceApiProxy).
    pub fn with_transport(transport: impl Transport + 'static) -> Self {
        Self {
            transport: Arc::new(transport),
            space: None,
        }
    }

    /// Route space-aware APIs to `space`.
    pub fn with_space(mut self, space: impl Into<String>) -> Self {
        let space = space.into();
        self.space = if space.is_empty() || space == DEFAULT_SPACE {
            None
        } else {
            Some(space)
        };
        self
    }

    pub fn space(&self) -> Option<&str> {
        self.space.as_deref()
    }

    pub(crate) fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    /// Prefix a space-aware API path with the selected space.
    pub(crate) fn spaced(&self, path: &str) -> String {
        match self.space {
            Some(ref space) => format!("/s/{}{}", encode_segment(space), path),
            None => path.to_string(),
        }
    }

    pub async fn status(&self) -> Result<Value> {
        self.transport.get("/api/status").await
    }

    pub async fn version(&self) -> Result<String> {
        let status = self.status().await?;
        status
            .pointer("/version/number")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| Error::invalid_response("status without version.number"))
    }
}

/// The `item` of a Fleet-style single-object response.
pub(crate) fn item_of(response: Value, what: &str) -> Result<Value> {
    match response {
        Value::Object(mut map) => map
            .remove("item")
            .or_else(|| map.remove("response"))
            .ok_or_else(|| Error::invalid_response(format!("{} response without item", what))),
        other => Err(Error::invalid_response(format!(
            "{} response is not an object: {}",
            what, other
        ))),
    }
}

/// First element whose `key` equals `value`.
pub(crate) fn find_by(items: Vec<Value>, key: &str, value: &str) -> Option<Value> {
    items
        .into_iter()
        .find(|item| item.get(key).and_then(Value::as_str) == Some(value))
}
