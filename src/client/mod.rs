//! HTTP plumbing shared by the Elastic API wrappers.
//!
//! Every wrapper ([`Ece`], [`Elastic`], [`Kibana`], [`Endgame`]) sits on top
//! of a [`Transport`]. The default transport is [`ApiClient`], which talks to
//! the service directly. [`EceApiProxy`] is an alternative transport that
//! tunnels Elasticsearch and Kibana calls through the ECE deployment proxy.
//!
//! # Response handling
//!
//! - 2xx with an empty body yields `Value::Null`
//! - 2xx with a non-JSON body yields `Value::String(body)`
//! - anything else yields [`Error::Api`] with the server's error reason

pub mod ece;
pub mod ece_proxy;
pub mod elastic;
pub mod endgame;
pub mod kibana;

pub use ece::{DeploymentRequest, Ece, ResourceKind, TopologySize};
pub use ece_proxy::{EceApiProxy, ProxyTarget};
pub use elastic::Elastic;
pub use endgame::Endgame;
pub use kibana::Kibana;

use crate::error::{Error, OptionalExt, Result};
use crate::poll::BackoffStrategy;
use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Default timeout in seconds for HTTP requests
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default delay between retries of transient failures
const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Maximum retry delay (for exponential backoff)
const MAX_RETRY_DELAY: Duration = Duration::from_secs(10);

/// Supported authentication schemes
#[derive(Clone, PartialEq, Eq, Default)]
pub enum Auth {
    /// No authentication
    #[default]
    None,
    /// HTTP Basic authentication (username:password)
    Basic { username: String, password: String },
    /// Elasticsearch API key (already base64-encoded `id:key`)
    ApiKey(String),
    /// Bearer token authentication
    Bearer(String),
    /// Endgame session token
    Jwt(String),
}

impl Auth {
    /// Convenience constructor for basic credentials.
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Auth::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Value for the `Authorization` header, if any.
    pub fn header_value(&self) -> Option<String> {
        match self {
            Auth::None => None,
            Auth::Basic { username, password } => {
                let credentials = base64::Engine::encode(
                    &base64::engine::general_purpose::STANDARD,
                    format!("{}:{}", username, password),
                );
                Some(format!("Basic {}", credentials))
            }
            Auth::ApiKey(key) => Some(format!("ApiKey {}", key)),
            Auth::Bearer(token) => Some(format!("Bearer {}", token)),
            Auth::Jwt(token) => Some(format!("JWT {}", token)),
        }
    }
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Auth::None => write!(f, "None"),
            Auth::Basic { username, .. } => write!(f, "Basic({}:***)", username),
            Auth::ApiKey(_) => write!(f, "ApiKey(***)"),
            Auth::Bearer(_) => write!(f, "Bearer(***)"),
            Auth::Jwt(_) => write!(f, "Jwt(***)"),
        }
    }
}

/// Where and how to reach one service.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionSettings {
    /// URL scheme, `https` unless overridden
    pub protocol: String,
    /// Hostname, or a full base URL including scheme
    pub host: String,
    /// Service port
    pub port: u16,
    /// Credentials
    pub auth: Auth,
    /// Per-request timeout
    pub timeout: Duration,
    /// Whether TLS certificates are verified
    pub validate_certs: bool,
    /// Retries for transient failures (connect errors, 429, 502-504)
    pub retries: u32,
}

impl ConnectionSettings {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            protocol: "https".to_string(),
            host: host.into(),
            port,
            auth: Auth::None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            validate_certs: true,
            retries: 0,
        }
    }

    /// Build settings from a full URL such as `http://127.0.0.1:9200`.
    pub fn from_url(url: &str) -> Result<Self> {
        let parsed = Url::parse(url).map_err(|e| Error::InvalidUrl(format!("{}: {}", url, e)))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| Error::InvalidUrl(format!("{}: missing host", url)))?;
        let port = parsed
            .port_or_known_default()
            .ok_or_else(|| Error::InvalidUrl(format!("{}: missing port", url)))?;
        Ok(Self::new(host, port).with_protocol(parsed.scheme()))
    }

    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    pub fn with_auth(mut self, auth: Auth) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_basic_auth(self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.with_auth(Auth::basic(username, password))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_validate_certs(mut self, validate_certs: bool) -> Self {
        self.validate_certs = validate_certs;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Render `protocol://host:port`.
    ///
    /// A host that already carries a scheme is used as-is.
    pub fn base_url(&self) -> Result<Url> {
        let raw = if self.host.contains("://") {
            self.host.clone()
        } else {
            format!("{}://{}:{}", self.protocol, self.host, self.port)
        };
        Url::parse(&raw).map_err(|e| Error::InvalidUrl(format!("{}: {}", raw, e)))
    }
}

/// A way of sending JSON requests to an Elastic REST API.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and decode the response body.
    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value>;

    async fn get(&self, path: &str) -> Result<Value> {
        self.request(Method::GET, path, &[], None).await
    }

    async fn get_query(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        self.request(Method::GET, path, query, None).await
    }

    /// GET that maps 404 to `None`.
    async fn get_opt(&self, path: &str) -> Result<Option<Value>> {
        self.get(path).await.optional()
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        self.request(Method::POST, path, &[], Some(body)).await
    }

    async fn put(&self, path: &str, body: &Value) -> Result<Value> {
        self.request(Method::PUT, path, &[], Some(body)).await
    }

    async fn patch(&self, path: &str, body: &Value) -> Result<Value> {
        self.request(Method::PATCH, path, &[], Some(body)).await
    }

    async fn delete(&self, path: &str) -> Result<Value> {
        self.request(Method::DELETE, path, &[], None).await
    }
}

/// Direct HTTP transport built on `reqwest`.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: Url,
    auth: Auth,
    headers: HeaderMap,
    retries: u32,
    backoff: BackoffStrategy,
}

impl ApiClient {
    /// Build a client with the configured timeout and certificate policy.
    pub fn new(settings: &ConnectionSettings) -> Result<Self> {
        let http = Client::builder()
            .timeout(settings.timeout)
            .connect_timeout(settings.timeout / 2)
            .danger_accept_invalid_certs(!settings.validate_certs)
            .build()?;

        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));

        Ok(Self {
            http,
            base_url: settings.base_url()?,
            auth: settings.auth.clone(),
            headers,
            retries: settings.retries,
            backoff: BackoffStrategy::Exponential { multiplier: 2.0 },
        })
    }

    /// Add a header sent with every request.
    pub fn with_header(mut self, name: &'static str, value: &'static str) -> Self {
        self.headers
            .insert(HeaderName::from_static(name), HeaderValue::from_static(value));
        self
    }

    /// Replace the credentials, e.g. after a session login.
    pub fn set_auth(&mut self, auth: Auth) {
        self.auth = auth;
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Join an API path onto the base URL, keeping any base path prefix.
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        let raw = format!("{}/{}", base, path);
        Url::parse(&raw).map_err(|e| Error::InvalidUrl(format!("{}: {}", raw, e)))
    }

    async fn send_once(
        &self,
        method: &Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value> {
        let url = self.endpoint(path)?;
        let mut request = self
            .http
            .request(method.clone(), url)
            .headers(self.headers.clone());

        if !query.is_empty() {
            request = request.query(query);
        }

        if let Some(auth) = self.auth.header_value() {
            request = request.header(header::AUTHORIZATION, auth);
        }

        if let Some(body_value) = body {
            request = request.json(body_value);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            Ok(decode_body(&text))
        } else {
            Err(Error::Api {
                status: status.as_u16(),
                method: method.to_string(),
                path: path.to_string(),
                message: extract_error_message(&text),
            })
        }
    }
}

#[async_trait]
impl Transport for ApiClient {
    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value> {
        let mut attempt = 0;

        loop {
            debug!("{} {}", method, path);

            match self.send_once(&method, path, query, body).await {
                Err(e) if e.is_transient() && attempt < self.retries => {
                    let delay = self
                        .backoff
                        .calculate_delay(attempt, DEFAULT_RETRY_DELAY)
                        .min(MAX_RETRY_DELAY);
                    warn!(
                        "{} {} failed ({}), retrying in {:?}",
                        method, path, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

/// Decode a success body: empty is null, non-JSON is kept as text.
pub(crate) fn decode_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// Array stored under `key`, an empty key meaning an empty list.
pub(crate) fn list_at(response: &Value, key: &str) -> Result<Vec<Value>> {
    match response.get(key) {
        Some(Value::Array(items)) => Ok(items.clone()),
        Some(Value::Null) | None => Ok(Vec::new()),
        Some(other) => Err(Error::invalid_response(format!(
            "'{}' is not a list: {}",
            key, other
        ))),
    }
}

/// Pull the most useful reason out of an Elastic error body.
pub(crate) fn extract_error_message(text: &str) -> String {
    if let Ok(json) = serde_json::from_str::<Value>(text) {
        if let Some(reason) = json.pointer("/error/reason").and_then(Value::as_str) {
            return reason.to_string();
        }
        if let Some(message) = json.get("message").and_then(Value::as_str) {
            return message.to_string();
        }
        // ECE reports a list of errors with code/message
        if let Some(message) = json.pointer("/errors/0/message").and_then(Value::as_str) {
            return message.to_string();
        }
        if let Some(error) = json.get("error").and_then(Value::as_str) {
            return error.to_string();
        }
    }
    text.trim().to_string()
}

/// Percent-encode one path segment (ids and names may contain spaces or `/`).
pub(crate) fn encode_segment(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}
