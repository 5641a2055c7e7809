//! Shared helpers for the HTTP-backed integration tests.
//!
//! ```rust,ignore
//! mod common;
//! use common::*;
//! ```

#![allow(dead_code)]

use rustible_elastic::client::{ConnectionSettings, Ece, Elastic, Kibana};
use rustible_elastic::modules::{ModuleContext, ModuleParams};
use serde_json::Value;
use wiremock::MockServer;

/// Connection settings pointing at a mock server.
pub fn settings(server: &MockServer) -> ConnectionSettings {
    ConnectionSettings::from_url(&server.uri()).unwrap()
}

pub fn ece(server: &MockServer) -> Ece {
    Ece::new(&settings(server)).unwrap()
}

pub fn elastic(server: &MockServer) -> Elastic {
    Elastic::new(&settings(server)).unwrap()
}

pub fn kibana(server: &MockServer) -> Kibana {
    Kibana::new(&settings(server)).unwrap()
}

/// Module parameters from a JSON object, with `host` set to the server.
pub fn params(server: &MockServer, value: Value) -> ModuleParams {
    let mut params: ModuleParams = serde_json::from_value(value).unwrap();
    params.insert("host".to_string(), Value::String(server.uri()));
    params
}

pub fn check_mode() -> ModuleContext {
    ModuleContext::default().with_check_mode(true)
}

pub fn diff_mode() -> ModuleContext {
    ModuleContext::default().with_diff_mode(true)
}

/// Requests the server received with a method other than GET.
pub async fn mutating_requests(server: &MockServer) -> Vec<wiremock::Request> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.method != wiremock::http::Method::GET)
        .collect()
}
