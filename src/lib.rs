//! # rustible-elastic
//!
//! Rustible modules and API clients for the Elastic stack: Elastic Cloud
//! Enterprise deployments, Elasticsearch security and templates, Kibana
//! Fleet, alerting, detection rules, saved objects and spaces, and Endgame
//! sensor configurations.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                 CLI (clap) / Rustible playbooks               │
//! └──────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │          Module Registry (sync Module trait, check mode)      │
//! └──────────────────────────────────────────────────────────────┘
//!                               │
//!          ┌────────────┬───────┴──────┬──────────────┐
//!          ▼            ▼              ▼              ▼
//!     ┌─────────┐  ┌──────────┐  ┌──────────┐  ┌──────────┐
//!     │   Ece   │  │ Elastic  │  │  Kibana  │  │ Endgame  │
//!     └─────────┘  └──────────┘  └──────────┘  └──────────┘
//!          │            │              │              │
//!          │            └──── Transport ──────────────┘
//!          │               (ApiClient or EceApiProxy)
//!          ▼
//!      ECE REST API
//! ```
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use rustible_elastic::prelude::*;
//! use serde_json::json;
//!
//! let registry = ModuleRegistry::with_builtins();
//! let params: ModuleParams = serde_json::from_value(json!({
//!     "host": "kibana.example.com",
//!     "api_key": "…",
//!     "name": "windows-hosts",
//! }))?;
//! let output = registry.execute(
//!     "kibana_agent_policy",
//!     &params,
//!     &ModuleContext::default().with_check_mode(true),
//! )?;
//! println!("{}", output.msg);
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

// Re-export commonly used items in prelude
pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    // API clients
    pub use crate::client::{
        ApiClient, Auth, ConnectionSettings, Ece, EceApiProxy, Elastic, Endgame, Kibana,
        ProxyTarget, Transport,
    };

    // Error handling
    pub use crate::error::{Error, Result};

    // Module system
    pub use crate::modules::{
        Module, ModuleContext, ModuleError, ModuleOutput, ModuleParams, ModuleRegistry,
        ModuleResult, ParamExt,
    };

    // Polling
    pub use crate::poll::PollPolicy;
}

/// REST clients for ECE, Elasticsearch, Kibana and Endgame.
///
/// Every client sits on the [`Transport`](client::Transport) trait so that
/// Elasticsearch and Kibana calls can be routed through the ECE proxy.
pub mod client;

/// Layered configuration: service profiles, polling and logging.
pub mod config;

/// Error types and result aliases for client operations.
pub mod error;

/// Modules executed by Rustible tasks.
pub mod modules;

/// Polling of long-running operations.
pub mod poll;

/// Helpers shared by modules: tag merging, deep merge and Fleet inputs.
pub mod util;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
