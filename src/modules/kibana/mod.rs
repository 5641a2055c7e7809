//! Kibana modules.
//!
//! - **kibana_agent_policy**: Fleet agent policies
//! - **kibana_package_policy**: Fleet integration (package) policies
//! - **kibana_saved_object**: saved objects in a space
//! - **kibana_alert**: alerting rules
//! - **kibana_connector**: action connectors
//! - **kibana_security_rule**: detection engine rules
//! - **kibana_space**: spaces
//!
//! Every module connects directly (`host`, default port 5601) or, with
//! `ece_host` and `deployment_name`, through the ECE deployment proxy.
//! Modules working on space-scoped objects accept `space`.

pub mod agent_policy;
pub mod alert;
pub mod connector;
pub mod package_policy;
pub mod saved_object;
pub mod security_rule;
pub mod space;

pub use agent_policy::AgentPolicyModule;
pub use alert::AlertModule;
pub use connector::ConnectorModule;
pub use package_policy::PackagePolicyModule;
pub use saved_object::SavedObjectModule;
pub use security_rule::SecurityRuleModule;
pub use space::SpaceModule;
