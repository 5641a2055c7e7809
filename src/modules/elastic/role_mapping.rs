//! Elasticsearch security role mapping module.
//!
//! ## Parameters
//!
//! | Parameter | Required | Description |
//! |-----------|----------|-------------|
//! | `name` | Yes | Role mapping name |
//! | `roles` | present | Roles granted to matching users |
//! | `rules` | present | Mapping rules, e.g. `{"field": {"groups": "cn=admins,dc=example"}}` |
//! | `enabled` | No | Whether the mapping is active (default: true) |
//! | `metadata` | No | Free-form metadata |
//! | `state` | No | present or absent (default: present) |
//!
//! ## Example
//!
//! ```yaml
//! - name: Map LDAP admins to superuser
//!   elastic_role_mapping:
//!     host: es.example.com
//!     username: elastic
//!     password: "{{ elastic_password }}"
//!     name: ldap-admins
//!     roles: [superuser]
//!     rules:
//!       field:
//!         groups: "cn=admins,dc=example,dc=com"
//! ```

use super::converge;
use crate::modules::common::{elastic_client, State};
use crate::modules::{
    run_async, Module, ModuleContext, ModuleError, ModuleOutput, ModuleParams, ModuleResult,
    ParamExt,
};
use serde_json::{json, Value};

#[derive(Debug, Clone)]
struct RoleMappingConfig {
    name: String,
    state: State,
    body: Value,
}

impl RoleMappingConfig {
    fn from_params(params: &ModuleParams) -> ModuleResult<Self> {
        let body = json!({
            "enabled": params.get_bool_or("enabled", true),
            "roles": params.get_vec_string("roles")?.unwrap_or_default(),
            "rules": params.get_object("rules")?.unwrap_or_else(|| json!({})),
            "metadata": params.get_object("metadata")?.unwrap_or_else(|| json!({})),
        });
        Ok(Self {
            name: params.get_string_required("name")?,
            state: State::from_params(params)?,
            body,
        })
    }
}

/// Module managing Elasticsearch role mappings
pub struct RoleMappingModule;

impl RoleMappingModule {
    async fn execute_async(
        &self,
        params: &ModuleParams,
        context: &ModuleContext,
    ) -> ModuleResult<ModuleOutput> {
        let config = RoleMappingConfig::from_params(params)?;
        let elastic = elastic_client(params).await?;
        let existing = elastic.role_mapping(&config.name).await?;

        converge(
            &format!("role mapping '{}'", config.name),
            config.state,
            existing,
            &config.body,
            context,
            || elastic.put_role_mapping(&config.name, &config.body),
            || elastic.delete_role_mapping(&config.name),
        )
        .await
    }
}

impl Module for RoleMappingModule {
    fn name(&self) -> &'static str {
        "elastic_role_mapping"
    }

    fn description(&self) -> &'static str {
        "Manage Elasticsearch role mappings"
    }

    fn required_params(&self) -> &[&'static str] {
        &["name"]
    }

    fn validate_params(&self, params: &ModuleParams) -> ModuleResult<()> {
        let config = RoleMappingConfig::from_params(params)?;
        if config.state == State::Present {
            for key in ["roles", "rules"] {
                if !params.contains_key(key) {
                    return Err(ModuleError::MissingParameter(key.to_string()));
                }
            }
        }
        Ok(())
    }

    fn execute(
        &self,
        params: &ModuleParams,
        context: &ModuleContext,
    ) -> ModuleResult<ModuleOutput> {
        run_async(self.execute_async(params, context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_body_from_params() {
        let params: ModuleParams = serde_json::from_value(json!({
            "name": "ldap-admins",
            "roles": ["superuser"],
            "rules": {"field": {"groups": "admins"}}
        }))
        .unwrap();
        let config = RoleMappingConfig::from_params(&params).unwrap();
        assert_eq!(
            config.body,
            json!({
                "enabled": true,
                "roles": ["superuser"],
                "rules": {"field": {"groups": "admins"}},
                "metadata": {}
            })
        );
    }

    #[test]
    fn test_validate_present_needs_roles_and_rules() {
        let params: ModuleParams =
            serde_json::from_value(json!({"name": "x", "roles": ["r"]})).unwrap();
        assert!(matches!(
            RoleMappingModule.validate_params(&params),
            Err(ModuleError::MissingParameter(p)) if p == "rules"
        ));
    }
}
