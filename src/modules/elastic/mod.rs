//! Elasticsearch modules.
//!
//! Both modules connect directly (`host`, default port 9200) or, with
//! `ece_host` and `deployment_name`, through the ECE deployment proxy.

pub mod index_template;
pub mod role_mapping;

pub use index_template::IndexTemplateModule;
pub use role_mapping::RoleMappingModule;

use crate::error::Result;
use crate::modules::common::State;
use crate::modules::{Diff, ModuleContext, ModuleOutput, ModuleResult};
use crate::util::is_subset;
use serde_json::Value;
use std::future::Future;

/// Converge an object stored with PUT/GET/DELETE semantics.
///
/// `label` names the object in messages, e.g. `role mapping 'admins'`.
/// `put` and `delete` only run outside check mode.
pub(crate) async fn converge<P, PF, D, DF>(
    label: &str,
    state: State,
    existing: Option<Value>,
    desired: &Value,
    context: &ModuleContext,
    put: P,
    delete: D,
) -> ModuleResult<ModuleOutput>
where
    P: FnOnce() -> PF,
    PF: Future<Output = Result<Value>>,
    D: FnOnce() -> DF,
    DF: Future<Output = Result<Value>>,
{
    match state {
        State::Present => {
            if let Some(ref current) = existing {
                if is_subset(desired, current) {
                    return Ok(ModuleOutput::ok(format!("{} is up to date", label)));
                }
            }
            let (would, did) = if existing.is_some() {
                ("update", "Updated")
            } else {
                ("create", "Created")
            };
            let output = if context.check_mode {
                ModuleOutput::changed(format!("Would {} {}", would, label))
            } else {
                put().await?;
                ModuleOutput::changed(format!("{} {}", did, label))
            };
            Ok(output.with_diff_if(context, || Diff::json(existing.as_ref(), Some(desired))))
        }
        State::Absent => {
            if existing.is_none() {
                return Ok(ModuleOutput::ok(format!("{} does not exist", label)));
            }
            if context.check_mode {
                return Ok(ModuleOutput::changed(format!("Would delete {}", label)));
            }
            delete().await?;
            Ok(ModuleOutput::changed(format!("Deleted {}", label))
                .with_diff_if(context, || Diff::json(existing.as_ref(), None)))
        }
    }
}
