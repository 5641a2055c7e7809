//! Pure helpers shared by the modules.

pub mod merge;
pub mod package_policy;
pub mod tags;

pub use merge::{deep_merge, is_subset};
pub use package_policy::PackageFamily;
pub use tags::{merge_tags, missing_tags};
