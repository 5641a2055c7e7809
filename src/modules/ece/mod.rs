//! Elastic Cloud Enterprise modules.
//!
//! - **ece_cluster**: create, shut down and delete deployments
//! - **ece_cluster_info**: look up a deployment and its resource ref_ids
//! - **ece_snapshot_repo**: manage platform snapshot repositories
//!
//! All of them take the ECE admin API endpoint in `host` (default port
//! 12443) and its credentials in `username`/`password` or `api_key`.

pub mod cluster;
pub mod cluster_info;
pub mod snapshot_repo;

pub use cluster::EceClusterModule;
pub use cluster_info::EceClusterInfoModule;
pub use snapshot_repo::EceSnapshotRepoModule;
