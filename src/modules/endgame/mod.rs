//! Endgame modules.
//!
//! - **endgame_sensor_configuration**: sensor deployment profiles
//!
//! Modules log in with `username`/`password` on every run.

pub mod sensor_configuration;

pub use sensor_configuration::SensorConfigurationModule;
