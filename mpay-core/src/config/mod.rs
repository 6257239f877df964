//! Runtime configuration types.
//!
//! These are the validated values the core works with. Loading and parsing
//! the TOML file is done by the server crate.

mod config_store;
mod policy;
mod processor;
mod service;

pub use config_store::{ConfigStore, ConfigWatcher};
pub use policy::ReconcilePolicy;
pub use processor::ProcessorConfig;
pub use service::ServiceConfig;
