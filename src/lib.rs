pub mod config;
pub mod error;
pub mod fetch;
pub mod logging;
pub mod mapping;
pub mod runner;
pub mod store;
pub mod writer;

pub use config::{BootstrapConfig, RuntimeConfig};
pub use error::{BridgeError, Result};
