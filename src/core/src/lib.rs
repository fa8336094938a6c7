//! jmanager Core - Foundational Types
//!
//! Distribution identity and checkpoint naming, the jail model and its
//! jail.conf record, declarative jail requests, configuration and the
//! shared error type.

pub mod config;
pub mod distribution;
pub mod error;
pub mod jail;
pub mod parameter;
pub mod request;

// Re-export commonly used types
pub use config::{JManagerConfig, LogLevel, DEFAULT_CONFIG_PATH};
pub use distribution::{
    decode_components, encode_components, Architecture, Component, Distribution, Version,
    VersionType, CHECKPOINT_PREFIX,
};
pub use error::{JailError, Result};
pub use jail::Jail;
pub use parameter::JailParameter;
pub use request::{load_jmanagerfile, parse_jmanagerfile, JailRequest};

/// jmanager version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
