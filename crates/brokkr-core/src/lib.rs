//! # brokkr-core
//!
//! Core library for Brokkr providing:
//! - The shared data model (instances, distributions, plugins, tokens)
//! - The error taxonomy used across all backends
//! - Account configuration parsing (account.yaml)
//! - The line-preserving properties store backing instance config files

pub mod config;
pub mod error;
pub mod properties;
pub mod types;

pub use config::{AccountConfig, AccountPaths, RemoteConfig};
pub use error::{Error, Result};
pub use properties::PropertiesFile;

/// Get the user's home directory.
pub fn get_home_dir() -> Result<std::path::PathBuf> {
    dirs::home_dir().ok_or_else(|| Error::invalid_config("Could not determine home directory"))
}

/// The platform segment used in distribution cache keys.
pub const fn current_platform() -> &'static str {
    if cfg!(target_os = "linux") {
        "linux"
    } else if cfg!(target_os = "macos") {
        "darwin"
    } else if cfg!(windows) {
        "windows"
    } else {
        "unknown"
    }
}
