//! # brokkr-plugins
//!
//! Plugin handling for Brokkr:
//! - The plugin source registry merging seeded official sources with
//!   user-added ones
//! - Per-source version manifest fetching and compatible-version selection
//! - The per-instance installed-plugin manifest

pub mod manifest;
pub mod sources;
pub mod versions;

pub use manifest::PluginManifest;
pub use sources::PluginSourceRegistry;
