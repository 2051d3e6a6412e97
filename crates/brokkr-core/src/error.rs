//! Error types for brokkr-core
//!
//! The taxonomy is deliberate: callers branch on these variants (a CLI
//! retries nothing, a GUI corrects input), so every crate in the workspace
//! returns this type rather than an opaque report.

use thiserror::Error;

/// Result type alias using brokkr-core's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for Brokkr
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or non-existent input (version specifier, path, id);
    /// recoverable by correcting the input, never retried automatically
    #[error("{message}")]
    InvalidArgument { message: String },

    /// Operation valid in shape but not implemented for this backend or
    /// version range; terminal and user-visible for that call
    #[error("{message}")]
    NotSupported { message: String },

    /// A uniqueness invariant would be violated; names every offending target
    #[error("{message}")]
    TargetExists { message: String },

    /// Required environment-level configuration is missing; fatal, not retried
    #[error("{message}")]
    InvalidConfig { message: String },

    /// A referenced entity (instance, plugin source) does not exist
    #[error("{message}")]
    NotFound { message: String },

    /// A bounded wait elapsed before the observed state change
    #[error("{message}")]
    Timeout { message: String },

    /// Aggregated error messages from the remote control plane; the whole
    /// call failed, partial success is never assumed
    #[error("{message}: {}", details.join("; "))]
    RemoteProtocol {
        message: String,
        details: Vec<String>,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid semver version or range
    #[error("Invalid version format: {0}")]
    Semver(#[from] semver::Error),
}

impl Error {
    /// Create an invalid argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a not supported error
    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::NotSupported {
            message: message.into(),
        }
    }

    /// Create a target exists error naming every offending target
    pub fn target_exists(kind: &str, names: &[String]) -> Self {
        Self::TargetExists {
            message: format!("The following {} already exist: {}", kind, names.join(", ")),
        }
    }

    /// Create an invalid config error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Create a remote protocol error from aggregated remote messages
    pub fn remote(message: impl Into<String>, details: Vec<String>) -> Self {
        Self::RemoteProtocol {
            message: message.into(),
            details,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_exists_names_every_target() {
        let err = Error::target_exists(
            "dbms plugin sources",
            &["apoc".to_string(), "gds".to_string()],
        );
        assert_eq!(
            err.to_string(),
            "The following dbms plugin sources already exist: apoc, gds"
        );
    }

    #[test]
    fn test_remote_joins_details() {
        let err = Error::remote(
            "Unable to install dbms",
            vec!["name taken".to_string(), "disk full".to_string()],
        );
        assert_eq!(
            err.to_string(),
            "Unable to install dbms: name taken; disk full"
        );
    }
}
