use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("section [{section}] has unknown type {kind:?}")]
    UnknownHypervisorType { section: String, kind: String },

    #[error("section [{section}] is missing required key {key:?}")]
    MissingKey { section: String, key: String },

    #[error("section [{section}], key {key:?}: {reason}")]
    InvalidValue {
        section: String,
        key: String,
        reason: String,
    },

    #[error("no source sections remained valid and none were given on the command line")]
    NoValidSources,

    #[error("keyfile {path} must contain exactly two hex lines (key, iv)")]
    MalformedKeyfile { path: PathBuf },

    #[error("password decryption failed: {0}")]
    Decrypt(String),
}
