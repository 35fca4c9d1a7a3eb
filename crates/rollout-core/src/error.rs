use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to load config from {path}")]
    ConfigLoad {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config at {path}")]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Missing or invalid configuration, detected before any resource is touched.
///
/// Messages lead with the logical component (`datastore: missing name`) so the
/// operator can find the offending `rollout.toml` section.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{component}: missing {field}")]
    MissingField {
        component: &'static str,
        field: &'static str,
    },

    #[error("{component}: invalid {field}: {reason}")]
    InvalidField {
        component: &'static str,
        field: &'static str,
        reason: String,
    },

    #[error("environment key {0} is defined more than once")]
    DuplicateKey(String),
}
