#[derive(Debug, thiserror::Error)]
pub enum AwsError {
    #[error("aws CLI not found, install: https://docs.aws.amazon.com/cli/latest/userguide/getting-started-install.html")]
    NotFound { source: std::io::Error },

    #[error("aws command failed: {args:?}\n{stderr}")]
    CommandFailed { args: Vec<String>, stderr: String },

    #[error("aws output was not valid UTF-8")]
    InvalidUtf8 { source: std::string::FromUtf8Error },

    #[error("failed to write to aws stdin")]
    StdinWrite { source: std::io::Error },

    #[error("unexpected output from aws {command}")]
    InvalidOutput {
        command: String,
        source: serde_json::Error,
    },
}

/// Error codes the AWS APIs use for a resource that does not exist.
const NOT_FOUND_MARKERS: &[&str] = &[
    "NotFoundException",
    "NoSuchEntity",
    "NoSuchBucket",
    "(404)",
];

impl AwsError {
    /// The command failed because the addressed resource does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::CommandFailed { stderr, .. } => {
                NOT_FOUND_MARKERS.iter().any(|m| stderr.contains(m))
            }
            _ => false,
        }
    }
}
