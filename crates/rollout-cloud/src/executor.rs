use std::process::{Output, Stdio};

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::aws::AwsError;

/// Abstraction over aws CLI execution for testability.
///
/// Production code uses [`RealExecutor`], tests use mockall-generated mocks.
#[allow(async_fn_in_trait)]
pub trait AwsExecutor: Send + Sync {
    /// Execute an aws command and capture stdout.
    async fn exec(&self, args: &[String]) -> Result<String, AwsError>;

    /// Execute an aws command with data piped to stdin.
    ///
    /// Used for payloads that must not appear in the process arguments.
    async fn exec_with_stdin(&self, args: &[String], stdin_data: &[u8])
    -> Result<String, AwsError>;
}

/// Real aws CLI executor.
pub struct RealExecutor;

impl RealExecutor {
    fn command(args: &[String]) -> Command {
        let mut cmd = Command::new("aws");
        // v2 pages long output through `less` unless told otherwise
        cmd.args(args).env("AWS_PAGER", "");
        cmd
    }
}

impl AwsExecutor for RealExecutor {
    async fn exec(&self, args: &[String]) -> Result<String, AwsError> {
        let output = Self::command(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| AwsError::NotFound { source: e })?;

        captured(args, output)
    }

    async fn exec_with_stdin(
        &self,
        args: &[String],
        stdin_data: &[u8],
    ) -> Result<String, AwsError> {
        let mut child = Self::command(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| AwsError::NotFound { source: e })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(stdin_data)
                .await
                .map_err(|e| AwsError::StdinWrite { source: e })?;
            stdin
                .shutdown()
                .await
                .map_err(|e| AwsError::StdinWrite { source: e })?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| AwsError::NotFound { source: e })?;

        captured(args, output)
    }
}

fn captured(args: &[String], output: Output) -> Result<String, AwsError> {
    if output.status.success() {
        String::from_utf8(output.stdout).map_err(|e| AwsError::InvalidUtf8 { source: e })
    } else {
        Err(AwsError::CommandFailed {
            args: args.to_vec(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
