//! One-shot bootstrap actions run by the trigger once the pipeline exists.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rollout_build::ImageRepoHandle;
use rollout_build::bundle::{BundleError, create_source_archive};
use rollout_core::{BootstrapHandler, BootstrapProperties};

use crate::client::{AwsClient, DeployError};
use crate::executor::{AwsExecutor, RealExecutor};
use crate::retry::Backoff;
use crate::service::{ServiceTarget, UpdateError};

const EXECUTION_SUCCEEDED: &str = "Succeeded";
const EXECUTION_FAILED_STATES: &[&str] = &["Failed", "Stopped", "Superseded", "Cancelled"];

fn conflict_retry() -> Backoff {
    Backoff::exponential(Duration::from_secs(5), Duration::from_secs(60), 8)
}

/// Points the service at the image the build pushes, then uploads the source
/// archive, which starts the pipeline through its S3 source.
pub struct SeedBootstrap<E: AwsExecutor = RealExecutor> {
    client: Arc<AwsClient<E>>,
    service: Arc<ServiceTarget<E>>,
    image: ImageRepoHandle,
    project_dir: PathBuf,
    archive_path: PathBuf,
    retry: Backoff,
}

impl<E: AwsExecutor> SeedBootstrap<E> {
    pub fn new(
        client: Arc<AwsClient<E>>,
        service: Arc<ServiceTarget<E>>,
        image: ImageRepoHandle,
        project_dir: impl Into<PathBuf>,
        archive_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            client,
            service,
            image,
            project_dir: project_dir.into(),
            archive_path: archive_path.into(),
            retry: conflict_retry(),
        }
    }

    pub fn with_retry(mut self, retry: Backoff) -> Self {
        self.retry = retry;
        self
    }
}

impl<E: AwsExecutor> BootstrapHandler for SeedBootstrap<E> {
    type Error = BootstrapError;

    async fn handle(&self, properties: &BootstrapProperties) -> Result<(), BootstrapError> {
        let BootstrapProperties::Seed {
            service_arn,
            image_repo,
            src_bucket,
            src_key,
        } = properties
        else {
            return Err(BootstrapError::UnexpectedProperties { expected: "seed" });
        };

        let actual = self.service.arn();
        if *service_arn != actual {
            return Err(BootstrapError::ServiceMismatch {
                expected: service_arn.clone(),
                actual,
            });
        }

        let image = self.image.image_ref(image_repo);
        let ack = self
            .service
            .update_image_with_retry(&image, &self.retry)
            .await?;
        tracing::info!(
            service = %self.service.name(),
            image = %image,
            ?ack,
            "service pointed at built image"
        );

        let archive = create_source_archive(&self.project_dir, &self.archive_path)?;
        self.client
            .upload_object(&archive, src_bucket, src_key)
            .await
            .map_err(|e| BootstrapError::Upload { source: e })?;

        Ok(())
    }
}

/// Starts one pipeline execution, waits for it to push the image, then points
/// the service at that image.
pub struct PipelineStart<E: AwsExecutor = RealExecutor> {
    client: Arc<AwsClient<E>>,
    service: Arc<ServiceTarget<E>>,
    image_ref: String,
    poll: Backoff,
    retry: Backoff,
}

impl<E: AwsExecutor> PipelineStart<E> {
    pub fn new(
        client: Arc<AwsClient<E>>,
        service: Arc<ServiceTarget<E>>,
        image_ref: impl Into<String>,
    ) -> Self {
        Self {
            client,
            service,
            image_ref: image_ref.into(),
            // a build rarely takes more than half an hour
            poll: Backoff::fixed(Duration::from_secs(15), 120),
            retry: conflict_retry(),
        }
    }

    /// Polling schedule while the started execution runs.
    pub fn with_poll(mut self, poll: Backoff) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_retry(mut self, retry: Backoff) -> Self {
        self.retry = retry;
        self
    }

    async fn wait_for_execution(
        &self,
        pipeline: &str,
        execution: &str,
    ) -> Result<(), BootstrapError> {
        let mut attempt = 1;
        loop {
            let status = self
                .client
                .pipeline_execution_status(pipeline, execution)
                .await
                .map_err(|e| BootstrapError::Start { source: e })?;
            if status == EXECUTION_SUCCEEDED {
                return Ok(());
            }
            if EXECUTION_FAILED_STATES.contains(&status.as_str()) {
                return Err(BootstrapError::Execution {
                    pipeline: pipeline.to_owned(),
                    execution: execution.to_owned(),
                    status,
                });
            }
            if attempt >= self.poll.max_attempts {
                return Err(BootstrapError::ExecutionTimeout {
                    pipeline: pipeline.to_owned(),
                    execution: execution.to_owned(),
                    attempts: attempt,
                });
            }

            tracing::debug!(
                pipeline,
                execution,
                status = %status,
                attempt,
                "waiting for pipeline execution"
            );
            tokio::time::sleep(self.poll.delay_for_attempt(attempt)).await;
            attempt += 1;
        }
    }
}

impl<E: AwsExecutor> BootstrapHandler for PipelineStart<E> {
    type Error = BootstrapError;

    async fn handle(&self, properties: &BootstrapProperties) -> Result<(), BootstrapError> {
        let BootstrapProperties::StartPipeline { pipeline_name } = properties else {
            return Err(BootstrapError::UnexpectedProperties {
                expected: "start-pipeline",
            });
        };

        let execution = self
            .client
            .start_pipeline_execution(pipeline_name)
            .await
            .map_err(|e| BootstrapError::Start { source: e })?;
        self.wait_for_execution(pipeline_name, &execution).await?;

        let ack = self
            .service
            .update_image_with_retry(&self.image_ref, &self.retry)
            .await?;
        tracing::info!(
            service = %self.service.name(),
            image = %self.image_ref,
            ?ack,
            "service pointed at built image"
        );
        Ok(())
    }
}

/// The bootstrap action selected by `[bootstrap] action`.
pub enum ReleaseBootstrap<E: AwsExecutor = RealExecutor> {
    Seed(SeedBootstrap<E>),
    StartPipeline(PipelineStart<E>),
}

impl<E: AwsExecutor> BootstrapHandler for ReleaseBootstrap<E> {
    type Error = BootstrapError;

    async fn handle(&self, properties: &BootstrapProperties) -> Result<(), BootstrapError> {
        match self {
            Self::Seed(seed) => seed.handle(properties).await,
            Self::StartPipeline(start) => start.handle(properties).await,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("bootstrap expected {expected} properties")]
    UnexpectedProperties { expected: &'static str },

    #[error("bootstrap targets service {expected} but the release service is {actual}")]
    ServiceMismatch { expected: String, actual: String },

    #[error("failed to point the service at the built image")]
    Service(#[from] UpdateError),

    #[error("failed to archive the source tree")]
    Archive(#[from] BundleError),

    #[error("failed to upload the source archive")]
    Upload { source: DeployError },

    #[error("failed to start the pipeline")]
    Start { source: DeployError },

    #[error("pipeline {pipeline} execution {execution} ended {status}")]
    Execution {
        pipeline: String,
        execution: String,
        status: String,
    },

    #[error("pipeline {pipeline} execution {execution} still running after {attempts} checks")]
    ExecutionTimeout {
        pipeline: String,
        execution: String,
        attempts: u32,
    },
}
