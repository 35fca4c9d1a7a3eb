//! AWS operations for rollout, driven through the `aws` CLI.
//!
//! [`AwsClient`] wraps individual service calls behind an [`AwsExecutor`] so
//! tests can substitute a mock. [`ReleaseOrchestrator`] sequences them into
//! `plan`, `deploy`, `bootstrap`, `status` and `destroy`.

pub mod aws;
pub mod bootstrap;
pub mod client;
pub mod executor;
pub mod orchestrator;
pub mod pipeline;
pub mod retry;
pub mod secret;
pub mod service;

pub use aws::AwsError;
pub use bootstrap::{BootstrapError, PipelineStart, ReleaseBootstrap, SeedBootstrap};
pub use client::{
    AwsClient, BuildProjectSpec, DeployError, PreflightError, PreflightReport, PutOutcome,
    RepositoryInfo, SecretError, SecretWrite, ServiceDescription, ServiceSummary, StageStatus,
};
pub use executor::{AwsExecutor, RealExecutor};
pub use orchestrator::{
    DestroyReport, ReleaseError, ReleaseNames, ReleaseOrchestrator, ReleaseOutputs, ReleasePlan,
    ReleaseStatus,
};
pub use pipeline::PipelineDefinition;
pub use retry::Backoff;
pub use secret::SecretsManager;
pub use service::{NotReadyError, ServiceSpec, ServiceTarget, UpdateAck, UpdateError};
