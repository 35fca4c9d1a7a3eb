//! Pipeline stages, buildspec rendering, and source archiving for rollout.
//!
//! # Pipeline shape
//!
//! ```text
//! Source ── S3 object (zip) ── SourceOutput artifact
//!    │
//! Build  ── CodeBuild: docker build --build-arg KEY ... && docker push
//! ```
//!
//! Stages run strictly in sequence; actions inside a stage run concurrently.
//! The build action takes the source stage's [`ArtifactHandle`] as input, so
//! a build cannot be declared against source the pipeline never fetches.
//!
//! # Build parameters
//!
//! Environment entries reach the build as named parameters only. Literals
//! are written into the buildspec, secrets as `<secretId>:<fieldName>`
//! references resolved by the build executor at run time.

pub mod buildspec;
pub mod bundle;
pub mod stage;

pub use buildspec::BuildspecGenerator;
pub use stage::{
    Action, ArtifactHandle, BuildParameter, BuildStage, ExistingRepository, ImageBuild,
    ImageRepoHandle, ImageTargetSpec, PipelineStageBuilder, SourceFetch, SourceSpec, SourceStage,
    Stage, StageBuildError, StorageHandle,
};
