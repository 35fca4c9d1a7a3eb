//! Source and build stages of the release pipeline.
//!
//! The build action consumes the [`ArtifactHandle`] its source stage
//! produced, so a build can only be declared against source that this
//! pipeline fetches. That handle dependency is the ordering guarantee:
//! nothing here schedules by time.

use std::collections::{HashMap, HashSet};
use std::fmt;

use rollout_core::{GrantError, Principal, ResolvedEnv, SecretAccess, SecretGrants};

pub const SOURCE_STAGE: &str = "Source";
pub const BUILD_STAGE: &str = "Build";

/// Where the pipeline fetches source from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpec {
    /// Source provider; only `s3` is supported
    pub kind: String,
    pub bucket: String,
    pub key: String,
}

impl SourceSpec {
    pub fn s3(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            kind: "s3".to_owned(),
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

/// Repository and tag the build pushes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageTargetSpec {
    pub repo: String,
    pub tag: String,
}

impl ImageTargetSpec {
    pub fn new(repo: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            tag: "latest".to_owned(),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }
}

/// An image repository that already exists in the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingRepository {
    pub name: String,
    pub immutable_tags: bool,
}

/// Output of a source action, input of a build action.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactHandle(String);

impl ArtifactHandle {
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Writable object location backing a source action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageHandle {
    pub bucket: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRepoHandle {
    pub name: String,
    pub tag: String,
}

impl ImageRepoHandle {
    /// Image reference once the registry host is known.
    pub fn image_ref(&self, repository_uri: &str) -> String {
        format!("{repository_uri}:{}", self.tag)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFetch {
    pub name: String,
    pub storage: StorageHandle,
    pub output: ArtifactHandle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBuild {
    pub name: String,
    /// Build executor project running this action
    pub project: String,
    pub input: ArtifactHandle,
    pub env: ResolvedEnv,
    pub image: ImageRepoHandle,
    pub principal: Principal,
}

/// One build executor parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildParameter {
    Literal { key: String, value: String },
    /// `reference` is `<secretId>:<fieldName>`.
    Secret { key: String, reference: String },
}

impl BuildParameter {
    pub fn key(&self) -> &str {
        match self {
            Self::Literal { key, .. } | Self::Secret { key, .. } => key,
        }
    }
}

impl ImageBuild {
    /// Executor invocation parameters: literals first, then secret references.
    pub fn parameters(&self) -> Vec<BuildParameter> {
        self.env
            .vars()
            .iter()
            .map(|(key, value)| BuildParameter::Literal {
                key: key.clone(),
                value: value.clone(),
            })
            .chain(
                self.env
                    .secrets()
                    .iter()
                    .map(|(key, secret)| BuildParameter::Secret {
                        key: key.clone(),
                        reference: secret.reference(),
                    }),
            )
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    SourceFetch(SourceFetch),
    ImageBuild(ImageBuild),
}

impl Action {
    pub fn name(&self) -> &str {
        match self {
            Self::SourceFetch(a) => &a.name,
            Self::ImageBuild(a) => &a.name,
        }
    }
}

/// A pipeline stage. Its actions run concurrently; stages run in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub name: String,
    pub actions: Vec<Action>,
}

impl Stage {
    pub fn image_build(&self) -> Option<&ImageBuild> {
        self.actions.iter().find_map(|a| match a {
            Action::ImageBuild(b) => Some(b),
            Action::SourceFetch(_) => None,
        })
    }

    pub fn source_fetch(&self) -> Option<&SourceFetch> {
        self.actions.iter().find_map(|a| match a {
            Action::SourceFetch(s) => Some(s),
            Action::ImageBuild(_) => None,
        })
    }
}

#[derive(Debug, Clone)]
pub struct SourceStage {
    pub stage: Stage,
    pub artifact: ArtifactHandle,
    pub storage: StorageHandle,
}

#[derive(Debug, Clone)]
pub struct BuildStage {
    pub stage: Stage,
    pub image_repo: ImageRepoHandle,
    pub principal: Principal,
}

/// Builds the stages of one pipeline, in order.
pub struct PipelineStageBuilder {
    pipeline: String,
    stages: Vec<Stage>,
    artifacts: HashSet<ArtifactHandle>,
    existing: HashMap<String, ExistingRepository>,
    has_build: bool,
}

impl PipelineStageBuilder {
    pub fn new(pipeline: impl Into<String>) -> Self {
        Self {
            pipeline: pipeline.into(),
            stages: Vec::new(),
            artifacts: HashSet::new(),
            existing: HashMap::new(),
            has_build: false,
        }
    }

    /// Register a repository already present in the registry so the build
    /// target can be checked against it.
    pub fn with_existing_repository(mut self, repo: ExistingRepository) -> Self {
        self.existing.insert(repo.name.clone(), repo);
        self
    }

    pub fn pipeline(&self) -> &str {
        &self.pipeline
    }

    /// Name of the build executor project for this pipeline.
    pub fn build_project(&self) -> String {
        format!("{}-build", self.pipeline)
    }

    /// Execution principal of the build project.
    pub fn build_principal(&self) -> Principal {
        Principal::new(format!("{}-build-role", self.pipeline))
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn build_source_stage(
        &mut self,
        spec: &SourceSpec,
    ) -> Result<SourceStage, StageBuildError> {
        if self.has_build {
            return Err(StageBuildError::SourceAfterBuild);
        }
        validate_source(spec)?;

        let index = self.stages.len() + 1;
        let name = if index == 1 {
            SOURCE_STAGE.to_owned()
        } else {
            format!("{SOURCE_STAGE}{index}")
        };
        let artifact = ArtifactHandle(format!("{name}Output"));
        let storage = StorageHandle {
            bucket: spec.bucket.clone(),
            key: spec.key.clone(),
        };

        let stage = Stage {
            name: name.clone(),
            actions: vec![Action::SourceFetch(SourceFetch {
                name: format!("{name}Fetch"),
                storage: storage.clone(),
                output: artifact.clone(),
            })],
        };

        tracing::debug!(
            stage = %name,
            bucket = %storage.bucket,
            key = %storage.key,
            "source stage built"
        );
        self.artifacts.insert(artifact.clone());
        self.stages.push(stage.clone());

        Ok(SourceStage {
            stage,
            artifact,
            storage,
        })
    }

    /// Check an image target without building anything.
    pub fn check_image_target(&self, target: &ImageTargetSpec) -> Result<(), StageBuildError> {
        validate_repository_name(&target.repo)?;
        if target.tag.trim().is_empty() {
            return Err(StageBuildError::MissingImageTag);
        }
        if self
            .existing
            .get(&target.repo)
            .is_some_and(|existing| existing.immutable_tags)
        {
            return Err(StageBuildError::ImmutableRepository {
                name: target.repo.clone(),
                tag: target.tag.clone(),
            });
        }
        Ok(())
    }

    /// Declare the build stage and grant its principal read access to every
    /// secret in `env`.
    ///
    /// All validation happens before the first grant is issued.
    pub async fn build_build_stage<S: SecretAccess>(
        &mut self,
        artifact: &ArtifactHandle,
        env: ResolvedEnv,
        target: &ImageTargetSpec,
        grants: &SecretGrants<S>,
    ) -> Result<BuildStage, StageBuildError> {
        if self.has_build {
            return Err(StageBuildError::DuplicateBuildStage);
        }
        if self.artifacts.is_empty() {
            return Err(StageBuildError::MissingSourceStage);
        }
        if !self.artifacts.contains(artifact) {
            return Err(StageBuildError::UnknownArtifact(artifact.to_string()));
        }
        self.check_image_target(target)?;
        for entry in env.entries() {
            validate_env_key(&entry.key)?;
        }

        let principal = self.build_principal();
        for (_, secret) in env.secrets() {
            secret.grant_read(grants, &principal).await?;
        }

        let image_repo = ImageRepoHandle {
            name: target.repo.clone(),
            tag: target.tag.clone(),
        };
        let stage = Stage {
            name: BUILD_STAGE.to_owned(),
            actions: vec![Action::ImageBuild(ImageBuild {
                name: format!("{BUILD_STAGE}Image"),
                project: self.build_project(),
                input: artifact.clone(),
                env,
                image: image_repo.clone(),
                principal: principal.clone(),
            })],
        };

        tracing::debug!(repo = %image_repo.name, tag = %image_repo.tag, "build stage built");
        self.stages.push(stage.clone());
        self.has_build = true;

        Ok(BuildStage {
            stage,
            image_repo,
            principal,
        })
    }

    /// The finished stage list: source stages followed by exactly one build stage.
    pub fn finish(self) -> Result<Vec<Stage>, StageBuildError> {
        if self.artifacts.is_empty() {
            return Err(StageBuildError::MissingSourceStage);
        }
        if !self.has_build {
            return Err(StageBuildError::MissingBuildStage);
        }
        Ok(self.stages)
    }
}

fn validate_source(spec: &SourceSpec) -> Result<(), StageBuildError> {
    if !spec.kind.eq_ignore_ascii_case("s3") {
        return Err(StageBuildError::UnsupportedSource(spec.kind.clone()));
    }
    if spec.bucket.trim().is_empty() {
        return Err(StageBuildError::MissingSourceField("bucket"));
    }
    if spec.key.trim().is_empty() {
        return Err(StageBuildError::MissingSourceField("key"));
    }
    if !spec.key.ends_with(".zip") {
        return Err(StageBuildError::NotZip(spec.key.clone()));
    }
    Ok(())
}

/// Lowercase letters, digits, `.`, `_`, `-`, `/`, starting with a letter or
/// digit, at most 256 characters.
fn validate_repository_name(name: &str) -> Result<(), StageBuildError> {
    let invalid = |reason: &'static str| StageBuildError::InvalidRepository {
        name: name.to_owned(),
        reason,
    };
    if name.len() > 256 {
        return Err(invalid("longer than 256 characters"));
    }
    if !name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
    {
        return Err(invalid("must start with a lowercase letter or digit"));
    }
    if !name.chars().all(repository_char) {
        return Err(invalid("may only contain lowercase letters, digits, '.', '_', '-' and '/'"));
    }
    Ok(())
}

fn repository_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-' | '/')
}

/// Keys are passed to the build by name, so they must be plain identifiers.
fn validate_env_key(key: &str) -> Result<(), StageBuildError> {
    let valid = key
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StageBuildError::InvalidEnvKey(key.to_owned()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StageBuildError {
    #[error("source stage: unsupported source type {0:?} (supported: s3)")]
    UnsupportedSource(String),

    #[error("source stage: missing {0}")]
    MissingSourceField(&'static str),

    #[error("source stage: key {0:?} must name a .zip archive")]
    NotZip(String),

    #[error("source stage: cannot follow the build stage")]
    SourceAfterBuild,

    #[error("build stage: no source stage precedes it")]
    MissingSourceStage,

    #[error("build stage: artifact {0} is not produced by a source stage of this pipeline")]
    UnknownArtifact(String),

    #[error("build stage: pipeline already has a build stage")]
    DuplicateBuildStage,

    #[error("build stage: invalid image repository name {name:?}: {reason}")]
    InvalidRepository { name: String, reason: &'static str },

    #[error("build stage: missing image tag")]
    MissingImageTag,

    #[error("build stage: repository {name} has immutable tags but every build pushes tag {tag}")]
    ImmutableRepository { name: String, tag: String },

    #[error("build stage: environment key {0:?} is not a valid identifier")]
    InvalidEnvKey(String),

    #[error("build stage: {0}")]
    Grant(#[from] GrantError),

    #[error("pipeline: missing build stage")]
    MissingBuildStage,
}
