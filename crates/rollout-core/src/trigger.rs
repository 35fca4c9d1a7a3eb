//! Exactly-once bootstrap trigger.
//!
//! ```text
//! Pending ──(all dependencies Created)──▶ Armed ──fire──▶ Fired ──▶ Succeeded
//!    │                                                          └──▶ Failed
//!    └──(a dependency CreateFailed)──▶ Failed
//! ```
//!
//! The handler is registered as a continuation with [`BootstrapController::fire`]
//! and runs as soon as the last declared dependency reports creation. A record
//! fires at most once; running the bootstrap again takes a new record
//! ([`TriggerRecord::rearm`]).

use std::collections::BTreeSet;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

const STATE_DIR: &str = ".rollout";
const STATE_FILE: &str = "trigger.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    SourceBucket,
    ImageRepository,
    BuildProject,
    Pipeline,
    Service,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SourceBucket => "source-bucket",
            Self::ImageRepository => "image-repository",
            Self::BuildProject => "build-project",
            Self::Pipeline => "pipeline",
            Self::Service => "service",
        })
    }
}

/// A resource in the release graph, identified by kind and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceHandle {
    pub kind: ResourceKind,
    pub name: String,
}

impl ResourceHandle {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    pub fn pipeline(name: impl Into<String>) -> Self {
        Self::new(ResourceKind::Pipeline, name)
    }
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// Creation outcome of one dependency.
///
/// "Created" means the resource definition exists, not that any execution of
/// it has finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Created(ResourceHandle),
    CreateFailed {
        resource: ResourceHandle,
        reason: String,
    },
}

/// Fixed property bag handed to the bootstrap handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BootstrapProperties {
    #[serde(rename_all = "camelCase")]
    Seed {
        service_arn: String,
        image_repo: String,
        src_bucket: String,
        src_key: String,
    },
    #[serde(rename_all = "camelCase")]
    StartPipeline { pipeline_name: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum TriggerState {
    Pending,
    Armed,
    Fired,
    Succeeded,
    Failed { reason: String },
}

impl TriggerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed { .. })
    }
}

impl fmt::Display for TriggerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Armed => f.write_str("armed"),
            Self::Fired => f.write_str("fired"),
            Self::Succeeded => f.write_str("succeeded"),
            Self::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

/// Persistent state of one bootstrap trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerRecord {
    generation: u32,
    dependencies: Option<BTreeSet<ResourceHandle>>,
    resolved: BTreeSet<ResourceHandle>,
    state: TriggerState,
    fired: bool,
    properties: Option<BootstrapProperties>,
}

impl Default for TriggerRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl TriggerRecord {
    pub fn new() -> Self {
        Self::with_generation(1)
    }

    fn with_generation(generation: u32) -> Self {
        Self {
            generation,
            dependencies: None,
            resolved: BTreeSet::new(),
            state: TriggerState::Pending,
            fired: false,
            properties: None,
        }
    }

    /// A fresh record for an explicit re-run; the old one stays as it was.
    pub fn rearm(&self) -> Self {
        Self::with_generation(self.generation + 1)
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn state(&self) -> &TriggerState {
        &self.state
    }

    pub fn fired(&self) -> bool {
        self.fired
    }

    /// Declared dependencies; `None` until armed.
    pub fn dependencies(&self) -> Option<&BTreeSet<ResourceHandle>> {
        self.dependencies.as_ref()
    }

    /// Properties the handler was fired with.
    pub fn properties(&self) -> Option<&BootstrapProperties> {
        self.properties.as_ref()
    }

    fn remaining(&self) -> usize {
        self.dependencies
            .as_ref()
            .map_or(0, |deps| deps.difference(&self.resolved).count())
    }

    pub fn path(project_dir: &Path) -> PathBuf {
        project_dir.join(STATE_DIR).join(STATE_FILE)
    }

    /// Load the record saved for this project, if any.
    pub fn load(project_dir: &Path) -> Result<Option<Self>, TriggerStoreError> {
        let path = Self::path(project_dir);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path).map_err(|e| TriggerStoreError::Read {
            path: path.clone(),
            source: e,
        })?;
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| TriggerStoreError::Parse { path, source: e })
    }

    pub fn save(&self, project_dir: &Path) -> Result<(), TriggerStoreError> {
        let path = Self::path(project_dir);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| TriggerStoreError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let content = serde_json::to_string_pretty(self).map_err(|e| TriggerStoreError::Encode {
            path: path.clone(),
            source: e,
        })?;
        write_atomic(&path, content.as_bytes())
            .map_err(|e| TriggerStoreError::Write { path, source: e })
    }
}

/// Writes through a sibling temp file so a crash never leaves a torn record.
fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// One-shot action run after the release graph has been created.
#[allow(async_fn_in_trait)]
pub trait BootstrapHandler: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn handle(&self, properties: &BootstrapProperties) -> Result<(), Self::Error>;
}

/// Result of [`BootstrapController::fire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireStatus {
    /// Registered; runs when the remaining dependencies are created.
    Deferred { remaining: usize },
    /// The handler ran and succeeded.
    Succeeded,
}

/// Result of [`BootstrapController::notify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notified {
    /// Event for a resource the trigger does not depend on.
    Ignored,
    Waiting { remaining: usize },
    /// All dependencies exist; no handler registered yet.
    Armed,
    /// All dependencies exist and the registered handler succeeded.
    Fired,
    /// The trigger already fired; the event changes nothing.
    AlreadyFired,
}

#[derive(Debug, thiserror::Error)]
pub enum BootstrapFireError {
    #[error("bootstrap trigger #{generation} already fired")]
    AlreadyFired { generation: u32 },

    #[error("bootstrap trigger #{generation} already has its dependencies declared")]
    AlreadyArmed { generation: u32 },

    #[error("dependency {resource} failed to create: {reason}")]
    DependencyFailed {
        resource: ResourceHandle,
        reason: String,
    },

    #[error("bootstrap trigger #{generation} already failed: {reason}")]
    Terminated { generation: u32, reason: String },

    #[error("bootstrap handler failed")]
    Handler {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error(transparent)]
    Store(#[from] TriggerStoreError),
}

#[derive(Debug, thiserror::Error)]
pub enum TriggerStoreError {
    #[error("failed to read trigger state at {path}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse trigger state at {path}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to encode trigger state for {path}")]
    Encode {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to write trigger state at {path}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Drives a [`TriggerRecord`] from dependency events to a single handler run.
///
/// With [`with_state_dir`](Self::with_state_dir) every transition is written
/// to disk before the next step, so a crash mid-handler leaves the record in
/// `Fired` rather than eligible to fire again.
pub struct BootstrapController<H> {
    record: TriggerRecord,
    pending: Option<(H, BootstrapProperties)>,
    state_dir: Option<PathBuf>,
}

impl<H: BootstrapHandler> BootstrapController<H> {
    pub fn new(record: TriggerRecord) -> Self {
        Self {
            record,
            pending: None,
            state_dir: None,
        }
    }

    pub fn with_state_dir(mut self, project_dir: impl Into<PathBuf>) -> Self {
        self.state_dir = Some(project_dir.into());
        self
    }

    pub fn record(&self) -> &TriggerRecord {
        &self.record
    }

    pub fn into_record(self) -> TriggerRecord {
        self.record
    }

    /// Declare the resources that must be created before the handler runs.
    pub fn arm(
        &mut self,
        dependencies: impl IntoIterator<Item = ResourceHandle>,
    ) -> Result<(), BootstrapFireError> {
        if self.record.dependencies.is_some() || self.record.state != TriggerState::Pending {
            return Err(BootstrapFireError::AlreadyArmed {
                generation: self.record.generation,
            });
        }
        let dependencies: BTreeSet<_> = dependencies.into_iter().collect();
        tracing::debug!(
            generation = self.record.generation,
            dependencies = dependencies.len(),
            "bootstrap trigger declared dependencies"
        );
        self.record.dependencies = Some(dependencies);
        self.advance()?;
        Ok(())
    }

    /// Record a dependency's creation outcome; fires a registered handler once
    /// the last dependency is created.
    pub async fn notify(&mut self, event: Completion) -> Result<Notified, BootstrapFireError> {
        if self.record.fired {
            tracing::debug!(generation = self.record.generation, ?event, "trigger already fired");
            return Ok(Notified::AlreadyFired);
        }

        match event {
            Completion::Created(resource) => {
                if !self.depends_on(&resource) {
                    return Ok(Notified::Ignored);
                }
                self.record.resolved.insert(resource);
                self.advance()?;
            }
            Completion::CreateFailed { resource, reason } => {
                if !self.depends_on(&resource) {
                    return Ok(Notified::Ignored);
                }
                self.pending = None;
                self.record.state = TriggerState::Failed {
                    reason: format!("dependency {resource} failed to create: {reason}"),
                };
                self.persist()?;
                return Err(BootstrapFireError::DependencyFailed { resource, reason });
            }
        }

        if self.record.state != TriggerState::Armed {
            return Ok(Notified::Waiting {
                remaining: self.record.remaining(),
            });
        }
        match self.pending.take() {
            Some((handler, properties)) => {
                self.run(handler, properties).await?;
                Ok(Notified::Fired)
            }
            None => Ok(Notified::Armed),
        }
    }

    /// Register the one-shot handler, running it now if the trigger is armed.
    ///
    /// A second call on the same record is rejected whatever became of the
    /// first one.
    pub async fn fire(
        &mut self,
        handler: H,
        properties: BootstrapProperties,
    ) -> Result<FireStatus, BootstrapFireError> {
        if self.record.fired || self.pending.is_some() {
            return Err(BootstrapFireError::AlreadyFired {
                generation: self.record.generation,
            });
        }
        if let TriggerState::Failed { reason } = &self.record.state {
            return Err(BootstrapFireError::Terminated {
                generation: self.record.generation,
                reason: reason.clone(),
            });
        }

        if self.record.state == TriggerState::Armed {
            self.run(handler, properties).await?;
            Ok(FireStatus::Succeeded)
        } else {
            let remaining = self.record.remaining();
            tracing::debug!(
                generation = self.record.generation,
                remaining,
                "bootstrap deferred until dependencies are created"
            );
            self.pending = Some((handler, properties));
            Ok(FireStatus::Deferred { remaining })
        }
    }

    fn depends_on(&self, resource: &ResourceHandle) -> bool {
        self.record
            .dependencies
            .as_ref()
            .is_some_and(|deps| deps.contains(resource))
    }

    fn advance(&mut self) -> Result<(), TriggerStoreError> {
        if self.record.state == TriggerState::Pending
            && self.record.dependencies.is_some()
            && self.record.remaining() == 0
        {
            tracing::info!(generation = self.record.generation, "bootstrap trigger armed");
            self.record.state = TriggerState::Armed;
        }
        self.persist()
    }

    async fn run(
        &mut self,
        handler: H,
        properties: BootstrapProperties,
    ) -> Result<(), BootstrapFireError> {
        self.record.fired = true;
        self.record.state = TriggerState::Fired;
        self.record.properties = Some(properties.clone());
        self.persist()?;
        tracing::info!(generation = self.record.generation, "firing bootstrap handler");

        let result = handler.handle(&properties).await;
        match result {
            Ok(()) => {
                self.record.state = TriggerState::Succeeded;
                self.persist()?;
                tracing::info!(generation = self.record.generation, "bootstrap succeeded");
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    generation = self.record.generation,
                    error = %e,
                    "bootstrap failed"
                );
                self.record.state = TriggerState::Failed {
                    reason: e.to_string(),
                };
                self.persist()?;
                Err(BootstrapFireError::Handler {
                    source: Box::new(e),
                })
            }
        }
    }

    fn persist(&self) -> Result<(), TriggerStoreError> {
        match &self.state_dir {
            Some(dir) => self.record.save(dir),
            None => Ok(()),
        }
    }
}
