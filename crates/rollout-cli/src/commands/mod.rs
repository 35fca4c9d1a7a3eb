mod bootstrap;
mod deploy;
mod destroy;
mod plan;
mod secret;
mod status;

use rollout_cloud::ReleaseOrchestrator;
use rollout_core::RolloutConfig;
use std::path::PathBuf;

pub use bootstrap::bootstrap;
pub use deploy::deploy;
pub use destroy::destroy;
pub use plan::plan;
pub use secret::secret_set;
pub use status::status;

/// Orchestrator for the project in the current directory.
pub(crate) fn orchestrator() -> anyhow::Result<ReleaseOrchestrator> {
    let project_dir = PathBuf::from(".");
    let config = RolloutConfig::load(&project_dir)?;
    Ok(ReleaseOrchestrator::new(config, project_dir))
}
