use rollout_build::bundle;
use std::path::Path;

/// Create or update the whole release, then run the one-time bootstrap.
pub async fn deploy(allow_dirty: bool, rearm: bool) -> anyhow::Result<()> {
    // The seed archive is taken from HEAD, so uncommitted edits would be left out.
    if !allow_dirty && bundle::is_dirty(Path::new("."))? {
        anyhow::bail!(
            "uncommitted changes detected.\n\
             Commit your changes, or use `rollout deploy --allow-dirty` to deploy anyway."
        );
    }

    let orchestrator = super::orchestrator()?;

    println!("Deploying (this waits for the service to come up)...");
    let outputs = orchestrator.deploy(rearm).await?;

    println!();
    println!("Pipeline:   {}", outputs.pipeline_name);
    println!("Image repo: {}", outputs.image_repo_uri);
    println!("Service:    https://{}", outputs.service_endpoint);
    println!("Bootstrap:  {}", outputs.bootstrap);

    Ok(())
}
