use rollout_core::RemovalPolicy;
use std::io::Write;

/// Tear down the release. Retained resources are listed, not deleted.
pub async fn destroy(skip_confirm: bool) -> anyhow::Result<()> {
    let orchestrator = super::orchestrator()?;
    let config = orchestrator.config();
    let names = rollout_cloud::ReleaseNames::from_config(config)?;

    if !skip_confirm {
        println!("This will delete:");
        println!("  - Pipeline '{}'", names.pipeline);
        println!("  - Build project '{}'", names.build_project);
        println!("  - Service '{}'", names.service);
        println!(
            "  - Roles '{}', '{}', '{}'",
            names.build_role, names.pipeline_role, names.access_role
        );
        if RemovalPolicy::from_delete_with_app(config.web.delete_image_repo_with_app)
            == RemovalPolicy::Destroy
        {
            println!("  - Image repository '{}' and its images", names.repository);
        }
        if RemovalPolicy::from_delete_with_app(config.pipeline.source.delete_with_app)
            == RemovalPolicy::Destroy
        {
            println!("  - Source bucket and its objects");
        }
        println!("  - Local .rollout/ trigger state");

        println!();
        print!("Are you sure? [y/N] ");
        std::io::stdout().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        if !matches!(input.trim(), "y" | "Y" | "yes" | "YES") {
            println!("Aborted.");
            return Ok(());
        }
    }

    let report = orchestrator.destroy().await?;

    for handle in &report.deleted {
        println!("Deleted {handle}");
    }
    for handle in &report.retained {
        println!("Retained {handle}");
    }
    if report.deleted.is_empty() {
        println!("Nothing to delete.");
    }
    Ok(())
}
