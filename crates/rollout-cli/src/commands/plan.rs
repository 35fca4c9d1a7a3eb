use rollout_build::{Action, BuildParameter};

/// Print what `deploy` would create. Makes no AWS calls.
pub async fn plan() -> anyhow::Result<()> {
    let orchestrator = super::orchestrator()?;
    let plan = orchestrator.plan().await?;
    let names = &plan.names;

    println!("Release '{}' ({})", names.app, orchestrator.config().app.region);
    println!("  pipeline:       {}", names.pipeline);
    println!("  build project:  {}", names.build_project);
    println!("  service:        {}", names.service);
    println!("  image repo:     {}", names.repository);
    println!("  source bucket:  {}", plan.source_bucket);
    println!();

    println!("Stages:");
    for stage in &plan.stages {
        println!("  {}", stage.name);
        for action in &stage.actions {
            match action {
                Action::SourceFetch(fetch) => println!(
                    "    {} <- s3://{}/{} => {}",
                    fetch.name, fetch.storage.bucket, fetch.storage.key, fetch.output
                ),
                Action::ImageBuild(build) => {
                    println!(
                        "    {} ({}) {} => {}:{}",
                        build.name, build.project, build.input, build.image.name, build.image.tag
                    );
                    for parameter in build.parameters() {
                        match parameter {
                            BuildParameter::Literal { key, value } => {
                                println!("      {key} = {value}")
                            }
                            BuildParameter::Secret { key, reference } => {
                                println!("      {key} <- secret {reference}")
                            }
                        }
                    }
                    println!("      BASE_URL = (service endpoint, set on deploy)");
                }
            }
        }
    }
    println!();

    println!("Secret read grants:");
    for (secret_id, principal) in &plan.grants {
        println!("  {secret_id} -> {principal}");
    }
    println!();
    println!("Bootstrap: {:?}", plan.bootstrap);

    Ok(())
}
