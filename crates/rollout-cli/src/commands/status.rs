pub async fn status() -> anyhow::Result<()> {
    let orchestrator = super::orchestrator()?;
    let status = orchestrator.status().await?;

    match &status.pipeline {
        Some(stages) => {
            println!("Pipeline '{}':", status.names.pipeline);
            for stage in stages {
                let state = stage.status.as_deref().unwrap_or("not run");
                println!("  {:<8} {state}", stage.name);
            }
        }
        None => println!("Pipeline '{}': not deployed", status.names.pipeline),
    }

    match &status.service {
        Some(service) => {
            let url = service.service_url.as_deref().unwrap_or("(pending)");
            println!("Service '{}': {} https://{url}", service.service_name, service.status);
        }
        None => println!("Service '{}': not deployed", status.names.service),
    }

    match &status.trigger {
        Some(record) => println!(
            "Bootstrap: {} (generation {})",
            record.state(),
            record.generation()
        ),
        None => println!("Bootstrap: not armed"),
    }

    Ok(())
}
