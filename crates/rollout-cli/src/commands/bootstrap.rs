/// Run the bootstrap against an already deployed release.
pub async fn bootstrap(rearm: bool) -> anyhow::Result<()> {
    let orchestrator = super::orchestrator()?;
    let state = orchestrator.bootstrap(rearm).await?;

    println!("Bootstrap: {state}");
    if state.is_terminal() && !rearm {
        println!("Pass --rearm to run it again.");
    }
    Ok(())
}
