mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "rollout",
    about = "Provision a source-to-service release pipeline on AWS"
)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the pipeline, build environment and secret grants without touching AWS
    Plan,
    /// Create or update the pipeline, build project and service
    Deploy {
        /// Allow deploying with uncommitted changes
        #[arg(long)]
        allow_dirty: bool,
        /// Run the one-time bootstrap again under a new trigger generation
        #[arg(long)]
        rearm: bool,
    },
    /// Run the one-time bootstrap against an existing release
    Bootstrap {
        /// Run it again even if it already fired
        #[arg(long)]
        rearm: bool,
    },
    /// Show pipeline, service and bootstrap status
    Status,
    /// Manage Secrets Manager credentials referenced by rollout.toml
    Secret {
        #[command(subcommand)]
        action: SecretAction,
    },
    /// Delete the pipeline, build project, service and roles
    Destroy {
        /// Skip confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum SecretAction {
    /// Store a username/password secret; the password is read from stdin
    Set {
        /// Secrets Manager secret id, e.g. shop/db
        secret_id: String,
        /// Value of the secret's `username` field
        #[arg(long)]
        username: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // AWS_PROFILE / AWS_REGION per project
    match dotenvy::dotenv() {
        Ok(path) => tracing::debug!(path = %path.display(), "loaded .env"),
        Err(e) if e.not_found() => tracing::debug!("no .env file"),
        Err(e) => tracing::warn!(error = %e, "ignoring unreadable .env"),
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::Plan => commands::plan().await?,
        Commands::Deploy { allow_dirty, rearm } => commands::deploy(allow_dirty, rearm).await?,
        Commands::Bootstrap { rearm } => commands::bootstrap(rearm).await?,
        Commands::Status => commands::status().await?,
        Commands::Secret { action } => match action {
            SecretAction::Set {
                secret_id,
                username,
            } => commands::secret_set(&secret_id, &username).await?,
        },
        Commands::Destroy { yes } => commands::destroy(yes).await?,
    }

    Ok(())
}
