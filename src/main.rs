use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use keepsake::app::AppContext;
use keepsake::cli::{commands, Cli, Commands};
use keepsake::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(kind) = cli.backend {
        config.backend.kind = kind;
    }
    if let Some(user) = cli.user {
        config.session.user_id = Some(user);
    }

    let ctx = AppContext::new(&config)?;

    match cli.command {
        Commands::Status { property } => {
            commands::show_status(&ctx, &property).await?;
        }
        Commands::Toggle { property } => {
            commands::toggle_favorite(&ctx, &property).await?;
        }
        Commands::List => {
            commands::list_favorites(&ctx).await?;
        }
        Commands::Remove { record_id } => {
            commands::remove_favorite(&ctx, &record_id).await?;
        }
        Commands::Watch => {
            commands::watch_favorites(&ctx).await?;
        }
    }

    Ok(())
}
