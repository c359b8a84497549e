use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "shopfloor")]
#[command(version, about = "Admin client for the order-scheduling backend")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to shopfloor.toml. Defaults to the working directory, then
    /// the user config dir.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the backend base URL.
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the built dashboard as static files
    Serve {
        #[arg(short, long)]
        port: Option<u16>,

        /// Directory holding the built dashboard
        #[arg(long)]
        dist: Option<PathBuf>,

        /// Enable dev mode (permissive CORS for a local dev server)
        #[arg(long)]
        dev: bool,
    },
    /// Log in and store credentials
    Login {
        #[arg(long)]
        email: Option<String>,

        /// Keep the session across restarts (durable storage scope)
        #[arg(long)]
        remember: bool,
    },
    /// Clear stored credentials
    Logout,
    /// Show the stored identity and storage scope
    Whoami,
    /// Fetch and print one page of a resource
    List {
        /// orders, origin-items, items, flows, stages, capacities,
        /// categories, comments, sales-orders or users
        resource: String,

        #[arg(long, default_value = "0")]
        offset: u64,

        #[arg(long, default_value = "10")]
        limit: u64,

        #[arg(long)]
        search: Option<String>,

        #[arg(long)]
        ordering: Option<String>,
    },
    /// Stream live updates for a resource until interrupted
    Watch {
        /// orders or items
        resource: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = shopfloor::config::ShopfloorConfig::load(cli.config.as_deref())?;
    if let Some(base_url) = &cli.base_url {
        config.api.base_url = base_url.clone();
    }

    match &cli.command {
        Commands::Serve { port, dist, dev } => cmd::cmd_serve(&config, *port, dist.clone(), *dev).await,
        Commands::Login { email, remember } => cmd::cmd_login(&config, email.clone(), *remember).await,
        Commands::Logout => cmd::cmd_logout(&config),
        Commands::Whoami => cmd::cmd_whoami(),
        Commands::List {
            resource,
            offset,
            limit,
            search,
            ordering,
        } => {
            cmd::cmd_list(
                &config,
                resource,
                *offset,
                *limit,
                search.clone(),
                ordering.clone(),
            )
            .await
        }
        Commands::Watch { resource } => cmd::cmd_watch(&config, resource).await,
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;
    let default = if verbose { "shopfloor=debug" } else { "shopfloor=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
