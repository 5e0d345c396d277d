mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;

#[derive(Parser)]
#[command(name = "ground")]
#[command(about = "Bootstrap a multi-account cloud organization for deployments", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision or reconcile the organization, accounts, federation and state backends
    Up {
        /// Report every action without mutating anything
        #[arg(long)]
        dry_run: bool,
        /// Destroy and recreate backends whose bucket region does not match
        #[arg(long)]
        recreate_backend: bool,
    },
    /// Tear down state backends, deployment roles and federation providers
    Down {
        /// Report every deletion without mutating anything
        #[arg(long)]
        dry_run: bool,
        /// Also close the member accounts (irreversible for a long cool-down)
        #[arg(long)]
        close_accounts: bool,
        /// Skip the confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// Read-only validation of everything `up` provisions
    Verify,
    /// Show the account registry, backend descriptors and last report
    Status,
    /// Print version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // Version needs no project configuration
    if matches!(cli.command, Commands::Version) {
        println!("groundwork {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    // An interrupt is an immediate fatal abort. Nothing is cleaned up:
    // partial state is expected and resolved by re-running the pipeline.
    tokio::spawn(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!(
                "{}",
                "interrupted - aborting without cleanup; re-run `ground up` to converge"
                    .red()
                    .bold()
            );
            std::process::exit(130);
        }
    });

    let project_root = match groundwork_core::find_project_root() {
        Ok(root) => root,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    };
    let config = groundwork_core::ProjectConfig::load(&project_root)?;

    match cli.command {
        Commands::Up {
            dry_run,
            recreate_backend,
        } => commands::up::handle(&project_root, &config, dry_run, recreate_backend).await,
        Commands::Down {
            dry_run,
            close_accounts,
            yes,
        } => commands::down::handle(&project_root, &config, dry_run, close_accounts, yes).await,
        Commands::Verify => commands::verify::handle(&project_root, &config).await,
        Commands::Status => commands::status::handle(&project_root, &config).await,
        Commands::Version => {
            unreachable!("Version is handled before config loading");
        }
    }
}
