use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "logconvert", version)]
#[command(about = "Tail log files and store every line as a record", long_about = None)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    Run,
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Init {
        #[arg(long)]
        stdout: bool,
    },
    Validate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config_path = logconvert::config::resolve_config_path(cli.config.as_deref());

    match cli.command {
        Some(Commands::Run) | None => {
            let Some(config_path) = config_path else {
                eprintln!("Error: config not found");
                eprintln!("Searched locations:");
                eprintln!("  ~/.config/logconvert/config.yml");
                eprintln!("  /etc/logconvert/config.yml");
                eprintln!("\nUse --config <path> to specify a config file, or run 'logconvert config init' to generate one.");
                std::process::exit(1);
            };

            let config = logconvert::config::load_config(&config_path)?;
            init_tracing(&config.log_level);
            tracing::info!(
                version = env!("CARGO_PKG_VERSION"),
                config_path = %config_path.display(),
                "logconvert starting"
            );

            logconvert::cli::run::run_config(config).await?;
        }
        Some(Commands::Config { action }) => match action {
            ConfigAction::Init { stdout } => logconvert::cli::config::init(stdout)?,
            ConfigAction::Validate => logconvert::cli::config::validate(config_path)?,
        },
    }

    Ok(())
}

/// RUST_LOG takes precedence over the configured level
fn init_tracing(log_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("logconvert={}", log_level.to_lowercase()).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
