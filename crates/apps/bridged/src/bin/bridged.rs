use std::path::PathBuf;

use anyhow::Context;
use bridged::{run_demo, BridgeConfig};
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "bridged", about = "Plugin sandbox bridge host", version)]
struct Args {
    /// TOML file with `[broker]` and `[sync]` tables.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Default log filter when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log_level: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run an in-process host and tally plugin, then print the report as JSON.
    Demo,
    /// Validate the configuration and print it with defaults filled in.
    CheckConfig,
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<BridgeConfig> {
    match path {
        Some(path) => BridgeConfig::from_path(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Ok(BridgeConfig::default()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&args.log_level))
        .init();

    let config = load_config(args.config.as_ref())?;
    match args.command {
        Command::Demo => {
            let report = run_demo(&config).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::CheckConfig => {
            config.validate()?;
            print!("{}", config.to_toml()?);
        }
    }
    Ok(())
}
