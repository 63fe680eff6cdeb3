use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use vox_gateway::{Config, Daemon, router};

/// Vox - offline voice-control gateway for robots and voice assistants
#[derive(Parser)]
#[command(name = "vox", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Address to bind (overrides HOST)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Comma-separated pipelines to activate (overrides PIPELINES)
    #[arg(long)]
    pipelines: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the gateway (default)
    Serve,
    /// Show how the keyword router resolves a command
    Route {
        /// Spoken command text, e.g. "avanza dos metros y gira a la derecha"
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,vox_gateway=info",
        1 => "info,vox_gateway=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Some(Command::Route { text }) => route(&text.join(" ")),
        Some(Command::Serve) | None => serve(cli.host, cli.port, cli.pipelines).await,
    }
}

async fn serve(host: Option<String>, port: Option<u16>, pipelines: Option<String>) -> anyhow::Result<()> {
    let mut config = Config::load();
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(list) = pipelines {
        config.set_pipelines(&list);
    }

    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        pipelines = ?config.pipelines,
        "starting vox gateway"
    );
    tracing::debug!(?config, "loaded configuration");

    Daemon::new(config).run().await?;
    Ok(())
}

fn route(text: &str) -> anyhow::Result<()> {
    let Some(result) = router::route(text) else {
        println!("no keyword match; \"{text}\" would go to the language model");
        return Ok(());
    };

    println!("{}", serde_json::to_string_pretty(&result.to_command())?);
    println!("confirmation: {}", result.confirmation);
    Ok(())
}
