// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};

mod cli;

#[derive(Parser)]
#[command(name = "live-detect")]
#[command(about = "Live camera viewer with real-time detection overlays")]
#[command(version = env!("GIT_VERSION"))]
#[command(subcommand_required = false)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    run: cli::RunArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the camera and run the viewer (default)
    Run(cli::RunArgs),

    /// List available cameras
    List,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=live_detect=trace, RUST_LOG=info
    // Logs go to stderr so they do not tear the terminal viewer
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Run(args)) => cli::run(args),
        Some(Commands::List) => cli::list_cameras(),
        None => cli::run(cli.run),
    }
}
