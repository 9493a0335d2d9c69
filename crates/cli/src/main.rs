//! clinicdesk CLI: the main entry point.
//!
//! Commands:
//! - `serve`    Start the HTTP gateway
//! - `chat`     Talk to the clinic assistant in the terminal
//! - `onboard`  Write a default config file
//! - `actions`  List the actions the assistant can take

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "clinicdesk",
    about = "clinicdesk: clinic records with an AI assistant",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level when RUST_LOG is unset (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn", env = "CLINICDESK_LOG_LEVEL")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway
    Serve {
        /// Override the bind address
        #[arg(long)]
        host: Option<String>,

        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Chat with the clinic assistant
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Use a running gateway's records instead of the local data directory
        #[arg(long)]
        server: Option<String>,
    },

    /// Write a default configuration file
    Onboard,

    /// List the assistant's actions
    Actions {
        /// Print the full catalog as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Serve { host, port } => commands::serve::run(host, port).await?,
        Commands::Chat { message, server } => commands::chat::run(message, server).await?,
        Commands::Onboard => commands::onboard::run()?,
        Commands::Actions { json } => commands::actions::run(json)?,
    }

    Ok(())
}
