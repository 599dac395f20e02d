//! Main entry point for the FarmLink CLI.

use std::{path::PathBuf, time::Duration};

use anyhow::Context;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use dotenv::dotenv;
use server::server;
use shared::config::server::Config;
use uuid::Uuid;

mod commands;

use commands::{api::ApiClient, session};

/// FarmLink CLI
#[derive(Parser)]
#[command(name = "farmlink")]
#[command(about = "Command-line client for FarmLink buyer/seller chat", long_about = None)]
struct Cli {
    /// Base URL of the chat server
    #[arg(
        long,
        global = true,
        env = "FARMLINK_SERVER",
        default_value = "http://localhost:8080"
    )]
    server: String,

    /// Session token; falls back to the one saved by `session login`
    #[arg(long, global = true, env = "FARMLINK_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the chat server
    Serve {
        /// The port number to bind the server to (e.g., 8080)
        #[arg(long, short)]
        port: Option<u16>,

        /// Path to the configuration file (config.yaml or config.json)
        #[arg(long, short)]
        config: Option<PathBuf>,
    },
    /// Save or remove the session token
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
    /// Open (or create) the conversation with another party
    Contact {
        /// Party to talk to, e.g. the seller of a listing
        #[arg(long = "with", value_name = "PARTY")]
        with: String,

        /// Listing the conversation is about
        #[arg(long)]
        topic: Option<String>,
    },
    /// List your conversations, most recently active first
    Chats,
    /// Print a conversation and its messages
    Show {
        #[arg(long, short)]
        conversation: Uuid,
    },
    /// Send one message
    Send {
        #[arg(long, short)]
        conversation: Uuid,

        /// Message text
        body: String,
    },
    /// Start an interactive chat session with live updates
    Chat {
        #[arg(long, short)]
        conversation: Uuid,

        /// Seconds to wait before reconnecting the live feed
        #[arg(long, default_value_t = 3)]
        reconnect_secs: u64,
    },
    /// Generate shell completion scripts for the CLI
    Completion {
        /// The shell type (bash, zsh, fish, powershell, elvish)
        #[arg(long, short)]
        shell: Shell,
    },
    /// Generate a configuration file
    Config {
        /// Format of the configuration file to generate (yaml or json)
        #[arg(long, short, default_value = "yaml")]
        format: String,
    },
}

#[derive(Subcommand)]
enum SessionAction {
    /// Store a session token for later commands
    Login {
        #[arg(long)]
        token: String,
    },
    /// Forget the stored session token
    Logout,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port, config } => {
            let resolved = Config::load_config(config, port).context("loading configuration")?;
            server::run(resolved).await?;
        }
        Commands::Session { action } => match action {
            SessionAction::Login { token } => session::login(&token)?,
            SessionAction::Logout => session::logout()?,
        },
        Commands::Contact { with, topic } => {
            let api = client(&cli.server, cli.token)?;
            commands::conversations::contact(&api, &with, topic.as_deref()).await?;
        }
        Commands::Chats => {
            let api = client(&cli.server, cli.token)?;
            commands::conversations::chats(&api).await?;
        }
        Commands::Show { conversation } => {
            let api = client(&cli.server, cli.token)?;
            commands::conversations::show(&api, conversation).await?;
        }
        Commands::Send { conversation, body } => {
            let api = client(&cli.server, cli.token)?;
            commands::conversations::send(&api, conversation, &body).await?;
        }
        Commands::Chat {
            conversation,
            reconnect_secs,
        } => {
            let api = client(&cli.server, cli.token)?;
            commands::chat::start_chat(api, conversation, Duration::from_secs(reconnect_secs))
                .await?;
        }
        Commands::Completion { shell } => commands::completion::generate_completion(shell),
        Commands::Config { format } => {
            let dir = std::env::current_dir().context("no working directory")?;
            commands::config::generate_config(&format, &dir)?;
        }
    }

    Ok(())
}

fn client(server: &str, token: Option<String>) -> anyhow::Result<ApiClient> {
    ApiClient::new(server, session::resolve_token(token)?)
}
