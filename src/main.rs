use std::path::PathBuf;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use mindmeld_chat::app::{build_session, run_chat, send_once};
use mindmeld_chat::config::Config;
use mindmeld_chat::prefs::PreferenceStore;
use mindmeld_chat::session::WELCOMED_KEY;
use mindmeld_chat::storage::{durable_store_path, session_store_path, JsonFileStore, KeyValueStore};
use mindmeld_chat::ui::TerminalView;

#[derive(Parser)]
#[command(name = "mindmeld")]
#[command(about = "Terminal chat client with spoken replies and voice typing")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Chat endpoint, overrides the config file
    #[arg(long, value_name = "URL")]
    endpoint: Option<String>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive chat (default)
    Chat,
    /// Send one message and print the reply
    Send {
        message: String,
    },
    /// Show stored preferences
    Prefs,
    /// Remove stored preferences
    PrefsReset,
    /// Show the welcome message again next start
    ForgetWelcome,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config
        .or_else(|| {
            dirs::config_dir()
                .map(|d| d.join("mindmeld/config.toml"))
        })
        .ok_or_else(|| anyhow::anyhow!("Could not determine config path"))?;

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    match cli.command {
        Some(Commands::Chat) | None => {
            rt.block_on(async {
                let config = load_config(&config_path, cli.endpoint).await?;
                let view = TerminalView::stdout(config.ui.history_rows);
                let (session, events) = build_session(&config, Box::new(view))?;
                info!("Starting chat");
                run_chat(session, events).await
            })?;
        }
        Some(Commands::Send { message }) => {
            rt.block_on(async {
                let config = load_config(&config_path, cli.endpoint).await?;
                let view = TerminalView::stdout(config.ui.history_rows);
                let (session, _events) = build_session(&config, Box::new(view))?;
                send_once(session, &message).await
            })?;
        }
        Some(Commands::Prefs) => {
            let store = PreferenceStore::new(Box::new(JsonFileStore::open(durable_store_path())), Vec::new());
            match store.raw()? {
                Some(raw) => println!("{}", raw),
                None => println!("No stored preferences."),
            }
        }
        Some(Commands::PrefsReset) => {
            let mut store = PreferenceStore::new(Box::new(JsonFileStore::open(durable_store_path())), Vec::new());
            store.reset()?;
            println!("Preferences reset.");
        }
        Some(Commands::ForgetWelcome) => {
            let mut store = JsonFileStore::open(session_store_path());
            store.remove(WELCOMED_KEY)?;
            println!("Welcome will be shown again.");
        }
    }

    Ok(())
}

async fn load_config(path: &std::path::Path, endpoint: Option<String>) -> Result<Config> {
    let mut config = Config::load(path)
        .await
        .with_context(|| format!("Failed to load config from {:?}", path))?;
    if let Some(endpoint) = endpoint {
        config.client.endpoint = endpoint;
        config.validate()?;
    }
    Ok(config)
}
