// src/main.rs
use std::path::PathBuf;
use std::sync::Arc;

use aether_bridge::bridge::Bridge;
use aether_bridge::client::RpcClient;
use aether_bridge::config::BridgeConfig;
use aether_bridge::error::RpcError;
use aether_bridge::host::{Field, HostEvent, SyntheticDocument};
use aether_bridge::importer::{render_declarations, to_declaration};
use aether_bridge::logging;
use aether_bridge::settings::{FileSettings, Settings};
use aether_bridge::watcher::ChangeWatcher;
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use tracing::error;

#[derive(Parser)]
#[command(name = "aether-bridge", version, about = "Bridge a chat document to a local JSON-RPC tool service")]
struct Cli {
    /// Log at debug level.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Settings file (overrides AETHER_SETTINGS_PATH).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch the tool catalog and print it as host declarations.
    Tools {
        #[arg(long)]
        url: Option<String>,
    },
    /// Call one tool and print its text result.
    Call {
        name: String,
        /// Arguments as a JSON object.
        #[arg(default_value = "{}")]
        arguments: String,
        #[arg(long)]
        url: Option<String>,
    },
    /// Inspect or change persisted settings.
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Run the full bridge against an in-memory chat document.
    Demo {
        #[arg(long, default_value = "calculate_sum")]
        name: String,
        #[arg(long, default_value = r#"{"a": 2, "b": 3}"#)]
        arguments: String,
        /// Also open a declarations dialog and import the catalog.
        #[arg(long)]
        import: bool,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    Show,
    SetUrl { url: String },
    AutoSubmit { state: Toggle },
}

#[derive(Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    // 1. LOAD CONFIG
    let mut config = BridgeConfig::from_env()?;
    if let Some(path) = cli.settings {
        config.settings_path = path;
    }
    let settings = Settings::new(Arc::new(FileSettings::new(&config.settings_path)));

    // 2. BUILD THE CLIENT
    let client = Arc::new(RpcClient::http().with_error_hook(|err: &RpcError| {
        error!(error = %err, "Failed to get response");
    }));

    // 3. RUN THE COMMAND
    match cli.command {
        Command::Tools { url } => {
            let url = resolve_url(&settings, url).await?;
            let tools = client
                .list_tools(&url)
                .await
                .with_context(|| format!("Failed to load tools from '{url}'"))?;
            let declarations: Vec<_> = tools.iter().map(to_declaration).collect();
            println!("{}", render_declarations(&declarations)?);
        }
        Command::Call { name, arguments, url } => {
            let url = resolve_url(&settings, url).await?;
            let arguments: Value =
                serde_json::from_str(&arguments).context("Arguments must be valid JSON")?;
            let result = client.call_tool(&url, &name, arguments).await?;
            let text = result
                .joined_text()
                .ok_or_else(|| anyhow!("Tool '{name}' returned no text content"))?;
            println!("{text}");
        }
        Command::Settings { action } => match action {
            SettingsAction::Show => {
                let current = settings.load().await?;
                println!("{}", serde_json::to_string_pretty(&current)?);
            }
            SettingsAction::SetUrl { url } => settings.set_server_url(&url).await?,
            SettingsAction::AutoSubmit { state } => {
                settings.set_auto_submit(matches!(state, Toggle::On)).await?
            }
        },
        Command::Demo { name, arguments, import } => {
            run_demo(config, settings, client, &name, &arguments, import).await?;
        }
    }

    Ok(())
}

async fn resolve_url(settings: &Settings, url: Option<String>) -> Result<String> {
    match url {
        Some(url) => Ok(url),
        None => settings.server_url().await,
    }
}

async fn run_demo(
    config: BridgeConfig,
    settings: Settings,
    client: Arc<RpcClient>,
    name: &str,
    arguments: &str,
    import: bool,
) -> Result<()> {
    let document = Arc::new(SyntheticDocument::new());
    let bridge = Arc::new(Bridge::new(document.clone(), settings.clone(), client, config.timing));
    let watcher = ChangeWatcher::start(bridge, &*document);

    // A new chat turn arrives carrying one function call.
    let turn = document.add_chat_turn();
    let call = document.add_function_call(Some(turn), name, arguments);
    document.publish(HostEvent::Inserted(vec![turn]));

    let dialog = import.then(|| {
        let dialog = document.add_declarations_dialog();
        document.publish(HostEvent::Inserted(vec![dialog]));
        dialog
    });
    if let Some(dialog) = dialog {
        let url = settings.server_url().await?;
        document.publish(HostEvent::ImportRequested { dialog, url });
    }

    watcher.shutdown().await;

    println!(
        "response: {}",
        document.field(call, Field::Response).unwrap_or_default()
    );
    println!("submitted: {}", document.clicks(call) > 0);
    if let Some(dialog) = dialog {
        println!(
            "declarations:\n{}",
            document.field(dialog, Field::DeclarationsTarget).unwrap_or_default()
        );
    }
    for alert in document.alerts() {
        println!("alert: {alert}");
    }
    Ok(())
}
