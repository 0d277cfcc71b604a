use std::env;
use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

use codechat::chat::auth::StaticTokenProvider;
use codechat::chat::controllers::{EngineEvent, TurnEngine};
use codechat::chat::repositories::SessionRepository;
use codechat::chat::services::backend_client::BackendClient;
use codechat::config;
use codechat::settings::repositories::SettingsRepository;
use codechat::storage::JsonFileStore;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let store = Arc::new(JsonFileStore::new().context("Failed to initialize storage")?);
    let settings_repository = SettingsRepository::new(store.clone());
    let settings = settings_repository
        .load()
        .await
        .context("Failed to load settings")?;
    let prompts = settings_repository
        .load_system_prompts()
        .await
        .context("Failed to load system prompts")?;

    let repository = Arc::new(SessionRepository::new(store));
    let base_url = config::base_url();
    info!(%base_url, "connecting to backend");

    let tokens = Arc::new(StaticTokenProvider::new(env::var("CODECHAT_TOKEN").ok()));
    let backend = BackendClient::new(base_url, tokens).context("Failed to build HTTP client")?;

    let (events_tx, mut events_rx) = tokio::sync::mpsc::unbounded_channel();
    let mut engine = TurnEngine::new(backend, repository.clone()).with_event_sink(events_tx);

    // Print streamed tokens as they arrive.
    let printer = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            match event {
                EngineEvent::TokenAppended { content } => {
                    print!("{content}");
                    let _ = std::io::stdout().flush();
                }
                EngineEvent::StatusChanged { message } => {
                    eprintln!("[{message}]");
                }
                EngineEvent::TurnCompleted => println!(),
                EngineEvent::TurnFailed { .. } => {}
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    print_prompt();
    while let Some(line) = lines.next_line().await? {
        let input = line.trim();
        match input {
            "" => {}
            "/quit" => break,
            "/sessions" => {
                for session in repository.get_all_sessions().await? {
                    println!("{}  {}", session.id, session.title);
                }
            }
            "/clear" => {
                engine.clear_chat();
                println!("started a new chat");
            }
            text => {
                if let Err(err) = engine.send_turn(text, &settings, &prompts).await {
                    eprintln!("error: {err}");
                }
                engine.acknowledge();
            }
        }
        print_prompt();
    }

    printer.abort();
    Ok(())
}

fn print_prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}
