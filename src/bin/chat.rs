use clap::Parser;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use vault_chat::{
    agent::GeminiAgent,
    config::{resolve_path, Settings},
    create_session,
    gemini::GeminiClient,
    memory::{create_history_store, create_session_store, ContextSummarizer},
    sessions::{choose_session, render_history, SessionChoice},
    tools::{create_vault_registry, VaultScanRetriever},
    ui::{self, TypingIndicator},
    SessionDeps,
};

/// Chat with your note vault from the terminal
#[derive(Parser, Debug)]
#[command(name = "vault-chat", version)]
struct Args {
    /// Resume this session id without showing the picker
    #[arg(long, conflicts_with = "new")]
    session: Option<String>,

    /// Start a new session without showing the picker
    #[arg(long)]
    new: bool,

    /// Settings file (overrides RAG_CONFIG_PATH)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    dotenv::dotenv().ok();

    // Logs go to stderr so they stay out of the chat bubbles
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let settings = match &args.config {
        Some(path) => Settings::load_from(resolve_path(&path.to_string_lossy()))?,
        None => Settings::load()?,
    };

    // Create components
    let store = create_session_store(&settings)?;
    let history_store = create_history_store(&settings).await?;
    let client = GeminiClient::from_env(settings.chat_model.clone())?;
    let retriever = Arc::new(VaultScanRetriever::new(&settings.vault_path));
    let registry = create_vault_registry(&settings.vault_path, retriever);
    let agent = Arc::new(GeminiAgent::new(client.clone(), registry));
    let summarizer = Arc::new(ContextSummarizer::new(Arc::new(client)));

    let mut editor = DefaultEditor::new()?;

    let choice = if let Some(id) = args.session.clone() {
        SessionChoice::Existing(id)
    } else if args.new {
        SessionChoice::New
    } else {
        choose_session(
            history_store.as_deref(),
            settings.session_list_limit,
            |prompt| editor.readline(prompt).ok(),
        )
        .await?
    };

    let deps = SessionDeps {
        store,
        history_store,
        agent,
        summarizer,
    };
    let session = create_session(deps, settings.history_max_messages, choice.into_session_id());

    if let Err(e) = session.restore_history().await {
        warn!("Could not restore session history: {}", e);
        ui::render_error(&format!("Could not restore history: {}", e));
    }

    ui::print_banner();
    render_history(&session).await;

    loop {
        let line = match editor.readline("You> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };

        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if query.eq_ignore_ascii_case("exit") || query.eq_ignore_ascii_case("quit") {
            break;
        }
        let _ = editor.add_history_entry(query);

        ui::clear_last_lines(1);
        ui::render_user(query);

        let typing = TypingIndicator::start();
        let result = session.process_query(query).await;
        typing.stop();

        match result {
            Ok(outcome) => {
                if outcome.has_reply() {
                    ui::render_assistant(&outcome.reply);
                }
                ui::render_sources(&outcome.artifacts);
            }
            Err(e) => {
                warn!(session_id = %session.session_id(), "Turn failed: {}", e);
                ui::render_error(&e.to_string());
            }
        }
    }

    info!(session_id = %session.session_id(), "Chat ended");
    println!("Session: {}", session.session_id());
    Ok(())
}
