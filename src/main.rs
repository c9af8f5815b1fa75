//! # Deskmate CLI (`deskmate`)
//!
//! The `deskmate` binary is the primary interface for Deskmate. It provides
//! commands for database initialization, document indexing, asking questions,
//! inspecting stored chat messages, and starting the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! deskmate --config ./config/deskmate.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `deskmate init` | Create the SQLite database and run schema migrations |
//! | `deskmate ask "<question>"` | Answer a question from the indexed knowledge base |
//! | `deskmate add-doc --title <t> <file>` | Add and index a document |
//! | `deskmate docs` | List indexed documents |
//! | `deskmate messages` | List stored chat messages |
//! | `deskmate index-thread <channel> <ts>` | Index a stored conversation thread |
//! | `deskmate serve api` | Start the JSON HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! deskmate init --config ./config/deskmate.toml
//!
//! # Index a runbook
//! deskmate add-doc --title "Password Reset Runbook" runbook.md
//!
//! # Ask a question scoped to a channel
//! deskmate ask "how do I reset a password?" --channel C123
//!
//! # Start the HTTP server
//! deskmate serve api --config ./config/deskmate.toml
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use deskmate::{app, config, db, migrate, server, store};

/// Deskmate CLI — a retrieval-augmented answering engine for team chat.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/deskmate.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "deskmate",
    about = "Deskmate — a retrieval-augmented answering engine for team chat",
    version,
    long_about = "Deskmate ingests chat events, indexes documents and conversation threads \
    into a vector index, and answers questions grounded in the indexed material, with \
    per-thread conversation memory and a confidence label on every answer."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/deskmate.toml`. All database, embedding, LLM,
    /// retrieval, memory, and server settings are read from this file.
    #[arg(long, global = true, default_value = "./config/deskmate.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables
    /// (documents, chat_messages, conversation_turns, embedding_records,
    /// answer_audit). This command is idempotent — running it multiple
    /// times is safe.
    Init,

    /// Answer a question from the indexed knowledge base.
    ///
    /// Embeds the question, retrieves the most similar indexed chunks,
    /// and generates a grounded answer with sources and a confidence label.
    /// Requires embedding and LLM providers to be configured.
    Ask {
        /// The question to answer.
        question: String,

        /// Restrict retrieval of thread material to a specific channel.
        #[arg(long)]
        channel: Option<String>,
    },

    /// Add a document and index it.
    ///
    /// Reads the document body from a file (or `--content`), chunks it,
    /// embeds the chunks, and stores them in the vector index. Re-adding
    /// a document with unchanged content is a no-op.
    AddDoc {
        /// Document title.
        #[arg(long)]
        title: String,

        /// Source label stored with the document.
        #[arg(long, default_value = "cli")]
        source: String,

        /// Path to a file containing the document body.
        file: Option<PathBuf>,

        /// Document body passed inline instead of a file.
        #[arg(long, conflicts_with = "file")]
        content: Option<String>,
    },

    /// List indexed documents.
    Docs,

    /// List stored chat messages, newest first.
    Messages {
        /// Maximum number of messages to print.
        #[arg(long, default_value_t = 50)]
        limit: i64,

        /// Only show messages from this channel.
        #[arg(long)]
        channel: Option<String>,
    },

    /// Index a stored conversation thread.
    ///
    /// Merges the thread's stored messages into a single speaker-prefixed
    /// text and indexes it. Re-indexing a thread replaces its previous
    /// vectors, so a grown thread never leaves stale chunks behind.
    IndexThread {
        /// Channel the thread lives in.
        channel_id: String,

        /// Timestamp of the thread's root message.
        thread_ts: String,
    },

    /// Start the HTTP server.
    ///
    /// Exposes the answering engine, document indexing, and event intake
    /// via a JSON API.
    Serve {
        #[command(subcommand)]
        service: ServeService,
    },
}

/// Server subcommands.
#[derive(Subcommand)]
enum ServeService {
    /// Start the JSON API server.
    ///
    /// Binds to the address configured in `[server].bind` and serves
    /// the Deskmate API endpoints.
    Api,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    let pool = db::connect(&cfg).await?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&pool).await?;
            println!("Database initialized successfully.");
        }
        Commands::Docs => {
            let store = store::RelationalStore::new(pool.clone());
            let docs = store.list_documents().await?;
            if docs.is_empty() {
                println!("No documents indexed.");
            }
            for doc in docs {
                println!("{}  [{}]  {}", doc.id, doc.source, doc.title);
            }
        }
        Commands::Messages { limit, channel } => {
            let store = store::RelationalStore::new(pool.clone());
            let messages = store.list_messages(limit, channel.as_deref()).await?;
            if messages.is_empty() {
                println!("No messages stored.");
            }
            for msg in messages {
                println!(
                    "[{} {}] {}: {}",
                    msg.channel_id, msg.message_ts, msg.user_id, msg.text
                );
            }
        }
        Commands::Ask { question, channel } => {
            let app = Arc::new(app::App::build(&cfg, pool.clone())?);
            let response = app.engine.answer(&question, channel.as_deref()).await?;
            println!("{}", response.answer);
            println!();
            println!("Confidence: {:?}", response.confidence);
            for source in &response.sources {
                println!(
                    "  - {} ({}): {}",
                    source.source_type.as_str(),
                    source.id,
                    source.title
                );
            }
        }
        Commands::AddDoc {
            title,
            source,
            file,
            content,
        } => {
            let body = match (file, content) {
                (Some(path), _) => std::fs::read_to_string(&path)?,
                (None, Some(text)) => text,
                (None, None) => anyhow::bail!("provide a file path or --content"),
            };
            let app = Arc::new(app::App::build(&cfg, pool.clone())?);
            let doc = deskmate::models::Document::new(title, body, source);
            let result = app.indexer.index_document(&doc).await;
            println!(
                "{}  status={}  chunks={}",
                result.source_id,
                result.status.as_str(),
                result.chunks
            );
            if let Some(err) = result.error {
                println!("error: {}", err);
            }
        }
        Commands::IndexThread {
            channel_id,
            thread_ts,
        } => {
            let app = Arc::new(app::App::build(&cfg, pool.clone())?);
            let messages = app.store.thread_messages(&channel_id, &thread_ts).await?;
            if messages.is_empty() {
                anyhow::bail!("no stored messages for thread {} in {}", thread_ts, channel_id);
            }
            let result = app
                .indexer
                .index_thread(&channel_id, &thread_ts, &messages)
                .await;
            println!(
                "thread {}  status={}  chunks={}",
                thread_ts,
                result.status.as_str(),
                result.chunks
            );
        }
        Commands::Serve { service } => match service {
            ServeService::Api => {
                let app = Arc::new(app::App::build(&cfg, pool.clone())?);
                server::run_server(&cfg, app).await?;
            }
        },
    }

    Ok(())
}
