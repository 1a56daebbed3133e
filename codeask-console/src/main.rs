mod commands;
mod config;
mod llm;
mod orchestrator;

use anyhow::{Context, bail};
use clap::Parser;
use codeask_retriever::storage::VectorStore;
use codeask_retriever::{
    ContextManager, IndexEngine, IndexEngineConfig, IndexError, Retriever, SqliteStore,
};
use commands::Command;
use config::AppConfig;
use llm::HttpGenerationClient;
use orchestrator::AnswerOrchestrator;
use std::io::Write;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

/// Ask questions about a local codebase, answered with retrieved context.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Root of the source tree to index
    #[arg(long, default_value = "./codebase")]
    root: PathBuf,

    /// Directory holding the .codeask.db database file
    #[arg(long, default_value = ".")]
    data_dir: PathBuf,

    /// Configuration file
    #[arg(long, default_value = "codeask.toml")]
    config: PathBuf,

    /// Run a full reindex before the prompt loop
    #[arg(long)]
    full_reindex: bool,
}

type StdinLines = Lines<BufReader<Stdin>>;

struct App {
    engine: IndexEngine,
    orchestrator: AnswerOrchestrator,
    sessions: ContextManager,
    store: Arc<SqliteStore>,
    /// Active embedding fingerprint, re-recorded after a purge.
    fingerprint: String,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(
            |_| {
                tracing_subscriber::EnvFilter::new(
                    "warn,codeask_console=info,codeask_retriever=info,codeask_embed=info",
                )
            },
        ))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = AppConfig::load(&args.config)?;

    let provider = codeask_embed::create_provider(&config.embedding.provider)
        .await
        .context("failed to initialize the embedding provider")?;
    let store = Arc::new(SqliteStore::open(&args.data_dir).await?);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let engine_config = IndexEngineConfig::new(&args.root)
        .with_chunk_config(config.chunking.clone().into());
    let engine = match IndexEngine::new(store.clone(), provider.clone(), engine_config.clone())
        .await
    {
        Ok(engine) => engine,
        Err(IndexError::ConfigurationMismatch { stored, active }) => {
            println!("The index was built with a different embedding configuration.");
            println!("  stored: {stored}");
            println!("  active: {active}");
            if !confirm(&mut lines, "Purge the index and rebuild with the active configuration?")
                .await?
            {
                bail!("embedding configuration mismatch; not purging");
            }
            store.purge().await?;
            IndexEngine::new(store.clone(), provider.clone(), engine_config).await?
        }
        Err(e) => return Err(e.into()),
    };

    let sessions = ContextManager::new(store.pool().clone(), config.session.max_history_length)
        .await?;
    let retriever = Retriever::new(store.clone(), provider.clone(), config.embedding.top_k_chunks);
    let client = Arc::new(HttpGenerationClient::new(config.llm.server_url.clone()));
    let orchestrator = AnswerOrchestrator::new(retriever, client, config.llm);

    let mut app = App {
        engine,
        orchestrator,
        sessions,
        store,
        fingerprint: provider.fingerprint(),
    };

    if args.full_reindex {
        report_reindex(app.engine.full_reindex().await?);
    }

    println!("codeask ready; !help lists commands.");
    loop {
        prompt(&app);
        let Some(line) = lines.next_line().await? else {
            break; // EOF
        };
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }

        if line.starts_with('!') {
            match commands::parse(&line) {
                Ok(Command::Quit) => break,
                Ok(command) => {
                    if let Err(e) = dispatch(&mut app, &mut lines, command).await {
                        println!("error: {e:#}");
                    }
                }
                Err(message) => println!("{message}"),
            }
            continue;
        }

        match app
            .orchestrator
            .answer(&app.sessions, &line, |fragment| {
                print!("{fragment}");
                let _ = std::io::stdout().flush();
            })
            .await
        {
            Ok(_) => println!(),
            Err(e) => println!("error: {e:#}"),
        }
    }

    Ok(())
}

async fn dispatch(app: &mut App, lines: &mut StdinLines, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Reindex => report_reindex(app.engine.full_reindex().await?),
        Command::ReindexFile(path) => {
            let chunks = app.engine.reindex_file(&path).await?;
            println!("reindexed {path}: {chunks} chunks");
        }
        Command::Status => {
            let stats = app.engine.status().await?;
            println!("{} files, {} chunks indexed", stats.files, stats.chunks);
            println!(
                "session: {} (history {})",
                app.sessions.active_session(),
                if app.sessions.context_enabled() { "on" } else { "off" }
            );
        }
        Command::Purge => {
            if confirm(lines, "Delete the entire index and all sessions?").await? {
                app.store.purge().await?;
                app.sessions.purge_sessions().await?;
                app.store.set_embedding_fingerprint(&app.fingerprint).await?;
                println!("purged");
            } else {
                println!("cancelled");
            }
        }
        Command::ContextOn => {
            app.sessions.set_context_enabled(true);
            println!("conversation history on");
        }
        Command::ContextOff => {
            app.sessions.set_context_enabled(false);
            println!("conversation history off");
        }
        Command::ContextList => {
            let active = app.sessions.active_session().to_string();
            for name in app.sessions.list_sessions().await? {
                let marker = if name == active { "*" } else { " " };
                println!("{marker} {name}");
            }
        }
        Command::ContextNew(name) => {
            app.sessions.create_session(&name).await?;
            println!("created session '{name}'");
        }
        Command::ContextSwitch(name) => {
            app.sessions.switch_session(&name).await?;
            println!("switched to session '{name}'");
        }
        Command::ContextDelete(name) => {
            if confirm(lines, &format!("Delete session '{name}' and its history?")).await? {
                app.sessions.delete_session(&name).await?;
                println!("deleted session '{name}'");
            } else {
                println!("cancelled");
            }
        }
        Command::Settings { key, value } => match key.as_str() {
            "temperature" => {
                let parsed: f64 = value
                    .parse()
                    .map_err(|_| anyhow::anyhow!("temperature must be a number, got '{value}'"))?;
                app.sessions
                    .set_runtime_override("temperature", serde_json::json!(parsed))
                    .await?;
                println!("temperature set to {parsed} for this session");
            }
            other => bail!("unknown setting '{other}'; supported: temperature"),
        },
        Command::Help => println!("{}", commands::HELP_TEXT),
        Command::Quit => unreachable!("handled by the loop"),
    }
    Ok(())
}

fn prompt(app: &App) {
    print!("[{}]> ", app.sessions.active_session());
    let _ = std::io::stdout().flush();
}

fn report_reindex(report: codeask_retriever::IndexReport) {
    println!(
        "indexed {} files ({} unchanged, {} removed)",
        report.indexed, report.unchanged, report.removed
    );
    for (path, reason) in &report.failures {
        println!("  failed {path}: {reason}");
    }
}

/// Y/N confirmation on stdin; anything but y/Y declines.
async fn confirm(lines: &mut StdinLines, question: &str) -> anyhow::Result<bool> {
    print!("{question} [y/N] ");
    std::io::stdout().flush()?;
    let answer = lines.next_line().await?.unwrap_or_default();
    Ok(answer.trim().eq_ignore_ascii_case("y"))
}
