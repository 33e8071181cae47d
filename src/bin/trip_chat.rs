//! Trip Planner interactive chat
//!
//! # Usage
//!
//! ```bash
//! # Resume the last session (or start one)
//! trip_chat
//!
//! # Always start fresh, persisting sessions under ./sessions
//! trip_chat --new --store-dir ./sessions
//!
//! # Classify and extract a single message, no session
//! trip_chat analyse "Find flights to Tokyo for 2 people"
//! ```
//!
//! Inside the chat, lines starting with `/` are commands: `/show`,
//! `/resolve keep|new|merge`, `/search`, `/archive`, `/quit`.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use trip_planner::assistant::trip_summary;
use trip_planner::provider::StaticTravelDataProvider;
use trip_planner::{EngineConfig, ResolutionStrategy, TripEngine, TurnResult};

#[derive(Parser)]
#[command(name = "trip_chat")]
#[command(version = "0.1.0")]
#[command(about = "Plan a trip by chatting")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Resume this session id instead of the last one
    #[arg(long)]
    session: Option<Uuid>,

    /// Start a new session even if a previous one exists
    #[arg(long)]
    new: bool,

    /// Directory for session files
    #[arg(long, env = "TRIP_STORE_DIR")]
    store_dir: Option<PathBuf>,

    /// Intent pattern YAML overriding the embedded set
    #[arg(long, env = "TRIP_PATTERNS_PATH")]
    patterns: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the intent and entities for one message as JSON
    Analyse {
        message: String,
    },
}

// =============================================================================
// MAIN
// =============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,trip_planner=debug".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {:#}", "error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = EngineConfig::from_env()?;
    if cli.store_dir.is_some() {
        config.store_dir = cli.store_dir;
    }
    if cli.patterns.is_some() {
        config.patterns_path = cli.patterns;
    }

    let engine = TripEngine::builder(config)
        .provider(Arc::new(StaticTravelDataProvider))
        .build()
        .await
        .context("failed to start trip engine")?;

    match cli.command {
        Some(Commands::Analyse { message }) => cmd_analyse(&engine, &message),
        None => chat(&engine, cli.session, cli.new).await,
    }
}

fn cmd_analyse(engine: &TripEngine, message: &str) -> anyhow::Result<()> {
    let output = serde_json::json!({
        "intent": engine.classifier().classify(message),
        "entities": engine.extractor().extract(message),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

// =============================================================================
// CHAT LOOP
// =============================================================================

async fn chat(engine: &TripEngine, session: Option<Uuid>, force_new: bool) -> anyhow::Result<()> {
    let session_id = match session {
        Some(id) => {
            let view = engine.get_session(id).await?;
            println!("{} {}", "Resumed".green(), trip_summary(&view.context));
            id
        }
        None => {
            let start = engine.create_session(None, force_new).await?;
            println!("{}", start.initial_response.cyan());
            start.session_id
        }
    };
    println!("{}", format!("session {}", session_id).dimmed());

    let mut rl = DefaultEditor::new()?;
    loop {
        let line = match rl.readline("you> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        rl.add_history_entry(line)?;

        let outcome = match line.strip_prefix('/') {
            Some(command) => match command_action(engine, session_id, command).await {
                Ok(Flow::Quit) => break,
                Ok(Flow::Continue) => Ok(()),
                Err(e) => Err(e),
            },
            None => engine
                .send_message(session_id, line)
                .await
                .map(|turn| print_turn(&turn))
                .map_err(anyhow::Error::from),
        };

        // Recoverable failures are reported and the chat goes on.
        if let Err(e) = outcome {
            match e.downcast_ref::<trip_planner::TripError>() {
                Some(err) if err.is_recoverable() => println!("{} {}", "!".yellow(), err),
                _ => return Err(e),
            }
        }
    }

    Ok(())
}

enum Flow {
    Continue,
    Quit,
}

async fn command_action(engine: &TripEngine, session_id: Uuid, command: &str) -> anyhow::Result<Flow> {
    let mut words = command.split_whitespace();
    match words.next().unwrap_or_default() {
        "quit" | "exit" => return Ok(Flow::Quit),
        "show" => {
            let view = engine.get_session(session_id).await?;
            println!("{}", trip_summary(&view.context));
            println!("{} {}", "state:".dimmed(), view.state);
            for conflict in &view.pending_conflicts {
                println!("{} {}", "conflict:".yellow(), conflict);
            }
        }
        "resolve" => {
            let strategy: ResolutionStrategy = words
                .next()
                .unwrap_or("new")
                .parse()
                .map_err(|_| anyhow::anyhow!("strategy must be keep, new or merge"))?;
            let result = engine.resolve_conflict(session_id, strategy).await?;
            if result.resolved.is_empty() {
                println!("Nothing to resolve.");
            }
            for note in &result.resolved {
                println!("{} {}", "resolved".green(), note);
            }
            for suggestion in &result.suggestions {
                println!("{} {}", "note:".yellow(), suggestion);
            }
        }
        "search" => {
            let outcome = engine.search(session_id).await?;
            for offer in outcome
                .results
                .flights
                .iter()
                .chain(&outcome.results.hotels)
                .chain(&outcome.results.activities)
            {
                let price = offer
                    .price
                    .map(|p| format!("{} {}", offer.currency, p))
                    .unwrap_or_default();
                println!("  {} {}", offer.title.bold(), price.dimmed());
            }
        }
        "archive" => {
            engine.archive_session(session_id).await?;
            println!("Session archived.");
            return Ok(Flow::Quit);
        }
        other => println!("{} unknown command /{}", "?".yellow(), other),
    }
    Ok(Flow::Continue)
}

fn print_turn(turn: &TurnResult) {
    println!("{}", turn.reply.cyan());
    println!(
        "{}",
        format!(
            "[{} {:.2}] {}",
            turn.intent.intent_type,
            turn.intent.confidence,
            turn.state
        )
        .dimmed()
    );
    for suggestion in &turn.suggestions {
        println!("  {} {}", "-".dimmed(), suggestion);
    }
}
