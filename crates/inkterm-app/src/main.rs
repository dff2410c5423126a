mod bridge;
mod cli;
mod console;
mod transcript;

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use inkterm_core::{Executor, MemoryHost, PromptManager, SessionManager, ShellConfig};

use crate::bridge::ProgramBridge;
use crate::cli::{Cli, Mode};

/// Log level used when `RUST_LOG` is not set.
const DEFAULT_LOG_FILTER: &str = "warn";

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    init_logging();

    if let Err(e) = run(cli).await {
        eprintln!("fatal: {e}");
        std::process::exit(1);
    }
}

/// Log to stderr so stdout carries nothing but the transcript.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<(), String> {
    let config = ShellConfig::from_env();
    let path = cli
        .transcript
        .clone()
        .unwrap_or_else(|| config.transcript_path());

    let prompt = PromptManager::new(config.prompt_marker.clone())
        .prompt_text(&config.initial_directory);
    let text = transcript::load_or_seed(&path, &prompt)?;

    let executor = match cli.mode.unwrap_or(Mode::Shell) {
        Mode::Shell => Executor::Process(config.exec_mode.clone()),
        Mode::Bridge { program, args } => {
            Executor::Reply(Arc::new(ProgramBridge::new(program, args)))
        }
    };

    let host = MemoryHost::new();
    let mut manager = SessionManager::new(Arc::new(host.clone()), config);
    let session = manager
        .resume_session(executor, &text)
        .map_err(|e| format!("failed to open transcript: {e}"))?;

    let result = console::run(&host, &session).await;
    transcript::save(&path, &session.document().text())?;
    manager.close_session(session.id());
    result
}
