//! PDF Chat Assistant CLI
//!
//! Entry point: uploads a document and/or chats with the backend.

use mimalloc::MiMalloc;

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use pdf_chat_assistant::ChatApp;
use pdf_chat_assistant::config::{AppConfig, Cli, Command, LogFormat, LoggingConfig};
use pdf_chat_assistant::conversation::{AskOutcome, Message};
use pdf_chat_assistant::upload::{SelectedFile, UploadCoordinator, UploadStatus, UploadView};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Load .env (if present) before clap reads env-backed flags
    let _ = dotenv();

    let cli = Cli::parse();
    let config = AppConfig::from_cli(&cli).context("Configuration error")?;
    init_tracing(&config.logging);

    info!(
        name: "config.loaded",
        backend_url = %config.backend.url,
        status_clear_delay_ms = config.session.status_clear_delay_ms,
        "Configuration loaded"
    );

    let app = ChatApp::from_config(&config)?;

    let code = match cli.command.clone().unwrap_or(Command::Chat { pdf: None }) {
        Command::Upload { path } => run_upload(&app.upload, &path).await?,
        Command::Ask { question } => run_ask(&app, &question).await,
        Command::Chat { pdf } => run_chat(&app, pdf).await?,
    };

    app.upload.shutdown();
    Ok(code)
}

/// Initialize tracing (M-LOG-STRUCTURED). `RUST_LOG` wins over the configured filter.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.filter));
    let registry = tracing_subscriber::registry().with(filter);
    match logging.format {
        LogFormat::Json => registry.with(fmt::layer().json().with_writer(std::io::stderr)).init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

async fn run_upload(upload: &UploadCoordinator, path: &Path) -> anyhow::Result<ExitCode> {
    let mut view = upload.subscribe();
    if !start_upload(upload, path).await {
        print_view(&upload.view());
        return Ok(ExitCode::FAILURE);
    }

    let last = view
        .wait_for(|v| matches!(v.status, UploadStatus::Completed | UploadStatus::Failed))
        .await
        .context("Upload session closed")?
        .clone();
    print_view(&last);

    Ok(if last.status == UploadStatus::Completed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn run_ask(app: &ChatApp, question: &str) -> ExitCode {
    let outcome = app.query.ask(question).await;
    if let Some(message) = app.query.store().last() {
        print_answer(&message);
    }
    match outcome {
        AskOutcome::Answered => ExitCode::SUCCESS,
        AskOutcome::Skipped | AskOutcome::Failed => ExitCode::FAILURE,
    }
}

async fn run_chat(app: &ChatApp, pdf: Option<PathBuf>) -> anyhow::Result<ExitCode> {
    let printer = tokio::spawn(print_status_changes(app.upload.subscribe()));

    if let Some(path) = pdf {
        start_upload(&app.upload, &path).await;
    }

    println!("Type a question, or /upload <path>, /cancel, /status, /quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match ChatInput::parse(&line) {
            ChatInput::Quit => break,
            ChatInput::Upload(path) => {
                start_upload(&app.upload, Path::new(path)).await;
            }
            ChatInput::Cancel => {
                if let Err(e) = app.upload.cancel() {
                    eprintln!("{}", e.user_message());
                }
            }
            ChatInput::Status => print_view(&app.upload.view()),
            ChatInput::Question(question) => {
                if app.query.ask(question).await != AskOutcome::Skipped {
                    if let Some(message) = app.query.store().last() {
                        print_answer(&message);
                    }
                }
            }
        }
    }

    printer.abort();
    Ok(ExitCode::SUCCESS)
}

/// Select and submit a file. Returns `false` if nothing was submitted.
async fn start_upload(upload: &UploadCoordinator, path: &Path) -> bool {
    let file = match SelectedFile::from_path(path).await {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Cannot read {}: {e}", path.display());
            return false;
        }
    };
    if let Err(e) = upload.select_file(file) {
        eprintln!("{}", e.user_message());
        return false;
    }
    match upload.submit().await {
        Ok(status) => status == UploadStatus::Processing,
        Err(e) => {
            eprintln!("{}", e.user_message());
            false
        }
    }
}

async fn print_status_changes(mut view: watch::Receiver<UploadView>) {
    while view.changed().await.is_ok() {
        let current = view.borrow_and_update().clone();
        if current.message.is_some() {
            print_view(&current);
        }
    }
}

fn print_view(view: &UploadView) {
    match (&view.message, &view.selected_file) {
        (Some(message), _) => println!("[{}] {message}", view.status),
        (None, Some(file)) => println!("[{}] selected {file}", view.status),
        (None, None) => println!("[{}]", view.status),
    }
}

fn print_answer(message: &Message) {
    if let Some(answer) = &message.answer {
        println!("{answer}");
    }
}

#[derive(Debug, PartialEq, Eq)]
enum ChatInput<'a> {
    Question(&'a str),
    Upload(&'a str),
    Cancel,
    Status,
    Quit,
}

impl<'a> ChatInput<'a> {
    fn parse(line: &'a str) -> Self {
        let line = line.trim();
        match line.split_once(' ') {
            Some(("/upload", path)) => Self::Upload(path.trim()),
            _ => match line {
                "/cancel" => Self::Cancel,
                "/status" => Self::Status,
                "/quit" | "/exit" => Self::Quit,
                _ => Self::Question(line),
            },
        }
    }
}
