mod action;
mod app;
mod auth;
mod command;
mod config;
mod error;
mod event;
mod filter;
mod forge;
mod github;
mod store;
mod tui;
mod types;
mod ui;

use std::panic;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::action::Action;
use crate::app::{App, SessionSettings};
use crate::command::{Executor, ExecutorSettings};
use crate::config::Config;
use crate::error::WatchtowerError;
use crate::event::Event;
use crate::forge::Forge;
use crate::github::GitHub;
use crate::store::StatusStore;
use crate::tui::EventHandler;

#[derive(Parser, Debug)]
#[command(name = "watchtower", version)]
#[command(about = "Watch pull requests that need your review and your own open PRs")]
struct Cli {
    /// Config file (defaults to the platform config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Status database, overriding `storage.database`
    #[arg(long)]
    db: Option<PathBuf>,

    /// Refresh interval in seconds, overriding `github.refresh_interval_secs`
    #[arg(long)]
    refresh_secs: Option<u64>,
}

/// The terminal belongs to the TUI, so logs go to a file next to the
/// database when possible.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let log_file = config::data_dir().and_then(|dir| {
        std::fs::create_dir_all(&dir).ok()?;
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("watchtower.log"))
            .ok()
    });

    let registry = tracing_subscriber::registry().with(filter);
    match log_file {
        Some(file) => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
            .init(),
        None => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(secs) = cli.refresh_secs {
        config.github.refresh_interval_secs = secs;
    }
    if let Some(db) = cli.db {
        config.storage.database = Some(db);
    }

    // Everything that can fail fatally happens before the terminal is taken over.
    let db_path = config.database_path().ok_or_else(|| {
        WatchtowerError::Config("no data directory found; set storage.database".to_string())
    })?;
    let store = StatusStore::open(&db_path).map_err(WatchtowerError::from)?;
    let token = auth::load_token(&config.github)?;
    let github = GitHub::new(token)?;

    // Set up panic hook to restore terminal
    let original_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let _ = tui::restore();
        original_hook(panic_info);
    }));

    let result = run(config, store, Arc::new(github)).await;

    // Restore terminal
    tui::restore()?;

    result
}

async fn run(
    config: Config,
    store: StatusStore,
    forge: Arc<dyn Forge>,
) -> Result<(), Box<dyn std::error::Error>> {
    info!(forge = forge.name(), "starting session");

    let mut terminal = tui::init()?;

    let (action_tx, mut action_rx) = mpsc::unbounded_channel::<Action>();

    let executor = Executor::new(
        forge,
        action_tx.clone(),
        ExecutorSettings {
            limit: config.github.limit,
            merge_method: config.github.merge_method,
            workflow: config.automation.workflow.clone(),
            git_ref: config.automation.git_ref.clone(),
        },
    );

    let mut app = App::new(
        store,
        SessionSettings {
            needs_review_query: config.github.queries.needs_review.clone(),
            mine_query: config.github.queries.my_prs.clone(),
            refresh_interval: config.refresh_interval(),
        },
    );

    let size = terminal.size()?;
    action_tx.send(Action::Resized(size.width, size.height))?;

    let tick_rate = Duration::from_millis(250);
    let render_rate = Duration::from_millis(16); // ~60fps
    let mut events = EventHandler::new(tick_rate, render_rate);

    // Main loop
    loop {
        tokio::select! {
            Some(event) = events.next() => {
                match event {
                    Event::Render => {
                        terminal.draw(|frame| ui::render(frame, &app))?;
                    }
                    _ => {
                        let action = app.handle_event(event);
                        if !matches!(action, Action::None) {
                            action_tx.send(action)?;
                        }
                    }
                }
            }
            Some(action) = action_rx.recv() => {
                for command in app.update(action) {
                    executor.execute(command);
                }
            }
        }

        if app.should_quit {
            break;
        }
    }

    // In-flight commands are abandoned; their results have nowhere to go.
    drop(events);
    if let Err(e) = app.into_store().close() {
        warn!(error = %e, "failed to close status store");
    }

    Ok(())
}
