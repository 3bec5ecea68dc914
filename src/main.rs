mod actions;
mod app;
mod backend;
mod config;
mod dashboard;
mod directory;
mod domain;
mod error;
mod feed;
mod forms;
mod handlers;
mod infra;
mod loading;
mod logging;
mod table;
mod terminal;
mod tree;
mod ui;

use crate::actions::refresh_all;
use crate::app::{App, BackendEvent, BackendTask};
use crate::backend::worker_loop;
use crate::config::AppConfig;
use crate::feed::run_transaction_feed;
use crate::handlers::{handle_backend_event, handle_key_event};
use crate::infra::{ConsoleApi, HttpConsoleClient, Session};
use crate::terminal::{install_panic_hook, restore_terminal, setup_terminal};
use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyEventKind};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = match AppConfig::load_or_default() {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("failed to load config, using defaults: {err:#}");
            AppConfig::default()
        }
    };

    if let Err(err) = logging::init_tracing(&config) {
        eprintln!("file logging disabled: {err:#}");
    }

    let session = Session::from_config(&config);
    let client = HttpConsoleClient::from_config(&config, session.clone())
        .context("failed to create backend client")?;
    info!(
        base_url = %client.base_url(),
        authenticated = session.is_authenticated(),
        "starting console"
    );

    install_panic_hook();
    setup_terminal()?;
    let mut terminal =
        Terminal::new(CrosstermBackend::new(io::stdout())).context("failed to create terminal")?;

    let run_result = run_app(&mut terminal, config, Arc::new(client)).await;

    restore_terminal(&mut terminal)?;
    if let Err(err) = run_result {
        eprintln!("{err:#}");
        std::process::exit(1);
    }

    Ok(())
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    config: AppConfig,
    client: Arc<dyn ConsoleApi>,
) -> Result<()> {
    let mut app = App::new(config);

    let (task_tx, task_rx) = mpsc::unbounded_channel::<BackendTask>();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<BackendEvent>();

    let worker = tokio::spawn(worker_loop(client, task_rx, event_tx.clone()));
    let feed = tokio::spawn(run_transaction_feed(
        app.config.websocket_url.clone(),
        event_tx,
    ));

    refresh_all(&mut app, &task_tx)?;

    let result = event_loop(terminal, &mut app, &task_tx, &mut event_rx);

    // Closing the task channel makes the worker abort in-flight requests.
    drop(task_tx);
    feed.abort();
    app.loads.cancel_all();
    if let Err(err) = worker.await
        && !err.is_cancelled()
    {
        warn!(error = %err, "backend worker ended abnormally");
    }

    app.config.start_view = app.view.key().to_string();
    if let Err(err) = app.config.save() {
        warn!(error = %err, "failed to save config");
    }
    info!("console stopped");

    result
}

fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    task_tx: &mpsc::UnboundedSender<BackendTask>,
    event_rx: &mut mpsc::UnboundedReceiver<BackendEvent>,
) -> Result<()> {
    while !app.should_quit {
        while let Ok(event) = event_rx.try_recv() {
            handle_backend_event(app, task_tx, event)?;
        }

        terminal.draw(|frame| ui::draw(frame, app))?;

        if event::poll(Duration::from_millis(100)).context("event poll failed")?
            && let Event::Key(key) = event::read().context("event read failed")?
            && key.kind == KeyEventKind::Press
        {
            handle_key_event(app, key, task_tx)?;
        }
    }
    Ok(())
}
