mod backends;
mod keymap;
mod runner;
mod ui;

use std::fs::{self, OpenOptions};
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use crossterm::{
    event::{self, Event as CEvent},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use kairos_core::app::{AppEvent, AppState, Effect, Settings};
use kairos_core::backend::Backend;
use kairos_core::config::{ConfigError, ConnectionProfile, Credentials};

use backends::{DemoBackend, HttpBackend};
use runner::EffectRunner;
use ui::ViewState;

const LOG_ENV: &str = "KAIROS_LOG";

#[derive(Parser)]
#[command(name = "kairos")]
#[command(about = "Watch and operate on workflow executions", long_about = None)]
struct Cli {
    /// Credentials profile to connect with
    #[arg(short, long, default_value = "default")]
    namespace: String,

    /// Connect to a development server on localhost
    #[arg(long, conflicts_with = "demo")]
    local: bool,

    /// Run against built-in sample executions
    #[arg(long)]
    demo: bool,

    /// Credentials file (defaults to ~/.config/kairos/credentials)
    #[arg(long)]
    credentials: Option<PathBuf>,
}

#[derive(Debug)]
enum StartupError {
    Config(ConfigError),
    Backend(kairos_core::backend::BackendError),
}

impl std::fmt::Display for StartupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StartupError::Config(e) => write!(f, "{}", e),
            StartupError::Backend(e) => write!(f, "could not connect: {}", e),
        }
    }
}

/// Logs go to a file so they never interleave with the UI
fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let file = dirs::cache_dir()
        .map(|dir| dir.join("kairos"))
        .and_then(|dir| {
            fs::create_dir_all(&dir).ok()?;
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(dir.join("kairos.log"))
                .ok()
        });
    match file {
        Some(file) => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init();
        }
        None => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::sink)
                .try_init();
        }
    }
}

fn connect(cli: &Cli) -> Result<(Arc<dyn Backend>, ConnectionProfile), StartupError> {
    if cli.demo {
        return Ok((Arc::new(DemoBackend::new()), ConnectionProfile::local()));
    }
    let profile = if cli.local {
        ConnectionProfile::local()
    } else {
        let path = match &cli.credentials {
            Some(path) => path.clone(),
            None => Credentials::default_path().map_err(StartupError::Config)?,
        };
        Credentials::load(&path)
            .and_then(|creds| creds.profile(&cli.namespace))
            .map_err(StartupError::Config)?
    };
    let backend = HttpBackend::connect(&profile).map_err(StartupError::Backend)?;
    Ok((Arc::new(backend), profile))
}

// --- Terminal setup/teardown ---
fn setup_terminal() -> io::Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend)
}

fn restore_terminal(mut terminal: Terminal<CrosstermBackend<io::Stdout>>) -> io::Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

#[tokio::main]
async fn main() -> io::Result<()> {
    let cli = Cli::parse();
    init_logging();

    let (backend, profile) = match connect(&cli) {
        Ok(pair) => pair,
        Err(e) => {
            error!(error = %e, "startup failed");
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    info!(
        backend = backend.name(),
        host = %profile.host,
        namespace = %profile.namespace,
        "starting"
    );

    let mut terminal = setup_terminal()?;
    let result = run_tui(&mut terminal, backend, &profile).await;
    restore_terminal(terminal)?;
    result
}

async fn run_tui(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    backend: Arc<dyn Backend>,
    profile: &ConnectionProfile,
) -> io::Result<()> {
    let backend_name = backend.name();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<AppEvent>();
    let runner = EffectRunner::new(backend, event_tx);

    let mut app = AppState::new(profile.viewer_links(), Settings::default());
    let mut view = ViewState::default();

    let mut pending = app.init();
    loop {
        // Apply effects, then any results that arrived since the last frame
        for effect in pending.drain(..) {
            if effect == Effect::Quit {
                info!("quit");
                return Ok(());
            }
            runner.dispatch(effect);
        }
        while let Ok(event) = event_rx.try_recv() {
            pending.extend(app.update(event));
        }
        if !pending.is_empty() {
            continue;
        }

        terminal.draw(|f| ui::draw(f, &app, &mut view, backend_name, Utc::now()))?;

        // Key polling blocks the thread, so hand it to the blocking pool
        let key = tokio::task::block_in_place(|| -> io::Result<Option<CEvent>> {
            if event::poll(Duration::from_millis(50))? {
                event::read().map(Some)
            } else {
                Ok(None)
            }
        })?;
        let Some(CEvent::Key(key)) = key else {
            continue;
        };
        if let Some(action) = keymap::map_key(key, &app) {
            pending.extend(app.update(AppEvent::Input(action)));
        }
    }
}
