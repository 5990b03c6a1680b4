use clap::{Parser, Subcommand};
use crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, KeyboardEnhancementFlags,
        PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
    },
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Terminal,
    backend::{Backend, CrosstermBackend},
};
use std::{error::Error, io, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

mod actions;
mod app;
mod config;
mod input;
mod integrations;
mod logging;
mod models;
mod policy;
mod runtime;
mod store;
mod sync;
mod ui;

use app::App;
use config::Config;
use integrations::google::GoogleTasksClient;
use integrations::oauth::{self, OAuthSettings, StaticToken, StoredTokenProvider, TokenProvider};
use sync::{SyncHandle, SyncSettings};

const ACCESS_TOKEN_ENV: &str = "TASKPANEL_ACCESS_TOKEN";

/// Google Tasks in a terminal panel.
#[derive(Parser, Debug)]
#[command(name = "taskpanel", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// Connect a Google account through the browser.
    Login,
    /// Forget the stored Google credentials.
    Logout,
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let data_dir = config::data_dir();
    if let Err(err) = logging::init(&data_dir) {
        eprintln!("taskpanel: logging disabled: {err}");
    }
    let config_path = config::config_path();
    let config = Config::load_from_path(&config_path);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()?;

    match cli.command {
        Some(CliCommand::Login) => runtime.block_on(login(&config)),
        Some(CliCommand::Logout) => logout(),
        None => {
            let _guard = runtime.enter();
            run_panel(&runtime, config, config_path)
        }
    }
}

async fn login(config: &Config) -> Result<(), Box<dyn Error>> {
    let oauth = OAuthSettings::from_config(&config.google);
    let session = oauth::start_login(&oauth).await?;

    println!("Opening your browser to authorize taskpanel.");
    println!("If it does not open, visit:\n\n  {}\n", session.auth_url);
    if let Err(err) = open::that(&session.auth_url) {
        warn!(error = %err, "failed to open browser");
    }
    println!("Waiting for Google on {} ...", session.listen_addr);

    oauth::complete_login(session, &oauth, &config::token_path(), oauth::LOGIN_TIMEOUT).await?;
    println!("Signed in. Run `taskpanel` to open your tasks.");
    Ok(())
}

fn logout() -> Result<(), Box<dyn Error>> {
    if oauth::remove_token(&config::token_path())? {
        println!("Signed out.");
    } else {
        println!("No stored Google account.");
    }
    Ok(())
}

fn credentials(config: &Config) -> Arc<dyn TokenProvider> {
    match std::env::var(ACCESS_TOKEN_ENV) {
        Ok(token) if !token.trim().is_empty() => {
            info!("using access token from {ACCESS_TOKEN_ENV}");
            Arc::new(StaticToken(token.trim().to_string()))
        }
        _ => Arc::new(StoredTokenProvider::new(
            config::token_path(),
            OAuthSettings::from_config(&config.google),
        )),
    }
}

fn run_panel(
    runtime: &tokio::runtime::Runtime,
    config: Config,
    config_path: std::path::PathBuf,
) -> Result<(), Box<dyn Error>> {
    let cancel = CancellationToken::new();
    let client = GoogleTasksClient::with_base_url(
        &config.google.api_base_url,
        credentials(&config),
        cancel.child_token(),
    )?;
    let handle = SyncHandle::spawn(
        Arc::new(client),
        SyncSettings::from_config(&config.sync),
        cancel,
    );
    let mut app = App::new(config, config_path, handle.sender(), handle.subscribe());
    info!("task panel started");

    // Initialize terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;

    // Not every terminal supports keyboard enhancement; the panel works without it.
    let _ = execute!(
        stdout,
        PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES)
    );

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, &mut app);

    // Restore terminal
    disable_raw_mode()?;
    let _ = execute!(terminal.backend_mut(), PopKeyboardEnhancementFlags);
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    runtime.block_on(handle.shutdown());
    info!("task panel stopped");

    if let Err(err) = res {
        println!("{:?}", err);
    }

    Ok(())
}

fn run_app<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> io::Result<()> {
    loop {
        runtime::tick(app);

        terminal.draw(|f| ui::ui(f, app))?;

        if event::poll(Duration::from_millis(100))? {
            let event = event::read()?;
            input::handle_event(app, event);
        }

        if app.should_quit {
            return Ok(());
        }
    }
}
