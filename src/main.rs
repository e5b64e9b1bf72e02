use std::{process, sync::Arc, time::Instant};

use clap::{Parser, ValueHint};
use log::{debug, error, info, trace, warn, LevelFilter};
use tokio::sync::mpsc;

use subtone::{
    audio::RodioBackend,
    config::Config,
    error::Error,
    events::Event,
    gateway::Gateway,
    player::Player,
    session::{Secrets, Session},
    settings::SettingsFile,
    subsonic::{ServerLink, Subsonic},
    track::Track,
};

/// Profile to display when not built in release mode.
#[cfg(debug_assertions)]
const BUILD_PROFILE: &str = "debug";
/// Profile to display when built in release mode.
#[cfg(not(debug_assertions))]
const BUILD_PROFILE: &str = "release";

/// Group name for mutually exclusive logging options.
const ARGS_GROUP_LOGGING: &str = "logging";

/// Command line arguments as parsed by `clap`.
#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Secrets file
    ///
    /// TOML file with the server URL and account credentials. Keep it
    /// secure and do not share it publicly: it grants access to your
    /// music server account.
    #[arg(short, long, value_name = "FILE", value_hint = ValueHint::FilePath, default_value_t = String::from("secrets.toml"))]
    secrets_file: String,

    /// Settings file
    ///
    /// Where the player persists its volume between runs.
    #[arg(long, value_name = "FILE", value_hint = ValueHint::FilePath, default_value_t = String::from("settings.toml"))]
    settings_file: String,

    /// Clear the server-side play queue and exit
    #[arg(long, default_value_t = false)]
    clear_queue: bool,

    /// Restore the server queue but do not start playing
    #[arg(long, default_value_t = false)]
    no_resume: bool,

    /// Suppresses all output except warnings and errors.
    #[arg(short, long, default_value_t = false, group = ARGS_GROUP_LOGGING)]
    quiet: bool,

    /// Enable verbose logging
    ///
    /// Specify twice for trace logging.
    #[arg(short, long, action = clap::ArgAction::Count, group = ARGS_GROUP_LOGGING)]
    verbose: u8,
}

/// Initializes the logger facade.
///
/// The logging level is determined as follows, in order of precedence from
/// highest to lowest:
/// 1. Command line arguments
/// 2. `RUST_LOG` environment variable
/// 3. Hard coded default
fn init_logger(config: &Args) {
    let mut logger = env_logger::Builder::from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    if config.quiet || config.verbose > 0 {
        let level = match config.verbose {
            0 => {
                // Quiet and verbose are mutually exclusive, and `verbose` is 0
                // by default. So this arm means: quiet mode.
                LevelFilter::Warn
            }
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };

        // Filter log messages of external crates.
        logger.filter_module(module_path!(), level);
    }

    logger.init();
}

/// Authenticates against the server.
///
/// Prefers the native login, which yields both the bearer token and the
/// server-computed Subsonic token pair. When the native endpoint is
/// unavailable, falls back to deriving the Subsonic pair locally; the
/// queue endpoints are out of reach in that mode, but streaming and
/// scrobbling keep working.
async fn authenticate(gateway: &mut Gateway, config: &Config) -> Session {
    match gateway.login().await {
        Ok(session) => session.clone(),
        Err(e) => {
            warn!("native login failed ({e}); deriving Subsonic tokens locally");
            Session::with_derived_token(&config.credentials)
        }
    }
}

/// Main application loop.
async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let secrets = Secrets::from_file(&args.secrets_file).map_err(|e| {
        info!("see the documentation on how to set up {}", args.secrets_file);
        e
    })?;

    let config = Config::new(secrets.server.clone(), secrets.credentials());
    let mut gateway = Gateway::new(&config)?;

    let session = authenticate(&mut gateway, &config).await;
    gateway.set_session(session.clone());

    let mut subsonic = Subsonic::new(&config)?;
    subsonic.set_session(session);
    let subsonic = Arc::new(subsonic);

    // Validate connectivity early so misconfiguration surfaces as one
    // clear error instead of a failed stream later.
    subsonic.ping().await?;

    if args.clear_queue {
        gateway.clear_queue().await?;
        return Ok(());
    }

    let (engine_tx, mut engine_rx) = mpsc::unbounded_channel();
    let mut player = Player::new(
        Box::new(RodioBackend::new()?),
        Box::new(ServerLink::new(Arc::clone(&subsonic))),
        Box::new(SettingsFile::new(&args.settings_file)),
        engine_tx,
    );
    let mut ui = player.subscribe();

    // Bridge the server-persisted queue into local state. A fetch failure
    // falls back to an empty queue rather than blocking startup.
    match gateway.queue().await {
        Ok(queue) if !queue.items.is_empty() => {
            let current = queue.current_index();
            let position = queue.elapsed();
            let tracks: Vec<Track> = queue.items.into_iter().map(Track::from).collect();
            info!("restoring {} queued tracks", tracks.len());
            player.restore_queue(tracks, current, position)?;
        }
        Ok(_) => info!("server queue is empty"),
        Err(e) => warn!("could not restore server queue: {e}"),
    }

    if args.no_resume {
        info!("queue restored; not resuming playback");
    } else if player.current_track().is_some() {
        player.toggle_play(None)?;
    } else {
        info!("nothing to play");
    }

    loop {
        let deadline = player.next_deadline();
        tokio::select! {
            // Prioritize shutdown signals.
            biased;

            _ = tokio::signal::ctrl_c() => {
                info!("shutting down gracefully");
                player.stop();
                break Ok(());
            }

            event = engine_rx.recv() => match event {
                Some(event) => player.handle_event(event),
                None => break Err(Box::from(Error::internal("engine event channel closed"))),
            },

            Some(event) = ui.recv() => log_event(&player, &event),

            () = wait_until(deadline) => player.poll_timers(Instant::now()),
        }
    }
}

/// Sleeps until the orchestrator's next timer, or forever when none is
/// pending.
async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => {
            tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await;
        }
        None => std::future::pending().await,
    }
}

/// Narrates player events for the headless console.
fn log_event(player: &Player, event: &Event) {
    match event {
        Event::TrackChanged(track) => {
            let title = player
                .queue()
                .current_track()
                .map_or_else(|| track.to_string(), ToString::to_string);
            info!("now playing: {title}");
        }
        Event::Play => debug!("playback started"),
        Event::Pause => debug!("playback paused"),
        Event::Progress { position, duration } => {
            trace!("position {position:?} of {duration:?}");
        }
    }
}

/// Main entry point of the application.
///
/// Initializes the logger facade, parses the command line arguments, and
/// starts the main application loop.
#[tokio::main]
async fn main() {
    // `clap` handles our command line arguments and help text.
    let args = Args::parse();
    init_logger(&args);

    // Dump command line arguments before we do anything more.
    // This aids in debugging of whatever comes next.
    debug!("Command {args:#?}");

    info!(
        "starting {}/{}; {BUILD_PROFILE}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    if let Err(e) = run(args).await {
        error!("{e}");
        process::exit(1);
    }
}
