//! Steamworks presence watcher
//!
//! Command-line front end for the steamworks-bridge library. Starts a Steam
//! session and prints every persona state change until Steam shuts down,
//! Ctrl-C is pressed, or the requested duration elapses.

use anyhow::{Context, Result};
use clap::Parser;
use futures::stream::{self, BoxStream, StreamExt};
use log::LevelFilter;
use std::io;
use std::path::PathBuf;
use steamworks_bridge::{Client, PersonaStateChange};

mod config;
mod report;

use config::{AppConfig, WatchConfig};
use report::{EventReporter, OutputFormat};

/// Steamworks presence watcher - print presence and shutdown events
#[derive(Parser, Debug)]
#[command(name = "steamworks-cli")]
#[command(about = "Watch Steam presence and shutdown events", long_about = None)]
#[command(version)]
struct Args {
    /// Path to the steam_api shared library
    #[arg(long, value_name = "PATH")]
    lib: Option<PathBuf>,

    /// App id to run as (exported as SteamAppId)
    #[arg(long, value_name = "ID")]
    app_id: Option<u32>,

    /// Path to configuration file (TOML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Stop after this many seconds
    #[arg(short, long, value_name = "SECS")]
    duration: Option<u64>,

    /// Print events as JSON lines
    #[arg(long)]
    json: bool,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    /// Command-line flags win over the config file
    fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(lib) = &self.lib {
            config.bridge.library_path = Some(lib.clone());
        }
        if let Some(app_id) = self.app_id {
            config.bridge.app_id = Some(app_id);
        }
        if let Some(duration) = self.duration {
            config.watch.duration_secs = Some(duration);
        }
        if self.json {
            config.watch.json = true;
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    log::info!("Steamworks CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using bridge library v{}", steamworks_bridge::VERSION);

    let mut config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => AppConfig::default(),
    };
    args.apply_overrides(&mut config);
    log::debug!("Effective configuration: {:?}", config);

    // Session first: init may export SteamAppId, which needs a single-threaded process
    let client = Client::init(&config.bridge).context("Failed to start Steam session")?;
    match client.app_id() {
        Ok(app_id) => log::info!("Session running as app {}", app_id),
        Err(e) => log::warn!("Could not query app id: {}", e),
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let format = if config.watch.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };
    let mut reporter = EventReporter::new(format, io::stdout());

    runtime.block_on(watch(&client, &config.watch, &mut reporter))?;

    log::info!("Observed {} persona state changes", reporter.persona_changes());
    Ok(())
}

/// Print events until shutdown, Ctrl-C or the deadline
async fn watch<W: io::Write>(
    client: &Client,
    watch: &WatchConfig,
    reporter: &mut EventReporter<W>,
) -> Result<()> {
    let mut presence: BoxStream<'static, PersonaStateChange> = if watch.persona {
        client.on_persona_state_changed().boxed()
    } else {
        stream::pending().boxed()
    };
    let mut shutdown: BoxStream<'static, ()> = if watch.shutdown {
        client.on_steam_shutdown().boxed()
    } else {
        stream::pending().boxed()
    };

    let duration = watch.duration();
    let deadline = async move {
        match duration {
            Some(duration) => tokio::time::sleep(duration).await,
            None => futures::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            Some(change) = presence.next() => {
                reporter.persona_state_change(chrono::Local::now(), &change)?;
            }
            Some(()) = shutdown.next() => {
                reporter.steam_shutdown(chrono::Local::now())?;
                break;
            }
            _ = &mut deadline => {
                log::info!("Watch duration elapsed");
                break;
            }
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl-C")?;
                log::info!("Interrupted");
                break;
            }
        }
    }

    Ok(())
}

/// Log level for this workspace's crates: `-q` errors only, `-v` adds
/// registration traffic, `-vv` every delivered callback
fn log_level(verbose: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::Error;
    }
    match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Initialize logging based on verbosity level
///
/// Only the bridge and the CLI follow `-v`; dependencies such as tokio stay at
/// warn. `RUST_LOG` still overrides both.
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use std::io::Write;

    let level = log_level(verbose, quiet);

    Builder::new()
        .filter_level(LevelFilter::Warn)
        .filter_module("steamworks_bridge", level)
        .filter_module("steamworks_cli", level)
        .parse_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {:<5} {}] {}",
                chrono::Local::now().format("%H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let args = Args::parse_from([
            "steamworks-cli",
            "--lib",
            "/tmp/libsteam_api.so",
            "--app-id",
            "480",
            "--duration",
            "5",
            "--json",
        ]);
        let mut config: AppConfig = toml::from_str(
            r#"
            [bridge]
            app_id = 730

            [watch]
            duration_secs = 60
        "#,
        )
        .unwrap();

        args.apply_overrides(&mut config);
        assert_eq!(config.bridge.app_id, Some(480));
        assert_eq!(config.bridge.library_path, Some(PathBuf::from("/tmp/libsteam_api.so")));
        assert_eq!(config.watch.duration_secs, Some(5));
        assert!(config.watch.json);
    }

    #[test]
    fn test_log_level_mapping() {
        assert_eq!(log_level(0, false), LevelFilter::Info);
        assert_eq!(log_level(1, false), LevelFilter::Debug);
        assert_eq!(log_level(3, false), LevelFilter::Trace);
        assert_eq!(log_level(2, true), LevelFilter::Error);
    }

    #[test]
    fn test_config_kept_without_flags() {
        let args = Args::parse_from(["steamworks-cli", "-vv"]);
        assert_eq!(args.verbose, 2);

        let mut config = AppConfig::default();
        config.bridge.app_id = Some(730);
        args.apply_overrides(&mut config);
        assert_eq!(config.bridge.app_id, Some(730));
        assert!(config.watch.duration_secs.is_none());
    }
}
