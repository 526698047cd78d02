//! `dmxmon`: live terminal view of the DMX universe seen by a DMX USB Pro.
//!
//! Built on [ratatui](https://ratatui.rs). The live monitor only ever shows
//! a virtual device, never real hardware: `u` plugs and unplugs it, space
//! pauses the view, `q` quits. `--list-devices` scans the real serial ports
//! instead and prints every DMX USB Pro found.
//!
//! Logs are written to a file (default `/tmp/dmxmon.log`) to avoid
//! corrupting the terminal UI.

mod app;
mod event;
mod theme;
mod tui;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::Result;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use dmxmon_core::sim::VirtualRig;
use dmxmon_core::{Discovery, DiscoveryError, SerialPortEnumerator};

use crate::app::App;

/// Terminal monitor for the DMX input of a DMX USB Pro.
#[derive(Parser, Debug)]
#[command(
    name = "dmxmon",
    version,
    about,
    after_help = "The live monitor runs against a virtual DMX USB Pro (/dev/ttyVIRT0). \
                  Real devices are only scanned by --list-devices."
)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(short = 'c', long, env = "DMXMON_CONFIG")]
    config: Option<PathBuf>,

    /// Print the DMX USB Pro devices on the serial ports and exit
    #[arg(long)]
    list_devices: bool,

    /// Start the virtual device without the chase pattern
    #[arg(long)]
    no_chase: bool,

    /// Log file path (defaults to /tmp/dmxmon.log)
    #[arg(long, default_value = "/tmp/dmxmon.log")]
    log_file: PathBuf,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Set up file-based tracing. We MUST NOT log to stdout/stderr, that would
/// corrupt the TUI output. Returns a guard that must be held for the
/// lifetime of the application to ensure logs are flushed.
fn setup_tracing(cli: &Cli) -> WorkerGuard {
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("dmxmon={log_level},dmxmon_core={log_level}"))
    });

    let log_dir = cli
        .log_file
        .parent()
        .unwrap_or(std::path::Path::new("/tmp"));
    let log_filename = cli
        .log_file
        .file_name()
        .unwrap_or(std::ffi::OsStr::new("dmxmon.log"));

    let file_appender = tracing_appender::rolling::never(log_dir, log_filename);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true),
        )
        .init();

    guard
}

/// Scan the real serial ports and print the catalog.
fn list_devices() -> Result<()> {
    let discovery = Discovery::new(Arc::new(SerialPortEnumerator));
    match discovery.list_devices() {
        Ok(catalog) => print!("{catalog}"),
        Err(DiscoveryError::NoDeviceFound) => println!("no DMX USB Pro device found"),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Install panic/error hooks BEFORE entering the terminal
    tui::install_hooks()?;

    // Tracing to file; hold the guard so logs flush on exit
    let _log_guard = setup_tracing(&cli);

    if cli.list_devices {
        return list_devices();
    }

    let config = dmxmon_config::load_config(cli.config.as_deref())?;
    info!(?config, "configuration loaded");

    let rig = if cli.no_chase {
        VirtualRig::new()
    } else {
        VirtualRig::with_chase()
    };

    let mut app = App::new(config.to_settings(), Arc::new(rig));
    app.run().await
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn help_says_the_monitor_is_virtual() {
        let help = Cli::command().render_help().to_string();
        assert!(help.contains("/dev/ttyVIRT0"));
        assert!(help.contains("--list-devices"));
    }

    #[test]
    fn defaults() {
        let cli = Cli::parse_from(["dmxmon"]);
        assert!(!cli.list_devices);
        assert!(!cli.no_chase);
        assert_eq!(cli.log_file, PathBuf::from("/tmp/dmxmon.log"));
    }
}
