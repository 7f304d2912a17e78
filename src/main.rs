//! feedwatch - market-data feed liveness monitor
//!
//! Reads data events from stdin, raises an alert when the feed goes quiet for
//! longer than the configured timeout, and optionally keeps re-alerting while
//! the outage lasts.
//!
//! ## Usage
//!
//! ```bash
//! # Monitor a feed: one event per line, `<source>` or `<source> <epoch_millis>`
//! market-feed | feedwatch run
//!
//! # Configure alerts
//! feedwatch config set --timeout 45 --periodic 300 --bot-token 123:abc --chat-id -1001
//! feedwatch config set --time-range on --start 09:30 --end 16:00 --days 1,2,3,4,5
//! feedwatch config show
//!
//! # Check delivery
//! feedwatch test
//! feedwatch send "Feed maintenance at 17:00"
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, bail};
use chrono::{DateTime, Local, Utc};
use clap::{Args, Parser, Subcommand};
use feedwatch_config::{
    ConfigUpdate, Settings, SettingsEvent, SettingsWatcher, default_settings_path,
    format_time_of_day,
};
use feedwatch_core::{LogGuard, init_logging};
use feedwatch_monitor::{Monitor, gate};
use feedwatch_notify::notifier_for;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Market-data feed liveness monitor
///
/// Detects when a streaming feed stops updating and sends alerts through
/// Telegram, within an optional daily time window.
#[derive(Parser, Debug)]
#[command(name = "feedwatch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging (increases log level)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Directory for log files (defaults to ~/.feedwatch/logs/)
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Settings file (defaults to ~/.feedwatch/settings.yaml)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Monitor events read from stdin until EOF or Ctrl-C
    Run,

    /// Send the test message
    Test,

    /// Send a message to the configured chat
    Send {
        /// Message text
        #[arg(required = true, num_args = 1..)]
        message: Vec<String>,
    },

    /// Show or change settings
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Print the effective settings
    Show {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Change settings; invalid values are reported and left unchanged
    Set(SetArgs),
}

#[derive(Args, Debug)]
struct SetArgs {
    /// No-data timeout in seconds
    #[arg(long, allow_negative_numbers = true)]
    timeout: Option<i64>,

    /// Re-alert interval in seconds (0 disables)
    #[arg(long, allow_negative_numbers = true)]
    periodic: Option<i64>,

    /// Restrict alerts to the time window (on/off)
    #[arg(long, value_parser = parse_switch)]
    time_range: Option<bool>,

    /// Window start, 24-hour HH:mm
    #[arg(long)]
    start: Option<String>,

    /// Window end, 24-hour HH:mm
    #[arg(long)]
    end: Option<String>,

    /// Active weekdays, 1 (Monday) to 7 (Sunday), comma-separated
    #[arg(long)]
    days: Option<String>,

    /// Telegram bot token
    #[arg(long)]
    bot_token: Option<String>,

    /// Telegram chat id
    #[arg(long, allow_hyphen_values = true)]
    chat_id: Option<String>,
}

impl SetArgs {
    fn to_update(&self) -> ConfigUpdate {
        ConfigUpdate {
            timeout_seconds: self.timeout,
            periodic_seconds: self.periodic,
            time_range_enabled: self.time_range,
            start_time: self.start.clone(),
            end_time: self.end.clone(),
            active_days: self.days.clone(),
            malformed: Vec::new(),
        }
    }
}

fn parse_switch(value: &str) -> Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Ok(true),
        "off" | "false" | "no" | "0" => Ok(false),
        other => Err(format!("expected on or off, got '{other}'")),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _guard = match setup_logging(&cli) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return ExitCode::from(1);
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start async runtime: {}", e);
            return ExitCode::from(1);
        }
    };

    match runtime.block_on(run_command(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("feedwatch error: {:#}", e);
            eprintln!("Error: {:#}", e);
            if let Some(hint) = e
                .downcast_ref::<feedwatch_core::WatchError>()
                .and_then(|e| e.guidance())
            {
                eprintln!("Hint: {}", hint);
            }
            ExitCode::from(1)
        }
    }
}

/// Set up logging based on CLI arguments.
fn setup_logging(cli: &Cli) -> feedwatch_core::Result<LogGuard> {
    let debug = cli.verbose > 0;
    init_logging(cli.log_dir.clone(), debug)
}

async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let settings_path = match cli.settings {
        Some(path) => path,
        None => default_settings_path()?,
    };

    match cli.command {
        Command::Run => run_monitor(&settings_path).await,
        Command::Test => send_message(&settings_path, None).await,
        Command::Send { message } => send_message(&settings_path, Some(message.join(" "))).await,
        Command::Config { action } => match action {
            ConfigCommand::Show { json } => show_config(&settings_path, json),
            ConfigCommand::Set(args) => set_config(&settings_path, &args),
        },
    }
}

/// Monitor stdin until EOF or Ctrl-C, hot-reloading settings.
async fn run_monitor(settings_path: &Path) -> anyhow::Result<()> {
    let settings = Settings::load_from(settings_path);
    let notifier = notifier_for(&settings.bot_token, &settings.chat_id)
        .context("Failed to create notifier")?;

    let monitor = Monitor::new(settings.validated(), notifier);
    monitor.start_monitoring()?;
    println!("{}", monitor.describe_schedule_status());

    let (_watcher, mut reloads) = match SettingsWatcher::new(settings_path) {
        Ok((watcher, rx)) => (Some(watcher), Some(rx)),
        Err(e) => {
            warn!(error = %e, "Settings hot reload disabled");
            (None, None)
        }
    };

    let mut gate = monitor.subscribe_gate();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line.context("Failed to read events from stdin")? {
                    Some(line) => ingest(&monitor, &line),
                    None => {
                        info!("Event input closed");
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            Some(event) = next_reload(&mut reloads) => {
                if let Err(e) = handle_reload(&monitor, &settings, event) {
                    warn!(error = %e, "Reloaded settings partially rejected");
                }
            }
            Ok(()) = gate.changed() => {
                println!("{}", monitor.describe_schedule_status());
            }
        }
    }

    monitor.shutdown();
    Ok(())
}

async fn next_reload(rx: &mut Option<mpsc::Receiver<SettingsEvent>>) -> Option<SettingsEvent> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Apply a settings file change. Rejected fields keep their running value
/// and are returned.
fn handle_reload(
    monitor: &Monitor,
    startup: &Settings,
    event: SettingsEvent,
) -> feedwatch_core::Result<()> {
    match event {
        SettingsEvent::Reloaded { settings, update } => {
            if settings.bot_token != startup.bot_token || settings.chat_id != startup.chat_id {
                warn!("Telegram credentials changed, restart feedwatch to use them");
            }
            monitor.apply_update(&update)
        }
        SettingsEvent::Removed => {
            warn!("Settings file removed, keeping current configuration");
            Ok(())
        }
        SettingsEvent::Error { error } => {
            warn!(%error, "Settings file unreadable, keeping current configuration");
            Ok(())
        }
    }
}

/// A data event parsed from one input line.
#[derive(Debug, PartialEq, Eq)]
struct InputEvent<'a> {
    source: &'a str,
    timestamp: Option<DateTime<Utc>>,
}

/// Parse `<source>` or `<source> <epoch_millis>`. Blank lines yield `None`.
fn parse_event(line: &str) -> anyhow::Result<Option<InputEvent<'_>>> {
    let mut parts = line.split_whitespace();
    let Some(source) = parts.next() else {
        return Ok(None);
    };

    let timestamp = match parts.next() {
        Some(raw) => {
            let millis: i64 = raw
                .parse()
                .with_context(|| format!("'{raw}' is not an epoch timestamp in milliseconds"))?;
            let timestamp = DateTime::from_timestamp_millis(millis)
                .with_context(|| format!("timestamp {millis} is out of range"))?;
            Some(timestamp)
        }
        None => None,
    };

    if parts.next().is_some() {
        bail!("expected '<source>' or '<source> <epoch_millis>'");
    }

    Ok(Some(InputEvent { source, timestamp }))
}

fn ingest(monitor: &Monitor, line: &str) {
    match parse_event(line) {
        Ok(Some(InputEvent {
            source,
            timestamp: Some(timestamp),
        })) => monitor.record_event(source, timestamp),
        Ok(Some(InputEvent {
            source,
            timestamp: None,
        })) => monitor.record_event_now(source),
        Ok(None) => {}
        Err(e) => debug!(line, error = %e, "Skipping malformed event line"),
    }
}

/// Send the test message (`message = None`) or an operator message.
async fn send_message(settings_path: &Path, message: Option<String>) -> anyhow::Result<()> {
    let settings = Settings::load_from(settings_path);
    if !settings.has_credentials() {
        bail!("Telegram is not configured. Set it with `feedwatch config set --bot-token <TOKEN> --chat-id <CHAT>`");
    }

    let notifier = notifier_for(&settings.bot_token, &settings.chat_id)?;
    let monitor = Monitor::new(settings.validated(), notifier);

    let result = match &message {
        Some(message) => monitor.send_message(message).await,
        None => monitor.send_test_message().await,
    };
    if let Err(e) = result {
        let action = e.suggested_action();
        return Err(anyhow::Error::new(e).context(format!("Delivery failed. {action}")));
    }

    println!("Message sent to chat {}", settings.chat_id);
    Ok(())
}

fn show_config(settings_path: &Path, json: bool) -> anyhow::Result<()> {
    let mut settings = Settings::load_from(settings_path);
    let snapshot = settings.validated();
    let schedule_status = gate::describe(&snapshot.schedule, Local::now().naive_local());
    settings.bot_token = settings.masked_bot_token();

    if json {
        let value = serde_json::json!({
            "path": settings_path,
            "settings": settings,
            "schedule": schedule_status,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("Settings file:  {}", settings_path.display());
    println!("Timeout:        {}s", snapshot.monitor.timeout().as_secs());
    match snapshot.monitor.periodic() {
        Some(interval) => println!("Periodic:       every {}s", interval.as_secs()),
        None => println!("Periodic:       off"),
    }
    println!(
        "Time range:     {} ({}-{}, days {})",
        if snapshot.schedule.enabled { "on" } else { "off" },
        format_time_of_day(snapshot.schedule.start),
        format_time_of_day(snapshot.schedule.end),
        snapshot.schedule.active_days
    );
    println!("Bot token:      {}", settings.bot_token);
    println!(
        "Chat id:        {}",
        if settings.chat_id.is_empty() { "<unset>" } else { &settings.chat_id }
    );
    println!("Schedule:       {}", schedule_status);
    Ok(())
}

fn set_config(settings_path: &Path, args: &SetArgs) -> anyhow::Result<()> {
    let update = args.to_update();
    if update.is_empty() && args.bot_token.is_none() && args.chat_id.is_none() {
        bail!("Nothing to change. See `feedwatch config set --help`");
    }

    let mut settings = Settings::load_from(settings_path);
    let merged = settings.merge(&update);

    if let Some(token) = &args.bot_token {
        settings.bot_token = token.trim().to_string();
    }
    if let Some(chat_id) = &args.chat_id {
        settings.chat_id = chat_id.trim().to_string();
    }

    settings
        .save_to(settings_path)
        .with_context(|| format!("Failed to save {}", settings_path.display()))?;
    info!(path = %settings_path.display(), "Settings saved");

    match merged {
        Ok(()) => {
            println!("Settings saved to {}", settings_path.display());
            Ok(())
        }
        Err(e) => {
            println!("Valid changes saved to {}", settings_path.display());
            Err(e.into())
        }
    }
}
