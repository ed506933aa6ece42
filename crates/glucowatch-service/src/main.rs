//! glucowatch - sensor status and glucose alerts from the terminal.
//!
//! Run with: `cargo run -p glucowatch-service -- status`

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use glucowatch_core::{
    AlertPrompt, GlucoseAlert, GlucoseReading, Monitor, MonitorEvent, ReadingSource, ScanOutcome,
    SensorAlert, SensorScan, SensorStatus,
};
use glucowatch_service::{Config, SqliteBackend, TerminalPrompt, Ticker, build_monitor};
use glucowatch_store::{ReadingQuery, Store};

/// glucowatch - CGM sensor status and glucose alerts.
#[derive(Parser, Debug)]
#[command(name = "glucowatch")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database path (overrides config).
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// User id (overrides config).
    #[arg(short, long, global = true)]
    user: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Activate a new sensor.
    Activate {
        /// Sensor serial number.
        serial: String,
    },

    /// Record a successful scan of a sensor.
    Scan {
        /// Sensor serial number.
        serial: String,
    },

    /// Mark the sensor as disconnected.
    Disconnect,

    /// Show the current sensor status and its alerts.
    Status {
        /// Output JSON.
        #[arg(long)]
        json: bool,
    },

    /// Report a measured battery level.
    Battery {
        /// Battery percentage (0-100).
        level: u8,
    },

    /// Submit a glucose reading and handle any resulting alert.
    Reading {
        /// Glucose value in mg/dL.
        value: f64,

        /// Note to store with the reading.
        #[arg(long)]
        comment: Option<String>,

        /// Id of an already-persisted reading.
        #[arg(long)]
        id: Option<String>,

        /// Acknowledge any alert without prompting.
        #[arg(short, long)]
        yes: bool,
    },

    /// Show stored readings.
    History {
        /// Maximum number of readings.
        #[arg(short, long, default_value_t = 20)]
        limit: u32,

        /// Only readings that raised an alert.
        #[arg(long)]
        alerts: bool,
    },

    /// Keep the sensor status current and log alerts until interrupted.
    Run,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("glucowatch=info".parse()?),
        )
        .init();

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default().unwrap_or_default(),
    };
    if let Some(db_path) = args.database {
        config.storage.path = db_path;
    }
    if let Some(user) = args.user {
        config.sensor.user_id = Some(user);
    }
    config.validate()?;

    debug!("Opening database at {:?}", config.storage.path);
    let store = Store::open(&config.storage.path)?;
    let backend = Arc::new(SqliteBackend::new(store));

    let interactive = matches!(args.command, Command::Reading { yes: false, .. });
    if interactive && !std::io::stdin().is_terminal() {
        bail!("stdin is not a terminal; pass --yes to acknowledge alerts automatically");
    }
    let prompt: Option<Arc<dyn AlertPrompt>> = if interactive {
        Some(Arc::new(TerminalPrompt))
    } else {
        None
    };

    let monitor = build_monitor(&config, Arc::clone(&backend), prompt)?;
    let user_id = config.sensor.user_id.clone();
    monitor.status().restore(user_id.as_deref()).await;

    let result = match args.command {
        Command::Activate { serial } => {
            let status = monitor
                .status()
                .activate(&serial, user_id.as_deref())
                .await;
            println!("Activated sensor {}", serial);
            print_status(&status, &monitor).await;
            Ok(())
        }
        Command::Scan { serial } => {
            let outcome = monitor
                .status()
                .record_scan(&SensorScan::new(&serial), user_id.as_deref())
                .await;
            match outcome {
                ScanOutcome::Activated => println!("Activated sensor {}", serial),
                ScanOutcome::Reconnected => println!("Sensor {} reconnected", serial),
                ScanOutcome::Refreshed => println!("Sensor {} scanned", serial),
            }
            Ok(())
        }
        Command::Disconnect => {
            monitor.status().update_connection_status(false).await;
            print_status(&monitor.status().get_status().await, &monitor).await;
            Ok(())
        }
        Command::Status { json } => {
            let status = monitor.status().get_status().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status, &monitor).await;
            }
            Ok(())
        }
        Command::Battery { level } => {
            let status = monitor.status().report_battery(level).await;
            print_status(&status, &monitor).await;
            Ok(())
        }
        Command::Reading {
            value,
            comment,
            id,
            yes,
        } => {
            let user_id = user_id.context("No user id: pass --user or set sensor.user_id")?;
            let mut reading = GlucoseReading::new(user_id, value, OffsetDateTime::now_utc())
                .with_source(ReadingSource::Manual);
            if let Some(comment) = comment {
                reading = reading.with_comment(comment);
            }
            if let Some(id) = id {
                reading = reading.with_id(id);
            }
            submit_reading(&monitor, &backend, reading, yes).await
        }
        Command::History { limit, alerts } => {
            show_history(&backend, user_id.as_deref(), limit, alerts).await
        }
        Command::Run => run(&monitor, &config).await,
    };

    monitor.status().flush().await;
    result
}

async fn submit_reading(
    monitor: &Monitor,
    backend: &SqliteBackend,
    reading: GlucoseReading,
    auto_acknowledge: bool,
) -> anyhow::Result<()> {
    if !reading.has_valid_value() {
        bail!("Invalid glucose value: {}", reading.value);
    }

    if auto_acknowledge {
        monitor.register_alert_callback(Arc::new(|alert: &GlucoseAlert| {
            println!("{}: {}", alert.title(), alert.message());
        }));
    }
    let mut rx = monitor.subscribe();

    let Some(alert) = monitor.process_reading(reading.clone()) else {
        let id = backend
            .store()
            .await
            .insert_reading(&reading.user_id, &reading)?;
        println!("Recorded {} mg/dL (in range) as {}", reading.value, id);
        return Ok(());
    };

    if auto_acknowledge {
        match monitor.acknowledge(&alert).await {
            Some(outcome) => println!("Acknowledged: {:?}", outcome),
            None => warn!("Alert {} was no longer active", alert.id),
        }
        return Ok(());
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                bail!("{} was not acknowledged", alert.title());
            }
            event = rx.recv() => match event {
                Ok(MonitorEvent::GlucoseAlertCommitted { id, record_id }) if id == alert.id => {
                    match record_id {
                        Some(record_id) => println!("Acknowledged, saved as {}", record_id),
                        None => warn!("Acknowledged, but the reading could not be saved"),
                    }
                    return Ok(());
                }
                Ok(_) => {}
                Err(RecvError::Lagged(n)) => warn!("Missed {} events", n),
                Err(RecvError::Closed) => bail!("Event bus closed before acknowledgement"),
            }
        }
    }
}

async fn show_history(
    backend: &SqliteBackend,
    user_id: Option<&str>,
    limit: u32,
    alerts_only: bool,
) -> anyhow::Result<()> {
    let mut query = ReadingQuery::new().limit(limit);
    if let Some(user_id) = user_id {
        query = query.user(user_id);
    }
    if alerts_only {
        query = query.alerts_only();
    }

    let readings = backend.store().await.query_readings(&query)?;
    if readings.is_empty() {
        println!("No readings");
        return Ok(());
    }

    for reading in readings {
        println!(
            "{}  {:>6.1} mg/dL  {}{}",
            format_time(reading.timestamp),
            reading.value,
            if reading.is_alert { "ALERT " } else { "" },
            reading.comment.as_deref().unwrap_or(""),
        );
    }
    Ok(())
}

async fn run(monitor: &Monitor, config: &Config) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let ticker = Ticker::new(
        monitor.clone(),
        StdDuration::from_secs(config.sensor.tick_interval_secs),
    )
    .start(cancel.clone());

    let mut rx = monitor.subscribe();
    for alert in monitor.ledger().unread().await {
        log_sensor_alert(&alert);
    }

    info!("Watching sensor status (Ctrl-C to stop)");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = rx.recv() => match event {
                Ok(MonitorEvent::SensorAlert { alert }) => log_sensor_alert(&alert),
                Ok(MonitorEvent::ConnectionStatusChanged { connected }) => {
                    info!("Sensor {}", if connected { "connected" } else { "disconnected" });
                }
                Ok(event) => debug!("{:?}", event),
                Err(RecvError::Lagged(n)) => warn!("Missed {} events", n),
                Err(RecvError::Closed) => break,
            }
        }
    }

    cancel.cancel();
    ticker.await?;
    Ok(())
}

fn log_sensor_alert(alert: &SensorAlert) {
    warn!("[{}] {}", alert.alert_type.as_str(), alert.message);
}

async fn print_status(status: &SensorStatus, monitor: &Monitor) {
    let now = OffsetDateTime::now_utc();
    let Some(serial) = status.serial_number.as_deref() else {
        println!("No sensor activated");
        return;
    };

    println!("Sensor:     {}", serial);
    println!("User:       {}", status.user_id.as_deref().unwrap_or("-"));
    println!(
        "Connected:  {}",
        if status.is_connected { "yes" } else { "no" }
    );
    println!(
        "Battery:    {}",
        status
            .battery_level
            .map(|level| format!("{}%", level))
            .unwrap_or_else(|| "-".to_string())
    );
    println!("Activated:  {}", format_optional_time(status.activation_date));
    println!(
        "Expires:    {} ({})",
        format_optional_time(status.expiration_date),
        status
            .time_remaining(now)
            .map(format_remaining)
            .unwrap_or_else(|| "-".to_string())
    );
    println!("Last scan:  {}", format_optional_time(status.last_scan_time));

    let alerts = monitor.ledger().unread().await;
    if !alerts.is_empty() {
        println!();
        for alert in alerts {
            println!("[{}] {}", alert.alert_type.as_str(), alert.message);
        }
    }
}

fn format_remaining(remaining: Duration) -> String {
    if remaining <= Duration::ZERO {
        return "expired".to_string();
    }
    format!(
        "{}d {}h remaining",
        remaining.whole_days(),
        remaining.whole_hours() % 24
    )
}

fn format_time(time: OffsetDateTime) -> String {
    time.format(&Rfc3339).unwrap_or_else(|_| time.to_string())
}

fn format_optional_time(time: Option<OffsetDateTime>) -> String {
    time.map(format_time).unwrap_or_else(|| "-".to_string())
}
