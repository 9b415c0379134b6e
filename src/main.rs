use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use tokio_util::sync::CancellationToken;

use wxstation::{
    acquisition_loop, backup_loop, BackupOrchestrator, Clock, Database, DeviceConfig, SensorLink,
    ServiceController, SystemClock, SystemdServiceController,
};

#[derive(Parser)]
#[command(name = "wxstation", version, about = "Unattended weather-station appliance")]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Poll the sensor on the configured cadence and persist readings
    Acquire,
    /// Check hourly for a due backup and prune expired data
    Backup,
    /// Read the sensor once and print the decoded values
    Probe,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = DeviceConfig::load(&cli.config)?;

    match cli.command {
        Command::Acquire => run_acquisition(config).await,
        Command::Backup => run_backup(config).await,
        Command::Probe => probe(config).await,
    }
}

async fn run_acquisition(config: DeviceConfig) -> Result<()> {
    info!(
        "wxstation acquisition starting: device {}, port {}",
        config.device, config.port
    );

    let db = Database::new(config.database_path.clone())?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let cancel_token = CancellationToken::new();
    let worker = tokio::spawn(acquisition_loop(config, db, clock, cancel_token.clone()));

    wait_for_shutdown().await?;
    cancel_token.cancel();
    worker.await.context("acquisition loop task failed to join")
}

async fn run_backup(config: DeviceConfig) -> Result<()> {
    info!(
        "wxstation backup starting: storage {}, backups in {}",
        config.database_path.display(),
        config.backup_dir.display()
    );

    let db = Database::new(config.database_path.clone())?;
    let controller: Arc<dyn ServiceController> = Arc::new(SystemdServiceController);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let orchestrator = BackupOrchestrator::new(&config, db, controller, clock);

    let cancel_token = CancellationToken::new();
    let worker = tokio::spawn(backup_loop(orchestrator, cancel_token.clone()));

    wait_for_shutdown().await?;
    cancel_token.cancel();
    worker.await.context("backup loop task failed to join")
}

async fn probe(config: DeviceConfig) -> Result<()> {
    let link = Arc::new(SensorLink::new(&config.port, config.model));
    let raw = tokio::task::spawn_blocking(move || link.read())
        .await
        .context("sensor read task panicked")??;

    let decoded = config.model.decode_response(&raw)?;
    println!("temperature     {:>8.2} °C", decoded.temperature);
    println!("humidity        {:>8.2} %RH", decoded.humidity);
    println!("pressure        {:>8.1} hPa", decoded.pressure);
    println!("wind speed      {:>8.2} m/s", decoded.wind_speed);
    println!("wind direction  {:>8.1} °", decoded.wind_direction);
    println!("rain            {:>8.1} mm", decoded.rain);
    println!("solar radiation {:>8.0} W/m²", decoded.solar_radiation);
    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received");
    Ok(())
}
