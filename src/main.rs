//! Whispered beacon command-line tool
//!
//! Packs the configured status record into a whispered beacon and runs
//! advertisement batches over the configured radio backend.

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use whisper_beacon::{
    config::{BeaconConfig, RadioBackend},
    AdvertiseOutcome, Advertiser, BeaconError, DryRunRadio, FrameBuilder, LogSink, RadioTx,
    Result, StatusSource, UdpBridgeRadio, UptimeStatus,
};

/// Default configuration file path
const DEFAULT_CONFIG_PATH: &str = "whisper-beacon.toml";

#[tokio::main]
async fn main() {
    let matches = cli().get_matches();

    let (config, source) = match load_configuration(matches.get_one::<PathBuf>("config")) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    let level = matches
        .get_one::<String>("log-level")
        .cloned()
        .unwrap_or_else(|| config.logging.level.clone());
    if let Err(e) = init_logging(&level) {
        eprintln!("{}", e);
        std::process::exit(1);
    }
    match source {
        Some(path) => info!("Loaded configuration from {}", path.display()),
        None => info!("No configuration file found, using defaults"),
    }

    let result = match matches.subcommand() {
        Some(("advertise", sub)) => run_advertise(config, sub).await,
        Some(("pack", sub)) => run_pack(&config, sub),
        Some(("config", sub)) => run_config(&config, sub),
        _ => Ok(()),
    };

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn cli() -> Command {
    Command::new("whisper-beacon")
        .version(whisper_beacon::VERSION)
        .about("Whispered 802.11 beacon advertiser")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file (.toml, .json, .yaml)")
                .value_parser(value_parser!(PathBuf))
                .global(true),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level (trace, debug, info, warn, error)")
                .global(true),
        )
        .subcommand(
            Command::new("advertise")
                .about("Run advertisement batches")
                .arg(
                    Arg::new("batches")
                        .short('n')
                        .long("batches")
                        .value_name("COUNT")
                        .help("Number of batches, 0 to run until Ctrl-C")
                        .value_parser(value_parser!(u32))
                        .default_value("1"),
                )
                .arg(
                    Arg::new("pause-ms")
                        .long("pause-ms")
                        .value_name("MILLIS")
                        .help("Pause between batches")
                        .value_parser(value_parser!(u64))
                        .default_value("0"),
                )
                .arg(
                    Arg::new("radio")
                        .short('r')
                        .long("radio")
                        .value_name("BACKEND")
                        .help("Radio backend override (dry-run, udp-bridge)")
                        .value_parser(|s: &str| s.parse::<RadioBackend>().map_err(|e| e.to_string())),
                )
                .arg(
                    Arg::new("bridge")
                        .short('b')
                        .long("bridge")
                        .value_name("ADDR")
                        .help("Injector bridge address for the udp-bridge backend")
                        .value_parser(value_parser!(SocketAddr)),
                ),
        )
        .subcommand(
            Command::new("pack")
                .about("Pack one beacon and print it")
                .arg(
                    Arg::new("payload")
                        .long("payload")
                        .help("Print the serialized payload instead of the frame")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("config")
                .about("Configuration management")
                .subcommand_required(true)
                .subcommand(
                    Command::new("generate")
                        .about("Write the default configuration")
                        .arg(
                            Arg::new("output")
                                .short('o')
                                .long("output")
                                .value_name("FILE")
                                .value_parser(value_parser!(PathBuf))
                                .default_value(DEFAULT_CONFIG_PATH),
                        ),
                )
                .subcommand(Command::new("validate").about("Validate the loaded configuration")),
        )
}

/// Initialize logging system
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .map_err(|e| BeaconError::Config(format!("Invalid log level '{}': {}", level, e)))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    Ok(())
}

/// Load the configuration, returning the file it came from
///
/// Runs before logging is initialized, so the caller logs the source.
fn load_configuration(path: Option<&PathBuf>) -> Result<(BeaconConfig, Option<PathBuf>)> {
    let path = match path {
        Some(path) => path.clone(),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => PathBuf::from(DEFAULT_CONFIG_PATH),
        None => return Ok((BeaconConfig::default(), None)),
    };
    let config = BeaconConfig::load_from_file(&path)?;
    Ok((config, Some(path)))
}

async fn build_radio(config: &BeaconConfig) -> Result<Box<dyn RadioTx>> {
    match config.radio.backend {
        RadioBackend::DryRun => Ok(Box::new(DryRunRadio::new())),
        RadioBackend::UdpBridge => {
            let radio =
                UdpBridgeRadio::connect(config.radio.bridge_addr, config.frame.max_frame_len).await?;
            Ok(Box::new(radio))
        }
    }
}

fn shutdown_signal() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, stopping after the current batch");
            let _ = tx.send(true);
        }
    });
    rx
}

/// Sleep for `pause` unless shutdown is requested first
///
/// Returns true when the run should stop.
async fn wait_between_batches(pause: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return true;
    }
    if pause.is_zero() {
        return false;
    }
    tokio::select! {
        _ = tokio::time::sleep(pause) => *shutdown.borrow(),
        Ok(()) = shutdown.changed() => *shutdown.borrow(),
    }
}

async fn run_advertise(mut config: BeaconConfig, matches: &ArgMatches) -> Result<()> {
    if let Some(backend) = matches.get_one::<RadioBackend>("radio") {
        config.radio.backend = *backend;
    }
    if let Some(addr) = matches.get_one::<SocketAddr>("bridge") {
        config.radio.bridge_addr = *addr;
    }
    let batches = matches.get_one::<u32>("batches").copied().unwrap_or(1);
    let pause = Duration::from_millis(matches.get_one::<u64>("pause-ms").copied().unwrap_or(0));

    let report = config.validate();
    for warning in &report.warnings {
        warn!("{}", warning);
    }
    if !report.is_valid() {
        return Err(BeaconError::Config(report.errors.join("; ")));
    }

    let radio = build_radio(&config).await?;
    info!("Using {} radio on {:?}", radio.name(), config.radio.interface);

    let frame_settings = config.frame_settings();
    let advertise_settings = config.advertise_settings();
    let builder = FrameBuilder::new(UptimeStatus::new(config), frame_settings);
    let mut advertiser = Advertiser::new(builder, radio, Arc::new(LogSink), advertise_settings);

    let mut shutdown = shutdown_signal();
    let mut completed = 0u32;
    loop {
        match advertiser.advertise().await {
            AdvertiseOutcome::Idle => {
                warn!("Advertisement is disabled in the configuration");
                break;
            }
            AdvertiseOutcome::Completed(report) => {
                completed += 1;
                info!(
                    "Batch {} done: {}/{} sent in {:.2?}",
                    report.batch_id, report.sent, report.attempts, report.elapsed
                );
            }
        }
        if batches != 0 && completed >= batches {
            break;
        }
        if wait_between_batches(pause, &mut shutdown).await {
            break;
        }
    }

    let stats = advertiser.stats();
    let radio_stats = advertiser.radio().stats();
    info!(
        "{} batches, {} beacons sent, {} failed, {} bytes on air",
        stats.batches, stats.packets_sent, stats.packets_failed, radio_stats.bytes_transmitted
    );
    Ok(())
}

fn run_pack(config: &BeaconConfig, matches: &ArgMatches) -> Result<()> {
    if matches.get_flag("payload") {
        let payload = config.snapshot().to_payload()?;
        println!("{}", String::from_utf8_lossy(&payload));
        return Ok(());
    }

    let frame = FrameBuilder::new(config, config.frame_settings()).pack()?;
    println!(
        "frame: {} bytes (header 36, payload {}, chunks {}, slack {})",
        frame.len(),
        frame.payload_len(),
        frame.chunk_count(),
        frame.slack()
    );
    for (offset, line) in frame.as_bytes().chunks(16).enumerate() {
        let hex: Vec<String> = line.iter().map(|b| format!("{:02x}", b)).collect();
        println!("{:04x}  {}", offset * 16, hex.join(" "));
    }
    Ok(())
}

fn run_config(config: &BeaconConfig, matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("generate", sub)) => {
            let output = sub
                .get_one::<PathBuf>("output")
                .cloned()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
            BeaconConfig::default().save_to_file(&output)?;
            info!("Wrote default configuration to {}", output.display());
            Ok(())
        }
        Some(("validate", _)) => {
            let report = config.validate();
            for warning in &report.warnings {
                warn!("{}", warning);
            }
            if report.is_valid() {
                info!("Configuration is valid");
                Ok(())
            } else {
                Err(BeaconError::Config(report.errors.join("; ")))
            }
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_advertise_overrides() {
        let matches = cli()
            .try_get_matches_from([
                "whisper-beacon",
                "advertise",
                "--batches",
                "3",
                "--radio",
                "udp-bridge",
                "--bridge",
                "10.0.0.2:9000",
            ])
            .unwrap();

        let (name, sub) = matches.subcommand().unwrap();
        assert_eq!(name, "advertise");
        assert_eq!(sub.get_one::<u32>("batches"), Some(&3));
        assert_eq!(sub.get_one::<RadioBackend>("radio"), Some(&RadioBackend::UdpBridge));
        assert_eq!(
            sub.get_one::<SocketAddr>("bridge"),
            Some(&"10.0.0.2:9000".parse().unwrap())
        );
    }

    #[test]
    fn test_cli_rejects_unknown_backend() {
        assert!(cli()
            .try_get_matches_from(["whisper-beacon", "advertise", "--radio", "pcap"])
            .is_err());
    }

    #[test]
    fn test_missing_default_config_falls_back() {
        let (config, source) = load_configuration(None).unwrap();
        assert_eq!(config, BeaconConfig::default());
        assert!(source.is_none());
    }

    #[test]
    fn test_explicit_config_reports_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("beacon.json");
        BeaconConfig::default().save_to_file(&path).unwrap();

        let (config, source) = load_configuration(Some(&path)).unwrap();
        assert_eq!(config, BeaconConfig::default());
        assert_eq!(source, Some(path));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_pause() {
        let (tx, mut rx) = watch::channel(false);
        let started = tokio::time::Instant::now();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = tx.send(true);
        });

        assert!(wait_between_batches(Duration::from_secs(60), &mut rx).await);
        assert_eq!(started.elapsed(), Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_runs_out_without_shutdown() {
        let (_tx, mut rx) = watch::channel(false);
        let started = tokio::time::Instant::now();

        assert!(!wait_between_batches(Duration::from_millis(250), &mut rx).await);
        assert_eq!(started.elapsed(), Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_shutdown_skips_pause() {
        let (tx, mut rx) = watch::channel(false);
        tx.send(true).unwrap();
        let started = tokio::time::Instant::now();

        assert!(wait_between_batches(Duration::from_secs(60), &mut rx).await);
        assert!(wait_between_batches(Duration::ZERO, &mut rx).await);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }
}
