//! Beacon configuration
//!
//! This module holds the configuration store the status record is read from,
//! together with the advertiser, frame and radio settings. Files are loaded
//! by extension from TOML, JSON or YAML.

use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::advertiser::{AdvertiseSettings, DEFAULT_ATTEMPTS};
use crate::frame::{self, FrameSettings, BEACON_HEADER_LEN, CHUNK_TAG_LEN, DEFAULT_MAX_FRAME_LEN};
use crate::radio::RadioInterface;
use crate::status::{PolicyRecord, StatusRecord, StatusSource};
use crate::{BeaconError, Result};

/// Complete beacon configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeaconConfig {
    /// Identity and counters announced to peers
    pub status: StatusConfig,
    /// Policy announced to peers
    pub policy: PolicyRecord,
    /// Batch cadence
    pub advertiser: AdvertiserConfig,
    /// Frame layout limits
    pub frame: FrameConfig,
    /// Transmit backend
    pub radio: RadioConfig,
    /// Logging
    pub logging: LoggingConfig,
}

/// Status fields outside the policy block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    pub epoch: u64,
    pub face: String,
    pub identity: String,
    pub name: String,
    pub pwnd_run: u32,
    pub pwnd_tot: u32,
    pub session_id: String,
    /// Base uptime in seconds
    pub uptime: u64,
    pub version: String,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            epoch: 1,
            face: "(^-^)".to_string(),
            identity: "b9210077f7c14c0651aa338c55e820e93f90110ef679648001b1cecdbffa9f63".to_string(),
            name: "minibeacon".to_string(),
            pwnd_run: 0,
            pwnd_tot: 0,
            session_id: "84:f3:eb:58:95:bd".to_string(),
            uptime: 0,
            version: "3.3.2".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvertiserConfig {
    /// Beacons per batch
    pub attempts: u32,
    /// Pause after announcing a batch in milliseconds
    pub start_delay_ms: u64,
    /// Pause before each transmit in milliseconds
    pub tx_delay_ms: u64,
}

impl Default for AdvertiserConfig {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            start_delay_ms: 250,
            tx_delay_ms: 102,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    /// Zeroed bytes appended after the last chunk (legacy frames used 255)
    pub slack: usize,
    /// Largest transmitted length accepted, slack included
    pub max_frame_len: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            slack: 0,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RadioBackend {
    /// Log frames instead of transmitting them
    DryRun,
    /// Forward frames to an injector bridge over UDP
    UdpBridge,
}

impl std::str::FromStr for RadioBackend {
    type Err = BeaconError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "dry-run" => Ok(Self::DryRun),
            "udp-bridge" => Ok(Self::UdpBridge),
            other => Err(BeaconError::InvalidParameter(format!(
                "unknown radio backend '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioConfig {
    pub backend: RadioBackend,
    pub interface: RadioInterface,
    /// Injector bridge address for the UDP backend
    pub bridge_addr: SocketAddr,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            backend: RadioBackend::DryRun,
            interface: RadioInterface::Station,
            bridge_addr: SocketAddr::from(([127, 0, 0, 1], 7755)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log filter (trace, debug, info, warn, error or an env-filter directive)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Configuration validation result
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
enum ConfigFormat {
    Toml,
    Json,
    Yaml,
}

impl ConfigFormat {
    fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(Self::Toml),
            Some("json") => Ok(Self::Json),
            Some("yaml") | Some("yml") => Ok(Self::Yaml),
            _ => Err(BeaconError::Config(format!(
                "Unsupported config file format: {}",
                path.display()
            ))),
        }
    }
}

impl BeaconConfig {
    /// Load configuration from a TOML, JSON or YAML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let format = ConfigFormat::from_path(path)?;
        let content = fs::read_to_string(path)
            .map_err(|e| BeaconError::Config(format!("Failed to read config file: {}", e)))?;

        let config = match format {
            ConfigFormat::Toml => toml::from_str(&content)
                .map_err(|e| BeaconError::Config(format!("Failed to parse TOML config: {}", e)))?,
            ConfigFormat::Json => serde_json::from_str(&content)
                .map_err(|e| BeaconError::Config(format!("Failed to parse JSON config: {}", e)))?,
            ConfigFormat::Yaml => serde_yaml::from_str(&content)
                .map_err(|e| BeaconError::Config(format!("Failed to parse YAML config: {}", e)))?,
        };
        Ok(config)
    }

    /// Save configuration, picking the format from the file extension
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = match ConfigFormat::from_path(path)? {
            ConfigFormat::Toml => toml::to_string_pretty(self).map_err(|e| {
                BeaconError::Config(format!("Failed to serialize TOML config: {}", e))
            })?,
            ConfigFormat::Json => serde_json::to_string_pretty(self).map_err(|e| {
                BeaconError::Config(format!("Failed to serialize JSON config: {}", e))
            })?,
            ConfigFormat::Yaml => serde_yaml::to_string(self).map_err(|e| {
                BeaconError::Config(format!("Failed to serialize YAML config: {}", e))
            })?,
        };
        fs::write(path, content)
            .map_err(|e| BeaconError::Config(format!("Failed to write config file: {}", e)))
    }

    pub fn frame_settings(&self) -> FrameSettings {
        FrameSettings {
            interface: self.radio.interface,
            tx_delay: Duration::from_millis(self.advertiser.tx_delay_ms),
            slack: self.frame.slack,
            max_frame_len: self.frame.max_frame_len,
        }
    }

    pub fn advertise_settings(&self) -> AdvertiseSettings {
        AdvertiseSettings {
            attempts: self.advertiser.attempts,
            start_delay: Duration::from_millis(self.advertiser.start_delay_ms),
        }
    }

    /// Check the configuration, including whether the packed frame fits
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::default();

        if self.advertiser.attempts == 0 {
            report
                .errors
                .push("advertiser.attempts must be greater than zero".to_string());
        }

        let min_frame = BEACON_HEADER_LEN + CHUNK_TAG_LEN;
        if self.frame.max_frame_len < min_frame {
            report.errors.push(format!(
                "frame.max_frame_len must be at least {} bytes",
                min_frame
            ));
        }

        for channel in &self.policy.channels {
            if !(1..=14).contains(channel) {
                report
                    .errors
                    .push(format!("policy.channels contains invalid channel {}", channel));
            }
        }

        match self.snapshot().to_payload() {
            Ok(payload) => {
                if let Err(e) = frame::assemble(&payload, &self.frame_settings()) {
                    report.errors.push(format!("status record does not fit: {}", e));
                }
            }
            Err(e) => report
                .errors
                .push(format!("status record cannot be serialized: {}", e)),
        }

        if !self.policy.advertise {
            report
                .warnings
                .push("policy.advertise is disabled; the advertiser will stay idle".to_string());
        }
        if self.status.identity.is_empty() {
            report.warnings.push("status.identity is empty".to_string());
        }

        report
    }
}

impl StatusSource for BeaconConfig {
    fn snapshot(&self) -> StatusRecord {
        StatusRecord {
            epoch: self.status.epoch,
            face: self.status.face.clone(),
            identity: self.status.identity.clone(),
            name: self.status.name.clone(),
            policy: self.policy.clone(),
            pwnd_run: self.status.pwnd_run,
            pwnd_tot: self.status.pwnd_tot,
            session_id: self.status.session_id.clone(),
            uptime: self.status.uptime,
            version: self.status.version.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_valid() {
        let config = BeaconConfig::default();
        let report = config.validate();

        assert!(report.is_valid(), "{:?}", report.errors);
        assert!(report.warnings.is_empty());
        assert_eq!(config.advertise_settings(), AdvertiseSettings::default());
        assert_eq!(config.frame_settings(), FrameSettings::default());
    }

    #[test]
    fn test_validation_errors_and_warnings() {
        let mut config = BeaconConfig::default();
        config.advertiser.attempts = 0;
        config.policy.channels = vec![6, 15];
        config.policy.advertise = false;
        config.status.identity.clear();

        let report = config.validate();
        assert!(!report.is_valid());
        assert_eq!(report.errors.len(), 2);
        assert!(report.errors[1].contains("15"));
        assert_eq!(report.warnings.len(), 2);
    }

    #[test]
    fn test_oversized_record_flagged() {
        let mut config = BeaconConfig::default();
        config.status.name = "x".repeat(2000);

        let report = config.validate();
        assert!(report
            .errors
            .iter()
            .any(|e| e.starts_with("status record does not fit")));
    }

    #[test]
    fn test_slack_counted_against_frame_limit() {
        let mut config = BeaconConfig::default();
        config.frame.slack = 255;
        let payload = config.snapshot().to_payload().unwrap();
        let used = BEACON_HEADER_LEN
            + payload.len()
            + frame::chunk_count(payload.len()) * CHUNK_TAG_LEN;

        config.frame.max_frame_len = used + 255;
        assert!(config.validate().is_valid());

        config.frame.max_frame_len = used + 254;
        let report = config.validate();
        assert!(report
            .errors
            .iter()
            .any(|e| e.starts_with("status record does not fit")));
    }

    #[test]
    fn test_slack_defaults_to_zero() {
        let config = BeaconConfig::default();
        assert_eq!(config.frame.slack, 0);
        assert_eq!(config.frame_settings().slack, 0);
    }

    #[test]
    fn test_file_round_trip_all_formats() {
        let dir = tempdir().unwrap();
        let mut config = BeaconConfig::default();
        config.status.name = "roundtrip".to_string();
        config.radio.backend = RadioBackend::UdpBridge;
        config.radio.interface = RadioInterface::SoftAp;

        for file in ["beacon.toml", "beacon.json", "beacon.yaml"] {
            let path = dir.path().join(file);
            config.save_to_file(&path).unwrap();
            assert_eq!(BeaconConfig::load_from_file(&path).unwrap(), config, "{}", file);
        }
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        fs::write(
            &path,
            "[status]\nname = \"partial\"\n\n[policy]\nmin_rssi = -70\n\n[radio]\nbackend = \"udp-bridge\"\n",
        )
        .unwrap();

        let config = BeaconConfig::load_from_file(&path).unwrap();
        assert_eq!(config.status.name, "partial");
        assert_eq!(config.status.version, StatusConfig::default().version);
        assert_eq!(config.policy.min_rssi, -70);
        assert_eq!(config.policy.min_recon_time, PolicyRecord::default().min_recon_time);
        assert_eq!(config.radio.backend, RadioBackend::UdpBridge);
        assert_eq!(config.advertiser.attempts, DEFAULT_ATTEMPTS);
    }

    #[test]
    fn test_unsupported_extension() {
        let err = BeaconConfig::load_from_file("beacon.ini").unwrap_err();
        assert!(matches!(err, BeaconError::Config(_)));
    }

    #[test]
    fn test_snapshot_reflects_config() {
        let mut config = BeaconConfig::default();
        config.status.pwnd_tot = 42;
        config.policy.channels = vec![1];

        let record = config.snapshot();
        assert_eq!(record.pwnd_tot, 42);
        assert_eq!(record.policy.channels, vec![1]);
        assert_eq!(record.name, config.status.name);
    }

    #[test]
    fn test_radio_backend_from_str() {
        assert_eq!("dry-run".parse::<RadioBackend>().unwrap(), RadioBackend::DryRun);
        assert_eq!("udp-bridge".parse::<RadioBackend>().unwrap(), RadioBackend::UdpBridge);
        assert!("pcap".parse::<RadioBackend>().is_err());
    }
}
