//! # Whispered beacon advertiser
//!
//! Builds IEEE 802.11 beacon frames carrying a tagged, chunked status record
//! in the format mesh-discovery peers listen for, and transmits them in
//! bounded advertisement batches.
//!
//! ## Architecture
//!
//! - `status`: the announced status record and the source it is read from
//! - `frame`: beacon template, chunk assembly and single-frame send
//! - `advertiser`: batch loop, pacing and throughput
//! - `radio`: raw frame transmit backends
//! - `event`: structured progress events and sinks
//! - `config`: file-backed configuration store

pub mod advertiser;
pub mod config;
pub mod event;
pub mod frame;
pub mod radio;
pub mod status;

pub use crate::{
    advertiser::{
        AdvertiseOutcome, AdvertiseReport, AdvertiseSettings, Advertiser, AdvertiserState,
    },
    config::BeaconConfig,
    event::{AdvertiseEvent, ChannelSink, EventSink, LogSink, NullSink},
    frame::{FrameBuilder, FrameSettings, TransmitBuffer, WhisperTag},
    radio::{DryRunRadio, MockRadio, RadioError, RadioInterface, RadioTx, UdpBridgeRadio},
    status::{PolicyRecord, StatusRecord, StatusSource, UptimeStatus},
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BeaconError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Radio error: {0}")]
    Radio(#[from] RadioError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Chunk of {0} bytes does not fit a one-byte length")]
    ChunkOverflow(usize),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

pub type Result<T> = std::result::Result<T, BeaconError>;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BeaconError::FrameTooLarge { size: 1600, max: 1500 };
        assert_eq!(err.to_string(), "Frame too large: 1600 bytes (max: 1500)");

        let err: BeaconError = RadioError::NotConnected.into();
        assert_eq!(err.to_string(), "Radio error: Radio not connected");
    }
}
