//! Advertisement progress events
//!
//! The advertiser reports progress as structured events; sinks decide where
//! they go (log, UI channel, nowhere). Emission is fire-and-forget.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::advertiser::AdvertiseReport;

/// Progress of one advertisement batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AdvertiseEvent {
    /// Batch started
    BatchStarted { batch_id: Uuid, attempts: u32 },
    /// A beacon was transmitted
    PacketSent {
        attempt: u32,
        packets: u64,
        packets_per_second: f64,
    },
    /// A beacon failed to transmit
    PacketFailed { attempt: u32 },
    /// Batch finished
    BatchFinished { report: AdvertiseReport },
}

impl AdvertiseEvent {
    /// Face and message for a status display
    pub fn display_line(&self) -> (&'static str, String) {
        match self {
            Self::BatchStarted { .. } => ("(>-<)", "Starting advertisement...".to_string()),
            Self::PacketSent {
                packets_per_second, ..
            } => (
                "(>-<)",
                format!("Packets per second: {:.2} pkt/s", packets_per_second),
            ),
            Self::PacketFailed { .. } => ("(X-X)", "Advertisement failed to send!".to_string()),
            Self::BatchFinished { .. } => ("(^-^)", "Advertisement finished!".to_string()),
        }
    }
}

/// Receiver of advertisement events
pub trait EventSink: Send + Sync {
    fn emit(&self, event: AdvertiseEvent);
}

/// Sink writing events to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: AdvertiseEvent) {
        let (face, message) = event.display_line();
        match &event {
            AdvertiseEvent::PacketFailed { attempt } => {
                log::warn!("{} {} (attempt {})", face, message, attempt)
            }
            AdvertiseEvent::PacketSent { packets, .. } => {
                log::debug!("{} {} ({} sent)", face, message, packets)
            }
            AdvertiseEvent::BatchStarted { batch_id, attempts } => {
                log::info!("{} {} (batch {}, {} attempts)", face, message, batch_id, attempts)
            }
            AdvertiseEvent::BatchFinished { report } => log::info!(
                "{} {} ({}/{} sent, {} failed)",
                face,
                message,
                report.sent,
                report.attempts,
                report.failed
            ),
        }
    }
}

/// Sink forwarding events over a tokio channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<AdvertiseEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<AdvertiseEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: AdvertiseEvent) {
        // A dropped receiver just means nobody is watching.
        let _ = self.tx.send(event);
    }
}

/// Sink discarding every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: AdvertiseEvent) {}
}
