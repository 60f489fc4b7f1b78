//! Beacon advertisement batches
//!
//! An advertisement batch sends a fixed number of whispered beacons back to
//! back, measuring throughput as it goes. A batch always runs to completion;
//! callers wanting continuous presence invoke [`Advertiser::advertise`] again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

use crate::event::{AdvertiseEvent, EventSink};
use crate::frame::FrameBuilder;
use crate::radio::RadioTx;
use crate::status::StatusSource;

/// Beacons sent per batch
pub const DEFAULT_ATTEMPTS: u32 = 150;

/// Pause between announcing a batch and the first send
pub const DEFAULT_START_DELAY: Duration = Duration::from_millis(250);

/// Batch settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertiseSettings {
    pub attempts: u32,
    pub start_delay: Duration,
}

impl Default for AdvertiseSettings {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            start_delay: DEFAULT_START_DELAY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdvertiserState {
    Idle,
    Advertising,
}

/// Summary of one finished batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvertiseReport {
    pub batch_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub attempts: u32,
    pub sent: u64,
    pub failed: u64,
    pub elapsed: Duration,
    /// Overall rate, absent when no time elapsed
    pub packets_per_second: Option<f64>,
}

/// Result of an [`Advertiser::advertise`] call
#[derive(Debug, Clone, PartialEq)]
pub enum AdvertiseOutcome {
    /// Advertisement disabled; nothing was sent
    Idle,
    Completed(AdvertiseReport),
}

/// Lifetime counters across batches
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvertiserStats {
    pub batches: u64,
    pub packets_sent: u64,
    pub packets_failed: u64,
}

/// Packets per second, or `None` when the rate is not computable
pub fn packets_per_second(packets: u64, elapsed: Duration) -> Option<f64> {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return None;
    }
    let rate = packets as f64 / secs;
    rate.is_finite().then_some(rate)
}

/// Drives advertisement batches over one radio
pub struct Advertiser<S, R> {
    builder: FrameBuilder<S>,
    radio: R,
    sink: Arc<dyn EventSink>,
    settings: AdvertiseSettings,
    state: AdvertiserState,
    stats: AdvertiserStats,
}

impl<S: StatusSource, R: RadioTx> Advertiser<S, R> {
    pub fn new(
        builder: FrameBuilder<S>,
        radio: R,
        sink: Arc<dyn EventSink>,
        settings: AdvertiseSettings,
    ) -> Self {
        Self {
            builder,
            radio,
            sink,
            settings,
            state: AdvertiserState::Idle,
            stats: AdvertiserStats::default(),
        }
    }

    pub fn state(&self) -> AdvertiserState {
        self.state
    }

    pub fn stats(&self) -> &AdvertiserStats {
        &self.stats
    }

    pub fn settings(&self) -> &AdvertiseSettings {
        &self.settings
    }

    pub fn builder(&self) -> &FrameBuilder<S> {
        &self.builder
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    /// Run one advertisement batch if advertising is enabled
    ///
    /// Takes `&mut self`, so packing and transmitting a frame is never
    /// interleaved with another batch on the same radio.
    pub async fn advertise(&mut self) -> AdvertiseOutcome {
        if !self.builder.source().snapshot().policy.advertise {
            log::debug!("Advertisement disabled, staying idle");
            return AdvertiseOutcome::Idle;
        }

        self.state = AdvertiserState::Advertising;
        let batch_id = Uuid::new_v4();
        let started_at = Utc::now();
        let start = Instant::now();
        let attempts = self.settings.attempts;

        self.sink.emit(AdvertiseEvent::BatchStarted { batch_id, attempts });
        if !self.settings.start_delay.is_zero() {
            tokio::time::sleep(self.settings.start_delay).await;
        }

        let mut sent = 0u64;
        let mut failed = 0u64;
        for attempt in 1..=attempts {
            if self.builder.send(&mut self.radio).await {
                sent += 1;
                if let Some(rate) = packets_per_second(sent, start.elapsed()) {
                    self.sink.emit(AdvertiseEvent::PacketSent {
                        attempt,
                        packets: sent,
                        packets_per_second: rate,
                    });
                }
            } else {
                failed += 1;
                self.sink.emit(AdvertiseEvent::PacketFailed { attempt });
            }
        }

        let elapsed = start.elapsed();
        let report = AdvertiseReport {
            batch_id,
            started_at,
            attempts,
            sent,
            failed,
            elapsed,
            packets_per_second: packets_per_second(sent, elapsed),
        };

        self.stats.batches += 1;
        self.stats.packets_sent += sent;
        self.stats.packets_failed += failed;
        self.state = AdvertiserState::Idle;

        self.sink.emit(AdvertiseEvent::BatchFinished {
            report: report.clone(),
        });
        AdvertiseOutcome::Completed(report)
    }
}
