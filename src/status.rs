//! Status record announced in every beacon
//!
//! This module contains the record serialized into the whispered payload and
//! the read-only source the frame builder pulls it from.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::Result;

/// Policy sub-record advertised to peers
///
/// Field order is the serialized key order (alphabetical, as the peer
/// daemon writes it).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyRecord {
    /// Advertisement enabled
    pub advertise: bool,
    /// Access point time-to-live in epochs
    pub ap_ttl: u32,
    /// Associate with access points
    pub associate: bool,
    /// Epochs without activity before getting bored
    pub bored_num_epochs: u32,
    /// Channels hopped during recon
    pub channels: Vec<u8>,
    /// Deauthentication enabled
    pub deauth: bool,
    /// Active epochs before getting excited
    pub excited_num_epochs: u32,
    /// Recon time per channel hop in seconds
    pub hop_recon_time: u32,
    /// Maximum inactivity scale
    pub max_inactive_scale: u32,
    /// Maximum interactions per station
    pub max_interactions: u32,
    /// Missed stations before recon
    pub max_misses_for_recon: u32,
    /// Minimum recon time in seconds
    ///
    /// Legacy senders wrote the `min_rssi` value here. This field is sent on its own.
    pub min_recon_time: u32,
    /// Minimum RSSI in dBm
    pub min_rssi: i32,
    /// Recon inactivity multiplier
    pub recon_inactive_multiplier: u32,
    /// Recon time in seconds
    pub recon_time: u32,
    /// Inactive epochs before getting sad
    pub sad_num_epochs: u32,
    /// Station time-to-live in epochs
    pub sta_ttl: u32,
}

impl Default for PolicyRecord {
    fn default() -> Self {
        Self {
            advertise: true,
            ap_ttl: 120,
            associate: true,
            bored_num_epochs: 15,
            channels: vec![1, 6, 11],
            deauth: true,
            excited_num_epochs: 10,
            hop_recon_time: 10,
            max_inactive_scale: 2,
            max_interactions: 3,
            max_misses_for_recon: 5,
            min_recon_time: 5,
            min_rssi: -200,
            recon_inactive_multiplier: 2,
            recon_time: 30,
            sad_num_epochs: 25,
            sta_ttl: 300,
        }
    }
}

/// Identity and status record carried in the whispered payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub epoch: u64,
    pub face: String,
    pub identity: String,
    pub name: String,
    pub policy: PolicyRecord,
    pub pwnd_run: u32,
    pub pwnd_tot: u32,
    pub session_id: String,
    pub uptime: u64,
    pub version: String,
}

impl StatusRecord {
    /// Encode the record as compact JSON
    pub fn to_payload(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Read-only view of the configuration store
///
/// Polled once per pack; implementations return a fresh snapshot every time.
pub trait StatusSource: Send + Sync {
    fn snapshot(&self) -> StatusRecord;
}

impl<T: StatusSource + ?Sized> StatusSource for &T {
    fn snapshot(&self) -> StatusRecord {
        (**self).snapshot()
    }
}

impl<T: StatusSource + ?Sized> StatusSource for Arc<T> {
    fn snapshot(&self) -> StatusRecord {
        (**self).snapshot()
    }
}

impl StatusSource for StatusRecord {
    fn snapshot(&self) -> StatusRecord {
        self.clone()
    }
}

/// Source wrapper reporting live uptime
///
/// The wrapped source's `uptime` is treated as the base value and the
/// seconds elapsed since the wrapper was created are added on top.
#[derive(Debug)]
pub struct UptimeStatus<S> {
    inner: S,
    started: Instant,
}

impl<S: StatusSource> UptimeStatus<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            started: Instant::now(),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: StatusSource> StatusSource for UptimeStatus<S> {
    fn snapshot(&self) -> StatusRecord {
        let mut record = self.inner.snapshot();
        record.uptime = record
            .uptime
            .saturating_add(self.started.elapsed().as_secs());
        record
    }
}
