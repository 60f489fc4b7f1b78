//! Raw 802.11 transmit backends
//!
//! The advertiser only needs one primitive from the radio: put this byte
//! buffer on the air as-is. This module defines that primitive as a trait and
//! ships the backends the binary can drive.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::UdpSocket;

/// Errors reported by a transmit backend
#[derive(Error, Debug)]
pub enum RadioError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Frame rejected: {message}")]
    Rejected { message: String },

    #[error("Radio not connected")]
    NotConnected,
}

/// Interface a raw frame is transmitted on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RadioInterface {
    /// Station interface
    Station,
    /// Soft access point interface
    SoftAp,
}

impl Default for RadioInterface {
    fn default() -> Self {
        Self::Station
    }
}

impl From<RadioInterface> for u8 {
    fn from(interface: RadioInterface) -> Self {
        match interface {
            RadioInterface::Station => 0,
            RadioInterface::SoftAp => 1,
        }
    }
}

/// Transmit counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RadioStats {
    /// Frames handed to the radio successfully
    pub frames_transmitted: u64,
    /// Bytes handed to the radio successfully
    pub bytes_transmitted: u64,
    /// Failed transmit calls
    pub tx_errors: u64,
}

impl RadioStats {
    fn record(&mut self, result: &Result<(), RadioError>, len: usize) {
        match result {
            Ok(()) => {
                self.frames_transmitted += 1;
                self.bytes_transmitted += len as u64;
            }
            Err(_) => self.tx_errors += 1,
        }
    }
}

/// Raw frame transmit primitive
#[async_trait]
pub trait RadioTx: Send {
    /// Transmit `frame` unmodified on `interface`
    ///
    /// With `append_header` unset the backend must not prepend its own
    /// 802.11 header; the buffer already carries a complete one.
    async fn transmit(
        &mut self,
        interface: RadioInterface,
        frame: &[u8],
        append_header: bool,
    ) -> Result<(), RadioError>;

    /// Backend name for logging
    fn name(&self) -> &str;

    /// Transmit counters
    fn stats(&self) -> RadioStats;
}

#[async_trait]
impl<R: RadioTx + ?Sized> RadioTx for Box<R> {
    async fn transmit(
        &mut self,
        interface: RadioInterface,
        frame: &[u8],
        append_header: bool,
    ) -> Result<(), RadioError> {
        (**self).transmit(interface, frame, append_header).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    fn stats(&self) -> RadioStats {
        (**self).stats()
    }
}

fn hex_dump(frame: &[u8]) -> String {
    frame
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Backend that accepts every frame without touching hardware
#[derive(Debug, Default)]
pub struct DryRunRadio {
    stats: RadioStats,
}

impl DryRunRadio {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RadioTx for DryRunRadio {
    async fn transmit(
        &mut self,
        interface: RadioInterface,
        frame: &[u8],
        append_header: bool,
    ) -> Result<(), RadioError> {
        log::debug!(
            "dry-run tx on {:?} ({} bytes, append_header={}): {}",
            interface,
            frame.len(),
            append_header,
            hex_dump(frame)
        );
        let result = Ok(());
        self.stats.record(&result, frame.len());
        result
    }

    fn name(&self) -> &str {
        "dry-run"
    }

    fn stats(&self) -> RadioStats {
        self.stats.clone()
    }
}

/// Backend forwarding frames to an injector bridge over UDP
///
/// Each datagram is `[interface][append_header][frame...]`; the bridge on
/// the other end owns the monitor-mode interface and injects the frame.
#[derive(Debug)]
pub struct UdpBridgeRadio {
    socket: Option<UdpSocket>,
    bridge_addr: SocketAddr,
    max_frame_len: usize,
    stats: RadioStats,
}

impl UdpBridgeRadio {
    /// Bind an ephemeral local socket and connect it to the bridge
    pub async fn connect(bridge_addr: SocketAddr, max_frame_len: usize) -> Result<Self, RadioError> {
        let bind_addr: SocketAddr = if bridge_addr.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(bridge_addr).await?;
        log::info!("UDP bridge radio connected to {}", bridge_addr);

        Ok(Self {
            socket: Some(socket),
            bridge_addr,
            max_frame_len,
            stats: RadioStats::default(),
        })
    }

    pub fn bridge_addr(&self) -> SocketAddr {
        self.bridge_addr
    }

    /// Drop the socket; later transmits fail with `NotConnected`
    pub fn disconnect(&mut self) {
        self.socket = None;
    }

    async fn forward(
        &self,
        interface: RadioInterface,
        frame: &[u8],
        append_header: bool,
    ) -> Result<(), RadioError> {
        let socket = self.socket.as_ref().ok_or(RadioError::NotConnected)?;
        if frame.len() > self.max_frame_len {
            return Err(RadioError::FrameTooLarge {
                size: frame.len(),
                max: self.max_frame_len,
            });
        }

        let mut datagram = Vec::with_capacity(frame.len() + 2);
        datagram.push(u8::from(interface));
        datagram.push(u8::from(append_header));
        datagram.extend_from_slice(frame);

        let sent = socket.send(&datagram).await?;
        if sent != datagram.len() {
            return Err(RadioError::Rejected {
                message: format!("short send: {} of {} bytes", sent, datagram.len()),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RadioTx for UdpBridgeRadio {
    async fn transmit(
        &mut self,
        interface: RadioInterface,
        frame: &[u8],
        append_header: bool,
    ) -> Result<(), RadioError> {
        let result = self.forward(interface, frame, append_header).await;
        self.stats.record(&result, frame.len());
        result
    }

    fn name(&self) -> &str {
        "udp-bridge"
    }

    fn stats(&self) -> RadioStats {
        self.stats.clone()
    }
}

/// One recorded transmit call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRecord {
    pub interface: RadioInterface,
    pub frame: Vec<u8>,
    pub append_header: bool,
}

/// Recording backend with scripted failures
#[derive(Debug, Default)]
pub struct MockRadio {
    calls: Vec<TxRecord>,
    failing_attempts: HashSet<usize>,
    stats: RadioStats,
}

impl MockRadio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the given calls (1-based)
    pub fn failing_on(attempts: impl IntoIterator<Item = usize>) -> Self {
        Self {
            failing_attempts: attempts.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Every transmit call made so far, failed ones included
    pub fn calls(&self) -> &[TxRecord] {
        &self.calls
    }
}

#[async_trait]
impl RadioTx for MockRadio {
    async fn transmit(
        &mut self,
        interface: RadioInterface,
        frame: &[u8],
        append_header: bool,
    ) -> Result<(), RadioError> {
        self.calls.push(TxRecord {
            interface,
            frame: frame.to_vec(),
            append_header,
        });

        let result = if self.failing_attempts.contains(&self.calls.len()) {
            Err(RadioError::Rejected {
                message: format!("scripted failure on call {}", self.calls.len()),
            })
        } else {
            Ok(())
        };
        self.stats.record(&result, frame.len());
        result
    }

    fn name(&self) -> &str {
        "mock"
    }

    fn stats(&self) -> RadioStats {
        self.stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_radio_scripted_failures() {
        let mut radio = MockRadio::failing_on([2]);

        assert!(radio.transmit(RadioInterface::Station, &[1, 2], false).await.is_ok());
        assert!(radio.transmit(RadioInterface::Station, &[3], false).await.is_err());
        assert!(radio.transmit(RadioInterface::SoftAp, &[4], true).await.is_ok());

        assert_eq!(radio.calls().len(), 3);
        assert_eq!(radio.calls()[2].interface, RadioInterface::SoftAp);
        let stats = radio.stats();
        assert_eq!(stats.frames_transmitted, 2);
        assert_eq!(stats.bytes_transmitted, 3);
        assert_eq!(stats.tx_errors, 1);
    }

    #[tokio::test]
    async fn test_boxed_radio_delegates() {
        let mut radio: Box<dyn RadioTx> = Box::new(DryRunRadio::new());
        radio.transmit(RadioInterface::Station, &[0x80, 0x00], false).await.unwrap();

        assert_eq!(radio.name(), "dry-run");
        assert_eq!(radio.stats().frames_transmitted, 1);
    }

    #[tokio::test]
    async fn test_udp_bridge_datagram_layout() {
        let bridge = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut radio = UdpBridgeRadio::connect(bridge.local_addr().unwrap(), 64).await.unwrap();

        radio.transmit(RadioInterface::SoftAp, &[0x80, 0x00, 0xde], false).await.unwrap();

        let mut buf = [0u8; 64];
        let (len, _) = bridge.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], &[1, 0, 0x80, 0x00, 0xde]);
        assert_eq!(radio.stats().bytes_transmitted, 3);
    }

    #[tokio::test]
    async fn test_udp_bridge_rejects_oversized_and_disconnected() {
        let bridge = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut radio = UdpBridgeRadio::connect(bridge.local_addr().unwrap(), 4).await.unwrap();

        let err = radio.transmit(RadioInterface::Station, &[0; 5], false).await.unwrap_err();
        assert!(matches!(err, RadioError::FrameTooLarge { size: 5, max: 4 }));

        radio.disconnect();
        let err = radio.transmit(RadioInterface::Station, &[0; 2], false).await.unwrap_err();
        assert!(matches!(err, RadioError::NotConnected));
        assert_eq!(radio.stats().tx_errors, 2);
    }
}
