//! Device connection handles
//!
//! A [`Device`] stands for one physical connection. It carries the logical
//! [`Id`] the connection claims, a process-unique [`Key`] telling this
//! connection apart from any other with the same `Id`, and an outbound queue
//! whose receiving end belongs to the transport driving the connection.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

use crate::error::DeviceError;
use crate::id::Id;

static NEXT_KEY: AtomicU64 = AtomicU64::new(1);

/// Instance identity of one connection, assigned monotonically
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(u64);

impl Key {
    /// Allocate the next key
    pub(crate) fn next() -> Self {
        Self(NEXT_KEY.fetch_add(1, Ordering::Relaxed))
    }

    /// Build a key from a raw value, e.g. when correlating log records
    pub fn from_raw(value: u64) -> Self {
        Self(value)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "key-{}", self.0)
    }
}

/// Traffic counters for one connection
#[derive(Debug, Default)]
pub struct Statistics {
    bytes_sent: AtomicU64,
    messages_sent: AtomicU64,
    bytes_received: AtomicU64,
    messages_received: AtomicU64,
    messages_failed: AtomicU64,
    duplications: AtomicU64,
    pongs: AtomicU64,
}

impl Statistics {
    pub(crate) fn record_sent(&self, bytes: usize) {
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_received(&self, bytes: usize) {
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.messages_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Count another connection that claimed the same identity
    pub(crate) fn record_duplication(&self) {
        self.duplications.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_pong(&self) {
        self.pongs.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of the counters
    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_failed: self.messages_failed.load(Ordering::Relaxed),
            duplications: self.duplications.load(Ordering::Relaxed),
            pongs: self.pongs.load(Ordering::Relaxed),
        }
    }
}

/// Copy of a device's [`Statistics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatisticsSnapshot {
    pub bytes_sent: u64,
    pub messages_sent: u64,
    pub bytes_received: u64,
    pub messages_received: u64,
    pub messages_failed: u64,
    pub duplications: u64,
    pub pongs: u64,
}

/// Whether listeners have been told about a connection.
///
/// `Connect` is announced at most once, only while `Admitting`, and
/// `Disconnect` only for a device that reached `Connected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lifecycle {
    Admitting,
    Connected,
    Disconnected,
}

/// One live device connection.
///
/// Devices are shared as `Arc<Device>`. The registry tracks those references
/// and never copies the device itself.
#[derive(Debug)]
pub struct Device {
    id: Id,
    key: Key,
    connected_at: DateTime<Utc>,
    queue_size: usize,
    outbound: mpsc::Sender<Bytes>,
    closing: AtomicBool,
    closed: CancellationToken,
    statistics: Statistics,
    lifecycle: Mutex<Lifecycle>,
}

impl Device {
    /// Create a device with a bounded outbound queue.
    ///
    /// Returns the device and the receiving end of its queue, which the
    /// transport drains to write frames to the wire.
    ///
    /// # Panics
    ///
    /// Panics if `queue_size` is zero.
    pub fn new(id: Id, queue_size: usize) -> (Arc<Self>, mpsc::Receiver<Bytes>) {
        assert!(queue_size > 0, "device queue size must be greater than 0");

        let (outbound, receiver) = mpsc::channel(queue_size);
        let device = Arc::new(Self {
            id,
            key: Key::next(),
            connected_at: Utc::now(),
            queue_size,
            outbound,
            closing: AtomicBool::new(false),
            closed: CancellationToken::new(),
            statistics: Statistics::default(),
            lifecycle: Mutex::new(Lifecycle::Admitting),
        });

        (device, receiver)
    }

    pub fn id(&self) -> &Id {
        &self.id
    }

    pub fn key(&self) -> Key {
        self.key
    }

    /// When this connection was established
    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    pub fn queue_size(&self) -> usize {
        self.queue_size
    }

    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    /// Held while announcing lifecycle events for this device
    pub(crate) fn lifecycle(&self) -> &Mutex<Lifecycle> {
        &self.lifecycle
    }

    /// Enqueue an encoded frame for the transport without waiting.
    ///
    /// # Errors
    ///
    /// [`DeviceError::QueueFull`] when the transport has fallen behind and
    /// [`DeviceError::Closed`] once the device is closed or its transport has
    /// gone away.
    pub fn send(&self, frame: Bytes) -> Result<(), DeviceError> {
        if self.is_closed() {
            return Err(DeviceError::Closed(self.id.clone()));
        }

        let len = frame.len();
        match self.outbound.try_send(frame) {
            Ok(()) => {
                self.statistics.record_sent(len);
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(DeviceError::QueueFull {
                id: self.id.clone(),
                capacity: self.queue_size,
            }),
            Err(TrySendError::Closed(_)) => Err(DeviceError::Closed(self.id.clone())),
        }
    }

    /// Mark this device closed, signalling its transport to hang up.
    ///
    /// Returns `true` only for the call that actually closed it.
    pub fn close(&self) -> bool {
        let first = !self.closing.swap(true, Ordering::AcqRel);
        self.closed.cancel();
        first
    }

    pub fn is_closed(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// A future that completes once the device is closed
    pub fn closed(&self) -> WaitForCancellationFutureOwned {
        self.closed.clone().cancelled_owned()
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.id, self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_keys_are_unique_and_increasing() {
        let (first, _rx1) = Device::new(Id::new("single"), 1);
        let (second, _rx2) = Device::new(Id::new("single"), 1);

        assert_eq!(first.id(), second.id());
        assert_ne!(first.key(), second.key());
        assert!(first.key() < second.key());
    }

    #[tokio::test]
    async fn test_send_reaches_transport() {
        let (device, mut rx) = Device::new(Id::new("mac:112233445566"), 4);

        device.send(Bytes::from_static(b"hello")).unwrap();
        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"hello"));

        let stats = device.statistics().snapshot();
        assert_eq!(stats.messages_sent, 1);
        assert_eq!(stats.bytes_sent, 5);
    }

    #[test]
    fn test_send_queue_full() {
        let (device, _rx) = Device::new(Id::new("serial:1"), 1);

        device.send(Bytes::from_static(b"a")).unwrap();
        assert_eq!(
            device.send(Bytes::from_static(b"b")),
            Err(DeviceError::QueueFull {
                id: Id::new("serial:1"),
                capacity: 1,
            })
        );
    }

    #[test]
    fn test_send_after_transport_dropped() {
        let (device, rx) = Device::new(Id::new("serial:2"), 1);
        drop(rx);

        assert_eq!(
            device.send(Bytes::from_static(b"a")),
            Err(DeviceError::Closed(Id::new("serial:2")))
        );
    }

    #[tokio::test]
    async fn test_close_is_reported_once() {
        let (device, _rx) = Device::new(Id::new("serial:3"), 1);
        let waiter = tokio::spawn(device.closed());

        assert!(device.close());
        assert!(!device.close());
        assert!(device.is_closed());
        assert!(device.send(Bytes::new()).is_err());

        tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .expect("closed signal should fire")
            .unwrap();
    }

    #[test]
    fn test_new_device_is_admitting() {
        let (device, _rx) = Device::new(Id::new("serial:4"), 1);
        assert_eq!(*device.lifecycle().lock(), Lifecycle::Admitting);
    }

    #[test]
    fn test_display() {
        let (device, _rx) = Device::new(Id::new("dns:a.example"), 1);
        assert_eq!(
            device.to_string(),
            format!("dns:a.example/key-{}", device.key().as_u64())
        );
    }
}
