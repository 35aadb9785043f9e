//! Device manager
//!
//! Ties the admission gate, the registry and the event listeners together at
//! the points where a transport accepts and drops connections. Each registered
//! device holds exactly one admission permit, handed back by whichever
//! disconnect path removes it from the registry.
//!
//! Listeners see `Disconnect` only for a device whose `Connect` they saw, and
//! always after it.

use std::sync::Arc;

use bytes::Bytes;
use semaphore::{Closeable, SemaphoreError};
use tokio::sync::mpsc;
use tokio_util::sync::WaitForCancellationFutureOwned;

use crate::config::ManagerConfig;
use crate::device::{Device, Lifecycle};
use crate::error::{ManagerError, Result};
use crate::event::{Event, Listeners, Routable};
use crate::id::Id;
use crate::registry::Registry;

/// Admission control and bookkeeping for live device connections
///
/// # Example
///
/// ```rust,ignore
/// use device::{Id, Listeners, Manager, ManagerConfig};
///
/// let listeners = Listeners::new().with(|event| println!("{}", event.event_type()));
/// let manager = Manager::new(ManagerConfig::small_fleet(), listeners)?;
///
/// let (device, outbound) = manager.connect(Id::parse("mac:11:22:33:44:55:66")?).await?;
/// // hand `outbound` to the connection's writer task
///
/// manager.disconnect(&device);
/// ```
#[derive(Debug)]
pub struct Manager {
    config: ManagerConfig,
    gate: Closeable,
    registry: Registry,
    listeners: Listeners,
}

impl Manager {
    /// Create a manager after validating `config`
    pub fn new(config: ManagerConfig, listeners: Listeners) -> Result<Self> {
        config.validate()?;

        tracing::debug!(
            "Creating device manager: max_devices={}, shard_hint={}, listeners={}",
            config.max_devices,
            config.shard_hint,
            listeners.len()
        );

        Ok(Self {
            gate: Closeable::new(config.max_devices),
            registry: Registry::new(config.shard_hint),
            listeners,
            config,
        })
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Admit a new connection claiming `id`.
    ///
    /// Waits up to `admission_timeout` for a free slot. Live devices already
    /// registered under `id` stay connected, and each of them records a
    /// duplication. Returns the device and the receiving end of its outbound
    /// queue.
    ///
    /// # Errors
    ///
    /// [`ManagerError::Admission`] when no slot frees up in time or the
    /// manager has shut down, and [`ManagerError::Disconnected`] when a
    /// concurrent disconnect swept the device before it was announced. Neither
    /// `Connect` nor `Disconnect` is dispatched for a failed connect.
    pub async fn connect(&self, id: Id) -> Result<(Arc<Device>, mpsc::Receiver<Bytes>)> {
        if let Err(e) = self
            .gate
            .acquire_wait(tokio::time::sleep(self.config.admission_timeout))
            .await
        {
            tracing::warn!("Rejected connection for {}: {}", id, e);
            return Err(e.into());
        }

        let (device, outbound) = Device::new(id, self.config.device_queue_size);

        let existing = self.registry.visit_id(device.id(), |other| {
            other.statistics().record_duplication();
        });
        if existing > 0 {
            tracing::warn!(
                "Device {} connected while {} other connection(s) hold the same id",
                device,
                existing
            );
        }

        if let Err(e) = self.registry.add(Arc::clone(&device)) {
            self.release_permit(&device);
            return Err(e.into());
        }

        let mut lifecycle = device.lifecycle().lock();

        if *lifecycle == Lifecycle::Disconnected {
            // the sweeping path already closed the device and released its permit
            return Err(if self.gate.is_closed() {
                SemaphoreError::Closed.into()
            } else {
                ManagerError::Disconnected(device.id().clone())
            });
        }

        // shutdown may have begun after admission and missed this device
        if self.gate.is_closed() {
            *lifecycle = Lifecycle::Disconnected;
            if self.registry.remove(&device) {
                device.close();
                self.release_permit(&device);
            }
            return Err(SemaphoreError::Closed.into());
        }

        *lifecycle = Lifecycle::Connected;
        tracing::info!("Device {} connected", device);
        self.listeners.dispatch(&Event::connect(&device));
        drop(lifecycle);

        Ok((device, outbound))
    }

    /// Disconnect one specific device.
    ///
    /// Returns `false` if the device was not registered, for example because
    /// another path disconnected it first.
    pub fn disconnect(&self, device: &Arc<Device>) -> bool {
        if !self.registry.remove(device) {
            return false;
        }

        self.finish_disconnect(device);
        true
    }

    /// Disconnect every device registered under `id`
    pub fn disconnect_id(&self, id: &Id) -> usize {
        let removed = self.registry.remove_all(id);
        removed.iter().for_each(|device| self.finish_disconnect(device));
        removed.len()
    }

    /// Disconnect every device whose id matches `predicate`
    pub fn disconnect_if<P>(&self, predicate: P) -> usize
    where
        P: FnMut(&Id) -> bool,
    {
        let removed = self.registry.remove_if(predicate);
        removed.iter().for_each(|device| self.finish_disconnect(device));
        removed.len()
    }

    pub fn disconnect_all(&self) -> usize {
        self.disconnect_if(|_| true)
    }

    /// Record an inbound message and notify listeners
    pub fn message_received(&self, device: &Arc<Device>, message: &dyn Routable, encoded: &[u8]) {
        device.statistics().record_received(encoded.len());
        self.listeners
            .dispatch(&Event::message_received(device, message, encoded));
    }

    /// Record a message that could not be delivered and notify listeners
    pub fn message_failed(&self, device: &Arc<Device>, message: &dyn Routable, encoded: &[u8]) {
        tracing::debug!(
            "Message from {} to {} failed on {}",
            message.source(),
            message.destination(),
            device
        );
        device.statistics().record_failed();
        self.listeners
            .dispatch(&Event::message_failed(device, message, encoded));
    }

    pub fn pong(&self, device: &Arc<Device>, data: &str) {
        device.statistics().record_pong();
        self.listeners.dispatch(&Event::pong(device, data));
    }

    pub fn visit_id<F>(&self, id: &Id, visitor: F) -> usize
    where
        F: FnMut(&Arc<Device>),
    {
        self.registry.visit_id(id, visitor)
    }

    pub fn visit_all<F>(&self, visitor: F) -> usize
    where
        F: FnMut(&Arc<Device>),
    {
        self.registry.visit_all(visitor)
    }

    /// Number of connected devices
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Admission permits currently held, one per device being connected or
    /// registered
    pub fn admitted(&self) -> usize {
        self.gate.held_permits()
    }

    /// Stop admitting connections and disconnect every device.
    ///
    /// Pending [`connect`](Manager::connect) calls fail. Returns the number of
    /// devices disconnected.
    pub fn shutdown(&self) -> usize {
        if let Err(e) = self.gate.close() {
            tracing::warn!("Failed to close admission gate: {}", e);
        }

        let disconnected = self.disconnect_all();
        tracing::info!("Device manager shut down, {} device(s) disconnected", disconnected);
        disconnected
    }

    /// A future that completes once [`shutdown`](Manager::shutdown) has begun
    pub fn closed(&self) -> WaitForCancellationFutureOwned {
        self.gate.closed()
    }

    pub fn is_closed(&self) -> bool {
        self.gate.is_closed()
    }

    /// Close and release a device already removed from the registry, and
    /// announce it if its connect was announced
    fn finish_disconnect(&self, device: &Arc<Device>) {
        device.close();
        self.release_permit(device);

        let mut lifecycle = device.lifecycle().lock();
        let announced = *lifecycle == Lifecycle::Connected;
        *lifecycle = Lifecycle::Disconnected;

        if announced {
            tracing::info!("Device {} disconnected", device);
            self.listeners.dispatch(&Event::disconnect(device));
        } else {
            tracing::debug!("Device {} removed before its connect completed", device);
        }
    }

    fn release_permit(&self, device: &Device) {
        if let Err(e) = self.gate.release() {
            tracing::warn!("Failed to release admission permit for {}: {}", device, e);
        }
    }
}
