//! Configuration for the device manager
//!
//! Controls how many devices the gateway admits, how long a connection may
//! wait for admission, and how the registry spreads devices over its shards.

use std::time::Duration;

use crate::error::ManagerError;

/// Configuration for the [`Manager`](crate::Manager)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Number of registry shards to aim for
    /// Default: 256
    pub shard_hint: usize,

    /// Maximum number of simultaneously connected devices
    /// Default: 10000
    pub max_devices: usize,

    /// Outbound frames buffered per device before sends fail
    /// Default: 100
    pub device_queue_size: usize,

    /// How long a new connection waits for a free admission slot
    /// Default: 5 seconds
    pub admission_timeout: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            shard_hint: 256,
            max_devices: 10_000,
            device_queue_size: 100,
            admission_timeout: Duration::from_secs(5),
        }
    }
}

impl ManagerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Large fleets where devices reconnect often
    pub fn high_churn() -> Self {
        Self {
            shard_hint: 1024,
            max_devices: 100_000,
            device_queue_size: 32,
            admission_timeout: Duration::from_secs(1),
        }
    }

    /// A handful of devices, e.g. a lab or a single site
    pub fn small_fleet() -> Self {
        Self {
            shard_hint: 16,
            max_devices: 100,
            ..Default::default()
        }
    }

    /// Validate the configuration and return the first issue found
    pub fn validate(&self) -> Result<(), ManagerError> {
        if self.shard_hint == 0 {
            return Err(ManagerError::Configuration(
                "Shard hint must be greater than 0".to_string(),
            ));
        }

        if self.max_devices == 0 {
            return Err(ManagerError::Configuration(
                "Max devices must be greater than 0".to_string(),
            ));
        }

        if self.device_queue_size == 0 {
            return Err(ManagerError::Configuration(
                "Device queue size must be greater than 0".to_string(),
            ));
        }

        if self.admission_timeout == Duration::ZERO {
            return Err(ManagerError::Configuration(
                "Admission timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn with_shard_hint(mut self, shard_hint: usize) -> Self {
        self.shard_hint = shard_hint;
        self
    }

    pub fn with_max_devices(mut self, max_devices: usize) -> Self {
        self.max_devices = max_devices;
        self
    }

    pub fn with_device_queue_size(mut self, size: usize) -> Self {
        self.device_queue_size = size;
        self
    }

    pub fn with_admission_timeout(mut self, timeout: Duration) -> Self {
        self.admission_timeout = timeout;
        self
    }
}
