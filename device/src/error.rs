//! Error types for the device crate.

use semaphore::SemaphoreError;

use crate::device::Key;
use crate::id::Id;

/// Errors from parsing a device identity.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The value is not of the form `scheme:value` with a known scheme
    #[error("Invalid device id: {0}")]
    InvalidId(String),
}

/// Errors from the device registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The exact same device instance is already registered
    #[error("Duplicate device: {id} / {key}")]
    DuplicateDevice {
        /// The device's logical identity
        id: Id,
        /// The device's instance key
        key: Key,
    },
}

/// Errors from operations on a single device connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    /// The device's outbound queue is full
    #[error("Device {id} queue is full (capacity {capacity})")]
    QueueFull {
        /// The device's logical identity
        id: Id,
        /// The queue capacity
        capacity: usize,
    },

    /// The device has been closed
    #[error("Device {0} is closed")]
    Closed(Id),
}

/// Errors from the device manager.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    /// The admission gate refused or timed out the connection
    #[error("Admission failed: {0}")]
    Admission(#[from] SemaphoreError),

    /// The registry rejected the device
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// A concurrent disconnect removed the device before its connection
    /// completed
    #[error("Device {0} was disconnected while connecting")]
    Disconnected(Id),

    /// Invalid configuration provided
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Convenience type alias for Results using ManagerError.
pub type Result<T> = std::result::Result<T, ManagerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_error_display() {
        let error = RegistryError::DuplicateDevice {
            id: Id::new("mac:112233445566"),
            key: Key::from_raw(7),
        };
        assert_eq!(
            error.to_string(),
            "Duplicate device: mac:112233445566 / key-7"
        );
    }

    #[test]
    fn test_device_error_display() {
        let error = DeviceError::QueueFull {
            id: Id::new("serial:1234"),
            capacity: 10,
        };
        assert_eq!(
            error.to_string(),
            "Device serial:1234 queue is full (capacity 10)"
        );

        let error = DeviceError::Closed(Id::new("serial:1234"));
        assert_eq!(error.to_string(), "Device serial:1234 is closed");
    }

    #[test]
    fn test_manager_error_conversions() {
        let error: ManagerError = SemaphoreError::Closed.into();
        assert!(matches!(error, ManagerError::Admission(SemaphoreError::Closed)));
        assert_eq!(error.to_string(), "Admission failed: the semaphore has been closed");

        let error: ManagerError = RegistryError::DuplicateDevice {
            id: Id::new("dns:example.com"),
            key: Key::from_raw(1),
        }
        .into();
        assert!(matches!(error, ManagerError::Registry(_)));

        let error = ManagerError::Disconnected(Id::new("serial:7"));
        assert_eq!(
            error.to_string(),
            "Device serial:7 was disconnected while connecting"
        );

        let error = ManagerError::Configuration("shard hint must be greater than 0".to_string());
        assert_eq!(
            error.to_string(),
            "Configuration error: shard hint must be greater than 0"
        );
    }
}
