//! Engine error type.
//!
//! Structural errors (unknown binding, unknown device) are returned
//! synchronously to the immediate caller. Failures on the sampling path are
//! never surfaced through subscriber callbacks: an unavailable device skips
//! the tick and freezes its last reported values until it comes back.

use crate::descriptor::{BindingDescriptor, DeviceDescriptor};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The device is disconnected or was never connected. Sampling skips the
    /// tick; surfaced only from calls that need the device right now (e.g.
    /// opening a native port).
    #[error("device {0} is unavailable")]
    DeviceUnavailable(DeviceDescriptor),

    /// A subscription named a binding the device does not expose. Rejected
    /// at subscribe time; no partial state is created.
    #[error("device {device} has no binding {binding}")]
    UnknownBinding {
        device: DeviceDescriptor,
        binding: BindingDescriptor,
    },

    /// The descriptor does not match any device known to the backend.
    #[error("unknown device {0}")]
    UnknownDevice(DeviceDescriptor),

    /// A provider name was registered twice, or requested but never
    /// registered, on a [`ProviderHost`](crate::provider::ProviderHost).
    #[error("provider {0:?}: {1}")]
    Provider(String, &'static str),

    /// Backend-native failure (open/connect), carried as text so the engine
    /// does not leak backend error types across the provider seam.
    #[error("native layer: {0}")]
    Native(String),

    #[error("config: {0}")]
    Config(#[from] toml::de::Error),
}

impl Error {
    pub(crate) fn native(e: impl std::fmt::Display) -> Self {
        Error::Native(e.to_string())
    }
}
