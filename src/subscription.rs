//! Subscription requests, callbacks, and detection modes.
//!
//! A consumer expresses interest in one binding on one device by building an
//! [`InputSubscriptionRequest`] and handing it to a provider. The engine
//! consumes the request as-is and never mutates it; the request is `Clone`
//! (callbacks are shared behind `Arc`) so callers can keep a copy around for
//! the matching unsubscribe.
//!
//! ## Callback contract
//! Every fan-out callback receives a single canonical integer value:
//! - Momentary bindings (buttons, POV directions): `0` or `1`.
//! - Signed axis bindings: `-32768..=32767`, rest = 0.
//! - Unsigned axis bindings (triggers, MIDI CC): `0..=65535`, rest = 0.
//!
//! Callbacks run on the device's sampling thread (or the native event
//! thread for event-driven backends) and should return quickly.

use crate::descriptor::{BindingDescriptor, DeviceDescriptor, SubscriptionDescriptor};
use std::fmt;
use std::sync::Arc;

/// Per-value callback invoked when a subscribed binding changes.
pub type InputCallback = Arc<dyn Fn(i32) + Send + Sync>;

/// Callback invoked in Bind mode for raw activity on any binding.
pub type BindModeCallback = Arc<dyn Fn(BindModeUpdate) + Send + Sync>;

/// Operating mode of a device handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionMode {
    /// Normal operation: changed values fan out to profile-gated subscribers.
    Subscription,
    /// Discovery: any new, non-zero value on any binding is reported once
    /// through the bind callback; subscriber fan-out is suppressed.
    Bind,
}

/// Raw activity report produced while a handler is in Bind mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindModeUpdate {
    pub device: DeviceDescriptor,
    pub binding: BindingDescriptor,
    pub value: i32,
}

/// A live request to receive value-change callbacks for one binding on one
/// device, scoped to one profile.
#[derive(Clone)]
pub struct InputSubscriptionRequest {
    pub device: DeviceDescriptor,
    pub binding: BindingDescriptor,
    pub subscription: SubscriptionDescriptor,
    pub callback: InputCallback,
}

impl InputSubscriptionRequest {
    pub fn new(
        device: DeviceDescriptor,
        binding: BindingDescriptor,
        subscription: SubscriptionDescriptor,
        callback: impl Fn(i32) + Send + Sync + 'static,
    ) -> Self {
        Self {
            device,
            binding,
            subscription,
            callback: Arc::new(callback),
        }
    }
}

impl fmt::Debug for InputSubscriptionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputSubscriptionRequest")
            .field("device", &self.device)
            .field("binding", &self.binding)
            .field("subscription", &self.subscription)
            .finish_non_exhaustive()
    }
}

/// A claim on an output device (force feedback, LEDs, MIDI out).
///
/// Output carries no callback: the subscriber pushes values with
/// [`set_output_state`](crate::provider::OutputProvider::set_output_state)
/// instead of receiving them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSubscriptionRequest {
    pub device: DeviceDescriptor,
    pub subscription: SubscriptionDescriptor,
}
