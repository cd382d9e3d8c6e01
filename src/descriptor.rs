//! Identity value types: devices, bindings, subscribers, profiles.
//!
//! Everything in this module is plain data with value equality. These types
//! are the keys the engine routes by; they carry no behavior beyond
//! formatting and (de)serialization.
//!
//! # Conventions
//! - A [`DeviceDescriptor`] is stable for the lifetime of a process and, for
//!   well-behaved backends, across runs: `handle` identifies the device
//!   model/endpoint (e.g. `"xinput"`, a VID:PID string, a MIDI port name)
//!   and `instance` disambiguates identical devices.
//! - A [`BindingDescriptor`] is device-local: `(kind, index)` names one
//!   logical input such as axis 2 or button 10. Index spaces are per-kind.
//! - [`SubscriberId`] and [`ProfileId`] are opaque caller-allocated ids.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of logical input a binding refers to.
///
/// The set is closed per backend: gamepad and joystick devices expose
/// `Axis`/`Button`/`Pov`, MIDI devices expose `ControlChange`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BindingKind {
    /// Continuous control (stick, slider, trigger).
    Axis,
    /// Momentary control reporting 0/1.
    Button,
    /// One logical POV/D-pad direction. See [`crate::normalize::pov_direction`]
    /// for how indices map to controllers and directions.
    Pov,
    /// MIDI Control Change; index encodes `channel * 128 + controller`.
    ControlChange,
}

/// Identifies one logical input on a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BindingDescriptor {
    pub kind: BindingKind,
    pub index: u32,
}

impl BindingDescriptor {
    pub fn new(kind: BindingKind, index: u32) -> Self {
        Self { kind, index }
    }
}

impl fmt::Display for BindingDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}/{}", self.kind, self.index)
    }
}

/// Identifies one physical or logical device among possibly several
/// identical ones.
///
/// Immutable once issued; equality and hashing are by value, so a
/// descriptor can be used as a map key anywhere in the engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Backend-scoped handle (model/endpoint identity, not plug order).
    pub handle: String,
    /// Disambiguates multiple devices with the same handle.
    pub instance: u32,
}

impl DeviceDescriptor {
    pub fn new(handle: impl Into<String>, instance: u32) -> Self {
        Self {
            handle: handle.into(),
            instance,
        }
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.handle, self.instance)
    }
}

/// Opaque identity of a subscriber (one consumer-side binding slot).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriberId(pub u64);

/// Opaque identity of a profile (an independently activatable set of
/// subscriptions).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProfileId(pub u64);

/// Binds a subscriber identity to the profile its callbacks are gated by.
///
/// A subscriber holds at most one live subscription per (device, binding);
/// re-subscribing under the same [`SubscriberId`] replaces the previous
/// registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionDescriptor {
    pub subscriber: SubscriberId,
    pub profile: ProfileId,
}

impl SubscriptionDescriptor {
    pub fn new(subscriber: SubscriberId, profile: ProfileId) -> Self {
        Self {
            subscriber,
            profile,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptors_compare_by_value() {
        let a = DeviceDescriptor::new("xinput", 0);
        let b = DeviceDescriptor::new("xinput", 0);
        assert_eq!(a, b);
        assert_ne!(a, DeviceDescriptor::new("xinput", 1));

        let x = BindingDescriptor::new(BindingKind::Axis, 2);
        assert_eq!(x, BindingDescriptor::new(BindingKind::Axis, 2));
        assert_ne!(x, BindingDescriptor::new(BindingKind::Button, 2));
    }

    #[test]
    fn display_formats() {
        assert_eq!(DeviceDescriptor::new("midi:nanoKONTROL", 1).to_string(), "midi:nanoKONTROL#1");
        assert_eq!(BindingDescriptor::new(BindingKind::Button, 9).to_string(), "Button/9");
    }

    #[test]
    fn descriptor_roundtrips_through_serde() {
        let d = DeviceDescriptor::new("joystick:044f:b10a", 2);
        let json = serde_json::to_string(&d).unwrap();
        assert_eq!(serde_json::from_str::<DeviceDescriptor>(&json).unwrap(), d);
    }
}
