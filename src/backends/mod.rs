//! Device backends.
//!
//! Each backend pairs a [`DeviceLibrary`](crate::report::DeviceLibrary)
//! (enumeration + report tree) with an [`InputProvider`](crate::provider::InputProvider)
//! built on the shared engine: the polled backends feed a per-device
//! sampling thread through a source trait, the MIDI backend pushes native
//! events into an [`EventSink`](crate::handler::EventSink).
//!
//! # Feature flags
//! - **`hid`** — enables the hidapi transport behind the joystick backend.
//! - **`midi`** — enables the midir transport behind the MIDI backend.
//!
//! The engine half of every backend (state mapping, report trees, device
//! ordering) compiles and is tested without either feature; only the native
//! transports are gated.

pub mod gamepad;
pub mod joystick;
pub mod midi;
