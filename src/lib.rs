//! patchbay — modular input subscription engine.
//!
//! Routes raw device input (gamepad, joystick, MIDI) to normalized,
//! deduplicated, per-binding callbacks. Consumers subscribe to one binding
//! on one device under a profile; only bindings whose profile is active
//! produce callbacks. A second detection mode ("bind mode") reports raw
//! activity on any binding so a UI can ask the user to "press the control
//! you want to bind".
//!
//! ## Value conventions
//! Every callback receives one canonical integer:
//! - **Momentary** (buttons, POV directions): `0` or `1`.
//! - **Signed axes** (sticks, joystick axes): `-32768..=32767`, rest 0.
//! - **Unsigned axes** (triggers, MIDI CC): `0..=65535`, rest 0.
//!
//! ## Backends
//! Polled backends (gamepad, joystick) run one sampling thread per device;
//! the MIDI backend is event-driven off the native callback. All three feed
//! the same per-device engine: monitors dedupe by last value, the active
//! profile set gates fan-out, and device handlers are created on first
//! subscription and torn down on last unsubscription.

pub mod backends;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod handler;
pub mod monitor;
pub mod normalize;
pub mod profiles;
pub mod provider;
pub mod registry;
pub mod report;
pub mod subscription;

pub use config::EngineConfig;
pub use descriptor::*;
pub use error::Error;
pub use handler::{DeviceHandler, EventSink, StateSampler};
pub use monitor::InputMonitor;
pub use profiles::ActiveProfiles;
pub use provider::{EngineContext, InputProvider, OutputProvider, ProviderHost};
pub use registry::DeviceRegistry;
pub use report::*;
pub use subscription::*;
