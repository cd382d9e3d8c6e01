//! Device capability reports and the enumeration-layer seam.
//!
//! The engine does not enumerate hardware itself; each backend ships a
//! [`DeviceLibrary`] that lists known devices (including known-but-unplugged
//! ones, in an order stable across process runs), describes their bindings
//! as a tree of titled groups, and resolves descriptors to whatever native
//! identifier the backend opens devices with.
//!
//! Report types are plain serde-friendly data so UIs can render binding
//! pickers without touching a device.

use crate::descriptor::{BindingDescriptor, DeviceDescriptor};
use crate::error::Error;
use serde::{Deserialize, Serialize};

/// How a binding's values behave, for UI grouping and transforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BindingCategory {
    /// 0/1 (buttons, POV directions).
    Momentary,
    /// Canonical signed range, rest at 0 (sticks, joystick axes).
    Signed,
    /// Canonical unsigned range, rest at 0 (triggers, MIDI CC).
    Unsigned,
}

/// One selectable binding in a device report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindingReport {
    /// Display title (e.g. `"LB"`, `"Slider 1"`, `"ID 21"`).
    pub title: String,
    /// Optional display path for deeply nested bindings (e.g. `"CH:2, CC:21"`).
    pub path: Option<String>,
    pub category: BindingCategory,
    pub binding: BindingDescriptor,
}

/// Titled grouping node; leaves carry bindings, branches carry child nodes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceReportNode {
    pub title: String,
    pub bindings: Vec<BindingReport>,
    pub nodes: Vec<DeviceReportNode>,
}

impl DeviceReportNode {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// All bindings in this node and its children, depth-first.
    pub fn flatten(&self) -> Vec<BindingDescriptor> {
        let mut out: Vec<BindingDescriptor> = self.bindings.iter().map(|b| b.binding).collect();
        for node in &self.nodes {
            out.extend(node.flatten());
        }
        out
    }
}

/// Everything known about one device's input surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceReport {
    pub name: String,
    pub descriptor: DeviceDescriptor,
    pub nodes: Vec<DeviceReportNode>,
}

impl DeviceReport {
    /// The full set of bindings this device maps, for subscription
    /// validation and bind-mode coverage.
    pub fn all_bindings(&self) -> Vec<BindingDescriptor> {
        let mut out = Vec::new();
        for node in &self.nodes {
            out.extend(node.flatten());
        }
        out
    }
}

/// Top-level listing one provider exposes to the UI layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderReport {
    pub title: String,
    pub description: String,
    pub api: String,
    pub provider: String,
    pub devices: Vec<DeviceReport>,
}

/// Enumeration-layer seam consumed by each backend.
///
/// `Identifier` is whatever the backend opens devices with: an XInput slot,
/// a HID path, a MIDI port index.
pub trait DeviceLibrary: Send + Sync {
    type Identifier;

    /// All known devices, including currently unplugged ones. Order is
    /// stable across runs for a given physical topology.
    fn input_list(&self) -> ProviderReport;

    fn device_report(&self, descriptor: &DeviceDescriptor) -> Option<DeviceReport>;

    /// Resolve a descriptor to the native identifier used to open the
    /// device. Fails with [`Error::UnknownDevice`] for foreign descriptors.
    fn resolve(&self, descriptor: &DeviceDescriptor) -> Result<Self::Identifier, Error>;
}
