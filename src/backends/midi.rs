//! MIDI backend (event-driven).
//!
//! Unlike the polled backends there is no sampling thread here: the native
//! runtime delivers each message on its own callback thread, the message is
//! parsed into a `(binding, value)` pair, and pushed into the device
//! handler's [`EventSink`]. Mode dispatch, dedupe, and profile gating then
//! run exactly as on the polling path.
//!
//! # Binding layout
//! Control Change only: `BindingKind::ControlChange` with index
//! `channel * 128 + controller` (16 channels × 128 controllers). The 7-bit
//! data value remaps linearly to the canonical unsigned range.
//!
//! # Device identity
//! Ports are keyed by name (`midi:<port name>`); two ports reporting the
//! same name get ascending instances in enumeration order.

use crate::descriptor::{BindingDescriptor, BindingKind, DeviceDescriptor};
use crate::error::Error;
use crate::handler::{DeviceHandler, EventSink};
use crate::normalize::unsigned_from_u7;
use crate::provider::{EngineContext, InputProvider};
use crate::report::{
    BindingCategory, BindingReport, DeviceLibrary, DeviceReport, DeviceReportNode, ProviderReport,
};
use crate::subscription::{BindModeCallback, DetectionMode, InputSubscriptionRequest};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tracing::debug;

/// Provider name this backend registers under.
pub const PROVIDER_NAME: &str = "midi";

pub const CHANNELS: u8 = 16;
pub const CONTROLLERS_PER_CHANNEL: u32 = 128;

/// Binding for one Control Change controller on one channel.
pub fn cc_binding(channel: u8, controller: u8) -> BindingDescriptor {
    BindingDescriptor::new(
        BindingKind::ControlChange,
        (channel & 0x0F) as u32 * CONTROLLERS_PER_CHANNEL + (controller & 0x7F) as u32,
    )
}

/// Parse a raw MIDI message into a `(binding, canonical value)` pair.
///
/// Only Control Change messages map to bindings; everything else (notes,
/// pitch bend, clock) is ignored.
pub fn parse_message(message: &[u8]) -> Option<(BindingDescriptor, i32)> {
    match *message {
        [status, controller, value] if status & 0xF0 == 0xB0 => Some((
            cc_binding(status & 0x0F, controller),
            unsigned_from_u7(value),
        )),
        _ => None,
    }
}

/// One enumerated input port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidiPortEntry {
    pub descriptor: DeviceDescriptor,
    pub name: String,
    /// Port index in enumeration order; what the transport opens.
    pub port: usize,
}

/// Enumeration/report layer over the input ports present at construction.
pub struct MidiLibrary {
    entries: Vec<MidiPortEntry>,
    template: Vec<DeviceReportNode>,
}

impl MidiLibrary {
    /// Build from port names in enumeration order. Duplicate names take
    /// ascending instances, never colliding and never dropping a port.
    pub fn from_port_names(names: impl IntoIterator<Item = String>) -> Self {
        let mut seen: HashMap<String, u32> = HashMap::new();
        let entries = names
            .into_iter()
            .enumerate()
            .map(|(port, name)| {
                let instance = seen.entry(name.clone()).or_insert(0);
                let entry = MidiPortEntry {
                    descriptor: DeviceDescriptor::new(format!("midi:{name}"), *instance),
                    name,
                    port,
                };
                *instance += 1;
                entry
            })
            .collect();
        Self {
            entries,
            template: build_report_template(),
        }
    }

    fn entry(&self, descriptor: &DeviceDescriptor) -> Option<&MidiPortEntry> {
        self.entries.iter().find(|e| &e.descriptor == descriptor)
    }
}

impl DeviceLibrary for MidiLibrary {
    type Identifier = usize;

    fn input_list(&self) -> ProviderReport {
        ProviderReport {
            title: "MIDI (Core)".into(),
            description: "Reads MIDI control surfaces".into(),
            api: "MIDI".into(),
            provider: PROVIDER_NAME.into(),
            devices: self
                .entries
                .iter()
                .map(|e| DeviceReport {
                    name: e.name.clone(),
                    descriptor: e.descriptor.clone(),
                    nodes: self.template.clone(),
                })
                .collect(),
        }
    }

    fn device_report(&self, descriptor: &DeviceDescriptor) -> Option<DeviceReport> {
        self.entry(descriptor).map(|e| DeviceReport {
            name: e.name.clone(),
            descriptor: e.descriptor.clone(),
            nodes: self.template.clone(),
        })
    }

    fn resolve(&self, descriptor: &DeviceDescriptor) -> Result<usize, Error> {
        self.entry(descriptor)
            .map(|e| e.port)
            .ok_or_else(|| Error::UnknownDevice(descriptor.clone()))
    }
}

fn build_report_template() -> Vec<DeviceReportNode> {
    let mut channels = Vec::with_capacity(CHANNELS as usize);
    for channel in 0..CHANNELS {
        let mut ch = DeviceReportNode::titled(format!("CH {}", channel + 1));
        let mut cc = DeviceReportNode::titled("CtrlChange");
        for controller in 0..CONTROLLERS_PER_CHANNEL as u8 {
            cc.bindings.push(BindingReport {
                title: format!("ID {controller}"),
                path: Some(format!("CH:{channel}, CC:{controller}")),
                category: BindingCategory::Unsigned,
                binding: cc_binding(channel, controller),
            });
        }
        ch.nodes.push(cc);
        channels.push(ch);
    }
    channels
}

/// Native seam: opens one input port and delivers parsed events into the
/// sink until the returned token is dropped.
pub trait MidiTransport: Send + Sync {
    fn connect(&self, port: usize, sink: EventSink) -> Result<Box<dyn Any + Send>, Error>;
}

struct MidiDeviceEntry {
    handler: DeviceHandler,
    /// Keeps the native subscription alive. Field order matters: the
    /// handler's drop bars further pushes before the connection goes away.
    _connection: Box<dyn Any + Send>,
}

/// MIDI provider: event-driven devices over any [`MidiTransport`].
pub struct MidiProvider {
    context: EngineContext,
    library: MidiLibrary,
    /// One lock for mode changes and device add/remove.
    devices: Mutex<HashMap<DeviceDescriptor, MidiDeviceEntry>>,
    transport: Box<dyn MidiTransport>,
}

impl MidiProvider {
    /// Build against the midir transport with the ports present right now.
    #[cfg(feature = "midi")]
    pub fn new(context: EngineContext) -> Result<Self, Error> {
        let input = midir::MidiInput::new("patchbay").map_err(Error::native)?;
        let names: Vec<String> = input
            .ports()
            .iter()
            .map(|p| input.port_name(p).unwrap_or_else(|_| "Unknown".into()))
            .collect();
        Ok(Self::with_transport(
            context,
            MidiLibrary::from_port_names(names),
            midir_transport::MidirTransport,
        ))
    }

    /// Build over an explicit library and transport (tests, replay rigs).
    pub fn with_transport(
        context: EngineContext,
        library: MidiLibrary,
        transport: impl MidiTransport + 'static,
    ) -> Self {
        Self {
            context,
            library,
            devices: Mutex::new(HashMap::new()),
            transport: Box::new(transport),
        }
    }

    /// Find-or-connect the device entry for `descriptor`.
    fn ensure_device<'a>(
        &self,
        devices: &'a mut HashMap<DeviceDescriptor, MidiDeviceEntry>,
        descriptor: &DeviceDescriptor,
    ) -> Result<&'a mut MidiDeviceEntry, Error> {
        match devices.entry(descriptor.clone()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(slot) => {
                let port = self.library.resolve(descriptor)?;
                let report = self
                    .library
                    .device_report(descriptor)
                    .ok_or_else(|| Error::UnknownDevice(descriptor.clone()))?;
                let (handler, sink) = DeviceHandler::event_driven(
                    descriptor.clone(),
                    report.all_bindings(),
                    self.context.profiles.clone(),
                );
                let connection = self.transport.connect(port, sink)?;
                debug!(device = %descriptor, port, "midi port connected");
                Ok(slot.insert(MidiDeviceEntry {
                    handler,
                    _connection: connection,
                }))
            }
        }
    }

    fn drop_if_empty(
        devices: &mut HashMap<DeviceDescriptor, MidiDeviceEntry>,
        descriptor: &DeviceDescriptor,
    ) {
        let empty = devices
            .get(descriptor)
            .map(|e| e.handler.is_empty())
            .unwrap_or(false);
        if empty {
            devices.remove(descriptor);
            debug!(device = %descriptor, "midi port released");
        }
    }
}

impl InputProvider for MidiProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn input_list(&self) -> ProviderReport {
        self.library.input_list()
    }

    fn device_report(&self, descriptor: &DeviceDescriptor) -> Option<DeviceReport> {
        self.library.device_report(descriptor)
    }

    fn subscribe_input(&self, request: InputSubscriptionRequest) -> Result<(), Error> {
        let mut devices = self.devices.lock();
        let descriptor = request.device.clone();
        let result = self
            .ensure_device(&mut devices, &descriptor)
            .and_then(|entry| entry.handler.subscribe_input(request));
        if result.is_err() {
            Self::drop_if_empty(&mut devices, &descriptor);
        }
        result
    }

    fn unsubscribe_input(&self, request: &InputSubscriptionRequest) -> Result<bool, Error> {
        let mut devices = self.devices.lock();
        let existed = devices
            .get(&request.device)
            .map(|entry| entry.handler.unsubscribe_input(request))
            .unwrap_or(false);
        Self::drop_if_empty(&mut devices, &request.device);
        Ok(existed)
    }

    fn set_detection_mode(
        &self,
        mode: DetectionMode,
        descriptor: &DeviceDescriptor,
        callback: Option<BindModeCallback>,
    ) -> Result<(), Error> {
        let mut devices = self.devices.lock();
        match mode {
            DetectionMode::Bind => {
                let entry = self.ensure_device(&mut devices, descriptor)?;
                entry.handler.set_detection_mode(DetectionMode::Bind, callback);
            }
            DetectionMode::Subscription => {
                if let Some(entry) = devices.get(descriptor) {
                    entry
                        .handler
                        .set_detection_mode(DetectionMode::Subscription, None);
                }
                Self::drop_if_empty(&mut devices, descriptor);
            }
        }
        Ok(())
    }
}

/// midir-backed transport.
#[cfg(feature = "midi")]
mod midir_transport {
    use super::{parse_message, MidiTransport};
    use crate::error::Error;
    use crate::handler::EventSink;
    use std::any::Any;

    pub struct MidirTransport;

    impl MidiTransport for MidirTransport {
        fn connect(&self, port: usize, sink: EventSink) -> Result<Box<dyn Any + Send>, Error> {
            let input = midir::MidiInput::new("patchbay").map_err(Error::native)?;
            let ports = input.ports();
            let port = ports
                .get(port)
                .ok_or_else(|| Error::Native(format!("midi port {port} disappeared")))?;
            let connection = input
                .connect(
                    port,
                    "patchbay-input",
                    move |_stamp, message, _| {
                        if let Some((binding, value)) = parse_message(message) {
                            sink.push(binding, value);
                        }
                    },
                    (),
                )
                .map_err(Error::native)?;
            Ok(Box::new(connection))
        }
    }
}
