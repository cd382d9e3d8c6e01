//! DirectInput-style joystick backend (polled).
//!
//! Generic stick/wheel/HOTAS devices: 8 axes, up to 128 buttons, up to 4
//! POV hats. The raw state is a flat [`JoystickState`] snapshot; hats
//! report an angle in hundredths of a degree (or −1 centered) and are
//! decoded into four momentary direction bindings each, so a diagonal hat
//! position activates two adjacent directions.
//!
//! # Binding layout
//! - Axes `0..8`: X, Y, Z, RX, RY, RZ, Slider 0, Slider 1 (Signed; native
//!   0..65535 remapped so center 32768 lands exactly on 0).
//! - Buttons `0..128` (Momentary).
//! - POV `0..16`: 4 controllers × 4 directions; index `i` is controller
//!   `i / 4`, direction `i % 4` (Up, Right, Down, Left).
//!
//! # Device identity
//! The enumeration layer keys devices by a `vid:pid`-style handle. Two
//! identical sticks can claim the same instance; collisions resolve to the
//! next free instance in ascending scan order so no device is ever dropped.

use crate::descriptor::{BindingDescriptor, BindingKind, DeviceDescriptor};
use crate::error::Error;
use crate::handler::{DeviceHandler, StateSampler};
use crate::normalize::{signed_from_u16, value_from_angle, POV_DIRECTION_ANGLES};
use crate::provider::{EngineContext, InputProvider, ProviderCore};
use crate::report::{
    BindingCategory, BindingReport, DeviceLibrary, DeviceReport, DeviceReportNode, ProviderReport,
};
use crate::subscription::{BindModeCallback, DetectionMode, InputSubscriptionRequest};
use std::collections::BTreeMap;

/// Provider name this backend registers under.
pub const PROVIDER_NAME: &str = "joystick";

pub const AXIS_COUNT: usize = 8;
pub const BUTTON_COUNT: usize = 128;
pub const POV_COUNT: usize = 4;

const AXIS_NAMES: [&str; AXIS_COUNT] = ["X", "Y", "Z", "RX", "RY", "RZ", "Slider 0", "Slider 1"];
const POV_DIRECTION_NAMES: [&str; 4] = ["Up", "Right", "Down", "Left"];

/// Flat raw joystick state for one sampling tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JoystickState {
    /// Native unsigned axis values, center at 32768.
    pub axes: [u16; AXIS_COUNT],
    pub buttons: [bool; BUTTON_COUNT],
    /// Hat angles in hundredths of a degree, −1 = centered.
    pub povs: [i32; POV_COUNT],
}

impl Default for JoystickState {
    fn default() -> Self {
        Self {
            axes: [0x8000; AXIS_COUNT],
            buttons: [false; BUTTON_COUNT],
            povs: [-1; POV_COUNT],
        }
    }
}

/// Native layer for one stick: reads the current state snapshot.
pub trait JoystickSource: Send + 'static {
    fn read(&mut self) -> Result<JoystickState, Error>;
}

/// Adapts a [`JoystickSource`] to the engine's full-state sampler contract.
pub struct JoystickSampler<S: JoystickSource> {
    source: S,
    pov_tolerance: i32,
}

impl<S: JoystickSource> JoystickSampler<S> {
    pub fn new(source: S, pov_tolerance: i32) -> Self {
        Self {
            source,
            pov_tolerance,
        }
    }
}

impl<S: JoystickSource> StateSampler for JoystickSampler<S> {
    fn sample(&mut self, out: &mut Vec<(BindingDescriptor, i32)>) -> Result<(), Error> {
        let state = self.source.read()?;
        for (i, &raw) in state.axes.iter().enumerate() {
            out.push((
                BindingDescriptor::new(BindingKind::Axis, i as u32),
                signed_from_u16(raw),
            ));
        }
        for (i, &pressed) in state.buttons.iter().enumerate() {
            out.push((
                BindingDescriptor::new(BindingKind::Button, i as u32),
                pressed as i32,
            ));
        }
        for (pov, &angle) in state.povs.iter().enumerate() {
            for (dir, &home) in POV_DIRECTION_ANGLES.iter().enumerate() {
                out.push((
                    BindingDescriptor::new(BindingKind::Pov, (pov * 4 + dir) as u32),
                    value_from_angle(angle, home, self.pov_tolerance),
                ));
            }
        }
        Ok(())
    }
}

/// One enumerated stick: identity plus whatever the native layer opens it by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoystickEntry {
    pub descriptor: DeviceDescriptor,
    pub name: String,
    /// Opaque native path/identifier used to open the device.
    pub native_id: String,
}

/// Assign stable instances to scanned devices.
///
/// `scan` is `(handle, claimed_instance, name, native_id)` in scan order.
/// Devices sharing a handle keep their claimed instance unless it is
/// already taken, in which case they get the next free one, ascending.
pub fn assign_instances(scan: Vec<(String, u32, String, String)>) -> Vec<JoystickEntry> {
    let mut taken: BTreeMap<String, BTreeMap<u32, ()>> = BTreeMap::new();
    let mut entries = Vec::with_capacity(scan.len());
    for (handle, claimed, name, native_id) in scan {
        let slots = taken.entry(handle.clone()).or_default();
        let mut instance = claimed;
        while slots.contains_key(&instance) {
            instance += 1;
        }
        slots.insert(instance, ());
        entries.push(JoystickEntry {
            descriptor: DeviceDescriptor::new(handle, instance),
            name,
            native_id,
        });
    }
    entries
}

/// Enumeration/report layer over a completed scan.
pub struct JoystickLibrary {
    entries: Vec<JoystickEntry>,
    template: Vec<DeviceReportNode>,
}

impl JoystickLibrary {
    pub fn new(entries: Vec<JoystickEntry>) -> Self {
        Self {
            entries,
            template: build_report_template(),
        }
    }

    fn entry(&self, descriptor: &DeviceDescriptor) -> Option<&JoystickEntry> {
        self.entries.iter().find(|e| &e.descriptor == descriptor)
    }
}

impl DeviceLibrary for JoystickLibrary {
    type Identifier = String;

    fn input_list(&self) -> ProviderReport {
        ProviderReport {
            title: "Joystick (Core)".into(),
            description: "Reads joysticks, wheels and other generic game controllers".into(),
            api: "HID".into(),
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

    fn resolve(&self, descriptor: &DeviceDescriptor) -> Result<String, Error> {
        self.entry(descriptor)
            .map(|e| e.native_id.clone())
            .ok_or_else(|| Error::UnknownDevice(descriptor.clone()))
    }
}

fn build_report_template() -> Vec<DeviceReportNode> {
    let mut axes = DeviceReportNode::titled("Axes");
    for (i, name) in AXIS_NAMES.iter().enumerate() {
        axes.bindings.push(BindingReport {
            title: (*name).into(),
            path: None,
            category: BindingCategory::Signed,
            binding: BindingDescriptor::new(BindingKind::Axis, i as u32),
        });
    }

    let mut buttons = DeviceReportNode::titled("Buttons");
    for i in 0..BUTTON_COUNT {
        buttons.bindings.push(BindingReport {
            title: format!("Button {}", i + 1),
            path: None,
            category: BindingCategory::Momentary,
            binding: BindingDescriptor::new(BindingKind::Button, i as u32),
        });
    }

    let mut povs = DeviceReportNode::titled("POVs");
    for pov in 0..POV_COUNT {
        let mut node = DeviceReportNode::titled(format!("POV {}", pov + 1));
        for (dir, name) in POV_DIRECTION_NAMES.iter().enumerate() {
            node.bindings.push(BindingReport {
                title: (*name).into(),
                path: Some(format!("POV:{}, Dir:{}", pov, name)),
                category: BindingCategory::Momentary,
                binding: BindingDescriptor::new(BindingKind::Pov, (pov * 4 + dir) as u32),
            });
        }
        povs.nodes.push(node);
    }

    vec![axes, buttons, povs]
}

type SourceFactory =
    Box<dyn Fn(&DeviceDescriptor, &str) -> Result<Box<dyn StateSampler>, Error> + Send + Sync>;

/// Joystick provider over an enumerated library and a per-device source
/// factory keyed by native identifier.
pub struct JoystickProvider {
    core: ProviderCore,
    library: JoystickLibrary,
    samplers: SourceFactory,
}

impl JoystickProvider {
    /// Build against the hidapi transport: scans for joystick/gamepad usage
    /// HID devices and opens them by path.
    #[cfg(feature = "hid")]
    pub fn new(context: EngineContext) -> Result<Self, Error> {
        let entries = assign_instances(hid::scan()?);
        let pov_tolerance = context.config.pov_tolerance;
        Ok(Self::with_library(
            context,
            JoystickLibrary::new(entries),
            move |descriptor, native_id| {
                let source = hid::HidJoystickSource::open(descriptor.clone(), native_id)?;
                Ok(Box::new(JoystickSampler::new(source, pov_tolerance)) as Box<dyn StateSampler>)
            },
        ))
    }

    /// Build over an explicit library and sampler factory (tests, custom
    /// transports).
    pub fn with_library(
        context: EngineContext,
        library: JoystickLibrary,
        samplers: impl Fn(&DeviceDescriptor, &str) -> Result<Box<dyn StateSampler>, Error>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            core: ProviderCore::new(context),
            library,
            samplers: Box::new(samplers),
        }
    }

    fn create_handler(&self, descriptor: &DeviceDescriptor) -> Result<DeviceHandler, Error> {
        let native_id = self.library.resolve(descriptor)?;
        let report = self
            .library
            .device_report(descriptor)
            .ok_or_else(|| Error::UnknownDevice(descriptor.clone()))?;
        let sampler = (self.samplers)(descriptor, &native_id)?;
        Ok(DeviceHandler::polling(
            descriptor.clone(),
            report.all_bindings(),
            self.core.context.profiles.clone(),
            sampler,
            self.core.context.config.poll_interval(),
        ))
    }
}

impl InputProvider for JoystickProvider {
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
        let descriptor = request.device.clone();
        self.core
            .subscribe(request, || self.create_handler(&descriptor))
    }

    fn unsubscribe_input(&self, request: &InputSubscriptionRequest) -> Result<bool, Error> {
        Ok(self.core.unsubscribe(request))
    }

    fn set_detection_mode(
        &self,
        mode: DetectionMode,
        descriptor: &DeviceDescriptor,
        callback: Option<BindModeCallback>,
    ) -> Result<(), Error> {
        self.core
            .set_detection_mode(mode, descriptor, callback, || {
                self.create_handler(descriptor)
            })
    }
}

/// hidapi transport: fixed-layout input reports.
#[cfg(feature = "hid")]
mod hid {
    use super::{JoystickSource, JoystickState, AXIS_COUNT};
    use crate::descriptor::DeviceDescriptor;
    use crate::error::Error;
    use hidapi::{HidApi, HidDevice};
    use parking_lot::Mutex;
    use std::sync::OnceLock;

    const USAGE_PAGE_GENERIC_DESKTOP: u16 = 0x01;
    const USAGE_JOYSTICK: u16 = 0x04;
    const USAGE_GAMEPAD: u16 = 0x05;

    /// Process-wide hidapi context, initialized on first use. hidapi allows
    /// only one context per process; everything here shares it.
    fn api() -> Result<&'static Mutex<HidApi>, Error> {
        static API: OnceLock<Mutex<HidApi>> = OnceLock::new();
        if API.get().is_none() {
            let fresh = HidApi::new().map_err(Error::native)?;
            let _ = API.set(Mutex::new(fresh));
        }
        match API.get() {
            Some(shared) => Ok(shared),
            None => Err(Error::Native("hidapi context unavailable".into())),
        }
    }

    /// Scan for joystick-class HID interfaces.
    ///
    /// Returns `(handle, claimed_instance, name, native_id)` tuples in
    /// enumeration order; instances all claim 0 and collide into ascending
    /// slots via `assign_instances`.
    pub fn scan() -> Result<Vec<(String, u32, String, String)>, Error> {
        let mut api = api()?.lock();
        api.refresh_devices().map_err(Error::native)?;
        Ok(api
            .device_list()
            .filter(|info| {
                info.usage_page() == USAGE_PAGE_GENERIC_DESKTOP
                    && (info.usage() == USAGE_JOYSTICK || info.usage() == USAGE_GAMEPAD)
            })
            .map(|info| {
                (
                    format!("{:04x}:{:04x}", info.vendor_id(), info.product_id()),
                    0,
                    info.product_string().unwrap_or("Unknown").to_string(),
                    info.path().to_string_lossy().into_owned(),
                )
            })
            .collect())
    }

    /// Byte layout of a fixed-format input report.
    ///
    /// This deliberately does not parse HID report descriptors; devices
    /// with nonstandard layouts get a custom `Layout`.
    #[derive(Clone, Copy)]
    pub struct Layout {
        /// Byte offset of each 16-bit little-endian axis, when present.
        pub axes: [Option<usize>; AXIS_COUNT],
        /// Byte offset of the packed button bitfield.
        pub buttons: usize,
        /// Number of buttons actually present.
        pub button_count: usize,
        /// Byte offset of the hat nibble (0..=7 directions, 0xF centered).
        pub pov: Option<usize>,
    }

    impl Default for Layout {
        fn default() -> Self {
            Self {
                axes: [Some(0), Some(2), Some(4), Some(6), None, None, None, None],
                buttons: 8,
                button_count: 16,
                pov: Some(10),
            }
        }
    }

    pub struct HidJoystickSource {
        descriptor: DeviceDescriptor,
        device: HidDevice,
        layout: Layout,
        /// Last decoded state, re-reported when no fresh report is pending.
        last: JoystickState,
        unavailable: bool,
    }

    impl HidJoystickSource {
        pub fn open(descriptor: DeviceDescriptor, path: &str) -> Result<Self, Error> {
            let path = std::ffi::CString::new(path).map_err(Error::native)?;
            let device = api()?.lock().open_path(&path).map_err(Error::native)?;
            device.set_blocking_mode(false).map_err(Error::native)?;
            Ok(Self {
                descriptor,
                device,
                layout: Layout::default(),
                last: JoystickState::default(),
                unavailable: false,
            })
        }

        fn decode(&self, report: &[u8]) -> JoystickState {
            let mut state = JoystickState::default();
            for (i, offset) in self.layout.axes.iter().enumerate() {
                if let Some(at) = offset {
                    if at + 1 < report.len() {
                        state.axes[i] = u16::from_le_bytes([report[*at], report[at + 1]]);
                    }
                }
            }
            for b in 0..self.layout.button_count.min(super::BUTTON_COUNT) {
                let byte = self.layout.buttons + b / 8;
                if byte < report.len() {
                    state.buttons[b] = report[byte] & (1 << (b % 8)) != 0;
                }
            }
            if let Some(at) = self.layout.pov {
                if at < report.len() {
                    let nibble = report[at] & 0x0F;
                    // 8-way nibble to hundredths of a degree.
                    state.povs[0] = if nibble < 8 { nibble as i32 * 4500 } else { -1 };
                }
            }
            state
        }
    }

    impl JoystickSource for HidJoystickSource {
        fn read(&mut self) -> Result<JoystickState, Error> {
            let mut buf = [0u8; 64];
            match self.device.read(&mut buf) {
                Ok(0) => Ok(self.last), // no fresh report; hold state
                Ok(n) => {
                    self.unavailable = false;
                    self.last = self.decode(&buf[..n]);
                    Ok(self.last)
                }
                Err(e) => {
                    if !self.unavailable {
                        self.unavailable = true;
                        tracing::warn!(error = %e, "joystick read failed; treating as unplugged");
                    }
                    Err(Error::DeviceUnavailable(self.descriptor.clone()))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{ProfileId, SubscriberId, SubscriptionDescriptor};

    fn pairs_for(state: JoystickState) -> Vec<(BindingDescriptor, i32)> {
        struct Fixed(JoystickState);
        impl JoystickSource for Fixed {
            fn read(&mut self) -> Result<JoystickState, Error> {
                Ok(self.0)
            }
        }
        let mut out = Vec::new();
        JoystickSampler::new(Fixed(state), 9000)
            .sample(&mut out)
            .unwrap();
        out
    }

    fn value_of(pairs: &[(BindingDescriptor, i32)], kind: BindingKind, index: u32) -> i32 {
        pairs
            .iter()
            .find(|(b, _)| *b == BindingDescriptor::new(kind, index))
            .map(|(_, v)| *v)
            .expect("binding sampled")
    }

    #[test]
    fn sampler_emits_the_full_binding_surface() {
        let pairs = pairs_for(JoystickState::default());
        assert_eq!(pairs.len(), AXIS_COUNT + BUTTON_COUNT + POV_COUNT * 4);
    }

    #[test]
    fn axes_center_on_zero() {
        let mut state = JoystickState::default();
        state.axes[0] = 0;
        state.axes[1] = 0xFFFF;
        let pairs = pairs_for(state);
        assert_eq!(value_of(&pairs, BindingKind::Axis, 0), -32768);
        assert_eq!(value_of(&pairs, BindingKind::Axis, 1), 32767);
        assert_eq!(value_of(&pairs, BindingKind::Axis, 2), 0); // rest
    }

    #[test]
    fn second_pov_maps_to_its_own_index_block() {
        let mut state = JoystickState::default();
        state.povs[1] = 9000; // Right on POV 2
        let pairs = pairs_for(state);
        // POV 1 bindings untouched.
        for dir in 0..4 {
            assert_eq!(value_of(&pairs, BindingKind::Pov, dir), 0);
        }
        assert_eq!(value_of(&pairs, BindingKind::Pov, 4), 0); // Up
        assert_eq!(value_of(&pairs, BindingKind::Pov, 5), 1); // Right
    }

    #[test]
    fn diagonal_pov_activates_adjacent_directions() {
        let mut state = JoystickState::default();
        state.povs[0] = 4500;
        let pairs = pairs_for(state);
        assert_eq!(value_of(&pairs, BindingKind::Pov, 0), 1); // Up
        assert_eq!(value_of(&pairs, BindingKind::Pov, 1), 1); // Right
        assert_eq!(value_of(&pairs, BindingKind::Pov, 2), 0);
        assert_eq!(value_of(&pairs, BindingKind::Pov, 3), 0);
    }

    #[test]
    fn instance_collisions_take_the_next_free_slot() {
        let entries = assign_instances(vec![
            ("044f:b10a".into(), 0, "T.16000M".into(), "path-a".into()),
            ("044f:b10a".into(), 0, "T.16000M".into(), "path-b".into()),
            ("044f:b10a".into(), 1, "T.16000M".into(), "path-c".into()),
            ("046d:c215".into(), 0, "Extreme 3D".into(), "path-d".into()),
        ]);
        let instances: Vec<u32> = entries.iter().map(|e| e.descriptor.instance).collect();
        // Second device collides on 0 -> 1; third claims 1, now taken -> 2.
        assert_eq!(instances, vec![0, 1, 2, 0]);
        assert_eq!(entries[3].descriptor.handle, "046d:c215");
    }

    #[test]
    fn library_resolves_only_known_descriptors() {
        let library = JoystickLibrary::new(assign_instances(vec![(
            "044f:b10a".into(),
            0,
            "T.16000M".into(),
            "path-a".into(),
        )]));
        let known = DeviceDescriptor::new("044f:b10a", 0);
        assert_eq!(library.resolve(&known).unwrap(), "path-a");
        assert!(library
            .resolve(&DeviceDescriptor::new("044f:b10a", 1))
            .is_err());

        let report = library.device_report(&known).unwrap();
        assert_eq!(
            report.all_bindings().len(),
            AXIS_COUNT + BUTTON_COUNT + POV_COUNT * 4
        );
    }

    #[test]
    fn provider_rejects_subscription_to_unknown_device() {
        let provider = JoystickProvider::with_library(
            EngineContext::default(),
            JoystickLibrary::new(Vec::new()),
            |_, _| unreachable!("no devices to open"),
        );
        let request = InputSubscriptionRequest::new(
            DeviceDescriptor::new("dead:beef", 0),
            BindingDescriptor::new(BindingKind::Axis, 0),
            SubscriptionDescriptor::new(SubscriberId(1), ProfileId(1)),
            |_| {},
        );
        assert!(matches!(
            provider.subscribe_input(request),
            Err(Error::UnknownDevice(_))
        ));
    }
}
