//! XInput-style gamepad backend (polled).
//!
//! Exposes the four fixed controller slots as devices. Every slot is
//! reported whether or not a pad is currently connected — a subscription to
//! an empty slot simply stays silent until a pad shows up, matching the
//! engine's freeze-until-reconnect policy.
//!
//! # Binding layout
//! Indices are stable and intended for bindings/UI:
//! - Axes `0..6`: LX, LY, RX, RY (Signed, raw thumbstick range), LT, RT
//!   (Unsigned, remapped from 0..255).
//! - Buttons `0..10`: A, B, X, Y, LB, RB, LS, RS, Back, Start (Momentary).
//! - POV `0..4`: D-pad Up, Right, Down, Left (Momentary), each direction
//!   decoded from its flag bit so diagonals report two directions.
//!
//! The raw state is a flat [`GamepadState`]; mapping from state to binding
//! values goes through `const` accessor/flag tables built ahead of time,
//! indexed per tick.

use crate::descriptor::{BindingDescriptor, BindingKind, DeviceDescriptor};
use crate::error::Error;
use crate::handler::{DeviceHandler, StateSampler};
use crate::normalize::unsigned_from_u8;
use crate::provider::{EngineContext, InputProvider, ProviderCore};
use crate::report::{
    BindingCategory, BindingReport, DeviceLibrary, DeviceReport, DeviceReportNode, ProviderReport,
};
use crate::subscription::{BindModeCallback, DetectionMode, InputSubscriptionRequest};

/// Device handle shared by all gamepad slots; slots differ by instance.
pub const GAMEPAD_HANDLE: &str = "xinput";

/// Provider name this backend registers under.
pub const PROVIDER_NAME: &str = "gamepad";

/// Fixed number of XInput slots.
pub const SLOT_COUNT: u32 = 4;

const BUTTON_NAMES: [&str; 10] = ["A", "B", "X", "Y", "LB", "RB", "LS", "RS", "Back", "Start"];
const AXIS_NAMES: [&str; 6] = ["LX", "LY", "RX", "RY", "LT", "RT"];
const POV_NAMES: [&str; 4] = ["Up", "Right", "Down", "Left"];

// XINPUT_GAMEPAD_* button bits.
const FLAG_DPAD_UP: u16 = 0x0001;
const FLAG_DPAD_DOWN: u16 = 0x0002;
const FLAG_DPAD_LEFT: u16 = 0x0004;
const FLAG_DPAD_RIGHT: u16 = 0x0008;
const FLAG_START: u16 = 0x0010;
const FLAG_BACK: u16 = 0x0020;
const FLAG_LEFT_THUMB: u16 = 0x0040;
const FLAG_RIGHT_THUMB: u16 = 0x0080;
const FLAG_LEFT_SHOULDER: u16 = 0x0100;
const FLAG_RIGHT_SHOULDER: u16 = 0x0200;
const FLAG_A: u16 = 0x1000;
const FLAG_B: u16 = 0x2000;
const FLAG_X: u16 = 0x4000;
const FLAG_Y: u16 = 0x8000;

/// Button flag per button index; order must match [`BUTTON_NAMES`].
const BUTTON_FLAGS: [u16; 10] = [
    FLAG_A,
    FLAG_B,
    FLAG_X,
    FLAG_Y,
    FLAG_LEFT_SHOULDER,
    FLAG_RIGHT_SHOULDER,
    FLAG_LEFT_THUMB,
    FLAG_RIGHT_THUMB,
    FLAG_BACK,
    FLAG_START,
];

/// D-pad flag per POV direction index (Up, Right, Down, Left).
const POV_FLAGS: [u16; 4] = [FLAG_DPAD_UP, FLAG_DPAD_RIGHT, FLAG_DPAD_DOWN, FLAG_DPAD_LEFT];

/// Accessor per axis index, precomputed so the tick never looks fields up
/// by name. Thumbsticks are already canonical signed; triggers remap to
/// canonical unsigned.
const AXIS_ACCESSORS: [fn(&GamepadState) -> i32; 6] = [
    |s| s.thumb_lx as i32,
    |s| s.thumb_ly as i32,
    |s| s.thumb_rx as i32,
    |s| s.thumb_ry as i32,
    |s| unsigned_from_u8(s.left_trigger),
    |s| unsigned_from_u8(s.right_trigger),
];

/// Flat raw gamepad state, `XINPUT_GAMEPAD`-shaped.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GamepadState {
    /// Button and D-pad flag word.
    pub buttons: u16,
    pub left_trigger: u8,
    pub right_trigger: u8,
    pub thumb_lx: i16,
    pub thumb_ly: i16,
    pub thumb_rx: i16,
    pub thumb_ry: i16,
}

/// Native layer for one slot: reads the current pad state.
///
/// Return [`Error::DeviceUnavailable`] for an empty/disconnected slot; the
/// handler skips the tick and keeps last values.
pub trait GamepadSource: Send + 'static {
    fn read(&mut self) -> Result<GamepadState, Error>;
}

/// Adapts a [`GamepadSource`] to the engine's full-state sampler contract.
pub struct GamepadSampler<S: GamepadSource> {
    source: S,
}

impl<S: GamepadSource> GamepadSampler<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }
}

impl<S: GamepadSource> StateSampler for GamepadSampler<S> {
    fn sample(&mut self, out: &mut Vec<(BindingDescriptor, i32)>) -> Result<(), Error> {
        let state = self.source.read()?;
        for (i, accessor) in AXIS_ACCESSORS.iter().enumerate() {
            out.push((
                BindingDescriptor::new(BindingKind::Axis, i as u32),
                accessor(&state),
            ));
        }
        for (i, flag) in BUTTON_FLAGS.iter().enumerate() {
            out.push((
                BindingDescriptor::new(BindingKind::Button, i as u32),
                (state.buttons & flag != 0) as i32,
            ));
        }
        for (i, flag) in POV_FLAGS.iter().enumerate() {
            out.push((
                BindingDescriptor::new(BindingKind::Pov, i as u32),
                (state.buttons & flag != 0) as i32,
            ));
        }
        Ok(())
    }
}

/// Enumeration/report layer for the four slots.
pub struct GamepadLibrary {
    template: Vec<DeviceReportNode>,
}

impl GamepadLibrary {
    pub fn new() -> Self {
        Self {
            template: build_report_template(),
        }
    }

    fn descriptor(slot: u32) -> DeviceDescriptor {
        DeviceDescriptor::new(GAMEPAD_HANDLE, slot)
    }
}

impl Default for GamepadLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceLibrary for GamepadLibrary {
    type Identifier = u32;

    fn input_list(&self) -> ProviderReport {
        ProviderReport {
            title: "Gamepad (Core)".into(),
            description: "Reads Xbox-style gamepads".into(),
            api: "XInput".into(),
            provider: PROVIDER_NAME.into(),
            devices: (0..SLOT_COUNT)
                .filter_map(|slot| self.device_report(&Self::descriptor(slot)))
                .collect(),
        }
    }

    fn device_report(&self, descriptor: &DeviceDescriptor) -> Option<DeviceReport> {
        if descriptor.handle != GAMEPAD_HANDLE || descriptor.instance >= SLOT_COUNT {
            return None;
        }
        Some(DeviceReport {
            name: format!("Xbox Controller {}", descriptor.instance + 1),
            descriptor: descriptor.clone(),
            nodes: self.template.clone(),
        })
    }

    fn resolve(&self, descriptor: &DeviceDescriptor) -> Result<u32, Error> {
        if descriptor.handle == GAMEPAD_HANDLE && descriptor.instance < SLOT_COUNT {
            Ok(descriptor.instance)
        } else {
            Err(Error::UnknownDevice(descriptor.clone()))
        }
    }
}

fn build_report_template() -> Vec<DeviceReportNode> {
    let mut buttons = DeviceReportNode::titled("Buttons");
    for (i, name) in BUTTON_NAMES.iter().enumerate() {
        buttons.bindings.push(BindingReport {
            title: (*name).into(),
            path: None,
            category: BindingCategory::Momentary,
            binding: BindingDescriptor::new(BindingKind::Button, i as u32),
        });
    }

    let mut axes = DeviceReportNode::titled("Axes");
    for (i, name) in AXIS_NAMES.iter().enumerate() {
        axes.bindings.push(BindingReport {
            title: (*name).into(),
            path: None,
            // Sticks are signed; the two triggers are unsigned.
            category: if i < 4 {
                BindingCategory::Signed
            } else {
                BindingCategory::Unsigned
            },
            binding: BindingDescriptor::new(BindingKind::Axis, i as u32),
        });
    }

    let mut pov = DeviceReportNode::titled("DPad");
    for (i, name) in POV_NAMES.iter().enumerate() {
        pov.bindings.push(BindingReport {
            title: (*name).into(),
            path: None,
            category: BindingCategory::Momentary,
            binding: BindingDescriptor::new(BindingKind::Pov, i as u32),
        });
    }

    vec![buttons, axes, pov]
}

type SamplerFactory = Box<dyn Fn(u32) -> Result<Box<dyn StateSampler>, Error> + Send + Sync>;

/// Gamepad provider: four slot devices over any [`GamepadSource`] factory.
pub struct GamepadProvider {
    core: ProviderCore,
    library: GamepadLibrary,
    samplers: SamplerFactory,
}

impl GamepadProvider {
    /// Build against the platform XInput runtime.
    #[cfg(windows)]
    pub fn new(context: EngineContext) -> Self {
        Self::with_sampler_factory(context, |slot| {
            Ok(Box::new(GamepadSampler::new(xinput::XInputSource::new(slot))) as Box<dyn StateSampler>)
        })
    }

    /// Build with a custom per-slot sampler factory (tests, replay rigs,
    /// non-Windows sources).
    pub fn with_sampler_factory(
        context: EngineContext,
        samplers: impl Fn(u32) -> Result<Box<dyn StateSampler>, Error> + Send + Sync + 'static,
    ) -> Self {
        Self {
            core: ProviderCore::new(context),
            library: GamepadLibrary::new(),
            samplers: Box::new(samplers),
        }
    }

    fn create_handler(&self, descriptor: &DeviceDescriptor) -> Result<DeviceHandler, Error> {
        let slot = self.library.resolve(descriptor)?;
        let report = self
            .library
            .device_report(descriptor)
            .ok_or_else(|| Error::UnknownDevice(descriptor.clone()))?;
        let sampler = (self.samplers)(slot)?;
        Ok(DeviceHandler::polling(
            descriptor.clone(),
            report.all_bindings(),
            self.core.context.profiles.clone(),
            sampler,
            self.core.context.config.poll_interval(),
        ))
    }

    #[cfg(test)]
    fn is_tracked(&self, descriptor: &DeviceDescriptor) -> bool {
        self.core.is_tracked(descriptor)
    }
}

impl InputProvider for GamepadProvider {
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

/// Windows XInput source.
#[cfg(windows)]
mod xinput {
    use super::{GamepadSource, GamepadState};
    use crate::descriptor::DeviceDescriptor;
    use crate::error::Error;
    use windows_sys::Win32::UI::Input::XboxController::{XInputGetState, XINPUT_STATE};

    pub struct XInputSource {
        slot: u32,
    }

    impl XInputSource {
        pub fn new(slot: u32) -> Self {
            Self { slot }
        }
    }

    impl GamepadSource for XInputSource {
        fn read(&mut self) -> Result<GamepadState, Error> {
            // FFI struct: must be manually zeroed.
            let mut state: XINPUT_STATE = unsafe { std::mem::zeroed() };
            // XInputGetState returns 0 on success; anything else means the
            // slot is empty or the pad dropped off.
            let res = unsafe { XInputGetState(self.slot, &mut state) };
            if res != 0 {
                return Err(Error::DeviceUnavailable(DeviceDescriptor::new(
                    super::GAMEPAD_HANDLE,
                    self.slot,
                )));
            }
            let gp = state.Gamepad;
            Ok(GamepadState {
                buttons: gp.wButtons,
                left_trigger: gp.bLeftTrigger,
                right_trigger: gp.bRightTrigger,
                thumb_lx: gp.sThumbLX,
                thumb_ly: gp.sThumbLY,
                thumb_rx: gp.sThumbRX,
                thumb_ry: gp.sThumbRY,
            })
        }
    }
}
