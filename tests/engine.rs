//! End-to-end engine scenarios driven through the provider API.

use patchbay::backends::gamepad::{
    GamepadProvider, GamepadSampler, GamepadSource, GamepadState, GAMEPAD_HANDLE,
};

use patchbay::backends::midi::{cc_binding, MidiLibrary, MidiProvider, MidiTransport};
use patchbay::{
    ActiveProfiles, BindModeUpdate, BindingDescriptor, BindingKind, DetectionMode,
    DeviceDescriptor, EngineConfig, EngineContext, EventSink, InputProvider,
    InputSubscriptionRequest, ProfileId, ProviderHost, StateSampler, SubscriberId,
    SubscriptionDescriptor,
};
use std::any::Any;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const TIMEOUT_MS: u64 = 2000;

fn wait_until(mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_millis(TIMEOUT_MS);
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    done()
}

fn settle() {
    std::thread::sleep(Duration::from_millis(50));
}

fn fast_context(profiles: &ActiveProfiles) -> EngineContext {
    let _ = tracing_subscriber::fmt::try_init();
    EngineContext::new(
        profiles.clone(),
        EngineConfig {
            poll_interval_ms: 1,
            ..EngineConfig::default()
        },
    )
}

/// Gamepad source replaying scripted states, one per tick, holding the last.
struct Replay {
    states: Vec<GamepadState>,
    cursor: usize,
}

impl Replay {
    fn with_lx(values: &[i16]) -> Self {
        Self {
            states: values
                .iter()
                .map(|&v| GamepadState {
                    thumb_lx: v,
                    ..GamepadState::default()
                })
                .collect(),
            cursor: 0,
        }
    }
}

impl GamepadSource for Replay {
    fn read(&mut self) -> Result<GamepadState, patchbay::Error> {
        let state = self.states[self.cursor];
        if self.cursor + 1 < self.states.len() {
            self.cursor += 1;
        }
        Ok(state)
    }
}

/// Provider whose slot 0 replays the given left-stick X values.
fn replay_provider(profiles: &ActiveProfiles, script: Vec<i16>) -> GamepadProvider {
    GamepadProvider::with_sampler_factory(fast_context(profiles), move |_slot| {
        Ok(Box::new(GamepadSampler::new(Replay::with_lx(&script))) as Box<dyn StateSampler>)
    })
}

#[test]
fn axis_chain_dedupes_repeated_samples() {
    let profiles = ActiveProfiles::new();
    let provider = replay_provider(&profiles, vec![0, 100, 100, 200]);
    profiles.set_active(ProfileId(1), true);

    let device = DeviceDescriptor::new(GAMEPAD_HANDLE, 0);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    provider
        .subscribe_input(InputSubscriptionRequest::new(
            device,
            BindingDescriptor::new(BindingKind::Axis, 0),
            SubscriptionDescriptor::new(SubscriberId(1), ProfileId(1)),
            move |v| sink.lock().unwrap().push(v),
        ))
        .unwrap();

    assert!(wait_until(|| seen.lock().unwrap().len() >= 2));
    settle();
    assert_eq!(*seen.lock().unwrap(), vec![100, 200]);
}

#[test]
fn profile_gate_controls_fan_out_without_losing_state() {
    let profiles = ActiveProfiles::new();
    let provider = replay_provider(&profiles, vec![0, 500, 500]);
    // A sentinel subscriber on an active profile tells us when the 500 edge
    // has been processed; the gated subscriber shares the same samples.
    profiles.set_active(ProfileId(1), true);

    let device = DeviceDescriptor::new(GAMEPAD_HANDLE, 0);
    let binding = BindingDescriptor::new(BindingKind::Axis, 0);

    let gated = Arc::new(Mutex::new(Vec::new()));
    let g = gated.clone();
    provider
        .subscribe_input(InputSubscriptionRequest::new(
            device.clone(),
            binding,
            SubscriptionDescriptor::new(SubscriberId(1), ProfileId(9)),
            move |v| g.lock().unwrap().push(v),
        ))
        .unwrap();

    let sentinel = Arc::new(Mutex::new(Vec::new()));
    let s = sentinel.clone();
    provider
        .subscribe_input(InputSubscriptionRequest::new(
            device,
            binding,
            SubscriptionDescriptor::new(SubscriberId(2), ProfileId(1)),
            move |v| s.lock().unwrap().push(v),
        ))
        .unwrap();

    // The edge reached the monitor (sentinel saw it) but profile 9 was
    // inactive, so the gated subscriber stayed silent.
    assert!(wait_until(|| !sentinel.lock().unwrap().is_empty()));
    assert!(gated.lock().unwrap().is_empty());

    // Activating afterwards does not replay the missed edge; the value is
    // unchanged from the monitor's point of view.
    profiles.set_active(ProfileId(9), true);
    settle();
    assert!(gated.lock().unwrap().is_empty());
}

#[test]
fn bind_mode_reports_press_without_any_subscribers() {
    let profiles = ActiveProfiles::new();

    // Baseline state, then button 3 pressed and held.
    struct Press {
        tick: usize,
    }
    impl GamepadSource for Press {
        fn read(&mut self) -> Result<GamepadState, patchbay::Error> {
            self.tick += 1;
            Ok(GamepadState {
                // Button index 3 is Y (flag 0x8000).
                buttons: if self.tick > 1 { 0x8000 } else { 0 },
                ..GamepadState::default()
            })
        }
    }

    let provider = GamepadProvider::with_sampler_factory(fast_context(&profiles), |_| {
        Ok(Box::new(GamepadSampler::new(Press { tick: 0 })) as Box<dyn StateSampler>)
    });

    let device = DeviceDescriptor::new(GAMEPAD_HANDLE, 0);
    let updates: Arc<Mutex<Vec<BindModeUpdate>>> = Arc::new(Mutex::new(Vec::new()));
    let u = updates.clone();
    provider
        .set_detection_mode(
            DetectionMode::Bind,
            &device,
            Some(Arc::new(move |update| u.lock().unwrap().push(update))),
        )
        .unwrap();

    assert!(wait_until(|| !updates.lock().unwrap().is_empty()));
    settle();

    let got = updates.lock().unwrap();
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].device, device);
    assert_eq!(got[0].binding, BindingDescriptor::new(BindingKind::Button, 3));
    assert_eq!(got[0].value, 1);
}

#[test]
fn leaving_bind_mode_with_no_subscribers_tears_the_device_down() {
    let profiles = ActiveProfiles::new();
    let provider = replay_provider(&profiles, vec![0]);
    let device = DeviceDescriptor::new(GAMEPAD_HANDLE, 0);

    provider
        .set_detection_mode(DetectionMode::Bind, &device, Some(Arc::new(|_| {})))
        .unwrap();
    provider
        .set_detection_mode(DetectionMode::Subscription, &device, None)
        .unwrap();

    // Re-entering bind mode works against a freshly created handler.
    provider
        .set_detection_mode(DetectionMode::Bind, &device, Some(Arc::new(|_| {})))
        .unwrap();
    provider
        .set_detection_mode(DetectionMode::Subscription, &device, None)
        .unwrap();
}

#[test]
fn last_unsubscribe_stops_all_delivery() {
    let profiles = ActiveProfiles::new();
    profiles.set_active(ProfileId(1), true);

    // Endlessly changing axis: every tick is a new value.
    struct Ramp(i16);
    impl GamepadSource for Ramp {
        fn read(&mut self) -> Result<GamepadState, patchbay::Error> {
            self.0 = self.0.wrapping_add(1);
            Ok(GamepadState {
                thumb_lx: self.0,
                ..GamepadState::default()
            })
        }
    }

    let provider = GamepadProvider::with_sampler_factory(fast_context(&profiles), |_| {
        Ok(Box::new(GamepadSampler::new(Ramp(0))) as Box<dyn StateSampler>)
    });

    let device = DeviceDescriptor::new(GAMEPAD_HANDLE, 0);
    let count = Arc::new(Mutex::new(0usize));
    let c = count.clone();
    let request = InputSubscriptionRequest::new(
        device,
        BindingDescriptor::new(BindingKind::Axis, 0),
        SubscriptionDescriptor::new(SubscriberId(1), ProfileId(1)),
        move |_| *c.lock().unwrap() += 1,
    );

    provider.subscribe_input(request.clone()).unwrap();
    assert!(wait_until(|| *count.lock().unwrap() > 0));

    assert!(provider.unsubscribe_input(&request).unwrap());
    let at_teardown = *count.lock().unwrap();
    settle();
    assert_eq!(*count.lock().unwrap(), at_teardown);

    // Unsubscribing again reports that nothing was registered.
    assert!(!provider.unsubscribe_input(&request).unwrap());
}

/// Transport that exposes its sinks so the test can play the MIDI runtime.
#[derive(Clone, Default)]
struct Loopback {
    sinks: Arc<Mutex<Vec<EventSink>>>,
}

impl MidiTransport for Loopback {
    fn connect(
        &self,
        _port: usize,
        sink: EventSink,
    ) -> Result<Box<dyn Any + Send>, patchbay::Error> {
        self.sinks.lock().unwrap().push(sink);
        Ok(Box::new(()))
    }
}

#[test]
fn host_runs_polled_and_event_backends_side_by_side() {
    let profiles = ActiveProfiles::new();
    let mut host = ProviderHost::new(fast_context(&profiles));

    let loopback = Loopback::default();
    let transport = loopback.clone();
    host.register("gamepad", |context| {
        Ok(Box::new(GamepadProvider::with_sampler_factory(
            context.clone(),
            |_| {
                Ok(Box::new(GamepadSampler::new(Replay::with_lx(&[0, 250])))
                    as Box<dyn StateSampler>)
            },
        )) as Box<dyn InputProvider>)
    })
    .unwrap();
    host.register("midi", move |context| {
        Ok(Box::new(MidiProvider::with_transport(
            context.clone(),
            MidiLibrary::from_port_names(vec!["pad".into()]),
            transport.clone(),
        )) as Box<dyn InputProvider>)
    })
    .unwrap();

    assert!(host.start_all().is_empty());
    assert_eq!(host.input_lists().len(), 2);
    host.profiles().set_active(ProfileId(1), true);

    // Gamepad path.
    let pad_seen = Arc::new(Mutex::new(Vec::new()));
    let s = pad_seen.clone();
    host.get("gamepad")
        .unwrap()
        .subscribe_input(InputSubscriptionRequest::new(
            DeviceDescriptor::new(GAMEPAD_HANDLE, 0),
            BindingDescriptor::new(BindingKind::Axis, 0),
            SubscriptionDescriptor::new(SubscriberId(1), ProfileId(1)),
            move |v| s.lock().unwrap().push(v),
        ))
        .unwrap();

    // MIDI path.
    let cc_seen = Arc::new(Mutex::new(Vec::new()));
    let s = cc_seen.clone();
    host.get("midi")
        .unwrap()
        .subscribe_input(InputSubscriptionRequest::new(
            DeviceDescriptor::new("midi:pad", 0),
            cc_binding(0, 21),
            SubscriptionDescriptor::new(SubscriberId(2), ProfileId(1)),
            move |v| s.lock().unwrap().push(v),
        ))
        .unwrap();

    loopback.sinks.lock().unwrap()[0].push(cc_binding(0, 21), 12345);

    assert!(wait_until(|| !pad_seen.lock().unwrap().is_empty()));
    assert_eq!(*pad_seen.lock().unwrap(), vec![250]);
    assert_eq!(*cc_seen.lock().unwrap(), vec![12345]);
}
