//! Per-device subscription handling and the sampling-loop lifecycle.
//!
//! A [`DeviceHandler`] owns everything the engine tracks for one device:
//! the lazily created [`InputMonitor`]s, the current [`DetectionMode`], and
//! (for polling-style backends) the dedicated sampling thread.
//!
//! # Concurrency model
//! - One sampling thread per polling-style device. Event-driven backends
//!   have no thread; the native runtime pushes into an [`EventSink`].
//! - One mutex per device guards the monitor map, the mode, and bind-mode
//!   bookkeeping. The sampling tick and all structural mutation take that
//!   same lock, so a monitor pruned mid-tick is never visited again.
//! - The loop's activation is a two-flag handshake: callers set the
//!   *desired* state and block on a condvar until the loop publishes the
//!   matching *actual* state. The loop parks (stays alive, does no work)
//!   while undesired, so it can be reactivated without recreating its
//!   resources.
//! - Disposal is cooperative: a shutdown flag plus a join. No sample
//!   dispatch survives [`DeviceHandler::dispose`].
//!
//! Subscriber callbacks run on the sampling/native thread while the device
//! lock is held; they must return quickly and must not call back into the
//! provider that invoked them.

use crate::descriptor::{BindingDescriptor, DeviceDescriptor};
use crate::error::Error;
use crate::monitor::InputMonitor;
use crate::profiles::ActiveProfiles;
use crate::subscription::{
    BindModeCallback, BindModeUpdate, DetectionMode, InputSubscriptionRequest,
};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Backend-specific sampler for polling-style devices.
///
/// Once per tick, [`sample`](StateSampler::sample) appends the complete
/// current mapped state as `(binding, canonical value)` pairs — one pair per
/// binding the device exposes, normalized per [`crate::normalize`]. Return
/// [`Error::DeviceUnavailable`] to skip the tick without tearing the
/// handler down; last reported values freeze until the device returns.
pub trait StateSampler: Send + 'static {
    fn sample(&mut self, out: &mut Vec<(BindingDescriptor, i32)>) -> Result<(), Error>;
}

/// desired/actual/shutdown flags shared between callers and the loop.
#[derive(Default)]
struct LoopFlags {
    desired: bool,
    active: bool,
    shutdown: bool,
}

struct LoopControl {
    flags: Mutex<LoopFlags>,
    cond: Condvar,
    /// Event-driven handlers have no loop; their actual state tracks the
    /// desired state directly instead of being published by a thread.
    has_loop: bool,
}

impl LoopControl {
    fn new(has_loop: bool) -> Arc<Self> {
        Arc::new(Self {
            flags: Mutex::new(LoopFlags::default()),
            cond: Condvar::new(),
            has_loop,
        })
    }

    /// Caller side: request activation (`true`) or parking (`false`) and
    /// wait until the loop has observed the request. Returns the previous
    /// desired state so callers can restore it.
    ///
    /// The wait tracks the *latest* desired state, so concurrent requests
    /// cannot strand a caller waiting for a superseded value.
    fn set_desired(&self, on: bool) -> bool {
        let mut f = self.flags.lock();
        let prev = f.desired;
        f.desired = on;
        if !self.has_loop {
            f.active = on && !f.shutdown;
            return prev;
        }
        self.cond.notify_all();
        while f.active != f.desired && !f.shutdown {
            self.cond.wait(&mut f);
        }
        prev
    }

    fn request_shutdown(&self) {
        let mut f = self.flags.lock();
        f.shutdown = true;
        self.cond.notify_all();
    }

    fn is_shutdown(&self) -> bool {
        self.flags.lock().shutdown
    }

    /// Loop side: park until activation is desired, publishing the actual
    /// state on every transition. Returns `false` on shutdown.
    fn begin_tick(&self) -> bool {
        let mut f = self.flags.lock();
        loop {
            if f.shutdown {
                if f.active {
                    f.active = false;
                    self.cond.notify_all();
                }
                return false;
            }
            if f.desired {
                if !f.active {
                    f.active = true;
                    self.cond.notify_all();
                }
                return true;
            }
            if f.active {
                f.active = false;
                self.cond.notify_all();
            }
            self.cond.wait(&mut f);
        }
    }

    /// Loop side: sleep out the remainder of the tick, waking early when a
    /// flag changes.
    fn idle(&self, interval: Duration) {
        let mut f = self.flags.lock();
        if f.shutdown || !f.desired {
            return;
        }
        let _ = self.cond.wait_for(&mut f, interval);
    }
}

/// State behind the per-device mutex.
struct HandlerState {
    monitors: HashMap<BindingDescriptor, InputMonitor>,
    mode: DetectionMode,
    bind_callback: Option<BindModeCallback>,
    /// Last value seen per binding while in Bind mode.
    bind_last: HashMap<BindingDescriptor, i32>,
    /// Whether the bind-mode baseline tick has been consumed.
    bind_primed: bool,
}

struct HandlerShared {
    descriptor: DeviceDescriptor,
    profiles: ActiveProfiles,
    /// Every binding the device maps; subscriptions outside this set are
    /// rejected with no partial state.
    bindings: HashSet<BindingDescriptor>,
    inner: Mutex<HandlerState>,
}

impl HandlerShared {
    /// Dispatch one full-state sample set (polling path).
    fn dispatch_full(&self, pairs: &[(BindingDescriptor, i32)]) {
        let mut st = self.inner.lock();
        match st.mode {
            DetectionMode::Subscription => {
                for (binding, value) in pairs {
                    if let Some(monitor) = st.monitors.get_mut(binding) {
                        monitor.process_sample(*value, &self.profiles);
                    }
                }
            }
            DetectionMode::Bind => {
                if !st.bind_primed {
                    // First full sample after entering Bind mode only
                    // records the baseline, so a control already held when
                    // detection started does not instantly report.
                    for (binding, value) in pairs {
                        st.bind_last.insert(*binding, *value);
                    }
                    st.bind_primed = true;
                    return;
                }
                for (binding, value) in pairs {
                    self.bind_dispatch(&mut st, *binding, *value);
                }
            }
        }
    }

    /// Dispatch one pushed event (event-driven path). Delta sources carry no
    /// baseline tick; an unseen binding compares against rest.
    fn dispatch_event(&self, st: &mut HandlerState, binding: BindingDescriptor, value: i32) {
        match st.mode {
            DetectionMode::Subscription => {
                if let Some(monitor) = st.monitors.get_mut(&binding) {
                    monitor.process_sample(value, &self.profiles);
                }
            }
            DetectionMode::Bind => self.bind_dispatch(st, binding, value),
        }
    }

    fn bind_dispatch(&self, st: &mut HandlerState, binding: BindingDescriptor, value: i32) {
        let prev = st.bind_last.insert(binding, value).unwrap_or(0);
        if value == prev || value == 0 {
            return;
        }
        if let Some(callback) = &st.bind_callback {
            callback(BindModeUpdate {
                device: self.descriptor.clone(),
                binding,
                value,
            });
        }
    }
}

/// Thread-safe inlet for event-driven backends.
///
/// The native callback parses its message into a `(binding, value)` pair
/// and pushes it here; mode dispatch, dedupe, and profile gating then run
/// exactly as on the polling path. Pushes after disposal are dropped.
#[derive(Clone)]
pub struct EventSink {
    shared: Arc<HandlerShared>,
    control: Arc<LoopControl>,
}

impl EventSink {
    pub fn push(&self, binding: BindingDescriptor, value: i32) {
        let mut st = self.shared.inner.lock();
        // Checked under the device lock so a push racing dispose either
        // drains before dispose's barrier or observes the shutdown flag.
        if self.control.is_shutdown() {
            return;
        }
        self.shared.dispatch_event(&mut st, binding, value);
    }
}

/// Owns all input monitors and the sampling lifecycle for one device.
pub struct DeviceHandler {
    shared: Arc<HandlerShared>,
    control: Arc<LoopControl>,
    thread: Option<JoinHandle<()>>,
}

impl DeviceHandler {
    /// Create a handler for a polling-style device and start its sampling
    /// thread. The thread is born parked; the first subscription (or Bind
    /// mode) activates it.
    pub fn polling(
        descriptor: DeviceDescriptor,
        bindings: impl IntoIterator<Item = BindingDescriptor>,
        profiles: ActiveProfiles,
        sampler: Box<dyn StateSampler>,
        interval: Duration,
    ) -> Self {
        let shared = Self::shared(descriptor, bindings, profiles);
        let control = LoopControl::new(true);
        let thread = {
            let shared = Arc::clone(&shared);
            let control = Arc::clone(&control);
            thread::spawn(move || sampling_loop(shared, control, sampler, interval))
        };
        Self {
            shared,
            control,
            thread: Some(thread),
        }
    }

    /// Create a handler for an event-driven device. No thread is spawned;
    /// the returned [`EventSink`] is handed to the native callback.
    pub fn event_driven(
        descriptor: DeviceDescriptor,
        bindings: impl IntoIterator<Item = BindingDescriptor>,
        profiles: ActiveProfiles,
    ) -> (Self, EventSink) {
        let shared = Self::shared(descriptor, bindings, profiles);
        let control = LoopControl::new(false);
        let sink = EventSink {
            shared: Arc::clone(&shared),
            control: Arc::clone(&control),
        };
        (
            Self {
                shared,
                control,
                thread: None,
            },
            sink,
        )
    }

    fn shared(
        descriptor: DeviceDescriptor,
        bindings: impl IntoIterator<Item = BindingDescriptor>,
        profiles: ActiveProfiles,
    ) -> Arc<HandlerShared> {
        Arc::new(HandlerShared {
            descriptor,
            profiles,
            bindings: bindings.into_iter().collect(),
            inner: Mutex::new(HandlerState {
                monitors: HashMap::new(),
                mode: DetectionMode::Subscription,
                bind_callback: None,
                bind_last: HashMap::new(),
                bind_primed: false,
            }),
        })
    }

    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.shared.descriptor
    }

    /// Register a subscription, lazily creating the binding's monitor. The
    /// device's first subscription activates the sampling loop before this
    /// call returns.
    pub fn subscribe_input(&self, request: InputSubscriptionRequest) -> Result<(), Error> {
        if !self.shared.bindings.contains(&request.binding) {
            return Err(Error::UnknownBinding {
                device: self.shared.descriptor.clone(),
                binding: request.binding,
            });
        }
        debug!(
            device = %self.shared.descriptor,
            binding = %request.binding,
            subscriber = request.subscription.subscriber.0,
            "adding input subscription"
        );
        {
            let mut st = self.shared.inner.lock();
            st.monitors
                .entry(request.binding)
                .or_default()
                .add(request);
        }
        self.control.set_desired(true);
        Ok(())
    }

    /// Remove a subscription; the monitor is pruned on its last subscriber
    /// and the loop parks when the whole device goes quiet. Returns whether
    /// the registration existed.
    pub fn unsubscribe_input(&self, request: &InputSubscriptionRequest) -> bool {
        let (existed, desired) = {
            let mut st = self.shared.inner.lock();
            let existed = match st.monitors.get_mut(&request.binding) {
                Some(monitor) => {
                    let existed = monitor.remove(request.subscription.subscriber);
                    if !monitor.has_subscribers() {
                        st.monitors.remove(&request.binding);
                    }
                    existed
                }
                None => false,
            };
            (
                existed,
                !st.monitors.is_empty() || st.mode == DetectionMode::Bind,
            )
        };
        if existed {
            debug!(
                device = %self.shared.descriptor,
                binding = %request.binding,
                subscriber = request.subscription.subscriber.0,
                "removed input subscription"
            );
        }
        self.control.set_desired(desired);
        existed
    }

    /// Switch between Subscription and Bind detection.
    ///
    /// The loop is parked for the swap (the two-flag handshake guarantees no
    /// tick is in flight), then re-activated according to the new state:
    /// Bind mode always samples; Subscription mode samples only while
    /// monitors exist. Existing subscribers are kept either way.
    pub fn set_detection_mode(&self, mode: DetectionMode, callback: Option<BindModeCallback>) {
        self.control.set_desired(false);
        let desired = {
            let mut st = self.shared.inner.lock();
            st.mode = mode;
            st.bind_callback = match mode {
                DetectionMode::Bind => callback,
                DetectionMode::Subscription => None,
            };
            st.bind_last.clear();
            st.bind_primed = false;
            !st.monitors.is_empty() || mode == DetectionMode::Bind
        };
        debug!(device = %self.shared.descriptor, ?mode, "detection mode changed");
        self.control.set_desired(desired);
    }

    /// True iff no monitor holds subscribers and the handler is in
    /// Subscription mode — i.e. the registry may tear it down.
    pub fn is_empty(&self) -> bool {
        let st = self.shared.inner.lock();
        st.monitors.is_empty() && st.mode == DetectionMode::Subscription
    }

    /// Terminate the sampling task (if any) and bar further event pushes.
    /// On return no callback will fire again, even if the native source
    /// keeps emitting.
    pub fn dispose(&mut self) {
        self.control.request_shutdown();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        // Barrier: an event push that passed the shutdown check before we
        // set it is still inside the device lock; taking it here means
        // dispose returns only after that dispatch has drained.
        drop(self.shared.inner.lock());
    }
}

impl Drop for DeviceHandler {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn sampling_loop(
    shared: Arc<HandlerShared>,
    control: Arc<LoopControl>,
    mut sampler: Box<dyn StateSampler>,
    interval: Duration,
) {
    debug!(device = %shared.descriptor, "sampling loop started");
    let mut buf: Vec<(BindingDescriptor, i32)> = Vec::new();
    loop {
        if !control.begin_tick() {
            break;
        }
        buf.clear();
        match sampler.sample(&mut buf) {
            Ok(()) => shared.dispatch_full(&buf),
            Err(Error::DeviceUnavailable(_)) => {
                // Not an error: values freeze until the device returns.
                trace!(device = %shared.descriptor, "device unavailable, tick skipped");
            }
            Err(e) => {
                warn!(device = %shared.descriptor, error = %e, "sampling failed, tick skipped");
            }
        }
        control.idle(interval);
    }
    debug!(device = %shared.descriptor, "sampling loop stopped");
}
