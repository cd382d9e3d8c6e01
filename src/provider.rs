//! Provider surface and the host-side provider registry.
//!
//! An [`InputProvider`] is one backend's public face: enumeration, the
//! subscribe/unsubscribe pair, and detection-mode control. Providers are
//! object-safe so the embedding application can treat gamepad, joystick,
//! and MIDI uniformly.
//!
//! Discovery is explicit: the application registers a named constructor per
//! provider on a [`ProviderHost`] at startup and instantiates them with one
//! shared [`EngineContext`]. There is no runtime scanning.

use crate::config::EngineConfig;
use crate::descriptor::{BindingDescriptor, DeviceDescriptor};
use crate::error::Error;
use crate::handler::DeviceHandler;
use crate::profiles::ActiveProfiles;
use crate::registry::DeviceRegistry;
use crate::report::{DeviceReport, ProviderReport};
use crate::subscription::{
    BindModeCallback, DetectionMode, InputSubscriptionRequest, OutputSubscriptionRequest,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::info;

/// Shared state every provider is constructed with.
#[derive(Clone, Default)]
pub struct EngineContext {
    pub profiles: ActiveProfiles,
    pub config: EngineConfig,
}

impl EngineContext {
    pub fn new(profiles: ActiveProfiles, config: EngineConfig) -> Self {
        Self { profiles, config }
    }
}

/// One device backend: enumeration plus the subscription engine around it.
pub trait InputProvider: Send {
    fn name(&self) -> &'static str;

    /// All devices this provider knows about, plugged or not.
    fn input_list(&self) -> ProviderReport;

    fn device_report(&self, descriptor: &DeviceDescriptor) -> Option<DeviceReport>;

    /// Register a subscription; creates the device handler on first use.
    fn subscribe_input(&self, request: InputSubscriptionRequest) -> Result<(), Error>;

    /// Remove a subscription; tears the device handler down when it was the
    /// last one. Returns whether the registration existed.
    fn unsubscribe_input(&self, request: &InputSubscriptionRequest) -> Result<bool, Error>;

    /// Switch a device between Subscription and Bind detection. Entering
    /// Bind mode creates the handler if needed; leaving it tears the
    /// handler down when nothing is subscribed.
    fn set_detection_mode(
        &self,
        mode: DetectionMode,
        descriptor: &DeviceDescriptor,
        callback: Option<BindModeCallback>,
    ) -> Result<(), Error>;
}

/// Output-capable backend (force feedback, LEDs, MIDI out).
///
/// Only the contract shape is defined here; none of the core backends
/// implement output yet. Subscribing claims the device, then the subscriber
/// pushes values binding by binding.
pub trait OutputProvider: Send {
    fn output_list(&self) -> ProviderReport;

    fn subscribe_output(&self, request: &OutputSubscriptionRequest) -> Result<(), Error>;

    fn unsubscribe_output(&self, request: &OutputSubscriptionRequest) -> Result<bool, Error>;

    /// Drive one output binding to `value` (canonical ranges, as for input).
    fn set_output_state(
        &self,
        request: &OutputSubscriptionRequest,
        binding: BindingDescriptor,
        value: i32,
    ) -> Result<(), Error>;
}

/// Registry + lifecycle plumbing shared by the polling backends.
///
/// Wraps a [`DeviceRegistry`] behind one lock and applies the common
/// policies: find-or-create on subscribe, teardown of handlers that report
/// empty, and the Bind/Subscription transitions on mode changes.
pub(crate) struct ProviderCore {
    pub context: EngineContext,
    registry: Mutex<DeviceRegistry>,
}

impl ProviderCore {
    pub fn new(context: EngineContext) -> Self {
        Self {
            context,
            registry: Mutex::new(DeviceRegistry::new()),
        }
    }

    pub fn subscribe(
        &self,
        request: InputSubscriptionRequest,
        create: impl FnOnce() -> Result<DeviceHandler, Error>,
    ) -> Result<(), Error> {
        let mut registry = self.registry.lock();
        let device = request.device.clone();
        let result = registry
            .get_or_create(&device, create)
            .and_then(|handler| handler.subscribe_input(request));
        if result.is_err() {
            // A rejected subscription must not leave an idle handler behind.
            registry.remove_if_empty(&device);
        }
        result
    }

    pub fn unsubscribe(&self, request: &InputSubscriptionRequest) -> bool {
        let mut registry = self.registry.lock();
        let existed = registry
            .get(&request.device)
            .map(|handler| handler.unsubscribe_input(request))
            .unwrap_or(false);
        registry.remove_if_empty(&request.device);
        existed
    }

    pub fn set_detection_mode(
        &self,
        mode: DetectionMode,
        descriptor: &DeviceDescriptor,
        callback: Option<BindModeCallback>,
        create: impl FnOnce() -> Result<DeviceHandler, Error>,
    ) -> Result<(), Error> {
        let mut registry = self.registry.lock();
        match mode {
            DetectionMode::Bind => {
                let handler = registry.get_or_create(descriptor, create)?;
                handler.set_detection_mode(DetectionMode::Bind, callback);
            }
            DetectionMode::Subscription => {
                if let Some(handler) = registry.get(descriptor) {
                    handler.set_detection_mode(DetectionMode::Subscription, None);
                }
                registry.remove_if_empty(descriptor);
            }
        }
        Ok(())
    }

    #[cfg(test)]
    pub fn is_tracked(&self, descriptor: &DeviceDescriptor) -> bool {
        self.registry.lock().is_tracked(descriptor)
    }
}

type ProviderFactory = Box<dyn Fn(&EngineContext) -> Result<Box<dyn InputProvider>, Error> + Send>;

/// Name → constructor registry populated by the embedding application.
#[derive(Default)]
pub struct ProviderHost {
    context: EngineContext,
    factories: HashMap<String, ProviderFactory>,
    providers: HashMap<String, Box<dyn InputProvider>>,
}

impl ProviderHost {
    pub fn new(context: EngineContext) -> Self {
        Self {
            context,
            factories: HashMap::new(),
            providers: HashMap::new(),
        }
    }

    /// Register a provider constructor under a unique name.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        factory: impl Fn(&EngineContext) -> Result<Box<dyn InputProvider>, Error> + Send + 'static,
    ) -> Result<(), Error> {
        let name = name.into();
        if self.factories.contains_key(&name) || self.providers.contains_key(&name) {
            return Err(Error::Provider(name, "already registered"));
        }
        self.factories.insert(name, Box::new(factory));
        Ok(())
    }

    /// Instantiate every registered provider that is not yet live.
    /// Constructors that fail are reported and skipped; the rest come up.
    pub fn start_all(&mut self) -> Vec<(String, Error)> {
        let mut failures = Vec::new();
        for (name, factory) in std::mem::take(&mut self.factories) {
            match factory(&self.context) {
                Ok(provider) => {
                    info!(provider = %name, "provider started");
                    self.providers.insert(name, provider);
                }
                Err(e) => {
                    failures.push((name.clone(), e));
                    // Keep the factory so a later start_all can retry.
                    self.factories.insert(name, factory);
                }
            }
        }
        failures
    }

    pub fn get(&self, name: &str) -> Option<&dyn InputProvider> {
        self.providers.get(name).map(|p| p.as_ref())
    }

    /// The active-profile gate shared by every provider.
    pub fn profiles(&self) -> &ActiveProfiles {
        &self.context.profiles
    }

    /// Input listings from every live provider.
    pub fn input_lists(&self) -> Vec<ProviderReport> {
        self.providers.values().map(|p| p.input_list()).collect()
    }
}
