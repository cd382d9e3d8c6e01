//! Maps device descriptors to their live handlers.
//!
//! One registry per provider. A handler is created on the first
//! subscription (or bind-mode request) for a device and torn down once it
//! reports empty — creation is find-or-insert, never insert-always, so two
//! handlers can never exist for the same descriptor.

use crate::descriptor::DeviceDescriptor;
use crate::error::Error;
use crate::handler::DeviceHandler;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tracing::debug;

#[derive(Default)]
pub struct DeviceRegistry {
    handlers: HashMap<DeviceDescriptor, DeviceHandler>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find the handler for `descriptor`, creating it with `create` if the
    /// device is not yet tracked.
    pub fn get_or_create(
        &mut self,
        descriptor: &DeviceDescriptor,
        create: impl FnOnce() -> Result<DeviceHandler, Error>,
    ) -> Result<&mut DeviceHandler, Error> {
        match self.handlers.entry(descriptor.clone()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(slot) => {
                let handler = create()?;
                debug!(device = %descriptor, "tracking device");
                Ok(slot.insert(handler))
            }
        }
    }

    pub fn get(&self, descriptor: &DeviceDescriptor) -> Option<&DeviceHandler> {
        self.handlers.get(descriptor)
    }

    #[inline]
    pub fn is_tracked(&self, descriptor: &DeviceDescriptor) -> bool {
        self.handlers.contains_key(descriptor)
    }

    /// Stop tracking `descriptor`, disposing its handler (sampling task
    /// terminated before this returns).
    pub fn remove(&mut self, descriptor: &DeviceDescriptor) -> bool {
        match self.handlers.remove(descriptor) {
            Some(mut handler) => {
                handler.dispose();
                debug!(device = %descriptor, "device released");
                true
            }
            None => false,
        }
    }

    /// Tear the handler down iff it reports empty. Called by providers after
    /// unsubscription or a mode switch back to Subscription.
    pub fn remove_if_empty(&mut self, descriptor: &DeviceDescriptor) -> bool {
        let empty = self
            .handlers
            .get(descriptor)
            .map(DeviceHandler::is_empty)
            .unwrap_or(false);
        if empty {
            self.remove(descriptor)
        } else {
            false
        }
    }
}
