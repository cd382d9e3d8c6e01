//! Per-binding subscriber set with change detection.

use crate::descriptor::SubscriberId;
use crate::profiles::ActiveProfiles;
use crate::subscription::InputSubscriptionRequest;
use tracing::trace;

/// Owns the subscribers for exactly one binding on one device.
///
/// Holds the last observed value and fans changed values out to subscribers
/// whose profile is currently active. Subscribers are kept in insertion
/// order; re-subscribing under the same [`SubscriberId`] replaces in place.
pub struct InputMonitor {
    /// Last value seen on this binding. Starts at the canonical rest value,
    /// so an initial sample at rest does not fire.
    last_value: i32,
    subscriptions: Vec<InputSubscriptionRequest>,
}

impl InputMonitor {
    pub fn new() -> Self {
        Self {
            last_value: 0,
            subscriptions: Vec::new(),
        }
    }

    /// Register a subscriber, replacing any previous registration under the
    /// same subscriber id. Always succeeds; returns `true` for symmetry with
    /// [`remove`](Self::remove).
    pub fn add(&mut self, request: InputSubscriptionRequest) -> bool {
        let id = request.subscription.subscriber;
        match self.position(id) {
            Some(i) => self.subscriptions[i] = request,
            None => self.subscriptions.push(request),
        }
        true
    }

    /// Unregister a subscriber. Returns whether a registration existed.
    pub fn remove(&mut self, subscriber: SubscriberId) -> bool {
        match self.position(subscriber) {
            Some(i) => {
                self.subscriptions.remove(i);
                true
            }
            None => false,
        }
    }

    #[inline]
    pub fn has_subscribers(&self) -> bool {
        !self.subscriptions.is_empty()
    }

    /// Feed one sample from the sampling path.
    ///
    /// Backends that report full state every tick rely on the equal-value
    /// early-out to avoid redundant callback storms. Safe to call with zero
    /// subscribers (unsubscription can race an in-flight sample).
    pub fn process_sample(&mut self, value: i32, profiles: &ActiveProfiles) {
        if value == self.last_value {
            return;
        }
        self.last_value = value;
        for sub in &self.subscriptions {
            if profiles.is_active(sub.subscription.profile) {
                (sub.callback)(value);
            } else {
                trace!(
                    subscriber = sub.subscription.subscriber.0,
                    profile = sub.subscription.profile.0,
                    "skipping subscriber, profile inactive"
                );
            }
        }
    }

    fn position(&self, subscriber: SubscriberId) -> Option<usize> {
        self.subscriptions
            .iter()
            .position(|s| s.subscription.subscriber == subscriber)
    }
}

impl Default for InputMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn request(subscriber: u64, profile: u64, seen: Arc<Mutex<Vec<i32>>>) -> InputSubscriptionRequest {
        InputSubscriptionRequest::new(
            DeviceDescriptor::new("test", 0),
            BindingDescriptor::new(BindingKind::Axis, 0),
            SubscriptionDescriptor::new(SubscriberId(subscriber), ProfileId(profile)),
            move |v| seen.lock().unwrap().push(v),
        )
    }

    #[test]
    fn has_subscribers_tracks_add_remove() {
        let mut m = InputMonitor::new();
        assert!(!m.has_subscribers());

        let seen = Arc::new(Mutex::new(Vec::new()));
        assert!(m.add(request(1, 1, seen.clone())));
        assert!(m.has_subscribers());

        assert!(!m.remove(SubscriberId(99)));
        assert!(m.has_subscribers());

        assert!(m.remove(SubscriberId(1)));
        assert!(!m.has_subscribers());
    }

    #[test]
    fn resubscribe_replaces_not_duplicates() {
        let mut m = InputMonitor::new();
        let profiles = ActiveProfiles::new();
        profiles.set_active(ProfileId(1), true);

        let first = Arc::new(Mutex::new(Vec::new()));
        let second = Arc::new(Mutex::new(Vec::new()));
        m.add(request(1, 1, first.clone()));
        m.add(request(1, 1, second.clone()));

        m.process_sample(5, &profiles);
        assert!(first.lock().unwrap().is_empty());
        assert_eq!(*second.lock().unwrap(), vec![5]);
    }

    #[test]
    fn equal_value_fires_at_most_once() {
        let mut m = InputMonitor::new();
        let profiles = ActiveProfiles::new();
        profiles.set_active(ProfileId(1), true);
        let seen = Arc::new(Mutex::new(Vec::new()));
        m.add(request(1, 1, seen.clone()));

        m.process_sample(100, &profiles);
        m.process_sample(100, &profiles);
        assert_eq!(*seen.lock().unwrap(), vec![100]);
    }

    #[test]
    fn initial_rest_sample_does_not_fire() {
        let mut m = InputMonitor::new();
        let profiles = ActiveProfiles::new();
        profiles.set_active(ProfileId(1), true);
        let seen = Arc::new(Mutex::new(Vec::new()));
        m.add(request(1, 1, seen.clone()));

        m.process_sample(0, &profiles);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn inactive_profile_is_skipped_but_value_still_updates() {
        let mut m = InputMonitor::new();
        let profiles = ActiveProfiles::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        m.add(request(1, 1, seen.clone()));

        // Profile inactive: value recorded, callback skipped.
        m.process_sample(100, &profiles);
        assert!(seen.lock().unwrap().is_empty());

        // Reactivating alone does not fire for the unchanged value.
        profiles.set_active(ProfileId(1), true);
        m.process_sample(100, &profiles);
        assert!(seen.lock().unwrap().is_empty());

        // A new value fires normally.
        m.process_sample(200, &profiles);
        assert_eq!(*seen.lock().unwrap(), vec![200]);
    }

    #[test]
    fn fan_out_preserves_insertion_order() {
        let mut m = InputMonitor::new();
        let profiles = ActiveProfiles::new();
        profiles.set_active(ProfileId(1), true);

        let order = Arc::new(Mutex::new(Vec::new()));
        for id in [3u64, 1, 2] {
            let order = order.clone();
            m.add(InputSubscriptionRequest::new(
                DeviceDescriptor::new("test", 0),
                BindingDescriptor::new(BindingKind::Axis, 0),
                SubscriptionDescriptor::new(SubscriberId(id), ProfileId(1)),
                move |_| order.lock().unwrap().push(id),
            ));
        }

        m.process_sample(1, &profiles);
        assert_eq!(*order.lock().unwrap(), vec![3, 1, 2]);
    }

    #[test]
    fn sample_with_zero_subscribers_is_a_no_op() {
        let mut m = InputMonitor::new();
        let profiles = ActiveProfiles::new();
        m.process_sample(42, &profiles);

        // Still consistent afterwards: a late add sees the updated last value.
        let fired = Arc::new(AtomicUsize::new(0));
        let f = fired.clone();
        m.add(InputSubscriptionRequest::new(
            DeviceDescriptor::new("test", 0),
            BindingDescriptor::new(BindingKind::Axis, 0),
            SubscriptionDescriptor::new(SubscriberId(1), ProfileId(1)),
            move |_| {
                f.fetch_add(1, Ordering::SeqCst);
            },
        ));
        profiles.set_active(ProfileId(1), true);
        m.process_sample(42, &profiles);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
