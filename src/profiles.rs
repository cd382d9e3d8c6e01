//! The active-profile gate.
//!
//! [`ActiveProfiles`] is the process-wide set of profile identities that are
//! currently live. The embedding application constructs one handle at
//! startup and passes clones to every provider; UI-side code toggles
//! profiles with [`set_active`](ActiveProfiles::set_active) while sampling
//! threads read the set on every dispatch.
//!
//! Reads vastly outnumber writes, so the set sits behind a read-write lock.
//! A dispatch may observe a toggle up to one tick late; that staleness is
//! acceptable by contract.

use crate::descriptor::ProfileId;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;

/// Cheaply clonable handle to the shared set of active profiles.
#[derive(Clone, Default)]
pub struct ActiveProfiles {
    inner: Arc<RwLock<HashSet<ProfileId>>>,
}

impl ActiveProfiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Activate or deactivate a profile. Returns `true` if the set changed.
    pub fn set_active(&self, profile: ProfileId, active: bool) -> bool {
        let mut set = self.inner.write();
        if active {
            set.insert(profile)
        } else {
            set.remove(&profile)
        }
    }

    /// Whether callbacks gated by `profile` should currently fire.
    #[inline]
    pub fn is_active(&self, profile: ProfileId) -> bool {
        self.inner.read().contains(&profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_and_query() {
        let profiles = ActiveProfiles::new();
        let p = ProfileId(7);
        assert!(!profiles.is_active(p));

        assert!(profiles.set_active(p, true));
        assert!(profiles.is_active(p));
        // Re-activating an already active profile is a no-op.
        assert!(!profiles.set_active(p, true));

        assert!(profiles.set_active(p, false));
        assert!(!profiles.is_active(p));
        assert!(!profiles.set_active(p, false));
    }

    #[test]
    fn clones_share_state() {
        let a = ActiveProfiles::new();
        let b = a.clone();
        a.set_active(ProfileId(1), true);
        assert!(b.is_active(ProfileId(1)));
    }
}
