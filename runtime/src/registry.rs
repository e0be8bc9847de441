//! In-flight registry: request handles grouped by owner.

use crate::lock;
use api_dispatch_core::id::{OwnerId, RequestId};
use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

/// Tracks which requests each owner has in flight.
///
/// Registration, release and bulk removal all happen under one lock, so a
/// dispatch racing a cancel never loses a registration.
#[derive(Debug, Default)]
pub struct InFlightRegistry {
    owners: Mutex<HashMap<OwnerId, BTreeSet<RequestId>>>,
}

impl InFlightRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `request` under `owner`. Registering twice is a no-op.
    pub fn register(&self, owner: OwnerId, request: RequestId) {
        lock(&self.owners).entry(owner).or_default().insert(request);
    }

    /// Release `request` after it completed. Returns whether it was held.
    pub fn release(&self, owner: OwnerId, request: RequestId) -> bool {
        let mut owners = lock(&self.owners);
        let Some(set) = owners.get_mut(&owner) else {
            return false;
        };
        let removed = set.remove(&request);
        if set.is_empty() {
            owners.remove(&owner);
        }
        removed
    }

    /// Remove and return every handle of `owner`.
    pub fn take(&self, owner: OwnerId) -> Vec<RequestId> {
        lock(&self.owners)
            .remove(&owner)
            .map(|set| set.into_iter().collect())
            .unwrap_or_default()
    }

    /// Handles currently held by `owner`, in allocation order.
    #[must_use]
    pub fn handles(&self, owner: OwnerId) -> Vec<RequestId> {
        lock(&self.owners)
            .get(&owner)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Number of handles held by `owner`.
    #[must_use]
    pub fn len(&self, owner: OwnerId) -> usize {
        lock(&self.owners).get(&owner).map_or(0, BTreeSet::len)
    }

    /// Whether no owner holds any handle.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        lock(&self.owners).is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)] // Test code can use expect/unwrap
mod tests {
    use super::*;

    #[test]
    fn register_release_and_take() {
        let registry = InFlightRegistry::new();
        let owner = OwnerId::new(1);
        let other = OwnerId::new(2);

        registry.register(owner, RequestId::new(10));
        registry.register(owner, RequestId::new(11));
        registry.register(owner, RequestId::new(11));
        registry.register(other, RequestId::new(12));
        assert_eq!(registry.len(owner), 2);

        assert!(registry.release(owner, RequestId::new(10)));
        assert!(!registry.release(owner, RequestId::new(10)));
        assert_eq!(registry.handles(owner), vec![RequestId::new(11)]);

        assert_eq!(registry.take(owner), vec![RequestId::new(11)]);
        assert_eq!(registry.len(owner), 0);
        assert!(registry.take(owner).is_empty());
        assert_eq!(registry.len(other), 1);
    }

    #[test]
    fn empty_sets_are_dropped() {
        let registry = InFlightRegistry::new();
        let owner = OwnerId::new(1);
        registry.register(owner, RequestId::new(1));
        registry.release(owner, RequestId::new(1));
        assert!(registry.is_empty());
    }

    #[test]
    fn concurrent_registration_is_not_lost() {
        let registry = std::sync::Arc::new(InFlightRegistry::new());
        let owner = OwnerId::new(7);

        let threads: Vec<_> = (0..8u64)
            .map(|t| {
                let registry = std::sync::Arc::clone(&registry);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        registry.register(owner, RequestId::new(t * 1000 + i));
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().expect("thread finished");
        }

        assert_eq!(registry.len(owner), 800);
    }
}
