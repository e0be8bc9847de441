//! Identifier types for in-flight requests and their owners.
//!
//! This module defines strong types for the handle of a started request
//! (`RequestId`) and for the logical request site that owns it (`OwnerId`).

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque handle for one started request.
///
/// A `RequestId` is allocated by the executor when a request is issued and is
/// unique for the executor's lifetime. It is used to cancel the request and to
/// check whether a completion is still wanted.
///
/// # Design
///
/// `RequestId` is a newtype wrapper around `u64` that provides:
/// - Type safety (can't be confused with an owner id or a plain counter)
/// - Cheap `Copy` semantics for registry bookkeeping
///
/// # Examples
///
/// ```
/// use api_dispatch_core::id::RequestId;
///
/// let id = RequestId::new(7);
/// assert_eq!(id.value(), 7);
/// assert_eq!(id.to_string(), "req-7");
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(u64);

impl RequestId {
    /// Create a `RequestId` from a raw value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// Identifier of a logical request site (an owner of in-flight requests).
///
/// # Examples
///
/// ```
/// use api_dispatch_core::id::OwnerId;
///
/// let owner = OwnerId::new(3);
/// assert_eq!(owner.to_string(), "owner-3");
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OwnerId(u64);

impl OwnerId {
    /// Create an `OwnerId` from a raw value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "owner-{}", self.0)
    }
}

/// Monotonic allocator for identifiers.
///
/// Starts at 1 so that 0 never names a live request.
#[derive(Debug)]
pub struct IdAllocator {
    next: AtomicU64,
}

impl IdAllocator {
    /// Create a new allocator.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Allocate the next request id.
    pub fn next_request(&self) -> RequestId {
        RequestId(self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// Allocate the next owner id.
    pub fn next_owner(&self) -> OwnerId {
        OwnerId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}
