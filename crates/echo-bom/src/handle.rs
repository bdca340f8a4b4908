// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Type-erased handles to native (in-memory) objects.
//!
//! [`NativeHandle`] owns its object and is what marshalers hand back; the load
//! context caches them per content id. [`LiveRef`] is the weak counterpart
//! kept on value and object nodes as a cache of the object the engine is
//! actively using. Neither participates in equality, hashing or encoding.

use std::any::Any;
use std::sync::{Arc, Weak};

/// Strong, shareable handle to a native object produced by a marshaler.
#[derive(Clone)]
pub struct NativeHandle(Arc<dyn Any + Send + Sync>);

impl NativeHandle {
    /// Wraps a native value.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Wraps an already shared native value.
    pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self(value)
    }

    /// Borrows the object as `T` if it is one.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// Converts into a typed `Arc<T>`, handing the handle back on mismatch.
    ///
    /// # Errors
    /// Returns `self` unchanged when the object is not a `T`.
    pub fn downcast<T: Any + Send + Sync>(self) -> Result<Arc<T>, Self> {
        self.0.downcast::<T>().map_err(Self)
    }

    /// Returns `true` if the object is a `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.0.is::<T>()
    }

    /// Borrows the object untyped.
    pub fn as_any(&self) -> &(dyn Any + Send + Sync) {
        &*self.0
    }

    /// Mutable access while this is the only handle and no live references
    /// exist.
    pub fn get_mut(&mut self) -> Option<&mut (dyn Any + Send + Sync)> {
        Arc::get_mut(&mut self.0)
    }

    /// Creates a weak reference suitable for caching on a node.
    pub fn downgrade(&self) -> LiveRef {
        LiveRef(Arc::downgrade(&self.0))
    }

    /// Returns `true` if both handles point at the same object.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for NativeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("NativeHandle").finish_non_exhaustive()
    }
}

/// Weak cache reference from a node to the native object it was built from.
#[derive(Clone)]
pub struct LiveRef(Weak<dyn Any + Send + Sync>);

impl LiveRef {
    /// Upgrades to a strong handle while the native object is still alive.
    pub fn upgrade(&self) -> Option<NativeHandle> {
        self.0.upgrade().map(NativeHandle)
    }
}

impl std::fmt::Debug for LiveRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let alive = self.0.strong_count() > 0;
        f.debug_struct("LiveRef").field("alive", &alive).finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn downcast_round_trip() {
        let handle = NativeHandle::new(42u32);
        assert!(handle.is::<u32>());
        assert_eq!(handle.downcast_ref::<u32>(), Some(&42));
        let handle = handle.downcast::<String>().unwrap_err();
        assert_eq!(*handle.downcast::<u32>().unwrap(), 42);
    }

    #[test]
    fn get_mut_requires_a_unique_handle() {
        let mut handle = NativeHandle::new(1u8);
        *handle.get_mut().unwrap().downcast_mut::<u8>().unwrap() = 2;
        let other = handle.clone();
        assert!(handle.get_mut().is_none());
        drop(other);
        let live = handle.downgrade();
        assert!(handle.get_mut().is_none());
        drop(live);
        assert_eq!(handle.downcast_ref::<u8>(), Some(&2));
    }

    #[test]
    fn live_ref_does_not_keep_object_alive() {
        let handle = NativeHandle::new(String::from("texture"));
        let live = handle.downgrade();
        assert!(live.upgrade().is_some());
        drop(handle);
        assert!(live.upgrade().is_none());
    }
}
