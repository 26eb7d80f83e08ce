//! Scoped release of vendor allocations.
//!
//! Constraint descriptors, ROI descriptors and failed-parameter lists are
//! allocated by the SDK and must be handed back exactly once. Wrapping every
//! successful fetch in a [`ReleaseGuard`] ties the release to scope exit, so
//! early returns and `?` cannot leak them.

use capture_core::{CameraDevice, DeviceResult, ObjectId, VendorObject};
use std::ops::{Deref, DerefMut};

/// Owns a vendor allocation until it goes out of scope.
#[must_use = "dropping the guard releases the vendor object immediately"]
pub struct ReleaseGuard<'a, D: CameraDevice + ?Sized, T> {
    device: &'a D,
    id: ObjectId,
    value: T,
    released: bool,
}

impl<'a, D: CameraDevice + ?Sized, T> ReleaseGuard<'a, D, T> {
    /// Take ownership of `object`; it is released through `device` on drop.
    pub fn new(device: &'a D, object: VendorObject<T>) -> Self {
        Self {
            device,
            id: object.id,
            value: object.value,
            released: false,
        }
    }

    /// Guard the result of a fetch. Nothing needs releasing when the fetch failed.
    pub fn wrap(device: &'a D, fetched: DeviceResult<VendorObject<T>>) -> DeviceResult<Self> {
        fetched.map(|object| Self::new(device, object))
    }

    /// Allocation this guard releases.
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Release now and report the outcome instead of logging it.
    pub fn release(mut self) -> DeviceResult<()> {
        self.released = true;
        self.device.release(self.id)
    }
}

impl<D: CameraDevice + ?Sized, T> Deref for ReleaseGuard<'_, D, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<D: CameraDevice + ?Sized, T> DerefMut for ReleaseGuard<'_, D, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<D: CameraDevice + ?Sized, T> Drop for ReleaseGuard<'_, D, T> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(e) = self.device.release(self.id) {
            tracing::warn!(object = %self.id, code = e.code(), "Failed to release vendor object: {}", e);
        }
    }
}
