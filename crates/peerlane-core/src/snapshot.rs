use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crossbeam::epoch::{self, Atomic, Owned};

/// An atomically replaceable reference to an immutable value.
///
/// Readers get a cheap `Arc` clone of the current value and never block.
/// Writers publish a replacement with [`Snapshot::compare_and_set`] (succeeds
/// only if the value is still the one the writer read) or with the
/// [`Snapshot::update`] retry loop. Superseded values are reclaimed through
/// epoch-based reclamation once no reader can still observe them.
pub struct Snapshot<T> {
    inner: Atomic<Arc<T>>,
}

impl<T: Send + Sync> Snapshot<T> {
    /// Create a snapshot holding `value`.
    pub fn new(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    /// Create a snapshot holding an already shared value.
    pub fn from_arc(value: Arc<T>) -> Self {
        Self {
            inner: Atomic::new(value),
        }
    }

    /// Current value.
    pub fn load(&self) -> Arc<T> {
        let guard = epoch::pin();
        let current = self.inner.load(Ordering::Acquire, &guard);
        // SAFETY: the pointer is non-null (set at construction and only ever
        // replaced by non-null values) and `guard` keeps it from being
        // reclaimed until the `Arc` has been cloned.
        unsafe { current.deref() }.clone()
    }

    /// Replace the value with `new` if it is still `expected`.
    ///
    /// Identity is pointer identity of the `Arc` returned by [`Snapshot::load`].
    /// Returns `false` when another writer got there first; the caller is
    /// expected to reload and retry.
    pub fn compare_and_set(&self, expected: &Arc<T>, new: Arc<T>) -> bool {
        let guard = epoch::pin();
        let current = self.inner.load(Ordering::Acquire, &guard);
        // SAFETY: see `load`.
        if !Arc::ptr_eq(unsafe { current.deref() }, expected) {
            return false;
        }

        match self.inner.compare_exchange(
            current,
            Owned::new(new),
            Ordering::AcqRel,
            Ordering::Acquire,
            &guard,
        ) {
            Ok(_) => {
                // SAFETY: `current` has been unlinked, so no new reader can
                // reach it; existing readers hold their own guards.
                unsafe { guard.defer_destroy(current) };
                true
            }
            Err(_) => false,
        }
    }

    /// Unconditionally replace the value.
    pub fn store(&self, value: T) {
        let guard = epoch::pin();
        let previous = self
            .inner
            .swap(Owned::new(Arc::new(value)), Ordering::AcqRel, &guard);
        // SAFETY: `previous` was unlinked by the swap.
        unsafe { guard.defer_destroy(previous) };
    }

    /// Replace the value with `f(current)`, retrying until no other writer
    /// interferes. Returns the value that was installed.
    ///
    /// `f` may run more than once and must not have side effects.
    pub fn update<F>(&self, mut f: F) -> Arc<T>
    where
        F: FnMut(&T) -> T,
    {
        loop {
            let current = self.load();
            let next = Arc::new(f(&current));
            if self.compare_and_set(&current, Arc::clone(&next)) {
                return next;
            }
        }
    }
}

impl<T> Drop for Snapshot<T> {
    fn drop(&mut self) {
        // SAFETY: `&mut self` guarantees there are no concurrent readers or
        // writers, and the pointer is always non-null.
        unsafe {
            let current = self.inner.load(Ordering::Relaxed, epoch::unprotected());
            drop(current.into_owned());
        }
    }
}

impl<T: fmt::Debug + Send + Sync> fmt::Debug for Snapshot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Snapshot").field(&self.load()).finish()
    }
}

impl<T: Default + Send + Sync> Default for Snapshot<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
