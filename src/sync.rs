//! Synchronization primitives

use core::fmt::{self, Debug, Formatter};

use spin::{Mutex, MutexGuard};

/// A busy-waiting lock carrying a diagnostic name.
///
/// No timeout, no re-entrancy: taking the lock twice on the same hart
/// spins forever.
pub struct SpinLock<T> {
    name: &'static str,
    inner: Mutex<T>,
}

impl<T> SpinLock<T> {
    pub const fn new(name: &'static str, value: T) -> Self {
        Self {
            name,
            inner: Mutex::new(value),
        }
    }

    /// spin until the lock is free, then hold it until the guard drops
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.lock()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Debug for SpinLock<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("SpinLock({})", self.name))
    }
}
