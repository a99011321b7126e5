/*!
 * Scoped Lock Guards
 *
 * RAII guards returned by `RwLock`. Access is released when the guard goes
 * out of scope, on every exit path including `?` returns and unwinding.
 */

use super::rwlock::{fatal, RwLock};
use crate::core::errors::LockResult;
use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::ops::{Deref, DerefMut};

/// Shared access to the value behind an [`RwLock`]
#[must_use = "if unused the lock is released immediately"]
pub struct ReadGuard<'a, T> {
    lock: &'a RwLock<T>,
    // Released on the thread that acquired it
    _not_send: PhantomData<*const ()>,
}

/// Exclusive access to the value behind an [`RwLock`]
#[must_use = "if unused the lock is released immediately"]
pub struct WriteGuard<'a, T> {
    lock: &'a RwLock<T>,
    _not_send: PhantomData<*const ()>,
}

unsafe impl<T: Sync> Sync for ReadGuard<'_, T> {}
unsafe impl<T: Sync> Sync for WriteGuard<'_, T> {}

impl<'a, T> ReadGuard<'a, T> {
    /// Caller must have moved the lock into a shared state for this guard
    pub(crate) fn new(lock: &'a RwLock<T>) -> Self {
        Self {
            lock,
            _not_send: PhantomData,
        }
    }

    /// Release now, surfacing a protocol violation as an error instead of a panic
    pub fn unlock(self) -> LockResult<()> {
        let lock = self.lock;
        mem::forget(self);
        lock.release_shared()
    }
}

impl<'a, T> WriteGuard<'a, T> {
    /// Caller must have moved the lock into the exclusive state for this guard
    pub(crate) fn new(lock: &'a RwLock<T>) -> Self {
        Self {
            lock,
            _not_send: PhantomData,
        }
    }

    pub fn unlock(self) -> LockResult<()> {
        let lock = self.lock;
        mem::forget(self);
        lock.release_exclusive()
    }
}

impl<T> Deref for ReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: shared access is held, no writer can exist
        unsafe { &*self.lock.data_ptr() }
    }
}

impl<T> Deref for WriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: exclusive access is held
        unsafe { &*self.lock.data_ptr() }
    }
}

impl<T> DerefMut for WriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: exclusive access is held
        unsafe { &mut *self.lock.data_ptr() }
    }
}

impl<T> Drop for ReadGuard<'_, T> {
    fn drop(&mut self) {
        if let Err(err) = self.lock.release_shared() {
            fatal(err);
        }
    }
}

impl<T> Drop for WriteGuard<'_, T> {
    fn drop(&mut self) {
        if let Err(err) = self.lock.release_exclusive() {
            fatal(err);
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for ReadGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

impl<T: fmt::Debug> fmt::Debug for WriteGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}
