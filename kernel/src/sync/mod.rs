//! Synchronization Primitives
//!
//! The firmware has one execution context plus interrupt handlers, so the
//! only mutual exclusion it needs is "interrupts off while mutating".
//! `IrqLock` packages that as a scoped guard: acquiring masks interrupts,
//! dropping the guard restores whatever state was there before, on every
//! exit path.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

use crate::arch;

/// Spinlock that also masks interrupts while held
pub struct IrqLock<T> {
    locked: AtomicBool,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for IrqLock<T> {}
unsafe impl<T: Send> Sync for IrqLock<T> {}

impl<T> IrqLock<T> {
    pub const fn new(data: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            data: UnsafeCell::new(data),
        }
    }

    /// Mask interrupts, then take the lock.
    ///
    /// On the single-core targets the flag is uncontended: nothing else can
    /// run while interrupts are off. It still catches accidental reentry
    /// on hosted builds.
    #[inline]
    pub fn lock(&self) -> IrqLockGuard<'_, T> {
        let irq = IrqGuard::new();

        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            core::hint::spin_loop();
        }

        IrqLockGuard { lock: self, _irq: irq }
    }

    #[inline]
    pub fn try_lock(&self) -> Option<IrqLockGuard<'_, T>> {
        let irq = IrqGuard::new();
        if self
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            Some(IrqLockGuard { lock: self, _irq: irq })
        } else {
            None
        }
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }

    /// Exclusive access without locking; `&mut self` already proves it.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }
}

/// Interrupt-masking critical section.
///
/// Records the interrupt state at construction and restores it on drop.
pub struct IrqGuard {
    were_enabled: bool,
}

impl IrqGuard {
    #[inline]
    pub fn new() -> Self {
        let were_enabled = arch::are_interrupts_enabled();
        if were_enabled {
            arch::interrupts_disable();
        }
        Self { were_enabled }
    }
}

impl Default for IrqGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for IrqGuard {
    #[inline]
    fn drop(&mut self) {
        if self.were_enabled {
            arch::interrupts_enable();
        }
    }
}

pub struct IrqLockGuard<'a, T> {
    lock: &'a IrqLock<T>,
    // Dropped after `Drop::drop` below has released the flag
    _irq: IrqGuard,
}

impl<T> Deref for IrqLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for IrqLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for IrqLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_masks_and_restores_interrupts() {
        let lock = IrqLock::new(5u32);
        assert!(arch::are_interrupts_enabled());
        {
            let mut g = lock.lock();
            *g += 1;
            assert!(!arch::are_interrupts_enabled());
            assert!(lock.is_locked());
        }
        assert!(arch::are_interrupts_enabled());
        assert_eq!(*lock.lock(), 6);
    }

    #[test]
    fn test_nested_guard_keeps_interrupts_off() {
        let outer = IrqGuard::new();
        {
            let _inner = IrqGuard::new();
            assert!(!arch::are_interrupts_enabled());
        }
        // Inner guard saw them disabled, so it must not re-enable
        assert!(!arch::are_interrupts_enabled());
        drop(outer);
        assert!(arch::are_interrupts_enabled());
    }

    #[test]
    fn test_try_lock_fails_while_held() {
        let lock = IrqLock::new(());
        let g = lock.lock();
        assert!(lock.try_lock().is_none());
        drop(g);
        assert!(lock.try_lock().is_some());
        assert!(arch::are_interrupts_enabled());
    }
}
