//! Raw ticket lock.
//!
//! Kernel modules lock and unlock by index through a C ABI table, so the lock
//! protects no data and hands out no guard: whoever acquired it releases it.
//!
//! ```rust
//! # use hyperdrive::locks::ticket::RawTicketLock;
//! let lock = RawTicketLock::<hyperdrive::locks::Spin>::new();
//!
//! lock.acquire();
//! assert!(lock.is_locked());
//! unsafe { lock.release() };
//! assert!(!lock.is_locked());
//! ```

use super::BackOff;
use core::{
    marker::PhantomData,
    sync::atomic::{AtomicU32, Ordering},
};

/// A ticket lock without protected data.
///
/// Tickets are served in order, so waiters acquire the lock fairly.
pub struct RawTicketLock<B: BackOff = super::Spin> {
    /// The ticket number of the next thread to acquire the lock.
    next_ticket: AtomicU32,
    /// The ticket number of the current thread holding the lock.
    now_serving: AtomicU32,
    /// The back-off strategy to use when the lock is contended.
    _back_off: PhantomData<B>,
}

// Safety: the lock only holds atomics.
unsafe impl<B: BackOff> Send for RawTicketLock<B> {}
unsafe impl<B: BackOff> Sync for RawTicketLock<B> {}

impl<B: BackOff> Default for RawTicketLock<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: BackOff> core::fmt::Debug for RawTicketLock<B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RawTicketLock")
            .field("locked", &self.is_locked())
            .finish()
    }
}

impl<B: BackOff> RawTicketLock<B> {
    #[must_use]
    #[inline]
    /// Creates a new, unlocked ticket lock.
    pub const fn new() -> Self {
        Self {
            next_ticket: AtomicU32::new(0),
            now_serving: AtomicU32::new(0),
            _back_off: PhantomData,
        }
    }

    #[inline]
    /// Waits for this thread's turn and takes the lock.
    pub fn acquire(&self) {
        // Get the ticket number for this thread.
        let ticket = self.next_ticket.fetch_add(1, Ordering::Acquire);

        // Wait until it's this thread's turn to acquire the lock.
        while self.now_serving.load(Ordering::Acquire) != ticket {
            B::back_off();
        }
    }

    #[must_use]
    #[inline]
    /// Takes the lock if nobody holds or waits for it.
    pub fn try_acquire(&self) -> bool {
        let serving = self.now_serving.load(Ordering::Acquire);
        self.next_ticket
            .compare_exchange(
                serving,
                serving.wrapping_add(1),
                Ordering::Acquire,
                Ordering::Relaxed,
            )
            .is_ok()
    }

    #[inline]
    /// Hands the lock to the next ticket.
    ///
    /// # Safety
    ///
    /// The caller must be the current owner of the lock.
    pub unsafe fn release(&self) {
        debug_assert!(self.is_locked(), "released an unlocked ticket lock");
        self.now_serving.fetch_add(1, Ordering::Release);
    }

    #[must_use]
    #[inline]
    /// Whether some thread holds the lock.
    pub fn is_locked(&self) -> bool {
        self.next_ticket.load(Ordering::Relaxed) != self.now_serving.load(Ordering::Relaxed)
    }
}
