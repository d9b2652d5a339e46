//! Per-thread execution context.
//!
//! The runtime establishes a context on every thread before module code runs
//! on it; module code reads it back through the capability tables. Nothing
//! here is a source of truth: the runtime owns topology, timers and barriers,
//! this only remembers where the current thread sits.
use crate::topology::{Axis, ThreadCoords};
use core::{
    cell::Cell,
    marker::PhantomData,
    sync::atomic::{AtomicU64, Ordering},
};

thread_local! {
    static CONTEXT: Cell<Option<ThreadContext>> = const { Cell::new(None) };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadContext {
    coords: ThreadCoords,
    /// Timer record of the unit, null if it has none
    timer: *const TimerRecord,
}

// Safety: the timer record only holds atomics and outlives every thread the
// context is entered on.
unsafe impl Send for ThreadContext {}
unsafe impl Sync for ThreadContext {}

impl ThreadContext {
    #[must_use]
    #[inline]
    pub const fn new(coords: ThreadCoords) -> Self {
        Self {
            coords,
            timer: core::ptr::null(),
        }
    }

    #[must_use]
    #[inline]
    /// Attaches the timer record of the unit.
    ///
    /// The record must outlive every thread the context is entered on.
    pub const fn with_timer(self, timer: &TimerRecord) -> Self {
        Self {
            timer: core::ptr::from_ref(timer),
            ..self
        }
    }

    #[must_use]
    #[inline]
    pub const fn coords(&self) -> ThreadCoords {
        self.coords
    }

    #[must_use]
    #[inline]
    pub const fn timer(&self) -> *const TimerRecord {
        self.timer
    }
}

/// Restores the previous context of the thread when dropped.
#[must_use = "the context is left as soon as the guard is dropped"]
pub struct ContextGuard {
    previous: Option<ThreadContext>,
    /// Contexts belong to one thread.
    _not_send: PhantomData<*const ()>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        CONTEXT.set(self.previous);
    }
}

/// Makes `context` the context of the current thread until the guard drops.
pub fn enter(context: ThreadContext) -> ContextGuard {
    ContextGuard {
        previous: CONTEXT.replace(Some(context)),
        _not_send: PhantomData,
    }
}

#[must_use]
#[inline]
pub fn current() -> Option<ThreadContext> {
    CONTEXT.get()
}

#[must_use]
#[inline]
/// Coordinate of the current thread along `axis`.
pub fn coordinate(axis: Axis) -> Option<u32> {
    current().map(|context| context.coords.get(axis))
}

/// Timing state of one unit, shared with module code.
#[repr(C)]
#[derive(Debug, Default)]
pub struct TimerRecord {
    /// Nanoseconds since the runtime epoch at the last start
    pub started_ns: AtomicU64,
    /// Accumulated time between starts and stops
    pub elapsed_ns: AtomicU64,
    /// Completed start/stop pairs
    pub laps: AtomicU64,
}

impl TimerRecord {
    #[must_use]
    #[inline]
    pub const fn new() -> Self {
        Self {
            started_ns: AtomicU64::new(0),
            elapsed_ns: AtomicU64::new(0),
            laps: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn start(&self, now_ns: u64) {
        self.started_ns.store(now_ns, Ordering::Relaxed);
    }

    #[inline]
    pub fn stop(&self, now_ns: u64) {
        let started = self.started_ns.load(Ordering::Relaxed);
        self.elapsed_ns
            .fetch_add(now_ns.saturating_sub(started), Ordering::Relaxed);
        self.laps.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    #[inline]
    pub fn elapsed_ns(&self) -> u64 {
        self.elapsed_ns.load(Ordering::Relaxed)
    }

    #[must_use]
    #[inline]
    pub fn laps(&self) -> u64 {
        self.laps.load(Ordering::Relaxed)
    }
}
