//! Bounded pool of OS threads running module entry points.
//!
//! The pool is a ring of at most `capacity` outstanding threads. Spawning on a
//! full ring first joins the oldest thread and frees its buffer; `drain` joins
//! everything. With a capacity of 0 entries run synchronously on the caller.
//!
//! Pool threads never join other pool threads, so joins cannot form a cycle:
//! a pool thread spawning on a full ring runs the entry itself, and a pool
//! thread draining leaves the ring to the thread that owns the pool.
use crate::locals::{self, ThreadContext};
use core::{
    cell::Cell,
    ffi::c_void,
    sync::atomic::{AtomicUsize, Ordering},
};
use log::{debug, error, trace, warn};
use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard, PoisonError},
    thread::{Builder, JoinHandle},
};

thread_local! {
    static POOL_THREAD: Cell<bool> = const { Cell::new(false) };
}

/// Signature of a pooled entry point: it receives its private copy of the
/// user data.
pub type PoolEntry = unsafe extern "C" fn(*mut c_void);

struct Slot {
    handle: JoinHandle<()>,
    /// Kept alive until the thread is joined
    _buffer: Box<[u64]>,
}

impl Slot {
    fn join(self) {
        let name = self.handle.thread().name().unwrap_or("pool").to_owned();
        if self.handle.join().is_err() {
            error!("Pool thread {name} panicked");
        }
    }
}

pub struct ThreadPool {
    capacity: usize,
    slots: Mutex<VecDeque<Slot>>,
    /// Added to every entry address before it is called
    load_offset: AtomicUsize,
}

impl core::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("capacity", &self.capacity)
            .field("outstanding", &self.outstanding())
            .finish_non_exhaustive()
    }
}

/// Copies `data` into a buffer aligned for any scalar the module may store in
/// it.
fn copy_aligned(data: &[u8]) -> Box<[u64]> {
    data.chunks(size_of::<u64>())
        .map(|chunk| {
            let mut word = [0u8; size_of::<u64>()];
            word[..chunk.len()].copy_from_slice(chunk);
            u64::from_ne_bytes(word)
        })
        .collect()
}

fn buffer_ptr(buffer: &mut [u64]) -> *mut c_void {
    if buffer.is_empty() {
        core::ptr::null_mut()
    } else {
        buffer.as_mut_ptr().cast()
    }
}

impl ThreadPool {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            slots: Mutex::new(VecDeque::with_capacity(capacity)),
            load_offset: AtomicUsize::new(0),
        }
    }

    #[must_use]
    #[inline]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    /// Sets the offset added to entry addresses, usually the load base of
    /// the running module.
    pub fn set_load_offset(&self, offset: usize) {
        self.load_offset.store(offset, Ordering::Release);
    }

    #[must_use]
    #[inline]
    pub fn load_offset(&self) -> usize {
        self.load_offset.load(Ordering::Acquire)
    }

    fn slots(&self) -> MutexGuard<'_, VecDeque<Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    /// Number of threads spawned and not joined yet.
    pub fn outstanding(&self) -> usize {
        self.slots().len()
    }

    /// Runs `entry + load_offset` with a private copy of `user_data`, on a
    /// pool thread or, with a capacity of 0, on the current thread.
    ///
    /// When `context` is given the entry runs inside it. Called from a pool
    /// thread on a full ring, the entry runs on the calling thread.
    ///
    /// # Safety
    ///
    /// `entry + load_offset` must be the address of a function matching
    /// [`PoolEntry`] that stays valid until the pool is drained.
    ///
    /// # Panics
    ///
    /// Panics if the operating system refuses to create a thread.
    pub unsafe fn spawn(&self, context: Option<ThreadContext>, entry: usize, user_data: &[u8]) {
        let address = entry.wrapping_add(self.load_offset());
        let mut buffer = copy_aligned(user_data);

        if self.capacity == 0 {
            trace!("Running entry {address:#x} synchronously");
            // Safety: upheld by the caller.
            unsafe { run_here(context, address, &mut buffer) };
            return;
        }

        let mut slots = self.slots();
        while slots.len() >= self.capacity {
            if POOL_THREAD.get() {
                drop(slots);
                trace!("Ring full on a pool thread, running entry {address:#x} in place");
                // Safety: upheld by the caller.
                unsafe { run_here(context, address, &mut buffer) };
                return;
            }
            let Some(oldest) = slots.pop_front() else {
                break;
            };
            // Joined without the lock: the oldest thread may itself be spawning.
            drop(slots);
            trace!("Recycling oldest pool slot");
            oldest.join();
            slots = self.slots();
        }

        // Raw pointers are not `Send`, addresses are.
        let data = buffer_ptr(&mut buffer).expose_provenance();
        let name = context.map(|context| context.coords()).map_or_else(
            || "kernrt-pool".to_owned(),
            |c| format!("kernrt-{}.{}.{}.{}", c.chip, c.die, c.block, c.thread),
        );

        let handle = Builder::new()
            .name(name)
            .spawn(move || {
                POOL_THREAD.set(true);
                let _guard = context.map(locals::enter);
                // Safety: upheld by the caller of `spawn`, and the buffer
                // outlives the thread.
                unsafe { call(address, core::ptr::with_exposed_provenance_mut(data)) };
            })
            .unwrap_or_else(|err| panic!("cannot create pool thread: {err}"));

        slots.push_back(Slot {
            handle,
            _buffer: buffer,
        });
    }

    /// Joins every outstanding thread and frees its buffer.
    ///
    /// Returns the number of threads joined. On a pool thread nothing is
    /// joined and 0 is returned.
    pub fn drain(&self) -> usize {
        if POOL_THREAD.get() {
            warn!("Pool drained from a pool thread, left to the pool owner");
            return 0;
        }
        let slots = core::mem::take(&mut *self.slots());
        let joined = slots.len();
        for slot in slots {
            slot.join();
        }
        if joined > 0 {
            debug!("Drained {joined} pool threads");
        }
        joined
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.drain();
    }
}

/// Calls the entry at `address` on the current thread, inside `context`.
///
/// # Safety
///
/// `address` must be a function matching [`PoolEntry`].
unsafe fn run_here(context: Option<ThreadContext>, address: usize, buffer: &mut [u64]) {
    let _guard = context.map(locals::enter);
    // Safety: upheld by the caller.
    unsafe { call(address, buffer_ptr(buffer)) };
}

/// Calls the entry at `address` with `data`.
///
/// # Safety
///
/// `address` must be a function matching [`PoolEntry`].
unsafe fn call(address: usize, data: *mut c_void) {
    // Safety: upheld by the caller.
    let entry = unsafe { core::mem::transmute::<usize, PoolEntry>(address) };
    unsafe { entry(data) };
}
