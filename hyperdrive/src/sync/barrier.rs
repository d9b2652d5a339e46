//! A barrier that allows a fixed number of threads to synchronize.
//!
//! The barrier runs a four-step protocol on two counters, `A` and `B`:
//!
//! 1. increment `A`, spin until `A == N`;
//! 2. increment `B`, spin until `B == N`;
//! 3. decrement `A`, spin until `A == 0`;
//! 4. decrement `B`, spin until `B == 0`.
//!
//! Both counters are back to zero once every participant returned, so the
//! same barrier serves any number of consecutive rendezvous.
//!
//! A rendezvous abandoned by a watchdog leaves the counters mid-protocol. The
//! barrier is then poisoned: participants still spinning give up and new ones
//! are refused until [`Barrier::reset`].
use crate::locks::{BackOff, Spin};
use core::{
    marker::PhantomData,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};

/// Decides when a spinning thread should give up.
pub trait Watchdog {
    /// Called on every unsuccessful spin round.
    fn expired(&mut self) -> bool;
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// A watchdog that never fires.
pub struct Unbounded;

impl Watchdog for Unbounded {
    #[inline]
    fn expired(&mut self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Step of the barrier protocol.
pub enum Phase {
    /// Waiting for every participant to arrive (`A == N`)
    Gather,
    /// Waiting for every participant to see the others (`B == N`)
    Confirm,
    /// Waiting for every participant to leave the first counter (`A == 0`)
    Release,
    /// Waiting for the second counter to drain (`B == 0`)
    Reset,
    /// Gave up because another participant stalled
    Poisoned,
}

impl core::fmt::Display for Phase {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::Gather => "gather",
            Self::Confirm => "confirm",
            Self::Release => "release",
            Self::Reset => "reset",
            Self::Poisoned => "poisoned",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// A rendezvous abandoned because its watchdog expired, or refused because
/// the barrier is poisoned.
pub struct Stalled {
    pub phase: Phase,
    /// Counter value at the time of the last check
    pub observed: usize,
    pub expected: usize,
}

impl core::fmt::Display for Stalled {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.phase == Phase::Poisoned {
            return f.write_str("barrier poisoned by an earlier stall");
        }
        write!(
            f,
            "barrier stalled in {} phase: {} of {} participants",
            self.phase, self.observed, self.expected
        )
    }
}

impl core::error::Error for Stalled {}

/// A barrier that allows a fixed number of threads to synchronize.
///
/// ## Example
///
/// ```rust
/// # use hyperdrive::sync::barrier::Barrier;
/// # use std::sync::Arc;
/// # use std::thread::spawn;
/// #
/// let num_threads = 10;
/// let barrier = Arc::new(Barrier::<hyperdrive::locks::Spin>::new(num_threads));
///
/// let handles = (0..num_threads)
///     .map(|_| spawn({
///         let barrier = barrier.clone();
///         move || {
///             barrier.wait();
///         }
///     }))
///     .collect::<Vec<_>>();
///
/// for handle in handles {
///     handle.join().unwrap();
/// }
/// assert_eq!(barrier.counters(), (0, 0));
/// ```
pub struct Barrier<B: BackOff = Spin> {
    /// Amount of threads that need to reach the barrier.
    count: usize,
    /// Counter `A`.
    arrived: AtomicUsize,
    /// Counter `B`.
    confirmed: AtomicUsize,
    /// Set when a participant stalled.
    poisoned: AtomicBool,
    _back_off: PhantomData<B>,
}

// Safety: Barrier only holds atomics.
unsafe impl<B: BackOff> Send for Barrier<B> {}
unsafe impl<B: BackOff> Sync for Barrier<B> {}

impl<B: BackOff> core::fmt::Debug for Barrier<B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Barrier")
            .field("count", &self.count)
            .field("counters", &self.counters())
            .field("poisoned", &self.is_poisoned())
            .finish()
    }
}

impl<B: BackOff> Barrier<B> {
    #[must_use]
    #[inline]
    /// Creates a new barrier that allows `count` threads to synchronize.
    pub const fn new(count: usize) -> Self {
        assert!(count > 0, "Barrier must have a count greater than 0.");
        Self {
            count,
            arrived: AtomicUsize::new(0),
            confirmed: AtomicUsize::new(0),
            poisoned: AtomicBool::new(false),
            _back_off: PhantomData,
        }
    }

    #[must_use]
    #[inline]
    pub const fn participants(&self) -> usize {
        self.count
    }

    #[must_use]
    #[inline]
    /// Current values of counters `A` and `B`.
    pub fn counters(&self) -> (usize, usize) {
        (
            self.arrived.load(Ordering::SeqCst),
            self.confirmed.load(Ordering::SeqCst),
        )
    }

    #[must_use]
    #[inline]
    /// Whether a rendezvous on this barrier stalled.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::SeqCst)
    }

    #[inline]
    /// Clears both counters and the poison flag.
    pub fn reset(&mut self) {
        *self.arrived.get_mut() = 0;
        *self.confirmed.get_mut() = 0;
        *self.poisoned.get_mut() = false;
    }

    /// Waits for all threads to reach the barrier.
    ///
    /// This will block the current thread until all threads have reached the barrier.
    ///
    /// # Panics
    ///
    /// Panics if the barrier is poisoned.
    pub fn wait(&self) {
        if let Err(stalled) = self.wait_with(&mut Unbounded) {
            panic!("{stalled}");
        }
    }

    /// Waits for all threads to reach the barrier, polling `watchdog` while
    /// spinning.
    ///
    /// # Errors
    ///
    /// Returns `Stalled` as soon as the watchdog expires, which poisons the
    /// barrier. On a poisoned barrier it returns `Stalled` in the
    /// [`Phase::Poisoned`] phase without taking part.
    pub fn wait_with<W: Watchdog + ?Sized>(&self, watchdog: &mut W) -> Result<(), Stalled> {
        if self.is_poisoned() {
            return Err(self.poisoned_error());
        }

        let arrived = self.arrived.fetch_add(1, Ordering::SeqCst);
        debug_assert!(arrived < self.count, "too many threads entered the barrier");
        self.spin_until(&self.arrived, self.count, Phase::Gather, watchdog)?;

        self.confirmed.fetch_add(1, Ordering::SeqCst);
        self.spin_until(&self.confirmed, self.count, Phase::Confirm, watchdog)?;

        self.arrived.fetch_sub(1, Ordering::SeqCst);
        self.spin_until(&self.arrived, 0, Phase::Release, watchdog)?;

        self.confirmed.fetch_sub(1, Ordering::SeqCst);
        self.spin_until(&self.confirmed, 0, Phase::Reset, watchdog)
    }

    fn spin_until<W: Watchdog + ?Sized>(
        &self,
        counter: &AtomicUsize,
        expected: usize,
        phase: Phase,
        watchdog: &mut W,
    ) -> Result<(), Stalled> {
        loop {
            let observed = counter.load(Ordering::SeqCst);
            if observed == expected {
                return Ok(());
            }
            if self.is_poisoned() {
                return Err(self.poisoned_error());
            }
            if watchdog.expired() {
                self.poisoned.store(true, Ordering::SeqCst);
                return Err(Stalled {
                    phase,
                    observed,
                    expected,
                });
            }
            B::back_off();
        }
    }

    fn poisoned_error(&self) -> Stalled {
        Stalled {
            phase: Phase::Poisoned,
            observed: self.arrived.load(Ordering::SeqCst),
            expected: self.count,
        }
    }
}
