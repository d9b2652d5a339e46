//! The runtime object.
//!
//! Owns everything module threads share: the thread pool, one barrier per
//! group and level, the module-visible locks and one timer per unit.
use crate::{
    abi::Capabilities,
    config::RuntimeConfig,
    error::{InvokeError, RuntimeError},
    invoke,
    locals::{self, ThreadContext, TimerRecord},
    pool::ThreadPool,
    topology::{Axis, BarrierSet, ThreadCoords, Topology},
};
use core::ffi::c_void;
use hyperdrive::{
    locks::ticket::RawTicketLock,
    sync::barrier::{Unbounded, Watchdog},
};
use log::{debug, error, info};
use std::time::{Duration, Instant};

/// A watchdog expiring at a fixed instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    #[must_use]
    pub fn after(timeout: Duration) -> Self {
        Self {
            at: Instant::now() + timeout,
        }
    }
}

impl Watchdog for Deadline {
    fn expired(&mut self) -> bool {
        Instant::now() >= self.at
    }
}

#[derive(Debug)]
pub struct Runtime {
    /// Dropped first: pool threads use the fields below
    pool: ThreadPool,
    config: RuntimeConfig,
    barriers: BarrierSet,
    locks: Box<[RawTicketLock]>,
    /// Indexed by linear unit index
    timers: Box<[TimerRecord]>,
    epoch: Instant,
}

impl Runtime {
    #[must_use]
    pub fn new(config: RuntimeConfig, topology: Topology) -> Self {
        info!(
            "Runtime for {} units ({} threads x {} blocks x {} dies x {} chips), pool capacity {}",
            topology.unit_count(),
            topology.dimension(Axis::Thread),
            topology.dimension(Axis::Block),
            topology.dimension(Axis::Die),
            topology.dimension(Axis::Chip),
            config.thread_pool,
        );

        Self {
            barriers: BarrierSet::new(topology),
            locks: (0..config.locks).map(|_| RawTicketLock::new()).collect(),
            timers: (0..topology.unit_count())
                .map(|_| TimerRecord::new())
                .collect(),
            pool: ThreadPool::new(config.thread_pool),
            epoch: Instant::now(),
            config,
        }
    }

    /// Builds a runtime configured from the environment.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeError::Config` for an invalid variable.
    pub fn from_env(topology: Topology) -> Result<Self, RuntimeError> {
        Ok(Self::new(RuntimeConfig::from_env()?, topology))
    }

    #[must_use]
    #[inline]
    pub const fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    #[must_use]
    #[inline]
    pub const fn topology(&self) -> &Topology {
        self.barriers.topology()
    }

    #[must_use]
    #[inline]
    pub const fn barriers(&self) -> &BarrierSet {
        &self.barriers
    }

    #[must_use]
    #[inline]
    pub const fn pool(&self) -> &ThreadPool {
        &self.pool
    }

    /// Rendezvous with every unit sharing the coordinates of `coords` above
    /// `level`, giving up after the configured barrier timeout.
    ///
    /// A stall poisons the barrier of the group: later rendezvous on it fail
    /// until [`Runtime::reset_barriers`].
    ///
    /// # Errors
    ///
    /// Returns `RuntimeError::Topology` for a level or coordinates outside
    /// the topology, or `RuntimeError::Stalled` when the timeout expires or
    /// the barrier is poisoned.
    pub fn barrier(&self, level: Axis, coords: ThreadCoords) -> Result<(), RuntimeError> {
        let barrier = self.barriers.get(level, coords)?;
        let result = match self.config.barrier_timeout {
            None => barrier.wait_with(&mut Unbounded),
            Some(timeout) => barrier.wait_with(&mut Deadline::after(timeout)),
        };
        result.inspect_err(|stalled| error!("{level} barrier of {coords:?}: {stalled}"))?;
        Ok(())
    }

    /// Clears every barrier, poisoned ones included.
    pub fn reset_barriers(&mut self) {
        self.barriers.reset();
    }

    /// Acquires lock `id`, returning `false` if there is no such lock.
    pub fn lock(&self, id: u32) -> bool {
        let Some(lock) = self.locks.get(id as usize) else {
            return false;
        };
        lock.acquire();
        true
    }

    /// Releases lock `id`, returning `false` if there is no such lock or
    /// nobody holds it.
    ///
    /// # Safety
    ///
    /// The calling thread must hold the lock.
    pub unsafe fn unlock(&self, id: u32) -> bool {
        let Some(lock) = self.locks.get(id as usize) else {
            return false;
        };
        if !lock.is_locked() {
            return false;
        }
        unsafe { lock.release() };
        true
    }

    #[must_use]
    /// Number of module-visible locks currently held.
    pub fn locks_held(&self) -> usize {
        self.locks.iter().filter(|lock| lock.is_locked()).count()
    }

    #[must_use]
    pub fn timer(&self, coords: ThreadCoords) -> Option<&TimerRecord> {
        let index = self.topology().linear_index(coords).ok()?;
        self.timers.get(index)
    }

    #[must_use]
    /// The execution context of unit `coords`, carrying its timer record.
    pub fn context(&self, coords: ThreadCoords) -> ThreadContext {
        let context = ThreadContext::new(coords);
        match self.timer(coords) {
            Some(timer) => context.with_timer(timer),
            None => context,
        }
    }

    #[must_use]
    /// Nanoseconds since the runtime was built.
    pub fn now_ns(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    /// Loads `bytes` and runs its entry point on the current thread as unit
    /// `(0, 0, 0, 0)`, then joins every thread the module left in the pool.
    ///
    /// # Errors
    ///
    /// Returns the `InvokeError` naming the first phase that failed; the module
    /// has not run in that case.
    ///
    /// # Safety
    ///
    /// The module must be trusted code: it runs with the full privileges of
    /// the process.
    pub unsafe fn run(&self, bytes: &[u8], inputs: &[*mut c_void]) -> Result<(), InvokeError> {
        let Some(module) = invoke::prepare(bytes)? else {
            return Ok(());
        };

        self.pool.set_load_offset(module.base());
        let capabilities = Capabilities::new(self);
        {
            let _guard = locals::enter(self.context(ThreadCoords::default()));
            unsafe { module.enter(&capabilities.args(inputs)) };
        }

        // Pool threads run module code: join them before the image goes away.
        let joined = self.pool.drain();
        self.pool.set_load_offset(0);
        debug!("Module run finished, {joined} pool threads joined");

        Ok(())
    }
}
