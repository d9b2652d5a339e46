//! Locks related utilities.
//!
//! ## Modules
//!
//! - `ticket` : Provides a raw ticket lock, acquired and released by hand.
//!
//! ## Back-off Strategy
//!
//! This modules uses a trait, `BackOff`, to define a back-off strategy
//! for spin loops. This module provides a default implementation of the back-off
//! strategy, which is a spin-wait loop.
//!
//! This trait only has one method, `back_off`, which is called each time a
//! thread has to wait one more round.

pub mod ticket;

/// A trait that defines a back-off strategy for spin loops.
///
/// This trait is used to define how a thread should behave when it
/// is unable to make progress. The default implementation is
/// a spin-wait loop, but other strategies can be implemented
/// to yield the CPU or sleep for a certain duration.
pub trait BackOff {
    /// Performs the back-off operation.
    fn back_off();
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// A back-off strategy that uses a spin-wait loop.
///
/// To optimize performance and CPU consumption,
/// the function `core::hint::spin_loop` is called.
pub struct Spin;

impl BackOff for Spin {
    #[inline]
    fn back_off() {
        core::hint::spin_loop();
    }
}
