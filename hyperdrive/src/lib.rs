//! Hyperdrive is the spin synchronization layer of `kernrt`.
//!
//! Kernel modules synchronize through raw, ABI-friendly primitives: nothing
//! here allocates, owns data or depends on an operating system.
#![cfg_attr(not(test), no_std)]
#![forbid(unsafe_op_in_unsafe_fn)]
#![warn(clippy::pedantic, clippy::nursery)]

pub mod locks;
pub mod sync;
