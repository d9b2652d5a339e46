//! Synchronization utilities.
//!
//! ## Modules
//!
//! - `barrier` : Provides the two-counter barrier kernel threads rendezvous on.

pub mod barrier;
