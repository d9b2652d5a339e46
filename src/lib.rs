//! Execution runtime for ahead-of-time compiled kernel modules.
//!
//! Modules are restricted ELF executables. The runtime loads one into
//! executable memory, relocates it, calls its entry point with three
//! capability tables and coordinates the OS threads it fans out to across a
//! thread x block x die x chip topology.
//!
//! # Usage
//!
//! ```rust,no_run
//! use kernrt::{Runtime, Topology, logging};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let topology = Topology::new(4, 2, 1)?;
//! let runtime = Runtime::from_env(topology)?;
//! let _ = logging::init(runtime.config().log_level);
//!
//! let module = std::fs::read("kernel.so")?;
//! let mut output = [0f32; 16];
//! let inputs = [output.as_mut_ptr().cast()];
//! // Safety: the module comes from our own compiler.
//! unsafe { runtime.run(&module, &inputs)? };
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic, clippy::nursery)]

#[cfg(not(unix))]
compile_error!("kernrt needs a unix host to map executable memory");

pub mod abi;
pub mod config;
mod error;
pub mod invoke;
pub mod locals;
pub mod logging;
mod mem;
pub mod pool;
pub mod runtime;
pub mod topology;

pub use config::RuntimeConfig;
pub use error::{ConfigError, InvokeError, RuntimeError, TopologyError};
pub use invoke::{EntryArgs, PreparedModule, invoke, prepare};
pub use pool::ThreadPool;
pub use runtime::Runtime;
pub use topology::{Axis, ThreadCoords, Topology};
