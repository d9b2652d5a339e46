//! ELF kernel-module loader.
//!
//! Loads ahead-of-time compiled kernel modules: validates the header against
//! a target machine, plans the memory footprint, copies loadable segments
//! into caller-provided memory and applies position-independent relocations.
//!
//! All parsing goes through a [`ModuleSource`], so nothing here touches
//! memory the caller did not hand over explicitly.
//!
//! # Usage
//!
//! ```rust
//! # use elf::{ElfLoadError, Image, Module};
//! #
//! fn load_at(bytes: &[u8], memory: &mut [u8], base: u64) -> Result<u64, ElfLoadError> {
//!     let mut module = Module::init(bytes)?;
//!     if module.mem_size() > memory.len() as u64 {
//!         return Err(ElfLoadError::OutOfMemory);
//!     }
//!     module.set_load_base(base, base);
//!
//!     let mut image = Image::new(base, memory);
//!     module.load(&mut image)?;
//!     module.relocate(&mut image)?;
//!     module.entry_point()
//! }
//!
//! let mut memory = [0u8; 64];
//! assert_eq!(load_at(b"MZ", &mut memory, 0x1000), Err(ElfLoadError::Io));
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![no_std]

mod error;
pub mod header;
mod module;
pub mod reloc;
pub mod segments;
mod source;
pub mod target;

pub use error::ElfLoadError;
pub use header::{FileType, ProgramHeader};
pub use module::{DynamicSegment, Module};
pub use segments::{Image, SegmentAllocator};
pub use source::ModuleSource;
pub use target::{Class, Endian, Machine, Target};

/// Result type for ELF loading operations
pub type Result<T> = core::result::Result<T, ElfLoadError>;
