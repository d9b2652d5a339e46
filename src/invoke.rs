//! Execution invoker: turns module bytes into a callable entry point.
//!
//! Invocation runs in phases: parse, allocate, load, relocate, call, release.
//! A failure in any phase before the call aborts the invocation; no module
//! code ever runs from a partially prepared image.
use crate::{
    abi::{HardwareCapabilities, HostCapabilities, MathCapabilities},
    error::InvokeError,
    mem::ExecRegion,
};
use core::ffi::c_void;
use elf::Module;
use log::{debug, error, warn};

/// Signature of a module entry point.
pub type ModuleEntry = unsafe extern "C" fn(
    *const HardwareCapabilities,
    *const HostCapabilities,
    *const MathCapabilities,
    *const *mut c_void,
);

/// Arguments passed to a module entry point.
#[derive(Debug, Clone, Copy)]
pub struct EntryArgs<'a> {
    pub hardware: &'a HardwareCapabilities,
    pub host: &'a HostCapabilities,
    pub math: &'a MathCapabilities,
    pub inputs: &'a [*mut c_void],
}

/// A module loaded and relocated in executable memory.
///
/// The memory is released when the value is dropped.
#[derive(Debug)]
pub struct PreparedModule {
    region: ExecRegion,
    entry: usize,
}

impl PreparedModule {
    #[must_use]
    #[inline]
    /// Runtime address of module address 0.
    pub fn base(&self) -> usize {
        self.region.base()
    }

    #[must_use]
    #[inline]
    pub const fn entry_point(&self) -> usize {
        self.entry
    }

    #[must_use]
    #[inline]
    pub const fn len(&self) -> usize {
        self.region.len()
    }

    #[must_use]
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.region.len() == 0
    }

    /// Calls the entry point.
    ///
    /// # Safety
    ///
    /// The module must be trusted code for the host: its entry point is
    /// called with the given tables and may do anything the process can.
    pub unsafe fn enter(&self, args: &EntryArgs<'_>) {
        debug!("Entering module at {:#x}", self.entry);
        // Safety: `prepare` checked the entry point lies in our executable
        // region and the caller trusts the module.
        let entry = unsafe { core::mem::transmute::<usize, ModuleEntry>(self.entry) };
        unsafe {
            entry(
                args.hardware,
                args.host,
                args.math,
                args.inputs.as_ptr(),
            );
        }
        debug!("Module returned");
    }
}

/// Parses, loads and relocates `bytes` into fresh executable memory.
///
/// Returns `None` for a module without loadable content.
///
/// # Errors
///
/// Returns the `InvokeError` naming the first phase that failed.
///
/// # Panics
///
/// Panics if the memory cannot be made executable.
pub fn prepare(bytes: &[u8]) -> Result<Option<PreparedModule>, InvokeError> {
    let mut module = Module::init(bytes).map_err(|err| {
        error!("Rejected module: {err}");
        InvokeError::Parse(err)
    })?;

    let size = module.mem_size();
    if size == 0 {
        warn!("Module has no loadable segments, nothing to run");
        return Ok(None);
    }
    let align = module.align();
    debug!("Module needs {size:#x} bytes aligned to {align:#x}");

    let too_large = InvokeError::Allocate { size };
    let len = usize::try_from(size).map_err(|_| too_large)?;
    let align_bytes = usize::try_from(align).map_err(|_| too_large)?;
    let mut region = ExecRegion::allocate(len, align_bytes).map_err(|err| {
        error!("Cannot map module memory: {err}");
        too_large
    })?;

    let base = region.base() as u64;
    module.set_load_base(base, base);

    let mut image = region.image();
    module.load(&mut image).map_err(|err| {
        error!("Cannot load module segments: {err}");
        InvokeError::Load(err)
    })?;
    module.relocate(&mut image).map_err(|err| {
        error!("Cannot relocate module: {err}");
        InvokeError::Relocate(err)
    })?;

    let entry = module
        .entry_point()
        .ok()
        .filter(|entry| image.range(*entry, 1).is_some())
        .and_then(|entry| usize::try_from(entry).ok())
        .ok_or_else(|| {
            error!("Module entry point {:#x} lies outside its image", module.header().entry);
            InvokeError::Load(elf::ElfLoadError::Overflow)
        })?;
    debug!("Module loaded at {base:#x}, entry {entry:#x}");

    Ok(Some(PreparedModule { region, entry }))
}

/// Prepares `bytes` and calls the module entry point once with `args`.
///
/// The module memory is released when the entry point returns.
///
/// # Errors
///
/// Returns the `InvokeError` naming the first phase that failed; the module
/// has not run in that case.
///
/// # Safety
///
/// See [`PreparedModule::enter`].
pub unsafe fn invoke(bytes: &[u8], args: &EntryArgs<'_>) -> Result<(), InvokeError> {
    if let Some(module) = prepare(bytes)? {
        unsafe { module.enter(args) };
    }
    Ok(())
}
