//! C ABI between the runtime and kernel modules.
//!
//! A module entry point receives three capability tables and an array of
//! input buffers. Every table carries an opaque handle to the [`Runtime`]
//! that built it; functions that need runtime state take it as their first
//! argument.
use crate::{
    error::RuntimeError,
    invoke::EntryArgs,
    locals::{self, TimerRecord},
    runtime::Runtime,
    topology::{Axis, ThreadCoords},
};
use core::ffi::c_void;
use hyperdrive::sync::barrier::Phase;
use log::{error, info, warn};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::{alloc::Layout, borrow::Cow};

/// Opaque pointer to the runtime.
pub type Handle = *const c_void;

/// Result of a barrier reached through [`HardwareCapabilities::barrier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(i32)]
pub enum BarrierStatus {
    Ok = 0,
    /// The level is not a valid [`Axis`]
    BadLevel = -1,
    /// The calling thread has no execution context
    NoContext = -2,
    /// The level or coordinates do not fit the topology
    Topology = -3,
    /// The barrier watchdog expired
    Stalled = -4,
    /// An earlier rendezvous of the group stalled
    Poisoned = -5,
}

/// Coordination primitives.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct HardwareCapabilities {
    pub runtime: Handle,
    /// Rendezvous at a level, returning a [`BarrierStatus`]
    pub barrier: unsafe extern "C" fn(Handle, u32) -> i32,
    pub lock: unsafe extern "C" fn(Handle, u32),
    pub unlock: unsafe extern "C" fn(Handle, u32),
    /// Coordinate of the calling thread, 0 outside a context
    pub coordinate: unsafe extern "C" fn(Handle, u32) -> u32,
    /// Size of an axis, 0 for an invalid axis
    pub dimension: unsafe extern "C" fn(Handle, u32) -> u32,
    /// Timer of the calling thread, null outside a context
    pub timer: unsafe extern "C" fn(Handle) -> *const TimerRecord,
    pub timer_start: unsafe extern "C" fn(Handle),
    pub timer_stop: unsafe extern "C" fn(Handle),
}

/// Host utilities.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct HostCapabilities {
    pub runtime: Handle,
    /// `(size, align)`, null on failure or for a zero size
    pub alloc: unsafe extern "C" fn(Handle, usize, usize) -> *mut c_void,
    /// `(ptr, size, align)` as passed to and returned by `alloc`
    pub free: unsafe extern "C" fn(Handle, *mut c_void, usize, usize),
    /// `(dst, src, len)`, ranges may overlap
    pub copy: unsafe extern "C" fn(Handle, *mut c_void, *const c_void, usize),
    /// `(condition, message, len)`, aborts the process when the condition fails
    pub assert: unsafe extern "C" fn(Handle, bool, *const u8, usize),
    pub print: unsafe extern "C" fn(Handle, *const u8, usize),
}

/// Scalar operators and thread fan-out.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct MathCapabilities {
    pub runtime: Handle,
    pub f32_add: extern "C" fn(f32, f32) -> f32,
    pub f32_sub: extern "C" fn(f32, f32) -> f32,
    pub f32_mul: extern "C" fn(f32, f32) -> f32,
    pub f32_div: extern "C" fn(f32, f32) -> f32,
    pub f32_max: extern "C" fn(f32, f32) -> f32,
    pub f32_min: extern "C" fn(f32, f32) -> f32,
    pub f32_exp: extern "C" fn(f32) -> f32,
    pub f32_sqrt: extern "C" fn(f32) -> f32,
    /// Integer operators wrap; division by zero yields 0
    pub i32_add: extern "C" fn(i32, i32) -> i32,
    pub i32_sub: extern "C" fn(i32, i32) -> i32,
    pub i32_mul: extern "C" fn(i32, i32) -> i32,
    pub i32_div: extern "C" fn(i32, i32) -> i32,
    pub bool_and: extern "C" fn(bool, bool) -> bool,
    pub bool_or: extern "C" fn(bool, bool) -> bool,
    pub bool_xor: extern "C" fn(bool, bool) -> bool,
    pub bool_not: extern "C" fn(bool) -> bool,
    /// `(coords, entry, data, size)`: runs the module-relative `entry` on the
    /// thread pool; `coords` may be null
    pub spawn: unsafe extern "C" fn(Handle, *const ThreadCoords, usize, *const c_void, usize),
    /// Joins every spawned thread, returning how many there were
    pub drain: unsafe extern "C" fn(Handle) -> usize,
}

/// The three tables handed to an entry point.
#[derive(Debug, Clone, Copy)]
pub struct Capabilities {
    pub hardware: HardwareCapabilities,
    pub host: HostCapabilities,
    pub math: MathCapabilities,
}

impl Capabilities {
    /// Builds the tables for `runtime`, which must outlive every call made
    /// through them.
    #[must_use]
    pub fn new(runtime: &Runtime) -> Self {
        let handle: Handle = core::ptr::from_ref(runtime).cast();
        Self {
            hardware: HardwareCapabilities {
                runtime: handle,
                barrier: hw_barrier,
                lock: hw_lock,
                unlock: hw_unlock,
                coordinate: hw_coordinate,
                dimension: hw_dimension,
                timer: hw_timer,
                timer_start: hw_timer_start,
                timer_stop: hw_timer_stop,
            },
            host: HostCapabilities {
                runtime: handle,
                alloc: host_alloc,
                free: host_free,
                copy: host_copy,
                assert: host_assert,
                print: host_print,
            },
            math: MathCapabilities {
                runtime: handle,
                f32_add,
                f32_sub,
                f32_mul,
                f32_div,
                f32_max,
                f32_min,
                f32_exp,
                f32_sqrt,
                i32_add,
                i32_sub,
                i32_mul,
                i32_div,
                bool_and,
                bool_or,
                bool_xor,
                bool_not,
                spawn: math_spawn,
                drain: math_drain,
            },
        }
    }

    #[must_use]
    #[inline]
    pub fn args<'a>(&'a self, inputs: &'a [*mut c_void]) -> EntryArgs<'a> {
        EntryArgs {
            hardware: &self.hardware,
            host: &self.host,
            math: &self.math,
            inputs,
        }
    }
}

/// # Safety
///
/// `handle` must come from [`Capabilities::new`] and the runtime must be alive.
unsafe fn runtime<'a>(handle: Handle) -> &'a Runtime {
    unsafe { &*handle.cast::<Runtime>() }
}

unsafe extern "C" fn hw_barrier(handle: Handle, level: u32) -> i32 {
    let runtime = unsafe { runtime(handle) };
    let Ok(level) = Axis::try_from(level) else {
        warn!("Module asked for barrier level {level}");
        return BarrierStatus::BadLevel.into();
    };
    let Some(context) = locals::current() else {
        return BarrierStatus::NoContext.into();
    };

    let status = match runtime.barrier(level, context.coords()) {
        Ok(()) => BarrierStatus::Ok,
        Err(RuntimeError::Stalled(stalled)) if stalled.phase == Phase::Poisoned => {
            BarrierStatus::Poisoned
        }
        Err(RuntimeError::Stalled(_)) => BarrierStatus::Stalled,
        Err(_) => BarrierStatus::Topology,
    };
    status.into()
}

unsafe extern "C" fn hw_lock(handle: Handle, id: u32) {
    let runtime = unsafe { runtime(handle) };
    if !runtime.lock(id) {
        error!("Module locked unknown lock {id}");
    }
}

unsafe extern "C" fn hw_unlock(handle: Handle, id: u32) {
    let runtime = unsafe { runtime(handle) };
    // Safety: modules only unlock locks they hold.
    if !unsafe { runtime.unlock(id) } {
        error!("Module unlocked lock {id}, which is unknown or not held");
    }
}

unsafe extern "C" fn hw_coordinate(_: Handle, axis: u32) -> u32 {
    Axis::try_from(axis)
        .ok()
        .and_then(locals::coordinate)
        .unwrap_or(0)
}

unsafe extern "C" fn hw_dimension(handle: Handle, axis: u32) -> u32 {
    let runtime = unsafe { runtime(handle) };
    Axis::try_from(axis).map_or(0, |axis| runtime.topology().dimension(axis))
}

/// Timer record of the calling thread's context.
fn current_timer<'a>(_: &'a Runtime) -> Option<&'a TimerRecord> {
    let timer = locals::current()?.timer();
    // Safety: timers in a context come from `Runtime::context`, and the
    // runtime outlives its pool threads and module runs.
    unsafe { timer.as_ref() }
}

unsafe extern "C" fn hw_timer(handle: Handle) -> *const TimerRecord {
    let runtime = unsafe { runtime(handle) };
    current_timer(runtime).map_or(core::ptr::null(), core::ptr::from_ref)
}

unsafe extern "C" fn hw_timer_start(handle: Handle) {
    let runtime = unsafe { runtime(handle) };
    if let Some(timer) = current_timer(runtime) {
        timer.start(runtime.now_ns());
    }
}

unsafe extern "C" fn hw_timer_stop(handle: Handle) {
    let runtime = unsafe { runtime(handle) };
    if let Some(timer) = current_timer(runtime) {
        timer.stop(runtime.now_ns());
    }
}

unsafe extern "C" fn host_alloc(_: Handle, size: usize, align: usize) -> *mut c_void {
    match Layout::from_size_align(size, align) {
        // Safety: the layout has a nonzero size.
        Ok(layout) if layout.size() > 0 => unsafe { std::alloc::alloc(layout).cast() },
        _ => core::ptr::null_mut(),
    }
}

unsafe extern "C" fn host_free(_: Handle, ptr: *mut c_void, size: usize, align: usize) {
    if ptr.is_null() {
        return;
    }
    if let Ok(layout) = Layout::from_size_align(size, align) {
        // Safety: `ptr` was returned by `host_alloc` with this layout.
        unsafe { std::alloc::dealloc(ptr.cast(), layout) };
    }
}

unsafe extern "C" fn host_copy(_: Handle, dst: *mut c_void, src: *const c_void, len: usize) {
    if len > 0 {
        unsafe { core::ptr::copy(src.cast::<u8>(), dst.cast::<u8>(), len) };
    }
}

/// # Safety
///
/// `message` must point to `len` readable bytes, or be null.
unsafe fn text<'a>(message: *const u8, len: usize) -> Cow<'a, str> {
    if message.is_null() || len == 0 {
        return Cow::Borrowed("");
    }
    String::from_utf8_lossy(unsafe { core::slice::from_raw_parts(message, len) })
}

unsafe extern "C" fn host_assert(_: Handle, condition: bool, message: *const u8, len: usize) {
    if !condition {
        let message = unsafe { text(message, len) };
        error!(target: "module", "Assertion failed: {message}");
        // Unwinding out of an `extern "C"` function aborts the process.
        panic!("module assertion failed: {message}");
    }
}

unsafe extern "C" fn host_print(_: Handle, message: *const u8, len: usize) {
    let message = unsafe { text(message, len) };
    info!(target: "module", "{message}");
}

macro_rules! operators {
    ($($name:ident($($arg:ident),+): $ty:ty => $body:expr;)*) => {
        $(
            extern "C" fn $name($($arg: $ty),+) -> $ty {
                $body
            }
        )*
    };
}

operators! {
    f32_add(a, b): f32 => a + b;
    f32_sub(a, b): f32 => a - b;
    f32_mul(a, b): f32 => a * b;
    f32_div(a, b): f32 => a / b;
    f32_max(a, b): f32 => a.max(b);
    f32_min(a, b): f32 => a.min(b);
    f32_exp(a): f32 => a.exp();
    f32_sqrt(a): f32 => a.sqrt();
    i32_add(a, b): i32 => a.wrapping_add(b);
    i32_sub(a, b): i32 => a.wrapping_sub(b);
    i32_mul(a, b): i32 => a.wrapping_mul(b);
    i32_div(a, b): i32 => a.checked_div(b).unwrap_or(0);
    bool_and(a, b): bool => a & b;
    bool_or(a, b): bool => a | b;
    bool_xor(a, b): bool => a ^ b;
    bool_not(a): bool => !a;
}

unsafe extern "C" fn math_spawn(
    handle: Handle,
    coords: *const ThreadCoords,
    entry: usize,
    data: *const c_void,
    size: usize,
) {
    let runtime = unsafe { runtime(handle) };
    let context = unsafe { coords.as_ref() }.map(|coords| runtime.context(*coords));
    let data = if data.is_null() || size == 0 {
        &[][..]
    } else {
        unsafe { core::slice::from_raw_parts(data.cast::<u8>(), size) }
    };
    // Safety: the module hands out entries of its own image, which outlives
    // the pool threads.
    unsafe { runtime.pool().spawn(context, entry, data) };
}

unsafe extern "C" fn math_drain(handle: Handle) -> usize {
    let runtime = unsafe { runtime(handle) };
    runtime.pool().drain()
}
