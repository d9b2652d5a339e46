use crate::topology::Axis;
use elf::ElfLoadError;
use hyperdrive::sync::barrier::Stalled;
use thiserror::Error;

/// Phase of a module invocation that failed.
///
/// No module code runs once any of these is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvokeError {
    #[error("module rejected: {0}")]
    Parse(#[source] ElfLoadError),
    #[error("cannot allocate {size} bytes of executable memory")]
    Allocate { size: u64 },
    #[error("segment loading failed: {0}")]
    Load(#[source] ElfLoadError),
    #[error("relocation failed: {0}")]
    Relocate(#[source] ElfLoadError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TopologyError {
    #[error("{axis} coordinate {value} is outside dimension {dimension}")]
    OutOfRange { axis: Axis, value: u32, dimension: u32 },
    #[error("topology has no die axis")]
    NoDieAxis,
    #[error("{axis} dimension must not be zero")]
    EmptyAxis { axis: Axis },
    #[error("topology holds more threads than addressable")]
    TooLarge,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Topology(#[from] TopologyError),
    #[error(transparent)]
    Invoke(#[from] InvokeError),
    #[error(transparent)]
    Stalled(#[from] Stalled),
}
