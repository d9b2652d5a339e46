//! Error types for ELF module loading.
use thiserror::Error;

/// Errors that can occur while reading, loading or relocating a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ElfLoadError {
    /// The module source could not supply the requested bytes
    #[error("module source could not supply the requested bytes")]
    Io,
    /// Bad magic or a malformed header
    #[error("not an ELF object file")]
    NotElf,
    /// Address-width class differs from the target
    #[error("ELF class does not match the target address width")]
    WrongBitWidth,
    /// Byte order differs from the target
    #[error("ELF byte order does not match the target")]
    WrongEndianness,
    /// Identification or object-format version is not current
    #[error("unsupported ELF version")]
    WrongVersion,
    /// File type is neither executable nor position-independent
    #[error("ELF file is neither an executable nor a shared object")]
    WrongType,
    /// Machine differs from the target
    #[error("ELF machine does not match the target architecture")]
    WrongArch,
    /// Position-independent module without a dynamic segment
    #[error("position-independent module has no dynamic segment")]
    NoDynamic,
    /// Malformed dynamic table or relocation table descriptor
    #[error("malformed dynamic table")]
    BadDynamic,
    /// Unsupported or malformed relocation entry
    #[error("unsupported or malformed relocation")]
    BadRelocation,
    /// Invalid segment
    #[error("invalid segment")]
    InvalidSegment,
    /// The segment allocator refused a destination
    #[error("out of memory")]
    OutOfMemory,
    /// Arithmetic overflow
    #[error("arithmetic overflow")]
    Overflow,
}
