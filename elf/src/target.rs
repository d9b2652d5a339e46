//! Description of the machine a module is loaded for.
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Address-width class (`EI_CLASS`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum Class {
    Elf32 = 1,
    Elf64 = 2,
}

impl Class {
    #[must_use]
    #[inline]
    /// Size in bytes of an address-sized word.
    pub const fn word_size(self) -> usize {
        match self {
            Self::Elf32 => 4,
            Self::Elf64 => 8,
        }
    }
}

/// Byte order (`EI_DATA`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum Endian {
    Little = 1,
    Big = 2,
}

/// Supported instruction-set architectures (`e_machine`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u16)]
pub enum Machine {
    X86 = 3,
    Arm = 40,
    X86_64 = 62,
    AArch64 = 183,
    RiscV = 243,
}

impl Machine {
    #[must_use]
    #[inline]
    /// The address-width class this loader accepts for the machine.
    pub const fn class(self) -> Class {
        match self {
            Self::X86 | Self::Arm => Class::Elf32,
            Self::X86_64 | Self::AArch64 | Self::RiscV => Class::Elf64,
        }
    }
}

#[cfg(not(any(
    target_arch = "x86",
    target_arch = "x86_64",
    target_arch = "arm",
    target_arch = "aarch64",
    target_arch = "riscv64"
)))]
compile_error!("the module loader supports x86, x86_64, arm, aarch64 and riscv64 hosts only");

/// The machine a module must be built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pub class: Class,
    pub endian: Endian,
    pub machine: Machine,
}

impl Target {
    #[must_use]
    #[inline]
    pub const fn new(machine: Machine, endian: Endian) -> Self {
        Self {
            class: machine.class(),
            endian,
            machine,
        }
    }

    #[must_use]
    /// The machine this code is running on.
    pub const fn host() -> Self {
        #[cfg(target_arch = "x86")]
        let machine = Machine::X86;
        #[cfg(target_arch = "x86_64")]
        let machine = Machine::X86_64;
        #[cfg(target_arch = "arm")]
        let machine = Machine::Arm;
        #[cfg(target_arch = "aarch64")]
        let machine = Machine::AArch64;
        #[cfg(target_arch = "riscv64")]
        let machine = Machine::RiscV;

        let endian = if cfg!(target_endian = "big") {
            Endian::Big
        } else {
            Endian::Little
        };

        Self::new(machine, endian)
    }
}
