//! Per-architecture relocation back-ends.
use crate::{
    Result,
    error::ElfLoadError,
    header::{RelocStyle, RelocationEntry},
    segments::Image,
    target::{Class, Endian, Machine},
};

/// Relocation rules of one architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backend {
    pub machine: Machine,
    /// Table styles the architecture emits, in processing order
    pub styles: &'static [RelocStyle],
    /// `R_*_NONE`
    pub none: u32,
    /// `R_*_RELATIVE`
    pub relative: u32,
}

const ARM: Backend = Backend {
    machine: Machine::Arm,
    styles: &[RelocStyle::Rel, RelocStyle::Rela],
    none: 0,
    relative: 23,
};

const AARCH64: Backend = Backend {
    machine: Machine::AArch64,
    styles: &[RelocStyle::Rela],
    none: 0,
    relative: 1027,
};

const X86: Backend = Backend {
    machine: Machine::X86,
    styles: &[RelocStyle::Rel],
    none: 0,
    relative: 8,
};

const X86_64: Backend = Backend {
    machine: Machine::X86_64,
    styles: &[RelocStyle::Rela],
    none: 0,
    relative: 8,
};

const RISCV64: Backend = Backend {
    machine: Machine::RiscV,
    styles: &[RelocStyle::Rela],
    none: 0,
    relative: 3,
};

impl Machine {
    #[must_use]
    #[inline]
    pub const fn backend(self) -> &'static Backend {
        match self {
            Self::Arm => &ARM,
            Self::AArch64 => &AARCH64,
            Self::X86 => &X86,
            Self::X86_64 => &X86_64,
            Self::RiscV => &RISCV64,
        }
    }
}

impl Backend {
    /// Applies one relocation against a module loaded at `base`.
    ///
    /// `NONE` is skipped. `RELATIVE` stores `base + addend`, or adds `base` to
    /// the word already at the location when the entry has no addend.
    ///
    /// # Errors
    ///
    /// Returns `BadRelocation` for any other type, for a `RELATIVE` entry that
    /// names a symbol, or for a location outside the image.
    pub fn apply_relative(
        &self,
        image: &mut Image<'_>,
        base: u64,
        entry: &RelocationEntry,
        class: Class,
        endian: Endian,
    ) -> Result<()> {
        if entry.kind == self.none {
            return Ok(());
        }
        if entry.kind != self.relative || entry.symbol != 0 {
            return Err(ElfLoadError::BadRelocation);
        }

        let location = base
            .checked_add(entry.offset)
            .ok_or(ElfLoadError::BadRelocation)?;

        let value = match entry.addend {
            Some(addend) => base.wrapping_add_signed(addend),
            None => image
                .read_word(location, class, endian)
                .ok_or(ElfLoadError::BadRelocation)?
                .wrapping_add(base),
        };

        image
            .write_word(location, value, class, endian)
            .ok_or(ElfLoadError::BadRelocation)
    }
}
