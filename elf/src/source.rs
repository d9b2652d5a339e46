//! Byte sources a module can be read from.
use crate::{Result, error::ElfLoadError};

/// Random-access reader over the bytes of a module.
///
/// The loader never holds on to the module's bytes directly: every header,
/// table and segment is fetched through `read_at`, so a source may just as
/// well be backed by a file or a device as by an in-memory buffer.
pub trait ModuleSource {
    /// Fills `buf` with the bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns `ElfLoadError::Io` if the full range cannot be supplied.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()>;
}

impl ModuleSource for [u8] {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let start = usize::try_from(offset).map_err(|_| ElfLoadError::Io)?;
        let end = start.checked_add(buf.len()).ok_or(ElfLoadError::Io)?;
        let bytes = self.get(start..end).ok_or(ElfLoadError::Io)?;
        buf.copy_from_slice(bytes);
        Ok(())
    }
}

impl<const N: usize> ModuleSource for [u8; N] {
    #[inline]
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.as_slice().read_at(offset, buf)
    }
}

impl<T: ModuleSource + ?Sized> ModuleSource for &T {
    #[inline]
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        (**self).read_at(offset, buf)
    }
}
