//! Executable memory for loaded modules.
use elf::Image;
use memmap2::MmapMut;
use std::io;

/// An anonymous mapping that is readable, writable and executable, with an
/// aligned usable window of `len` bytes.
///
/// The mapping is released when the region is dropped.
pub struct ExecRegion {
    map: MmapMut,
    offset: usize,
    len: usize,
}

impl ExecRegion {
    /// Maps `len + align` bytes and upgrades them to read/write/execute.
    ///
    /// # Errors
    ///
    /// Returns the operating system error if the mapping fails.
    ///
    /// # Panics
    ///
    /// Panics if the permission upgrade fails: there is no way to run the
    /// module without it.
    pub fn allocate(len: usize, align: usize) -> io::Result<Self> {
        debug_assert!(align.is_power_of_two());
        let total = len
            .checked_add(align)
            .ok_or_else(|| io::Error::from(io::ErrorKind::OutOfMemory))?;

        let mut map = MmapMut::map_anon(total)?;

        // Safety: the range is exactly the mapping we own.
        let status = unsafe {
            libc::mprotect(
                map.as_mut_ptr().cast(),
                total,
                libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
            )
        };
        if status != 0 {
            panic!(
                "cannot make module memory executable: {}",
                io::Error::last_os_error()
            );
        }

        let start = map.as_ptr().addr();
        let offset = start.next_multiple_of(align) - start;

        Ok(Self { map, offset, len })
    }

    #[must_use]
    #[inline]
    /// Address of the aligned window.
    pub fn base(&self) -> usize {
        self.map.as_ptr().addr() + self.offset
    }

    #[must_use]
    #[inline]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    #[inline]
    /// The aligned window, as an image placed at its own address.
    pub fn image(&mut self) -> Image<'_> {
        let base = self.base() as u64;
        Image::new(base, &mut self.map[self.offset..self.offset + self.len])
    }
}

impl core::fmt::Debug for ExecRegion {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ExecRegion")
            .field("base", &format_args!("{:#x}", self.base()))
            .field("len", &self.len)
            .finish()
    }
}
