//! Segment loading.
use crate::{
    Result,
    error::ElfLoadError,
    header::{Decoder, encode_word},
    module::Module,
    source::ModuleSource,
    target::{Class, Endian},
};

/// Hands out destination memory for loadable segments.
pub trait SegmentAllocator {
    /// Returns a writable destination for a segment of `size` bytes that
    /// targets the given runtime addresses, or `None` if it cannot be placed.
    fn allocate(&mut self, physical: u64, virtual_addr: u64, size: u64) -> Option<&mut [u8]>;
}

/// A byte buffer standing for the runtime address range
/// `[base, base + len)`.
///
/// Physical and virtual addresses coincide in this runtime, so segments are
/// placed at their virtual target verbatim.
#[derive(Debug)]
pub struct Image<'a> {
    base: u64,
    bytes: &'a mut [u8],
}

impl<'a> Image<'a> {
    #[must_use]
    #[inline]
    pub const fn new(base: u64, bytes: &'a mut [u8]) -> Self {
        Self { base, bytes }
    }

    #[must_use]
    #[inline]
    pub const fn base(&self) -> u64 {
        self.base
    }

    #[must_use]
    #[inline]
    pub const fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[must_use]
    #[inline]
    pub const fn as_bytes(&self) -> &[u8] {
        self.bytes
    }

    fn index_range(&self, addr: u64, size: u64) -> Option<core::ops::Range<usize>> {
        let start = usize::try_from(addr.checked_sub(self.base)?).ok()?;
        let end = start.checked_add(usize::try_from(size).ok()?)?;
        (end <= self.bytes.len()).then_some(start..end)
    }

    #[must_use]
    /// The bytes at runtime address `addr`, if they lie inside the image.
    pub fn range(&self, addr: u64, size: u64) -> Option<&[u8]> {
        let range = self.index_range(addr, size)?;
        Some(&self.bytes[range])
    }

    #[must_use]
    pub fn range_mut(&mut self, addr: u64, size: u64) -> Option<&mut [u8]> {
        let range = self.index_range(addr, size)?;
        Some(&mut self.bytes[range])
    }

    /// Reads an address-sized word at `addr`.
    pub(crate) fn read_word(&self, addr: u64, class: Class, endian: Endian) -> Option<u64> {
        let bytes = self.range(addr, class.word_size() as u64)?;
        Some(Decoder::new(bytes, class, endian).word())
    }

    /// Writes an address-sized word at `addr`, truncating to the word width.
    pub(crate) fn write_word(
        &mut self,
        addr: u64,
        value: u64,
        class: Class,
        endian: Endian,
    ) -> Option<()> {
        let mut buf = [0u8; 8];
        let len = encode_word(value, class, endian, &mut buf);
        self.range_mut(addr, len as u64)?
            .copy_from_slice(&buf[..len]);
        Some(())
    }
}

impl SegmentAllocator for Image<'_> {
    #[inline]
    fn allocate(&mut self, _physical: u64, virtual_addr: u64, size: u64) -> Option<&mut [u8]> {
        self.range_mut(virtual_addr, size)
    }
}

impl<S: ModuleSource> Module<S> {
    /// Copies every loadable segment into memory obtained from `allocator`,
    /// zero-filling the part of each segment that is not backed by the file.
    ///
    /// Segments are processed in table order. Overlapping segments are not
    /// detected; the later one wins.
    ///
    /// # Errors
    ///
    /// Returns `OutOfMemory` if the allocator refuses a segment, or any error
    /// raised while reading the source.
    pub fn load<A: SegmentAllocator + ?Sized>(&self, allocator: &mut A) -> Result<()> {
        for ph in self.program_headers() {
            let ph = ph?;
            if !ph.is_load() {
                continue;
            }

            let physical = self
                .phys_base()
                .checked_add(ph.physical_addr)
                .ok_or(ElfLoadError::Overflow)?;
            let virtual_addr = self
                .virt_base()
                .checked_add(ph.virtual_addr)
                .ok_or(ElfLoadError::Overflow)?;

            let mem_size = usize::try_from(ph.mem_size).map_err(|_| ElfLoadError::InvalidSegment)?;
            let file_size =
                usize::try_from(ph.file_size).map_err(|_| ElfLoadError::InvalidSegment)?;

            let dest = allocator
                .allocate(physical, virtual_addr, ph.mem_size)
                .and_then(|dest| dest.get_mut(..mem_size))
                .ok_or(ElfLoadError::OutOfMemory)?;

            let (data, bss) = dest
                .split_at_mut_checked(file_size)
                .ok_or(ElfLoadError::InvalidSegment)?;

            self.source().read_at(ph.offset, data)?;
            bss.fill(0);
        }

        Ok(())
    }
}
