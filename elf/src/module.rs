//! Module context: header validation and layout planning.
use crate::{
    Result,
    error::ElfLoadError,
    header::{
        DynamicEntry, DynamicTag, ELF_MAGIC, EV_CURRENT, FileType, Header, IDENT_SIZE,
        ProgramHeader, RawHeader,
    },
    source::ModuleSource,
    target::{Class, Endian, Machine, Target},
};

/// Location of the dynamic table in the module file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DynamicSegment {
    pub offset: u64,
    pub size: u64,
}

/// A validated module, ready to be loaded and relocated.
///
/// Built by [`Module::init`], which reads nothing but headers: no memory is
/// allocated until [`Module::load`] hands segments to an allocator.
#[derive(Debug)]
pub struct Module<S> {
    source: S,
    target: Target,
    header: Header,
    /// Physical runtime load base
    phys_base: u64,
    /// Virtual runtime load base
    virt_base: u64,
    /// Bytes spanned by the loadable segments, from module address 0
    mem_size: u64,
    /// Largest segment alignment, at least 1
    align: u64,
    /// Only present for position-independent modules
    dynamic: Option<DynamicSegment>,
}

impl<S: ModuleSource> Module<S> {
    /// Validates a module built for the host machine.
    ///
    /// # Errors
    ///
    /// Returns the error matching the first header field that fails
    /// validation, `NoDynamic` for a position-independent module without a
    /// dynamic segment, or any error raised while reading the source.
    pub fn init(source: S) -> Result<Self> {
        Self::init_for(source, Target::host())
    }

    /// Validates a module built for `target`.
    ///
    /// # Errors
    ///
    /// See [`Module::init`].
    pub fn init_for(source: S, target: Target) -> Result<Self> {
        let header = read_header(&source, target)?;

        let mut module = Self {
            source,
            target,
            header,
            phys_base: 0,
            virt_base: 0,
            mem_size: 0,
            align: 1,
            dynamic: None,
        };

        let (mem_size, align) = module.plan_layout()?;
        module.mem_size = mem_size;
        module.align = align;

        if header.file_type == FileType::SharedObject {
            module.dynamic = Some(module.find_dynamic_segment()?.ok_or(ElfLoadError::NoDynamic)?);
        }

        Ok(module)
    }

    /// Computes the memory footprint and the required alignment.
    fn plan_layout(&self) -> Result<(u64, u64)> {
        let mut mem_size = 0u64;
        let mut align = 1u64;

        for ph in self.program_headers() {
            let ph = ph?;
            if !ph.is_load() {
                continue;
            }
            if ph.mem_size < ph.file_size {
                return Err(ElfLoadError::InvalidSegment);
            }
            let seg_align = ph.align.max(1);
            if !seg_align.is_power_of_two() {
                return Err(ElfLoadError::InvalidSegment);
            }

            let seg_end = ph
                .virtual_addr
                .checked_add(ph.mem_size)
                .ok_or(ElfLoadError::Overflow)?;
            mem_size = mem_size.max(seg_end);
            align = align.max(seg_align);
        }

        Ok((mem_size, align))
    }

    fn find_dynamic_segment(&self) -> Result<Option<DynamicSegment>> {
        for ph in self.program_headers() {
            let ph = ph?;
            if ph.is_dynamic() {
                return Ok(Some(DynamicSegment {
                    offset: ph.offset,
                    size: ph.file_size,
                }));
            }
        }
        Ok(None)
    }

    /// Reads the program header at `index`.
    ///
    /// # Errors
    ///
    /// Returns `Overflow` if the header lies past the addressable range, or
    /// any error raised while reading the source.
    pub fn program_header(&self, index: u16) -> Result<ProgramHeader> {
        let class = self.header.class;
        let offset = u64::from(index)
            .checked_mul(u64::from(self.header.ph_entry_size))
            .and_then(|rel| rel.checked_add(self.header.ph_offset))
            .ok_or(ElfLoadError::Overflow)?;

        let mut buf = [0u8; ProgramHeader::size(Class::Elf64)];
        let buf = &mut buf[..ProgramHeader::size(class)];
        self.source.read_at(offset, buf)?;

        Ok(ProgramHeader::decode(buf, class, self.header.endian))
    }

    /// Iterates over the program headers in table order.
    pub fn program_headers(&self) -> impl Iterator<Item = Result<ProgramHeader>> + '_ {
        (0..self.header.ph_count).map(|index| self.program_header(index))
    }

    /// Looks up the first dynamic table entry carrying `tag`.
    ///
    /// A missing tag, or a module without a dynamic table, yields `None`.
    ///
    /// # Errors
    ///
    /// Returns any error raised while reading the source.
    pub fn dynamic_value(&self, tag: DynamicTag) -> Result<Option<u64>> {
        let Some(dynamic) = self.dynamic else {
            return Ok(None);
        };

        let class = self.header.class;
        let entry_size = DynamicEntry::size(class);
        let count = dynamic.size / entry_size as u64;

        let mut buf = [0u8; DynamicEntry::size(Class::Elf64)];
        let buf = &mut buf[..entry_size];
        for index in 0..count {
            let offset = index
                .checked_mul(entry_size as u64)
                .and_then(|rel| rel.checked_add(dynamic.offset))
                .ok_or(ElfLoadError::Overflow)?;
            self.source.read_at(offset, buf)?;
            let entry = DynamicEntry::decode(buf, class, self.header.endian);
            match entry.tag() {
                Some(DynamicTag::Null) => break,
                Some(found) if found == tag => return Ok(Some(entry.value)),
                _ => {}
            }
        }

        Ok(None)
    }

    /// Translates a module virtual address to a file offset using the
    /// file-backed part of the loadable segments.
    ///
    /// # Errors
    ///
    /// Returns any error raised while reading the source.
    pub fn file_offset_of(&self, vaddr: u64) -> Result<Option<u64>> {
        for ph in self.program_headers() {
            let ph = ph?;
            if !ph.is_load() {
                continue;
            }
            if vaddr >= ph.virtual_addr && vaddr - ph.virtual_addr < ph.file_size {
                return Ok(ph.offset.checked_add(vaddr - ph.virtual_addr));
            }
        }
        Ok(None)
    }
}

impl<S> Module<S> {
    #[must_use]
    #[inline]
    pub const fn source(&self) -> &S {
        &self.source
    }

    #[must_use]
    #[inline]
    pub const fn target(&self) -> Target {
        self.target
    }

    #[must_use]
    #[inline]
    pub const fn header(&self) -> &Header {
        &self.header
    }

    #[must_use]
    #[inline]
    /// Total memory footprint of the loadable segments.
    ///
    /// Zero means there is nothing to load.
    pub const fn mem_size(&self) -> u64 {
        self.mem_size
    }

    #[must_use]
    #[inline]
    /// Required alignment of the load base.
    pub const fn align(&self) -> u64 {
        self.align
    }

    #[must_use]
    #[inline]
    pub const fn dynamic(&self) -> Option<DynamicSegment> {
        self.dynamic
    }

    #[must_use]
    #[inline]
    /// Whether the module must be relocated after loading.
    pub fn is_relocatable(&self) -> bool {
        self.header.file_type == FileType::SharedObject
    }

    #[must_use]
    #[inline]
    pub const fn phys_base(&self) -> u64 {
        self.phys_base
    }

    #[must_use]
    #[inline]
    pub const fn virt_base(&self) -> u64 {
        self.virt_base
    }

    #[inline]
    /// Sets the runtime load bases segments and relocations are computed
    /// against.
    pub const fn set_load_base(&mut self, phys_base: u64, virt_base: u64) {
        self.phys_base = phys_base;
        self.virt_base = virt_base;
    }

    /// Runtime address of the entry point.
    ///
    /// # Errors
    ///
    /// Returns `Overflow` if the address does not fit.
    pub fn entry_point(&self) -> Result<u64> {
        self.header
            .entry
            .checked_add(self.virt_base)
            .ok_or(ElfLoadError::Overflow)
    }
}

/// Reads and validates the ELF header.
fn read_header<S: ModuleSource>(source: &S, target: Target) -> Result<Header> {
    let mut ident = [0u8; IDENT_SIZE];
    source.read_at(0, &mut ident)?;

    if ident[..4] != ELF_MAGIC {
        return Err(ElfLoadError::NotElf);
    }

    let class = Class::try_from(ident[4])
        .ok()
        .filter(|class| *class == target.class)
        .ok_or(ElfLoadError::WrongBitWidth)?;

    let endian = Endian::try_from(ident[5])
        .ok()
        .filter(|endian| *endian == target.endian)
        .ok_or(ElfLoadError::WrongEndianness)?;

    if ident[6] != EV_CURRENT {
        return Err(ElfLoadError::WrongVersion);
    }

    let mut rest = [0u8; Header::size(Class::Elf64) - IDENT_SIZE];
    let rest = &mut rest[..Header::size(class) - IDENT_SIZE];
    source.read_at(IDENT_SIZE as u64, rest)?;
    let raw = RawHeader::decode(rest, class, endian);

    let file_type = FileType::try_from(raw.file_type).map_err(|_| ElfLoadError::WrongType)?;

    let machine = Machine::try_from(raw.machine)
        .ok()
        .filter(|machine| *machine == target.machine)
        .ok_or(ElfLoadError::WrongArch)?;

    if raw.version != u32::from(EV_CURRENT) {
        return Err(ElfLoadError::WrongVersion);
    }

    if raw.ph_count > 0 && usize::from(raw.ph_entry_size) < ProgramHeader::size(class) {
        return Err(ElfLoadError::NotElf);
    }

    Ok(Header {
        class,
        endian,
        file_type,
        machine,
        entry: raw.entry,
        ph_offset: raw.ph_offset,
        ph_entry_size: raw.ph_entry_size,
        ph_count: raw.ph_count,
    })
}
