//! On-disk ELF records and their decoding.
//!
//! Records are decoded field by field in the module's byte order, so the
//! loader never reinterprets borrowed memory as a structure and does not
//! care how the source buffer is aligned.
use crate::target::{Class, Endian, Machine};
use num_enum::{IntoPrimitive, TryFromPrimitive};

pub const ELF_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];
pub const EV_CURRENT: u8 = 1;

/// Size of `e_ident`.
pub const IDENT_SIZE: usize = 16;

pub const PT_LOAD: u32 = 1;
pub const PT_DYNAMIC: u32 = 2;

/// Accepted object file types (`e_type`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u16)]
pub enum FileType {
    /// Linked at a fixed address
    Executable = 2,
    /// Position-independent, needs relocating
    SharedObject = 3,
}

/// Dynamic table tags consulted by the relocation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(i64)]
pub enum DynamicTag {
    Null = 0,
    Rela = 7,
    RelaSize = 8,
    RelaEnt = 9,
    Rel = 17,
    RelSize = 18,
    RelEnt = 19,
}

/// The decoded part of the ELF header the loader cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub class: Class,
    pub endian: Endian,
    pub file_type: FileType,
    pub machine: Machine,
    /// Entry point, in module coordinates
    pub entry: u64,
    pub ph_offset: u64,
    pub ph_entry_size: u16,
    pub ph_count: u16,
}

impl Header {
    #[must_use]
    #[inline]
    /// Size of the full header for `class`.
    pub const fn size(class: Class) -> usize {
        match class {
            Class::Elf32 => 52,
            Class::Elf64 => 64,
        }
    }
}

/// Raw header fields following `e_ident`, before validation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RawHeader {
    pub file_type: u16,
    pub machine: u16,
    pub version: u32,
    pub entry: u64,
    pub ph_offset: u64,
    pub ph_entry_size: u16,
    pub ph_count: u16,
}

impl RawHeader {
    /// Decodes the header fields that follow `e_ident`.
    pub(crate) fn decode(bytes: &[u8], class: Class, endian: Endian) -> Self {
        let mut d = Decoder::new(bytes, class, endian);
        let file_type = d.u16();
        let machine = d.u16();
        let version = d.u32();
        let entry = d.word();
        let ph_offset = d.word();
        let _sh_offset = d.word();
        let _flags = d.u32();
        let _eh_size = d.u16();
        let ph_entry_size = d.u16();
        let ph_count = d.u16();
        Self {
            file_type,
            machine,
            version,
            entry,
            ph_offset,
            ph_entry_size,
            ph_count,
        }
    }
}

/// A program header (segment descriptor).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProgramHeader {
    pub kind: u32,
    pub flags: u32,
    pub offset: u64,
    pub virtual_addr: u64,
    pub physical_addr: u64,
    pub file_size: u64,
    pub mem_size: u64,
    pub align: u64,
}

impl ProgramHeader {
    #[must_use]
    #[inline]
    pub const fn size(class: Class) -> usize {
        match class {
            Class::Elf32 => 32,
            Class::Elf64 => 56,
        }
    }

    #[must_use]
    #[inline]
    pub const fn is_load(&self) -> bool {
        self.kind == PT_LOAD
    }

    #[must_use]
    #[inline]
    pub const fn is_dynamic(&self) -> bool {
        self.kind == PT_DYNAMIC
    }

    pub(crate) fn decode(bytes: &[u8], class: Class, endian: Endian) -> Self {
        let mut d = Decoder::new(bytes, class, endian);
        // The two classes order their fields differently.
        match class {
            Class::Elf32 => {
                let kind = d.u32();
                let offset = d.word();
                let virtual_addr = d.word();
                let physical_addr = d.word();
                let file_size = d.word();
                let mem_size = d.word();
                let flags = d.u32();
                let align = d.word();
                Self {
                    kind,
                    flags,
                    offset,
                    virtual_addr,
                    physical_addr,
                    file_size,
                    mem_size,
                    align,
                }
            }
            Class::Elf64 => Self {
                kind: d.u32(),
                flags: d.u32(),
                offset: d.u64(),
                virtual_addr: d.u64(),
                physical_addr: d.u64(),
                file_size: d.u64(),
                mem_size: d.u64(),
                align: d.u64(),
            },
        }
    }
}

/// One entry of the dynamic table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DynamicEntry {
    pub tag: i64,
    pub value: u64,
}

impl DynamicEntry {
    #[must_use]
    #[inline]
    pub const fn size(class: Class) -> usize {
        class.word_size() * 2
    }

    #[must_use]
    #[inline]
    pub fn tag(&self) -> Option<DynamicTag> {
        DynamicTag::try_from(self.tag).ok()
    }

    pub(crate) fn decode(bytes: &[u8], class: Class, endian: Endian) -> Self {
        let mut d = Decoder::new(bytes, class, endian);
        Self {
            tag: d.sword(),
            value: d.word(),
        }
    }
}

/// The two relocation table layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocStyle {
    /// Implicit addend, stored at the patch location
    Rel,
    /// Explicit addend in the entry
    Rela,
}

impl RelocStyle {
    #[must_use]
    #[inline]
    pub const fn entry_size(self, class: Class) -> usize {
        match self {
            Self::Rel => class.word_size() * 2,
            Self::Rela => class.word_size() * 3,
        }
    }

    /// The (table address, table size, entry size) tags for this style.
    #[must_use]
    #[inline]
    pub const fn tags(self) -> (DynamicTag, DynamicTag, DynamicTag) {
        match self {
            Self::Rel => (DynamicTag::Rel, DynamicTag::RelSize, DynamicTag::RelEnt),
            Self::Rela => (DynamicTag::Rela, DynamicTag::RelaSize, DynamicTag::RelaEnt),
        }
    }
}

/// A decoded relocation entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelocationEntry {
    /// Location to patch, in module coordinates
    pub offset: u64,
    pub kind: u32,
    pub symbol: u32,
    /// Explicit addend, RELA entries only
    pub addend: Option<i64>,
}

impl RelocationEntry {
    pub(crate) fn decode(bytes: &[u8], style: RelocStyle, class: Class, endian: Endian) -> Self {
        let mut d = Decoder::new(bytes, class, endian);
        let offset = d.word();
        let info = d.word();
        let addend = match style {
            RelocStyle::Rel => None,
            RelocStyle::Rela => Some(d.sword()),
        };
        // r_info packs (symbol, type) as 24/8 bits on ELF32 and 32/32 bits on ELF64.
        let (symbol, kind) = match class {
            Class::Elf32 => (info >> 8, info & 0xFF),
            Class::Elf64 => (info >> 32, info & 0xFFFF_FFFF),
        };
        #[expect(clippy::cast_possible_truncation, reason = "Masked above")]
        let (kind, symbol) = (kind as u32, symbol as u32);
        Self {
            offset,
            kind,
            symbol,
            addend,
        }
    }
}

/// Sequential field reader over a record buffer.
///
/// Buffers are sized from the record layout before decoding, so reads never
/// run past the end.
pub(crate) struct Decoder<'a> {
    bytes: &'a [u8],
    pos: usize,
    class: Class,
    endian: Endian,
}

impl<'a> Decoder<'a> {
    pub(crate) const fn new(bytes: &'a [u8], class: Class, endian: Endian) -> Self {
        Self {
            bytes,
            pos: 0,
            class,
            endian,
        }
    }

    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.bytes[self.pos..self.pos + N]);
        self.pos += N;
        out
    }

    pub(crate) fn u16(&mut self) -> u16 {
        let b = self.take::<2>();
        match self.endian {
            Endian::Little => u16::from_le_bytes(b),
            Endian::Big => u16::from_be_bytes(b),
        }
    }

    pub(crate) fn u32(&mut self) -> u32 {
        let b = self.take::<4>();
        match self.endian {
            Endian::Little => u32::from_le_bytes(b),
            Endian::Big => u32::from_be_bytes(b),
        }
    }

    pub(crate) fn u64(&mut self) -> u64 {
        let b = self.take::<8>();
        match self.endian {
            Endian::Little => u64::from_le_bytes(b),
            Endian::Big => u64::from_be_bytes(b),
        }
    }

    /// An address-sized unsigned word.
    pub(crate) fn word(&mut self) -> u64 {
        match self.class {
            Class::Elf32 => u64::from(self.u32()),
            Class::Elf64 => self.u64(),
        }
    }

    /// An address-sized signed word, sign-extended.
    #[expect(clippy::cast_possible_wrap, reason = "Two's complement reinterpretation")]
    pub(crate) fn sword(&mut self) -> i64 {
        match self.class {
            Class::Elf32 => i64::from(self.u32() as i32),
            Class::Elf64 => self.u64() as i64,
        }
    }
}

/// Encodes `value` as an address-sized word.
///
/// Returns the number of bytes written into `out`.
pub(crate) fn encode_word(value: u64, class: Class, endian: Endian, out: &mut [u8; 8]) -> usize {
    match class {
        Class::Elf32 => {
            #[expect(clippy::cast_possible_truncation, reason = "32-bit word")]
            let v = value as u32;
            let b = match endian {
                Endian::Little => v.to_le_bytes(),
                Endian::Big => v.to_be_bytes(),
            };
            out[..4].copy_from_slice(&b);
            4
        }
        Class::Elf64 => {
            *out = match endian {
                Endian::Little => value.to_le_bytes(),
                Endian::Big => value.to_be_bytes(),
            };
            8
        }
    }
}
