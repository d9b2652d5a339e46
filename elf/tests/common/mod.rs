#![allow(dead_code)]

use elf::{Class, Endian, Target, header::RelocStyle};

pub const PT_LOAD: u32 = 1;
pub const PT_DYNAMIC: u32 = 2;
pub const PT_NOTE: u32 = 4;

pub const ET_REL: u16 = 1;
pub const ET_EXEC: u16 = 2;
pub const ET_DYN: u16 = 3;

/// File offset where segment payloads start.
pub const BODY: u64 = 0x200;

/// Layout of the position-independent fixture, in module coordinates
/// (its single loadable segment maps the file at address 0).
pub const DYN_OFF: u64 = 0x200;
pub const RELOC_OFF: u64 = 0x280;
pub const DATA_OFF: u64 = 0x400;
pub const PIC_BSS: u64 = 0x40;

#[derive(Clone, Copy)]
pub struct SegmentSpec {
    pub kind: u32,
    pub offset: u64,
    pub vaddr: u64,
    pub paddr: u64,
    pub file_size: u64,
    pub mem_size: u64,
    pub align: u64,
}

impl SegmentSpec {
    pub fn load(offset: u64, vaddr: u64, file_size: u64, mem_size: u64, align: u64) -> Self {
        Self {
            kind: PT_LOAD,
            offset,
            vaddr,
            paddr: vaddr,
            file_size,
            mem_size,
            align,
        }
    }
}

#[derive(Clone, Copy)]
pub struct RelocSpec {
    pub offset: u64,
    pub kind: u32,
    pub symbol: u32,
    pub addend: i64,
}

/// Sequential writer in a target's word size and byte order.
pub struct Writer {
    pub target: Target,
    pub buf: Vec<u8>,
}

impl Writer {
    pub fn new(target: Target) -> Self {
        Self {
            target,
            buf: Vec::new(),
        }
    }

    pub fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn u16(&mut self, v: u16) {
        let b = match self.target.endian {
            Endian::Little => v.to_le_bytes(),
            Endian::Big => v.to_be_bytes(),
        };
        self.buf.extend_from_slice(&b);
    }

    pub fn u32(&mut self, v: u32) {
        let b = match self.target.endian {
            Endian::Little => v.to_le_bytes(),
            Endian::Big => v.to_be_bytes(),
        };
        self.buf.extend_from_slice(&b);
    }

    pub fn u64(&mut self, v: u64) {
        let b = match self.target.endian {
            Endian::Little => v.to_le_bytes(),
            Endian::Big => v.to_be_bytes(),
        };
        self.buf.extend_from_slice(&b);
    }

    pub fn word(&mut self, v: u64) {
        match self.target.class {
            Class::Elf32 => self.u32(v as u32),
            Class::Elf64 => self.u64(v),
        }
    }

    pub fn pad_to(&mut self, len: u64) {
        assert!(self.buf.len() as u64 <= len, "fixture overlaps itself");
        self.buf.resize(len as usize, 0);
    }
}

pub fn is_64(target: Target) -> bool {
    target.class == Class::Elf64
}

pub fn word_size(target: Target) -> u64 {
    target.class.word_size() as u64
}

/// Builds a module with the given program headers; `body` is placed at
/// file offset [`BODY`].
pub fn build_elf(
    target: Target,
    file_type: u16,
    entry: u64,
    segments: &[SegmentSpec],
    body: &[u8],
) -> Vec<u8> {
    let mut w = Writer::new(target);
    let (eh_size, ph_size) = if is_64(target) { (64, 56) } else { (52, 32) };

    w.buf.extend_from_slice(&[0x7F, b'E', b'L', b'F']);
    w.u8(if is_64(target) { 2 } else { 1 });
    w.u8(match target.endian {
        Endian::Little => 1,
        Endian::Big => 2,
    });
    w.u8(1); // EI_VERSION
    w.pad_to(16);

    w.u16(file_type);
    w.u16(u16::from(target.machine));
    w.u32(1); // e_version
    w.word(entry);
    w.word(eh_size); // e_phoff
    w.word(0); // e_shoff
    w.u32(0); // e_flags
    w.u16(eh_size as u16);
    w.u16(ph_size);
    w.u16(segments.len() as u16);
    w.u16(0); // e_shentsize
    w.u16(0); // e_shnum
    w.u16(0); // e_shstrndx
    assert_eq!(w.buf.len() as u64, eh_size);

    for seg in segments {
        if is_64(target) {
            w.u32(seg.kind);
            w.u32(0);
            w.u64(seg.offset);
            w.u64(seg.vaddr);
            w.u64(seg.paddr);
            w.u64(seg.file_size);
            w.u64(seg.mem_size);
            w.u64(seg.align);
        } else {
            w.u32(seg.kind);
            w.word(seg.offset);
            w.word(seg.vaddr);
            w.word(seg.paddr);
            w.word(seg.file_size);
            w.word(seg.mem_size);
            w.u32(0);
            w.word(seg.align);
        }
    }

    w.pad_to(BODY);
    w.buf.extend_from_slice(body);
    w.buf
}

/// Builds a position-independent module with one loadable segment mapping
/// the whole file at address 0, a dynamic table at [`DYN_OFF`], the
/// relocation table at [`RELOC_OFF`] and `data` words at [`DATA_OFF`].
///
/// `entry_size` overrides the advertised relocation entry size.
pub fn build_pic(
    target: Target,
    style: RelocStyle,
    relocs: &[RelocSpec],
    data: &[u64],
    entry_size: Option<u64>,
) -> Vec<u8> {
    let ws = word_size(target);
    let (addr_tag, size_tag, ent_tag) = match style {
        RelocStyle::Rel => (17, 18, 19),
        RelocStyle::Rela => (7, 8, 9),
    };
    let ent = style.entry_size(target.class) as u64;

    // Body is laid out in module coordinates starting at BODY == DYN_OFF.
    let mut body = Writer::new(target);
    body.buf.resize(BODY as usize, 0);
    for (tag, value) in [
        (addr_tag, RELOC_OFF),
        (size_tag, ent * relocs.len() as u64),
        (ent_tag, entry_size.unwrap_or(ent)),
        (0, 0),
    ] {
        body.word(tag);
        body.word(value);
    }
    let dyn_size = body.buf.len() as u64 - DYN_OFF;

    body.pad_to(RELOC_OFF);
    for reloc in relocs {
        body.word(reloc.offset);
        let info = if is_64(target) {
            (u64::from(reloc.symbol) << 32) | u64::from(reloc.kind)
        } else {
            (u64::from(reloc.symbol) << 8) | u64::from(reloc.kind & 0xFF)
        };
        body.word(info);
        if style == RelocStyle::Rela {
            body.word(reloc.addend as u64);
        }
    }

    body.pad_to(DATA_OFF);
    for word in data {
        body.word(*word);
    }
    let file_len = body.buf.len() as u64;

    let segments = [
        SegmentSpec::load(0, 0, file_len, file_len + PIC_BSS, 0x1000),
        SegmentSpec {
            kind: PT_DYNAMIC,
            offset: DYN_OFF,
            vaddr: DYN_OFF,
            paddr: DYN_OFF,
            file_size: dyn_size,
            mem_size: dyn_size,
            align: ws,
        },
    ];

    build_elf(target, ET_DYN, DATA_OFF, &segments, &body.buf[BODY as usize..])
}

/// Reads the address-sized word at `offset` of a loaded image.
pub fn read_word(target: Target, bytes: &[u8], offset: u64) -> u64 {
    let offset = offset as usize;
    match (target.class, target.endian) {
        (Class::Elf32, Endian::Little) => {
            u64::from(u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap()))
        }
        (Class::Elf32, Endian::Big) => {
            u64::from(u32::from_be_bytes(bytes[offset..offset + 4].try_into().unwrap()))
        }
        (Class::Elf64, Endian::Little) => {
            u64::from_le_bytes(bytes[offset..offset + 8].try_into().unwrap())
        }
        (Class::Elf64, Endian::Big) => {
            u64::from_be_bytes(bytes[offset..offset + 8].try_into().unwrap())
        }
    }
}
