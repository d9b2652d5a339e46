#![allow(dead_code)]

//! Little-endian ELF64 x86-64 module fixtures.

pub const ET_EXEC: u16 = 2;
pub const ET_DYN: u16 = 3;
pub const EM_X86_64: u16 = 62;
pub const EM_AARCH64: u16 = 183;

pub const PT_LOAD: u32 = 1;
pub const PT_DYNAMIC: u32 = 2;

pub const R_X86_64_RELATIVE: u64 = 8;

/// Module layout, in module coordinates equal to file offsets.
pub const CODE: u64 = 0x100;
pub const DYNAMIC: u64 = 0x110;
pub const RELA: u64 = 0x150;
pub const DATA: u64 = 0x180;

/// `inputs[0]` is incremented and `inputs[1]` receives the hardware table
/// pointer:
///
/// ```text
/// mov rax, [rcx]
/// inc qword ptr [rax]
/// mov rax, [rcx + 8]
/// mov [rax], rdi
/// ret
/// ```
pub const BUMP_CODE: [u8; 16] = [
    0x48, 0x8B, 0x01, 0x48, 0xFF, 0x00, 0x48, 0x8B, 0x41, 0x08, 0x48, 0x89, 0x38, 0xC3, 0x90, 0x90,
];

#[derive(Clone, Copy)]
pub struct Phdr {
    pub kind: u32,
    pub offset: u64,
    pub vaddr: u64,
    pub file_size: u64,
    pub mem_size: u64,
    pub align: u64,
}

fn put(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(bytes);
}

/// Header and program headers; the caller appends the body at [`CODE`].
pub fn elf64(machine: u16, file_type: u16, entry: u64, phdrs: &[Phdr]) -> Vec<u8> {
    let mut buf = Vec::new();
    put(&mut buf, &[0x7F, b'E', b'L', b'F', 2, 1, 1]);
    buf.resize(16, 0);
    put(&mut buf, &file_type.to_le_bytes());
    put(&mut buf, &machine.to_le_bytes());
    put(&mut buf, &1u32.to_le_bytes());
    put(&mut buf, &entry.to_le_bytes());
    put(&mut buf, &64u64.to_le_bytes()); // e_phoff
    put(&mut buf, &0u64.to_le_bytes()); // e_shoff
    put(&mut buf, &0u32.to_le_bytes()); // e_flags
    put(&mut buf, &64u16.to_le_bytes());
    put(&mut buf, &56u16.to_le_bytes());
    put(&mut buf, &(phdrs.len() as u16).to_le_bytes());
    put(&mut buf, &[0; 6]);

    for ph in phdrs {
        put(&mut buf, &ph.kind.to_le_bytes());
        put(&mut buf, &7u32.to_le_bytes()); // RWX
        put(&mut buf, &ph.offset.to_le_bytes());
        put(&mut buf, &ph.vaddr.to_le_bytes());
        put(&mut buf, &ph.vaddr.to_le_bytes());
        put(&mut buf, &ph.file_size.to_le_bytes());
        put(&mut buf, &ph.mem_size.to_le_bytes());
        put(&mut buf, &ph.align.to_le_bytes());
    }

    assert!(buf.len() as u64 <= CODE);
    buf.resize(CODE as usize, 0);
    buf
}

/// Module address of the partially file-backed segment of [`zero_fill`].
pub const BSS_SEGMENT: u64 = 0x140;

/// Increments `*inputs[0]` and copies the 32 bytes at [`BSS_SEGMENT`] to
/// `inputs[1]`:
///
/// ```text
/// mov rax, [rcx]
/// inc qword ptr [rax]
/// lea rdx, [rip + 0x33]
/// mov rax, [rcx + 8]
/// mov r8, [rdx]
/// mov [rax], r8
/// mov r8, [rdx + 8]
/// mov [rax + 8], r8
/// mov r8, [rdx + 16]
/// mov [rax + 16], r8
/// mov r8, [rdx + 24]
/// mov [rax + 24], r8
/// ret
/// ```
pub const DUMP_CODE: [u8; 48] = [
    0x48, 0x8B, 0x01, 0x48, 0xFF, 0x00, 0x48, 0x8D, 0x15, 0x33, 0x00, 0x00, 0x00, 0x48, 0x8B,
    0x41, 0x08, 0x4C, 0x8B, 0x02, 0x4C, 0x89, 0x00, 0x4C, 0x8B, 0x42, 0x08, 0x4C, 0x89, 0x40,
    0x08, 0x4C, 0x8B, 0x42, 0x10, 0x4C, 0x89, 0x40, 0x10, 0x4C, 0x8B, 0x42, 0x18, 0x4C, 0x89,
    0x40, 0x18, 0xC3,
];

/// An executable running [`DUMP_CODE`] whose segment at [`BSS_SEGMENT`] has
/// 16 file bytes of `0xAA` and a 16-byte zero-filled tail.
///
/// The first segment covers the whole file, so the tail is loaded with
/// `0xBB` garbage before the second segment zero-fills it.
pub fn zero_fill() -> Vec<u8> {
    let end = BSS_SEGMENT + 32;
    let mut elf = elf64(
        EM_X86_64,
        ET_EXEC,
        CODE,
        &[
            Phdr {
                kind: PT_LOAD,
                offset: 0,
                vaddr: 0,
                file_size: end,
                mem_size: end,
                align: 0x1000,
            },
            Phdr {
                kind: PT_LOAD,
                offset: BSS_SEGMENT,
                vaddr: BSS_SEGMENT,
                file_size: 16,
                mem_size: 32,
                align: 16,
            },
        ],
    );
    elf.extend_from_slice(&DUMP_CODE);
    elf.resize(BSS_SEGMENT as usize, 0x90);
    elf.extend_from_slice(&[0xAA; 16]);
    elf.extend_from_slice(&[0xBB; 16]);
    elf
}

/// A non-relocatable module running `code`.
pub fn executable(machine: u16, code: &[u8]) -> Vec<u8> {
    let len = code.len() as u64;
    let mut elf = elf64(
        machine,
        ET_EXEC,
        CODE,
        &[Phdr {
            kind: PT_LOAD,
            offset: 0,
            vaddr: 0,
            file_size: CODE + len,
            mem_size: CODE + len,
            align: 0x1000,
        }],
    );
    elf.extend_from_slice(code);
    elf
}

/// A position-independent module running `code`, whose word at [`DATA`]
/// is relocated to the runtime address of module address `target`.
pub fn position_independent(code: &[u8; 16], reloc_type: u64, target: u64) -> Vec<u8> {
    let file_len = DATA + 8;
    let mut elf = elf64(
        EM_X86_64,
        ET_DYN,
        CODE,
        &[
            Phdr {
                kind: PT_LOAD,
                offset: 0,
                vaddr: 0,
                file_size: file_len,
                mem_size: file_len + 0x80,
                align: 0x1000,
            },
            Phdr {
                kind: PT_DYNAMIC,
                offset: DYNAMIC,
                vaddr: DYNAMIC,
                file_size: 64,
                mem_size: 64,
                align: 8,
            },
        ],
    );
    elf.extend_from_slice(code);

    assert_eq!(elf.len() as u64, DYNAMIC);
    for (tag, value) in [(7u64, RELA), (8, 24), (9, 24), (0, 0)] {
        put(&mut elf, &tag.to_le_bytes());
        put(&mut elf, &value.to_le_bytes());
    }

    elf.resize(RELA as usize, 0);
    put(&mut elf, &DATA.to_le_bytes());
    put(&mut elf, &reloc_type.to_le_bytes());
    put(&mut elf, &target.to_le_bytes());

    elf.resize(DATA as usize, 0);
    put(&mut elf, &0u64.to_le_bytes());
    elf
}
