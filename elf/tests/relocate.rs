mod common;

use common::*;
use elf::{ElfLoadError, Endian, Image, Machine, Module, Target, header::RelocStyle};

fn relative(target: Target, index: u64, addend: i64) -> RelocSpec {
    RelocSpec {
        offset: DATA_OFF + index * word_size(target),
        kind: target.machine.backend().relative,
        symbol: 0,
        addend,
    }
}

/// Loads and relocates `bytes` at `base`, returning the image contents.
fn load_at(bytes: &[u8], target: Target, base: u64) -> Result<Vec<u8>, ElfLoadError> {
    let mut module = Module::init_for(bytes, target)?;
    module.set_load_base(base, base);

    let mut memory = vec![0u8; module.mem_size() as usize];
    let mut image = Image::new(base, &mut memory);
    module.load(&mut image)?;
    module.relocate(&mut image)?;
    Ok(memory)
}

#[test]
fn test_rela_relative() {
    let target = Target::new(Machine::X86_64, Endian::Little);
    let relocs = [relative(target, 0, 0x10), relative(target, 1, 0x400)];
    let bytes = build_pic(target, RelocStyle::Rela, &relocs, &[0, 0, 0x55], None);

    let module = Module::init_for(&bytes[..], target).unwrap();
    assert!(module.is_relocatable());
    let table = module.relocation_table(RelocStyle::Rela).unwrap().unwrap();
    assert_eq!(table.offset, RELOC_OFF);
    assert_eq!(table.count, 2);
    assert!(module.relocation_table(RelocStyle::Rel).unwrap().is_none());

    let base = 0x5555_0000;
    let memory = load_at(&bytes, target, base).unwrap();
    assert_eq!(read_word(target, &memory, DATA_OFF), base + 0x10);
    assert_eq!(read_word(target, &memory, DATA_OFF + 8), base + 0x400);
    // Untouched by any relocation.
    assert_eq!(read_word(target, &memory, DATA_OFF + 16), 0x55);
}

#[test]
fn test_relocation_depends_on_base() {
    let target = Target::new(Machine::RiscV, Endian::Little);
    let relocs = [relative(target, 0, 0x20), relative(target, 1, -0x8)];
    let bytes = build_pic(target, RelocStyle::Rela, &relocs, &[0, 0], None);

    let low = load_at(&bytes, target, 0x10_0000).unwrap();
    let high = load_at(&bytes, target, 0x7F_0000).unwrap();
    for index in 0..2 {
        let offset = DATA_OFF + index * 8;
        assert_eq!(
            read_word(target, &high, offset) - read_word(target, &low, offset),
            0x7F_0000 - 0x10_0000
        );
    }
    assert_eq!(read_word(target, &low, DATA_OFF + 8), 0x10_0000 - 0x8);
}

#[test]
fn test_rel_relative_32bit() {
    let target = Target::new(Machine::X86, Endian::Little);
    let relocs = [relative(target, 0, 0), relative(target, 1, 0)];
    let bytes = build_pic(target, RelocStyle::Rel, &relocs, &[0x40, 0x80], None);

    let base = 0x1000_0000;
    let memory = load_at(&bytes, target, base).unwrap();
    assert_eq!(read_word(target, &memory, DATA_OFF), base + 0x40);
    assert_eq!(read_word(target, &memory, DATA_OFF + 4), base + 0x80);
}

#[test]
fn test_arm_rel_table() {
    let target = Target::new(Machine::Arm, Endian::Little);
    let relocs = [relative(target, 0, 0)];
    let bytes = build_pic(target, RelocStyle::Rel, &relocs, &[0x24], None);

    let memory = load_at(&bytes, target, 0x8000).unwrap();
    assert_eq!(read_word(target, &memory, DATA_OFF), 0x8024);
}

#[test]
fn test_big_endian_module() {
    let target = Target::new(Machine::AArch64, Endian::Big);
    let relocs = [relative(target, 0, 0x1234)];
    let bytes = build_pic(target, RelocStyle::Rela, &relocs, &[0], None);

    let base = 0x4000_0000;
    let memory = load_at(&bytes, target, base).unwrap();
    assert_eq!(
        &memory[DATA_OFF as usize..DATA_OFF as usize + 8],
        &(base + 0x1234).to_be_bytes()
    );
}

#[test]
fn test_none_is_skipped() {
    let target = Target::new(Machine::X86_64, Endian::Little);
    let none = RelocSpec {
        kind: 0,
        ..relative(target, 0, 0x99)
    };
    let relocs = [none, relative(target, 1, 0x8)];
    let bytes = build_pic(target, RelocStyle::Rela, &relocs, &[0x77, 0], None);

    let memory = load_at(&bytes, target, 0x2000).unwrap();
    assert_eq!(read_word(target, &memory, DATA_OFF), 0x77);
    assert_eq!(read_word(target, &memory, DATA_OFF + 8), 0x2008);
}

#[test]
fn test_symbol_reference_halts() {
    let target = Target::new(Machine::X86_64, Endian::Little);
    let with_symbol = RelocSpec {
        symbol: 3,
        ..relative(target, 1, 0)
    };
    let relocs = [relative(target, 0, 0x10), with_symbol, relative(target, 2, 0x30)];
    let bytes = build_pic(target, RelocStyle::Rela, &relocs, &[0, 0, 0], None);

    let mut module = Module::init_for(&bytes[..], target).unwrap();
    let base = 0x9000;
    module.set_load_base(base, base);
    let mut memory = vec![0u8; module.mem_size() as usize];
    let mut image = Image::new(base, &mut memory);
    module.load(&mut image).unwrap();

    assert_eq!(
        module.relocate(&mut image),
        Err(ElfLoadError::BadRelocation)
    );
    // Entries before the failing one stay applied, later ones are not.
    assert_eq!(read_word(target, &memory, DATA_OFF), base + 0x10);
    assert_eq!(read_word(target, &memory, DATA_OFF + 16), 0);
}

#[test]
fn test_unsupported_type() {
    let target = Target::new(Machine::AArch64, Endian::Little);
    let abs64 = RelocSpec {
        kind: 257,
        ..relative(target, 0, 0)
    };
    let bytes = build_pic(target, RelocStyle::Rela, &[abs64], &[0], None);

    assert_eq!(
        load_at(&bytes, target, 0x1000),
        Err(ElfLoadError::BadRelocation)
    );
}

#[test]
fn test_out_of_image_location() {
    let target = Target::new(Machine::X86_64, Endian::Little);
    let far = RelocSpec {
        offset: 0x10_0000,
        ..relative(target, 0, 0)
    };
    let bytes = build_pic(target, RelocStyle::Rela, &[far], &[0], None);

    assert_eq!(
        load_at(&bytes, target, 0x1000),
        Err(ElfLoadError::BadRelocation)
    );
}

#[test]
fn test_bad_entry_size() {
    let target = Target::new(Machine::X86_64, Endian::Little);
    let relocs = [relative(target, 0, 0)];
    let bytes = build_pic(target, RelocStyle::Rela, &relocs, &[0], Some(16));

    let module = Module::init_for(&bytes[..], target).unwrap();
    assert_eq!(
        module.relocation_table(RelocStyle::Rela),
        Err(ElfLoadError::BadDynamic)
    );
    assert_eq!(
        load_at(&bytes, target, 0x1000),
        Err(ElfLoadError::BadDynamic)
    );
}

#[test]
fn test_empty_table() {
    let target = Target::new(Machine::X86_64, Endian::Little);
    let bytes = build_pic(target, RelocStyle::Rela, &[], &[0x42], None);

    let module = Module::init_for(&bytes[..], target).unwrap();
    assert!(module.relocation_table(RelocStyle::Rela).unwrap().is_none());

    let memory = load_at(&bytes, target, 0x3000).unwrap();
    assert_eq!(read_word(target, &memory, DATA_OFF), 0x42);
}

#[test]
fn test_executable_is_not_relocated() {
    let target = Target::host();
    let bytes = build_elf(
        target,
        ET_EXEC,
        0,
        &[SegmentSpec::load(BODY, 0, 8, 8, 8)],
        &[1, 2, 3, 4, 5, 6, 7, 8],
    );

    let memory = load_at(&bytes, target, 0x1000).unwrap();
    assert_eq!(memory, vec![1, 2, 3, 4, 5, 6, 7, 8]);
}
