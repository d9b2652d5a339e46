//! Relocation engine.
//!
//! Only position-independent fixups are supported: each architecture
//! back-end accepts its `NONE` and `RELATIVE` types and rejects everything
//! else, which is all a self-contained kernel module needs.
mod arch;

pub use arch::Backend;

use crate::{
    Result,
    error::ElfLoadError,
    header::{RelocStyle, RelocationEntry},
    module::Module,
    segments::Image,
    source::ModuleSource,
};

/// A relocation table located in the module file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelocationTable {
    pub style: RelocStyle,
    /// File offset of the first entry
    pub offset: u64,
    pub count: u64,
}

impl<S: ModuleSource> Module<S> {
    /// Looks up the relocation table of the given style.
    ///
    /// Returns `None` if the module has no such table, or an empty one.
    ///
    /// # Errors
    ///
    /// Returns `BadDynamic` if the table's entry size differs from the
    /// expected structure size or if the table cannot be found in the file.
    pub fn relocation_table(&self, style: RelocStyle) -> Result<Option<RelocationTable>> {
        let (addr_tag, size_tag, ent_tag) = style.tags();

        let Some(addr) = self.dynamic_value(addr_tag)? else {
            return Ok(None);
        };
        let size = self.dynamic_value(size_tag)?.unwrap_or(0);
        if size == 0 {
            return Ok(None);
        }

        let entry_size = style.entry_size(self.header().class) as u64;
        if self.dynamic_value(ent_tag)? != Some(entry_size) || size % entry_size != 0 {
            return Err(ElfLoadError::BadDynamic);
        }

        let offset = self.file_offset_of(addr)?.ok_or(ElfLoadError::BadDynamic)?;

        Ok(Some(RelocationTable {
            style,
            offset,
            count: size / entry_size,
        }))
    }

    /// Reads the relocation entry at `index` of `table`.
    ///
    /// # Errors
    ///
    /// Returns `Overflow` for an out-of-range index, or any error raised while
    /// reading the source.
    pub fn relocation_entry(&self, table: &RelocationTable, index: u64) -> Result<RelocationEntry> {
        let header = self.header();
        let entry_size = table.style.entry_size(header.class);
        let offset = index
            .checked_mul(entry_size as u64)
            .and_then(|rel| rel.checked_add(table.offset))
            .ok_or(ElfLoadError::Overflow)?;

        let mut buf = [0u8; 24];
        let buf = &mut buf[..entry_size];
        self.source().read_at(offset, buf)?;

        Ok(RelocationEntry::decode(
            buf,
            table.style,
            header.class,
            header.endian,
        ))
    }

    /// Applies every relocation of the module to `image`.
    ///
    /// Does nothing for modules that are not position-independent. Stops at
    /// the first failing entry; entries before it stay applied.
    ///
    /// # Errors
    ///
    /// Returns `BadDynamic` for a malformed table descriptor, `BadRelocation`
    /// for an unsupported entry, or any error raised while reading the source.
    pub fn relocate(&self, image: &mut Image<'_>) -> Result<()> {
        if !self.is_relocatable() {
            return Ok(());
        }

        let header = self.header();
        let backend = header.machine.backend();

        for style in backend.styles {
            let Some(table) = self.relocation_table(*style)? else {
                continue;
            };

            for index in 0..table.count {
                let entry = self.relocation_entry(&table, index)?;
                backend.apply_relative(
                    image,
                    self.virt_base(),
                    &entry,
                    header.class,
                    header.endian,
                )?;
            }
        }

        Ok(())
    }
}
