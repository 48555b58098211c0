//! Memory-mapped view of the running executable.
//!
//! The mapping is read-only and stays alive until the image is dropped;
//! every parsed DWARF structure that borrows section bytes points into it.

use std::ffi::c_void;
use std::fs::File;
use std::num::NonZeroUsize;
use std::ptr::NonNull;

use nix::sys::mman::{MapFlags, ProtFlags, mmap, munmap};

use crate::constants::*;
use crate::{ElfError, Result};

/// Read little-endian u16 from bytes.
#[inline]
fn read_le16(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

/// Read little-endian u32 from bytes.
#[inline]
fn read_le32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

/// Read little-endian u64 from bytes.
#[inline]
fn read_le64(data: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
        data[offset + 4],
        data[offset + 5],
        data[offset + 6],
        data[offset + 7],
    ])
}

/// Byte slices of the DWARF sections found in the executable.
///
/// `info`, `abbrev` and `str` are mandatory; the rest are present only when
/// the compiler emitted them.
#[derive(Clone, Copy, Debug, Default)]
pub struct DebugSections<'a> {
    pub info: &'a [u8],
    pub abbrev: &'a [u8],
    pub str: &'a [u8],
    pub line_str: Option<&'a [u8]>,
    pub str_offsets: Option<&'a [u8]>,
    pub rnglists: Option<&'a [u8]>,
    pub addr: Option<&'a [u8]>,
}

/// The running executable, mapped read-only.
pub struct ExecutableImage {
    ptr: NonNull<c_void>,
    len: usize,
}

// The mapping is immutable for the life of the value.
unsafe impl Send for ExecutableImage {}
unsafe impl Sync for ExecutableImage {}

impl ExecutableImage {
    /// Map `/proc/self/exe` read-only.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, sized or mapped.
    pub fn open_self() -> Result<Self> {
        Self::open(File::open("/proc/self/exe")?)
    }

    fn open(file: File) -> Result<Self> {
        let len = usize::try_from(file.metadata()?.len()).map_err(|_| ElfError::TooSmall)?;
        let size = NonZeroUsize::new(len).ok_or(ElfError::TooSmall)?;

        let ptr = unsafe {
            mmap(
                None,
                size,
                ProtFlags::PROT_READ,
                MapFlags::MAP_PRIVATE,
                &file,
                0,
            )?
        };
        tracing::debug!(len, "mapped executable");

        Ok(Self { ptr, len })
    }

    /// The mapped file contents.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr().cast::<u8>(), self.len) }
    }

    /// Validate the ELF header and locate the debug sections.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is not a little-endian x86-64 ELF64, or
    /// if any of `.debug_info`/`.debug_abbrev`/`.debug_str` is absent.
    pub fn debug_sections(&self) -> Result<DebugSections<'_>> {
        find_debug_sections(self.bytes())
    }
}

impl Drop for ExecutableImage {
    fn drop(&mut self) {
        // The mapping outlives every borrower by construction; failures here
        // leak the mapping, which is harmless at process exit.
        let _ = unsafe { munmap(self.ptr, self.len) };
    }
}

/// Parse the ELF header and section table of `data` and slice out the DWARF
/// sections.
///
/// # Errors
///
/// Returns an error on any header validation failure, on a section that
/// points outside the file, or when a required debug section is missing.
pub fn find_debug_sections(data: &[u8]) -> Result<DebugSections<'_>> {
    validate_header(data)?;

    let shoff = usize::try_from(read_le64(data, 40)).map_err(|_| ElfError::SectionOutOfBounds)?;
    let shentsize = read_le16(data, 58);
    let shnum = read_le16(data, 60) as usize;
    let shstrndx = read_le16(data, 62) as usize;

    if shentsize != ELF64_SHDR_SIZE {
        return Err(ElfError::BadSectionEntrySize(shentsize));
    }

    let section = |index: usize| -> Result<(usize, usize, usize)> {
        let base = shoff + index * shentsize as usize;
        if base + ELF64_SHDR_SIZE as usize > data.len() {
            return Err(ElfError::SectionOutOfBounds);
        }
        let name = read_le32(data, base) as usize;
        let offset =
            usize::try_from(read_le64(data, base + 24)).map_err(|_| ElfError::SectionOutOfBounds)?;
        let size =
            usize::try_from(read_le64(data, base + 32)).map_err(|_| ElfError::SectionOutOfBounds)?;
        Ok((name, offset, size))
    };

    if shnum == 0 {
        return Err(ElfError::MissingDebugInfo(".debug_info"));
    }
    if shstrndx >= shnum {
        return Err(ElfError::SectionOutOfBounds);
    }
    let (_, strtab_offset, strtab_size) = section(shstrndx)?;
    if strtab_offset + strtab_size > data.len() {
        return Err(ElfError::SectionOutOfBounds);
    }
    let strtab = &data[strtab_offset..strtab_offset + strtab_size];

    let mut sections = DebugSections::default();
    for i in 0..shnum {
        let (name_offset, offset, size) = section(i)?;
        let Some(name) = section_name(strtab, name_offset) else {
            continue;
        };
        if !name.starts_with(".debug_") {
            continue;
        }
        if offset + size > data.len() {
            return Err(ElfError::SectionOutOfBounds);
        }
        let bytes = &data[offset..offset + size];

        match name {
            ".debug_info" => sections.info = bytes,
            ".debug_abbrev" => sections.abbrev = bytes,
            ".debug_str" => sections.str = bytes,
            ".debug_line_str" => sections.line_str = Some(bytes),
            ".debug_str_offsets" => sections.str_offsets = Some(bytes),
            ".debug_rnglists" => sections.rnglists = Some(bytes),
            ".debug_addr" => sections.addr = Some(bytes),
            _ => {}
        }
    }

    if sections.info.is_empty() {
        return Err(ElfError::MissingDebugInfo(".debug_info"));
    }
    if sections.abbrev.is_empty() {
        return Err(ElfError::MissingDebugInfo(".debug_abbrev"));
    }
    if sections.str.is_empty() {
        return Err(ElfError::MissingDebugInfo(".debug_str"));
    }

    Ok(sections)
}

fn validate_header(data: &[u8]) -> Result<()> {
    if data.len() < ELF64_EHDR_SIZE {
        return Err(ElfError::TooSmall);
    }
    if read_le32(data, 0) != ELF_MAGIC {
        return Err(ElfError::InvalidMagic);
    }
    if data[4] != ELF_CLASS_64 {
        return Err(ElfError::Not64Bit);
    }
    if data[5] != ELF_DATA_LSB {
        return Err(ElfError::NotLittleEndian);
    }
    if data[6] != ELF_VERSION {
        return Err(ElfError::UnsupportedVersion(u32::from(data[6])));
    }
    let machine = read_le16(data, 18);
    if machine != EM_X86_64 {
        return Err(ElfError::UnsupportedMachine(machine));
    }
    let version = read_le32(data, 20);
    if version != u32::from(ELF_VERSION) {
        return Err(ElfError::UnsupportedVersion(version));
    }
    Ok(())
}

/// NUL-terminated string at `offset` in the section name table.
fn section_name(strtab: &[u8], offset: usize) -> Option<&str> {
    let rest = strtab.get(offset..)?;
    let end = rest.iter().position(|&b| b == 0)?;
    std::str::from_utf8(&rest[..end]).ok()
}
