//! ELF loader and address-space introspection for the running process.
//!
//! Maps `/proc/self/exe` read-only for the lifetime of the process and
//! locates the DWARF debug sections by name. Also parses `/proc/self/maps`
//! into the set of readable address ranges used to bound pointer
//! dereferences while printing.

mod constants;
mod image;
mod maps;

pub use constants::*;
pub use image::*;
pub use maps::*;

use thiserror::Error;

/// ELF and address-space errors.
#[derive(Error, Debug)]
pub enum ElfError {
    #[error("ELF data too small")]
    TooSmall,
    #[error("Invalid ELF magic number")]
    InvalidMagic,
    #[error("Only 64-bit ELF is supported")]
    Not64Bit,
    #[error("Only little-endian ELF is supported")]
    NotLittleEndian,
    #[error("Unsupported ELF version: {0}")]
    UnsupportedVersion(u32),
    #[error("Only x86-64 executables are supported (e_machine = {0})")]
    UnsupportedMachine(u16),
    #[error("Unexpected section header entry size: {0}")]
    BadSectionEntrySize(u16),
    #[error("Section header out of bounds")]
    SectionOutOfBounds,
    #[error("Missing debug information: {0}; compile with -g2 or higher")]
    MissingDebugInfo(&'static str),
    #[error("Unable to parse \"/proc/self/maps\": invalid format")]
    BadMapsFormat,
    #[error("Executable is not present in \"/proc/self/maps\"")]
    NoLoadBase,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("system call failed: {0}")]
    Sys(#[from] nix::Error),
}

pub type Result<T> = std::result::Result<T, ElfError>;

/// Half-open `[start, end)` virtual address range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AddressRange {
    pub start: u64,
    pub end: u64,
}

impl AddressRange {
    #[must_use]
    pub const fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub const fn contains(&self, addr: u64) -> bool {
        self.start <= addr && addr < self.end
    }
}
