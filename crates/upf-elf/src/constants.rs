//! ELF file format constants.

/// ELF magic number as a little-endian u32 (`\x7fELF`).
pub const ELF_MAGIC: u32 = 0x464C_457F;

/// `e_ident[EI_CLASS]` for 64-bit objects.
pub const ELF_CLASS_64: u8 = 2;

/// `e_ident[EI_DATA]` for little-endian objects.
pub const ELF_DATA_LSB: u8 = 1;

/// The only valid ELF version.
pub const ELF_VERSION: u8 = 1;

/// `e_machine` for AMD x86-64.
pub const EM_X86_64: u16 = 62;

/// Size of an ELF64 section header entry.
pub const ELF64_SHDR_SIZE: u16 = 64;

/// Size of the ELF64 file header.
pub const ELF64_EHDR_SIZE: usize = 64;
