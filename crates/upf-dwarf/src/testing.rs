//! Test support: assembles valid DWARF v5 section images in memory.
//!
//! Produces `.debug_info`/`.debug_abbrev`/`.debug_str` byte vectors for a
//! single 32-bit-format compile unit, so ingest and type inference can be
//! exercised without compiling a C binary.

use upf_elf::DebugSections;

/// Sections built by [`DwarfBuilder`].
#[derive(Debug, Default)]
pub struct BuiltDwarf {
    pub info: Vec<u8>,
    pub abbrev: Vec<u8>,
    pub str: Vec<u8>,
}

impl BuiltDwarf {
    /// Borrow the built bytes as loader output.
    #[must_use]
    pub fn sections(&self) -> DebugSections<'_> {
        DebugSections {
            info: &self.info,
            abbrev: &self.abbrev,
            str: &self.str,
            line_str: None,
            str_offsets: None,
            rnglists: None,
            addr: None,
        }
    }
}

/// Incrementally writes one compile unit.
///
/// Abbreviation codes are handed out contiguously from 1. DIE payloads are
/// appended with the typed writers below; the caller is responsible for
/// matching them to the declared forms.
#[derive(Debug)]
pub struct DwarfBuilder {
    built: BuiltDwarf,
    abbrev_count: u64,
}

impl Default for DwarfBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DwarfBuilder {
    #[must_use]
    pub fn new() -> Self {
        let mut builder = Self {
            built: BuiltDwarf::default(),
            abbrev_count: 0,
        };
        // Offset 0 of .debug_str stays reserved so tests can treat 0 as
        // "no string".
        builder.built.str.push(0);
        builder.begin_unit();
        builder
    }

    /// Declare an abbreviation; returns its code.
    pub fn abbrev(&mut self, tag: u64, has_children: bool, attrs: &[(u64, u64)]) -> u64 {
        self.abbrev_count += 1;
        let abbrev = &mut self.built.abbrev;
        uleb(abbrev, self.abbrev_count);
        uleb(abbrev, tag);
        abbrev.push(u8::from(has_children));
        for &(name, form) in attrs {
            uleb(abbrev, name);
            uleb(abbrev, form);
        }
        abbrev.push(0);
        abbrev.push(0);
        self.abbrev_count
    }

    /// Intern a string into `.debug_str`, returning its offset.
    pub fn add_str(&mut self, s: &str) -> u64 {
        let offset = self.built.str.len() as u64;
        self.built.str.extend_from_slice(s.as_bytes());
        self.built.str.push(0);
        offset
    }

    /// Start a DIE with abbreviation `code`; returns the DIE's offset.
    pub fn die(&mut self, code: u64) -> usize {
        let offset = self.built.info.len();
        uleb(&mut self.built.info, code);
        offset
    }

    /// End-of-children terminator.
    pub fn end_children(&mut self) {
        self.built.info.push(0);
    }

    // Attribute payload writers.

    pub fn data1(&mut self, value: u8) {
        self.built.info.push(value);
    }

    pub fn data2(&mut self, value: u16) {
        self.built.info.extend_from_slice(&value.to_le_bytes());
    }

    pub fn data4(&mut self, value: u32) {
        self.built.info.extend_from_slice(&value.to_le_bytes());
    }

    pub fn data8(&mut self, value: u64) {
        self.built.info.extend_from_slice(&value.to_le_bytes());
    }

    pub fn udata(&mut self, value: u64) {
        uleb(&mut self.built.info, value);
    }

    pub fn sdata(&mut self, value: i64) {
        sleb(&mut self.built.info, value);
    }

    /// An 8-byte `DW_FORM_addr` payload.
    pub fn addr(&mut self, value: u64) {
        self.built.info.extend_from_slice(&value.to_le_bytes());
    }

    /// A 4-byte `DW_FORM_strp` payload, interning the string.
    pub fn strp(&mut self, s: &str) -> u64 {
        let offset = self.add_str(s);
        self.data4(offset as u32);
        offset
    }

    /// A 4-byte `DW_FORM_ref4` payload pointing at `die` (unit-relative,
    /// which equals the absolute offset for the single built unit).
    pub fn ref4(&mut self, die: usize) {
        self.data4(die as u32);
    }

    /// Reserve a `DW_FORM_ref4` payload to be patched later; returns the
    /// patch position.
    pub fn ref4_placeholder(&mut self) -> usize {
        let at = self.built.info.len();
        self.data4(0);
        at
    }

    /// Patch a reserved `ref4` with the final DIE offset.
    pub fn patch_ref4(&mut self, at: usize, die: usize) {
        self.built.info[at..at + 4].copy_from_slice(&(die as u32).to_le_bytes());
    }

    /// Finish the unit: patches the header length and returns the sections.
    #[must_use]
    pub fn finish(mut self) -> BuiltDwarf {
        let length = (self.built.info.len() - 4) as u32;
        self.built.info[0..4].copy_from_slice(&length.to_le_bytes());
        self.built.abbrev.push(0); // abbreviation table terminator
        self.built
    }

    fn begin_unit(&mut self) {
        let info = &mut self.built.info;
        info.extend_from_slice(&0_u32.to_le_bytes()); // unit length, patched in finish()
        info.extend_from_slice(&5_u16.to_le_bytes()); // version
        info.push(crate::constants::DW_UT_compile);
        info.push(8); // address size
        info.extend_from_slice(&0_u32.to_le_bytes()); // abbrev offset
    }
}

fn uleb(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            return;
        }
    }
}

fn sleb(out: &mut Vec<u8>, mut value: i64) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        let sign = byte & 0x40 != 0;
        if (value == 0 && !sign) || (value == -1 && sign) {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}
