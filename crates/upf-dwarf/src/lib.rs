//! DWARF v5 ingest for the running executable.
//!
//! Parses `.debug_info` and friends into three long-lived structures: the
//! type catalogue (de-duplicated, index-addressed), the per-unit scope tree
//! (PC ranges to visible variables) and the function table. Type DIEs are
//! parsed lazily on first use and memoised by DIE offset.

mod abbrev;
mod constants;
mod die;
mod ranges;
mod reader;
mod scope;
pub mod testing;
mod type_parse;
mod types;
mod unit;

pub use abbrev::*;
pub use constants::*;
pub use reader::*;
pub use scope::*;
pub use types::*;

use thiserror::Error;
use upf_elf::{AddressRange, DebugSections, ElfError};

/// DWARF parsing errors.
#[derive(Error, Debug)]
pub enum DwarfError {
    #[error("debug info is truncated")]
    Truncated,
    #[error("debug info contains a non-UTF-8 string")]
    InvalidString,
    #[error("only DWARF version 5 is supported (found {0})")]
    UnsupportedVersion(u16),
    #[error("only compile units are supported (unit type {0:#x})")]
    UnsupportedUnitType(u8),
    #[error("only 8-byte addresses are supported (found {0})")]
    UnsupportedAddressSize(u8),
    #[error("segmented addresses are not supported")]
    SegmentedAddresses,
    #[error("only references within a single compilation unit are supported")]
    CrossUnitReference,
    #[error("unexpected attribute form {0:#x}")]
    UnexpectedForm(u64),
    #[error("invalid abbreviation code {0}")]
    BadAbbrevCode(u64),
    #[error("16-byte data blocks are not supported")]
    DataTooLarge,
    #[error("section {0} is required but absent")]
    MissingSection(&'static str),
    #[error("malformed debug info: {0}")]
    Malformed(&'static str),
    #[error("attribute requires {0}, which the unit does not provide")]
    MissingBase(&'static str),
    #[error(transparent)]
    Elf(#[from] ElfError),
}

pub type Result<T> = std::result::Result<T, DwarfError>;

/// Debug sections after DWARF-level header validation.
#[derive(Clone, Copy, Debug)]
pub struct Sections<'a> {
    pub info: &'a [u8],
    pub abbrev: &'a [u8],
    pub str: &'a [u8],
    pub line_str: Option<&'a [u8]>,
    pub str_offsets: Option<&'a [u8]>,
    pub addr: Option<&'a [u8]>,
    pub rnglists: Option<&'a [u8]>,
    /// Start of the offset array inside `.debug_rnglists`, when the header
    /// advertises one.
    pub rnglist_offsets: Option<usize>,
}

impl<'a> Sections<'a> {
    /// Validate the version/segment headers of the optional sections.
    ///
    /// # Errors
    ///
    /// Returns an error if a section header carries an unsupported version
    /// or a non-zero segment selector size.
    pub fn validate(sections: DebugSections<'a>) -> Result<Self> {
        if let Some(str_offsets) = sections.str_offsets {
            let mut r = SliceReader::new(str_offsets);
            r.initial_length()?;
            let version = r.u16()?;
            if version != 5 {
                return Err(DwarfError::UnsupportedVersion(version));
            }
            let reserved = r.u16()?;
            if reserved != 0 {
                return Err(DwarfError::SegmentedAddresses);
            }
        }

        if let Some(addr) = sections.addr {
            let mut r = SliceReader::new(addr);
            r.initial_length()?;
            let version = r.u16()?;
            if version != 5 {
                return Err(DwarfError::UnsupportedVersion(version));
            }
            let address_size = r.u8()?;
            if address_size != 8 {
                return Err(DwarfError::UnsupportedAddressSize(address_size));
            }
            if r.u8()? != 0 {
                return Err(DwarfError::SegmentedAddresses);
            }
        }

        let mut rnglist_offsets = None;
        if let Some(rnglists) = sections.rnglists {
            let mut r = SliceReader::new(rnglists);
            r.initial_length()?;
            let version = r.u16()?;
            if version != 5 {
                return Err(DwarfError::UnsupportedVersion(version));
            }
            let address_size = r.u8()?;
            if address_size != 8 {
                return Err(DwarfError::UnsupportedAddressSize(address_size));
            }
            if r.u8()? != 0 {
                return Err(DwarfError::SegmentedAddresses);
            }
            let offset_count = r.u32()?;
            if offset_count > 0 {
                rnglist_offsets = Some(r.pos());
            }
        }

        Ok(Self {
            info: sections.info,
            abbrev: sections.abbrev,
            str: sections.str,
            line_str: sections.line_str,
            str_offsets: sections.str_offsets,
            addr: sections.addr,
            rnglists: sections.rnglists,
            rnglist_offsets,
        })
    }
}

/// Parsed debug information of one executable.
pub struct Dwarf<'a> {
    sections: Sections<'a>,
    units: Vec<CompilationUnit>,
    catalogue: TypeCatalogue,
    /// PC ranges of the engine's own entry subprogram, used to decide
    /// whether call-site PCs are absolute or load-base relative.
    engine_ranges: Vec<AddressRange>,
}

impl<'a> Dwarf<'a> {
    /// Parse every compile unit of the debug sections.
    ///
    /// `entry_symbol` names the engine's own entry subprogram; its PC ranges
    /// are captured when encountered.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed or unsupported DWARF.
    pub fn parse(sections: DebugSections<'a>, entry_symbol: &str) -> Result<Self> {
        let sections = Sections::validate(sections)?;
        let (units, engine_ranges) = unit::parse_units(&sections, entry_symbol)?;
        tracing::debug!(units = units.len(), "parsed debug info");
        Ok(Self {
            sections,
            units,
            catalogue: TypeCatalogue::new(),
            engine_ranges,
        })
    }

    #[must_use]
    pub fn units(&self) -> &[CompilationUnit] {
        &self.units
    }

    #[must_use]
    pub fn types(&self) -> &TypeCatalogue {
        &self.catalogue
    }

    #[must_use]
    pub fn types_mut(&mut self) -> &mut TypeCatalogue {
        &mut self.catalogue
    }

    #[must_use]
    pub fn engine_ranges(&self) -> &[AddressRange] {
        &self.engine_ranges
    }

    /// Parse (or fetch the memoised) type at `die` of unit `unit_index`.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed type DIEs.
    pub fn parse_type(&mut self, unit_index: usize, die: usize) -> Result<TypeId> {
        let unit = &self.units[unit_index];
        type_parse::TypeParser {
            sections: &self.sections,
            bases: &unit.bases,
            abbrevs: &unit.abbrevs,
            catalogue: &mut self.catalogue,
        }
        .parse(die)
    }

    /// Indices of the units whose root scope contains `pc`.
    pub fn units_at_pc(&self, pc: u64) -> impl Iterator<Item = usize> + '_ {
        self.units
            .iter()
            .enumerate()
            .filter(move |(_, unit)| unit.scope.contains(pc))
            .map(|(index, _)| index)
    }

    /// Find a function by its entry PC, searching every unit.
    #[must_use]
    pub fn function_by_entry(&self, pc: u64) -> Option<(usize, &Function)> {
        self.units.iter().enumerate().find_map(|(index, unit)| {
            unit.functions
                .iter()
                .find(|function| function.entry_pc == Some(pc))
                .map(|function| (index, function))
        })
    }
}
