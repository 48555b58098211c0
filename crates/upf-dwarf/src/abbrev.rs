//! Abbreviation tables.
//!
//! Each compile unit points into the shared `.debug_abbrev` section; the
//! table is a sequence of declarations whose codes are assigned contiguously
//! from 1, so entry lookup is `code - 1`.

use crate::constants::DW_FORM_implicit_const;
use crate::reader::SliceReader;
use crate::{DwarfError, Result};

/// One attribute specification of an abbreviation.
#[derive(Clone, Copy, Debug)]
pub struct AttrSpec {
    pub name: u64,
    pub form: u64,
    /// Only meaningful for `DW_FORM_implicit_const`.
    pub implicit_const: i64,
}

/// One abbreviation declaration: a DIE template.
#[derive(Clone, Debug)]
pub struct Abbrev {
    pub tag: u64,
    pub has_children: bool,
    pub attrs: Vec<AttrSpec>,
}

/// A unit's abbreviation table.
#[derive(Clone, Debug, Default)]
pub struct AbbrevTable {
    abbrevs: Vec<Abbrev>,
}

impl AbbrevTable {
    /// Parse the table starting at `offset` of `.debug_abbrev`.
    ///
    /// # Errors
    ///
    /// Returns an error on truncated data or non-contiguous codes.
    pub fn parse(abbrev_section: &[u8], offset: usize) -> Result<Self> {
        let mut r = SliceReader::at(abbrev_section, offset);
        let mut abbrevs = Vec::new();

        loop {
            let code = r.uleb128()?;
            if code == 0 {
                break;
            }
            if code != abbrevs.len() as u64 + 1 {
                return Err(DwarfError::BadAbbrevCode(code));
            }

            let tag = r.uleb128()?;
            let has_children = r.u8()? != 0;

            let mut attrs = Vec::new();
            loop {
                let name = r.uleb128()?;
                let form = r.uleb128()?;
                let implicit_const = if form == DW_FORM_implicit_const {
                    r.sleb128()?
                } else {
                    0
                };
                if name == 0 && form == 0 {
                    break;
                }
                attrs.push(AttrSpec {
                    name,
                    form,
                    implicit_const,
                });
            }

            abbrevs.push(Abbrev {
                tag,
                has_children,
                attrs,
            });
        }

        Ok(Self { abbrevs })
    }

    /// The abbreviation declared with `code`.
    ///
    /// # Errors
    ///
    /// Returns [`DwarfError::BadAbbrevCode`] for codes outside the table.
    pub fn get(&self, code: u64) -> Result<&Abbrev> {
        usize::try_from(code)
            .ok()
            .and_then(|code| code.checked_sub(1))
            .and_then(|index| self.abbrevs.get(index))
            .ok_or(DwarfError::BadAbbrevCode(code))
    }
}
