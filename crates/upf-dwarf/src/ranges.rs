//! `.debug_rnglists` decoding.

use tracing::warn;
use upf_elf::AddressRange;

use crate::constants::*;
use crate::die::addr_at_index;
use crate::reader::SliceReader;
use crate::scope::UnitBases;
use crate::{DwarfError, Result, Sections};

/// Decode the range list referenced by a `DW_AT_ranges` attribute at
/// `attr_pos` (an absolute `.debug_info` offset) with form `form`.
///
/// `default_base` seeds the running base address for `offset_pair` entries;
/// it is the unit's `low_pc` when known.
pub(crate) fn read_range_list(
    sections: &Sections<'_>,
    bases: &UnitBases,
    attr_pos: usize,
    form: u64,
    default_base: Option<u64>,
) -> Result<Vec<AddressRange>> {
    let rnglists = sections
        .rnglists
        .ok_or(DwarfError::MissingSection(".debug_rnglists"))?;

    let start = match form {
        DW_FORM_sec_offset => {
            let offset = SliceReader::at(sections.info, attr_pos).offset(bases.offset_size)?;
            usize::try_from(offset).map_err(|_| DwarfError::Truncated)?
        }
        DW_FORM_rnglistx => {
            let index = SliceReader::at(sections.info, attr_pos).uleb128()?;
            let table = match bases.rnglists_base {
                Some(base) => usize::try_from(base).map_err(|_| DwarfError::Truncated)?,
                None => sections
                    .rnglist_offsets
                    .ok_or(DwarfError::MissingBase("DW_AT_rnglists_base"))?,
            };
            let entry = table
                + usize::try_from(index * u64::from(bases.offset_size))
                    .map_err(|_| DwarfError::Truncated)?;
            let offset = SliceReader::at(rnglists, entry).offset(bases.offset_size)?;
            table + usize::try_from(offset).map_err(|_| DwarfError::Truncated)?
        }
        _ => return Err(DwarfError::UnexpectedForm(form)),
    };

    let mut r = SliceReader::at(rnglists, start);
    let mut base = default_base.unwrap_or(0);
    let mut ranges = Vec::new();

    loop {
        let kind = r.u8()?;
        match kind {
            DW_RLE_end_of_list => break,
            DW_RLE_base_addressx => {
                let index = r.uleb128()?;
                base = addr_at_index(sections, bases, index)?;
            }
            DW_RLE_startx_endx => {
                let start = addr_at_index(sections, bases, r.uleb128()?)?;
                let end = addr_at_index(sections, bases, r.uleb128()?)?;
                ranges.push(AddressRange::new(start, end));
            }
            DW_RLE_startx_length => {
                let start = addr_at_index(sections, bases, r.uleb128()?)?;
                let length = r.uleb128()?;
                ranges.push(AddressRange::new(start, start + length));
            }
            DW_RLE_offset_pair => {
                let from = r.uleb128()?;
                let to = r.uleb128()?;
                ranges.push(AddressRange::new(base + from, base + to));
            }
            DW_RLE_base_address => {
                base = r.address()?;
            }
            DW_RLE_start_end => {
                let start = r.address()?;
                let end = r.address()?;
                ranges.push(AddressRange::new(start, end));
            }
            DW_RLE_start_length => {
                let start = r.address()?;
                let length = r.uleb128()?;
                ranges.push(AddressRange::new(start, start + length));
            }
            _ => {
                warn!(kind, "unknown range list entry kind, stopping the list");
                break;
            }
        }
    }

    Ok(ranges)
}
