//! Attribute decoding: size-only skipping and typed value reads.
//!
//! All positions are absolute offsets into `.debug_info`. Readers never
//! interpret attributes they are not asked for; the skip table advances
//! past any supported form without decoding it.

use crate::abbrev::{Abbrev, AbbrevTable, AttrSpec};
use crate::constants::*;
use crate::reader::{SliceReader, str_at};
use crate::scope::UnitBases;
use crate::{DwarfError, Result, Sections};

/// Number of bytes the attribute value at `pos` occupies.
pub(crate) fn attr_size(
    sections: &Sections<'_>,
    bases: &UnitBases,
    pos: usize,
    form: u64,
) -> Result<usize> {
    let mut r = SliceReader::at(sections.info, pos);
    match form {
        DW_FORM_addr => Ok(8),
        DW_FORM_strx1 | DW_FORM_addrx1 | DW_FORM_flag | DW_FORM_ref1 | DW_FORM_data1 => Ok(1),
        DW_FORM_strx2 | DW_FORM_addrx2 | DW_FORM_ref2 | DW_FORM_data2 => Ok(2),
        DW_FORM_strx3 | DW_FORM_addrx3 => Ok(3),
        DW_FORM_ref_sup4 | DW_FORM_strx4 | DW_FORM_addrx4 | DW_FORM_ref4 | DW_FORM_data4 => Ok(4),
        DW_FORM_ref_sig8 | DW_FORM_ref_sup8 | DW_FORM_ref8 | DW_FORM_data8 => Ok(8),
        DW_FORM_data16 => Ok(16),
        DW_FORM_sdata => {
            r.sleb128()?;
            Ok(r.pos() - pos)
        }
        DW_FORM_loclistx | DW_FORM_rnglistx | DW_FORM_addrx | DW_FORM_strx | DW_FORM_ref_udata
        | DW_FORM_udata => {
            r.uleb128()?;
            Ok(r.pos() - pos)
        }
        DW_FORM_string => {
            r.cstr()?;
            Ok(r.pos() - pos)
        }
        DW_FORM_exprloc | DW_FORM_block => {
            let length = r.uleb128()?;
            Ok(r.pos() - pos + usize::try_from(length).map_err(|_| DwarfError::Truncated)?)
        }
        DW_FORM_block1 => Ok(1 + r.u8()? as usize),
        DW_FORM_block2 => Ok(2 + r.u16()? as usize),
        DW_FORM_block4 => {
            let length = r.u32()?;
            Ok(4 + usize::try_from(length).map_err(|_| DwarfError::Truncated)?)
        }
        DW_FORM_line_strp | DW_FORM_strp_sup | DW_FORM_sec_offset | DW_FORM_ref_addr
        | DW_FORM_strp => Ok(usize::from(bases.offset_size)),
        DW_FORM_indirect => {
            let actual = r.uleb128()?;
            Ok(r.pos() - pos + attr_size(sections, bases, r.pos(), actual)?)
        }
        DW_FORM_flag_present | DW_FORM_implicit_const => Ok(0),
        _ => Err(DwarfError::UnexpectedForm(form)),
    }
}

/// Advance past every attribute of `abbrev`, returning the next position.
pub(crate) fn skip_attrs(
    sections: &Sections<'_>,
    bases: &UnitBases,
    mut pos: usize,
    abbrev: &Abbrev,
) -> Result<usize> {
    for attr in &abbrev.attrs {
        pos += attr_size(sections, bases, pos, attr.form)?;
    }
    Ok(pos)
}

/// Skip a whole DIE subtree whose abbreviation code was already consumed,
/// leaving `r` past the matching end-of-children terminator.
pub(crate) fn skip_subtree(
    sections: &Sections<'_>,
    bases: &UnitBases,
    abbrevs: &AbbrevTable,
    r: &mut SliceReader<'_>,
    abbrev: &Abbrev,
) -> Result<()> {
    r.set_pos(skip_attrs(sections, bases, r.pos(), abbrev)?);
    if !abbrev.has_children {
        return Ok(());
    }
    loop {
        let code = r.uleb128()?;
        if code == 0 {
            return Ok(());
        }
        let child = abbrevs.get(code)?;
        skip_subtree(sections, bases, abbrevs, r, child)?;
    }
}

/// The index payload of a `strx*`/`addrx*` form.
fn x_index(sections: &Sections<'_>, pos: usize, form: u64) -> Result<u64> {
    let mut r = SliceReader::at(sections.info, pos);
    match form {
        DW_FORM_strx1 | DW_FORM_addrx1 => r.uint(1),
        DW_FORM_strx2 | DW_FORM_addrx2 => r.uint(2),
        DW_FORM_strx3 | DW_FORM_addrx3 => r.uint(3),
        DW_FORM_strx4 | DW_FORM_addrx4 => r.uint(4),
        DW_FORM_strx | DW_FORM_addrx => r.uleb128(),
        _ => Err(DwarfError::UnexpectedForm(form)),
    }
}

/// Read a string-class attribute.
pub(crate) fn read_str<'a>(
    sections: &Sections<'a>,
    bases: &UnitBases,
    pos: usize,
    form: u64,
) -> Result<&'a str> {
    match form {
        DW_FORM_strp => {
            let offset = SliceReader::at(sections.info, pos).offset(bases.offset_size)?;
            str_at(
                sections.str,
                usize::try_from(offset).map_err(|_| DwarfError::Truncated)?,
            )
        }
        DW_FORM_line_strp => {
            let section = sections
                .line_str
                .ok_or(DwarfError::MissingSection(".debug_line_str"))?;
            let offset = SliceReader::at(sections.info, pos).offset(bases.offset_size)?;
            str_at(
                section,
                usize::try_from(offset).map_err(|_| DwarfError::Truncated)?,
            )
        }
        DW_FORM_string => SliceReader::at(sections.info, pos).cstr(),
        DW_FORM_strx | DW_FORM_strx1 | DW_FORM_strx2 | DW_FORM_strx3 | DW_FORM_strx4 => {
            let section = sections
                .str_offsets
                .ok_or(DwarfError::MissingSection(".debug_str_offsets"))?;
            let base = bases
                .str_offsets_base
                .ok_or(DwarfError::MissingBase("DW_AT_str_offsets_base"))?;
            let index = x_index(sections, pos, form)?;
            let entry = base + index * u64::from(bases.offset_size);
            let offset = SliceReader::at(
                section,
                usize::try_from(entry).map_err(|_| DwarfError::Truncated)?,
            )
            .offset(bases.offset_size)?;
            str_at(
                sections.str,
                usize::try_from(offset).map_err(|_| DwarfError::Truncated)?,
            )
        }
        _ => Err(DwarfError::UnexpectedForm(form)),
    }
}

/// Read a same-unit reference, as an offset relative to the unit base.
pub(crate) fn read_ref(sections: &Sections<'_>, pos: usize, form: u64) -> Result<u64> {
    let mut r = SliceReader::at(sections.info, pos);
    match form {
        DW_FORM_ref1 => r.uint(1),
        DW_FORM_ref2 => r.uint(2),
        DW_FORM_ref4 => r.uint(4),
        DW_FORM_ref8 => r.uint(8),
        DW_FORM_ref_udata => r.uleb128(),
        DW_FORM_ref_addr | DW_FORM_ref_sig8 | DW_FORM_ref_sup4 | DW_FORM_ref_sup8 => {
            Err(DwarfError::CrossUnitReference)
        }
        _ => Err(DwarfError::UnexpectedForm(form)),
    }
}

/// Whether `form` belongs to the constant-data class.
pub(crate) const fn is_data(form: u64) -> bool {
    matches!(
        form,
        DW_FORM_data1
            | DW_FORM_data2
            | DW_FORM_data4
            | DW_FORM_data8
            | DW_FORM_data16
            | DW_FORM_implicit_const
            | DW_FORM_sdata
            | DW_FORM_udata
    )
}

/// Read a constant-data attribute as a signed 64-bit value.
pub(crate) fn read_data(sections: &Sections<'_>, pos: usize, attr: &AttrSpec) -> Result<i64> {
    let mut r = SliceReader::at(sections.info, pos);
    match attr.form {
        DW_FORM_data1 => Ok(r.uint(1)? as i64),
        DW_FORM_data2 => Ok(r.uint(2)? as i64),
        DW_FORM_data4 => Ok(r.uint(4)? as i64),
        DW_FORM_data8 => Ok(r.uint(8)? as i64),
        DW_FORM_data16 => Err(DwarfError::DataTooLarge),
        DW_FORM_implicit_const => Ok(attr.implicit_const),
        DW_FORM_sdata => r.sleb128(),
        DW_FORM_udata => Ok(r.uleb128()? as i64),
        _ => Err(DwarfError::UnexpectedForm(attr.form)),
    }
}

/// Whether `form` belongs to the address class.
pub(crate) const fn is_addr(form: u64) -> bool {
    matches!(
        form,
        DW_FORM_addr
            | DW_FORM_addrx
            | DW_FORM_addrx1
            | DW_FORM_addrx2
            | DW_FORM_addrx3
            | DW_FORM_addrx4
    )
}

/// Read an address-class attribute, resolving `addrx*` through `.debug_addr`.
pub(crate) fn read_addr(
    sections: &Sections<'_>,
    bases: &UnitBases,
    pos: usize,
    form: u64,
) -> Result<u64> {
    match form {
        DW_FORM_addr => SliceReader::at(sections.info, pos).address(),
        DW_FORM_addrx | DW_FORM_addrx1 | DW_FORM_addrx2 | DW_FORM_addrx3 | DW_FORM_addrx4 => {
            let section = sections
                .addr
                .ok_or(DwarfError::MissingSection(".debug_addr"))?;
            let index = x_index(sections, pos, form)?;
            let entry = bases.addr_base + index * 8;
            SliceReader::at(
                section,
                usize::try_from(entry).map_err(|_| DwarfError::Truncated)?,
            )
            .address()
        }
        _ => Err(DwarfError::UnexpectedForm(form)),
    }
}

/// Read an address-table index through `.debug_addr` (for `startx` range
/// entries, where the index arrives as a ULEB outside `.debug_info`).
pub(crate) fn addr_at_index(sections: &Sections<'_>, bases: &UnitBases, index: u64) -> Result<u64> {
    let section = sections
        .addr
        .ok_or(DwarfError::MissingSection(".debug_addr"))?;
    let entry = bases.addr_base + index * 8;
    SliceReader::at(
        section,
        usize::try_from(entry).map_err(|_| DwarfError::Truncated)?,
    )
    .address()
}
