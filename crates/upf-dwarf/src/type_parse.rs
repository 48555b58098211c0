//! Type DIE parsing into the catalogue.
//!
//! `parse` is memoised by DIE offset. Pointer and record entries are
//! inserted before their referents are parsed, which terminates self- and
//! mutually-referential types without a visited set.

use tracing::warn;

use crate::abbrev::AbbrevTable;
use crate::constants::*;
use crate::die;
use crate::reader::SliceReader;
use crate::scope::UnitBases;
use crate::types::{
    ArrayType, EnumType, Enumerator, FunctionType, Member, Modifiers, POINTER_SIZE, StructType,
    Type, TypeCatalogue, TypeId, TypeKind,
};
use crate::{DwarfError, Result, Sections};

pub(crate) struct TypeParser<'d, 'a> {
    pub sections: &'d Sections<'a>,
    pub bases: &'d UnitBases,
    pub abbrevs: &'d AbbrevTable,
    pub catalogue: &'d mut TypeCatalogue,
}

impl TypeParser<'_, '_> {
    /// Parse the type DIE at absolute offset `die`, reusing the memoised
    /// entry when present.
    pub fn parse(&mut self, die: usize) -> Result<TypeId> {
        if let Some(id) = self.catalogue.lookup_die(die) {
            return Ok(id);
        }

        let abbrevs = self.abbrevs;
        let mut r = SliceReader::at(self.sections.info, die);
        let code = r.uleb128()?;
        let abbrev = abbrevs.get(code)?;

        match abbrev.tag {
            DW_TAG_base_type => self.parse_base(die, abbrev, r.pos()),
            DW_TAG_pointer_type => self.parse_pointer(die, abbrev, r.pos()),
            DW_TAG_structure_type | DW_TAG_union_type => self.parse_record(die, abbrev, r),
            DW_TAG_enumeration_type => self.parse_enum(die, abbrev, r),
            DW_TAG_array_type => self.parse_array(die, abbrev, r),
            DW_TAG_subroutine_type => self.parse_subroutine(die, abbrev, r),
            DW_TAG_typedef => self.parse_typedef(die, abbrev, r.pos()),
            DW_TAG_const_type => self.parse_modifier(die, abbrev, r.pos(), Modifiers::CONST),
            DW_TAG_volatile_type => self.parse_modifier(die, abbrev, r.pos(), Modifiers::VOLATILE),
            DW_TAG_restrict_type => self.parse_modifier(die, abbrev, r.pos(), Modifiers::RESTRICT),
            DW_TAG_atomic_type => self.parse_modifier(die, abbrev, r.pos(), Modifiers::ATOMIC),
            tag => {
                warn!(tag, "unsupported type tag, treating as unknown");
                Ok(self.catalogue.insert(die, Type::unknown(None)))
            }
        }
    }

    fn parse_base(
        &mut self,
        die: usize,
        abbrev: &crate::abbrev::Abbrev,
        mut pos: usize,
    ) -> Result<TypeId> {
        let mut name = None;
        let mut size = None;
        let mut encoding = None;
        for attr in &abbrev.attrs {
            match attr.name {
                DW_AT_name => {
                    name = Some(
                        die::read_str(self.sections, self.bases, pos, attr.form)?.to_owned(),
                    );
                }
                DW_AT_byte_size => {
                    if die::is_data(attr.form) {
                        size = Some(die::read_data(self.sections, pos, attr)?);
                    } else {
                        warn!("non-constant base type size, treating as unknown");
                        return Ok(self.catalogue.insert(die, Type::unknown(None)));
                    }
                }
                DW_AT_encoding => encoding = Some(die::read_data(self.sections, pos, attr)?),
                _ => {}
            }
            pos += die::attr_size(self.sections, self.bases, pos, attr.form)?;
        }

        let (Some(size), Some(encoding)) = (size, encoding) else {
            warn!("base type without size or encoding, treating as unknown");
            return Ok(self.catalogue.insert(die, Type::unknown(name)));
        };
        let kind = base_kind(encoding as u64, size);
        let ty = Type::new(name, kind, u64::try_from(size).ok());
        Ok(self.catalogue.insert(die, ty))
    }

    fn parse_pointer(
        &mut self,
        die: usize,
        abbrev: &crate::abbrev::Abbrev,
        mut pos: usize,
    ) -> Result<TypeId> {
        // Inserted before the pointee so self-referential records terminate.
        let id = self.catalogue.insert(
            die,
            Type::new(None, TypeKind::Pointer(None), Some(POINTER_SIZE)),
        );

        let mut pointee = None;
        for attr in &abbrev.attrs {
            if attr.name == DW_AT_type {
                pointee = Some(self.absolute_ref(pos, attr.form)?);
            }
            pos += die::attr_size(self.sections, self.bases, pos, attr.form)?;
        }

        if let Some(pointee) = pointee {
            let pointee_id = self.parse(pointee)?;
            self.catalogue.get_mut(id).kind = TypeKind::Pointer(Some(pointee_id));
        }
        Ok(id)
    }

    fn parse_record(
        &mut self,
        die: usize,
        abbrev: &crate::abbrev::Abbrev,
        mut r: SliceReader<'_>,
    ) -> Result<TypeId> {
        let is_struct = abbrev.tag == DW_TAG_structure_type;
        let mut name = None;
        let mut size = None;
        let mut pos = r.pos();
        for attr in &abbrev.attrs {
            match attr.name {
                DW_AT_name => {
                    name = Some(
                        die::read_str(self.sections, self.bases, pos, attr.form)?.to_owned(),
                    );
                }
                DW_AT_byte_size => {
                    if die::is_data(attr.form) {
                        size = u64::try_from(die::read_data(self.sections, pos, attr)?).ok();
                    }
                }
                _ => {}
            }
            pos += die::attr_size(self.sections, self.bases, pos, attr.form)?;
        }
        r.set_pos(pos);

        let empty = if is_struct {
            TypeKind::Struct(StructType::default())
        } else {
            TypeKind::Union(StructType::default())
        };
        let id = self.catalogue.insert(die, Type::new(name, empty, size));

        let mut members = Vec::new();
        if abbrev.has_children {
            loop {
                let code = r.uleb128()?;
                if code == 0 {
                    break;
                }
                let child = self.abbrevs.get(code)?;
                if child.tag != DW_TAG_member {
                    die::skip_subtree(self.sections, self.bases, self.abbrevs, &mut r, child)?;
                    continue;
                }
                if let Some(member) = self.parse_member(&mut r, child, is_struct)? {
                    members.push(member);
                }
            }
        }

        let kind = if is_struct {
            TypeKind::Struct(StructType { members })
        } else {
            TypeKind::Union(StructType { members })
        };
        self.catalogue.get_mut(id).kind = kind;
        Ok(id)
    }

    fn parse_member(
        &mut self,
        r: &mut SliceReader<'_>,
        abbrev: &crate::abbrev::Abbrev,
        is_struct: bool,
    ) -> Result<Option<Member>> {
        let mut name = None;
        let mut type_die = None;
        let mut byte_offset = if is_struct { None } else { Some(0) };
        let mut bit_offset = None;
        let mut bit_size = 0_u32;
        let mut legacy_bit_offset = false;
        let mut non_constant_offset = false;

        let mut pos = r.pos();
        for attr in &abbrev.attrs {
            match attr.name {
                DW_AT_name => {
                    name = Some(
                        die::read_str(self.sections, self.bases, pos, attr.form)?.to_owned(),
                    );
                }
                DW_AT_type => type_die = Some(self.absolute_ref(pos, attr.form)?),
                DW_AT_data_member_location => {
                    if die::is_data(attr.form) {
                        byte_offset =
                            u64::try_from(die::read_data(self.sections, pos, attr)?).ok();
                    } else {
                        non_constant_offset = true;
                    }
                }
                DW_AT_data_bit_offset => {
                    if die::is_data(attr.form) {
                        bit_offset = u64::try_from(die::read_data(self.sections, pos, attr)?).ok();
                    } else {
                        non_constant_offset = true;
                    }
                }
                DW_AT_bit_size => {
                    if die::is_data(attr.form) {
                        bit_size =
                            u32::try_from(die::read_data(self.sections, pos, attr)?).unwrap_or(0);
                    }
                }
                DW_AT_bit_offset => legacy_bit_offset = true,
                _ => {}
            }
            pos += die::attr_size(self.sections, self.bases, pos, attr.form)?;
        }
        r.set_pos(pos);

        // Anonymous padding members carry no name; nothing to print.
        let (Some(name), Some(type_die)) = (name, type_die) else {
            return Ok(None);
        };
        if legacy_bit_offset {
            // The DWARF 4 bit_offset attribute is endianness-dependent and
            // unreliable; refuse it rather than guess.
            warn!(member = %name, "legacy DW_AT_bit_offset form, skipping member");
            return Ok(None);
        }
        if non_constant_offset {
            warn!(member = %name, "non-constant member offset, skipping member");
            return Ok(None);
        }

        let offset = if bit_size > 0 {
            match bit_offset {
                Some(bits) => bits,
                None => {
                    warn!(member = %name, "bit-field without a bit offset, skipping member");
                    return Ok(None);
                }
            }
        } else {
            match byte_offset {
                Some(bytes) => bytes,
                None => {
                    warn!(member = %name, "member without an offset, skipping member");
                    return Ok(None);
                }
            }
        };

        let type_id = self.parse(type_die)?;
        Ok(Some(Member {
            name,
            type_id,
            offset,
            bit_size,
        }))
    }

    fn parse_enum(
        &mut self,
        die: usize,
        abbrev: &crate::abbrev::Abbrev,
        mut r: SliceReader<'_>,
    ) -> Result<TypeId> {
        let mut name = None;
        let mut size = None;
        let mut underlying_die = None;
        let mut pos = r.pos();
        for attr in &abbrev.attrs {
            match attr.name {
                DW_AT_name => {
                    name = Some(
                        die::read_str(self.sections, self.bases, pos, attr.form)?.to_owned(),
                    );
                }
                DW_AT_byte_size => {
                    if die::is_data(attr.form) {
                        size = u64::try_from(die::read_data(self.sections, pos, attr)?).ok();
                    }
                }
                DW_AT_type => underlying_die = Some(self.absolute_ref(pos, attr.form)?),
                _ => {}
            }
            pos += die::attr_size(self.sections, self.bases, pos, attr.form)?;
        }
        r.set_pos(pos);

        let Some(underlying_die) = underlying_die else {
            warn!("enum without an underlying type, treating as unknown");
            self.skip_children(&mut r, abbrev)?;
            return Ok(self.catalogue.insert(die, Type::unknown(name)));
        };
        let underlying = self.parse(underlying_die)?;

        let mut enumerators = Vec::new();
        let mut poisoned = false;
        if abbrev.has_children {
            loop {
                let code = r.uleb128()?;
                if code == 0 {
                    break;
                }
                let child = self.abbrevs.get(code)?;
                if child.tag != DW_TAG_enumerator {
                    die::skip_subtree(self.sections, self.bases, self.abbrevs, &mut r, child)?;
                    continue;
                }

                let mut enum_name = None;
                let mut value = None;
                let mut pos = r.pos();
                for attr in &child.attrs {
                    match attr.name {
                        DW_AT_name => {
                            enum_name = Some(
                                die::read_str(self.sections, self.bases, pos, attr.form)?
                                    .to_owned(),
                            );
                        }
                        DW_AT_const_value => {
                            if die::is_data(attr.form) {
                                value = Some(die::read_data(self.sections, pos, attr)?);
                            } else {
                                poisoned = true;
                            }
                        }
                        _ => {}
                    }
                    pos += die::attr_size(self.sections, self.bases, pos, attr.form)?;
                }
                r.set_pos(pos);

                if let (Some(enum_name), Some(value)) = (enum_name, value) {
                    enumerators.push(Enumerator {
                        name: enum_name,
                        value,
                    });
                } else {
                    poisoned = true;
                }
            }
        }

        if poisoned {
            warn!("enum with non-constant values, treating as unknown");
            return Ok(self.catalogue.insert(die, Type::unknown(name)));
        }
        let ty = Type::new(
            name,
            TypeKind::Enum(EnumType {
                underlying,
                enumerators,
            }),
            size,
        );
        Ok(self.catalogue.insert(die, ty))
    }

    fn parse_array(
        &mut self,
        die: usize,
        abbrev: &crate::abbrev::Abbrev,
        mut r: SliceReader<'_>,
    ) -> Result<TypeId> {
        let mut name = None;
        let mut element_die = None;
        let mut pos = r.pos();
        for attr in &abbrev.attrs {
            match attr.name {
                DW_AT_name => {
                    name = Some(
                        die::read_str(self.sections, self.bases, pos, attr.form)?.to_owned(),
                    );
                }
                DW_AT_type => element_die = Some(self.absolute_ref(pos, attr.form)?),
                _ => {}
            }
            pos += die::attr_size(self.sections, self.bases, pos, attr.form)?;
        }
        r.set_pos(pos);

        let Some(element_die) = element_die else {
            warn!("array without an element type, treating as unknown");
            self.skip_children(&mut r, abbrev)?;
            return Ok(self.catalogue.insert(die, Type::unknown(name)));
        };
        let element = self.parse(element_die)?;

        let mut lengths = Vec::new();
        let mut non_static = false;
        if abbrev.has_children {
            loop {
                let code = r.uleb128()?;
                if code == 0 {
                    break;
                }
                let child = self.abbrevs.get(code)?;
                if child.tag != DW_TAG_subrange_type {
                    warn!(tag = child.tag, "unsupported array description, treating as unknown");
                    die::skip_subtree(self.sections, self.bases, self.abbrevs, &mut r, child)?;
                    self.skip_children(&mut r, abbrev)?;
                    return Ok(self.catalogue.insert(die, Type::unknown(name)));
                }

                let mut length = None;
                let mut pos = r.pos();
                for attr in &child.attrs {
                    match attr.name {
                        DW_AT_count => {
                            if die::is_data(attr.form) {
                                length =
                                    u64::try_from(die::read_data(self.sections, pos, attr)?).ok();
                            } else {
                                non_static = true;
                            }
                        }
                        DW_AT_upper_bound => {
                            if die::is_data(attr.form) {
                                length = u64::try_from(
                                    die::read_data(self.sections, pos, attr)? + 1,
                                )
                                .ok();
                            } else {
                                non_static = true;
                            }
                        }
                        _ => {}
                    }
                    pos += die::attr_size(self.sections, self.bases, pos, attr.form)?;
                }
                r.set_pos(pos);

                match length {
                    Some(length) => lengths.push(length),
                    None => non_static = true,
                }
            }
        }

        if non_static {
            warn!("non-constant array length");
            lengths.clear();
        }
        let size = if non_static || lengths.is_empty() {
            None
        } else {
            self.catalogue
                .get(element)
                .size
                .map(|element_size| element_size * lengths.iter().product::<u64>())
        };
        let ty = Type::new(name, TypeKind::Array(ArrayType { element, lengths }), size);
        Ok(self.catalogue.insert(die, ty))
    }

    fn parse_subroutine(
        &mut self,
        die: usize,
        abbrev: &crate::abbrev::Abbrev,
        mut r: SliceReader<'_>,
    ) -> Result<TypeId> {
        let mut return_die = None;
        let mut pos = r.pos();
        for attr in &abbrev.attrs {
            if attr.name == DW_AT_type {
                return_die = Some(self.absolute_ref(pos, attr.form)?);
            }
            pos += die::attr_size(self.sections, self.bases, pos, attr.form)?;
        }
        r.set_pos(pos);

        // Inserted before the referents so recursive signatures terminate.
        let id = self.catalogue.insert(
            die,
            Type::new(
                None,
                TypeKind::Function(FunctionType::default()),
                Some(POINTER_SIZE),
            ),
        );

        let return_type = match return_die {
            Some(return_die) => Some(self.parse(return_die)?),
            None => None,
        };

        let mut params = Vec::new();
        if abbrev.has_children {
            loop {
                let code = r.uleb128()?;
                if code == 0 {
                    break;
                }
                let child = self.abbrevs.get(code)?;
                if child.tag == DW_TAG_formal_parameter {
                    let mut param_die = None;
                    let mut pos = r.pos();
                    for attr in &child.attrs {
                        if attr.name == DW_AT_type {
                            param_die = Some(self.absolute_ref(pos, attr.form)?);
                        }
                        pos += die::attr_size(self.sections, self.bases, pos, attr.form)?;
                    }
                    r.set_pos(pos);
                    if child.has_children {
                        die::skip_subtree(self.sections, self.bases, self.abbrevs, &mut r, child)?;
                    }
                    if let Some(param_die) = param_die {
                        params.push(self.parse(param_die)?);
                    }
                } else {
                    die::skip_subtree(self.sections, self.bases, self.abbrevs, &mut r, child)?;
                }
            }
        }

        self.catalogue.get_mut(id).kind = TypeKind::Function(FunctionType {
            return_type,
            params,
        });
        Ok(id)
    }

    fn parse_typedef(
        &mut self,
        die: usize,
        abbrev: &crate::abbrev::Abbrev,
        mut pos: usize,
    ) -> Result<TypeId> {
        let mut name = None;
        let mut underlying_die = None;
        for attr in &abbrev.attrs {
            match attr.name {
                DW_AT_name => {
                    name = Some(
                        die::read_str(self.sections, self.bases, pos, attr.form)?.to_owned(),
                    );
                }
                DW_AT_type => underlying_die = Some(self.absolute_ref(pos, attr.form)?),
                _ => {}
            }
            pos += die::attr_size(self.sections, self.bases, pos, attr.form)?;
        }

        let Some(underlying_die) = underlying_die else {
            // A typedef of nothing behaves like a bare modifier DIE.
            return Ok(self
                .catalogue
                .insert(die, Type::new(name, TypeKind::Void, Some(POINTER_SIZE))));
        };
        let underlying = self.parse(underlying_die)?;
        let mut ty = self.catalogue.get(underlying).clone();

        // int8_t/uint8_t are typedefs of (un)signed char; readers expect
        // numbers, not characters.
        match (name.as_deref(), &ty.kind) {
            (Some("int8_t"), TypeKind::Schar) => ty.kind = TypeKind::S1,
            (Some("uint8_t"), TypeKind::Uchar) => ty.kind = TypeKind::U1,
            _ => {}
        }
        if name.is_some() {
            ty.name = name;
        }
        Ok(self.catalogue.insert(die, ty))
    }

    fn parse_modifier(
        &mut self,
        die: usize,
        abbrev: &crate::abbrev::Abbrev,
        mut pos: usize,
        modifier: Modifiers,
    ) -> Result<TypeId> {
        let mut underlying_die = None;
        for attr in &abbrev.attrs {
            if attr.name == DW_AT_type {
                underlying_die = Some(self.absolute_ref(pos, attr.form)?);
            }
            pos += die::attr_size(self.sections, self.bases, pos, attr.form)?;
        }

        let Some(underlying_die) = underlying_die else {
            // A modifier with nothing underneath degenerates to a
            // pointer-sized void.
            let mut ty = Type::new(None, TypeKind::Void, Some(POINTER_SIZE));
            ty.modifiers = modifier;
            return Ok(self.catalogue.insert(die, ty));
        };

        let underlying = self.parse(underlying_die)?;
        let mut ty = self.catalogue.get(underlying).clone();
        ty.modifiers |= modifier;
        Ok(self.catalogue.insert(die, ty))
    }

    fn skip_children(
        &self,
        r: &mut SliceReader<'_>,
        abbrev: &crate::abbrev::Abbrev,
    ) -> Result<()> {
        if !abbrev.has_children {
            return Ok(());
        }
        loop {
            let code = r.uleb128()?;
            if code == 0 {
                return Ok(());
            }
            let child = self.abbrevs.get(code)?;
            die::skip_subtree(self.sections, self.bases, self.abbrevs, r, child)?;
        }
    }

    fn absolute_ref(&self, pos: usize, form: u64) -> Result<usize> {
        let unit_offset = die::read_ref(self.sections, pos, form)?;
        self.bases
            .base
            .checked_add(usize::try_from(unit_offset).map_err(|_| DwarfError::Truncated)?)
            .ok_or(DwarfError::Truncated)
    }
}

/// Map a base type's `(encoding, byte size)` pair onto a primitive kind.
fn base_kind(encoding: u64, size: i64) -> TypeKind {
    match encoding {
        DW_ATE_boolean => {
            if size == 1 {
                TypeKind::Bool
            } else {
                warn!(size, "unexpected boolean size, treating as unknown");
                TypeKind::Unknown
            }
        }
        DW_ATE_address => {
            warn!("segmented addresses are not a thing on x86-64, treating as unknown");
            TypeKind::Unknown
        }
        DW_ATE_signed => match size {
            1 => TypeKind::S1,
            2 => TypeKind::S2,
            4 => TypeKind::S4,
            8 => TypeKind::S8,
            _ => {
                warn!(size, "unsupported signed integer size, treating as unknown");
                TypeKind::Unknown
            }
        },
        DW_ATE_signed_char => {
            if size == 1 {
                TypeKind::Schar
            } else {
                warn!(size, "unexpected char size, treating as unknown");
                TypeKind::Unknown
            }
        }
        DW_ATE_unsigned => match size {
            1 => TypeKind::U1,
            2 => TypeKind::U2,
            4 => TypeKind::U4,
            8 => TypeKind::U8,
            _ => {
                warn!(size, "unsupported unsigned integer size, treating as unknown");
                TypeKind::Unknown
            }
        },
        DW_ATE_unsigned_char => {
            if size == 1 {
                TypeKind::Uchar
            } else {
                warn!(size, "unexpected char size, treating as unknown");
                TypeKind::Unknown
            }
        }
        DW_ATE_float => match size {
            4 => TypeKind::F4,
            8 => TypeKind::F8,
            _ => {
                warn!(size, "unsupported float size, treating as unknown");
                TypeKind::Unknown
            }
        },
        DW_ATE_ASCII | DW_ATE_UCS | DW_ATE_UTF => {
            warn!("C has no character encodings besides signed/unsigned char, treating as unknown");
            TypeKind::Unknown
        }
        DW_ATE_signed_fixed | DW_ATE_unsigned_fixed | DW_ATE_packed_decimal
        | DW_ATE_numeric_string | DW_ATE_edited => {
            warn!(encoding, "encoding does not occur in C, treating as unknown");
            TypeKind::Unknown
        }
        DW_ATE_complex_float | DW_ATE_imaginary_float | DW_ATE_decimal_float => {
            warn!(encoding, "unsupported float encoding, treating as unknown");
            TypeKind::Unknown
        }
        _ => {
            warn!(encoding, "unknown base type encoding, treating as unknown");
            TypeKind::Unknown
        }
    }
}
