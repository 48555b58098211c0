//! Compile-unit parsing: header, DIE traversal, scope tree, function table.

use tracing::{debug, trace};
use upf_elf::AddressRange;

use crate::abbrev::{Abbrev, AbbrevTable, AttrSpec};
use crate::constants::*;
use crate::die;
use crate::ranges::read_range_list;
use crate::reader::SliceReader;
use crate::scope::{CompilationUnit, Function, NamedDie, Scope, UnitBases, Variable};
use crate::{DwarfError, Result, Sections};

/// Parse every compile unit in `.debug_info`.
///
/// Units declaring a non-C language are skipped. The PC ranges of the
/// subprogram named `entry_symbol` are collected on the side.
pub(crate) fn parse_units(
    sections: &Sections<'_>,
    entry_symbol: &str,
) -> Result<(Vec<CompilationUnit>, Vec<AddressRange>)> {
    let mut units = Vec::new();
    let mut engine_ranges = Vec::new();
    let mut r = SliceReader::new(sections.info);

    while !r.is_at_end() {
        let base = r.pos();
        let (length, offset_size) = r.initial_length()?;
        let next = r.pos() + usize::try_from(length).map_err(|_| DwarfError::Truncated)?;

        let version = r.u16()?;
        if version != 5 {
            return Err(DwarfError::UnsupportedVersion(version));
        }
        let unit_type = r.u8()?;
        if unit_type != DW_UT_compile {
            return Err(DwarfError::UnsupportedUnitType(unit_type));
        }
        let address_size = r.u8()?;
        if address_size != 8 {
            return Err(DwarfError::UnsupportedAddressSize(address_size));
        }
        let abbrev_offset = r.offset(offset_size)?;

        let mut parser = UnitParser {
            sections,
            entry_symbol,
            bases: UnitBases {
                base,
                offset_size,
                str_offsets_base: None,
                addr_base: 0,
                rnglists_base: None,
            },
            unit_low_pc: None,
            types: Vec::new(),
            functions: Vec::new(),
            engine_ranges: &mut engine_ranges,
        };
        let abbrevs = AbbrevTable::parse(
            sections.abbrev,
            usize::try_from(abbrev_offset).map_err(|_| DwarfError::Truncated)?,
        )?;

        if let Some(unit) = parser.parse(&abbrevs, r.pos(), next)? {
            units.push(unit);
        } else {
            debug!(base, "skipping non-C compile unit");
        }

        r.set_pos(next);
    }

    Ok((units, engine_ranges))
}

struct UnitParser<'d, 'a> {
    sections: &'d Sections<'a>,
    entry_symbol: &'d str,
    bases: UnitBases,
    unit_low_pc: Option<u64>,
    types: Vec<NamedDie>,
    functions: Vec<Function>,
    engine_ranges: &'d mut Vec<AddressRange>,
}

/// Positions of the PC attributes of a DIE; evaluated only after the unit
/// bases are known, since `addrx` forms go through `.debug_addr`.
#[derive(Default)]
struct PcAttrs {
    low_pc: Option<(usize, u64)>,
    high_pc: Option<(usize, AttrSpec)>,
    ranges: Option<(usize, u64)>,
}

impl<'d, 'a> UnitParser<'d, 'a> {
    fn parse(
        &mut self,
        abbrevs: &AbbrevTable,
        start: usize,
        end: usize,
    ) -> Result<Option<CompilationUnit>> {
        let mut r = SliceReader::at(self.sections.info, start);

        let code = r.uleb128()?;
        let root = abbrevs.get(code)?;
        if root.tag != DW_TAG_compile_unit {
            return Err(DwarfError::Malformed("expected a compile unit DIE"));
        }

        let mut pc = PcAttrs::default();
        let mut language = None;
        let mut pos = r.pos();
        for attr in &root.attrs {
            match attr.name {
                DW_AT_low_pc => pc.low_pc = Some((pos, attr.form)),
                DW_AT_high_pc => pc.high_pc = Some((pos, *attr)),
                DW_AT_ranges => pc.ranges = Some((pos, attr.form)),
                DW_AT_language => language = Some(die::read_data(self.sections, pos, attr)?),
                DW_AT_str_offsets_base => {
                    self.bases.str_offsets_base = Some(
                        SliceReader::at(self.sections.info, pos)
                            .offset(self.bases.offset_size)?,
                    );
                }
                DW_AT_addr_base => {
                    self.bases.addr_base =
                        SliceReader::at(self.sections.info, pos).offset(self.bases.offset_size)?;
                }
                DW_AT_rnglists_base => {
                    self.bases.rnglists_base = Some(
                        SliceReader::at(self.sections.info, pos)
                            .offset(self.bases.offset_size)?,
                    );
                }
                _ => {}
            }
            pos += die::attr_size(self.sections, &self.bases, pos, attr.form)?;
        }
        r.set_pos(pos);

        if let Some(language) = language {
            if !is_c_language(language as u64) {
                return Ok(None);
            }
        }

        if let Some((low_pos, low_form)) = pc.low_pc {
            self.unit_low_pc = Some(die::read_addr(self.sections, &self.bases, low_pos, low_form)?);
        }
        let mut root_ranges = self.scope_ranges(&pc)?;
        if root_ranges.is_empty() {
            // Without range info the unit claims the whole address space so
            // that PC-based lookups still reach its globals.
            root_ranges.push(AddressRange::new(0, u64::MAX));
        }
        let mut root_scope = Scope::new(root_ranges);

        if root.has_children {
            self.walk_children(abbrevs, &mut r, Some(&mut root_scope), None)?;
        }
        if r.pos() > end {
            return Err(DwarfError::Truncated);
        }

        Ok(Some(CompilationUnit {
            bases: self.bases,
            abbrevs: abbrevs.clone(),
            types: std::mem::take(&mut self.types),
            functions: std::mem::take(&mut self.functions),
            scope: root_scope,
        }))
    }

    /// Walk the sibling list the reader is positioned at, up to and including
    /// the end-of-children terminator.
    fn walk_children(
        &mut self,
        abbrevs: &AbbrevTable,
        r: &mut SliceReader<'_>,
        mut scope: Option<&mut Scope>,
        mut function: Option<&mut Function>,
    ) -> Result<()> {
        loop {
            let die_offset = r.pos();
            let code = r.uleb128()?;
            if code == 0 {
                return Ok(());
            }
            let abbrev = abbrevs.get(code)?;

            match abbrev.tag {
                DW_TAG_subprogram | DW_TAG_lexical_block | DW_TAG_inlined_subroutine => {
                    self.enter_scope(abbrevs, r, abbrev, scope.as_deref_mut())?;
                }
                DW_TAG_variable | DW_TAG_formal_parameter => {
                    let (name, type_die) = self.read_var(abbrevs, die_offset, 0)?;
                    if let (Some(type_die), DW_TAG_formal_parameter) = (type_die, abbrev.tag) {
                        if let Some(function) = function.as_deref_mut() {
                            function.param_dies.push(type_die);
                        }
                    }
                    if let (Some(scope), Some(name), Some(type_die)) =
                        (scope.as_deref_mut(), name, type_die)
                    {
                        scope.vars.push(Variable { name, type_die });
                    }
                    self.finish_die(abbrevs, r, abbrev)?;
                }
                DW_TAG_unspecified_parameters => {
                    if let Some(function) = function.as_deref_mut() {
                        function.variadic = true;
                    }
                    self.finish_die(abbrevs, r, abbrev)?;
                }
                DW_TAG_structure_type | DW_TAG_union_type | DW_TAG_enumeration_type
                | DW_TAG_typedef | DW_TAG_base_type => {
                    if let Some(name) = self.die_name(abbrev, r.pos())? {
                        trace!(die = die_offset, name = %name, "named type");
                        self.types.push(NamedDie {
                            name,
                            die: die_offset,
                        });
                    }
                    self.finish_die(abbrevs, r, abbrev)?;
                }
                _ => {
                    self.finish_die(abbrevs, r, abbrev)?;
                }
            }
        }
    }

    /// Handle a scope-introducing DIE (subprogram, lexical block, inlined
    /// subroutine) positioned just past its abbreviation code.
    fn enter_scope(
        &mut self,
        abbrevs: &AbbrevTable,
        r: &mut SliceReader<'_>,
        abbrev: &Abbrev,
        parent: Option<&mut Scope>,
    ) -> Result<()> {
        let mut pc = PcAttrs::default();
        let mut name = None;
        let mut return_die = None;
        let mut pos = r.pos();
        for attr in &abbrev.attrs {
            match attr.name {
                DW_AT_low_pc => pc.low_pc = Some((pos, attr.form)),
                DW_AT_high_pc => pc.high_pc = Some((pos, *attr)),
                DW_AT_ranges => pc.ranges = Some((pos, attr.form)),
                DW_AT_name => {
                    name = Some(die::read_str(self.sections, &self.bases, pos, attr.form)?);
                }
                DW_AT_type => {
                    return_die =
                        Some(self.absolute_ref(die::read_ref(self.sections, pos, attr.form)?)?);
                }
                _ => {}
            }
            pos += die::attr_size(self.sections, &self.bases, pos, attr.form)?;
        }
        r.set_pos(pos);

        let ranges = self.scope_ranges(&pc)?;
        let entry_pc = match pc.low_pc {
            Some((low_pos, low_form)) => {
                Some(die::read_addr(self.sections, &self.bases, low_pos, low_form)?)
            }
            None => None,
        };

        if abbrev.tag == DW_TAG_subprogram {
            if let Some(name) = name {
                if name == self.entry_symbol {
                    self.engine_ranges.extend(ranges.iter().copied());
                }
                let mut func = Function {
                    name: name.to_owned(),
                    return_die,
                    param_dies: Vec::new(),
                    variadic: false,
                    entry_pc,
                };
                self.walk_scope_children(abbrevs, r, abbrev, parent, ranges, Some(&mut func))?;
                self.functions.push(func);
                return Ok(());
            }
        }
        self.walk_scope_children(abbrevs, r, abbrev, parent, ranges, None)
    }

    fn walk_scope_children(
        &mut self,
        abbrevs: &AbbrevTable,
        r: &mut SliceReader<'_>,
        abbrev: &Abbrev,
        parent: Option<&mut Scope>,
        ranges: Vec<AddressRange>,
        function: Option<&mut Function>,
    ) -> Result<()> {
        if !abbrev.has_children {
            return Ok(());
        }
        // A scope with no resolvable ranges cannot answer PC queries; its
        // subtree is still walked so nested types and functions are found,
        // but variables are dropped.
        match parent {
            Some(parent) if !ranges.is_empty() => {
                let mut child = Scope::new(ranges);
                self.walk_children(abbrevs, r, Some(&mut child), function)?;
                parent.scopes.push(child);
                Ok(())
            }
            _ => self.walk_children(abbrevs, r, None, function),
        }
    }

    /// Finish a non-scope DIE: skip its attributes and recurse into its
    /// children (named types may nest anywhere).
    fn finish_die(
        &mut self,
        abbrevs: &AbbrevTable,
        r: &mut SliceReader<'_>,
        abbrev: &Abbrev,
    ) -> Result<()> {
        r.set_pos(die::skip_attrs(self.sections, &self.bases, r.pos(), abbrev)?);
        if abbrev.has_children {
            self.walk_children(abbrevs, r, None, None)?;
        }
        Ok(())
    }

    /// Evaluate the PC attributes of a DIE into its address ranges.
    fn scope_ranges(&self, pc: &PcAttrs) -> Result<Vec<AddressRange>> {
        if let Some((pos, form)) = pc.ranges {
            return read_range_list(self.sections, &self.bases, pos, form, self.unit_low_pc);
        }
        let Some((low_pos, low_form)) = pc.low_pc else {
            return Ok(Vec::new());
        };
        let low = die::read_addr(self.sections, &self.bases, low_pos, low_form)?;
        let Some((high_pos, high_attr)) = pc.high_pc else {
            return Ok(Vec::new());
        };
        let high = if die::is_addr(high_attr.form) {
            die::read_addr(self.sections, &self.bases, high_pos, high_attr.form)?
        } else {
            low + die::read_data(self.sections, high_pos, &high_attr)? as u64
        };
        Ok(vec![AddressRange::new(low, high)])
    }

    /// Name and type DIE of a variable or parameter, following
    /// `DW_AT_abstract_origin` to the original declaration.
    fn read_var(
        &self,
        abbrevs: &AbbrevTable,
        die_offset: usize,
        depth: u32,
    ) -> Result<(Option<String>, Option<usize>)> {
        if depth > 16 {
            return Err(DwarfError::Malformed("abstract origin chain too deep"));
        }
        let mut r = SliceReader::at(self.sections.info, die_offset);
        let code = r.uleb128()?;
        let abbrev = abbrevs.get(code)?;

        let mut name = None;
        let mut type_die = None;
        let mut pos = r.pos();
        for attr in &abbrev.attrs {
            match attr.name {
                DW_AT_name => {
                    name = Some(
                        die::read_str(self.sections, &self.bases, pos, attr.form)?.to_owned(),
                    );
                }
                DW_AT_type => {
                    type_die =
                        Some(self.absolute_ref(die::read_ref(self.sections, pos, attr.form)?)?);
                }
                DW_AT_abstract_origin => {
                    let origin =
                        self.absolute_ref(die::read_ref(self.sections, pos, attr.form)?)?;
                    return self.read_var(abbrevs, origin, depth + 1);
                }
                _ => {}
            }
            pos += die::attr_size(self.sections, &self.bases, pos, attr.form)?;
        }

        Ok((name, type_die))
    }

    /// The `DW_AT_name` of the DIE whose attributes start at `pos`.
    fn die_name(&self, abbrev: &Abbrev, mut pos: usize) -> Result<Option<String>> {
        for attr in &abbrev.attrs {
            if attr.name == DW_AT_name {
                return Ok(Some(
                    die::read_str(self.sections, &self.bases, pos, attr.form)?.to_owned(),
                ));
            }
            pos += die::attr_size(self.sections, &self.bases, pos, attr.form)?;
        }
        Ok(None)
    }

    fn absolute_ref(&self, unit_offset: u64) -> Result<usize> {
        self.bases
            .base
            .checked_add(usize::try_from(unit_offset).map_err(|_| DwarfError::Truncated)?)
            .ok_or(DwarfError::Truncated)
    }
}
