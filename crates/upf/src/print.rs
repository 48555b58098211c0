//! Rendering of a memory buffer under a resolved type.
//!
//! Every dereference is bounds-checked against the readable ranges before
//! any raw read. Cycles are handled in two phases: a discovery pass records
//! each `(address, type)` struct occurrence and marks revisits circular;
//! the print pass then tags the first encounter of a circular node `<#N>`
//! and renders later encounters as `<points to #N>`.

use std::ffi::c_void;
use std::fmt::Write as _;

use rustc_hash::FxHashMap;
use upf_dwarf::{ArrayType, Dwarf, EnumType, FunctionType, StructType, Type, TypeId, TypeKind};
use upf_elf::AddressRange;

use crate::PcBase;
use crate::config;

#[derive(Debug, Default)]
struct CycleState {
    circular: bool,
    tag: Option<u32>,
}

/// Render the datum at `data` under type `ty`, appending to `out`.
pub(crate) fn render_value(
    out: &mut String,
    dwarf: &Dwarf<'_>,
    ranges: &[AddressRange],
    pc_base: PcBase,
    data: *const c_void,
    ty: TypeId,
) {
    let mut printer = Printer {
        dwarf,
        ranges,
        pc_base,
        cycles: FxHashMap::default(),
        next_tag: 0,
        out,
    };
    let addr = data as u64;

    // A top-level char datum is the start of a C string: the argument was a
    // `char*` whose pointee type survived resolution, and people pass
    // strings, not single characters.
    if matches!(
        dwarf.types().get(ty).kind,
        TypeKind::Schar | TypeKind::Uchar
    ) {
        if addr == 0 {
            printer.out.push_str("NULL");
        } else {
            printer.print_cstring(addr);
        }
        return;
    }

    printer.collect(addr, ty, 0);
    printer.print_value(addr, ty, 0);
}

struct Printer<'p, 'a> {
    dwarf: &'p Dwarf<'a>,
    ranges: &'p [AddressRange],
    pc_base: PcBase,
    cycles: FxHashMap<(u64, TypeId), CycleState>,
    next_tag: u32,
    out: &'p mut String,
}

impl Printer<'_, '_> {
    // Memory access. Raw reads only happen after a range check.

    fn readable(&self, addr: u64, len: u64) -> bool {
        if addr == 0 {
            return false;
        }
        if len == 0 {
            return true;
        }
        let Some(end) = addr.checked_add(len) else {
            return false;
        };
        self.ranges.iter().any(|range| range.contains(addr))
            && self.ranges.iter().any(|range| range.contains(end - 1))
    }

    fn bytes_at(&self, addr: u64, len: usize) -> Option<&[u8]> {
        if !self.readable(addr, len as u64) {
            return None;
        }
        Some(unsafe { std::slice::from_raw_parts(addr as *const u8, len) })
    }

    fn read_word(&self, addr: u64, len: usize) -> Option<u64> {
        let bytes = self.bytes_at(addr, len)?;
        let mut out = [0_u8; 8];
        out[..len].copy_from_slice(bytes);
        Some(u64::from_le_bytes(out))
    }

    fn read_wide(&self, addr: u64, len: usize) -> Option<u128> {
        let bytes = self.bytes_at(addr, len.min(16))?;
        let mut out = [0_u8; 16];
        out[..bytes.len()].copy_from_slice(bytes);
        Some(u128::from_le_bytes(out))
    }

    // Cycle discovery.

    fn collect(&mut self, addr: u64, ty: TypeId, depth: usize) {
        if depth > config::MAX_DEPTH {
            return;
        }
        let dwarf = self.dwarf;
        match &dwarf.types().get(ty).kind {
            TypeKind::Struct(record) | TypeKind::Union(record) => {
                let key = (addr, ty);
                if let Some(entry) = self.cycles.get_mut(&key) {
                    entry.circular = true;
                    return;
                }
                self.cycles.insert(key, CycleState::default());
                for member in &record.members {
                    if member.bit_size > 0 {
                        continue;
                    }
                    self.collect(addr.wrapping_add(member.offset), member.type_id, depth + 1);
                }
            }
            TypeKind::Pointer(Some(pointee)) => {
                let pointee_ty = dwarf.types().get(*pointee);
                if matches!(
                    pointee_ty.kind,
                    TypeKind::Schar | TypeKind::Uchar | TypeKind::Function(_)
                ) {
                    return;
                }
                let Some(target) = self.read_word(addr, 8) else {
                    return;
                };
                if target != 0 && self.readable(target, pointee_ty.size.unwrap_or(1)) {
                    self.collect(target, *pointee, depth + 1);
                }
            }
            TypeKind::Array(array) => {
                if array.lengths.is_empty() {
                    return;
                }
                let element = dwarf.types().get(array.element);
                let Some(element_size) = element.size else {
                    return;
                };
                let count: u64 = array.lengths.iter().product();
                for i in 0..count {
                    self.collect(addr.wrapping_add(i * element_size), array.element, depth);
                }
            }
            _ => {}
        }
    }

    // Printing.

    fn print_value(&mut self, addr: u64, ty: TypeId, depth: usize) {
        let dwarf = self.dwarf;
        let t = dwarf.types().get(ty);
        match &t.kind {
            TypeKind::Struct(record) => self.print_record(addr, ty, record, "struct", depth),
            TypeKind::Union(record) => self.print_record(addr, ty, record, "union", depth),
            TypeKind::Enum(payload) => self.print_enum(addr, payload, depth),
            TypeKind::Array(array) => self.print_array(addr, array, depth),
            TypeKind::Pointer(pointee) => self.print_pointer(addr, *pointee, depth),
            TypeKind::Function(function) => {
                let signature = self.signature(addr, function);
                self.out.push_str(&signature);
            }
            TypeKind::U1 => self.print_unsigned(addr, 1),
            TypeKind::U2 => self.print_unsigned(addr, 2),
            TypeKind::U4 => self.print_unsigned(addr, 4),
            TypeKind::U8 => self.print_unsigned(addr, 8),
            TypeKind::S1 => self.print_signed(addr, 1),
            TypeKind::S2 => self.print_signed(addr, 2),
            TypeKind::S4 => self.print_signed(addr, 4),
            TypeKind::S8 => self.print_signed(addr, 8),
            TypeKind::F4 => match self.bytes_at(addr, 4) {
                Some(bytes) => {
                    let value = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                    let _ = write!(self.out, "{value:.6}");
                }
                None => self.out.push_str("<out-of-bounds>"),
            },
            TypeKind::F8 => match self.bytes_at(addr, 8) {
                Some(bytes) => {
                    let mut raw = [0_u8; 8];
                    raw.copy_from_slice(bytes);
                    let value = f64::from_le_bytes(raw);
                    let _ = write!(self.out, "{value:.6}");
                }
                None => self.out.push_str("<out-of-bounds>"),
            },
            TypeKind::Bool => match self.read_word(addr, 1) {
                Some(value) => self
                    .out
                    .push_str(if value == 0 { "false" } else { "true" }),
                None => self.out.push_str("<out-of-bounds>"),
            },
            TypeKind::Schar => self.print_char(addr, true),
            TypeKind::Uchar => self.print_char(addr, false),
            TypeKind::Void | TypeKind::Unknown => self.out.push_str("<unknown>"),
        }
    }

    fn print_record(
        &mut self,
        addr: u64,
        ty: TypeId,
        record: &StructType,
        keyword: &str,
        depth: usize,
    ) {
        if depth >= config::MAX_DEPTH {
            self.out.push_str("{...}");
            return;
        }

        let key = (addr, ty);
        if let Some(entry) = self.cycles.get_mut(&key) {
            if entry.circular {
                if let Some(tag) = entry.tag {
                    let _ = write!(self.out, "<points to #{tag}>");
                    return;
                }
                let tag = self.next_tag;
                self.next_tag += 1;
                entry.tag = Some(tag);
                let _ = write!(self.out, "<#{tag}> ");
            }
        }

        let dwarf = self.dwarf;
        let name = dwarf.types().get(ty).name.as_deref();
        match name {
            Some(name) => {
                let _ = write!(self.out, "{keyword} {name} {{\n");
            }
            None => {
                let _ = write!(self.out, "{keyword} {{\n");
            }
        }

        for member in &record.members {
            self.indent(depth + 1);
            let decl = self.member_decl(member);
            let _ = write!(self.out, "{decl} = ");
            if member.bit_size > 0 {
                self.print_bit_field(addr, member.offset, member.bit_size);
            } else {
                self.print_value(addr.wrapping_add(member.offset), member.type_id, depth + 1);
            }
            self.out.push('\n');
        }

        self.indent(depth);
        self.out.push('}');
    }

    fn print_enum(&mut self, addr: u64, payload: &EnumType, depth: usize) {
        let dwarf = self.dwarf;
        let underlying = dwarf.types().get(payload.underlying);
        let size = underlying.size.unwrap_or(4) as usize;
        let Some(raw) = self.read_word(addr, size.min(8)) else {
            self.out.push_str("<out-of-bounds>");
            return;
        };
        let value = match underlying.kind {
            TypeKind::S1 => i64::from(raw as u8 as i8),
            TypeKind::S2 => i64::from(raw as u16 as i16),
            TypeKind::S4 => i64::from(raw as u32 as i32),
            _ => raw as i64,
        };

        let name = payload
            .enumerators
            .iter()
            .find(|enumerator| enumerator.value == value)
            .map_or("<unknown>", |enumerator| enumerator.name.as_str());
        self.out.push_str(name);
        self.out.push_str(" (");
        self.print_value(addr, payload.underlying, depth);
        self.out.push(')');
    }

    fn print_array(&mut self, addr: u64, array: &ArrayType, depth: usize) {
        if array.lengths.is_empty() {
            self.out.push_str("<unknown>");
            return;
        }
        self.print_array_dims(addr, array.element, &array.lengths, depth);
    }

    fn print_array_dims(&mut self, addr: u64, element: TypeId, dims: &[u64], depth: usize) {
        let dwarf = self.dwarf;
        let Some(element_size) = dwarf.types().get(element).size else {
            self.out.push_str("<unknown>");
            return;
        };
        let stride = element_size * dims[1..].iter().product::<u64>();
        let count = dims[0];

        if count > 0 && !self.readable(addr, stride * count) {
            self.out.push_str("<out-of-bounds>");
            return;
        }

        self.out.push('[');
        let mut index = 0_u64;
        let mut first = true;
        while index < count {
            let mut run = 1_u64;
            while index + run < count
                && self.elements_equal(addr, index, index + run, stride as usize)
            {
                run += 1;
            }

            if !first {
                self.out.push_str(", ");
            }
            first = false;

            let element_addr = addr + index * stride;
            if dims.len() > 1 {
                self.print_array_dims(element_addr, element, &dims[1..], depth);
            } else {
                self.print_value(element_addr, element, depth);
            }

            if run as usize >= config::ARRAY_COMPRESSION_THRESHOLD {
                let _ = write!(self.out, " <repeats {run} times>");
                index += run;
            } else {
                index += 1;
            }
        }
        self.out.push(']');
    }

    fn elements_equal(&self, base: u64, a: u64, b: u64, stride: usize) -> bool {
        let Some(left) = self.bytes_at(base + a * stride as u64, stride) else {
            return false;
        };
        let Some(right) = self.bytes_at(base + b * stride as u64, stride) else {
            return false;
        };
        left == right
    }

    fn print_pointer(&mut self, addr: u64, pointee: Option<TypeId>, depth: usize) {
        let Some(target) = self.read_word(addr, 8) else {
            self.out.push_str("<out-of-bounds>");
            return;
        };
        if target == 0 {
            self.out.push_str("NULL");
            return;
        }
        let Some(pointee) = pointee else {
            let _ = write!(self.out, "0x{target:x}");
            return;
        };

        let dwarf = self.dwarf;
        let pointee_ty = dwarf.types().get(pointee);
        if config::IGNORE_STDIO_FILE && pointee_ty.name.as_deref() == Some("FILE") {
            self.out.push_str("<ignored>");
            return;
        }

        match &pointee_ty.kind {
            TypeKind::Schar | TypeKind::Uchar => self.print_cstring(target),
            TypeKind::Function(function) => {
                let signature = self.signature(target, function);
                let _ = write!(self.out, "0x{target:x} ({signature})");
            }
            _ => {
                if depth >= config::MAX_DEPTH {
                    let _ = write!(self.out, "0x{target:x}");
                    return;
                }
                if !self.readable(target, pointee_ty.size.unwrap_or(1)) {
                    let _ = write!(self.out, "0x{target:x} (<out-of-bounds>)");
                    return;
                }
                let _ = write!(self.out, "0x{target:x} (");
                self.print_value(target, pointee, depth + 1);
                self.out.push(')');
            }
        }
    }

    fn print_cstring(&mut self, target: u64) {
        if !self.readable(target, 1) {
            let _ = write!(self.out, "0x{target:x} (<out-of-bounds>)");
            return;
        }
        let _ = write!(self.out, "0x{target:x} (\"");
        let mut scanned = 0_usize;
        loop {
            if scanned >= config::MAX_STRING_LENGTH {
                self.out.push_str("...\")");
                return;
            }
            let Some(byte) = self.read_word(target + scanned as u64, 1) else {
                self.out.push_str("\" <out-of-bounds>)");
                return;
            };
            let byte = byte as u8;
            if byte == 0 {
                self.out.push_str("\")");
                return;
            }
            self.push_escaped(byte);
            scanned += 1;
        }
    }

    fn print_unsigned(&mut self, addr: u64, len: usize) {
        match self.read_word(addr, len) {
            Some(value) => {
                let _ = write!(self.out, "{value}");
            }
            None => self.out.push_str("<out-of-bounds>"),
        }
    }

    fn print_signed(&mut self, addr: u64, len: usize) {
        match self.read_word(addr, len) {
            Some(raw) => {
                let shift = 64 - len as u32 * 8;
                let value = ((raw << shift) as i64) >> shift;
                let _ = write!(self.out, "{value}");
            }
            None => self.out.push_str("<out-of-bounds>"),
        }
    }

    fn print_char(&mut self, addr: u64, signed: bool) {
        let Some(raw) = self.read_word(addr, 1) else {
            self.out.push_str("<out-of-bounds>");
            return;
        };
        let byte = raw as u8;
        if signed {
            let _ = write!(self.out, "{}", byte as i8);
        } else {
            let _ = write!(self.out, "{byte}");
        }
        if (0x20..=0x7E).contains(&byte) {
            self.out.push_str(" ('");
            self.push_escaped(byte);
            self.out.push_str("')");
        }
    }

    /// Bit-field extraction: shift the containing bytes right by the bit
    /// offset and mask to the field width.
    fn print_bit_field(&mut self, record_addr: u64, bit_offset: u64, bit_size: u32) {
        let byte = bit_offset / 8;
        let shift = (bit_offset % 8) as u32;
        let nbytes = ((shift + bit_size) as usize).div_ceil(8);
        let Some(storage) = self.read_wide(record_addr.wrapping_add(byte), nbytes) else {
            self.out.push_str("<out-of-bounds>");
            return;
        };
        let mask = if bit_size >= 128 {
            u128::MAX
        } else {
            (1_u128 << bit_size) - 1
        };
        let value = (storage >> shift) & mask;
        let _ = write!(self.out, "{value}");
    }

    fn push_escaped(&mut self, byte: u8) {
        match byte {
            0x07 => self.out.push_str("\\a"),
            0x08 => self.out.push_str("\\b"),
            0x0C => self.out.push_str("\\f"),
            b'\n' => self.out.push_str("\\n"),
            b'\r' => self.out.push_str("\\r"),
            b'\t' => self.out.push_str("\\t"),
            0x0B => self.out.push_str("\\v"),
            0 => self.out.push_str("\\0"),
            b'\\' => self.out.push_str("\\\\"),
            b'"' => self.out.push_str("\\\""),
            0x20..=0x7E => self.out.push(char::from(byte)),
            _ => {
                let _ = write!(self.out, "\\x{byte:02x}");
            }
        }
    }

    /// Reconstructed C signature of a function whose entry is `target`.
    /// The name comes from the function table when the (base-adjusted)
    /// address matches an entry PC.
    fn signature(&self, target: u64, function: &FunctionType) -> String {
        let dwarf = self.dwarf;
        let entry_pc = self.pc_base.to_dwarf(target);
        let named = dwarf
            .function_by_entry(entry_pc)
            .map(|(_, record)| record.clone());

        let return_name = function
            .return_type
            .map_or_else(|| "void".to_owned(), |ret| self.c_type_name(ret));
        let mut params: Vec<String> = function
            .params
            .iter()
            .map(|&param| self.c_type_name(param))
            .collect();
        if named.as_ref().is_some_and(|record| record.variadic) {
            params.push("...".to_owned());
        }
        let params = params.join(", ");

        named.map_or_else(
            || format!("{return_name} (*)({params})"),
            |record| format!("{return_name} {}({params})", record.name),
        )
    }

    /// C-ish rendering of a member declaration for record dumps.
    fn member_decl(&self, member: &upf_dwarf::Member) -> String {
        let dwarf = self.dwarf;
        let ty = dwarf.types().get(member.type_id);
        match &ty.kind {
            TypeKind::Array(array) => {
                let element = self.c_type_name(array.element);
                let dims: String = array
                    .lengths
                    .iter()
                    .map(|length| format!("[{length}]"))
                    .collect();
                if array.lengths.is_empty() {
                    format!("{element} {}[]", member.name)
                } else {
                    format!("{element} {}{dims}", member.name)
                }
            }
            TypeKind::Pointer(Some(pointee)) => {
                if let TypeKind::Function(function) = &dwarf.types().get(*pointee).kind {
                    let return_name = function
                        .return_type
                        .map_or_else(|| "void".to_owned(), |ret| self.c_type_name(ret));
                    let params: Vec<String> = function
                        .params
                        .iter()
                        .map(|&param| self.c_type_name(param))
                        .collect();
                    format!("{return_name} (*{})({})", member.name, params.join(", "))
                } else {
                    let type_name = self.c_type_name(member.type_id);
                    if type_name.ends_with('*') {
                        format!("{type_name}{}", member.name)
                    } else {
                        format!("{type_name} {}", member.name)
                    }
                }
            }
            _ => {
                let type_name = self.c_type_name(member.type_id);
                if type_name.ends_with('*') {
                    format!("{type_name}{}", member.name)
                } else {
                    format!("{type_name} {}", member.name)
                }
            }
        }
    }

    fn c_type_name(&self, ty: TypeId) -> String {
        let dwarf = self.dwarf;
        let t = dwarf.types().get(ty);
        let mut prefix = String::new();
        if t.modifiers.contains(upf_dwarf::Modifiers::CONST) {
            prefix.push_str("const ");
        }
        if t.modifiers.contains(upf_dwarf::Modifiers::VOLATILE) {
            prefix.push_str("volatile ");
        }
        if t.modifiers.contains(upf_dwarf::Modifiers::ATOMIC) {
            prefix.push_str("_Atomic ");
        }
        if t.modifiers.contains(upf_dwarf::Modifiers::RESTRICT) {
            prefix.push_str("restrict ");
        }

        let base = match &t.kind {
            TypeKind::Struct(_) => format!("struct {}", anonymous(t)),
            TypeKind::Union(_) => format!("union {}", anonymous(t)),
            TypeKind::Enum(_) => format!("enum {}", anonymous(t)),
            TypeKind::Pointer(Some(pointee)) => {
                if let TypeKind::Function(function) = &dwarf.types().get(*pointee).kind {
                    let return_name = function
                        .return_type
                        .map_or_else(|| "void".to_owned(), |ret| self.c_type_name(ret));
                    let params: Vec<String> = function
                        .params
                        .iter()
                        .map(|&param| self.c_type_name(param))
                        .collect();
                    format!("{return_name} (*)({})", params.join(", "))
                } else {
                    let inner = self.c_type_name(*pointee);
                    if inner.ends_with('*') {
                        format!("{inner}*")
                    } else {
                        format!("{inner} *")
                    }
                }
            }
            TypeKind::Pointer(None) => "void *".to_owned(),
            TypeKind::Array(array) => format!("{} []", self.c_type_name(array.element)),
            TypeKind::Function(function) => {
                let return_name = function
                    .return_type
                    .map_or_else(|| "void".to_owned(), |ret| self.c_type_name(ret));
                let params: Vec<String> = function
                    .params
                    .iter()
                    .map(|&param| self.c_type_name(param))
                    .collect();
                format!("{return_name} ()({})", params.join(", "))
            }
            TypeKind::Void => "void".to_owned(),
            TypeKind::Unknown => "<unknown>".to_owned(),
            _ => t.name.clone().unwrap_or_else(|| fallback_name(&t.kind).to_owned()),
        };
        prefix + &base
    }

    fn indent(&mut self, depth: usize) {
        for _ in 0..depth * config::INDENT_WIDTH {
            self.out.push(' ');
        }
    }
}

fn anonymous(ty: &Type) -> &str {
    ty.name.as_deref().unwrap_or("<anonymous>")
}

fn fallback_name(kind: &TypeKind) -> &'static str {
    match kind {
        TypeKind::U1 => "uint8_t",
        TypeKind::U2 => "uint16_t",
        TypeKind::U4 => "uint32_t",
        TypeKind::U8 => "uint64_t",
        TypeKind::S1 => "int8_t",
        TypeKind::S2 => "int16_t",
        TypeKind::S4 => "int32_t",
        TypeKind::S8 => "int64_t",
        TypeKind::F4 => "float",
        TypeKind::F8 => "double",
        TypeKind::Bool => "_Bool",
        TypeKind::Schar => "char",
        TypeKind::Uchar => "unsigned char",
        _ => "<unknown>",
    }
}
