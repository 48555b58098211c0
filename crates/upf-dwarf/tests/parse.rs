//! End-to-end ingest tests over in-memory DWARF images.

use upf_dwarf::testing::DwarfBuilder;
use upf_dwarf::{
    DW_ATE_float, DW_ATE_signed, DW_ATE_signed_char, DW_ATE_unsigned, DW_AT_byte_size,
    DW_AT_const_value, DW_AT_count, DW_AT_data_bit_offset, DW_AT_data_member_location,
    DW_AT_encoding, DW_AT_high_pc, DW_AT_language, DW_AT_low_pc, DW_AT_name, DW_AT_type,
    DW_AT_bit_size, DW_FORM_addr, DW_FORM_data1, DW_FORM_data8, DW_FORM_ref4, DW_FORM_sdata,
    DW_FORM_strp, DW_TAG_base_type, DW_TAG_compile_unit, DW_TAG_const_type,
    DW_TAG_enumeration_type, DW_TAG_enumerator, DW_TAG_formal_parameter, DW_TAG_member,
    DW_TAG_pointer_type, DW_TAG_structure_type, DW_TAG_subprogram, DW_TAG_subrange_type,
    DW_TAG_array_type, DW_TAG_typedef, DW_TAG_variable, Dwarf, Modifiers, TypeKind,
};

const ENTRY: &str = "upf_uprintf";

struct Abbrevs {
    base: u64,
    strukt: u64,
    member: u64,
    member_bits: u64,
    pointer: u64,
    enum_type: u64,
    enumerator: u64,
    array: u64,
    subrange: u64,
    typedef: u64,
    const_type: u64,
    subprogram: u64,
    param: u64,
    variable: u64,
}

fn standard_abbrevs(b: &mut DwarfBuilder) -> Abbrevs {
    b.abbrev(
        DW_TAG_compile_unit,
        true,
        &[
            (DW_AT_low_pc, DW_FORM_addr),
            (DW_AT_high_pc, DW_FORM_data8),
            (DW_AT_language, DW_FORM_data1),
        ],
    );
    Abbrevs {
        base: b.abbrev(
            DW_TAG_base_type,
            false,
            &[
                (DW_AT_name, DW_FORM_strp),
                (DW_AT_byte_size, DW_FORM_data1),
                (DW_AT_encoding, DW_FORM_data1),
            ],
        ),
        strukt: b.abbrev(
            DW_TAG_structure_type,
            true,
            &[(DW_AT_name, DW_FORM_strp), (DW_AT_byte_size, DW_FORM_data1)],
        ),
        member: b.abbrev(
            DW_TAG_member,
            false,
            &[
                (DW_AT_name, DW_FORM_strp),
                (DW_AT_type, DW_FORM_ref4),
                (DW_AT_data_member_location, DW_FORM_data1),
            ],
        ),
        member_bits: b.abbrev(
            DW_TAG_member,
            false,
            &[
                (DW_AT_name, DW_FORM_strp),
                (DW_AT_type, DW_FORM_ref4),
                (DW_AT_data_bit_offset, DW_FORM_data1),
                (DW_AT_bit_size, DW_FORM_data1),
            ],
        ),
        pointer: b.abbrev(DW_TAG_pointer_type, false, &[(DW_AT_type, DW_FORM_ref4)]),
        enum_type: b.abbrev(
            DW_TAG_enumeration_type,
            true,
            &[
                (DW_AT_name, DW_FORM_strp),
                (DW_AT_byte_size, DW_FORM_data1),
                (DW_AT_type, DW_FORM_ref4),
            ],
        ),
        enumerator: b.abbrev(
            DW_TAG_enumerator,
            false,
            &[(DW_AT_name, DW_FORM_strp), (DW_AT_const_value, DW_FORM_sdata)],
        ),
        array: b.abbrev(DW_TAG_array_type, true, &[(DW_AT_type, DW_FORM_ref4)]),
        subrange: b.abbrev(DW_TAG_subrange_type, false, &[(DW_AT_count, DW_FORM_data1)]),
        typedef: b.abbrev(
            DW_TAG_typedef,
            false,
            &[(DW_AT_name, DW_FORM_strp), (DW_AT_type, DW_FORM_ref4)],
        ),
        const_type: b.abbrev(DW_TAG_const_type, false, &[(DW_AT_type, DW_FORM_ref4)]),
        subprogram: b.abbrev(
            DW_TAG_subprogram,
            true,
            &[
                (DW_AT_name, DW_FORM_strp),
                (DW_AT_low_pc, DW_FORM_addr),
                (DW_AT_high_pc, DW_FORM_data8),
                (DW_AT_type, DW_FORM_ref4),
            ],
        ),
        param: b.abbrev(
            DW_TAG_formal_parameter,
            false,
            &[(DW_AT_name, DW_FORM_strp), (DW_AT_type, DW_FORM_ref4)],
        ),
        variable: b.abbrev(
            DW_TAG_variable,
            false,
            &[(DW_AT_name, DW_FORM_strp), (DW_AT_type, DW_FORM_ref4)],
        ),
    }
}

struct Fixture {
    built: upf_dwarf::testing::BuiltDwarf,
    int_die: usize,
    float_die: usize,
    p_die: usize,
    e_die: usize,
    arr_die: usize,
    node_die: usize,
    node_ptr_die: usize,
    const_die: usize,
    typedef_die: usize,
    flags_die: usize,
}

fn fixture() -> Fixture {
    let mut b = DwarfBuilder::new();
    let a = standard_abbrevs(&mut b);

    b.die(1); // compile unit
    b.addr(0x1000);
    b.data8(0x1000);
    b.data1(0x0c); // DW_LANG_C99

    let int_die = b.die(a.base);
    b.strp("int");
    b.data1(4);
    b.data1(DW_ATE_signed as u8);

    let float_die = b.die(a.base);
    b.strp("float");
    b.data1(4);
    b.data1(DW_ATE_float as u8);

    let uint_die = b.die(a.base);
    b.strp("unsigned int");
    b.data1(4);
    b.data1(DW_ATE_unsigned as u8);

    let char_die = b.die(a.base);
    b.strp("char");
    b.data1(1);
    b.data1(DW_ATE_signed_char as u8);

    let p_die = b.die(a.strukt);
    b.strp("P");
    b.data1(8);
    {
        b.die(a.member);
        b.strp("a");
        b.ref4(int_die);
        b.data1(0);
        b.die(a.member);
        b.strp("b");
        b.ref4(float_die);
        b.data1(4);
        b.end_children();
    }

    let e_die = b.die(a.enum_type);
    b.strp("E");
    b.data1(4);
    b.ref4(uint_die);
    {
        b.die(a.enumerator);
        b.strp("A");
        b.sdata(1);
        b.die(a.enumerator);
        b.strp("B");
        b.sdata(2);
        b.end_children();
    }

    let arr_die = b.die(a.array);
    b.ref4(int_die);
    {
        b.die(a.subrange);
        b.data1(3);
        b.end_children();
    }

    let node_die = b.die(a.strukt);
    b.strp("N");
    b.data1(16);
    let next_patch;
    {
        b.die(a.member);
        b.strp("v");
        b.ref4(int_die);
        b.data1(0);
        b.die(a.member);
        b.strp("n");
        next_patch = b.ref4_placeholder();
        b.data1(8);
        b.end_children();
    }
    let node_ptr_die = b.die(a.pointer);
    b.ref4(node_die);
    b.patch_ref4(next_patch, node_ptr_die);

    let const_die = b.die(a.const_type);
    b.ref4(int_die);

    let typedef_die = b.die(a.typedef);
    b.strp("myint");
    b.ref4(int_die);

    let flags_die = b.die(a.strukt);
    b.strp("Flags");
    b.data1(4);
    {
        b.die(a.member_bits);
        b.strp("x");
        b.ref4(uint_die);
        b.data1(0);
        b.data1(3);
        b.die(a.member_bits);
        b.strp("y");
        b.ref4(uint_die);
        b.data1(3);
        b.data1(5);
        b.end_children();
    }

    b.die(a.subprogram);
    b.strp("main");
    b.addr(0x1000);
    b.data8(0x100);
    b.ref4(int_die);
    {
        b.die(a.param);
        b.strp("argc");
        b.ref4(int_die);
        b.die(a.variable);
        b.strp("p");
        b.ref4(p_die);
        b.die(a.variable);
        b.strp("c");
        b.ref4(char_die);
        b.end_children();
    }

    b.die(a.subprogram);
    b.strp(ENTRY);
    b.addr(0x1100);
    b.data8(0x50);
    b.ref4(int_die);
    b.end_children();

    b.end_children(); // compile unit

    Fixture {
        built: b.finish(),
        int_die,
        float_die,
        p_die,
        e_die,
        arr_die,
        node_die,
        node_ptr_die,
        const_die,
        typedef_die,
        flags_die,
    }
}

#[test]
fn test_unit_and_named_types() {
    let f = fixture();
    let dwarf = Dwarf::parse(f.built.sections(), ENTRY).unwrap();

    assert_eq!(dwarf.units().len(), 1);
    let unit = &dwarf.units()[0];
    assert_eq!(unit.find_named_type("int"), Some(f.int_die));
    assert_eq!(unit.find_named_type("P"), Some(f.p_die));
    assert_eq!(unit.find_named_type("E"), Some(f.e_die));
    assert_eq!(unit.find_named_type("nothing"), None);
}

#[test]
fn test_type_parse_is_memoised() {
    let f = fixture();
    let mut dwarf = Dwarf::parse(f.built.sections(), ENTRY).unwrap();

    let first = dwarf.parse_type(0, f.p_die).unwrap();
    let len_after_first = dwarf.types().len();
    let second = dwarf.parse_type(0, f.p_die).unwrap();
    assert_eq!(first, second);
    assert_eq!(dwarf.types().len(), len_after_first);
}

#[test]
fn test_struct_members() {
    let f = fixture();
    let mut dwarf = Dwarf::parse(f.built.sections(), ENTRY).unwrap();

    let int_id = dwarf.parse_type(0, f.int_die).unwrap();
    let float_id = dwarf.parse_type(0, f.float_die).unwrap();
    let id = dwarf.parse_type(0, f.p_die).unwrap();
    let ty = dwarf.types().get(id);
    assert_eq!(ty.name.as_deref(), Some("P"));
    assert_eq!(ty.size, Some(8));
    let TypeKind::Struct(record) = &ty.kind else {
        panic!("expected a struct, got {:?}", ty.kind);
    };
    assert_eq!(record.members.len(), 2);
    assert_eq!(record.members[0].name, "a");
    assert_eq!(record.members[0].offset, 0);
    assert_eq!(record.members[1].name, "b");
    assert_eq!(record.members[1].offset, 4);
    assert_eq!(record.members[0].type_id, int_id);
    assert_eq!(record.members[1].type_id, float_id);

    // Sum of member sizes stays within the record size.
    let total: u64 = record
        .members
        .iter()
        .map(|m| dwarf.types().get(m.type_id).size.unwrap())
        .sum();
    assert!(total <= ty.size.unwrap());
}

#[test]
fn test_enum_values() {
    let f = fixture();
    let mut dwarf = Dwarf::parse(f.built.sections(), ENTRY).unwrap();

    let id = dwarf.parse_type(0, f.e_die).unwrap();
    let ty = dwarf.types().get(id);
    let TypeKind::Enum(payload) = &ty.kind else {
        panic!("expected an enum, got {:?}", ty.kind);
    };
    assert_eq!(payload.enumerators.len(), 2);
    assert_eq!(payload.enumerators[0].name, "A");
    assert_eq!(payload.enumerators[0].value, 1);
    assert_eq!(payload.enumerators[1].value, 2);
    assert!(matches!(
        dwarf.types().get(payload.underlying).kind,
        TypeKind::U4
    ));
}

#[test]
fn test_array_size_is_element_times_dimensions() {
    let f = fixture();
    let mut dwarf = Dwarf::parse(f.built.sections(), ENTRY).unwrap();

    let id = dwarf.parse_type(0, f.arr_die).unwrap();
    let ty = dwarf.types().get(id);
    let TypeKind::Array(payload) = &ty.kind else {
        panic!("expected an array, got {:?}", ty.kind);
    };
    assert_eq!(payload.lengths, vec![3]);
    assert_eq!(ty.size, Some(12));
    assert!(matches!(
        dwarf.types().get(payload.element).kind,
        TypeKind::S4
    ));
}

#[test]
fn test_self_referential_struct_terminates() {
    let f = fixture();
    let mut dwarf = Dwarf::parse(f.built.sections(), ENTRY).unwrap();

    let node = dwarf.parse_type(0, f.node_die).unwrap();
    let pointer = dwarf.parse_type(0, f.node_ptr_die).unwrap();

    let ty = dwarf.types().get(node);
    let TypeKind::Struct(record) = &ty.kind else {
        panic!("expected a struct, got {:?}", ty.kind);
    };
    assert_eq!(record.members[1].name, "n");
    let TypeKind::Pointer(Some(pointee)) = dwarf.types().get(record.members[1].type_id).kind
    else {
        panic!("expected a pointer member");
    };
    assert_eq!(pointee, node);
    assert!(matches!(
        dwarf.types().get(pointer).kind,
        TypeKind::Pointer(Some(id)) if id == node
    ));
}

#[test]
fn test_const_modifier_is_a_memoised_copy() {
    let f = fixture();
    let mut dwarf = Dwarf::parse(f.built.sections(), ENTRY).unwrap();

    let id = dwarf.parse_type(0, f.const_die).unwrap();
    let ty = dwarf.types().get(id);
    assert!(matches!(ty.kind, TypeKind::S4));
    assert!(ty.modifiers.contains(Modifiers::CONST));

    let again = dwarf.parse_type(0, f.const_die).unwrap();
    assert_eq!(id, again);

    // The unmodified underlying entry is untouched.
    let plain = dwarf.parse_type(0, f.int_die).unwrap();
    assert!(dwarf.types().get(plain).modifiers.is_empty());
}

#[test]
fn test_typedef_keeps_kind_and_renames() {
    let f = fixture();
    let mut dwarf = Dwarf::parse(f.built.sections(), ENTRY).unwrap();

    let id = dwarf.parse_type(0, f.typedef_die).unwrap();
    let ty = dwarf.types().get(id);
    assert_eq!(ty.name.as_deref(), Some("myint"));
    assert!(matches!(ty.kind, TypeKind::S4));
}

#[test]
fn test_bit_field_members() {
    let f = fixture();
    let mut dwarf = Dwarf::parse(f.built.sections(), ENTRY).unwrap();

    let id = dwarf.parse_type(0, f.flags_die).unwrap();
    let TypeKind::Struct(record) = &dwarf.types().get(id).kind else {
        panic!("expected a struct");
    };
    assert_eq!(record.members.len(), 2);
    assert_eq!(record.members[0].bit_size, 3);
    assert_eq!(record.members[0].offset, 0);
    assert_eq!(record.members[1].bit_size, 5);
    assert_eq!(record.members[1].offset, 3);
}

#[test]
fn test_scope_lookup_at_pc() {
    let f = fixture();
    let dwarf = Dwarf::parse(f.built.sections(), ENTRY).unwrap();
    let unit = &dwarf.units()[0];

    assert_eq!(unit.find_variable(0x1050, "p"), Some(f.p_die));
    assert_eq!(unit.find_variable(0x1050, "argc"), Some(f.int_die));
    // Out of the function's range the locals are invisible.
    assert_eq!(unit.find_variable(0x1800, "p"), None);
    // Outside the unit's own range nothing resolves.
    assert_eq!(unit.find_variable(0x9000, "p"), None);
}

#[test]
fn test_function_table() {
    let f = fixture();
    let dwarf = Dwarf::parse(f.built.sections(), ENTRY).unwrap();
    let unit = &dwarf.units()[0];

    let main = unit.find_function("main").unwrap();
    assert_eq!(main.entry_pc, Some(0x1000));
    assert_eq!(main.return_die, Some(f.int_die));
    assert_eq!(main.param_dies, vec![f.int_die]);
    assert!(!main.variadic);

    let (unit_index, by_pc) = dwarf.function_by_entry(0x1000).unwrap();
    assert_eq!(unit_index, 0);
    assert_eq!(by_pc.name, "main");
}

#[test]
fn test_engine_ranges_are_captured() {
    let f = fixture();
    let dwarf = Dwarf::parse(f.built.sections(), ENTRY).unwrap();

    assert_eq!(dwarf.engine_ranges().len(), 1);
    assert_eq!(dwarf.engine_ranges()[0].start, 0x1100);
    assert_eq!(dwarf.engine_ranges()[0].end, 0x1150);
}

#[test]
fn test_non_c_unit_is_skipped() {
    let mut b = DwarfBuilder::new();
    standard_abbrevs(&mut b);
    b.die(1);
    b.addr(0x1000);
    b.data8(0x1000);
    b.data1(0x1c); // DW_LANG_Rust
    b.end_children();
    let built = b.finish();

    let dwarf = Dwarf::parse(built.sections(), ENTRY).unwrap();
    assert!(dwarf.units().is_empty());
}

#[test]
fn test_unsupported_encoding_warns_and_degrades() {
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    struct Collector(Arc<Mutex<Vec<u8>>>);

    impl Write for Collector {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    let mut b = DwarfBuilder::new();
    let a = standard_abbrevs(&mut b);
    b.die(1);
    b.addr(0x1000);
    b.data8(0x1000);
    b.data1(0x0c);
    let f16_die = b.die(a.base);
    b.strp("long double");
    b.data1(16);
    b.data1(DW_ATE_float as u8);
    b.end_children();
    let built = b.finish();

    let buffer = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&buffer);
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || Collector(Arc::clone(&sink)))
        .with_ansi(false)
        .finish();

    tracing::subscriber::with_default(subscriber, || {
        let mut dwarf = Dwarf::parse(built.sections(), ENTRY).unwrap();
        let id = dwarf.parse_type(0, f16_die).unwrap();
        // Degrades to unknown, but the entry still exists in the catalogue.
        assert!(matches!(dwarf.types().get(id).kind, TypeKind::Unknown));
        assert_eq!(dwarf.types().get(id).name.as_deref(), Some("long double"));
    });

    let output = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
    assert!(output.contains("unsupported float size"));
}

#[test]
fn test_child_scopes_are_contained_in_parents() {
    let f = fixture();
    let dwarf = Dwarf::parse(f.built.sections(), ENTRY).unwrap();
    let root = &dwarf.units()[0].scope;

    fn check(scope: &upf_dwarf::Scope) {
        for child in &scope.scopes {
            for range in &child.ranges {
                assert!(
                    scope
                        .ranges
                        .iter()
                        .any(|outer| outer.start <= range.start && range.end <= outer.end)
                );
            }
            check(child);
        }
    }
    check(root);
}
