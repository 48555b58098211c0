//! DWARF v5 encoding constants.
//!
//! Only the subset the engine accepts; names follow the standard.

#![allow(non_upper_case_globals)]

// Unit types.
pub const DW_UT_compile: u8 = 0x01;

// Tags.
pub const DW_TAG_array_type: u64 = 0x01;
pub const DW_TAG_enumeration_type: u64 = 0x04;
pub const DW_TAG_formal_parameter: u64 = 0x05;
pub const DW_TAG_lexical_block: u64 = 0x0b;
pub const DW_TAG_member: u64 = 0x0d;
pub const DW_TAG_pointer_type: u64 = 0x0f;
pub const DW_TAG_compile_unit: u64 = 0x11;
pub const DW_TAG_structure_type: u64 = 0x13;
pub const DW_TAG_subroutine_type: u64 = 0x15;
pub const DW_TAG_typedef: u64 = 0x16;
pub const DW_TAG_union_type: u64 = 0x17;
pub const DW_TAG_unspecified_parameters: u64 = 0x18;
pub const DW_TAG_inlined_subroutine: u64 = 0x1d;
pub const DW_TAG_subrange_type: u64 = 0x21;
pub const DW_TAG_base_type: u64 = 0x24;
pub const DW_TAG_const_type: u64 = 0x26;
pub const DW_TAG_enumerator: u64 = 0x28;
pub const DW_TAG_subprogram: u64 = 0x2e;
pub const DW_TAG_variable: u64 = 0x34;
pub const DW_TAG_volatile_type: u64 = 0x35;
pub const DW_TAG_restrict_type: u64 = 0x37;
pub const DW_TAG_atomic_type: u64 = 0x47;

// Attributes.
pub const DW_AT_name: u64 = 0x03;
pub const DW_AT_byte_size: u64 = 0x0b;
pub const DW_AT_bit_offset: u64 = 0x0c;
pub const DW_AT_bit_size: u64 = 0x0d;
pub const DW_AT_low_pc: u64 = 0x11;
pub const DW_AT_high_pc: u64 = 0x12;
pub const DW_AT_language: u64 = 0x13;
pub const DW_AT_const_value: u64 = 0x1c;
pub const DW_AT_upper_bound: u64 = 0x2f;
pub const DW_AT_abstract_origin: u64 = 0x31;
pub const DW_AT_count: u64 = 0x37;
pub const DW_AT_data_member_location: u64 = 0x38;
pub const DW_AT_encoding: u64 = 0x3e;
pub const DW_AT_type: u64 = 0x49;
pub const DW_AT_ranges: u64 = 0x55;
pub const DW_AT_data_bit_offset: u64 = 0x6b;
pub const DW_AT_str_offsets_base: u64 = 0x72;
pub const DW_AT_addr_base: u64 = 0x73;
pub const DW_AT_rnglists_base: u64 = 0x74;

// Forms.
pub const DW_FORM_addr: u64 = 0x01;
pub const DW_FORM_block2: u64 = 0x03;
pub const DW_FORM_block4: u64 = 0x04;
pub const DW_FORM_data2: u64 = 0x05;
pub const DW_FORM_data4: u64 = 0x06;
pub const DW_FORM_data8: u64 = 0x07;
pub const DW_FORM_string: u64 = 0x08;
pub const DW_FORM_block: u64 = 0x09;
pub const DW_FORM_block1: u64 = 0x0a;
pub const DW_FORM_data1: u64 = 0x0b;
pub const DW_FORM_flag: u64 = 0x0c;
pub const DW_FORM_sdata: u64 = 0x0d;
pub const DW_FORM_strp: u64 = 0x0e;
pub const DW_FORM_udata: u64 = 0x0f;
pub const DW_FORM_ref_addr: u64 = 0x10;
pub const DW_FORM_ref1: u64 = 0x11;
pub const DW_FORM_ref2: u64 = 0x12;
pub const DW_FORM_ref4: u64 = 0x13;
pub const DW_FORM_ref8: u64 = 0x14;
pub const DW_FORM_ref_udata: u64 = 0x15;
pub const DW_FORM_indirect: u64 = 0x16;
pub const DW_FORM_sec_offset: u64 = 0x17;
pub const DW_FORM_exprloc: u64 = 0x18;
pub const DW_FORM_flag_present: u64 = 0x19;
pub const DW_FORM_strx: u64 = 0x1a;
pub const DW_FORM_addrx: u64 = 0x1b;
pub const DW_FORM_ref_sup4: u64 = 0x1c;
pub const DW_FORM_strp_sup: u64 = 0x1d;
pub const DW_FORM_data16: u64 = 0x1e;
pub const DW_FORM_line_strp: u64 = 0x1f;
pub const DW_FORM_ref_sig8: u64 = 0x20;
pub const DW_FORM_implicit_const: u64 = 0x21;
pub const DW_FORM_loclistx: u64 = 0x22;
pub const DW_FORM_rnglistx: u64 = 0x23;
pub const DW_FORM_ref_sup8: u64 = 0x24;
pub const DW_FORM_strx1: u64 = 0x25;
pub const DW_FORM_strx2: u64 = 0x26;
pub const DW_FORM_strx3: u64 = 0x27;
pub const DW_FORM_strx4: u64 = 0x28;
pub const DW_FORM_addrx1: u64 = 0x29;
pub const DW_FORM_addrx2: u64 = 0x2a;
pub const DW_FORM_addrx3: u64 = 0x2b;
pub const DW_FORM_addrx4: u64 = 0x2c;

// Base type encodings.
pub const DW_ATE_address: u64 = 0x01;
pub const DW_ATE_boolean: u64 = 0x02;
pub const DW_ATE_complex_float: u64 = 0x03;
pub const DW_ATE_float: u64 = 0x04;
pub const DW_ATE_signed: u64 = 0x05;
pub const DW_ATE_signed_char: u64 = 0x06;
pub const DW_ATE_unsigned: u64 = 0x07;
pub const DW_ATE_unsigned_char: u64 = 0x08;
pub const DW_ATE_imaginary_float: u64 = 0x09;
pub const DW_ATE_packed_decimal: u64 = 0x0a;
pub const DW_ATE_numeric_string: u64 = 0x0b;
pub const DW_ATE_edited: u64 = 0x0c;
pub const DW_ATE_signed_fixed: u64 = 0x0d;
pub const DW_ATE_unsigned_fixed: u64 = 0x0e;
pub const DW_ATE_decimal_float: u64 = 0x0f;
pub const DW_ATE_UTF: u64 = 0x10;
pub const DW_ATE_UCS: u64 = 0x11;
pub const DW_ATE_ASCII: u64 = 0x12;

// Range list entry kinds.
pub const DW_RLE_end_of_list: u8 = 0x00;
pub const DW_RLE_base_addressx: u8 = 0x01;
pub const DW_RLE_startx_endx: u8 = 0x02;
pub const DW_RLE_startx_length: u8 = 0x03;
pub const DW_RLE_offset_pair: u8 = 0x04;
pub const DW_RLE_base_address: u8 = 0x05;
pub const DW_RLE_start_end: u8 = 0x06;
pub const DW_RLE_start_length: u8 = 0x07;

// Source languages accepted as C.
pub const DW_LANG_C89: u64 = 0x01;
pub const DW_LANG_C: u64 = 0x02;
pub const DW_LANG_C99: u64 = 0x0c;
pub const DW_LANG_C11: u64 = 0x1d;
pub const DW_LANG_C17: u64 = 0x2c;

/// Whether a CU language code is a C dialect the engine understands.
#[must_use]
pub const fn is_c_language(lang: u64) -> bool {
    matches!(
        lang,
        DW_LANG_C89 | DW_LANG_C | DW_LANG_C99 | DW_LANG_C11 | DW_LANG_C17
    )
}
