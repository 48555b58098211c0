//! Readable address ranges of the current process.
//!
//! `/proc/self/maps` is re-read on every call so that ranges mapped after
//! startup (heap growth, new mappings) are visible to the printer.

use std::fs;

use crate::{AddressRange, ElfError, Result};

/// Source of the readable address ranges used to bound pointer dereferences.
pub trait RangeProvider {
    /// Every `[start, end)` range the process may currently read.
    ///
    /// # Errors
    ///
    /// Returns an error if the address space cannot be inspected.
    fn readable_ranges(&mut self) -> Result<Vec<AddressRange>>;
}

/// [`RangeProvider`] backed by `/proc/self/maps`.
#[derive(Debug, Default)]
pub struct ProcMaps;

impl RangeProvider for ProcMaps {
    fn readable_ranges(&mut self) -> Result<Vec<AddressRange>> {
        let content = fs::read_to_string("/proc/self/maps")?;
        parse_readable_ranges(&content)
    }
}

/// Parse maps content into the readable ranges.
///
/// Each line starts with `start-end` in hexadecimal followed by the
/// permission flags; only `r` mappings are kept.
///
/// # Errors
///
/// Returns [`ElfError::BadMapsFormat`] if a line does not match the format.
pub fn parse_readable_ranges(content: &str) -> Result<Vec<AddressRange>> {
    let mut ranges = Vec::new();
    for line in content.lines() {
        let (range, perms) = parse_line(line)?;
        if perms.starts_with('r') {
            ranges.push(range);
        }
    }
    Ok(ranges)
}

/// Find the load address of the executable at `exe_path` in maps content.
///
/// The executable's line is identified by its pathname field; the load base
/// is the start of its lowest mapping.
#[must_use]
pub fn find_load_base(content: &str, exe_path: &str) -> Option<u64> {
    content
        .lines()
        .filter(|line| line_path(line) == Some(exe_path))
        .filter_map(|line| parse_line(line).ok())
        .map(|(range, _)| range.start)
        .min()
}

/// Load address of the running executable.
///
/// # Errors
///
/// Returns an error if `/proc/self/exe` cannot be resolved or the executable
/// has no mapping in `/proc/self/maps`.
pub fn self_load_base() -> Result<u64> {
    let exe = nix::fcntl::readlink("/proc/self/exe").map_err(ElfError::Sys)?;
    let exe = exe.to_string_lossy();
    let content = fs::read_to_string("/proc/self/maps")?;
    find_load_base(&content, &exe).ok_or(ElfError::NoLoadBase)
}

fn parse_line(line: &str) -> Result<(AddressRange, &str)> {
    let mut fields = line.split_whitespace();
    let range = fields.next().ok_or(ElfError::BadMapsFormat)?;
    let perms = fields.next().ok_or(ElfError::BadMapsFormat)?;

    let (start, end) = range.split_once('-').ok_or(ElfError::BadMapsFormat)?;
    let start = u64::from_str_radix(start, 16).map_err(|_| ElfError::BadMapsFormat)?;
    let end = u64::from_str_radix(end, 16).map_err(|_| ElfError::BadMapsFormat)?;

    Ok((AddressRange::new(start, end), perms))
}

/// The pathname field of a maps line, if any.
fn line_path(line: &str) -> Option<&str> {
    let mut fields = line.split_whitespace();
    // range perms offset dev inode
    for _ in 0..5 {
        fields.next()?;
    }
    let path = fields.next()?;
    Some(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAPS: &str = "\
55c000000000-55c000001000 r--p 00000000 103:02 393219 /usr/bin/demo
55c000001000-55c000005000 r-xp 00001000 103:02 393219 /usr/bin/demo
7f0000000000-7f0000002000 rw-p 00000000 00:00 0      [heap]
7f0000002000-7f0000003000 ---p 00000000 00:00 0
ffffffffff600000-ffffffffff601000 --xp 00000000 00:00 0 [vsyscall]
";

    #[test]
    fn test_readable_ranges_filters_permissions() {
        let ranges = parse_readable_ranges(MAPS).unwrap();
        assert_eq!(
            ranges,
            vec![
                AddressRange::new(0x55c0_0000_0000, 0x55c0_0000_1000),
                AddressRange::new(0x55c0_0000_1000, 0x55c0_0000_5000),
                AddressRange::new(0x7f00_0000_0000, 0x7f00_0000_2000),
            ]
        );
    }

    #[test]
    fn test_load_base_is_lowest_mapping() {
        assert_eq!(
            find_load_base(MAPS, "/usr/bin/demo"),
            Some(0x55c0_0000_0000)
        );
        assert_eq!(find_load_base(MAPS, "/usr/bin/other"), None);
    }

    #[test]
    fn test_bad_format() {
        assert!(matches!(
            parse_readable_ranges("not a maps line\n"),
            Err(ElfError::BadMapsFormat)
        ));
    }

    #[test]
    fn test_range_contains() {
        let range = AddressRange::new(0x1000, 0x2000);
        assert!(range.contains(0x1000));
        assert!(range.contains(0x1FFF));
        assert!(!range.contains(0x2000));
        assert!(!range.contains(0xFFF));
    }

    #[test]
    fn test_proc_maps_on_this_process() {
        // Smoke test against the real procfs.
        let ranges = ProcMaps.readable_ranges().unwrap();
        assert!(!ranges.is_empty());
    }
}
