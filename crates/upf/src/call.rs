//! Per-call orchestration: argument splitting, PC base discovery and the
//! format-string walk.

use std::ffi::c_void;
use std::io::Write as _;

use upf_dwarf::Dwarf;
use upf_elf::RangeProvider;

use crate::error::{Error, Result};
use crate::{PcBase, parse, print, resolve, tokenize};

/// The engine: parsed debug info plus the per-call state.
///
/// The global entry points wrap one process-wide instance; tests build their
/// own from synthetic sections.
pub struct Engine<'a> {
    dwarf: Dwarf<'a>,
    load_base: u64,
    pc_base: Option<PcBase>,
    buffer: String,
}

impl<'a> Engine<'a> {
    #[must_use]
    pub const fn new(dwarf: Dwarf<'a>, load_base: u64) -> Self {
        Self {
            dwarf,
            load_base,
            pc_base: None,
            buffer: String::new(),
        }
    }

    /// Format once and return the produced text.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error of the call; nothing is emitted then.
    ///
    /// # Safety
    ///
    /// Every pointer in `pointers` must point at a live object of the type
    /// its paired argument expression has at the call site.
    pub unsafe fn render<R: RangeProvider>(
        &mut self,
        provider: &mut R,
        pc: u64,
        format: &str,
        args: &str,
        pointers: &[*const c_void],
    ) -> Result<String> {
        self.render_into(provider, pc, format, args, pointers)?;
        Ok(self.buffer.clone())
    }

    /// Format once and flush the result to stdout.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error of the call; no partial output is
    /// written then.
    ///
    /// # Safety
    ///
    /// See [`Engine::render`].
    pub unsafe fn call<R: RangeProvider>(
        &mut self,
        provider: &mut R,
        pc: u64,
        format: &str,
        args: &str,
        pointers: &[*const c_void],
    ) -> Result<()> {
        self.render_into(provider, pc, format, args, pointers)?;
        let stdout = std::io::stdout();
        let mut lock = stdout.lock();
        lock.write_all(self.buffer.as_bytes())?;
        lock.flush()?;
        Ok(())
    }

    fn render_into<R: RangeProvider>(
        &mut self,
        provider: &mut R,
        pc: u64,
        format: &str,
        args: &str,
        pointers: &[*const c_void],
    ) -> Result<()> {
        self.buffer.clear();
        let ranges = provider.readable_ranges()?;

        let pc_base = match self.pc_base {
            Some(base) => base,
            None => {
                // PIE binaries observe absolute PCs, non-PIE observe
                // DWARF-relative ones; the engine's own recorded range
                // tells the two apart on the first call.
                let base = if self
                    .dwarf
                    .engine_ranges()
                    .iter()
                    .any(|range| range.contains(pc))
                {
                    PcBase::Absolute
                } else {
                    PcBase::Relative(self.load_base)
                };
                tracing::debug!(?base, "derived call-site PC base");
                self.pc_base = Some(base);
                base
            }
        };
        // Step back into the call instruction itself.
        let dwarf_pc = pc_base.to_dwarf(pc).wrapping_sub(1);

        let arg_sources = split_arguments(args);
        let mut index = 0_usize;

        let mut chars = format.chars();
        while let Some(ch) = chars.next() {
            if ch != '%' {
                self.buffer.push(ch);
                continue;
            }
            match chars.next() {
                Some('%') => self.buffer.push('%'),
                Some('S') => {
                    if index >= arg_sources.len() || index >= pointers.len() {
                        return Err(Error::TooFewArguments);
                    }
                    let source = arg_sources[index];
                    let tokens = tokenize::tokenize(source)?;
                    let parsed = parse::parse_argument(&tokens, source)?;
                    let ty = resolve::resolve_argument(&mut self.dwarf, dwarf_pc, &parsed)?;
                    print::render_value(
                        &mut self.buffer,
                        &self.dwarf,
                        &ranges,
                        pc_base,
                        pointers[index],
                        ty,
                    );
                    index += 1;
                }
                Some('\n') | None => return Err(Error::UnfinishedSpecifier),
                Some(other) => return Err(Error::UnknownSpecifier(other)),
            }
        }

        if index != arg_sources.len() || index != pointers.len() {
            return Err(Error::TooManyArguments);
        }
        Ok(())
    }
}

/// Split the stringified argument list on top-level commas, respecting
/// parentheses, brackets and string/char literals.
pub(crate) fn split_arguments(args: &str) -> Vec<&str> {
    if args.trim().is_empty() {
        return Vec::new();
    }

    let bytes = args.as_bytes();
    let mut parts = Vec::new();
    let mut start = 0_usize;
    let mut depth = 0_i32;
    let mut quote: Option<u8> = None;
    let mut i = 0_usize;

    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == b'\\' {
                i += 2;
                continue;
            }
            if b == q {
                quote = None;
            }
        } else {
            match b {
                b'"' | b'\'' => quote = Some(b),
                b'(' | b'[' | b'{' => depth += 1,
                b')' | b']' | b'}' => depth -= 1,
                b',' if depth == 0 => {
                    parts.push(args[start..i].trim());
                    start = i + 1;
                }
                _ => {}
            }
        }
        i += 1;
    }
    parts.push(args[start..].trim());
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_plain() {
        assert_eq!(split_arguments("&a, &b"), vec!["&a", "&b"]);
    }

    #[test]
    fn test_split_respects_parens_and_brackets() {
        assert_eq!(
            split_arguments("f(a, b), arr[idx(1, 2)], &c"),
            vec!["f(a, b)", "arr[idx(1, 2)]", "&c"]
        );
    }

    #[test]
    fn test_split_respects_strings() {
        assert_eq!(
            split_arguments(r#"(char*)"a, b", &x"#),
            vec![r#"(char*)"a, b""#, "&x"]
        );
        assert_eq!(split_arguments("arr[','], &x"), vec!["arr[',']", "&x"]);
    }

    #[test]
    fn test_split_empty() {
        assert!(split_arguments("").is_empty());
        assert!(split_arguments("   ").is_empty());
    }
}
