//! Runtime pretty-printing of C values through the executable's own DWARF.
//!
//! The `%S` specifier takes a pointer to any C value and renders it as a
//! structured dump: struct fields with typed values, enum tags, arrays with
//! run-length compression, bit-fields, function signatures, C strings, and
//! cyclic pointer graphs with stable back-references. Types are never
//! supplied by the caller; they are recovered from the DWARF v5 debug
//! information of `/proc/self/exe` and the source text of the argument
//! expressions captured at the call site.
//!
//! Only 64-bit little-endian x86-64 Linux executables with DWARF v5 are
//! supported, and only compile units written in C are consulted.

mod call;
pub mod config;
mod error;
mod parse;
mod print;
mod resolve;
mod tokenize;

pub use call::Engine;
pub use error::{Error, Result};

use std::ffi::c_void;
use std::sync::OnceLock;

use parking_lot::Mutex;
use upf_dwarf::Dwarf;
use upf_elf::{ExecutableImage, ProcMaps};

/// Name under which the engine's entry subprogram appears in the debug
/// info; its PC range drives the absolute-vs-relative decision.
pub const ENTRY_SYMBOL: &str = "upf_uprintf";

/// How observed call-site PCs map onto DWARF addresses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PcBase {
    /// Observed PCs are DWARF addresses already (non-PIE).
    Absolute,
    /// Observed PCs carry the load base (PIE); subtract it.
    Relative(u64),
}

impl PcBase {
    #[must_use]
    pub const fn to_dwarf(self, pc: u64) -> u64 {
        match self {
            Self::Absolute => pc,
            Self::Relative(base) => pc.wrapping_sub(base),
        }
    }
}

static IMAGE: OnceLock<ExecutableImage> = OnceLock::new();
static ENGINE: OnceLock<std::result::Result<Mutex<Engine<'static>>, String>> = OnceLock::new();

fn build_engine() -> Result<Mutex<Engine<'static>>> {
    let image = match IMAGE.get() {
        Some(image) => image,
        None => {
            let opened = ExecutableImage::open_self()?;
            IMAGE.get_or_init(|| opened)
        }
    };
    let sections = image.debug_sections()?;
    let dwarf = Dwarf::parse(sections, ENTRY_SYMBOL)?;
    let load_base = upf_elf::self_load_base()?;
    Ok(Mutex::new(Engine::new(dwarf, load_base)))
}

fn global_engine() -> Result<&'static Mutex<Engine<'static>>> {
    match ENGINE.get_or_init(|| build_engine().map_err(|error| error.to_string())) {
        Ok(engine) => Ok(engine),
        Err(message) => Err(Error::Init(message.clone())),
    }
}

/// Map the executable and parse its debug info now instead of on the first
/// print call.
///
/// # Errors
///
/// Returns an error if the executable cannot be mapped or its debug info is
/// missing or unsupported. The failure is remembered; later calls report it
/// instead of retrying.
pub fn init() -> Result<()> {
    global_engine().map(|_| ())
}

/// The engine entry point: format `format` at call-site `pc`.
///
/// `args` is the stringified comma-separated argument list matching
/// `pointers` in order; `file` and `line` locate the call site in
/// diagnostics. Fatal errors are reported on stderr and the call becomes a
/// no-op; the process continues.
///
/// # Safety
///
/// Every pointer in `pointers` must point at a live object of the type its
/// paired argument expression has at the call site.
pub unsafe fn uprintf_at(
    pc: u64,
    file: &str,
    line: u32,
    format: &str,
    args: &str,
    pointers: &[*const c_void],
) {
    let outcome = global_engine().and_then(|engine| unsafe {
        engine.lock().call(&mut ProcMaps, pc, format, args, pointers)
    });
    if let Err(error) = outcome {
        eprintln!("[upf] {file}:{line}: {error}");
    }
}

/// The current program counter, captured in the caller's frame.
///
/// Inlined at the call site, so the value lies inside the calling
/// function's scope.
#[inline(always)]
#[must_use]
pub fn caller_pc() -> u64 {
    #[cfg(target_arch = "x86_64")]
    {
        let pc: u64;
        unsafe {
            core::arch::asm!("lea {}, [rip]", out(reg) pc, options(nomem, nostack));
        }
        pc
    }
    #[cfg(not(target_arch = "x86_64"))]
    {
        0
    }
}

/// Print values whose types are recovered from debug info.
///
/// Mirrors the C-side `uprintf` macro: stringifies the arguments and
/// forwards them with the captured call-site PC. Each argument must be a
/// pointer to the value to print.
#[macro_export]
macro_rules! uprintf {
    ($fmt:expr $(, $arg:expr)* $(,)?) => {{
        let pointers: &[*const ::core::ffi::c_void] = &[$({
            let pointer: *const _ = $arg;
            pointer.cast::<::core::ffi::c_void>()
        }),*];
        unsafe {
            $crate::uprintf_at(
                $crate::caller_pc(),
                file!(),
                line!(),
                $fmt,
                stringify!($($arg),*),
                pointers,
            );
        }
    }};
}
