//! Compile-time configuration.

/// Spaces of indentation per nesting level.
pub const INDENT_WIDTH: usize = 4;

/// Maximum nesting depth; records and pointer chains beyond it print `{...}`
/// or a bare address.
pub const MAX_DEPTH: usize = 10;

/// Render `FILE*` fields as `<ignored>` instead of chasing libc internals.
pub const IGNORE_STDIO_FILE: bool = true;

/// Runs of byte-equal consecutive array elements at least this long collapse
/// to `value <repeats K times>`.
pub const ARRAY_COMPRESSION_THRESHOLD: usize = 4;

/// Longest C string scanned before truncating with a `...` suffix.
pub const MAX_STRING_LENGTH: usize = 200;
