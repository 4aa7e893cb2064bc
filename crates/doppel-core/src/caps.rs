//! Process-wide runtime capability flags

use once_cell::sync::OnceCell;

static KEYWORD_ARGUMENTS: OnceCell<bool> = OnceCell::new();

/// Whether the host runtime carries keyword arguments as a channel separate
/// from positional arguments.
///
/// Resolved once per process: the first read fixes the value for the
/// lifetime of the process, and every interception hook generated afterward
/// uses the matching forwarding shape. Defaults to supported when no
/// declaration was made.
pub fn keyword_arguments_supported() -> bool {
    *KEYWORD_ARGUMENTS.get_or_init(|| true)
}

/// Declare the keyword-argument capability for this process.
///
/// Must be called before any hook is generated; the first declaration (or
/// first read) wins. Returns whether this call fixed the flag.
pub fn declare_keyword_arguments(supported: bool) -> bool {
    KEYWORD_ARGUMENTS.set(supported).is_ok()
}
