//! Name mangling.
//!
//! Maps a logical name to the link-time name the target's object format
//! expects. The compile layer names its symbols with [`mangle`] and every
//! lookup goes through the same function, so the two can never disagree.

use crate::layout::DataLayout;

/// Returns true for non-empty ASCII identifiers (`[A-Za-z_.$][A-Za-z0-9_.$]*`).
pub fn is_valid_symbol_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || matches!(c, '_' | '.' | '$') => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '$'))
}

/// Mangles `name` according to `layout`.
///
/// # Examples
///
/// ```
/// use jitforge_core::{mangle, DataLayout, Endianness, ManglingMode};
///
/// let elf = DataLayout::new(Endianness::Little, 64, ManglingMode::Elf);
/// let macho = DataLayout::new(Endianness::Little, 64, ManglingMode::MachO);
/// assert_eq!(mangle("add_one", &elf), "add_one");
/// assert_eq!(mangle("add_one", &macho), "_add_one");
/// ```
pub fn mangle(name: &str, layout: &DataLayout) -> String {
    match layout.mangling().global_prefix() {
        Some(prefix) => {
            let mut mangled = String::with_capacity(name.len() + 1);
            mangled.push(prefix);
            mangled.push_str(name);
            mangled
        }
        None => name.to_string(),
    }
}

/// Inverse of [`mangle`]: strips the global prefix, if `layout` has one.
///
/// Returns `None` when `mangled` lacks the prefix the layout requires.
pub fn demangle<'a>(mangled: &'a str, layout: &DataLayout) -> Option<&'a str> {
    match layout.mangling().global_prefix() {
        Some(prefix) => mangled.strip_prefix(prefix),
        None => Some(mangled),
    }
}

#[cfg(test)]
mod tests;
