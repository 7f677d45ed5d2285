//! Reference-value conventions.
//!
//! A ref value is either a 40-character hex object id or a symbolic target
//! written as `ref: <name>`. Names and values are byte strings throughout;
//! the engine never assumes UTF-8.

/// Prefix marking a symbolic reference value.
pub const SYMREF_PREFIX: &[u8] = b"ref: ";

/// The 40-character hex form of the all-zero object id, conventionally
/// meaning "this ref should not exist".
pub const ZERO_REF: &[u8; 40] = b"0000000000000000000000000000000000000000";

/// If `value` is a symbolic reference, return its target name.
pub fn symbolic_target(value: &[u8]) -> Option<&[u8]> {
    value.strip_prefix(SYMREF_PREFIX)
}

/// Build the stored value for a symbolic reference to `target`.
pub fn format_symbolic(target: &[u8]) -> Vec<u8> {
    let mut value = Vec::with_capacity(SYMREF_PREFIX.len() + target.len());
    value.extend_from_slice(SYMREF_PREFIX);
    value.extend_from_slice(target);
    value
}

/// Check a ref name: `HEAD` or a slash-separated path under `refs/` with no
/// empty, dot-leading, or control-character components.
pub fn is_valid_ref_name(name: &[u8]) -> bool {
    if name == b"HEAD" {
        return true;
    }
    if !name.starts_with(b"refs/") {
        return false;
    }
    name.split(|&b| b == b'/').all(|component| {
        !component.is_empty()
            && !component.starts_with(b".")
            && !component.ends_with(b".lock")
            && component
                .iter()
                .all(|&b| b > 0x20 && b != 0x7f && !b"~^:?*[\\".contains(&b))
    })
}
