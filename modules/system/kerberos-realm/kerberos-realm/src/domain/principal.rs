//! Principal name normalization shared by negotiation and role mapping.

/// Drop everything from the first `@` onwards.
///
/// A name starting with `@` is returned unchanged so the result is never empty.
#[must_use]
pub fn strip_realm(name: &str, strip: bool) -> &str {
    if !strip {
        return name;
    }
    match name.find('@') {
        Some(i) if i > 0 => &name[..i],
        _ => name,
    }
}
