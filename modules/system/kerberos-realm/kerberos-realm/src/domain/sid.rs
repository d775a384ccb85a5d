//! Windows security identifier rendering.

/// Render a binary `objectSid` as `S-<revision>-<authority>-<sub>...`.
///
/// Layout: revision byte, sub-authority count byte, 48-bit big-endian
/// identifier authority, then `count` little-endian 32-bit sub-authorities.
/// Returns `None` if the buffer is shorter than its header claims.
#[must_use]
pub fn decode_sid(bytes: &[u8]) -> Option<String> {
    let (&revision, rest) = bytes.split_first()?;
    let (&count, rest) = rest.split_first()?;
    let (authority_bytes, mut rest) = rest.split_at_checked(6)?;

    let authority = authority_bytes
        .iter()
        .fold(0_u64, |acc, &b| (acc << 8) | u64::from(b));

    let mut parts = vec![format!("S-{revision}-{authority}")];
    for _ in 0..count {
        let (sub, tail) = rest.split_first_chunk::<4>()?;
        parts.push(u32::from_le_bytes(*sub).to_string());
        rest = tail;
    }
    Some(parts.join("-"))
}
