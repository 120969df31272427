//! Key sentinels and the reserved addressing-key layout.
//!
//! Keys are raw byte strings ordered lexicographically. The addressing index
//! lives inside the same keyspace under `KEY_META_PREFIX`:
//! - `KEY_META1_PREFIX + end_key` records address ranges made of meta2 records.
//! - `KEY_META2_PREFIX + end_key` records address ordinary ranges.
//!
//! The byte values below are part of the on-disk contract and must not change.

/// Lowest key in the keyspace.
pub const KEY_MIN: &[u8] = b"";
/// Highest key in the keyspace; end key of the last range.
pub const KEY_MAX: &[u8] = b"\xff\xff";

/// Prefix for system keys.
pub const KEY_SYSTEM_PREFIX: &[u8] = b"\x00";
/// Prefix for store-local keys that are never addressed through the index.
pub const KEY_LOCAL_PREFIX: &[u8] = b"\x00\x00\x00";

/// Start of the full addressing span (both levels).
pub const KEY_META_PREFIX: &[u8] = b"\x00meta";
/// Level-1 addressing prefix.
pub const KEY_META1_PREFIX: &[u8] = b"\x00meta1";
/// Level-2 addressing prefix.
pub const KEY_META2_PREFIX: &[u8] = b"\x00meta2";
/// End (exclusive) of the full addressing span.
pub const KEY_META_MAX: &[u8] = b"\x00meta3";

/// Concatenate key parts into one owned key.
pub fn make_key(parts: &[&[u8]]) -> Vec<u8> {
    let len = parts.iter().map(|p| p.len()).sum();
    let mut out = Vec::with_capacity(len);
    for part in parts {
        out.extend_from_slice(part);
    }
    out
}

/// Level-1 addressing key for `key`.
pub fn meta1_key(key: &[u8]) -> Vec<u8> {
    make_key(&[KEY_META1_PREFIX, key])
}

/// Level-2 addressing key for `key`.
pub fn meta2_key(key: &[u8]) -> Vec<u8> {
    make_key(&[KEY_META2_PREFIX, key])
}

/// The level-1 sentinel record key, addressing the tail of the meta2 index.
pub fn meta1_key_max() -> Vec<u8> {
    meta1_key(KEY_MAX)
}

/// Map a key to the addressing key one level up the hierarchy.
///
/// - `KEY_MIN` maps to itself.
/// - ordinary keys map into meta2, including system keys below the meta span
///   and keys at or above `KEY_META_MAX`.
/// - meta2 keys map into meta1 (the meta2 prefix is replaced).
/// - meta1 keys and the rest of the meta span map to `KEY_MIN`; there is
///   nothing above meta1.
pub fn range_meta_key(key: &[u8]) -> Vec<u8> {
    if key.is_empty() {
        return KEY_MIN.to_vec();
    }
    if let Some(suffix) = key.strip_prefix(KEY_META2_PREFIX) {
        return meta1_key(suffix);
    }
    if is_meta_key(key) {
        return KEY_MIN.to_vec();
    }
    meta2_key(key)
}

/// True when a range boundary may not sit at `key`.
///
/// Everything in `(KEY_MIN, KEY_META2_PREFIX)` (system keys, the local span and
/// meta1) belongs to the first range, which is reached through meta1. The tail
/// of meta2 from `meta2 + KEY_MAX` up to `KEY_META_MAX` belongs to the range
/// the meta1 sentinel names.
pub fn is_reserved_split_key(key: &[u8]) -> bool {
    if key.is_empty() {
        return false;
    }
    key < KEY_META2_PREFIX || (key >= meta2_key(KEY_MAX).as_slice() && key < KEY_META_MAX)
}

/// True for level-1 addressing keys.
pub fn is_meta1_key(key: &[u8]) -> bool {
    key.starts_with(KEY_META1_PREFIX)
}

/// True for level-2 addressing keys.
pub fn is_meta2_key(key: &[u8]) -> bool {
    key.starts_with(KEY_META2_PREFIX)
}

/// True when `key` lies in the full addressing span `[KEY_META_PREFIX, KEY_META_MAX)`.
pub fn is_meta_key(key: &[u8]) -> bool {
    key >= KEY_META_PREFIX && key < KEY_META_MAX
}

/// Smallest key strictly greater than `key`.
pub fn key_next(key: &[u8]) -> Vec<u8> {
    make_key(&[key, b"\x00"])
}

/// Check `key` against the end-exclusive span `[start, end)`.
pub fn key_in_range(key: &[u8], start: &[u8], end: &[u8]) -> bool {
    key >= start && key < end
}

/// Render a key for logs and error messages with non-printable bytes escaped.
pub fn fmt_key(key: &[u8]) -> String {
    if key == KEY_MAX {
        return "/Max".to_string();
    }
    if key.is_empty() {
        return "/Min".to_string();
    }
    key.escape_ascii().to_string()
}
