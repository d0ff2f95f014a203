use xxhash_rust::xxh64::xxh64;

const BASE62_CHARS: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Encode a u64 value as a base62 string (11 chars, zero-padded).
fn base62_encode(mut value: u64) -> String {
    let mut result = Vec::with_capacity(11);
    while value > 0 {
        result.push(BASE62_CHARS[(value % 62) as usize] as char);
        value /= 62;
    }
    while result.len() < 11 {
        result.push('0');
    }
    result.iter().rev().collect()
}

/// xxhash64 of raw file content, used as the extraction cache key.
pub fn content_hash(content: &str) -> u64 {
    xxh64(content.as_bytes(), 0)
}

/// Stable id for a finding.
///
/// id = base62(xxhash64(kind \0 event \0 property_path \0 file \0 detail))
///
/// `detail` disambiguates findings that otherwise share a location, e.g. the
/// producer function a missing property was traced through.
pub fn finding_id(kind: &str, event_id: &str, property_path: &str, file: &str, detail: &str) -> String {
    let mut input = String::with_capacity(
        kind.len() + event_id.len() + property_path.len() + file.len() + detail.len() + 4,
    );
    for (i, part) in [kind, event_id, property_path, file, detail].iter().enumerate() {
        if i > 0 {
            input.push('\0');
        }
        input.push_str(part);
    }
    base62_encode(xxh64(input.as_bytes(), 0))
}
