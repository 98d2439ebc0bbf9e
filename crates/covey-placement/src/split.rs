//! File splitting into near-equal parts.

/// Split `data` into exactly `count` parts.
///
/// Parts differ in size by at most one byte, with the remainder spread
/// over the leading parts. Concatenating the parts in order yields the
/// original data. `count` must be at least 1.
pub fn split_into(data: &[u8], count: usize) -> Vec<Vec<u8>> {
    assert!(count > 0, "part count must be at least 1");

    let base = data.len() / count;
    let remainder = data.len() % count;

    let mut parts = Vec::with_capacity(count);
    let mut offset = 0;
    for i in 0..count {
        let size = base + usize::from(i < remainder);
        parts.push(data[offset..offset + size].to_vec());
        offset += size;
    }
    parts
}
