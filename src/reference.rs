//! Column letters and `A1` cell references
//!
//! Columns are bijective base-26 numbers written with the letters `A`..`Z`:
//! `A` is column 0, `Z` is 25, `AA` is 26.

/// Convert a 0-based column index to its letters (`0` -> `A`, `27` -> `AB`)
pub fn column_name(col: u32) -> String {
    let mut letters = Vec::with_capacity(3);
    let mut n = col as u64 + 1;
    while n > 0 {
        let rem = ((n - 1) % 26) as u8;
        letters.push(b'A' + rem);
        n = (n - 1) / 26;
    }
    letters.reverse();
    // Only ASCII letters were pushed
    letters.into_iter().map(char::from).collect()
}

/// Convert column letters to a 0-based index, case-insensitive.
///
/// Returns `None` for an empty name, a non-letter, or an index beyond `u32`.
pub fn column_index(name: &str) -> Option<u32> {
    if name.is_empty() {
        return None;
    }
    let mut value: u64 = 0;
    for b in name.bytes() {
        let digit = match b {
            b'A'..=b'Z' => b - b'A',
            b'a'..=b'z' => b - b'a',
            _ => return None,
        };
        value = value * 26 + digit as u64 + 1;
        if value > u32::MAX as u64 + 1 {
            return None;
        }
    }
    u32::try_from(value - 1).ok()
}

/// Build an `A1` reference from 0-based row and column
pub fn cell_reference(row: u32, col: u32) -> String {
    let mut s = column_name(col);
    let mut buf = itoa::Buffer::new();
    s.push_str(buf.format(row as u64 + 1));
    s
}

/// Split an `A1` reference into 0-based `(row, col)`.
///
/// A reference without digits (`"C"`) yields the column only, as some
/// producers omit the row on cells.
pub fn parse_cell_reference(reference: &str) -> Option<(Option<u32>, u32)> {
    let split = reference
        .find(|c: char| c.is_ascii_digit())
        .unwrap_or(reference.len());
    let (letters, digits) = reference.split_at(split);
    let col = column_index(letters.trim_start_matches('$'))?;
    if digits.is_empty() {
        return Some((None, col));
    }
    let row: u32 = digits.parse().ok()?;
    if row == 0 {
        return None;
    }
    Some((Some(row - 1), col))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_name() {
        assert_eq!(column_name(0), "A");
        assert_eq!(column_name(25), "Z");
        assert_eq!(column_name(26), "AA");
        assert_eq!(column_name(27), "AB");
        assert_eq!(column_name(701), "ZZ");
        assert_eq!(column_name(702), "AAA");
        assert_eq!(column_name(16383), "XFD");
    }

    #[test]
    fn test_column_index() {
        assert_eq!(column_index("A"), Some(0));
        assert_eq!(column_index("z"), Some(25));
        assert_eq!(column_index("AA"), Some(26));
        assert_eq!(column_index("XFD"), Some(16383));
        assert_eq!(column_index(""), None);
        assert_eq!(column_index("A1"), None);
    }

    #[test]
    fn test_column_conversion_is_bijective() {
        for col in (0..20_000).step_by(7) {
            assert_eq!(column_index(&column_name(col)), Some(col));
        }
    }

    #[test]
    fn test_cell_reference() {
        assert_eq!(cell_reference(0, 0), "A1");
        assert_eq!(cell_reference(9, 27), "AB10");
        assert_eq!(parse_cell_reference("AB10"), Some((Some(9), 27)));
        assert_eq!(parse_cell_reference("C"), Some((None, 2)));
        assert_eq!(parse_cell_reference("A0"), None);
        assert_eq!(parse_cell_reference("1"), None);
    }
}
