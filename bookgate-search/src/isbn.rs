//! ISBN cleaning, checksum validation and ISBN-10 ⇄ ISBN-13 conversion.
//!
//! ISBN-13s are the canonical form: cache keys for the `isbn` context use the
//! ISBN-13 so both printed forms of the same edition share one entry.

/// Strip everything except digits and `X`, uppercasing `x`.
pub fn clean(raw: &str) -> String {
    raw.chars()
        .filter_map(|c| match c {
            '0'..='9' => Some(c),
            'x' | 'X' => Some('X'),
            _ => None,
        })
        .collect()
}

/// Whether `raw` could plausibly be an ISBN: only digits, hyphens, spaces
/// and a trailing check character, with 10 or 13 significant characters.
pub fn looks_like_isbn(raw: &str) -> bool {
    let trimmed = raw.trim();
    let mut trimmed = trimmed.strip_prefix("ISBN").unwrap_or(trimmed);
    trimmed = trimmed.trim_start_matches([':', ' ']);
    if !trimmed
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '-' | ' ' | 'x' | 'X'))
    {
        return false;
    }
    matches!(clean(trimmed).len(), 10 | 13)
}

/// Validate an already-cleaned ISBN-10.
pub fn is_valid_isbn10(isbn: &str) -> bool {
    let bytes = isbn.as_bytes();
    if bytes.len() != 10 {
        return false;
    }
    let mut sum = 0u32;
    for (i, b) in bytes.iter().enumerate() {
        let value = match b {
            b'0'..=b'9' => u32::from(b - b'0'),
            b'X' if i == 9 => 10,
            _ => return false,
        };
        sum += value * (10 - i as u32);
    }
    sum % 11 == 0
}

/// Validate an already-cleaned ISBN-13.
pub fn is_valid_isbn13(isbn: &str) -> bool {
    let bytes = isbn.as_bytes();
    if bytes.len() != 13 || !bytes.iter().all(u8::is_ascii_digit) {
        return false;
    }
    let sum: u32 = bytes
        .iter()
        .enumerate()
        .map(|(i, b)| u32::from(b - b'0') * if i % 2 == 0 { 1 } else { 3 })
        .sum();
    sum % 10 == 0
}

/// Convert a valid ISBN-10 to its ISBN-13 (978 prefix).
pub fn isbn10_to_isbn13(isbn10: &str) -> Option<String> {
    let cleaned = clean(isbn10);
    if !is_valid_isbn10(&cleaned) {
        return None;
    }
    let mut body = format!("978{}", &cleaned[..9]);
    let sum: u32 = body
        .bytes()
        .enumerate()
        .map(|(i, b)| u32::from(b - b'0') * if i % 2 == 0 { 1 } else { 3 })
        .sum();
    let check = (10 - sum % 10) % 10;
    body.push(char::from(b'0' + check as u8));
    Some(body)
}

/// Convert a valid 978-prefixed ISBN-13 to ISBN-10.
///
/// 979-prefixed ISBN-13s have no ISBN-10 form and return `None`.
pub fn isbn13_to_isbn10(isbn13: &str) -> Option<String> {
    let cleaned = clean(isbn13);
    if !is_valid_isbn13(&cleaned) || !cleaned.starts_with("978") {
        return None;
    }
    let mut body = cleaned[3..12].to_string();
    let sum: u32 = body
        .bytes()
        .enumerate()
        .map(|(i, b)| u32::from(b - b'0') * (10 - i as u32))
        .sum();
    match (11 - sum % 11) % 11 {
        10 => body.push('X'),
        check => body.push(char::from(b'0' + check as u8)),
    }
    Some(body)
}

/// Canonical ISBN-13 for any valid ISBN form, or `None`.
pub fn canonical_isbn13(raw: &str) -> Option<String> {
    let cleaned = clean(raw);
    match cleaned.len() {
        13 if is_valid_isbn13(&cleaned) => Some(cleaned),
        10 => isbn10_to_isbn13(&cleaned),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_strips_hyphens_and_spaces() {
        assert_eq!(clean("0-441-17271-7"), "0441172717");
        assert_eq!(clean(" 978 0441 172719 "), "9780441172719");
        assert_eq!(clean("0-8044-2957-x"), "080442957X");
    }

    #[test]
    fn validates_isbn10_checksums() {
        assert!(is_valid_isbn10("0441172717"));
        assert!(is_valid_isbn10("080442957X"));
        assert!(!is_valid_isbn10("0441172718"));
        assert!(!is_valid_isbn10("X441172717"));
        assert!(!is_valid_isbn10("044117271"));
    }

    #[test]
    fn validates_isbn13_checksums() {
        assert!(is_valid_isbn13("9780441172719"));
        assert!(!is_valid_isbn13("9780441172710"));
        assert!(!is_valid_isbn13("978044117271X"));
    }

    #[test]
    fn converts_isbn10_to_isbn13() {
        assert_eq!(isbn10_to_isbn13("0441172717").as_deref(), Some("9780441172719"));
        assert_eq!(isbn10_to_isbn13("0-8044-2957-X").as_deref(), Some("9780804429573"));
        assert!(isbn10_to_isbn13("0441172718").is_none());
    }

    #[test]
    fn converts_isbn13_to_isbn10() {
        assert_eq!(isbn13_to_isbn10("9780441172719").as_deref(), Some("0441172717"));
        assert_eq!(isbn13_to_isbn10("9780804429573").as_deref(), Some("080442957X"));
    }

    #[test]
    fn isbn979_has_no_isbn10() {
        // 979-10-90636-07-1 is a valid French ISBN-13.
        assert!(is_valid_isbn13("9791090636071"));
        assert!(isbn13_to_isbn10("9791090636071").is_none());
    }

    #[test]
    fn canonical_form_is_shared_by_both_printings() {
        assert_eq!(canonical_isbn13("0-441-17271-7"), canonical_isbn13("978-0-441-17271-9"));
        assert!(canonical_isbn13("not an isbn").is_none());
    }

    #[test]
    fn looks_like_isbn_accepts_common_printings() {
        assert!(looks_like_isbn("978-0-441-17271-9"));
        assert!(looks_like_isbn("0441172717"));
        assert!(looks_like_isbn("ISBN: 0-8044-2957-X"));
        assert!(!looks_like_isbn("dune 1965"));
        assert!(!looks_like_isbn("12345"));
    }
}
