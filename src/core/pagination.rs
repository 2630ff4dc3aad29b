//! Pagination cursor
//!
//! A next token is the decimal offset of the first item of the next page in
//! the filtered, ordered collection. Offsets are clamped to the collection;
//! tokens that are not integers restart from zero.

use std::num::IntErrorKind;

/// One page of a filtered collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_token: Option<String>,
}

/// Offset encoded by a token, clamped to `[0, len]`; absent or non-integer
/// tokens mean 0
pub fn parse_token(token: Option<&str>, len: usize) -> usize {
    let Some(token) = token.map(str::trim).filter(|t| !t.is_empty()) else {
        return 0;
    };
    match token.parse::<i64>() {
        Ok(offset) if offset > 0 => usize::try_from(offset).unwrap_or(usize::MAX).min(len),
        Ok(_) => 0,
        Err(e) if *e.kind() == IntErrorKind::PosOverflow => len,
        Err(_) => 0,
    }
}

/// Slice one page out of `filtered`
pub fn page<T: Clone>(filtered: &[T], token: Option<&str>, max_results: usize) -> Page<T> {
    let len = filtered.len();
    let start = parse_token(token, len);
    let end = start.saturating_add(max_results.max(1));

    let items = filtered[start..end.min(len)].to_vec();
    let next_token = (end < len).then(|| end.to_string());

    Page { items, next_token }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_page() {
        let data: Vec<u32> = (0..25).collect();
        let p = page(&data, None, 10);
        assert_eq!(p.items, (0..10).collect::<Vec<_>>());
        assert_eq!(p.next_token.as_deref(), Some("10"));
    }

    #[test]
    fn test_last_page_has_no_token() {
        let data: Vec<u32> = (0..25).collect();
        let p = page(&data, Some("20"), 10);
        assert_eq!(p.items, vec![20, 21, 22, 23, 24]);
        assert!(p.next_token.is_none());
    }

    #[test]
    fn test_exact_fit_has_no_token() {
        let data: Vec<u32> = (0..10).collect();
        assert!(page(&data, None, 10).next_token.is_none());
    }

    #[test]
    fn test_malformed_tokens_restart() {
        let data: Vec<u32> = (0..5).collect();
        for token in ["not-a-number", "", "-3", "1.5"] {
            assert_eq!(page(&data, Some(token), 2), page(&data, None, 2));
        }
    }

    #[test]
    fn test_token_past_end_is_clamped() {
        let data: Vec<u32> = (0..5).collect();
        let p = page(&data, Some("99"), 2);
        assert!(p.items.is_empty());
        assert!(p.next_token.is_none());
    }

    #[test]
    fn test_overflowing_offsets_are_clamped() {
        let data: Vec<u32> = (0..5).collect();
        let p = page(&data, Some("99999999999999999999"), 2);
        assert!(p.items.is_empty());
        assert!(p.next_token.is_none());

        assert_eq!(page(&data, Some("-99999999999999999999"), 2), page(&data, None, 2));
        assert_eq!(parse_token(Some("+3"), 5), 3);
    }

    #[test]
    fn test_zero_page_size_still_advances() {
        let data: Vec<u32> = (0..3).collect();
        let p = page(&data, None, 0);
        assert_eq!(p.items, vec![0]);
        assert_eq!(p.next_token.as_deref(), Some("1"));
    }
}
