//! Record label ordering.
//!
//! Record types and record values are canonicalized by sorting their labels.
//! Numeric labels sort numerically and before alphabetic ones, so that a
//! tuple of arity `n` is exactly the record labelled `"1".."n"`.

use std::cmp::Ordering;

/// Parse a label as a tuple ordinal: a nonempty all-digit string with no
/// leading zero.
pub fn numeric_label(label: &str) -> Option<u32> {
    if label.is_empty() || (label.len() > 1 && label.starts_with('0')) {
        return None;
    }
    if !label.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    label.parse().ok()
}

/// Canonical label ordering: numeric labels first (numerically), then
/// alphabetic labels lexicographically.
pub fn compare_labels(a: &str, b: &str) -> Ordering {
    match (numeric_label(a), numeric_label(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

/// True if `labels` (already in canonical order) spell out a tuple: `"1".."n"`
/// with `n >= 2`.
pub fn are_tuple_labels<'a>(labels: impl ExactSizeIterator<Item = &'a str>) -> bool {
    let n = labels.len();
    n >= 2
        && labels
            .enumerate()
            .all(|(i, l)| numeric_label(l) == Some(i as u32 + 1))
}
