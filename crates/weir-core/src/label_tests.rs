use std::cmp::Ordering;

use super::label::{are_tuple_labels, compare_labels, numeric_label};

#[test]
fn numeric_labels_parse() {
    assert_eq!(numeric_label("1"), Some(1));
    assert_eq!(numeric_label("12"), Some(12));
    assert_eq!(numeric_label("0"), Some(0));
    assert_eq!(numeric_label("01"), None);
    assert_eq!(numeric_label(""), None);
    assert_eq!(numeric_label("x1"), None);
}

#[test]
fn numeric_before_alphabetic() {
    assert_eq!(compare_labels("2", "10"), Ordering::Less);
    assert_eq!(compare_labels("10", "2"), Ordering::Greater);
    assert_eq!(compare_labels("9", "a"), Ordering::Less);
    assert_eq!(compare_labels("a", "9"), Ordering::Greater);
    assert_eq!(compare_labels("abc", "abd"), Ordering::Less);
}

#[test]
fn tuple_label_detection() {
    assert!(are_tuple_labels(["1", "2"].into_iter()));
    assert!(are_tuple_labels(["1", "2", "3"].into_iter()));
    // A single "1" is just a record with one numeric label.
    assert!(!are_tuple_labels(["1"].into_iter()));
    assert!(!are_tuple_labels(["1", "3"].into_iter()));
    assert!(!are_tuple_labels(["a", "b"].into_iter()));
}
