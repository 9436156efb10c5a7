use std::collections::HashMap;

use super::common::*;
use crate::workflows::applicants::detector::{detect, index_by_posting};
use crate::workflows::applicants::domain::PostingId;

#[test]
fn first_sighting_reports_the_whole_total() {
    let current = vec![record(1, 100, "Backend Dev", 5), record(1, 101, "QA", 0)];

    let deltas = detect(&current, &HashMap::new());

    assert_eq!(deltas.len(), 2);
    assert_eq!(deltas[0].previous_total, 0);
    assert_eq!(deltas[0].new_applicants, 5);
    assert!(deltas[0].has_increment());
    assert_eq!(deltas[1].new_applicants, 0);
    assert!(!deltas[1].has_increment());
}

#[test]
fn decreases_clamp_to_zero() {
    let current = vec![record(1, 100, "Backend Dev", 1)];
    let previous = index_by_posting(vec![snapshot(1, 100, "Backend Dev", 5)]);

    let deltas = detect(&current, &previous);

    assert_eq!(deltas[0].previous_total, 5);
    assert_eq!(deltas[0].current_total, 1);
    assert_eq!(deltas[0].new_applicants, 0);
}

#[test]
fn increases_report_the_difference() {
    let current = vec![record(1, 100, "Backend Dev", 7)];
    let previous = index_by_posting(vec![snapshot(1, 100, "Backend Dev", 5)]);

    let deltas = detect(&current, &previous);

    assert_eq!(deltas[0].previous_total, 5);
    assert_eq!(deltas[0].new_applicants, 2);
}

#[test]
fn output_follows_input_order_without_dedup() {
    let current = vec![
        record(2, 300, "Ops", 3),
        record(1, 100, "Backend Dev", 2),
        record(1, 100, "Backend Dev", 2),
    ];

    let deltas = detect(&current, &HashMap::new());

    let order: Vec<PostingId> = deltas.iter().map(|d| d.posting_id).collect();
    assert_eq!(order, vec![PostingId(300), PostingId(100), PostingId(100)]);
}

#[test]
fn detection_is_repeatable_for_identical_inputs() {
    let current = vec![record(1, 100, "Backend Dev", 9), record(1, 101, "QA", 2)];
    let previous = index_by_posting(vec![snapshot(1, 100, "Backend Dev", 4)]);

    assert_eq!(detect(&current, &previous), detect(&current, &previous));
}
