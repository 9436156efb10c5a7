use std::collections::HashMap;

use super::domain::{AggregateRecord, IncrementRecord, PostingId, Snapshot};

/// Compare live totals against stored baselines.
///
/// Produces exactly one [`IncrementRecord`] per input record, in input order. A posting
/// without a baseline reports its whole total as new; a total that went down reports zero.
pub fn detect(
    current: &[AggregateRecord],
    previous: &HashMap<PostingId, Snapshot>,
) -> Vec<IncrementRecord> {
    current
        .iter()
        .map(|record| {
            let previous_total = previous
                .get(&record.posting_id)
                .map_or(0, |snapshot| snapshot.total_applicants);

            IncrementRecord {
                company_id: record.company_id,
                posting_id: record.posting_id,
                title: record.title.clone(),
                previous_total,
                current_total: record.total_applicants,
                new_applicants: record.total_applicants.saturating_sub(previous_total),
            }
        })
        .collect()
}

/// Index snapshots by posting so [`detect`] can look them up.
pub fn index_by_posting(snapshots: Vec<Snapshot>) -> HashMap<PostingId, Snapshot> {
    snapshots
        .into_iter()
        .map(|snapshot| (snapshot.posting_id, snapshot))
        .collect()
}
