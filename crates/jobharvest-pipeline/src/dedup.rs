//! Duplicate removal by canonical source URL.
//!
//! Each record is an atomic snapshot: when two records share a URL one of
//! them survives whole, and no fields are ever combined across duplicates.

use crate::validate::canonicalize_url;
use jobharvest_core::JobRecord;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Survivors of a merge, in the input order of the surviving records.
#[derive(Debug, Clone, Default)]
pub struct MergeOutcome {
    /// One record per canonical URL
    pub records: Vec<JobRecord>,
    /// Records dropped as duplicates
    pub duplicates_removed: usize,
}

/// Whether `challenger` should replace `incumbent`.
///
/// Higher score wins; on an exact tie the earlier harvest wins, and if that
/// ties too the earlier input position (the incumbent) is kept.
fn replaces(challenger: &JobRecord, incumbent: &JobRecord) -> bool {
    match challenger
        .data_quality_score
        .partial_cmp(&incumbent.data_quality_score)
        .unwrap_or(Ordering::Equal)
    {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => challenger.harvested_at < incumbent.harvested_at,
    }
}

/// Collapse records that share a canonical source URL.
#[must_use]
pub fn merge(records: Vec<JobRecord>) -> MergeOutcome {
    let total = records.len();
    // canonical URL -> index into `slots`
    let mut winners: HashMap<String, usize> = HashMap::with_capacity(total);
    // (input position, record) of the current winner per URL
    let mut slots: Vec<(usize, JobRecord)> = Vec::with_capacity(total);

    for (position, record) in records.into_iter().enumerate() {
        let key = canonicalize_url(&record.source_url).unwrap_or_else(|| record.source_url.clone());
        match winners.get(&key) {
            Some(&slot) => {
                if replaces(&record, &slots[slot].1) {
                    slots[slot] = (position, record);
                }
            }
            None => {
                winners.insert(key, slots.len());
                slots.push((position, record));
            }
        }
    }

    slots.sort_by_key(|(position, _)| *position);
    let records: Vec<JobRecord> = slots.into_iter().map(|(_, record)| record).collect();
    let duplicates_removed = total - records.len();
    if duplicates_removed > 0 {
        tracing::debug!(duplicates_removed, kept = records.len(), "Merged duplicate listings");
    }
    MergeOutcome {
        records,
        duplicates_removed,
    }
}
