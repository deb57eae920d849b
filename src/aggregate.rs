use log::debug;

use crate::data::Record;

/// Merges per-source record lists into one ledger ordered by date.
///
/// Sources are concatenated in the order given and then stable-sorted, so
/// records sharing a date keep their cross-source order. Nothing is
/// deduplicated: each source reports its own transactions.
pub fn aggregate(per_source_records: Vec<Vec<Record>>) -> Vec<Record> {
    let source_count = per_source_records.len();
    let mut merged = per_source_records.into_iter().flatten().collect::<Vec<_>>();
    merged.sort_by_key(Record::date_key);
    debug!(
        "Aggregated {} record(s) from {source_count} source(s)",
        merged.len()
    );
    merged
}
