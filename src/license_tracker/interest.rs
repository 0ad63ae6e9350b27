use crate::ledger::License;

/// Tracking state of a single work.
///
/// Every work starts `Absent`. It becomes `Interested` on a reconcile match or
/// a purchase and returns to `Absent` when a sweep finds its marker gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InterestState {
    Absent,
    Interested,
}

/// Returns `interest` without any entry for `work_index`.
///
/// Every matching entry goes, including duplicates left behind by a race.
pub(crate) fn remove_by_work(interest: &[License], work_index: u64) -> Vec<License> {
    interest
        .iter()
        .filter(|license| license.work_index != work_index)
        .cloned()
        .collect()
}
