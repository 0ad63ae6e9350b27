use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, instrument};

use super::interest::{InterestState, remove_by_work};
use crate::ledger::License;

/// Licenses this client believes are active, plus the size snapshot used to
/// notice when the most recently tracked license lapses.
///
/// Only entries whose work has a live local marker belong here. Ledger expiry
/// fields are never consulted.
#[derive(Debug, Default)]
pub(crate) struct LicenseTracker {
    interest: Vec<License>,
    interest_count: usize,
}

impl LicenseTracker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Seeds the interest set from ledger licenses whose work has a marker.
    ///
    /// For each marked work the license with the greatest `issued_on` is kept,
    /// the first one in ledger order on a tie, replacing any entry already held
    /// for that work. The interest count is then set to the new size. Nothing
    /// changes when no license matches a marker.
    #[instrument(skip_all, fields(licenses = licenses.len(), markers = markers.len()))]
    pub(crate) fn reconcile(&mut self, licenses: &[License], markers: &BTreeSet<u64>) {
        let mut latest: BTreeMap<u64, &License> = BTreeMap::new();

        for license in licenses.iter().filter(|l| markers.contains(&l.work_index)) {
            latest
                .entry(license.work_index)
                .and_modify(|current| {
                    if license.issued_on > current.issued_on {
                        *current = license;
                    }
                })
                .or_insert(license);
        }

        if latest.is_empty() {
            debug!("No ledger license matches a local marker");
            return;
        }

        for (work_index, license) in latest {
            self.interest = remove_by_work(&self.interest, work_index);
            self.interest.push(license.clone());
        }

        self.interest_count = self.interest.len();

        info!(
            interest = self.interest.len(),
            "Reconciled ledger licenses against local markers"
        );
    }

    /// Tracks a just-purchased license without touching the interest count.
    ///
    /// An older entry for the same work is superseded.
    pub(crate) fn add_interest(&mut self, license: License) {
        debug!(
            work_index = license.work_index,
            license_index = license.index,
            "Adding purchased license to interest set"
        );

        self.interest = remove_by_work(&self.interest, license.work_index);
        self.interest.push(license);
    }

    /// Records the current interest size as the drain baseline.
    pub(crate) fn sync_interest_count(&mut self) {
        self.interest_count = self.interest.len();
    }

    /// Interest set with all entries for `work_index` removed. Pure.
    pub(crate) fn remove_by_work(&self, work_index: u64) -> Vec<License> {
        remove_by_work(&self.interest, work_index)
    }

    /// Drops all entries for `work_index`, returning how many were removed.
    pub(crate) fn evict_work(&mut self, work_index: u64) -> usize {
        let before = self.interest.len();
        self.interest = self.remove_by_work(work_index);
        before - self.interest.len()
    }

    /// True when the interest set is exactly one smaller than the last
    /// recorded count, in which case the count is decremented.
    ///
    /// A shrink by more than one between checks is never reported.
    pub(crate) fn detect_drain(&mut self) -> bool {
        if self.interest_count.checked_sub(1) != Some(self.interest.len()) {
            return false;
        }

        self.interest_count -= 1;
        info!(
            interest_count = self.interest_count,
            "Most recently tracked license lapsed"
        );
        true
    }

    pub(crate) fn state_of(&self, work_index: u64) -> InterestState {
        if self.interest.iter().any(|l| l.work_index == work_index) {
            InterestState::Interested
        } else {
            InterestState::Absent
        }
    }

    /// Work indices of the entries currently held, in insertion order.
    pub(crate) fn tracked_works(&self) -> Vec<u64> {
        self.interest.iter().map(|l| l.work_index).collect()
    }

    pub(crate) fn snapshot(&self) -> Vec<License> {
        self.interest.clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.interest.len()
    }

    pub(crate) fn interest_count(&self) -> usize {
        self.interest_count
    }

    /// Forgets everything, as a full state refresh does.
    pub(crate) fn reset(&mut self) {
        *self = Self::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::license_tracker::test_license as license;

    fn markers(works: &[u64]) -> BTreeSet<u64> {
        works.iter().copied().collect()
    }

    #[test]
    fn reconcile_keeps_latest_license_per_marked_work() {
        let mut tracker = LicenseTracker::new();
        let licenses = [license(0, 2, 10), license(1, 2, 30), license(2, 5, 20)];

        tracker.reconcile(&licenses, &markers(&[2, 5]));

        assert_eq!(tracker.snapshot(), vec![license(1, 2, 30), license(2, 5, 20)]);
        assert_eq!(tracker.interest_count(), 2);
    }

    #[test]
    fn reconcile_without_markers_tracks_nothing() {
        let mut tracker = LicenseTracker::new();

        tracker.reconcile(&[license(0, 1, 10), license(1, 3, 11)], &markers(&[]));

        assert_eq!(tracker.len(), 0);
        assert_eq!(tracker.interest_count(), 0);
    }

    #[test]
    fn reconcile_ignores_markers_without_licenses() {
        let mut tracker = LicenseTracker::new();

        tracker.reconcile(&[license(0, 1, 10)], &markers(&[6]));

        assert_eq!(tracker.state_of(1), InterestState::Absent);
        assert_eq!(tracker.state_of(6), InterestState::Absent);
    }

    #[test]
    fn reconcile_tie_keeps_first_in_ledger_order() {
        let mut tracker = LicenseTracker::new();

        tracker.reconcile(&[license(4, 8, 50), license(7, 8, 50)], &markers(&[8]));

        assert_eq!(tracker.snapshot(), vec![license(4, 8, 50)]);
    }

    #[test]
    fn reconcile_replaces_existing_entry_for_work() {
        let mut tracker = LicenseTracker::new();
        tracker.add_interest(license(0, 3, 5));

        tracker.reconcile(&[license(0, 3, 5), license(1, 3, 9)], &markers(&[3]));

        assert_eq!(tracker.snapshot(), vec![license(1, 3, 9)]);
        assert_eq!(tracker.interest_count(), 1);
    }

    #[test]
    fn add_interest_grows_set_but_not_count() {
        let mut tracker = LicenseTracker::new();
        tracker.reconcile(&[license(0, 1, 10)], &markers(&[1]));

        tracker.add_interest(license(1, 2, 20));

        assert_eq!(tracker.len(), 2);
        assert_eq!(tracker.interest_count(), 1);
        assert_eq!(tracker.state_of(2), InterestState::Interested);

        tracker.sync_interest_count();
        assert_eq!(tracker.interest_count(), 2);
    }

    #[test]
    fn add_interest_supersedes_previous_purchase_of_same_work() {
        let mut tracker = LicenseTracker::new();
        tracker.add_interest(license(0, 4, 10));

        tracker.add_interest(license(1, 4, 20));

        assert_eq!(tracker.snapshot(), vec![license(1, 4, 20)]);
    }

    #[test]
    fn drain_fires_only_on_shrink_by_exactly_one() {
        let mut tracker = LicenseTracker::new();
        tracker.reconcile(
            &[license(0, 1, 1), license(1, 2, 2), license(2, 3, 3)],
            &markers(&[1, 2, 3]),
        );
        assert!(!tracker.detect_drain());

        tracker.evict_work(1);
        assert!(tracker.detect_drain());
        assert_eq!(tracker.interest_count(), 2);
        assert!(!tracker.detect_drain());
    }

    #[test]
    fn drain_misses_shrink_by_more_than_one() {
        let mut tracker = LicenseTracker::new();
        tracker.reconcile(
            &[license(0, 1, 1), license(1, 2, 2), license(2, 3, 3)],
            &markers(&[1, 2, 3]),
        );

        tracker.evict_work(1);
        tracker.evict_work(2);

        assert!(!tracker.detect_drain());
        assert_eq!(tracker.interest_count(), 3);
    }

    #[test]
    fn drain_never_fires_on_empty_tracker() {
        let mut tracker = LicenseTracker::new();
        assert!(!tracker.detect_drain());
    }

    #[test]
    fn evict_work_removes_duplicates() {
        let mut tracker = LicenseTracker::new();
        tracker.interest = vec![license(0, 9, 1), license(1, 9, 2), license(2, 1, 3)];

        assert_eq!(tracker.remove_by_work(9), vec![license(2, 1, 3)]);
        assert_eq!(tracker.len(), 3);

        assert_eq!(tracker.evict_work(9), 2);
        assert_eq!(tracker.tracked_works(), vec![1]);
    }

    #[test]
    fn reset_forgets_interest_and_count() {
        let mut tracker = LicenseTracker::new();
        tracker.reconcile(&[license(0, 1, 1)], &markers(&[1]));

        tracker.reset();

        assert_eq!(tracker.len(), 0);
        assert_eq!(tracker.interest_count(), 0);
    }
}
