use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{Mutex, mpsc::UnboundedSender},
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval_at, sleep},
};
use tracing::{debug, info, instrument, trace, warn};

use super::LicenseTracker;
use crate::marker_store::MarkerStore;

/// Tracker shared between the storefront and its scheduled tasks. Every
/// read-modify-write of the interest set happens under this lock.
pub(crate) type SharedTracker = Arc<Mutex<LicenseTracker>>;

pub(crate) fn shared(tracker: LicenseTracker) -> SharedTracker {
    Arc::new(Mutex::new(tracker))
}

/// Outcomes the scheduled tasks report back to the storefront.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TrackerEvent {
    /// A sweep found the marker gone and dropped the work from the interest set.
    Evicted { work_index: u64 },
    /// The most recently tracked license lapsed; state should be rebuilt.
    ReloadRequested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TrackerTimings {
    /// How often a sweep schedules eviction checks.
    pub(crate) sweep_interval: Duration,
    /// How long each eviction check waits before looking at the marker.
    pub(crate) eviction_delay: Duration,
    /// How often drain detection runs.
    pub(crate) drain_check_interval: Duration,
}

impl Default for TrackerTimings {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(10),
            eviction_delay: Duration::from_secs(60),
            drain_check_interval: Duration::from_secs(1),
        }
    }
}

/// Schedules one delayed eviction check per entry currently tracked.
///
/// Each check looks at the marker when it fires, not when it is scheduled, so
/// a marker written again in between keeps the entry. Checks always run to
/// completion once scheduled.
#[instrument(level = "trace", skip_all)]
pub(crate) fn sweep(
    tracker: &SharedTracker,
    markers: &Arc<dyn MarkerStore>,
    eviction_delay: Duration,
    events: &UnboundedSender<TrackerEvent>,
    tracked_works: Vec<u64>,
) -> Vec<JoinHandle<()>> {
    trace!(entries = tracked_works.len(), "Scheduling eviction checks");

    tracked_works
        .into_iter()
        .map(|work_index| {
            let tracker = Arc::clone(tracker);
            let markers = Arc::clone(markers);
            let events = events.clone();

            tokio::spawn(async move {
                sleep(eviction_delay).await;

                if markers.contains(work_index) {
                    trace!(work_index, "Marker still present, keeping license");
                    return;
                }

                let removed = tracker.lock().await.evict_work(work_index);
                if removed > 0 {
                    info!(work_index, removed, "License marker lapsed, evicting");
                    if events.send(TrackerEvent::Evicted { work_index }).is_err() {
                        debug!("Tracker event receiver closed");
                    }
                }
            })
        })
        .collect()
}

/// One drain check. Returns whether a reload was requested.
pub(crate) async fn detect_drain(
    tracker: &SharedTracker,
    events: &UnboundedSender<TrackerEvent>,
) -> bool {
    if !tracker.lock().await.detect_drain() {
        return false;
    }

    if events.send(TrackerEvent::ReloadRequested).is_err() {
        warn!("Drain detected but nothing is listening for reload requests");
    }
    true
}

/// Runs sweeps every `sweep_interval` until the event receiver goes away.
pub(crate) fn spawn_sweeper(
    tracker: SharedTracker,
    markers: Arc<dyn MarkerStore>,
    timings: TrackerTimings,
    events: UnboundedSender<TrackerEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticks = interval_at(
            Instant::now() + timings.sweep_interval,
            timings.sweep_interval,
        );
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !events.is_closed() {
            ticks.tick().await;
            let tracked_works = tracker.lock().await.tracked_works();
            if !tracked_works.is_empty() {
                sweep(&tracker, &markers, timings.eviction_delay, &events, tracked_works);
            }
        }

        debug!("Sweeper stopped");
    })
}

/// Runs drain detection every `drain_check_interval` until the event
/// receiver goes away.
pub(crate) fn spawn_drain_detector(
    tracker: SharedTracker,
    timings: TrackerTimings,
    events: UnboundedSender<TrackerEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticks = interval_at(
            Instant::now() + timings.drain_check_interval,
            timings.drain_check_interval,
        );
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !events.is_closed() {
            ticks.tick().await;
            detect_drain(&tracker, &events).await;
        }

        debug!("Drain detector stopped");
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use tokio::sync::mpsc::{self, error::TryRecvError};

    use super::*;
    use crate::license_tracker::test_license as license;
    use crate::marker_store::{LocalMarkerStore, marker_ttl};

    const DELAY: Duration = Duration::from_secs(60);

    fn tracked(works: &[(u64, i64)]) -> SharedTracker {
        let licenses = works
            .iter()
            .enumerate()
            .map(|(i, &(work, issued_on))| license(i as u64, work, issued_on))
            .collect::<Vec<_>>();
        let marked = works.iter().map(|&(work, _)| work).collect::<BTreeSet<_>>();

        let mut tracker = LicenseTracker::new();
        tracker.reconcile(&licenses, &marked);
        shared(tracker)
    }

    fn store_with(works: &[u64]) -> Arc<LocalMarkerStore> {
        let store = Arc::new(LocalMarkerStore::ephemeral());
        for &work in works {
            store.set(work, "work", marker_ttl()).unwrap();
        }
        store
    }

    async fn run_sweep(
        tracker: &SharedTracker,
        store: &Arc<LocalMarkerStore>,
        events: &UnboundedSender<TrackerEvent>,
        between: impl FnOnce(),
    ) {
        let markers: Arc<dyn MarkerStore> = store.clone();
        let works = tracker.lock().await.tracked_works();
        let checks = sweep(tracker, &markers, DELAY, events, works);
        tokio::task::yield_now().await;

        tokio::time::advance(DELAY / 2).await;
        between();
        tokio::time::advance(DELAY).await;

        for check in checks {
            check.await.unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_keeps_entry_while_marker_present() {
        let tracker = tracked(&[(7, 1)]);
        let store = store_with(&[7]);
        let (tx, mut rx) = mpsc::unbounded_channel();

        run_sweep(&tracker, &store, &tx, || {}).await;

        assert_eq!(tracker.lock().await.tracked_works(), vec![7]);
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_evicts_when_marker_gone_at_fire_time() {
        let tracker = tracked(&[(7, 1), (8, 2)]);
        let store = store_with(&[7, 8]);
        let (tx, mut rx) = mpsc::unbounded_channel();

        run_sweep(&tracker, &store, &tx, || store.remove(7)).await;

        assert_eq!(tracker.lock().await.tracked_works(), vec![8]);
        assert_eq!(rx.try_recv(), Ok(TrackerEvent::Evicted { work_index: 7 }));
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_keeps_entry_when_marker_written_again() {
        let tracker = tracked(&[(7, 1)]);
        let store = store_with(&[7]);
        let (tx, _rx) = mpsc::unbounded_channel();

        run_sweep(&tracker, &store, &tx, || {
            store.remove(7);
            store.set(7, "work", marker_ttl()).unwrap();
        })
        .await;

        assert_eq!(tracker.lock().await.tracked_works(), vec![7]);
    }

    #[tokio::test(start_paused = true)]
    async fn eviction_waits_for_full_delay() {
        let tracker = tracked(&[(7, 1)]);
        let store = store_with(&[]);
        let markers: Arc<dyn MarkerStore> = store.clone();
        let (tx, _rx) = mpsc::unbounded_channel();

        let mut checks = sweep(&tracker, &markers, DELAY, &tx, vec![7]);
        tokio::task::yield_now().await;

        tokio::time::advance(DELAY - Duration::from_secs(1)).await;
        tokio::task::yield_now().await;
        assert_eq!(tracker.lock().await.len(), 1);

        tokio::time::advance(Duration::from_secs(1)).await;
        checks.pop().unwrap().await.unwrap();
        assert_eq!(tracker.lock().await.len(), 0);
    }

    #[tokio::test]
    async fn drain_check_requests_reload_once() {
        let tracker = tracked(&[(1, 1), (2, 2), (3, 3)]);
        let (tx, mut rx) = mpsc::unbounded_channel();

        assert!(!detect_drain(&tracker, &tx).await);

        tracker.lock().await.evict_work(2);
        assert!(detect_drain(&tracker, &tx).await);
        assert!(!detect_drain(&tracker, &tx).await);

        assert_eq!(rx.try_recv(), Ok(TrackerEvent::ReloadRequested));
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
        assert_eq!(tracker.lock().await.interest_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn scheduled_tasks_drive_eviction_then_reload() {
        let tracker = tracked(&[(4, 1), (5, 2)]);
        let store = store_with(&[4, 5]);
        let markers: Arc<dyn MarkerStore> = store.clone();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let timings = TrackerTimings::default();

        let sweeper = spawn_sweeper(Arc::clone(&tracker), markers, timings, tx.clone());
        let drain = spawn_drain_detector(Arc::clone(&tracker), timings, tx);

        store.remove(5);

        assert_eq!(
            rx.recv().await,
            Some(TrackerEvent::Evicted { work_index: 5 })
        );
        assert_eq!(rx.recv().await, Some(TrackerEvent::ReloadRequested));
        assert_eq!(tracker.lock().await.tracked_works(), vec![4]);

        drop(rx);
        sweeper.abort();
        drain.abort();
    }
}
