//! Local license-expiry tracking.
//!
//! The contract records an expiry timestamp for every license, but it is
//! written with the contract clock, which runs behind the client clock, so it
//! cannot tell this client when a license has lapsed. Instead a short-lived
//! local marker is written for each purchase (see [`crate::marker_store`]) and
//! the tracker keeps an "interest set" of licenses whose marker is alive.
//!
//! ## How It Works
//!
//! - On load, ledger licenses are reconciled against the markers present.
//! - A purchase adds the bought license to the interest set directly.
//! - Every 10 seconds a sweep schedules, per tracked license, a check 60
//!   seconds later that evicts the license if its marker is gone by then.
//! - Every second a drain check compares the interest set against the size
//!   recorded at the last reconcile. A shrink of exactly one means the latest
//!   tracked license lapsed and a full reload is requested.
//!
//! ## Known Limitations
//!
//! A license can stay tracked for up to a minute and ten seconds after its
//! marker lapses. If the set shrinks by more than one between drain checks no
//! reload is requested.

mod interest;
pub(crate) mod messages;
mod tasks;
mod tracker;

pub(crate) use interest::InterestState;
pub(crate) use tasks::{
    SharedTracker, TrackerEvent, TrackerTimings, shared, spawn_drain_detector, spawn_sweeper,
};
pub(crate) use tracker::LicenseTracker;

#[cfg(test)]
pub(crate) fn test_license(index: u64, work_index: u64, issued_on: i64) -> crate::ledger::License {
    crate::ledger::License {
        index,
        buyer: "0xbuyer".into(),
        work_index,
        issued_on,
        expires_on: issued_on + 60,
        expired: false,
    }
}
