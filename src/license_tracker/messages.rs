//! Notification texts shown while buying, listing and tracking licenses.

use std::time::Duration;

pub(crate) const LOADING: &str = "⌛ Loading...";
pub(crate) const AWAITING_APPROVAL: &str = "⌛ Waiting for payment approval...";
pub(crate) const DELETE_IN_PROGRESS: &str = "⌛ Delete work in progress...";
pub(crate) const DELETE_REFUSED_LICENSED: &str =
    "Sorry, you can't delete this work as its license is currently in use.";

pub(crate) fn failure(err: &anyhow::Error) -> String {
    format!("⚠️ {err:#}.")
}

pub(crate) fn awaiting_payment(name: &str) -> String {
    format!("⌛ Awaiting payment for \"{name}\"...")
}

pub(crate) fn bought(name: &str) -> String {
    format!("🎉 You successfully bought \"{name}\".")
}

pub(crate) fn license_set(name: &str, ttl: Duration) -> String {
    format!("{name}: license set for {} seconds", ttl.as_secs_f64().round())
}

pub(crate) fn license_lapsed(name: &str) -> String {
    format!("ℹ️ Your license for \"{name}\" has expired.")
}

pub(crate) fn adding(name: &str) -> String {
    format!("⌛ Adding \"{name}\"...")
}

pub(crate) fn added(name: &str) -> String {
    format!("🎉 You successfully added \"{name}\".")
}

pub(crate) fn updating(name: &str) -> String {
    format!("⌛ Updating \"{name}\"...")
}

pub(crate) fn updated(name: &str) -> String {
    format!("🎉 You successfully updated \"{name}\".")
}

pub(crate) fn deleted(name: &str) -> String {
    format!("🎉 You successfully deleted \"{name}\".")
}

pub(crate) fn cannot_buy(name: &str, reason: &str) -> String {
    format!("⚠️ \"{name}\" cannot be bought: {reason}.")
}

pub(crate) fn unknown_work(work_index: u64) -> String {
    format!("⚠️ There is no work with index {work_index}.")
}

pub(crate) fn not_owner(name: &str) -> String {
    format!("⚠️ Only the owner can change \"{name}\".")
}
