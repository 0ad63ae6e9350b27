use std::fmt::Write as _;

use colored::Colorize;
use url::Url;

use crate::{
    ledger::{License, Work},
    license_tracker::{InterestState, LicenseTracker},
    marker_store::MarkerStore,
};

pub(crate) const TOKEN_SYMBOL: &str = "cUSD";

/// Why the viewer cannot buy a work right now, if anything.
pub(crate) fn buy_blocker(work: &Work, viewer: &str, markers: &dyn MarkerStore) -> Option<&'static str> {
    if work.deleted {
        Some("it has been deleted")
    } else if !work.selling {
        Some("it is not for sale")
    } else if work.is_owned_by(viewer) {
        Some("you own it")
    } else if markers.contains(work.index) {
        Some("you already hold an active license")
    } else {
        None
    }
}

fn explorer_link(explorer: &Url, path: &str) -> String {
    let mut url = explorer.clone();
    url.set_path(path);
    url.to_string()
}

pub(crate) fn owner_link(explorer: &Url, owner: &str) -> String {
    explorer_link(explorer, &format!("/address/{owner}/transactions"))
}

pub(crate) fn license_token_link(explorer: &Url, token: &str) -> String {
    explorer_link(explorer, &format!("/token/{token}/token-transfers"))
}

/// Text cards for every work that has not been deleted.
pub(crate) fn render_works(
    works: &[Work],
    viewer: &str,
    tracker: &LicenseTracker,
    markers: &dyn MarkerStore,
    explorer: &Url,
) -> String {
    let listed = works.iter().filter(|work| !work.deleted).collect::<Vec<_>>();

    if listed.is_empty() {
        return "No works listed\n".to_owned();
    }

    let mut out = String::new();
    let _ = writeln!(out, "{}", "Works:".bold());

    let mut listed = listed.into_iter().peekable();
    while let Some(work) = listed.next() {
        let is_last = listed.peek().is_none();
        let (marker, lead) = if is_last { ("└─", "   ") } else { ("├─", "│  ") };

        let sale_badge = if work.selling {
            "[On Sale]".blue()
        } else {
            "[Not For Sale]".red()
        };
        let licensed_badge = match tracker.state_of(work.index) {
            InterestState::Interested => format!(" {}", "[Licensed]".green()),
            InterestState::Absent => String::new(),
        };

        let _ = writeln!(
            out,
            "{marker} {index} {name} {sale_badge}{licensed_badge}",
            index = format!("#{}", work.index).dimmed(),
            name = work.name().bold(),
        );

        let owner_suffix = if work.is_owned_by(viewer) { " (you)" } else { "" };
        let _ = writeln!(
            out,
            "{lead}{label} {owner}{owner_suffix} {link}",
            label = "Owner:".bold(),
            owner = work.owner.cyan(),
            link = owner_link(explorer, &work.owner).dimmed(),
        );

        if !work.details.description.is_empty() {
            let _ = writeln!(out, "{lead}{}", work.details.description);
        }

        if !work.license_token_addr.is_empty() {
            let _ = writeln!(
                out,
                "{lead}{label} {link}",
                label = "License token:".bold(),
                link = license_token_link(explorer, &work.license_token_addr).dimmed(),
            );
        }

        if work.selling {
            if !work.details.terms.is_empty() {
                let _ = writeln!(
                    out,
                    "{lead}{label} {terms}",
                    label = "Terms of use:".bold(),
                    terms = work.details.terms
                );
            }

            let availability = match buy_blocker(work, viewer, markers) {
                None => format!("buy with `buy {}`", work.index).green(),
                Some(reason) => reason.dimmed(),
            };

            let price = if work.price.is_zero() {
                "free".to_owned()
            } else {
                format!("{} {TOKEN_SYMBOL}", work.price)
            };

            let _ = writeln!(
                out,
                "{lead}{label} {price} ({availability})",
                label = "Price:".bold(),
            );
        }
    }

    out
}

/// Ledger licenses with their local tracking state.
///
/// Ledger expiry columns use the contract clock and are shown for reference.
pub(crate) fn render_licenses(
    licenses: &[License],
    works: &[Work],
    tracker: &LicenseTracker,
    markers: &dyn MarkerStore,
) -> String {
    if licenses.is_empty() {
        return "No licenses issued\n".to_owned();
    }

    let mut out = String::new();
    let _ = writeln!(out, "{}", "Licenses:".bold());

    for license in licenses {
        let name = works
            .iter()
            .find(|work| work.index == license.work_index)
            .map_or("<unknown work>", Work::name);

        let local = match (markers.contains(license.work_index), tracker.state_of(license.work_index)) {
            (true, InterestState::Interested) => "active, tracked".green(),
            (true, InterestState::Absent) => "active".green(),
            (false, InterestState::Interested) => "lapsed, pending eviction".yellow(),
            (false, InterestState::Absent) => "inactive".dimmed(),
        };

        let _ = writeln!(
            out,
            "  {index} {name} {label} {buyer} {ledger} {local}",
            index = format!("#{}", license.index).dimmed(),
            name = name.bold(),
            label = "buyer".dimmed(),
            buyer = license.buyer.cyan(),
            ledger = format!(
                "(ledger: issued {}, expires {}{})",
                license.issued_on,
                license.expires_on,
                if license.expired { ", expired" } else { "" }
            )
            .dimmed(),
        );
    }

    out
}
