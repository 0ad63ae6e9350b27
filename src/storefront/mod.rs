//! Orchestration between the viewer, the ledger and the license tracker.
//!
//! The storefront is the only owner of the tracker; the scheduled tasks get a
//! handle to it. Ledger failures are shown to the viewer as notifications and
//! returned to the caller, and never touch tracker state.

pub(crate) mod render;

use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, bail};
use tracing::{info, instrument, warn};
use url::Url;

use crate::{
    ledger::{Ledger, License, Listing, PurchaseReceipt, TokenAmount, Work},
    license_tracker::{LicenseTracker, SharedTracker, messages, shared},
    marker_store::MarkerStore,
    notify::Notifier,
};

pub(crate) struct Storefront<L> {
    ledger: L,
    markers: Arc<dyn MarkerStore>,
    notifier: Arc<dyn Notifier>,
    tracker: SharedTracker,
    account: String,
    explorer: Url,
    marker_ttl: Duration,
    works: Vec<Work>,
    licenses: Vec<License>,
    balance: TokenAmount,
}

impl<L: Ledger> Storefront<L> {
    pub(crate) fn new(
        ledger: L,
        markers: Arc<dyn MarkerStore>,
        notifier: Arc<dyn Notifier>,
        account: String,
        explorer: Url,
        marker_ttl: Duration,
    ) -> Self {
        Self {
            ledger,
            markers,
            notifier,
            tracker: shared(LicenseTracker::new()),
            account,
            explorer,
            marker_ttl,
            works: vec![],
            licenses: vec![],
            balance: TokenAmount::ZERO,
        }
    }

    pub(crate) fn tracker(&self) -> SharedTracker {
        Arc::clone(&self.tracker)
    }

    pub(crate) fn markers(&self) -> Arc<dyn MarkerStore> {
        Arc::clone(&self.markers)
    }

    #[cfg(test)]
    pub(crate) fn works(&self) -> &[Work] {
        &self.works
    }

    pub(crate) fn balance(&self) -> TokenAmount {
        self.balance
    }

    /// Shows `err` to the viewer and hands it back.
    fn surface(&self, err: anyhow::Error) -> anyhow::Error {
        warn!(?err, "Storefront operation failed");
        self.notifier.notify(&messages::failure(&err));
        err
    }

    async fn refresh_works(&mut self) -> anyhow::Result<()> {
        self.works = self.ledger.works().await?;
        Ok(())
    }

    async fn refresh_licenses(&mut self) -> anyhow::Result<()> {
        self.licenses = self.ledger.licenses().await?;
        Ok(())
    }

    pub(crate) async fn refresh_balance(&mut self) -> anyhow::Result<TokenAmount> {
        let result = self.ledger.balance(&self.account).await;
        self.balance = result.map_err(|err| self.surface(err))?;
        Ok(self.balance)
    }

    /// Reads balance, works and licenses, then reconciles the tracker
    /// against the markers present.
    #[instrument(skip(self), fields(account = %self.account))]
    pub(crate) async fn load(&mut self) -> anyhow::Result<()> {
        self.notifier.notify(messages::LOADING);

        let result = async {
            self.balance = self.ledger.balance(&self.account).await?;
            self.refresh_works().await?;
            self.refresh_licenses().await?;
            anyhow::Ok(())
        }
        .await;
        result.map_err(|err| self.surface(err))?;

        let markers = self.markers.keys();
        self.tracker.lock().await.reconcile(&self.licenses, &markers);

        info!(
            works = self.works.len(),
            licenses = self.licenses.len(),
            markers = markers.len(),
            "Storefront loaded"
        );
        self.notifier.clear();
        Ok(())
    }

    /// Full state refresh: forget tracked interest and load from scratch.
    pub(crate) async fn reload(&mut self) -> anyhow::Result<()> {
        self.tracker.lock().await.reset();
        self.load().await
    }

    fn find_work(&self, work_index: u64) -> anyhow::Result<&Work> {
        self.works
            .iter()
            .find(|work| work.index == work_index)
            .ok_or_else(|| {
                self.notifier.notify(&messages::unknown_work(work_index));
                anyhow!("No work with index {work_index}")
            })
    }

    /// Buys a license for `work_index`, records its marker and starts
    /// tracking it.
    #[instrument(skip(self), fields(account = %self.account))]
    pub(crate) async fn buy(&mut self, work_index: u64) -> anyhow::Result<PurchaseReceipt> {
        let work = self.find_work(work_index)?;

        if let Some(reason) = render::buy_blocker(work, &self.account, self.markers.as_ref()) {
            self.notifier.notify(&messages::cannot_buy(work.name(), reason));
            bail!("Cannot buy \"{}\": {reason}", work.name());
        }

        let name = work.name().to_owned();
        let price = work.price;

        self.notifier.notify(messages::AWAITING_APPROVAL);
        let approval = self.ledger.approve(&self.account, price).await;
        approval.map_err(|err| self.surface(err))?;

        self.notifier.notify(&messages::awaiting_payment(&name));
        let purchase = self.ledger.buy_license(&self.account, work_index).await;
        let receipt = purchase.map_err(|err| self.surface(err))?;

        self.markers
            .set(receipt.work_index, &name, self.marker_ttl)
            .map_err(|err| self.surface(err))?;

        self.notifier.notify(&messages::bought(&name));
        info!(license_index = receipt.license_index, "License purchased");

        let refreshed = async {
            self.refresh_works().await?;
            self.balance = self.ledger.balance(&self.account).await?;
            self.refresh_licenses().await
        }
        .await;
        if let Err(err) = refreshed {
            warn!(?err, "Failed to refresh storefront after purchase");
            self.notifier.notify(&messages::failure(&err));
        }

        let license = self
            .licenses
            .iter()
            .find(|license| license.index == receipt.license_index)
            .cloned()
            .unwrap_or_else(|| receipt.to_license(&self.account));

        {
            let mut tracker = self.tracker.lock().await;
            tracker.add_interest(license);
            tracker.sync_interest_count();
        }

        self.notifier.notify(&messages::license_set(&name, self.marker_ttl));
        Ok(receipt)
    }

    #[instrument(skip(self, listing), fields(name = %listing.details.name))]
    pub(crate) async fn create_work(&mut self, listing: Listing) -> anyhow::Result<()> {
        let name = listing.details.name.clone();
        self.notifier.notify(&messages::adding(&name));

        let created = self.ledger.create_work(&self.account, &listing).await;
        created.map_err(|err| self.surface(err))?;
        self.notifier.notify(&messages::added(&name));

        let refreshed = self.refresh_works().await;
        refreshed.map_err(|err| self.surface(err))
    }

    #[instrument(skip(self, listing))]
    pub(crate) async fn update_work(&mut self, work_index: u64, listing: Listing) -> anyhow::Result<()> {
        let work = self.find_work(work_index)?;
        if !work.is_owned_by(&self.account) {
            self.notifier.notify(&messages::not_owner(work.name()));
            bail!("Only the owner can update work {work_index}");
        }

        let name = listing.details.name.clone();
        self.notifier.notify(&messages::updating(&name));

        let updated = self.ledger.update_work(&self.account, work_index, &listing).await;
        updated.map_err(|err| self.surface(err))?;
        self.notifier.notify(&messages::updated(&name));

        let refreshed = self.refresh_works().await;
        refreshed.map_err(|err| self.surface(err))
    }

    /// Deletes a work of the viewer's that has never been licensed.
    #[instrument(skip(self))]
    pub(crate) async fn delete_work(&mut self, work_index: u64) -> anyhow::Result<()> {
        let work = self.find_work(work_index)?;
        let name = work.name().to_owned();

        if !work.is_owned_by(&self.account) {
            self.notifier.notify(&messages::not_owner(&name));
            bail!("Only the owner can delete work {work_index}");
        }

        if work.license_count != 0 {
            self.notifier.notify(messages::DELETE_REFUSED_LICENSED);
            bail!(
                "Work {work_index} has {} license(s) and cannot be deleted",
                work.license_count
            );
        }

        self.notifier.notify(messages::DELETE_IN_PROGRESS);
        let deleted = self.ledger.delete_work(&self.account, work_index).await;
        deleted.map_err(|err| self.surface(err))?;
        self.notifier.notify(&messages::deleted(&name));

        let refreshed = async {
            self.refresh_works().await?;
            self.balance = self.ledger.balance(&self.account).await?;
            anyhow::Ok(())
        }
        .await;
        refreshed.map_err(|err| self.surface(err))
    }

    /// The viewer's own works that are still listed.
    pub(crate) fn owned_works(&self) -> Vec<&Work> {
        self.works
            .iter()
            .filter(|work| !work.deleted && work.is_owned_by(&self.account))
            .collect()
    }

    /// Name of the work a license was issued for, when known.
    pub(crate) fn work_name(&self, work_index: u64) -> Option<&str> {
        self.works
            .iter()
            .find(|work| work.index == work_index)
            .map(Work::name)
    }

    pub(crate) async fn render_works(&self) -> String {
        let tracker = self.tracker.lock().await;
        render::render_works(
            &self.works,
            &self.account,
            &tracker,
            self.markers.as_ref(),
            &self.explorer,
        )
    }

    pub(crate) async fn render_licenses(&self) -> String {
        let tracker = self.tracker.lock().await;
        render::render_licenses(&self.licenses, &self.works, &tracker, self.markers.as_ref())
    }

    pub(crate) fn notify(&self, text: &str) {
        self.notifier.notify(text);
    }
}
