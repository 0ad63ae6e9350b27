//! In-process ledger double used by tests.

use std::sync::Mutex;

use anyhow::{anyhow, bail, ensure};

use super::{Ledger, License, Listing, PurchaseReceipt, TokenAmount, Work};

#[derive(Debug, Default)]
struct State {
    works: Vec<Work>,
    licenses: Vec<License>,
    balances: Vec<(String, TokenAmount)>,
    approvals: Vec<(String, TokenAmount)>,
    clock: i64,
    fail_next: Option<(usize, String)>,
}

#[derive(Debug, Default)]
pub(crate) struct MemoryLedger {
    state: Mutex<State>,
}

impl MemoryLedger {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_work(self, owner: &str, name: &str, price: &str, selling: bool) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let index = state.works.len() as u64;
            state.works.push(Work {
                index,
                owner: owner.to_owned(),
                details: super::WorkDetails {
                    name: name.to_owned(),
                    ..Default::default()
                },
                price: price.parse().unwrap(),
                license_count: 0,
                license_token_addr: format!("0xtoken{index}"),
                deleted: false,
                selling,
            });
        }
        self
    }

    pub(crate) fn with_license(self, buyer: &str, work_index: u64, issued_on: i64) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let index = state.licenses.len() as u64;
            state.licenses.push(License {
                index,
                buyer: buyer.to_owned(),
                work_index,
                issued_on,
                expires_on: issued_on + 60,
                expired: false,
            });
        }
        self
    }

    pub(crate) fn with_balance(self, account: &str, amount: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .balances
            .push((account.to_owned(), amount.parse().unwrap()));
        self
    }

    /// Makes the next ledger call fail with `message`.
    pub(crate) fn fail_next(&self, message: &str) {
        self.fail_after(0, message);
    }

    /// Lets `calls` ledger calls succeed, then fails the one after.
    pub(crate) fn fail_after(&self, calls: usize, message: &str) {
        self.state.lock().unwrap().fail_next = Some((calls, message.to_owned()));
    }

    pub(crate) fn approvals(&self) -> Vec<(String, TokenAmount)> {
        self.state.lock().unwrap().approvals.clone()
    }

    pub(crate) fn work(&self, index: u64) -> Work {
        self.state.lock().unwrap().works[index as usize].clone()
    }

    fn lock(&self) -> anyhow::Result<std::sync::MutexGuard<'_, State>> {
        let mut state = self.state.lock().map_err(|_| anyhow!("ledger poisoned"))?;
        match state.fail_next.take() {
            Some((0, message)) => bail!(message),
            Some((calls, message)) => state.fail_next = Some((calls - 1, message)),
            None => {}
        }
        Ok(state)
    }
}

impl Ledger for MemoryLedger {
    async fn works(&self) -> anyhow::Result<Vec<Work>> {
        Ok(self.lock()?.works.clone())
    }

    async fn licenses(&self) -> anyhow::Result<Vec<License>> {
        Ok(self.lock()?.licenses.clone())
    }

    async fn balance(&self, account: &str) -> anyhow::Result<TokenAmount> {
        Ok(self
            .lock()?
            .balances
            .iter()
            .find(|(owner, _)| owner == account)
            .map_or(TokenAmount::ZERO, |(_, amount)| *amount))
    }

    async fn create_work(&self, from: &str, listing: &Listing) -> anyhow::Result<()> {
        let mut state = self.lock()?;
        let index = state.works.len() as u64;
        state.works.push(Work {
            index,
            owner: from.to_owned(),
            details: listing.details.clone(),
            price: listing.price,
            license_count: 0,
            license_token_addr: format!("0xtoken{index}"),
            deleted: false,
            selling: listing.selling,
        });
        Ok(())
    }

    async fn update_work(&self, from: &str, work_index: u64, listing: &Listing) -> anyhow::Result<()> {
        let mut state = self.lock()?;
        let work = state
            .works
            .get_mut(work_index as usize)
            .ok_or_else(|| anyhow!("no work {work_index}"))?;
        ensure!(work.owner == from, "only the owner can update a work");
        work.details = listing.details.clone();
        work.price = listing.price;
        work.selling = listing.selling;
        Ok(())
    }

    async fn delete_work(&self, from: &str, work_index: u64) -> anyhow::Result<()> {
        let mut state = self.lock()?;
        let work = state
            .works
            .get_mut(work_index as usize)
            .ok_or_else(|| anyhow!("no work {work_index}"))?;
        ensure!(work.owner == from, "only the owner can delete a work");
        ensure!(work.license_count == 0, "work has active licenses");
        work.deleted = true;
        Ok(())
    }

    async fn approve(&self, from: &str, amount: TokenAmount) -> anyhow::Result<()> {
        self.lock()?.approvals.push((from.to_owned(), amount));
        Ok(())
    }

    async fn buy_license(&self, from: &str, work_index: u64) -> anyhow::Result<PurchaseReceipt> {
        let mut state = self.lock()?;
        state.clock += 100;
        let issued_on = state.clock;
        let work = state
            .works
            .get_mut(work_index as usize)
            .ok_or_else(|| anyhow!("no work {work_index}"))?;
        ensure!(work.selling, "work is not for sale");
        work.license_count += 1;
        let name = work.details.name.clone();

        let license_index = state.licenses.len() as u64;
        state.licenses.push(License {
            index: license_index,
            buyer: from.to_owned(),
            work_index,
            issued_on,
            expires_on: issued_on + 60,
            expired: false,
        });

        Ok(PurchaseReceipt {
            license_index,
            work_index,
            name,
        })
    }
}
