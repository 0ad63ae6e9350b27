//! Read and write access to the marketplace contract.
//!
//! The contract owns works, licenses, pricing and settlement. This module only
//! mirrors its records and forwards writes on behalf of the viewer's account.

mod amount;
mod http;
#[cfg(test)]
pub(crate) mod memory;

pub(crate) use amount::TokenAmount;
pub(crate) use http::HttpLedger;

use serde::{Deserialize, Serialize};

/// Descriptive fields of a work, set by its owner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct WorkDetails {
    pub(crate) name: String,
    pub(crate) image: String,
    pub(crate) description: String,
    pub(crate) terms: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Work {
    pub(crate) index: u64,
    pub(crate) owner: String,
    #[serde(flatten)]
    pub(crate) details: WorkDetails,
    pub(crate) price: TokenAmount,
    pub(crate) license_count: u64,
    #[serde(default)]
    pub(crate) license_token_addr: String,
    pub(crate) deleted: bool,
    pub(crate) selling: bool,
}

impl Work {
    pub(crate) fn name(&self) -> &str {
        &self.details.name
    }

    pub(crate) fn is_owned_by(&self, account: &str) -> bool {
        self.owner.eq_ignore_ascii_case(account)
    }
}

/// A license as recorded by the ledger.
///
/// `issued_on`, `expires_on` and `expired` come from the contract clock, which
/// does not agree with the client clock. Local expiry decisions are made from
/// markers instead (see [`crate::marker_store`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct License {
    pub(crate) index: u64,
    pub(crate) buyer: String,
    pub(crate) work_index: u64,
    pub(crate) issued_on: i64,
    pub(crate) expires_on: i64,
    pub(crate) expired: bool,
}

/// Result of a successful license purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PurchaseReceipt {
    pub(crate) license_index: u64,
    pub(crate) work_index: u64,
    pub(crate) name: String,
}

impl PurchaseReceipt {
    /// Stand-in license for when the refreshed ledger list does not yet show
    /// the purchase. Ledger timestamps are unknown and left at zero.
    pub(crate) fn to_license(&self, buyer: &str) -> License {
        License {
            index: self.license_index,
            buyer: buyer.to_owned(),
            work_index: self.work_index,
            issued_on: 0,
            expires_on: 0,
            expired: false,
        }
    }
}

/// Listing or relisting terms for a work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Listing {
    #[serde(flatten)]
    pub(crate) details: WorkDetails,
    pub(crate) price: TokenAmount,
    pub(crate) selling: bool,
}

impl Listing {
    /// A work that is not for sale is stored with no price and no terms.
    pub(crate) fn new(mut details: WorkDetails, price: TokenAmount, selling: bool) -> Self {
        if !selling {
            details.terms.clear();
        }

        Self {
            details,
            price: if selling { price } else { TokenAmount::ZERO },
            selling,
        }
    }
}

pub(crate) trait Ledger {
    async fn works(&self) -> anyhow::Result<Vec<Work>>;

    async fn licenses(&self) -> anyhow::Result<Vec<License>>;

    async fn balance(&self, account: &str) -> anyhow::Result<TokenAmount>;

    async fn create_work(&self, from: &str, listing: &Listing) -> anyhow::Result<()>;

    async fn update_work(&self, from: &str, work_index: u64, listing: &Listing)
    -> anyhow::Result<()>;

    async fn delete_work(&self, from: &str, work_index: u64) -> anyhow::Result<()>;

    /// Allows the marketplace to move `amount` of the viewer's tokens.
    async fn approve(&self, from: &str, amount: TokenAmount) -> anyhow::Result<()>;

    async fn buy_license(&self, from: &str, work_index: u64) -> anyhow::Result<PurchaseReceipt>;
}
