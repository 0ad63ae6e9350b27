use std::{path::PathBuf, time::Duration};

use clap::Args;
use url::Url;

use crate::license_tracker::TrackerTimings;

#[derive(Debug, Args)]
pub(crate) struct GlobalOpts {
    /// Marketplace Ledger Gateway Endpoint
    ///
    /// Base URL of the JSON gateway in front of the marketplace contract
    /// (e.g. `https://gateway.smartcopy.example:8443`).
    #[arg(short = 'e', long, env = "SMARTCOPY_LEDGER_ENDPOINT", global = true)]
    pub(crate) ledger_endpoint: Option<Url>,

    /// Account Address
    ///
    /// The account the storefront acts for. Purchases, listings and deletions
    /// are sent from this account.
    #[arg(short, long, env = "SMARTCOPY_ACCOUNT", global = true)]
    pub(crate) account: Option<String>,

    /// Ledger Gateway API Key
    #[arg(
        short = 'k',
        long,
        env = "SMARTCOPY_LEDGER_API_KEY",
        hide_env_values = true,
        global = true
    )]
    pub(crate) ledger_api_key: Option<String>,

    /// Path of the local license marker file
    #[arg(
        short,
        long,
        env = "SMARTCOPY_MARKER_STORE",
        default_value = ".smartcopy-markers.json",
        global = true
    )]
    pub(crate) marker_store: PathBuf,

    /// Block explorer used for account and license token links
    #[arg(
        long,
        env = "SMARTCOPY_EXPLORER_URL",
        default_value = "https://alfajores-blockscout.celo-testnet.org",
        global = true
    )]
    pub(crate) explorer_url: Url,

    /// Seconds between license sweeps
    #[arg(long, default_value_t = 10, hide = true, global = true)]
    pub(crate) sweep_interval_secs: u64,

    /// Seconds a sweep waits before checking a license marker
    #[arg(long, default_value_t = 60, hide = true, global = true)]
    pub(crate) eviction_delay_secs: u64,

    /// Seconds between checks for a lapsed license
    #[arg(long, default_value_t = 1, hide = true, global = true)]
    pub(crate) drain_check_interval_secs: u64,
}

impl GlobalOpts {
    pub(crate) fn tracker_timings(&self) -> TrackerTimings {
        TrackerTimings {
            sweep_interval: Duration::from_secs(self.sweep_interval_secs.max(1)),
            eviction_delay: Duration::from_secs(self.eviction_delay_secs),
            drain_check_interval: Duration::from_secs(self.drain_check_interval_secs.max(1)),
        }
    }
}
