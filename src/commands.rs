use std::sync::Arc;

use anyhow::{Context as _, ensure};
use clap::{Args, Subcommand};
use tracing::{debug, info};

use crate::{
    global_opts::GlobalOpts,
    ledger::{HttpLedger, Listing, TokenAmount, WorkDetails},
    marker_store::{LocalMarkerStore, marker_ttl},
    notify::TerminalNotifier,
    storefront::{Storefront, render::TOKEN_SYMBOL},
    watch::run_watch,
};

#[derive(Debug, Subcommand)]
pub(crate) enum Commands {
    /// Open an interactive storefront session that tracks active licenses
    Watch,

    /// List works offered on the marketplace
    Works,

    /// List issued licenses with their local tracking state
    Licenses,

    /// Show the account's token balance
    Balance,

    /// Buy a time-limited license for a work
    Buy {
        /// Index of the work to license
        work_index: u64,
    },

    /// List a new work
    Create(ListingArgs),

    /// Change the details or terms of one of your works
    Update {
        /// Index of the work to update
        work_index: u64,

        #[command(flatten)]
        listing: ListingArgs,
    },

    /// Delete one of your works that has never been licensed
    Delete {
        /// Index of the work to delete
        work_index: u64,
    },
}

#[derive(Debug, Args)]
pub(crate) struct ListingArgs {
    /// Name of the work
    #[arg(long)]
    name: String,

    /// Image URL
    #[arg(long, default_value = "")]
    image: String,

    /// Description shown on the work card
    #[arg(long, default_value = "")]
    description: String,

    /// Terms of use licensees agree to
    #[arg(long, default_value = "")]
    terms: String,

    /// Offer licenses for sale
    #[arg(long)]
    selling: bool,

    /// License price in tokens (e.g. `2.50`); required when selling
    #[arg(long)]
    price: Option<TokenAmount>,
}

impl ListingArgs {
    fn into_listing(self) -> anyhow::Result<Listing> {
        ensure!(
            !self.selling || self.price.is_some(),
            "--price is required when offering licenses with --selling"
        );

        let details = WorkDetails {
            name: self.name,
            image: self.image,
            description: self.description,
            terms: self.terms,
        };

        Ok(Listing::new(
            details,
            self.price.unwrap_or(TokenAmount::ZERO),
            self.selling,
        ))
    }
}

fn build_storefront(global_opts: &GlobalOpts) -> anyhow::Result<Storefront<HttpLedger>> {
    let endpoint = global_opts.ledger_endpoint.clone().context(
        "The ledger gateway endpoint must be provided via --ledger-endpoint or SMARTCOPY_LEDGER_ENDPOINT",
    )?;
    let account = global_opts
        .account
        .clone()
        .context("The account address must be provided via --account or SMARTCOPY_ACCOUNT")?;

    let ledger = HttpLedger::new(endpoint, global_opts.ledger_api_key.as_deref())?;
    let markers = LocalMarkerStore::open(&global_opts.marker_store)?;

    debug!(
        %account,
        marker_store = %global_opts.marker_store.display(),
        "Storefront configured"
    );

    Ok(Storefront::new(
        ledger,
        Arc::new(markers),
        Arc::new(TerminalNotifier),
        account,
        global_opts.explorer_url.clone(),
        marker_ttl(),
    ))
}

pub(crate) async fn handle_command(
    global_opts: GlobalOpts,
    command: Commands,
) -> anyhow::Result<()> {
    let mut storefront = build_storefront(&global_opts)?;

    if let Commands::Create(listing) = command {
        return storefront.create_work(listing.into_listing()?).await;
    }

    storefront.load().await?;

    match command {
        Commands::Watch => run_watch(storefront, global_opts.tracker_timings()).await?,
        Commands::Works => print!("{}", storefront.render_works().await),
        Commands::Licenses => print!("{}", storefront.render_licenses().await),
        Commands::Balance => println!("{} {TOKEN_SYMBOL}", storefront.balance()),
        Commands::Buy { work_index } => {
            let receipt = storefront.buy(work_index).await?;
            info!(
                license_index = receipt.license_index,
                work_index = receipt.work_index,
                name = %receipt.name,
                "License bought"
            );
        }
        Commands::Update {
            work_index,
            listing,
        } => {
            storefront
                .update_work(work_index, listing.into_listing()?)
                .await?;
        }
        Commands::Delete { work_index } => storefront.delete_work(work_index).await?,
        Commands::Create(_) => unreachable!("create is handled before loading"),
    }

    Ok(())
}
