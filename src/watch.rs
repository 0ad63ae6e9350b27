use std::str::FromStr;

use anyhow::{Context as _, bail};
use tokio::{
    io::{AsyncBufReadExt as _, BufReader},
    select,
    signal::{
        self,
        unix::{SignalKind, signal},
    },
    sync::mpsc,
};
use tracing::{debug, info, instrument, warn};

use crate::{
    ledger::Ledger,
    license_tracker::{
        TrackerEvent, TrackerTimings, messages, spawn_drain_detector, spawn_sweeper,
    },
    storefront::{Storefront, render::TOKEN_SYMBOL},
};

const HELP: &str = "\
Commands:
  works           list works on the marketplace
  mine            list your own works
  licenses        list issued licenses and their local state
  interest        show licenses currently tracked as active
  balance         show the account balance
  buy <index>     buy a license for a work
  delete <index>  delete one of your works
  reload          refresh everything from the ledger
  help            show this help
  quit            leave the storefront";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionCommand {
    Works,
    Mine,
    Licenses,
    Interest,
    Balance,
    Buy(u64),
    Delete(u64),
    Reload,
    Help,
    Quit,
}

impl FromStr for SessionCommand {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut words = s.split_whitespace();
        let command = words.next().unwrap_or_default();
        let argument = words.next();

        let work_index = || {
            argument
                .context("Expected a work index")?
                .parse::<u64>()
                .context("Work index must be a non-negative integer")
        };

        Ok(match command {
            "works" | "ls" => Self::Works,
            "mine" => Self::Mine,
            "licenses" => Self::Licenses,
            "interest" => Self::Interest,
            "balance" => Self::Balance,
            "buy" => Self::Buy(work_index()?),
            "delete" => Self::Delete(work_index()?),
            "reload" => Self::Reload,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => bail!("Unknown command {other:?}, try `help`"),
        })
    }
}

/// Interactive storefront session.
///
/// Runs the sweep and drain-detection tasks against the storefront's tracker
/// and serves commands from stdin until `quit`, end of input, SIGINT or
/// SIGTERM.
#[instrument(skip_all)]
pub(crate) async fn run_watch<L: Ledger>(
    mut storefront: Storefront<L>,
    timings: TrackerTimings,
) -> anyhow::Result<()> {
    let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

    let (event_sender, mut event_receiver) = mpsc::unbounded_channel();
    let sweeper = spawn_sweeper(
        storefront.tracker(),
        storefront.markers(),
        timings,
        event_sender.clone(),
    );
    let drain_detector = spawn_drain_detector(storefront.tracker(), timings, event_sender);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    print!("{}", storefront.render_works().await);
    println!("Type `help` for commands");
    info!(?timings, "Storefront session started");

    loop {
        select! {
            event = event_receiver.recv() => {
                let Some(event) = event else {
                    warn!("License tracking tasks stopped unexpectedly");
                    break;
                };
                handle_tracker_event(&mut storefront, event).await;
            },
            line = lines.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) if line.trim().is_empty() => {}
                    Ok(Some(line)) => match line.parse::<SessionCommand>() {
                        Ok(SessionCommand::Quit) => break,
                        Ok(command) => {
                            if let Err(err) = run_session_command(&mut storefront, command).await {
                                warn!("{err:#}");
                            }
                        }
                        Err(err) => eprintln!("{err:#}"),
                    },
                    Ok(None) => {
                        debug!("Standard input closed, tracking continues until interrupted");
                        stdin_open = false;
                    }
                    Err(err) => {
                        warn!(?err, "Failed to read from standard input");
                        stdin_open = false;
                    }
                }
            },
            _ = signal::ctrl_c() => {
                info!("Received SIGINT, leaving storefront");
                break;
            },
            _ = sigterm.recv() => {
                info!("Received SIGTERM, leaving storefront");
                break;
            },
        }
    }

    sweeper.abort();
    drain_detector.abort();

    Ok(())
}

async fn handle_tracker_event<L: Ledger>(storefront: &mut Storefront<L>, event: TrackerEvent) {
    match event {
        TrackerEvent::Evicted { work_index } => {
            let name = storefront
                .work_name(work_index)
                .map_or_else(|| format!("work #{work_index}"), str::to_owned);
            storefront.notify(&messages::license_lapsed(&name));
        }
        TrackerEvent::ReloadRequested => {
            info!("Latest tracked license lapsed, reloading storefront");
            match storefront.reload().await {
                Ok(()) => print!("{}", storefront.render_works().await),
                Err(err) => warn!("Reload failed: {err:#}"),
            }
        }
    }
}

async fn run_session_command<L: Ledger>(
    storefront: &mut Storefront<L>,
    command: SessionCommand,
) -> anyhow::Result<()> {
    match command {
        SessionCommand::Works => print!("{}", storefront.render_works().await),
        SessionCommand::Mine => {
            let owned = storefront.owned_works();
            if owned.is_empty() {
                println!("You have no works listed");
            }
            for work in owned {
                println!(
                    "  #{} {} ({} license(s) issued{})",
                    work.index,
                    work.name(),
                    work.license_count,
                    if work.selling { ", on sale" } else { "" }
                );
            }
        }
        SessionCommand::Licenses => print!("{}", storefront.render_licenses().await),
        SessionCommand::Interest => {
            let tracker = storefront.tracker();
            let tracker = tracker.lock().await;
            println!(
                "Tracking {} license(s), last recorded count {}",
                tracker.len(),
                tracker.interest_count()
            );
            for license in tracker.snapshot() {
                println!(
                    "  #{} {}",
                    license.index,
                    storefront.work_name(license.work_index).unwrap_or("<unknown work>")
                );
            }
        }
        SessionCommand::Balance => {
            println!("{} {TOKEN_SYMBOL}", storefront.refresh_balance().await?);
        }
        SessionCommand::Buy(work_index) => {
            storefront.buy(work_index).await?;
            print!("{}", storefront.render_works().await);
        }
        SessionCommand::Delete(work_index) => {
            storefront.delete_work(work_index).await?;
            print!("{}", storefront.render_works().await);
        }
        SessionCommand::Reload => {
            storefront.reload().await?;
            print!("{}", storefront.render_works().await);
        }
        SessionCommand::Help => println!("{HELP}"),
        SessionCommand::Quit => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_session_commands() {
        assert_eq!("works".parse::<SessionCommand>().unwrap(), SessionCommand::Works);
        assert_eq!(
            "  buy 12 ".parse::<SessionCommand>().unwrap(),
            SessionCommand::Buy(12)
        );
        assert_eq!(
            "delete 3".parse::<SessionCommand>().unwrap(),
            SessionCommand::Delete(3)
        );
        assert_eq!("mine".parse::<SessionCommand>().unwrap(), SessionCommand::Mine);
        assert_eq!("exit".parse::<SessionCommand>().unwrap(), SessionCommand::Quit);
    }

    #[test]
    fn rejects_malformed_session_commands() {
        assert!("buy".parse::<SessionCommand>().is_err());
        assert!("buy -1".parse::<SessionCommand>().is_err());
        assert!("dance".parse::<SessionCommand>().is_err());
    }
}
