mod commands;
mod global_opts;
mod ledger;
pub(crate) mod license_tracker;
mod marker_store;
mod notify;
mod storefront;
mod watch;

use std::env;

use clap::{Parser, command};
use commands::{Commands, handle_command};
use global_opts::GlobalOpts;

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    global_opts: GlobalOpts,

    #[command(subcommand)]
    command: Commands,
}

fn setup_logging() {
    use std::io::IsTerminal;
    use tracing_subscriber::{
        filter::{EnvFilter, LevelFilter},
        fmt,
    };

    let color = std::io::stderr().is_terminal()
        && (match env::var("COLORTERM") {
            Ok(value) => value == "truecolor" || value == "24bit",
            _ => false,
        } || match env::var("TERM") {
            Ok(value) => value == "direct" || value == "truecolor",
            _ => false,
        });

    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    // Stdout carries the storefront listings; logs go to stderr.
    let fmt = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    if color {
        fmt.event_format(fmt::format().pretty())
            .with_file(false)
            .with_line_number(false)
            .with_ansi(color)
            .init();
    } else {
        fmt.with_file(false)
            .with_line_number(false)
            .with_ansi(false)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opts = Cli::parse();

    setup_logging();

    handle_command(opts.global_opts, opts.command).await
}
