use colored::Colorize;
use tracing::{debug, info};

/// Fire-and-forget sink for user-facing status text.
pub(crate) trait Notifier: Send + Sync {
    fn notify(&self, text: &str);

    /// Hides the current notification, if the surface has such a notion.
    fn clear(&self) {}
}

/// Writes notifications to stderr so they stay apart from listings on stdout.
#[derive(Debug, Default)]
pub(crate) struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn notify(&self, text: &str) {
        info!(notification = text, "Notification");
        eprintln!("{}", text.bold());
    }

    fn clear(&self) {
        debug!("Notification cleared");
    }
}
