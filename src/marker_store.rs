//! Client-side license markers.
//!
//! A marker is written when a purchase succeeds and lapses after a short TTL.
//! Its presence, not its value, means "this client holds an active license for
//! the work". Markers stand in for ledger expiry timestamps, which are taken
//! from the contract clock and cannot be compared with the local clock.
//!
//! The marker file is shared by every `smartcopy` process pointed at it, so a
//! purchase made from one shell is visible to a running `watch` session.

use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    io::{self, Write as _},
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

/// Marker lifetime in days, as the storefront has always configured it.
pub(crate) const MARKER_TTL_DAYS: f64 = 0.000_694_444;

/// [`MARKER_TTL_DAYS`] as a real duration (just under one minute).
pub(crate) fn marker_ttl() -> Duration {
    Duration::from_secs_f64(MARKER_TTL_DAYS * 24.0 * 60.0 * 60.0)
}

pub(crate) trait MarkerStore: Send + Sync {
    /// Whether a live marker exists for the work.
    fn contains(&self, work_index: u64) -> bool;

    /// Writes a marker that lapses after `ttl`.
    fn set(&self, work_index: u64, value: &str, ttl: Duration) -> anyhow::Result<()>;

    /// Work indices with a live marker.
    fn keys(&self) -> BTreeSet<u64>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarkerRecord {
    value: String,
    expires_at: DateTime<Utc>,
}

impl MarkerRecord {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

type Markers = BTreeMap<u64, MarkerRecord>;

/// Reads the marker file. A missing file holds no markers.
fn read_markers(path: &Path) -> anyhow::Result<Markers> {
    match fs::read_to_string(path) {
        Ok(contents) => serde_json::from_str(&contents).with_context(|| {
            format!("Failed to parse license markers from {}", path.display())
        }),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Markers::new()),
        Err(err) => Err(err)
            .with_context(|| format!("Failed to read license markers from {}", path.display())),
    }
}

/// Replaces the marker file in one step so readers never see a partial write.
fn write_markers(path: &Path, markers: &Markers) -> anyhow::Result<()> {
    let contents = serde_json::to_string_pretty(markers)?;

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp_file = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temp file in {}", parent.display()))?;
    temp_file
        .write_all(contents.as_bytes())
        .context("Failed to write license markers to temp file")?;
    temp_file
        .persist(path)
        .with_context(|| format!("Failed to write license markers to {}", path.display()))?;

    Ok(())
}

/// Marker store backed by a JSON file.
///
/// Every read goes back to the file and every `set` merges into what is on
/// disk, so concurrent processes see each other's markers. The in-memory copy
/// is only the last state read and answers reads when the file cannot be read.
/// Two processes writing at the same instant can still lose one marker.
#[derive(Debug)]
pub(crate) struct LocalMarkerStore {
    path: Option<PathBuf>,
    markers: Mutex<Markers>,
}

impl LocalMarkerStore {
    #[instrument]
    pub(crate) fn open(path: &Path) -> anyhow::Result<Self> {
        let mut markers = read_markers(path)?;

        let now = Utc::now();
        markers.retain(|_, record| record.is_live(now));
        debug!(live = markers.len(), "Loaded license markers");

        Ok(Self {
            path: Some(path.to_owned()),
            markers: Mutex::new(markers),
        })
    }

    /// Store that is never written to disk.
    #[cfg(test)]
    pub(crate) fn ephemeral() -> Self {
        Self {
            path: None,
            markers: Mutex::new(Markers::new()),
        }
    }

    /// Drops a marker as if it had lapsed.
    #[cfg(test)]
    pub(crate) fn remove(&self, work_index: u64) {
        let mut markers = self.current();
        markers.remove(&work_index);
        if let Some(path) = &self.path {
            write_markers(path, &markers).unwrap();
        }
    }

    fn lock(&self) -> MutexGuard<'_, Markers> {
        self.markers.lock().unwrap_or_else(|poisoned| {
            warn!("License marker store lock poisoned, recovering last known markers");
            PoisonError::into_inner(poisoned)
        })
    }

    /// Locks the in-memory copy after refreshing it from disk.
    fn current(&self) -> MutexGuard<'_, Markers> {
        let mut markers = self.lock();

        if let Some(path) = &self.path {
            match read_markers(path) {
                Ok(on_disk) => *markers = on_disk,
                Err(err) => warn!(?err, "Using last known license markers"),
            }
        }

        markers
    }
}

impl MarkerStore for LocalMarkerStore {
    fn contains(&self, work_index: u64) -> bool {
        let now = Utc::now();
        self.current()
            .get(&work_index)
            .is_some_and(|record| record.is_live(now))
    }

    #[instrument(skip(self))]
    fn set(&self, work_index: u64, value: &str, ttl: Duration) -> anyhow::Result<()> {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(ttl).context("Marker TTL out of range")?;

        let mut markers = self.lock();

        // An unreadable file is left alone rather than overwritten.
        if let Some(path) = &self.path {
            *markers = read_markers(path)?;
        }

        markers.retain(|_, record| record.is_live(now));
        markers.insert(
            work_index,
            MarkerRecord {
                value: value.to_owned(),
                expires_at: now + ttl,
            },
        );

        match &self.path {
            Some(path) => write_markers(path, &markers),
            None => Ok(()),
        }
    }

    fn keys(&self) -> BTreeSet<u64> {
        let now = Utc::now();
        self.current()
            .iter()
            .filter(|(_, record)| record.is_live(now))
            .map(|(work_index, _)| *work_index)
            .collect()
    }
}
