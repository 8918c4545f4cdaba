//! Age-based purge of stale uploads and results
//!
//! Best effort: a file that fails to delete is logged and skipped, and a file
//! that disappears between listing and deletion counts as already cleaned.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Outcome of one sweep over a directory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub removed: usize,
    pub kept: usize,
    pub failed: usize,
}

impl PurgeReport {
    fn merge(&mut self, other: PurgeReport) {
        self.removed += other.removed;
        self.kept += other.kept;
        self.failed += other.failed;
    }
}

/// Delete regular files in `dir` last modified more than `max_age` ago
pub async fn purge_older_than(dir: &Path, max_age: Duration) -> PurgeReport {
    let mut report = PurgeReport::default();

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return report,
        Err(e) => {
            warn!("Cannot list {:?} for cleanup: {}", dir, e);
            report.failed += 1;
            return report;
        }
    };

    let now = SystemTime::now();
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                warn!("Error reading {:?} during cleanup: {}", dir, e);
                report.failed += 1;
                break;
            }
        };
        let path = entry.path();

        let modified = match entry.metadata().await {
            Ok(meta) if !meta.is_file() => continue,
            Ok(meta) => meta.modified(),
            Err(e) => Err(e),
        };
        let modified = match modified {
            Ok(time) => time,
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => {
                warn!("Cannot stat {:?}: {}", path, e);
                report.failed += 1;
                continue;
            }
        };

        let age = now.duration_since(modified).unwrap_or_default();
        if age <= max_age {
            report.kept += 1;
            continue;
        }

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Cleaned up old file: {:?}", path);
                report.removed += 1;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                warn!("Error cleaning up {:?}: {}", path, e);
                report.failed += 1;
            }
        }
    }

    report
}

/// Sweep every directory once
pub async fn sweep(dirs: &[PathBuf], max_age: Duration) -> PurgeReport {
    let mut total = PurgeReport::default();
    for dir in dirs {
        total.merge(purge_older_than(dir, max_age).await);
    }
    total
}

/// Run the sweep every `every` until `shutdown` flips to true
///
/// A zero `every` leaves cleanup disabled.
pub fn spawn_sweeper(
    dirs: Vec<PathBuf>,
    every: Duration,
    max_age: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if every.is_zero() {
            warn!("Cleanup interval is zero, sweeper disabled");
            return;
        }

        let mut ticker = interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = sweep(&dirs, max_age).await;
                    if report.removed > 0 || report.failed > 0 {
                        info!(
                            "Cleanup removed {} files ({} failed, {} kept)",
                            report.removed, report.failed, report.kept
                        );
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("Cleanup sweeper stopping");
                        break;
                    }
                }
            }
        }
    })
}
