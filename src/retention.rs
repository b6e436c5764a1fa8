use std::{
    fs, io,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use log::{info, warn};

use crate::source::is_stored_file_name;

#[derive(Debug, Default, PartialEq)]
pub struct SweepReport {
    pub deleted: Vec<PathBuf>,
    /// Files that were due but could not be inspected or removed.
    pub failed: Vec<PathBuf>,
}

/// Delete stored exports (`cqc_*.csv`) last modified more than `max_age` ago.
/// Best effort: problems are logged and skipped, a missing directory is
/// nothing to clean.
pub fn sweep(dir: &Path, max_age: Duration) -> SweepReport {
    sweep_at(dir, max_age, SystemTime::now())
}

pub fn sweep_at(dir: &Path, max_age: Duration, now: SystemTime) -> SweepReport {
    let mut report = SweepReport::default();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return report,
        Err(e) => {
            warn!("Unexpected error scanning directory {}: {}", dir.display(), e);
            return report;
        }
    };
    let cutoff = now.checked_sub(max_age).unwrap_or(SystemTime::UNIX_EPOCH);

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Failed to read entry in {}: {}", dir.display(), e);
                continue;
            }
        };
        let path = entry.path();
        let is_stored = entry
            .file_name()
            .to_str()
            .map(is_stored_file_name)
            .unwrap_or(false);
        if !is_stored {
            continue;
        }
        match is_stale(&entry, cutoff) {
            Ok(false) => {}
            Ok(true) => {
                info!("Deleting old file: {}", path.display());
                match fs::remove_file(&path) {
                    Ok(()) => report.deleted.push(path),
                    Err(e) => {
                        warn!("Failed to delete {}: {}", path.display(), e);
                        report.failed.push(path);
                    }
                }
            }
            Err(e) => {
                warn!("Failed to inspect {}: {}", path.display(), e);
                report.failed.push(path);
            }
        }
    }
    report
}

fn is_stale(entry: &fs::DirEntry, cutoff: SystemTime) -> io::Result<bool> {
    let metadata = entry.metadata()?;
    if !metadata.is_file() {
        return Ok(false);
    }
    Ok(metadata.modified()? < cutoff)
}
