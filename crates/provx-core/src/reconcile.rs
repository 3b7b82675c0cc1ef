use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use rayon::prelude::*;
use time::OffsetDateTime;
use tracing::{debug, warn};

use provx_domain::{is_profile_path, ProfileLoader};

use crate::index::codec::{load_index, save_index, SaveOutcome};
use crate::index::{ProfileIndex, CURRENT_INDEX_VERSION};
use crate::record::ProfileRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileKind {
    /// The index already matched the directories.
    Fresh,
    Rebuilt,
    Synced,
}

impl ReconcileKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ReconcileKind::Fresh => "fresh",
            ReconcileKind::Rebuilt => "rebuilt",
            ReconcileKind::Synced => "synced",
        }
    }
}

/// What a reconcile pass did to reach its index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub kind: ReconcileKind,
    pub parsed: usize,
    pub added: usize,
    pub replaced: usize,
    pub removed: usize,
    pub failed: usize,
    /// `None` when nothing needed persisting.
    pub save: Option<SaveOutcome>,
}

impl ReconcileReport {
    fn new(kind: ReconcileKind) -> Self {
        Self {
            kind,
            parsed: 0,
            added: 0,
            replaced: 0,
            removed: 0,
            failed: 0,
            save: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Reconciled {
    pub index: Arc<ProfileIndex>,
    pub report: ReconcileReport,
}

/// Keeps a [`ProfileIndex`] consistent with a set of profile directories.
///
/// Callers hold the cache path's lock for the whole pass.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Reconciler<'a> {
    directories: &'a [PathBuf],
    cache_path: &'a Path,
    loader: &'a ProfileLoader,
}

#[derive(Debug)]
pub(crate) struct ProfileFile {
    pub(crate) path: Utf8PathBuf,
    pub(crate) modified: OffsetDateTime,
}

/// Profile files across the watched directories, sorted by path.
#[derive(Debug)]
pub(crate) struct Scan {
    pub(crate) files: Vec<ProfileFile>,
    pub(crate) watermark: OffsetDateTime,
}

impl<'a> Reconciler<'a> {
    pub(crate) fn new(
        directories: &'a [PathBuf],
        cache_path: &'a Path,
        loader: &'a ProfileLoader,
    ) -> Self {
        Self {
            directories,
            cache_path,
            loader,
        }
    }

    /// Loads the persisted index and brings it up to date, rebuilding when
    /// the file is missing, unreadable or from another format version.
    pub(crate) fn open(&self) -> Reconciled {
        let scan = scan_directories(self.directories);
        match load_index(self.cache_path) {
            Ok(index) => self.bring_up_to_date(Arc::new(index), scan),
            Err(miss) => {
                debug!(
                    path = %self.cache_path.display(),
                    reason = %miss,
                    "profile index cache miss"
                );
                self.rebuild_from(&scan)
            }
        }
    }

    /// Like [`Reconciler::open`], seeded from an in-memory snapshot when one
    /// is available.
    pub(crate) fn reconcile(&self, previous: Option<Arc<ProfileIndex>>) -> Reconciled {
        match previous {
            Some(index) => {
                let scan = scan_directories(self.directories);
                self.bring_up_to_date(index, scan)
            }
            None => self.open(),
        }
    }

    /// Discards any existing index and parses every profile file.
    pub(crate) fn rebuild(&self) -> Reconciled {
        let scan = scan_directories(self.directories);
        self.rebuild_from(&scan)
    }

    fn bring_up_to_date(&self, index: Arc<ProfileIndex>, scan: Scan) -> Reconciled {
        if index.version() != CURRENT_INDEX_VERSION {
            debug!(
                found = index.version(),
                expected = CURRENT_INDEX_VERSION,
                "profile index version changed"
            );
            return self.rebuild_from(&scan);
        }
        if index.last_modified() == scan.watermark {
            return Reconciled {
                index,
                report: ReconcileReport::new(ReconcileKind::Fresh),
            };
        }
        self.sync(&index, &scan)
    }

    fn rebuild_from(&self, scan: &Scan) -> Reconciled {
        let mut report = ReconcileReport::new(ReconcileKind::Rebuilt);
        let records: Vec<ProfileRecord> = scan
            .files
            .par_iter()
            .filter_map(|file| self.load(file))
            .collect();
        report.parsed = scan.files.len();
        report.added = records.len();
        report.failed = scan.files.len() - records.len();

        let index = ProfileIndex::from_records(CURRENT_INDEX_VERSION, scan.watermark, records);
        report.save = Some(save_index(&index, self.cache_path));
        debug!(
            records = index.len(),
            failed = report.failed,
            "rebuilt profile index"
        );
        Reconciled {
            index: Arc::new(index),
            report,
        }
    }

    fn sync(&self, previous: &ProfileIndex, scan: &Scan) -> Reconciled {
        let mut report = ReconcileReport::new(ReconcileKind::Synced);
        let mut index = previous.clone();
        let mut unseen: HashMap<&Utf8PathBuf, OffsetDateTime> = previous
            .records()
            .iter()
            .map(|record| (&record.file_name, record.last_modified))
            .collect();

        let mut changed = Vec::new();
        let mut fresh = Vec::new();
        for file in &scan.files {
            match unseen.remove(&file.path) {
                Some(indexed) if indexed == file.modified => {}
                Some(_) => changed.push(file),
                None => fresh.push(file),
            }
        }

        let gone: HashSet<Utf8PathBuf> = unseen.into_keys().cloned().collect();
        report.removed = index.remove_all(&gone);

        for file in &changed {
            index.remove(&file.path);
        }
        let reparsed: Vec<(bool, Option<ProfileRecord>)> = changed
            .par_iter()
            .map(|file| (true, self.load(file)))
            .chain(fresh.par_iter().map(|file| (false, self.load(file))))
            .collect();
        report.parsed = reparsed.len();
        for (was_indexed, record) in reparsed {
            match record {
                Some(record) => {
                    if was_indexed {
                        report.replaced += 1;
                    } else {
                        report.added += 1;
                    }
                    index.insert(record);
                }
                None => report.failed += 1,
            }
        }

        index.stamp(CURRENT_INDEX_VERSION, scan.watermark);
        report.save = Some(save_index(&index, self.cache_path));
        debug!(
            added = report.added,
            replaced = report.replaced,
            removed = report.removed,
            failed = report.failed,
            "synced profile index"
        );
        Reconciled {
            index: Arc::new(index),
            report,
        }
    }

    fn load(&self, file: &ProfileFile) -> Option<ProfileRecord> {
        match ProfileRecord::load(self.loader, &file.path, file.modified) {
            Ok(record) => Some(record),
            Err(err) => {
                warn!(path = %file.path, error = %err, "skipping unreadable provisioning profile");
                None
            }
        }
    }
}

pub(crate) fn scan_directories(directories: &[PathBuf]) -> Scan {
    let mut scan = Scan {
        files: Vec::new(),
        watermark: OffsetDateTime::UNIX_EPOCH,
    };
    for dir in directories {
        if let Err(err) = scan_directory(dir, &mut scan) {
            warn!(
                path = %dir.display(),
                error = %format!("{err:#}"),
                "skipping profile directory"
            );
        }
    }
    scan.files.sort_by(|a, b| a.path.cmp(&b.path));
    scan.files.dedup_by(|a, b| a.path == b.path);
    scan
}

fn scan_directory(dir: &Path, scan: &mut Scan) -> Result<()> {
    let metadata = match fs::metadata(dir) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!(path = %dir.display(), "profile directory does not exist");
            return Ok(());
        }
        Err(err) => {
            return Err(err).with_context(|| format!("failed to stat {}", dir.display()));
        }
    };
    if !metadata.is_dir() {
        debug!(path = %dir.display(), "profile path is not a directory");
        return Ok(());
    }
    let entries =
        fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))?;
    if let Ok(modified) = metadata.modified() {
        observe(&mut scan.watermark, to_utc(modified));
    }

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                debug!(%err, root = %dir.display(), "skipping entry during profile scan");
                continue;
            }
        };
        let path = entry.path();
        if !is_profile_path(&path) {
            continue;
        }
        let metadata = match fs::metadata(&path) {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => continue,
            Err(err) => {
                debug!(path = %path.display(), error = %err, "skipping unreadable profile file");
                continue;
            }
        };
        let Ok(modified) = metadata.modified() else {
            debug!(path = %path.display(), "profile file has no modification time");
            continue;
        };
        let modified = to_utc(modified);
        let path = match Utf8PathBuf::from_path_buf(path) {
            Ok(path) => path,
            Err(path) => {
                debug!(path = %path.display(), "skipping profile with non UTF-8 path");
                continue;
            }
        };
        observe(&mut scan.watermark, modified);
        scan.files.push(ProfileFile { path, modified });
    }
    Ok(())
}

fn observe(watermark: &mut OffsetDateTime, modified: OffsetDateTime) {
    if modified > *watermark {
        *watermark = modified;
    }
}

fn to_utc(value: SystemTime) -> OffsetDateTime {
    let nanos = match value.duration_since(SystemTime::UNIX_EPOCH) {
        Ok(after) => i128::try_from(after.as_nanos()).unwrap_or(i128::MAX),
        Err(before) => -i128::try_from(before.duration().as_nanos()).unwrap_or(i128::MAX),
    };
    let nanos = nanos.clamp(i128::from(i64::MIN), i128::from(i64::MAX));
    OffsetDateTime::from_unix_timestamp_nanos(nanos).unwrap_or(OffsetDateTime::UNIX_EPOCH)
}
