use std::cmp::Ordering;
use std::collections::HashSet;

use camino::{Utf8Path, Utf8PathBuf};
use time::OffsetDateTime;

use crate::record::{normalize_timestamp, ProfileRecord};

pub mod codec;

/// Format tag written at the head of the index file. Any other value on disk
/// causes a full rebuild.
pub const CURRENT_INDEX_VERSION: i32 = 1;

/// The cached view of every watched profile directory.
///
/// Records are always ordered by creation date, newest first. Every
/// constructor and mutator preserves that order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileIndex {
    version: i32,
    last_modified: OffsetDateTime,
    records: Vec<ProfileRecord>,
}

impl ProfileIndex {
    #[must_use]
    pub fn new(version: i32, last_modified: OffsetDateTime) -> Self {
        Self {
            version,
            last_modified: normalize_timestamp(last_modified),
            records: Vec::new(),
        }
    }

    #[must_use]
    pub fn from_records(
        version: i32,
        last_modified: OffsetDateTime,
        mut records: Vec<ProfileRecord>,
    ) -> Self {
        records.sort_by(newest_first);
        Self {
            version,
            last_modified: normalize_timestamp(last_modified),
            records,
        }
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    /// Watermark recorded at the last build or sync.
    pub fn last_modified(&self) -> OffsetDateTime {
        self.last_modified
    }

    pub fn records(&self) -> &[ProfileRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn record_for(&self, file_name: &Utf8Path) -> Option<&ProfileRecord> {
        self.records
            .iter()
            .find(|record| record.file_name == file_name)
    }

    /// Inserts after every record created at or after `record`, so equal
    /// creation dates keep their arrival order.
    pub(crate) fn insert(&mut self, record: ProfileRecord) {
        let position = self
            .records
            .partition_point(|existing| existing.creation_date >= record.creation_date);
        self.records.insert(position, record);
    }

    pub(crate) fn remove(&mut self, file_name: &Utf8Path) -> Option<ProfileRecord> {
        let position = self
            .records
            .iter()
            .position(|record| record.file_name == file_name)?;
        Some(self.records.remove(position))
    }

    pub(crate) fn remove_all(&mut self, file_names: &HashSet<Utf8PathBuf>) -> usize {
        let before = self.records.len();
        self.records
            .retain(|record| !file_names.contains(&record.file_name));
        before - self.records.len()
    }

    pub(crate) fn stamp(&mut self, version: i32, last_modified: OffsetDateTime) {
        self.version = version;
        self.last_modified = normalize_timestamp(last_modified);
    }
}

fn newest_first(a: &ProfileRecord, b: &ProfileRecord) -> Ordering {
    b.creation_date.cmp(&a.creation_date)
}
