//! Binary form of [`ProfileIndex`].
//!
//! Little-endian throughout. Strings are a `u32` byte length followed by
//! UTF-8; timestamps are UTC unix nanoseconds in an `i64`; counts are `i32`.
//!
//! ```text
//! i32 version | i64 watermark | i32 count | record * count
//! record: file_name, last_modified, name, uuid, distribution,
//!         creation_date, expiration_date, [platform], application_identifier,
//!         [(certificate name, thumbprint)]
//! ```

use std::fs;
use std::io;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use camino::Utf8PathBuf;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, warn};

use provx_domain::{DistributionType, Platform};

use super::{ProfileIndex, CURRENT_INDEX_VERSION};
use crate::fs::write_atomic;
use crate::record::{DeveloperCertificate, ProfileRecord};

/// Why a persisted index could not be used. Every variant means "rebuild".
#[derive(Debug, Error)]
pub enum CacheMiss {
    #[error("index file does not exist")]
    NotFound,
    #[error("failed to read index file: {0}")]
    Io(#[source] io::Error),
    #[error("index format version {found} does not match {expected}")]
    Version { found: i32, expected: i32 },
    #[error("index file is truncated")]
    Truncated,
    #[error("index file is corrupt: {0}")]
    Corrupt(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    Failed,
}

impl SaveOutcome {
    pub fn is_saved(self) -> bool {
        matches!(self, SaveOutcome::Saved)
    }
}

pub fn load_index(path: &Path) -> Result<ProfileIndex, CacheMiss> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Err(CacheMiss::NotFound),
        Err(err) => return Err(CacheMiss::Io(err)),
    };
    decode_index(&bytes)
}

/// Decodes a whole index. A version other than [`CURRENT_INDEX_VERSION`] is
/// rejected before any record is read.
pub fn decode_index(bytes: &[u8]) -> Result<ProfileIndex, CacheMiss> {
    let mut reader = Reader::new(bytes);
    let version = reader.i32()?;
    if version != CURRENT_INDEX_VERSION {
        return Err(CacheMiss::Version {
            found: version,
            expected: CURRENT_INDEX_VERSION,
        });
    }
    let watermark = reader.timestamp()?;
    let count = reader.count()?;
    let mut records = Vec::with_capacity(count.min(4096));
    for _ in 0..count {
        records.push(read_record(&mut reader)?);
    }
    if !reader.is_at_end() {
        return Err(CacheMiss::Corrupt(format!(
            "{} trailing bytes",
            reader.remaining()
        )));
    }
    Ok(ProfileIndex::from_records(version, watermark, records))
}

pub fn encode_index(index: &ProfileIndex) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(64 + index.len() * 256);
    out.extend_from_slice(&index.version().to_le_bytes());
    write_timestamp(&mut out, index.last_modified());
    write_count(&mut out, index.len())?;
    for record in index.records() {
        write_record(&mut out, record)
            .with_context(|| format!("failed to encode record for {}", record.file_name))?;
    }
    Ok(out)
}

/// Persists `index` atomically. Failures are logged and reported, never raised.
pub fn save_index(index: &ProfileIndex, path: &Path) -> SaveOutcome {
    let result = encode_index(index).and_then(|bytes| write_atomic(path, &bytes));
    match result {
        Ok(()) => {
            debug!(path = %path.display(), records = index.len(), "saved profile index");
            SaveOutcome::Saved
        }
        Err(err) => {
            warn!(
                path = %path.display(),
                error = %format!("{err:#}"),
                "failed to save profile index"
            );
            SaveOutcome::Failed
        }
    }
}

fn read_record(reader: &mut Reader<'_>) -> Result<ProfileRecord, CacheMiss> {
    let file_name = Utf8PathBuf::from(reader.string()?);
    let last_modified = reader.timestamp()?;
    let name = reader.string()?;
    let uuid = reader.string()?;
    let distribution_name = reader.string()?;
    let distribution = DistributionType::from_canonical(&distribution_name).ok_or_else(|| {
        CacheMiss::Corrupt(format!("unknown distribution type `{distribution_name}`"))
    })?;
    let creation_date = reader.timestamp()?;
    let expiration_date = reader.timestamp()?;

    let platform_count = reader.count()?;
    let mut platforms = Vec::with_capacity(platform_count.min(Platform::ALL.len()));
    for _ in 0..platform_count {
        let platform_name = reader.string()?;
        let platform = Platform::from_name(&platform_name)
            .ok_or_else(|| CacheMiss::Corrupt(format!("unknown platform `{platform_name}`")))?;
        platforms.push(platform);
    }

    let application_identifier = reader.string()?;

    let certificate_count = reader.count()?;
    let mut developer_certificates = Vec::with_capacity(certificate_count.min(64));
    for _ in 0..certificate_count {
        developer_certificates.push(DeveloperCertificate {
            name: reader.string()?,
            thumbprint: reader.string()?,
        });
    }

    Ok(ProfileRecord {
        file_name,
        last_modified,
        name,
        uuid,
        distribution,
        creation_date,
        expiration_date,
        platforms,
        application_identifier,
        developer_certificates,
    })
}

fn write_record(out: &mut Vec<u8>, record: &ProfileRecord) -> Result<()> {
    write_string(out, record.file_name.as_str())?;
    write_timestamp(out, record.last_modified);
    write_string(out, &record.name)?;
    write_string(out, &record.uuid)?;
    write_string(out, &record.distribution.to_canonical())?;
    write_timestamp(out, record.creation_date);
    write_timestamp(out, record.expiration_date);
    write_count(out, record.platforms.len())?;
    for platform in &record.platforms {
        write_string(out, platform.as_str())?;
    }
    write_string(out, &record.application_identifier)?;
    write_count(out, record.developer_certificates.len())?;
    for cert in &record.developer_certificates {
        write_string(out, &cert.name)?;
        write_string(out, &cert.thumbprint)?;
    }
    Ok(())
}

fn write_string(out: &mut Vec<u8>, value: &str) -> Result<()> {
    let len = u32::try_from(value.len())
        .map_err(|_| anyhow!("string of {} bytes is too long to encode", value.len()))?;
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(value.as_bytes());
    Ok(())
}

fn write_count(out: &mut Vec<u8>, count: usize) -> Result<()> {
    let count =
        i32::try_from(count).map_err(|_| anyhow!("count {count} is too large to encode"))?;
    out.extend_from_slice(&count.to_le_bytes());
    Ok(())
}

fn write_timestamp(out: &mut Vec<u8>, value: OffsetDateTime) {
    let nanos = value
        .unix_timestamp_nanos()
        .clamp(i128::from(i64::MIN), i128::from(i64::MAX));
    // Clamped above, so the conversion cannot fail.
    let nanos = i64::try_from(nanos).unwrap_or_default();
    out.extend_from_slice(&nanos.to_le_bytes());
}

struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], CacheMiss> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or(CacheMiss::Truncated)?;
        let slice = &self.bytes[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], CacheMiss> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.take(N)?);
        Ok(buf)
    }

    fn i32(&mut self) -> Result<i32, CacheMiss> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    fn count(&mut self) -> Result<usize, CacheMiss> {
        let count = self.i32()?;
        usize::try_from(count).map_err(|_| CacheMiss::Corrupt(format!("negative count {count}")))
    }

    fn timestamp(&mut self) -> Result<OffsetDateTime, CacheMiss> {
        let nanos = i64::from_le_bytes(self.array()?);
        OffsetDateTime::from_unix_timestamp_nanos(i128::from(nanos))
            .map_err(|err| CacheMiss::Corrupt(format!("timestamp {nanos} out of range: {err}")))
    }

    fn string(&mut self) -> Result<String, CacheMiss> {
        let len = u32::from_le_bytes(self.array()?);
        let len = usize::try_from(len)
            .map_err(|_| CacheMiss::Corrupt(format!("string length {len} too large")))?;
        let raw = self.take(len)?;
        String::from_utf8(raw.to_vec())
            .map_err(|err| CacheMiss::Corrupt(format!("invalid UTF-8: {err}")))
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    fn is_at_end(&self) -> bool {
        self.remaining() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::tests::record;

    fn sample() -> ProfileIndex {
        let mut first = record("alpha", 200);
        first.platforms = vec![Platform::Ios, Platform::TvOs];
        first.distribution = DistributionType::AD_HOC | DistributionType::APP_STORE;
        first.developer_certificates = vec![DeveloperCertificate {
            name: "Apple Development: Jane".into(),
            thumbprint: "A1B2".into(),
        }];
        let mut second = record("beta", 100);
        second.distribution = DistributionType::ANY;
        second.application_identifier = "T1.com.example.*".into();
        ProfileIndex::from_records(
            CURRENT_INDEX_VERSION,
            OffsetDateTime::UNIX_EPOCH + time::Duration::nanoseconds(1_234_567_891),
            vec![second, first],
        )
    }

    #[test]
    fn round_trips_through_disk() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("Provisioning Profiles.index");
        let index = sample();
        assert_eq!(save_index(&index, &path), SaveOutcome::Saved);
        let loaded = load_index(&path).expect("load");
        assert_eq!(loaded, index);
    }

    #[test]
    fn missing_file_is_not_found() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = load_index(&temp.path().join("absent.index")).expect_err("miss");
        assert!(matches!(err, CacheMiss::NotFound));
    }

    #[test]
    fn every_truncation_is_a_miss() {
        let bytes = encode_index(&sample()).expect("encode");
        for len in 0..bytes.len() {
            assert!(
                decode_index(&bytes[..len]).is_err(),
                "prefix of {len} bytes decoded"
            );
        }
    }

    #[test]
    fn trailing_bytes_are_corrupt() {
        let mut bytes = encode_index(&sample()).expect("encode");
        bytes.push(0);
        assert!(matches!(decode_index(&bytes), Err(CacheMiss::Corrupt(_))));
    }

    #[test]
    fn negative_count_is_corrupt() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&CURRENT_INDEX_VERSION.to_le_bytes());
        bytes.extend_from_slice(&0i64.to_le_bytes());
        bytes.extend_from_slice(&(-1i32).to_le_bytes());
        assert!(matches!(decode_index(&bytes), Err(CacheMiss::Corrupt(_))));
    }

    #[test]
    fn other_version_is_rejected() {
        let mut bytes = encode_index(&sample()).expect("encode");
        bytes[..4].copy_from_slice(&(CURRENT_INDEX_VERSION + 1).to_le_bytes());
        assert!(matches!(
            decode_index(&bytes),
            Err(CacheMiss::Version { found, .. }) if found == CURRENT_INDEX_VERSION + 1
        ));
    }

    #[test]
    fn unknown_platform_name_is_corrupt() {
        let mut index_record = record("gamma", 10);
        index_record.platforms = vec![Platform::TvOs];
        let index = ProfileIndex::from_records(
            CURRENT_INDEX_VERSION,
            OffsetDateTime::UNIX_EPOCH,
            vec![index_record],
        );
        let mut bytes = encode_index(&index).expect("encode");
        let needle = b"tvOS";
        let at = bytes
            .windows(needle.len())
            .position(|window| window == needle)
            .expect("platform name present");
        bytes[at..at + needle.len()].copy_from_slice(b"xxOS");
        assert!(matches!(decode_index(&bytes), Err(CacheMiss::Corrupt(_))));
    }
}
