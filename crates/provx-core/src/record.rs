use camino::{Utf8Path, Utf8PathBuf};
use time::OffsetDateTime;

use provx_domain::{DistributionType, Platform, ProfileError, ProfileLoader, ProvisioningProfile};

/// Name and thumbprint of a certificate a profile was issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeveloperCertificate {
    pub name: String,
    pub thumbprint: String,
}

/// Cached summary of one profile file. Records are replaced, never edited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileRecord {
    pub file_name: Utf8PathBuf,
    pub last_modified: OffsetDateTime,
    pub name: String,
    pub uuid: String,
    pub distribution: DistributionType,
    pub creation_date: OffsetDateTime,
    pub expiration_date: OffsetDateTime,
    pub platforms: Vec<Platform>,
    pub application_identifier: String,
    pub developer_certificates: Vec<DeveloperCertificate>,
}

impl ProfileRecord {
    pub fn from_profile(
        file_name: Utf8PathBuf,
        last_modified: OffsetDateTime,
        profile: &ProvisioningProfile,
    ) -> Self {
        Self {
            file_name,
            last_modified: normalize_timestamp(last_modified),
            name: profile.name.clone(),
            uuid: profile.uuid.clone(),
            distribution: profile.distribution_type(),
            creation_date: normalize_timestamp(profile.creation_date),
            expiration_date: normalize_timestamp(profile.expiration_date),
            platforms: profile.platforms.clone(),
            application_identifier: profile
                .application_identifier()
                .unwrap_or_default()
                .to_string(),
            developer_certificates: profile
                .developer_certificates
                .iter()
                .map(|cert| DeveloperCertificate {
                    name: cert.common_name.clone(),
                    thumbprint: cert.thumbprint.clone(),
                })
                .collect(),
        }
    }

    /// Parses `file_name` and projects it into a record.
    pub fn load(
        loader: &ProfileLoader,
        file_name: &Utf8Path,
        last_modified: OffsetDateTime,
    ) -> Result<Self, ProfileError> {
        let profile = loader.load_file(file_name.as_std_path())?;
        Ok(Self::from_profile(
            file_name.to_path_buf(),
            last_modified,
            &profile,
        ))
    }

    /// Whether the file carries the extension profiles for `platform` use.
    #[must_use]
    pub fn has_extension_for(&self, platform: Platform) -> bool {
        self.file_name.extension() == Some(platform.file_extension())
    }

    #[must_use]
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expiration_date < now
    }

    pub fn thumbprints(&self) -> impl Iterator<Item = &str> {
        self.developer_certificates
            .iter()
            .map(|cert| cert.thumbprint.as_str())
    }
}

/// Clamps to the UTC range the index file can store (nanoseconds in an `i64`).
pub(crate) fn normalize_timestamp(value: OffsetDateTime) -> OffsetDateTime {
    let nanos = value
        .unix_timestamp_nanos()
        .clamp(i128::from(i64::MIN), i128::from(i64::MAX));
    OffsetDateTime::from_unix_timestamp_nanos(nanos).unwrap_or(OffsetDateTime::UNIX_EPOCH)
}
