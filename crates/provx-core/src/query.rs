//! Profile selection over a cached index.
//!
//! Records are filtered newest-first by a fixed pipeline (file extension and
//! platform, expiration, distribution type, bundle identifier, certificate
//! ownership). Only survivors are loaded from disk.

use std::collections::{HashMap, HashSet};
use std::fmt;

use camino::Utf8PathBuf;
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, warn};

use provx_domain::{
    application_identifier_matches, DistributionType, Platform, ProfileLoader, ProvisioningProfile,
};

use crate::handle::IndexHandle;
use crate::index::ProfileIndex;
use crate::record::ProfileRecord;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResultMode {
    /// Every matching profile, newest first.
    #[default]
    All,
    /// One profile per name, preferring the most recently created.
    UniqueByName,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("bundle identifier must not be empty")]
    EmptyBundleIdentifier,
    #[error("at least one developer certificate thumbprint is required")]
    EmptyCertificateSet,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileQuery {
    pub platform: Platform,
    pub distribution: DistributionType,
    pub bundle_identifier: Option<String>,
    /// Upper-case hex thumbprints.
    pub thumbprints: Option<HashSet<String>>,
    pub include_expired: bool,
    pub mode: ResultMode,
}

impl ProfileQuery {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            distribution: DistributionType::ANY,
            bundle_identifier: None,
            thumbprints: None,
            include_expired: false,
            mode: ResultMode::All,
        }
    }

    #[must_use]
    pub fn with_distribution(mut self, distribution: DistributionType) -> Self {
        self.distribution = distribution;
        self
    }

    #[must_use]
    pub fn with_bundle_identifier(mut self, bundle_identifier: impl Into<String>) -> Self {
        self.bundle_identifier = Some(bundle_identifier.into());
        self
    }

    #[must_use]
    pub fn with_thumbprints<I, S>(mut self, thumbprints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.thumbprints = Some(
            thumbprints
                .into_iter()
                .map(|thumbprint| thumbprint.as_ref().trim().to_ascii_uppercase())
                .filter(|thumbprint| !thumbprint.is_empty())
                .collect(),
        );
        self
    }

    #[must_use]
    pub fn with_include_expired(mut self, include_expired: bool) -> Self {
        self.include_expired = include_expired;
        self
    }

    #[must_use]
    pub fn with_mode(mut self, mode: ResultMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn validate(&self) -> Result<(), QueryError> {
        if self
            .bundle_identifier
            .as_deref()
            .is_some_and(str::is_empty)
        {
            return Err(QueryError::EmptyBundleIdentifier);
        }
        if self.thumbprints.as_ref().is_some_and(HashSet::is_empty) {
            return Err(QueryError::EmptyCertificateSet);
        }
        Ok(())
    }

    /// Runs the filter pipeline against one record, stopping at the first
    /// failed predicate.
    pub fn evaluate(
        &self,
        record: &ProfileRecord,
        now: OffsetDateTime,
    ) -> Result<(), RejectReason> {
        applicable_to(record, self.platform)?;
        if !self.include_expired && record.is_expired(now) {
            return Err(RejectReason::Expired {
                expiration_date: record.expiration_date,
            });
        }
        if !self.distribution.accepts(record.distribution) {
            return Err(RejectReason::Distribution {
                actual: record.distribution,
                requested: self.distribution,
            });
        }
        if let Some(bundle_identifier) = &self.bundle_identifier {
            if !application_identifier_matches(&record.application_identifier, bundle_identifier) {
                return Err(RejectReason::BundleIdentifier {
                    application_identifier: record.application_identifier.clone(),
                    requested: bundle_identifier.clone(),
                });
            }
        }
        if let Some(accepted) = &self.thumbprints {
            let owned = record
                .thumbprints()
                .any(|thumbprint| accepted.contains(&thumbprint.to_ascii_uppercase()));
            if !owned {
                return Err(RejectReason::Certificates {
                    count: record.developer_certificates.len(),
                });
            }
        }
        Ok(())
    }
}

fn applicable_to(record: &ProfileRecord, platform: Platform) -> Result<(), RejectReason> {
    if !record.has_extension_for(platform) {
        return Err(RejectReason::Extension {
            file_name: record.file_name.clone(),
            expected: platform.file_extension(),
        });
    }
    if !record.platforms.contains(&platform) {
        return Err(RejectReason::Platform {
            platforms: record.platforms.clone(),
            requested: platform,
        });
    }
    Ok(())
}

/// The predicate a profile failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    Extension {
        file_name: Utf8PathBuf,
        expected: &'static str,
    },
    Platform {
        platforms: Vec<Platform>,
        requested: Platform,
    },
    Expired {
        expiration_date: OffsetDateTime,
    },
    Distribution {
        actual: DistributionType,
        requested: DistributionType,
    },
    BundleIdentifier {
        application_identifier: String,
        requested: String,
    },
    Certificates {
        count: usize,
    },
    NameOrUuid {
        uuid: String,
        requested: String,
    },
    Unreadable {
        error: String,
    },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Extension {
                file_name,
                expected,
            } => write!(
                f,
                "its file name ({file_name}) does not end with '.{expected}'"
            ),
            RejectReason::Platform {
                platforms,
                requested,
            } => {
                let platforms = platforms
                    .iter()
                    .map(|platform| platform.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(
                    f,
                    "its platforms ({platforms}) do not match the requested platform ({requested})"
                )
            }
            RejectReason::Expired { expiration_date } => {
                let formatted = expiration_date
                    .format(&Rfc3339)
                    .unwrap_or_else(|_| expiration_date.to_string());
                write!(f, "it has expired ({formatted})")
            }
            RejectReason::Distribution { actual, requested } => write!(
                f,
                "its distribution type ({actual}) does not match the expected type ({requested})"
            ),
            RejectReason::BundleIdentifier {
                application_identifier,
                requested,
            } => write!(
                f,
                "its id ({application_identifier}) does not match the bundle identifier {requested}"
            ),
            RejectReason::Certificates { count } => write!(
                f,
                "none of its developer certificates ({count}) is in the list of accepted thumbprints"
            ),
            RejectReason::NameOrUuid { uuid, requested } => write!(
                f,
                "its name and uuid ({uuid}) do not match '{requested}'"
            ),
            RejectReason::Unreadable { error } => write!(f, "it could not be loaded: {error}"),
        }
    }
}

/// A profile left out of a result, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub profile: String,
    pub file_name: Utf8PathBuf,
    pub reason: RejectReason,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "The profile '{}' is not applicable because {}.",
            self.profile, self.reason
        )
    }
}

struct Diagnostics<'a>(Option<&'a mut Vec<Rejection>>);

impl Diagnostics<'_> {
    fn reject(&mut self, record: &ProfileRecord, reason: RejectReason) {
        if let Some(sink) = self.0.as_deref_mut() {
            sink.push(Rejection {
                profile: record.name.clone(),
                file_name: record.file_name.clone(),
                reason,
            });
        }
    }
}

fn load_survivor(
    loader: &ProfileLoader,
    record: &ProfileRecord,
    diagnostics: &mut Diagnostics<'_>,
) -> Option<ProvisioningProfile> {
    match loader.load_file(record.file_name.as_std_path()) {
        Ok(profile) => Some(profile),
        Err(err) => {
            warn!(
                path = %record.file_name,
                error = %err,
                "indexed provisioning profile could not be loaded"
            );
            diagnostics.reject(
                record,
                RejectReason::Unreadable {
                    error: err.to_string(),
                },
            );
            None
        }
    }
}

fn select(
    index: &ProfileIndex,
    query: &ProfileQuery,
    loader: &ProfileLoader,
    now: OffsetDateTime,
    diagnostics: &mut Diagnostics<'_>,
) -> Vec<ProvisioningProfile> {
    let mut selected: Vec<(OffsetDateTime, ProvisioningProfile)> = Vec::new();
    let mut slots: HashMap<&str, usize> = HashMap::new();

    for record in index.records() {
        if let Err(reason) = query.evaluate(record, now) {
            diagnostics.reject(record, reason);
            continue;
        }
        match query.mode {
            ResultMode::All => {
                if let Some(profile) = load_survivor(loader, record, diagnostics) {
                    selected.push((record.creation_date, profile));
                }
            }
            ResultMode::UniqueByName => match slots.get(record.name.as_str()) {
                Some(&slot) => {
                    if record.creation_date > selected[slot].0 {
                        if let Some(profile) = load_survivor(loader, record, diagnostics) {
                            selected[slot] = (record.creation_date, profile);
                        }
                    }
                }
                None => {
                    if let Some(profile) = load_survivor(loader, record, diagnostics) {
                        slots.insert(record.name.as_str(), selected.len());
                        selected.push((record.creation_date, profile));
                    }
                }
            },
        }
    }

    selected.into_iter().map(|(_, profile)| profile).collect()
}

impl IndexHandle {
    /// Profiles matching `query`, newest first.
    pub fn query(
        &self,
        query: &ProfileQuery,
        diagnostics: Option<&mut Vec<Rejection>>,
    ) -> Result<Vec<ProvisioningProfile>, QueryError> {
        query.validate()?;
        let index = self.snapshot();
        let mut diagnostics = Diagnostics(diagnostics);
        let profiles = select(
            &index,
            query,
            self.loader(),
            OffsetDateTime::now_utc(),
            &mut diagnostics,
        );
        debug!(
            platform = %query.platform,
            matched = profiles.len(),
            indexed = index.len(),
            "profile query finished"
        );
        Ok(profiles)
    }

    pub fn find_by_platform(
        &self,
        platform: Platform,
        include_expired: bool,
        mode: ResultMode,
        diagnostics: Option<&mut Vec<Rejection>>,
    ) -> Vec<ProvisioningProfile> {
        self.find_by_platform_and_type(
            platform,
            DistributionType::ANY,
            include_expired,
            mode,
            diagnostics,
        )
    }

    pub fn find_by_platform_and_type(
        &self,
        platform: Platform,
        distribution: DistributionType,
        include_expired: bool,
        mode: ResultMode,
        diagnostics: Option<&mut Vec<Rejection>>,
    ) -> Vec<ProvisioningProfile> {
        let query = ProfileQuery::new(platform)
            .with_distribution(distribution)
            .with_include_expired(include_expired)
            .with_mode(mode);
        // No optional filters, so validation cannot fail.
        self.query(&query, diagnostics).unwrap_or_default()
    }

    pub fn find_by_certificates<I, S>(
        &self,
        platform: Platform,
        distribution: DistributionType,
        thumbprints: I,
        include_expired: bool,
        mode: ResultMode,
        diagnostics: Option<&mut Vec<Rejection>>,
    ) -> Result<Vec<ProvisioningProfile>, QueryError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let query = ProfileQuery::new(platform)
            .with_distribution(distribution)
            .with_thumbprints(thumbprints)
            .with_include_expired(include_expired)
            .with_mode(mode);
        self.query(&query, diagnostics)
    }

    pub fn find_by_bundle_id(
        &self,
        platform: Platform,
        bundle_identifier: &str,
        distribution: DistributionType,
        include_expired: bool,
        mode: ResultMode,
        diagnostics: Option<&mut Vec<Rejection>>,
    ) -> Result<Vec<ProvisioningProfile>, QueryError> {
        let query = ProfileQuery::new(platform)
            .with_bundle_identifier(bundle_identifier)
            .with_distribution(distribution)
            .with_include_expired(include_expired)
            .with_mode(mode);
        self.query(&query, diagnostics)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn find_by_bundle_id_and_certificates<I, S>(
        &self,
        platform: Platform,
        bundle_identifier: &str,
        distribution: DistributionType,
        thumbprints: I,
        include_expired: bool,
        mode: ResultMode,
        diagnostics: Option<&mut Vec<Rejection>>,
    ) -> Result<Vec<ProvisioningProfile>, QueryError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let query = ProfileQuery::new(platform)
            .with_bundle_identifier(bundle_identifier)
            .with_distribution(distribution)
            .with_thumbprints(thumbprints)
            .with_include_expired(include_expired)
            .with_mode(mode);
        self.query(&query, diagnostics)
    }

    /// Looks a profile up by name or UUID.
    ///
    /// A file named `<name_or_uuid>.<extension>` in any watched directory wins
    /// without consulting the index. Expired profiles are not excluded.
    pub fn find_one(
        &self,
        platform: Platform,
        name_or_uuid: &str,
        diagnostics: Option<&mut Vec<Rejection>>,
    ) -> Option<ProvisioningProfile> {
        if let Some(profile) = self.probe_file(platform, name_or_uuid) {
            return Some(profile);
        }

        let index = self.snapshot();
        let mut diagnostics = Diagnostics(diagnostics);
        for record in index.records() {
            if let Err(reason) = applicable_to(record, platform) {
                diagnostics.reject(record, reason);
                continue;
            }
            if record.name != name_or_uuid && record.uuid != name_or_uuid {
                diagnostics.reject(
                    record,
                    RejectReason::NameOrUuid {
                        uuid: record.uuid.clone(),
                        requested: name_or_uuid.to_string(),
                    },
                );
                continue;
            }
            if let Some(profile) = load_survivor(self.loader(), record, &mut diagnostics) {
                return Some(profile);
            }
        }
        None
    }

    fn probe_file(&self, platform: Platform, name: &str) -> Option<ProvisioningProfile> {
        if name.is_empty() || name.contains(['/', '\\']) {
            return None;
        }
        let file_name = format!("{name}.{}", platform.file_extension());
        for dir in self.directories() {
            let path = dir.join(&file_name);
            if !path.is_file() {
                continue;
            }
            match self.loader().load_file(&path) {
                Ok(profile) => return Some(profile),
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "named provisioning profile could not be loaded"
                    );
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::tests::record;
    use crate::record::DeveloperCertificate;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2024-06-01 0:00 UTC);

    fn ios_record(name: &str) -> ProfileRecord {
        let mut record = record(name, 1_700_000_000);
        record.expiration_date = datetime!(2025-01-01 0:00 UTC);
        record
    }

    #[test]
    fn extension_is_checked_before_platforms() {
        let mut desktop = ios_record("desktop");
        desktop.file_name = Utf8PathBuf::from("/profiles/desktop.provisionprofile");
        let reason = ProfileQuery::new(Platform::Ios)
            .evaluate(&desktop, NOW)
            .expect_err("wrong extension");
        assert!(matches!(
            reason,
            RejectReason::Extension { expected, .. } if expected == "mobileprovision"
        ));

        let tv = ios_record("tv");
        let reason = ProfileQuery::new(Platform::TvOs)
            .evaluate(&tv, NOW)
            .expect_err("wrong platform");
        assert!(matches!(reason, RejectReason::Platform { requested: Platform::TvOs, .. }));
    }

    #[test]
    fn expired_records_need_opt_in() {
        let mut old = ios_record("old");
        old.expiration_date = datetime!(2024-05-31 23:59 UTC);
        let query = ProfileQuery::new(Platform::Ios);
        assert!(matches!(
            query.evaluate(&old, NOW),
            Err(RejectReason::Expired { .. })
        ));
        assert!(query.with_include_expired(true).evaluate(&old, NOW).is_ok());
    }

    #[test]
    fn any_accepts_records_without_flags() {
        let mut unflagged = ios_record("unflagged");
        unflagged.distribution = DistributionType::empty();
        assert!(ProfileQuery::new(Platform::Ios)
            .with_distribution(DistributionType::ANY)
            .evaluate(&unflagged, NOW)
            .is_ok());
        assert!(matches!(
            ProfileQuery::new(Platform::Ios)
                .with_distribution(DistributionType::APP_STORE)
                .evaluate(&unflagged, NOW),
            Err(RejectReason::Distribution { .. })
        ));
    }

    #[test]
    fn wildcard_application_identifier_is_a_prefix_match() {
        let mut wildcard = ios_record("wildcard");
        wildcard.application_identifier = "TEAMID.com.example.*".into();
        let matching = ProfileQuery::new(Platform::Ios).with_bundle_identifier("com.example.app");
        assert!(matching.evaluate(&wildcard, NOW).is_ok());
        let other = ProfileQuery::new(Platform::Ios).with_bundle_identifier("com.examplefoo.app");
        assert!(matches!(
            other.evaluate(&wildcard, NOW),
            Err(RejectReason::BundleIdentifier { .. })
        ));
    }

    #[test]
    fn thumbprints_match_case_insensitively() {
        let mut owned = ios_record("owned");
        owned.developer_certificates = vec![DeveloperCertificate {
            name: "Apple Development".into(),
            thumbprint: "ab12cd".into(),
        }];
        let query = ProfileQuery::new(Platform::Ios).with_thumbprints(["AB12CD"]);
        assert!(query.evaluate(&owned, NOW).is_ok());
        let query = ProfileQuery::new(Platform::Ios).with_thumbprints(["FFFF"]);
        assert_eq!(
            query.evaluate(&owned, NOW),
            Err(RejectReason::Certificates { count: 1 })
        );
    }

    #[test]
    fn preconditions_reject_empty_inputs() {
        let empty_bundle = ProfileQuery::new(Platform::Ios).with_bundle_identifier("");
        assert_eq!(
            empty_bundle.validate(),
            Err(QueryError::EmptyBundleIdentifier)
        );
        let no_thumbprints =
            ProfileQuery::new(Platform::Ios).with_thumbprints(Vec::<String>::new());
        assert_eq!(
            no_thumbprints.validate(),
            Err(QueryError::EmptyCertificateSet)
        );
        assert_eq!(ProfileQuery::new(Platform::Ios).validate(), Ok(()));
    }

    #[test]
    fn rejection_reads_as_a_sentence() {
        let rejection = Rejection {
            profile: "Team Profile".into(),
            file_name: Utf8PathBuf::from("/profiles/a.mobileprovision"),
            reason: RejectReason::Platform {
                platforms: vec![Platform::Ios, Platform::TvOs],
                requested: Platform::MacOs,
            },
        };
        assert_eq!(
            rejection.to_string(),
            "The profile 'Team Profile' is not applicable because its platforms (iOS, tvOS) \
             do not match the requested platform (MacOS)."
        );
    }

    #[test]
    fn diagnostics_are_optional() {
        let record = ios_record("quiet");
        let mut silent = Diagnostics(None);
        silent.reject(&record, RejectReason::Certificates { count: 0 });

        let mut sink = Vec::new();
        let mut loud = Diagnostics(Some(&mut sink));
        loud.reject(&record, RejectReason::Certificates { count: 0 });
        assert_eq!(sink.len(), 1);
        assert_eq!(sink[0].profile, "quiet");
    }
}
