use std::fs;
use std::io;
use std::path::Path;
use std::time::SystemTime;

use plist::{Dictionary, Value};
use time::OffsetDateTime;
use tracing::debug;

use crate::bundle::application_identifier_matches;
use crate::certificate::{CertificateDecoder, CertificateSummary};
use crate::distribution::DistributionType;
use crate::error::ProfileError;
use crate::platform::Platform;

const APPLICATION_IDENTIFIER_KEYS: [&str; 2] =
    ["com.apple.application-identifier", "application-identifier"];
const GET_TASK_ALLOW_KEY: &str = "get-task-allow";

/// A fully decoded provisioning profile.
#[derive(Debug, Clone)]
pub struct ProvisioningProfile {
    pub name: String,
    pub uuid: String,
    pub application_identifier_prefix: Vec<String>,
    pub team_identifier_prefix: Vec<String>,
    pub creation_date: OffsetDateTime,
    pub expiration_date: OffsetDateTime,
    pub platforms: Vec<Platform>,
    pub entitlements: Dictionary,
    pub developer_certificates: Vec<CertificateSummary>,
    pub provisioned_devices: Option<Vec<String>>,
    pub provisions_all_devices: Option<bool>,
    pub time_to_live: Option<i64>,
    pub version: Option<i64>,
    /// The file exactly as it was read, signature included.
    pub data: Vec<u8>,
}

impl ProvisioningProfile {
    pub fn from_document(
        doc: &Dictionary,
        data: Vec<u8>,
        certificates: &dyn CertificateDecoder,
    ) -> Result<Self, ProfileError> {
        let developer_certificates = match doc.get("DeveloperCertificates") {
            None => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| {
                    let der = item.as_data();
                    if der.is_none() {
                        debug!("ignoring developer certificate entry that is not data");
                    }
                    der
                })
                .map(|der| certificates.decode(der))
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => return Err(ProfileError::InvalidField("DeveloperCertificates")),
        };

        let platforms = string_array(doc, "Platform")?
            .unwrap_or_default()
            .iter()
            .filter_map(|name| {
                let platform = Platform::from_document_name(name);
                if platform.is_none() {
                    debug!(platform = %name, "ignoring unknown profile platform");
                }
                platform
            })
            .collect();

        let entitlements = match doc.get("Entitlements") {
            None => Dictionary::new(),
            Some(Value::Dictionary(dict)) => dict.clone(),
            Some(_) => return Err(ProfileError::InvalidField("Entitlements")),
        };

        Ok(Self {
            name: required_string(doc, "Name")?,
            uuid: required_string(doc, "UUID")?,
            application_identifier_prefix: string_array(doc, "ApplicationIdentifierPrefix")?
                .unwrap_or_default(),
            team_identifier_prefix: string_array(doc, "TeamIdentifier")?.unwrap_or_default(),
            creation_date: required_date(doc, "CreationDate")?,
            expiration_date: required_date(doc, "ExpirationDate")?,
            platforms,
            entitlements,
            developer_certificates,
            provisioned_devices: string_array(doc, "ProvisionedDevices")?,
            provisions_all_devices: optional_bool(doc, "ProvisionsAllDevices")?,
            time_to_live: optional_integer(doc, "TimeToLive")?,
            version: optional_integer(doc, "Version")?,
            data,
        })
    }

    /// Audience of the profile, derived from its device list and entitlements.
    #[must_use]
    pub fn distribution_type(&self) -> DistributionType {
        if self.provisioned_devices.is_some() {
            // macOS has no ad-hoc distribution
            if self.platforms.contains(&Platform::MacOs) {
                return DistributionType::DEVELOPMENT;
            }
            let get_task_allow = self
                .entitlements
                .get(GET_TASK_ALLOW_KEY)
                .and_then(Value::as_boolean)
                .unwrap_or(false);
            if get_task_allow {
                return DistributionType::DEVELOPMENT;
            }
            return DistributionType::AD_HOC;
        }

        if self.provisions_all_devices == Some(true) {
            DistributionType::IN_HOUSE
        } else {
            DistributionType::APP_STORE
        }
    }

    /// Team-prefixed application identifier from the entitlements, if any.
    #[must_use]
    pub fn application_identifier(&self) -> Option<&str> {
        APPLICATION_IDENTIFIER_KEYS
            .iter()
            .find_map(|key| self.entitlements.get(key).and_then(Value::as_string))
    }

    #[must_use]
    pub fn matches_bundle_identifier(&self, bundle_identifier: &str) -> bool {
        self.application_identifier()
            .is_some_and(|id| application_identifier_matches(id, bundle_identifier))
    }

    #[must_use]
    pub fn matches_developer_certificate(&self, thumbprint: &str) -> bool {
        self.developer_certificates
            .iter()
            .any(|cert| cert.thumbprint.eq_ignore_ascii_case(thumbprint))
    }

    #[must_use]
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expiration_date < now
    }

    /// Writes the original bytes back out unchanged.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        fs::write(path, &self.data)
    }
}

fn required_string(doc: &Dictionary, key: &'static str) -> Result<String, ProfileError> {
    match doc.get(key) {
        Some(Value::String(value)) => Ok(value.clone()),
        Some(_) => Err(ProfileError::InvalidField(key)),
        None => Err(ProfileError::MissingField(key)),
    }
}

fn required_date(doc: &Dictionary, key: &'static str) -> Result<OffsetDateTime, ProfileError> {
    match doc.get(key) {
        Some(Value::Date(date)) => Ok(OffsetDateTime::from(SystemTime::from(*date))),
        Some(_) => Err(ProfileError::InvalidField(key)),
        None => Err(ProfileError::MissingField(key)),
    }
}

fn string_array(doc: &Dictionary, key: &'static str) -> Result<Option<Vec<String>>, ProfileError> {
    match doc.get(key) {
        None => Ok(None),
        Some(Value::Array(items)) => Ok(Some(
            items
                .iter()
                .filter_map(Value::as_string)
                .map(str::to_owned)
                .collect(),
        )),
        Some(_) => Err(ProfileError::InvalidField(key)),
    }
}

fn optional_bool(doc: &Dictionary, key: &'static str) -> Result<Option<bool>, ProfileError> {
    match doc.get(key) {
        None => Ok(None),
        Some(Value::Boolean(value)) => Ok(Some(*value)),
        Some(_) => Err(ProfileError::InvalidField(key)),
    }
}

fn optional_integer(doc: &Dictionary, key: &'static str) -> Result<Option<i64>, ProfileError> {
    match doc.get(key) {
        None => Ok(None),
        Some(value) => value
            .as_signed_integer()
            .map(Some)
            .ok_or(ProfileError::InvalidField(key)),
    }
}
