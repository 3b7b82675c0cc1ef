#![deny(clippy::all)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

pub mod bundle;
pub mod certificate;
pub mod distribution;
pub mod document;
pub mod error;
pub mod loader;
pub mod platform;
pub mod profile;

pub use bundle::{application_identifier_matches, strip_team_prefix};
pub use certificate::{thumbprint, CertificateDecoder, CertificateSummary, X509CertificateDecoder};
pub use distribution::{
    automatic_distribution, DistributionType, AUTOMATIC_AD_HOC, AUTOMATIC_APP_STORE,
    AUTOMATIC_IN_HOUSE,
};
pub use document::{embedded_property_list, DocumentDecoder, PlistDocumentDecoder};
pub use error::ProfileError;
pub use loader::ProfileLoader;
pub use platform::{
    is_profile_path, ParsePlatformError, Platform, DESKTOP_PROFILE_EXTENSION,
    MOBILE_PROFILE_EXTENSION,
};
pub use profile::ProvisioningProfile;
