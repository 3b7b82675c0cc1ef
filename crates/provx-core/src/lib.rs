#![deny(clippy::all)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

mod config;
mod fs;
mod handle;
pub mod index;
mod installed;
mod query;
mod reconcile;
mod record;

pub use config::{Config, Location, INDEX_PATH_ENV, PROFILE_DIRS_ENV};
pub use handle::IndexHandle;
pub use index::codec::{
    decode_index, encode_index, load_index, save_index, CacheMiss, SaveOutcome,
};
pub use index::{ProfileIndex, CURRENT_INDEX_VERSION};
pub use query::{ProfileQuery, QueryError, RejectReason, Rejection, ResultMode};
pub use reconcile::{ReconcileKind, ReconcileReport, Reconciled};
pub use record::{DeveloperCertificate, ProfileRecord};

pub use provx_domain::{
    DistributionType, Platform, ProfileError, ProfileLoader, ProvisioningProfile,
};
