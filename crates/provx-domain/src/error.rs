use std::io;
use std::path::PathBuf;

/// Why a profile file could not be turned into a [`crate::ProvisioningProfile`].
#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("no property list found in profile data")]
    MissingDocument,
    #[error("invalid property list: {0}")]
    Document(#[from] plist::Error),
    #[error("profile document is not a dictionary")]
    NotADictionary,
    #[error("profile is missing required field `{0}`")]
    MissingField(&'static str),
    #[error("profile field `{0}` has an unexpected type")]
    InvalidField(&'static str),
    #[error("invalid developer certificate: {0}")]
    Certificate(String),
    #[error("profile does not target any known platform")]
    NoPlatforms,
}
