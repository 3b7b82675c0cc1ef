use std::ffi::OsStr;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::certificate::{CertificateDecoder, X509CertificateDecoder};
use crate::document::{DocumentDecoder, PlistDocumentDecoder};
use crate::error::ProfileError;
use crate::platform::Platform;
use crate::profile::ProvisioningProfile;

/// Materializes full profiles from disk through the document and certificate
/// decoders it was built with.
#[derive(Clone)]
pub struct ProfileLoader {
    documents: Arc<dyn DocumentDecoder>,
    certificates: Arc<dyn CertificateDecoder>,
}

impl ProfileLoader {
    pub fn new(
        documents: Arc<dyn DocumentDecoder>,
        certificates: Arc<dyn CertificateDecoder>,
    ) -> Self {
        Self {
            documents,
            certificates,
        }
    }

    /// Loads a profile file. A document without a usable `Platform` array
    /// gets the platform implied by the file extension.
    pub fn load_file(&self, path: &Path) -> Result<ProvisioningProfile, ProfileError> {
        let data = fs::read(path).map_err(|source| ProfileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut profile = self.load_bytes(data)?;
        if profile.platforms.is_empty() {
            let implied = path
                .extension()
                .and_then(OsStr::to_str)
                .and_then(Platform::from_extension);
            profile.platforms.extend(implied);
        }
        if profile.platforms.is_empty() {
            return Err(ProfileError::NoPlatforms);
        }
        Ok(profile)
    }

    pub fn load_bytes(&self, data: Vec<u8>) -> Result<ProvisioningProfile, ProfileError> {
        let doc = self.documents.decode(&data)?;
        ProvisioningProfile::from_document(&doc, data, self.certificates.as_ref())
    }
}

impl Default for ProfileLoader {
    fn default() -> Self {
        Self::new(
            Arc::new(PlistDocumentDecoder),
            Arc::new(X509CertificateDecoder),
        )
    }
}

impl fmt::Debug for ProfileLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProfileLoader").finish_non_exhaustive()
    }
}
