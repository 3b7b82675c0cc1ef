use sha1::{Digest, Sha1};
use x509_parser::prelude::{FromDer, X509Certificate};

use crate::error::ProfileError;

/// A developer certificate embedded in a profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateSummary {
    pub common_name: String,
    pub thumbprint: String,
    pub der: Vec<u8>,
}

/// Turns the raw certificate blobs of a profile into summaries.
pub trait CertificateDecoder: Send + Sync {
    fn decode(&self, der: &[u8]) -> Result<CertificateSummary, ProfileError>;
}

/// Decodes DER-encoded X.509 certificates.
#[derive(Debug, Clone, Copy, Default)]
pub struct X509CertificateDecoder;

impl CertificateDecoder for X509CertificateDecoder {
    fn decode(&self, der: &[u8]) -> Result<CertificateSummary, ProfileError> {
        let (_, certificate) = X509Certificate::from_der(der)
            .map_err(|err| ProfileError::Certificate(err.to_string()))?;
        let common_name = certificate
            .subject()
            .iter_common_name()
            .next()
            .and_then(|attr| attr.as_str().ok())
            .unwrap_or_default()
            .to_string();
        Ok(CertificateSummary {
            common_name,
            thumbprint: thumbprint(der),
            der: der.to_vec(),
        })
    }
}

/// Upper-case hex SHA-1 of the certificate bytes.
#[must_use]
pub fn thumbprint(der: &[u8]) -> String {
    hex::encode_upper(Sha1::digest(der))
}
