//! Trust and identity extraction for client certificates.
//!
//! Certificate schemes are modelled by the [`IdentityScheme`] trait so the engine does not
//! depend on any specific certificate format.
//! The [`InstanceIdentityX509`] scheme supports Cloud Foundry instance identity certificates.
use anyhow::Result;
use time::OffsetDateTime;
use x509_parser::certificate::X509Certificate;
use x509_parser::pem::Pem;

use crate::conf::KeyUsage;
use crate::errors::CertificateDecode;
use crate::models::VerifiedIdentity;

mod x509;


pub use self::x509::InstanceIdentityX509;

/// Operations implemented by supported certificate schemes.
pub trait IdentityScheme: Send + Sync {
    /// Verify the certificate chains to one of the trusted roots at the given time.
    ///
    /// The `presented` certificates are all those sent by the client and may be used
    /// as intermediates while building the chain.
    /// They are never trusted on their own.
    fn verify_chain(
        &self,
        certificate: &Certificate,
        presented: &[Certificate],
        options: &VerifyOptions,
        at: OffsetDateTime,
    ) -> Result<()>;

    /// Extract the workload identity from a trusted certificate.
    ///
    /// Implementations must return an error unless every identity field is found.
    fn extract_identity(&self, certificate: &Certificate) -> Result<VerifiedIdentity>;
}

/// A DER encoded X.509 certificate.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Certificate {
    der: Vec<u8>,
}

impl Certificate {
    /// Access the DER encoded certificate.
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Wrap a DER encoded certificate, checking it can be decoded.
    pub fn from_der(der: Vec<u8>) -> Result<Certificate> {
        let certificate = Certificate { der };
        certificate.parse()?;
        Ok(certificate)
    }

    /// Decode all `CERTIFICATE` blocks in PEM text, in order.
    ///
    /// Text outside of PEM blocks and blocks with other labels are ignored.
    pub fn from_pem_chain(text: &str) -> Result<Vec<Certificate>> {
        let mut certificates = Vec::new();
        for pem in Pem::iter_from_buffer(text.as_bytes()) {
            let pem = pem.map_err(|error| CertificateDecode {
                reason: error.to_string(),
            })?;
            if pem.label != "CERTIFICATE" {
                continue;
            }
            certificates.push(Certificate::from_der(pem.contents)?);
        }
        Ok(certificates)
    }

    /// Decode the certificate for inspection.
    pub(crate) fn parse(&self) -> Result<X509Certificate<'_>> {
        let (_, certificate) =
            x509_parser::parse_x509_certificate(&self.der).map_err(|error| CertificateDecode {
                reason: error.to_string(),
            })?;
        Ok(certificate)
    }
}

/// Options to verify certificate chains with.
#[derive(Clone, Debug)]
pub struct VerifyOptions {
    /// Extended key usage the verified certificate must allow.
    pub required_usage: KeyUsage,

    /// Certificates trusted as chain roots.
    pub roots: Vec<Certificate>,
}
