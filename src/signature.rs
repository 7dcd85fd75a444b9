//! Interface to the primitive matching login request signatures to certificates.
//!
//! The signature proves the caller holds the private key of one of the presented certificates.
//! Which exact bytes are signed, and how, is up to the [`SignatureMatcher`] implementation.
use anyhow::Result;

use crate::identity::Certificate;

/// Login request values covered by the signature.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SignatureData {
    /// PEM encoded certificate text, exactly as presented.
    pub certificate: String,

    /// Name of the role the request logs into.
    pub role: String,

    /// Signing time, exactly as presented.
    pub signing_time: String,
}

/// Find which presented certificate produced a request signature.
pub trait SignatureMatcher: Send + Sync {
    /// Return the one certificate whose private key signed the given data.
    ///
    /// Implementations must fail if no certificate matches the signature.
    fn matching_certificate(&self, signature: &str, data: &SignatureData) -> Result<Certificate>;
}

#[cfg(any(test, feature = "test-fixture"))]
pub use self::fixture::SignatureMatcherFixture;

#[cfg(any(test, feature = "test-fixture"))]
mod fixture {
    use anyhow::Result;

    use super::SignatureData;
    use super::SignatureMatcher;
    use crate::errors::NoMatchingCertificate;
    use crate::identity::Certificate;

    /// [`SignatureMatcher`] accepting a single known signature.
    pub struct SignatureMatcherFixture {
        certificate: Certificate,
        signature: String,
    }

    impl SignatureMatcherFixture {
        /// Match `signature` to `certificate` and fail for any other signature.
        pub fn new<S: Into<String>>(signature: S, certificate: Certificate) -> Self {
            SignatureMatcherFixture {
                certificate,
                signature: signature.into(),
            }
        }
    }

    impl SignatureMatcher for SignatureMatcherFixture {
        fn matching_certificate(&self, signature: &str, _: &SignatureData) -> Result<Certificate> {
            if signature != self.signature {
                anyhow::bail!(NoMatchingCertificate);
            }
            Ok(self.certificate.clone())
        }
    }
}
