//! Data object storing the backend configuration.
use anyhow::Result;
use serde::Deserialize;
use serde::Serialize;

use crate::errors::CertificateDecode;
use crate::identity::Certificate;
use crate::identity::VerifyOptions;

/// Configuration needed to verify instance identities.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    /// Connection options for the Cloud Controller API.
    pub directory: DirectoryConf,

    /// PEM encoded CA certificates trusted to issue instance identity certificates.
    pub identity_ca_certificates: Vec<String>,

    /// Extended key usage instance identity certificates must allow.
    #[serde(default)]
    pub required_usage: KeyUsage,
}

impl Configuration {
    /// Decode the configured CAs into options to verify certificate chains with.
    pub fn verify_options(&self) -> Result<VerifyOptions> {
        let mut roots = Vec::new();
        for (index, pem) in self.identity_ca_certificates.iter().enumerate() {
            let certificates = Certificate::from_pem_chain(pem)?;
            if certificates.is_empty() {
                anyhow::bail!(CertificateDecode {
                    reason: format!("identity CA entry {} holds no certificate", index),
                });
            }
            roots.extend(certificates);
        }
        if roots.is_empty() {
            anyhow::bail!(crate::errors::NoCaConfigured);
        }
        Ok(VerifyOptions {
            required_usage: self.required_usage,
            roots,
        })
    }
}

/// Connection options for the Cloud Controller API.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct DirectoryConf {
    /// Base URL of the Cloud Controller API.
    pub api_address: String,

    /// Additional PEM encoded CA certificates to trust when connecting to the API.
    #[serde(default)]
    pub api_trusted_certificates: Vec<String>,

    /// Password of the user to authenticate as.
    pub password: String,

    /// Timeout, in seconds, for individual API requests.
    #[serde(default = "DirectoryConf::default_timeout")]
    pub timeout_sec: u64,

    /// Name of the user to authenticate as.
    pub username: String,
}

impl DirectoryConf {
    fn default_timeout() -> u64 {
        30
    }
}

/// Extended key usage required of instance identity certificates.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyUsage {
    /// Accept certificates regardless of their extended key usage.
    #[default]
    Any,

    /// Require certificates valid for TLS client authentication.
    ClientAuth,

    /// Require certificates valid for TLS server authentication.
    ServerAuth,
}
