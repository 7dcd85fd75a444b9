//! Cloud Foundry instance identity certificates.
//!
//! Instance identity certificates encode the workload identity as follows:
//!
//! - The subject common name is the app instance ID.
//! - Subject organizational units, prefixed with `organization:`, `space:` and `app:`,
//!   carry the organization, space and app IDs.
//! - The only IP address subject alternative name is the app instance IP address.
use std::net::IpAddr;
use std::net::Ipv4Addr;
use std::net::Ipv6Addr;
use std::time::Duration;

use anyhow::Result;
use rustls_pki_types::CertificateDer;
use rustls_pki_types::TrustAnchor;
use rustls_pki_types::UnixTime;
use time::OffsetDateTime;
use webpki::EndEntityCert;
use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::GeneralName;
use x509_parser::time::ASN1Time;

use super::Certificate;
use super::IdentityScheme;
use super::VerifyOptions;
use crate::conf::KeyUsage;
use crate::errors::CertificateDecode;
use crate::errors::IdentityAmbiguous;
use crate::errors::IdentityIncomplete;
use crate::errors::UntrustedCertificate;
use crate::models::VerifiedIdentity;

const OU_APP: &str = "app:";
const OU_ORG: &str = "organization:";
const OU_SPACE: &str = "space:";

// Extended key usage OIDs, DER encoded without the tag.
const EKU_ANY: &[u8] = &[0x55, 0x1d, 0x25, 0x00];
const EKU_CLIENT_AUTH: &[u8] = &[0x2b, 0x06, 0x01, 0x05, 0x05, 0x07, 0x03, 0x02];
const EKU_CODE_SIGNING: &[u8] = &[0x2b, 0x06, 0x01, 0x05, 0x05, 0x07, 0x03, 0x03];
const EKU_EMAIL_PROTECTION: &[u8] = &[0x2b, 0x06, 0x01, 0x05, 0x05, 0x07, 0x03, 0x04];
const EKU_OCSP_SIGNING: &[u8] = &[0x2b, 0x06, 0x01, 0x05, 0x05, 0x07, 0x03, 0x09];
const EKU_SERVER_AUTH: &[u8] = &[0x2b, 0x06, 0x01, 0x05, 0x05, 0x07, 0x03, 0x01];
const EKU_TIME_STAMPING: &[u8] = &[0x2b, 0x06, 0x01, 0x05, 0x05, 0x07, 0x03, 0x08];

/// Usages tried in turn when any extended key usage is allowed.
const EKU_ANY_OF: [&[u8]; 7] = [
    EKU_CLIENT_AUTH,
    EKU_SERVER_AUTH,
    EKU_ANY,
    EKU_CODE_SIGNING,
    EKU_EMAIL_PROTECTION,
    EKU_TIME_STAMPING,
    EKU_OCSP_SIGNING,
];

/// Verify and decode Cloud Foundry instance identity certificates.
///
/// Chains are built and checked with `webpki`, including the extended key usage of intermediates.
/// When more than one presented intermediate could continue a chain all of them are tried.
#[derive(Clone, Copy, Debug, Default)]
pub struct InstanceIdentityX509;

impl IdentityScheme for InstanceIdentityX509 {
    fn verify_chain(
        &self,
        certificate: &Certificate,
        presented: &[Certificate],
        options: &VerifyOptions,
        at: OffsetDateTime,
    ) -> Result<()> {
        let leaf = certificate.parse()?;

        // A configured root is trusted as is.
        if options.roots.iter().any(|root| root == certificate) {
            let at = ASN1Time::from_timestamp(at.unix_timestamp())
                .map_err(|error| untrusted(format!("invalid verification time: {}", error)))?;
            if !leaf.validity().is_valid_at(at) {
                anyhow::bail!(untrusted("certificate is expired or not yet valid"));
            }
            return check_usage(&leaf, options.required_usage);
        }

        let time = u64::try_from(at.unix_timestamp())
            .map(|seconds| UnixTime::since_unix_epoch(Duration::from_secs(seconds)))
            .map_err(|_| untrusted(format!("invalid verification time: {}", at)))?;
        let der = CertificateDer::from(certificate.der());
        let end_entity = EndEntityCert::try_from(&der)
            .map_err(|error| untrusted(format!("unsupported certificate: {:?}", error)))?;

        let roots: Vec<CertificateDer> = options
            .roots
            .iter()
            .map(|root| CertificateDer::from(root.der()))
            .collect();
        let anchors = roots
            .iter()
            .map(|root| {
                webpki::anchor_from_trusted_cert(root)
                    .map_err(|error| untrusted(format!("unsupported CA certificate: {:?}", error)))
            })
            .collect::<Result<Vec<TrustAnchor>, _>>()?;
        let intermediates: Vec<CertificateDer> = presented
            .iter()
            .filter(|candidate| *candidate != certificate)
            .map(|candidate| CertificateDer::from(candidate.der()))
            .collect();

        let mut failure = webpki::Error::UnknownIssuer;
        for usage in key_usages(options.required_usage) {
            let verified = end_entity.verify_for_usage(
                webpki::ALL_VERIFICATION_ALGS,
                &anchors,
                &intermediates,
                time,
                usage,
                None,
                None,
            );
            match verified {
                Ok(_) => return Ok(()),
                Err(error) => failure = error,
            }
        }
        anyhow::bail!(untrusted(format!(
            "no chain from '{}' to a configured CA: {:?}",
            leaf.subject(),
            failure
        )))
    }

    fn extract_identity(&self, certificate: &Certificate) -> Result<VerifiedIdentity> {
        let certificate = certificate.parse()?;
        let subject = certificate.subject();

        let mut instance_id = None;
        for name in subject.iter_common_name() {
            let value = name.as_str().map_err(decode)?;
            set_once(&mut instance_id, value, "instance ID")?;
        }

        let mut org_id = None;
        let mut space_id = None;
        let mut app_id = None;
        for unit in subject.iter_organizational_unit() {
            let value = unit.as_str().map_err(decode)?;
            if let Some(id) = value.strip_prefix(OU_ORG) {
                set_once(&mut org_id, id, "org ID")?;
            } else if let Some(id) = value.strip_prefix(OU_SPACE) {
                set_once(&mut space_id, id, "space ID")?;
            } else if let Some(id) = value.strip_prefix(OU_APP) {
                set_once(&mut app_id, id, "app ID")?;
            }
        }

        let mut ip_address = None;
        let names = certificate.subject_alternative_name().map_err(decode)?;
        let names = names.map(|names| names.value.general_names.iter());
        for name in names.into_iter().flatten() {
            if let GeneralName::IPAddress(bytes) = name {
                let ip = ip_from_bytes(bytes)?;
                if ip_address.replace(ip).is_some() {
                    anyhow::bail!(IdentityAmbiguous {
                        field: "IP address"
                    });
                }
            }
        }
        let ip_address = ip_address.ok_or(IdentityIncomplete {
            field: "IP address",
        })?;

        VerifiedIdentity::new(
            instance_id.unwrap_or_default(),
            org_id.unwrap_or_default(),
            space_id.unwrap_or_default(),
            app_id.unwrap_or_default(),
            ip_address,
        )
    }
}

/// Check the certificate allows the required extended key usage.
///
/// Certificates without the extension, or allowing any usage, satisfy all requirements.
fn check_usage(certificate: &X509Certificate, required: KeyUsage) -> Result<()> {
    let usage = certificate.extended_key_usage().map_err(decode)?;
    let usage = match usage {
        None => return Ok(()),
        Some(usage) => usage.value,
    };
    let allowed = usage.any
        || match required {
            KeyUsage::Any => true,
            KeyUsage::ClientAuth => usage.client_auth,
            KeyUsage::ServerAuth => usage.server_auth,
        };
    if !allowed {
        anyhow::bail!(untrusted(format!(
            "certificate does not allow {:?} usage",
            required
        )));
    }
    Ok(())
}

/// Map the required usage to the `webpki` usages a chain is checked against.
///
/// Certificates without the extended key usage extension satisfy all of them.
fn key_usages(required: KeyUsage) -> Vec<webpki::KeyUsage> {
    let oids: &[&'static [u8]] = match required {
        KeyUsage::Any => &EKU_ANY_OF,
        KeyUsage::ClientAuth => &[EKU_CLIENT_AUTH],
        KeyUsage::ServerAuth => &[EKU_SERVER_AUTH],
    };
    oids.iter()
        .map(|oid| webpki::KeyUsage::required_if_present(*oid))
        .collect()
}

fn decode<E: std::fmt::Display>(error: E) -> CertificateDecode {
    CertificateDecode {
        reason: error.to_string(),
    }
}

fn ip_from_bytes(bytes: &[u8]) -> Result<IpAddr> {
    let ip = match bytes.len() {
        4 => {
            let mut octets = [0u8; 4];
            octets.copy_from_slice(bytes);
            IpAddr::V4(Ipv4Addr::from(octets))
        }
        16 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(bytes);
            IpAddr::V6(Ipv6Addr::from(octets))
        }
        length => anyhow::bail!(decode(format!(
            "IP address SAN has invalid length {}",
            length
        ))),
    };
    Ok(ip)
}

fn set_once<'a>(slot: &mut Option<&'a str>, value: &'a str, field: &'static str) -> Result<()> {
    if slot.replace(value).is_some() {
        anyhow::bail!(IdentityAmbiguous { field });
    }
    Ok(())
}

fn untrusted<S: Into<String>>(reason: S) -> UntrustedCertificate {
    UntrustedCertificate {
        reason: reason.into(),
    }
}
