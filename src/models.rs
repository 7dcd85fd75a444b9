//! Data exchanged with callers and collaborators of the authentication [`Engine`](crate::Engine).
use std::collections::BTreeMap;
use std::net::IpAddr;

use anyhow::Result;
use ipnet::IpNet;
use serde::Deserialize;
use serde::Serialize;

use crate::errors::IdentityIncomplete;
use crate::errors::RenewalMetadataInvalid;
use crate::errors::RenewalMetadataMissing;

/// Metadata key for the role the credential was issued for.
pub const METADATA_ROLE: &str = "role";
/// Metadata key for the app instance ID.
pub const METADATA_INSTANCE_ID: &str = "instance_id";
/// Metadata key for the organization ID.
pub const METADATA_ORG_ID: &str = "org_id";
/// Metadata key for the app ID.
pub const METADATA_APP_ID: &str = "app_id";
/// Metadata key for the space ID.
pub const METADATA_SPACE_ID: &str = "space_id";
/// Metadata key for the app instance IP address.
pub const METADATA_IP_ADDRESS: &str = "ip_address";

/// Login request sent by workloads.
///
/// All fields are required and empty strings are rejected.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct LoginRequest {
    /// PEM encoded instance identity certificate, optionally followed by intermediates.
    pub certificate: String,

    /// Name of the role to authenticate against.
    pub role: String,

    /// Signature of the request made with the certificate's private key.
    pub signature: String,

    /// Time the signature was made at, in one of the supported formats.
    pub signing_time: String,
}

/// Identity of an app instance, extracted from a trusted certificate.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VerifiedIdentity {
    pub app_id: String,
    pub instance_id: String,
    pub ip_address: IpAddr,
    pub org_id: String,
    pub space_id: String,
}

impl VerifiedIdentity {
    /// Assemble an identity, rejecting any empty identifier.
    pub fn new<S1, S2, S3, S4>(
        instance_id: S1,
        org_id: S2,
        space_id: S3,
        app_id: S4,
        ip_address: IpAddr,
    ) -> Result<VerifiedIdentity>
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
        S4: Into<String>,
    {
        let identity = VerifiedIdentity {
            app_id: app_id.into(),
            instance_id: instance_id.into(),
            ip_address,
            org_id: org_id.into(),
            space_id: space_id.into(),
        };
        let fields = [
            ("instance ID", &identity.instance_id),
            ("org ID", &identity.org_id),
            ("space ID", &identity.space_id),
            ("app ID", &identity.app_id),
        ];
        for (field, value) in fields {
            if value.is_empty() {
                anyhow::bail!(IdentityIncomplete { field });
            }
        }
        Ok(identity)
    }
}

/// Constraints and credential options for workloads logging in with a role.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Role {
    /// Name of the role.
    pub name: String,

    /// App IDs allowed to log in with this role (empty for any).
    #[serde(default)]
    pub bound_app_ids: Vec<String>,

    /// Networks requests must come from (empty for any).
    #[serde(default)]
    pub bound_cidrs: Vec<IpNet>,

    /// App instance IDs allowed to log in with this role (empty for any).
    #[serde(default)]
    pub bound_instance_ids: Vec<String>,

    /// Organization IDs allowed to log in with this role (empty for any).
    #[serde(default)]
    pub bound_org_ids: Vec<String>,

    /// Space IDs allowed to log in with this role (empty for any).
    #[serde(default)]
    pub bound_space_ids: Vec<String>,

    /// Skip checking the request remote address against the certificate IP address.
    #[serde(default)]
    pub disable_ip_matching: bool,

    /// Maximum lifetime, in seconds, of issued credentials (0 for the system default).
    #[serde(default)]
    pub max_ttl_sec: u64,

    /// Renewal period, in seconds, of issued credentials (0 for none).
    #[serde(default)]
    pub period_sec: u64,

    /// Policies attached to issued credentials.
    #[serde(default)]
    pub policies: Vec<String>,

    /// Initial lifetime, in seconds, of issued credentials (0 for the system default).
    #[serde(default)]
    pub ttl_sec: u64,
}

/// Identity snapshot attached to issued credentials and used to renew them.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AuthMetadata {
    pub identity: VerifiedIdentity,
    pub role: String,
}

impl AuthMetadata {
    /// Decode the snapshot stored in a credential's metadata.
    pub fn from_metadata(metadata: &BTreeMap<String, String>) -> Result<AuthMetadata> {
        let lookup = |key: &'static str| -> Result<&str> {
            match metadata.get(key).map(String::as_str) {
                None | Some("") => anyhow::bail!(RenewalMetadataMissing { key }),
                Some(value) => Ok(value),
            }
        };
        let role = lookup(METADATA_ROLE)?.to_string();
        let ip_address = lookup(METADATA_IP_ADDRESS)?;
        let ip_address = ip_address.parse().map_err(|_| RenewalMetadataInvalid {
            key: METADATA_IP_ADDRESS,
            value: ip_address.to_string(),
        })?;
        let identity = VerifiedIdentity::new(
            lookup(METADATA_INSTANCE_ID)?,
            lookup(METADATA_ORG_ID)?,
            lookup(METADATA_SPACE_ID)?,
            lookup(METADATA_APP_ID)?,
            ip_address,
        )?;
        Ok(AuthMetadata { identity, role })
    }

    /// Encode the snapshot for storage in a credential's metadata.
    pub fn to_metadata(&self) -> BTreeMap<String, String> {
        let identity = &self.identity;
        let mut metadata = BTreeMap::new();
        metadata.insert(METADATA_ROLE.to_string(), self.role.clone());
        metadata.insert(METADATA_INSTANCE_ID.to_string(), identity.instance_id.clone());
        metadata.insert(METADATA_ORG_ID.to_string(), identity.org_id.clone());
        metadata.insert(METADATA_APP_ID.to_string(), identity.app_id.clone());
        metadata.insert(METADATA_SPACE_ID.to_string(), identity.space_id.clone());
        metadata.insert(METADATA_IP_ADDRESS.to_string(), identity.ip_address.to_string());
        metadata
    }
}

/// Credential issued to workloads that successfully authenticated.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct IssuedAuth {
    /// Grouping key for repeated logins by the same workload.
    pub alias: Alias,

    /// Networks the credential can be used from.
    pub bound_cidrs: Vec<IpNet>,

    /// Human readable name of the authenticated entity.
    pub display_name: String,

    /// Lifetime options for the credential.
    pub lease: LeaseOptions,

    /// Identity snapshot, see [`AuthMetadata`].
    pub metadata: BTreeMap<String, String>,

    /// Renewal period, in seconds, of the credential (0 for none).
    pub period_sec: u64,

    /// Policies attached to the credential.
    pub policies: Vec<String>,
}

/// Alias to group logins from the same workload.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Alias {
    pub name: String,
}

/// Lifetime options for an issued credential.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct LeaseOptions {
    pub max_ttl_sec: u64,
    pub renewable: bool,
    pub ttl_sec: u64,
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::AuthMetadata;
    use super::VerifiedIdentity;
    use crate::errors::IdentityIncomplete;
    use crate::errors::RenewalMetadataInvalid;
    use crate::errors::RenewalMetadataMissing;

    fn metadata() -> BTreeMap<String, String> {
        let identity = VerifiedIdentity::new(
            "instance-1",
            "org-1",
            "space-1",
            "app-1",
            "10.0.0.5".parse().unwrap(),
        )
        .unwrap();
        let meta = AuthMetadata {
            identity,
            role: "web".into(),
        };
        meta.to_metadata()
    }

    #[test]
    fn metadata_keys() {
        let metadata = metadata();
        let keys: Vec<&str> = metadata.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec!["app_id", "instance_id", "ip_address", "org_id", "role", "space_id"]
        );
        assert_eq!(metadata["ip_address"], "10.0.0.5");
    }

    #[test]
    fn metadata_decode() {
        let meta = AuthMetadata::from_metadata(&metadata()).unwrap();
        assert_eq!(meta.role, "web");
        assert_eq!(meta.identity.instance_id, "instance-1");
        assert_eq!(meta.identity.org_id, "org-1");
        assert_eq!(meta.identity.space_id, "space-1");
        assert_eq!(meta.identity.app_id, "app-1");
    }

    #[test]
    fn metadata_missing_role() {
        let mut metadata = metadata();
        metadata.insert("role".into(), "".into());
        let error = AuthMetadata::from_metadata(&metadata).unwrap_err();
        let error = error.downcast_ref::<RenewalMetadataMissing>().unwrap();
        assert_eq!(error.key, "role");
    }

    #[test]
    fn metadata_invalid_ip() {
        let mut metadata = metadata();
        metadata.insert("ip_address".into(), "not-an-ip".into());
        let error = AuthMetadata::from_metadata(&metadata).unwrap_err();
        assert!(error.is::<RenewalMetadataInvalid>());
    }

    #[test]
    fn identity_rejects_empty_fields() {
        let error = VerifiedIdentity::new("i", "o", "", "a", "10.0.0.1".parse().unwrap())
            .unwrap_err();
        let error = error.downcast_ref::<IdentityIncomplete>().unwrap();
        assert_eq!(error.field, "space ID");
    }
}
