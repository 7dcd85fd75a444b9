//! Errors reported while authenticating workloads or renewing their credentials.
//!
//! Errors are individual types so code and tests can check for specific conditions
//! with [`anyhow::Error::is`] while [`anyhow`] carries them around.
use time::OffsetDateTime;
use uuid::Uuid;

/// Opaque error returned to callers of failed logins.
///
/// The detailed cause is only available in the server logs, correlated by `failure_id`.
#[derive(Debug, thiserror::Error)]
#[error("authentication failed, failure ID {failure_id}")]
pub struct LoginFailed {
    pub failure_id: Uuid,
}

/// A required login request field is missing or empty.
#[derive(Debug, thiserror::Error)]
#[error("'{field}' is required")]
pub struct MissingField {
    pub field: &'static str,
}

/// The signing time does not match any supported format.
#[derive(Debug, thiserror::Error)]
#[error("couldn't parse signing time '{raw}'")]
pub struct SigningTimeParse {
    pub raw: String,
}

/// The request was signed too long before it was received.
#[derive(Debug, thiserror::Error)]
#[error(
    "request is too old; signed at {signed} but received request at {received}; raw signing time is {raw}"
)]
pub struct RequestTooOld {
    pub raw: String,
    pub received: OffsetDateTime,
    pub signed: OffsetDateTime,
}

/// The request claims to be signed too far after it was received.
#[derive(Debug, thiserror::Error)]
#[error(
    "request is too far in the future; signed at {signed} but received request at {received}; raw signing time is {raw}"
)]
pub struct RequestTooFarInFuture {
    pub raw: String,
    pub received: OffsetDateTime,
    pub signed: OffsetDateTime,
}

/// No configuration is available to verify client certificates with.
#[derive(Debug, thiserror::Error)]
#[error("no CA is configured for verifying client certificates")]
pub struct NoCaConfigured;

/// No configuration is available to reach the Cloud Controller API.
#[derive(Debug, thiserror::Error)]
#[error("no configuration is available for reaching the Cloud Controller API")]
pub struct NoDirectoryConfigured;

/// No presented certificate produced the request signature.
#[derive(Debug, thiserror::Error)]
#[error("no presented certificate matches the request signature")]
pub struct NoMatchingCertificate;

/// Unable to decode certificates from PEM or DER data.
#[derive(Debug, thiserror::Error)]
#[error("unable to decode certificate: {reason}")]
pub struct CertificateDecode {
    pub reason: String,
}

/// The certificate is not trusted by the configured CAs.
#[derive(Debug, thiserror::Error)]
#[error("certificate is not trusted: {reason}")]
pub struct UntrustedCertificate {
    pub reason: String,
}

/// The certificate does not carry one of the identity fields.
#[derive(Debug, thiserror::Error)]
#[error("certificate identity is missing the {field}")]
pub struct IdentityIncomplete {
    pub field: &'static str,
}

/// The certificate carries more than one value for an identity field.
#[derive(Debug, thiserror::Error)]
#[error("certificate identity has more than one {field}")]
pub struct IdentityAmbiguous {
    pub field: &'static str,
}

/// The requested role does not exist.
#[derive(Debug, thiserror::Error)]
#[error("no matching role '{role}'")]
pub struct NoMatchingRole {
    pub role: String,
}

/// The role definition is not valid.
#[derive(Debug, thiserror::Error)]
#[error("invalid role '{role}': {reason}")]
pub struct InvalidRole {
    pub reason: String,
    pub role: String,
}

/// The request remote address does not match the certificate IP address.
#[derive(Debug, thiserror::Error)]
#[error("no matching IP address: request from {remote} but certificate is for {certificate}")]
pub struct IpAddressMismatch {
    pub certificate: String,
    pub remote: String,
}

/// An identity attribute is not in the role's bound set.
#[derive(Debug, thiserror::Error)]
#[error("{kind} ID {value} doesn't match role constraints of {allowed:?}")]
pub struct ConstraintMismatch {
    pub allowed: Vec<String>,
    pub kind: &'static str,
    pub value: String,
}

/// The request remote address is not in any of the role's bound CIDRs.
#[derive(Debug, thiserror::Error)]
#[error("remote address {remote} doesn't match role constraints of {allowed:?}")]
pub struct RemoteAddressNotAllowed {
    pub allowed: Vec<String>,
    pub remote: String,
}

/// The Cloud Controller disagrees with an identity claim.
#[derive(Debug, thiserror::Error)]
#[error("cert {field} ID {claimed} doesn't match API's expected one of {actual} (from {record} lookup)")]
pub struct DirectoryMismatch {
    pub actual: String,
    pub claimed: String,
    pub field: &'static str,
    pub record: &'static str,
}

/// The app has no running instances.
#[derive(Debug, thiserror::Error)]
#[error("app {app_id} doesn't have any live instances")]
pub struct AppNotRunning {
    pub app_id: String,
}

/// A value needed to renew the credential is missing from its metadata.
#[derive(Debug, thiserror::Error)]
#[error("unable to retrieve {key} from metadata during renewal")]
pub struct RenewalMetadataMissing {
    pub key: &'static str,
}

/// A value stored in the credential metadata could not be decoded.
#[derive(Debug, thiserror::Error)]
#[error("invalid {key} '{value}' in metadata during renewal")]
pub struct RenewalMetadataInvalid {
    pub key: &'static str,
    pub value: String,
}

/// Structured log attributes describing an error and the chain of its causes.
pub struct ErrorAttributes<'a> {
    error: &'a anyhow::Error,
}

impl<'a> From<&'a anyhow::Error> for ErrorAttributes<'a> {
    fn from(error: &'a anyhow::Error) -> Self {
        ErrorAttributes { error }
    }
}

impl slog::KV for ErrorAttributes<'_> {
    fn serialize(&self, _: &slog::Record, serializer: &mut dyn slog::Serializer) -> slog::Result {
        serializer.emit_arguments("error", &format_args!("{:#}", self.error))?;
        serializer.emit_arguments("error_root", &format_args!("{}", self.error.root_cause()))
    }
}
