//! Login and renewal decisions for workloads presenting instance identity certificates.
use std::sync::Arc;

use anyhow::Result;

use crate::conf::Configuration;
use crate::context::Context;
use crate::directory::reconcile;
use crate::directory::DirectoryFactory;
use crate::identity::IdentityScheme;
use crate::identity::InstanceIdentityX509;
use crate::models::Alias;
use crate::models::AuthMetadata;
use crate::models::IssuedAuth;
use crate::models::LeaseOptions;
use crate::models::Role;
use crate::models::VerifiedIdentity;
use crate::signature::SignatureMatcher;
use crate::store::ConfigStore;
use crate::store::RoleStore;
use crate::window::Clock;
use crate::window::SystemClock;

mod login;
mod redact;
mod renew;


/// A required dependency was not provided to the [`EngineBuilder`].
#[derive(Debug, thiserror::Error)]
#[error("unable to build the authentication engine: missing {name}")]
pub struct MissingDependency {
    pub name: &'static str,
}

/// Authenticate workloads and renew the credentials issued to them.
///
/// Engines hold no state of their own: every decision is taken from the injected
/// stores and services at the time of the request.
#[derive(Clone)]
pub struct Engine {
    clock: Arc<dyn Clock>,
    config: Arc<dyn ConfigStore>,
    directory: Arc<dyn DirectoryFactory>,
    identity: Arc<dyn IdentityScheme>,
    roles: Arc<dyn RoleStore>,
    signatures: Arc<dyn SignatureMatcher>,
}

impl Engine {
    /// Start building an [`Engine`] from its dependencies.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// Check the identity is allowed by the role and still matches the Cloud Controller.
    async fn validate(
        &self,
        context: &Context,
        config: &Configuration,
        role: &Role,
        identity: &VerifiedIdentity,
        remote_addr: &str,
    ) -> Result<()> {
        crate::constraints::check_role(role, identity, remote_addr)?;
        let directory = self.directory.client(context, &config.directory).await?;
        reconcile(context, &directory, identity).await
    }
}

/// Build an [`Engine`] from the dependencies it needs.
///
/// The [`SystemClock`] and [`InstanceIdentityX509`] are used unless others are provided.
#[derive(Default)]
pub struct EngineBuilder {
    clock: Option<Arc<dyn Clock>>,
    config: Option<Arc<dyn ConfigStore>>,
    directory: Option<Arc<dyn DirectoryFactory>>,
    identity: Option<Arc<dyn IdentityScheme>>,
    roles: Option<Arc<dyn RoleStore>>,
    signatures: Option<Arc<dyn SignatureMatcher>>,
}

impl EngineBuilder {
    /// Finalise the build process, failing if required dependencies are missing.
    pub fn build(self) -> Result<Engine> {
        let engine = Engine {
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            config: self.config.ok_or(MissingDependency {
                name: "configuration store",
            })?,
            directory: self.directory.ok_or(MissingDependency {
                name: "directory factory",
            })?,
            identity: self
                .identity
                .unwrap_or_else(|| Arc::new(InstanceIdentityX509)),
            roles: self.roles.ok_or(MissingDependency { name: "role store" })?,
            signatures: self.signatures.ok_or(MissingDependency {
                name: "signature matcher",
            })?,
        };
        Ok(engine)
    }

    /// Read the current time from the given [`Clock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Read the configuration from the given store.
    pub fn config_store(mut self, store: Arc<dyn ConfigStore>) -> Self {
        self.config = Some(store);
        self
    }

    /// Create Cloud Controller clients with the given factory.
    pub fn directory(mut self, factory: Arc<dyn DirectoryFactory>) -> Self {
        self.directory = Some(factory);
        self
    }

    /// Verify certificates and extract identities with the given scheme.
    pub fn identity_scheme(mut self, scheme: Arc<dyn IdentityScheme>) -> Self {
        self.identity = Some(scheme);
        self
    }

    /// Read roles from the given store.
    pub fn role_store(mut self, store: Arc<dyn RoleStore>) -> Self {
        self.roles = Some(store);
        self
    }

    /// Match request signatures to certificates with the given matcher.
    pub fn signature_matcher(mut self, matcher: Arc<dyn SignatureMatcher>) -> Self {
        self.signatures = Some(matcher);
        self
    }
}

/// Issue a credential for an identity that passed all checks for a role.
fn assemble(role_name: &str, role: &Role, identity: &VerifiedIdentity) -> IssuedAuth {
    let metadata = AuthMetadata {
        identity: identity.clone(),
        role: role_name.to_string(),
    };
    IssuedAuth {
        alias: Alias {
            name: identity.app_id.clone(),
        },
        bound_cidrs: role.bound_cidrs.clone(),
        display_name: identity.instance_id.clone(),
        lease: LeaseOptions {
            max_ttl_sec: role.max_ttl_sec,
            renewable: true,
            ttl_sec: role.ttl_sec,
        },
        metadata: metadata.to_metadata(),
        period_sec: role.period_sec,
        policies: role.policies.clone(),
    }
}
