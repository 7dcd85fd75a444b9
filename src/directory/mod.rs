//! Cross-check identity claims against the live Cloud Controller inventory.
//!
//! Certificates are valid for some time after they are issued but the resources they
//! describe can be deleted or moved around at any time.
//! Every validation looks up all claimed resources again so changes are detected immediately.
use std::sync::Arc;

use anyhow::Context as AnyContext;
use anyhow::Result;

use crate::conf::DirectoryConf;
use crate::context::Context;
use crate::errors::AppNotRunning;
use crate::errors::DirectoryMismatch;
use crate::models::VerifiedIdentity;

mod error;
mod http;

#[cfg(any(test, feature = "test-fixture"))]
pub mod fixture;


pub use self::error::inspect;
pub use self::error::ApiError;
pub use self::error::ClientError;
pub use self::error::EmptyResponse;
pub use self::error::InvalidResponse;
pub use self::error::ResourceIdentifier;
pub use self::error::ResourceNotFound;
pub use self::error::ServerError;
pub use self::http::CloudControllerClient;
pub use self::http::CloudControllerFactory;

/// App as recorded by the Cloud Controller.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct App {
    pub guid: String,
    pub instances: u64,
    pub space_guid: String,
}

/// Organization as recorded by the Cloud Controller.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Org {
    pub guid: String,
}

/// Service instance as recorded by the Cloud Controller.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServiceInstance {
    pub guid: String,
    pub space_guid: String,
}

/// Space as recorded by the Cloud Controller.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Space {
    pub guid: String,
    pub organization_guid: String,
}

/// Interface to Cloud Controller clients.
///
/// Lookups of unknown resources must fail rather than return empty records.
#[async_trait::async_trait]
pub trait IDirectory: Send + Sync {
    /// Look up an app by ID.
    async fn app(&self, id: &str) -> Result<App>;

    /// Look up an organization by ID.
    async fn org(&self, id: &str) -> Result<Org>;

    /// Look up a service instance by ID.
    async fn service_instance(&self, id: &str) -> Result<ServiceInstance>;

    /// Look up a space by ID.
    async fn space(&self, id: &str) -> Result<Space>;
}

/// Client to look up Cloud Controller records.
#[derive(Clone)]
pub struct Directory {
    inner: Arc<dyn IDirectory>,
}

impl Directory {
    /// Look up an app by ID.
    pub async fn app(&self, id: &str) -> Result<App> {
        self.inner
            .app(id)
            .await
            .with_context(|| ResourceIdentifier::reference("app", id))
    }

    /// Look up an organization by ID.
    pub async fn org(&self, id: &str) -> Result<Org> {
        self.inner
            .org(id)
            .await
            .with_context(|| ResourceIdentifier::reference("org", id))
    }

    /// Look up a service instance by ID.
    pub async fn service_instance(&self, id: &str) -> Result<ServiceInstance> {
        self.inner
            .service_instance(id)
            .await
            .with_context(|| ResourceIdentifier::reference("service instance", id))
    }

    /// Look up a space by ID.
    pub async fn space(&self, id: &str) -> Result<Space> {
        self.inner
            .space(id)
            .await
            .with_context(|| ResourceIdentifier::reference("space", id))
    }
}

impl<T> From<T> for Directory
where
    T: IDirectory + 'static,
{
    fn from(value: T) -> Self {
        let inner = Arc::new(value);
        Directory { inner }
    }
}

/// Initialisation logic for [`Directory`] clients.
#[async_trait::async_trait]
pub trait DirectoryFactory: Send + Sync {
    /// Initialise a [`Directory`] client for a single validation.
    async fn client(&self, context: &Context, conf: &DirectoryConf) -> Result<Directory>;
}

/// Check the Cloud Controller agrees with all the claims of a verified identity.
///
/// Lookups happen one after the other and the first disagreement stops the process:
///
/// 1. The service instance exists in the claimed space.
/// 2. The app exists in the claimed space and has running instances.
/// 3. The org exists.
/// 4. The space exists in the claimed org.
pub async fn reconcile(
    context: &Context,
    directory: &Directory,
    identity: &VerifiedIdentity,
) -> Result<()> {
    let instance = directory.service_instance(&identity.instance_id).await?;
    expect(&instance.guid, &identity.instance_id, "instance", "service instance")?;
    expect(&instance.space_guid, &identity.space_id, "space", "service instance")?;

    let app = directory.app(&identity.app_id).await?;
    expect(&app.guid, &identity.app_id, "app", "app")?;
    expect(&app.space_guid, &identity.space_id, "space", "app")?;
    if app.instances == 0 {
        anyhow::bail!(AppNotRunning { app_id: app.guid });
    }

    let org = directory.org(&identity.org_id).await?;
    expect(&org.guid, &identity.org_id, "org", "org")?;

    let space = directory.space(&identity.space_id).await?;
    expect(&space.guid, &identity.space_id, "space", "space")?;
    expect(&space.organization_guid, &identity.org_id, "org", "space")?;

    slog::debug!(
        context.logger, "Identity matches the Cloud Controller records";
        "instance_id" => &identity.instance_id,
        "app_id" => &identity.app_id,
        "app_instances" => app.instances,
    );
    Ok(())
}

fn expect(actual: &str, claimed: &str, field: &'static str, record: &'static str) -> Result<()> {
    if actual != claimed {
        anyhow::bail!(DirectoryMismatch {
            actual: actual.to_string(),
            claimed: claimed.to_string(),
            field,
            record,
        });
    }
    Ok(())
}
