//! In-memory Cloud Controller implementation for unit tests.
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use anyhow::Result;

use super::App;
use super::Directory;
use super::DirectoryFactory;
use super::IDirectory;
use super::Org;
use super::ResourceNotFound;
use super::ServiceInstance;
use super::Space;
use crate::conf::DirectoryConf;
use crate::context::Context;
use crate::models::VerifiedIdentity;

/// In-memory Cloud Controller records that also act as their own [`DirectoryFactory`].
///
/// Clones share the same records so tests can change them between validations.
#[derive(Clone, Default)]
pub struct DirectoryFixture {
    state: Arc<Mutex<State>>,
}

impl DirectoryFixture {
    /// Records matching the given identity, with one running app instance.
    pub fn for_identity(identity: &VerifiedIdentity) -> DirectoryFixture {
        let fixture = DirectoryFixture::default();
        fixture.insert_service_instance(ServiceInstance {
            guid: identity.instance_id.clone(),
            space_guid: identity.space_id.clone(),
        });
        fixture.insert_app(App {
            guid: identity.app_id.clone(),
            instances: 1,
            space_guid: identity.space_id.clone(),
        });
        fixture.insert_org(Org {
            guid: identity.org_id.clone(),
        });
        fixture.insert_space(Space {
            guid: identity.space_id.clone(),
            organization_guid: identity.org_id.clone(),
        });
        fixture
    }

    /// Lookups performed so far, as `<record>:<id>` strings.
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    /// Number of clients created with the [`DirectoryFactory`] implementation.
    pub fn clients(&self) -> usize {
        self.state().clients
    }

    pub fn insert_app(&self, app: App) {
        self.state().apps.insert(app.guid.clone(), app);
    }

    pub fn insert_org(&self, org: Org) {
        self.state().orgs.insert(org.guid.clone(), org);
    }

    pub fn insert_service_instance(&self, instance: ServiceInstance) {
        self.state()
            .service_instances
            .insert(instance.guid.clone(), instance);
    }

    pub fn insert_space(&self, space: Space) {
        self.state().spaces.insert(space.guid.clone(), space);
    }

    /// Store an app record under an ID that may differ from its GUID.
    pub fn insert_app_as<S: Into<String>>(&self, id: S, app: App) {
        self.state().apps.insert(id.into(), app);
    }

    fn lookup<T, F>(&self, record: &str, id: &str, select: F) -> Result<T>
    where
        F: FnOnce(&State) -> Option<&T>,
        T: Clone,
    {
        let mut state = self.state();
        state.calls.push(format!("{}:{}", record, id));
        match select(&state) {
            None => anyhow::bail!(ResourceNotFound),
            Some(value) => Ok(value.clone()),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state
            .lock()
            .expect("DirectoryFixture state lock poisoned")
    }
}

#[async_trait::async_trait]
impl IDirectory for DirectoryFixture {
    async fn app(&self, id: &str) -> Result<App> {
        self.lookup("app", id, |state| state.apps.get(id))
    }

    async fn org(&self, id: &str) -> Result<Org> {
        self.lookup("org", id, |state| state.orgs.get(id))
    }

    async fn service_instance(&self, id: &str) -> Result<ServiceInstance> {
        self.lookup("service_instance", id, |state| {
            state.service_instances.get(id)
        })
    }

    async fn space(&self, id: &str) -> Result<Space> {
        self.lookup("space", id, |state| state.spaces.get(id))
    }
}

#[async_trait::async_trait]
impl DirectoryFactory for DirectoryFixture {
    async fn client(&self, _: &Context, _: &DirectoryConf) -> Result<Directory> {
        self.state().clients += 1;
        Ok(Directory::from(self.clone()))
    }
}

/// Internal state to implement directory mocking.
#[derive(Default)]
struct State {
    apps: HashMap<String, App>,
    calls: Vec<String>,
    clients: usize,
    orgs: HashMap<String, Org>,
    service_instances: HashMap<String, ServiceInstance>,
    spaces: HashMap<String, Space>,
}
