use std::sync::Arc;
use std::sync::Mutex;

use anyhow::Result;
use slog::Logger;
use time::macros::datetime;
use time::OffsetDateTime;

use cf_instance_auth::conf::Configuration;
use cf_instance_auth::conf::DirectoryConf;
use cf_instance_auth::directory::App;
use cf_instance_auth::directory::Directory;
use cf_instance_auth::directory::DirectoryFactory;
use cf_instance_auth::directory::IDirectory;
use cf_instance_auth::directory::Org;
use cf_instance_auth::directory::ResourceNotFound;
use cf_instance_auth::directory::ServiceInstance;
use cf_instance_auth::directory::Space;
use cf_instance_auth::errors::NoMatchingCertificate;
use cf_instance_auth::identity::Certificate;
use cf_instance_auth::signature::SignatureData;
use cf_instance_auth::signature::SignatureMatcher;
use cf_instance_auth::store::MemoryStore;
use cf_instance_auth::window::Clock;
use cf_instance_auth::Context;
use cf_instance_auth::Engine;
use cf_instance_auth::LoginRequest;
use cf_instance_auth::Role;

const INSTANCE: &str = include_str!("fixtures/instance.pem");
const ROOT_CA: &str = include_str!("fixtures/root-ca.pem");

const APP_ID: &str = "2d3e834a-3a25-4591-974c-fa5626d5d0a1";
const INSTANCE_ID: &str = "f9c7cc0b-4d58-4b4c-b7c6-0a8eeb3c3f4b";
const ORG_ID: &str = "34a878d0-c2f9-4521-ba73-a9f664e82c7b";
const SPACE_ID: &str = "3d2eba6b-ef19-44d5-91dd-1975b0db5cc9";
const REMOTE_ADDR: &str = "10.255.181.105/32";

struct Frozen(OffsetDateTime);

impl Clock for Frozen {
    fn now(&self) -> OffsetDateTime {
        self.0
    }
}

/// Accept signatures equal to `<role>@<signing_time>` from the first presented certificate.
struct EchoSignature;

impl SignatureMatcher for EchoSignature {
    fn matching_certificate(&self, signature: &str, data: &SignatureData) -> Result<Certificate> {
        if signature != format!("{}@{}", data.role, data.signing_time) {
            anyhow::bail!(NoMatchingCertificate);
        }
        let mut chain = Certificate::from_pem_chain(&data.certificate)?;
        if chain.is_empty() {
            anyhow::bail!(NoMatchingCertificate);
        }
        Ok(chain.remove(0))
    }
}

#[derive(Clone)]
struct Inventory {
    app_instances: Arc<Mutex<u64>>,
}

#[async_trait::async_trait]
impl IDirectory for Inventory {
    async fn app(&self, id: &str) -> Result<App> {
        if id != APP_ID {
            anyhow::bail!(ResourceNotFound);
        }
        let instances = *self.app_instances.lock().unwrap();
        Ok(App {
            guid: APP_ID.into(),
            instances,
            space_guid: SPACE_ID.into(),
        })
    }

    async fn org(&self, id: &str) -> Result<Org> {
        Ok(Org { guid: id.into() })
    }

    async fn service_instance(&self, id: &str) -> Result<ServiceInstance> {
        Ok(ServiceInstance {
            guid: id.into(),
            space_guid: SPACE_ID.into(),
        })
    }

    async fn space(&self, id: &str) -> Result<Space> {
        Ok(Space {
            guid: id.into(),
            organization_guid: ORG_ID.into(),
        })
    }
}

#[async_trait::async_trait]
impl DirectoryFactory for Inventory {
    async fn client(&self, _: &Context, _: &DirectoryConf) -> Result<Directory> {
        Ok(Directory::from(self.clone()))
    }
}

fn context() -> Context {
    let logger = Logger::root(slog::Discard, slog::o!());
    Context::root(logger).build()
}

fn engine(inventory: &Inventory) -> Engine {
    let context = context();
    let store = Arc::new(MemoryStore::default());
    let config: Configuration = serde_json::from_value(serde_json::json!({
        "directory": {
            "api_address": "https://api.sys.example.com",
            "username": "auth-backend",
            "password": "secret",
        },
        "identity_ca_certificates": [ROOT_CA],
        "required_usage": "client_auth",
    }))
    .unwrap();
    store.set_config(&context, config).unwrap();
    let role: Role = serde_json::from_value(serde_json::json!({
        "name": "web",
        "bound_cidrs": ["10.255.0.0/16"],
        "bound_org_ids": [ORG_ID],
        "policies": ["web"],
        "ttl_sec": 300,
    }))
    .unwrap();
    store.put_role(&context, role).unwrap();

    Engine::builder()
        .clock(Arc::new(Frozen(datetime!(2030-06-01 12:00:00 UTC))))
        .config_store(store.clone())
        .directory(Arc::new(inventory.clone()))
        .role_store(store)
        .signature_matcher(Arc::new(EchoSignature))
        .build()
        .unwrap()
}

fn request() -> LoginRequest {
    LoginRequest {
        certificate: INSTANCE.to_string(),
        role: "web".into(),
        signature: "web@2030-06-01T11:58:00Z".into(),
        signing_time: "2030-06-01T11:58:00Z".into(),
    }
}

#[tokio::test]
async fn login_then_renew() {
    let inventory = Inventory {
        app_instances: Arc::new(Mutex::new(2)),
    };
    let engine = engine(&inventory);
    let context = context();

    let auth = engine
        .login(&context, &request(), REMOTE_ADDR)
        .await
        .unwrap();
    assert_eq!(auth.alias.name, APP_ID);
    assert_eq!(auth.display_name, INSTANCE_ID);
    assert_eq!(auth.bound_cidrs.len(), 1);
    assert_eq!(auth.lease.ttl_sec, 300);
    assert!(auth.lease.renewable);

    let renewed = engine.renew(&context, &auth, REMOTE_ADDR).await.unwrap();
    assert_eq!(renewed, auth);

    // Stopping the app revokes outstanding credentials on renewal.
    *inventory.app_instances.lock().unwrap() = 0;
    let error = engine.renew(&context, &auth, REMOTE_ADDR).await.unwrap_err();
    assert!(error.to_string().contains("doesn't have any live instances"));
}

#[tokio::test]
async fn login_failure_is_opaque() {
    let inventory = Inventory {
        app_instances: Arc::new(Mutex::new(0)),
    };
    let engine = engine(&inventory);
    let error = engine
        .login(&context(), &request(), REMOTE_ADDR)
        .await
        .unwrap_err();
    let message = error.to_string();
    assert_eq!(
        message,
        format!("authentication failed, failure ID {}", error.failure_id)
    );
}

#[tokio::test]
async fn login_from_other_address() {
    let inventory = Inventory {
        app_instances: Arc::new(Mutex::new(1)),
    };
    let engine = engine(&inventory);
    let result = engine.login(&context(), &request(), "10.0.0.1").await;
    assert!(result.is_err());
}

#[tokio::test]
async fn login_with_tampered_role() {
    let inventory = Inventory {
        app_instances: Arc::new(Mutex::new(1)),
    };
    let engine = engine(&inventory);
    let mut request = request();
    request.role = "admin".into();
    let result = engine.login(&context(), &request, REMOTE_ADDR).await;
    assert!(result.is_err());
}
