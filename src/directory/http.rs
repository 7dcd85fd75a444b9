//! Cloud Controller (v2) API client for the HTTP(S) protocol.
use std::time::Duration;

use anyhow::Context as AnyContext;
use anyhow::Result;
use reqwest::Client as ReqwestClient;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::error::inspect;
use super::error::EmptyResponse;
use super::App;
use super::Directory;
use super::DirectoryFactory;
use super::IDirectory;
use super::Org;
use super::ServiceInstance;
use super::Space;
use crate::conf::DirectoryConf;
use crate::context::Context;
use crate::errors::CertificateDecode;

/// String to set as the user agent in HTTP request.
static CLIENT_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// OAuth client the Cloud Foundry CLI authenticates users as.
const OAUTH_CLIENT_ID: &str = "cf";

/// Create [`CloudControllerClient`]s for each validation.
#[derive(Clone, Copy, Debug, Default)]
pub struct CloudControllerFactory;

#[async_trait::async_trait]
impl DirectoryFactory for CloudControllerFactory {
    async fn client(&self, context: &Context, conf: &DirectoryConf) -> Result<Directory> {
        let client = CloudControllerClient::connect(context, conf).await?;
        Ok(Directory::from(client))
    }
}

/// Cloud Controller API client authenticated with a user's credentials.
pub struct CloudControllerClient {
    /// Base URL of the API server to send requests to, without trailing slash.
    base: String,

    /// Low-level [`Client`](reqwest::Client) to perform HTTP requests with.
    client: ReqwestClient,

    /// OAuth2 bearer token to authenticate requests with.
    token: String,
}

impl CloudControllerClient {
    /// Initialise a client and log into the API with the configured user.
    pub async fn connect(context: &Context, conf: &DirectoryConf) -> Result<CloudControllerClient> {
        let base = conf.api_address.trim_end_matches('/').to_string();
        let client = http_client(conf)?;

        let response = client.get(format!("{}/v2/info", base)).send().await?;
        let info: Info = expect_body(inspect(response).await?)?;
        let token_url = format!("{}/oauth/token", info.token_endpoint.trim_end_matches('/'));
        let token_url = Url::parse(&token_url).with_context(|| InfoInvalid {
                token_endpoint: info.token_endpoint.clone(),
            })?;
        slog::debug!(
            context.logger, "Logging into the Cloud Controller API";
            "api_address" => &base,
            "token_url" => token_url.as_str(),
            "username" => &conf.username,
        );

        let form = [
            ("grant_type", "password"),
            ("username", conf.username.as_str()),
            ("password", conf.password.as_str()),
        ];
        let response = client
            .post(token_url)
            .basic_auth(OAUTH_CLIENT_ID, Some(""))
            .form(&form)
            .send()
            .await?;
        let token: Token = expect_body(inspect(response).await?)?;
        Ok(CloudControllerClient {
            base,
            client,
            token: token.access_token,
        })
    }

    async fn get<T>(&self, path: &str, id: &str) -> Result<Resource<T>>
    where
        T: DeserializeOwned,
    {
        let response = self
            .client
            .get(format!("{}/v2/{}/{}", self.base, path, id))
            .bearer_auth(&self.token)
            .send()
            .await?;
        expect_body(inspect(response).await?)
    }
}

#[async_trait::async_trait]
impl IDirectory for CloudControllerClient {
    async fn app(&self, id: &str) -> Result<App> {
        let app: Resource<AppEntity> = self.get("apps", id).await?;
        Ok(app.into())
    }

    async fn org(&self, id: &str) -> Result<Org> {
        let org: Resource<serde_json::Value> = self.get("organizations", id).await?;
        Ok(Org {
            guid: org.metadata.guid,
        })
    }

    async fn service_instance(&self, id: &str) -> Result<ServiceInstance> {
        let instance: Resource<ServiceInstanceEntity> =
            self.get("service_instances", id).await?;
        Ok(instance.into())
    }

    async fn space(&self, id: &str) -> Result<Space> {
        let space: Resource<SpaceEntity> = self.get("spaces", id).await?;
        Ok(space.into())
    }
}

/// The API info does not point to a usable token endpoint.
#[derive(Debug, thiserror::Error)]
#[error("the Cloud Controller token endpoint '{token_endpoint}' is not a valid URL")]
pub struct InfoInvalid {
    pub token_endpoint: String,
}

fn expect_body<T>(body: Option<T>) -> Result<T> {
    match body {
        None => anyhow::bail!(EmptyResponse),
        Some(body) => Ok(body),
    }
}

fn http_client(conf: &DirectoryConf) -> Result<ReqwestClient> {
    let mut builder = ReqwestClient::builder().user_agent(CLIENT_USER_AGENT);
    if conf.timeout_sec > 0 {
        builder = builder.timeout(Duration::from_secs(conf.timeout_sec));
    }
    for pem in &conf.api_trusted_certificates {
        let certificate =
            reqwest::Certificate::from_pem(pem.as_bytes()).map_err(|error| CertificateDecode {
                reason: error.to_string(),
            })?;
        builder = builder.add_root_certificate(certificate);
    }
    let client = builder.build()?;
    Ok(client)
}

/// Wire format of Cloud Controller v2 records.
#[derive(Debug, Deserialize)]
struct Resource<T> {
    entity: T,
    metadata: Metadata,
}

#[derive(Debug, Deserialize)]
struct Metadata {
    guid: String,
}

#[derive(Debug, Deserialize)]
struct AppEntity {
    #[serde(default)]
    instances: u64,
    space_guid: String,
}

#[derive(Debug, Deserialize)]
struct ServiceInstanceEntity {
    space_guid: String,
}

#[derive(Debug, Deserialize)]
struct SpaceEntity {
    organization_guid: String,
}

#[derive(Debug, Deserialize)]
struct Info {
    token_endpoint: String,
}

#[derive(Debug, Deserialize)]
struct Token {
    access_token: String,
}

impl From<Resource<AppEntity>> for App {
    fn from(value: Resource<AppEntity>) -> Self {
        App {
            guid: value.metadata.guid,
            instances: value.entity.instances,
            space_guid: value.entity.space_guid,
        }
    }
}

impl From<Resource<ServiceInstanceEntity>> for ServiceInstance {
    fn from(value: Resource<ServiceInstanceEntity>) -> Self {
        ServiceInstance {
            guid: value.metadata.guid,
            space_guid: value.entity.space_guid,
        }
    }
}

impl From<Resource<SpaceEntity>> for Space {
    fn from(value: Resource<SpaceEntity>) -> Self {
        Space {
            guid: value.metadata.guid,
            organization_guid: value.entity.organization_guid,
        }
    }
}
