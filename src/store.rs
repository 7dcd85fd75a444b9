//! Access to the stored configuration and role definitions.
//!
//! Logins and renewals only ever read from the stores.
//! Management operations are provided by the [`MemoryStore`] implementation.
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::PoisonError;
use std::sync::RwLock;
use std::sync::RwLockReadGuard;
use std::sync::RwLockWriteGuard;

use anyhow::Result;

use crate::conf::Configuration;
use crate::context::Context;
use crate::errors::InvalidRole;
use crate::models::Role;

/// Read access to the backend configuration.
#[async_trait::async_trait]
pub trait ConfigStore: Send + Sync {
    /// Return the current configuration, if one is set.
    async fn config(&self, context: &Context) -> Result<Option<Configuration>>;
}

/// Read access to role definitions.
#[async_trait::async_trait]
pub trait RoleStore: Send + Sync {
    /// Return the role with the given name, if it exists.
    async fn role(&self, context: &Context, name: &str) -> Result<Option<Role>>;
}

/// Check a role definition can be stored.
pub fn validate_role(role: &Role) -> Result<()> {
    if role.name.is_empty() {
        anyhow::bail!(InvalidRole {
            reason: "the role name is required".into(),
            role: role.name.clone(),
        });
    }
    if role.max_ttl_sec > 0 && role.ttl_sec > role.max_ttl_sec {
        anyhow::bail!(InvalidRole {
            reason: format!(
                "ttl of {}s exceeds max ttl of {}s",
                role.ttl_sec, role.max_ttl_sec
            ),
            role: role.name.clone(),
        });
    }
    Ok(())
}

/// Thread-safe in-memory configuration and role storage.
#[derive(Debug, Default)]
pub struct MemoryStore {
    config: RwLock<Option<Configuration>>,
    roles: RwLock<BTreeMap<String, Role>>,
}

impl MemoryStore {
    /// Remove the configuration, if any is set.
    pub fn clear_config(&self, context: &Context) {
        *write(&self.config) = None;
        slog::info!(context.logger, "Configuration cleared");
    }

    /// Remove a role, returning it if it existed.
    pub fn delete_role(&self, context: &Context, name: &str) -> Option<Role> {
        let role = write(&self.roles).remove(name);
        if role.is_some() {
            slog::info!(context.logger, "Role deleted"; "role" => name);
        }
        role
    }

    /// Read the configuration from a file and store it.
    ///
    /// Any stored configuration is kept if the file can't be loaded or is invalid.
    pub fn load_config<P: AsRef<Path>>(&self, context: &Context, path: P) -> Result<()> {
        let path = path.as_ref();
        let config = crate::conf::load(path)?;
        slog::debug!(
            context.logger, "Configuration loaded from file";
            "path" => %path.display(),
        );
        self.set_config(context, config)
    }

    /// Names of all stored roles, sorted.
    pub fn list_roles(&self) -> Vec<String> {
        read(&self.roles).keys().cloned().collect()
    }

    /// Validate and store a role, replacing any role with the same name.
    pub fn put_role(&self, context: &Context, role: Role) -> Result<()> {
        validate_role(&role)?;
        slog::info!(context.logger, "Role stored"; "role" => &role.name);
        write(&self.roles).insert(role.name.clone(), role);
        Ok(())
    }

    /// Replace the configuration.
    ///
    /// The configured CAs are decoded first so invalid configurations are never stored.
    pub fn set_config(&self, context: &Context, config: Configuration) -> Result<()> {
        config.verify_options()?;
        *write(&self.config) = Some(config);
        slog::info!(context.logger, "Configuration updated");
        Ok(())
    }
}

#[async_trait::async_trait]
impl ConfigStore for MemoryStore {
    async fn config(&self, _: &Context) -> Result<Option<Configuration>> {
        Ok(read(&self.config).clone())
    }
}

#[async_trait::async_trait]
impl RoleStore for MemoryStore {
    async fn role(&self, _: &Context, name: &str) -> Result<Option<Role>> {
        Ok(read(&self.roles).get(name).cloned())
    }
}

// Poisoned locks are recovered as writers replace values in a single step.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::ConfigStore;
    use super::MemoryStore;
    use super::RoleStore;
    use crate::conf::ConfigFileDecode;
    use crate::conf::ConfigFileNotFound;
    use crate::conf::ConfigFileRead;
    use crate::conf::Configuration;
    use crate::conf::DirectoryConf;
    use crate::context::Context;
    use crate::errors::CertificateDecode;
    use crate::errors::InvalidRole;
    use crate::models::Role;

    const ROOT_CA: &str = include_str!("../tests/fixtures/root-ca.pem");

    fn config(ca: &str) -> Configuration {
        Configuration {
            directory: DirectoryConf {
                api_address: "https://api.sys.example.com".into(),
                api_trusted_certificates: Vec::new(),
                password: "secret".into(),
                timeout_sec: 30,
                username: "vault".into(),
            },
            identity_ca_certificates: vec![ca.to_string()],
            required_usage: Default::default(),
        }
    }

    /// Write `content` to a new file in the temporary directory and return its path.
    fn config_file(content: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("cf-auth-{}.yaml", uuid::Uuid::new_v4()));
        std::fs::write(&path, content).unwrap();
        path
    }

    fn role(name: &str) -> Role {
        Role {
            name: name.into(),
            ttl_sec: 60,
            max_ttl_sec: 120,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn config_lifecycle() {
        let context = Context::fixture();
        let store = MemoryStore::default();
        assert!(store.config(&context).await.unwrap().is_none());

        store.set_config(&context, config(ROOT_CA)).unwrap();
        let stored = store.config(&context).await.unwrap().unwrap();
        assert_eq!(stored.directory.username, "vault");

        store.clear_config(&context);
        assert!(store.config(&context).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn config_with_invalid_ca_is_rejected() {
        let context = Context::fixture();
        let store = MemoryStore::default();
        let error = store.set_config(&context, config("garbage")).unwrap_err();
        assert!(error.is::<CertificateDecode>());
        assert!(store.config(&context).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn load_config_from_file() {
        let context = Context::fixture();
        let store = MemoryStore::default();
        let content = serde_json::to_string(&config(ROOT_CA)).unwrap();
        let path = config_file(&content);
        store.load_config(&context, &path).unwrap();
        std::fs::remove_file(&path).unwrap();

        let stored = store.config(&context).await.unwrap().unwrap();
        assert_eq!(stored, config(ROOT_CA));
    }

    #[tokio::test]
    async fn load_config_keeps_previous_on_error() {
        let context = Context::fixture();
        let store = MemoryStore::default();
        store.set_config(&context, config(ROOT_CA)).unwrap();

        let error = store
            .load_config(&context, "/this/path/does/not/exist.yaml")
            .unwrap_err();
        assert!(error.is::<ConfigFileNotFound>());

        let error = store
            .load_config(&context, std::env::temp_dir())
            .unwrap_err();
        assert!(error.is::<ConfigFileRead>());

        let path = config_file("directory: [not, a, mapping]\n");
        let error = store.load_config(&context, &path).unwrap_err();
        std::fs::remove_file(&path).unwrap();
        assert!(error.is::<ConfigFileDecode>());

        let content = serde_json::to_string(&config("garbage")).unwrap();
        let path = config_file(&content);
        let error = store.load_config(&context, &path).unwrap_err();
        std::fs::remove_file(&path).unwrap();
        assert!(error.is::<CertificateDecode>());

        let stored = store.config(&context).await.unwrap().unwrap();
        assert_eq!(stored, config(ROOT_CA));
    }

    #[tokio::test]
    async fn role_lifecycle() {
        let context = Context::fixture();
        let store = MemoryStore::default();
        store.put_role(&context, role("web")).unwrap();
        store.put_role(&context, role("api")).unwrap();
        assert_eq!(store.list_roles(), vec!["api", "web"]);

        let web = store.role(&context, "web").await.unwrap().unwrap();
        assert_eq!(web.ttl_sec, 60);
        assert!(store.role(&context, "worker").await.unwrap().is_none());

        assert!(store.delete_role(&context, "web").is_some());
        assert!(store.delete_role(&context, "web").is_none());
        assert_eq!(store.list_roles(), vec!["api"]);
    }

    #[test]
    fn role_needs_a_name() {
        let context = Context::fixture();
        let store = MemoryStore::default();
        let error = store.put_role(&context, role("")).unwrap_err();
        assert!(error.is::<InvalidRole>());
    }

    #[test]
    fn role_ttl_within_max_ttl() {
        let context = Context::fixture();
        let store = MemoryStore::default();
        let mut invalid = role("web");
        invalid.ttl_sec = 300;
        let error = store.put_role(&context, invalid).unwrap_err();
        let error = error.downcast_ref::<InvalidRole>().unwrap();
        assert_eq!(error.role, "web");
        assert!(store.list_roles().is_empty());

        // No max TTL means any TTL is allowed.
        let mut unbounded = role("web");
        unbounded.ttl_sec = 300;
        unbounded.max_ttl_sec = 0;
        store.put_role(&context, unbounded).unwrap();
    }
}
