use anyhow::Result;

use super::Engine;
use crate::context::Context;
use crate::errors::ErrorAttributes;
use crate::errors::NoDirectoryConfigured;
use crate::errors::NoMatchingRole;
use crate::errors::RenewalMetadataMissing;
use crate::models::AuthMetadata;
use crate::models::IssuedAuth;
use crate::models::METADATA_ROLE;
use crate::telemetry::RENEW_COUNT;
use crate::telemetry::RENEW_FAILED;

impl Engine {
    /// Check a previously issued credential is still valid and refresh its lease.
    ///
    /// The identity stored in the credential metadata is checked against the current
    /// role and Cloud Controller records, without repeating any certificate checks.
    /// Lifetime options are refreshed from the current role while the rest of the
    /// credential is left unchanged.
    pub async fn renew(
        &self,
        context: &Context,
        auth: &IssuedAuth,
        remote_addr: &str,
    ) -> Result<IssuedAuth> {
        RENEW_COUNT.inc();
        let context = context.derive_with(|builder| {
            builder.log_values(slog::o!(
                "instance_id" => auth.display_name.clone(),
                "remote_addr" => remote_addr.to_string(),
            ))
        });
        let result = self.attempt_renew(&context, auth, remote_addr).await;
        if let Err(error) = &result {
            RENEW_FAILED.inc();
            slog::warn!(
                context.logger, "Credential renewal denied";
                ErrorAttributes::from(error),
            );
        }
        result
    }

    async fn attempt_renew(
        &self,
        context: &Context,
        auth: &IssuedAuth,
        remote_addr: &str,
    ) -> Result<IssuedAuth> {
        let config = match self.config.config(context).await? {
            None => anyhow::bail!(NoDirectoryConfigured),
            Some(config) => config,
        };
        let role_name = match auth.metadata.get(METADATA_ROLE) {
            Some(name) if !name.is_empty() => name,
            _ => anyhow::bail!(RenewalMetadataMissing { key: METADATA_ROLE }),
        };
        let role = match self.roles.role(context, role_name).await? {
            None => anyhow::bail!(NoMatchingRole {
                role: role_name.clone(),
            }),
            Some(role) => role,
        };

        let metadata = AuthMetadata::from_metadata(&auth.metadata)?;
        self.validate(context, &config, &role, &metadata.identity, remote_addr)
            .await?;

        let mut renewed = auth.clone();
        renewed.lease.max_ttl_sec = role.max_ttl_sec;
        renewed.lease.ttl_sec = role.ttl_sec;
        renewed.period_sec = role.period_sec;
        slog::debug!(
            context.logger, "Credential renewed";
            "ttl_sec" => renewed.lease.ttl_sec,
            "max_ttl_sec" => renewed.lease.max_ttl_sec,
        );
        Ok(renewed)
    }
}
