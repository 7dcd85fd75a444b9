use anyhow::Result;

use super::assemble;
use super::redact::redact;
use super::Engine;
use crate::context::Context;
use crate::errors::LoginFailed;
use crate::errors::MissingField;
use crate::errors::NoCaConfigured;
use crate::errors::NoMatchingRole;
use crate::identity::Certificate;
use crate::models::IssuedAuth;
use crate::models::LoginRequest;
use crate::signature::SignatureData;
use crate::telemetry::LOGIN_COUNT;
use crate::telemetry::LOGIN_FAILED;
use crate::window::check_window;
use crate::window::parse_signing_time;

impl Engine {
    /// Authenticate a workload and issue a credential for the requested role.
    ///
    /// Failures are only reported as an opaque [`LoginFailed`] error.
    /// The full error is logged along with the same failure ID.
    pub async fn login(
        &self,
        context: &Context,
        request: &LoginRequest,
        remote_addr: &str,
    ) -> Result<IssuedAuth, LoginFailed> {
        LOGIN_COUNT.inc();
        let context = context.derive_with(|builder| {
            builder.log_values(slog::o!(
                "role" => request.role.clone(),
                "remote_addr" => remote_addr.to_string(),
            ))
        });
        match self.attempt_login(&context, request, remote_addr).await {
            Ok(auth) => {
                slog::info!(
                    context.logger, "Workload authenticated";
                    "instance_id" => &auth.display_name,
                    "app_id" => &auth.alias.name,
                );
                Ok(auth)
            }
            Err(error) => {
                LOGIN_FAILED.inc();
                Err(redact(&context, error))
            }
        }
    }

    async fn attempt_login(
        &self,
        context: &Context,
        request: &LoginRequest,
        remote_addr: &str,
    ) -> Result<IssuedAuth> {
        let received = self.clock.now();
        let fields = [
            ("role", &request.role),
            ("signature", &request.signature),
            ("certificate", &request.certificate),
            ("signing_time", &request.signing_time),
        ];
        for (field, value) in fields {
            if value.is_empty() {
                anyhow::bail!(MissingField { field });
            }
        }

        let signing_time = parse_signing_time(&request.signing_time)?;
        check_window(signing_time, received, &request.signing_time)?;

        let data = SignatureData {
            certificate: request.certificate.clone(),
            role: request.role.clone(),
            signing_time: request.signing_time.clone(),
        };
        let certificate = self
            .signatures
            .matching_certificate(&request.signature, &data)?;

        let config = match self.config.config(context).await? {
            None => anyhow::bail!(NoCaConfigured),
            Some(config) => config,
        };
        let options = config.verify_options()?;
        let presented = Certificate::from_pem_chain(&request.certificate)?;
        self.identity
            .verify_chain(&certificate, &presented, &options, received)?;
        let identity = self.identity.extract_identity(&certificate)?;

        let role = match self.roles.role(context, &request.role).await? {
            None => anyhow::bail!(NoMatchingRole {
                role: request.role.clone(),
            }),
            Some(role) => role,
        };
        self.validate(context, &config, &role, &identity, remote_addr)
            .await?;
        Ok(assemble(&request.role, &role, &identity))
    }
}
