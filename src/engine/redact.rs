use uuid::Uuid;

use crate::context::Context;
use crate::errors::ErrorAttributes;
use crate::errors::LoginFailed;

/// Log a login failure in full and return the opaque error to report to the caller.
pub(super) fn redact(context: &Context, error: anyhow::Error) -> LoginFailed {
    let failure_id = Uuid::new_v4();
    slog::error!(
        context.logger, "authentication failed, failure ID {}", failure_id;
        "failure_id" => %failure_id,
        ErrorAttributes::from(&error),
    );
    LoginFailed { failure_id }
}
