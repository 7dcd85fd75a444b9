//! Errors encountered during Cloud Controller requests or reported by the API server.
use anyhow::Result;
use reqwest::Response;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Error payload returned by the Cloud Controller API.
#[derive(Debug, Deserialize, thiserror::Error)]
#[error("{error_code} ({code}): {description}")]
pub struct ApiError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub error_code: String,
}

/// The client sent an invalid API request.
#[derive(Debug, thiserror::Error)]
#[error("the client sent an invalid API request (status {status})")]
pub struct ClientError {
    pub status: u16,
}

/// The server returned an empty API response.
#[derive(Debug, thiserror::Error)]
#[error("the server returned an empty API response")]
pub struct EmptyResponse;

/// Invalid API response received.
#[derive(Debug, thiserror::Error)]
#[error("invalid API response received: {response}")]
pub struct InvalidResponse {
    pub response: String,
}

/// Error refers to resource with ID.
#[derive(Debug, thiserror::Error)]
#[error("error refers to {resource} '{id}'")]
pub struct ResourceIdentifier {
    /// Identifier of a resource the error refers to.
    pub id: String,

    /// Type of resource the error refers to.
    pub resource: &'static str,
}

impl ResourceIdentifier {
    /// Resource identifier context for the given resource type and id.
    pub fn reference<S: Into<String>>(resource: &'static str, id: S) -> Self {
        ResourceIdentifier {
            id: id.into(),
            resource,
        }
    }
}

/// The resource does not exist, or access to it is restricted.
#[derive(Debug, thiserror::Error)]
#[error("the resource does not exist, or access to it is restricted")]
pub struct ResourceNotFound;

/// The server failed to process the API request.
#[derive(Debug, thiserror::Error)]
#[error("the server failed to process the API request (status {status})")]
pub struct ServerError {
    pub status: u16,
}

/// Decode the body of an HTTP response and correctly handle errors in the process.
pub async fn inspect<T>(response: Response) -> Result<Option<T>>
where
    T: DeserializeOwned,
{
    let code = response.status();
    let text = response.text().await?;
    decode(code, text)
}

pub(super) fn decode<T>(code: StatusCode, text: String) -> Result<Option<T>>
where
    T: DeserializeOwned,
{
    if matches!(code, StatusCode::NOT_FOUND) {
        anyhow::bail!(ResourceNotFound);
    }

    // On error, attempt to decode the API error payload for details.
    if code.is_client_error() || code.is_server_error() {
        let error = match serde_json::from_str::<ApiError>(&text) {
            Ok(error) => anyhow::anyhow!(error),
            Err(_) => anyhow::anyhow!(InvalidResponse { response: text }),
        };
        let status = code.as_u16();
        let error = match code.is_client_error() {
            true => error.context(ClientError { status }),
            false => error.context(ServerError { status }),
        };
        return Err(error);
    }

    if text.is_empty() {
        return Ok(None);
    }
    serde_json::from_str::<T>(&text)
        .map_err(|error| {
            let decode = InvalidResponse { response: text };
            anyhow::anyhow!(error).context(decode)
        })
        .map(Some)
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;
    use serde_json::Value as Json;

    use super::decode;
    use super::ApiError;
    use super::ClientError;
    use super::InvalidResponse;
    use super::ResourceNotFound;
    use super::ServerError;

    #[test]
    fn not_found() {
        let error = decode::<Json>(StatusCode::NOT_FOUND, "{}".into()).unwrap_err();
        assert!(error.is::<ResourceNotFound>());
    }

    #[test]
    fn client_error_with_payload() {
        let body = serde_json::json!({
            "code": 10002,
            "description": "Authentication error",
            "error_code": "CF-NotAuthenticated",
        });
        let error = decode::<Json>(StatusCode::UNAUTHORIZED, body.to_string()).unwrap_err();
        assert_eq!(error.downcast_ref::<ClientError>().unwrap().status, 401);
        let cause = error.downcast_ref::<ApiError>().unwrap();
        assert_eq!(cause.error_code, "CF-NotAuthenticated");
    }

    #[test]
    fn server_error_without_payload() {
        let error = decode::<Json>(StatusCode::BAD_GATEWAY, "<html/>".into()).unwrap_err();
        assert_eq!(error.downcast_ref::<ServerError>().unwrap().status, 502);
        assert!(error.is::<InvalidResponse>());
    }

    #[test]
    fn success_empty() {
        let value = decode::<Json>(StatusCode::OK, "".into()).unwrap();
        assert!(value.is_none());
    }

    #[test]
    fn success_invalid_payload() {
        let error = decode::<Vec<u64>>(StatusCode::OK, "{}".into()).unwrap_err();
        assert!(error.is::<InvalidResponse>());
    }
}
