//! Admin RPC contract shared by modules and the web layer.

use crate::bot::BotHandle;
use crate::error::RpcError;
use async_trait::async_trait;
use axum::http::HeaderMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Where an RPC or admin request came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOrigin {
    /// Same-process caller. Always trusted.
    Internal,
    /// Network caller with its identifying headers.
    Remote {
        client_id: Option<String>,
        authorization: Option<String>,
    },
}

impl RequestOrigin {
    pub fn remote(client_id: Option<&str>, authorization: Option<&str>) -> Self {
        RequestOrigin::Remote {
            client_id: client_id.map(String::from),
            authorization: authorization.map(String::from),
        }
    }

    /// Build a remote origin from the `Client-ID` and `Authorization` headers.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(String::from)
        };

        RequestOrigin::Remote {
            client_id: header("Client-ID"),
            authorization: header("Authorization"),
        }
    }
}

/// RPC service exposed by a module instance.
///
/// Methods are addressed as `<instance>.<Method>`; the web layer strips the
/// instance part before calling. Mutating methods check
/// [`BotHandle::is_admin_request`](crate::bot::BotHandle::is_admin_request).
#[async_trait]
pub trait RpcService: Send + Sync {
    async fn call(
        &self,
        origin: &RequestOrigin,
        method: &str,
        params: Value,
    ) -> Result<Value, RpcError>;
}

/// Decode RPC params. A single-element array is unwrapped first, so both
/// `[{...}]` and `{...}` are accepted.
pub fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T, RpcError> {
    let params = match params {
        Value::Array(mut items) if items.len() == 1 => items.remove(0),
        other => other,
    };
    Ok(serde_json::from_value(params)?)
}

pub fn to_result<T: Serialize>(value: &T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError::Internal(e.to_string()))
}

/// Fail with `AccessDenied` unless `origin` may use admin methods.
pub fn require_admin(bot: &BotHandle, origin: &RequestOrigin) -> Result<(), RpcError> {
    if bot.is_admin_request(origin) {
        Ok(())
    } else {
        Err(RpcError::AccessDenied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_params_unwraps_single_element_array() {
        let id: u64 = parse_params(json!([7])).unwrap();
        assert_eq!(id, 7);

        let id: u64 = parse_params(json!(7)).unwrap();
        assert_eq!(id, 7);
    }

    #[test]
    fn test_parse_params_invalid() {
        let result = parse_params::<u64>(json!({"id": "x"}));
        assert!(matches!(result, Err(RpcError::InvalidParams(_))));
    }

    #[test]
    fn test_origin_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("Client-ID", "abc".parse().unwrap());

        assert_eq!(
            RequestOrigin::from_headers(&headers),
            RequestOrigin::remote(Some("abc"), None)
        );
    }
}
