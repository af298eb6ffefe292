use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use super::resolver::is_numeric_id;
use super::types::{GroupInfo, GroupsResponse, ResolvedScreenName, UserInfo, WallResponse};
use crate::config::Config;
use crate::util::{read_limited_bytes, ReadLimitError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
const MAX_RESPONSE_SIZE: usize = 5 * 1024 * 1024; // 5MB

/// `wall.get` accepts at most 100 posts per call.
pub const MAX_WALL_COUNT: u32 = 100;

/// The one error kind surfaced by [`VkClient`].
///
/// Remote API errors and transport failures share the type so callers have a
/// single catch path. Nothing here is retried.
#[derive(Debug, Error)]
pub enum VkApiError {
    #[error("VK API error {code}: {message}")]
    Api { code: i64, message: String },
    #[error("Request to VK API failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Request to VK API timed out after {}s", REQUEST_TIMEOUT.as_secs())]
    Timeout,
    #[error("VK API returned HTTP status {0}")]
    HttpStatus(u16),
    #[error("VK API response too large (exceeds {0} bytes)")]
    ResponseTooLarge(usize),
    #[error("Unexpected VK API response: {0}")]
    Decode(String),
    #[error("Invalid VK API URL: {0}")]
    InvalidUrl(String),
    #[error("Insecure VK API base URL: HTTPS required (except localhost for testing)")]
    InsecureBaseUrl,
}

impl VkApiError {
    /// Remote error code when VK itself rejected the call.
    pub fn api_code(&self) -> Option<i64> {
        match self {
            VkApiError::Api { code, .. } => Some(*code),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    response: Option<serde_json::Value>,
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error_code: i64,
    #[serde(default)]
    error_msg: String,
}

/// Thin authenticated client for the handful of VK methods the feeds need.
///
/// Every call carries the shared access token and API version.
#[derive(Clone)]
pub struct VkClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<SecretString>,
    version: String,
}

impl std::fmt::Debug for VkClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VkClient")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("version", &self.version)
            .finish()
    }
}

impl VkClient {
    pub fn new(http: reqwest::Client, config: &Config) -> Self {
        if config.vk_api_token.is_none() {
            tracing::warn!("No VK API token configured; most VK methods will be rejected");
        }
        Self {
            http,
            base_url: config.vk_api_base_url.trim_end_matches('/').to_string(),
            token: config.vk_api_token.clone().map(SecretString::from),
            version: config.vk_api_version.clone(),
        }
    }

    /// Fetches posts from a user or community wall.
    ///
    /// A sign-optional numeric `owner` is sent as `owner_id`; anything else
    /// is treated as a screen name and sent as `domain`. `filter` is passed
    /// through verbatim (`owner` restricts to posts by the wall owner).
    pub async fn fetch_wall(
        &self,
        owner: &str,
        count: u32,
        offset: u32,
        filter: Option<&str>,
    ) -> Result<WallResponse, VkApiError> {
        let owner_param = if is_numeric_id(owner) {
            "owner_id"
        } else {
            "domain"
        };
        let mut params = vec![
            (owner_param, owner.to_string()),
            ("count", count.clamp(1, MAX_WALL_COUNT).to_string()),
            ("offset", offset.to_string()),
            ("extended", "1".to_string()),
        ];
        if let Some(filter) = filter {
            params.push(("filter", filter.to_string()));
        }
        self.call("wall.get", &params).await
    }

    /// Looks up a community by numeric id (without sign) or screen name.
    pub async fn get_group_info(&self, group_id: &str) -> Result<Vec<GroupInfo>, VkApiError> {
        let params = [
            ("group_id", group_id.to_string()),
            ("fields", "description,name,screen_name,photo_100".to_string()),
        ];
        let groups: GroupsResponse = self.call("groups.getById", &params).await?;
        Ok(groups.into_vec())
    }

    /// Looks up a user by numeric id or screen name.
    pub async fn get_user_info(&self, user_id: &str) -> Result<Vec<UserInfo>, VkApiError> {
        let params = [
            ("user_ids", user_id.to_string()),
            ("fields", "photo_100,screen_name".to_string()),
        ];
        self.call("users.get", &params).await
    }

    /// Resolves a screen name to its object type and id.
    ///
    /// VK answers unknown names with an empty array rather than an error,
    /// which maps to `Ok(None)`.
    pub async fn resolve_screen_name(
        &self,
        screen_name: &str,
    ) -> Result<Option<ResolvedScreenName>, VkApiError> {
        let params = [("screen_name", screen_name.to_string())];
        let value: serde_json::Value = self.call("utils.resolveScreenName", &params).await?;
        if !value.is_object() {
            return Ok(None);
        }
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| VkApiError::Decode(e.to_string()))
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &[(&str, String)],
    ) -> Result<T, VkApiError> {
        // SEC-002: Never send the access token over plain HTTP, except to a
        // local mock server
        if !self.base_url.starts_with("https://") {
            let is_localhost = self.base_url.starts_with("http://127.0.0.1")
                || self.base_url.starts_with("http://localhost");
            if !is_localhost {
                tracing::error!(base_url = %self.base_url, "Rejecting non-HTTPS VK API base URL");
                return Err(VkApiError::InsecureBaseUrl);
            }
        }

        let mut url = Url::parse(&format!("{}/{}", self.base_url, method))
            .map_err(|e| VkApiError::InvalidUrl(e.to_string()))?;
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in params {
                query.append_pair(key, value);
            }
            if let Some(token) = &self.token {
                query.append_pair("access_token", token.expose_secret());
            }
            query.append_pair("v", &self.version);
        }

        tracing::debug!(method = %method, "Calling VK API");

        let response = tokio::time::timeout(REQUEST_TIMEOUT, self.http.get(url).send())
            .await
            .map_err(|_| VkApiError::Timeout)?
            .map_err(|e| VkApiError::Network(e.without_url()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            tracing::warn!(method = %method, status = status, "VK API HTTP error");
            return Err(VkApiError::HttpStatus(status));
        }

        let bytes = read_limited_bytes(response, MAX_RESPONSE_SIZE).await?;
        let envelope: Envelope =
            serde_json::from_slice(&bytes).map_err(|e| VkApiError::Decode(e.to_string()))?;

        if let Some(error) = envelope.error {
            tracing::warn!(
                method = %method,
                code = error.error_code,
                message = %error.error_msg,
                "VK API rejected call"
            );
            return Err(VkApiError::Api {
                code: error.error_code,
                message: error.error_msg,
            });
        }

        let payload = envelope
            .response
            .ok_or_else(|| VkApiError::Decode("missing 'response' field".to_string()))?;
        serde_json::from_value(payload).map_err(|e| VkApiError::Decode(e.to_string()))
    }
}

impl From<ReadLimitError> for VkApiError {
    fn from(e: ReadLimitError) -> Self {
        match e {
            ReadLimitError::TooLarge(limit) => VkApiError::ResponseTooLarge(limit),
            ReadLimitError::Transport(e) => VkApiError::Network(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> VkClient {
        let mut config = Config::default();
        config.vk_api_base_url = server.uri();
        config.vk_api_token = Some("test-token".to_string());
        VkClient::new(reqwest::Client::new(), &config)
    }

    #[tokio::test]
    async fn test_fetch_wall_numeric_owner() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wall.get"))
            .and(query_param("owner_id", "-100"))
            .and(query_param("count", "5"))
            .and(query_param("access_token", "test-token"))
            .and(query_param("v", "5.131"))
            .and(query_param_is_missing("domain"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"response": {"count": 1, "items": [{"id": 7, "owner_id": -100, "date": 1, "text": "hi"}]}}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let wall = client_for(&server)
            .fetch_wall("-100", 5, 0, None)
            .await
            .unwrap();
        assert_eq!(wall.items.len(), 1);
        assert_eq!(wall.items[0].text, "hi");
    }

    #[tokio::test]
    async fn test_fetch_wall_screen_name_uses_domain() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wall.get"))
            .and(query_param("domain", "durov"))
            .and(query_param("filter", "owner"))
            .and(query_param_is_missing("owner_id"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"response": {"count": 0, "items": []}}"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        let wall = client_for(&server)
            .fetch_wall("durov", 20, 0, Some("owner"))
            .await
            .unwrap();
        assert!(wall.items.is_empty());
    }

    #[tokio::test]
    async fn test_count_is_clamped() {
        let server = MockServer::start().await;
        Mock::given(path("/wall.get"))
            .and(query_param("count", "100"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"response": {"items": []}}"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server)
            .fetch_wall("1", 500, 0, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_api_error_envelope() {
        let server = MockServer::start().await;
        Mock::given(path("/wall.get"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"error": {"error_code": 15, "error_msg": "Access denied: this wall available only for community members"}}"#,
            ))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .fetch_wall("-1", 5, 0, None)
            .await
            .unwrap_err();
        assert_eq!(err.api_code(), Some(15));
        assert!(err.to_string().contains("VK API error 15"));
        assert!(err.to_string().contains("Access denied"));
    }

    #[tokio::test]
    async fn test_http_error_is_wrapped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .expect(1) // no retries
            .mount(&server)
            .await;

        let err = client_for(&server)
            .get_user_info("1")
            .await
            .unwrap_err();
        assert!(matches!(err, VkApiError::HttpStatus(502)));
    }

    #[tokio::test]
    async fn test_garbage_body_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .get_group_info("1")
            .await
            .unwrap_err();
        assert!(matches!(err, VkApiError::Decode(_)));
    }

    #[tokio::test]
    async fn test_resolve_screen_name() {
        let server = MockServer::start().await;
        Mock::given(path("/utils.resolveScreenName"))
            .and(query_param("screen_name", "apiclub"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"response": {"type": "group", "object_id": 1}}"#,
            ))
            .mount(&server)
            .await;
        Mock::given(path("/utils.resolveScreenName"))
            .and(query_param("screen_name", "nobody_here"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"response": []}"#))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let resolved = client.resolve_screen_name("apiclub").await.unwrap().unwrap();
        assert_eq!(resolved.kind, "group");
        assert_eq!(resolved.object_id, 1);

        assert!(client
            .resolve_screen_name("nobody_here")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_http_base_url_rejected() {
        let mut config = Config::default();
        config.vk_api_base_url = "http://evil.example.com/method".to_string();
        let client = VkClient::new(reqwest::Client::new(), &config);

        let result = client.get_user_info("1").await;
        assert!(matches!(result, Err(VkApiError::InsecureBaseUrl)));
    }

    #[test]
    fn test_debug_masks_token() {
        let mut config = Config::default();
        config.vk_api_token = Some("vk1.a.very-secret".to_string());
        let client = VkClient::new(reqwest::Client::new(), &config);
        let debug = format!("{:?}", client);
        assert!(!debug.contains("very-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
