//! HTTP transport for the device API.
//!
//! A single owned [`ApiClient`] is injected into every endpoint wrapper:
//! it carries the cookie jar, the emulated-app headers and, after login,
//! the auth headers. Request bodies and auth headers are never logged.

use crate::error::{AuraError, Result};
use parking_lot::RwLock;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use std::time::Duration;
use tracing::debug;

/// User agent of the Android app the client emulates.
const USER_AGENT: &str = "Aura/4.7.790 (Android 30; Client)";

struct AuthHeaders {
    token: String,
    user_id: String,
}

/// Owned transport for the versioned device API.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    default_timeout: Duration,
    auth: RwLock<Option<AuthHeaders>>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, default_timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert("accept-language", HeaderValue::from_static("en-US"));
        headers.insert("cache-control", HeaderValue::from_static("no-cache"));
        headers.insert(
            "content-type",
            HeaderValue::from_static("application/json; charset=utf-8"),
        );

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .cookie_store(true)
            .timeout(default_timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            default_timeout,
            auth: RwLock::new(None),
        })
    }

    /// Install the auth headers returned by login. All subsequent requests
    /// carry them.
    pub fn set_auth(&self, token: impl Into<String>, user_id: impl Into<String>) {
        *self.auth.write() = Some(AuthHeaders {
            token: token.into(),
            user_id: user_id.into(),
        });
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth.read().is_some()
    }

    pub async fn get(&self, path: &str, query: &[(&str, Option<String>)]) -> Result<serde_json::Value> {
        self.request(Method::GET, path, query, None, None).await
    }

    pub async fn post(&self, path: &str, body: serde_json::Value) -> Result<serde_json::Value> {
        self.request(Method::POST, path, &[], Some(body), None).await
    }

    pub async fn put(&self, path: &str, body: serde_json::Value) -> Result<serde_json::Value> {
        self.request(Method::PUT, path, &[], Some(body), None).await
    }

    pub async fn delete(&self, path: &str) -> Result<serde_json::Value> {
        self.request(Method::DELETE, path, &[], None, None).await
    }

    /// Like [`Self::get`], with a per-request timeout override.
    pub async fn get_with_timeout(
        &self,
        path: &str,
        query: &[(&str, Option<String>)],
        timeout: Duration,
    ) -> Result<serde_json::Value> {
        self.request(Method::GET, path, query, None, Some(timeout))
            .await
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, Option<String>)],
        body: Option<serde_json::Value>,
        timeout: Option<Duration>,
    ) -> Result<serde_json::Value> {
        let url = format!("{}{}", self.base_url, path);
        let query = filter_query(query);

        let mut request = self
            .http
            .request(method.clone(), &url)
            .timeout(timeout.unwrap_or(self.default_timeout))
            .query(&query);

        if let Some(body) = &body {
            request = request.json(body);
        }
        {
            let auth = self.auth.read();
            if let Some(auth) = auth.as_ref() {
                request = request
                    .header("x-token-auth", &auth.token)
                    .header("x-user-id", &auth.user_id);
            }
        }

        // Bodies and headers stay out of the logs; they carry credentials.
        debug!(method = %method, path, "device api request");

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let message = extract_error_message(&text);
            return Err(AuraError::from_status(status.as_u16(), message));
        }

        debug!(method = %method, path, status = status.as_u16(), "device api response");

        serde_json::from_str(&text).map_err(|_| AuraError::Api {
            status: status.as_u16(),
            message: format!("non-JSON response: {}", truncate(&text, 200)),
        })
    }
}

/// Drop unset query parameters, the way the vendor's app does.
fn filter_query(query: &[(&str, Option<String>)]) -> Vec<(String, String)> {
    query
        .iter()
        .filter_map(|(key, value)| value.as_ref().map(|v| (key.to_string(), v.clone())))
        .collect()
}

fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
        .unwrap_or_else(|| truncate(body, 200))
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        text.to_string()
    } else {
        let mut end = max;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &text[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_query_drops_unset_values() {
        let query = [
            ("limit", Some("1000".to_string())),
            ("cursor", None),
            ("filter", Some("all".to_string())),
        ];
        let filtered = filter_query(&query);
        assert_eq!(
            filtered,
            vec![
                ("limit".to_string(), "1000".to_string()),
                ("filter".to_string(), "all".to_string()),
            ]
        );
    }

    #[test]
    fn test_extract_error_message_prefers_error_field() {
        assert_eq!(
            extract_error_message(r#"{"error": "bad cursor"}"#),
            "bad cursor"
        );
        assert_eq!(extract_error_message("plain text"), "plain text");
    }

    #[test]
    fn test_auth_header_state() {
        let client = ApiClient::new("https://api.example.com/v5/", Duration::from_secs(20)).unwrap();
        assert!(!client.is_authenticated());
        client.set_auth("tok", "user-1");
        assert!(client.is_authenticated());
    }
}
