use std::fmt;

use reqwest::header::ACCEPT;
use reqwest::header::AUTHORIZATION;
use serde::de::DeserializeOwned;

use crate::error::RemoteError;

pub const USER_AGENT: &str = "ojd";

const GITHUB_ACCEPT: &str = "application/vnd.github.v3+json";

/// The remote services a tree can mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    GitHub,
    Jbs,
}

impl Service {
    fn authorization(self, token: &str) -> String {
        match self {
            Service::GitHub => format!("token {token}"),
            Service::Jbs => format!("Bearer {token}"),
        }
    }

    fn accept(self) -> Option<&'static str> {
        match self {
            Service::GitHub => Some(GITHUB_ACCEPT),
            Service::Jbs => None,
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Service::GitHub => f.write_str("GitHub"),
            Service::Jbs => f.write_str("JBS"),
        }
    }
}

/// Build the HTTP client shared by every request of a process.
pub fn http_client() -> Result<reqwest::Client, RemoteError> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .map_err(RemoteError::Client)
}

/// Authenticated JSON GETs against one service.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    service: Service,
    token: String,
}

impl ApiClient {
    pub fn new(http: reqwest::Client, service: Service, token: impl Into<String>) -> Self {
        Self {
            http,
            service,
            token: token.into(),
        }
    }

    pub async fn get_json<T>(&self, url: &str) -> Result<T, RemoteError>
    where
        T: DeserializeOwned,
    {
        if self.token.is_empty() {
            return Err(RemoteError::MissingToken(self.service));
        }

        let mut request = self
            .http
            .get(url)
            .header(AUTHORIZATION, self.service.authorization(&self.token));
        if let Some(accept) = self.service.accept() {
            request = request.header(ACCEPT, accept);
        }

        tracing::trace!(service = %self.service, url, "GET");
        let http_error = |source| RemoteError::Http {
            service: self.service,
            url: url.to_string(),
            source,
        };

        let response = request.send().await.map_err(http_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::Status {
                url: url.to_string(),
                status,
            });
        }

        let body = response.text().await.map_err(http_error)?;
        serde_json::from_str(&body).map_err(|source| RemoteError::Decode {
            url: url.to_string(),
            source,
        })
    }
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorization_schemes() {
        assert_eq!(Service::GitHub.authorization("abc"), "token abc");
        assert_eq!(Service::Jbs.authorization("abc"), "Bearer abc");
    }

    #[test]
    fn test_only_github_pins_media_type() {
        assert_eq!(Service::GitHub.accept(), Some(GITHUB_ACCEPT));
        assert_eq!(Service::Jbs.accept(), None);
    }

    #[tokio::test]
    async fn test_missing_token_fails_before_any_request() {
        let client = ApiClient::new(http_client().unwrap(), Service::Jbs, "");
        let error = client
            .get_json::<serde_json::Value>("http://127.0.0.1:9/never")
            .await
            .unwrap_err();
        assert_eq!(error.to_string(), "No JBS API Token set");
    }
}
