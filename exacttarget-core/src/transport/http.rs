//! REST transport over `reqwest`.

use super::{RestResponse, RestTransport, TransportError};
use crate::client;
use async_trait::async_trait;
use std::time::Duration;

/// Header carrying the platform's id for a REST request.
pub const REQUEST_ID_HEADER: &str = "x-mashery-message-id";

/// Errors that can occur while building an [`HttpTransport`].
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Required builder parameter was not provided.
    #[error("Missing required attribute: {}", _0)]
    MissingRequiredAttribute(String),
    /// The base URL is not an absolute URL.
    #[error("Invalid base URL: {source}")]
    ParseUrl {
        #[source]
        source: url::ParseError,
    },
    /// Failed to build the underlying HTTP client.
    #[error("Failed to build HTTP client: {source}")]
    HttpClientBuild {
        #[source]
        source: reqwest::Error,
    },
}

/// [`RestTransport`] that sends requests to a tenant's REST base URI.
///
/// # Example
///
/// ```
/// use exacttarget_core::transport::http;
///
/// let transport = http::Builder::new()
///     .base_url("https://tenant.rest.marketingcloudapis.com/")
///     .build()
///     .unwrap();
/// assert_eq!(transport.base_url(), "https://tenant.rest.marketingcloudapis.com");
/// ```
#[derive(Clone, Debug)]
pub struct HttpTransport {
    base_url: String,
    http_client: reqwest::Client,
}

impl HttpTransport {
    /// Creates a transport for the REST endpoint of a connected client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingRequiredAttribute`] when the client has not
    /// connected yet and so knows no REST endpoint.
    pub fn from_client(client: &client::Client) -> Result<Self, Error> {
        let base_url = client
            .rest_url
            .clone()
            .ok_or_else(|| Error::MissingRequiredAttribute("rest_url".to_string()))?;
        Builder::new().base_url(base_url).build()
    }

    /// Base URI every path is appended to, without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl RestTransport for HttpTransport {
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    async fn get(&self, access_token: &str, path: &str) -> Result<RestResponse, TransportError> {
        let url = format!("{}{}", self.base_url, path);
        tracing::trace!(%url, "GET");

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|source| TransportError::Http { source })?;

        let status = response.status().as_u16();
        let request_id = response
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response
            .text()
            .await
            .map_err(|source| TransportError::Http { source })?;

        tracing::trace!(status, request_id = ?request_id, bytes = body.len(), "response");
        Ok(RestResponse {
            status,
            request_id,
            body,
        })
    }
}

/// Builder for constructing an [`HttpTransport`].
pub struct Builder {
    base_url: Option<String>,
    connect_timeout: Duration,
    request_timeout: Duration,
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            base_url: None,
            connect_timeout: Duration::from_secs(crate::DEFAULT_CONNECT_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(crate::DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl Builder {
    /// Creates a new builder with the default timeouts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the REST base URI, e.g. `https://<subdomain>.rest.marketingcloudapis.com`.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Builds the transport.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No base URL was set ([`Error::MissingRequiredAttribute`])
    /// - The base URL does not parse ([`Error::ParseUrl`])
    /// - The HTTP client cannot be created ([`Error::HttpClientBuild`])
    pub fn build(self) -> Result<HttpTransport, Error> {
        let base_url = self
            .base_url
            .ok_or_else(|| Error::MissingRequiredAttribute("base_url".to_string()))?;
        url::Url::parse(&base_url).map_err(|source| Error::ParseUrl { source })?;

        let http_client = reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.request_timeout)
            .build()
            .map_err(|source| Error::HttpClientBuild { source })?;

        Ok(HttpTransport {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_without_base_url() {
        let result = Builder::new().build();
        assert!(matches!(
            result,
            Err(Error::MissingRequiredAttribute(attr)) if attr == "base_url"
        ));
    }

    #[test]
    fn test_build_with_relative_url() {
        let result = Builder::new()
            .base_url("tenant.rest.marketingcloudapis.com")
            .build();
        assert!(matches!(result, Err(Error::ParseUrl { .. })));
    }

    #[test]
    fn test_build_trims_trailing_slash() {
        let transport = Builder::new()
            .base_url("https://tenant.rest.marketingcloudapis.com/")
            .connect_timeout(Duration::from_secs(1))
            .request_timeout(Duration::from_secs(2))
            .build()
            .unwrap();
        assert_eq!(
            transport.base_url(),
            "https://tenant.rest.marketingcloudapis.com"
        );
    }

    #[test]
    fn test_builder_default_timeouts() {
        let builder = Builder::default();
        assert_eq!(
            builder.connect_timeout,
            Duration::from_secs(crate::DEFAULT_CONNECT_TIMEOUT_SECS)
        );
        assert_eq!(
            builder.request_timeout,
            Duration::from_secs(crate::DEFAULT_REQUEST_TIMEOUT_SECS)
        );
    }

    #[test]
    fn test_from_unconnected_client() {
        let client = client::Builder::new()
            .credentials(client::Credentials {
                client_id: "id".to_string(),
                client_secret: "secret".to_string(),
                auth_url: "https://tenant.auth.marketingcloudapis.com".to_string(),
                account_id: None,
                scope: None,
                rest_url: None,
                soap_url: None,
            })
            .build()
            .unwrap();
        let result = HttpTransport::from_client(&client);
        assert!(matches!(
            result,
            Err(Error::MissingRequiredAttribute(attr)) if attr == "rest_url"
        ));
    }

    #[tokio::test]
    async fn test_get_unreachable_host() {
        let transport = Builder::new()
            .base_url("http://127.0.0.1:9")
            .connect_timeout(Duration::from_secs(2))
            .build()
            .unwrap();
        let result = transport.get("token", "/data/v1/customobjectdata/key/K/rowset").await;
        assert!(matches!(result, Err(TransportError::Http { .. })));
    }
}
