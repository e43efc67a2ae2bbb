use async_trait::async_trait;
use oauth2::basic::{BasicClient, BasicTokenType};
use oauth2::{AuthType, ClientId, ClientSecret, EmptyExtraTokenFields, Scope, TokenResponse, TokenUrl};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

/// OAuth2 token endpoint path, relative to the tenant's authentication URL.
const DEFAULT_TOKEN_PATH: &str = "/v2/token";

/// Buffer time (in seconds) before token expiry to trigger a new exchange.
const TOKEN_REFRESH_BUFFER_SECONDS: u64 = 300;

/// Lifetime assumed when the token response carries no `expires_in`.
const DEFAULT_TOKEN_LIFETIME_SECONDS: u64 = 1080;

/// Type alias for the OAuth2 token response using standard fields.
pub type MarketingCloudTokenResponse =
    oauth2::StandardTokenResponse<EmptyExtraTokenFields, BasicTokenType>;

/// Internal state for managing token lifecycle.
#[derive(Debug, Clone)]
pub(crate) struct TokenState {
    /// The current access token response.
    token_response: MarketingCloudTokenResponse,
    /// Unix timestamp (seconds) when the token expires.
    expires_at: u64,
}

impl TokenState {
    /// Creates a new token state from a token response.
    pub(crate) fn new(token_response: MarketingCloudTokenResponse) -> Result<Self, Error> {
        let lifetime = token_response
            .expires_in()
            .map_or(DEFAULT_TOKEN_LIFETIME_SECONDS, |expires_in| expires_in.as_secs());
        let expires_at = unix_now()?
            .checked_add(lifetime)
            .ok_or(Error::TokenExpiryOverflow)?;

        Ok(Self {
            token_response,
            expires_at,
        })
    }

    /// Returns true if the token is expired or will expire within the buffer time.
    fn is_expired(&self, buffer_seconds: u64) -> Result<bool, Error> {
        let threshold = unix_now()?
            .checked_add(buffer_seconds)
            .ok_or(Error::TimeThresholdOverflow)?;

        Ok(threshold >= self.expires_at)
    }

    fn access_token(&self) -> &str {
        self.token_response.access_token().secret()
    }
}

fn unix_now() -> Result<u64, Error> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|source| Error::SystemTimeError { source })?
        .as_secs())
}

/// Errors that can occur during client operations.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Failed to read credentials file from disk.
    #[error("Failed to read credentials file at {path}: {source}")]
    ReadCredentials {
        /// Path to the credentials file that failed to read.
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Failed to parse credentials JSON.
    #[error("Failed to parse credentials JSON: {source}")]
    ParseCredentials {
        #[source]
        source: serde_json::Error,
    },
    /// Invalid URL format in credentials.
    #[error("Invalid URL format: {source}")]
    ParseUrl {
        #[source]
        source: url::ParseError,
    },
    /// Failed to build the HTTP client used for the token exchange.
    #[error("Failed to build HTTP client: {source}")]
    HttpClientBuild {
        #[source]
        source: reqwest::Error,
    },
    /// OAuth2 token exchange failed during authentication.
    #[error("OAuth2 token exchange failed: {0:?}")]
    TokenExchange(Box<dyn std::error::Error + Send + Sync>),
    /// Required builder parameter was not provided.
    #[error("Missing required attribute: {}", _0)]
    MissingRequiredAttribute(String),
    /// Credentials are present but unusable.
    #[error("Invalid credentials: {message}")]
    InvalidCredentials {
        /// Description of what's missing or invalid.
        message: String,
    },
    /// Failed to get current system time.
    #[error("Failed to get current system time: {source}")]
    SystemTimeError {
        #[source]
        source: std::time::SystemTimeError,
    },
    /// Token expiry time calculation resulted in arithmetic overflow.
    #[error("Token expiry time calculation overflow")]
    TokenExpiryOverflow,
    /// Time threshold calculation resulted in arithmetic overflow.
    #[error("Time threshold calculation overflow")]
    TimeThresholdOverflow,
    /// The client has not obtained a token yet.
    #[error("Client is not connected: call connect() first")]
    NotConnected,
    /// Failed to acquire lock on token state.
    #[error("Failed to acquire lock on token state")]
    LockError,
}

/// Marketing Cloud installed-package credentials.
///
/// Obtained from an API integration component of an installed package in
/// Marketing Cloud Setup. The REST and SOAP endpoints default to the ones
/// derived from the tenant subdomain in `auth_url`.
///
/// # Example
///
/// ```
/// use exacttarget_core::client::Credentials;
///
/// let creds = Credentials {
///     client_id: "your_client_id".to_string(),
///     client_secret: "your_client_secret".to_string(),
///     auth_url: "https://mc563885gzs27c5t9-63k636ttgm.auth.marketingcloudapis.com".to_string(),
///     account_id: Some("514009708".to_string()),
///     scope: None,
///     rest_url: None,
///     soap_url: None,
/// };
/// assert_eq!(
///     creds.rest_endpoint(),
///     "https://mc563885gzs27c5t9-63k636ttgm.rest.marketingcloudapis.com"
/// );
/// ```
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Credentials {
    /// Client ID of the API integration.
    pub client_id: String,
    /// Client secret of the API integration.
    pub client_secret: String,
    /// Tenant-specific authentication base URI.
    pub auth_url: String,
    /// MID of the business unit to act in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    /// Space-separated permission scopes to request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// REST base URI, when it differs from the derived one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rest_url: Option<String>,
    /// SOAP endpoint, when it differs from the derived one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub soap_url: Option<String>,
}

impl Credentials {
    /// REST base URI.
    pub fn rest_endpoint(&self) -> String {
        self.rest_url
            .clone()
            .unwrap_or_else(|| self.tenant_endpoint("rest"))
    }

    /// SOAP service endpoint.
    pub fn soap_endpoint(&self) -> String {
        self.soap_url
            .clone()
            .unwrap_or_else(|| format!("{}/Service.asmx", self.tenant_endpoint("soap")))
    }

    fn tenant_endpoint(&self, service: &str) -> String {
        self.auth_url
            .trim_end_matches('/')
            .replacen(".auth.", &format!(".{service}."), 1)
    }

    fn validate(&self) -> Result<(), Error> {
        if self.client_id.trim().is_empty() {
            return Err(Error::InvalidCredentials {
                message: "client_id is required".to_string(),
            });
        }
        if self.client_secret.trim().is_empty() {
            return Err(Error::InvalidCredentials {
                message: "client_secret is required".to_string(),
            });
        }
        Ok(())
    }
}

/// Source for loading credentials.
#[derive(Debug, Clone)]
pub enum CredentialsFrom {
    /// Load credentials from a JSON file.
    Path(PathBuf),
    /// Use credentials provided directly.
    Value(Credentials),
}

/// Supplies a valid access token before every transport call.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Returns an access token that will not expire imminently.
    async fn ensure_fresh_token(&self) -> Result<String, Error>;
}

/// OAuth2 client for Marketing Cloud API authentication.
///
/// Use [`Builder`] to construct a client instance.
///
/// # Example
///
/// ```no_run
/// use exacttarget_core::client;
/// use std::path::PathBuf;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let client = client::Builder::new()
///     .credentials_path(PathBuf::from("credentials.json"))
///     .build()?
///     .connect()
///     .await?;
///
/// let token = client.access_token().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Client {
    /// Source of credentials (file path or direct value).
    credentials_from: CredentialsFrom,
    /// Thread-safe token state, replaced whenever a new token is obtained.
    pub(crate) token_state: Option<Arc<RwLock<TokenState>>>,
    /// REST base URI of the tenant.
    pub rest_url: Option<String>,
    /// SOAP endpoint of the tenant.
    pub soap_url: Option<String>,
}

impl Client {
    fn load_credentials(&self) -> Result<Credentials, Error> {
        let credentials: Credentials = match &self.credentials_from {
            CredentialsFrom::Value(creds) => creds.clone(),
            CredentialsFrom::Path(path) => {
                let credentials_string =
                    fs::read_to_string(path).map_err(|e| Error::ReadCredentials {
                        path: path.clone(),
                        source: e,
                    })?;
                serde_json::from_str(&credentials_string)
                    .map_err(|e| Error::ParseCredentials { source: e })?
            }
        };
        credentials.validate()?;
        Ok(credentials)
    }

    /// Connects to Marketing Cloud and exchanges credentials for an access token.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Credentials file cannot be read ([`Error::ReadCredentials`])
    /// - Credentials JSON is invalid ([`Error::ParseCredentials`])
    /// - Client id or secret is empty ([`Error::InvalidCredentials`])
    /// - Authentication URL is malformed ([`Error::ParseUrl`])
    /// - OAuth2 token exchange fails ([`Error::TokenExchange`])
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn connect(mut self) -> Result<Self, Error> {
        let credentials = self.load_credentials()?;
        let token_response = exchange_client_credentials(&credentials).await?;

        self.token_state = Some(Arc::new(RwLock::new(TokenState::new(token_response)?)));
        self.rest_url = Some(credentials.rest_endpoint());
        self.soap_url = Some(credentials.soap_endpoint());

        tracing::debug!(rest_url = ?self.rest_url, "connected");
        Ok(self)
    }

    /// Obtains a new token regardless of the current one's expiry.
    ///
    /// The client-credentials flow issues no refresh token, so this repeats
    /// the full exchange and swaps the shared token state.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Client is not connected ([`Error::NotConnected`])
    /// - OAuth2 authentication fails ([`Error::TokenExchange`])
    /// - Failed to acquire token state lock ([`Error::LockError`])
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn reconnect(&self) -> Result<(), Error> {
        let token_state_arc = self.token_state.as_ref().ok_or(Error::NotConnected)?;

        let credentials = self.load_credentials()?;
        let token_response = exchange_client_credentials(&credentials).await?;

        let new_state = TokenState::new(token_response)?;
        let mut state = token_state_arc.write().map_err(|_| Error::LockError)?;
        *state = new_state;

        tracing::debug!("access token renewed");
        Ok(())
    }

    /// Returns the current access token without renewing it.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Client is not connected ([`Error::NotConnected`])
    /// - Failed to acquire token state lock ([`Error::LockError`])
    pub fn current_access_token(&self) -> Result<String, Error> {
        let token_state_arc = self.token_state.as_ref().ok_or(Error::NotConnected)?;
        let state = token_state_arc.read().map_err(|_| Error::LockError)?;

        Ok(state.access_token().to_string())
    }

    /// Returns a valid access token, renewing it when it expires within five minutes.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Client is not connected ([`Error::NotConnected`])
    /// - Renewal fails when needed ([`Error::TokenExchange`])
    /// - Failed to acquire token state lock ([`Error::LockError`])
    pub async fn access_token(&self) -> Result<String, Error> {
        let token_state_arc = self.token_state.as_ref().ok_or(Error::NotConnected)?;

        let needs_renewal = {
            let state = token_state_arc.read().map_err(|_| Error::LockError)?;
            state.is_expired(TOKEN_REFRESH_BUFFER_SECONDS)?
        };

        if needs_renewal {
            self.reconnect().await?;
        }

        self.current_access_token()
    }
}

#[async_trait]
impl TokenProvider for Client {
    async fn ensure_fresh_token(&self) -> Result<String, Error> {
        self.access_token().await
    }
}

/// Performs the OAuth2 client-credentials exchange against `{auth_url}/v2/token`.
async fn exchange_client_credentials(
    credentials: &Credentials,
) -> Result<MarketingCloudTokenResponse, Error> {
    let oauth2_client = BasicClient::new(ClientId::new(credentials.client_id.clone()))
        .set_client_secret(ClientSecret::new(credentials.client_secret.clone()))
        .set_auth_type(AuthType::RequestBody)
        .set_token_uri(
            TokenUrl::new(format!(
                "{}{}",
                credentials.auth_url.trim_end_matches('/'),
                DEFAULT_TOKEN_PATH
            ))
            .map_err(|e| Error::ParseUrl { source: e })?,
        );

    let http_client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .connect_timeout(std::time::Duration::from_secs(
            crate::DEFAULT_AUTH_CONNECT_TIMEOUT_SECS,
        ))
        .timeout(std::time::Duration::from_secs(
            crate::DEFAULT_AUTH_REQUEST_TIMEOUT_SECS,
        ))
        .build()
        .map_err(|source| Error::HttpClientBuild { source })?;

    let mut request = oauth2_client.exchange_client_credentials();
    if let Some(account_id) = &credentials.account_id {
        request = request.add_extra_param("account_id", account_id.clone());
    }
    if let Some(scope) = &credentials.scope {
        request = request.add_scopes(scope.split_whitespace().map(|s| Scope::new(s.to_string())));
    }

    request
        .request_async(&http_client)
        .await
        .map_err(|e| Error::TokenExchange(Box::new(e)))
}

/// Builder for constructing a [`Client`].
///
/// # Example
///
/// ```no_run
/// use exacttarget_core::client::{self, Credentials};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let client = client::Builder::new()
///     .credentials(Credentials {
///         client_id: "your_client_id".to_string(),
///         client_secret: "your_client_secret".to_string(),
///         auth_url: "https://your-subdomain.auth.marketingcloudapis.com".to_string(),
///         account_id: None,
///         scope: None,
///         rest_url: None,
///         soap_url: None,
///     })
///     .build()?
///     .connect()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct Builder {
    credentials_from: Option<CredentialsFrom>,
}

impl Builder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets credentials to load from a JSON file.
    ///
    /// ```json
    /// {
    ///   "client_id": "your_client_id",
    ///   "client_secret": "your_client_secret",
    ///   "auth_url": "https://your-subdomain.auth.marketingcloudapis.com",
    ///   "account_id": "514009708"
    /// }
    /// ```
    pub fn credentials_path(mut self, path: PathBuf) -> Self {
        self.credentials_from = Some(CredentialsFrom::Path(path));
        self
    }

    /// Sets credentials directly.
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials_from = Some(CredentialsFrom::Value(credentials));
        self
    }

    /// Builds the client.
    ///
    /// # Errors
    ///
    /// Returns an error if credentials were not provided via either
    /// [`credentials_path`](Self::credentials_path) or [`credentials`](Self::credentials).
    pub fn build(self) -> Result<Client, Error> {
        Ok(Client {
            credentials_from: self.credentials_from.ok_or_else(|| {
                Error::MissingRequiredAttribute("credentials or credentials_path".to_string())
            })?,
            token_state: None,
            rest_url: None,
            soap_url: None,
        })
    }
}

#[cfg(test)]
mod tests {

    use std::env;

    use super::*;

    fn test_credentials() -> Credentials {
        Credentials {
            client_id: "test_client_id".to_string(),
            client_secret: "test_client_secret".to_string(),
            auth_url: "https://tenant.auth.marketingcloudapis.com".to_string(),
            account_id: None,
            scope: None,
            rest_url: None,
            soap_url: None,
        }
    }

    /// A local address where nothing listens, so the exchange fails fast.
    fn unreachable_credentials() -> Credentials {
        Credentials {
            auth_url: "http://127.0.0.1:9".to_string(),
            ..test_credentials()
        }
    }

    fn token_response(expires_in: Option<u64>) -> MarketingCloudTokenResponse {
        use oauth2::AccessToken;

        let mut token_response = MarketingCloudTokenResponse::new(
            AccessToken::new("test_token".to_string()),
            BasicTokenType::Bearer,
            EmptyExtraTokenFields {},
        );
        if let Some(seconds) = expires_in {
            token_response.set_expires_in(Some(&std::time::Duration::from_secs(seconds)));
        }
        token_response
    }

    fn connected_client() -> Client {
        let mut client = Builder::new().credentials(test_credentials()).build().unwrap();
        let token_state = TokenState::new(token_response(Some(3600))).unwrap();
        client.token_state = Some(Arc::new(RwLock::new(token_state)));
        client.rest_url = Some(test_credentials().rest_endpoint());
        client.soap_url = Some(test_credentials().soap_endpoint());
        client
    }

    #[test]
    fn test_build_without_credentials() {
        let client = Builder::new().build();
        assert!(matches!(
            client,
            Err(Error::MissingRequiredAttribute(attr)) if attr == "credentials or credentials_path"
        ));
    }

    #[test]
    fn test_build_with_credentials_path() {
        let mut path = env::temp_dir();
        path.push(format!("credentials_{}.json", std::process::id()));
        let client = Builder::new().credentials_path(path).build();
        assert!(client.is_ok());
    }

    #[tokio::test]
    async fn test_connect_with_incomplete_json() {
        let creds: &str = r#"{"client_id":"client_id"}"#;
        let mut path = env::temp_dir();
        path.push(format!("incomplete_credentials_{}.json", std::process::id()));
        let _ = fs::write(path.clone(), creds);
        let client = Builder::new()
            .credentials_path(path.clone())
            .build()
            .unwrap();
        let result = client.connect().await;
        let _ = fs::remove_file(path);
        assert!(matches!(result, Err(Error::ParseCredentials { .. })));
    }

    #[tokio::test]
    async fn test_connect_with_invalid_url() {
        let creds: &str = r#"
            {
                "client_id": "some_client_id",
                "client_secret": "some_client_secret",
                "auth_url": "tenant.auth.marketingcloudapis.com"
            }"#;
        let mut path = env::temp_dir();
        path.push(format!(
            "invalid_url_credentials_{}.json",
            std::process::id()
        ));
        let _ = fs::write(path.clone(), creds);
        let client = Builder::new()
            .credentials_path(path.clone())
            .build()
            .unwrap();
        let result = client.connect().await;
        let _ = fs::remove_file(path);
        assert!(matches!(result, Err(Error::ParseUrl { .. })));
    }

    #[tokio::test]
    async fn test_connect_with_missing_file() {
        let mut path = env::temp_dir();
        path.push(format!("nonexistent_{}.json", std::process::id()));
        let client = Builder::new().credentials_path(path).build().unwrap();
        let result = client.connect().await;
        assert!(matches!(result, Err(Error::ReadCredentials { .. })));
    }

    #[tokio::test]
    async fn test_connect_with_empty_secret() {
        let creds = Credentials {
            client_secret: "  ".to_string(),
            ..test_credentials()
        };
        let client = Builder::new().credentials(creds).build().unwrap();
        let result = client.connect().await;
        assert!(matches!(
            result,
            Err(Error::InvalidCredentials { message }) if message == "client_secret is required"
        ));
    }

    #[tokio::test]
    async fn test_connect_with_unreachable_server() {
        let client = Builder::new()
            .credentials(unreachable_credentials())
            .build()
            .unwrap();
        let result = client.connect().await;
        assert!(matches!(result, Err(Error::TokenExchange(_))));
    }

    #[test]
    fn test_builder_default() {
        let builder = Builder::default();
        assert!(builder.credentials_from.is_none());
    }

    #[test]
    fn test_builder_credentials_value() {
        let builder = Builder::new().credentials(test_credentials());
        assert!(matches!(
            builder.credentials_from,
            Some(CredentialsFrom::Value(_))
        ));
    }

    #[test]
    fn test_derived_endpoints() {
        let creds = test_credentials();
        assert_eq!(
            creds.rest_endpoint(),
            "https://tenant.rest.marketingcloudapis.com"
        );
        assert_eq!(
            creds.soap_endpoint(),
            "https://tenant.soap.marketingcloudapis.com/Service.asmx"
        );

        let creds = Credentials {
            auth_url: "https://tenant.auth.marketingcloudapis.com/".to_string(),
            rest_url: Some("https://rest.example.com".to_string()),
            ..test_credentials()
        };
        assert_eq!(creds.rest_endpoint(), "https://rest.example.com");
        assert_eq!(
            creds.soap_endpoint(),
            "https://tenant.soap.marketingcloudapis.com/Service.asmx"
        );
    }

    #[test]
    fn test_credentials_serde_optional_fields() {
        let json = serde_json::to_string(&test_credentials()).unwrap();
        assert!(!json.contains("account_id"));
        assert!(!json.contains("rest_url"));

        let parsed: Credentials = serde_json::from_str(
            r#"{"client_id":"a","client_secret":"b","auth_url":"https://x.auth.y","account_id":"42"}"#,
        )
        .unwrap();
        assert_eq!(parsed.account_id, Some("42".to_string()));
        assert_eq!(parsed.scope, None);
    }

    #[test]
    fn test_error_display_messages() {
        let error = Error::MissingRequiredAttribute("test_field".to_string());
        assert_eq!(error.to_string(), "Missing required attribute: test_field");

        let error = Error::NotConnected;
        assert_eq!(
            error.to_string(),
            "Client is not connected: call connect() first"
        );

        let error = Error::LockError;
        assert_eq!(error.to_string(), "Failed to acquire lock on token state");
    }

    #[test]
    fn test_token_state_with_expiry() {
        let token_state = TokenState::new(token_response(Some(3600))).unwrap();
        assert_eq!(token_state.access_token(), "test_token");
        assert!(!token_state.is_expired(0).unwrap());
        assert!(!token_state.is_expired(TOKEN_REFRESH_BUFFER_SECONDS).unwrap());
    }

    #[test]
    fn test_token_state_expiry_check_with_buffer() {
        let token_state = TokenState::new(token_response(Some(60))).unwrap();
        assert!(token_state.is_expired(TOKEN_REFRESH_BUFFER_SECONDS).unwrap());
        assert!(!token_state.is_expired(0).unwrap());
    }

    #[test]
    fn test_token_state_default_expiry() {
        let token_state = TokenState::new(token_response(None)).unwrap();
        assert!(!token_state.is_expired(TOKEN_REFRESH_BUFFER_SECONDS).unwrap());
        assert!(token_state.is_expired(DEFAULT_TOKEN_LIFETIME_SECONDS).unwrap());
    }

    #[test]
    fn test_current_access_token_without_connection() {
        let client = Builder::new().credentials(test_credentials()).build().unwrap();
        let result = client.current_access_token();
        assert!(matches!(result, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn test_access_token_returns_fresh_token() {
        let client = connected_client();
        assert_eq!(client.access_token().await.unwrap(), "test_token");
        assert_eq!(client.ensure_fresh_token().await.unwrap(), "test_token");
    }

    #[tokio::test]
    async fn test_access_token_renews_expiring_token() {
        let mut client = Builder::new()
            .credentials(unreachable_credentials())
            .build()
            .unwrap();
        let token_state = TokenState::new(token_response(Some(10))).unwrap();
        client.token_state = Some(Arc::new(RwLock::new(token_state)));

        // The renewal hits the unreachable token endpoint.
        let result = client.access_token().await;
        assert!(matches!(result, Err(Error::TokenExchange(_))));
    }

    #[tokio::test]
    async fn test_reconnect_without_connection() {
        let client = Builder::new().credentials(test_credentials()).build().unwrap();
        let result = client.reconnect().await;
        assert!(matches!(result, Err(Error::NotConnected)));
    }
}
