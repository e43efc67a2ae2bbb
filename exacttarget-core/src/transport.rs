//! Seams to the wire transports.
//!
//! The retrieval engine never talks to the network directly. It hands fully
//! built requests to a [`SoapTransport`] or [`RestTransport`] together with a
//! fresh access token. [`http::HttpTransport`] implements the REST side on
//! top of `reqwest`; SOAP envelopes are left to the caller's transport.

use crate::soap::{RetrieveRequest, RetrieveResponse, SoapObject, WriteResponse};
use async_trait::async_trait;

#[cfg(test)]
pub(crate) mod fake;
pub mod http;

/// Errors raised while exchanging a request with the platform.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum TransportError {
    /// The SOAP API answered with a fault.
    #[error("SOAP fault {code}: {message}")]
    Fault {
        /// Fault code reported by the server.
        code: String,
        /// Fault string reported by the server.
        message: String,
    },
    /// The HTTP exchange itself failed.
    #[error("HTTP request failed: {source}")]
    Http {
        #[source]
        source: reqwest::Error,
    },
    /// The response body could not be read as the expected shape.
    #[error("Malformed response body: {message}")]
    MalformedBody {
        /// Parser diagnostic.
        message: String,
    },
}

impl TransportError {
    /// Short status code recorded on a failed response.
    pub fn code(&self) -> &str {
        match self {
            TransportError::Fault { code, .. } => code,
            TransportError::Http { .. } => "HttpError",
            TransportError::MalformedBody { .. } => "MalformedBody",
        }
    }
}

/// Raw answer to a REST call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestResponse {
    /// HTTP status code.
    pub status: u16,
    /// Request id echoed by the platform, when present.
    pub request_id: Option<String>,
    pub body: String,
}

impl RestResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Canonical reason phrase of the status code.
    pub fn reason(&self) -> &'static str {
        reqwest::StatusCode::from_u16(self.status)
            .ok()
            .and_then(|status| status.canonical_reason())
            .unwrap_or("Unknown Status")
    }
}

/// Issues SOAP API calls.
#[async_trait]
pub trait SoapTransport: Send + Sync {
    /// Performs a `Retrieve` call.
    ///
    /// A SOAP fault is reported as [`TransportError::Fault`]; any other
    /// overall status, including errors, comes back in the response.
    /// Data extension rows come back with one top-level property per column.
    async fn retrieve(
        &self,
        access_token: &str,
        request: &RetrieveRequest,
    ) -> Result<RetrieveResponse, TransportError>;

    /// Performs a `Create` call for `objects`.
    ///
    /// Data extension rows carry their key columns in a nested `Keys` object
    /// and name their extension with `Name` or `CustomerKey`.
    async fn create(
        &self,
        access_token: &str,
        objects: &[SoapObject],
    ) -> Result<WriteResponse, TransportError>;

    /// Performs an `Update` call for `objects`.
    async fn update(
        &self,
        access_token: &str,
        objects: &[SoapObject],
    ) -> Result<WriteResponse, TransportError>;

    /// Performs a `Delete` call for `objects`.
    async fn delete(
        &self,
        access_token: &str,
        objects: &[SoapObject],
    ) -> Result<WriteResponse, TransportError>;
}

/// Issues REST API calls.
#[async_trait]
pub trait RestTransport: Send + Sync {
    /// Performs `GET path`, where `path` includes the query string.
    ///
    /// Non-2xx answers are returned as responses, not errors.
    async fn get(&self, access_token: &str, path: &str) -> Result<RestResponse, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rest_response_status() {
        let response = RestResponse {
            status: 200,
            request_id: None,
            body: String::new(),
        };
        assert!(response.is_success());
        assert_eq!(response.reason(), "OK");

        let response = RestResponse {
            status: 404,
            ..response
        };
        assert!(!response.is_success());
        assert_eq!(response.reason(), "Not Found");
    }

    #[test]
    fn test_error_codes() {
        let fault = TransportError::Fault {
            code: "soap:Client".to_string(),
            message: "Bad request".to_string(),
        };
        assert_eq!(fault.code(), "soap:Client");
        assert_eq!(fault.to_string(), "SOAP fault soap:Client: Bad request");

        let malformed = TransportError::MalformedBody {
            message: "expected value".to_string(),
        };
        assert_eq!(malformed.code(), "MalformedBody");
    }
}
