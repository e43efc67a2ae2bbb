//! Unofficial Rust SDK core for the Salesforce Marketing Cloud (ExactTarget) APIs.
//!
//! Marketing Cloud exposes the same objects over two wire protocols, the SOAP
//! web service and the newer REST API. This crate maps between stable field
//! names and each protocol's spelling, translates one filter language to both
//! filter dialects, retrieves objects page by page over either protocol, and
//! writes data extension rows over SOAP.
//!
//! # Examples
//!
//! ```no_run
//! use exacttarget_core::client::{self, Credentials};
//! use exacttarget_core::retrieve::{self, ExtensionTarget};
//! use exacttarget_core::transport::http::HttpTransport;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = client::Builder::new()
//!     .credentials(Credentials {
//!         client_id: "...".to_string(),
//!         client_secret: "...".to_string(),
//!         auth_url: "https://your-subdomain.auth.marketingcloudapis.com".to_string(),
//!         account_id: None,
//!         scope: None,
//!         rest_url: None,
//!         soap_url: None,
//!     })
//!     .build()?
//!     .connect()
//!     .await?;
//!
//! let retriever = retrieve::Builder::new()
//!     .rest_transport(Arc::new(HttpTransport::from_client(&client)?))
//!     .token_provider(Arc::new(client))
//!     .build()?;
//!
//! let response = retriever
//!     .select_page(&ExtensionTarget::keyed("SUBSCRIBERS"), None, 1, 50, &[])
//!     .await?;
//! println!("{} rows, more: {}", response.results.len(), response.more_results);
//! # Ok(())
//! # }
//! ```

/// First page of a REST retrieval that names none.
pub const DEFAULT_PAGE: u32 = 1;

/// Page size of a REST retrieval that names none (the REST maximum).
pub const DEFAULT_PAGE_SIZE: u32 = 2500;

/// Default connection timeout for HTTP requests (30 seconds).
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default request timeout for HTTP requests (120 seconds).
///
/// Large rowset pages can take a while to be produced.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Default connection timeout for OAuth2 authentication requests (15 seconds).
pub const DEFAULT_AUTH_CONNECT_TIMEOUT_SECS: u64 = 15;

/// Default request timeout for OAuth2 authentication requests (30 seconds).
pub const DEFAULT_AUTH_REQUEST_TIMEOUT_SECS: u64 = 30;

/// OAuth2 client authentication and token management.
pub mod client;

/// Typed views over records the SDK depends on.
pub mod entities;

/// Protocol-neutral filter expressions and their parser.
pub mod filter;

/// Field maps of the registered entity types.
pub mod mapping;

/// Conversion between records and wire objects.
pub mod marshal;

/// Protocol-neutral domain objects.
pub mod record;

/// REST wire model and filter rendering.
pub mod rest;

/// Paginated retrieval over SOAP and REST.
pub mod retrieve;

/// SOAP wire model and filter rendering.
pub mod soap;

/// Transport seams and the HTTP REST transport.
pub mod transport;

/// Inserting, updating and deleting data extension rows.
pub mod write;
