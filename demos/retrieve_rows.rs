//! Example of retrieving data extension rows over the REST API.
//!
//! This example demonstrates:
//! - Connecting with installed-package credentials
//! - Retrieving one page of rows with a filter and a column list
//! - Resuming to the next page
//! - Walking every page of an extension
//!
//! Set `MC_CLIENT_ID`, `MC_CLIENT_SECRET`, `MC_AUTH_URL` and `MC_DE_KEY`
//! (optionally `MC_ACCOUNT_ID`) before running.

use exacttarget_core::client::{self, Credentials};
use exacttarget_core::retrieve::{self, ExtensionTarget, Retrieval};
use exacttarget_core::transport::http::HttpTransport;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let client = client::Builder::new()
        .credentials(Credentials {
            client_id: std::env::var("MC_CLIENT_ID")?,
            client_secret: std::env::var("MC_CLIENT_SECRET")?,
            auth_url: std::env::var("MC_AUTH_URL")?,
            account_id: std::env::var("MC_ACCOUNT_ID").ok(),
            scope: None,
            rest_url: None,
            soap_url: None,
        })
        .build()?
        .connect()
        .await?;

    let transport = HttpTransport::from_client(&client)?;
    info!("Using REST endpoint {}", transport.base_url());

    let retriever = retrieve::Builder::new()
        .rest_transport(Arc::new(transport))
        .token_provider(Arc::new(client))
        .build()?;

    let target = ExtensionTarget::keyed(std::env::var("MC_DE_KEY")?);

    info!("Retrieving the first page");
    let mut response = retriever
        .select_page(&target, Some("Age > 30"), 1, 25, &["FirstName", "Email"])
        .await?;
    if !response.is_success() {
        warn!("Retrieve failed: {} {}", response.status.code, response.status.message);
        return Ok(());
    }
    for record in response.objects() {
        info!("Row: {:?}", record);
    }
    info!("Pagination: {:?}", response.pagination);

    if retriever.resume(&mut response).await? {
        info!("Second page holds {} rows", response.results.len());
    }

    info!("Retrieving every row");
    let everything = retriever
        .retrieve_all(&Retrieval::rows(target).page_size(500))
        .await?;
    info!(
        "Retrieved {} rows (status {})",
        everything.results.len(),
        everything.status.code
    );
    for item in everything.results.iter().filter(|item| item.error.is_some()) {
        warn!("Row with unreadable values: {:?}", item.error);
    }

    Ok(())
}
