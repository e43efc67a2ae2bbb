//! Paginated retrieval over SOAP and REST.
//!
//! A [`Retrieval`] names what to fetch: an entity type, an optional filter,
//! the columns wanted and, for REST, the page. The [`Retriever`] picks the
//! transport, renders the filter and column list for it, issues the call and
//! normalizes the answer into one [`Response`] shape.
//!
//! The two transports page differently. SOAP answers `MoreDataAvailable`
//! and expects the next call to continue the server-side request; REST
//! reports `page`, `pageSize` and `count`. Both end up as
//! [`Response::more_results`] plus a [`Pagination`], and [`Retriever::resume`]
//! fetches the next page either way.
//!
//! Failures of the exchange itself (SOAP fault, non-2xx status, unreadable
//! body) do not raise: they come back as a [`Response`] whose [`Status`] is
//! unsuccessful, so callers walking many pages keep what they already have.
//! Requests the field map cannot express, malformed filters and
//! authentication failures are returned as [`Error`] before anything is
//! sent.
//!
//! # Example
//!
//! ```no_run
//! use exacttarget_core::client;
//! use exacttarget_core::retrieve::{self, ExtensionTarget};
//! use exacttarget_core::transport::http::HttpTransport;
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = client::Builder::new()
//!     .credentials_path(PathBuf::from("credentials.json"))
//!     .build()?
//!     .connect()
//!     .await?;
//! let rest = HttpTransport::from_client(&client)?;
//!
//! let retriever = retrieve::Builder::new()
//!     .rest_transport(Arc::new(rest))
//!     .token_provider(Arc::new(client))
//!     .build()?;
//!
//! let subscribers = ExtensionTarget::keyed("SUBSCRIBERS");
//! let response = retriever
//!     .select_page(&subscribers, Some("Age > 30"), 1, 100, &["FirstName", "Email"])
//!     .await?;
//! for item in &response.results {
//!     println!("{:?}", item.object.get("Email"));
//! }
//! # Ok(())
//! # }
//! ```

use crate::client::{self, TokenProvider};
use crate::entities::DataExtensionColumn;
use crate::filter::{Filter, FilterSyntaxError};
use crate::mapping::{descriptor, ConfigurationError, EntityDescriptor, EntityType, Transport};
use crate::marshal::{self, MarshalError};
use crate::record::Record;
use crate::rest::{self, RowSet};
use crate::soap::{self, RetrieveRequest, MORE_DATA_AVAILABLE, OK};
use crate::transport::{RestTransport, SoapTransport, TransportError};
use crate::{DEFAULT_PAGE, DEFAULT_PAGE_SIZE};
use std::sync::Arc;

/// Status code of a walk stopped because the access token could not be renewed.
pub const AUTHENTICATION_FAILED: &str = "AuthenticationFailed";

/// Errors that stop a retrieval before or between transport calls.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The field maps cannot express the request.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    /// An explicit filter string does not parse.
    #[error(transparent)]
    FilterSyntax(#[from] FilterSyntaxError),
    /// A retrieved record could not be turned into the expected type.
    #[error(transparent)]
    Marshal(#[from] MarshalError),
    /// The credential provider could not supply a token.
    #[error("Authentication failed: {source}")]
    Auth {
        #[source]
        source: client::Error,
    },
    /// The column list of a data extension could not be retrieved.
    #[error("Column retrieval failed with {code}: {message}")]
    ColumnRetrieval { code: String, message: String },
    /// A `column=value` assignment is malformed.
    #[error("Invalid assignment '{0}', expected column=value")]
    InvalidAssignment(String),
    /// Rows of the extension cannot be addressed individually.
    #[error("Data extension '{0}' has no primary key column")]
    NoPrimaryKey(String),
    /// Required builder parameter or transport was not provided.
    #[error("Missing required attribute: {}", _0)]
    MissingRequiredAttribute(String),
}

/// Data extension whose rows are retrieved.
///
/// SOAP addresses an extension by name, REST by its external key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionTarget {
    pub name: Option<String>,
    pub key: Option<String>,
}

impl ExtensionTarget {
    pub fn new(name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            key: Some(key.into()),
        }
    }

    /// Target usable over SOAP only.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            key: None,
        }
    }

    /// Target usable over REST only.
    pub fn keyed(key: impl Into<String>) -> Self {
        Self {
            name: None,
            key: Some(key.into()),
        }
    }
}

/// What to retrieve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retrieval {
    entity_type: EntityType,
    target: ExtensionTarget,
    filter: Option<Filter>,
    columns: Vec<String>,
    page: Option<u32>,
    page_size: Option<u32>,
}

impl Retrieval {
    pub fn new(entity_type: EntityType) -> Self {
        Self {
            entity_type,
            target: ExtensionTarget::default(),
            filter: None,
            columns: Vec::new(),
            page: None,
            page_size: None,
        }
    }

    /// Rows of one data extension.
    pub fn rows(target: ExtensionTarget) -> Self {
        Self {
            target,
            ..Self::new(EntityType::DataExtensionRow)
        }
    }

    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Appends columns by external name. None means every column.
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns.extend(columns.into_iter().map(Into::into));
        self
    }

    /// Requests a REST page, 1-based.
    pub fn page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Applies a `filter, column...` argument list.
    ///
    /// The first argument is used as the filter when it parses as one and
    /// is taken as the first column name otherwise. The remaining arguments
    /// are always column names.
    pub fn arguments(mut self, arguments: &[&str]) -> Self {
        let Some((first, rest)) = arguments.split_first() else {
            return self;
        };
        match Filter::try_parse(first) {
            Some(filter) => self.filter = Some(filter),
            None => self.columns.push((*first).to_string()),
        }
        self.columns(rest.iter().copied())
    }

    /// Transport this retrieval will use.
    ///
    /// An explicit page or page size selects REST. Otherwise SOAP is used
    /// when the entity supports it, and REST with the default page when not.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::UnsupportedTransport`] when the entity
    /// cannot be retrieved over the selected transport.
    pub fn transport(&self) -> Result<Transport, ConfigurationError> {
        let entity = descriptor(self.entity_type);
        if self.page.is_some() || self.page_size.is_some() {
            entity.require(Transport::Rest)?;
            return Ok(Transport::Rest);
        }
        if entity.supports(Transport::Soap) {
            Ok(Transport::Soap)
        } else {
            entity.require(Transport::Rest)?;
            Ok(Transport::Rest)
        }
    }
}

/// One retrieved object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultItem {
    pub object: Record,
    /// Values of the object that did not fit their declared type, if any.
    /// They are kept as text in `object`.
    pub error: Option<String>,
}

/// Outcome of the transport call behind a [`Response`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub success: bool,
    /// SOAP overall status, HTTP status code, or transport error code.
    pub code: String,
    pub message: String,
}

/// How the next page of a [`Response`] is addressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pagination {
    /// SOAP: the server keeps the cursor under this request id.
    Continuation { token: Option<String> },
    /// REST: explicit page counters.
    Paged {
        page: u32,
        page_size: u32,
        total_count: u64,
    },
}

/// Normalized result of one retrieval call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Objects in the order the server returned them.
    pub results: Vec<ResultItem>,
    pub request_id: Option<String>,
    pub status: Status,
    /// Whether [`Retriever::resume`] would return further objects.
    pub more_results: bool,
    pub pagination: Pagination,
    cursor: Option<Cursor>,
}

impl Response {
    pub(crate) fn failed(error: &TransportError, pagination: Pagination) -> Self {
        tracing::warn!(code = error.code(), %error, "request failed");
        Self {
            results: Vec::new(),
            request_id: None,
            status: Status {
                success: false,
                code: error.code().to_string(),
                message: error.to_string(),
            },
            more_results: false,
            pagination,
            cursor: None,
        }
    }

    /// Single-page response that cannot be resumed.
    pub(crate) fn completed(
        results: Vec<ResultItem>,
        request_id: Option<String>,
        status: Status,
    ) -> Self {
        Self {
            results,
            request_id,
            status,
            more_results: false,
            pagination: Pagination::Continuation { token: None },
            cursor: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.success
    }

    /// Retrieved objects without their error details.
    pub fn objects(&self) -> impl Iterator<Item = &Record> {
        self.results.iter().map(|item| &item.object)
    }
}

/// Stored request a [`Response`] can be resumed from.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Cursor {
    Soap {
        entity_type: EntityType,
        request: RetrieveRequest,
    },
    Rest(RestCursor),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct RestCursor {
    entity_type: EntityType,
    key: String,
    page: u32,
    page_size: u32,
    fields: Vec<String>,
    filter: Option<String>,
}

fn materialize((object, errors): (Record, Vec<MarshalError>)) -> ResultItem {
    let error = (!errors.is_empty()).then(|| {
        errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    });
    ResultItem { object, error }
}

fn soap_property(entity: &EntityDescriptor, column: &str) -> Result<String, ConfigurationError> {
    let name = entity.internal_name(column, Transport::Soap)?;
    if !entity.is_retrievable(column) {
        return Err(ConfigurationError::NotRetrievable {
            entity: entity.entity_type(),
            field: column.to_string(),
        });
    }
    Ok(name)
}

fn default_soap_properties(entity: &EntityDescriptor) -> Vec<String> {
    entity
        .retrievable_fields()
        .filter_map(|field| field.internal_name(Transport::Soap))
        .map(str::to_string)
        .collect()
}

/// Splits a SOAP overall status such as `Error: Invalid column` into its code.
pub(crate) fn status_code(overall_status: &str) -> String {
    overall_status
        .split_once(':')
        .map_or(overall_status, |(code, _)| code)
        .trim()
        .to_string()
}

/// Issues retrievals and normalizes their responses.
///
/// Use [`Builder`] to construct a retriever. Cloning is cheap; clones share
/// their transports and token provider.
#[derive(Clone)]
pub struct Retriever {
    soap_transport: Option<Arc<dyn SoapTransport>>,
    rest_transport: Option<Arc<dyn RestTransport>>,
    token_provider: Arc<dyn TokenProvider>,
}

impl Retriever {
    /// Retrieves the first page of `retrieval`.
    ///
    /// When no columns are given, SOAP retrievals of data extension rows
    /// first retrieve the extension's column list, because SOAP needs an
    /// explicit property list.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The field maps cannot express the request ([`Error::Configuration`])
    /// - The credential provider fails ([`Error::Auth`])
    /// - The selected transport was not configured ([`Error::MissingRequiredAttribute`])
    ///
    /// Transport failures are reported in the returned [`Response`].
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn retrieve(&self, retrieval: &Retrieval) -> Result<Response, Error> {
        let entity = descriptor(retrieval.entity_type);
        let transport = retrieval.transport()?;
        tracing::debug!(entity = %retrieval.entity_type, %transport, "retrieving");

        match transport {
            Transport::Soap => self.retrieve_soap(entity, retrieval).await,
            Transport::Rest => self.retrieve_rest(entity, retrieval).await,
        }
    }

    /// Retrieves rows of a data extension from a `filter, column...` argument list.
    ///
    /// The first argument is tried as a filter and, when it does not parse,
    /// used as a column name instead. See [`Retrieval::arguments`].
    ///
    /// # Errors
    ///
    /// See [`retrieve`](Self::retrieve).
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn select(
        &self,
        target: &ExtensionTarget,
        arguments: &[&str],
    ) -> Result<Response, Error> {
        let retrieval = Retrieval::rows(target.clone()).arguments(arguments);
        self.retrieve(&retrieval).await
    }

    /// Retrieves one REST page of data extension rows.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FilterSyntax`] when `filter` does not parse, before
    /// any call is made. Otherwise see [`retrieve`](Self::retrieve).
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn select_page(
        &self,
        target: &ExtensionTarget,
        filter: Option<&str>,
        page: u32,
        page_size: u32,
        columns: &[&str],
    ) -> Result<Response, Error> {
        let mut retrieval = Retrieval::rows(target.clone())
            .page(page)
            .page_size(page_size)
            .columns(columns.iter().copied());
        if let Some(filter) = filter {
            retrieval = retrieval.filter(Filter::parse(filter)?);
        }
        self.retrieve(&retrieval).await
    }

    /// Retrieves the column metadata of the data extension with `extension_key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ColumnRetrieval`] when the platform reports a
    /// failure, and [`Error::Marshal`] when a column comes back without a
    /// name.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn retrieve_columns(
        &self,
        extension_key: &str,
    ) -> Result<Vec<DataExtensionColumn>, Error> {
        let response = self.list_columns(extension_key).await?;
        if !response.status.success {
            return Err(Error::ColumnRetrieval {
                code: response.status.code,
                message: response.status.message,
            });
        }
        response
            .objects()
            .map(|record| DataExtensionColumn::try_from(record).map_err(Error::from))
            .collect()
    }

    /// Replaces `response` with the next page of its retrieval.
    ///
    /// Returns `false` without making a call when no more results are
    /// available. SOAP continues the server-side request; REST asks for the
    /// following page.
    ///
    /// # Errors
    ///
    /// Same as [`retrieve`](Self::retrieve). A transport failure is
    /// reported in the replaced response, and so is a SOAP answer that
    /// announced more data without a request id to continue from.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn resume(&self, response: &mut Response) -> Result<bool, Error> {
        if !response.more_results {
            return Ok(false);
        }

        let next = match response.cursor.clone() {
            Some(Cursor::Soap {
                entity_type,
                request,
            }) => {
                let Some(request_id) = response.request_id.clone() else {
                    let error = TransportError::MalformedBody {
                        message: format!("{MORE_DATA_AVAILABLE} without a RequestID"),
                    };
                    *response = Response::failed(&error, Pagination::Continuation { token: None });
                    return Ok(true);
                };
                let request = RetrieveRequest {
                    continue_request: Some(request_id),
                    ..request
                };
                self.execute_soap(entity_type, request).await?
            }
            Some(Cursor::Rest(cursor)) => {
                let page = cursor.page.saturating_add(1);
                self.execute_rest(RestCursor { page, ..cursor }).await?
            }
            None => return Ok(false),
        };

        *response = next;
        Ok(true)
    }

    /// Retrieves every page of `retrieval`, appending results in order.
    ///
    /// A failure on a later page stops the walk. The returned response then
    /// carries the failed status together with every object retrieved before
    /// it. This covers transport failures, malformed continuations and a
    /// token that can no longer be renewed, reported with the code
    /// `AuthenticationFailed`.
    ///
    /// # Errors
    ///
    /// Errors are returned only when the first page cannot be requested.
    /// See [`retrieve`](Self::retrieve).
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn retrieve_all(&self, retrieval: &Retrieval) -> Result<Response, Error> {
        let response = self.retrieve(retrieval).await?;
        self.drain(response).await
    }

    async fn drain(&self, mut response: Response) -> Result<Response, Error> {
        let mut results = std::mem::take(&mut response.results);
        loop {
            match self.resume(&mut response).await {
                Ok(true) => {
                    tracing::trace!(page_results = response.results.len(), "resumed");
                    results.append(&mut response.results);
                }
                Ok(false) => break,
                Err(error @ Error::Auth { .. }) => {
                    tracing::warn!(%error, results = results.len(), "stopping after token renewal failed");
                    response.status = Status {
                        success: false,
                        code: AUTHENTICATION_FAILED.to_string(),
                        message: error.to_string(),
                    };
                    response.more_results = false;
                    response.cursor = None;
                    break;
                }
                Err(error) => return Err(error),
            }
        }
        response.results = results;
        Ok(response)
    }

    async fn retrieve_soap(
        &self,
        entity: &EntityDescriptor,
        retrieval: &Retrieval,
    ) -> Result<Response, Error> {
        let missing = |attribute: &'static str| ConfigurationError::MissingTarget {
            entity: entity.entity_type(),
            transport: Transport::Soap,
            attribute,
        };
        let binding = entity.soap().ok_or(ConfigurationError::UnsupportedTransport {
            entity: entity.entity_type(),
            transport: Transport::Soap,
        })?;
        let object_type = binding
            .retrieve_object_type(retrieval.target.name.as_deref())
            .ok_or_else(|| missing("name"))?;
        let filter = retrieval
            .filter
            .as_ref()
            .map(|filter| soap::render_filter(filter, entity))
            .transpose()?;

        let properties = if !retrieval.columns.is_empty() {
            retrieval
                .columns
                .iter()
                .map(|column| soap_property(entity, column))
                .collect::<Result<Vec<_>, _>>()?
        } else if entity.is_open() {
            let key = retrieval.target.key.as_deref().ok_or_else(|| missing("key"))?;
            let columns = self.list_columns(key).await?;
            if !columns.status.success {
                return Ok(Response {
                    pagination: Pagination::Continuation { token: None },
                    cursor: None,
                    results: Vec::new(),
                    more_results: false,
                    ..columns
                });
            }
            columns
                .objects()
                .map(|record| DataExtensionColumn::try_from(record).map(|column| column.name))
                .collect::<Result<Vec<_>, _>>()?
        } else {
            default_soap_properties(entity)
        };

        let request = RetrieveRequest {
            object_type,
            properties,
            filter,
            continue_request: None,
        };
        self.execute_soap(entity.entity_type(), request).await
    }

    /// Retrieves every column of an extension over SOAP.
    async fn list_columns(&self, extension_key: &str) -> Result<Response, Error> {
        let entity = descriptor(EntityType::DataExtensionColumn);
        let binding = entity.soap().ok_or(ConfigurationError::UnsupportedTransport {
            entity: entity.entity_type(),
            transport: Transport::Soap,
        })?;
        let filter = soap::render_filter(&Filter::equals("dataExtensionKey", extension_key), entity)?;
        let request = RetrieveRequest {
            object_type: binding.object_type().to_string(),
            properties: default_soap_properties(entity),
            filter: Some(filter),
            continue_request: None,
        };

        tracing::debug!(extension_key, "retrieving column list");
        let response = self.execute_soap(entity.entity_type(), request).await?;
        self.drain(response).await
    }

    async fn retrieve_rest(
        &self,
        entity: &EntityDescriptor,
        retrieval: &Retrieval,
    ) -> Result<Response, Error> {
        let binding = entity.rest().ok_or(ConfigurationError::UnsupportedTransport {
            entity: entity.entity_type(),
            transport: Transport::Rest,
        })?;
        let key = match &retrieval.target.key {
            Some(key) => key.clone(),
            None if binding.path().contains("{key}") => {
                return Err(ConfigurationError::MissingTarget {
                    entity: entity.entity_type(),
                    transport: Transport::Rest,
                    attribute: "key",
                }
                .into())
            }
            None => String::new(),
        };
        let filter = retrieval
            .filter
            .as_ref()
            .map(|filter| rest::render_filter(filter, entity))
            .transpose()?;
        let fields = retrieval
            .columns
            .iter()
            .map(|column| entity.internal_name(column, Transport::Rest))
            .collect::<Result<Vec<_>, _>>()?;

        self.execute_rest(RestCursor {
            entity_type: entity.entity_type(),
            key,
            page: retrieval.page.unwrap_or(DEFAULT_PAGE),
            page_size: retrieval.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            fields,
            filter,
        })
        .await
    }

    async fn fresh_token(&self) -> Result<String, Error> {
        self.token_provider
            .ensure_fresh_token()
            .await
            .map_err(|source| Error::Auth { source })
    }

    async fn execute_soap(
        &self,
        entity_type: EntityType,
        request: RetrieveRequest,
    ) -> Result<Response, Error> {
        let transport = self
            .soap_transport
            .as_ref()
            .ok_or_else(|| Error::MissingRequiredAttribute("soap_transport".to_string()))?;
        let token = self.fresh_token().await?;

        tracing::trace!(
            object_type = %request.object_type,
            properties = ?request.properties,
            continue_request = ?request.continue_request,
            "SOAP Retrieve"
        );
        let answer = match transport.retrieve(&token, &request).await {
            Ok(answer) => answer,
            Err(error) => {
                return Ok(Response::failed(
                    &error,
                    Pagination::Continuation { token: None },
                ))
            }
        };

        let more_results = answer.overall_status == MORE_DATA_AVAILABLE;
        let success = more_results || answer.overall_status == OK;
        if !success {
            tracing::warn!(status = %answer.overall_status, "SOAP retrieve failed");
        }

        let results: Vec<ResultItem> = answer
            .results
            .iter()
            .map(|object| materialize(marshal::from_soap_lenient(object, entity_type)))
            .collect();
        tracing::debug!(results = results.len(), more_results, "SOAP retrieve done");

        let continuation = more_results.then(|| answer.request_id.clone()).flatten();
        Ok(Response {
            results,
            request_id: answer.request_id,
            status: Status {
                success,
                code: status_code(&answer.overall_status),
                message: answer.overall_status,
            },
            more_results,
            pagination: Pagination::Continuation {
                token: continuation,
            },
            cursor: Some(Cursor::Soap {
                entity_type,
                request,
            }),
        })
    }

    async fn execute_rest(&self, cursor: RestCursor) -> Result<Response, Error> {
        let transport = self
            .rest_transport
            .as_ref()
            .ok_or_else(|| Error::MissingRequiredAttribute("rest_transport".to_string()))?;
        let path = rest::rowset_path(
            descriptor(cursor.entity_type),
            &cursor.key,
            cursor.page,
            cursor.page_size,
            &cursor.fields,
            cursor.filter.as_deref(),
        )?;
        let token = self.fresh_token().await?;

        let requested = Pagination::Paged {
            page: cursor.page,
            page_size: cursor.page_size,
            total_count: 0,
        };
        tracing::trace!(%path, "REST GET");
        let answer = match transport.get(&token, &path).await {
            Ok(answer) => answer,
            Err(error) => return Ok(Response::failed(&error, requested)),
        };

        if !answer.is_success() {
            tracing::warn!(status = answer.status, "REST retrieve failed");
            let message = if answer.body.trim().is_empty() {
                answer.reason().to_string()
            } else {
                answer.body.clone()
            };
            return Ok(Response {
                results: Vec::new(),
                request_id: answer.request_id,
                status: Status {
                    success: false,
                    code: answer.status.to_string(),
                    message,
                },
                more_results: false,
                pagination: requested,
                cursor: None,
            });
        }

        let rowset: RowSet = match serde_json::from_str(&answer.body) {
            Ok(rowset) => rowset,
            Err(error) => {
                let error = TransportError::MalformedBody {
                    message: error.to_string(),
                };
                return Ok(Response {
                    request_id: answer.request_id,
                    ..Response::failed(&error, requested)
                });
            }
        };

        let more_results = rowset.more_results();
        let results: Vec<ResultItem> = rowset
            .items
            .iter()
            .map(|row| materialize(marshal::from_rest_lenient(row, cursor.entity_type)))
            .collect();
        tracing::debug!(
            results = results.len(),
            page = rowset.page,
            count = rowset.count,
            more_results,
            "REST retrieve done"
        );

        Ok(Response {
            results,
            status: Status {
                success: true,
                code: answer.status.to_string(),
                message: answer.reason().to_string(),
            },
            request_id: answer.request_id,
            more_results,
            pagination: Pagination::Paged {
                page: rowset.page,
                page_size: rowset.page_size,
                total_count: rowset.count,
            },
            cursor: Some(Cursor::Rest(RestCursor {
                page: rowset.page,
                ..cursor
            })),
        })
    }
}

/// Builder for constructing a [`Retriever`].
#[derive(Default)]
pub struct Builder {
    soap_transport: Option<Arc<dyn SoapTransport>>,
    rest_transport: Option<Arc<dyn RestTransport>>,
    token_provider: Option<Arc<dyn TokenProvider>>,
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn soap_transport(mut self, transport: Arc<dyn SoapTransport>) -> Self {
        self.soap_transport = Some(transport);
        self
    }

    pub fn rest_transport(mut self, transport: Arc<dyn RestTransport>) -> Self {
        self.rest_transport = Some(transport);
        self
    }

    /// Sets the source of access tokens, usually a connected [`client::Client`].
    pub fn token_provider(mut self, token_provider: Arc<dyn TokenProvider>) -> Self {
        self.token_provider = Some(token_provider);
        self
    }

    /// Builds the retriever.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingRequiredAttribute`] when no token provider or
    /// no transport at all was set.
    pub fn build(self) -> Result<Retriever, Error> {
        let token_provider = self
            .token_provider
            .ok_or_else(|| Error::MissingRequiredAttribute("token_provider".to_string()))?;
        if self.soap_transport.is_none() && self.rest_transport.is_none() {
            return Err(Error::MissingRequiredAttribute(
                "soap_transport or rest_transport".to_string(),
            ));
        }
        Ok(Retriever {
            soap_transport: self.soap_transport,
            rest_transport: self.rest_transport,
            token_provider,
        })
    }
}
