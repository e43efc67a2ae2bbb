//! Writing data extension rows over SOAP.
//!
//! A [`Writer`] inserts, updates and deletes rows of one data extension.
//! Rows are marshalled with [`marshal::to_soap`] and tagged with the
//! extension they belong to, so callers never repeat it per row. Results
//! come back in the [`Response`] shape retrievals use: one [`ResultItem`]
//! per row sent, carrying the platform's message as its error when that row
//! was rejected.
//!
//! The filter-based variants look up the extension's primary key columns,
//! retrieve the keys of every matching row and then write those rows.
//!
//! # Example
//!
//! ```no_run
//! use exacttarget_core::record::Record;
//! use exacttarget_core::mapping::EntityType;
//! use exacttarget_core::retrieve::ExtensionTarget;
//! use exacttarget_core::write::Writer;
//!
//! # async fn run(writer: Writer) -> Result<(), Box<dyn std::error::Error>> {
//! let subscribers = ExtensionTarget::new("Subscribers", "SUBS");
//! let row = Record::new(EntityType::DataExtensionRow)
//!     .with_key("Email", "bob@example.com")
//!     .with("FirstName", "Bob");
//! writer.insert(&subscribers, &[row]).await?;
//!
//! writer
//!     .update_where(&subscribers, "FirstName = Bob", &["FirstName=Robert"])
//!     .await?;
//! writer.delete_where(&subscribers, "FirstName = Robert").await?;
//! # Ok(())
//! # }
//! ```

use crate::client::TokenProvider;
use crate::filter::Filter;
use crate::mapping::{ConfigurationError, EntityType, Transport};
use crate::marshal::{self, MarshalError};
use crate::record::Record;
use crate::retrieve::{
    self, Error, ExtensionTarget, Pagination, ResultItem, Response, Retrieval, Retriever, Status,
};
use crate::soap::{SoapObject, SoapProperty, SoapValue, WriteOperation, WriteResponse, OK};
use crate::transport::SoapTransport;
use std::sync::Arc;

/// Row property naming the owning extension.
const EXTENSION_NAME: &str = "Name";

/// Row property holding the external key of the owning extension.
const EXTENSION_KEY: &str = "CustomerKey";

/// Writes rows of data extensions.
///
/// Use [`Builder`] to construct a writer.
#[derive(Clone)]
pub struct Writer {
    soap_transport: Arc<dyn SoapTransport>,
    token_provider: Arc<dyn TokenProvider>,
    retriever: Retriever,
}

impl Writer {
    /// Inserts `rows` into the extension.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `target` names neither the extension name nor its key ([`Error::Configuration`])
    /// - A row is not a data extension row or holds an unwritable value ([`Error::Marshal`])
    /// - The credential provider fails ([`Error::Auth`])
    ///
    /// Transport failures and rejected rows are reported in the returned
    /// [`Response`].
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn insert(&self, target: &ExtensionTarget, rows: &[Record]) -> Result<Response, Error> {
        self.write(WriteOperation::Create, target, rows).await
    }

    /// Updates `rows`, addressed by their key columns.
    ///
    /// # Errors
    ///
    /// See [`insert`](Self::insert).
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn update(&self, target: &ExtensionTarget, rows: &[Record]) -> Result<Response, Error> {
        self.write(WriteOperation::Update, target, rows).await
    }

    /// Deletes `rows`, addressed by their key columns.
    ///
    /// # Errors
    ///
    /// See [`insert`](Self::insert).
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn delete(&self, target: &ExtensionTarget, rows: &[Record]) -> Result<Response, Error> {
        self.write(WriteOperation::Delete, target, rows).await
    }

    /// Sets columns of every row matching `filter`.
    ///
    /// Each assignment reads `column=value`. When retrieving the matching
    /// rows fails, nothing is written and that failure is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `filter` does not parse ([`Error::FilterSyntax`])
    /// - An assignment has no `=` or no column ([`Error::InvalidAssignment`])
    /// - `target` lacks the extension name or key ([`Error::Configuration`])
    /// - The column list cannot be retrieved ([`Error::ColumnRetrieval`])
    /// - The extension has no primary key ([`Error::NoPrimaryKey`])
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn update_where(
        &self,
        target: &ExtensionTarget,
        filter: &str,
        assignments: &[&str],
    ) -> Result<Response, Error> {
        let filter = Filter::parse(filter)?;
        let assignments = assignments
            .iter()
            .map(|assignment| parse_assignment(assignment))
            .collect::<Result<Vec<_>, _>>()?;

        let (keys, matched) = self.matching_rows(target, filter).await?;
        if !matched.is_success() {
            return Ok(Response::completed(Vec::new(), matched.request_id, matched.status));
        }
        let rows: Vec<Record> = matched
            .objects()
            .map(|row| {
                let mut record = key_record(row, &keys);
                for (column, value) in &assignments {
                    record.insert(column.clone(), value.as_str());
                }
                record
            })
            .collect();
        self.update(target, &rows).await
    }

    /// Deletes every row matching `filter`.
    ///
    /// # Errors
    ///
    /// See [`update_where`](Self::update_where).
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn delete_where(&self, target: &ExtensionTarget, filter: &str) -> Result<Response, Error> {
        let filter = Filter::parse(filter)?;
        let (keys, matched) = self.matching_rows(target, filter).await?;
        if !matched.is_success() {
            return Ok(Response::completed(Vec::new(), matched.request_id, matched.status));
        }
        let rows: Vec<Record> = matched.objects().map(|row| key_record(row, &keys)).collect();
        self.delete(target, &rows).await
    }

    /// Primary key columns of the extension and the keys of every row
    /// matching `filter`.
    async fn matching_rows(
        &self,
        target: &ExtensionTarget,
        filter: Filter,
    ) -> Result<(Vec<String>, Response), Error> {
        let extension_key = target
            .key
            .as_deref()
            .ok_or(ConfigurationError::MissingTarget {
                entity: EntityType::DataExtensionRow,
                transport: Transport::Soap,
                attribute: "key",
            })?;
        let keys: Vec<String> = self
            .retriever
            .retrieve_columns(extension_key)
            .await?
            .into_iter()
            .filter(|column| column.is_primary_key)
            .map(|column| column.name)
            .collect();
        if keys.is_empty() {
            return Err(Error::NoPrimaryKey(extension_key.to_string()));
        }

        tracing::debug!(?keys, %filter, "retrieving keys of matching rows");
        let retrieval = Retrieval::rows(target.clone())
            .filter(filter)
            .columns(keys.iter().cloned());
        let matched = self.retriever.retrieve_all(&retrieval).await?;
        Ok((keys, matched))
    }

    async fn write(
        &self,
        operation: WriteOperation,
        target: &ExtensionTarget,
        rows: &[Record],
    ) -> Result<Response, Error> {
        if target.name.is_none() && target.key.is_none() {
            return Err(ConfigurationError::MissingTarget {
                entity: EntityType::DataExtensionRow,
                transport: Transport::Soap,
                attribute: "name",
            }
            .into());
        }
        let objects = rows
            .iter()
            .map(|row| row_object(row, target))
            .collect::<Result<Vec<_>, _>>()?;
        if objects.is_empty() {
            tracing::debug!(operation = operation.as_str(), "nothing to write");
            return Ok(Response::completed(
                Vec::new(),
                None,
                Status {
                    success: true,
                    code: OK.to_string(),
                    message: OK.to_string(),
                },
            ));
        }

        let token = self
            .token_provider
            .ensure_fresh_token()
            .await
            .map_err(|source| Error::Auth { source })?;

        tracing::trace!(operation = operation.as_str(), objects = objects.len(), "SOAP write");
        let answer = match operation {
            WriteOperation::Create => self.soap_transport.create(&token, &objects).await,
            WriteOperation::Update => self.soap_transport.update(&token, &objects).await,
            WriteOperation::Delete => self.soap_transport.delete(&token, &objects).await,
        };
        match answer {
            Ok(answer) => Ok(write_response(operation, answer, rows)),
            Err(error) => Ok(Response::failed(&error, Pagination::Continuation { token: None })),
        }
    }
}

fn parse_assignment(assignment: &str) -> Result<(String, String), Error> {
    match assignment.split_once('=') {
        Some((column, value)) if !column.trim().is_empty() => {
            Ok((column.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(Error::InvalidAssignment(assignment.to_string())),
    }
}

/// The key columns of `row`, stored as keys.
fn key_record(row: &Record, keys: &[String]) -> Record {
    let mut record = Record::new(EntityType::DataExtensionRow);
    for key in keys {
        if let Some(value) = row.get(key) {
            record.insert_key(key.clone(), value.clone());
        }
    }
    record
}

fn row_object(row: &Record, target: &ExtensionTarget) -> Result<SoapObject, MarshalError> {
    if row.entity_type() != EntityType::DataExtensionRow {
        return Err(MarshalError::WrongEntity {
            expected: EntityType::DataExtensionRow,
            found: row.entity_type(),
        });
    }
    let mut object = marshal::to_soap(row)?;

    let mut properties: Vec<SoapProperty> = [(EXTENSION_NAME, &target.name), (EXTENSION_KEY, &target.key)]
        .into_iter()
        .filter_map(|(name, value)| {
            value.as_ref().map(|value| SoapProperty {
                name: name.to_string(),
                value: SoapValue::Text(value.clone()),
            })
        })
        .collect();
    properties.append(&mut object.properties);
    object.properties = properties;
    Ok(object)
}

fn write_response(operation: WriteOperation, answer: WriteResponse, rows: &[Record]) -> Response {
    let success = answer.overall_status == OK;
    if !success {
        tracing::warn!(operation = operation.as_str(), status = %answer.overall_status, "SOAP write failed");
    }

    let results: Vec<ResultItem> = answer
        .results
        .iter()
        .enumerate()
        .map(|(position, result)| {
            let ordinal = result.ordinal_id.unwrap_or(position);
            ResultItem {
                object: rows
                    .get(ordinal)
                    .cloned()
                    .unwrap_or_else(|| Record::new(EntityType::DataExtensionRow)),
                error: (result.status_code != OK).then(|| result.status_message.clone()),
            }
        })
        .collect();
    tracing::debug!(operation = operation.as_str(), results = results.len(), success, "SOAP write done");

    Response::completed(
        results,
        answer.request_id,
        Status {
            success,
            code: retrieve::status_code(&answer.overall_status),
            message: answer.overall_status,
        },
    )
}

/// Builder for constructing a [`Writer`].
#[derive(Default)]
pub struct Builder {
    soap_transport: Option<Arc<dyn SoapTransport>>,
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

    /// Sets the source of access tokens, usually a connected [`crate::client::Client`].
    pub fn token_provider(mut self, token_provider: Arc<dyn TokenProvider>) -> Self {
        self.token_provider = Some(token_provider);
        self
    }

    /// Builds the writer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingRequiredAttribute`] when the SOAP transport or
    /// the token provider was not set.
    pub fn build(self) -> Result<Writer, Error> {
        let soap_transport = self
            .soap_transport
            .ok_or_else(|| Error::MissingRequiredAttribute("soap_transport".to_string()))?;
        let token_provider = self
            .token_provider
            .ok_or_else(|| Error::MissingRequiredAttribute("token_provider".to_string()))?;
        let retriever = retrieve::Builder::new()
            .soap_transport(soap_transport.clone())
            .token_provider(token_provider.clone())
            .build()?;
        Ok(Writer {
            soap_transport,
            token_provider,
            retriever,
        })
    }
}
