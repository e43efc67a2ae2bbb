//! SOAP wire model and filter rendering.
//!
//! The types here mirror the parts of the SOAP API's `Retrieve`, `Create`,
//! `Update` and `Delete` calls the SDK uses. Serialising them to XML is the job of the
//! [`SoapTransport`](crate::transport::SoapTransport) implementation.

use crate::filter::{Filter, Operator};
use crate::mapping::{ConfigurationError, EntityDescriptor, Transport};
use chrono::{DateTime, Utc};

/// Overall status of a retrieve that has more rows waiting on the server.
pub const MORE_DATA_AVAILABLE: &str = "MoreDataAvailable";

/// Overall status of a successful retrieve.
pub const OK: &str = "OK";

/// Native simple-filter operators accepted verbatim from the filter grammar.
const NATIVE_OPERATORS: [&str; 12] = [
    "like",
    "beginsWith",
    "endsWith",
    "contains",
    "notContains",
    "isNull",
    "isNotNull",
    "existsInString",
    "existsInStringAsAWord",
    "notExistsInString",
    "between",
    "IN",
];

/// A SOAP API object: its type and typed properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapObject {
    pub object_type: String,
    pub properties: Vec<SoapProperty>,
}

impl SoapObject {
    pub fn new(object_type: impl Into<String>) -> Self {
        Self {
            object_type: object_type.into(),
            properties: Vec::new(),
        }
    }

    /// Builder-style property append.
    pub fn with(mut self, name: impl Into<String>, value: SoapValue) -> Self {
        self.properties.push(SoapProperty {
            name: name.into(),
            value,
        });
        self
    }

    /// First property called `name`.
    pub fn property(&self, name: &str) -> Option<&SoapValue> {
        self.properties
            .iter()
            .find(|property| property.name == name)
            .map(|property| &property.value)
    }

    pub(crate) fn property_mut(&mut self, name: &str) -> Option<&mut SoapValue> {
        self.properties
            .iter_mut()
            .find(|property| property.name == name)
            .map(|property| &mut property.value)
    }
}

/// One named property of a [`SoapObject`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapProperty {
    pub name: String,
    pub value: SoapValue,
}

/// Property value as typed by the SOAP schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SoapValue {
    Nil,
    Text(String),
    Integer(i64),
    Boolean(bool),
    DateTime(DateTime<Utc>),
    Object(SoapObject),
}

/// Logical operator of a complex filter part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOperator {
    And,
    Or,
    Not,
}

impl LogicalOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogicalOperator::And => "AND",
            LogicalOperator::Or => "OR",
            LogicalOperator::Not => "NOT",
        }
    }
}

/// A single property comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleFilterPart {
    pub property: String,
    /// Native operator token, e.g. `equals`.
    pub simple_operator: String,
    pub values: Vec<String>,
}

/// Two filter parts joined by `AND`/`OR`, or one part under `NOT`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplexFilterPart {
    pub left_operand: Box<FilterPart>,
    pub logical_operator: LogicalOperator,
    /// Absent for `NOT`.
    pub right_operand: Option<Box<FilterPart>>,
}

/// SOAP filter tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterPart {
    Simple(SimpleFilterPart),
    Complex(ComplexFilterPart),
}

impl FilterPart {
    /// Number of simple parts in the tree.
    pub fn leaf_count(&self) -> usize {
        match self {
            FilterPart::Simple(_) => 1,
            FilterPart::Complex(complex) => {
                complex.left_operand.leaf_count()
                    + complex
                        .right_operand
                        .as_ref()
                        .map_or(0, |right| right.leaf_count())
            }
        }
    }
}

/// Body of a SOAP `Retrieve` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrieveRequest {
    pub object_type: String,
    pub properties: Vec<String>,
    pub filter: Option<FilterPart>,
    /// Request id of a previous call whose remaining rows should be fetched.
    pub continue_request: Option<String>,
}

/// Result of a SOAP `Retrieve` call that did not fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrieveResponse {
    pub request_id: Option<String>,
    /// `OK`, `MoreDataAvailable` or an error description.
    pub overall_status: String,
    pub results: Vec<SoapObject>,
}

/// SOAP call that writes objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOperation {
    Create,
    Update,
    Delete,
}

impl WriteOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteOperation::Create => "Create",
            WriteOperation::Update => "Update",
            WriteOperation::Delete => "Delete",
        }
    }
}

/// Outcome of one object of a write call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteResult {
    /// `OK` or `Error`.
    pub status_code: String,
    pub status_message: String,
    /// Position of the object in the request, when the server reports it.
    pub ordinal_id: Option<usize>,
}

/// Result of a write call that did not fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteResponse {
    pub request_id: Option<String>,
    /// `OK`, `Has Errors` or `Error`.
    pub overall_status: String,
    pub results: Vec<WriteResult>,
}

/// Native token for a filter operator.
///
/// # Errors
///
/// Returns [`ConfigurationError::UnsupportedOperator`] for word operators
/// the SOAP API does not define.
pub fn simple_operator(operator: &Operator) -> Result<&str, ConfigurationError> {
    match operator {
        Operator::Equals => Ok("equals"),
        Operator::NotEquals => Ok("notEquals"),
        Operator::LessThan => Ok("lessThan"),
        Operator::LessThanOrEqual => Ok("lessThanOrEqual"),
        Operator::GreaterThan => Ok("greaterThan"),
        Operator::GreaterThanOrEqual => Ok("greaterThanOrEqual"),
        Operator::Like => Ok("like"),
        Operator::Other(name) => NATIVE_OPERATORS
            .iter()
            .find(|native| native.eq_ignore_ascii_case(name))
            .copied()
            .ok_or_else(|| ConfigurationError::UnsupportedOperator {
                operator: name.clone(),
                transport: Transport::Soap,
            }),
    }
}

/// Renders a filter as a SOAP filter tree for `entity`.
///
/// Property names are translated to their SOAP names; the tree shape is kept
/// node for node.
///
/// # Errors
///
/// Fails with a [`ConfigurationError`] when a leaf names a field the entity
/// does not have over SOAP, or uses an operator SOAP does not support.
pub fn render_filter(
    filter: &Filter,
    entity: &EntityDescriptor,
) -> Result<FilterPart, ConfigurationError> {
    match filter {
        Filter::Comparison {
            property,
            operator,
            value,
        } => Ok(FilterPart::Simple(SimpleFilterPart {
            property: entity.internal_name(property, Transport::Soap)?,
            simple_operator: simple_operator(operator)?.to_string(),
            values: vec![value.clone()],
        })),
        Filter::And(left, right) => complex(entity, left, LogicalOperator::And, Some(right)),
        Filter::Or(left, right) => complex(entity, left, LogicalOperator::Or, Some(right)),
        Filter::Not(inner) => complex(entity, inner, LogicalOperator::Not, None),
    }
}

fn complex(
    entity: &EntityDescriptor,
    left: &Filter,
    logical_operator: LogicalOperator,
    right: Option<&Filter>,
) -> Result<FilterPart, ConfigurationError> {
    let left_operand = Box::new(render_filter(left, entity)?);
    let right_operand = right
        .map(|right| render_filter(right, entity).map(Box::new))
        .transpose()?;
    Ok(FilterPart::Complex(ComplexFilterPart {
        left_operand,
        logical_operator,
        right_operand,
    }))
}
