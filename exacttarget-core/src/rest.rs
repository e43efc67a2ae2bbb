//! REST wire model, filter rendering and rowset paths.

use crate::filter::{Filter, Operator};
use crate::mapping::{ConfigurationError, EntityDescriptor, Transport};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Separator between tokens of a rendered `$filter`.
const SPACE: &str = "%20";

/// One row as exchanged with the REST API.
///
/// Key columns and payload columns travel in separate objects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RestRow {
    #[serde(default)]
    pub keys: Map<String, JsonValue>,
    #[serde(default)]
    pub values: Map<String, JsonValue>,
}

/// One page of a rowset retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowSet {
    pub page: u32,
    pub page_size: u32,
    /// Total number of rows matching the request.
    pub count: u64,
    #[serde(default)]
    pub items: Vec<RestRow>,
}

impl RowSet {
    /// Whether rows exist beyond this page.
    pub fn more_results(&self) -> bool {
        u64::from(self.page) * u64::from(self.page_size) < self.count
    }
}

/// REST token of a filter operator.
///
/// Operators without a REST spelling pass through unchanged.
// TODO: check the pass-through operators against the rowset endpoint's documented operator list.
pub fn rest_operator(operator: &Operator) -> &str {
    match operator {
        Operator::Equals => "eq",
        Operator::NotEquals => "ne",
        Operator::LessThan => "lt",
        Operator::LessThanOrEqual => "lte",
        Operator::GreaterThan => "gt",
        Operator::GreaterThanOrEqual => "gte",
        other => other.symbol(),
    }
}

/// Renders a filter as the value of a `$filter` query parameter.
///
/// Binary nodes render as `left%20op%20right` and `not` as `not%20inner`,
/// left to right with no added grouping.
///
/// # Errors
///
/// Fails with a [`ConfigurationError`] when a leaf names a field the entity
/// does not have over REST.
pub fn render_filter(filter: &Filter, entity: &EntityDescriptor) -> Result<String, ConfigurationError> {
    let mut rendered = String::new();
    write_filter(&mut rendered, filter, entity)?;
    Ok(rendered)
}

fn write_filter(
    out: &mut String,
    filter: &Filter,
    entity: &EntityDescriptor,
) -> Result<(), ConfigurationError> {
    match filter {
        Filter::Comparison {
            property,
            operator,
            value,
        } => {
            out.push_str(&entity.internal_name(property, Transport::Rest)?);
            out.push_str(SPACE);
            out.push_str(rest_operator(operator));
            out.push_str(SPACE);
            out.push_str(value);
        }
        Filter::And(left, right) | Filter::Or(left, right) => {
            let word = if matches!(filter, Filter::And(..)) { "and" } else { "or" };
            write_filter(out, left, entity)?;
            out.push_str(SPACE);
            out.push_str(word);
            out.push_str(SPACE);
            write_filter(out, right, entity)?;
        }
        Filter::Not(inner) => {
            out.push_str("not");
            out.push_str(SPACE);
            write_filter(out, inner, entity)?;
        }
    }
    Ok(())
}

/// Builds the path and query of a rowset retrieval.
///
/// `fields` are REST column names; `$fields` is omitted when empty so the
/// server returns every column. `filter` is an already rendered `$filter`.
///
/// # Errors
///
/// Fails when the entity has no REST binding.
pub fn rowset_path(
    entity: &EntityDescriptor,
    key: &str,
    page: u32,
    page_size: u32,
    fields: &[String],
    filter: Option<&str>,
) -> Result<String, ConfigurationError> {
    let binding = entity.rest().ok_or(ConfigurationError::UnsupportedTransport {
        entity: entity.entity_type(),
        transport: Transport::Rest,
    })?;

    let mut path = binding.path().replace("{key}", key);
    path.push_str(&format!("?$page={page}&$pagesize={page_size}"));
    if !fields.is_empty() {
        path.push_str("&$fields=");
        path.push_str(&fields.join(","));
    }
    if let Some(filter) = filter {
        path.push_str("&$filter=");
        path.push_str(filter);
    }
    Ok(path)
}
