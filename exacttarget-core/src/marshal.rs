//! Conversion between [`Record`]s and their SOAP and REST wire shapes.
//!
//! Field names are translated through the entity's field map. Dotted SOAP
//! names address nested objects (`Email.ID` is the `ID` property of the
//! `Email` property). Key columns of a data extension row travel apart from
//! the other columns on both wires: inside the nested `Keys` object on SOAP,
//! in `keys` next to `values` on REST. Reading merges them back into one
//! record that remembers which columns are keys.
//!
//! Reading comes in two flavours. The strict functions fail on the first
//! value that does not fit its declared type. The lenient ones, used when
//! materializing retrieval results, keep the raw text and report what went
//! wrong alongside the record.

use crate::mapping::{
    descriptor, ConfigurationError, EntityDescriptor, EntityType, FieldType, SoapBinding, Transport,
};
use crate::record::{CoerceError, Record, Value};
use crate::rest::RestRow;
use crate::soap::{SoapObject, SoapProperty, SoapValue};
use serde_json::{Map, Value as JsonValue};

/// Errors raised while converting a record to or from a wire shape.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MarshalError {
    /// The field map cannot express the record.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    /// A wire value does not parse as the field's declared type.
    #[error("field '{field}': {source}")]
    Coerce {
        field: String,
        #[source]
        source: CoerceError,
    },
    /// A field the platform requires is absent or null.
    #[error("{entity} requires field '{field}'")]
    MissingRequired { entity: EntityType, field: String },
    /// A wire value has the wrong JSON or SOAP shape.
    #[error("field '{field}' is not {expected}")]
    UnexpectedShape {
        field: String,
        expected: &'static str,
    },
    /// The field holds a list and cannot be sent as a single value.
    #[error("{entity} field '{field}' cannot be written as a single value")]
    NotWritable { entity: EntityType, field: String },
    /// A record of one entity type was read as another.
    #[error("expected a {expected} record, found {found}")]
    WrongEntity {
        expected: EntityType,
        found: EntityType,
    },
}

/// A record in the shape of one transport.
#[derive(Debug, Clone, PartialEq)]
pub enum Wire {
    Soap(SoapObject),
    Rest(RestRow),
}

impl Wire {
    pub fn transport(&self) -> Transport {
        match self {
            Wire::Soap(_) => Transport::Soap,
            Wire::Rest(_) => Transport::Rest,
        }
    }
}

/// Converts `record` to the wire shape of `transport`.
///
/// # Errors
///
/// See [`to_soap`] and [`to_rest`].
pub fn to_wire(record: &Record, transport: Transport) -> Result<Wire, MarshalError> {
    match transport {
        Transport::Soap => to_soap(record).map(Wire::Soap),
        Transport::Rest => to_rest(record).map(Wire::Rest),
    }
}

/// Reads a wire object back into a record of `entity_type`.
///
/// # Errors
///
/// See [`from_soap`] and [`from_rest`].
pub fn from_wire(wire: &Wire, entity_type: EntityType) -> Result<Record, MarshalError> {
    match wire {
        Wire::Soap(object) => from_soap(object, entity_type),
        Wire::Rest(row) => from_rest(row, entity_type),
    }
}

/// Builds the SOAP object for `record`.
///
/// # Errors
///
/// Returns an error if:
/// - The entity has no SOAP binding, or a field has no SOAP name ([`MarshalError::Configuration`])
/// - A required field is absent or null ([`MarshalError::MissingRequired`])
/// - A field holds a nested list ([`MarshalError::NotWritable`])
pub fn to_soap(record: &Record) -> Result<SoapObject, MarshalError> {
    let entity = descriptor(record.entity_type());
    let binding = entity.soap().ok_or(ConfigurationError::UnsupportedTransport {
        entity: entity.entity_type(),
        transport: Transport::Soap,
    })?;

    for required in binding.required_fields() {
        if record.get(required).is_none_or(Value::is_null) {
            return Err(MarshalError::MissingRequired {
                entity: entity.entity_type(),
                field: (*required).to_string(),
            });
        }
    }

    let mut object = SoapObject::new(binding.object_type());
    for (name, value) in record.iter() {
        if matches!(entity.field(name)?.field_type(), FieldType::Collection(_)) {
            return Err(MarshalError::NotWritable {
                entity: entity.entity_type(),
                field: name.to_string(),
            });
        }
        let path = entity.internal_name(name, Transport::Soap)?;
        let path = match binding.keys_property() {
            Some(keys) if record.is_key_column(name) => format!("{keys}.{path}"),
            _ => path,
        };
        insert_path(&mut object, &path, soap_value(value))?;
    }
    Ok(object)
}

fn soap_value(value: &Value) -> SoapValue {
    match value {
        Value::Null => SoapValue::Nil,
        Value::String(text) => SoapValue::Text(text.clone()),
        Value::Integer(number) => SoapValue::Integer(*number),
        Value::Boolean(flag) => SoapValue::Boolean(*flag),
        Value::Date(date) => SoapValue::DateTime(*date),
        Value::Reference { id, .. } => SoapValue::Text(id.clone()),
    }
}

fn insert_path(object: &mut SoapObject, path: &str, value: SoapValue) -> Result<(), MarshalError> {
    let Some((head, rest)) = path.split_once('.') else {
        object.properties.push(SoapProperty {
            name: path.to_string(),
            value,
        });
        return Ok(());
    };

    if object.property(head).is_none() {
        object.properties.push(SoapProperty {
            name: head.to_string(),
            value: SoapValue::Object(SoapObject::new(head)),
        });
    }
    match object.property_mut(head) {
        Some(SoapValue::Object(nested)) => insert_path(nested, rest, value),
        _ => Err(MarshalError::UnexpectedShape {
            field: head.to_string(),
            expected: "an object",
        }),
    }
}

fn lookup<'a>(object: &'a SoapObject, path: &str) -> Option<&'a SoapValue> {
    match path.split_once('.') {
        None => object.property(path),
        Some((head, rest)) => match object.property(head)? {
            SoapValue::Object(nested) => lookup(nested, rest),
            _ => None,
        },
    }
}

/// Reads a SOAP object as a record of `entity_type`.
///
/// Properties the field map does not know are ignored. For data extension
/// rows every top-level property is a column, and the columns inside the
/// nested `Keys` object are read as row keys.
///
/// # Errors
///
/// Fails when the entity has no SOAP binding or a text value does not parse
/// as its declared type.
pub fn from_soap(object: &SoapObject, entity_type: EntityType) -> Result<Record, MarshalError> {
    descriptor(entity_type).require(Transport::Soap)?;
    let (record, errors) = from_soap_lenient(object, entity_type);
    first_error(record, errors)
}

/// Lenient [`from_soap`]: values that fail to parse are kept as text and
/// their errors returned next to the record.
pub fn from_soap_lenient(object: &SoapObject, entity_type: EntityType) -> (Record, Vec<MarshalError>) {
    let entity = descriptor(entity_type);
    let mut record = Record::new(entity_type);
    let mut errors = Vec::new();

    if entity.is_open() {
        let keys = entity.soap().and_then(SoapBinding::keys_property);
        for property in &object.properties {
            match &property.value {
                SoapValue::Object(nested) if keys == Some(property.name.as_str()) => {
                    for key in &nested.properties {
                        read_soap_column(key, true, &mut record, &mut errors);
                    }
                }
                _ => read_soap_column(property, false, &mut record, &mut errors),
            }
        }
        return (record, errors);
    }

    for field in entity.fields() {
        let Some(path) = field.internal_name(Transport::Soap) else {
            continue;
        };
        let Some(wire) = lookup(object, path) else {
            continue;
        };
        let name = field.external_name();
        match read_soap_value(name, wire, field.field_type()) {
            Ok(value) => {
                record.insert(name, value);
            }
            Err(error) => {
                if let SoapValue::Text(text) = wire {
                    record.insert(name, text.as_str());
                }
                errors.push(error);
            }
        }
    }
    (record, errors)
}

fn read_soap_column(
    property: &SoapProperty,
    key: bool,
    record: &mut Record,
    errors: &mut Vec<MarshalError>,
) {
    match read_soap_value(&property.name, &property.value, FieldType::String) {
        Ok(value) if key => {
            record.insert_key(property.name.clone(), value);
        }
        Ok(value) => {
            record.insert(property.name.clone(), value);
        }
        Err(error) => errors.push(error),
    }
}

fn read_soap_value(field: &str, wire: &SoapValue, field_type: FieldType) -> Result<Value, MarshalError> {
    match (wire, field_type) {
        (SoapValue::Nil, _) => Ok(Value::Null),
        (SoapValue::Text(text), FieldType::String) => Ok(Value::String(text.clone())),
        (SoapValue::Text(text), field_type) => coerce(field, text, field_type),
        (SoapValue::Integer(number), FieldType::Reference(entity)) => Ok(Value::Reference {
            entity,
            id: number.to_string(),
        }),
        (SoapValue::Integer(number), _) => Ok(Value::Integer(*number)),
        (SoapValue::Boolean(flag), _) => Ok(Value::Boolean(*flag)),
        (SoapValue::DateTime(date), _) => Ok(Value::Date(*date)),
        (SoapValue::Object(_), _) => Err(MarshalError::UnexpectedShape {
            field: field.to_string(),
            expected: "a simple value",
        }),
    }
}

fn coerce(field: &str, text: &str, field_type: FieldType) -> Result<Value, MarshalError> {
    Value::coerce(text, field_type).map_err(|source| MarshalError::Coerce {
        field: field.to_string(),
        source,
    })
}

/// Builds the REST row for `record`.
///
/// Columns stored with [`Record::insert_key`] go to `keys`; everything else
/// to `values`.
/// Values travel as JSON strings, nulls as JSON `null`.
///
/// # Errors
///
/// Fails when the entity has no REST binding or a field has no REST name.
pub fn to_rest(record: &Record) -> Result<RestRow, MarshalError> {
    let entity = descriptor(record.entity_type());
    entity.require(Transport::Rest)?;

    let mut row = RestRow::default();
    for (name, value) in record.iter() {
        let internal = entity.internal_name(name, Transport::Rest)?;
        let json = value.to_text().map_or(JsonValue::Null, JsonValue::String);
        if record.is_key_column(name) {
            row.keys.insert(internal, json);
        } else {
            row.values.insert(internal, json);
        }
    }
    Ok(row)
}

/// Reads a REST row as a record of `entity_type`, merging keys and values.
///
/// # Errors
///
/// Fails when the entity has no REST binding or a value does not parse as
/// its declared type.
pub fn from_rest(row: &RestRow, entity_type: EntityType) -> Result<Record, MarshalError> {
    descriptor(entity_type).require(Transport::Rest)?;
    let (record, errors) = from_rest_lenient(row, entity_type);
    first_error(record, errors)
}

/// Lenient [`from_rest`]: values that fail to parse are kept as text and
/// their errors returned next to the record.
pub fn from_rest_lenient(row: &RestRow, entity_type: EntityType) -> (Record, Vec<MarshalError>) {
    let entity = descriptor(entity_type);
    let mut record = Record::new(entity_type);
    let mut errors = Vec::new();

    read_rest_map(entity, &row.keys, true, &mut record, &mut errors);
    read_rest_map(entity, &row.values, false, &mut record, &mut errors);
    (record, errors)
}

fn read_rest_map(
    entity: &EntityDescriptor,
    map: &Map<String, JsonValue>,
    keys: bool,
    record: &mut Record,
    errors: &mut Vec<MarshalError>,
) {
    for (internal, json) in map {
        let Some((name, field_type)) = rest_field(entity, internal) else {
            tracing::trace!(entity = %entity.entity_type(), field = %internal, "ignoring unmapped REST field");
            continue;
        };

        let value = match rest_text(&name, json) {
            Ok(None) => Value::Null,
            Ok(Some(text)) => match field_type {
                FieldType::String => Value::String(text),
                field_type => coerce(&name, &text, field_type).unwrap_or_else(|error| {
                    errors.push(error);
                    Value::String(text)
                }),
            },
            Err(error) => {
                errors.push(error);
                continue;
            }
        };

        if keys && entity.is_open() {
            record.insert_key(name, value);
        } else {
            record.insert(name, value);
        }
    }
}

/// External name and type of the field spelled `internal` on the REST wire.
fn rest_field(entity: &EntityDescriptor, internal: &str) -> Option<(String, FieldType)> {
    entity
        .fields()
        .iter()
        .find(|field| field.internal_name(Transport::Rest) == Some(internal))
        .map(|field| (field.external_name().to_string(), field.field_type()))
        .or_else(|| entity.is_open().then(|| (internal.to_string(), FieldType::String)))
}

fn rest_text(field: &str, json: &JsonValue) -> Result<Option<String>, MarshalError> {
    match json {
        JsonValue::Null => Ok(None),
        JsonValue::String(text) => Ok(Some(text.clone())),
        JsonValue::Number(number) => Ok(Some(number.to_string())),
        JsonValue::Bool(flag) => Ok(Some(flag.to_string())),
        JsonValue::Array(_) | JsonValue::Object(_) => Err(MarshalError::UnexpectedShape {
            field: field.to_string(),
            expected: "a scalar",
        }),
    }
}

fn first_error(record: Record, errors: Vec<MarshalError>) -> Result<Record, MarshalError> {
    match errors.into_iter().next() {
        Some(error) => Err(error),
        None => Ok(record),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn send() -> Record {
        Record::new(EntityType::Send)
            .with("id", "42")
            .with("subject", "Spring sale")
            .with("sendDate", Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap())
            .with(
                "email",
                Value::Reference {
                    entity: EntityType::Email,
                    id: "1234".to_string(),
                },
            )
    }

    fn row(value: JsonValue) -> RestRow {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_send_soap_round_trip() {
        let record = send();
        let wire = to_wire(&record, Transport::Soap).unwrap();
        assert_eq!(wire.transport(), Transport::Soap);
        assert_eq!(from_wire(&wire, EntityType::Send).unwrap(), record);
    }

    #[test]
    fn test_to_soap_builds_nested_objects() {
        let object = to_soap(&send()).unwrap();
        assert_eq!(object.object_type, "Send");
        assert_eq!(object.property("ID"), Some(&SoapValue::Text("42".to_string())));

        let Some(SoapValue::Object(email)) = object.property("Email") else {
            panic!("missing nested Email object");
        };
        assert_eq!(email.object_type, "Email");
        assert_eq!(email.property("ID"), Some(&SoapValue::Text("1234".to_string())));
    }

    #[test]
    fn test_to_soap_shares_nested_object() {
        let record = Record::new(EntityType::DataExtensionColumn)
            .with("name", "FirstName")
            .with("dataExtensionKey", "DE-1");
        let object = to_soap(&record).unwrap();
        let Some(SoapValue::Object(extension)) = object.property("DataExtension") else {
            panic!("missing nested DataExtension object");
        };
        assert_eq!(
            extension.property("CustomerKey"),
            Some(&SoapValue::Text("DE-1".to_string()))
        );
    }

    #[test]
    fn test_to_soap_requires_required_fields() {
        let record = Record::new(EntityType::DataExtension).with("key", "DE-1");
        assert_eq!(
            to_soap(&record),
            Err(MarshalError::MissingRequired {
                entity: EntityType::DataExtension,
                field: "name".to_string(),
            })
        );

        let record = record.with("name", Value::Null);
        assert!(matches!(
            to_soap(&record),
            Err(MarshalError::MissingRequired { .. })
        ));
    }

    #[test]
    fn test_to_soap_rejects_column_list() {
        let record = Record::new(EntityType::DataExtension)
            .with("name", "Subscribers")
            .with("columns", "FirstName,Email");
        assert_eq!(
            to_soap(&record),
            Err(MarshalError::NotWritable {
                entity: EntityType::DataExtension,
                field: "columns".to_string(),
            })
        );
    }

    #[test]
    fn test_to_soap_rejects_unknown_field() {
        let record = Record::new(EntityType::Email).with("sender", "x");
        assert!(matches!(
            to_soap(&record),
            Err(MarshalError::Configuration(
                ConfigurationError::UnknownField { .. }
            ))
        ));
    }

    #[test]
    fn test_from_soap_ignores_unknown_properties() {
        let object = SoapObject::new("Email")
            .with("ID", SoapValue::Integer(7))
            .with("Name", SoapValue::Text("Welcome".to_string()))
            .with("HTMLBody", SoapValue::Text("<p>hi</p>".to_string()));
        let record = from_soap(&object, EntityType::Email).unwrap();
        assert_eq!(record.len(), 2);
        assert_eq!(record.get("id"), Some(&Value::Integer(7)));
        assert_eq!(record.get("name"), Some(&Value::String("Welcome".to_string())));
    }

    #[test]
    fn test_from_soap_coerces_text_and_nil() {
        let object = SoapObject::new("DataExtension")
            .with("CategoryID", SoapValue::Text("12".to_string()))
            .with("IsSendable", SoapValue::Text("true".to_string()))
            .with("Description", SoapValue::Nil);
        let record = from_soap(&object, EntityType::DataExtension).unwrap();
        assert_eq!(record.get("folderId"), Some(&Value::Integer(12)));
        assert_eq!(record.get("isSendable"), Some(&Value::Boolean(true)));
        assert_eq!(record.get("description"), Some(&Value::Null));
    }

    #[test]
    fn test_from_soap_lenient_keeps_raw_text() {
        let object = SoapObject::new("DataExtension").with("CategoryID", SoapValue::Text("n/a".to_string()));
        let (record, errors) = from_soap_lenient(&object, EntityType::DataExtension);
        assert_eq!(record.get("folderId"), Some(&Value::String("n/a".to_string())));
        assert_eq!(errors.len(), 1);
        assert!(matches!(from_soap(&object, EntityType::DataExtension), Err(MarshalError::Coerce { .. })));
    }

    #[test]
    fn test_from_soap_row_reads_every_column() {
        let object = SoapObject::new("DataExtensionObject")
            .with("FirstName", SoapValue::Text("Bob".to_string()))
            .with("Age", SoapValue::Integer(30));
        let record = from_soap(&object, EntityType::DataExtensionRow).unwrap();
        assert_eq!(record.get("FirstName"), Some(&Value::String("Bob".to_string())));
        assert_eq!(record.get("Age"), Some(&Value::Integer(30)));
    }

    #[test]
    fn test_row_rest_round_trip() {
        let record = Record::new(EntityType::DataExtensionRow)
            .with_key("id", "1")
            .with("name", "Bob")
            .with("nickname", Value::Null);
        let wire = to_wire(&record, Transport::Rest).unwrap();
        assert_eq!(from_wire(&wire, EntityType::DataExtensionRow).unwrap(), record);
    }

    #[test]
    fn test_row_soap_round_trip() {
        let record = Record::new(EntityType::DataExtensionRow)
            .with_key("id", "1")
            .with("name", "Bob")
            .with("nickname", Value::Null);
        let wire = to_wire(&record, Transport::Soap).unwrap();
        assert_eq!(from_wire(&wire, EntityType::DataExtensionRow).unwrap(), record);
    }

    #[test]
    fn test_row_reads_the_same_over_both_wires() {
        let record = Record::new(EntityType::DataExtensionRow)
            .with_key("id", "1")
            .with("name", "Bob");
        let soap = to_wire(&record, Transport::Soap).unwrap();
        let rest = to_wire(&record, Transport::Rest).unwrap();
        assert_eq!(
            from_wire(&soap, EntityType::DataExtensionRow).unwrap(),
            from_wire(&rest, EntityType::DataExtensionRow).unwrap()
        );
    }

    #[test]
    fn test_to_soap_nests_row_keys() {
        let record = Record::new(EntityType::DataExtensionRow)
            .with_key("id", "1")
            .with("name", "Bob");
        let object = to_soap(&record).unwrap();
        assert_eq!(object.object_type, "DataExtensionObject");
        assert_eq!(object.property("id"), None);
        assert_eq!(object.property("name"), Some(&SoapValue::Text("Bob".to_string())));

        let Some(SoapValue::Object(keys)) = object.property("Keys") else {
            panic!("missing nested Keys object");
        };
        assert_eq!(keys.property("id"), Some(&SoapValue::Text("1".to_string())));
    }

    #[test]
    fn test_to_rest_splits_keys_and_values() {
        let record = Record::new(EntityType::DataExtensionRow)
            .with_key("id", "1")
            .with("name", "Bob");
        let row = to_rest(&record).unwrap();
        assert_eq!(
            serde_json::to_value(&row).unwrap(),
            json!({"keys": {"id": "1"}, "values": {"name": "Bob"}})
        );
    }

    #[test]
    fn test_from_rest_merges_keys_and_values() {
        let row = row(json!({"keys": {"id": "1"}, "values": {"name": "Bob"}}));
        let record = from_rest(&row, EntityType::DataExtensionRow).unwrap();
        assert_eq!(record.get("id"), Some(&Value::String("1".to_string())));
        assert_eq!(record.get("name"), Some(&Value::String("Bob".to_string())));
        assert!(record.is_key_column("id"));
        assert_eq!(record.len(), 2);
    }

    #[test]
    fn test_from_rest_stringifies_scalars() {
        let row = row(json!({"keys": {}, "values": {"age": 30, "active": true, "gone": null}}));
        let record = from_rest(&row, EntityType::DataExtensionRow).unwrap();
        assert_eq!(record.get("age"), Some(&Value::String("30".to_string())));
        assert_eq!(record.get("active"), Some(&Value::String("true".to_string())));
        assert_eq!(record.get("gone"), Some(&Value::Null));
    }

    #[test]
    fn test_from_rest_lenient_reports_nested_values() {
        let row = row(json!({"values": {"name": "Bob", "tags": ["a"]}}));
        let (record, errors) = from_rest_lenient(&row, EntityType::DataExtensionRow);
        assert_eq!(record.len(), 1);
        assert_eq!(
            errors,
            vec![MarshalError::UnexpectedShape {
                field: "tags".to_string(),
                expected: "a scalar",
            }]
        );
    }

    #[test]
    fn test_rest_requires_binding() {
        assert!(matches!(
            to_rest(&send()),
            Err(MarshalError::Configuration(
                ConfigurationError::UnsupportedTransport { .. }
            ))
        ));
        assert!(from_rest(&RestRow::default(), EntityType::Send).is_err());
    }
}
