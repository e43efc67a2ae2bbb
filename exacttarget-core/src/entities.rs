//! Typed views over records whose shape the SDK itself depends on.

use crate::mapping::EntityType;
use crate::marshal::MarshalError;
use crate::record::{Record, Value};

/// Column metadata of a data extension.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DataExtensionColumn {
    pub id: Option<String>,
    pub key: Option<String>,
    pub name: String,
    /// Platform type name, e.g. `Text` or `EmailAddress`.
    pub field_type: Option<String>,
    pub default_value: Option<String>,
    pub length: Option<i64>,
    pub ordinal: Option<i64>,
    pub is_primary_key: bool,
    pub is_required: bool,
    /// Key of the owning data extension.
    pub data_extension_key: Option<String>,
}

impl TryFrom<&Record> for DataExtensionColumn {
    type Error = MarshalError;

    fn try_from(record: &Record) -> Result<Self, Self::Error> {
        if record.entity_type() != EntityType::DataExtensionColumn {
            return Err(MarshalError::WrongEntity {
                expected: EntityType::DataExtensionColumn,
                found: record.entity_type(),
            });
        }

        let text = |name: &str| record.get(name).and_then(Value::to_text);
        let flag = |name: &str| record.get(name).and_then(Value::as_bool).unwrap_or(false);

        Ok(Self {
            id: text("id"),
            key: text("key"),
            name: text("name").ok_or_else(|| MarshalError::MissingRequired {
                entity: EntityType::DataExtensionColumn,
                field: "name".to_string(),
            })?,
            field_type: text("type"),
            default_value: text("defaultValue"),
            length: record.get("length").and_then(Value::as_i64),
            ordinal: record.get("ordinal").and_then(Value::as_i64),
            is_primary_key: flag("isPrimaryKey"),
            is_required: flag("isRequired"),
            data_extension_key: text("dataExtensionKey"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_from_record() {
        let record = Record::new(EntityType::DataExtensionColumn)
            .with("name", "Email")
            .with("type", "EmailAddress")
            .with("length", 254_i64)
            .with("ordinal", 2_i64)
            .with("isPrimaryKey", true)
            .with("defaultValue", Value::Null)
            .with("dataExtensionKey", "DE-1");

        let column = DataExtensionColumn::try_from(&record).unwrap();
        assert_eq!(
            column,
            DataExtensionColumn {
                name: "Email".to_string(),
                field_type: Some("EmailAddress".to_string()),
                length: Some(254),
                ordinal: Some(2),
                is_primary_key: true,
                data_extension_key: Some("DE-1".to_string()),
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_column_requires_name() {
        let record = Record::new(EntityType::DataExtensionColumn).with("type", "Text");
        assert!(matches!(
            DataExtensionColumn::try_from(&record),
            Err(MarshalError::MissingRequired { .. })
        ));
    }

    #[test]
    fn test_column_rejects_other_entities() {
        let record = Record::new(EntityType::Email).with("name", "Welcome");
        assert_eq!(
            DataExtensionColumn::try_from(&record),
            Err(MarshalError::WrongEntity {
                expected: EntityType::DataExtensionColumn,
                found: EntityType::Email,
            })
        );
    }
}
