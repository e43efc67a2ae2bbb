//! Field maps for the entity types exposed by the SDK.
//!
//! Every entity type has exactly one [`EntityDescriptor`]. It lists the
//! caller-facing (external) field names, how each one is spelled on the SOAP
//! and REST wires, the declared value type, and which transports the entity
//! can be retrieved over. Descriptors are built on first use and shared for
//! the lifetime of the process; nothing mutates them afterwards, so lookups
//! need no synchronisation.
//!
//! # Example
//!
//! ```
//! use exacttarget_core::mapping::{self, EntityType, Transport};
//!
//! let field = mapping::resolve(EntityType::DataExtension, "folderId").unwrap();
//! assert_eq!(field.internal_name(Transport::Soap), Some("CategoryID"));
//! ```

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

/// Wire protocol used to talk to the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    /// The SOAP web service API.
    Soap,
    /// The newer JSON REST API.
    Rest,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Soap => f.write_str("SOAP"),
            Transport::Rest => f.write_str("REST"),
        }
    }
}

/// Entity types with a registered field map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityType {
    /// A data extension definition.
    DataExtension,
    /// One column of a data extension.
    DataExtensionColumn,
    /// One row of a data extension. Columns are defined per extension.
    DataExtensionRow,
    /// An email definition.
    Email,
    /// An email send.
    Send,
}

impl EntityType {
    /// Every registered entity type.
    pub const ALL: [EntityType; 5] = [
        EntityType::DataExtension,
        EntityType::DataExtensionColumn,
        EntityType::DataExtensionRow,
        EntityType::Email,
        EntityType::Send,
    ];

    /// Caller-facing name of the entity type.
    pub fn name(&self) -> &'static str {
        match self {
            EntityType::DataExtension => "DataExtension",
            EntityType::DataExtensionColumn => "DataExtensionColumn",
            EntityType::DataExtensionRow => "DataExtensionRow",
            EntityType::Email => "Email",
            EntityType::Send => "Send",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Declared value type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Integer,
    Boolean,
    Date,
    /// Identifier of another entity.
    Reference(EntityType),
    /// Nested list of records of another entity.
    Collection(EntityType),
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::String => f.write_str("string"),
            FieldType::Integer => f.write_str("integer"),
            FieldType::Boolean => f.write_str("boolean"),
            FieldType::Date => f.write_str("date"),
            FieldType::Reference(entity) => write!(f, "reference to {entity}"),
            FieldType::Collection(entity) => write!(f, "list of {entity}"),
        }
    }
}

/// Mapping of one external field name to its wire names and type.
///
/// SOAP names may be dotted paths (`Email.ID`); the marshaller treats each
/// segment as one level of nested object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    external: Cow<'static, str>,
    soap: Option<Cow<'static, str>>,
    rest: Option<Cow<'static, str>>,
    field_type: FieldType,
}

impl FieldDescriptor {
    /// Creates a SOAP-only field whose SOAP name equals its external name.
    pub fn new(external: &'static str, field_type: FieldType) -> Self {
        Self {
            external: Cow::Borrowed(external),
            soap: Some(Cow::Borrowed(external)),
            rest: None,
            field_type,
        }
    }

    /// Creates the descriptor of a column declared at runtime.
    ///
    /// Columns of open entities are untyped text and keep the same name on
    /// every transport.
    pub fn column(name: &str) -> Self {
        let name: Cow<'static, str> = Cow::Owned(name.to_string());
        Self {
            soap: Some(name.clone()),
            rest: Some(name.clone()),
            external: name,
            field_type: FieldType::String,
        }
    }

    /// Sets the SOAP element name or path.
    pub fn soap(mut self, internal: &'static str) -> Self {
        self.soap = Some(Cow::Borrowed(internal));
        self
    }

    /// Stable caller-facing name.
    pub fn external_name(&self) -> &str {
        &self.external
    }

    /// Name used on `transport`, if the field exists there.
    pub fn internal_name(&self, transport: Transport) -> Option<&str> {
        match transport {
            Transport::Soap => self.soap.as_deref(),
            Transport::Rest => self.rest.as_deref(),
        }
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }
}

/// SOAP-specific part of an entity descriptor.
#[derive(Debug, Clone)]
pub struct SoapBinding {
    object_type: &'static str,
    qualified: bool,
    keys: Option<&'static str>,
    unretrievable: Vec<&'static str>,
    required: Vec<&'static str>,
}

impl SoapBinding {
    fn new(object_type: &'static str) -> Self {
        Self {
            object_type,
            qualified: false,
            keys: None,
            unretrievable: Vec::new(),
            required: Vec::new(),
        }
    }

    /// The object type is suffixed with `[name]` of the owning extension.
    fn qualified(mut self) -> Self {
        self.qualified = true;
        self
    }

    /// Row key columns travel inside a nested object called `property`.
    fn keys(mut self, property: &'static str) -> Self {
        self.keys = Some(property);
        self
    }

    fn unretrievable(mut self, fields: &[&'static str]) -> Self {
        self.unretrievable = fields.to_vec();
        self
    }

    fn required(mut self, fields: &[&'static str]) -> Self {
        self.required = fields.to_vec();
        self
    }

    /// Bare SOAP object type name.
    pub fn object_type(&self) -> &'static str {
        self.object_type
    }

    /// Property holding the key columns of a row, for open entities.
    pub fn keys_property(&self) -> Option<&'static str> {
        self.keys
    }

    /// Object type string for a `Retrieve` call.
    pub fn retrieve_object_type(&self, extension_name: Option<&str>) -> Option<String> {
        match (self.qualified, extension_name) {
            (false, _) => Some(self.object_type.to_string()),
            (true, Some(name)) => Some(format!("{}[{}]", self.object_type, name)),
            (true, None) => None,
        }
    }

    /// External names of write-only fields.
    pub fn unretrievable_fields(&self) -> &[&'static str] {
        &self.unretrievable
    }

    /// External names of fields that must be present when writing.
    pub fn required_fields(&self) -> &[&'static str] {
        &self.required
    }
}

/// REST-specific part of an entity descriptor.
#[derive(Debug, Clone)]
pub struct RestBinding {
    path: &'static str,
}

impl RestBinding {
    /// Collection path; `{key}` stands for the owning extension's key.
    pub fn path(&self) -> &'static str {
        self.path
    }
}

/// Immutable description of one entity type.
#[derive(Debug)]
pub struct EntityDescriptor {
    entity_type: EntityType,
    fields: Vec<FieldDescriptor>,
    index: HashMap<String, usize>,
    soap: Option<SoapBinding>,
    rest: Option<RestBinding>,
    open: bool,
}

impl EntityDescriptor {
    fn new(entity_type: EntityType, fields: Vec<FieldDescriptor>) -> Self {
        let index = fields
            .iter()
            .enumerate()
            .map(|(position, field)| (field.external_name().to_string(), position))
            .collect();
        Self {
            entity_type,
            fields,
            index,
            soap: None,
            rest: None,
            open: false,
        }
    }

    fn with_soap(mut self, binding: SoapBinding) -> Self {
        self.soap = Some(binding);
        self
    }

    fn with_rest(mut self, path: &'static str) -> Self {
        self.rest = Some(RestBinding { path });
        self
    }

    fn open(mut self) -> Self {
        self.open = true;
        self
    }

    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    /// Declared fields in declaration order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Whether columns beyond the declared fields are accepted.
    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn soap(&self) -> Option<&SoapBinding> {
        self.soap.as_ref()
    }

    pub fn rest(&self) -> Option<&RestBinding> {
        self.rest.as_ref()
    }

    pub fn supports(&self, transport: Transport) -> bool {
        match transport {
            Transport::Soap => self.soap.is_some(),
            Transport::Rest => self.rest.is_some(),
        }
    }

    /// Fails unless the entity can be exchanged over `transport`.
    pub fn require(&self, transport: Transport) -> Result<(), ConfigurationError> {
        if self.supports(transport) {
            Ok(())
        } else {
            Err(ConfigurationError::UnsupportedTransport {
                entity: self.entity_type,
                transport,
            })
        }
    }

    /// Looks up a field by its exact, case-sensitive external name.
    ///
    /// Open entities resolve any name that is not declared to a runtime
    /// column descriptor.
    pub fn resolve(&self, external: &str) -> Option<Cow<'_, FieldDescriptor>> {
        match self.index.get(external) {
            Some(&position) => self.fields.get(position).map(Cow::Borrowed),
            None if self.open => Some(Cow::Owned(FieldDescriptor::column(external))),
            None => None,
        }
    }

    /// Like [`resolve`](Self::resolve) but reports a missing mapping.
    pub fn field(&self, external: &str) -> Result<Cow<'_, FieldDescriptor>, ConfigurationError> {
        self.resolve(external)
            .ok_or_else(|| ConfigurationError::UnknownField {
                entity: self.entity_type,
                field: external.to_string(),
            })
    }

    /// Resolves `external` and returns its name on `transport`.
    pub fn internal_name(
        &self,
        external: &str,
        transport: Transport,
    ) -> Result<String, ConfigurationError> {
        let field = self.field(external)?;
        field
            .internal_name(transport)
            .map(str::to_string)
            .ok_or_else(|| ConfigurationError::NoInternalName {
                entity: self.entity_type,
                field: external.to_string(),
                transport,
            })
    }

    /// Whether `external` can appear in a SOAP retrieve property list.
    pub fn is_retrievable(&self, external: &str) -> bool {
        self.soap
            .as_ref()
            .is_none_or(|soap| !soap.unretrievable.contains(&external))
    }

    /// Declared fields a SOAP retrieval may request, in declaration order.
    pub fn retrievable_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|field| {
            field.internal_name(Transport::Soap).is_some()
                && self.is_retrievable(field.external_name())
        })
    }
}

/// Errors caused by a request the field maps cannot satisfy.
///
/// These are programming or configuration mistakes; retrying never helps.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// The entity has no field with this external name.
    #[error("{entity} has no field named '{field}'")]
    UnknownField {
        entity: EntityType,
        field: String,
    },
    /// The field exists but has no name on the selected transport.
    #[error("{entity} field '{field}' is not available over {transport}")]
    NoInternalName {
        entity: EntityType,
        field: String,
        transport: Transport,
    },
    /// The entity cannot be exchanged over the selected transport.
    #[error("{entity} is not supported over {transport}")]
    UnsupportedTransport {
        entity: EntityType,
        transport: Transport,
    },
    /// The filter uses an operator the transport has no token for.
    #[error("operator '{operator}' is not supported over {transport}")]
    UnsupportedOperator {
        operator: String,
        transport: Transport,
    },
    /// A retrieval of extension rows is missing the extension name or key.
    #[error("retrieving {entity} over {transport} requires the data extension {attribute}")]
    MissingTarget {
        entity: EntityType,
        transport: Transport,
        attribute: &'static str,
    },
    /// A write-only field was requested in a retrieval.
    #[error("{entity} field '{field}' cannot be retrieved")]
    NotRetrievable {
        entity: EntityType,
        field: String,
    },
}

const ROWSET_PATH: &str = "/data/v1/customobjectdata/key/{key}/rowset";

fn data_extension() -> EntityDescriptor {
    use FieldType::*;
    EntityDescriptor::new(
        EntityType::DataExtension,
        vec![
            FieldDescriptor::new("id", String).soap("ObjectID"),
            FieldDescriptor::new("key", String).soap("CustomerKey"),
            FieldDescriptor::new("name", String).soap("Name"),
            FieldDescriptor::new("description", String).soap("Description"),
            FieldDescriptor::new("folderId", Integer).soap("CategoryID"),
            FieldDescriptor::new("isSendable", Boolean).soap("IsSendable"),
            FieldDescriptor::new("isTestable", Boolean).soap("IsTestable"),
            FieldDescriptor::new("columns", Collection(EntityType::DataExtensionColumn)).soap("Fields"),
        ],
    )
    .with_soap(
        SoapBinding::new("DataExtension")
            .unretrievable(&["id", "columns"])
            .required(&["name"]),
    )
}

fn data_extension_column() -> EntityDescriptor {
    use FieldType::*;
    EntityDescriptor::new(
        EntityType::DataExtensionColumn,
        vec![
            FieldDescriptor::new("id", String).soap("ObjectID"),
            FieldDescriptor::new("key", String).soap("CustomerKey"),
            FieldDescriptor::new("name", String).soap("Name"),
            FieldDescriptor::new("type", String).soap("FieldType"),
            FieldDescriptor::new("defaultValue", String).soap("DefaultValue"),
            FieldDescriptor::new("length", Integer).soap("MaxLength"),
            FieldDescriptor::new("ordinal", Integer).soap("Ordinal"),
            FieldDescriptor::new("isPrimaryKey", Boolean).soap("IsPrimaryKey"),
            FieldDescriptor::new("isRequired", Boolean).soap("IsRequired"),
            FieldDescriptor::new("dataExtensionKey", String).soap("DataExtension.CustomerKey"),
        ],
    )
    .with_soap(SoapBinding::new("DataExtensionField").required(&["name"]))
}

fn data_extension_row() -> EntityDescriptor {
    EntityDescriptor::new(EntityType::DataExtensionRow, Vec::new())
        .with_soap(SoapBinding::new("DataExtensionObject").qualified().keys("Keys"))
        .with_rest(ROWSET_PATH)
        .open()
}

fn email() -> EntityDescriptor {
    use FieldType::*;
    EntityDescriptor::new(
        EntityType::Email,
        vec![
            FieldDescriptor::new("id", Integer).soap("ID"),
            FieldDescriptor::new("key", String).soap("CustomerKey"),
            FieldDescriptor::new("name", String).soap("Name"),
            FieldDescriptor::new("subject", String).soap("Subject"),
            FieldDescriptor::new("folderId", Integer).soap("CategoryID"),
        ],
    )
    .with_soap(SoapBinding::new("Email"))
}

fn send() -> EntityDescriptor {
    use FieldType::*;
    EntityDescriptor::new(
        EntityType::Send,
        vec![
            FieldDescriptor::new("id", String).soap("ID"),
            FieldDescriptor::new("subject", String).soap("Subject"),
            FieldDescriptor::new("sendDate", Date).soap("SendDate"),
            FieldDescriptor::new("emailName", String).soap("EmailName"),
            FieldDescriptor::new("previewURL", String).soap("PreviewURL"),
            FieldDescriptor::new("email", Reference(EntityType::Email)).soap("Email.ID"),
        ],
    )
    .with_soap(SoapBinding::new("Send"))
}

static DATA_EXTENSION: LazyLock<EntityDescriptor> = LazyLock::new(data_extension);
static DATA_EXTENSION_COLUMN: LazyLock<EntityDescriptor> = LazyLock::new(data_extension_column);
static DATA_EXTENSION_ROW: LazyLock<EntityDescriptor> = LazyLock::new(data_extension_row);
static EMAIL: LazyLock<EntityDescriptor> = LazyLock::new(email);
static SEND: LazyLock<EntityDescriptor> = LazyLock::new(send);

/// Returns the registered descriptor of `entity_type`.
pub fn descriptor(entity_type: EntityType) -> &'static EntityDescriptor {
    match entity_type {
        EntityType::DataExtension => &*DATA_EXTENSION,
        EntityType::DataExtensionColumn => &*DATA_EXTENSION_COLUMN,
        EntityType::DataExtensionRow => &*DATA_EXTENSION_ROW,
        EntityType::Email => &*EMAIL,
        EntityType::Send => &*SEND,
    }
}

/// Resolves an external field name of `entity_type`.
///
/// # Errors
///
/// Returns [`ConfigurationError::UnknownField`] when the entity has no such
/// field and does not accept runtime columns.
pub fn resolve(
    entity_type: EntityType,
    external: &str,
) -> Result<Cow<'static, FieldDescriptor>, ConfigurationError> {
    descriptor(entity_type).field(external)
}

/// Declared fields of `entity_type` in declaration order.
pub fn all_fields(entity_type: EntityType) -> &'static [FieldDescriptor] {
    descriptor(entity_type).fields()
}
