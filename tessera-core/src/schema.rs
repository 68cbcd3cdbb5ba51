//! Runtime object-type descriptors and the schema registry
//!
//! Object types are not compiled into the crate: they are described at
//! runtime by `ObjectTypeDescriptor` values, loaded once per process into a
//! registry and shared read-only. Every component that needs to know a field's
//! kind or storage column asks the registry instead of inspecting values.

use crate::error::SchemaError;
use crate::identity::PRIMARY_KEY_FIELD;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Sub-fields of the currency composite.
pub const CURRENCY_SUB_FIELDS: &[&str] = &["amountMicros", "currencyCode"];
/// Sub-fields of the full-name composite.
pub const FULL_NAME_SUB_FIELDS: &[&str] = &["firstName", "lastName"];
/// Sub-fields of the links composite.
pub const LINKS_SUB_FIELDS: &[&str] = &["primaryLinkUrl", "primaryLinkLabel"];

/// Relation cardinality as seen from the owning object type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationKind {
    /// This object stores the foreign key in `join_column`.
    ManyToOne { target: String, join_column: String },
    /// The target object stores a foreign key back to this one.
    OneToMany {
        target: String,
        inverse_join_column: String,
    },
}

impl RelationKind {
    pub fn target(&self) -> &str {
        match self {
            Self::ManyToOne { target, .. } | Self::OneToMany { target, .. } => target,
        }
    }
}

/// Kind of a field, deciding its storage layout and value coercion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    Uuid,
    Text,
    Number,
    Boolean,
    DateTime,
    Select { options: Vec<String> },
    MultiSelect { options: Vec<String> },
    RawJson,
    Currency,
    FullName,
    Links,
    Relation(RelationKind),
}

impl FieldKind {
    /// Sub-fields for composite kinds.
    pub fn composite_sub_fields(&self) -> Option<&'static [&'static str]> {
        match self {
            Self::Currency => Some(CURRENCY_SUB_FIELDS),
            Self::FullName => Some(FULL_NAME_SUB_FIELDS),
            Self::Links => Some(LINKS_SUB_FIELDS),
            _ => None,
        }
    }

    pub fn is_composite(&self) -> bool {
        self.composite_sub_fields().is_some()
    }

    pub fn relation(&self) -> Option<&RelationKind> {
        match self {
            Self::Relation(kind) => Some(kind),
            _ => None,
        }
    }

    /// Kind of a composite sub-field's column.
    pub fn sub_field_kind(&self, sub_field: &str) -> Option<FieldKind> {
        match (self, sub_field) {
            (Self::Currency, "amountMicros") => Some(Self::Number),
            (Self::Currency, "currencyCode")
            | (Self::FullName, "firstName" | "lastName")
            | (Self::Links, "primaryLinkUrl" | "primaryLinkLabel") => Some(Self::Text),
            _ => None,
        }
    }
}

/// Storage column for a composite sub-field: `amount` + `amountMicros` ->
/// `amountAmountMicros`.
pub fn composite_column(field: &str, sub_field: &str) -> String {
    let mut chars = sub_field.chars();
    match chars.next() {
        Some(first) => format!("{}{}{}", field, first.to_uppercase(), chars.as_str()),
        None => field.to_string(),
    }
}

/// One field on an object type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: FieldKind,
    pub nullable: bool,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: true,
        }
    }

    pub fn uuid(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Uuid)
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Text)
    }

    pub fn number(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Number)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Boolean)
    }

    pub fn date_time(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::DateTime)
    }

    pub fn select<I, S>(name: impl Into<String>, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            name,
            FieldKind::Select {
                options: options.into_iter().map(Into::into).collect(),
            },
        )
    }

    pub fn multi_select<I, S>(name: impl Into<String>, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            name,
            FieldKind::MultiSelect {
                options: options.into_iter().map(Into::into).collect(),
            },
        )
    }

    pub fn raw_json(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::RawJson)
    }

    pub fn currency(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Currency)
    }

    pub fn full_name(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::FullName)
    }

    pub fn links(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Links)
    }

    /// Many-to-one relation whose foreign key lives in `<name>Id`.
    pub fn many_to_one(name: impl Into<String>, target: impl Into<String>) -> Self {
        let name = name.into();
        let join_column = format!("{}Id", name);
        Self::new(
            name,
            FieldKind::Relation(RelationKind::ManyToOne {
                target: target.into(),
                join_column,
            }),
        )
    }

    pub fn one_to_many(
        name: impl Into<String>,
        target: impl Into<String>,
        inverse_join_column: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            FieldKind::Relation(RelationKind::OneToMany {
                target: target.into(),
                inverse_join_column: inverse_join_column.into(),
            }),
        )
    }

    pub fn required(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Storage columns backing this field, in declaration order.
    pub fn storage_columns(&self) -> Vec<String> {
        if let Some(sub_fields) = self.kind.composite_sub_fields() {
            return sub_fields
                .iter()
                .map(|sub| composite_column(&self.name, sub))
                .collect();
        }
        match &self.kind {
            FieldKind::Relation(RelationKind::ManyToOne { join_column, .. }) => {
                vec![join_column.clone()]
            }
            FieldKind::Relation(RelationKind::OneToMany { .. }) => Vec::new(),
            _ => vec![self.name.clone()],
        }
    }
}

/// Runtime description of an object type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectTypeDescriptor {
    pub name_singular: String,
    pub name_plural: String,
    pub table_name: String,
    pub is_custom: bool,
    /// Remote/virtual object types are read-only.
    pub is_remote: bool,
    pub fields: Vec<FieldDescriptor>,
}

impl ObjectTypeDescriptor {
    /// New core object type stored in a table named after the singular name,
    /// with the `id` primary key already declared.
    pub fn new(name_singular: impl Into<String>, name_plural: impl Into<String>) -> Self {
        let name_singular = name_singular.into();
        Self {
            table_name: name_singular.clone(),
            name_singular,
            name_plural: name_plural.into(),
            is_custom: false,
            is_remote: false,
            fields: vec![FieldDescriptor::uuid(PRIMARY_KEY_FIELD).required()],
        }
    }

    pub fn with_table(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = table_name.into();
        self
    }

    pub fn custom(mut self) -> Self {
        self.is_custom = true;
        self
    }

    pub fn remote(mut self) -> Self {
        self.is_remote = true;
        self
    }

    pub fn with_field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn is_writable(&self) -> bool {
        !self.is_remote
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// The many-to-one field whose foreign key is stored in `column`.
    pub fn field_by_join_column(&self, column: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| {
            matches!(
                &f.kind,
                FieldKind::Relation(RelationKind::ManyToOne { join_column, .. }) if join_column == column
            )
        })
    }

    /// All storage columns of the table.
    pub fn storage_columns(&self) -> Vec<String> {
        self.fields
            .iter()
            .flat_map(FieldDescriptor::storage_columns)
            .collect()
    }

    pub fn relation_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| f.kind.relation().is_some())
    }
}

/// Process-wide lookup of object types by name.
pub trait SchemaRegistry: Send + Sync {
    /// Look up an object type by singular name.
    fn lookup(&self, name: &str) -> Option<Arc<ObjectTypeDescriptor>>;

    /// Look up an object type, failing if it is not registered.
    fn require(&self, name: &str) -> Result<Arc<ObjectTypeDescriptor>, SchemaError> {
        self.lookup(name).ok_or_else(|| SchemaError::ObjectTypeNotFound {
            name: name.to_string(),
        })
    }
}

/// Immutable registry built once from a list of descriptors.
#[derive(Debug, Clone, Default)]
pub struct InMemorySchemaRegistry {
    by_name: HashMap<String, Arc<ObjectTypeDescriptor>>,
}

impl InMemorySchemaRegistry {
    /// Build a registry, checking for duplicates and dangling relation targets.
    pub fn from_descriptors(
        descriptors: impl IntoIterator<Item = ObjectTypeDescriptor>,
    ) -> Result<Self, SchemaError> {
        let mut by_name = HashMap::new();
        for descriptor in descriptors {
            let name = descriptor.name_singular.clone();
            if by_name.contains_key(&name) {
                return Err(SchemaError::DuplicateObjectType { name });
            }
            by_name.insert(name, Arc::new(descriptor));
        }

        for descriptor in by_name.values() {
            for field in descriptor.relation_fields() {
                let target = field.kind.relation().map(RelationKind::target).unwrap_or_default();
                if !by_name.contains_key(target) {
                    return Err(SchemaError::UnknownRelationTarget {
                        object_type: descriptor.name_singular.clone(),
                        field: field.name.clone(),
                        target: target.to_string(),
                    });
                }
            }
        }

        Ok(Self { by_name })
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

impl SchemaRegistry for InMemorySchemaRegistry {
    fn lookup(&self, name: &str) -> Option<Arc<ObjectTypeDescriptor>> {
        self.by_name.get(name).cloned()
    }
}
