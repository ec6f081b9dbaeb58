//! Primary-key schemas and the collaborator that resolves them.

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::value::{KeyValueMap, Record};

/// Role a field plays in a table's primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeyRole {
    /// Partition (hash) key. Every schema has exactly one.
    #[serde(alias = "HASH")]
    Partition,
    /// Sort (range) key. Optional.
    #[serde(alias = "RANGE")]
    Sort,
}

/// One field of a [`KeySchema`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeySchemaElement {
    /// Name of the key field.
    pub attribute_name: String,
    /// Role of the key field.
    pub role: KeyRole,
}

impl KeySchemaElement {
    /// Shorthand constructor.
    pub fn new(attribute_name: impl Into<String>, role: KeyRole) -> Self {
        Self {
            attribute_name: attribute_name.into(),
            role,
        }
    }
}

/// Violations of the key schema shape, or of a record against it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeySchemaError {
    /// The schema lists no fields.
    #[error("key schema is empty")]
    Empty,
    /// No field has the partition role.
    #[error("key schema has no partition field")]
    MissingPartition,
    /// More than one field has the same role.
    #[error("key schema has more than one {0:?} field")]
    DuplicateRole(KeyRole),
    /// The same field name appears twice.
    #[error("key schema lists field `{0}` more than once")]
    DuplicateField(String),
    /// A record does not populate one of the key fields.
    #[error("key field `{0}` is missing")]
    MissingField(String),
}

/// Ordered primary-key fields of a table: exactly one partition field and at most
/// one sort field. Only constructible in a valid state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(
    try_from = "Vec<KeySchemaElement>",
    into = "Vec<KeySchemaElement>"
)]
pub struct KeySchema {
    elements: Vec<KeySchemaElement>,
}

impl KeySchema {
    /// Validates and wraps the given elements.
    pub fn new(elements: Vec<KeySchemaElement>) -> Result<Self, KeySchemaError> {
        if elements.is_empty() {
            return Err(KeySchemaError::Empty);
        }
        let mut partitions = 0;
        let mut sorts = 0;
        for (idx, element) in elements.iter().enumerate() {
            if elements[..idx]
                .iter()
                .any(|prev| prev.attribute_name == element.attribute_name)
            {
                return Err(KeySchemaError::DuplicateField(
                    element.attribute_name.clone(),
                ));
            }
            match element.role {
                KeyRole::Partition => partitions += 1,
                KeyRole::Sort => sorts += 1,
            }
        }
        if partitions == 0 {
            return Err(KeySchemaError::MissingPartition);
        }
        if partitions > 1 {
            return Err(KeySchemaError::DuplicateRole(KeyRole::Partition));
        }
        if sorts > 1 {
            return Err(KeySchemaError::DuplicateRole(KeyRole::Sort));
        }
        Ok(Self { elements })
    }

    /// Schema with a single partition field.
    pub fn partition(name: impl Into<String>) -> Self {
        Self {
            elements: vec![KeySchemaElement::new(name, KeyRole::Partition)],
        }
    }

    /// Schema with a partition and a sort field.
    ///
    /// # Panics
    ///
    /// If both names are equal.
    pub fn partition_and_sort(partition: impl Into<String>, sort: impl Into<String>) -> Self {
        let partition = partition.into();
        let sort = sort.into();
        assert_ne!(partition, sort, "partition and sort fields must differ");
        Self {
            elements: vec![
                KeySchemaElement::new(partition, KeyRole::Partition),
                KeySchemaElement::new(sort, KeyRole::Sort),
            ],
        }
    }

    /// Fields in declaration order.
    pub fn elements(&self) -> &[KeySchemaElement] {
        &self.elements
    }

    /// Field names in declaration order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.elements.iter().map(|e| e.attribute_name.as_str())
    }

    /// Projects `record` onto exactly the key fields, keeping the typed values.
    pub fn restrict(&self, record: &Record) -> Result<KeyValueMap, KeySchemaError> {
        self.field_names()
            .map(|name| {
                record
                    .get(name)
                    .map(|value| (name.to_owned(), value.clone()))
                    .ok_or_else(|| KeySchemaError::MissingField(name.to_owned()))
            })
            .collect()
    }

    /// Whether `key` names exactly this schema's fields.
    pub fn matches_key(&self, key: &KeyValueMap) -> bool {
        key.len() == self.elements.len() && self.field_names().all(|name| key.contains_key(name))
    }
}

impl TryFrom<Vec<KeySchemaElement>> for KeySchema {
    type Error = KeySchemaError;

    fn try_from(elements: Vec<KeySchemaElement>) -> Result<Self, Self::Error> {
        Self::new(elements)
    }
}

impl From<KeySchema> for Vec<KeySchemaElement> {
    fn from(schema: KeySchema) -> Self {
        schema.elements
    }
}

/// Looks up the primary-key schema of a table.
///
/// Implementations fail when the table is unknown. A returned [`KeySchema`] is
/// non-empty by construction.
pub trait KeySchemaResolver {
    /// Resolves the key schema of `table_name`.
    fn resolve_key_schema(
        &self,
        table_name: &str,
    ) -> impl Future<Output = anyhow::Result<KeySchema>> + Send;
}

impl<T: KeySchemaResolver> KeySchemaResolver for &T {
    fn resolve_key_schema(
        &self,
        table_name: &str,
    ) -> impl Future<Output = anyhow::Result<KeySchema>> + Send {
        (**self).resolve_key_schema(table_name)
    }
}

impl<T: KeySchemaResolver> KeySchemaResolver for Arc<T> {
    fn resolve_key_schema(
        &self,
        table_name: &str,
    ) -> impl Future<Output = anyhow::Result<KeySchema>> + Send {
        self.as_ref().resolve_key_schema(table_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::AttributeValue;

    #[test]
    fn rejects_invalid_shapes() {
        assert_eq!(Err(KeySchemaError::Empty), KeySchema::new(vec![]));
        assert_eq!(
            Err(KeySchemaError::MissingPartition),
            KeySchema::new(vec![KeySchemaElement::new("id", KeyRole::Sort)])
        );
        assert_eq!(
            Err(KeySchemaError::DuplicateRole(KeyRole::Partition)),
            KeySchema::new(vec![
                KeySchemaElement::new("a", KeyRole::Partition),
                KeySchemaElement::new("b", KeyRole::Partition),
            ])
        );
        assert_eq!(
            Err(KeySchemaError::DuplicateRole(KeyRole::Sort)),
            KeySchema::new(vec![
                KeySchemaElement::new("a", KeyRole::Partition),
                KeySchemaElement::new("b", KeyRole::Sort),
                KeySchemaElement::new("c", KeyRole::Sort),
            ])
        );
        assert_eq!(
            Err(KeySchemaError::DuplicateField("a".to_owned())),
            KeySchema::new(vec![
                KeySchemaElement::new("a", KeyRole::Partition),
                KeySchemaElement::new("a", KeyRole::Sort),
            ])
        );
    }

    #[test]
    fn restrict_keeps_only_key_fields() {
        let schema = KeySchema::partition_and_sort("user", "ts");
        let mut record = Record::new();
        record.insert("user".to_owned(), "alice".into());
        record.insert("ts".to_owned(), AttributeValue::number(17));
        record.insert("body".to_owned(), "hello".into());

        let key = schema.restrict(&record).unwrap();
        assert_eq!(2, key.len());
        assert_eq!(Some(&AttributeValue::number(17)), key.get("ts"));
        assert!(schema.matches_key(&key));

        record.remove("ts");
        assert_eq!(
            Err(KeySchemaError::MissingField("ts".to_owned())),
            schema.restrict(&record)
        );
    }

    #[test]
    fn deserializes_legacy_role_names() {
        let json = r#"[{"attributeName":"id","role":"HASH"},{"attributeName":"at","role":"RANGE"}]"#;
        let schema: KeySchema = serde_json::from_str(json).unwrap();
        assert_eq!(KeySchema::partition_and_sort("id", "at"), schema);

        let json = serde_json::to_string(&schema).unwrap();
        assert!(json.contains("PARTITION"));
        assert!(serde_json::from_str::<KeySchema>("[]").is_err());
    }
}
