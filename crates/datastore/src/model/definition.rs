//! Model definitions and table lookup

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::query::ColumnTypes;

/// Storage type of an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    String,
    Number,
    Boolean,
    Json,
    Binary,
    Uuid,
    DateTime,
    /// Foreign key or other opaque reference
    Ref,
}

/// One column of a model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub attribute_type: AttributeType,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub auto_increment: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub required: bool,
}

impl AttributeDefinition {
    pub fn new(name: impl Into<String>, attribute_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attribute_type,
            primary_key: false,
            auto_increment: false,
            unique: false,
            required: false,
        }
    }

    pub fn with_primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn with_auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    pub fn with_unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn with_required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Metadata for one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDefinition {
    pub identity: String,
    pub table_name: String,
    pub attributes: Vec<AttributeDefinition>,
}

impl ModelDefinition {
    pub fn new(identity: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            table_name: table_name.into(),
            attributes: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, attribute: AttributeDefinition) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Primary key column: the flagged attribute, or `id` when none is flagged
    pub fn primary_key(&self) -> &str {
        self.attributes
            .iter()
            .find(|a| a.primary_key)
            .map(|a| a.name.as_str())
            .unwrap_or("id")
    }

    /// The primary key column when its values come from a sequence
    pub fn auto_increment_key(&self) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.primary_key && a.auto_increment)
            .map(|a| a.name.as_str())
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeDefinition> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.attributes.iter().map(|a| a.name.clone()).collect()
    }

    pub fn column_types(&self) -> ColumnTypes {
        self.attributes
            .iter()
            .map(|a| (a.name.clone(), a.attribute_type))
            .collect()
    }
}

/// Models of one datastore, keyed by table name
///
/// Built fresh from the definitions; the definitions themselves are never
/// modified.
#[derive(Debug, Clone, Default)]
pub struct ModelLookup {
    by_table: HashMap<String, Arc<ModelDefinition>>,
}

impl ModelLookup {
    pub fn from_definitions(definitions: &[ModelDefinition]) -> Self {
        let by_table = definitions
            .iter()
            .map(|definition| (definition.table_name.clone(), Arc::new(definition.clone())))
            .collect();
        Self { by_table }
    }

    pub fn get(&self, table: &str) -> Option<&ModelDefinition> {
        self.by_table.get(table).map(|model| model.as_ref())
    }

    /// Find a model by its identity rather than its table name
    pub fn by_identity(&self, identity: &str) -> Option<&ModelDefinition> {
        self.by_table
            .values()
            .find(|model| model.identity == identity)
            .map(|model| model.as_ref())
    }

    pub fn primary_key(&self, table: &str) -> Option<&str> {
        self.get(table).map(ModelDefinition::primary_key)
    }

    pub fn contains(&self, table: &str) -> bool {
        self.by_table.contains_key(table)
    }

    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.by_table.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_table.is_empty()
    }
}
