//! Query cache
//!
//! Rebuilds nested parent records from flat result sets. Parents are held in
//! the order the parent query returned them and indexed by primary key; every
//! declared association gets a slot on every parent before any child data
//! arrives, so a finished record always carries all of its association fields.
//!
//! The cache is operation-local and does no I/O.

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value as JsonValue};

use super::planner::{Cardinality, JoinInstructions};
use crate::backends::Record;
use crate::error::{DatastoreError, DatastoreResult};
use crate::query::ALIAS_SEPARATOR;

/// Hashable form of a key value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum RecordKey {
    Int(i64),
    Number(String),
    Text(String),
    Bool(bool),
    Other(String),
}

impl RecordKey {
    /// `None` for null; a null key never correlates
    fn of(value: &JsonValue) -> Option<Self> {
        match value {
            JsonValue::Null => None,
            JsonValue::Number(n) => Some(match n.as_i64() {
                Some(i) => RecordKey::Int(i),
                None => RecordKey::Number(n.to_string()),
            }),
            JsonValue::String(s) => Some(RecordKey::Text(s.clone())),
            JsonValue::Bool(b) => Some(RecordKey::Bool(*b)),
            other => Some(RecordKey::Other(other.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
enum Slot {
    One(Option<Record>),
    Many { records: Vec<Record>, seen: HashSet<RecordKey> },
}

impl Slot {
    fn empty(cardinality: Cardinality) -> Self {
        match cardinality {
            Cardinality::One => Slot::One(None),
            Cardinality::Many => Slot::Many {
                records: Vec::new(),
                seen: HashSet::new(),
            },
        }
    }

    /// Returns false when the record was already present
    fn insert(&mut self, child: Record, child_primary_key: &str, alias: &str) -> bool {
        match self {
            Slot::One(current) => {
                if let Some(existing) = current {
                    if existing.get(child_primary_key) != child.get(child_primary_key) {
                        tracing::warn!(
                            "Association '{}' matched more than one record for a single parent; \
                             keeping the last",
                            alias
                        );
                    }
                }
                *current = Some(child);
                true
            }
            Slot::Many { records, seen } => {
                let fresh = match child.get(child_primary_key).and_then(RecordKey::of) {
                    Some(key) => seen.insert(key),
                    None => !records.contains(&child),
                };
                if fresh {
                    records.push(child);
                }
                fresh
            }
        }
    }

    fn to_json(&self) -> JsonValue {
        match self {
            Slot::One(Some(record)) => JsonValue::Object(record.clone()),
            Slot::One(None) => JsonValue::Object(Map::new()),
            Slot::Many { records, .. } => {
                JsonValue::Array(records.iter().cloned().map(JsonValue::Object).collect())
            }
        }
    }
}

/// Reassembles one join operation
#[derive(Debug, Clone)]
pub struct QueryCache {
    primary_key: String,
    associations: Vec<JoinInstructions>,
    parents: Vec<Record>,
    index: HashMap<RecordKey, usize>,
    /// Per association alias, one slot per parent position
    slots: HashMap<String, Vec<Slot>>,
}

impl QueryCache {
    pub fn new(primary_key: impl Into<String>, associations: Vec<JoinInstructions>) -> Self {
        let slots = associations
            .iter()
            .map(|instructions| (instructions.alias.clone(), Vec::new()))
            .collect();
        Self {
            primary_key: primary_key.into(),
            associations,
            parents: Vec::new(),
            index: HashMap::new(),
            slots,
        }
    }

    /// Load the parent rows
    ///
    /// Columns named `alias___column` for a declared alias are removed from the
    /// row and folded into that association. A parent seen twice (join fan-out)
    /// is kept once, at its first position.
    pub fn set_parents(&mut self, rows: Vec<Record>) -> DatastoreResult<()> {
        for row in rows {
            let (parent, inline) = self.dealias(row);

            let key = parent
                .get(&self.primary_key)
                .and_then(RecordKey::of)
                .ok_or_else(|| {
                    DatastoreError::Reassembly(format!(
                        "parent record is missing primary key '{}'",
                        self.primary_key
                    ))
                })?;

            let position = match self.index.get(&key) {
                Some(&position) => position,
                None => {
                    let position = self.parents.len();
                    self.parents.push(parent);
                    self.index.insert(key, position);
                    for instructions in &self.associations {
                        if let Some(slots) = self.slots.get_mut(&instructions.alias) {
                            slots.push(Slot::empty(instructions.cardinality));
                        }
                    }
                    position
                }
            };

            for (alias, child) in inline {
                // An unmatched LEFT JOIN yields only nulls.
                if child.values().all(JsonValue::is_null) {
                    continue;
                }
                self.attach(&alias, position, child)?;
            }
        }

        Ok(())
    }

    /// Fold a batch of child rows into their parents
    ///
    /// Children are matched on `parent_key` of the parent against `child_key` of
    /// the child. Rows already attached are skipped, so a batch may be
    /// ingested more than once. Rows without a matching parent are dropped.
    pub fn extend(
        &mut self,
        rows: Vec<Record>,
        instructions: &JoinInstructions,
    ) -> DatastoreResult<()> {
        if !self.slots.contains_key(&instructions.alias) {
            return Err(DatastoreError::Reassembly(format!(
                "association '{}' was not declared for this join",
                instructions.alias
            )));
        }

        let mut parents_by_key: HashMap<RecordKey, Vec<usize>> = HashMap::new();
        for (position, parent) in self.parents.iter().enumerate() {
            if let Some(key) = parent.get(&instructions.parent_key).and_then(RecordKey::of) {
                parents_by_key.entry(key).or_default().push(position);
            }
        }

        let mut dropped = 0usize;
        for row in rows {
            let positions = match row.get(&instructions.child_key).and_then(RecordKey::of) {
                Some(key) => parents_by_key.get(&key),
                None => None,
            };
            let Some(positions) = positions else {
                dropped += 1;
                continue;
            };

            if let Some((last, rest)) = positions.split_last() {
                for &position in rest {
                    self.attach(&instructions.alias, position, row.clone())?;
                }
                self.attach(&instructions.alias, *last, row)?;
            }
        }

        if dropped > 0 {
            tracing::debug!(
                "Dropped {} '{}' rows with no matching parent",
                dropped,
                instructions.alias
            );
        }
        Ok(())
    }

    /// The finished parent records, in parent query order
    ///
    /// Pure read: calling it again returns the same records.
    pub fn combine_records(&self) -> Vec<Record> {
        self.parents
            .iter()
            .enumerate()
            .map(|(position, parent)| {
                let mut record = parent.clone();
                for instructions in &self.associations {
                    let value = self
                        .slots
                        .get(&instructions.alias)
                        .and_then(|slots| slots.get(position))
                        .map(Slot::to_json)
                        .unwrap_or_else(|| Slot::empty(instructions.cardinality).to_json());
                    record.insert(instructions.alias.clone(), value);
                }
                record
            })
            .collect()
    }

    /// Distinct non-null values of `column` across the parents, in order
    pub fn parent_keys(&self, column: &str) -> Vec<JsonValue> {
        let mut seen = HashSet::new();
        self.parents
            .iter()
            .filter_map(|parent| parent.get(column))
            .filter(|value| RecordKey::of(value).map_or(false, |key| seen.insert(key)))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    fn dealias(&self, row: Record) -> (Record, Vec<(String, Record)>) {
        let mut parent = Record::new();
        let mut inline: Vec<(String, Record)> = Vec::new();

        for (column, value) in row {
            let split = column
                .split_once(ALIAS_SEPARATOR)
                .filter(|(alias, _)| self.slots.contains_key(*alias));

            match split {
                Some((alias, child_column)) => {
                    let child_column = child_column.to_string();
                    match inline.iter_mut().find(|(a, _)| a == alias) {
                        Some((_, child)) => {
                            child.insert(child_column, value);
                        }
                        None => {
                            let mut child = Record::new();
                            child.insert(child_column, value);
                            inline.push((alias.to_string(), child));
                        }
                    }
                }
                None => {
                    parent.insert(column, value);
                }
            }
        }

        (parent, inline)
    }

    fn attach(&mut self, alias: &str, position: usize, child: Record) -> DatastoreResult<()> {
        let child_primary_key = self
            .associations
            .iter()
            .find(|a| a.alias == alias)
            .map(|a| a.child_primary_key.as_str())
            .unwrap_or("id");

        let slot = self
            .slots
            .get_mut(alias)
            .and_then(|slots| slots.get_mut(position))
            .ok_or_else(|| {
                DatastoreError::Reassembly(format!(
                    "no slot for '{}' at parent {}",
                    alias, position
                ))
            })?;
        slot.insert(child, child_primary_key, alias);
        Ok(())
    }
}
