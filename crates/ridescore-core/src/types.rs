//! Core data types for RideScore
//!
//! This module defines the declarative schema (entities, data sources,
//! feature views) and the request-time values (entity keys, feature vectors,
//! feature tables). These types are kept simple and focused on their single
//! responsibility.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Declared value type of an entity join key or a feature
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Int32,
    Int64,
    Float,
    Double,
    String,
    Bool,
    UnixTimestamp,
}

impl ValueType {
    /// Check whether a raw JSON request value is acceptable for this type
    ///
    /// Used to validate entity-key values coming from a scoring request.
    pub fn accepts_json(&self, value: &serde_json::Value) -> bool {
        match self {
            ValueType::Int32 => value
                .as_i64()
                .map(|v| i32::try_from(v).is_ok())
                .unwrap_or(false),
            ValueType::Int64 | ValueType::UnixTimestamp => value.as_i64().is_some(),
            ValueType::Float | ValueType::Double => value.is_number(),
            ValueType::String => value.is_string(),
            ValueType::Bool => value.is_boolean(),
        }
    }

    /// True for types a model can consume as a numeric column
    pub fn is_numeric(&self) -> bool {
        !matches!(self, ValueType::String)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Int32 => "int32",
            ValueType::Int64 => "int64",
            ValueType::Float => "float",
            ValueType::Double => "double",
            ValueType::String => "string",
            ValueType::Bool => "bool",
            ValueType::UnixTimestamp => "unix_timestamp",
        };
        f.write_str(name)
    }
}

/// A named join key identifying a real-world object (driver, customer)
///
/// Identity is the `name`. The `join_key` is the column used to look the
/// entity up in storage; it defaults to the name.
///
/// # Examples
///
/// ```
/// use ridescore_core::{Entity, ValueType};
///
/// let driver = Entity::new("driver", ValueType::Int64).with_join_key("driver_id");
/// assert_eq!(driver.join_key(), "driver_id");
///
/// let customer = Entity::new("customer_id", ValueType::Int64);
/// assert_eq!(customer.join_key(), "customer_id");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Entity {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_key: Option<String>,

    pub value_type: ValueType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Entity {
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            join_key: None,
            value_type,
            description: None,
        }
    }

    pub fn with_join_key(mut self, join_key: impl Into<String>) -> Self {
        self.join_key = Some(join_key.into());
        self
    }

    /// Storage column for this entity (falls back to the entity name)
    pub fn join_key(&self) -> &str {
        match &self.join_key {
            Some(key) if !key.is_empty() => key,
            _ => &self.name,
        }
    }
}

/// Reference to an external table backing a feature view
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataSource {
    /// Table reference in the offline store (e.g., "driver_hourly")
    pub table_ref: String,

    /// Column holding the event timestamp used for point-in-time joins
    pub event_timestamp_column: String,

    /// Column holding the row creation timestamp, used to break ties
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_timestamp_column: Option<String>,
}

impl DataSource {
    pub fn new(table_ref: impl Into<String>, event_timestamp_column: impl Into<String>) -> Self {
        Self {
            table_ref: table_ref.into(),
            event_timestamp_column: event_timestamp_column.into(),
            created_timestamp_column: None,
        }
    }

    /// Sets the creation timestamp column; an empty name means "absent"
    pub fn with_created_timestamp_column(mut self, column: impl Into<String>) -> Self {
        let column = column.into();
        self.created_timestamp_column = if column.trim().is_empty() {
            None
        } else {
            Some(column)
        };
        self
    }
}

/// A single feature declared by a feature view
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Feature {
    pub name: String,
    pub value_type: ValueType,
}

impl Feature {
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
        }
    }
}

/// A named group of features sharing one data source and a freshness window
///
/// The `ttl_seconds` is the maximum staleness accepted by point-in-time
/// joins. It is signed so that invalid declarations can be represented and
/// rejected by the registrar.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeatureView {
    pub name: String,

    /// Names of the entities this view is keyed by
    pub entities: Vec<String>,

    /// Ordered feature declarations
    pub features: Vec<Feature>,

    pub source: DataSource,

    pub ttl_seconds: i64,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl FeatureView {
    pub fn new(
        name: impl Into<String>,
        entities: Vec<String>,
        features: Vec<Feature>,
        source: DataSource,
        ttl: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            entities,
            features,
            source,
            ttl_seconds: ttl.as_secs() as i64,
            tags: Vec::new(),
        }
    }

    /// Freshness window, or None when the declared ttl is negative
    pub fn ttl(&self) -> Option<Duration> {
        u64::try_from(self.ttl_seconds).ok().map(Duration::from_secs)
    }

    pub fn feature(&self, name: &str) -> Option<&Feature> {
        self.features.iter().find(|f| f.name == name)
    }

    /// Fully-qualified references for every feature in this view
    pub fn feature_refs(&self) -> Vec<FeatureRef> {
        self.features
            .iter()
            .map(|f| FeatureRef::new(&self.name, &f.name))
            .collect()
    }
}

/// Fully-qualified feature reference, written `<view>:<feature>`
///
/// # Examples
///
/// ```
/// use ridescore_core::FeatureRef;
///
/// let r: FeatureRef = "driver_stats:conv_rate".parse().unwrap();
/// assert_eq!(r.view, "driver_stats");
/// assert_eq!(r.column_name(), "driver_stats__conv_rate");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeatureRef {
    pub view: String,
    pub feature: String,
}

impl FeatureRef {
    pub fn new(view: impl Into<String>, feature: impl Into<String>) -> Self {
        Self {
            view: view.into(),
            feature: feature.into(),
        }
    }

    /// Parse a list of `<view>:<feature>` strings, preserving order
    pub fn parse_list<S: AsRef<str>>(refs: &[S]) -> Result<Vec<FeatureRef>> {
        refs.iter().map(|r| r.as_ref().parse()).collect()
    }

    /// Column name in the tabular result, `<view>__<feature>`
    pub fn column_name(&self) -> String {
        format!("{}__{}", self.view, self.feature)
    }
}

impl fmt::Display for FeatureRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.view, self.feature)
    }
}

impl FromStr for FeatureRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        match s.split_once(':') {
            Some((view, feature))
                if !view.is_empty() && !feature.is_empty() && !feature.contains(':') =>
            {
                Ok(Self::new(view, feature))
            }
            _ => Err(Error::config(format!(
                "invalid feature reference '{}', expected '<view>:<feature>'",
                s
            ))),
        }
    }
}

impl Serialize for FeatureRef {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FeatureRef {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Represents a single entity key value used for a lookup
///
/// The `name` is the join key column (e.g., "driver_id"). Values are kept
/// as strings; typing happens when the request is validated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct EntityKey {
    pub name: String,
    pub value: String,
}

impl EntityKey {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// One lookup row: the join-key values identifying the entities
pub type EntityRow = Vec<EntityKey>;

/// A scalar feature value as stored in the online store
///
/// Uses `#[serde(untagged)]` so values serialize as plain JSON scalars:
/// - `Int(42)` → `42`
/// - `Float(0.8)` → `0.8`
/// - `Null` → `null`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FeatureValue {
    /// Must stay first for untagged deserialization of `null`
    Null,
    Int(i64),
    Float(f64),
    String(String),
    Bool(bool),
}

impl FeatureValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FeatureValue::Null)
    }

    /// Numeric view of the value, as consumed by a model
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FeatureValue::Int(v) => Some(*v as f64),
            FeatureValue::Float(v) => Some(*v),
            FeatureValue::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            FeatureValue::Null | FeatureValue::String(_) => None,
        }
    }
}

static NULL_VALUE: FeatureValue = FeatureValue::Null;

/// Result of an online lookup for a single entity row
///
/// Maps fully-qualified feature refs (`<view>:<feature>`) to values. A ref
/// that is missing from the map is treated as null.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FeatureVector {
    pub entities: EntityRow,
    pub values: HashMap<String, FeatureValue>,
}

impl FeatureVector {
    pub fn new(entities: EntityRow) -> Self {
        Self {
            entities,
            values: HashMap::new(),
        }
    }

    /// Adds a feature value (builder pattern)
    pub fn with_value(mut self, feature_ref: &FeatureRef, value: FeatureValue) -> Self {
        self.insert(feature_ref, value);
        self
    }

    pub fn insert(&mut self, feature_ref: &FeatureRef, value: FeatureValue) {
        self.values.insert(feature_ref.to_string(), value);
    }

    /// Value for a ref; absent refs read as `FeatureValue::Null`
    pub fn get(&self, feature_ref: &FeatureRef) -> &FeatureValue {
        self.values
            .get(&feature_ref.to_string())
            .unwrap_or(&NULL_VALUE)
    }

    /// Refs from `feature_refs` whose value is null or absent
    pub fn missing<'a>(&self, feature_refs: &'a [FeatureRef]) -> Vec<&'a FeatureRef> {
        feature_refs
            .iter()
            .filter(|r| self.get(r).is_null())
            .collect()
    }

    /// True when every ref in `feature_refs` has a non-null value
    pub fn is_complete(&self, feature_refs: &[FeatureRef]) -> bool {
        feature_refs.iter().all(|r| !self.get(r).is_null())
    }

    /// Project the row onto `feature_refs` in order, as model input
    ///
    /// A non-numeric stored value is a `Prediction` error: the store holds
    /// data the model cannot consume.
    pub fn project(&self, feature_refs: &[FeatureRef]) -> Result<Vec<f64>> {
        feature_refs
            .iter()
            .map(|r| {
                let value = self.get(r);
                value.as_f64().ok_or_else(|| {
                    Error::prediction(format!(
                        "feature '{}' has non-numeric value {:?}",
                        r, value
                    ))
                })
            })
            .collect()
    }
}

/// Tabular result of `get_online_features`
///
/// One column per requested ref (in request order), one row per entity row.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OnlineFeatures {
    pub feature_refs: Vec<FeatureRef>,
    pub rows: Vec<FeatureVector>,
}

impl OnlineFeatures {
    pub fn new(feature_refs: Vec<FeatureRef>, rows: Vec<FeatureVector>) -> Self {
        Self { feature_refs, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// True when every row has a value for every column
    pub fn is_complete(&self) -> bool {
        self.rows.iter().all(|row| row.is_complete(&self.feature_refs))
    }

    /// Numeric table in column order, ready for `Model::predict`
    pub fn to_table(&self) -> Result<FeatureTable> {
        let rows = self
            .rows
            .iter()
            .map(|row| row.project(&self.feature_refs))
            .collect::<Result<Vec<_>>>()?;

        Ok(FeatureTable {
            columns: self.feature_refs.iter().map(FeatureRef::column_name).collect(),
            rows,
        })
    }
}

/// Numeric feature table with a fixed column order
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FeatureTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl FeatureTable {
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
