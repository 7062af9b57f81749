//! Declarative feature repository files
//!
//! A repository file declares the project's entities, data sources and feature
//! views in YAML:
//!
//! ```yaml
//! project: production
//! entities:
//!   - name: driver
//!     join_key: driver_id
//!     value_type: int64
//! data_sources:
//!   driver_source:
//!     table_ref: driver_hourly
//!     event_timestamp_column: datetime
//!     created_timestamp_column: created
//! feature_views:
//!   - name: driver_stats
//!     entities: [driver]
//!     source: driver_source
//!     ttl: 2h
//!     features:
//!       - { name: conv_rate, value_type: float }
//! ```
//!
//! `ttl` accepts a plain number of seconds or a number followed by one of
//! `s`, `m`, `h`, `d`, `w`.

use crate::registrar::SchemaRegistrar;
use ridescore_core::{DataSource, Entity, Error, Feature, FeatureView, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoDefinition {
    #[serde(default = "default_project")]
    pub project: String,

    #[serde(default)]
    pub entities: Vec<Entity>,

    /// Sources keyed by the name feature views use to refer to them
    #[serde(default)]
    pub data_sources: BTreeMap<String, SourceDef>,

    #[serde(default)]
    pub feature_views: Vec<FeatureViewDef>,
}

fn default_project() -> String {
    "default".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDef {
    pub table_ref: String,
    pub event_timestamp_column: String,
    #[serde(default)]
    pub created_timestamp_column: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureViewDef {
    pub name: String,
    pub entities: Vec<String>,
    pub features: Vec<Feature>,
    /// Name of an entry in `data_sources`
    pub source: String,
    pub ttl: TtlSpec,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Freshness window as written in a repository file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TtlSpec {
    Seconds(i64),
    Text(String),
}

impl TtlSpec {
    pub fn to_seconds(&self) -> Result<i64> {
        match self {
            TtlSpec::Seconds(secs) => Ok(*secs),
            TtlSpec::Text(text) => parse_ttl(text),
        }
    }
}

fn parse_ttl(text: &str) -> Result<i64> {
    let text = text.trim();
    let split = text
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(text.len());
    let (number, unit) = text.split_at(split);

    let value: i64 = number
        .trim()
        .parse()
        .map_err(|_| Error::config(format!("invalid ttl '{}'", text)))?;

    let multiplier = match unit.trim() {
        "" | "s" => 1,
        "m" => 60,
        "h" => 3_600,
        "d" => 86_400,
        "w" => 604_800,
        other => {
            return Err(Error::config(format!(
                "invalid ttl unit '{}' in '{}'",
                other, text
            )))
        }
    };

    value
        .checked_mul(multiplier)
        .ok_or_else(|| Error::config(format!("ttl '{}' is out of range", text)))
}

impl RepoDefinition {
    /// Load a repository file from disk
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!(
                "failed to read repository file {}: {}",
                path.display(),
                e
            ))
        })?;
        let repo = Self::parse(&content)?;
        info!(
            path = %path.display(),
            project = %repo.project,
            entities = repo.entities.len(),
            feature_views = repo.feature_views.len(),
            "Loaded repository definition"
        );
        Ok(repo)
    }

    pub fn parse(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| Error::config(format!("invalid repository definition: {}", e)))
    }

    /// Validate every declaration through a registrar
    ///
    /// Entities are registered first, so a view may be declared before the
    /// entities it references.
    pub fn into_registrar(self) -> Result<SchemaRegistrar> {
        let mut registrar = SchemaRegistrar::new(self.project);

        for entity in self.entities {
            registrar.register_entity(entity)?;
        }

        for def in self.feature_views {
            let source = self.data_sources.get(&def.source).ok_or_else(|| {
                Error::config(format!(
                    "feature view '{}' references unknown data source '{}'",
                    def.name, def.source
                ))
            })?;

            let mut data_source = DataSource::new(&source.table_ref, &source.event_timestamp_column);
            if let Some(column) = &source.created_timestamp_column {
                data_source = data_source.with_created_timestamp_column(column);
            }

            let ttl_seconds = def.ttl.to_seconds()?;
            let view = FeatureView {
                name: def.name,
                entities: def.entities,
                features: def.features,
                source: data_source,
                ttl_seconds,
                tags: def.tags,
            };
            registrar.register_feature_view(view)?;
        }

        Ok(registrar)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const DRIVER_REPO: &str = r#"
project: production
feature_views:
  - name: driver_stats
    entities: [driver]
    source: driver_source
    ttl: 2h
    features:
      - { name: conv_rate, value_type: float }
      - { name: acc_rate, value_type: float }
      - { name: avg_daily_trips, value_type: int32 }
  - name: customer_profile
    entities: [customer_id]
    source: customer_source
    ttl: 2d
    features:
      - { name: current_balance, value_type: float }
      - { name: avg_passenger_count, value_type: float }
      - { name: lifetime_trip_count, value_type: int32 }
entities:
  - name: driver
    join_key: driver_id
    value_type: int64
  - name: customer_id
    value_type: int64
data_sources:
  driver_source:
    table_ref: driver_hourly
    event_timestamp_column: datetime
    created_timestamp_column: created
  customer_source:
    table_ref: customer_profile
    event_timestamp_column: datetime
    created_timestamp_column: ""
"#;

    #[test]
    fn test_parse_ttl() {
        assert_eq!(parse_ttl("2h").unwrap(), 7_200);
        assert_eq!(parse_ttl("2d").unwrap(), 172_800);
        assert_eq!(parse_ttl("90").unwrap(), 90);
        assert_eq!(parse_ttl("15 m").unwrap(), 900);
        assert_eq!(parse_ttl("-1h").unwrap(), -3_600);
        assert!(parse_ttl("2 fortnights").is_err());
        assert!(parse_ttl("h").is_err());
    }

    #[test]
    fn test_driver_repo_registers() {
        let registrar = RepoDefinition::parse(DRIVER_REPO)
            .unwrap()
            .into_registrar()
            .unwrap();

        assert_eq!(registrar.project(), "production");

        let driver_stats = registrar.feature_view("driver_stats").unwrap();
        assert_eq!(driver_stats.ttl(), Some(Duration::from_secs(7_200)));
        assert_eq!(
            driver_stats.source.created_timestamp_column.as_deref(),
            Some("created")
        );

        let customer = registrar.feature_view("customer_profile").unwrap();
        assert_eq!(customer.ttl(), Some(Duration::from_secs(172_800)));
        // Empty column name means the source has no creation timestamp
        assert_eq!(customer.source.created_timestamp_column, None);

        assert_eq!(registrar.entity("customer_id").unwrap().join_key(), "customer_id");
    }

    #[test]
    fn test_unknown_source_is_rejected() {
        let repo = DRIVER_REPO.replace("source: customer_source", "source: orders");
        let err = RepoDefinition::parse(&repo)
            .unwrap()
            .into_registrar()
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(err.to_string().contains("unknown data source 'orders'"));
    }

    #[test]
    fn test_negative_ttl_is_rejected() {
        let repo = DRIVER_REPO.replace("ttl: 2d", "ttl: -5");
        assert!(RepoDefinition::parse(&repo)
            .unwrap()
            .into_registrar()
            .is_err());
    }

    #[test]
    fn test_invalid_yaml_is_configuration_error() {
        let err = RepoDefinition::parse("entities: {not: [a list").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
