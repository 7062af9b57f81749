//! SQLite backend implementation with WAL mode
//!
//! This backend uses SQLite with Write-Ahead Logging (WAL) so that the CLI can
//! apply a repository while scoring processes read the same file. Suitable for:
//! - Single-host deployments
//! - Development and testing (`:memory:`)

use crate::backend::RegistryBackend;
use crate::schema;
use crate::ApplyRecord;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ridescore_core::{recover_mutex, Entity, FeatureView, RegistrySnapshot};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

const FEATURE_VIEW_COLUMNS: &str = "name, entities, features, source, ttl_seconds, tags";

/// SQLite backend with WAL mode for multi-process safety
pub struct SqliteBackend {
    db: Arc<Mutex<Connection>>,
}

impl SqliteBackend {
    /// Create new SQLite backend from file path, creating the file if needed
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open(path.as_ref(), true)
    }

    /// Open an existing registry file; fails instead of creating one
    pub fn open_existing<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open(path.as_ref(), false)
    }

    fn open(path: &Path, create: bool) -> Result<Self> {
        if path.to_string_lossy() == ":memory:" {
            return Self::in_memory();
        }

        let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
        if create {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).with_context(|| {
                        format!("Failed to create registry directory {:?}", parent)
                    })?;
                }
            }
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        } else if !path.is_file() {
            bail!("Registry database {:?} does not exist", path);
        }

        let db = Connection::open_with_flags(path, flags)
            .context("Failed to open SQLite connection for registry")?;

        db.pragma_update(None, "journal_mode", "WAL")
            .context("Failed to enable WAL mode")?;

        // Wait for locks held by a concurrent apply instead of failing
        db.pragma_update(None, "busy_timeout", 5000)
            .context("Failed to set busy timeout")?;

        db.pragma_update(None, "synchronous", "NORMAL")
            .context("Failed to set synchronous mode")?;

        info!("Opened SQLite registry at {:?} with WAL mode", path);

        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    /// Create in-memory SQLite backend (for testing)
    pub fn in_memory() -> Result<Self> {
        let db =
            Connection::open_in_memory().context("Failed to create in-memory SQLite connection")?;

        info!("Initialized in-memory SQLite registry");

        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }
}

fn json_column<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn entity_from_row(row: &Row<'_>) -> rusqlite::Result<Entity> {
    let value_type: String = row.get(2)?;
    let value_type = serde_json::from_value(serde_json::Value::String(value_type))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;

    Ok(Entity {
        name: row.get(0)?,
        join_key: row.get(1)?,
        value_type,
        description: row.get(3)?,
    })
}

fn feature_view_from_row(row: &Row<'_>) -> rusqlite::Result<FeatureView> {
    Ok(FeatureView {
        name: row.get(0)?,
        entities: json_column(row, 1)?,
        features: json_column(row, 2)?,
        source: json_column(row, 3)?,
        ttl_seconds: row.get(4)?,
        tags: json_column(row, 5)?,
    })
}

fn apply_from_row(row: &Row<'_>) -> rusqlite::Result<ApplyRecord> {
    let applied_ts: i64 = row.get(4)?;
    Ok(ApplyRecord {
        id: row.get(0)?,
        project: row.get(1)?,
        entity_count: row.get(2)?,
        feature_view_count: row.get(3)?,
        applied_at: DateTime::from_timestamp(applied_ts, 0).unwrap_or_else(Utc::now),
    })
}

#[async_trait]
impl RegistryBackend for SqliteBackend {
    async fn init_schema(&self) -> Result<()> {
        let db = recover_mutex(&self.db, "FeatureRegistry")?;
        schema::create_tables(&db)?;
        Ok(())
    }

    async fn apply(&self, snapshot: &RegistrySnapshot) -> Result<ApplyRecord> {
        let mut db = recover_mutex(&self.db, "FeatureRegistry")?;
        let tx = db
            .transaction()
            .context("Failed to start registry transaction")?;

        tx.execute("DELETE FROM feature_views", [])?;
        tx.execute("DELETE FROM entities", [])?;

        for entity in snapshot.entities.values() {
            tx.execute(
                "INSERT INTO entities (name, join_key, value_type, description) VALUES (?, ?, ?, ?)",
                params![
                    &entity.name,
                    &entity.join_key,
                    entity.value_type.to_string(),
                    &entity.description,
                ],
            )
            .with_context(|| format!("Failed to store entity '{}'", entity.name))?;
        }

        for view in snapshot.feature_views.values() {
            tx.execute(
                &format!(
                    "INSERT INTO feature_views ({}) VALUES (?, ?, ?, ?, ?, ?)",
                    FEATURE_VIEW_COLUMNS
                ),
                params![
                    &view.name,
                    serde_json::to_string(&view.entities)?,
                    serde_json::to_string(&view.features)?,
                    serde_json::to_string(&view.source)?,
                    view.ttl_seconds,
                    serde_json::to_string(&view.tags)?,
                ],
            )
            .with_context(|| format!("Failed to store feature view '{}'", view.name))?;
        }

        // Stored as whole seconds; the returned record must match last_apply()
        let now = Utc::now();
        let applied_at = DateTime::from_timestamp(now.timestamp(), 0).unwrap_or(now);
        tx.execute(
            r#"
            INSERT INTO registry_applies (project, entity_count, feature_view_count, applied_at)
            VALUES (?, ?, ?, ?)
            "#,
            params![
                &snapshot.project,
                snapshot.entities.len() as i64,
                snapshot.feature_views.len() as i64,
                applied_at.timestamp(),
            ],
        )?;
        let id = tx.last_insert_rowid();

        tx.commit().context("Failed to commit registry apply")?;

        info!(
            apply_id = id,
            project = %snapshot.project,
            entities = snapshot.entities.len(),
            feature_views = snapshot.feature_views.len(),
            "Applied registry snapshot"
        );

        Ok(ApplyRecord {
            id,
            project: snapshot.project.clone(),
            entity_count: snapshot.entities.len() as i64,
            feature_view_count: snapshot.feature_views.len() as i64,
            applied_at,
        })
    }

    async fn load_snapshot(&self) -> Result<RegistrySnapshot> {
        let db = recover_mutex(&self.db, "FeatureRegistry")?;

        let project: Option<String> = db
            .query_row(
                "SELECT project FROM registry_applies ORDER BY id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        let mut snapshot = match project {
            Some(project) => RegistrySnapshot::new(project),
            None => RegistrySnapshot::default(),
        };

        let mut stmt =
            db.prepare("SELECT name, join_key, value_type, description FROM entities")?;
        for entity in stmt.query_map([], entity_from_row)? {
            let entity = entity.context("Failed to decode stored entity")?;
            snapshot.entities.insert(entity.name.clone(), entity);
        }

        let mut stmt = db.prepare(&format!("SELECT {} FROM feature_views", FEATURE_VIEW_COLUMNS))?;
        for view in stmt.query_map([], feature_view_from_row)? {
            let view = view.context("Failed to decode stored feature view")?;
            snapshot.feature_views.insert(view.name.clone(), view);
        }

        debug!(
            entities = snapshot.entities.len(),
            feature_views = snapshot.feature_views.len(),
            "Loaded registry snapshot"
        );

        Ok(snapshot)
    }

    async fn get_feature_view(&self, name: &str) -> Result<FeatureView> {
        let db = recover_mutex(&self.db, "FeatureRegistry")?;

        let view = db
            .query_row(
                &format!(
                    "SELECT {} FROM feature_views WHERE name = ?",
                    FEATURE_VIEW_COLUMNS
                ),
                params![name],
                feature_view_from_row,
            )
            .context(format!("Feature view '{}' not found", name))?;

        Ok(view)
    }

    async fn list_feature_views(&self, filter: Option<&str>) -> Result<Vec<FeatureView>> {
        let db = recover_mutex(&self.db, "FeatureRegistry")?;

        let (query, params_vec): (String, Vec<String>) = match filter {
            Some(f) => (
                format!(
                    "SELECT {} FROM feature_views WHERE name LIKE ? ORDER BY name",
                    FEATURE_VIEW_COLUMNS
                ),
                vec![format!("%{}%", f)],
            ),
            None => (
                format!("SELECT {} FROM feature_views ORDER BY name", FEATURE_VIEW_COLUMNS),
                vec![],
            ),
        };

        let mut stmt = db.prepare(&query)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> = params_vec
            .iter()
            .map(|s| s as &dyn rusqlite::ToSql)
            .collect();

        let rows = stmt.query_map(params_refs.as_slice(), feature_view_from_row)?;

        let mut views = Vec::new();
        for row in rows {
            views.push(row?);
        }

        Ok(views)
    }

    async fn last_apply(&self) -> Result<Option<ApplyRecord>> {
        let db = recover_mutex(&self.db, "FeatureRegistry")?;

        let record = db
            .query_row(
                r#"
                SELECT id, project, entity_count, feature_view_count, applied_at
                FROM registry_applies ORDER BY id DESC LIMIT 1
                "#,
                [],
                apply_from_row,
            )
            .optional()?;

        Ok(record)
    }

    async fn health_check(&self) -> Result<()> {
        let db = recover_mutex(&self.db, "FeatureRegistry")?;
        db.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .context("Registry database is not responding")?;
        Ok(())
    }
}
