//! Database schema for the feature registry
//!
//! # Tables
//!
//! - **entities**: Registered entities and their join keys
//! - **feature_views**: Feature view declarations
//! - **registry_applies**: History of snapshot applications
//!
//! Feature lists and sources are stored as JSON columns; timestamps are Unix
//! epoch seconds.

use anyhow::{Context, Result};
use rusqlite::Connection;

pub fn create_tables(db: &Connection) -> Result<()> {
    db.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS entities (
            name TEXT PRIMARY KEY,
            join_key TEXT,
            value_type TEXT NOT NULL,
            description TEXT
        );

        CREATE TABLE IF NOT EXISTS feature_views (
            name TEXT PRIMARY KEY,
            entities TEXT NOT NULL,
            features TEXT NOT NULL,
            source TEXT NOT NULL,
            ttl_seconds BIGINT NOT NULL CHECK (ttl_seconds >= 0),
            tags TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS registry_applies (
            id INTEGER PRIMARY KEY,
            project TEXT NOT NULL,
            entity_count INTEGER NOT NULL,
            feature_view_count INTEGER NOT NULL,
            applied_at BIGINT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_applies_applied ON registry_applies(applied_at DESC);
        "#,
    )
    .context("Failed to create registry schema")?;

    Ok(())
}
