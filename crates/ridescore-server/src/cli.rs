//! CLI command handlers
//!
//! Registry management (apply, validate, list) and one-shot scoring.

use crate::config;
use crate::error::{AppError, Result};
use crate::scoring::ScoringContext;
use ridescore_core::FeatureView;
use ridescore_registry::{FeatureRegistry, RepoDefinition};

/// Validate a repository file and write it to the registry
///
/// # Arguments
/// * `file_path` - Path to the repository YAML file
/// * `registry_location` - Registry path or sqlite:// URI
pub async fn apply(file_path: String, registry_location: String) -> Result<()> {
    println!("📝 Applying repository definition from: {}", file_path);

    let registrar = RepoDefinition::load(&file_path)?.into_registrar()?;

    let registry = FeatureRegistry::open(&registry_location)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to open registry: {:#}", e)))?;

    let record = registry
        .apply(&registrar)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to apply repository: {:#}", e)))?;

    println!("✅ Project '{}' applied", record.project);
    println!("   Apply ID: {}", record.id);
    println!("   Entities: {}", record.entity_count);
    println!("   Feature views: {}", record.feature_view_count);
    println!(
        "   Applied at: {}",
        record.applied_at.format("%Y-%m-%d %H:%M:%S")
    );

    Ok(())
}

/// Validate a repository file without touching a registry
pub fn validate(file_path: String) -> Result<()> {
    println!("🔍 Validating repository definition: {}", file_path);

    let registrar = RepoDefinition::load(&file_path)?.into_registrar()?;
    let snapshot = registrar.snapshot();

    println!("✅ Repository is valid\n");
    println!("Project: {}", snapshot.project);

    println!("Entities:");
    for entity in snapshot.entities.values() {
        println!(
            "   {} (join key: {}, type: {})",
            entity.name,
            entity.join_key(),
            entity.value_type
        );
    }

    println!("Feature views:");
    for view in snapshot.feature_views.values() {
        println!(
            "   {} [{}] ttl {} source {}",
            view.name,
            view.entities.join(", "),
            format_ttl(view.ttl_seconds),
            view.source.table_ref
        );
        for feature in &view.features {
            println!("      - {}: {}", feature.name, feature.value_type);
        }
    }

    Ok(())
}

/// List registered feature views
///
/// # Arguments
/// * `registry_location` - Registry path or sqlite:// URI
/// * `filter` - Optional name substring
pub async fn list(registry_location: String, filter: Option<String>) -> Result<()> {
    let registry = FeatureRegistry::open_existing(&registry_location)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to open registry: {:#}", e)))?;

    let views = registry
        .list_feature_views(filter.as_deref())
        .await
        .map_err(|e| AppError::Internal(format!("Failed to list feature views: {:#}", e)))?;

    if views.is_empty() {
        println!("No feature views found");
        return Ok(());
    }

    println!("📋 Feature Views ({} total):\n", views.len());
    println!(
        "{:<24} {:<24} {:<10} {:<8}",
        "Name", "Entities", "TTL", "Features"
    );
    println!("{}", "-".repeat(70));

    for view in &views {
        println!("{}", format_row(view));
    }

    Ok(())
}

/// Score one JSON request against the configured stores and print the outcome
pub async fn score(config_path: String, request: String) -> Result<()> {
    let config = config::load(&config_path)?;

    let body: serde_json::Value = serde_json::from_str(&request)
        .map_err(|e| AppError::BadRequest(format!("Request is not valid JSON: {}", e)))?;
    let serde_json::Value::Object(body) = body else {
        return Err(AppError::BadRequest(
            "Request must be a JSON object of entity keys".to_string(),
        ));
    };

    let context = ScoringContext::initialize(&config.scoring).await?;
    let result = context.score(&body).await;
    context.shutdown();

    let outcome = result?;
    let rendered = serde_json::to_string(&outcome)
        .map_err(|e| AppError::Internal(format!("Failed to render outcome: {}", e)))?;
    println!("{}", rendered);

    Ok(())
}

fn format_row(view: &FeatureView) -> String {
    let entities = view.entities.join(", ");
    let entities = if entities.chars().count() > 23 {
        format!("{}...", entities.chars().take(20).collect::<String>())
    } else {
        entities
    };

    format!(
        "{:<24} {:<24} {:<10} {:<8}",
        view.name,
        entities,
        format_ttl(view.ttl_seconds),
        view.features.len()
    )
}

/// Render a ttl in the largest whole unit (`2h`, `2d`, `90s`)
fn format_ttl(seconds: i64) -> String {
    const UNITS: [(i64, &str); 4] = [(604_800, "w"), (86_400, "d"), (3_600, "h"), (60, "m")];

    if seconds == 0 {
        return "none".to_string();
    }

    UNITS
        .iter()
        .find(|(size, _)| seconds % size == 0)
        .map(|(size, unit)| format!("{}{}", seconds / size, unit))
        .unwrap_or_else(|| format!("{}s", seconds))
}
