//! Lookup planning shared by the online providers
//!
//! A request is split per feature view: each view gets one online key per
//! entity row. Providers fetch the records for those keys however their store
//! allows, then `assemble` turns them into one vector per entity row.

use crate::record::OnlineRecord;
use chrono::{DateTime, Utc};
use ridescore_core::provider::group_by_view;
use ridescore_core::{
    build_online_key, EntityRow, Error, FeatureRef, FeatureValue, FeatureVector, FeatureView,
    OnlineFeatures, RegistrySnapshot, Result,
};

pub(crate) struct ViewLookup<'a> {
    pub view: &'a FeatureView,
    pub refs: Vec<&'a FeatureRef>,
    /// One online key per entity row, in row order
    pub keys: Vec<String>,
}

pub(crate) fn plan<'a>(
    snapshot: &'a RegistrySnapshot,
    feature_refs: &'a [FeatureRef],
    entity_rows: &[EntityRow],
) -> Result<Vec<ViewLookup<'a>>> {
    snapshot.resolve(feature_refs)?;

    group_by_view(feature_refs)
        .into_iter()
        .map(|(name, refs)| {
            let view = snapshot
                .feature_view(name)
                .ok_or_else(|| Error::config(format!("feature view '{}' is not registered", name)))?;

            let keys = entity_rows
                .iter()
                .map(|row| {
                    snapshot
                        .keys_for_view(name, row)
                        .map(|keys| build_online_key(name, &keys))
                })
                .collect::<Result<Vec<_>>>()?;

            Ok(ViewLookup { view, refs, keys })
        })
        .collect()
}

/// Combine fetched records into one vector per entity row
///
/// `fetched[i][j]` is the record for view `lookups[i]` and entity row `j`.
/// Missing and expired records leave their features null.
pub(crate) fn assemble(
    feature_refs: &[FeatureRef],
    entity_rows: &[EntityRow],
    lookups: &[ViewLookup<'_>],
    fetched: Vec<Vec<Option<OnlineRecord>>>,
    now: DateTime<Utc>,
) -> OnlineFeatures {
    let mut rows: Vec<FeatureVector> = entity_rows
        .iter()
        .map(|entities| {
            let mut vector = FeatureVector::new(entities.clone());
            for r in feature_refs {
                vector.insert(r, FeatureValue::Null);
            }
            vector
        })
        .collect();

    for (lookup, records) in lookups.iter().zip(fetched) {
        for (vector, record) in rows.iter_mut().zip(records) {
            let Some(record) = record else { continue };
            if !record.is_fresh(lookup.view, now) {
                tracing::debug!(feature_view = %lookup.view.name, "Skipping expired online record");
                continue;
            }
            for r in &lookup.refs {
                if let Some(value) = record.features.get(&r.feature) {
                    vector.insert(r, value.clone());
                }
            }
        }
    }

    OnlineFeatures::new(feature_refs.to_vec(), rows)
}

/// Online key for a row written to `feature_view`
///
/// Only the view's join keys take part in the key; extra entity columns on
/// the row are ignored.
pub(crate) fn write_key(
    snapshot: &RegistrySnapshot,
    feature_view: &str,
    entities: &EntityRow,
) -> Result<String> {
    let keys = snapshot.keys_for_view(feature_view, entities)?;
    Ok(build_online_key(feature_view, &keys))
}
