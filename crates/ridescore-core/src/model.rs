//! Model abstraction and artifact loading
//!
//! A `Model` is an opaque predictor loaded once per process and shared
//! read-only by all scoring requests. Artifacts are JSON documents tagged by
//! `kind`; every artifact records `feature_names`, the column order the model
//! was trained with.
//!
//! ## Artifact Layout
//!
//! ```text
//! <model dir>/model/model.json
//! ```
//!
//! ```json
//! {
//!   "kind": "logistic_regression",
//!   "feature_names": ["driver_stats__conv_rate", "driver_stats__acc_rate"],
//!   "coefficients": [1.5, -0.7],
//!   "intercept": 0.1
//! }
//! ```

use crate::{Error, FeatureTable, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Scalar model output for one input row
///
/// Untagged so a class label serializes as `1` and a regression output as `0.73`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Prediction {
    Int(i64),
    Float(f64),
}

/// Predictor capability consumed by the scoring service
pub trait Model: Send + Sync {
    /// Predict one scalar per row of `table`
    fn predict(&self, table: &FeatureTable) -> Result<Vec<Prediction>>;

    /// Training column order
    fn feature_names(&self) -> &[String];

    /// Artifact kind (for logging)
    fn kind(&self) -> &'static str;
}

/// Serialized model artifact
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelArtifact {
    LogisticRegression(LogisticRegression),
    LinearRegression(LinearRegression),
    DecisionTree(DecisionTree),
}

impl ModelArtifact {
    /// Validate the artifact and turn it into a shareable model
    pub fn into_model(self) -> Result<Arc<dyn Model>> {
        match self {
            ModelArtifact::LogisticRegression(m) => {
                m.validate()?;
                Ok(Arc::new(m))
            }
            ModelArtifact::LinearRegression(m) => {
                m.validate()?;
                Ok(Arc::new(m))
            }
            ModelArtifact::DecisionTree(m) => {
                m.validate()?;
                Ok(Arc::new(m))
            }
        }
    }
}

/// Resolve where the artifact lives
///
/// A directory is treated as a model directory (`<dir>/model/model.json`);
/// anything else is the artifact file itself.
pub fn artifact_path(path: &Path) -> PathBuf {
    if path.is_dir() {
        path.join("model").join("model.json")
    } else {
        path.to_path_buf()
    }
}

/// Load and validate a model artifact from disk
///
/// # Errors
///
/// `ModelLoad` when the artifact is missing, unreadable, not valid JSON, of an
/// unknown kind, or internally inconsistent.
pub fn load_model(path: impl AsRef<Path>) -> Result<Arc<dyn Model>> {
    let file = artifact_path(path.as_ref());

    if !file.exists() {
        return Err(Error::model_load(format!(
            "model artifact not found at {}",
            file.display()
        )));
    }

    let bytes = std::fs::read(&file).map_err(|e| {
        Error::model_load(format!("failed to read {}: {}", file.display(), e))
    })?;

    let artifact: ModelArtifact = serde_json::from_slice(&bytes).map_err(|e| {
        Error::model_load(format!("corrupt model artifact {}: {}", file.display(), e))
    })?;

    let model = artifact.into_model()?;

    tracing::info!(
        path = %file.display(),
        kind = model.kind(),
        features = model.feature_names().len(),
        "Model loaded"
    );

    Ok(model)
}

fn check_width(table: &FeatureTable, feature_names: &[String]) -> Result<()> {
    let expected = feature_names.len();
    if let Some(row) = table.rows.iter().find(|r| r.len() != expected) {
        return Err(Error::invalid_input(format!(
            "model expects {} features per row, got {}",
            expected,
            row.len()
        )));
    }
    Ok(())
}

fn dot(weights: &[f64], row: &[f64]) -> f64 {
    weights.iter().zip(row).map(|(w, x)| w * x).sum()
}

fn default_classes() -> Vec<i64> {
    vec![0, 1]
}

fn default_threshold() -> f64 {
    0.5
}

/// Binary logistic regression classifier
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogisticRegression {
    pub feature_names: Vec<String>,
    pub coefficients: Vec<f64>,
    pub intercept: f64,

    /// `[negative, positive]` labels
    #[serde(default = "default_classes")]
    pub classes: Vec<i64>,

    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

impl LogisticRegression {
    fn validate(&self) -> Result<()> {
        if self.feature_names.is_empty() {
            return Err(Error::model_load("logistic_regression has no features"));
        }
        if self.coefficients.len() != self.feature_names.len() {
            return Err(Error::model_load(format!(
                "logistic_regression has {} coefficients for {} features",
                self.coefficients.len(),
                self.feature_names.len()
            )));
        }
        if self.classes.len() != 2 {
            return Err(Error::model_load(format!(
                "logistic_regression needs exactly 2 classes, got {}",
                self.classes.len()
            )));
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(Error::model_load("threshold must be within [0, 1]"));
        }
        Ok(())
    }

    /// Positive-class probability for one row
    pub fn probability(&self, row: &[f64]) -> f64 {
        let z = dot(&self.coefficients, row) + self.intercept;
        1.0 / (1.0 + (-z).exp())
    }
}

impl Model for LogisticRegression {
    fn predict(&self, table: &FeatureTable) -> Result<Vec<Prediction>> {
        check_width(table, &self.feature_names)?;
        Ok(table
            .rows
            .iter()
            .map(|row| {
                let label = if self.probability(row) >= self.threshold {
                    self.classes[1]
                } else {
                    self.classes[0]
                };
                Prediction::Int(label)
            })
            .collect())
    }

    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn kind(&self) -> &'static str {
        "logistic_regression"
    }
}

/// Ordinary linear regression
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinearRegression {
    pub feature_names: Vec<String>,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

impl LinearRegression {
    fn validate(&self) -> Result<()> {
        if self.feature_names.is_empty() || self.coefficients.len() != self.feature_names.len() {
            return Err(Error::model_load(format!(
                "linear_regression has {} coefficients for {} features",
                self.coefficients.len(),
                self.feature_names.len()
            )));
        }
        Ok(())
    }
}

impl Model for LinearRegression {
    fn predict(&self, table: &FeatureTable) -> Result<Vec<Prediction>> {
        check_width(table, &self.feature_names)?;
        Ok(table
            .rows
            .iter()
            .map(|row| Prediction::Float(dot(&self.coefficients, row) + self.intercept))
            .collect())
    }

    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn kind(&self) -> &'static str {
        "linear_regression"
    }
}

/// Node of a flattened decision tree
///
/// Split nodes send a row left when `row[feature] <= threshold`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: Prediction,
    },
}

/// Decision tree stored as a flat node array rooted at index 0
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecisionTree {
    pub feature_names: Vec<String>,
    pub nodes: Vec<TreeNode>,
}

impl DecisionTree {
    fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(Error::model_load("decision_tree has no nodes"));
        }
        let width = self.feature_names.len();
        for (idx, node) in self.nodes.iter().enumerate() {
            if let TreeNode::Split {
                feature,
                left,
                right,
                ..
            } = node
            {
                if *feature >= width {
                    return Err(Error::model_load(format!(
                        "node {} splits on feature {} but the model has {} features",
                        idx, feature, width
                    )));
                }
                // Children must point forward so traversal always terminates
                for child in [*left, *right] {
                    if child <= idx || child >= self.nodes.len() {
                        return Err(Error::model_load(format!(
                            "node {} has invalid child index {}",
                            idx, child
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn predict_row(&self, row: &[f64]) -> Prediction {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }
}

impl Model for DecisionTree {
    fn predict(&self, table: &FeatureTable) -> Result<Vec<Prediction>> {
        check_width(table, &self.feature_names)?;
        Ok(table.rows.iter().map(|row| self.predict_row(row)).collect())
    }

    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn kind(&self) -> &'static str {
        "decision_tree"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("f{}", i)).collect()
    }

    fn table(rows: Vec<Vec<f64>>) -> FeatureTable {
        let width = rows.first().map(|r| r.len()).unwrap_or(0);
        FeatureTable {
            columns: names(width),
            rows,
        }
    }

    #[test]
    fn test_logistic_regression_predicts_labels() {
        let model = LogisticRegression {
            feature_names: names(2),
            coefficients: vec![2.0, -1.0],
            intercept: 0.0,
            classes: vec![0, 1],
            threshold: 0.5,
        };

        let out = model
            .predict(&table(vec![vec![3.0, 1.0], vec![0.0, 4.0]]))
            .unwrap();
        assert_eq!(out, vec![Prediction::Int(1), Prediction::Int(0)]);
    }

    #[test]
    fn test_width_mismatch_is_rejected() {
        let model = LinearRegression {
            feature_names: names(3),
            coefficients: vec![1.0, 1.0, 1.0],
            intercept: 0.0,
        };
        let err = model.predict(&table(vec![vec![1.0, 2.0]])).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_decision_tree_traversal() {
        let tree: ModelArtifact = serde_json::from_value(json!({
            "kind": "decision_tree",
            "feature_names": ["f0", "f1"],
            "nodes": [
                {"feature": 0, "threshold": 0.5, "left": 1, "right": 2},
                {"value": 0},
                {"feature": 1, "threshold": 10.0, "left": 3, "right": 4},
                {"value": 0},
                {"value": 1}
            ]
        }))
        .unwrap();
        let model = tree.into_model().unwrap();

        let out = model
            .predict(&table(vec![vec![0.2, 50.0], vec![0.9, 5.0], vec![0.9, 12.0]]))
            .unwrap();
        assert_eq!(
            out,
            vec![Prediction::Int(0), Prediction::Int(0), Prediction::Int(1)]
        );
    }

    #[test]
    fn test_decision_tree_rejects_backward_edges() {
        let tree: ModelArtifact = serde_json::from_value(json!({
            "kind": "decision_tree",
            "feature_names": ["f0"],
            "nodes": [
                {"feature": 0, "threshold": 0.5, "left": 0, "right": 1},
                {"value": 1}
            ]
        }))
        .unwrap();
        assert!(matches!(tree.into_model(), Err(Error::ModelLoad(_))));
    }

    #[test]
    fn test_load_model_from_model_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("model")).unwrap();
        std::fs::write(
            dir.path().join("model").join("model.json"),
            json!({
                "kind": "linear_regression",
                "feature_names": ["f0"],
                "coefficients": [2.0],
                "intercept": 1.0
            })
            .to_string(),
        )
        .unwrap();

        let model = load_model(dir.path()).unwrap();
        assert_eq!(model.kind(), "linear_regression");
        let out = model.predict(&table(vec![vec![3.0]])).unwrap();
        assert_eq!(out, vec![Prediction::Float(7.0)]);
    }

    #[test]
    fn test_load_model_missing_and_corrupt() {
        let dir = TempDir::new().unwrap();
        let missing = load_model(dir.path().join("nope.json"));
        assert!(matches!(missing, Err(Error::ModelLoad(_))));

        let corrupt = dir.path().join("model.json");
        std::fs::write(&corrupt, "not json at all").unwrap();
        assert!(matches!(load_model(&corrupt), Err(Error::ModelLoad(_))));

        let unknown = dir.path().join("unknown.json");
        std::fs::write(&unknown, r#"{"kind": "random_forest", "feature_names": []}"#).unwrap();
        assert!(matches!(load_model(&unknown), Err(Error::ModelLoad(_))));
    }

    #[test]
    fn test_prediction_serializes_untagged() {
        let out = vec![Prediction::Int(1), Prediction::Float(0.25)];
        assert_eq!(serde_json::to_string(&out).unwrap(), "[1,0.25]");
    }
}
