//! Fitted model components
//!
//! Persisted estimators and transformers are decoded into Rust types that
//! run behind the [`Regressor`] trait. Nothing here trains; every parameter
//! comes from the artifact.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::features::{FeatureRow, FeatureValue};
use crate::{RailcastError, Result};

pub mod decode;
pub mod pipeline;
pub mod preprocess;
pub mod tree;

pub use decode::{Decoded, ObjectNode, decode};
pub use pipeline::Pipeline;
pub use preprocess::{ColumnTransformer, Preprocessor, TransformOutput};
pub use tree::{Aggregation, DecisionTree, TreeEnsemble, TreeNode};

/// Class name and defining module of a persisted object
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeSignature {
    pub class_name: String,
    pub module: String,
}

impl TypeSignature {
    pub fn new<C: Into<String>, M: Into<String>>(class_name: C, module: M) -> Self {
        Self {
            class_name: class_name.into(),
            module: module.into(),
        }
    }

    /// Case-insensitive substring test on class name or module.
    #[must_use]
    pub fn mentions(&self, token: &str) -> bool {
        let token = token.to_lowercase();
        self.class_name.to_lowercase().contains(&token) || self.module.to_lowercase().contains(&token)
    }

    #[must_use]
    pub fn qualified(&self) -> String {
        if self.module.is_empty() {
            self.class_name.clone()
        } else {
            format!("{}.{}", self.module, self.class_name)
        }
    }
}

impl fmt::Display for TypeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified())
    }
}

/// What a component is asked to predict on
#[derive(Debug, Clone, Copy)]
pub enum ModelInput<'a> {
    /// Raw named columns
    Row(&'a FeatureRow),
    /// Output of a fitted preprocessing step
    Dense(&'a [f64]),
}

/// Prediction output as a component returns it
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RawOutput {
    Scalar(f64),
    Vector(Vec<f64>),
    Matrix(Vec<Vec<f64>>),
}

impl RawOutput {
    #[must_use]
    pub fn flatten(&self) -> Vec<f64> {
        match self {
            RawOutput::Scalar(v) => vec![*v],
            RawOutput::Vector(v) => v.clone(),
            RawOutput::Matrix(m) => m.iter().flatten().copied().collect(),
        }
    }
}

/// A fitted regression component.
pub trait Regressor: Send + Sync + fmt::Debug {
    fn signature(&self) -> &TypeSignature;

    /// Signature used to decide the component's role; wrappers report the
    /// estimator they wrap.
    fn estimator_signature(&self) -> &TypeSignature {
        self.signature()
    }

    /// Columns the component was fitted on, when recorded.
    fn feature_names_in(&self) -> Option<&[String]> {
        None
    }

    fn predict(&self, input: &ModelInput<'_>) -> Result<RawOutput>;
}

/// Diagnostic description of a component
#[derive(Debug, Clone, Serialize)]
pub struct ComponentSummary {
    pub class_name: String,
    pub module: String,
    pub estimator: String,
    pub n_features_in: Option<usize>,
}

impl ComponentSummary {
    #[must_use]
    pub fn of(component: &dyn Regressor) -> Self {
        let signature = component.signature();
        Self {
            class_name: signature.class_name.clone(),
            module: signature.module.clone(),
            estimator: component.estimator_signature().qualified(),
            n_features_in: component.feature_names_in().map(<[String]>::len),
        }
    }
}

pub type SharedRegressor = Arc<dyn Regressor>;

/// A single input value as seen by a tree or transformer
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cell<'a> {
    Num(f64),
    Text(&'a str),
}

impl<'a> Cell<'a> {
    #[must_use]
    pub fn from_value(value: &'a FeatureValue) -> Self {
        match value {
            FeatureValue::Text(s) => Cell::Text(s),
            other => Cell::Num(other.as_f64().unwrap_or(f64::NAN)),
        }
    }
}

/// Line the input up with the columns a component was fitted on.
pub(crate) fn input_cells<'a>(
    input: &ModelInput<'a>,
    feature_names: Option<&[String]>,
    component: &str,
) -> Result<Vec<Cell<'a>>> {
    match (*input, feature_names) {
        (ModelInput::Dense(values), names) => {
            if let Some(names) = names {
                if names.len() != values.len() {
                    return Err(RailcastError::feature_mismatch(
                        component,
                        format!("expected {} features, got {}", names.len(), values.len()),
                    ));
                }
            }
            Ok(values.iter().map(|v| Cell::Num(*v)).collect())
        }
        (ModelInput::Row(row), Some(names)) => names
            .iter()
            .map(|name| {
                row.get(name).map(Cell::from_value).ok_or_else(|| {
                    RailcastError::feature_mismatch(component, format!("missing column '{name}'"))
                        .with_context("column", name.clone())
                })
            })
            .collect(),
        (ModelInput::Row(_), None) => Err(RailcastError::feature_mismatch(
            component,
            "component has no recorded feature names and cannot read a named row",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_mentions_is_case_insensitive() {
        let sig = TypeSignature::new("CatBoostRegressor", "catboost.core");
        assert!(sig.mentions("catboost"));
        assert!(sig.mentions("CATBOOST"));
        assert!(!sig.mentions("forest"));
        assert_eq!(sig.qualified(), "catboost.core.CatBoostRegressor");
    }

    #[test]
    fn test_flatten_shapes() {
        assert_eq!(RawOutput::Scalar(3.0).flatten(), vec![3.0]);
        assert_eq!(RawOutput::Vector(vec![4.0]).flatten(), vec![4.0]);
        assert_eq!(RawOutput::Matrix(vec![vec![5.0]]).flatten(), vec![5.0]);
        assert_eq!(RawOutput::Matrix(vec![vec![1.0, 2.0]]).flatten().len(), 2);
    }

    #[test]
    fn test_input_cells_by_name() {
        let row = FeatureRow::new().with("a", 1.0).with("b", "x").with("c", true);
        let names = vec!["c".to_string(), "b".to_string()];
        let cells = input_cells(&ModelInput::Row(&row), Some(names.as_slice()), "m").unwrap();
        assert_eq!(cells, vec![Cell::Num(1.0), Cell::Text("x")]);
    }

    #[test]
    fn test_input_cells_missing_column() {
        let row = FeatureRow::new().with("a", 1.0);
        let names = vec!["zzz".to_string()];
        let err = input_cells(&ModelInput::Row(&row), Some(names.as_slice()), "m").unwrap_err();
        assert_eq!(
            err.context().and_then(|c| c.get("column")).map(String::as_str),
            Some("zzz")
        );
    }

    #[test]
    fn test_input_cells_dense_length_check() {
        let names = vec!["a".to_string(), "b".to_string()];
        let values = [1.0];
        assert!(input_cells(&ModelInput::Dense(&values), Some(names.as_slice()), "m").is_err());
        assert_eq!(
            input_cells(&ModelInput::Dense(&values), None, "m").unwrap(),
            vec![Cell::Num(1.0)]
        );
    }
}
