//! Resolved bundle and its canonical on-disk form

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::features::required_columns;
use crate::model::{ComponentSummary, Preprocessor, SharedRegressor};

pub const BUNDLE_FORMAT: &str = "railcast.bundle";
pub const BUNDLE_VERSION: u64 = 1;

/// Steady-state artifact layout: components under fixed, tagged fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalBundle {
    pub format: String,
    pub version: u64,
    pub forest: Value,
    pub boosted: Value,
    pub preprocessor: Option<Value>,
    pub weight: f64,
}

/// Which layout an artifact was resolved from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BundleShape {
    Canonical,
    NamedPipelines,
    LegacyObject,
}

/// A decoded component plus the persisted value it came from
#[derive(Debug, Clone)]
pub struct Located<T> {
    pub component: T,
    /// Where in the artifact it was found, e.g. `rf_pipe` or `models[1]`
    pub source: String,
    pub raw: Value,
}

/// Outcome of resolving an artifact
#[derive(Debug, Clone)]
pub struct ResolvedBundle {
    pub forest: Located<SharedRegressor>,
    pub boosted: Located<SharedRegressor>,
    pub preprocessor: Option<Located<Arc<Preprocessor>>>,
    pub weight: f64,
    pub shape: BundleShape,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentReport {
    pub source: String,
    #[serde(flatten)]
    pub summary: ComponentSummary,
}

/// Serializable description of what a bundle contains
#[derive(Debug, Clone, Serialize)]
pub struct Composition {
    pub shape: BundleShape,
    pub forest: ComponentReport,
    pub boosted: ComponentReport,
    pub preprocessor: Option<String>,
    pub weight: f64,
    pub expected_columns: Vec<String>,
}

impl ResolvedBundle {
    /// Columns a row must carry. With a shared preprocessor these are the
    /// preprocessor's inputs; otherwise the union of both components'
    /// fitted columns. Empty when nothing records its inputs.
    #[must_use]
    pub fn expected_columns(&self) -> Vec<String> {
        match &self.preprocessor {
            Some(pre) => pre.component.feature_names_in().unwrap_or_default(),
            None => required_columns(&[
                self.forest.component.as_ref(),
                self.boosted.component.as_ref(),
            ]),
        }
    }

    #[must_use]
    pub fn composition(&self) -> Composition {
        let report = |located: &Located<SharedRegressor>| ComponentReport {
            source: located.source.clone(),
            summary: ComponentSummary::of(located.component.as_ref()),
        };
        Composition {
            shape: self.shape,
            forest: report(&self.forest),
            boosted: report(&self.boosted),
            preprocessor: self
                .preprocessor
                .as_ref()
                .map(|p| p.component.signature().qualified()),
            weight: self.weight,
            expected_columns: self.expected_columns(),
        }
    }

    /// Re-emit in canonical form; resolving the result yields the same
    /// components and weight.
    #[must_use]
    pub fn to_canonical(&self) -> CanonicalBundle {
        CanonicalBundle {
            format: BUNDLE_FORMAT.to_string(),
            version: BUNDLE_VERSION,
            forest: self.forest.raw.clone(),
            boosted: self.boosted.raw.clone(),
            preprocessor: self.preprocessor.as_ref().map(|p| p.raw.clone()),
            weight: self.weight,
        }
    }
}
