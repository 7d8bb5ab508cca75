//! Decoding persisted object nodes into runnable components
//!
//! A persisted object is `{"__class__", "__module__", "__dict__"}`. Known
//! classes decode into [`TreeEnsemble`], [`Pipeline`] or [`Preprocessor`];
//! anything else is [`Decoded::Opaque`]. A known class with malformed fitted
//! state is an artifact load error, never silently opaque.

use std::sync::{Arc, LazyLock};

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::preprocess::{
    ColumnBlock, ColumnTransformer, OneHotEncoder, Remainder, SimpleImputer, StandardScaler,
    Transformer,
};
use super::{
    Aggregation, DecisionTree, Pipeline, Preprocessor, SharedRegressor, TreeEnsemble,
    TypeSignature,
};
use crate::{RailcastError, Result};

pub const CLASS_KEY: &str = "__class__";
pub const MODULE_KEY: &str = "__module__";
pub const DICT_KEY: &str = "__dict__";

/// Estimators that average their trees.
pub const FOREST_CLASSES: &[&str] = &[
    "RandomForestRegressor",
    "ExtraTreesRegressor",
    "DecisionTreeRegressor",
];

/// Estimators that sum scaled trees onto a base score.
pub const BOOSTED_CLASSES: &[&str] = &[
    "CatBoostRegressor",
    "XGBRegressor",
    "LGBMRegressor",
    "GradientBoostingRegressor",
    "HistGradientBoostingRegressor",
];

static EMPTY_DICT: LazyLock<Map<String, Value>> = LazyLock::new(Map::new);

/// Borrowed view of a persisted object
#[derive(Debug, Clone, Copy)]
pub struct ObjectNode<'a> {
    pub class_name: &'a str,
    pub module: &'a str,
    pub attrs: &'a Map<String, Value>,
}

impl<'a> ObjectNode<'a> {
    /// View `value` as an object node; plain maps and scalars are not.
    #[must_use]
    pub fn from_value(value: &'a Value) -> Option<Self> {
        let map = value.as_object()?;
        let class_name = map.get(CLASS_KEY)?.as_str()?;
        let module = map.get(MODULE_KEY).and_then(Value::as_str).unwrap_or("");
        let attrs = map
            .get(DICT_KEY)
            .and_then(Value::as_object)
            .unwrap_or(&*EMPTY_DICT);
        Some(Self {
            class_name,
            module,
            attrs,
        })
    }

    #[must_use]
    pub fn signature(&self) -> TypeSignature {
        TypeSignature::new(self.class_name, self.module)
    }

    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&'a Value> {
        self.attrs.get(name)
    }

    fn state<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(Value::Object(self.attrs.clone())).map_err(|e| self.malformed(e))
    }

    fn malformed<E: std::fmt::Display>(&self, reason: E) -> RailcastError {
        RailcastError::artifact_load(format!(
            "{} has invalid fitted state: {reason}",
            self.signature()
        ))
    }
}

/// True when `value` is a JSON object without a class tag.
#[must_use]
pub fn is_plain_map(value: &Value) -> bool {
    value.as_object().is_some_and(|m| !m.contains_key(CLASS_KEY))
}

/// What a persisted value turned out to be
#[derive(Debug, Clone)]
pub enum Decoded {
    Regressor(SharedRegressor),
    Preprocessor(Arc<Preprocessor>),
    Opaque,
}

impl Decoded {
    #[must_use]
    pub fn regressor(&self) -> Option<&SharedRegressor> {
        match self {
            Decoded::Regressor(r) => Some(r),
            _ => None,
        }
    }

    #[must_use]
    pub fn preprocessor(&self) -> Option<&Arc<Preprocessor>> {
        match self {
            Decoded::Preprocessor(p) => Some(p),
            _ => None,
        }
    }
}

fn default_learning_rate() -> f64 {
    1.0
}

#[derive(Deserialize)]
struct TreeEnsembleState {
    #[serde(default, rename = "feature_names_in_")]
    feature_names: Option<Vec<String>>,
    trees: Vec<DecisionTree>,
    #[serde(default)]
    base_score: f64,
    #[serde(default = "default_learning_rate")]
    learning_rate: f64,
    #[serde(default)]
    aggregation: Option<String>,
}

fn default_sparse_threshold() -> f64 {
    0.3
}

fn default_remainder() -> Remainder {
    Remainder::Drop
}

#[derive(Deserialize)]
struct ColumnTransformerState {
    #[serde(alias = "transformers_")]
    transformers: Vec<(String, Value, Vec<String>)>,
    #[serde(default = "default_remainder")]
    remainder: Remainder,
    #[serde(default = "default_sparse_threshold")]
    sparse_threshold: f64,
    #[serde(default, rename = "feature_names_in_")]
    feature_names: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct PipelineState {
    steps: Vec<(String, Value)>,
    #[serde(default, rename = "feature_names_in_")]
    feature_names: Option<Vec<String>>,
}

/// Decode a persisted value.
pub fn decode(value: &Value) -> Result<Decoded> {
    let Some(node) = ObjectNode::from_value(value) else {
        return Ok(Decoded::Opaque);
    };

    if FOREST_CLASSES.contains(&node.class_name) {
        return tree_ensemble(&node, Aggregation::Mean).map(|e| Decoded::Regressor(Arc::new(e)));
    }
    if BOOSTED_CLASSES.contains(&node.class_name) {
        return tree_ensemble(&node, Aggregation::Sum).map(|e| Decoded::Regressor(Arc::new(e)));
    }

    match node.class_name {
        "Pipeline" => pipeline(&node).map(|p| Decoded::Regressor(Arc::new(p))),
        "ColumnTransformer" => column_transformer(&node)
            .map(|ct| Decoded::Preprocessor(Arc::new(Preprocessor::Columns(ct)))),
        _ => match transformer(&node)? {
            Some(t) => Ok(Decoded::Preprocessor(Arc::new(Preprocessor::Elementwise {
                signature: node.signature(),
                transformer: t,
            }))),
            // custom estimators that follow the tree layout
            None if node.attr("trees").is_some() => {
                tree_ensemble(&node, Aggregation::Mean).map(|e| Decoded::Regressor(Arc::new(e)))
            }
            None => Ok(Decoded::Opaque),
        },
    }
}

fn tree_ensemble(node: &ObjectNode<'_>, aggregation: Aggregation) -> Result<TreeEnsemble> {
    let state: TreeEnsembleState = node.state()?;
    let aggregation = match state.aggregation.as_deref() {
        None => aggregation,
        Some("mean") => Aggregation::Mean,
        Some("sum") => Aggregation::Sum,
        Some(other) => return Err(node.malformed(format!("unknown aggregation '{other}'"))),
    };
    Ok(
        TreeEnsemble::new(node.signature(), state.feature_names, state.trees, aggregation)
            .map_err(|e| node.malformed(e))?
            .with_base_score(state.base_score)
            .with_learning_rate(state.learning_rate),
    )
}

fn transformer(node: &ObjectNode<'_>) -> Result<Option<Transformer>> {
    Ok(Some(match node.class_name {
        "OneHotEncoder" => Transformer::OneHot(node.state::<OneHotEncoder>()?),
        "StandardScaler" => Transformer::Scaler(node.state::<StandardScaler>()?),
        "SimpleImputer" => Transformer::Imputer(node.state::<SimpleImputer>()?),
        _ => return Ok(None),
    }))
}

fn column_transformer(node: &ObjectNode<'_>) -> Result<ColumnTransformer> {
    let state: ColumnTransformerState = node.state()?;
    let mut blocks = Vec::with_capacity(state.transformers.len());
    for (name, spec, columns) in state.transformers {
        let transformer = match &spec {
            Value::String(s) if s == "passthrough" => Transformer::Passthrough,
            Value::String(s) if s == "drop" => Transformer::Drop,
            other => ObjectNode::from_value(other)
                .map(|inner| transformer(&inner))
                .transpose()?
                .flatten()
                .ok_or_else(|| node.malformed(format!("step '{name}' is not a known transformer")))?,
        };
        blocks.push(ColumnBlock {
            name,
            transformer,
            columns,
        });
    }
    Ok(ColumnTransformer {
        signature: node.signature(),
        blocks,
        remainder: state.remainder,
        sparse_threshold: state.sparse_threshold,
        feature_names: state.feature_names,
    })
}

fn pipeline(node: &ObjectNode<'_>) -> Result<Pipeline> {
    let state: PipelineState = node.state()?;
    let Some(((last_name, last), head)) = state.steps.split_last() else {
        return Err(node.malformed("pipeline has no steps"));
    };

    let mut steps = Vec::with_capacity(head.len());
    for (name, value) in head {
        if value.is_null() || value.as_str() == Some("passthrough") {
            continue;
        }
        match decode(value)? {
            Decoded::Preprocessor(p) => steps.push((name.clone(), p)),
            _ => return Err(node.malformed(format!("step '{name}' is not a transformer"))),
        }
    }

    let estimator = match decode(last)? {
        Decoded::Regressor(r) => r,
        _ => {
            return Err(node.malformed(format!(
                "final step '{last_name}' is not a regression estimator"
            )));
        }
    };

    let pipe = Pipeline::new(node.signature(), steps, estimator);
    Ok(match state.feature_names {
        Some(names) => pipe.with_feature_names(names),
        None => pipe,
    })
}
