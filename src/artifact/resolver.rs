//! Locating the forest and boosted components in a loaded artifact
//!
//! Shapes are tried in a fixed order: the canonical tagged bundle, a plain
//! mapping with named pipelines, then an opaque persisted object handed to
//! the legacy scanner.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, instrument};

use super::scanner;
use super::schema::{BUNDLE_FORMAT, BUNDLE_VERSION, BundleShape, Located, ResolvedBundle};
use crate::model::decode::{CLASS_KEY, ObjectNode};
use crate::model::{Decoded, Preprocessor, SharedRegressor, decode};
use crate::{RailcastError, Result};

pub const FOREST_KEY: &str = "rf_pipe";
pub const BOOSTED_KEY: &str = "cat_pipe";
pub const ALPHA_KEY: &str = "alpha";
pub const PREPROCESSOR_KEY: &str = "preprocessor";

/// Blend weight used by named-pipeline bundles that carry no `alpha`.
pub const DEFAULT_NAMED_ALPHA: f64 = 0.7;

/// Resolve a loaded artifact into its two regression components, optional
/// shared preprocessor and blend weight.
#[instrument(level = "debug", skip(value))]
pub fn resolve(value: &Value) -> Result<ResolvedBundle> {
    let bundle = match value {
        Value::Object(map) if map.get("format").and_then(Value::as_str) == Some(BUNDLE_FORMAT) => {
            canonical(map)?
        }
        Value::Object(map) if !map.contains_key(CLASS_KEY) => named_pipelines(map)?,
        other => match ObjectNode::from_value(other) {
            Some(node) => scanner::scan(&node)?,
            None => {
                return Err(RailcastError::artifact_load(
                    "artifact root is neither a bundle mapping nor a persisted object",
                ));
            }
        },
    };
    debug!(
        shape = ?bundle.shape,
        forest = %bundle.forest.source,
        boosted = %bundle.boosted.source,
        weight = bundle.weight,
        "Resolved artifact"
    );
    Ok(bundle)
}

fn canonical(map: &Map<String, Value>) -> Result<ResolvedBundle> {
    match map.get("version").and_then(Value::as_u64) {
        Some(BUNDLE_VERSION) => {}
        other => {
            return Err(RailcastError::artifact_load(format!(
                "unsupported bundle version {other:?}, expected {BUNDLE_VERSION}"
            )));
        }
    }

    let forest = required_regressor(map, "forest")?;
    let boosted = required_regressor(map, "boosted")?;
    let preprocessor = optional_preprocessor(map, "preprocessor")?;
    let weight = match map.get("weight") {
        Some(value) => weight_value("weight", value)?,
        None => return Err(RailcastError::artifact_load("canonical bundle has no weight")),
    };

    Ok(ResolvedBundle {
        forest,
        boosted,
        preprocessor,
        weight,
        shape: BundleShape::Canonical,
    })
}

fn named_pipelines(map: &Map<String, Value>) -> Result<ResolvedBundle> {
    let forest = required_regressor(map, FOREST_KEY)?;
    let boosted = required_regressor(map, BOOSTED_KEY)?;
    let preprocessor = optional_preprocessor(map, PREPROCESSOR_KEY)?;
    let weight = match map.get(ALPHA_KEY) {
        Some(value) => weight_value(ALPHA_KEY, value)?,
        None => DEFAULT_NAMED_ALPHA,
    };

    Ok(ResolvedBundle {
        forest,
        boosted,
        preprocessor,
        weight,
        shape: BundleShape::NamedPipelines,
    })
}

fn required_regressor(map: &Map<String, Value>, key: &str) -> Result<Located<SharedRegressor>> {
    let raw = map
        .get(key)
        .filter(|v| !v.is_null())
        .ok_or_else(|| RailcastError::missing_component(key))?;
    regressor_at(key, raw)
}

/// Decode `raw` as a predictable component stored under `source`.
pub(super) fn regressor_at(source: &str, raw: &Value) -> Result<Located<SharedRegressor>> {
    match decode(raw)? {
        Decoded::Regressor(component) => Ok(Located {
            component,
            source: source.to_string(),
            raw: raw.clone(),
        }),
        _ => Err(RailcastError::artifact_load(format!(
            "'{source}' is not a predictable component ({})",
            describe(raw)
        ))),
    }
}

fn optional_preprocessor(
    map: &Map<String, Value>,
    key: &str,
) -> Result<Option<Located<Arc<Preprocessor>>>> {
    let Some(raw) = map.get(key).filter(|v| !v.is_null()) else {
        return Ok(None);
    };
    match decode(raw)? {
        Decoded::Preprocessor(component) => Ok(Some(Located {
            component,
            source: key.to_string(),
            raw: raw.clone(),
        })),
        _ => Err(RailcastError::artifact_load(format!(
            "'{key}' is not a fitted transformer ({})",
            describe(raw)
        ))),
    }
}

/// Blend weight stored under `name`; must be a number in [0, 1].
pub(super) fn weight_value(name: &str, value: &Value) -> Result<f64> {
    match value.as_f64() {
        Some(w) if (0.0..=1.0).contains(&w) => Ok(w),
        _ => Err(RailcastError::artifact_load(format!(
            "blend weight '{name}' must be a number between 0 and 1, got {value}"
        ))),
    }
}

fn describe(value: &Value) -> String {
    match ObjectNode::from_value(value) {
        Some(node) => node.signature().qualified(),
        None => match value {
            Value::Object(_) => "mapping".to_string(),
            Value::Array(_) => "list".to_string(),
            Value::String(_) => "string".to_string(),
            Value::Number(_) => "number".to_string(),
            Value::Bool(_) => "bool".to_string(),
            Value::Null => "null".to_string(),
        },
    }
}
