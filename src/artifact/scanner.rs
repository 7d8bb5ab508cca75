//! Heuristic scan of opaque persisted bundles
//!
//! Older artifacts are a single persisted object whose attribute names were
//! never fixed. The scan inspects attributes in stored order, picks
//! candidates by class name and module, and descends one level into plain
//! mappings and lists when the top level is not enough. Only the first
//! candidate of each role is decoded.
//! Successful scans log a warning so the artifact gets migrated to the
//! canonical layout.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::resolver::weight_value;
use super::schema::{BundleShape, Located, ResolvedBundle};
use crate::model::decode::{ObjectNode, is_plain_map};
use crate::model::{Decoded, Preprocessor, Regressor, SharedRegressor, TypeSignature, decode};
use crate::{RailcastError, Result};

/// Tokens that mark a gradient-boosted estimator (class name or module,
/// case-insensitive).
pub const BOOSTED_MARKERS: &[&str] = &["catboost", "xgboost", "xgb", "lightgbm", "lgbm"];

/// Class-name fragments that mark a forest.
pub const FOREST_MARKERS: &[&str] = &["RandomForest", "ExtraTrees", "Forest"];

/// Modules whose predictable classes count as forest-like.
pub const FOREST_MODULES: &[&str] = &["sklearn.ensemble", "sklearn.tree"];

pub const WEIGHT_ALIASES: &[&str] = &["alpha", "weight", "blend_weight", "w", "rf_weight"];

pub const PREPROCESSOR_ALIASES: &[&str] = &[
    "preprocessor",
    "preprocess",
    "prep",
    "transformer",
    "column_transformer",
];

/// Weight used when an opaque bundle records none.
pub const DEFAULT_LEGACY_WEIGHT: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Forest,
    Boosted,
}

/// Role of a predictable component; pipelines are judged by their final
/// estimator.
#[must_use]
pub fn classify(component: &dyn Regressor) -> Option<Role> {
    role_of(component.estimator_signature())
}

fn role_of(signature: &TypeSignature) -> Option<Role> {
    if BOOSTED_MARKERS.iter().any(|m| signature.mentions(m)) {
        Some(Role::Boosted)
    } else if FOREST_MARKERS.iter().any(|m| signature.class_name.contains(m))
        || FOREST_MODULES.iter().any(|m| signature.module.starts_with(m))
    {
        Some(Role::Forest)
    } else {
        None
    }
}

/// Role a persisted object would fill, judged from its class tags alone.
/// A `Pipeline` is judged by its last step.
#[must_use]
pub fn candidate_role(node: &ObjectNode<'_>) -> Option<Role> {
    if node.class_name == "Pipeline" {
        let last = node.attr("steps")?.as_array()?.last()?;
        let estimator = ObjectNode::from_value(last.as_array()?.get(1)?)?;
        return candidate_role(&estimator);
    }
    role_of(&node.signature())
}

#[derive(Default)]
struct Slots {
    forest: Option<Located<SharedRegressor>>,
    boosted: Option<Located<SharedRegressor>>,
}

impl Slots {
    fn complete(&self) -> bool {
        self.forest.is_some() && self.boosted.is_some()
    }

    /// Offer one attribute value; the first candidate of each role wins.
    /// Only that candidate is decoded, so unrelated attributes never fail
    /// the scan.
    fn offer(&mut self, path: &str, value: &Value) -> Result<()> {
        let Some(node) = ObjectNode::from_value(value) else {
            return Ok(());
        };
        let Some(role) = candidate_role(&node) else {
            debug!(path, class = %node.signature(), "Skipped attribute, not a forest or boosted model");
            return Ok(());
        };
        let slot = match role {
            Role::Forest => &mut self.forest,
            Role::Boosted => &mut self.boosted,
        };
        if slot.is_some() {
            return Ok(());
        }
        let Decoded::Regressor(component) = decode(value)? else {
            debug!(path, class = %node.signature(), "Skipped attribute, not predictable");
            return Ok(());
        };
        debug!(path, class = %component.signature(), ?role, "Selected attribute");
        *slot = Some(Located {
            component,
            source: path.to_string(),
            raw: value.clone(),
        });
        Ok(())
    }
}

fn nested(name: &str, value: &Value) -> Vec<(String, Value)> {
    match value {
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| (format!("{name}[{i}]"), item.clone()))
            .collect(),
        map if is_plain_map(map) => map
            .as_object()
            .into_iter()
            .flatten()
            .map(|(key, item)| (format!("{name}.{key}"), item.clone()))
            .collect(),
        _ => Vec::new(),
    }
}

/// Scan an opaque persisted object for the forest and boosted components.
#[instrument(level = "debug", skip(node), fields(class = %node.signature()))]
pub fn scan(node: &ObjectNode<'_>) -> Result<ResolvedBundle> {
    let mut slots = Slots::default();

    for (name, value) in node.attrs {
        if slots.complete() {
            break;
        }
        slots.offer(name, value)?;
    }

    if !slots.complete() {
        'outer: for (name, value) in node.attrs {
            for (path, item) in nested(name, value) {
                if slots.complete() {
                    break 'outer;
                }
                slots.offer(&path, &item)?;
            }
        }
    }

    let (Some(forest), Some(boosted)) = (slots.forest, slots.boosted) else {
        return Err(RailcastError::ComponentNotFound {
            inspected: node.attrs.keys().cloned().collect(),
        });
    };

    let weight = match WEIGHT_ALIASES
        .iter()
        .find_map(|alias| node.attr(alias).map(|v| (*alias, v)))
    {
        Some((alias, value)) => weight_value(alias, value)?,
        None => DEFAULT_LEGACY_WEIGHT,
    };

    let preprocessor = find_preprocessor(node);

    warn!(
        class = %node.signature(),
        forest = %forest.source,
        boosted = %boosted.source,
        "Resolved a legacy artifact by scanning its attributes; run `railcast migrate` to store it in the canonical layout"
    );

    Ok(ResolvedBundle {
        forest,
        boosted,
        preprocessor,
        weight,
        shape: BundleShape::LegacyObject,
    })
}

fn find_preprocessor(node: &ObjectNode<'_>) -> Option<Located<Arc<Preprocessor>>> {
    for alias in PREPROCESSOR_ALIASES {
        let Some(raw) = node.attr(alias) else {
            continue;
        };
        match decode(raw) {
            Ok(Decoded::Preprocessor(component)) => {
                return Some(Located {
                    component,
                    source: (*alias).to_string(),
                    raw: raw.clone(),
                });
            }
            Ok(_) => debug!(alias, "Skipped preprocessor alias, not a transformer"),
            Err(e) => debug!(alias, error = %e, "Skipped preprocessor alias that does not decode"),
        }
    }
    None
}
