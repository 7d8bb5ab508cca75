//! Decision trees and tree ensembles.
//!
//! Trees are stored as flat node arrays; node 0 is the root. Forests average
//! their trees, boosted ensembles add scaled tree outputs to a base score.

use serde::Deserialize;

use super::{Cell, ModelInput, RawOutput, Regressor, TypeSignature, input_cells};
use crate::{RailcastError, Result};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    /// Go left if value < threshold; missing or NaN follows `default_left`
    Numeric {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        #[serde(default)]
        default_left: bool,
    },
    /// Go left if the text value is one of `categories`
    Categorical {
        feature: usize,
        categories: Vec<String>,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<TreeNode>,
}

impl DecisionTree {
    /// Check that the tree is non-empty and every child index is in range.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        let n = self.nodes.len();
        for (idx, node) in self.nodes.iter().enumerate() {
            let children = match node {
                TreeNode::Numeric { left, right, .. } | TreeNode::Categorical { left, right, .. } => {
                    [*left, *right]
                }
                TreeNode::Leaf { .. } => continue,
            };
            if let Some(child) = children.iter().find(|c| **c >= n || **c == idx) {
                return Err(format!(
                    "node {idx} references child {child} but tree has {n} nodes"
                ));
            }
        }
        Ok(())
    }

    /// Walk from the root to a leaf.
    pub fn evaluate(&self, cells: &[Cell<'_>]) -> std::result::Result<f64, String> {
        let mut idx = 0;
        // a well-formed tree reaches a leaf in fewer steps than it has nodes
        for _ in 0..=self.nodes.len() {
            let node = self
                .nodes
                .get(idx)
                .ok_or_else(|| format!("node index {idx} out of range"))?;
            idx = match node {
                TreeNode::Leaf { value } => return Ok(*value),
                TreeNode::Numeric {
                    feature,
                    threshold,
                    left,
                    right,
                    default_left,
                } => match cells.get(*feature) {
                    Some(Cell::Num(v)) if v.is_nan() => pick(*default_left, *left, *right),
                    Some(Cell::Num(v)) => pick(*v < *threshold, *left, *right),
                    Some(Cell::Text(t)) => {
                        return Err(format!(
                            "numeric split on feature {feature} got text value {t:?}"
                        ));
                    }
                    None => return Err(format!("feature index {feature} out of range")),
                },
                TreeNode::Categorical {
                    feature,
                    categories,
                    left,
                    right,
                } => match cells.get(*feature) {
                    Some(Cell::Text(t)) => pick(categories.iter().any(|c| c == t), *left, *right),
                    Some(Cell::Num(v)) => {
                        return Err(format!(
                            "categorical split on feature {feature} got numeric value {v}"
                        ));
                    }
                    None => return Err(format!("feature index {feature} out of range")),
                },
            };
        }
        Err("tree walk did not reach a leaf".to_string())
    }
}

fn pick(go_left: bool, left: usize, right: usize) -> usize {
    if go_left { left } else { right }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    /// Forest: average of tree outputs
    Mean,
    /// Boosting: base score plus learning-rate-scaled sum
    Sum,
}

#[derive(Debug, Clone)]
pub struct TreeEnsemble {
    pub signature: TypeSignature,
    pub feature_names: Option<Vec<String>>,
    pub trees: Vec<DecisionTree>,
    pub aggregation: Aggregation,
    pub base_score: f64,
    pub learning_rate: f64,
}

impl TreeEnsemble {
    pub fn new(
        signature: TypeSignature,
        feature_names: Option<Vec<String>>,
        trees: Vec<DecisionTree>,
        aggregation: Aggregation,
    ) -> std::result::Result<Self, String> {
        if trees.is_empty() {
            return Err("ensemble has no trees".to_string());
        }
        for (i, tree) in trees.iter().enumerate() {
            tree.validate().map_err(|e| format!("tree {i}: {e}"))?;
        }
        Ok(Self {
            signature,
            feature_names,
            trees,
            aggregation,
            base_score: 0.0,
            learning_rate: 1.0,
        })
    }

    #[must_use]
    pub fn with_base_score(mut self, base_score: f64) -> Self {
        self.base_score = base_score;
        self
    }

    #[must_use]
    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn predict_cells(&self, cells: &[Cell<'_>]) -> Result<f64> {
        let name = self.signature.class_name.as_str();
        let mut total = 0.0;
        for (i, tree) in self.trees.iter().enumerate() {
            total += tree.evaluate(cells).map_err(|e| {
                RailcastError::prediction_runtime(name, e).with_context("tree", i.to_string())
            })?;
        }
        Ok(match self.aggregation {
            Aggregation::Mean => self.base_score + total / self.trees.len() as f64,
            Aggregation::Sum => self.base_score + self.learning_rate * total,
        })
    }
}

impl Regressor for TreeEnsemble {
    fn signature(&self) -> &TypeSignature {
        &self.signature
    }

    fn feature_names_in(&self) -> Option<&[String]> {
        self.feature_names.as_deref()
    }

    fn predict(&self, input: &ModelInput<'_>) -> Result<RawOutput> {
        let cells = input_cells(input, self.feature_names_in(), &self.signature.class_name)?;
        Ok(RawOutput::Vector(vec![self.predict_cells(&cells)?]))
    }
}
