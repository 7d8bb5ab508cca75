//! Fitted preprocessing transforms
//!
//! A [`ColumnTransformer`] maps named row columns to a numeric vector by
//! routing column groups through one-hot encoding, scaling, imputation or
//! passthrough. One-hot blocks may produce sparse output; the whole result
//! stays sparse only while its density is below `sparse_threshold`.

use serde::Deserialize;

use super::{Cell, ModelInput, TypeSignature, input_cells};
use crate::features::FeatureRow;
use crate::{RailcastError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum TransformOutput {
    Dense(Vec<f64>),
    Sparse {
        len: usize,
        entries: Vec<(usize, f64)>,
    },
}

impl TransformOutput {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            TransformOutput::Dense(v) => v.len(),
            TransformOutput::Sparse { len, .. } => *len,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn is_sparse(&self) -> bool {
        matches!(self, TransformOutput::Sparse { .. })
    }

    fn non_zero(&self) -> usize {
        match self {
            TransformOutput::Dense(v) => v.iter().filter(|x| **x != 0.0).count(),
            TransformOutput::Sparse { entries, .. } => {
                entries.iter().filter(|(_, x)| *x != 0.0).count()
            }
        }
    }

    #[must_use]
    pub fn densify(self) -> Vec<f64> {
        match self {
            TransformOutput::Dense(v) => v,
            TransformOutput::Sparse { len, entries } => {
                let mut dense = vec![0.0; len];
                for (idx, value) in entries {
                    if let Some(slot) = dense.get_mut(idx) {
                        *slot = value;
                    }
                }
                dense
            }
        }
    }

    /// Concatenate blocks column-wise.
    fn hstack(parts: Vec<TransformOutput>, sparse_threshold: f64) -> TransformOutput {
        let any_sparse = parts.iter().any(TransformOutput::is_sparse);
        let len: usize = parts.iter().map(TransformOutput::len).sum();
        let non_zero: usize = parts.iter().map(TransformOutput::non_zero).sum();
        let density = if len == 0 { 1.0 } else { non_zero as f64 / len as f64 };

        if any_sparse && density < sparse_threshold {
            let mut entries = Vec::with_capacity(non_zero);
            let mut offset = 0;
            for part in parts {
                let width = part.len();
                match part {
                    TransformOutput::Dense(v) => entries.extend(
                        v.into_iter()
                            .enumerate()
                            .filter(|(_, x)| *x != 0.0)
                            .map(|(i, x)| (offset + i, x)),
                    ),
                    TransformOutput::Sparse { entries: e, .. } => {
                        entries.extend(e.into_iter().map(|(i, x)| (offset + i, x)));
                    }
                }
                offset += width;
            }
            TransformOutput::Sparse { len, entries }
        } else {
            TransformOutput::Dense(parts.into_iter().flat_map(TransformOutput::densify).collect())
        }
    }
}

/// A fitted category; encoders may be fitted on text or numeric codes
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Category {
    Num(f64),
    Text(String),
}

impl Category {
    fn matches(&self, cell: &Cell<'_>) -> bool {
        match (self, cell) {
            (Category::Text(c), Cell::Text(v)) => c == v,
            (Category::Num(c), Cell::Num(v)) => c == v,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleUnknown {
    Error,
    Ignore,
}

fn default_handle_unknown() -> HandleUnknown {
    HandleUnknown::Error
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OneHotEncoder {
    #[serde(rename = "categories_")]
    pub categories: Vec<Vec<Category>>,
    #[serde(default = "default_handle_unknown")]
    pub handle_unknown: HandleUnknown,
    #[serde(default = "default_true", alias = "sparse")]
    pub sparse_output: bool,
    #[serde(default, rename = "feature_names_in_")]
    pub feature_names: Option<Vec<String>>,
}

impl OneHotEncoder {
    fn encode(&self, cells: &[Cell<'_>], columns: &[String]) -> Result<TransformOutput> {
        check_width("OneHotEncoder", self.categories.len(), cells.len())?;
        let mut entries = Vec::with_capacity(cells.len());
        let mut offset = 0;
        for (i, (cell, categories)) in cells.iter().zip(&self.categories).enumerate() {
            match categories.iter().position(|c| c.matches(cell)) {
                Some(pos) => entries.push((offset + pos, 1.0)),
                None if self.handle_unknown == HandleUnknown::Ignore => {}
                None => {
                    let column = columns.get(i).cloned().unwrap_or_else(|| i.to_string());
                    let shown = match cell {
                        Cell::Text(t) => (*t).to_string(),
                        Cell::Num(v) => v.to_string(),
                    };
                    return Err(RailcastError::feature_mismatch(
                        "OneHotEncoder",
                        format!("value {shown:?} in column '{column}' was not seen during fitting"),
                    )
                    .with_context("column", column)
                    .with_context("value", shown));
                }
            }
            offset += categories.len();
        }
        let out = TransformOutput::Sparse { len: offset, entries };
        Ok(if self.sparse_output {
            out
        } else {
            TransformOutput::Dense(out.densify())
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StandardScaler {
    #[serde(default, rename = "mean_")]
    pub mean: Option<Vec<f64>>,
    #[serde(default, rename = "scale_")]
    pub scale: Option<Vec<f64>>,
    #[serde(default, rename = "feature_names_in_")]
    pub feature_names: Option<Vec<String>>,
}

impl StandardScaler {
    fn scale(&self, cells: &[Cell<'_>], columns: &[String]) -> Result<TransformOutput> {
        let values = numeric("StandardScaler", cells, columns)?;
        if let Some(mean) = &self.mean {
            check_width("StandardScaler", mean.len(), values.len())?;
        }
        if let Some(scale) = &self.scale {
            check_width("StandardScaler", scale.len(), values.len())?;
        }
        Ok(TransformOutput::Dense(
            values
                .iter()
                .enumerate()
                .map(|(i, x)| {
                    let centered = x - self.mean.as_ref().map_or(0.0, |m| m[i]);
                    match self.scale.as_ref().map(|s| s[i]) {
                        Some(s) if s != 0.0 => centered / s,
                        _ => centered,
                    }
                })
                .collect(),
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SimpleImputer {
    #[serde(rename = "statistics_")]
    pub statistics: Vec<f64>,
    #[serde(default, rename = "feature_names_in_")]
    pub feature_names: Option<Vec<String>>,
}

impl SimpleImputer {
    fn impute(&self, cells: &[Cell<'_>], columns: &[String]) -> Result<TransformOutput> {
        let values = numeric("SimpleImputer", cells, columns)?;
        check_width("SimpleImputer", self.statistics.len(), values.len())?;
        Ok(TransformOutput::Dense(
            values
                .iter()
                .zip(&self.statistics)
                .map(|(x, fill)| if x.is_nan() { *fill } else { *x })
                .collect(),
        ))
    }
}

fn check_width(owner: &str, fitted: usize, got: usize) -> Result<()> {
    if fitted == got {
        Ok(())
    } else {
        Err(RailcastError::feature_mismatch(
            owner,
            format!("fitted on {fitted} columns, got {got}"),
        ))
    }
}

fn numeric(owner: &str, cells: &[Cell<'_>], columns: &[String]) -> Result<Vec<f64>> {
    cells
        .iter()
        .enumerate()
        .map(|(i, cell)| match cell {
            Cell::Num(v) => Ok(*v),
            Cell::Text(t) => {
                let column = columns.get(i).cloned().unwrap_or_else(|| i.to_string());
                Err(RailcastError::feature_mismatch(
                    owner,
                    format!("column '{column}' holds text {t:?} where a number is expected"),
                )
                .with_context("column", column))
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum Transformer {
    OneHot(OneHotEncoder),
    Scaler(StandardScaler),
    Imputer(SimpleImputer),
    Passthrough,
    Drop,
}

impl Transformer {
    fn apply(&self, cells: &[Cell<'_>], columns: &[String]) -> Result<TransformOutput> {
        match self {
            Transformer::OneHot(t) => t.encode(cells, columns),
            Transformer::Scaler(t) => t.scale(cells, columns),
            Transformer::Imputer(t) => t.impute(cells, columns),
            Transformer::Passthrough => Ok(TransformOutput::Dense(numeric(
                "passthrough",
                cells,
                columns,
            )?)),
            Transformer::Drop => Ok(TransformOutput::Dense(Vec::new())),
        }
    }

    #[must_use]
    pub fn feature_names(&self) -> Option<&[String]> {
        match self {
            Transformer::OneHot(t) => t.feature_names.as_deref(),
            Transformer::Scaler(t) => t.feature_names.as_deref(),
            Transformer::Imputer(t) => t.feature_names.as_deref(),
            Transformer::Passthrough | Transformer::Drop => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Remainder {
    Drop,
    Passthrough,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnBlock {
    pub name: String,
    pub transformer: Transformer,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnTransformer {
    pub signature: TypeSignature,
    pub blocks: Vec<ColumnBlock>,
    pub remainder: Remainder,
    pub sparse_threshold: f64,
    pub feature_names: Option<Vec<String>>,
}

impl ColumnTransformer {
    /// Columns the transformer reads, in fitted order.
    #[must_use]
    pub fn input_columns(&self) -> Vec<String> {
        match &self.feature_names {
            Some(names) => names.clone(),
            None => crate::features::union_columns(self.blocks.iter().map(|b| b.columns.as_slice())),
        }
    }

    pub fn transform(&self, row: &FeatureRow) -> Result<TransformOutput> {
        let mut parts = Vec::with_capacity(self.blocks.len() + 1);
        for block in &self.blocks {
            let cells = input_cells(&ModelInput::Row(row), Some(block.columns.as_slice()), &block.name)?;
            let out = block
                .transformer
                .apply(&cells, &block.columns)
                .map_err(|e| e.with_context("step", block.name.clone()))?;
            parts.push(out);
        }

        if self.remainder == Remainder::Passthrough {
            let rest: Vec<String> = self
                .input_columns()
                .into_iter()
                .filter(|c| !self.blocks.iter().any(|b| b.columns.contains(c)))
                .collect();
            let cells = input_cells(&ModelInput::Row(row), Some(rest.as_slice()), "remainder")?;
            parts.push(TransformOutput::Dense(numeric("remainder", &cells, &rest)?));
        }

        Ok(TransformOutput::hstack(parts, self.sparse_threshold))
    }
}

/// A fitted transform shared by both ensemble components, or a pipeline step
#[derive(Debug, Clone, PartialEq)]
pub enum Preprocessor {
    /// Named-column transform; reads a feature row
    Columns(ColumnTransformer),
    /// Positional scaler or imputer; reads a row by its fitted names or a
    /// dense vector by position
    Elementwise {
        signature: TypeSignature,
        transformer: Transformer,
    },
}

impl Preprocessor {
    #[must_use]
    pub fn signature(&self) -> &TypeSignature {
        match self {
            Preprocessor::Columns(ct) => &ct.signature,
            Preprocessor::Elementwise { signature, .. } => signature,
        }
    }

    #[must_use]
    pub fn feature_names_in(&self) -> Option<Vec<String>> {
        match self {
            Preprocessor::Columns(ct) => Some(ct.input_columns()),
            Preprocessor::Elementwise { transformer, .. } => {
                transformer.feature_names().map(<[String]>::to_vec)
            }
        }
    }

    pub fn transform(&self, input: &ModelInput<'_>) -> Result<TransformOutput> {
        let owner = self.signature().class_name.clone();
        match (self, input) {
            (Preprocessor::Columns(ct), ModelInput::Row(row)) => ct.transform(row),
            (Preprocessor::Columns(_), ModelInput::Dense(_)) => Err(RailcastError::feature_mismatch(
                owner,
                "column transformer needs named columns, got a dense vector",
            )),
            (Preprocessor::Elementwise { transformer, .. }, input) => {
                let names = transformer.feature_names();
                let cells = input_cells(input, names, &owner)?;
                let columns = names.map(<[String]>::to_vec).unwrap_or_default();
                transformer.apply(&cells, &columns)
            }
        }
    }
}
