//! Preprocessing steps chained in front of a final estimator
//!
//! Intermediate outputs are densified between steps. The pipeline reports
//! the signature of its final estimator through `estimator_signature`.

use std::sync::Arc;

use super::{ModelInput, Preprocessor, RawOutput, Regressor, SharedRegressor, TypeSignature};
use crate::Result;

/// Transform steps followed by a final estimator.
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub signature: TypeSignature,
    pub steps: Vec<(String, Arc<Preprocessor>)>,
    pub estimator: SharedRegressor,
    feature_names: Option<Vec<String>>,
}

impl Pipeline {
    #[must_use]
    pub fn new(
        signature: TypeSignature,
        steps: Vec<(String, Arc<Preprocessor>)>,
        estimator: SharedRegressor,
    ) -> Self {
        // first step that recorded its inputs, else the estimator
        let feature_names = steps
            .iter()
            .find_map(|(_, step)| step.feature_names_in())
            .or_else(|| estimator.feature_names_in().map(<[String]>::to_vec));
        Self {
            signature,
            steps,
            estimator,
            feature_names,
        }
    }

    /// Use the columns recorded on the pipeline itself.
    #[must_use]
    pub fn with_feature_names(mut self, names: Vec<String>) -> Self {
        self.feature_names = Some(names);
        self
    }
}

impl Regressor for Pipeline {
    fn signature(&self) -> &TypeSignature {
        &self.signature
    }

    fn estimator_signature(&self) -> &TypeSignature {
        self.estimator.estimator_signature()
    }

    fn feature_names_in(&self) -> Option<&[String]> {
        self.feature_names.as_deref()
    }

    fn predict(&self, input: &ModelInput<'_>) -> Result<RawOutput> {
        let mut current: Option<Vec<f64>> = None;
        for (name, step) in &self.steps {
            let step_input = match &current {
                Some(values) => ModelInput::Dense(values),
                None => *input,
            };
            let out = step
                .transform(&step_input)
                .map_err(|e| e.with_context("step", name.clone()))?;
            current = Some(out.densify());
        }

        let output = match &current {
            Some(values) => self.estimator.predict(&ModelInput::Dense(values)),
            None => self.estimator.predict(input),
        };
        output.map_err(|e| e.with_context("step", self.estimator.signature().class_name.clone()))
    }
}
