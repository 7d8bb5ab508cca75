//! Weighted two-model ensemble prediction
//!
//! The row goes through the optional shared preprocessor once; both
//! components then see the same input. Each must yield exactly one value,
//! and the two are blended as `weight * forest + (1 - weight) * boosted`.
//! Failures inside a component, panics included, come back as request-level
//! errors and leave the bundle usable.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, instrument};

use crate::artifact::ResolvedBundle;
use crate::features::FeatureRow;
use crate::model::{ModelInput, Preprocessor, RawOutput, Regressor};
use crate::{RailcastError, Result};

/// `weight * forest + (1 - weight) * boosted`
#[must_use]
pub fn blend(weight: f64, forest: f64, boosted: f64) -> f64 {
    weight * forest + (1.0 - weight) * boosted
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PredictionResult {
    /// Blended prediction
    pub value: f64,
    pub forest: f64,
    pub boosted: f64,
    pub weight: f64,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Run `f`, turning a panic into a runtime error attributed to `component`.
fn guarded<T, F>(component: &str, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(component, %message, "Component panicked during prediction");
            Err(RailcastError::prediction_runtime(
                component,
                format!("component panicked: {message}"),
            ))
        }
    }
}

/// Reduce a component's raw output to its single predicted value.
fn single_value(component: &str, output: &RawOutput) -> Result<f64> {
    match output.flatten().as_slice() {
        [value] if value.is_finite() => Ok(*value),
        [value] => Err(RailcastError::prediction_runtime(
            component,
            format!("produced a non-finite value ({value})"),
        )),
        values => Err(RailcastError::prediction_runtime(
            component,
            format!("expected exactly one predicted value, got {}", values.len()),
        )),
    }
}

fn run_component(
    role: &str,
    component: &dyn Regressor,
    input: &ModelInput<'_>,
    row: &FeatureRow,
) -> Result<f64> {
    guarded(role, || {
        let output = component.predict(input)?;
        single_value(role, &output)
    })
    .map_err(|e| {
        e.in_component(role)
            .with_context("class", component.signature().qualified())
            .with_context("row", row.summary())
    })
}

/// Predict one row with the given components and blend weight.
#[instrument(level = "debug", skip(row, forest, boosted, preprocessor))]
pub fn predict(
    row: &FeatureRow,
    forest: &dyn Regressor,
    boosted: &dyn Regressor,
    preprocessor: Option<&Preprocessor>,
    weight: f64,
) -> Result<PredictionResult> {
    let transformed = match preprocessor {
        Some(pre) => {
            let out = guarded("preprocessor", || pre.transform(&ModelInput::Row(row))).map_err(
                |e| {
                    e.in_component("preprocessor")
                        .with_context("class", pre.signature().qualified())
                        .with_context("row", row.summary())
                },
            )?;
            Some(out.densify())
        }
        None => None,
    };
    let input = match &transformed {
        Some(values) => ModelInput::Dense(values),
        None => ModelInput::Row(row),
    };

    let forest_value = run_component("forest", forest, &input, row)?;
    let boosted_value = run_component("boosted", boosted, &input, row)?;
    let value = blend(weight, forest_value, boosted_value);
    debug!(forest = forest_value, boosted = boosted_value, value, "Blended prediction");

    Ok(PredictionResult {
        value,
        forest: forest_value,
        boosted: boosted_value,
        weight,
    })
}

/// Predictor bound to a resolved bundle
#[derive(Debug, Clone)]
pub struct EnsemblePredictor {
    bundle: Arc<ResolvedBundle>,
}

impl EnsemblePredictor {
    #[must_use]
    pub fn new(bundle: Arc<ResolvedBundle>) -> Self {
        Self { bundle }
    }

    #[must_use]
    pub fn bundle(&self) -> &ResolvedBundle {
        &self.bundle
    }

    pub fn predict(&self, row: &FeatureRow) -> Result<PredictionResult> {
        predict(
            row,
            self.bundle.forest.component.as_ref(),
            self.bundle.boosted.component.as_ref(),
            self.bundle.preprocessor.as_ref().map(|p| p.component.as_ref()),
            self.bundle.weight,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TypeSignature;
    use crate::model::preprocess::{SimpleImputer, Transformer};
    use rstest::rstest;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Fixed {
        signature: TypeSignature,
        output: RawOutput,
    }

    impl Fixed {
        fn new(output: RawOutput) -> Self {
            Self {
                signature: TypeSignature::new("FixedRegressor", "tests"),
                output,
            }
        }
    }

    impl Regressor for Fixed {
        fn signature(&self) -> &TypeSignature {
            &self.signature
        }

        fn predict(&self, _input: &ModelInput<'_>) -> Result<RawOutput> {
            Ok(self.output.clone())
        }
    }

    #[derive(Debug)]
    struct Exploding {
        signature: TypeSignature,
        calls: AtomicUsize,
    }

    impl Regressor for Exploding {
        fn signature(&self) -> &TypeSignature {
            &self.signature
        }

        fn predict(&self, _input: &ModelInput<'_>) -> Result<RawOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            panic!("index out of bounds");
        }
    }

    /// Sums whatever dense input it receives.
    #[derive(Debug)]
    struct Width {
        signature: TypeSignature,
    }

    impl Regressor for Width {
        fn signature(&self) -> &TypeSignature {
            &self.signature
        }

        fn predict(&self, input: &ModelInput<'_>) -> Result<RawOutput> {
            match input {
                ModelInput::Dense(values) => Ok(RawOutput::Scalar(values.iter().sum())),
                ModelInput::Row(_) => Err(RailcastError::feature_mismatch("width", "expected dense")),
            }
        }
    }

    #[rstest]
    #[case(0.0, 100.0, 50.0, 50.0)]
    #[case(1.0, 100.0, 50.0, 100.0)]
    #[case(0.7, 100.0, 50.0, 85.0)]
    #[case(0.5, -10.0, 10.0, 0.0)]
    fn test_blend(#[case] w: f64, #[case] a: f64, #[case] b: f64, #[case] expected: f64) {
        assert!((blend(w, a, b) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_blend_is_convex_combination() {
        for i in 0..=10 {
            let w = f64::from(i) / 10.0;
            let v = blend(w, 200.0, 40.0);
            assert!((40.0..=200.0).contains(&v));
        }
    }

    #[rstest]
    #[case(RawOutput::Scalar(100.0))]
    #[case(RawOutput::Vector(vec![100.0]))]
    #[case(RawOutput::Matrix(vec![vec![100.0]]))]
    fn test_output_shapes_are_normalised(#[case] output: RawOutput) {
        let forest = Fixed::new(output);
        let boosted = Fixed::new(RawOutput::Vector(vec![50.0]));
        let result = predict(&FeatureRow::new(), &forest, &boosted, None, 0.7).unwrap();
        assert!((result.value - 85.0).abs() < 1e-9);
        assert_eq!(result.forest, 100.0);
        assert_eq!(result.boosted, 50.0);
    }

    #[test]
    fn test_multi_value_output_is_runtime_error() {
        let forest = Fixed::new(RawOutput::Vector(vec![1.0, 2.0]));
        let boosted = Fixed::new(RawOutput::Scalar(1.0));
        let err = predict(&FeatureRow::new(), &forest, &boosted, None, 0.5).unwrap_err();
        assert!(matches!(err, RailcastError::PredictionRuntime { ref component, .. } if component == "forest"));
    }

    #[test]
    fn test_panic_becomes_runtime_error_and_session_survives() {
        let exploding = Exploding {
            signature: TypeSignature::new("CatBoostRegressor", "catboost.core"),
            calls: AtomicUsize::new(0),
        };
        let forest = Fixed::new(RawOutput::Scalar(10.0));
        let row = FeatureRow::new().with("station_name", "Taksim");

        for _ in 0..2 {
            let err = predict(&row, &forest, &exploding, None, 0.5).unwrap_err();
            assert!(matches!(err, RailcastError::PredictionRuntime { .. }));
            assert!(err.to_string().contains("boosted"));
            let context = err.context().unwrap();
            assert_eq!(
                context.get("class").map(String::as_str),
                Some("catboost.core.CatBoostRegressor")
            );
            assert!(context["row"].contains("Taksim"));
        }
        assert_eq!(exploding.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_preprocessor_output_reaches_components_dense() {
        let pre = Preprocessor::Elementwise {
            signature: TypeSignature::new("SimpleImputer", "sklearn.impute"),
            transformer: Transformer::Imputer(SimpleImputer {
                statistics: vec![1.0, 1.0],
                feature_names: Some(vec!["rain_mm".into(), "tmax_c".into()]),
            }),
        };
        let width = Width {
            signature: TypeSignature::new("RandomForestRegressor", "sklearn.ensemble"),
        };
        let row = FeatureRow::new().with("tmax_c", 4.0).with("rain_mm", f64::NAN);
        let result = predict(&row, &width, &width, Some(&pre), 0.3).unwrap();
        assert_eq!(result.forest, 5.0);
        assert!((result.value - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_preprocessor_failure_is_attributed() {
        let pre = Preprocessor::Elementwise {
            signature: TypeSignature::new("SimpleImputer", "sklearn.impute"),
            transformer: Transformer::Imputer(SimpleImputer {
                statistics: vec![1.0],
                feature_names: Some(vec!["rain_mm".into()]),
            }),
        };
        let forest = Fixed::new(RawOutput::Scalar(1.0));
        let err = predict(&FeatureRow::new(), &forest, &forest, Some(&pre), 0.3).unwrap_err();
        assert!(matches!(err, RailcastError::FeatureMismatch { ref component, .. } if component == "preprocessor"));
    }
}
