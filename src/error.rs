//! Error types and handling for railcast
//!
//! Artifact-level errors are fatal for the session: once raised, no
//! prediction can run until an operator supplies a working artifact.
//! Request-level errors are returned per prediction and leave the loaded
//! artifact usable.

use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Stable machine-readable code attached to every error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ArtifactNotFound,
    ArtifactLoad,
    MissingComponent,
    ComponentNotFound,
    FeatureMismatch,
    PredictionRuntime,
    Validation,
    Config,
    Io,
}

impl ErrorCode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::ArtifactNotFound => "ARTIFACT_NOT_FOUND",
            ErrorCode::ArtifactLoad => "ARTIFACT_LOAD",
            ErrorCode::MissingComponent => "MISSING_COMPONENT",
            ErrorCode::ComponentNotFound => "COMPONENT_NOT_FOUND",
            ErrorCode::FeatureMismatch => "FEATURE_MISMATCH",
            ErrorCode::PredictionRuntime => "PREDICTION_RUNTIME",
            ErrorCode::Validation => "VALIDATION",
            ErrorCode::Config => "CONFIG",
            ErrorCode::Io => "IO",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extra key/value details carried by request-level errors
pub type ErrorContext = BTreeMap<String, String>;

/// Main error type for railcast
#[derive(Error, Debug)]
pub enum RailcastError {
    /// The configured artifact path does not exist
    #[error("Artifact not found: {path}")]
    ArtifactNotFound { path: String },

    /// The artifact exists but could not be read or decoded
    #[error("Artifact could not be loaded: {message}")]
    ArtifactLoad { message: String },

    /// A named component key is absent from a dict-shaped artifact
    #[error("Artifact is missing required component '{key}'")]
    MissingComponent { key: String },

    /// Scanning an opaque artifact did not find both regression components
    #[error(
        "Could not locate forest and boosted components in artifact (inspected attributes: {})",
        inspected.join(", ")
    )]
    ComponentNotFound { inspected: Vec<String> },

    /// The assembled row does not fit what a component was fitted on
    #[error("Feature mismatch in {component}: {message}")]
    FeatureMismatch {
        component: String,
        message: String,
        context: ErrorContext,
    },

    /// A transform or predict call failed at runtime
    #[error("Prediction failed in {component}: {message}")]
    PredictionRuntime {
        component: String,
        message: String,
        context: ErrorContext,
    },

    /// Input validation errors
    #[error("Invalid input: {message}")]
    Validation { message: String },

    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// I/O operation errors
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl RailcastError {
    pub fn artifact_not_found<S: Into<String>>(path: S) -> Self {
        Self::ArtifactNotFound { path: path.into() }
    }

    pub fn artifact_load<S: Into<String>>(message: S) -> Self {
        Self::ArtifactLoad {
            message: message.into(),
        }
    }

    pub fn missing_component<S: Into<String>>(key: S) -> Self {
        Self::MissingComponent { key: key.into() }
    }

    pub fn feature_mismatch<C: Into<String>, M: Into<String>>(component: C, message: M) -> Self {
        Self::FeatureMismatch {
            component: component.into(),
            message: message.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn prediction_runtime<C: Into<String>, M: Into<String>>(component: C, message: M) -> Self {
        Self::PredictionRuntime {
            component: component.into(),
            message: message.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Attach a context entry to request-level errors; other variants are
    /// returned unchanged.
    #[must_use]
    pub fn with_context<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        match &mut self {
            Self::FeatureMismatch { context, .. } | Self::PredictionRuntime { context, .. } => {
                context.insert(key.into(), value.into());
            }
            _ => {}
        }
        self
    }

    /// Re-label the component a request-level error is attributed to.
    #[must_use]
    pub fn in_component<S: Into<String>>(mut self, name: S) -> Self {
        match &mut self {
            Self::FeatureMismatch { component, .. } | Self::PredictionRuntime { component, .. } => {
                *component = name.into();
            }
            _ => {}
        }
        self
    }

    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::ArtifactNotFound { .. } => ErrorCode::ArtifactNotFound,
            Self::ArtifactLoad { .. } => ErrorCode::ArtifactLoad,
            Self::MissingComponent { .. } => ErrorCode::MissingComponent,
            Self::ComponentNotFound { .. } => ErrorCode::ComponentNotFound,
            Self::FeatureMismatch { .. } => ErrorCode::FeatureMismatch,
            Self::PredictionRuntime { .. } => ErrorCode::PredictionRuntime,
            Self::Validation { .. } => ErrorCode::Validation,
            Self::Config { .. } => ErrorCode::Config,
            Self::Io { .. } => ErrorCode::Io,
        }
    }

    #[must_use]
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Self::FeatureMismatch { context, .. } | Self::PredictionRuntime { context, .. } => {
                Some(context)
            }
            _ => None,
        }
    }

    /// True for errors that halt all further predictions until the artifact
    /// is fixed.
    #[must_use]
    pub fn is_artifact_error(&self) -> bool {
        matches!(
            self,
            Self::ArtifactNotFound { .. }
                | Self::ArtifactLoad { .. }
                | Self::MissingComponent { .. }
                | Self::ComponentNotFound { .. }
        )
    }

    /// Get a user-friendly error message
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::ArtifactNotFound { path } => {
                format!("Model artifact '{path}' was not found. Provide a valid artifact file.")
            }
            Self::ArtifactLoad { .. } => {
                "Model artifact could not be read. The file may be corrupt or in an unknown format."
                    .to_string()
            }
            Self::MissingComponent { key } => {
                format!("Model artifact has no '{key}' entry. Check how the bundle was built.")
            }
            Self::ComponentNotFound { inspected } => format!(
                "No forest/boosted model pair found in the artifact. Inspected: {}",
                inspected.join(", ")
            ),
            Self::FeatureMismatch { message, .. } => {
                format!("Input does not match what the model expects: {message}")
            }
            Self::PredictionRuntime { component, .. } => {
                format!("Prediction failed inside {component}. Try again with different input.")
            }
            Self::Validation { message } => format!("Invalid input: {message}"),
            Self::Config { .. } => {
                "Configuration error. Please check your config file and environment.".to_string()
            }
            Self::Io { .. } => "File operation failed. Please check file permissions.".to_string(),
        }
    }
}
