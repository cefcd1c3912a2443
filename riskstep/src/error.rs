// src/error.rs
//
// Error taxonomy for the rollout engine.
//
// - ConfigError: artifacts or configuration are unusable. Operator-fixable,
//   surfaced at startup and blocks every rollout.
// - InputError: the caller's patient record violates the input contract.
//   Fatal for that request only.
// - IndexOutOfRange: a variable index outside the 34-slot state. Never caused
//   by valid external input; indicates a defect in the acting policy.
// - NumericError: a frozen network produced a non-finite output for a valid
//   state. Operator-fixable: the artifact is unusable for that input.
//
// Out-of-domain proposed values are not errors: they saturate at the bound.

use std::fmt;

/// Configuration / artifact failure.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    Io {
        path: String,
        source: String,
    },
    Parse {
        path: String,
        source: String,
    },
    VersionMismatch {
        path: String,
        expected: u32,
        found: u32,
    },
    KindMismatch {
        path: String,
        expected: String,
        found: String,
    },
    ChecksumMismatch {
        path: String,
        expected: String,
        found: String,
    },
    Shape {
        component: String,
        message: String,
    },
    Validation {
        field: String,
        message: String,
    },
}

impl ConfigError {
    pub(crate) fn shape(component: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::Shape {
            component: component.into(),
            message: message.into(),
        }
    }

    pub(crate) fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "Failed to read '{}': {}", path, source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "Failed to parse '{}': {}", path, source)
            }
            ConfigError::VersionMismatch {
                path,
                expected,
                found,
            } => write!(
                f,
                "Artifact '{}' has format version {} (expected {})",
                path, found, expected
            ),
            ConfigError::KindMismatch {
                path,
                expected,
                found,
            } => write!(
                f,
                "Artifact '{}' is a '{}' artifact (expected '{}')",
                path, found, expected
            ),
            ConfigError::ChecksumMismatch {
                path,
                expected,
                found,
            } => write!(
                f,
                "Artifact '{}' payload sha256 {} does not match recorded {}",
                path, found, expected
            ),
            ConfigError::Shape { component, message } => {
                write!(f, "Invalid network shape in '{}': {}", component, message)
            }
            ConfigError::Validation { field, message } => {
                write!(f, "Configuration error in '{}': {}", field, message)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Input contract violation for a single request.
#[derive(Debug, Clone, PartialEq)]
pub enum InputError {
    /// A required variable is absent from the patient record.
    MissingVariable { name: String },
    /// A required variable is present but not a number that stays finite in
    /// single precision.
    NonNumeric { name: String, value: String },
    /// A raw state vector has the wrong number of coordinates.
    LengthMismatch { expected: usize, found: usize },
    /// The record could not be parsed as a JSON object.
    Malformed { source: String },
}

impl fmt::Display for InputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputError::MissingVariable { name } => {
                write!(f, "Required variable '{}' is missing", name)
            }
            InputError::NonNumeric { name, value } => {
                write!(
                    f,
                    "Variable '{}' is not a finite single-precision number: {}",
                    name, value
                )
            }
            InputError::LengthMismatch { expected, found } => write!(
                f,
                "State vector has {} coordinates (expected {})",
                found, expected
            ),
            InputError::Malformed { source } => {
                write!(f, "Patient record is not a JSON object: {}", source)
            }
        }
    }
}

impl std::error::Error for InputError {}

/// Variable index outside the state vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexOutOfRange {
    pub index: usize,
    pub len: usize,
}

impl fmt::Display for IndexOutOfRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Variable index {} is outside [0, {}]",
            self.index,
            self.len.saturating_sub(1)
        )
    }
}

impl std::error::Error for IndexOutOfRange {}

/// Non-finite network output.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericError {
    /// Which output went bad (e.g. "risk_scorer.probabilities").
    pub component: String,
    pub detail: String,
}

impl NumericError {
    pub(crate) fn new(component: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            detail: detail.into(),
        }
    }
}

impl fmt::Display for NumericError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Non-finite output from '{}': {}", self.component, self.detail)
    }
}

impl std::error::Error for NumericError {}

/// Any failure surfaced by a rollout entry point.
#[derive(Debug, Clone, PartialEq)]
pub enum RolloutError {
    Config(ConfigError),
    Input(InputError),
    IndexOutOfRange(IndexOutOfRange),
    Numeric(NumericError),
}

impl RolloutError {
    /// True when the caller can fix the request and resubmit.
    pub fn is_caller_fixable(&self) -> bool {
        matches!(self, RolloutError::Input(_))
    }

    /// True when an operator must fix configuration or artifacts.
    pub fn is_operator_fixable(&self) -> bool {
        matches!(self, RolloutError::Config(_) | RolloutError::Numeric(_))
    }
}

impl fmt::Display for RolloutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RolloutError::Config(e) => write!(f, "configuration error: {}", e),
            RolloutError::Input(e) => write!(f, "input contract error: {}", e),
            RolloutError::IndexOutOfRange(e) => write!(f, "index out of range: {}", e),
            RolloutError::Numeric(e) => write!(f, "numeric error: {}", e),
        }
    }
}

impl std::error::Error for RolloutError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RolloutError::Config(e) => Some(e),
            RolloutError::Input(e) => Some(e),
            RolloutError::IndexOutOfRange(e) => Some(e),
            RolloutError::Numeric(e) => Some(e),
        }
    }
}

impl From<ConfigError> for RolloutError {
    fn from(e: ConfigError) -> Self {
        RolloutError::Config(e)
    }
}

impl From<InputError> for RolloutError {
    fn from(e: InputError) -> Self {
        RolloutError::Input(e)
    }
}

impl From<IndexOutOfRange> for RolloutError {
    fn from(e: IndexOutOfRange) -> Self {
        RolloutError::IndexOutOfRange(e)
    }
}

impl From<NumericError> for RolloutError {
    fn from(e: NumericError) -> Self {
        RolloutError::Numeric(e)
    }
}
