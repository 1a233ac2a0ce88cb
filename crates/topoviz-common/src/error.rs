//! Error types shared by the topoviz crates.

use thiserror::Error;

/// Result type alias using TopovizError.
pub type Result<T> = std::result::Result<T, TopovizError>;

/// Primary error type for layer processing, workflow resolution and rendering.
#[derive(Debug, Error)]
pub enum TopovizError {
    // === Layer / Processor Errors ===
    #[error("Invalid layer name: {0}")]
    InvalidName(String),

    #[error("Invalid parameter value for '{param}': {message}")]
    InvalidParameter { param: String, message: String },

    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    // === Workflow Errors ===
    #[error("Missing required input '{0}'")]
    MissingInput(String),

    #[error("All inputs must define a default. Missing: {}", .0.join(", "))]
    MissingDefault(Vec<String>),

    #[error("Unknown {kind} '{name}'")]
    UnknownIdentifier { kind: String, name: String },

    // === Data Errors ===
    #[error("Failed to load grid: {0}")]
    Load(String),

    // === Rendering Errors ===
    #[error("Rendering failed: {0}")]
    Render(String),

    // === Infrastructure Errors ===
    #[error("I/O error: {0}")]
    Io(String),

    #[error("JSON error: {0}")]
    Json(String),
}

impl TopovizError {
    /// Create an InvalidParameter error.
    pub fn invalid_parameter(param: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            param: param.into(),
            message: message.into(),
        }
    }

    /// Create an UnknownIdentifier error.
    pub fn unknown(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::UnknownIdentifier {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create a Load error.
    pub fn load(msg: impl Into<String>) -> Self {
        Self::Load(msg.into())
    }

    /// Create a Render error.
    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    /// Stable machine-readable code for this error, used in CLI reports.
    pub fn error_code(&self) -> &'static str {
        match self {
            TopovizError::InvalidName(_) => "InvalidNameError",
            TopovizError::InvalidParameter { .. } => "InvalidParameterError",
            TopovizError::ShapeMismatch { .. } => "ShapeMismatchError",
            TopovizError::MissingInput(_) => "MissingInputError",
            TopovizError::MissingDefault(_) => "MissingDefaultError",
            TopovizError::UnknownIdentifier { .. } => "UnknownIdentifierError",
            TopovizError::Load(_) => "LoadError",
            TopovizError::Render(_) => "RenderError",
            TopovizError::Io(_) | TopovizError::Json(_) => "InternalError",
        }
    }

    /// Whether the error comes from user configuration rather than the environment.
    pub fn is_configuration_error(&self) -> bool {
        !matches!(
            self,
            TopovizError::Io(_) | TopovizError::Load(_) | TopovizError::Render(_)
        )
    }
}

// Conversion from common error types
impl From<std::io::Error> for TopovizError {
    fn from(err: std::io::Error) -> Self {
        TopovizError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for TopovizError {
    fn from(err: serde_json::Error) -> Self {
        TopovizError::Json(err.to_string())
    }
}
