// Error taxonomy for the labelscript engine
use std::path::PathBuf;
use thiserror::Error;

use crate::localization::LocalizedString;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Main error type with the engine's full error hierarchy
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Plugin manifest error: {0}")]
    Manifest(#[from] Box<ManifestError>),

    #[error("Parameter validation failed: {0}")]
    Parameter(#[from] Box<ParameterError>),

    #[error("Plugin execution failed: {0}")]
    Execution(#[from] Box<ExecutionError>),

    #[error("Process execution failed: {0}")]
    Process(#[from] Box<ProcessError>),

    #[error("Labeler profile error: {0}")]
    Labeler(#[from] Box<LabelerError>),

    #[error("IO operation failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Plugin manifest loading and validation errors
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Plugin manifest not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Invalid manifest JSON: {message}")]
    InvalidJson {
        message: String,
        path: Option<PathBuf>,
    },

    #[error("Plugin '{plugin}' is disabled")]
    Disabled { plugin: String },

    #[error("Script file not found for plugin '{plugin}': {file}")]
    MissingScriptFile { plugin: String, file: String },

    #[error("Resource file not found for plugin '{plugin}': {file}")]
    MissingResourceFile { plugin: String, file: String },

    #[error("Duplicate parameter key '{key}' in plugin '{plugin}'")]
    DuplicateParameterKey { plugin: String, key: String },

    #[error("Invalid parameter definition '{key}' in plugin '{plugin}': {reason}")]
    InvalidParameterDef {
        plugin: String,
        key: String,
        reason: String,
    },

    #[error("Plugin '{plugin}' does not support label file extension '{extension}'")]
    UnsupportedLabelExtension { plugin: String, extension: String },
}

/// Parameter resolution errors, raised before any script runs
#[derive(Debug, Error)]
pub enum ParameterError {
    #[error("Invalid value for parameter '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Parameter '{key}' has no value and no default")]
    MissingValue { key: String },
}

/// Script execution failures, split into the expected/unexpected taxonomy
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The script called `error(...)`: a localized, user-facing abort.
    #[error("{}", message.default_text())]
    Expected { message: LocalizedString },

    /// Any other script or runtime failure. The diagnostic is for logs; users
    /// see a generic localized wrapper via [`ExecutionError::user_message`].
    #[error("Unexpected plugin failure: {diagnostic}")]
    Unexpected { diagnostic: String },

    /// Declared output violates the plugin kind's required schema.
    #[error("Incompatible {kind} plugin output: {reason}")]
    IncompatibleShape { kind: String, reason: String },
}

impl ExecutionError {
    pub fn expected(message: impl Into<LocalizedString>) -> Self {
        ExecutionError::Expected {
            message: message.into(),
        }
    }

    pub fn unexpected(diagnostic: impl Into<String>) -> Self {
        ExecutionError::Unexpected {
            diagnostic: diagnostic.into(),
        }
    }

    pub fn shape(kind: impl Into<String>, reason: impl Into<String>) -> Self {
        ExecutionError::IncompatibleShape {
            kind: kind.into(),
            reason: reason.into(),
        }
    }

    pub fn is_expected(&self) -> bool {
        matches!(self, ExecutionError::Expected { .. })
    }

    /// Message shown to the user for the given locale. Expected failures
    /// surface the script's own message; everything else gets a generic
    /// wrapper plus the underlying diagnostic.
    pub fn user_message(&self, locale: &str) -> String {
        match self {
            ExecutionError::Expected { message } => message.get(locale).to_string(),
            ExecutionError::Unexpected { diagnostic } => {
                format!("{}\n{diagnostic}", generic_failure_text(locale))
            }
            ExecutionError::IncompatibleShape { reason, .. } => {
                format!("{}\n{reason}", generic_failure_text(locale))
            }
        }
    }
}

fn generic_failure_text(locale: &str) -> &'static str {
    match locale.split(['-', '_']).next().unwrap_or(locale) {
        "zh" => "插件执行失败。",
        "ja" => "プラグインの実行に失敗しました。",
        "ko" => "플러그인 실행에 실패했습니다.",
        _ => "An unexpected error occurred while executing the plugin.",
    }
}

/// Labeler profile errors
#[derive(Debug, Error)]
pub enum LabelerError {
    #[error("Labeler profile not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Invalid labeler profile: {message}")]
    Invalid {
        message: String,
        path: Option<PathBuf>,
    },

    #[error("Labeler '{labeler}' has no property named '{property}'")]
    UnknownProperty { labeler: String, property: String },
}

/// Host-side process execution errors
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Command not found: {command}")]
    CommandNotFound { command: String },

    #[error("Process spawn failed: {command}")]
    SpawnFailed { command: String, error: String },

    #[error("Process execution failed: {command}")]
    ExecutionFailed {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("Process execution is not permitted for {kind} plugins")]
    NotPermitted { kind: String },

    #[error("Output capture failed: {command}")]
    OutputCaptureFailed { command: String, error: String },
}

/// Exit codes for the CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const MANIFEST_ERROR: i32 = 2;
    pub const PARAMETER_ERROR: i32 = 3;
    pub const EXPECTED_FAILURE: i32 = 4;
    pub const UNEXPECTED_FAILURE: i32 = 5;
    pub const PROCESS_ERROR: i32 = 6;
    pub const LABELER_ERROR: i32 = 7;
}

impl EngineError {
    /// Get the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            EngineError::Manifest(_) => exit_codes::MANIFEST_ERROR,
            EngineError::Parameter(_) => exit_codes::PARAMETER_ERROR,
            EngineError::Execution(execution_err) => {
                if execution_err.is_expected() {
                    exit_codes::EXPECTED_FAILURE
                } else {
                    exit_codes::UNEXPECTED_FAILURE
                }
            }
            EngineError::Process(_) => exit_codes::PROCESS_ERROR,
            EngineError::Labeler(_) => exit_codes::LABELER_ERROR,
            EngineError::Io(_) => exit_codes::GENERAL_ERROR,
        }
    }

    /// Create a user-facing error message for the given locale
    pub fn user_message(&self, locale: &str) -> String {
        match self {
            EngineError::Execution(execution_err) => execution_err.user_message(locale),
            other => other.to_string(),
        }
    }
}

impl From<ManifestError> for EngineError {
    fn from(error: ManifestError) -> Self {
        EngineError::Manifest(Box::new(error))
    }
}

impl From<ParameterError> for EngineError {
    fn from(error: ParameterError) -> Self {
        EngineError::Parameter(Box::new(error))
    }
}

impl From<ExecutionError> for EngineError {
    fn from(error: ExecutionError) -> Self {
        EngineError::Execution(Box::new(error))
    }
}

impl From<ProcessError> for EngineError {
    fn from(error: ProcessError) -> Self {
        EngineError::Process(Box::new(error))
    }
}

impl From<LabelerError> for EngineError {
    fn from(error: LabelerError) -> Self {
        EngineError::Labeler(Box::new(error))
    }
}

// Marshal-boundary serialization failures are host-side bugs
impl From<serde_json::Error> for EngineError {
    fn from(error: serde_json::Error) -> Self {
        EngineError::Execution(Box::new(ExecutionError::Unexpected {
            diagnostic: format!("serialization failed: {error}"),
        }))
    }
}

// Conversion from serde_json::Error to ManifestError
impl From<serde_json::Error> for Box<ManifestError> {
    fn from(error: serde_json::Error) -> Self {
        Box::new(ManifestError::InvalidJson {
            message: error.to_string(),
            path: None,
        })
    }
}
