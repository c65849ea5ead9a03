// MedScan - util/error.rs
//
// Typed error hierarchy with context-preserving error chains.
// Every error that crosses a collaborator seam (codec, remote service,
// durable store, filesystem, config) has its own enum; the scan state
// machine absorbs all of them into session state.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Top-level error type for all MedScan operations.
#[derive(Debug)]
pub enum MedScanError {
    /// The remote analysis call failed.
    Analysis(AnalysisError),

    /// A selected input file could not be read.
    Input(InputError),

    /// Configuration loading or validation failed.
    Config(ConfigError),

    /// Scan history export failed.
    Export(ExportError),
}

impl fmt::Display for MedScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Analysis(e) => write!(f, "Analysis error: {e}"),
            Self::Input(e) => write!(f, "Input error: {e}"),
            Self::Config(e) => write!(f, "Configuration error: {e}"),
            Self::Export(e) => write!(f, "Export error: {e}"),
        }
    }
}

impl std::error::Error for MedScanError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Analysis(e) => Some(e),
            Self::Input(e) => Some(e),
            Self::Config(e) => Some(e),
            Self::Export(e) => Some(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Preprocessing errors
// ---------------------------------------------------------------------------

/// Errors turning a raw image into a bounded-size encoded payload.
/// Local only: these never reach the network.
#[derive(Debug)]
pub enum PreprocessError {
    /// The input contained no bytes.
    Empty { label: String },

    /// The input is larger than the configured limit.
    TooLarge { label: String, size: u64, max: u64 },

    /// The input could not be decoded as an image.
    Decode {
        label: String,
        source: image::ImageError,
    },

    /// Re-encoding the resized image failed.
    Encode {
        label: String,
        source: image::ImageError,
    },
}

impl fmt::Display for PreprocessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty { label } => write!(f, "'{label}' is empty"),
            Self::TooLarge { label, size, max } => write!(
                f,
                "'{label}' is {size} bytes, exceeds maximum of {max} bytes"
            ),
            Self::Decode { label, source } => {
                write!(f, "'{label}' could not be read as an image: {source}")
            }
            Self::Encode { label, source } => {
                write!(f, "'{label}' could not be re-encoded: {source}")
            }
        }
    }
}

impl std::error::Error for PreprocessError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Decode { source, .. } => Some(source),
            Self::Encode { source, .. } => Some(source),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Analysis (remote call) errors
// ---------------------------------------------------------------------------

/// Rejections of the remote analysis call. A resolved response carrying an
/// `error` field is NOT one of these; see `core::reconcile`.
#[derive(Debug)]
pub enum AnalysisError {
    /// The request never produced a response (connect, TLS, timeout).
    Transport {
        endpoint: String,
        source: reqwest::Error,
    },

    /// The service answered with a non-success HTTP status.
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    /// The response body was not a valid analysis result.
    InvalidResponse {
        endpoint: String,
        source: serde_json::Error,
    },

    /// The service refused the request for a reason of its own.
    Rejected { reason: String },
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport { endpoint, source } => {
                write!(f, "request to '{endpoint}' failed: {source}")
            }
            Self::Status {
                endpoint,
                status,
                body,
            } => {
                if body.is_empty() {
                    write!(f, "'{endpoint}' answered HTTP {status}")
                } else {
                    write!(f, "'{endpoint}' answered HTTP {status}: {body}")
                }
            }
            Self::InvalidResponse { endpoint, source } => {
                write!(f, "'{endpoint}' returned an unreadable result: {source}")
            }
            Self::Rejected { reason } => write!(f, "analysis rejected: {reason}"),
        }
    }
}

impl std::error::Error for AnalysisError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport { source, .. } => Some(source),
            Self::InvalidResponse { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<AnalysisError> for MedScanError {
    fn from(e: AnalysisError) -> Self {
        Self::Analysis(e)
    }
}

// ---------------------------------------------------------------------------
// Storage errors
// ---------------------------------------------------------------------------

/// Errors from the durable key-value store. Always degraded gracefully by
/// callers; never fatal to a session.
#[derive(Debug)]
pub enum StorageError {
    /// Reading or writing the backing file failed.
    Io { path: PathBuf, source: io::Error },

    /// The backing file is not a valid JSON object of strings.
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Persistence is disabled or access was denied.
    Unavailable { reason: String },
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "store I/O error '{}': {source}", path.display())
            }
            Self::Corrupt { path, source } => {
                write!(f, "store file '{}' is corrupt: {source}", path.display())
            }
            Self::Unavailable { reason } => write!(f, "storage unavailable: {reason}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Corrupt { source, .. } => Some(source),
            Self::Unavailable { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Input errors
// ---------------------------------------------------------------------------

/// Errors reading a user-selected image file from disk.
#[derive(Debug)]
pub enum InputError {
    /// File exceeds the configured input limit.
    FileTooLarge { path: PathBuf, size: u64, max: u64 },

    /// The path is not a regular file.
    NotAFile { path: PathBuf },

    /// The file holds no bytes.
    Empty { path: PathBuf },

    /// I/O error reading the file.
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for InputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FileTooLarge { path, size, max } => write!(
                f,
                "'{}' is {size} bytes, exceeds maximum of {max} bytes",
                path.display()
            ),
            Self::NotAFile { path } => write!(f, "'{}' is not a file", path.display()),
            Self::Empty { path } => write!(f, "'{}' is empty", path.display()),
            Self::Io { path, source } => {
                write!(f, "cannot read '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for InputError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<InputError> for MedScanError {
    fn from(e: InputError) -> Self {
        Self::Input(e)
    }
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

/// Errors related to configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    /// TOML parsing failed.
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// A required value is missing.
    Missing { field: &'static str, hint: String },

    /// I/O error reading config file.
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TomlParse { path, source } => {
                write!(f, "Config parse error '{}': {source}", path.display())
            }
            Self::Missing { field, hint } => {
                write!(f, "Config '{field}' is not set. {hint}")
            }
            Self::Io { path, source } => {
                write!(f, "Config I/O error '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::TomlParse { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
            Self::Missing { .. } => None,
        }
    }
}

impl From<ConfigError> for MedScanError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Export errors
// ---------------------------------------------------------------------------

/// Errors related to scan history export.
#[derive(Debug)]
pub enum ExportError {
    /// I/O error writing the export file.
    Io { path: PathBuf, source: io::Error },

    /// CSV serialisation error.
    Csv { path: PathBuf, source: csv::Error },

    /// JSON serialisation error.
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "Export I/O error '{}': {source}", path.display())
            }
            Self::Csv { path, source } => {
                write!(f, "CSV export error '{}': {source}", path.display())
            }
            Self::Json { path, source } => {
                write!(f, "JSON export error '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ExportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Csv { source, .. } => Some(source),
            Self::Json { source, .. } => Some(source),
        }
    }
}

impl From<ExportError> for MedScanError {
    fn from(e: ExportError) -> Self {
        Self::Export(e)
    }
}

/// Convenience type alias for MedScan results.
pub type Result<T> = std::result::Result<T, MedScanError>;
