//! # Error Types Module
//!
//! Questo modulo definisce tutti i tipi di errore della conversione.
//!
//! ## Responsabilità:
//! - Definisce `ConversionError` per categorizzare tutti i fallimenti possibili
//! - Espone `FailureKind`, la tassonomia mostrata all'utente
//! - Integra con `thiserror` per i messaggi e le conversioni automatiche
//!
//! ## Categorie di errori:
//! - `UnsupportedFormat`: estensione di input assente dal catalogo
//! - `UnsupportedOutputFormat` / `UnsupportedImageFormat` / `UnsupportedMediaConversion`:
//!   categoria di input valida ma destinazione non raggiungibile
//! - `CorruptOrUnsupportedInput`: errori di decodifica (parse, limiti di memoria)
//! - `ExternalToolFailure`: il transcoder è uscito con codice != 0 o non è partito
//! - `InvalidRequest` / `Io` / `Unknown`: tutto il resto
//!
//! ## Esempio:
//! ```rust
//! use file_converter::error::{ConversionError, FailureKind};
//!
//! let err = ConversionError::UnsupportedFormat(".xyz".to_string());
//! assert_eq!(err.kind(), FailureKind::UnsupportedFormat);
//! ```

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// User-facing failure category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    UnsupportedFormat,
    UnsupportedOutputFormat,
    UnsupportedImageFormat,
    UnsupportedMediaConversion,
    CorruptOrUnsupportedInput,
    ExternalToolFailure,
    Unknown,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnsupportedFormat => "unsupported_format",
            Self::UnsupportedOutputFormat => "unsupported_output_format",
            Self::UnsupportedImageFormat => "unsupported_image_format",
            Self::UnsupportedMediaConversion => "unsupported_media_conversion",
            Self::CorruptOrUnsupportedInput => "corrupt_or_unsupported_input",
            Self::ExternalToolFailure => "external_tool_failure",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Custom error types for a single conversion
#[derive(thiserror::Error, Debug)]
pub enum ConversionError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Unsupported document output format: {0}")]
    UnsupportedOutputFormat(String),

    #[error("Unsupported image format: {0}")]
    UnsupportedImageFormat(String),

    #[error("Unsupported media conversion: {input} -> {output}")]
    UnsupportedMediaConversion { input: String, output: String },

    #[error("File is corrupt or in an unsupported format: {} ({reason})", path.display())]
    CorruptOrUnsupportedInput { path: PathBuf, reason: String },

    #[error("{tool} failed ({status}): {diagnostics}")]
    ExternalToolFailure {
        tool: String,
        status: ExitStatusText,
        diagnostics: String,
    },

    #[error("Invalid conversion request: {0}")]
    InvalidRequest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unexpected conversion error: {0}")]
    Unknown(String),
}

impl ConversionError {
    /// Category shown to the user
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::UnsupportedFormat(_) => FailureKind::UnsupportedFormat,
            Self::UnsupportedOutputFormat(_) => FailureKind::UnsupportedOutputFormat,
            Self::UnsupportedImageFormat(_) => FailureKind::UnsupportedImageFormat,
            Self::UnsupportedMediaConversion { .. } => FailureKind::UnsupportedMediaConversion,
            Self::CorruptOrUnsupportedInput { .. } => FailureKind::CorruptOrUnsupportedInput,
            Self::ExternalToolFailure { .. } => FailureKind::ExternalToolFailure,
            Self::InvalidRequest(_) | Self::Io(_) | Self::Unknown(_) => FailureKind::Unknown,
        }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        Self::CorruptOrUnsupportedInput {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// How the external tool ended, kept as text so errors stay `Send + Sync` and printable
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitStatusText {
    Code(i32),
    Signal,
    NotStarted,
    TimedOut,
}

impl fmt::Display for ExitStatusText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code(code) => write!(f, "exit code {}", code),
            Self::Signal => f.write_str("terminated by signal"),
            Self::NotStarted => f.write_str("could not be launched"),
            Self::TimedOut => f.write_str("timed out"),
        }
    }
}
