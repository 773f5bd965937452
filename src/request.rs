//! Conversion request and outcome values.

use crate::catalog::{extension_of, normalize_extension};
use crate::error::{ConversionError, FailureKind};
use crate::file_manager::FileManager;
use crate::strategy::Strategy;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One conversion job, immutable once built
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionRequest {
    input_path: PathBuf,
    output_path: PathBuf,
    input_format: String,
    output_format: String,
    quality_preset: Option<String>,
}

impl ConversionRequest {
    /// Build a request; the output path's extension must match `output_format`
    pub fn new(
        input_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
        output_format: &str,
        quality_preset: Option<String>,
    ) -> Result<Self, ConversionError> {
        let input_path = input_path.into();
        let output_path = output_path.into();
        let output_format = normalize_extension(output_format);

        let input_format = extension_of(&input_path).ok_or_else(|| {
            ConversionError::InvalidRequest(format!(
                "input file has no extension: {}",
                input_path.display()
            ))
        })?;

        match extension_of(&output_path) {
            Some(ext) if ext == output_format => {}
            other => {
                return Err(ConversionError::InvalidRequest(format!(
                    "output path {} does not end with {} (found {})",
                    output_path.display(),
                    output_format,
                    other.as_deref().unwrap_or("no extension")
                )))
            }
        }

        if Self::same_file(&input_path, &output_path) {
            return Err(ConversionError::InvalidRequest(format!(
                "output path {} would overwrite the input",
                output_path.display()
            )));
        }

        Ok(Self {
            input_path,
            output_path,
            input_format,
            output_format,
            quality_preset,
        })
    }

    /// Build a request whose output sits next to the input with the extension swapped
    pub fn with_format(
        input_path: impl Into<PathBuf>,
        output_format: &str,
        quality_preset: Option<String>,
    ) -> Result<Self, ConversionError> {
        let input_path = input_path.into();
        let output_format = normalize_extension(output_format);
        let output_path = FileManager::output_path_for(&input_path, &output_format);
        Self::new(input_path, output_path, &output_format, quality_preset)
    }

    /// Same path as written, or the same file on disk once both exist
    fn same_file(input: &Path, output: &Path) -> bool {
        if input == output {
            return true;
        }
        match (std::fs::canonicalize(input), std::fs::canonicalize(output)) {
            (Ok(input), Ok(output)) => input == output,
            _ => false,
        }
    }

    pub fn input_path(&self) -> &Path {
        &self.input_path
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Normalized input extension
    pub fn input_format(&self) -> &str {
        &self.input_format
    }

    /// Normalized output extension
    pub fn output_format(&self) -> &str {
        &self.output_format
    }

    pub fn quality_preset(&self) -> Option<&str> {
        self.quality_preset.as_deref()
    }
}

/// What a successful conversion produced
#[derive(Debug, Clone)]
pub struct ConversionReport {
    pub strategy: Strategy,
    pub output_path: PathBuf,
    pub elapsed: Duration,
}

/// UI-facing view of a finished conversion
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConversionOutcome {
    Success,
    Failure { kind: FailureKind, message: String },
}

impl<T> From<&Result<T, ConversionError>> for ConversionOutcome {
    fn from(result: &Result<T, ConversionError>) -> Self {
        match result {
            Ok(_) => Self::Success,
            Err(e) => Self::Failure {
                kind: e.kind(),
                message: e.to_string(),
            },
        }
    }
}

impl ConversionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}
