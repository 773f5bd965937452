//! # JSON Output Module
//!
//! Output strutturato in JSON per chi pilota il converter da un altro processo
//! (una riga per messaggio su stdout).
//!
//! ## Tipi di messaggi:
//! - `start`: conversione avviata (input, output, formato, pipeline)
//! - `complete`: conversione riuscita con dimensione e durata
//! - `error`: conversione fallita con categoria e messaggio
//! - `formats`: destinazioni e preset disponibili per un input (`--list-formats`)

use crate::catalog::FormatCatalog;
use crate::error::{ConversionError, FailureKind};
use crate::request::{ConversionReport, ConversionRequest};
use crate::strategy::Strategy;
use serde::Serialize;
use std::path::PathBuf;

/// Tipo di messaggio JSON
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JsonMessage {
    /// Inizio della conversione
    Start {
        input: PathBuf,
        output: PathBuf,
        format: String,
        strategy: Option<Strategy>,
    },

    /// Conversione completata
    Complete {
        output: PathBuf,
        strategy: Strategy,
        bytes: Option<u64>,
        duration_seconds: f64,
    },

    /// Conversione fallita
    Error { kind: FailureKind, message: String },

    /// Formati di destinazione e preset disponibili per un input
    Formats {
        input: String,
        targets: Vec<String>,
        quality_presets: Vec<String>,
    },
}

impl JsonMessage {
    /// Emette il messaggio JSON su stdout
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            println!("{}", json);
        }
    }

    pub fn start(request: &ConversionRequest, strategy: Option<Strategy>) -> Self {
        Self::Start {
            input: request.input_path().to_path_buf(),
            output: request.output_path().to_path_buf(),
            format: request.output_format().to_string(),
            strategy,
        }
    }

    pub fn complete(report: &ConversionReport, bytes: Option<u64>) -> Self {
        Self::Complete {
            output: report.output_path.clone(),
            strategy: report.strategy,
            bytes,
            duration_seconds: report.elapsed.as_secs_f64(),
        }
    }

    pub fn error(error: &ConversionError) -> Self {
        Self::Error {
            kind: error.kind(),
            message: error.to_string(),
        }
    }

    /// Targets for `input_ext`; presets are listed only for video inputs
    pub fn formats(catalog: &FormatCatalog, input_ext: &str) -> Self {
        let targets = catalog
            .allowed_outputs(input_ext)
            .map(|targets| targets.iter().cloned().collect())
            .unwrap_or_default();
        let quality_presets = if catalog.is_video(input_ext) {
            catalog.preset_names().into_iter().map(String::from).collect()
        } else {
            Vec::new()
        };

        Self::Formats {
            input: input_ext.to_string(),
            targets,
            quality_presets,
        }
    }
}
