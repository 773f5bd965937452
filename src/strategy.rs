//! # Strategy Selection
//!
//! Sceglie la pipeline (Document, Image, Media) in base all'estensione di input.
//!
//! Ordine delle regole (conta quando il catalogo ha insiemi sovrapposti):
//! 1. estensione assente dalla matrice -> `UnsupportedFormat`
//! 2. video o audio -> `Media` (serve comunque l'encoder esterno)
//! 3. `.docx`, `.doc`, `.txt`, `.pdf` -> `Document`
//! 4. tutto il resto -> `Image`

use crate::catalog::FormatCatalog;
use crate::error::ConversionError;
use serde::Serialize;
use std::fmt;

/// Extensions routed to the document pipeline
pub const DOCUMENT_EXTENSIONS: [&str; 4] = [".docx", ".doc", ".txt", ".pdf"];

/// Conversion pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Document,
    Image,
    Media,
}

impl Strategy {
    /// Classify a normalized input extension
    pub fn classify(input_ext: &str, catalog: &FormatCatalog) -> Result<Self, ConversionError> {
        if !catalog.contains(input_ext) {
            return Err(ConversionError::UnsupportedFormat(input_ext.to_string()));
        }

        if catalog.is_media(input_ext) {
            Ok(Self::Media)
        } else if DOCUMENT_EXTENSIONS.contains(&input_ext) {
            Ok(Self::Document)
        } else {
            Ok(Self::Image)
        }
    }

    /// Error for a target this pipeline cannot reach
    pub fn unreachable_target(&self, input_ext: &str, output_ext: &str) -> ConversionError {
        match self {
            Self::Document => ConversionError::UnsupportedOutputFormat(output_ext.to_string()),
            Self::Image => ConversionError::UnsupportedImageFormat(output_ext.to_string()),
            Self::Media => ConversionError::UnsupportedMediaConversion {
                input: input_ext.to_string(),
                output: output_ext.to_string(),
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Image => "image",
            Self::Media => "media",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
