//! # Conversion Orchestrator
//!
//! Punto d'ingresso unico per una conversione: classifica l'input, verifica la
//! matrice dei formati e delega alla pipeline corretta.
//!
//! ## Responsabilità:
//! - Classificazione della richiesta (`Strategy::classify`)
//! - Rifiuto dei target non presenti nella matrice, prima di toccare il disco
//! - Esecuzione di documenti e immagini su thread bloccanti (`spawn_blocking`)
//! - Esecuzione dei media tramite l'encoder esterno
//! - Un solo punto di logging per l'esito, l'errore viene poi propagato al chiamante
//!
//! Lo stato condiviso (catalogo e impostazioni) è immutabile: più conversioni
//! possono girare in parallelo sulla stessa istanza.

use crate::catalog::{extension_of, normalize_extension, FormatCatalog};
use crate::document_converter::DocumentConverter;
use crate::error::ConversionError;
use crate::file_manager::FileManager;
use crate::image_converter::ImageConverter;
use crate::media_transcoder::{MediaTranscoder, TranscoderSettings};
use crate::request::{ConversionReport, ConversionRequest};
use crate::strategy::Strategy;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// Dispatches conversion requests to the matching pipeline
#[derive(Debug, Clone)]
pub struct ConversionOrchestrator {
    catalog: Arc<FormatCatalog>,
    documents: DocumentConverter,
    images: ImageConverter,
    media: MediaTranscoder,
}

impl ConversionOrchestrator {
    pub fn new(catalog: Arc<FormatCatalog>, settings: TranscoderSettings) -> Self {
        let media = MediaTranscoder::new(Arc::clone(&catalog), settings);
        Self {
            catalog,
            documents: DocumentConverter::new(),
            images: ImageConverter::new(),
            media,
        }
    }

    pub fn catalog(&self) -> &FormatCatalog {
        &self.catalog
    }

    /// Pipeline a request would use, without running it
    pub fn strategy_for(&self, request: &ConversionRequest) -> Result<Strategy, ConversionError> {
        let strategy = Strategy::classify(request.input_format(), &self.catalog)?;
        if !self.catalog.allows(request.input_format(), request.output_format()) {
            return Err(strategy.unreachable_target(request.input_format(), request.output_format()));
        }
        Ok(strategy)
    }

    /// Run one conversion to completion
    pub async fn convert(&self, request: &ConversionRequest) -> Result<ConversionReport, ConversionError> {
        let start_time = Instant::now();

        let result = match self.strategy_for(request) {
            Ok(strategy) => self.dispatch(strategy, request).await.map(|()| strategy),
            Err(e) => Err(e),
        };

        match result {
            Ok(strategy) => {
                let elapsed = start_time.elapsed();
                info!(
                    "✅ {} -> {} ({}, {:.2}s)",
                    request.input_path().display(),
                    request.output_path().display(),
                    strategy,
                    elapsed.as_secs_f64()
                );
                Ok(ConversionReport {
                    strategy,
                    output_path: request.output_path().to_path_buf(),
                    elapsed,
                })
            }
            Err(e) => {
                Self::report_failure(request.input_path(), Some(request.output_path()), &e);
                Err(e)
            }
        }
    }

    /// Build a request from front-end choices: explicit target, else the output
    /// path's extension, else the first allowed target for the input
    pub fn request_for(
        &self,
        input: &Path,
        target: Option<&str>,
        output: Option<&Path>,
        quality_preset: Option<String>,
    ) -> Result<ConversionRequest, ConversionError> {
        let result = self.build_request(input, target, output, quality_preset);
        if let Err(ref e) = result {
            Self::report_failure(input, output, e);
        }
        result
    }

    fn build_request(
        &self,
        input: &Path,
        target: Option<&str>,
        output: Option<&Path>,
        quality_preset: Option<String>,
    ) -> Result<ConversionRequest, ConversionError> {
        let input_ext = extension_of(input).unwrap_or_default();

        let target = match (target, output) {
            (Some(target), _) => normalize_extension(target),
            (None, Some(output)) => extension_of(output).ok_or_else(|| {
                ConversionError::InvalidRequest(format!("output path has no extension: {}", output.display()))
            })?,
            (None, None) => FileManager::default_target(&self.catalog, &input_ext)
                .map(String::from)
                .ok_or_else(|| ConversionError::UnsupportedFormat(input_ext.clone()))?,
        };

        match output {
            Some(output) => ConversionRequest::new(input, output, &target, quality_preset),
            None => ConversionRequest::with_format(input, &target, quality_preset),
        }
    }

    /// The one place a failed conversion is logged
    fn report_failure(input: &Path, output: Option<&Path>, e: &ConversionError) {
        let output = output.map(|p| p.display().to_string()).unwrap_or_else(|| "?".to_string());
        error!(kind = %e.kind(), "❌ {} -> {} failed: {}", input.display(), output, e);
    }

    async fn dispatch(&self, strategy: Strategy, request: &ConversionRequest) -> Result<(), ConversionError> {
        debug!(
            "Dispatching {} -> {} to {} pipeline",
            request.input_format(),
            request.output_format(),
            strategy
        );

        match strategy {
            Strategy::Document => {
                let converter = self.documents;
                self.run_blocking(request, move |input, output, ext| converter.convert(&input, &output, &ext))
                    .await
            }
            Strategy::Image => {
                let converter = self.images;
                self.run_blocking(request, move |input, output, ext| converter.convert(&input, &output, &ext))
                    .await
            }
            Strategy::Media => self.media.transcode(request).await.map(|_| ()),
        }
    }

    /// Run a synchronous converter off the async runtime
    async fn run_blocking<F>(&self, request: &ConversionRequest, job: F) -> Result<(), ConversionError>
    where
        F: FnOnce(PathBuf, PathBuf, String) -> Result<(), ConversionError> + Send + 'static,
    {
        let input = request.input_path().to_path_buf();
        let output = request.output_path().to_path_buf();
        let ext = request.output_format().to_string();

        tokio::task::spawn_blocking(move || job(input, output, ext))
            .await
            .map_err(|e| ConversionError::Unknown(format!("conversion task failed: {}", e)))?
    }
}
