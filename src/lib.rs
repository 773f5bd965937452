//! # File Converter Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare dell'applicazione
//! - Espone i tipi e le funzioni principali tramite re-exports
//! - Fornisce un'interfaccia pulita per il main.rs e per altri consumatori
//!
//! ## Architettura dei moduli:
//! - `config`: Configurazione (matrice dei formati, preset, encoder) e validazione
//! - `catalog`: `FormatCatalog` immutabile costruito dalla configurazione
//! - `request`: Richiesta di conversione, report ed esito per la UI
//! - `strategy`: Scelta della pipeline in base all'estensione di input
//! - `document_converter`: Conversioni pdf / docx / txt
//! - `image_converter`: Conversioni png / bmp / jpg / gif
//! - `media_transcoder`: Audio e video tramite processo `ffmpeg` esterno
//! - `orchestrator`: Punto d'ingresso unico per una conversione
//! - `error`: Tipi di errore e categorie mostrate all'utente
//! - `tool_resolver`: Ricerca dell'encoder esterno
//! - `file_manager`, `progress`, `json_output`, `utils`: supporto per la CLI
//!
//! ## Utilizzo:
//! ```rust,no_run
//! use file_converter::{
//!     ConversionOrchestrator, ConversionRequest, FormatCatalog, ToolPathResolver, TranscoderSettings,
//! };
//! use std::sync::Arc;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let catalog = Arc::new(FormatCatalog::default());
//! let settings = TranscoderSettings::from_config(&Default::default(), &ToolPathResolver::new());
//! let orchestrator = ConversionOrchestrator::new(catalog, settings);
//!
//! let request = ConversionRequest::with_format("clip.mp4", ".mkv", Some("High".to_string()))?;
//! orchestrator.convert(&request).await?;
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod config;
pub mod document_converter;
pub mod error;
pub mod file_manager;
pub mod image_converter;
pub mod json_output;
pub mod media_transcoder;
pub mod orchestrator;
pub mod progress;
pub mod request;
pub mod strategy;
pub mod tool_resolver;
pub mod utils;

pub use catalog::{EncoderSpeed, FormatCatalog, QualityPreset};
pub use config::Config;
pub use error::{ConversionError, FailureKind};
pub use media_transcoder::{MediaTranscoder, TranscoderSettings};
pub use orchestrator::ConversionOrchestrator;
pub use request::{ConversionOutcome, ConversionReport, ConversionRequest};
pub use strategy::Strategy;
pub use tool_resolver::ToolPathResolver;
