//! # File Management Module
//!
//! Operazioni sui file condivise dalle pipeline di conversione.
//!
//! ## Responsabilità:
//! - Scrittura atomica dell'output (file temporaneo nella stessa directory + rename)
//! - Derivazione del percorso di output dal percorso di input
//! - Scelta del formato di destinazione di default
//! - Formattazione human-readable delle dimensioni
//!
//! ## Sicurezza operazioni:
//! - Un output esistente viene sostituito solo a scrittura completata
//! - Se la scrittura fallisce il file temporaneo viene rimosso automaticamente

use crate::catalog::FormatCatalog;
use crate::error::ConversionError;
use std::fs::File;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Manages file operations around a conversion
pub struct FileManager;

impl FileManager {
    /// Write through a temporary file in the destination directory, then rename it into place
    pub fn persist_atomically<F>(output_path: &Path, write: F) -> Result<(), ConversionError>
    where
        F: FnOnce(&mut File) -> Result<(), ConversionError>,
    {
        let dir = output_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;

        let mut temp = NamedTempFile::new_in(dir)?;
        write(temp.as_file_mut())?;
        temp.as_file().sync_all()?;
        temp.persist(output_path).map_err(|e| ConversionError::Io(e.error))?;
        Ok(())
    }

    /// Same directory and stem as the input, with the extension swapped
    pub fn output_path_for(input: &Path, output_ext: &str) -> PathBuf {
        input.with_extension(output_ext.trim_start_matches('.'))
    }

    /// First allowed target that differs from the input format
    pub fn default_target<'a>(catalog: &'a FormatCatalog, input_ext: &str) -> Option<&'a str> {
        catalog
            .allowed_outputs(input_ext)?
            .iter()
            .map(String::as_str)
            .find(|target| *target != input_ext)
    }

    /// Size of a file on disk
    pub async fn file_size(path: &Path) -> Result<u64, ConversionError> {
        Ok(tokio::fs::metadata(path).await?.len())
    }

    /// Get human-readable file size
    pub fn format_size(size: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = size as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.1} {}", size, UNITS[unit_index])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_format_size() {
        assert_eq!(FileManager::format_size(512), "512 B");
        assert_eq!(FileManager::format_size(1536), "1.5 KB");
        assert_eq!(FileManager::format_size(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_output_path_swaps_extension() {
        assert_eq!(
            FileManager::output_path_for(Path::new("/media/my clip.mp4"), ".mkv"),
            PathBuf::from("/media/my clip.mkv")
        );
        assert_eq!(
            FileManager::output_path_for(Path::new("notes.v2.txt"), ".pdf"),
            PathBuf::from("notes.v2.pdf")
        );
    }

    #[test]
    fn test_default_target_skips_identity() {
        let catalog = FormatCatalog::default();
        assert_eq!(FileManager::default_target(&catalog, ".mp4"), Some(".mkv"));
        assert_eq!(FileManager::default_target(&catalog, ".txt"), Some(".docx"));
        assert_eq!(FileManager::default_target(&catalog, ".xyz"), None);
    }

    #[test]
    fn test_persist_replaces_existing_output() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("nested").join("out.txt");

        FileManager::persist_atomically(&output, |file| {
            file.write_all(b"first")?;
            Ok(())
        })
        .unwrap();
        FileManager::persist_atomically(&output, |file| {
            file.write_all(b"second")?;
            Ok(())
        })
        .unwrap();

        assert_eq!(std::fs::read_to_string(&output).unwrap(), "second");
    }

    #[test]
    fn test_failed_write_keeps_previous_output() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.txt");
        std::fs::write(&output, "previous").unwrap();

        let err = FileManager::persist_atomically(&output, |file| {
            file.write_all(b"half")?;
            Err(ConversionError::Unknown("encoder gave up".to_string()))
        })
        .unwrap_err();

        assert!(matches!(err, ConversionError::Unknown(_)));
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "previous");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
