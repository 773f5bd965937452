//! # Document Conversion Module
//!
//! Converte documenti di testo tra `.txt`, `.docx` e `.pdf`.
//!
//! ## Pipeline:
//! 1. Valida l'estensione di destinazione (prima di leggere l'input)
//! 2. Carica il documento in un modello a paragrafi (`TextDocument`)
//!    - `.txt`: UTF-8, una riga per paragrafo
//!    - `.docx`: `word/document.xml` letto dal pacchetto zip con `quick-xml`
//!    - `.pdf`: estrazione del testo pagina per pagina con `lopdf`
//! 3. Salva nel formato richiesto su un file temporaneo nella cartella di destinazione
//! 4. Rinomina il temporaneo sul path finale solo se il salvataggio è riuscito
//!
//! Nessun formato viene reimplementato: parsing e serializzazione sono delegati
//! a `zip`, `quick-xml` e `lopdf`. La formattazione (stili, immagini, tabelle)
//! non viene preservata, solo il testo.

use crate::catalog::extension_of;
use crate::error::ConversionError;
use crate::file_manager::FileManager;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream, StringFormat};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::fs::File;
use std::io::{BufWriter, Read, Seek, Write};
use std::path::Path;
use tracing::{debug, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// A4 page in PDF points
const PAGE_WIDTH: i64 = 595;
const PAGE_HEIGHT: i64 = 842;
const MARGIN: i64 = 50;
const FONT_SIZE: i64 = 11;
const LEADING: i64 = 14;
/// Courier glyphs are 0.6em wide: (595 - 2 * 50) / 6.6
const CHARS_PER_LINE: usize = 75;

const DOCX_CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;

const DOCX_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

const DOCX_BODY_PART: &str = "word/document.xml";

/// Target serialization for a document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    Pdf,
    Docx,
    Txt,
}

impl SaveMode {
    /// Save mode for a normalized extension
    pub fn from_extension(ext: &str) -> Result<Self, ConversionError> {
        match ext {
            ".pdf" => Ok(Self::Pdf),
            ".docx" => Ok(Self::Docx),
            ".txt" => Ok(Self::Txt),
            other => Err(ConversionError::UnsupportedOutputFormat(other.to_string())),
        }
    }
}

/// Plain-text view of a document: one entry per paragraph
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextDocument {
    paragraphs: Vec<String>,
}

impl TextDocument {
    pub fn from_text(text: &str) -> Self {
        Self {
            paragraphs: text.lines().map(str::to_string).collect(),
        }
    }

    pub fn paragraphs(&self) -> &[String] {
        &self.paragraphs
    }

    pub fn to_text(&self) -> String {
        self.paragraphs.join("\n")
    }

    /// Load a document, choosing the reader from the file extension
    pub fn load(path: &Path) -> Result<Self, ConversionError> {
        let ext = extension_of(path).unwrap_or_default();
        match ext.as_str() {
            ".txt" => {
                let bytes = std::fs::read(path)?;
                Ok(Self::from_text(&String::from_utf8_lossy(&bytes)))
            }
            ".docx" => Self::load_docx(path),
            ".pdf" => Self::load_pdf(path),
            ".doc" => Err(ConversionError::corrupt(
                path,
                "legacy binary .doc documents cannot be decoded",
            )),
            other => Err(ConversionError::UnsupportedFormat(other.to_string())),
        }
    }

    fn load_docx(path: &Path) -> Result<Self, ConversionError> {
        let file = File::open(path)?;
        let mut archive = ZipArchive::new(file).map_err(|e| ConversionError::corrupt(path, e))?;
        let mut xml = String::new();
        archive
            .by_name(DOCX_BODY_PART)
            .map_err(|e| ConversionError::corrupt(path, e))?
            .read_to_string(&mut xml)
            .map_err(|e| ConversionError::corrupt(path, e))?;
        Self::parse_document_xml(&xml).map_err(|e| ConversionError::corrupt(path, e))
    }

    /// Extract paragraphs from a WordprocessingML body
    fn parse_document_xml(xml: &str) -> Result<Self, quick_xml::Error> {
        let mut reader = Reader::from_str(xml);
        let mut paragraphs = Vec::new();
        let mut current = String::new();
        let mut in_run = false;
        let mut in_text = false;

        loop {
            match reader.read_event()? {
                Event::Start(e) => match e.local_name().as_ref() {
                    b"p" => current.clear(),
                    b"r" => in_run = true,
                    b"t" if in_run => in_text = true,
                    _ => {}
                },
                Event::Empty(e) => match e.local_name().as_ref() {
                    b"p" => paragraphs.push(String::new()),
                    b"tab" if in_run => current.push('\t'),
                    b"br" | b"cr" if in_run => current.push('\n'),
                    _ => {}
                },
                Event::Text(text) if in_text => current.push_str(&text.unescape()?),
                Event::End(e) => match e.local_name().as_ref() {
                    b"t" => in_text = false,
                    b"r" => in_run = false,
                    b"p" => paragraphs.push(std::mem::take(&mut current)),
                    _ => {}
                },
                Event::Eof => break,
                _ => {}
            }
        }

        Ok(Self { paragraphs })
    }

    fn load_pdf(path: &Path) -> Result<Self, ConversionError> {
        let doc = Document::load(path).map_err(|e| ConversionError::corrupt(path, e))?;
        let mut paragraphs = Vec::new();
        for (page_num, _) in doc.get_pages() {
            match doc.extract_text(&[page_num]) {
                Ok(text) => paragraphs.extend(text.lines().map(|line| line.trim_end().to_string())),
                Err(e) => warn!("Skipping unreadable text on page {} of {}: {}", page_num, path.display(), e),
            }
        }
        Ok(Self { paragraphs })
    }

    /// Write in the given mode
    pub fn write_to<W: Write + Seek>(&self, writer: &mut W, mode: SaveMode) -> Result<(), ConversionError> {
        match mode {
            SaveMode::Txt => {
                writer.write_all(self.to_text().as_bytes())?;
                Ok(())
            }
            SaveMode::Docx => self.write_docx(writer),
            SaveMode::Pdf => self.write_pdf(writer),
        }
    }

    fn write_docx<W: Write + Seek>(&self, writer: &mut W) -> Result<(), ConversionError> {
        // Fixed timestamps keep repeated conversions byte-identical
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(zip::DateTime::default());

        let mut zip = ZipWriter::new(writer);
        let parts = [
            ("[Content_Types].xml", DOCX_CONTENT_TYPES.to_string()),
            ("_rels/.rels", DOCX_RELS.to_string()),
            (DOCX_BODY_PART, self.document_xml()),
        ];
        for (name, body) in parts {
            zip.start_file(name, options.clone()).map_err(zip_write_error)?;
            zip.write_all(body.as_bytes())?;
        }
        zip.finish().map_err(zip_write_error)?;
        Ok(())
    }

    fn document_xml(&self) -> String {
        let mut xml = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>"#,
        );
        for paragraph in &self.paragraphs {
            xml.push_str("<w:p>");
            if !paragraph.is_empty() {
                xml.push_str("<w:r>");
                for (i, line) in paragraph.split('\n').enumerate() {
                    if i > 0 {
                        xml.push_str("<w:br/>");
                    }
                    for (j, piece) in line.split('\t').enumerate() {
                        if j > 0 {
                            xml.push_str("<w:tab/>");
                        }
                        if !piece.is_empty() {
                            xml.push_str(r#"<w:t xml:space="preserve">"#);
                            xml.push_str(&quick_xml::escape::escape(piece));
                            xml.push_str("</w:t>");
                        }
                    }
                }
                xml.push_str("</w:r>");
            }
            xml.push_str("</w:p>");
        }
        xml.push_str("</w:body></w:document>");
        xml
    }

    fn write_pdf<W: Write>(&self, writer: &mut W) -> Result<(), ConversionError> {
        let lines: Vec<String> = self
            .paragraphs
            .iter()
            .flat_map(|p| p.split('\n'))
            .flat_map(|line| wrap_line(line, CHARS_PER_LINE))
            .collect();
        let lines_per_page = ((PAGE_HEIGHT - 2 * MARGIN) / LEADING) as usize;

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
            "Encoding" => "WinAnsiEncoding",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        });

        let mut kids = Vec::new();
        // An empty document still gets one blank page
        let chunks: Vec<&[String]> = if lines.is_empty() {
            vec![&lines[..]]
        } else {
            lines.chunks(lines_per_page).collect()
        };

        for chunk in chunks {
            let mut operations = Vec::new();
            for (row, line) in chunk.iter().enumerate() {
                if line.is_empty() {
                    continue;
                }
                let y = PAGE_HEIGHT - MARGIN - FONT_SIZE - (row as i64) * LEADING;
                // One text object per line so extractors see line boundaries
                operations.push(Operation::new("BT", vec![]));
                operations.push(Operation::new("Tf", vec!["F1".into(), FONT_SIZE.into()]));
                operations.push(Operation::new("Td", vec![MARGIN.into(), y.into()]));
                operations.push(Operation::new(
                    "Tj",
                    vec![Object::String(win_ansi_bytes(line), StringFormat::Literal)],
                ));
                operations.push(Operation::new("ET", vec![]));
            }
            let content = Content { operations };
            let encoded = content.encode().map_err(|e| ConversionError::Unknown(e.to_string()))?;
            let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(Object::from(page_id));
        }

        let page_count = kids.len() as i64;
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.compress();

        doc.save_to(writer)
            .map_err(|e| ConversionError::Unknown(format!("failed to write PDF: {}", e)))?;
        debug!("Wrote PDF with {} page(s)", page_count);
        Ok(())
    }
}

fn zip_write_error(e: zip::result::ZipError) -> ConversionError {
    match e {
        zip::result::ZipError::Io(io) => ConversionError::Io(io),
        other => ConversionError::Unknown(other.to_string()),
    }
}

/// Split a line into chunks of at most `width` characters, preferring spaces
fn wrap_line(line: &str, width: usize) -> Vec<String> {
    let chars: Vec<char> = line.chars().map(|c| if c == '\t' { ' ' } else { c }).collect();
    if chars.len() <= width {
        return vec![chars.into_iter().collect()];
    }

    let mut wrapped = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + width).min(chars.len());
        let mut cut = end;
        if end < chars.len() && chars[end] != ' ' {
            if let Some(space) = chars[start..end].iter().rposition(|c| *c == ' ') {
                if space > 0 {
                    cut = start + space;
                }
            }
        }
        wrapped.push(chars[start..cut].iter().collect::<String>().trim_end().to_string());
        start = cut;
        while start < chars.len() && chars[start] == ' ' {
            start += 1;
        }
    }
    wrapped
}

/// Encode text for a WinAnsi Type1 font; unmappable characters become '?'
fn win_ansi_bytes(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c as u32 {
            code @ 0x20..=0x7E => code as u8,
            code @ 0xA0..=0xFF => code as u8,
            _ => b'?',
        })
        .collect()
}

/// Converts documents between pdf, docx and txt
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentConverter;

impl DocumentConverter {
    pub fn new() -> Self {
        Self
    }

    /// Convert `input_path` into `output_path` using the save mode for `output_ext`
    pub fn convert(&self, input_path: &Path, output_path: &Path, output_ext: &str) -> Result<(), ConversionError> {
        let mode = SaveMode::from_extension(output_ext)?;
        debug!("📄 Converting document {} -> {:?}", input_path.display(), mode);

        let document = TextDocument::load(input_path)?;
        debug!("Loaded {} paragraph(s)", document.paragraphs().len());

        FileManager::persist_atomically(output_path, |file| {
            let mut writer = BufWriter::new(file);
            document.write_to(&mut writer, mode)?;
            writer.flush()?;
            Ok(())
        })
    }
}
