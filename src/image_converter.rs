//! # Image Conversion Module
//!
//! Converte immagini raster tra PNG, BMP, JPEG e GIF con la crate `image`.
//!
//! ## Pipeline:
//! 1. Valida il formato di destinazione (`.png`, `.bmp`, `.jpg`/`.jpeg`, `.gif`)
//! 2. Decodifica il file sorgente (formato riconosciuto dal contenuto, limiti di
//!    memoria di default della libreria)
//! 3. Adatta il layout dei canali solo se l'encoder lo richiede
//!    (JPEG senza alpha, GIF/BMP a 8 bit)
//! 4. Ricodifica con la qualità di default della libreria e salva in modo atomico
//!
//! Nessun ridimensionamento, nessuna conversione di spazio colore: solo cambio
//! di formato. A parità di input l'output è identico byte per byte.

use crate::error::ConversionError;
use crate::file_manager::FileManager;
use image::io::Reader as ImageReader;
use image::{ColorType, DynamicImage, ImageError, ImageFormat, ImageOutputFormat};
use std::borrow::Cow;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::debug;

/// Map a normalized extension to an encoder format
pub fn image_format_for(ext: &str) -> Result<ImageFormat, ConversionError> {
    match ext {
        ".png" => Ok(ImageFormat::Png),
        ".bmp" => Ok(ImageFormat::Bmp),
        ".jpeg" | ".jpg" => Ok(ImageFormat::Jpeg),
        ".gif" => Ok(ImageFormat::Gif),
        other => Err(ConversionError::UnsupportedImageFormat(other.to_string())),
    }
}

/// Converts raster images between container formats
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageConverter;

impl ImageConverter {
    pub fn new() -> Self {
        Self
    }

    /// Decode `input_path` and re-encode it as `output_ext` into `output_path`
    pub fn convert(&self, input_path: &Path, output_path: &Path, output_ext: &str) -> Result<(), ConversionError> {
        let format = image_format_for(output_ext)?;

        let image = Self::decode(input_path)?;
        debug!(
            "🖼️ Decoded {} ({}x{}, {:?}) -> {:?}",
            input_path.display(),
            image.width(),
            image.height(),
            image.color(),
            format
        );

        let prepared = prepare_for(format, &image);
        FileManager::persist_atomically(output_path, |file| {
            let mut writer = BufWriter::new(file);
            prepared
                .write_to(&mut writer, ImageOutputFormat::from(format))
                .map_err(encode_error)?;
            writer.flush()?;
            Ok(())
        })
    }

    fn decode(path: &Path) -> Result<DynamicImage, ConversionError> {
        let reader = ImageReader::open(path)?.with_guessed_format()?;
        reader.decode().map_err(|e| match e {
            ImageError::Limits(limits) => {
                ConversionError::corrupt(path, format!("image exceeds decoding limits: {}", limits))
            }
            other => ConversionError::corrupt(path, other),
        })
    }
}

/// Reduce the pixel layout to what the target encoder accepts
fn prepare_for(format: ImageFormat, image: &DynamicImage) -> Cow<'_, DynamicImage> {
    let color = image.color();
    match format {
        ImageFormat::Jpeg if !matches!(color, ColorType::Rgb8 | ColorType::L8) => {
            Cow::Owned(DynamicImage::ImageRgb8(image.to_rgb8()))
        }
        ImageFormat::Gif if color != ColorType::Rgba8 => Cow::Owned(DynamicImage::ImageRgba8(image.to_rgba8())),
        ImageFormat::Bmp if !matches!(color, ColorType::Rgb8 | ColorType::Rgba8) => {
            if color.has_alpha() {
                Cow::Owned(DynamicImage::ImageRgba8(image.to_rgba8()))
            } else {
                Cow::Owned(DynamicImage::ImageRgb8(image.to_rgb8()))
            }
        }
        ImageFormat::Png if matches!(color, ColorType::Rgb32F | ColorType::Rgba32F) => {
            Cow::Owned(DynamicImage::ImageRgba16(image.to_rgba16()))
        }
        _ => Cow::Borrowed(image),
    }
}

fn encode_error(e: ImageError) -> ConversionError {
    match e {
        ImageError::IoError(io) => ConversionError::Io(io),
        ImageError::Unsupported(unsupported) => ConversionError::UnsupportedImageFormat(unsupported.to_string()),
        other => ConversionError::Unknown(format!("image encoding failed: {}", other)),
    }
}
