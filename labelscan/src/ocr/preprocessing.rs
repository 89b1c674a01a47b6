use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GenericImageView, GrayImage, ImageFormat, ImageReader};
use tracing::{debug, warn};

use crate::config::OcrConfig;
use crate::error::{Result, ScanError};

/// File name prefix marking a derived, recognition-ready image.
pub const DERIVED_PREFIX: &str = "preprocessed_";

const MAX_CLAIM_ATTEMPTS: u32 = 64;
const JPEG_QUALITY: u8 = 100;
const SHARPEN_SIGMA: f32 = 1.0;
const SHARPEN_THRESHOLD: i32 = 0;
const NORMALIZE_LOW_PERCENTILE: f32 = 0.01;
const NORMALIZE_HIGH_PERCENTILE: f32 = 0.99;

/// A derived image on disk, owned by the request that created it.
///
/// The file is deleted exactly once: by [`PreprocessedImage::cleanup`] on the
/// normal path, or by `Drop` if the value goes away first.
#[derive(Debug)]
pub struct PreprocessedImage {
    path: PathBuf,
    armed: bool,
}

impl PreprocessedImage {
    fn claimed(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the derived file now. A file that is already gone counts as
    /// cleaned up.
    pub fn cleanup(mut self) -> std::io::Result<()> {
        self.armed = false;
        remove_derived(&self.path)
    }
}

impl Drop for PreprocessedImage {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.armed = false;
        if let Err(e) = remove_derived(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to remove derived image");
        }
    }
}

fn remove_derived(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "Removed derived image");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Turns uploaded images into recognition-ready derived files.
#[derive(Debug, Clone)]
pub struct Preprocessor {
    max_image_dimension: u32,
}

impl Preprocessor {
    pub fn new(config: &OcrConfig) -> Self {
        Self {
            max_image_dimension: config.max_image_dimension,
        }
    }

    /// Run the transform chain on the blocking pool and write the result
    /// beside `source`.
    pub async fn preprocess(&self, source: &Path) -> Result<PreprocessedImage> {
        let source = source.to_path_buf();
        let max_dim = self.max_image_dimension;

        tokio::task::spawn_blocking(move || preprocess_image(&source, max_dim))
            .await
            .map_err(|e| ScanError::Io(format!("Preprocessing task panicked: {e}")))?
    }
}

/// Preprocess an image file for OCR
///
/// Applies the following transformations, in order:
/// 1. Converts to grayscale (drops colour and alpha)
/// 2. Stretches brightness/contrast across the full range
/// 3. Sharpens edges with an unsharp mask
/// 4. Shrinks images larger than `max_dim`, keeping aspect ratio
/// 5. Encodes in the source format when supported, PNG otherwise
///
/// # Returns
/// The derived file, named `preprocessed_<basename>` next to the source
pub fn preprocess_image(source: &Path, max_dim: u32) -> Result<PreprocessedImage> {
    // Sniff the real format; the extension is only a hint
    let reader = ImageReader::open(source)
        .map_err(|e| ScanError::Io(format!("Failed to open image: {e}")))?
        .with_guessed_format()
        .map_err(|e| ScanError::Io(format!("Failed to read image: {e}")))?;
    let output_format = output_format(reader.format());

    let img = reader
        .decode()
        .map_err(|e| ScanError::Io(format!("Failed to decode image: {e}")))?;

    // 1. Grayscale
    let gray = img.grayscale().to_luma8();

    // 2. Contrast stretch
    let gray = normalize_contrast(gray);

    // 3. Sharpen
    let img = DynamicImage::ImageLuma8(gray).unsharpen(SHARPEN_SIGMA, SHARPEN_THRESHOLD);

    // 4. Downscale
    let img = resize_if_needed(img, max_dim);

    // 5. Claim the output name, then encode. The guard removes a partial file.
    let (derived_path, file) = claim_derived_path(source)?;
    let derived = PreprocessedImage::claimed(derived_path);

    encode(&img, file, output_format).map_err(|e| {
        ScanError::Io(format!(
            "Failed to write {}: {e}",
            derived.path().display()
        ))
    })?;

    let (width, height) = img.dimensions();
    debug!(
        source = %source.display(),
        derived = %derived.path().display(),
        width,
        height,
        format = ?output_format,
        "Image preprocessed"
    );

    Ok(derived)
}

/// Atomically create the derived file next to `source`.
///
/// The canonical name is `preprocessed_<basename>`; when another request on
/// the same source already holds it, `preprocessed_<n>_<basename>` is used.
fn claim_derived_path(source: &Path) -> Result<(PathBuf, File)> {
    let file_name = source
        .file_name()
        .ok_or_else(|| ScanError::Io(format!("Not a file path: {}", source.display())))?;
    let dir = source.parent().unwrap_or_else(|| Path::new(""));

    for attempt in 0..MAX_CLAIM_ATTEMPTS {
        let mut name = OsString::from(DERIVED_PREFIX);
        if attempt > 0 {
            name.push(format!("{attempt}_"));
        }
        name.push(file_name);
        let candidate = dir.join(name);

        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
        {
            Ok(file) => return Ok((candidate, file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => {
                return Err(ScanError::Io(format!(
                    "Failed to create {}: {e}",
                    candidate.display()
                )))
            }
        }
    }

    Err(ScanError::Io(format!(
        "No free derived file name for {} after {MAX_CLAIM_ATTEMPTS} attempts",
        source.display()
    )))
}

fn output_format(source_format: Option<ImageFormat>) -> ImageFormat {
    match source_format {
        Some(
            format @ (ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::WebP | ImageFormat::Tiff),
        ) => format,
        _ => ImageFormat::Png,
    }
}

fn encode(img: &DynamicImage, file: File, format: ImageFormat) -> Result<()> {
    let mut writer = BufWriter::new(file);

    match format {
        ImageFormat::Jpeg => {
            img.write_with_encoder(JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY))?
        }
        other => img.write_to(&mut writer, other)?,
    }

    writer.flush()?;
    Ok(())
}

/// Resize image if it exceeds maximum dimension while maintaining aspect ratio
///
/// Never enlarges. Uses Lanczos3 for high-quality downscaling.
fn resize_if_needed(img: DynamicImage, max_dim: u32) -> DynamicImage {
    let (width, height) = img.dimensions();

    // Already fits
    if width <= max_dim && height <= max_dim {
        return img;
    }

    // Scale by the longer side
    let ratio = if width > height {
        max_dim as f32 / width as f32
    } else {
        max_dim as f32 / height as f32
    };

    let new_width = ((width as f32 * ratio) as u32).max(1);
    let new_height = ((height as f32 * ratio) as u32).max(1);

    img.resize_exact(new_width, new_height, image::imageops::FilterType::Lanczos3)
}

/// Stretch luminance so the 1st percentile maps to 0 and the 99th to 255
///
/// Clipping the extremes keeps a few specular highlights or dead pixels from
/// pinning the range.
fn normalize_contrast(gray: GrayImage) -> GrayImage {
    let total = gray.pixels().len();
    if total == 0 {
        return gray;
    }

    let mut histogram = [0usize; 256];
    for pixel in gray.pixels() {
        histogram[pixel[0] as usize] += 1;
    }

    let low = percentile(&histogram, total, NORMALIZE_LOW_PERCENTILE);
    let high = percentile(&histogram, total, NORMALIZE_HIGH_PERCENTILE);

    if high <= low {
        return gray;
    }

    let range = (high - low) as f32;
    let mut lut = [0u8; 256];
    for (value, slot) in lut.iter_mut().enumerate() {
        let clamped = (value as u8).clamp(low, high);
        *slot = (((clamped - low) as f32 / range) * 255.0).round() as u8;
    }

    let mut out = gray;
    for pixel in out.pixels_mut() {
        pixel[0] = lut[pixel[0] as usize];
    }
    out
}

fn percentile(histogram: &[usize; 256], total: usize, fraction: f32) -> u8 {
    let target = ((total as f32 * fraction).ceil() as usize).max(1);
    let mut seen = 0;
    for (value, count) in histogram.iter().enumerate() {
        seen += count;
        if seen >= target {
            return value as u8;
        }
    }
    255
}
