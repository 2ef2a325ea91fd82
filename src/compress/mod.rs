//! Size-halving compressor
//!
//! Re-encodes an image (or the first page of a PDF, rasterized) at
//! decreasing quality levels until the written file is at most half the
//! size of the input, or the quality floor is reached.
//!
//! ```text
//!  input ──► SourceInput ──► DynamicImage ──► encode(q=85) ──► size <= half? ──► done
//!            (Raster |                            ▲                  │ no
//!             Document)                           └──── q -= 5 ◄─────┘ (while q > 10)
//! ```

mod encode;
mod pdf;

use image::DynamicImage;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::error::AppError;

pub use encode::encode;
pub use pdf::rasterize_first_page;

/// Quality used for the first attempt
pub const INITIAL_QUALITY: u8 = 85;
/// Quality decrement between attempts
pub const QUALITY_STEP: u8 = 5;
/// Attempts stop once quality drops to this value or below
pub const QUALITY_FLOOR: u8 = 10;
/// Upper bound on encode attempts per input (85, 80, ..., 15)
pub const MAX_ATTEMPTS: u32 = ((INITIAL_QUALITY - QUALITY_FLOOR) / QUALITY_STEP) as u32;

/// Extensions accepted for upload, in display order
pub const ALLOWED_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "gif", "pdf"];

/// Declared type of an uploaded file, taken from its extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    Png,
    Jpg,
    Jpeg,
    Gif,
    Pdf,
}

impl FileType {
    /// Case-insensitive lookup of an extension without the leading dot
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" => Some(Self::Jpg),
            "jpeg" => Some(Self::Jpeg),
            "gif" => Some(Self::Gif),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }

    /// File type of `filename` based on the text after its last dot
    pub fn from_filename(filename: &str) -> Option<Self> {
        let (_, ext) = filename.rsplit_once('.')?;
        Self::from_extension(ext)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpg => "jpg",
            Self::Jpeg => "jpeg",
            Self::Gif => "gif",
            Self::Pdf => "pdf",
        }
    }

    /// MIME type of a file carrying this extension
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpg | Self::Jpeg => "image/jpeg",
            Self::Gif => "image/gif",
            Self::Pdf => "application/pdf",
        }
    }

    /// Encoder used for the compressed artifact.
    ///
    /// GIF has no dedicated encoder and falls back to JPEG.
    pub fn output_format(self) -> OutputFormat {
        match self {
            Self::Png => OutputFormat::Png,
            Self::Pdf => OutputFormat::Pdf,
            Self::Jpg | Self::Jpeg | Self::Gif => OutputFormat::Jpeg,
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Container written for the compressed artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Jpeg,
    Png,
    /// Single-page PDF wrapping a JPEG raster of the working image
    Pdf,
}

impl OutputFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Pdf => "application/pdf",
        }
    }
}

/// Source of the working image
#[derive(Debug, Clone, Copy)]
pub enum SourceInput<'a> {
    /// A file decoded directly as an image; format is sniffed from content
    Raster(&'a Path),
    /// A document whose first page is rasterized
    Document(&'a Path),
}

impl<'a> SourceInput<'a> {
    pub fn new(path: &'a Path, file_type: FileType) -> Self {
        match file_type {
            FileType::Pdf => Self::Document(path),
            _ => Self::Raster(path),
        }
    }

    pub fn path(&self) -> &'a Path {
        match self {
            Self::Raster(path) | Self::Document(path) => path,
        }
    }

    /// Decode into the in-memory image the quality search runs on
    pub fn load(&self) -> Result<DynamicImage, AppError> {
        let bytes = std::fs::read(self.path())?;
        match self {
            Self::Raster(_) => image::load_from_memory(&bytes)
                .map_err(|e| AppError::Decode(format!("invalid image: {e}"))),
            Self::Document(_) => rasterize_first_page(&bytes).map(DynamicImage::ImageRgb8),
        }
    }
}

/// Outcome of one compression run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionResult {
    /// Byte length of the input file
    pub initial_size: u64,
    /// Byte length of the last file written to the output path
    pub compressed_size: u64,
    /// Where the compressed artifact was written
    pub compressed_path: PathBuf,
    /// Quality of the last attempt
    pub final_quality: u8,
    /// Number of encode attempts made
    pub attempts: u32,
}

impl CompressionResult {
    /// Whether the output reached half the input size
    pub fn met_target(&self) -> bool {
        within_target(self.compressed_size, self.initial_size)
    }
}

/// `size <= initial / 2`, evaluated without rounding
fn within_target(size: u64, initial_size: u64) -> bool {
    size.saturating_mul(2) <= initial_size
}

/// Compress `input_path` into `output_path`.
///
/// Quality starts at [`INITIAL_QUALITY`] and drops by [`QUALITY_STEP`] after
/// every attempt that misses the target. The search stops at the first
/// attempt at or below half the input size, or once the next quality would
/// be at or below [`QUALITY_FLOOR`]. The last written file is the result
/// either way.
///
/// # Errors
/// - [`AppError::Decode`] if the input cannot be decoded
/// - [`AppError::Encode`] if the working image cannot be re-encoded
/// - [`AppError::Io`] on filesystem failures
pub fn compress(
    input_path: &Path,
    output_path: &Path,
    file_type: FileType,
) -> Result<CompressionResult, AppError> {
    let started = Instant::now();
    let working = SourceInput::new(input_path, file_type).load()?;
    let format = file_type.output_format();

    let initial_size = std::fs::metadata(input_path)?.len();

    let mut quality = INITIAL_QUALITY;
    let mut attempts = 0;
    let (compressed_size, final_quality) = loop {
        let encoded = encode(&working, format, quality)?;
        std::fs::write(output_path, &encoded)?;
        let current_size = std::fs::metadata(output_path)?.len();
        attempts += 1;

        tracing::debug!(
            %file_type,
            quality,
            current_size,
            target_size = initial_size / 2,
            "Compression attempt"
        );

        if within_target(current_size, initial_size) || quality - QUALITY_STEP <= QUALITY_FLOOR {
            break (current_size, quality);
        }
        quality -= QUALITY_STEP;
    };

    let result = CompressionResult {
        initial_size,
        compressed_size,
        compressed_path: output_path.to_path_buf(),
        final_quality,
        attempts,
    };

    {
        use crate::metrics::{
            COMPRESSION_ATTEMPTS, COMPRESSION_BYTES_IN, COMPRESSION_BYTES_OUT,
            COMPRESSION_DURATION_SECONDS,
        };
        COMPRESSION_ATTEMPTS
            .with_label_values(&[file_type.as_str()])
            .observe(f64::from(attempts));
        COMPRESSION_DURATION_SECONDS
            .with_label_values(&[file_type.as_str()])
            .observe(started.elapsed().as_secs_f64());
        COMPRESSION_BYTES_IN.inc_by(initial_size);
        COMPRESSION_BYTES_OUT.inc_by(compressed_size);
    }

    tracing::info!(
        %file_type,
        initial_size,
        compressed_size,
        final_quality,
        attempts,
        met_target = result.met_target(),
        "Compression finished"
    );

    Ok(result)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use tempfile::TempDir;

    /// Deterministic noise; compresses poorly under every codec
    pub(crate) fn noise_image(width: u32, height: u32, seed: u32) -> RgbImage {
        let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
        RgbImage::from_fn(width, height, |_, _| {
            let mut next = || {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state >> 24) as u8
            };
            Rgb([next(), next(), next()])
        })
    }

    /// Smooth content; compresses very well as JPEG
    pub(crate) fn gradient_image(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([
                (x * 255 / width.max(1)) as u8,
                (y * 255 / height.max(1)) as u8,
                128,
            ])
        })
    }

    #[test]
    fn file_type_lookup_is_case_insensitive_and_uses_last_extension() {
        assert_eq!(FileType::from_filename("photo.JPG"), Some(FileType::Jpg));
        assert_eq!(FileType::from_filename("archive.tar.pdf"), Some(FileType::Pdf));
        assert_eq!(FileType::from_filename(".png"), Some(FileType::Png));
        assert_eq!(FileType::from_filename("notes.txt"), None);
        assert_eq!(FileType::from_filename("png"), None);
        assert_eq!(FileType::from_filename("photo."), None);
        assert_eq!(FileType::from_extension("bmp"), None);
    }

    #[test]
    fn output_format_mapping_sends_gif_to_jpeg() {
        assert_eq!(FileType::Jpg.output_format(), OutputFormat::Jpeg);
        assert_eq!(FileType::Jpeg.output_format(), OutputFormat::Jpeg);
        assert_eq!(FileType::Gif.output_format(), OutputFormat::Jpeg);
        assert_eq!(FileType::Png.output_format(), OutputFormat::Png);
        assert_eq!(FileType::Pdf.output_format(), OutputFormat::Pdf);
    }

    #[test]
    fn gif_output_is_labelled_as_jpeg() {
        assert_eq!(FileType::Gif.content_type(), "image/gif");
        assert_eq!(FileType::Gif.output_format().content_type(), "image/jpeg");
        assert_eq!(FileType::Pdf.output_format().content_type(), "application/pdf");
        assert_eq!(FileType::Png.output_format().content_type(), "image/png");
    }

    #[test]
    fn attempt_limit_covers_85_down_to_15() {
        assert_eq!(MAX_ATTEMPTS, 15);
    }

    #[test]
    fn uncompressed_source_meets_target_on_first_attempt() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("photo.jpg");
        let output = dir.path().join("photo_compressed.jpg");
        // Raw bitmap content behind a .jpg name; decoding sniffs the real format.
        gradient_image(256, 256)
            .save_with_format(&input, ImageFormat::Bmp)
            .unwrap();

        let result = compress(&input, &output, FileType::Jpg).unwrap();

        assert_eq!(result.attempts, 1);
        assert_eq!(result.final_quality, INITIAL_QUALITY);
        assert!(result.met_target());
        assert_eq!(
            result.compressed_size,
            std::fs::metadata(&output).unwrap().len()
        );

        let q85 = encode(
            &DynamicImage::ImageRgb8(gradient_image(256, 256)),
            OutputFormat::Jpeg,
            INITIAL_QUALITY,
        )
        .unwrap();
        assert_eq!(result.compressed_size, q85.len() as u64);
    }

    #[test]
    fn lossless_output_exhausts_quality_range_without_touching_floor() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("noise.png");
        let output = dir.path().join("noise_compressed.png");
        noise_image(96, 96, 7)
            .save_with_format(&input, ImageFormat::Png)
            .unwrap();
        let input_len = std::fs::metadata(&input).unwrap().len();

        let result = compress(&input, &output, FileType::Png).unwrap();

        assert_eq!(result.attempts, MAX_ATTEMPTS);
        assert_eq!(result.final_quality, QUALITY_FLOOR + QUALITY_STEP);
        assert!(!result.met_target());
        assert_eq!(result.initial_size, input_len);
        assert_eq!(result.compressed_path, output);
        assert!(output.exists());
    }

    #[test]
    fn initial_size_is_the_input_byte_count() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("photo.jpeg");
        let output = dir.path().join("photo_compressed.jpeg");
        noise_image(64, 64, 3)
            .save_with_format(&input, ImageFormat::Jpeg)
            .unwrap();
        let before = std::fs::read(&input).unwrap();

        let result = compress(&input, &output, FileType::Jpeg).unwrap();

        assert_eq!(result.initial_size, before.len() as u64);
        assert_eq!(std::fs::read(&input).unwrap(), before);
        assert!(result.attempts >= 1 && result.attempts <= MAX_ATTEMPTS);
    }

    #[test]
    fn gif_input_is_written_as_jpeg() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("anim.gif");
        let output = dir.path().join("anim_compressed.gif");
        gradient_image(64, 64)
            .save_with_format(&input, ImageFormat::Gif)
            .unwrap();

        compress(&input, &output, FileType::Gif).unwrap();

        let written = std::fs::read(&output).unwrap();
        assert_eq!(&written[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn corrupt_input_is_a_decode_error() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("broken.png");
        let output = dir.path().join("broken_compressed.png");
        std::fs::write(&input, b"\x89PNG\r\n\x1a\nnot really a png").unwrap();

        let error = compress(&input, &output, FileType::Png).unwrap_err();

        assert!(matches!(error, AppError::Decode(_)));
        assert!(!output.exists());
    }

    #[test]
    fn missing_input_is_an_io_error() {
        let dir = TempDir::new().unwrap();
        let error = compress(
            &dir.path().join("absent.jpg"),
            &dir.path().join("absent_compressed.jpg"),
            FileType::Jpg,
        )
        .unwrap_err();
        assert!(matches!(error, AppError::Io(_)));
    }
}
