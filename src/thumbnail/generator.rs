use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, DynamicImage, ImageFormat};
use log::{debug, info};

use crate::configuration::config::Config;
use crate::error_handling::types::PreviewError;
use crate::storage::artifacts;
use crate::storage::naming;
use crate::storage::types::PageFormat;
use crate::thumbnail::filter::ThumbnailFilter;

pub const LIST_PREVIEW_HEIGHT: u32 = 250;
pub const DETAIL_PREVIEW_HEIGHT: u32 = 500;

const JPEG_QUALITY: u8 = 85;

/// Which preview a caller wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewSize {
    /// Small preview for job page listings.
    List,
    /// Larger preview for a single page view.
    Detail,
}

/// Derives JPEG previews from captured pages and serves cached ones.
///
/// Each [`PreviewSize`] has its own cache file next to the content file.
#[derive(Debug, Clone)]
pub struct PreviewGenerator {
    filter: ThumbnailFilter,
    target_height: u32,
    size: PreviewSize,
}

impl PreviewGenerator {
    /// A list-size generator with the given height.
    pub fn new(filter: ThumbnailFilter, target_height: u32) -> Self {
        Self::sized(filter, PreviewSize::List, target_height)
    }

    pub fn sized(filter: ThumbnailFilter, size: PreviewSize, target_height: u32) -> Self {
        Self {
            filter,
            target_height: target_height.max(1),
            size,
        }
    }

    pub fn from_config(config: &Config, size: PreviewSize) -> Self {
        let height = match size {
            PreviewSize::List => config.list_preview_height,
            PreviewSize::Detail => config.detail_preview_height,
        };
        Self::sized(ThumbnailFilter::from_name(&config.thumbnail_filter), size, height)
    }

    /// Cache file of this generator's size for `content_path`.
    pub fn preview_path(&self, content_path: &Path) -> PathBuf {
        match self.size {
            PreviewSize::List => naming::preview_path(content_path),
            PreviewSize::Detail => naming::detail_preview_path(content_path),
        }
    }

    /// Generates the preview of `content_path` next to it.
    ///
    /// Unsupported formats fail before anything is read or written.
    pub fn generate(&self, content_path: &Path) -> Result<PathBuf, PreviewError> {
        let format = decoder_format(content_path)?;
        let bytes = fs::read(content_path).map_err(|e| PreviewError::Io {
            path: content_path.to_path_buf(),
            source: e,
        })?;
        let preview_path = self.preview_path(content_path);
        self.render_to(&bytes, format, content_path, &preview_path)?;
        Ok(preview_path)
    }

    /// Generates the preview of `content_path` from in-memory page bytes.
    ///
    /// Used when the stored page cannot be decoded directly, e.g. a PDF whose
    /// source JPEG is still at hand.
    pub fn generate_from_bytes(
        &self,
        bytes: &[u8],
        source: PageFormat,
        content_path: &Path,
    ) -> Result<PathBuf, PreviewError> {
        let format = match source {
            PageFormat::Tiff => ImageFormat::Tiff,
            PageFormat::Png => ImageFormat::Png,
            PageFormat::Jpeg => ImageFormat::Jpeg,
            other => return Err(PreviewError::UnsupportedFormat(other.extension().to_string())),
        };
        let preview_path = self.preview_path(content_path);
        self.render_to(bytes, format, content_path, &preview_path)?;
        Ok(preview_path)
    }

    /// Cached preview of `content_path`, re-encoded as JPEG.
    pub fn preview(&self, content_path: &Path) -> Result<Vec<u8>, PreviewError> {
        let preview_path = self.preview_path(content_path);
        let bytes = match fs::read(&preview_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(PreviewError::NotFound(preview_path));
            }
            Err(e) => {
                return Err(PreviewError::Io {
                    path: preview_path,
                    source: e,
                })
            }
        };
        let img = image::load_from_memory_with_format(&bytes, ImageFormat::Jpeg).map_err(|e| {
            PreviewError::Decode {
                path: preview_path.clone(),
                source: e,
            }
        })?;
        encode_jpeg(&img)
    }

    /// Serves the cached preview, generating it first when missing.
    pub fn preview_or_generate(&self, content_path: &Path) -> Result<Vec<u8>, PreviewError> {
        match self.preview(content_path) {
            Err(PreviewError::NotFound(_)) => {
                info!("Generating missing preview for {}", content_path.display());
                self.generate(content_path)?;
                self.preview(content_path)
            }
            other => other,
        }
    }

    fn render_to(
        &self,
        bytes: &[u8],
        format: ImageFormat,
        source: &Path,
        preview_path: &Path,
    ) -> Result<(), PreviewError> {
        let start = Instant::now();
        let img = image::load_from_memory_with_format(bytes, format).map_err(|e| {
            PreviewError::Decode {
                path: source.to_path_buf(),
                source: e,
            }
        })?;
        let (width, height) = (img.width(), img.height());
        let scaled = img.resize_exact(
            scaled_width(width, height, self.target_height),
            self.target_height,
            self.filter.filter_type(),
        );
        let jpeg = encode_jpeg(&scaled)?;
        artifacts::write_replace(preview_path, &jpeg).map_err(|e| PreviewError::Io {
            path: preview_path.to_path_buf(),
            source: e,
        })?;
        debug!(
            "Preview {} ({}x{} -> {}x{}) took {:.3}s",
            preview_path.display(),
            width,
            height,
            scaled.width(),
            scaled.height(),
            start.elapsed().as_secs_f64()
        );
        Ok(())
    }
}

fn decoder_format(path: &Path) -> Result<ImageFormat, PreviewError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    match ext {
        "tiff" => Ok(ImageFormat::Tiff),
        "jpeg" => Ok(ImageFormat::Jpeg),
        "png" => Ok(ImageFormat::Png),
        other => Err(PreviewError::UnsupportedFormat(other.to_string())),
    }
}

/// Width keeping the aspect ratio at the given height, rounded.
fn scaled_width(width: u32, height: u32, target_height: u32) -> u32 {
    let height = u64::from(height.max(1));
    let scaled = (u64::from(width) * u64::from(target_height) + height / 2) / height;
    scaled.clamp(1, u64::from(u32::MAX)) as u32
}

fn encode_jpeg(img: &DynamicImage) -> Result<Vec<u8>, PreviewError> {
    // the JPEG encoder takes neither alpha nor 16-bit samples
    let flat = match img.color() {
        ColorType::L8 | ColorType::Rgb8 => img.clone(),
        ColorType::L16 | ColorType::La8 | ColorType::La16 => DynamicImage::ImageLuma8(img.to_luma8()),
        _ => DynamicImage::ImageRgb8(img.to_rgb8()),
    };
    let mut buf = Vec::new();
    flat.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY))
        .map_err(PreviewError::Encode)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgb, RgbImage, Rgba, RgbaImage};
    use std::io::Cursor;
    use tempfile::TempDir;

    fn write_sample(path: &Path, format: ImageFormat, width: u32, height: u32) {
        let img = RgbImage::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 90]));
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img).write_to(&mut buf, format).unwrap();
        fs::write(path, buf.into_inner()).unwrap();
    }

    #[test]
    fn generate_then_preview_round_trip() {
        let dir = TempDir::new().unwrap();
        let content = dir.path().join("20260101000000000.tiff");
        write_sample(&content, ImageFormat::Tiff, 400, 1000);

        let generator = PreviewGenerator::new(ThumbnailFilter::NearestNeighbor, LIST_PREVIEW_HEIGHT);
        let preview_path = generator.generate(&content).unwrap();
        assert_eq!(preview_path, dir.path().join("20260101000000000.tiff.thumbnail"));

        let jpeg = generator.preview(&content).unwrap();
        let decoded = image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg).unwrap();
        assert_eq!(decoded.dimensions(), (100, LIST_PREVIEW_HEIGHT));
    }

    #[test]
    fn png_with_alpha_is_flattened() {
        let dir = TempDir::new().unwrap();
        let content = dir.path().join("20260101000000000.png");
        let img = RgbaImage::from_pixel(50, 100, Rgba([10, 20, 30, 128]));
        DynamicImage::ImageRgba8(img).save_with_format(&content, ImageFormat::Png).unwrap();

        let generator = PreviewGenerator::new(ThumbnailFilter::Lanczos, 20);
        generator.generate(&content).unwrap();
        let decoded = image::load_from_memory(&generator.preview(&content).unwrap()).unwrap();
        assert_eq!(decoded.dimensions(), (10, 20));
    }

    #[test]
    fn unsupported_format_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let content = dir.path().join("20260101000000000.gif");
        fs::write(&content, b"GIF89a").unwrap();

        let generator = PreviewGenerator::new(ThumbnailFilter::default(), LIST_PREVIEW_HEIGHT);
        assert!(matches!(
            generator.generate(&content),
            Err(PreviewError::UnsupportedFormat(ext)) if ext == "gif"
        ));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn corrupt_image_fails_only_that_page() {
        let dir = TempDir::new().unwrap();
        let broken = dir.path().join("20260101000000000.jpeg");
        let good = dir.path().join("20260101000000001.jpeg");
        fs::write(&broken, b"\xff\xd8 garbage").unwrap();
        write_sample(&good, ImageFormat::Jpeg, 30, 60);

        let generator = PreviewGenerator::new(ThumbnailFilter::default(), 30);
        assert!(matches!(
            generator.generate(&broken),
            Err(PreviewError::Decode { .. })
        ));
        assert!(!naming::preview_path(&broken).exists());
        generator.generate(&good).unwrap();
    }

    #[test]
    fn missing_preview_is_not_found() {
        let dir = TempDir::new().unwrap();
        let content = dir.path().join("20260101000000000.png");
        let generator = PreviewGenerator::new(ThumbnailFilter::default(), LIST_PREVIEW_HEIGHT);
        assert!(matches!(
            generator.preview(&content),
            Err(PreviewError::NotFound(_))
        ));
    }

    #[test]
    fn preview_or_generate_fills_the_cache() {
        let dir = TempDir::new().unwrap();
        let content = dir.path().join("20260101000000000.png");
        write_sample(&content, ImageFormat::Png, 20, 40);

        let generator = PreviewGenerator::new(ThumbnailFilter::CatmullRom, 10);
        let jpeg = generator.preview_or_generate(&content).unwrap();
        assert!(jpeg.starts_with(&[0xff, 0xd8]));
        assert!(naming::preview_path(&content).exists());
    }

    #[test]
    fn regeneration_replaces_the_whole_preview() {
        let dir = TempDir::new().unwrap();
        let content = dir.path().join("20260101000000000.jpeg");
        write_sample(&content, ImageFormat::Jpeg, 64, 64);

        PreviewGenerator::new(ThumbnailFilter::default(), 32).generate(&content).unwrap();
        PreviewGenerator::new(ThumbnailFilter::default(), 16).generate(&content).unwrap();
        let decoded = image::load_from_memory(&fs::read(naming::preview_path(&content)).unwrap()).unwrap();
        assert_eq!(decoded.dimensions(), (16, 16));
        let stray = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(stray, 2);
    }

    #[test]
    fn concurrent_reads_never_see_partial_previews() {
        let dir = TempDir::new().unwrap();
        let content = dir.path().join("20260101000000000.png");
        write_sample(&content, ImageFormat::Png, 200, 400);
        let generator = PreviewGenerator::new(ThumbnailFilter::default(), 100);
        generator.generate(&content).unwrap();

        std::thread::scope(|scope| {
            let writer = scope.spawn(|| {
                for _ in 0..20 {
                    generator.generate(&content).unwrap();
                }
            });
            for _ in 0..200 {
                let jpeg = generator.preview(&content).unwrap();
                image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg).unwrap();
            }
            writer.join().unwrap();
        });
    }

    #[test]
    fn preview_from_bytes_rejects_pdf() {
        let dir = TempDir::new().unwrap();
        let generator = PreviewGenerator::new(ThumbnailFilter::default(), 10);
        assert!(matches!(
            generator.generate_from_bytes(b"%PDF", PageFormat::Pdf, &dir.path().join("x.pdf")),
            Err(PreviewError::UnsupportedFormat(_))
        ));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn preview_from_bytes_lands_next_to_the_content() {
        let dir = TempDir::new().unwrap();
        let content = dir.path().join("20260101000000000.pdf");
        let mut jpeg = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(RgbImage::new(40, 80))
            .write_to(&mut jpeg, ImageFormat::Jpeg)
            .unwrap();

        let generator = PreviewGenerator::new(ThumbnailFilter::default(), 20);
        let written = generator
            .generate_from_bytes(&jpeg.into_inner(), PageFormat::Jpeg, &content)
            .unwrap();
        assert_eq!(written, dir.path().join("20260101000000000.pdf.thumbnail"));
        let decoded = image::load_from_memory(&generator.preview(&content).unwrap()).unwrap();
        assert_eq!(decoded.dimensions(), (10, 20));
    }

    #[test]
    fn list_and_detail_previews_are_cached_apart() {
        let dir = TempDir::new().unwrap();
        let content = dir.path().join("20260101000000000.png");
        write_sample(&content, ImageFormat::Png, 400, 1000);
        let list = PreviewGenerator::sized(ThumbnailFilter::default(), PreviewSize::List, LIST_PREVIEW_HEIGHT);
        let detail =
            PreviewGenerator::sized(ThumbnailFilter::default(), PreviewSize::Detail, DETAIL_PREVIEW_HEIGHT);

        // detail first, then list: neither may serve the other's file
        let large = image::load_from_memory(&detail.preview_or_generate(&content).unwrap()).unwrap();
        let small = image::load_from_memory(&list.preview_or_generate(&content).unwrap()).unwrap();
        assert_eq!(large.dimensions(), (200, DETAIL_PREVIEW_HEIGHT));
        assert_eq!(small.dimensions(), (100, LIST_PREVIEW_HEIGHT));

        let again = image::load_from_memory(&detail.preview(&content).unwrap()).unwrap();
        assert_eq!(again.height(), DETAIL_PREVIEW_HEIGHT);
        assert!(naming::preview_path(&content).is_file());
        assert!(naming::detail_preview_path(&content).is_file());
    }

    #[test]
    fn from_config_picks_height_and_cache_per_size() {
        let config = Config::new("/out", "/work");
        let content = Path::new("/out/job/20260101000000000.tiff");
        let list = PreviewGenerator::from_config(&config, PreviewSize::List);
        let detail = PreviewGenerator::from_config(&config, PreviewSize::Detail);
        assert_eq!(list.preview_path(content), naming::preview_path(content));
        assert_eq!(detail.preview_path(content), naming::detail_preview_path(content));
        assert_eq!(detail.target_height, DETAIL_PREVIEW_HEIGHT);
    }

    #[test]
    fn only_written_extensions_are_decoded() {
        let dir = TempDir::new().unwrap();
        let content = dir.path().join("20260101000000000.jpg");
        write_sample(&content, ImageFormat::Jpeg, 20, 20);
        let generator = PreviewGenerator::new(ThumbnailFilter::default(), 10);
        assert!(matches!(
            generator.generate(&content),
            Err(PreviewError::UnsupportedFormat(ext)) if ext == "jpg"
        ));
        assert!(!naming::preview_path(&content).exists());
    }

    #[test]
    fn scaled_width_rounds() {
        assert_eq!(scaled_width(400, 1000, 250), 100);
        assert_eq!(scaled_width(2550, 3300, 250), 193);
        assert_eq!(scaled_width(1, 5000, 250), 1);
    }
}
