use std::{fmt, io::Cursor, str::FromStr, sync::Arc};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, ImageFormat};
use shared::domain::Region;
use thiserror::Error;

/// Container encodings the workflow accepts. Anything else is rejected at
/// load time, before the orchestrator sees the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageEncoding {
    Jpeg,
    Png,
    Tiff,
}

impl ImageEncoding {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageEncoding::Jpeg => "image/jpeg",
            ImageEncoding::Png => "image/png",
            ImageEncoding::Tiff => "image/tiff",
        }
    }

    fn from_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Jpeg => Some(ImageEncoding::Jpeg),
            ImageFormat::Png => Some(ImageEncoding::Png),
            ImageFormat::Tiff => Some(ImageEncoding::Tiff),
            _ => None,
        }
    }
}

impl fmt::Display for ImageEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ImageEncoding::Jpeg => "jpeg",
            ImageEncoding::Png => "png",
            ImageEncoding::Tiff => "tiff",
        };
        write!(f, "{name}")
    }
}

impl FromStr for ImageEncoding {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(ImageEncoding::Jpeg),
            "png" => Ok(ImageEncoding::Png),
            "tiff" | "tif" => Ok(ImageEncoding::Tiff),
            other => Err(format!("unknown image encoding '{other}'")),
        }
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("image blob is empty")]
    EmptyBlob,
    #[error("blob does not start with a recognized image signature")]
    UnknownEncoding,
    #[error("unsupported image encoding: {0}")]
    UnsupportedEncoding(String),
    #[error("corrupt {encoding} data: {source}")]
    Corrupt {
        encoding: ImageEncoding,
        source: image::ImageError,
    },
}

#[derive(Debug, Error)]
pub enum RegionError {
    #[error("region {region} exceeds image bounds {width}x{height}")]
    OutOfBounds {
        region: Region,
        width: u32,
        height: u32,
    },
    #[error("failed to encode cropped region: {0}")]
    Encode(#[from] image::ImageError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("no region has been selected yet")]
    NothingSelected,
}

/// Decoded image handle: pixel data plus a displayable `data:` URI of the
/// original blob. Immutable; cloning shares the pixel buffer.
#[derive(Clone)]
pub struct SourceImage {
    pixels: Arc<DynamicImage>,
    width: u32,
    height: u32,
    encoding: ImageEncoding,
    data_uri: String,
}

impl SourceImage {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn encoding(&self) -> ImageEncoding {
        self.encoding
    }

    pub fn data_uri(&self) -> &str {
        &self.data_uri
    }

    pub fn pixels(&self) -> &DynamicImage {
        &self.pixels
    }

    /// Extract the pixels under `region`. Containment-checked; regions the
    /// orchestrator has validated never fail here.
    pub fn crop(&self, region: &Region) -> Result<DynamicImage, RegionError> {
        if !region.is_within(self.width, self.height) {
            return Err(RegionError::OutOfBounds {
                region: *region,
                width: self.width,
                height: self.height,
            });
        }
        Ok(self
            .pixels
            .crop_imm(region.x, region.y, region.width, region.height))
    }

    /// Crop and PNG-encode `region`, the form a remote classifier consumes.
    pub fn crop_to_png(&self, region: &Region) -> Result<Vec<u8>, RegionError> {
        let cropped = self.crop(region)?;
        let mut buffer = Vec::new();
        cropped.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)?;
        Ok(buffer)
    }
}

impl fmt::Debug for SourceImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("encoding", &self.encoding)
            .finish()
    }
}

/// Turns raw blobs into decoded [`SourceImage`]s. Which encodings are
/// admitted is configuration; the default set is jpeg, png and tiff.
#[derive(Debug, Clone)]
pub struct ImageSource {
    accepted: Vec<ImageEncoding>,
}

impl Default for ImageSource {
    fn default() -> Self {
        Self {
            accepted: vec![ImageEncoding::Jpeg, ImageEncoding::Png, ImageEncoding::Tiff],
        }
    }
}

impl ImageSource {
    pub fn new(accepted: Vec<ImageEncoding>) -> Self {
        Self { accepted }
    }

    pub fn accepted(&self) -> &[ImageEncoding] {
        &self.accepted
    }

    /// Decode `blob` into a [`SourceImage`]. The caller's blob is untouched;
    /// the displayable data URI embeds a base64 copy of it.
    pub fn load(&self, blob: &[u8]) -> Result<SourceImage, DecodeError> {
        if blob.is_empty() {
            return Err(DecodeError::EmptyBlob);
        }

        let format = image::guess_format(blob).map_err(|_| DecodeError::UnknownEncoding)?;
        let Some(encoding) = ImageEncoding::from_format(format) else {
            return Err(DecodeError::UnsupportedEncoding(format_label(format)));
        };
        if !self.accepted.contains(&encoding) {
            return Err(DecodeError::UnsupportedEncoding(encoding.to_string()));
        }

        let pixels = image::load_from_memory_with_format(blob, format)
            .map_err(|source| DecodeError::Corrupt { encoding, source })?;
        let data_uri = format!(
            "data:{};base64,{}",
            encoding.mime_type(),
            STANDARD.encode(blob)
        );

        Ok(SourceImage {
            width: pixels.width(),
            height: pixels.height(),
            pixels: Arc::new(pixels),
            encoding,
            data_uri,
        })
    }
}

fn format_label(format: ImageFormat) -> String {
    format
        .extensions_str()
        .first()
        .map(|ext| ext.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Interactive rectangle selection over one image's bounds. Every emitted
/// region is clamped into the image; nothing is emitted before the first
/// adjustment, so there is no implicit default crop.
#[derive(Debug, Clone)]
pub struct RegionSelector {
    image_width: u32,
    image_height: u32,
    current: Option<Region>,
}

impl RegionSelector {
    pub fn new(image: &SourceImage) -> Self {
        Self::with_bounds(image.width(), image.height())
    }

    pub fn with_bounds(image_width: u32, image_height: u32) -> Self {
        // Decoded images are never empty; degenerate bounds collapse to 1x1.
        Self {
            image_width: image_width.max(1),
            image_height: image_height.max(1),
            current: None,
        }
    }

    /// One adjustment of the selection rectangle. The requested rectangle is
    /// clamped into the image; a degenerate request collapses to a 1x1 cell
    /// at the nearest edge rather than an empty or out-of-bounds region.
    pub fn adjust(&mut self, x: u32, y: u32, width: u32, height: u32) -> Region {
        let x = x.min(self.image_width.saturating_sub(1));
        let y = y.min(self.image_height.saturating_sub(1));
        let width = width.clamp(1, self.image_width - x);
        let height = height.clamp(1, self.image_height - y);
        let region = Region::new(x, y, width, height);
        self.current = Some(region);
        region
    }

    /// The last adjusted region, `None` before any interaction.
    pub fn current(&self) -> Option<Region> {
        self.current
    }

    /// Commit to the current region.
    pub fn confirm(&self) -> Result<Region, SelectionError> {
        self.current.ok_or(SelectionError::NothingSelected)
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
