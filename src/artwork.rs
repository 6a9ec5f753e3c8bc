use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use image::{imageops::FilterType, RgbaImage};
use log::{debug, warn};
use percent_encoding::percent_decode_str;
use thiserror::Error;
use ureq::Agent;

pub const DEFAULT_ARTWORK_SIZE: u32 = 184;
pub const DEFAULT_CORNER_RADIUS: f32 = 14.0;
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(5);

const MAX_ARTWORK_BYTES: u64 = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ArtworkError {
    #[error("unsupported artwork reference: {0}")]
    UnsupportedReference(String),

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP request failed: {0}")]
    Http(#[from] ureq::Error),

    #[error("artwork source returned no data")]
    Empty,

    #[error("failed to decode artwork: {0}")]
    Decode(#[from] image::ImageError),

    #[error("invalid artwork size {0}")]
    InvalidSize(u32),
}

/// Where the bytes of a piece of cover art live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtReference {
    Local(PathBuf),
    Remote(String),
}

impl ArtReference {
    /// Parses a player supplied art URL. Empty input yields `Ok(None)`.
    pub fn parse(reference: &str) -> Result<Option<Self>, ArtworkError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Ok(None);
        }

        if let Some(encoded) = reference.strip_prefix("file://") {
            let decoded: Vec<u8> = percent_decode_str(encoded).collect();
            return Ok(Some(ArtReference::Local(path_from_bytes(decoded))));
        }

        if reference.starts_with("http://") || reference.starts_with("https://") {
            return Ok(Some(ArtReference::Remote(reference.to_owned())));
        }

        if reference.starts_with('/') {
            return Ok(Some(ArtReference::Local(PathBuf::from(reference))));
        }

        Err(ArtworkError::UnsupportedReference(reference.to_owned()))
    }
}

// Paths are raw bytes on unix; keep non-UTF-8 file names intact.
#[cfg(unix)]
fn path_from_bytes(bytes: Vec<u8>) -> PathBuf {
    use std::{ffi::OsString, os::unix::ffi::OsStringExt};

    PathBuf::from(OsString::from_vec(bytes))
}

#[cfg(not(unix))]
fn path_from_bytes(bytes: Vec<u8>) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(&bytes).into_owned())
}

/// Loads the raw bytes behind an [`ArtReference`].
pub trait ArtworkFetcher {
    fn fetch(&self, reference: &ArtReference) -> Result<Vec<u8>, ArtworkError>;
}

/// Reads local files and downloads HTTP(S) art with a bounded timeout.
pub struct DefaultFetcher {
    agent: Agent,
}

impl DefaultFetcher {
    pub fn new(timeout: Duration) -> Self {
        let config = Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        Self {
            agent: config.into(),
        }
    }
}

impl Default for DefaultFetcher {
    fn default() -> Self {
        Self::new(DEFAULT_HTTP_TIMEOUT)
    }
}

impl ArtworkFetcher for DefaultFetcher {
    fn fetch(&self, reference: &ArtReference) -> Result<Vec<u8>, ArtworkError> {
        match reference {
            ArtReference::Local(path) => read_file(path),
            ArtReference::Remote(url) => {
                debug!("Downloading artwork from {url}");
                // Non-2xx statuses surface as `ureq::Error::StatusCode`.
                let mut response = self.agent.get(url).call()?;
                let bytes = response
                    .body_mut()
                    .with_config()
                    .limit(MAX_ARTWORK_BYTES)
                    .read_to_vec()?;
                Ok(bytes)
            }
        }
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>, ArtworkError> {
    fs::read(path).map_err(|source| ArtworkError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArtworkOptions {
    pub size_px: u32,
    pub corner_radius: f32,
}

impl ArtworkOptions {
    pub fn square(size_px: u32) -> Self {
        Self {
            size_px,
            corner_radius: DEFAULT_CORNER_RADIUS,
        }
    }
}

impl Default for ArtworkOptions {
    fn default() -> Self {
        Self::square(DEFAULT_ARTWORK_SIZE)
    }
}

/// Turns an art reference into a square bitmap with rounded, transparent corners.
///
/// Stateless: every call runs the full fetch, decode, resize and mask
/// pipeline. Callers are expected to skip references they already resolved.
pub struct ArtworkResolver<F = DefaultFetcher> {
    fetcher: F,
}

impl<F: ArtworkFetcher> ArtworkResolver<F> {
    pub fn new(fetcher: F) -> Self {
        Self { fetcher }
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Resolves `reference`; any failure is logged and yields `None`.
    pub fn resolve(&self, reference: &str, options: ArtworkOptions) -> Option<RgbaImage> {
        match self.try_resolve(reference, options) {
            Ok(image) => image,
            Err(err) => {
                warn!("Artwork for {reference:?} unavailable: {err}");
                None
            }
        }
    }

    pub fn try_resolve(
        &self,
        reference: &str,
        options: ArtworkOptions,
    ) -> Result<Option<RgbaImage>, ArtworkError> {
        let Some(reference) = ArtReference::parse(reference)? else {
            return Ok(None);
        };
        if options.size_px == 0 {
            return Err(ArtworkError::InvalidSize(options.size_px));
        }

        let bytes = self.fetcher.fetch(&reference)?;
        if bytes.is_empty() {
            return Err(ArtworkError::Empty);
        }
        decode_artwork(&bytes, options).map(Some)
    }
}

/// Decodes `bytes`, normalises to RGB, resizes to a square and rounds the corners.
pub fn decode_artwork(bytes: &[u8], options: ArtworkOptions) -> Result<RgbaImage, ArtworkError> {
    let size = options.size_px;
    if size == 0 {
        return Err(ArtworkError::InvalidSize(size));
    }

    let rgb = image::load_from_memory(bytes)?.to_rgb8();
    let resized = image::imageops::resize(&rgb, size, size, FilterType::Lanczos3);
    let mut output = image::DynamicImage::ImageRgb8(resized).to_rgba8();
    round_corners(&mut output, options.corner_radius);
    Ok(output)
}

/// Masks the four corners with an anti-aliased quarter circle of `radius` pixels.
pub fn round_corners(image: &mut RgbaImage, radius: f32) {
    let width = image.width() as f32;
    let height = image.height() as f32;
    if radius.is_nan() {
        return;
    }
    let radius = radius.clamp(0.0, width.min(height) / 2.0);
    if radius <= 0.0 {
        return;
    }

    for (x, y, pixel) in image.enumerate_pixels_mut() {
        let px = x as f32 + 0.5;
        let py = y as f32 + 0.5;
        let cx = px.clamp(radius, width - radius);
        let cy = py.clamp(radius, height - radius);
        let dx = px - cx;
        let dy = py - cy;
        if dx == 0.0 || dy == 0.0 {
            continue;
        }

        let distance = (dx * dx + dy * dy).sqrt();
        let coverage = (radius - distance + 0.5).clamp(0.0, 1.0);
        pixel[3] = (pixel[3] as f32 * coverage).round() as u8;
    }
}
