//! Deterministic compositing of a generated flat design over a template base
//!
//! Resize both images to a shared working size (minimum 2400px wide,
//! preserving the base's aspect ratio), alpha-blend the design over the base,
//! apply the fixed color and sharpness pass, and emit a lossless PNG.

use async_trait::async_trait;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, RgbaImage};
use reqwest::Client;
use std::io::Cursor;
use std::time::Duration;

use crate::pipeline::{Compositor, RenderError};

/// Minimum working width of the composited output
const MIN_TARGET_WIDTH: u32 = 2400;

const BRIGHTNESS_FACTOR: f32 = 0.98;
const SATURATION_FACTOR: f32 = 1.05;

/// Classic 3x3 sharpen kernel
const SHARPEN_KERNEL: [f32; 9] = [0.0, -1.0, 0.0, -1.0, 5.0, -1.0, 0.0, -1.0, 0.0];

/// Fetch-and-composite engine for the mockup flow
pub struct CompositingEngine {
    client: Client,
}

impl CompositingEngine {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .expect("Failed to create HTTP client");
        Self { client }
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, RenderError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RenderError::Compositing(format!("failed to fetch {url}: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(RenderError::Compositing(format!(
                "HTTP {status} fetching {url}"
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| RenderError::Compositing(format!("failed to read {url}: {e}")))?;
        Ok(bytes.to_vec())
    }
}

impl Default for CompositingEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Compositor for CompositingEngine {
    async fn composite(&self, base_url: &str, design_url: &str) -> Result<Vec<u8>, RenderError> {
        let (base, design) =
            tokio::try_join!(self.fetch(base_url), self.fetch(design_url))?;
        composite_images(&base, &design)
    }
}

/// Working dimensions: upscale to the minimum width when the base is
/// narrower, preserving its aspect ratio; never downscale
pub fn target_dimensions(base_width: u32, base_height: u32) -> (u32, u32) {
    let target_width = base_width.max(MIN_TARGET_WIDTH);
    let target_height =
        (base_height as f64 * target_width as f64 / base_width as f64).round() as u32;
    (target_width, target_height)
}

/// Pure compositing step over raw encoded bytes
pub fn composite_images(base_bytes: &[u8], design_bytes: &[u8]) -> Result<Vec<u8>, RenderError> {
    let base = image::load_from_memory(base_bytes)
        .map_err(|e| RenderError::Compositing(format!("failed to decode base image: {e}")))?;
    let design = image::load_from_memory(design_bytes)
        .map_err(|e| RenderError::Compositing(format!("failed to decode flat design: {e}")))?;

    let (target_width, target_height) = target_dimensions(base.width(), base.height());

    let mut canvas: RgbaImage = base
        .resize_exact(target_width, target_height, FilterType::Lanczos3)
        .to_rgba8();
    // to_rgba8 guarantees the design carries an alpha channel
    let overlay: RgbaImage = design
        .resize_exact(target_width, target_height, FilterType::Lanczos3)
        .to_rgba8();

    // Full, non-attenuated "over" blend (see DESIGN.md on the opacity note)
    image::imageops::overlay(&mut canvas, &overlay, 0, 0);

    adjust_colors(&mut canvas);
    let sharpened = DynamicImage::ImageRgba8(canvas).filter3x3(&SHARPEN_KERNEL);

    let mut encoded = Cursor::new(Vec::new());
    sharpened
        .write_to(&mut encoded, ImageFormat::Png)
        .map_err(|e| RenderError::Compositing(format!("failed to encode output: {e}")))?;
    Ok(encoded.into_inner())
}

/// Fixed post-process: brightness x0.98, saturation x1.05, in place
fn adjust_colors(img: &mut RgbaImage) {
    for pixel in img.pixels_mut() {
        let [r, g, b, a] = pixel.0;
        let (r, g, b) = (r as f32, g as f32, b as f32);
        let gray = 0.2126 * r + 0.7152 * g + 0.0722 * b;
        let saturate = |c: f32| gray + (c - gray) * SATURATION_FACTOR;
        let adjust = |c: f32| (saturate(c) * BRIGHTNESS_FACTOR).clamp(0.0, 255.0) as u8;
        pixel.0 = [adjust(r), adjust(g), adjust(b), a];
    }
}
