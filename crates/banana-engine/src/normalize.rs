use std::io::Cursor;

use banana_contracts::{AspectRatio, ImagePayload, MimeType};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use thiserror::Error;
use tracing::debug;

/// Longest edge of every normalized canvas.
pub const MAX_DIM: u32 = 1024;
/// Quality factor applied to lossy output, in `0.0..=1.0`.
pub const JPEG_QUALITY: f32 = 0.95;
/// Canvas pixels outside the drawn source. JPEG output flattens this to black.
pub const CANVAS_FILL: [u8; 4] = [0, 0, 0, 0];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("could not decode source image: {0}")]
    Decode(String),
    #[error("could not encode normalized image: {0}")]
    Encode(String),
}

/// Integer placement of the drawn source inside the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Letterbox geometry for fitting a source into a fixed-ratio canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanvasLayout {
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub scale: f64,
    pub draw_width: f64,
    pub draw_height: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

impl CanvasLayout {
    /// `src_width` and `src_height` must be non-zero.
    pub fn compute(src_width: u32, src_height: u32, ratio: AspectRatio, max_dim: u32) -> Self {
        let numeric = ratio.as_f64();
        let max = f64::from(max_dim);
        let (canvas_width, canvas_height) = if numeric >= 1.0 {
            (max_dim, ((max / numeric).round() as u32).max(1))
        } else {
            (((max * numeric).round() as u32).max(1), max_dim)
        };

        let src_w = f64::from(src_width);
        let src_h = f64::from(src_height);
        let scale = (f64::from(canvas_width) / src_w).min(f64::from(canvas_height) / src_h);
        let draw_width = src_w * scale;
        let draw_height = src_h * scale;

        Self {
            canvas_width,
            canvas_height,
            scale,
            draw_width,
            draw_height,
            offset_x: (f64::from(canvas_width) - draw_width) / 2.0,
            offset_y: (f64::from(canvas_height) - draw_height) / 2.0,
        }
    }

    /// Rounds the draw box to whole pixels, keeping it inside the canvas and
    /// splitting any odd padding pixel toward the right/bottom edge.
    pub fn pixel_rect(&self) -> PixelRect {
        let width = (self.draw_width.round() as u32).clamp(1, self.canvas_width);
        let height = (self.draw_height.round() as u32).clamp(1, self.canvas_height);
        PixelRect {
            x: (self.canvas_width - width) / 2,
            y: (self.canvas_height - height) / 2,
            width,
            height,
        }
    }
}

/// Encodings the normalizer produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Png,
    Jpeg,
}

impl OutputFormat {
    /// PNG sources stay PNG; everything else is re-encoded as JPEG.
    pub fn for_source(source: MimeType) -> Self {
        match source {
            MimeType::Png => OutputFormat::Png,
            MimeType::Jpeg | MimeType::Webp => OutputFormat::Jpeg,
        }
    }

    pub fn mime_type(self) -> MimeType {
        match self {
            OutputFormat::Png => MimeType::Png,
            OutputFormat::Jpeg => MimeType::Jpeg,
        }
    }
}

/// Drawing-surface capability the normalizer runs on.
///
/// Every surface is created per call and consumed by `encode`.
pub trait ImageCanvasOps {
    type Bitmap;
    type Surface;

    fn decode(&self, source: &ImagePayload) -> Result<Self::Bitmap, NormalizeError>;
    fn dimensions(&self, bitmap: &Self::Bitmap) -> (u32, u32);
    fn draw_scaled_centered(
        &self,
        bitmap: &Self::Bitmap,
        layout: &CanvasLayout,
    ) -> Result<Self::Surface, NormalizeError>;
    fn encode(
        &self,
        surface: Self::Surface,
        format: OutputFormat,
        quality: f32,
    ) -> Result<Vec<u8>, NormalizeError>;
}

/// `ImageCanvasOps` backed by the `image` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct RasterCanvas;

impl ImageCanvasOps for RasterCanvas {
    type Bitmap = DynamicImage;
    type Surface = RgbaImage;

    fn decode(&self, source: &ImagePayload) -> Result<DynamicImage, NormalizeError> {
        let bytes = source
            .to_bytes()
            .map_err(|err| NormalizeError::Decode(format!("invalid base64 payload: {err}")))?;
        image::load_from_memory(&bytes).map_err(|err| NormalizeError::Decode(err.to_string()))
    }

    fn dimensions(&self, bitmap: &DynamicImage) -> (u32, u32) {
        (bitmap.width(), bitmap.height())
    }

    fn draw_scaled_centered(
        &self,
        bitmap: &DynamicImage,
        layout: &CanvasLayout,
    ) -> Result<RgbaImage, NormalizeError> {
        let rect = layout.pixel_rect();
        let drawn = bitmap
            .resize_exact(rect.width, rect.height, FilterType::Triangle)
            .to_rgba8();
        let mut canvas =
            RgbaImage::from_pixel(layout.canvas_width, layout.canvas_height, Rgba(CANVAS_FILL));
        imageops::replace(&mut canvas, &drawn, i64::from(rect.x), i64::from(rect.y));
        Ok(canvas)
    }

    fn encode(
        &self,
        surface: RgbaImage,
        format: OutputFormat,
        quality: f32,
    ) -> Result<Vec<u8>, NormalizeError> {
        let mut bytes = Vec::new();
        match format {
            OutputFormat::Jpeg => {
                let flattened = flatten_onto_fill(&surface);
                let mut encoder =
                    JpegEncoder::new_with_quality(&mut bytes, quality_percent(quality));
                encoder
                    .encode_image(&flattened)
                    .map_err(|err| NormalizeError::Encode(err.to_string()))?;
            }
            OutputFormat::Png => {
                DynamicImage::ImageRgba8(surface)
                    .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
                    .map_err(|err| NormalizeError::Encode(err.to_string()))?;
            }
        }
        Ok(bytes)
    }
}

/// Fits source images into fixed-aspect canvases without cropping or distortion.
#[derive(Debug, Clone)]
pub struct Normalizer<O: ImageCanvasOps = RasterCanvas> {
    ops: O,
    max_dim: u32,
    quality: f32,
}

impl Default for Normalizer<RasterCanvas> {
    fn default() -> Self {
        Self::with_ops(RasterCanvas, MAX_DIM, JPEG_QUALITY)
    }
}

impl Normalizer<RasterCanvas> {
    pub fn new(max_dim: u32, quality: f32) -> Self {
        Self::with_ops(RasterCanvas, max_dim, quality)
    }
}

impl<O: ImageCanvasOps> Normalizer<O> {
    pub fn with_ops(ops: O, max_dim: u32, quality: f32) -> Self {
        Self {
            ops,
            max_dim: max_dim.max(1),
            quality: quality.clamp(0.01, 1.0),
        }
    }

    pub fn max_dim(&self) -> u32 {
        self.max_dim
    }

    pub fn normalize(
        &self,
        source: &ImagePayload,
        ratio: AspectRatio,
    ) -> Result<ImagePayload, NormalizeError> {
        let bitmap = self.ops.decode(source)?;
        let (src_width, src_height) = self.ops.dimensions(&bitmap);
        if src_width == 0 || src_height == 0 {
            return Err(NormalizeError::Decode(format!(
                "source has empty dimensions {src_width}x{src_height}"
            )));
        }

        let layout = CanvasLayout::compute(src_width, src_height, ratio, self.max_dim);
        debug!(
            src_width,
            src_height,
            ratio = ratio.tag(),
            canvas_width = layout.canvas_width,
            canvas_height = layout.canvas_height,
            scale = layout.scale,
            "normalizing image"
        );
        let surface = self.ops.draw_scaled_centered(&bitmap, &layout)?;
        let format = OutputFormat::for_source(source.mime_type());
        let bytes = self.ops.encode(surface, format, self.quality)?;
        Ok(ImagePayload::from_bytes(&bytes, format.mime_type()))
    }
}

fn quality_percent(quality: f32) -> u8 {
    (quality * 100.0).round().clamp(1.0, 100.0) as u8
}

fn flatten_onto_fill(surface: &RgbaImage) -> RgbImage {
    let [fill_r, fill_g, fill_b, _] = CANVAS_FILL;
    let mut flattened = RgbImage::new(surface.width(), surface.height());
    for (x, y, pixel) in surface.enumerate_pixels() {
        let alpha = u16::from(pixel[3]);
        let blend = |channel: u8, fill: u8| -> u8 {
            (((u16::from(channel) * alpha) + (u16::from(fill) * (255 - alpha))) / 255) as u8
        };
        flattened.put_pixel(
            x,
            y,
            Rgb([
                blend(pixel[0], fill_r),
                blend(pixel[1], fill_g),
                blend(pixel[2], fill_b),
            ]),
        );
    }
    flattened
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    fn png_payload(width: u32, height: u32, color: [u8; 4]) -> anyhow::Result<ImagePayload> {
        let image = RgbaImage::from_pixel(width, height, Rgba(color));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(image).write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
        Ok(ImagePayload::from_bytes(&bytes, MimeType::Png))
    }

    fn jpeg_payload(width: u32, height: u32, color: [u8; 3]) -> anyhow::Result<ImagePayload> {
        let image = RgbImage::from_pixel(width, height, Rgb(color));
        let mut bytes = Vec::new();
        JpegEncoder::new_with_quality(&mut bytes, 95)
            .encode_image(&image)?;
        Ok(ImagePayload::from_bytes(&bytes, MimeType::Jpeg))
    }

    /// Canvas double over synthetic `(width, height)` bitmaps that records
    /// the layout it was asked to draw.
    #[derive(Default)]
    struct RecordingCanvas {
        drawn: RefCell<Vec<CanvasLayout>>,
        encoded: RefCell<Vec<OutputFormat>>,
    }

    impl ImageCanvasOps for RecordingCanvas {
        type Bitmap = (u32, u32);
        type Surface = PixelRect;

        fn decode(&self, source: &ImagePayload) -> Result<(u32, u32), NormalizeError> {
            let bytes = source
                .to_bytes()
                .map_err(|err| NormalizeError::Decode(err.to_string()))?;
            if bytes.len() != 8 {
                return Err(NormalizeError::Decode("not a synthetic bitmap".to_string()));
            }
            let width = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            let height = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
            Ok((width, height))
        }

        fn dimensions(&self, bitmap: &(u32, u32)) -> (u32, u32) {
            *bitmap
        }

        fn draw_scaled_centered(
            &self,
            _bitmap: &(u32, u32),
            layout: &CanvasLayout,
        ) -> Result<PixelRect, NormalizeError> {
            self.drawn.borrow_mut().push(*layout);
            Ok(layout.pixel_rect())
        }

        fn encode(
            &self,
            surface: PixelRect,
            format: OutputFormat,
            _quality: f32,
        ) -> Result<Vec<u8>, NormalizeError> {
            self.encoded.borrow_mut().push(format);
            Ok(vec![surface.width as u8, surface.height as u8])
        }
    }

    fn synthetic(width: u32, height: u32, mime_type: MimeType) -> ImagePayload {
        let mut bytes = width.to_be_bytes().to_vec();
        bytes.extend_from_slice(&height.to_be_bytes());
        ImagePayload::from_bytes(&bytes, mime_type)
    }

    const SOURCE_SIZES: &[(u32, u32)] = &[
        (2000, 1000),
        (1000, 2000),
        (1, 1),
        (1, 4000),
        (4000, 1),
        (333, 777),
        (1920, 1080),
        (1080, 1920),
        (640, 480),
        (1024, 1024),
        (17, 5),
    ];

    #[test]
    fn scenario_wide_source_into_square_canvas() {
        let layout = CanvasLayout::compute(2000, 1000, AspectRatio::Square, MAX_DIM);
        assert_eq!((layout.canvas_width, layout.canvas_height), (1024, 1024));
        assert!((layout.scale - 0.512).abs() < 1e-12);
        assert!((layout.draw_width - 1024.0).abs() < 1e-9);
        assert!((layout.draw_height - 512.0).abs() < 1e-9);
        assert!((layout.offset_x - 0.0).abs() < 1e-9);
        assert!((layout.offset_y - 256.0).abs() < 1e-9);
        assert_eq!(
            layout.pixel_rect(),
            PixelRect {
                x: 0,
                y: 256,
                width: 1024,
                height: 512,
            }
        );
    }

    #[test]
    fn canvas_matches_target_ratio_with_longer_edge_at_max_dim() {
        for ratio in AspectRatio::ALL {
            let layout = CanvasLayout::compute(800, 600, ratio, MAX_DIM);
            let (rw, rh) = ratio.components();
            assert_eq!(
                layout.canvas_width.max(layout.canvas_height),
                MAX_DIM,
                "{ratio}"
            );
            let expected_w = f64::from(layout.canvas_height) * f64::from(rw) / f64::from(rh);
            assert!(
                (f64::from(layout.canvas_width) - expected_w).abs() <= 1.0,
                "{ratio}: {}x{}",
                layout.canvas_width,
                layout.canvas_height
            );
        }
        let wide = CanvasLayout::compute(10, 10, AspectRatio::Landscape, MAX_DIM);
        assert_eq!((wide.canvas_width, wide.canvas_height), (1024, 576));
        let tall = CanvasLayout::compute(10, 10, AspectRatio::Tall, MAX_DIM);
        assert_eq!((tall.canvas_width, tall.canvas_height), (768, 1024));
    }

    #[test]
    fn draw_region_is_contained_undistorted_and_touches_an_edge() {
        for ratio in AspectRatio::ALL {
            for &(src_w, src_h) in SOURCE_SIZES {
                let layout = CanvasLayout::compute(src_w, src_h, ratio, MAX_DIM);
                let canvas_w = f64::from(layout.canvas_width);
                let canvas_h = f64::from(layout.canvas_height);
                assert!(layout.draw_width <= canvas_w + 1e-9);
                assert!(layout.draw_height <= canvas_h + 1e-9);
                let touches = (layout.draw_width - canvas_w).abs() < 1e-9
                    || (layout.draw_height - canvas_h).abs() < 1e-9;
                assert!(touches, "{src_w}x{src_h} into {ratio}");

                let src_ratio = f64::from(src_w) / f64::from(src_h);
                let draw_ratio = layout.draw_width / layout.draw_height;
                assert!((src_ratio - draw_ratio).abs() / src_ratio < 1e-9);
            }
        }
    }

    #[test]
    fn pixel_rect_padding_is_balanced() {
        for ratio in AspectRatio::ALL {
            for &(src_w, src_h) in SOURCE_SIZES {
                let layout = CanvasLayout::compute(src_w, src_h, ratio, MAX_DIM);
                let rect = layout.pixel_rect();
                assert!(rect.x + rect.width <= layout.canvas_width);
                assert!(rect.y + rect.height <= layout.canvas_height);
                let right = layout.canvas_width - rect.x - rect.width;
                let bottom = layout.canvas_height - rect.y - rect.height;
                assert!(rect.x.abs_diff(right) <= 1, "{src_w}x{src_h} into {ratio}");
                assert!(rect.y.abs_diff(bottom) <= 1, "{src_w}x{src_h} into {ratio}");
            }
        }
    }

    #[test]
    fn normalizer_drives_canvas_ops_with_synthetic_bitmaps() -> anyhow::Result<()> {
        let normalizer = Normalizer::with_ops(RecordingCanvas::default(), 100, JPEG_QUALITY);
        let output = normalizer.normalize(&synthetic(300, 100, MimeType::Webp), AspectRatio::Square)?;
        assert_eq!(output.mime_type(), MimeType::Jpeg);
        assert_eq!(output.to_bytes()?, vec![100, 33]);

        let png = normalizer.normalize(&synthetic(50, 100, MimeType::Png), AspectRatio::Tall)?;
        assert_eq!(png.mime_type(), MimeType::Png);

        let drawn = normalizer.ops.drawn.borrow();
        assert_eq!(drawn.len(), 2);
        assert_eq!((drawn[1].canvas_width, drawn[1].canvas_height), (75, 100));
        assert_eq!(
            *normalizer.ops.encoded.borrow(),
            vec![OutputFormat::Jpeg, OutputFormat::Png]
        );
        Ok(())
    }

    #[test]
    fn zero_sized_bitmap_is_a_decode_error() {
        let normalizer = Normalizer::with_ops(RecordingCanvas::default(), 100, JPEG_QUALITY);
        let err = normalizer
            .normalize(&synthetic(0, 10, MimeType::Png), AspectRatio::Square)
            .unwrap_err();
        assert!(matches!(err, NormalizeError::Decode(_)));
        assert!(normalizer.ops.drawn.borrow().is_empty());
    }

    #[test]
    fn raster_png_output_letterboxes_with_transparent_fill() -> anyhow::Result<()> {
        let source = png_payload(200, 100, [255, 0, 0, 255])?;
        let output = Normalizer::new(64, JPEG_QUALITY).normalize(&source, AspectRatio::Square)?;
        assert_eq!(output.mime_type(), MimeType::Png);

        let decoded = image::load_from_memory(&output.to_bytes()?)?.to_rgba8();
        assert_eq!(decoded.dimensions(), (64, 64));
        assert_eq!(decoded.get_pixel(32, 2).0, CANVAS_FILL);
        assert_eq!(decoded.get_pixel(32, 61).0, CANVAS_FILL);
        let center = decoded.get_pixel(32, 32).0;
        assert!(center[0] > 250 && center[1] < 5 && center[3] == 255, "{center:?}");
        Ok(())
    }

    #[test]
    fn raster_jpeg_output_uses_black_padding() -> anyhow::Result<()> {
        let source = jpeg_payload(100, 200, [250, 250, 250])?;
        let output = Normalizer::new(64, JPEG_QUALITY).normalize(&source, AspectRatio::Landscape)?;
        assert_eq!(output.mime_type(), MimeType::Jpeg);

        let decoded = image::load_from_memory(&output.to_bytes()?)?.to_rgb8();
        assert_eq!(decoded.dimensions(), (64, 36));
        let pad = decoded.get_pixel(2, 18).0;
        assert!(pad.iter().all(|channel| *channel < 30), "{pad:?}");
        let center = decoded.get_pixel(32, 18).0;
        assert!(center.iter().all(|channel| *channel > 220), "{center:?}");
        Ok(())
    }

    #[test]
    fn raster_decode_rejects_garbage() {
        let payload = ImagePayload::from_bytes(b"definitely not an image", MimeType::Png);
        let err = Normalizer::default()
            .normalize(&payload, AspectRatio::Square)
            .unwrap_err();
        assert!(matches!(err, NormalizeError::Decode(_)));
    }

    #[test]
    fn normalize_is_deterministic() -> anyhow::Result<()> {
        let source = png_payload(37, 91, [10, 200, 30, 255])?;
        let normalizer = Normalizer::new(48, JPEG_QUALITY);
        let first = normalizer.normalize(&source, AspectRatio::Standard)?;
        let second = normalizer.normalize(&source, AspectRatio::Standard)?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn quality_maps_to_percent() {
        assert_eq!(quality_percent(0.95), 95);
        assert_eq!(quality_percent(0.0), 1);
        assert_eq!(quality_percent(2.0), 100);
    }
}
