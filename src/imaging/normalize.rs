use crate::config::JPEG_QUALITY;
use crate::imaging::fetch::FetchedImage;
use image::{
    DynamicImage, GenericImageView, ImageBuffer, Rgb, RgbImage,
    codecs::jpeg::JpegEncoder,
    imageops::{self, FilterType},
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("cannot decode image: {0}")]
    Decode(String),
    #[error("image processing failed: {0}")]
    Processing(String),
}

/// Square region cut out of the source before resizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CropBox {
    pub left: u32,
    pub top: u32,
    pub side: u32,
}

/// A JPEG-encoded square image at the target resolution.
#[derive(Debug)]
pub struct NormalizedImage {
    bytes: Vec<u8>,
    width: u32,
    height: u32,
    source_dimensions: (u32, u32),
    crop: Option<CropBox>,
}

impl NormalizedImage {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn source_dimensions(&self) -> (u32, u32) {
        self.source_dimensions
    }

    /// `None` when the source was already square.
    pub fn crop(&self) -> Option<CropBox> {
        self.crop
    }
}

/// Centered square crop, or `None` for square input. Odd leftovers are
/// floored, so at most one pixel more is lost on one side.
pub fn square_crop(width: u32, height: u32) -> Option<CropBox> {
    if width == height {
        return None;
    }
    let side = width.min(height);
    Some(CropBox {
        left: (width - side) / 2,
        top: (height - side) / 2,
        side,
    })
}

pub fn normalize(
    image: &FetchedImage,
    target: (u32, u32),
) -> Result<NormalizedImage, NormalizeError> {
    let decoded = image::load_from_memory(&image.bytes)
        .map_err(|err| NormalizeError::Decode(err.to_string()))?;
    normalize_decoded(decoded, target)
}

pub fn normalize_decoded(
    decoded: DynamicImage,
    target: (u32, u32),
) -> Result<NormalizedImage, NormalizeError> {
    let (width, height) = decoded.dimensions();
    if width == 0 || height == 0 || target.0 == 0 || target.1 == 0 {
        return Err(NormalizeError::Processing(format!(
            "degenerate dimensions {width}x{height} -> {}x{}",
            target.0, target.1
        )));
    }

    let rgb = to_opaque_rgb(decoded);
    let crop = square_crop(width, height);
    let square = match crop {
        Some(bounds) => {
            imageops::crop_imm(&rgb, bounds.left, bounds.top, bounds.side, bounds.side).to_image()
        }
        None => rgb,
    };
    let resized = imageops::resize(&square, target.0, target.1, FilterType::Lanczos3);

    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY)
        .encode_image(&resized)
        .map_err(|err| NormalizeError::Processing(err.to_string()))?;

    Ok(NormalizedImage {
        bytes,
        width: resized.width(),
        height: resized.height(),
        source_dimensions: (width, height),
        crop,
    })
}

/// Flattens alpha onto white; anything else that is not 8-bit RGB is converted.
/// Palette sources arrive here already expanded to RGB or RGBA by the decoder.
fn to_opaque_rgb(image: DynamicImage) -> RgbImage {
    if image.color().has_alpha() {
        let rgba = image.to_rgba8();
        ImageBuffer::from_fn(rgba.width(), rgba.height(), |x, y| {
            let px = rgba.get_pixel(x, y).0;
            let alpha = u32::from(px[3]);
            let blend = |c: u8| ((u32::from(c) * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
            Rgb([blend(px[0]), blend(px[1]), blend(px[2])])
        })
    } else {
        match image {
            DynamicImage::ImageRgb8(rgb) => rgb,
            other => other.to_rgb8(),
        }
    }
}
