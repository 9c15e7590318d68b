//! Image file I/O at the stage boundary.
//!
//! Capabilities work on `RawImage` (RGB u8, HWC); this module handles the
//! path-addressable store side: decode, encode, and bbox cropping.

use std::path::{Path, PathBuf};

use docpipe_core::{BBox, PipelineError, RawImage, Result};

/// Decode an image artifact from the shared store into RGB.
pub fn load_rgb(path: &Path) -> Result<RawImage> {
    let img = image::open(path)
        .map_err(|e| PipelineError::InferenceError(format!("cannot read image {}: {e}", path.display())))?;
    let rgb = img.to_rgb8();
    Ok(RawImage {
        width: rgb.width(),
        height: rgb.height(),
        channels: 3,
        data: rgb.into_raw(),
    })
}

/// Encode an RGB image as PNG next to the rest of the run's artifacts.
pub fn save_png(path: &Path, image: &RawImage) -> Result<()> {
    let buffer = image::RgbImage::from_raw(image.width, image.height, image.data.clone())
        .ok_or_else(|| PipelineError::InferenceError("image buffer size mismatch".to_string()))?;
    buffer
        .save_with_format(path, image::ImageFormat::Png)
        .map_err(|e| PipelineError::InferenceError(format!("cannot write {}: {e}", path.display())))
}

/// Where the cleaned version of an input artifact lives: `<stem>_clean.png`
/// in the same directory.
pub fn cleaned_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "page".to_string());
    input.with_file_name(format!("{stem}_clean.png"))
}

/// Crop a bbox out of an image, clamped to the image bounds. Degenerate
/// boxes produce a 1x1 crop rather than an empty buffer.
pub fn crop(image: &RawImage, bbox: &BBox) -> RawImage {
    let clamped = bbox.clamped(image.width, image.height);
    let x0 = clamped.x1 as u32;
    let y0 = clamped.y1 as u32;
    let x1 = (clamped.x2.ceil() as u32).clamp(x0 + 1, image.width.max(x0 + 1));
    let y1 = (clamped.y2.ceil() as u32).clamp(y0 + 1, image.height.max(y0 + 1));

    let w = x1 - x0;
    let h = y1 - y0;
    let c = image.channels as usize;
    let row_stride = image.width as usize * c;

    let mut data = Vec::with_capacity((w * h) as usize * c);
    for y in y0..y1 {
        let start = y as usize * row_stride + x0 as usize * c;
        let end = start + w as usize * c;
        data.extend_from_slice(&image.data[start.min(image.data.len())..end.min(image.data.len())]);
    }

    RawImage {
        data,
        width: w,
        height: h,
        channels: image.channels,
    }
}
