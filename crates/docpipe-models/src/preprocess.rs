use docpipe_core::{DetectionModel, RawImage, Result};

/// Clean-only preprocessing model: grayscale + Otsu global threshold.
///
/// Produces a high-contrast black-on-white page for downstream recognition.
/// Registered in the catalog as `default_binarize`. Produces no structured
/// boxes — `detect` keeps its `None` default.
pub struct DocumentCleaner;

impl DocumentCleaner {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DocumentCleaner {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectionModel for DocumentCleaner {
    fn clean(&self, image: &RawImage) -> Result<Option<RawImage>> {
        let gray = to_grayscale(image);
        let threshold = otsu_threshold(&gray);

        let n = gray.len();
        let mut data = Vec::with_capacity(n * 3);
        for &g in &gray {
            let v = if g < threshold { 0u8 } else { 255u8 };
            data.extend_from_slice(&[v, v, v]);
        }

        tracing::debug!(
            width = image.width,
            height = image.height,
            threshold,
            "binarized page"
        );

        Ok(Some(RawImage {
            data,
            width: image.width,
            height: image.height,
            channels: 3,
        }))
    }
}

/// RGB (or single-channel) HWC u8 to BT.601 luma.
pub(crate) fn to_grayscale(image: &RawImage) -> Vec<u8> {
    let n = (image.width * image.height) as usize;
    let c = image.channels as usize;
    let mut gray = vec![0u8; n];
    if c == 1 {
        gray.copy_from_slice(&image.data[..n]);
        return gray;
    }
    for (i, px) in gray.iter_mut().enumerate() {
        let r = image.data[i * c] as u32;
        let g = image.data[i * c + 1] as u32;
        let b = image.data[i * c + 2] as u32;
        *px = ((r * 77 + g * 150 + b * 29) >> 8) as u8;
    }
    gray
}

/// Otsu's method: pick the threshold maximizing between-class variance.
fn otsu_threshold(gray: &[u8]) -> u8 {
    let mut histogram = [0u64; 256];
    for &g in gray {
        histogram[g as usize] += 1;
    }

    let total = gray.len() as f64;
    let global_sum: f64 = histogram
        .iter()
        .enumerate()
        .map(|(v, &count)| v as f64 * count as f64)
        .sum();

    let mut sum_below = 0.0f64;
    let mut weight_below = 0.0f64;
    let mut best_threshold = 127u8;
    let mut best_variance = 0.0f64;

    for t in 0..256usize {
        weight_below += histogram[t] as f64;
        if weight_below == 0.0 {
            continue;
        }
        let weight_above = total - weight_below;
        if weight_above == 0.0 {
            break;
        }
        sum_below += t as f64 * histogram[t] as f64;

        let mean_below = sum_below / weight_below;
        let mean_above = (global_sum - sum_below) / weight_above;
        let variance = weight_below * weight_above * (mean_below - mean_above).powi(2);
        if variance > best_variance {
            best_variance = variance;
            best_threshold = t as u8;
        }
    }

    best_threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bimodal_image() -> RawImage {
        // Left half dark "ink", right half bright "paper".
        let (w, h) = (8u32, 4u32);
        let mut data = Vec::new();
        for _y in 0..h {
            for x in 0..w {
                let v = if x < 4 { 30u8 } else { 220u8 };
                data.extend_from_slice(&[v, v, v]);
            }
        }
        RawImage {
            data,
            width: w,
            height: h,
            channels: 3,
        }
    }

    #[test]
    fn cleaner_output_is_strictly_binary() {
        let cleaned = DocumentCleaner::new().clean(&bimodal_image()).unwrap().unwrap();
        assert!(cleaned.data.iter().all(|&v| v == 0 || v == 255));
        assert_eq!(cleaned.channels, 3);
    }

    #[test]
    fn cleaner_separates_ink_from_paper() {
        let cleaned = DocumentCleaner::new().clean(&bimodal_image()).unwrap().unwrap();
        // First pixel of a row is ink, last is paper.
        assert_eq!(cleaned.data[0], 0);
        let last = cleaned.data.len() - 1;
        assert_eq!(cleaned.data[last], 255);
    }
}
