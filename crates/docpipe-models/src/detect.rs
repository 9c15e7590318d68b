use docpipe_core::{BBox, DetectedRegion, DetectionModel, DetectionResult, ModelConfig, RawImage, Result};

use crate::preprocess::to_grayscale;

/// CPU text block detector.
///
/// 1. grayscale + fixed threshold (dark ink becomes foreground)
/// 2. connected component labeling over foreground pixels
/// 3. merge components whose rows overlap and whose horizontal gap is small
///    (connects characters into line blocks)
/// 4. drop boxes below the minimum size
/// 5. sort top-to-bottom, left-to-right
pub struct BlockDetector {
    /// Pixels with luma below this are foreground.
    pub ink_threshold: u8,
    /// Maximum horizontal gap (px) between components merged into one block.
    pub merge_gap: u32,
    pub min_width: u32,
    pub min_height: u32,
    /// Regions scoring below this are dropped. Built-in scoring is ink
    /// density, so this doubles as a noise filter.
    pub confidence_threshold: f32,
}

impl Default for BlockDetector {
    fn default() -> Self {
        Self {
            ink_threshold: 128,
            merge_gap: 12,
            min_width: 8,
            min_height: 6,
            confidence_threshold: 0.05,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Component {
    x1: u32,
    y1: u32,
    x2: u32,
    y2: u32,
    ink: u64,
}

impl Component {
    fn rows_overlap(&self, other: &Component) -> bool {
        self.y1 <= other.y2 && other.y1 <= self.y2
    }

    fn absorb(&mut self, other: &Component) {
        self.x1 = self.x1.min(other.x1);
        self.y1 = self.y1.min(other.y1);
        self.x2 = self.x2.max(other.x2);
        self.y2 = self.y2.max(other.y2);
        self.ink += other.ink;
    }
}

impl BlockDetector {
    pub fn from_config(config: &ModelConfig) -> Self {
        let mut detector = Self::default();
        if let Some(t) = config.confidence_threshold {
            detector.confidence_threshold = t;
        }
        detector
    }

    fn components(&self, gray: &[u8], width: usize, height: usize) -> Vec<Component> {
        let foreground: Vec<bool> = gray.iter().map(|&g| g < self.ink_threshold).collect();
        let mut labels = vec![0u32; width * height];
        let mut components: Vec<Component> = Vec::new();
        let mut stack: Vec<usize> = Vec::new();

        for start in 0..width * height {
            if !foreground[start] || labels[start] != 0 {
                continue;
            }
            let label = components.len() as u32 + 1;
            let mut comp = Component {
                x1: u32::MAX,
                y1: u32::MAX,
                x2: 0,
                y2: 0,
                ink: 0,
            };

            stack.push(start);
            labels[start] = label;
            while let Some(idx) = stack.pop() {
                let x = (idx % width) as u32;
                let y = (idx / width) as u32;
                comp.x1 = comp.x1.min(x);
                comp.y1 = comp.y1.min(y);
                comp.x2 = comp.x2.max(x);
                comp.y2 = comp.y2.max(y);
                comp.ink += 1;

                // 4-connectivity.
                if x > 0 {
                    visit(idx - 1, &foreground, &mut labels, label, &mut stack);
                }
                if (x as usize) < width - 1 {
                    visit(idx + 1, &foreground, &mut labels, label, &mut stack);
                }
                if y > 0 {
                    visit(idx - width, &foreground, &mut labels, label, &mut stack);
                }
                if (y as usize) < height - 1 {
                    visit(idx + width, &foreground, &mut labels, label, &mut stack);
                }
            }
            components.push(comp);
        }
        components
    }

    /// Merge row-aligned components separated by at most `merge_gap` pixels.
    fn merge_lines(&self, mut components: Vec<Component>) -> Vec<Component> {
        components.sort_by_key(|c| (c.y1, c.x1));
        let mut merged: Vec<Component> = Vec::with_capacity(components.len());

        'outer: for comp in components {
            for existing in merged.iter_mut() {
                let gap_left = comp.x1.saturating_sub(existing.x2);
                let gap_right = existing.x1.saturating_sub(comp.x2);
                if existing.rows_overlap(&comp) && gap_left.min(gap_right) <= self.merge_gap {
                    existing.absorb(&comp);
                    continue 'outer;
                }
            }
            merged.push(comp);
        }
        merged
    }
}

fn visit(idx: usize, foreground: &[bool], labels: &mut [u32], label: u32, stack: &mut Vec<usize>) {
    if foreground[idx] && labels[idx] == 0 {
        labels[idx] = label;
        stack.push(idx);
    }
}

impl DetectionModel for BlockDetector {
    fn detect(&self, image: &RawImage) -> Result<Option<DetectionResult>> {
        let width = image.width as usize;
        let height = image.height as usize;
        let gray = to_grayscale(image);

        let components = self.components(&gray, width, height);
        let raw_count = components.len();
        let merged = self.merge_lines(components);

        let mut regions: Vec<DetectedRegion> = merged
            .into_iter()
            .filter(|c| c.x2 - c.x1 + 1 >= self.min_width && c.y2 - c.y1 + 1 >= self.min_height)
            .filter_map(|c| {
                let bbox = BBox::new(c.x1 as f32, c.y1 as f32, (c.x2 + 1) as f32, (c.y2 + 1) as f32);
                let density = (c.ink as f32 / bbox.area().max(1.0)).clamp(0.0, 1.0);
                (density >= self.confidence_threshold).then(|| DetectedRegion {
                    bbox,
                    confidence: density,
                    label: "text".to_string(),
                })
            })
            .collect();

        regions.sort_by(|a, b| {
            (a.bbox.y1, a.bbox.x1)
                .partial_cmp(&(b.bbox.y1, b.bbox.x1))
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        tracing::debug!(
            raw_components = raw_count,
            regions = regions.len(),
            "block detection"
        );

        Ok(Some(DetectionResult {
            height: image.height,
            width: image.width,
            regions,
        }))
    }
}
