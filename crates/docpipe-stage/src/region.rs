use docpipe_core::{
    DetectionResult, RawImage, RecognitionModel, RecognitionResult, RegionResult, Result,
};

use crate::imageio;

/// Composes detection output with per-region recognition.
///
/// When detection supplied structured boxes, recognition runs once per box in
/// detection order and the results aggregate in that same order. Zero boxes
/// is a real answer — the page has no text regions — and deliberately does
/// NOT fall back to whole-image recognition. Only a missing detection result
/// (stage skipped, or a clean-only model) sends the full image through the
/// recognizer once.
pub struct RegionPipeline<'a> {
    recognizer: &'a dyn RecognitionModel,
}

impl<'a> RegionPipeline<'a> {
    pub fn new(recognizer: &'a dyn RecognitionModel) -> Self {
        Self { recognizer }
    }

    pub fn recognize(
        &self,
        image: &RawImage,
        detection: Option<&DetectionResult>,
    ) -> Result<RecognitionResult> {
        let Some(detection) = detection else {
            let reading = self.recognizer.recognize(image)?;
            return Ok(RecognitionResult::whole_image(reading));
        };

        if detection.regions.is_empty() {
            tracing::debug!("detection produced zero regions, returning empty result");
            return Ok(RecognitionResult::from_regions(Vec::new()));
        }

        let mut results = Vec::with_capacity(detection.regions.len());
        for (index, region) in detection.regions.iter().enumerate() {
            let crop = imageio::crop(image, &region.bbox);
            let reading = self.recognizer.recognize(&crop)?;
            results.push(RegionResult {
                index,
                bbox: region.bbox,
                detection_confidence: region.confidence,
                text: reading.text,
                sub_regions: reading.regions,
            });
        }

        tracing::debug!(regions = results.len(), "per-region recognition complete");
        Ok(RecognitionResult::from_regions(results))
    }
}
