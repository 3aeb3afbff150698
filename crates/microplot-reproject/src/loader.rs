use std::collections::BTreeMap;

use microplot_core::CameraCalibration;

/// Source of raw images and their calibrations.
///
/// Implementations are queried from worker threads and must be read-only
/// after construction.
pub trait CameraModelLoader: Sync {
    /// Raw image identifiers, in the order results should be reported.
    fn list_candidate_images(&self) -> Vec<String>;

    /// Calibration of one raw image, `None` when it was not calibrated.
    fn calibration(&self, image_id: &str) -> Option<CameraCalibration>;
}

/// Calibrations held in memory, keyed by image identifier.
///
/// Candidates can be listed explicitly to model images that exist on disk
/// but have no calibration.
#[derive(Clone, Debug, Default)]
pub struct InMemoryCameraModels {
    models: BTreeMap<String, CameraCalibration>,
    candidates: Option<Vec<String>>,
}

impl InMemoryCameraModels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, image_id: impl Into<String>, calibration: CameraCalibration) {
        self.models.insert(image_id.into(), calibration);
    }

    pub fn with(mut self, image_id: impl Into<String>, calibration: CameraCalibration) -> Self {
        self.insert(image_id, calibration);
        self
    }

    /// Override the candidate list; by default every calibrated image is a
    /// candidate, in name order.
    pub fn with_candidates<I, S>(mut self, candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.candidates = Some(candidates.into_iter().map(Into::into).collect());
        self
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

impl CameraModelLoader for InMemoryCameraModels {
    fn list_candidate_images(&self) -> Vec<String> {
        match &self.candidates {
            Some(list) => list.clone(),
            None => self.models.keys().cloned().collect(),
        }
    }

    fn calibration(&self, image_id: &str) -> Option<CameraCalibration> {
        self.models.get(image_id).copied()
    }
}
