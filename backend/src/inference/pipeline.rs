use std::path::Path;
use std::sync::Arc;

use super::model::{InferenceError, ModelInput, Predictor, RawModelOutput};

/// A stored upload as the pipelines see it: both the on-disk copy and the
/// bytes that were uploaded.
#[derive(Debug, Clone, Copy)]
pub struct ImageRef<'a> {
    pub path: &'a Path,
    pub bytes: &'a [u8],
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    /// A species prediction.
    Identified(RawModelOutput),
    /// The gating stage decided the subject is not a bird.
    Rejected(RawModelOutput),
}

impl PipelineOutcome {
    pub fn output(&self) -> &RawModelOutput {
        match self {
            PipelineOutcome::Identified(output) | PipelineOutcome::Rejected(output) => output,
        }
    }

    pub fn is_rejection(&self) -> bool {
        matches!(self, PipelineOutcome::Rejected(_))
    }
}

pub trait PredictionPipeline: Send + Sync {
    fn run(&self, image: ImageRef<'_>) -> Result<PipelineOutcome, InferenceError>;
}

/// Version 1: one classifier fed the stored file path. There is no bird
/// check, so every image gets a species name.
pub struct DirectClassifier {
    classifier: Arc<dyn Predictor>,
}

impl DirectClassifier {
    pub fn new(classifier: Arc<dyn Predictor>) -> Self {
        Self { classifier }
    }
}

impl PredictionPipeline for DirectClassifier {
    fn run(&self, image: ImageRef<'_>) -> Result<PipelineOutcome, InferenceError> {
        let output = self.classifier.predict(ModelInput::Path(image.path))?;
        Ok(PipelineOutcome::Identified(output))
    }
}

/// Version 2: a bird detector gates a species classifier. Both stages are
/// fed the raw bytes. The classifier only runs when the detector label is
/// exactly `bird_label`.
pub struct GatedClassifier {
    detector: Arc<dyn Predictor>,
    classifier: Arc<dyn Predictor>,
    bird_label: String,
}

impl GatedClassifier {
    pub fn new(
        detector: Arc<dyn Predictor>,
        classifier: Arc<dyn Predictor>,
        bird_label: impl Into<String>,
    ) -> Self {
        Self {
            detector,
            classifier,
            bird_label: bird_label.into(),
        }
    }
}

impl PredictionPipeline for GatedClassifier {
    fn run(&self, image: ImageRef<'_>) -> Result<PipelineOutcome, InferenceError> {
        let detection = self.detector.predict(ModelInput::Bytes(image.bytes))?;
        if detection.label != self.bird_label {
            log::info!("Detector rejected image as '{}'", detection.label);
            return Ok(PipelineOutcome::Rejected(detection));
        }

        let output = self.classifier.predict(ModelInput::Bytes(image.bytes))?;
        Ok(PipelineOutcome::Identified(output))
    }
}
