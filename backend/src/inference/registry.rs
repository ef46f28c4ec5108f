use std::collections::BTreeMap;
use std::sync::Arc;

use super::model::{InferenceError, Predictor};
use super::pipeline::{DirectClassifier, GatedClassifier, PredictionPipeline};
use super::remote::RemoteModel;
use crate::config::{ModelSource, ModelsConfig};

pub type PipelineVersion = u32;

/// Prediction pipelines keyed by the `version` a caller asks for.
#[derive(Clone, Default)]
pub struct PipelineRegistry {
    pipelines: BTreeMap<PipelineVersion, Arc<dyn PredictionPipeline>>,
}

impl PipelineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(models: &ModelsConfig) -> Result<Self, InferenceError> {
        let classifier_v1 = load_predictor(&models.classifier_v1)?;
        let detector_v2 = load_predictor(&models.detector_v2)?;
        let classifier_v2 = load_predictor(&models.classifier_v2)?;

        Ok(Self::new()
            .register(1, Arc::new(DirectClassifier::new(classifier_v1)))
            .register(
                2,
                Arc::new(GatedClassifier::new(
                    detector_v2,
                    classifier_v2,
                    models.bird_label.clone(),
                )),
            ))
    }

    pub fn register(
        mut self,
        version: PipelineVersion,
        pipeline: Arc<dyn PredictionPipeline>,
    ) -> Self {
        self.pipelines.insert(version, pipeline);
        self
    }

    pub fn resolve(&self, version: PipelineVersion) -> Option<&Arc<dyn PredictionPipeline>> {
        self.pipelines.get(&version)
    }

    pub fn versions(&self) -> Vec<PipelineVersion> {
        self.pipelines.keys().copied().collect()
    }
}

pub fn load_predictor(source: &ModelSource) -> Result<Arc<dyn Predictor>, InferenceError> {
    match source {
        ModelSource::Remote {
            endpoint,
            timeout_secs,
        } => {
            log::info!("Using remote model at {}", endpoint);
            Ok(Arc::new(RemoteModel::new(endpoint.clone(), *timeout_secs)?))
        }
        #[cfg(feature = "torch")]
        ModelSource::Torchscript {
            path,
            labels,
            input_size,
        } => Ok(Arc::new(super::torch::TorchScriptModel::load(
            path,
            labels,
            *input_size,
        )?)),
        #[cfg(not(feature = "torch"))]
        ModelSource::Torchscript { path, .. } => Err(InferenceError::Unavailable(format!(
            "{} needs the `torch` feature",
            path.display()
        ))),
    }
}
