use shared::{PredictionIntent, PredictionRecord};

use super::normalizer::{NormalizeError, Normalizer};
use crate::config::AppConfig;
use crate::inference::model::InferenceError;
use crate::inference::pipeline::ImageRef;
use crate::inference::registry::{PipelineRegistry, PipelineVersion};
use crate::storage::image_store::{ImageStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum IdentifyError {
    #[error("Incorrect file type.")]
    InvalidFormat,
    #[error("Version number not recognized.")]
    UnrecognizedVersion(PipelineVersion),
    #[error("{0}")]
    Storage(#[from] StoreError),
    #[error("Inference failed: {0}")]
    Inference(#[from] InferenceError),
    #[error("Malformed model output: {0}")]
    MalformedOutput(#[from] NormalizeError),
}

/// Immutable knobs the orchestrator is built with.
#[derive(Debug, Clone)]
pub struct IdentifySettings {
    /// Lowercase, with leading dot.
    pub accepted_extensions: Vec<String>,
    pub learn_more_template: String,
}

impl From<&AppConfig> for IdentifySettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            accepted_extensions: config.accepted_extensions.clone(),
            learn_more_template: config.learn_more_template.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl UploadedImage {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    /// Lowercased suffix from the last `.` of the final path component,
    /// dot included. Empty when there is no dot or nothing follows it, so
    /// a dot-file such as `.jpg` counts as having the extension `.jpg`.
    pub fn extension(&self) -> String {
        let name = self
            .file_name
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or_default();
        match name.rfind('.') {
            Some(dot) if dot + 1 < name.len() => name[dot..].to_lowercase(),
            _ => String::new(),
        }
    }
}

/// Drives a single identification request: validate, store, predict,
/// normalize. Both endpoints go through [`Orchestrator::identify`].
pub struct Orchestrator {
    store: ImageStore,
    registry: PipelineRegistry,
    normalizer: Normalizer,
    accepted_extensions: Vec<String>,
}

impl Orchestrator {
    pub fn new(store: ImageStore, registry: PipelineRegistry, settings: IdentifySettings) -> Self {
        Self {
            store,
            registry,
            normalizer: Normalizer::new(settings.learn_more_template),
            accepted_extensions: settings.accepted_extensions,
        }
    }

    pub fn identify(
        &self,
        intent: PredictionIntent,
        upload: &UploadedImage,
        version: PipelineVersion,
    ) -> Result<PredictionRecord, IdentifyError> {
        let extension = upload.extension();
        if !self.accepted_extensions.contains(&extension) {
            log::warn!(
                "[{}] rejected '{}': extension '{}' not accepted",
                intent,
                upload.file_name,
                extension
            );
            return Err(IdentifyError::InvalidFormat);
        }

        let pipeline = self.registry.resolve(version).ok_or_else(|| {
            log::warn!("[{}] rejected unknown pipeline version {}", intent, version);
            IdentifyError::UnrecognizedVersion(version)
        })?;

        let stored = self.store.put(&upload.bytes, &extension).map_err(|e| {
            log::error!("[{}] failed to store upload: {}", intent, e);
            e
        })?;
        log::info!(
            "[{}] image {} ({}), running pipeline v{}",
            intent,
            stored.checksum,
            if stored.newly_written { "new" } else { "cached" },
            version
        );

        let outcome = pipeline
            .run(ImageRef {
                path: &stored.path,
                bytes: &upload.bytes,
            })
            .map_err(|e| {
                log::error!("[{}] pipeline v{} failed: {}", intent, version, e);
                e
            })?;

        let output = outcome.output();
        let record = self
            .normalizer
            .normalize(&output.label, &output.scores, outcome.is_rejection())?;
        log::info!(
            "[{}] predicted '{}' with score {:.2}",
            intent,
            record.name,
            record.score
        );
        Ok(record)
    }
}
