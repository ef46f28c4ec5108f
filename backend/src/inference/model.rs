use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Preprocessing error: {0}")]
    Preprocessing(String),
    #[error("Model error: {0}")]
    Model(String),
    #[error("Model backend unavailable: {0}")]
    Unavailable(String),
}

/// How an image is handed to a predictor. Some backends are fed the stored
/// file, others the raw upload bytes.
#[derive(Debug, Clone, Copy)]
pub enum ModelInput<'a> {
    Path(&'a Path),
    Bytes(&'a [u8]),
}

impl ModelInput<'_> {
    pub fn read_bytes(&self) -> Result<Vec<u8>, InferenceError> {
        match self {
            ModelInput::Path(path) => std::fs::read(path).map_err(|e| {
                InferenceError::Preprocessing(format!("failed to read {}: {}", path.display(), e))
            }),
            ModelInput::Bytes(bytes) => Ok(bytes.to_vec()),
        }
    }
}

/// A predicted label together with the model's full score vector.
#[derive(Debug, Clone, PartialEq)]
pub struct RawModelOutput {
    pub label: String,
    pub scores: Vec<f32>,
}

impl RawModelOutput {
    pub fn new(label: impl Into<String>, scores: Vec<f32>) -> Self {
        Self {
            label: label.into(),
            scores,
        }
    }
}

/// A black-box image predictor.
pub trait Predictor: Send + Sync {
    fn predict(&self, input: ModelInput<'_>) -> Result<RawModelOutput, InferenceError>;
}
