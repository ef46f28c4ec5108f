use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::model::{InferenceError, ModelInput, Predictor, RawModelOutput};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Path,
    Bytes,
}

/// Canned predictor that records how it was called.
pub struct FakePredictor {
    result: Result<RawModelOutput, String>,
    calls: AtomicUsize,
    inputs: Mutex<Vec<InputKind>>,
}

impl FakePredictor {
    pub fn returning(label: &str, scores: Vec<f32>) -> Arc<Self> {
        Arc::new(Self {
            result: Ok(RawModelOutput::new(label, scores)),
            calls: AtomicUsize::new(0),
            inputs: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            result: Err(message.to_string()),
            calls: AtomicUsize::new(0),
            inputs: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn inputs(&self) -> Vec<InputKind> {
        self.inputs.lock().unwrap().clone()
    }
}

impl Predictor for FakePredictor {
    fn predict(&self, input: ModelInput<'_>) -> Result<RawModelOutput, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let kind = match input {
            ModelInput::Path(_) => InputKind::Path,
            ModelInput::Bytes(_) => InputKind::Bytes,
        };
        self.inputs.lock().unwrap().push(kind);
        self.result.clone().map_err(InferenceError::Model)
    }
}
