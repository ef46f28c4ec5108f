use image::imageops::FilterType;
use std::path::Path;
use std::sync::Mutex;
use tch::{CModule, Device, Kind, Tensor, nn::ModuleT};

use super::model::{InferenceError, ModelInput, Predictor, RawModelOutput};

const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const STD: [f32; 3] = [0.229, 0.224, 0.225];

/// TorchScript image classifier with a newline separated label file.
pub struct TorchScriptModel {
    model: Mutex<CModule>,
    labels: Vec<String>,
    input_size: u32,
    device: Device,
}

impl TorchScriptModel {
    pub fn load(
        model_path: &Path,
        labels_path: &Path,
        input_size: u32,
    ) -> Result<Self, InferenceError> {
        let device = Device::cuda_if_available();
        let model = CModule::load_on_device(model_path, device).map_err(|e| {
            InferenceError::Unavailable(format!("{}: {}", model_path.display(), e))
        })?;
        let labels = std::fs::read_to_string(labels_path)
            .map_err(|e| InferenceError::Unavailable(format!("{}: {}", labels_path.display(), e)))?
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect::<Vec<_>>();
        if labels.is_empty() {
            return Err(InferenceError::Unavailable(format!(
                "{} contains no labels",
                labels_path.display()
            )));
        }
        log::info!(
            "Loaded {} with {} labels on {:?}",
            model_path.display(),
            labels.len(),
            device
        );
        Ok(Self {
            model: Mutex::new(model),
            labels,
            input_size,
            device,
        })
    }

    fn preprocess(&self, input: ModelInput<'_>) -> Result<Tensor, InferenceError> {
        let image = match input {
            ModelInput::Path(path) => image::open(path),
            ModelInput::Bytes(bytes) => image::load_from_memory(bytes),
        }
        .map_err(|e| InferenceError::Preprocessing(e.to_string()))?;

        let size = self.input_size;
        let rgb = image.resize_exact(size, size, FilterType::Triangle).to_rgb8();
        let pixels: Vec<f32> = rgb.into_raw().into_iter().map(|v| v as f32 / 255.0).collect();

        let side = size as i64;
        let tensor = Tensor::from_slice(&pixels)
            .view([1, side, side, 3])
            .permute([0, 3, 1, 2]);
        let mean = Tensor::from_slice(&MEAN[..]).view([1, 3, 1, 1]);
        let std = Tensor::from_slice(&STD[..]).view([1, 3, 1, 1]);
        Ok(((tensor - mean) / std).to_device(self.device))
    }
}

impl Predictor for TorchScriptModel {
    fn predict(&self, input: ModelInput<'_>) -> Result<RawModelOutput, InferenceError> {
        let tensor = self.preprocess(input)?;
        let output = {
            let model = self
                .model
                .lock()
                .map_err(|_| InferenceError::Model("model lock poisoned".to_string()))?;
            model.forward_t(&tensor, false)
        };
        let output = output.softmax(-1, Kind::Float);
        let output_flat = output.to_kind(Kind::Float).to_device(Device::Cpu).view([-1]);
        let num_elements = output_flat.size()[0] as usize;
        let mut scores = vec![0.0f32; num_elements];
        output_flat.copy_data(&mut scores, num_elements);

        if scores.len() != self.labels.len() {
            return Err(InferenceError::Model(format!(
                "model produced {} scores for {} labels",
                scores.len(),
                self.labels.len()
            )));
        }

        let best = scores
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(index, _)| index)
            .ok_or_else(|| InferenceError::Model("model produced no scores".to_string()))?;

        Ok(RawModelOutput::new(self.labels[best].clone(), scores))
    }
}
