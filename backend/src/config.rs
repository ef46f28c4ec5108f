use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

pub const LINK_PLACEHOLDER: &str = "{name}";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Invalid config value: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    #[serde(default = "default_accepted_extensions")]
    pub accepted_extensions: Vec<String>,
    #[serde(default = "default_learn_more_template")]
    pub learn_more_template: String,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    pub models: ModelsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    pub classifier_v1: ModelSource,
    pub detector_v2: ModelSource,
    pub classifier_v2: ModelSource,
    #[serde(default = "default_bird_label")]
    pub bird_label: String,
}

/// Where a black-box predictor lives.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[cfg_attr(not(feature = "torch"), allow(dead_code))]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum ModelSource {
    Remote {
        endpoint: Url,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
    Torchscript {
        path: PathBuf,
        labels: PathBuf,
        #[serde(default = "default_input_size")]
        input_size: u32,
    },
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("./UploadedImages")
}

fn default_accepted_extensions() -> Vec<String> {
    vec![".jpg".into(), ".jpeg".into(), ".png".into()]
}

fn default_learn_more_template() -> String {
    "https://www.google.com/search?q={name}+bird".to_string()
}

fn default_max_upload_bytes() -> usize {
    50 * 1024 * 1024
}

fn default_bird_label() -> String {
    "bird".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_input_size() -> u32 {
    224
}

impl AppConfig {
    /// Loads the config from `BIRDID_CONFIG`, falling back to
    /// `config/birdid.yaml` at the workspace root. `UPLOAD_DIR` overrides the
    /// configured store directory.
    pub fn load() -> Result<Self, ConfigError> {
        let path = match std::env::var("BIRDID_CONFIG") {
            Ok(path) => PathBuf::from(path),
            Err(_) => default_config_path(),
        };
        let mut config = Self::from_file(&path)?;
        if let Ok(upload_dir) = std::env::var("UPLOAD_DIR") {
            config.upload_dir = PathBuf::from(upload_dir);
        }
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let config_str = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&config_str)
    }

    pub fn from_yaml(config_str: &str) -> Result<Self, ConfigError> {
        let mut config: AppConfig = serde_yaml::from_str(config_str)?;
        config.accepted_extensions = config
            .accepted_extensions
            .iter()
            .map(|ext| normalize_extension(ext))
            .collect();
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.learn_more_template.contains(LINK_PLACEHOLDER) {
            return Err(ConfigError::Invalid(format!(
                "learn_more_template must contain {}",
                LINK_PLACEHOLDER
            )));
        }
        if self.accepted_extensions.is_empty() {
            return Err(ConfigError::Invalid(
                "accepted_extensions must not be empty".to_string(),
            ));
        }
        if self.max_upload_bytes == 0 {
            return Err(ConfigError::Invalid(
                "max_upload_bytes must be positive".to_string(),
            ));
        }
        if self.models.bird_label.is_empty() {
            return Err(ConfigError::Invalid(
                "models.bird_label must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_config_path() -> PathBuf {
    match std::env::var("CARGO_MANIFEST_DIR") {
        Ok(manifest_dir) => PathBuf::from(format!("{}/../config/birdid.yaml", manifest_dir)),
        Err(_) => PathBuf::from("config/birdid.yaml"),
    }
}

// ".JPG", "jpg" and ".jpg" all become ".jpg"
fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim().to_lowercase();
    if ext.starts_with('.') {
        ext
    } else {
        format!(".{}", ext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
models:
  classifier_v1:
    backend: remote
    endpoint: http://localhost:9000/v1/classify
  detector_v2:
    backend: remote
    endpoint: http://localhost:9000/v2/detect
    timeout_secs: 5
  classifier_v2:
    backend: torchscript
    path: models/classifier_v2.pt
    labels: models/classifier_v2.txt
"#;

    #[test]
    fn test_defaults_applied() {
        let config = AppConfig::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.upload_dir, PathBuf::from("./UploadedImages"));
        assert_eq!(config.accepted_extensions, vec![".jpg", ".jpeg", ".png"]);
        assert_eq!(
            config.learn_more_template,
            "https://www.google.com/search?q={name}+bird"
        );
        assert_eq!(config.max_upload_bytes, 50 * 1024 * 1024);
        assert_eq!(config.models.bird_label, "bird");
    }

    #[test]
    fn test_model_sources_parsed() {
        let config = AppConfig::from_yaml(MINIMAL).unwrap();
        match &config.models.classifier_v1 {
            ModelSource::Remote { endpoint, timeout_secs } => {
                assert_eq!(endpoint.as_str(), "http://localhost:9000/v1/classify");
                assert_eq!(*timeout_secs, 30);
            }
            other => panic!("unexpected source: {:?}", other),
        }
        assert!(matches!(
            config.models.detector_v2,
            ModelSource::Remote { timeout_secs: 5, .. }
        ));
        assert_eq!(
            config.models.classifier_v2,
            ModelSource::Torchscript {
                path: PathBuf::from("models/classifier_v2.pt"),
                labels: PathBuf::from("models/classifier_v2.txt"),
                input_size: 224,
            }
        );
    }

    #[test]
    fn test_extensions_normalized() {
        let yaml = format!("accepted_extensions: [\"JPG\", \".Png\"]\n{}", MINIMAL);
        let config = AppConfig::from_yaml(&yaml).unwrap();
        assert_eq!(config.accepted_extensions, vec![".jpg", ".png"]);
    }

    #[test]
    fn test_template_without_placeholder_rejected() {
        let yaml = format!("learn_more_template: \"https://example.com\"\n{}", MINIMAL);
        assert!(matches!(
            AppConfig::from_yaml(&yaml),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let yaml = r#"
models:
  classifier_v1: { backend: onnx, path: a.onnx }
  detector_v2: { backend: remote, endpoint: "http://localhost" }
  classifier_v2: { backend: remote, endpoint: "http://localhost" }
"#;
        assert!(matches!(AppConfig::from_yaml(yaml), Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = AppConfig::from_file(Path::new("/nonexistent/birdid.yaml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/birdid.yaml"));
    }
}
