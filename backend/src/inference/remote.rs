use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use super::model::{InferenceError, ModelInput, Predictor, RawModelOutput};

#[derive(Deserialize)]
struct PredictResponse {
    label: String,
    scores: Vec<f32>,
}

/// Predictor served over HTTP. The image is POSTed as raw bytes and the
/// server answers with `{ "label": ..., "scores": [...] }`.
pub struct RemoteModel {
    client: Client,
    endpoint: Url,
}

impl RemoteModel {
    /// Safe to call from inside an async runtime. `predict` itself blocks
    /// and must run on a blocking thread (`web::block`).
    pub fn new(endpoint: Url, timeout_secs: u64) -> Result<Self, InferenceError> {
        // The blocking client starts its own runtime, which cannot happen on
        // an async worker thread.
        let client = std::thread::spawn(move || {
            Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .build()
        })
        .join()
        .map_err(|_| InferenceError::Unavailable("HTTP client setup panicked".to_string()))?
        .map_err(|e| InferenceError::Unavailable(e.to_string()))?;
        Ok(Self { client, endpoint })
    }
}

impl Predictor for RemoteModel {
    fn predict(&self, input: ModelInput<'_>) -> Result<RawModelOutput, InferenceError> {
        let body = input.read_bytes()?;

        let response = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()
            .map_err(|e| InferenceError::Unavailable(format!("{}: {}", self.endpoint, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(InferenceError::Model(format!(
                "{} responded with {}",
                self.endpoint, status
            )));
        }

        let prediction = response
            .json::<PredictResponse>()
            .map_err(|e| InferenceError::Model(format!("invalid response body: {}", e)))?;
        Ok(RawModelOutput::new(prediction.label, prediction.scores))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread::JoinHandle;

    // Answers one request with `status` and `body`, handing back the bytes
    // the client POSTed.
    fn serve_once(status: &'static str, body: &'static str) -> (Url, JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/predict", listener.local_addr().unwrap())
            .parse()
            .unwrap();
        let handle = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);
            let mut content_length = 0;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if line == "\r\n" {
                    break;
                }
                if let Some((name, value)) = line.split_once(':') {
                    if name.eq_ignore_ascii_case("content-length") {
                        content_length = value.trim().parse().unwrap();
                    }
                }
            }
            let mut request_body = vec![0u8; content_length];
            reader.read_exact(&mut request_body).unwrap();

            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            reader.get_mut().write_all(response.as_bytes()).unwrap();
            request_body
        });
        (url, handle)
    }

    #[test]
    fn test_predict_from_bytes() {
        let (url, server) = serve_once("200 OK", r#"{"label":"bird","scores":[0.9,0.1]}"#);
        let model = RemoteModel::new(url, 5).unwrap();

        let output = model.predict(ModelInput::Bytes(b"raw image")).unwrap();

        assert_eq!(output, RawModelOutput::new("bird", vec![0.9, 0.1]));
        assert_eq!(server.join().unwrap(), b"raw image");
    }

    #[test]
    fn test_predict_from_path_sends_file_contents() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"stored image").unwrap();
        let (url, server) = serve_once("200 OK", r#"{"label":"Osprey","scores":[0.7]}"#);
        let model = RemoteModel::new(url, 5).unwrap();

        let output = model.predict(ModelInput::Path(file.path())).unwrap();

        assert_eq!(output.label, "Osprey");
        assert_eq!(server.join().unwrap(), b"stored image");
    }

    #[test]
    fn test_server_error_is_model_error() {
        let (url, server) = serve_once("500 Internal Server Error", "{}");
        let model = RemoteModel::new(url, 5).unwrap();

        assert!(matches!(
            model.predict(ModelInput::Bytes(b"raw image")),
            Err(InferenceError::Model(_))
        ));
        server.join().unwrap();
    }

    #[test]
    fn test_malformed_body_is_model_error() {
        let (url, server) = serve_once("200 OK", r#"{"prediction":"bird"}"#);
        let model = RemoteModel::new(url, 5).unwrap();

        assert!(matches!(
            model.predict(ModelInput::Bytes(b"raw image")),
            Err(InferenceError::Model(_))
        ));
        server.join().unwrap();
    }

    #[actix_web::test]
    async fn test_build_and_predict_inside_async_runtime() {
        let (url, server) = serve_once("200 OK", r#"{"label":"bird","scores":[0.6,0.4]}"#);
        let model = std::sync::Arc::new(RemoteModel::new(url, 5).unwrap());

        let worker_model = model.clone();
        let output = actix_web::web::block(move || {
            worker_model.predict(ModelInput::Bytes(b"raw image"))
        })
        .await
        .unwrap()
        .unwrap();

        assert_eq!(output, RawModelOutput::new("bird", vec![0.6, 0.4]));
        server.join().unwrap();
        drop(model);
    }

    #[test]
    fn test_missing_file_is_preprocessing_error() {
        let model = RemoteModel::new("http://127.0.0.1:9/predict".parse().unwrap(), 1).unwrap();

        assert!(matches!(
            model.predict(ModelInput::Path(std::path::Path::new("/nonexistent/a.jpg"))),
            Err(InferenceError::Preprocessing(_))
        ));
    }
}
