use actix_multipart::Multipart;
use actix_web::{HttpResponse, error, web};
use futures::{StreamExt, TryStreamExt};
use log::{error, warn};
use serde::{Deserialize, Serialize};
use shared::PredictionIntent;

use crate::inference::registry::PipelineVersion;
use crate::prediction::orchestrator::{IdentifyError, Orchestrator, UploadedImage};

const IMAGE_FIELD: &str = "image";
const DEFAULT_VERSION: PipelineVersion = 1;

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl ErrorResponse {
    fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct VersionQuery {
    pub version: Option<PipelineVersion>,
}

#[derive(Debug, Clone, Copy)]
pub struct UploadLimits {
    pub max_bytes: usize,
}

#[derive(Debug, thiserror::Error)]
enum UploadError {
    #[error("No image provided.")]
    MissingImage,
    #[error("Image exceeds the {0} byte upload limit.")]
    TooLarge(usize),
    #[error("Malformed multipart payload: {0}")]
    Malformed(String),
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::QueryConfig::default().error_handler(|err, _req| {
        let response = HttpResponse::BadRequest().json(ErrorResponse::new(err.to_string()));
        error::InternalError::from_response(err, response).into()
    }))
    .service(
        web::scope("/birds/identification")
            .route("/classify", web::post().to(classify))
            .route("/persona", web::post().to(persona)),
    );
}

/// Checks whether the image shows a bird and, if so, which species.
async fn classify(
    orchestrator: web::Data<Orchestrator>,
    limits: web::Data<UploadLimits>,
    query: web::Query<VersionQuery>,
    payload: Multipart,
) -> HttpResponse {
    identify(
        PredictionIntent::Classification,
        orchestrator,
        limits,
        query,
        payload,
    )
    .await
}

/// Predicts which bird the image most resembles.
async fn persona(
    orchestrator: web::Data<Orchestrator>,
    limits: web::Data<UploadLimits>,
    query: web::Query<VersionQuery>,
    payload: Multipart,
) -> HttpResponse {
    identify(PredictionIntent::Persona, orchestrator, limits, query, payload).await
}

async fn identify(
    intent: PredictionIntent,
    orchestrator: web::Data<Orchestrator>,
    limits: web::Data<UploadLimits>,
    query: web::Query<VersionQuery>,
    payload: Multipart,
) -> HttpResponse {
    let version = query.version.unwrap_or(DEFAULT_VERSION);

    let upload = match read_upload(payload, limits.max_bytes).await {
        Ok(upload) => upload,
        Err(e) => {
            warn!("[{}] bad upload: {}", intent, e);
            return match e {
                UploadError::TooLarge(_) => {
                    HttpResponse::PayloadTooLarge().json(ErrorResponse::new(e.to_string()))
                }
                _ => HttpResponse::BadRequest().json(ErrorResponse::new(e.to_string())),
            };
        }
    };

    match web::block(move || orchestrator.identify(intent, &upload, version)).await {
        Ok(Ok(record)) => HttpResponse::Ok().json(record),
        Ok(Err(e)) => identify_error_response(&e),
        Err(e) => {
            error!("[{}] blocking task failed: {:?}", intent, e);
            HttpResponse::InternalServerError().json(ErrorResponse::new("Prediction failed"))
        }
    }
}

fn identify_error_response(err: &IdentifyError) -> HttpResponse {
    match err {
        IdentifyError::InvalidFormat | IdentifyError::UnrecognizedVersion(_) => {
            HttpResponse::BadRequest().json(ErrorResponse::new(err.to_string()))
        }
        IdentifyError::Storage(_) => HttpResponse::InternalServerError()
            .json(ErrorResponse::new("Image storage unavailable")),
        IdentifyError::Inference(_) | IdentifyError::MalformedOutput(_) => {
            HttpResponse::InternalServerError().json(ErrorResponse::new("Prediction failed"))
        }
    }
}

// Takes the file field named `image`, or the first file field if none is.
async fn read_upload(
    mut payload: Multipart,
    max_bytes: usize,
) -> Result<UploadedImage, UploadError> {
    let mut fallback: Option<UploadedImage> = None;

    while let Some(mut field) = payload
        .try_next()
        .await
        .map_err(|e| UploadError::Malformed(e.to_string()))?
    {
        let file_name = match field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
        {
            Some(name) => name.to_string(),
            None => continue,
        };
        let is_image_field = field.name() == Some(IMAGE_FIELD);

        let mut image_data = Vec::new();
        while let Some(chunk) = field.next().await {
            let data = chunk.map_err(|e| UploadError::Malformed(e.to_string()))?;
            if image_data.len() + data.len() > max_bytes {
                return Err(UploadError::TooLarge(max_bytes));
            }
            image_data.extend_from_slice(&data);
        }

        let upload = UploadedImage::new(file_name, image_data);
        if is_image_field {
            return Ok(upload);
        }
        fallback.get_or_insert(upload);
    }

    fallback.ok_or(UploadError::MissingImage)
}
