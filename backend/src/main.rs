mod config;
mod inference;
mod prediction;
mod routes;
mod storage;

use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::{App, HttpServer, web};
use config::AppConfig;
use inference::registry::PipelineRegistry;
use prediction::orchestrator::{IdentifySettings, Orchestrator};
use routes::{UploadLimits, configure_routes};
use std::env;
use std::io;
use storage::image_store::ImageStore;

// Models are loaded before the actix runtime starts: the blocking HTTP
// client behind remote models must be created and dropped off the runtime.
fn main() -> io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    } else {
        log::error!("Failed to get the current working directory.");
    }

    let config = AppConfig::load().map_err(|e| {
        log::error!("Failed to load configuration: {}", e);
        io::Error::new(io::ErrorKind::Other, e.to_string())
    })?;

    let registry = PipelineRegistry::from_config(&config.models).map_err(|e| {
        log::error!("Failed to load prediction models at startup: {}", e);
        io::Error::new(
            io::ErrorKind::Other,
            format!("Model loading failed: {}", e),
        )
    })?;
    log::info!("Pipeline versions available: {:?}", registry.versions());

    let store = ImageStore::new(&config.upload_dir);
    log::info!("Storing uploaded images in {}", store.root().display());

    let orchestrator = web::Data::new(Orchestrator::new(
        store,
        registry,
        IdentifySettings::from(&config),
    ));
    let limits = web::Data::new(UploadLimits {
        max_bytes: config.max_upload_bytes,
    });

    let port = env::var("PORT").unwrap_or_else(|_| "8081".to_string());
    let bind_address = format!("0.0.0.0:{}", port);

    log::info!("Starting server on {}", bind_address);

    let result = actix_web::rt::System::new().block_on(serve(
        bind_address,
        orchestrator.clone(),
        limits,
    ));
    drop(orchestrator);
    result
}

async fn serve(
    bind_address: String,
    orchestrator: web::Data<Orchestrator>,
    limits: web::Data<UploadLimits>,
) -> io::Result<()> {
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .app_data(orchestrator.clone())
            .app_data(limits.clone())
            .configure(configure_routes)
    })
    .bind(&bind_address)?
    .run()
    .await
}
