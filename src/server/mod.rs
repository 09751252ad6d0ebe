//! HTTP trigger/read surface.

use crate::models::Kind;
use crate::pipeline::{Batch, Pipeline};
use actix_web::body::MessageBody;
use actix_web::dev::{ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::http::StatusCode;
use actix_web::{get, middleware, web, App, Error, HttpResponse, HttpServer, ResponseError};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};

/// Handler failures. The cause is logged; callers only ever see the
/// generic message.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Failed to scrape data.")]
    Scrape(#[source] anyhow::Error),

    #[error("Failed to fetch data")]
    Fetch(#[source] anyhow::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody { error: self.to_string() })
    }
}

#[derive(Serialize)]
struct ScrapeResponse {
    message: String,
    data: Batch,
}

async fn run_scrape(pipeline: &Pipeline, kind: Kind) -> Result<HttpResponse, ApiError> {
    let outcome = pipeline.scrape(kind).await.map_err(|e| {
        error!("Scrape {} failed: {:#}", kind, e);
        ApiError::Scrape(e)
    })?;
    Ok(HttpResponse::Ok().json(ScrapeResponse {
        message: "Data scraped and saved successfully.".to_string(),
        data: outcome.data,
    }))
}

fn read_rows(pipeline: &Pipeline, kind: Kind) -> Result<HttpResponse, ApiError> {
    let rows = pipeline.rows(kind).map_err(|e| {
        error!("Fetching {} failed: {:#}", kind, e);
        ApiError::Fetch(e)
    })?;
    Ok(HttpResponse::Ok().json(rows))
}

#[get("/scrape")]
async fn scrape_default(pipeline: web::Data<Pipeline>) -> Result<HttpResponse, ApiError> {
    run_scrape(&pipeline, Kind::Rankings).await
}

#[get("/scrape/{kind}")]
async fn scrape_kind(
    pipeline: web::Data<Pipeline>,
    kind: web::Path<Kind>,
) -> Result<HttpResponse, ApiError> {
    run_scrape(&pipeline, kind.into_inner()).await
}

#[get("/data")]
async fn data_default(pipeline: web::Data<Pipeline>) -> Result<HttpResponse, ApiError> {
    read_rows(&pipeline, Kind::Rankings)
}

#[get("/data/{kind}")]
async fn data_kind(
    pipeline: web::Data<Pipeline>,
    kind: web::Path<Kind>,
) -> Result<HttpResponse, ApiError> {
    read_rows(&pipeline, kind.into_inner())
}

#[get("/healthz")]
async fn healthz() -> HttpResponse {
    HttpResponse::Ok().body("ok")
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(scrape_default)
        .service(scrape_kind)
        .service(data_default)
        .service(data_kind)
        .service(healthz);
}

/// The application served by every worker: routes, shared pipeline and the
/// permissive CORS header.
pub fn app(
    pipeline: web::Data<Pipeline>,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse<impl MessageBody>,
        Error = Error,
        InitError = (),
    >,
> {
    App::new()
        .app_data(pipeline)
        .wrap(middleware::DefaultHeaders::new().add(("Access-Control-Allow-Origin", "*")))
        .configure(routes)
}

/// Serve until the process receives a shutdown signal.
pub async fn serve(pipeline: web::Data<Pipeline>, host: &str, port: u16) -> std::io::Result<()> {
    info!("Server running on http://{}:{}", host, port);
    HttpServer::new(move || app(pipeline.clone()))
    .bind((host, port))?
    .run()
    .await
}
